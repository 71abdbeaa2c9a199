//! Where the speech engine's runtime and client archives live per platform.

use std::io::ErrorKind;

use tokio::net::TcpListener;
use tracing::debug;

pub const CLIENT_VERSION: &str = "ed37735306c851eed8010bf6dbb55920";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Mac,
    Windows,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::Mac
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Linux
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerProfile {
    /// Runtime executable, relative to `runtime_path`.
    pub binary_name: &'static str,
    /// Directory inside the unpacked runtime holding the executable.
    pub runtime_path: &'static str,
    pub archive_url: &'static str,
    pub version_tag: &'static str,
}

pub fn runner_profile(platform: Platform) -> RunnerProfile {
    match platform {
        Platform::Mac => RunnerProfile {
            binary_name: "./java",
            runtime_path: "bin",
            archive_url: "https://cdn.serenade.ai/jdk/jdk-mac-fa019a048911b0fd95c7bac642244f34.tar.gz",
            version_tag: "fa019a048911b0fd95c7bac642244f34",
        },
        Platform::Windows => RunnerProfile {
            binary_name: "java.exe",
            runtime_path: "bin",
            archive_url: "https://download.java.net/java/GA/jdk11/9/GPL/openjdk-11.0.2_windows-x64_bin.zip",
            version_tag: "jdk-11.0.2",
        },
        Platform::Linux => RunnerProfile {
            binary_name: "./java",
            runtime_path: "bin",
            archive_url: "https://download.java.net/java/GA/jdk11/9/GPL/openjdk-11.0.2_linux-x64_bin.tar.gz",
            version_tag: "jdk-11.0.2",
        },
    }
}

/// Archive of the speech engine client itself, shared by every platform.
pub fn client_url() -> String {
    format!("https://cdn.serenade.ai/client/Serenade-{CLIENT_VERSION}.tar.gz")
}

/// Whether nothing is listening on `port` yet, i.e. the speech engine is
/// not already running.
pub async fn is_port_available(port: u16) -> bool {
    match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(_) => true,
        Err(err) if err.kind() == ErrorKind::AddrInUse => false,
        Err(err) => {
            debug!(port, "port check failed: {err}");
            true
        }
    }
}
