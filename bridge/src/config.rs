use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_APP: &str = "vscode";
pub const DEFAULT_WEBSOCKET_PORT: u16 = 17373;
pub const DEFAULT_HTTP_INBOUND_PORT: u16 = 17374;
pub const DEFAULT_HTTP_OUTBOUND_PORT: u16 = 17373;
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_UI_DELAY_MS: u64 = 100;
pub const DEFAULT_HIGHLIGHT_DURATION_MS: u64 = 250;
pub const DEFAULT_ERROR_COLOR: &str = "255, 99, 71";
pub const DEFAULT_SUCCESS_COLOR: &str = "43, 161, 67";

const MIN_PORT: u16 = 1024;
const MIN_INTERVAL_MS: u64 = 100;
const MAX_INTERVAL_MS: u64 = 600_000;
const MAX_UI_DELAY_MS: u64 = 5_000;
const MIN_HIGHLIGHT_DURATION_MS: u64 = 7;
const MAX_HIGHLIGHT_DURATION_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write config `{path}`: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: u64,
        max: u64,
    },
    #[error("{field} must be an `r, g, b` triple, got `{value}`")]
    InvalidColor { field: &'static str, value: String },
    #[error("app cannot be empty")]
    EmptyApp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Websocket,
    Http,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "websocket" | "ws" => Ok(Self::Websocket),
            "http" => Ok(Self::Http),
            other => Err(format!("unknown transport `{other}`")),
        }
    }
}

/// A concrete colour resolved once from its `r, g, b` text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl FromStr for Rgb {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts = value
            .split(',')
            .map(|part| part.trim().parse::<u8>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| format!("invalid colour `{value}`: {err}"))?;

        match parts.as_slice() {
            [r, g, b] => Ok(Self(*r, *g, *b)),
            _ => Err(format!("invalid colour `{value}`: expected three components")),
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {}", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    #[serde(default = "default_app")]
    pub app: String,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default = "default_websocket_port")]
    pub websocket_port: u16,
    #[serde(default = "default_http_inbound_port")]
    pub http_inbound_port: u16,
    #[serde(default = "default_http_outbound_port")]
    pub http_outbound_port: u16,
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_ui_delay_ms")]
    pub ui_delay_ms: u64,
    #[serde(default = "default_animations")]
    pub animations: bool,
    #[serde(default = "default_highlight_duration_ms")]
    pub highlight_duration_ms: u64,
    #[serde(default = "default_error_color")]
    pub error_color: String,
    #[serde(default = "default_success_color")]
    pub success_color: String,
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub cancel_overlapping_highlights: bool,
    #[serde(default)]
    pub disable_autostart: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            app: default_app(),
            transport: Transport::default(),
            websocket_port: default_websocket_port(),
            http_inbound_port: default_http_inbound_port(),
            http_outbound_port: default_http_outbound_port(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            ui_delay_ms: default_ui_delay_ms(),
            animations: default_animations(),
            highlight_duration_ms: default_highlight_duration_ms(),
            error_color: default_error_color(),
            success_color: default_success_color(),
            ignore: default_ignore(),
            cancel_overlapping_highlights: false,
            disable_autostart: false,
        }
    }
}

impl BridgeConfig {
    pub fn error_rgb(&self) -> Rgb {
        self.error_color
            .parse()
            .unwrap_or(Rgb(255, 99, 71))
    }

    pub fn success_rgb(&self) -> Rgb {
        self.success_color
            .parse()
            .unwrap_or(Rgb(43, 161, 67))
    }
}

fn default_app() -> String {
    DEFAULT_APP.to_string()
}

fn default_websocket_port() -> u16 {
    DEFAULT_WEBSOCKET_PORT
}

fn default_http_inbound_port() -> u16 {
    DEFAULT_HTTP_INBOUND_PORT
}

fn default_http_outbound_port() -> u16 {
    DEFAULT_HTTP_OUTBOUND_PORT
}

fn default_reconnect_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_MS
}

fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_ui_delay_ms() -> u64 {
    DEFAULT_UI_DELAY_MS
}

fn default_animations() -> bool {
    true
}

fn default_highlight_duration_ms() -> u64 {
    DEFAULT_HIGHLIGHT_DURATION_MS
}

fn default_error_color() -> String {
    DEFAULT_ERROR_COLOR.to_string()
}

fn default_success_color() -> String {
    DEFAULT_SUCCESS_COLOR.to_string()
}

fn default_ignore() -> Vec<String> {
    vec!["**/node_modules/**".to_string(), "**/.git/**".to_string()]
}

/// Reads the config at `path`. A missing file yields the defaults.
pub fn read_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    if !path.exists() {
        return Ok(BridgeConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str::<BridgeConfig>(&content)?)
}

pub fn write_config(path: &Path, config: &BridgeConfig) -> Result<(), ConfigError> {
    let to_write_error = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(to_write_error)?;
    }

    let serialized = serde_json::to_string_pretty(config)?;
    fs::write(path, serialized).map_err(to_write_error)
}

pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    read_config(path).map(normalize_loaded_config)
}

/// Validates and persists `config`, returning the stored form.
pub fn save_config(path: &Path, config: BridgeConfig) -> Result<BridgeConfig, ConfigError> {
    let validated = validate_config(config)?;
    write_config(path, &validated)?;
    Ok(validated)
}

/// Resets every out-of-range value to its default instead of failing, so a
/// hand-edited file never keeps the bridge from starting.
pub fn normalize_loaded_config(mut config: BridgeConfig) -> BridgeConfig {
    let defaults = BridgeConfig::default();

    config.app = config.app.trim().to_string();
    if config.app.is_empty() {
        warn!("loaded app name is empty; resetting to default");
        config.app = defaults.app;
    }

    for (field, port, default) in [
        (
            "websocketPort",
            &mut config.websocket_port,
            defaults.websocket_port,
        ),
        (
            "httpInboundPort",
            &mut config.http_inbound_port,
            defaults.http_inbound_port,
        ),
        (
            "httpOutboundPort",
            &mut config.http_outbound_port,
            defaults.http_outbound_port,
        ),
    ] {
        if *port < MIN_PORT {
            warn!(field, port = *port, "loaded port is out of range; resetting to default");
            *port = default;
        }
    }

    for (field, value, default, min, max) in [
        (
            "reconnectIntervalMs",
            &mut config.reconnect_interval_ms,
            defaults.reconnect_interval_ms,
            MIN_INTERVAL_MS,
            MAX_INTERVAL_MS,
        ),
        (
            "heartbeatIntervalMs",
            &mut config.heartbeat_interval_ms,
            defaults.heartbeat_interval_ms,
            MIN_INTERVAL_MS,
            MAX_INTERVAL_MS,
        ),
        (
            "pollIntervalMs",
            &mut config.poll_interval_ms,
            defaults.poll_interval_ms,
            MIN_INTERVAL_MS,
            MAX_INTERVAL_MS,
        ),
        (
            "uiDelayMs",
            &mut config.ui_delay_ms,
            defaults.ui_delay_ms,
            0,
            MAX_UI_DELAY_MS,
        ),
        (
            "highlightDurationMs",
            &mut config.highlight_duration_ms,
            defaults.highlight_duration_ms,
            MIN_HIGHLIGHT_DURATION_MS,
            MAX_HIGHLIGHT_DURATION_MS,
        ),
    ] {
        if !(min..=max).contains(value) {
            warn!(field, value = *value, "loaded value is out of range; resetting to default");
            *value = default;
        }
    }

    if config.error_color.parse::<Rgb>().is_err() {
        warn!(color = %config.error_color, "loaded error color is invalid; resetting to default");
        config.error_color = defaults.error_color;
    }
    if config.success_color.parse::<Rgb>().is_err() {
        warn!(color = %config.success_color, "loaded success color is invalid; resetting to default");
        config.success_color = defaults.success_color;
    }

    config.ignore.retain(|pattern| !pattern.trim().is_empty());
    config
}

pub fn validate_config(mut config: BridgeConfig) -> Result<BridgeConfig, ConfigError> {
    config.app = config.app.trim().to_string();
    if config.app.is_empty() {
        return Err(ConfigError::EmptyApp);
    }

    for (field, port) in [
        ("websocketPort", config.websocket_port),
        ("httpInboundPort", config.http_inbound_port),
        ("httpOutboundPort", config.http_outbound_port),
    ] {
        if port < MIN_PORT {
            return Err(ConfigError::OutOfRange {
                field,
                min: u64::from(MIN_PORT),
                max: u64::from(u16::MAX),
            });
        }
    }

    for (field, value, min, max) in [
        (
            "reconnectIntervalMs",
            config.reconnect_interval_ms,
            MIN_INTERVAL_MS,
            MAX_INTERVAL_MS,
        ),
        (
            "heartbeatIntervalMs",
            config.heartbeat_interval_ms,
            MIN_INTERVAL_MS,
            MAX_INTERVAL_MS,
        ),
        (
            "pollIntervalMs",
            config.poll_interval_ms,
            MIN_INTERVAL_MS,
            MAX_INTERVAL_MS,
        ),
        ("uiDelayMs", config.ui_delay_ms, 0, MAX_UI_DELAY_MS),
        (
            "highlightDurationMs",
            config.highlight_duration_ms,
            MIN_HIGHLIGHT_DURATION_MS,
            MAX_HIGHLIGHT_DURATION_MS,
        ),
    ] {
        if !(min..=max).contains(&value) {
            return Err(ConfigError::OutOfRange { field, min, max });
        }
    }

    for (field, value) in [
        ("errorColor", &config.error_color),
        ("successColor", &config.success_color),
    ] {
        if value.parse::<Rgb>().is_err() {
            return Err(ConfigError::InvalidColor {
                field,
                value: value.clone(),
            });
        }
    }

    config.ignore.retain(|pattern| !pattern.trim().is_empty());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{"app": "atom", "transport": "http"}"#).expect("parse config");

        assert_eq!(config.app, "atom");
        assert_eq!(config.transport, Transport::Http);
        assert_eq!(config.websocket_port, 17373);
        assert_eq!(config.http_inbound_port, 17374);
        assert_eq!(config.highlight_duration_ms, 250);
        assert!(config.animations);
        assert!(!config.cancel_overlapping_highlights);
    }

    #[test]
    fn colors_parse_into_triples() {
        assert_eq!("255, 99, 71".parse::<Rgb>(), Ok(Rgb(255, 99, 71)));
        assert_eq!("1,2,3".parse::<Rgb>(), Ok(Rgb(1, 2, 3)));
        assert!("1, 2".parse::<Rgb>().is_err());
        assert!("300, 0, 0".parse::<Rgb>().is_err());
        assert_eq!(Rgb(43, 161, 67).to_string(), DEFAULT_SUCCESS_COLOR);
    }

    #[test]
    fn normalize_resets_out_of_range_values() {
        let config = BridgeConfig {
            app: "  ".to_string(),
            websocket_port: 80,
            heartbeat_interval_ms: 5,
            highlight_duration_ms: 60_000,
            error_color: "red".to_string(),
            ..BridgeConfig::default()
        };

        let normalized = normalize_loaded_config(config);

        assert_eq!(normalized.app, DEFAULT_APP);
        assert_eq!(normalized.websocket_port, DEFAULT_WEBSOCKET_PORT);
        assert_eq!(normalized.heartbeat_interval_ms, DEFAULT_HEARTBEAT_INTERVAL_MS);
        assert_eq!(normalized.highlight_duration_ms, DEFAULT_HIGHLIGHT_DURATION_MS);
        assert_eq!(normalized.error_color, DEFAULT_ERROR_COLOR);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = BridgeConfig {
            ui_delay_ms: 10_000,
            ..BridgeConfig::default()
        };
        assert!(matches!(
            validate_config(config),
            Err(ConfigError::OutOfRange {
                field: "uiDelayMs",
                ..
            })
        ));

        let config = BridgeConfig {
            success_color: "0, 0".to_string(),
            ..BridgeConfig::default()
        };
        assert!(matches!(
            validate_config(config),
            Err(ConfigError::InvalidColor {
                field: "successColor",
                ..
            })
        ));
    }

    #[test]
    fn transport_parses_from_cli_text() {
        assert_eq!("WebSocket".parse::<Transport>(), Ok(Transport::Websocket));
        assert_eq!("http".parse::<Transport>(), Ok(Transport::Http));
        assert!("pigeon".parse::<Transport>().is_err());
    }

    #[test]
    fn save_then_load_round_trips_through_disk() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("nested").join("config.json");
        let config = BridgeConfig {
            transport: Transport::Http,
            ui_delay_ms: 0,
            ..BridgeConfig::default()
        };

        let saved = save_config(&path, config).expect("save config");
        let loaded = load_config(&path).expect("load config");
        assert_eq!(saved, loaded);
        assert!(path.exists());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("config.json");
        assert_eq!(
            load_config(&path).expect("load config"),
            BridgeConfig::default()
        );
    }
}
