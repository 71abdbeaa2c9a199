use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tracing::debug;

use crate::config::BridgeConfig;
use crate::metrics::RuntimeMetrics;
use crate::network::SessionIdentity;

const OBSERVER_CHANNEL_CAPACITY: usize = 256;

pub type StateCallback = Arc<dyn Fn(&Value, Option<&Value>) + Send + Sync>;

/// Update pushed to observer surfaces after every `set`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateMessage {
    pub event: String,
    pub data: Value,
    pub previous: Option<Value>,
}

/// A UI surface mirroring process-wide state.
pub trait StateObserver: Send + Sync {
    fn post(&self, message: &StateMessage);
}

pub struct ChannelObserver {
    sender: broadcast::Sender<StateMessage>,
}

impl ChannelObserver {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(OBSERVER_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateMessage> {
        self.sender.subscribe()
    }
}

impl Default for ChannelObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl StateObserver for ChannelObserver {
    fn post(&self, message: &StateMessage) {
        // no receivers is fine, nobody is watching yet
        let _ = self.sender.send(message.clone());
    }
}

/// Process-wide key/value store with change fan-out.
///
/// `set` completes every callback and observer post before returning.
/// Callbacks run without any internal lock held, so they may call back
/// into the manager.
#[derive(Default)]
pub struct StateManager {
    data: Mutex<HashMap<String, Value>>,
    callbacks: Mutex<HashMap<String, Vec<StateCallback>>>,
    observers: Mutex<Vec<Arc<dyn StateObserver>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.data).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.data).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        // the map owns its values, so the replaced entry is already a detached copy
        let previous = lock(&self.data).insert(key.to_string(), value.clone());
        debug!(key, "state updated");

        let callbacks = lock(&self.callbacks).get(key).cloned().unwrap_or_default();
        for callback in &callbacks {
            callback(&value, previous.as_ref());
        }

        let observers = lock(&self.observers).clone();
        if observers.is_empty() {
            return;
        }

        let message = StateMessage {
            event: format!("state:{key}"),
            data: value,
            previous,
        };
        for observer in &observers {
            observer.post(&message);
        }
    }

    /// Registers `callback` for every future `set` of `key`. The current
    /// value is not replayed.
    pub fn subscribe<F>(&self, key: &str, callback: F)
    where
        F: Fn(&Value, Option<&Value>) + Send + Sync + 'static,
    {
        lock(&self.callbacks)
            .entry(key.to_string())
            .or_default()
            .push(Arc::new(callback));
    }

    pub fn add_observer(&self, observer: Arc<dyn StateObserver>) {
        lock(&self.observers).push(observer);
    }
}

pub struct RuntimeState {
    pub config: BridgeConfig,
    pub identity: SessionIdentity,
    pub state: Arc<StateManager>,
    pub metrics: AsyncMutex<RuntimeMetrics>,
}

#[derive(Clone)]
pub struct AppState {
    runtime: Arc<RuntimeState>,
}

impl AppState {
    pub fn new(config: BridgeConfig) -> Self {
        let identity = SessionIdentity::new(&config.app);
        let runtime = RuntimeState {
            config,
            identity,
            state: Arc::new(StateManager::new()),
            metrics: AsyncMutex::new(RuntimeMetrics::new()),
        };
        Self {
            runtime: Arc::new(runtime),
        }
    }

    pub fn runtime(&self) -> Arc<RuntimeState> {
        Arc::clone(&self.runtime)
    }
}
