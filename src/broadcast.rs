//! Same-origin broadcast between open windows.
//!
//! A [`BroadcastHub`] is the named channel; each window joins it and gets a
//! [`WindowChannel`]. Messages travel as JSON strings, carry the sending
//! window's id, and a window never sees its own messages. Delivery is best
//! effort and last-write-wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::KbaseError;
use crate::path::VaultPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    NoteUpdated,
    NoteSelected,
    FileTreeUpdated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<VaultPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub window_id: Uuid,
}

type Subscribers = Arc<Mutex<HashMap<Uuid, Sender<String>>>>;

/// A named broadcast channel. Cloning shares the same channel.
#[derive(Clone)]
pub struct BroadcastHub {
    name: String,
    subscribers: Subscribers,
}

impl BroadcastHub {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a new window with a fresh id.
    pub fn join(&self) -> WindowChannel {
        let window_id = Uuid::new_v4();
        let (tx, rx) = unbounded::<String>();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.insert(window_id, tx);
        }
        log::debug!("Window {window_id} joined broadcast channel {}", self.name);
        WindowChannel {
            window_id,
            subscribers: self.subscribers.clone(),
            rx,
        }
    }

    pub fn window_count(&self) -> usize {
        self.subscribers.lock().map(|subscribers| subscribers.len()).unwrap_or(0)
    }

    /// Delivers a raw payload to every joined window.
    pub fn post_raw(&self, payload: &str) {
        deliver(&self.subscribers, payload);
    }
}

fn deliver(subscribers: &Subscribers, payload: &str) {
    let Ok(mut subscribers) = subscribers.lock() else {
        return;
    };
    subscribers.retain(|_, tx| tx.send(payload.to_string()).is_ok());
}

/// One window's handle on a [`BroadcastHub`]. Dropping it leaves the channel.
pub struct WindowChannel {
    window_id: Uuid,
    subscribers: Subscribers,
    rx: Receiver<String>,
}

impl WindowChannel {
    pub fn window_id(&self) -> Uuid {
        self.window_id
    }

    pub fn post(
        &self,
        kind: MessageKind,
        path: Option<&VaultPath>,
        content: Option<&str>,
    ) -> Result<BroadcastMessage, KbaseError> {
        let message = BroadcastMessage {
            kind,
            path: path.cloned(),
            content: content.map(str::to_string),
            timestamp: now_millis(),
            window_id: self.window_id,
        };
        deliver(&self.subscribers, &serde_json::to_string(&message)?);
        Ok(message)
    }

    pub fn note_updated(&self, path: &VaultPath, content: &str) -> Result<BroadcastMessage, KbaseError> {
        self.post(MessageKind::NoteUpdated, Some(path), Some(content))
    }

    pub fn note_selected(&self, path: &VaultPath) -> Result<BroadcastMessage, KbaseError> {
        self.post(MessageKind::NoteSelected, Some(path), None)
    }

    pub fn file_tree_updated(&self) -> Result<BroadcastMessage, KbaseError> {
        self.post(MessageKind::FileTreeUpdated, None, None)
    }

    /// Next message from another window, skipping our own and malformed payloads.
    pub fn try_recv(&self) -> Option<BroadcastMessage> {
        while let Ok(payload) = self.rx.try_recv() {
            match serde_json::from_str::<BroadcastMessage>(&payload) {
                Ok(message) if message.window_id == self.window_id => continue,
                Ok(message) => return Some(message),
                Err(error) => {
                    log::warn!("Dropping malformed broadcast message: {error}");
                }
            }
        }
        None
    }

    pub fn drain(&self) -> Vec<BroadcastMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Drop for WindowChannel {
    fn drop(&mut self) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.remove(&self.window_id);
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or_default()
}
