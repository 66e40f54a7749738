//! EventHub - Orchestrator Event Distribution
//!
//! ## Responsibilities
//!
//! - Subscriber registration (one unbounded channel per subscriber)
//! - Fan-out of orchestrator events to every live subscriber
//! - Pruning of subscribers whose receiver was dropped
//!
//! Events are typed; `OrchestratorEvent::to_json` is available for
//! subscribers that forward them over a text transport.

use crate::catalog::CatalogRef;
use crate::orchestrator::OrchestratorState;
use crate::service_gateway::RecommendationResult;
use crate::session_state::{ContextView, EmotionSample};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Notice category shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Backend unreachable at startup
    Disabled,
    /// Capture device denied, absent or lost
    Device,
    /// Internal fault; the session only accepts teardown
    Error,
    Network,
    Validation,
    /// Intent refused by the state machine
    Rejected,
    Info,
}

impl NoticeKind {
    pub fn is_persistent(&self) -> bool {
        matches!(self, NoticeKind::Disabled | NoticeKind::Device | NoticeKind::Error)
    }
}

/// User-facing status message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub persistent: bool,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            persistent: kind.is_persistent(),
        }
    }
}

/// Event payloads
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StateChanged {
        from: OrchestratorState,
        to: OrchestratorState,
    },
    ContextUpdated(ContextView),
    EmotionDetected(EmotionSample),
    RecommendationsReady(RecommendationResult),
    TitleSelected {
        title: String,
        reference: CatalogRef,
    },
    Notice(Notice),
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::StateChanged { .. } => "state_changed",
            EventKind::ContextUpdated(_) => "context_updated",
            EventKind::EmotionDetected(_) => "emotion_detected",
            EventKind::RecommendationsReady(_) => "recommendations_ready",
            EventKind::TitleSelected { .. } => "title_selected",
            EventKind::Notice(_) => "notice",
        }
    }
}

/// Timestamped event for one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestratorEvent {
    pub session_id: Uuid,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl OrchestratorEvent {
    pub fn new(session_id: Uuid, kind: EventKind) -> Self {
        Self {
            session_id,
            at: Utc::now(),
            kind,
        }
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// EventHub instance
pub struct EventHub {
    subscribers: RwLock<HashMap<Uuid, mpsc::UnboundedSender<OrchestratorEvent>>>,
    sent: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            sent: AtomicU64::new(0),
        }
    }

    pub async fn subscribe(&self) -> (Uuid, mpsc::UnboundedReceiver<OrchestratorEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().await.insert(id, tx);

        tracing::debug!(subscriber_id = %id, "Subscriber registered");
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: &Uuid) {
        if self.subscribers.write().await.remove(id).is_some() {
            tracing::debug!(subscriber_id = %id, "Subscriber removed");
        }
    }

    pub async fn broadcast(&self, event: OrchestratorEvent) {
        tracing::debug!(event_type = event.kind.name(), "Broadcasting event");

        let mut dead = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for (id, tx) in subscribers.iter() {
                if tx.send(event.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }
        self.sent.fetch_add(1, Ordering::Relaxed);

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in dead {
                subscribers.remove(&id);
                tracing::debug!(subscriber_id = %id, "Subscriber dropped, pruned");
            }
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Events broadcast since creation
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
