//! Orchestrator - Capture-to-Recommendation Pipeline
//!
//! ## Responsibilities
//!
//! - Startup: health probe, device acquisition, detached context fetch
//! - Intent dispatch through the state machine's single admission gate
//! - Capture → detect and recommend sequencing against the gateway
//! - Selection recording with a detached selection log
//! - Stale completion discard (epoch tickets)
//! - Idempotent teardown releasing the capture handle
//!
//! ## Design
//!
//! Admission happens under the session lock before any await, so a second
//! intent issued while an operation is in flight is rejected immediately.
//! The lock is never held across a gateway call. The capture handle lives in
//! its own slot, touched only by the snapshot path and teardown.

pub mod machine;

pub use machine::{
    Completion, Facts, Intent, Operation, OrchestratorState, Rejection, StateMachine, Ticket,
};

use crate::capture_source::{CaptureHandle, CaptureSource, EncodedStill};
use crate::catalog::{Catalog, CatalogRef};
use crate::error::Error;
use crate::event_hub::{EventHub, EventKind, Notice, NoticeKind, OrchestratorEvent};
use crate::service_gateway::{Gateway, RecommendationQuery, RecommendationResult, SelectionRecord};
use crate::session_state::{ContextView, EmotionSample, Session};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const DISABLED_NOTICE: &str = "Recommendation service is unavailable. Please try again later.";

/// Result of dispatching one intent
#[derive(Debug, Clone, PartialEq)]
pub enum IntentOutcome {
    /// Intent ran to completion; carries the resulting state
    Applied(OrchestratorState),
    Rejected(Rejection),
    /// The operation ran and failed; the machine is back in a settled state
    Failed(Error),
    /// Completion arrived after the session moved on and was discarded
    Stale,
    Selected(CatalogRef),
}

impl IntentOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, IntentOutcome::Applied(_) | IntentOutcome::Selected(_))
    }
}

/// Read-only view of the session for presentation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestratorSnapshot {
    pub session_id: Uuid,
    pub state: OrchestratorState,
    pub capture_enabled: bool,
    pub context: Option<ContextView>,
    pub emotion: Option<EmotionSample>,
    /// Emotion label with the session defaults applied
    pub emotion_label: String,
    pub voice_tone_label: String,
    pub recommendations: Option<RecommendationResult>,
    pub watched: Vec<String>,
}

struct Inner {
    machine: StateMachine,
    session: Session,
    recommendations: Option<RecommendationResult>,
}

impl Inner {
    fn facts(&self) -> Facts {
        Facts {
            has_context: self.session.has_context(),
            has_emotion: self.session.has_emotion(),
        }
    }
}

struct Shared {
    session_id: Uuid,
    inner: Mutex<Inner>,
    device: Mutex<Option<CaptureHandle>>,
    gateway: Arc<dyn Gateway>,
    capture: Option<CaptureSource>,
    catalog: Arc<Catalog>,
    hub: Arc<EventHub>,
}

/// Session orchestrator; clones share the same session
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    /// `capture` is `None` when no device is configured
    pub fn new(
        gateway: Arc<dyn Gateway>,
        capture: Option<CaptureSource>,
        catalog: Arc<Catalog>,
        hub: Arc<EventHub>,
    ) -> Self {
        let session = Session::new();
        let session_id = session.id();

        Self {
            shared: Arc::new(Shared {
                session_id,
                inner: Mutex::new(Inner {
                    machine: StateMachine::new(),
                    session,
                    recommendations: None,
                }),
                device: Mutex::new(None),
                gateway,
                capture,
                catalog,
                hub,
            }),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.session_id
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.shared.catalog
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.shared.hub
    }

    pub async fn state(&self) -> OrchestratorState {
        self.shared.inner.lock().await.machine.state()
    }

    pub async fn snapshot(&self) -> OrchestratorSnapshot {
        let inner = self.shared.inner.lock().await;
        OrchestratorSnapshot {
            session_id: self.shared.session_id,
            state: inner.machine.state(),
            capture_enabled: inner.machine.capture_enabled(),
            context: inner.session.context().map(|c| c.view()),
            emotion: inner.session.emotion().cloned(),
            emotion_label: inner.session.emotion_label().to_string(),
            voice_tone_label: inner.session.voice_tone_label().to_string(),
            recommendations: inner.recommendations.clone(),
            watched: inner.session.watched().to_vec(),
        }
    }

    /// Probe the backend, acquire the device and kick off the context fetch.
    /// Only the first call has any effect; later calls return the current state.
    pub async fn start(&self) -> OrchestratorState {
        {
            let mut inner = self.shared.inner.lock().await;
            if !inner.machine.begin_start() {
                return inner.machine.state();
            }
        }

        let healthy = self.shared.gateway.check_health().await;
        tracing::info!(session_id = %self.shared.session_id, healthy, "Backend health checked");

        if !healthy {
            let mut inner = self.shared.inner.lock().await;
            let from = inner.machine.state();
            let to = inner.machine.health_checked(false);
            if to != from {
                self.emit(EventKind::StateChanged { from, to }).await;
                self.notify(NoticeKind::Disabled, DISABLED_NOTICE).await;
            }
            return to;
        }

        if self.state().await == OrchestratorState::Closed {
            tracing::debug!(session_id = %self.shared.session_id, "Closed during startup");
            return OrchestratorState::Closed;
        }

        let acquired = match &self.shared.capture {
            Some(capture) => match capture.acquire().await {
                Ok(handle) => {
                    *self.shared.device.lock().await = Some(handle);
                    true
                }
                Err(e) => {
                    self.notify(NoticeKind::Device, format!("Camera unavailable: {}", e)).await;
                    false
                }
            },
            None => {
                self.notify(NoticeKind::Device, "No camera configured").await;
                false
            }
        };

        let state = {
            let mut inner = self.shared.inner.lock().await;
            let from = inner.machine.state();
            inner.machine.health_checked(true);
            let to = inner.machine.capture_ready(acquired);
            if to != from {
                self.emit(EventKind::StateChanged { from, to }).await;
            }
            if inner.machine.begin_context_fetch() {
                self.spawn_context_fetch();
            }
            to
        };

        tracing::info!(
            session_id = %self.shared.session_id,
            state = %state,
            capture_enabled = acquired,
            "Session started"
        );

        // Teardown may have raced the acquisition
        if state == OrchestratorState::Closed {
            self.release_device().await;
        }

        state
    }

    /// Single entry point for user intents
    pub async fn dispatch(&self, intent: Intent) -> IntentOutcome {
        tracing::debug!(
            session_id = %self.shared.session_id,
            intent = intent.name(),
            "Intent received"
        );
        match intent {
            Intent::Capture => self.capture().await,
            Intent::RequestRecommendations => self.request_recommendations().await,
            Intent::SelectTitle(title) => self.select_title(&title).await,
            Intent::RefreshContext => self.refresh_context().await,
        }
    }

    pub async fn capture(&self) -> IntentOutcome {
        let ticket = {
            let mut inner = self.shared.inner.lock().await;
            let from = inner.machine.state();
            let facts = inner.facts();
            match inner.machine.admit(&Intent::Capture, facts) {
                Ok(Some(ticket)) => {
                    self.emit(EventKind::StateChanged { from, to: inner.machine.state() }).await;
                    ticket
                }
                Ok(None) => return IntentOutcome::Applied(inner.machine.state()),
                Err(rejection) => return self.reject(&Intent::Capture, rejection).await,
            }
        };

        let still = match self.take_snapshot(ticket).await {
            Ok(still) => still,
            Err(outcome) => return outcome,
        };

        if let Err(outcome) = self.settle(ticket, Completion::FrameCaptured).await {
            return outcome;
        }

        let result = self.shared.gateway.detect_emotion(&still).await;

        let mut inner = self.shared.inner.lock().await;
        match result {
            Ok(sample) => {
                let settled = self
                    .settle_locked(&mut inner, ticket, Completion::EmotionDetected)
                    .await;
                let to = match settled {
                    Ok(to) => to,
                    Err(outcome) => return outcome,
                };
                tracing::info!(
                    session_id = %self.shared.session_id,
                    emotion = %sample.emotion,
                    confidence = sample.confidence,
                    "Emotion detected"
                );
                inner.session.set_emotion(sample.clone());
                self.emit(EventKind::EmotionDetected(sample)).await;
                IntentOutcome::Applied(to)
            }
            Err(e) => {
                let settled = self
                    .settle_locked(&mut inner, ticket, Completion::EmotionFailed)
                    .await;
                if let Err(outcome) = settled {
                    return outcome;
                }
                tracing::warn!(
                    session_id = %self.shared.session_id,
                    error = %e,
                    error_code = e.code(),
                    "Emotion detection failed"
                );
                self.notify_error(&e, "Could not detect emotion").await;
                IntentOutcome::Failed(e)
            }
        }
    }

    /// Grab a still under the device slot; failures settle the ticket here
    async fn take_snapshot(
        &self,
        ticket: Ticket,
    ) -> std::result::Result<EncodedStill, IntentOutcome> {
        let shot = {
            let mut slot = self.shared.device.lock().await;
            match (self.shared.capture.as_ref(), slot.as_mut()) {
                (Some(capture), Some(handle)) => Some(capture.snapshot(handle).await),
                _ => None,
            }
        };

        match shot {
            Some(Ok(still)) => Ok(still),
            None => {
                let e = Error::Internal("capture enabled without a live device handle".to_string());
                tracing::error!(session_id = %self.shared.session_id, error = %e, "Capture fault");
                self.settle(ticket, Completion::HandleMissing).await?;
                self.notify(NoticeKind::Error, "Camera fault. Please reload the session.").await;
                Err(IntentOutcome::Failed(e))
            }
            Some(Err(e @ Error::Device(_))) => {
                tracing::warn!(
                    session_id = %self.shared.session_id,
                    error = %e,
                    "Capture device lost"
                );
                self.release_device().await;
                self.settle(ticket, Completion::DeviceLost).await?;
                self.notify(NoticeKind::Device, format!("Camera lost: {}", e)).await;
                Err(IntentOutcome::Failed(e))
            }
            Some(Err(e)) => {
                tracing::warn!(
                    session_id = %self.shared.session_id,
                    error = %e,
                    error_code = e.code(),
                    "Snapshot failed"
                );
                self.settle(ticket, Completion::CaptureFailed).await?;
                self.notify_error(&e, "Could not capture image").await;
                Err(IntentOutcome::Failed(e))
            }
        }
    }

    pub async fn request_recommendations(&self) -> IntentOutcome {
        let (ticket, query) = {
            let mut inner = self.shared.inner.lock().await;
            // Built before admission; `has_emotion` comes from the query itself
            let query = inner.session.emotion().cloned().map(|emotion| RecommendationQuery {
                emotion,
                context: inner.session.context_view(),
                watched: inner.session.watched().to_vec(),
                available: self.shared.catalog.titles(),
            });
            let facts = Facts {
                has_context: inner.session.has_context(),
                has_emotion: query.is_some(),
            };

            let from = inner.machine.state();
            let admitted = inner.machine.admit(&Intent::RequestRecommendations, facts);
            match (admitted, query) {
                (Ok(Some(ticket)), Some(query)) => {
                    self.emit(EventKind::StateChanged { from, to: inner.machine.state() }).await;
                    (ticket, query)
                }
                (Ok(Some(ticket)), None) => {
                    // Hand the ticket straight back so the machine never stays busy
                    let returned = inner.machine.settle(ticket, Completion::RecommendationsFailed);
                    if let Err(e) = returned {
                        tracing::error!(error = %e, "Unsent recommendation ticket not settled");
                    }
                    drop(inner);
                    return self
                        .reject(&Intent::RequestRecommendations, Rejection::MissingEmotion)
                        .await;
                }
                (Ok(None), _) => return IntentOutcome::Applied(inner.machine.state()),
                (Err(rejection), _) => {
                    drop(inner);
                    return self.reject(&Intent::RequestRecommendations, rejection).await;
                }
            }
        };

        tracing::info!(
            session_id = %self.shared.session_id,
            emotion = %query.emotion.emotion,
            watched = query.watched.len(),
            "Requesting recommendations"
        );
        let result = self.shared.gateway.fetch_recommendations(&query).await;

        let mut inner = self.shared.inner.lock().await;
        match result {
            Ok(result) => {
                let to = match self
                    .settle_locked(&mut inner, ticket, Completion::RecommendationsReceived)
                    .await
                {
                    Ok(to) => to,
                    Err(outcome) => return outcome,
                };
                tracing::info!(
                    session_id = %self.shared.session_id,
                    count = result.titles.len(),
                    "Recommendations ready"
                );
                inner.recommendations = Some(result.clone());
                self.emit(EventKind::RecommendationsReady(result)).await;
                IntentOutcome::Applied(to)
            }
            Err(e) => {
                if let Err(outcome) = self
                    .settle_locked(&mut inner, ticket, Completion::RecommendationsFailed)
                    .await
                {
                    return outcome;
                }
                tracing::warn!(
                    session_id = %self.shared.session_id,
                    error = %e,
                    error_code = e.code(),
                    "Recommendation request failed"
                );
                self.notify_error(&e, "Could not load recommendations").await;
                IntentOutcome::Failed(e)
            }
        }
    }

    pub async fn select_title(&self, title: &str) -> IntentOutcome {
        let intent = Intent::SelectTitle(title.to_string());
        let mut inner = self.shared.inner.lock().await;
        let emotion = inner.session.emotion().cloned();
        let facts = Facts {
            has_context: inner.session.has_context(),
            has_emotion: emotion.is_some(),
        };
        let emotion = match (inner.machine.admit(&intent, facts), emotion) {
            (Ok(_), Some(emotion)) => emotion,
            (Ok(_), None) => {
                drop(inner);
                return self.reject(&intent, Rejection::MissingEmotion).await;
            }
            (Err(rejection), _) => {
                drop(inner);
                return self.reject(&intent, rejection).await;
            }
        };

        let in_result = inner
            .recommendations
            .as_ref()
            .map(|r| r.contains(title))
            .unwrap_or(false);
        let resolved = self
            .shared
            .catalog
            .resolve(title)
            .map(|(reference, item)| (reference, item.title.clone()));
        let (reference, canonical) = match resolved {
            Some(found) if in_result => found,
            _ => {
                drop(inner);
                return self.reject(&intent, Rejection::UnknownTitle(title.to_string())).await;
            }
        };

        inner.session.record_watched(canonical.clone());
        let record = SelectionRecord {
            title: canonical.clone(),
            emotion,
            context: inner.session.context_view(),
        };

        tracing::info!(
            session_id = %self.shared.session_id,
            title = %canonical,
            reference = %reference,
            "Title selected"
        );
        self.emit(EventKind::TitleSelected {
            title: canonical,
            reference,
        })
        .await;
        drop(inner);

        let gateway = self.shared.gateway.clone();
        let session_id = self.shared.session_id;
        tokio::spawn(async move {
            if !gateway.log_selection(&record).await {
                tracing::debug!(
                    session_id = %session_id,
                    title = %record.title,
                    "Selection log not recorded"
                );
            }
        });

        IntentOutcome::Selected(reference)
    }

    /// User-initiated retry of a failed context fetch
    pub async fn refresh_context(&self) -> IntentOutcome {
        let mut inner = self.shared.inner.lock().await;
        let facts = inner.facts();
        match inner.machine.admit(&Intent::RefreshContext, facts) {
            Ok(_) => {
                self.spawn_context_fetch();
                IntentOutcome::Applied(inner.machine.state())
            }
            Err(rejection) => {
                drop(inner);
                self.reject(&Intent::RefreshContext, rejection).await
            }
        }
    }

    fn spawn_context_fetch(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            this.run_context_fetch().await;
        });
    }

    async fn run_context_fetch(&self) {
        let result = self.shared.gateway.fetch_context().await;

        let mut inner = self.shared.inner.lock().await;
        inner.machine.context_settled();
        if inner.machine.state() == OrchestratorState::Closed {
            tracing::debug!(
                session_id = %self.shared.session_id,
                "Context arrived after teardown, discarded"
            );
            return;
        }

        match result {
            Ok(context) => {
                let view = context.view();
                tracing::info!(
                    session_id = %self.shared.session_id,
                    city = %view.city,
                    weather = %view.weather,
                    temperature = view.temperature,
                    "Context loaded"
                );
                inner.session.set_context(context);
                self.emit(EventKind::ContextUpdated(view)).await;
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %self.shared.session_id,
                    error = %e,
                    error_code = e.code(),
                    "Context fetch failed"
                );
                self.notify_error(&e, "Could not load context").await;
            }
        }
    }

    /// Close the session and release the device. Returns `true` on the first call.
    pub async fn teardown(&self) -> bool {
        let first = {
            let mut inner = self.shared.inner.lock().await;
            let from = inner.machine.state();
            let first = inner.machine.teardown();
            if first {
                self.emit(EventKind::StateChanged {
                    from,
                    to: OrchestratorState::Closed,
                })
                .await;
            }
            first
        };

        let released = self.release_device().await;
        if first {
            tracing::info!(
                session_id = %self.shared.session_id,
                released,
                events = self.shared.hub.sent_count(),
                "Session closed"
            );
        }
        first
    }

    async fn release_device(&self) -> bool {
        let handle = self.shared.device.lock().await.take();
        match (handle, self.shared.capture.as_ref()) {
            (Some(handle), Some(capture)) => capture.release(handle),
            (Some(mut handle), None) => handle.release(),
            (None, _) => false,
        }
    }

    async fn settle(
        &self,
        ticket: Ticket,
        completion: Completion,
    ) -> std::result::Result<OrchestratorState, IntentOutcome> {
        let mut inner = self.shared.inner.lock().await;
        self.settle_locked(&mut inner, ticket, completion).await
    }

    async fn settle_locked(
        &self,
        inner: &mut Inner,
        ticket: Ticket,
        completion: Completion,
    ) -> std::result::Result<OrchestratorState, IntentOutcome> {
        let from = inner.machine.state();
        match inner.machine.settle(ticket, completion) {
            Ok(to) => {
                self.emit(EventKind::StateChanged { from, to }).await;
                Ok(to)
            }
            Err(e) => {
                tracing::debug!(
                    session_id = %self.shared.session_id,
                    completion = ?completion,
                    error = %e,
                    "Stale completion discarded"
                );
                Err(IntentOutcome::Stale)
            }
        }
    }

    async fn reject(&self, intent: &Intent, rejection: Rejection) -> IntentOutcome {
        tracing::debug!(
            session_id = %self.shared.session_id,
            intent = intent.name(),
            reason = %rejection,
            "Intent rejected"
        );
        if !rejection.is_silent() {
            let kind = match rejection {
                Rejection::Disabled => NoticeKind::Disabled,
                Rejection::CaptureUnavailable => NoticeKind::Device,
                _ => NoticeKind::Rejected,
            };
            self.notify(kind, capitalize(&rejection.to_string())).await;
        }
        IntentOutcome::Rejected(rejection)
    }

    async fn notify_error(&self, error: &Error, prefix: &str) {
        let kind = match error {
            Error::Network(_) => NoticeKind::Network,
            Error::Validation(_) | Error::Image(_) | Error::Serialization(_) => {
                NoticeKind::Validation
            }
            Error::Device(_) => NoticeKind::Device,
            Error::StaleResult { .. } => NoticeKind::Info,
            Error::Config(_) | Error::Io(_) | Error::Internal(_) => NoticeKind::Error,
        };
        self.notify(kind, format!("{}: {}", prefix, error)).await;
    }

    async fn notify(&self, kind: NoticeKind, message: impl Into<String>) {
        self.emit(EventKind::Notice(Notice::new(kind, message))).await;
    }

    async fn emit(&self, kind: EventKind) {
        if let EventKind::StateChanged { from, to } = &kind {
            tracing::debug!(
                session_id = %self.shared.session_id,
                from = %from,
                to = %to,
                "State changed"
            );
        }
        self.shared
            .hub
            .broadcast(OrchestratorEvent::new(self.shared.session_id, kind))
            .await;
    }
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
