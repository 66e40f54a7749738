//! Pure orchestration state machine
//!
//! No I/O and no locks: the orchestrator owns one `StateMachine` behind its
//! mutex and calls [`StateMachine::admit`] before starting any operation and
//! [`StateMachine::settle`] when one completes. Every begun capture or
//! recommendation bumps the epoch; a completion whose ticket epoch differs
//! from the current one is stale.

use crate::error::Error;
use serde::Serialize;

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Initializing,
    /// Backend unreachable at startup; nothing but teardown is accepted
    Disabled,
    Idle,
    Capturing,
    Analyzing,
    EmotionReady,
    Recommending,
    RecommendationsReady,
    /// Internal fault sink
    Error,
    Closed,
}

impl OrchestratorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorState::Initializing => "initializing",
            OrchestratorState::Disabled => "disabled",
            OrchestratorState::Idle => "idle",
            OrchestratorState::Capturing => "capturing",
            OrchestratorState::Analyzing => "analyzing",
            OrchestratorState::EmotionReady => "emotion_ready",
            OrchestratorState::Recommending => "recommending",
            OrchestratorState::RecommendationsReady => "recommendations_ready",
            OrchestratorState::Error => "error",
            OrchestratorState::Closed => "closed",
        }
    }

    /// User-actionable resting states
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            OrchestratorState::Idle
                | OrchestratorState::EmotionReady
                | OrchestratorState::RecommendationsReady
        )
    }

    /// A capture or recommendation is in flight
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            OrchestratorState::Capturing
                | OrchestratorState::Analyzing
                | OrchestratorState::Recommending
        )
    }

    /// Only teardown is accepted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestratorState::Disabled | OrchestratorState::Error | OrchestratorState::Closed
        )
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User intents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Capture,
    RequestRecommendations,
    SelectTitle(String),
    RefreshContext,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Capture => "capture",
            Intent::RequestRecommendations => "request_recommendations",
            Intent::SelectTitle(_) => "select_title",
            Intent::RefreshContext => "refresh_context",
        }
    }
}

/// Long-running operation kinds that carry a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Capture,
    Recommend,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Capture => "capture",
            Operation::Recommend => "recommend",
        }
    }
}

/// Admission receipt for an in-flight operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub epoch: u64,
    pub operation: Operation,
}

/// Session facts the machine does not own
#[derive(Debug, Clone, Copy, Default)]
pub struct Facts {
    pub has_context: bool,
    pub has_emotion: bool,
}

/// Why an intent was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("another operation is in progress")]
    Busy,
    #[error("{intent} is not allowed while {state}")]
    NotAllowed {
        intent: &'static str,
        state: OrchestratorState,
    },
    #[error("context has not been loaded yet")]
    MissingContext,
    #[error("no emotion has been detected yet")]
    MissingEmotion,
    #[error("context is already loaded")]
    ContextLoaded,
    #[error("camera is not available")]
    CaptureUnavailable,
    #[error("'{0}' is not one of the current recommendations")]
    UnknownTitle(String),
    #[error("recommendation service is unavailable")]
    Disabled,
    #[error("session is closed")]
    Closed,
}

impl Rejection {
    /// Silent rejections are logged but never shown to the user
    pub fn is_silent(&self) -> bool {
        matches!(self, Rejection::Busy | Rejection::Closed)
    }
}

/// Outcome of an in-flight operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    FrameCaptured,
    /// Snapshot failed without losing the device
    CaptureFailed,
    DeviceLost,
    /// Capture enabled but no live handle
    HandleMissing,
    EmotionDetected,
    EmotionFailed,
    RecommendationsReceived,
    RecommendationsFailed,
}

impl Completion {
    fn operation(&self) -> Operation {
        match self {
            Completion::RecommendationsReceived | Completion::RecommendationsFailed => {
                Operation::Recommend
            }
            _ => Operation::Capture,
        }
    }

    /// State the machine must be in to accept this completion
    fn expects(&self) -> OrchestratorState {
        match self {
            Completion::FrameCaptured
            | Completion::CaptureFailed
            | Completion::DeviceLost
            | Completion::HandleMissing => OrchestratorState::Capturing,
            Completion::EmotionDetected | Completion::EmotionFailed => OrchestratorState::Analyzing,
            Completion::RecommendationsReceived | Completion::RecommendationsFailed => {
                OrchestratorState::Recommending
            }
        }
    }

    fn target(&self) -> OrchestratorState {
        match self {
            Completion::FrameCaptured => OrchestratorState::Analyzing,
            Completion::CaptureFailed | Completion::DeviceLost => OrchestratorState::Idle,
            Completion::HandleMissing => OrchestratorState::Error,
            Completion::EmotionDetected => OrchestratorState::EmotionReady,
            Completion::EmotionFailed => OrchestratorState::Idle,
            Completion::RecommendationsReceived => OrchestratorState::RecommendationsReady,
            Completion::RecommendationsFailed => OrchestratorState::EmotionReady,
        }
    }
}

/// Orchestration state machine
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: OrchestratorState,
    epoch: u64,
    capture_enabled: bool,
    context_in_flight: bool,
    starting: bool,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: OrchestratorState::Initializing,
            epoch: 0,
            capture_enabled: false,
            context_in_flight: false,
            starting: false,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn capture_enabled(&self) -> bool {
        self.capture_enabled
    }

    pub fn context_in_flight(&self) -> bool {
        self.context_in_flight
    }

    /// Claim the startup sequence; `false` once it has been claimed or the
    /// session has left `Initializing`
    pub fn begin_start(&mut self) -> bool {
        if self.starting || self.state != OrchestratorState::Initializing {
            return false;
        }
        self.starting = true;
        true
    }

    /// Health probe result; unhealthy disables the session
    pub fn health_checked(&mut self, healthy: bool) -> OrchestratorState {
        if self.state == OrchestratorState::Initializing && !healthy {
            self.state = OrchestratorState::Disabled;
        }
        self.state
    }

    /// Device acquisition finished; the session becomes usable
    pub fn capture_ready(&mut self, enabled: bool) -> OrchestratorState {
        if self.state == OrchestratorState::Initializing {
            self.capture_enabled = enabled;
            self.state = OrchestratorState::Idle;
        }
        self.state
    }

    /// Mark a context fetch as started; `false` if one is already running
    pub fn begin_context_fetch(&mut self) -> bool {
        if self.context_in_flight || self.state.is_terminal() {
            return false;
        }
        self.context_in_flight = true;
        true
    }

    pub fn context_settled(&mut self) {
        self.context_in_flight = false;
    }

    /// Single admission gate. Returns a ticket for operations that complete
    /// later (capture, recommend) and `None` for immediate ones.
    pub fn admit(&mut self, intent: &Intent, facts: Facts) -> Result<Option<Ticket>, Rejection> {
        match self.state {
            OrchestratorState::Closed => return Err(Rejection::Closed),
            OrchestratorState::Disabled => return Err(Rejection::Disabled),
            OrchestratorState::Initializing | OrchestratorState::Error => {
                return Err(Rejection::NotAllowed {
                    intent: intent.name(),
                    state: self.state,
                })
            }
            _ => {}
        }

        match intent {
            Intent::Capture => {
                if self.state.is_busy() {
                    return Err(Rejection::Busy);
                }
                if !self.capture_enabled {
                    return Err(Rejection::CaptureUnavailable);
                }
                Ok(Some(self.begin(Operation::Capture, OrchestratorState::Capturing)))
            }
            Intent::RequestRecommendations => {
                if self.state.is_busy() {
                    return Err(Rejection::Busy);
                }
                if !facts.has_context {
                    return Err(Rejection::MissingContext);
                }
                if !facts.has_emotion {
                    return Err(Rejection::MissingEmotion);
                }
                if self.state != OrchestratorState::EmotionReady {
                    return Err(Rejection::NotAllowed {
                        intent: intent.name(),
                        state: self.state,
                    });
                }
                Ok(Some(self.begin(Operation::Recommend, OrchestratorState::Recommending)))
            }
            Intent::SelectTitle(_) => {
                if self.state != OrchestratorState::RecommendationsReady {
                    return Err(Rejection::NotAllowed {
                        intent: intent.name(),
                        state: self.state,
                    });
                }
                if !facts.has_context {
                    return Err(Rejection::MissingContext);
                }
                if !facts.has_emotion {
                    return Err(Rejection::MissingEmotion);
                }
                Ok(None)
            }
            Intent::RefreshContext => {
                if facts.has_context {
                    return Err(Rejection::ContextLoaded);
                }
                if !self.begin_context_fetch() {
                    return Err(Rejection::Busy);
                }
                Ok(None)
            }
        }
    }

    fn begin(&mut self, operation: Operation, next: OrchestratorState) -> Ticket {
        self.epoch += 1;
        self.state = next;
        Ticket {
            epoch: self.epoch,
            operation,
        }
    }

    /// Single completion point. A ticket from an older epoch, or a completion
    /// that does not match the current state, is `Error::StaleResult`.
    pub fn settle(
        &mut self,
        ticket: Ticket,
        completion: Completion,
    ) -> Result<OrchestratorState, Error> {
        let stale = ticket.epoch != self.epoch
            || ticket.operation != completion.operation()
            || self.state != completion.expects();
        if stale {
            return Err(Error::StaleResult {
                operation: ticket.operation.as_str(),
                ticket_epoch: ticket.epoch,
                current_epoch: self.epoch,
            });
        }

        if completion == Completion::DeviceLost {
            self.capture_enabled = false;
        }
        self.state = completion.target();
        Ok(self.state)
    }

    /// Close the session; `true` only on the first call
    pub fn teardown(&mut self) -> bool {
        if self.state == OrchestratorState::Closed {
            return false;
        }
        self.state = OrchestratorState::Closed;
        self.epoch += 1;
        self.capture_enabled = false;
        true
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
