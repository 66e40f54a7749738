//! Moodflix Client Library
//!
//! Capture-to-recommendation orchestrator for the Moodflix backend
//!
//! ## Architecture (7 Components)
//!
//! 1. ServiceGateway - Backend adapter (health, context, emotion, recommend, log)
//! 2. CaptureSource - Camera acquisition and JPEG still snapshots
//! 3. SessionState - Context, emotion sample and watched list for one session
//! 4. Catalog - Static two-list title catalog
//! 5. Orchestrator - State machine sequencing capture, detection and recommendation
//! 6. EventHub - Event fan-out to presentation subscribers
//! 7. Presentation - Pure view-state mapping
//!
//! ## Design Principles
//!
//! - One in-flight capture-or-recommend operation per session
//! - Completions carry epoch tickets; stale ones are discarded
//! - Fallback values live in one place (`session_state::defaults`)

pub mod capture_source;
pub mod catalog;
pub mod event_hub;
pub mod orchestrator;
pub mod presentation;
pub mod service_gateway;
pub mod session_state;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use orchestrator::{Intent, IntentOutcome, Orchestrator, OrchestratorState};
pub use state::{AppConfig, AppState};
