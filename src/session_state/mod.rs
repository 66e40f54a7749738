//! SessionState - Single-Session Aggregate
//!
//! ## Responsibilities
//!
//! - Hold the acquired Context and the last EmotionSample (wholesale replacement)
//! - Append-only watched-title list
//! - Typed read accessors with the fallback values the backend contract implies
//!
//! Every default used anywhere in the crate is defined in [`defaults`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fallback values for absent remote fields
pub mod defaults {
    pub const CITY: &str = "Unknown";
    pub const WEATHER: &str = "clear";
    pub const TEMPERATURE: f64 = 20.0;
    pub const WEEKDAY: &str = "Unknown";
    pub const LATITUDE: f64 = 0.0;
    pub const LONGITUDE: f64 = 0.0;
    pub const EMOTION: &str = "neutral";
    pub const VOICE_TONE: &str = "neutral";
    /// Backend's own fallback when it cannot score a face
    pub const CONFIDENCE: f64 = 0.5;
    pub const REASONING: &str = "Personalized for your mood, location, and preferences.";
}

/// Day classification reported by the context endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DayStatus {
    #[default]
    Weekday,
    Weekend,
    Holiday,
}

impl DayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayStatus::Weekday => "Weekday",
            DayStatus::Weekend => "Weekend",
            DayStatus::Holiday => "Holiday",
        }
    }

    /// Parse a wire label; unknown labels fall back to Weekday
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "weekend" => DayStatus::Weekend,
            "holiday" => DayStatus::Holiday,
            _ => DayStatus::Weekday,
        }
    }
}

/// Ambient signals for the session. Optional fields are exactly what the
/// backend omitted; use [`Context::view`] for display and request building.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Context {
    pub city: Option<String>,
    pub weather: Option<String>,
    pub temperature: Option<f64>,
    pub today_status: Option<DayStatus>,
    pub tomorrow_status: Option<DayStatus>,
    pub weekday: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Context with every fallback applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextView {
    pub city: String,
    pub weather: String,
    pub temperature: f64,
    pub today_status: DayStatus,
    pub tomorrow_status: DayStatus,
    pub weekday: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for ContextView {
    fn default() -> Self {
        Context::default().view()
    }
}

impl Context {
    pub fn view(&self) -> ContextView {
        ContextView {
            city: non_blank(&self.city).unwrap_or(defaults::CITY).to_string(),
            weather: non_blank(&self.weather)
                .unwrap_or(defaults::WEATHER)
                .to_string(),
            temperature: self
                .temperature
                .filter(|t| t.is_finite())
                .unwrap_or(defaults::TEMPERATURE),
            today_status: self.today_status.unwrap_or_default(),
            tomorrow_status: self.tomorrow_status.unwrap_or_default(),
            weekday: non_blank(&self.weekday)
                .unwrap_or(defaults::WEEKDAY)
                .to_string(),
            latitude: self.latitude.unwrap_or(defaults::LATITUDE),
            longitude: self.longitude.unwrap_or(defaults::LONGITUDE),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// One detected affect reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSample {
    pub emotion: String,
    /// Always within [0, 1]
    pub confidence: f64,
    pub voice_tone: String,
}

impl EmotionSample {
    pub fn new(emotion: impl Into<String>, confidence: f64, voice_tone: impl Into<String>) -> Self {
        Self {
            emotion: emotion.into(),
            confidence,
            voice_tone: voice_tone.into(),
        }
    }

    /// Confidence as a percentage with one decimal, e.g. "90.0%"
    pub fn confidence_label(&self) -> String {
        format!("{:.1}%", self.confidence * 100.0)
    }
}

/// Session aggregate: lives for one visit, dropped on teardown
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    context: Option<Context>,
    emotion: Option<EmotionSample>,
    watched: Vec<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            context: None,
            emotion: None,
            watched: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Replace the context wholesale
    pub fn set_context(&mut self, context: Context) {
        self.context = Some(context);
    }

    /// Replace the emotion sample wholesale
    pub fn set_emotion(&mut self, sample: EmotionSample) {
        self.emotion = Some(sample);
    }

    pub fn record_watched(&mut self, title: impl Into<String>) {
        self.watched.push(title.into());
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    pub fn has_emotion(&self) -> bool {
        self.emotion.is_some()
    }

    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    pub fn emotion(&self) -> Option<&EmotionSample> {
        self.emotion.as_ref()
    }

    pub fn watched(&self) -> &[String] {
        &self.watched
    }

    /// Context with defaults applied (never absent)
    pub fn context_view(&self) -> ContextView {
        self.context.as_ref().map(Context::view).unwrap_or_default()
    }

    pub fn emotion_label(&self) -> &str {
        self.emotion
            .as_ref()
            .map(|e| e.emotion.as_str())
            .filter(|e| !e.is_empty())
            .unwrap_or(defaults::EMOTION)
    }

    pub fn voice_tone_label(&self) -> &str {
        self.emotion
            .as_ref()
            .map(|e| e.voice_tone.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or(defaults::VOICE_TONE)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
