//! Backend wire types and their mapping onto session types

use crate::error::{Error, Result};
use crate::session_state::{defaults, Context, ContextView, DayStatus, EmotionSample};
use serde::{Deserialize, Serialize};

/// GET /context response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextResponse {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub weather: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub today_status: Option<String>,
    #[serde(default)]
    pub tomorrow_status: Option<String>,
    #[serde(default)]
    pub weekday: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl From<ContextResponse> for Context {
    fn from(resp: ContextResponse) -> Self {
        Context {
            city: resp.city,
            weather: resp.weather,
            temperature: resp.temperature,
            today_status: resp.today_status.as_deref().map(DayStatus::from_label),
            tomorrow_status: resp.tomorrow_status.as_deref().map(DayStatus::from_label),
            weekday: resp.weekday,
            latitude: resp.latitude,
            longitude: resp.longitude,
        }
    }
}

/// POST /emotion request
#[derive(Debug, Clone, Serialize)]
pub struct EmotionRequest {
    /// Bare base64 JPEG, no data-URI prefix
    pub image: String,
}

/// POST /emotion response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmotionResponse {
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub voice_tone: Option<String>,
}

impl TryFrom<EmotionResponse> for EmotionSample {
    type Error = Error;

    fn try_from(resp: EmotionResponse) -> Result<Self> {
        let confidence = resp.confidence.unwrap_or(defaults::CONFIDENCE);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::Validation(format!(
                "emotion confidence {} outside [0, 1]",
                confidence
            )));
        }

        let emotion = resp
            .emotion
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| defaults::EMOTION.to_string());
        let voice_tone = resp
            .voice_tone
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| defaults::VOICE_TONE.to_string());

        Ok(EmotionSample {
            emotion,
            confidence,
            voice_tone,
        })
    }
}

/// Inputs for a recommendation request, snapshotted at admission time
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationQuery {
    pub emotion: EmotionSample,
    pub context: ContextView,
    pub watched: Vec<String>,
    /// Full known-catalog allow-list
    pub available: Vec<String>,
}

/// POST /recommend request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendRequest {
    pub emotion: String,
    pub weather: String,
    pub temperature: f64,
    pub city: String,
    pub today_status: String,
    pub watched_movies: Vec<String>,
    pub voice_tone: String,
    pub available_movies: Vec<String>,
}

impl From<&RecommendationQuery> for RecommendRequest {
    fn from(query: &RecommendationQuery) -> Self {
        Self {
            emotion: query.emotion.emotion.clone(),
            weather: query.context.weather.clone(),
            temperature: query.context.temperature,
            city: query.context.city.clone(),
            today_status: query.context.today_status.as_str().to_string(),
            watched_movies: query.watched.clone(),
            voice_tone: query.emotion.voice_tone.clone(),
            available_movies: query.available.clone(),
        }
    }
}

/// POST /recommend response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendResponse {
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Ranked titles from the backend; order is relevance order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub titles: Vec<String>,
    pub reasoning: Option<String>,
}

impl RecommendationResult {
    pub fn reasoning(&self) -> &str {
        self.reasoning
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(defaults::REASONING)
    }

    pub fn contains(&self, title: &str) -> bool {
        let needle = title.trim().to_lowercase();
        self.titles.iter().any(|t| t.trim().to_lowercase() == needle)
    }
}

impl From<RecommendResponse> for RecommendationResult {
    fn from(resp: RecommendResponse) -> Self {
        Self {
            titles: resp.recommendations,
            reasoning: resp.reasoning,
        }
    }
}

/// Inputs for the selection log
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionRecord {
    pub title: String,
    pub emotion: EmotionSample,
    pub context: ContextView,
}

/// POST /log-selection request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogSelectionRequest {
    pub movie: String,
    pub mood: String,
    pub voice_tone: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub today_status: String,
    pub tomorrow_status: String,
    pub weekday: String,
    pub weather: String,
    pub temperature: f64,
}

impl From<&SelectionRecord> for LogSelectionRequest {
    fn from(record: &SelectionRecord) -> Self {
        Self {
            movie: record.title.clone(),
            mood: record.emotion.emotion.clone(),
            voice_tone: record.emotion.voice_tone.clone(),
            city: record.context.city.clone(),
            latitude: record.context.latitude,
            longitude: record.context.longitude,
            today_status: record.context.today_status.as_str().to_string(),
            tomorrow_status: record.context.tomorrow_status.as_str().to_string(),
            weekday: record.context.weekday.clone(),
            weather: record.context.weather.clone(),
            temperature: record.context.temperature,
        }
    }
}
