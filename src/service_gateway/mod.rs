//! ServiceGateway - Recommendation Backend Adapter
//!
//! ## Responsibilities
//!
//! - Health probe, context fetch, emotion detection, recommendation, selection log
//! - Map wire responses onto session types (fallbacks, confidence bounds)
//! - Reject empty payloads before they leave the process
//! - Single attempt per call; retries are the caller's decision

pub mod types;

pub use types::{
    ContextResponse, EmotionRequest, EmotionResponse, LogSelectionRequest, RecommendRequest,
    RecommendResponse, RecommendationQuery, RecommendationResult, SelectionRecord,
};

use crate::capture_source::EncodedStill;
use crate::error::{Error, Result};
use crate::session_state::{Context, EmotionSample};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Default backend base URL
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";

/// Backend operations the orchestrator depends on
#[async_trait]
pub trait Gateway: Send + Sync {
    /// `true` only on a 2xx reply; every failure maps to `false`
    async fn check_health(&self) -> bool;

    async fn fetch_context(&self) -> Result<Context>;

    async fn detect_emotion(&self, still: &EncodedStill) -> Result<EmotionSample>;

    /// An empty title list is reported as a failure
    async fn fetch_recommendations(
        &self,
        query: &RecommendationQuery,
    ) -> Result<RecommendationResult>;

    /// Fire-and-forget; `false` on any failure
    async fn log_selection(&self, record: &SelectionRecord) -> bool;
}

/// reqwest-backed gateway
pub struct ServiceGateway {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ServiceGateway {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(Error::Network(format!("GET {} failed: {}", path, resp.status())));
        }

        Ok(resp.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.post(&url).json(body).send().await?;

        if !resp.status().is_success() {
            return Err(Error::Network(format!("POST {} failed: {}", path, resp.status())));
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Gateway for ServiceGateway {
    async fn check_health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, url = %url, "Health probe failed");
                false
            }
        }
    }

    async fn fetch_context(&self) -> Result<Context> {
        let resp: ContextResponse = self.get_json("/context").await?;
        let context = Context::from(resp);

        tracing::debug!(
            city = ?context.city,
            weather = ?context.weather,
            "Context fetched"
        );

        Ok(context)
    }

    async fn detect_emotion(&self, still: &EncodedStill) -> Result<EmotionSample> {
        if still.is_empty() {
            return Err(Error::Validation("still image is empty".to_string()));
        }

        let request = EmotionRequest {
            image: still.to_base64(),
        };
        let resp: EmotionResponse = self.post_json("/emotion", &request).await?;
        let sample = EmotionSample::try_from(resp)?;

        tracing::debug!(
            emotion = %sample.emotion,
            confidence = sample.confidence,
            voice_tone = %sample.voice_tone,
            "Emotion detected"
        );

        Ok(sample)
    }

    async fn fetch_recommendations(
        &self,
        query: &RecommendationQuery,
    ) -> Result<RecommendationResult> {
        let request = RecommendRequest::from(query);
        let resp: RecommendResponse = self.post_json("/recommend", &request).await?;

        if resp.recommendations.is_empty() {
            return Err(Error::Validation("backend returned no recommendations".to_string()));
        }

        let result = RecommendationResult::from(resp);
        tracing::debug!(count = result.titles.len(), "Recommendations received");
        Ok(result)
    }

    async fn log_selection(&self, record: &SelectionRecord) -> bool {
        let request = LogSelectionRequest::from(record);
        let url = format!("{}/log-selection", self.base_url);

        match self.client.post(&url).json(&request).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!(
                    status = %resp.status(),
                    title = %record.title,
                    "Selection log rejected"
                );
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, title = %record.title, "Selection log failed");
                false
            }
        }
    }
}
