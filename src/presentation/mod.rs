//! Presentation - View State Mapping
//!
//! ## Responsibilities
//!
//! - Map an orchestrator snapshot onto renderable view state
//! - Recommendation cards in backend order; unmatched titles skipped
//! - Detail view addressed by `type=movies|series&id=N`
//! - Notice board: persistent notices stay, transient ones are dismissible
//!
//! Pure functions only. No I/O, no orchestration decisions.

use crate::catalog::{Catalog, CatalogItem, CatalogRef, ListKind};
use crate::event_hub::Notice;
use crate::orchestrator::{OrchestratorSnapshot, OrchestratorState};
use crate::service_gateway::RecommendationResult;
use serde::Serialize;

/// Button label and enablement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ButtonView {
    pub label: &'static str,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextPanel {
    pub city: String,
    pub weather: String,
    pub temperature: String,
    pub day_status: String,
    pub weekday: String,
    pub loaded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionPanel {
    /// Upper-cased emotion label
    pub emotion: String,
    pub confidence: String,
    pub voice_tone: String,
}

/// One renderable recommendation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationCard {
    /// 1-based position in backend order, counting only rendered cards
    pub rank: usize,
    pub title: String,
    pub rating: String,
    pub poster: String,
    pub reference: CatalogRef,
    pub detail_query: String,
}

/// Complete screen state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewState {
    pub state: OrchestratorState,
    pub capture_button: ButtonView,
    pub recommend_button: ButtonView,
    pub can_select: bool,
    pub can_refresh_context: bool,
    pub context: ContextPanel,
    pub emotion: Option<EmotionPanel>,
    pub reasoning: Option<String>,
    pub cards: Vec<RecommendationCard>,
}

pub fn build_view(snapshot: &OrchestratorSnapshot, catalog: &Catalog) -> ViewState {
    let state = snapshot.state;
    let has_context = snapshot.context.is_some();
    let has_emotion = snapshot.emotion.is_some();

    let capture_button = ButtonView {
        label: if matches!(state, OrchestratorState::Capturing | OrchestratorState::Analyzing) {
            "Analyzing..."
        } else {
            "Capture & Analyze"
        },
        enabled: state.is_settled() && snapshot.capture_enabled,
    };
    let recommend_button = ButtonView {
        label: if state == OrchestratorState::Recommending {
            "Getting recommendations..."
        } else {
            "Get Recommendations"
        },
        enabled: state == OrchestratorState::EmotionReady && has_context && has_emotion,
    };

    let view = snapshot.context.clone().unwrap_or_default();
    let context = ContextPanel {
        city: view.city,
        weather: view.weather,
        temperature: format!("{:.1}°C", view.temperature),
        day_status: view.today_status.as_str().to_string(),
        weekday: view.weekday,
        loaded: has_context,
    };

    let emotion = snapshot.emotion.as_ref().map(|sample| EmotionPanel {
        emotion: snapshot.emotion_label.to_uppercase(),
        confidence: sample.confidence_label(),
        voice_tone: snapshot.voice_tone_label.clone(),
    });

    let (reasoning, cards) = match &snapshot.recommendations {
        Some(result) => (
            Some(result.reasoning().to_string()),
            recommendation_cards(result, catalog),
        ),
        None => (None, Vec::new()),
    };

    ViewState {
        state,
        capture_button,
        recommend_button,
        can_select: state == OrchestratorState::RecommendationsReady && !cards.is_empty(),
        can_refresh_context: !has_context
            && !state.is_terminal()
            && state != OrchestratorState::Initializing,
        context,
        emotion,
        reasoning,
        cards,
    }
}

/// Cards in backend order; titles absent from the catalog are skipped
pub fn recommendation_cards(
    result: &RecommendationResult,
    catalog: &Catalog,
) -> Vec<RecommendationCard> {
    result
        .titles
        .iter()
        .filter_map(|title| {
            let resolved = catalog.resolve(title);
            if resolved.is_none() {
                tracing::debug!(title = %title, "Recommended title not in catalog, skipped");
            }
            resolved
        })
        .enumerate()
        .map(|(i, (reference, item))| RecommendationCard {
            rank: i + 1,
            title: item.title.clone(),
            rating: rating_label(item),
            poster: item.poster.clone(),
            reference,
            detail_query: detail_query(reference),
        })
        .collect()
}

fn rating_label(item: &CatalogItem) -> String {
    format!("⭐ {}/10", item.rating)
}

/// Query string addressing the detail view
pub fn detail_query(reference: CatalogRef) -> String {
    format!("type={}&id={}", reference.list.as_str(), reference.index)
}

/// Detail page model
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetailView {
    Found {
        title: String,
        poster: String,
        rating: String,
        description: String,
    },
    NotFound {
        message: String,
    },
}

/// Render the detail view for a `type=...&id=...` query string.
/// A missing `type` selects the primary list; a missing or non-numeric `id`
/// is not found.
pub fn render_detail(catalog: &Catalog, query: &str) -> DetailView {
    let mut list = ListKind::Primary;
    let mut index = None;

    for pair in query.trim_start_matches('?').split('&') {
        match pair.split_once('=') {
            Some(("type", value)) => list = ListKind::from_label(value),
            Some(("id", value)) => index = value.trim().parse::<usize>().ok(),
            _ => {}
        }
    }

    match index.and_then(|index| catalog.get(CatalogRef { list, index })) {
        Some(item) => DetailView::Found {
            title: item.title.clone(),
            poster: item.poster.clone(),
            rating: format!("{}/10", item.rating),
            description: item
                .description
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| "No description available.".to_string()),
        },
        None => DetailView::NotFound {
            message: "Item not found".to_string(),
        },
    }
}

/// Visible status notices
#[derive(Debug, Clone, Default)]
pub struct NoticeBoard {
    persistent: Vec<Notice>,
    transient: Option<Notice>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new transient notice replaces the previous one
    pub fn push(&mut self, notice: Notice) {
        if notice.persistent {
            if !self.persistent.contains(&notice) {
                self.persistent.push(notice);
            }
        } else {
            self.transient = Some(notice);
        }
    }

    /// Dismiss the transient notice; persistent notices cannot be dismissed
    pub fn dismiss(&mut self) -> bool {
        self.transient.take().is_some()
    }

    pub fn visible(&self) -> Vec<&Notice> {
        self.persistent.iter().chain(self.transient.iter()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.persistent.is_empty() && self.transient.is_none()
    }
}
