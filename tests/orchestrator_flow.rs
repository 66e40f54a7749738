//! End-to-end orchestrator flows against in-process gateway and camera doubles

use async_trait::async_trait;
use image::DynamicImage;
use moodflix_client::capture_source::{CaptureDevice, CaptureSource, EncodedStill, LiveStream};
use moodflix_client::catalog::{Catalog, CatalogRef, ListKind};
use moodflix_client::event_hub::{EventHub, EventKind, NoticeKind};
use moodflix_client::orchestrator::{
    Intent, IntentOutcome, Orchestrator, OrchestratorState, Rejection,
};
use moodflix_client::presentation;
use moodflix_client::service_gateway::{
    Gateway, RecommendationQuery, RecommendationResult, SelectionRecord,
};
use moodflix_client::session_state::{Context, EmotionSample};
use moodflix_client::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

struct FakeGateway {
    healthy: bool,
    context_failures: AtomicUsize,
    calls: Mutex<Vec<&'static str>>,
    health_gate: Option<Arc<Semaphore>>,
    detect_gate: Option<Arc<Semaphore>>,
    recommend_gate: Option<Arc<Semaphore>>,
    recommendations: Vec<String>,
    queries: Mutex<Vec<RecommendationQuery>>,
    logged: Mutex<Vec<SelectionRecord>>,
}

impl FakeGateway {
    fn new() -> Self {
        Self {
            healthy: true,
            context_failures: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            health_gate: None,
            detect_gate: None,
            recommend_gate: None,
            recommendations: vec!["Dude".to_string(), "Microcosm".to_string()],
            queries: Mutex::new(Vec::new()),
            logged: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn check_health(&self) -> bool {
        self.record("health");
        if let Some(gate) = &self.health_gate {
            if gate.acquire().await.is_err() {
                return false;
            }
        }
        self.healthy
    }

    async fn fetch_context(&self) -> Result<Context> {
        self.record("context");
        let remaining = self.context_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.context_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Network("GET /context failed: 502 Bad Gateway".to_string()));
        }
        Ok(Context {
            city: Some("Austin".to_string()),
            weather: Some("sunny".to_string()),
            temperature: Some(28.0),
            ..Default::default()
        })
    }

    async fn detect_emotion(&self, still: &EncodedStill) -> Result<EmotionSample> {
        self.record("emotion");
        assert!(!still.is_empty());
        if let Some(gate) = &self.detect_gate {
            let _permit = gate.acquire().await.map_err(|e| Error::Internal(e.to_string()))?;
        }
        Ok(EmotionSample::new("happy", 0.9, "upbeat"))
    }

    async fn fetch_recommendations(
        &self,
        query: &RecommendationQuery,
    ) -> Result<RecommendationResult> {
        self.record("recommend");
        self.queries.lock().unwrap().push(query.clone());
        if let Some(gate) = &self.recommend_gate {
            let _permit = gate.acquire().await.map_err(|e| Error::Internal(e.to_string()))?;
        }
        if self.recommendations.is_empty() {
            return Err(Error::Validation("backend returned no recommendations".to_string()));
        }
        Ok(RecommendationResult {
            titles: self.recommendations.clone(),
            reasoning: Some("Sunny and upbeat".to_string()),
        })
    }

    async fn log_selection(&self, record: &SelectionRecord) -> bool {
        self.record("log");
        self.logged.lock().unwrap().push(record.clone());
        true
    }
}

#[derive(Default)]
struct CameraStats {
    opens: AtomicUsize,
    stops: AtomicUsize,
    lose_device: AtomicBool,
}

struct FakeStream {
    stats: Arc<CameraStats>,
}

#[async_trait]
impl LiveStream for FakeStream {
    async fn frame(&mut self) -> Result<DynamicImage> {
        if self.stats.lose_device.load(Ordering::SeqCst) {
            return Err(Error::Device("camera unplugged".to_string()));
        }
        Ok(DynamicImage::new_rgb8(8, 6))
    }

    fn stop(&mut self) {
        self.stats.stops.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeCamera {
    stats: Arc<CameraStats>,
}

#[async_trait]
impl CaptureDevice for FakeCamera {
    fn describe(&self) -> String {
        "fake-camera".to_string()
    }

    async fn open(&self) -> Result<Box<dyn LiveStream>> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            stats: self.stats.clone(),
        }))
    }
}

struct Harness {
    orchestrator: Orchestrator,
    gateway: Arc<FakeGateway>,
    camera: Arc<CameraStats>,
    catalog: Arc<Catalog>,
    hub: Arc<EventHub>,
}

fn harness(gateway: FakeGateway) -> Harness {
    let gateway = Arc::new(gateway);
    let camera = Arc::new(CameraStats::default());
    let catalog = Arc::new(Catalog::default());
    let hub = Arc::new(EventHub::new());
    let capture = CaptureSource::new(Arc::new(FakeCamera {
        stats: camera.clone(),
    }));
    let orchestrator =
        Orchestrator::new(gateway.clone(), Some(capture), catalog.clone(), hub.clone());
    Harness {
        orchestrator,
        gateway,
        camera,
        catalog,
        hub,
    }
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn wait_for_context(orch: &Orchestrator) {
    wait_until(move || async move { orch.snapshot().await.context.is_some() }).await;
}

async fn wait_for_state(orch: &Orchestrator, state: OrchestratorState) {
    wait_until(move || async move { orch.state().await == state }).await;
}

async fn wait_for_calls(gateway: &FakeGateway, name: &'static str, count: usize) {
    wait_until(move || async move { gateway.calls(name) == count }).await;
}

async fn to_emotion_ready(h: &Harness) {
    assert_eq!(h.orchestrator.start().await, OrchestratorState::Idle);
    wait_for_context(&h.orchestrator).await;
    assert_eq!(
        h.orchestrator.dispatch(Intent::Capture).await,
        IntentOutcome::Applied(OrchestratorState::EmotionReady)
    );
}

#[tokio::test]
async fn test_rapid_captures_issue_one_detect_call() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(FakeGateway {
        detect_gate: Some(gate.clone()),
        ..FakeGateway::new()
    });
    h.orchestrator.start().await;

    let first = {
        let orch = h.orchestrator.clone();
        tokio::spawn(async move { orch.dispatch(Intent::Capture).await })
    };
    wait_for_state(&h.orchestrator, OrchestratorState::Analyzing).await;

    for _ in 0..5 {
        assert_eq!(
            h.orchestrator.dispatch(Intent::Capture).await,
            IntentOutcome::Rejected(Rejection::Busy)
        );
    }

    gate.add_permits(1);
    let outcome = first.await.unwrap();
    assert_eq!(outcome, IntentOutcome::Applied(OrchestratorState::EmotionReady));
    assert_eq!(h.gateway.calls("emotion"), 1);
}

#[tokio::test]
async fn test_recommend_rejected_without_context() {
    let h = harness(FakeGateway {
        context_failures: AtomicUsize::new(1),
        ..FakeGateway::new()
    });
    h.orchestrator.start().await;
    wait_for_calls(&h.gateway, "context", 1).await;
    h.orchestrator.dispatch(Intent::Capture).await;
    assert_eq!(h.orchestrator.state().await, OrchestratorState::EmotionReady);

    let outcome = h.orchestrator.dispatch(Intent::RequestRecommendations).await;
    assert_eq!(outcome, IntentOutcome::Rejected(Rejection::MissingContext));
    assert_eq!(h.gateway.calls("recommend"), 0);
    assert_eq!(h.orchestrator.state().await, OrchestratorState::EmotionReady);
}

#[tokio::test]
async fn test_recommend_rejected_without_emotion() {
    let h = harness(FakeGateway::new());
    h.orchestrator.start().await;
    wait_for_context(&h.orchestrator).await;

    let outcome = h.orchestrator.dispatch(Intent::RequestRecommendations).await;
    assert_eq!(outcome, IntentOutcome::Rejected(Rejection::MissingEmotion));
    assert_eq!(h.gateway.calls("recommend"), 0);
}

#[tokio::test]
async fn test_health_failure_disables_session() {
    let h = harness(FakeGateway {
        healthy: false,
        ..FakeGateway::new()
    });
    let (_, mut events) = h.hub.subscribe().await;

    assert_eq!(h.orchestrator.start().await, OrchestratorState::Disabled);
    assert_eq!(
        h.orchestrator.dispatch(Intent::Capture).await,
        IntentOutcome::Rejected(Rejection::Disabled)
    );
    assert_eq!(
        h.orchestrator.dispatch(Intent::RequestRecommendations).await,
        IntentOutcome::Rejected(Rejection::Disabled)
    );
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.camera.opens.load(Ordering::SeqCst), 0);
    assert_eq!(h.gateway.calls.lock().unwrap().as_slice(), &["health"]);

    let mut saw_persistent = false;
    while let Ok(event) = events.try_recv() {
        if let EventKind::Notice(notice) = event.kind {
            if notice.kind == NoticeKind::Disabled {
                saw_persistent = notice.persistent;
            }
        }
    }
    assert!(saw_persistent);
}

#[tokio::test]
async fn test_happy_path_sends_emotion_and_full_catalog() {
    let h = harness(FakeGateway::new());
    to_emotion_ready(&h).await;

    let snapshot = h.orchestrator.snapshot().await;
    let emotion = snapshot.emotion.unwrap();
    assert_eq!(emotion.emotion, "happy");
    assert_eq!(emotion.confidence, 0.9);

    let outcome = h.orchestrator.dispatch(Intent::RequestRecommendations).await;
    assert_eq!(outcome, IntentOutcome::Applied(OrchestratorState::RecommendationsReady));

    let queries = h.gateway.queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].emotion.emotion, "happy");
    assert_eq!(queries[0].emotion.voice_tone, "upbeat");
    assert_eq!(queries[0].context.city, "Austin");
    assert_eq!(queries[0].available, h.catalog.titles());
    assert_eq!(queries[0].available.len(), 7);
}

#[tokio::test]
async fn test_unmatched_recommendation_skipped_and_not_selectable() {
    let h = harness(FakeGateway {
        recommendations: vec!["Dude".to_string(), "Unknown Title".to_string()],
        ..FakeGateway::new()
    });
    to_emotion_ready(&h).await;
    h.orchestrator.dispatch(Intent::RequestRecommendations).await;

    let view = presentation::build_view(&h.orchestrator.snapshot().await, &h.catalog);
    assert_eq!(view.cards.len(), 1);
    assert_eq!(view.reasoning.as_deref(), Some("Sunny and upbeat"));

    let outcome = h
        .orchestrator
        .dispatch(Intent::SelectTitle("Unknown Title".to_string()))
        .await;
    assert!(matches!(outcome, IntentOutcome::Rejected(Rejection::UnknownTitle(_))));
    assert!(h.orchestrator.snapshot().await.watched.is_empty());
}

#[tokio::test]
async fn test_selection_appends_watched_and_logs() {
    let h = harness(FakeGateway::new());
    to_emotion_ready(&h).await;
    h.orchestrator.dispatch(Intent::RequestRecommendations).await;

    let outcome = h.orchestrator.dispatch(Intent::SelectTitle("dude".to_string())).await;
    assert_eq!(
        outcome,
        IntentOutcome::Selected(CatalogRef {
            list: ListKind::Primary,
            index: 0
        })
    );
    assert_eq!(h.orchestrator.state().await, OrchestratorState::RecommendationsReady);
    assert_eq!(h.orchestrator.snapshot().await.watched, vec!["Dude".to_string()]);

    wait_for_calls(&h.gateway, "log", 1).await;
    let logged = h.gateway.logged.lock().unwrap()[0].clone();
    assert_eq!(logged.title, "Dude");
    assert_eq!(logged.emotion.emotion, "happy");
    assert_eq!(logged.context.city, "Austin");

    // Next recommendation round carries the watched list
    h.orchestrator.dispatch(Intent::Capture).await;
    h.orchestrator.dispatch(Intent::RequestRecommendations).await;
    let queries = h.gateway.queries.lock().unwrap().clone();
    assert_eq!(queries[1].watched, vec!["Dude".to_string()]);
}

#[tokio::test]
async fn test_recommend_failure_returns_to_emotion_ready() {
    let h = harness(FakeGateway {
        recommendations: Vec::new(),
        ..FakeGateway::new()
    });
    to_emotion_ready(&h).await;

    let outcome = h.orchestrator.dispatch(Intent::RequestRecommendations).await;
    assert!(matches!(outcome, IntentOutcome::Failed(Error::Validation(_))));
    assert_eq!(h.orchestrator.state().await, OrchestratorState::EmotionReady);

    // Retry is user-initiated and allowed
    h.orchestrator.dispatch(Intent::RequestRecommendations).await;
    assert_eq!(h.gateway.calls("recommend"), 2);
}

#[tokio::test]
async fn test_teardown_releases_device_once() {
    let h = harness(FakeGateway::new());
    h.orchestrator.start().await;

    assert!(h.orchestrator.teardown().await);
    assert!(!h.orchestrator.teardown().await);
    assert!(!h.orchestrator.teardown().await);

    assert_eq!(h.camera.stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.orchestrator.state().await, OrchestratorState::Closed);
    assert_eq!(
        h.orchestrator.dispatch(Intent::Capture).await,
        IntentOutcome::Rejected(Rejection::Closed)
    );

    drop(h);
}

#[tokio::test]
async fn test_completion_after_teardown_is_discarded() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(FakeGateway {
        detect_gate: Some(gate.clone()),
        ..FakeGateway::new()
    });
    h.orchestrator.start().await;

    let pending = {
        let orch = h.orchestrator.clone();
        tokio::spawn(async move { orch.dispatch(Intent::Capture).await })
    };
    wait_for_state(&h.orchestrator, OrchestratorState::Analyzing).await;

    h.orchestrator.teardown().await;
    gate.add_permits(1);

    assert_eq!(pending.await.unwrap(), IntentOutcome::Stale);
    let snapshot = h.orchestrator.snapshot().await;
    assert_eq!(snapshot.state, OrchestratorState::Closed);
    assert!(snapshot.emotion.is_none());
    assert_eq!(h.camera.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_recommendations_after_teardown_are_discarded() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(FakeGateway {
        recommend_gate: Some(gate.clone()),
        ..FakeGateway::new()
    });
    to_emotion_ready(&h).await;

    let pending = {
        let orch = h.orchestrator.clone();
        tokio::spawn(async move { orch.dispatch(Intent::RequestRecommendations).await })
    };
    wait_for_state(&h.orchestrator, OrchestratorState::Recommending).await;

    assert!(h.orchestrator.teardown().await);
    gate.add_permits(1);

    assert_eq!(pending.await.unwrap(), IntentOutcome::Stale);
    let snapshot = h.orchestrator.snapshot().await;
    assert_eq!(snapshot.state, OrchestratorState::Closed);
    assert!(snapshot.recommendations.is_none());
    assert_eq!(h.gateway.calls("recommend"), 1);
    assert_eq!(h.camera.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_start_acquires_once() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(FakeGateway {
        health_gate: Some(gate.clone()),
        ..FakeGateway::new()
    });

    let first = {
        let orch = h.orchestrator.clone();
        tokio::spawn(async move { orch.start().await })
    };
    wait_for_calls(&h.gateway, "health", 1).await;

    // Startup already claimed; the second call reports the current state
    assert_eq!(h.orchestrator.start().await, OrchestratorState::Initializing);
    gate.add_permits(1);

    assert_eq!(first.await.unwrap(), OrchestratorState::Idle);
    assert_eq!(h.orchestrator.start().await, OrchestratorState::Idle);
    assert_eq!(h.gateway.calls("health"), 1);
    assert_eq!(h.camera.opens.load(Ordering::SeqCst), 1);

    h.orchestrator.teardown().await;
    assert_eq!(h.camera.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_teardown_during_failed_health_check_stays_closed() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(FakeGateway {
        healthy: false,
        health_gate: Some(gate.clone()),
        ..FakeGateway::new()
    });
    let (_, mut events) = h.hub.subscribe().await;

    let starting = {
        let orch = h.orchestrator.clone();
        tokio::spawn(async move { orch.start().await })
    };
    wait_for_calls(&h.gateway, "health", 1).await;

    assert!(h.orchestrator.teardown().await);
    gate.add_permits(1);
    assert_eq!(starting.await.unwrap(), OrchestratorState::Closed);

    let mut transitions = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event.kind {
            EventKind::StateChanged { from, to } => transitions.push((from, to)),
            EventKind::Notice(notice) => assert_ne!(notice.kind, NoticeKind::Disabled),
            _ => {}
        }
    }
    assert_eq!(
        transitions,
        vec![(OrchestratorState::Initializing, OrchestratorState::Closed)]
    );
    assert_eq!(h.camera.opens.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_teardown_during_health_check_skips_acquisition() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(FakeGateway {
        health_gate: Some(gate.clone()),
        ..FakeGateway::new()
    });

    let starting = {
        let orch = h.orchestrator.clone();
        tokio::spawn(async move { orch.start().await })
    };
    wait_for_calls(&h.gateway, "health", 1).await;

    h.orchestrator.teardown().await;
    gate.add_permits(1);

    assert_eq!(starting.await.unwrap(), OrchestratorState::Closed);
    assert_eq!(h.camera.opens.load(Ordering::SeqCst), 0);
    assert_eq!(h.gateway.calls("context"), 0);
}

#[tokio::test]
async fn test_lost_device_disables_capture() {
    let h = harness(FakeGateway::new());
    h.orchestrator.start().await;
    h.camera.lose_device.store(true, Ordering::SeqCst);

    let outcome = h.orchestrator.dispatch(Intent::Capture).await;
    assert!(matches!(outcome, IntentOutcome::Failed(Error::Device(_))));
    assert_eq!(h.orchestrator.state().await, OrchestratorState::Idle);
    assert_eq!(h.camera.stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.gateway.calls("emotion"), 0);

    assert_eq!(
        h.orchestrator.dispatch(Intent::Capture).await,
        IntentOutcome::Rejected(Rejection::CaptureUnavailable)
    );

    // Teardown does not stop the already released stream again
    h.orchestrator.teardown().await;
    assert_eq!(h.camera.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refresh_context_after_failure() {
    let h = harness(FakeGateway {
        context_failures: AtomicUsize::new(1),
        ..FakeGateway::new()
    });
    h.orchestrator.start().await;
    wait_for_calls(&h.gateway, "context", 1).await;
    // Let the failed fetch settle
    let orch = &h.orchestrator;
    wait_until(move || async move {
        !matches!(
            orch.dispatch(Intent::RefreshContext).await,
            IntentOutcome::Rejected(Rejection::Busy)
        )
    })
    .await;

    wait_for_context(&h.orchestrator).await;
    assert_eq!(h.gateway.calls("context"), 2);
    assert_eq!(
        h.orchestrator.dispatch(Intent::RefreshContext).await,
        IntentOutcome::Rejected(Rejection::ContextLoaded)
    );
}
