//! Moodflix - terminal front-end
//!
//! Owns one session: dispatches intents typed at the prompt and prints the
//! view state after each command.

use clap::Parser;
use moodflix_client::{
    event_hub::{EventKind, OrchestratorEvent},
    orchestrator::{Intent, IntentOutcome, Rejection},
    presentation::{self, DetailView, NoticeBoard, ViewState},
    state::{AppConfig, AppState},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "moodflix")]
#[command(about = "Mood-aware movie recommendations from a webcam still")]
struct Args {
    /// Backend base URL (e.g., http://localhost:5000/api)
    #[arg(long)]
    api_url: Option<String>,

    /// Video4Linux camera device
    #[arg(long)]
    camera: Option<PathBuf>,

    /// Use an image file instead of a camera
    #[arg(long)]
    still_image: Option<PathBuf>,

    /// Run without a camera
    #[arg(long)]
    no_camera: bool,

    /// JSON catalog file
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Backend request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print raw events as JSON lines
    #[arg(long)]
    json_events: bool,
}

impl Args {
    fn apply(self, mut config: AppConfig) -> AppConfig {
        if let Some(url) = self.api_url {
            config.api_url = url;
        }
        if let Some(camera) = self.camera {
            config.camera_device = Some(camera);
        }
        if let Some(path) = self.still_image {
            config.still_image = Some(path);
        }
        if self.no_camera {
            config.camera_device = None;
            config.still_image = None;
        }
        if let Some(path) = self.catalog {
            config.catalog_path = Some(path);
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        config
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moodflix_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting Moodflix client v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let json_events = args.json_events;
    let config = args.apply(AppConfig::default());
    let state = AppState::build(config)?;
    let orchestrator = state.orchestrator.clone();

    let notices = Arc::new(Mutex::new(NoticeBoard::new()));
    let (subscriber_id, mut events) = state.hub.subscribe().await;
    let printer = {
        let notices = notices.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                print_event(&event, json_events);
                if let EventKind::Notice(notice) = event.kind {
                    notices.lock().await.push(notice);
                }
            }
        })
    };

    let started = orchestrator.start().await;
    tracing::info!(session_id = %orchestrator.session_id(), state = %started, "Session ready");
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let view = presentation::build_view(&orchestrator.snapshot().await, &state.catalog);
        print_prompt(&view);

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        let outcome = match command {
            "" => continue,
            "capture" | "c" => orchestrator.dispatch(Intent::Capture).await,
            "recommend" | "r" => orchestrator.dispatch(Intent::RequestRecommendations).await,
            "select" | "s" => match pick_title(&view, rest) {
                Some(title) => orchestrator.dispatch(Intent::SelectTitle(title)).await,
                None => {
                    println!("No recommendation '{}'", rest);
                    continue;
                }
            },
            "context" => orchestrator.dispatch(Intent::RefreshContext).await,
            "detail" | "d" => {
                print_detail(&state, &view, rest);
                continue;
            }
            "status" => {
                print_view(&view, &*notices.lock().await);
                continue;
            }
            "dismiss" => {
                notices.lock().await.dismiss();
                continue;
            }
            "help" | "?" => {
                print_help();
                continue;
            }
            "quit" | "q" | "exit" => break,
            other => {
                println!("Unknown command '{}'. Type 'help'.", other);
                continue;
            }
        };

        tokio::task::yield_now().await;
        report(&outcome);
        let view = presentation::build_view(&orchestrator.snapshot().await, &state.catalog);
        print_view(&view, &*notices.lock().await);
    }

    orchestrator.teardown().await;
    // Dropping the sender ends the printer once the closing events are drained
    state.hub.unsubscribe(&subscriber_id).await;
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Event printer ended abnormally");
    }
    tracing::info!("Moodflix client stopped");
    Ok(())
}

/// `select 2` picks the second card; anything else is taken as a title
fn pick_title(view: &ViewState, arg: &str) -> Option<String> {
    if arg.is_empty() {
        return None;
    }
    match arg.parse::<usize>() {
        Ok(rank) => view.cards.iter().find(|c| c.rank == rank).map(|c| c.title.clone()),
        Err(_) => Some(arg.to_string()),
    }
}

fn report(outcome: &IntentOutcome) {
    match outcome {
        IntentOutcome::Applied(state) => tracing::debug!(state = %state, "Intent applied"),
        IntentOutcome::Selected(reference) => {
            println!("Selected. Open with: detail {}", presentation::detail_query(*reference))
        }
        IntentOutcome::Rejected(Rejection::Busy) => println!("Busy, please wait."),
        IntentOutcome::Rejected(_) | IntentOutcome::Failed(_) | IntentOutcome::Stale => {}
    }
}

fn print_event(event: &OrchestratorEvent, json: bool) {
    if json {
        match event.to_json() {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!(error = %e, "Failed to serialize event"),
        }
        return;
    }
    if let EventKind::Notice(notice) = &event.kind {
        let tag = if notice.persistent { "!" } else { "-" };
        println!("[{}] {}", tag, notice.message);
    }
}

fn print_prompt(view: &ViewState) {
    println!();
    println!("({}) >", view.state);
}

fn print_view(view: &ViewState, notices: &NoticeBoard) {
    let ctx = &view.context;
    println!(
        "Context: {} | {} | {} | {} ({}){}",
        ctx.city,
        ctx.weather,
        ctx.temperature,
        ctx.day_status,
        ctx.weekday,
        if ctx.loaded { "" } else { " [not loaded]" }
    );

    match &view.emotion {
        Some(emotion) => println!(
            "Mood: {} ({}) voice: {}",
            emotion.emotion, emotion.confidence, emotion.voice_tone
        ),
        None => println!("Mood: not detected"),
    }

    if let Some(reasoning) = &view.reasoning {
        println!("Why: {}", reasoning);
        for card in &view.cards {
            println!("  {}. {}  {}", card.rank, card.title, card.rating);
        }
        if view.cards.is_empty() {
            println!("  (none of the recommended titles are in the catalog)");
        }
    }

    println!(
        "[{}{}] [{}{}]",
        view.capture_button.label,
        if view.capture_button.enabled { "" } else { " - disabled" },
        view.recommend_button.label,
        if view.recommend_button.enabled { "" } else { " - disabled" },
    );

    for notice in notices.visible() {
        let tag = if notice.persistent { "!" } else { "-" };
        println!("[{}] {}", tag, notice.message);
    }
}

fn print_detail(state: &AppState, view: &ViewState, arg: &str) {
    let query = match arg.parse::<usize>() {
        Ok(rank) => match view.cards.iter().find(|c| c.rank == rank) {
            Some(card) => card.detail_query.clone(),
            None => {
                println!("No card {}", rank);
                return;
            }
        },
        Err(_) => arg.to_string(),
    };

    match presentation::render_detail(&state.catalog, &query) {
        DetailView::Found {
            title,
            poster,
            rating,
            description,
        } => {
            println!("{}  ({})", title, rating);
            println!("{}", description);
            println!("poster: {}", poster);
        }
        DetailView::NotFound { message } => println!("{}", message),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  capture (c)          capture a still and detect your mood");
    println!("  recommend (r)        get recommendations for the detected mood");
    println!("  select (s) <N|title> pick a recommendation");
    println!("  detail (d) <N|type=movies&id=0>  show a title");
    println!("  context              retry loading context");
    println!("  status               show the current view");
    println!("  dismiss              dismiss the current notice");
    println!("  quit (q)             end the session");
}
