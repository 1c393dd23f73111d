use autotest_recorder::browser::{ChromeCapture, NoCapture, ScreenshotSource};
use autotest_recorder::{BroadcastNotifier, Command, Dispatcher, JsonFileStore, RecorderConfig, Reply};
use clap::Parser;
use futures::StreamExt;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use warp::sse::Event;
use warp::Filter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Test recorder bridge", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 9669)]
    port: u16,

    /// Settings file (defaults to <config dir>/autotest-recorder/settings.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// State file (defaults to <data dir>/autotest-recorder/state.json)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Capture element screenshots from Chrome on this remote debugging port
    #[arg(long)]
    chrome_debug_port: Option<u16>,

    /// License key for the code generation service
    #[arg(long)]
    license_key: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => RecorderConfig::load(path),
        None => RecorderConfig::load_default(),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load settings: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(key) = args.license_key {
        config.license_key = key;
    }

    let Some(state_path) = args.state_file.or_else(JsonFileStore::default_path) else {
        eprintln!("Error: no data directory found, pass --state-file");
        std::process::exit(1);
    };
    log::info!("Persisting state to {}", state_path.display());

    let screenshots: Arc<dyn ScreenshotSource> = match args.chrome_debug_port {
        Some(port) => match ChromeCapture::connect(port).await {
            Ok(capture) => {
                log::info!("Capturing screenshots from Chrome on port {}", port);
                Arc::new(capture)
            }
            Err(e) => {
                log::warn!("{}; recording without screenshots", e);
                Arc::new(NoCapture)
            }
        },
        None => Arc::new(NoCapture),
    };

    let notifier = Arc::new(BroadcastNotifier::default());
    let dispatcher = Arc::new(Dispatcher::new(
        &config,
        Arc::new(JsonFileStore::new(state_path)),
        screenshots,
        notifier.clone(),
    ));

    log::info!("Starting recorder bridge on port {}", args.port);

    let health =
        warp::path("health").map(|| warp::reply::json(&serde_json::json!({ "status": "ok" })));

    let dispatcher_filter = warp::any().map(move || dispatcher.clone());
    let command = warp::path("command")
        .and(warp::post())
        .and(warp::body::json())
        .and(dispatcher_filter)
        .and_then(handle_command);

    let notifier_filter = warp::any().map(move || notifier.clone());
    let events = warp::path("events")
        .and(warp::get())
        .and(notifier_filter)
        .map(|notifier: Arc<BroadcastNotifier>| event_stream(&notifier));

    let routes = health
        .or(command)
        .or(events)
        .with(warp::cors().allow_any_origin().allow_methods(vec!["GET", "POST"]).allow_header("content-type"));

    // Bind manually to handle "port in use" error gracefully
    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            log::info!("Listening on http://{}", addr);
            warp::serve(routes)
                .run_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
                .await;
        }
        Err(e) => {
            log::error!("Failed to bind to port {}: {}", args.port, e);
            eprintln!(
                "Error: Port {} is already in use or unavailable.",
                args.port
            );
            std::process::exit(1);
        }
    }
}

async fn handle_command(
    body: serde_json::Value,
    dispatcher: Arc<Dispatcher>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let reply = match serde_json::from_value::<Command>(body) {
        Ok(command) => {
            log::debug!("Received command: {:?}", command);
            dispatcher.dispatch(command).await
        }
        Err(e) => {
            log::warn!("Rejected command: {}", e);
            Reply::Error {
                error: format!("Invalid command: {}", e),
            }
        }
    };
    Ok(warp::reply::json(&reply))
}

/// Server-sent events carrying every notification as JSON
fn event_stream(notifier: &BroadcastNotifier) -> impl warp::Reply {
    let stream = BroadcastStream::new(notifier.subscribe()).filter_map(|item| async move {
        match item {
            Ok(notification) => match Event::default().json_data(&notification) {
                Ok(event) => Some(Ok::<_, Infallible>(event)),
                Err(e) => {
                    log::warn!("Failed to encode notification: {}", e);
                    None
                }
            },
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                log::warn!("Event subscriber lagged, {} notifications dropped", skipped);
                None
            }
        }
    });
    warp::sse::reply(warp::sse::keep_alive().stream(stream))
}
