//! Turnstile operator console.
//!
//! Reads commands from stdin and drives the validation workflow against the
//! configured ticket store.

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turnstile::{
    config::Config,
    console::{render_state, Command, ConsoleView, HELP},
    decoder::{ChannelDecoder, DecoderError, FrameFeed, LineDecoder, QrDecoder},
    repository::DocumentTicketRepository,
    session::{SessionBoundary, StaticIdentityProvider},
    workflow::{WorkflowEnvironment, WorkflowReducer, WorkflowState, WorkflowStore},
};
use turnstile_core::environment::{Clock, SystemClock};
use turnstile_runtime::{Store, StoreConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,turnstile=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting Turnstile operator console");

    // Load configuration
    let config = Config::from_env();
    info!(
        document_store = config.document_store.url.as_deref().unwrap_or("in-memory"),
        collection = %config.document_store.collection,
        scanner_input = ?config.console.scanner_input,
        "Configuration loaded"
    );

    // Resolve the session before anything protected is shown
    let session = SessionBoundary::new(Arc::new(StaticIdentityProvider::new(config.identity())));
    if let Err(error) = session.initialize().await {
        error!(%error, "Could not resolve the operator session");
    }
    let operator = match session.admit() {
        Ok(identity) => identity,
        Err(error) => {
            error!(%error, "Operator not admitted");
            return Err(format!(
                "{error}: set OPERATOR_ID or OPERATOR_EMAIL to sign in"
            )
            .into());
        },
    };

    // Wire the workflow
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let repository = DocumentTicketRepository::shared(
        config.build_document_store()?,
        config.document_store.collection.clone(),
    );

    let (decoder, feed) = match &config.console.scanner_input {
        Some(path) => {
            let decoder: Arc<dyn QrDecoder> =
                Arc::new(LineDecoder::open(path.clone(), Arc::clone(&clock)));
            (decoder, None)
        },
        None => {
            let (decoder, feed) = ChannelDecoder::new(Arc::clone(&clock));
            let decoder: Arc<dyn QrDecoder> = Arc::new(decoder);
            (decoder, Some(feed))
        },
    };

    let environment = WorkflowEnvironment::new(clock, repository, decoder, session.handle())
        .with_settings(config.workflow_settings());

    let store: WorkflowStore = Store::with_config(
        WorkflowState::new(),
        WorkflowReducer::new(),
        environment,
        StoreConfig::default().with_shutdown_timeout(config.shutdown_timeout()),
    );

    let printer = tokio::spawn(print_updates(store.clone()));

    println!("Signed in as {}. Type 'help' for commands.", operator.label());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                error!(%error, "Failed to read console input");
                break;
            },
        };

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(error) => {
                println!("{error}");
                continue;
            },
        };

        match command {
            Command::Help => println!("{HELP}"),
            Command::Status => {
                let state = store.state(Clone::clone).await;
                println!("{}", render_state(&state));
            },
            Command::Scan(text) => scan(feed.as_ref(), text),
            Command::Quit => break,
            Command::Logout => {
                if let Err(error) = session.sign_out().await {
                    warn!(%error, "Identity provider sign-out failed");
                }
                println!("Signed out.");
                break;
            },
            other => {
                if let Some(action) = other.into_action() {
                    if let Err(error) = store.send(action).await {
                        error!(%error, "Store rejected command");
                        break;
                    }
                }
            },
        }
    }

    info!("Shutting down");
    if let Err(error) = store.shutdown(None).await {
        warn!(%error, "Shutdown did not complete cleanly");
    }
    printer.abort();

    info!("Turnstile stopped");
    Ok(())
}

fn scan(feed: Option<&FrameFeed>, text: String) {
    let Some(feed) = feed else {
        println!("Frames come from SCANNER_INPUT; 'scan' is disabled.");
        return;
    };

    match feed.push_text(text) {
        Ok(()) => {},
        Err(DecoderError::NotActive) => println!("No active scanner. Type 'open' first."),
        Err(error) => println!("{error}"),
    }
}

async fn print_updates(store: WorkflowStore) {
    let mut actions = store.subscribe_actions();
    let mut view = ConsoleView::new();

    loop {
        match actions.recv().await {
            Ok(_) | Err(RecvError::Lagged(_)) => {
                let state = store.state(Clone::clone).await;
                if let Some(text) = view.update(&state) {
                    println!("{text}");
                }
            },
            Err(RecvError::Closed) => break,
        }
    }
}
