//! GroupDesk session agent
//!
//! Runs the session sync layer against a hosted backend from the terminal.
//! Commands on stdin stand in for the UI: login, logout, focus, visible,
//! hidden, status, quit.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use groupdesk_client::{AppContext, AuthState, Config, HttpBackend};
use groupdesk_core::{KeyValueStore, MemoryStore, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "groupdesk_client=debug,groupdesk_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(?config, "Loaded configuration");

    let store: Arc<dyn KeyValueStore> = match &config.cache_path {
        Some(path) => Arc::new(
            SqliteStore::open(path).with_context(|| format!("opening session cache {}", path))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };

    let mut backend =
        HttpBackend::new(&config.backend_url, &config.api_key)?.with_token_store(store.clone());
    if let Some(token) = &config.access_token {
        backend = backend.with_access_token(token);
    }
    let backend = Arc::new(backend);

    let context = AppContext::start(config.sync, backend.clone(), backend, store).await;
    if !context.state().is_authenticated() {
        context.auth().adopt_backend_session().await;
    }

    spawn_state_logger(&context);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_command(&context, line.trim()).await {
                    break;
                }
            }
        }
    }

    context.shutdown();
    Ok(())
}

type AgentContext = AppContext<Arc<HttpBackend>, Arc<HttpBackend>, Arc<dyn KeyValueStore>>;

/// Returns false when the agent should exit
async fn handle_command(context: &AgentContext, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("login") => {
            let (Some(email), Some(password)) = (parts.next(), parts.next()) else {
                println!("usage: login <email> <password>");
                return true;
            };
            if let Err(e) = context.auth().sign_in_with_password(email, password).await {
                println!("login failed: {}", e);
            }
        }
        Some("logout") => {
            context.sign_out().await;
        }
        Some("focus") => {
            context.lifecycle().window_focused();
        }
        Some("visible") => {
            context.lifecycle().visibility_changed(true);
        }
        Some("hidden") => {
            context.lifecycle().visibility_changed(false);
        }
        Some("status") => print_status(&context.state(), context.unread_count()),
        Some("quit") | Some("exit") => return false,
        Some(other) => println!("unknown command: {}", other),
        None => {}
    }
    true
}

fn print_status(state: &AuthState, unread: u64) {
    match state {
        AuthState::Authenticated(user) => {
            println!("signed in as {} <{}>, {} unread", user.display_name(), user.email, unread)
        }
        AuthState::Anonymous => println!("signed out"),
        AuthState::Uninitialized => println!("starting"),
    }
}

/// Log auth and unread-count changes the way a navigation shell would react to them
fn spawn_state_logger(context: &AgentContext) {
    let mut auth_rx = context.auth().subscribe();
    let mut unread_rx = context.notifications().subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = auth_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = auth_rx.borrow_and_update().clone();
                    match state.user() {
                        Some(user) => tracing::info!(user = user.display_name(), "Navigation: signed-in chrome"),
                        None => tracing::info!("Navigation: signed-out chrome"),
                    }
                }
                changed = unread_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let unread = *unread_rx.borrow_and_update();
                    tracing::info!(unread, "Navigation: unread badge");
                }
            }
        }
    });
}
