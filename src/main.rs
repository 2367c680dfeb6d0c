use clap::Parser; // for cli
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use panel_client::auth::{FileAuthStore, Session};
use panel_client::config::{Args, PanelConfig};
use panel_client::handlers;
use panel_client::http_client::HttpClient;
use panel_client::logging::init_tracing;
use panel_client::request_manager::RequestManager;
use panel_client::settings::{InMemoryDocument, SettingsEndpoint, SettingsWatcher, Visibility};
use panel_client::state::AppState;
use panel_client::store::{ConfigStore, PermissionStore};

// single-threaded event loop: back-to-back submissions reach the scheduler
// before it admits anything, so priority decides the order
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // parse cli arguments
    let config = PanelConfig::from(Args::parse());
    init_tracing(&config);

    let session = Session::new(
        Arc::new(FileAuthStore::new(&config.auth_file)),
        Arc::new(PermissionStore::default()),
        config.login_path.clone(),
    );
    let manager = RequestManager::new(config.max_concurrent, config.refresh_window);
    let client = Arc::new(HttpClient::from_config(&config, manager, session.clone())?);

    let store = Arc::new(ConfigStore::default());
    let document = Arc::new(InMemoryDocument::new());
    let watcher = Arc::new(SettingsWatcher::new(
        SettingsEndpoint::new(
            Arc::clone(&client),
            config.settings_path.clone(),
            config.watcher.poll_priority,
        ),
        Arc::clone(&store),
        document.clone(),
        config.watcher,
    ));

    // headless process, always in the foreground
    let (_visibility_tx, visibility_rx) = watch::channel(Visibility::Visible);
    let watcher_handle = Arc::clone(&watcher).spawn(visibility_rx, session.watch_authenticated());

    let state = Arc::new(AppState {
        client,
        store,
        document,
        watcher,
    });
    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(port = config.port, "diagnostics server listening");
    info!(api = %config.api_base_url, "forwarding to backend");
    info!(
        max_concurrent = config.max_concurrent,
        timeout_secs = config.request_timeout.as_secs(),
        "request manager ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    watcher_handle.stop().await;
    info!("shut down");
    Ok(())
}
