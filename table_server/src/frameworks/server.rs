// Framework bootstrap for the table server runtime.

use crate::domain::StaticScene;
use crate::frameworks::config;
use crate::interface_adapters::clock::ServerClock;
use crate::interface_adapters::net::{create_table_handler, spawn_table_serializers, ws_handler};
use crate::interface_adapters::scene_file::load_scene;
use crate::interface_adapters::state::AppState;
use crate::use_cases::{AuthoritySettings, SharedCollision, TableRegistry, TableSettings};

use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state().await?;
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/tables", post(create_table_handler))
        .with_state(state);

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

fn load_collision() -> Result<SharedCollision> {
    let Some(path) = config::scene_path() else {
        tracing::info!(
            half_size = config::DEFAULT_FLOOR_HALF_SIZE,
            "no scene configured; using flat floor"
        );
        return Ok(Arc::new(StaticScene::flat_floor(config::DEFAULT_FLOOR_HALF_SIZE)));
    };

    let scene = load_scene(&path).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "failed to load scene");
        std::io::Error::other(e)
    })?;
    tracing::info!(path = %path.display(), colliders = scene.len(), "scene loaded");
    Ok(Arc::new(scene))
}

async fn build_state() -> Result<Arc<AppState>> {
    let scene = load_collision()?;
    let tick_interval = config::tick_interval();
    let ownership = config::ownership_rules();
    tracing::debug!(
        tick_ms = tick_interval.as_millis(),
        policy = ?ownership.policy,
        lock_blocks_drag = ownership.lock_blocks_drag,
        drag_timeout = ?ownership.drag_timeout,
        "table settings configured"
    );

    // Owns the set of active table loops.
    let table_registry = Arc::new(TableRegistry::new(
        TableSettings {
            input_channel_capacity: config::INPUT_CHANNEL_CAPACITY,
            broadcast_capacity: config::BROADCAST_CAPACITY,
            tick_interval,
            authority: AuthoritySettings {
                ownership,
                ..AuthoritySettings::default()
            },
        },
        Arc::new(ServerClock::new()),
    ));

    // The default table is always present for clients that omit table_id.
    let default_table = table_registry
        .create_table(config::DEFAULT_TABLE_ID.to_string(), scene.clone(), None)
        .await
        .map_err(|e| std::io::Error::other(format!("failed to create default table: {e:?}")))?;
    spawn_table_serializers(&default_table);

    Ok(Arc::new(AppState {
        table_registry,
        default_table_id: Arc::from(config::DEFAULT_TABLE_ID),
        scene,
    }))
}
