use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use vanish_server::config::{generate_config_template, Config};
use vanish_server::content::{retention, store::ContentStore};
use vanish_server::{db, routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vanish_server=info"))
    };
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter())
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(env_filter())
            .init();
    }

    tracing::info!("Vanish server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = db::init_db(&config.data_dir)?;

    let content = config.content();
    let settings = content.store_settings();
    tracing::info!(
        "Content TTL {}h, expiry policy {:?}, max payload {} MB",
        settings.ttl.num_hours(),
        settings.expiry_policy,
        content.max_payload_mb
    );
    let store = ContentStore::new(db, settings);

    retention::spawn_retention_cleanup(store.clone(), content.cleanup_interval_secs);

    let app_state = state::AppState {
        store,
        max_payload_bytes: content.max_payload_bytes(),
        rate_limit: config.rate_limit.clone(),
    };

    let app = routes::build_router(app_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
