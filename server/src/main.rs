use std::net::SocketAddr;
use tokio::net::TcpListener;

use relay_server::channels::seed;
use relay_server::config::{generate_config_template, Config};
use relay_server::db::{self, Store};
use relay_server::routes;
use relay_server::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("relay_server=info"))?;
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("Relay server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite database and seed the world channel
    let store = Store::new(db::init_db(&config.data_dir)?);
    seed::seed_world_channel(&store).await?;

    tracing::info!(
        heartbeat_secs = config.relay.heartbeat_interval_secs,
        keepalive_secs = config.relay.keepalive_interval_secs,
        "Relay timers configured"
    );

    let app_state = AppState::new(store, config.relay.clone());
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
