use std::sync::Arc;

use tracing::{error, info};

use balifeed::{
    AppState, Config, Database, DocumentStore, EventDispatcher, FcmGateway, LogOnlyGateway,
    PushDispatcher, PushGateway, SqliteStore, WebServer,
};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = balifeed::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        balifeed::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = run(config).await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> balifeed::Result<()> {
    config.validate()?;
    info!("BaliFeed event service starting");

    let db = Database::open(&config.database.path).await?;
    info!("Document store opened at {}", config.database.path);
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(Arc::new(db)));

    let gateway: Arc<dyn PushGateway> = if config.push.enabled {
        info!(project_id = %config.push.project_id, "Push delivery through FCM");
        Arc::new(FcmGateway::new(&config.push)?)
    } else {
        info!("Push delivery disabled, notifications are logged only");
        Arc::new(LogOnlyGateway)
    };

    let notifier = Arc::new(PushDispatcher::new(store.clone(), gateway));
    let events = Arc::new(EventDispatcher::new(store, notifier.clone(), &config));

    let server = WebServer::new(&config.server, &config.pubsub, AppState::new(events, notifier))?;
    server.run().await?;

    info!("BaliFeed stopped");
    Ok(())
}
