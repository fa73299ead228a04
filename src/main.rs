use navia_realtime::{
    AppError, ClientManager, ClientSettings, Server, Settings,
    pipeline::{Detector, DetectorPool, JsonDetector},
};
use std::{str::FromStr, sync::Arc};
use tracing::{Level, error, info, warn};

fn init_logging(level: &str) {
    let level = Level::from_str(level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config_path = std::env::args().nth(1);
    let settings = Settings::load(config_path.as_deref())?;
    init_logging(&settings.log_level);

    let detector = Arc::new(JsonDetector::new(settings.zone_thresholds()));
    info!("Using {} detector", detector.name());
    let pool = DetectorPool::new(
        detector,
        settings.realtime.max_concurrent_inferences,
        settings.inference_timeout(),
    );
    let (_client_manager, handle) = ClientManager::new(pool, ClientSettings::from(&settings));
    let server = Server::new(settings.bind_address(), handle.clone());

    tokio::select! {
        result = server.start() => {
            if let Err(e) = &result {
                error!("Server stopped: {}", e);
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            match handle.shutdown_all().await {
                Ok(count) => info!("Signalled {} sessions to stop", count),
                Err(e) => warn!("Could not stop sessions cleanly: {}", e),
            }
            Ok(())
        }
    }
}
