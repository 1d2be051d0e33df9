use anyhow::{Context, Result};
use axum::Router;
use solar_power_predictor::{api, config, ml::inference::SolarPredictor, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;

    let predictor = SolarPredictor::load(&cfg.model.artifact_path)
        .context("cannot start without a valid model artifact")?;
    info!(
        artifact = %cfg.model.artifact_path.display(),
        format = %predictor.format(),
        version = ?predictor.version(),
        transform = %predictor.transform(),
        features = ?predictor.feature_columns(),
        "model loaded"
    );

    let app_state = api::AppState::new(predictor, cfg.bounds);
    let app: Router = api::router(app_state, &cfg.server);

    let addr = cfg.server.socket_addr()?;

    if cfg.server.host == "0.0.0.0" {
        warn!(
            "WARNING: Server binding to 0.0.0.0 - service will be accessible from network! \
            For production, bind to 127.0.0.1 unless behind a firewall/reverse proxy."
        );
    }

    info!(%addr, "starting solar power predictor");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}
