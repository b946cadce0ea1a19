use anyhow::Context;
use chatrelay::configuration::get_configuration;
use chatrelay::connectors::LmStudioClient;
use chatrelay::startup::{run, AppState};
use chatrelay::store::RecordStore;
use chatrelay::telemetry::{get_subscriber, init_subscriber};
use std::net::TcpListener;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("chatrelay".into(), "info".into());
    init_subscriber(subscriber)?;

    let settings = get_configuration().context("Failed to read configuration")?;

    tracing::info!(
        data_dir = %settings.storage.data_dir.display(),
        model_server = %settings.model.base_url,
        "Opening record store"
    );
    let store = RecordStore::open(&settings.storage.data_dir)
        .await
        .context("Failed to open record store")?;

    let model = LmStudioClient::new(settings.model.clone()).context("Failed to build model client")?;
    let state = AppState::from_settings(store, Arc::new(model), &settings);

    if settings.storage.seed_default_presets {
        state
            .presets
            .seed_defaults()
            .await
            .context("Failed to seed default presets")?;
    }

    let shutdown = CancellationToken::new();
    let sweeper = state.sweeper.clone().spawn(shutdown.clone());

    let address = format!("{}:{}", settings.app_host, settings.app_port);
    tracing::info!("Start server at {:?}", &address);
    let listener =
        TcpListener::bind(&address).with_context(|| format!("failed to bind to {}", address))?;

    let result = run(listener, state, settings).await?.await;

    shutdown.cancel();
    if let Err(err) = sweeper.await {
        tracing::error!("Retention sweeper ended abnormally: {}", err);
    }

    Ok(result?)
}
