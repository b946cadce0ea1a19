use crate::configuration::Settings;
use crate::connectors::ModelConnector;
use crate::routes;
use crate::services::{
    ChatRelay, ConfigurationPolicy, PresetRegistry, RetentionPolicy, RetentionSweeper,
    SessionMultiplexer,
};
use crate::store::RecordStore;
use actix_cors::Cors;
use actix_web::{dev::Server, error, http, web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

/// Everything the handlers share
#[derive(Clone)]
pub struct AppState {
    pub store: RecordStore,
    pub presets: PresetRegistry,
    pub relay: ChatRelay,
    pub multiplexer: Arc<SessionMultiplexer>,
    pub sweeper: RetentionSweeper,
}

impl AppState {
    pub fn new(
        store: RecordStore,
        model: Arc<dyn ModelConnector>,
        policy: Arc<dyn RetentionPolicy>,
        settings: &Settings,
    ) -> Self {
        let presets = PresetRegistry::new(store.clone());
        let relay = ChatRelay::new(store.clone(), presets.clone(), model, &settings.model);
        let sweeper = RetentionSweeper::new(store.clone(), policy, &settings.retention);

        Self {
            store,
            presets,
            relay,
            multiplexer: SessionMultiplexer::new(),
            sweeper,
        }
    }

    /// State whose sweeper re-reads the configuration files on every run
    pub fn from_settings(store: RecordStore, model: Arc<dyn ModelConnector>, settings: &Settings) -> Self {
        Self::new(store, model, Arc::new(ConfigurationPolicy), settings)
    }
}

pub async fn run(
    listener: TcpListener,
    state: AppState,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    let settings = web::Data::new(settings);
    let store = web::Data::new(state.store);
    let presets = web::Data::new(state.presets);
    let relay = web::Data::new(state.relay);
    let multiplexer = web::Data::new(state.multiplexer);
    let sweeper = web::Data::new(state.sweeper);

    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        let msg: String = match err {
            error::JsonPayloadError::Deserialize(err) => format!(
                "{{\"status\":\"Error\",\"code\":400,\"message\":\"invalid body at line {} column {}: {}\"}}",
                err.line(),
                err.column(),
                err.to_string().replace('"', "'")
            ),
            _ => format!(
                "{{\"status\":\"Error\",\"code\":400,\"message\":\"{}\"}}",
                err.to_string().replace('"', "'")
            ),
        };
        error::InternalError::from_response(
            "",
            actix_web::HttpResponse::BadRequest()
                .content_type(http::header::ContentType::json())
                .body(msg),
        )
        .into()
    });

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .service(web::scope("/health_check").service(routes::health_check))
            .service(
                web::scope("/api")
                    .service(routes::chat::send::item)
                    .service(routes::chat::models::list)
                    .service(routes::statistics::statistics)
                    .service(routes::statistics::cleanup)
                    .service(
                        web::scope("/conversations")
                            .service(routes::conversation::get::list)
                            .service(routes::conversation::add::item)
                            .service(routes::conversation::messages::list)
                            .service(routes::conversation::messages::add)
                            .service(routes::conversation::export::item)
                            .service(routes::conversation::duplicate::item)
                            .service(routes::conversation::get::item)
                            .service(routes::conversation::update::item)
                            .service(routes::conversation::delete::item),
                    )
                    .service(
                        web::scope("/presets")
                            .service(routes::preset::get::list)
                            .service(routes::preset::add::item)
                            .service(routes::preset::get::usage)
                            .service(routes::preset::get::item)
                            .service(routes::preset::update::item)
                            .service(routes::preset::delete::item),
                    ),
            )
            .service(
                web::resource("/ws/{conversation_id}")
                    .route(web::get().to(routes::chat::websocket::chat_websocket)),
            )
            .app_data(json_config.clone())
            .app_data(store.clone())
            .app_data(presets.clone())
            .app_data(relay.clone())
            .app_data(multiplexer.clone())
            .app_data(sweeper.clone())
            .app_data(settings.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
