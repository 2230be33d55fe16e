// src/main.rs
use actix_files::Files;
use actix_web::{App, HttpServer, middleware, web};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use drivediagram::AppState;
use drivediagram::config::ServerConfig;
use drivediagram::cors::{CorsPolicy, cors_headers};
use drivediagram::handlers;
use drivediagram::services::{
    CreditStore, DiagramStore, GeminiService, ImageProcessor, MemoryCreditStore,
    MemoryDiagramStore, RedisDiagramStore, SupabaseSessionVerifier,
};

/// Matches the execution ceiling of the hosted model call.
const MODEL_TIMEOUT: Duration = Duration::from_secs(30);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting DriveDiagram service...");

    let config = ServerConfig::from_env()?;

    // Initialize services
    let (diagram_store, credit_store): (Arc<dyn DiagramStore>, Arc<dyn CreditStore>) =
        match &config.redis_url {
            Some(url) => {
                let redis = Arc::new(RedisDiagramStore::new(url).await?);
                (redis.clone(), redis)
            }
            None => {
                warn!("REDIS_URL not set; saved diagrams are kept in memory and lost on restart");
                (
                    Arc::new(MemoryDiagramStore::new()),
                    Arc::new(MemoryCreditStore::new()),
                )
            }
        };
    let model = GeminiService::new(config.model_id.clone(), config.backend.clone(), MODEL_TIMEOUT)?;
    info!(
        "Using model {} via {}",
        model.model_id(),
        config.backend.name()
    );
    let session_verifier = SupabaseSessionVerifier::new(config.supabase.clone())?;

    let app_state = AppState {
        diagram_store,
        credit_store,
        model: Arc::new(model),
        session_verifier: Arc::new(session_verifier),
        image_processor: Arc::new(ImageProcessor::new()),
    };
    let cors = CorsPolicy::new(config.allowed_origins.clone());
    let max_body_bytes = config.max_body_bytes;
    let static_dir = config.static_dir.clone();

    let bind = (config.bind_addr.clone(), config.port);
    info!("Starting HTTP server on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        let app = App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::Data::new(cors.clone()))
            .app_data(web::PayloadConfig::new(max_body_bytes))
            .app_data(
                web::JsonConfig::default()
                    .limit(max_body_bytes)
                    .error_handler(handlers::json_error_handler),
            )
            .wrap(middleware::from_fn(cors_headers))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
            .default_service(web::route().to(handlers::fallback));

        match &static_dir {
            Some(dir) => app.service(Files::new("/", dir).index_file("index.html")),
            None => app.route("/", web::get().to(handlers::root)),
        }
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
