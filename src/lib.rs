use actix_cors::Cors;
use actix_web::middleware::Compress;
use actix_web::{http::header, web, App, HttpServer};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod config;
pub mod handlers;
pub mod publish;
pub mod render;
pub mod sheet;
pub mod state;
pub mod worker;

pub use crate::state::AppState;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_type: &str, message: &str) -> Self {
        Self {
            error: error_type.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self::new("NotFound", message)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new("BadRequest", message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::new("InternalServerError", message)
    }
}

pub async fn run() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    #[derive(OpenApi)]
    #[openapi(
        paths(
            crate::handlers::generate_pdf,
            crate::handlers::download_zips,
            crate::handlers::health
        ),
        components(schemas(handlers::GeneratePdfRequest, ErrorResponse)),
        tags(
            (name = "Documents", description = "Record-to-PDF rendering and archive bundling."),
            (name = "Health", description = "Liveness check.")
        )
    )]
    struct ApiDoc;

    dotenvy::dotenv().ok();
    let config = match config::PlatformConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    let app_state = match AppState::new(config) {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            log::error!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    log::info!("Starting server at http://0.0.0.0:8000");

    HttpServer::new(move || {
        let app_state = app_state.clone();
        // The UI copies URLs from arbitrary platform pages, so the origin
        // list is open.
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(app_state)
            .service(web::resource("/generate-pdf").route(web::post().to(handlers::generate_pdf)))
            .service(web::resource("/download-zips").route(web::get().to(handlers::download_zips)))
            .service(web::resource("/health").route(web::get().to(handlers::health)))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
    })
    .bind(("0.0.0.0", 8000))?
    .run()
    .await
}
