pub mod audio;

use crate::error::AppError;
use crate::health;
use actix_web::web;

/// Register every route. Shared by `main` and the handler tests so both see
/// the same table.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
            .service(
                web::resource("/audio/{word_id}")
                    .app_data(word_id_path_config())
                    .route(web::get().to(audio::stream_audio)),
            ),
    )
    // Also at the root, for load balancers
    .route("/health", web::get().to(health::health_check));
}

/// Non-numeric word ids are a client error, not a missing route.
fn word_id_path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _req| AppError::BadRequest(format!("Invalid word id: {}", err)).into())
}
