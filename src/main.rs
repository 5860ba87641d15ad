use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use dotenvy::dotenv;

mod api;
mod auth;
mod client;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod routes;
mod service;
mod store;
mod utils;

use client::user::HttpUserValidator;
use config::Config;
use db::init_db;
use service::attendance::AttendanceService;
use service::qr::QrTokens;
use service::schedule::{ScheduleResolver, ScheduleStore};
use store::attendance::SqlAttendanceStore;
use store::schedule::SqlScheduleStore;

use tracing::info;
use tracing_appender::rolling;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Attendance service"
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let config = Config::from_env();

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Attendance service starting...");

    let pool = init_db(&config.database_url).await;

    let schedule_store = Arc::new(SqlScheduleStore::new(pool.clone()));
    let schedule_reader: Arc<dyn ScheduleStore> = schedule_store.clone();
    let resolver = ScheduleResolver::new(schedule_reader);
    let validator = Arc::new(HttpUserValidator::new(
        config.gateway_url.clone(),
        Duration::from_secs(config.upstream_timeout_secs),
    ));
    let attendance_service = AttendanceService::new(
        validator,
        resolver.clone(),
        Arc::new(SqlAttendanceStore::new(pool.clone())),
        QrTokens::new(config.qr_token_secret.clone(), config.qr_token_ttl_secs),
        config.qr_base_url.clone(),
    );

    let attendance_data = Data::new(attendance_service);
    let resolver_data = Data::new(resolver);
    let schedule_store_data = Data::from(schedule_store);

    let server_addr = config.server_addr.clone();
    let openapi = docs::openapi_for_prefix(&config.api_prefix);
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", openapi.clone()),
            )
            .app_data(attendance_data.clone())
            .app_data(resolver_data.clone())
            .app_data(schedule_store_data.clone())
            .service(index)
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await
}
