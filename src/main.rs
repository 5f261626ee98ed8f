use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use mockable::DefaultClock;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod model;
mod models;
mod routes;
mod service;
mod store;
mod utils;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::service::attendance::AttendanceService;
use crate::service::qr_token::QrTokenCodec;
use crate::store::mysql::MySqlStore;
use crate::utils::email_registry;
use tracing::{error, info};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "EventHub attendance API"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
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

    info!("Server starting...");

    let pool = init_db(&config.database_url).await?;

    let pool_for_warmup = pool.clone();
    actix_web::rt::spawn(async move {
        // every address into the filter, last 30 days of logins into the cache
        if let Err(e) = email_registry::warmup(&pool_for_warmup, 30, 250).await {
            error!(error = ?e, "Failed to warm up email registry");
        }
    });

    let store = Arc::new(MySqlStore::new(pool.clone()));
    let codec = QrTokenCodec::new(&config.qr_token_secret, config.qr_token_max_age);
    let attendance = Data::new(AttendanceService::new(
        store.clone(),
        store.clone(),
        store,
        codec,
        Arc::new(DefaultClock),
    ));

    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                // wildcard {_:.*} also matches the UI's JS/CSS files
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(attendance.clone())
            .service(index)
            // auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await
    .context("Server terminated with an error")
}
