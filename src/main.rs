use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netdesign::api;
use netdesign::config::ServiceConfig;
use netdesign::engine::DesignEngine;
use netdesign::errors;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netdesign=info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = ServiceConfig::from_env().context("load service config")?;

    let engine = DesignEngine::bootstrap(&cfg)?;
    let shared_engine = web::Data::new(engine);

    let bind_addr: SocketAddr = cfg.server.bind_addr.parse().with_context(|| {
        format!(
            "invalid NETDESIGN_BIND '{}': expected host:port",
            cfg.server.bind_addr
        )
    })?;

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allowed_headers(vec![
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
                actix_web::http::header::AUTHORIZATION,
            ])
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(shared_engine.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _| errors::json_error(err)))
            .configure(api::configure)
    })
    .bind(bind_addr)?
    .workers(cfg.server.workers)
    .run()
    .await?;

    Ok(())
}
