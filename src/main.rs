mod auth;
mod config;
mod database;
mod error;
mod middleware;
mod model;
mod routes;
mod service;
mod tmdb;

use actix_web::{middleware::Logger, web, App, HttpServer};
use auth::{PasswordHasher, TokenService};
use config::Config;
use log::{error, info};
use service::UserService;
use std::sync::Arc;
use std::time::Duration;
use tmdb::TmdbClient;

fn startup_error<E: std::fmt::Display>(message: &str, err: E) -> std::io::Error {
    error!("{}: {}", message, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", message, err))
}

#[actix_rt::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("movielist=debug,actix_web=info"),
    )
    .init();

    let config = Config::from_env().map_err(|err| startup_error("Configuration error", err))?;

    let db = sled::open(&config.database_path)
        .map_err(|err| startup_error("Database error", err))?;
    let hasher = PasswordHasher::new(config.bcrypt_cost);
    let tokens = Arc::new(TokenService::new(
        &config.jwt_secret,
        chrono::Duration::seconds(config.token_ttl_secs),
    ));
    let movies = Arc::new(
        TmdbClient::new(
            &config.tmdb_base_url,
            &config.api_key,
            Duration::from_secs(config.upstream_timeout_secs),
        )
        .map_err(|err| startup_error("HTTP client error", err))?,
    );
    let service = web::Data::new(UserService::new(db, hasher, tokens, movies));

    info!("listening on {}", config.bind_address);
    HttpServer::new(move || {
        let service = service.clone();
        App::new()
            .wrap(Logger::default())
            .configure(|cfg| routes::configure(cfg, service))
    })
    .bind(&config.bind_address)?
    .run()
    .await
}
