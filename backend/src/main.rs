mod auth;
mod config;
mod db;
mod error;
mod inference;
mod routes;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use config::{AppConfig, StoreBackend};
use db::AccountStore;
use db::dynamodb_repository::DynamoDbRepository;
use db::memory_repository::MemoryRepository;
use inference::InferenceService;
use inference::labels::ClassLabels;
use inference::model::load_classifier;
use inference::preprocess::Preprocessor;
use inference::ranking::Ranker;
use routes::configure_routes;
use std::env;
use std::fmt::Display;
use std::sync::Arc;

fn startup_error(stage: &str, e: impl Display) -> std::io::Error {
    log::error!("Startup failed while {}: {}", stage, e);
    std::io::Error::other(format!("{}: {}", stage, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::load().map_err(|e| startup_error("loading configuration", e))?;
    log::info!(
        "Model: backend={}, path={}, labels={}",
        config.model.backend,
        config.model.path.display(),
        config.model.labels_path.display()
    );
    log::info!(
        "Pipeline: resize={:?}, normalization={:?}, output={:?}, top_k={}",
        config.preprocessing.resize_filter,
        config.preprocessing.normalization,
        config.ranking.output_activation,
        config.ranking.top_k
    );

    let labels = ClassLabels::load(&config.model.labels_path)
        .map_err(|e| startup_error("loading class labels", e))?;
    log::info!("Loaded {} class labels:", labels.len());
    for (i, name) in labels.iter().enumerate() {
        log::info!("  {}: {}", i, name);
    }

    let classifier = match load_classifier(&config.model) {
        Ok(classifier) => Some(classifier),
        Err(e) if !config.model.required => {
            log::warn!("Continuing without a classifier: {}", e);
            None
        }
        Err(e) => return Err(startup_error("loading the classifier", e)),
    };

    let inference = InferenceService::new(
        Preprocessor::new(config.preprocessing.clone()),
        classifier,
        Ranker::new(config.ranking.clone(), Arc::new(labels)),
    );
    if inference.is_ready() {
        inference
            .verify()
            .map_err(|e| startup_error("probing the classifier", e))?;
    }

    let store = match config.store.backend {
        StoreBackend::Memory => {
            log::warn!("Using the in-memory account store; accounts are lost on restart");
            AccountStore::Memory(MemoryRepository::new())
        }
        StoreBackend::DynamoDb => {
            let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
            let repo = DynamoDbRepository::new(
                DynamoDbClient::new(&aws_config),
                config.store.users_table.clone(),
            );
            repo.verify_table()
                .await
                .map_err(|e| startup_error("connecting to DynamoDB", e))?;
            AccountStore::DynamoDb(repo)
        }
    };
    log::info!("Account store: {}", store.backend());

    let bind_address = config.bind_address();
    let max_upload_bytes = config.server.max_upload_bytes;
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(inference.clone()))
            .app_data(web::Data::new(store.clone()))
            .configure(|cfg| configure_routes(cfg, max_upload_bytes))
    })
    .bind(&bind_address)?
    .run()
    .await
}
