use actix_cors::Cors;
use actix_web::{
    self, App, HttpServer,
    middleware::{Logger, from_fn},
    web,
};
use std::sync::{Arc, LazyLock};
use tracing_subscriber::EnvFilter;

use crate::{
    configs::{RedisCache, connect_database},
    middlewares::authentication,
    modules::{
        block::{repository_pg::BlockPgRepository, service::BlockService},
        conversation::{repository_pg::ConversationPgRepository, service::ConversationService},
        delivery::{backend::ServiceBackend, transport::PushHub},
        message::{repository_pg::MessageRepositoryPg, service::MessageService},
        metadata::{repository_pg::MetadataPgRepository, service::MetadataService},
        presence::{repository_redis::PresenceRedisRepository, service::PresenceService},
        receipt::{repository_pg::ReceiptPgRepository, service::ReceiptService},
        typing::{repository_redis::TypingRedisRepository, service::TypingService},
        websocket::{handler::websocket_handler, registry::SessionRegistry, session::Realtime},
    },
    utils::{Clock, SystemClock},
};

mod api;
mod configs;
mod constants;
mod middlewares;
mod modules;
#[cfg(test)]
mod test;
mod utils;

pub static ENV: LazyLock<constants::Env> = LazyLock::new(|| {
    dotenvy::dotenv().ok();
    tracing::info!("Environment variables loaded from .env file");
    constants::Env::default()
});

#[actix_web::get("/")]
async fn health_check() -> &'static str {
    "Server is running"
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let db_pool = connect_database(&ENV.database_url).await.map_err(|e| {
        tracing::error!("Database connection error: {}", e);
        std::io::Error::other("Database connection error")
    })?;

    let redis_pool = RedisCache::new(&ENV.redis_url).await.map_err(|e| {
        tracing::error!("Redis connection error: {}", e);
        std::io::Error::other("Redis connection error")
    })?;

    let config = ENV.messaging();
    let hub = Arc::new(PushHub::new(config.push_channel_capacity));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let conversation_repo = Arc::new(ConversationPgRepository::new(db_pool.clone()));
    let message_repo = Arc::new(MessageRepositoryPg::new(db_pool.clone()));
    let receipt_repo = Arc::new(ReceiptPgRepository::new(db_pool.clone()));
    let metadata_repo = Arc::new(MetadataPgRepository::new(db_pool.clone()));
    let block_repo = Arc::new(BlockPgRepository::new(db_pool.clone()));
    let typing_repo = Arc::new(TypingRedisRepository::new(redis_pool.clone(), config.typing_ttl));
    let presence_repo = Arc::new(PresenceRedisRepository::new(redis_pool.clone()));

    let conversation_service = ConversationService::with_dependencies(
        conversation_repo.clone(),
        message_repo.clone(),
        block_repo.clone(),
        clock.clone(),
    );
    let message_service = MessageService::with_dependencies(
        message_repo.clone(),
        conversation_repo.clone(),
        block_repo.clone(),
        hub.clone(),
        clock.clone(),
        config.clone(),
    );
    let receipt_service = ReceiptService::with_dependencies(
        receipt_repo,
        conversation_repo.clone(),
        block_repo.clone(),
        hub.clone(),
        clock.clone(),
    );
    let metadata_service = MetadataService::with_dependencies(metadata_repo);
    let block_service = BlockService::with_dependencies(block_repo, clock.clone());
    let typing_service = TypingService::with_dependencies(
        typing_repo,
        conversation_repo,
        hub.clone(),
        clock.clone(),
        config.typing_ttl,
    );
    let presence_service = PresenceService::with_dependencies(
        presence_repo,
        hub.clone(),
        clock.clone(),
        config.presence_stale_after,
    );

    let realtime = Realtime {
        backend: ServiceBackend::with_dependencies(
            message_service.clone(),
            receipt_service.clone(),
            metadata_service.clone(),
            typing_service.clone(),
            block_service.clone(),
        ),
        hub: hub.clone(),
        presence: presence_service.clone(),
        conversations: conversation_service.clone(),
        sessions: Arc::new(SessionRegistry::new()),
        clock,
        config,
    };

    tracing::info!("Starting server at http://{}:{}", ENV.ip.as_str(), ENV.port);
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&ENV.frontend_url)
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(conversation_service.clone()))
            .app_data(web::Data::new(message_service.clone()))
            .app_data(web::Data::new(receipt_service.clone()))
            .app_data(web::Data::new(metadata_service.clone()))
            .app_data(web::Data::new(block_service.clone()))
            .app_data(web::Data::new(typing_service.clone()))
            .app_data(web::Data::new(presence_service.clone()))
            .app_data(web::Data::new(realtime.clone()))
            .service(health_check)
            .route("/ws", web::get().to(websocket_handler))
            .service(
                web::scope("/api")
                    .wrap(from_fn(authentication))
                    .configure(modules::conversation::route::configure)
                    .configure(modules::message::route::configure)
                    .configure(modules::receipt::route::configure)
                    .configure(modules::metadata::route::configure)
                    .configure(modules::block::route::configure)
                    .configure(modules::typing::route::configure)
                    .configure(modules::presence::route::configure),
            )
    })
    .bind((ENV.ip.as_str(), ENV.port))?
    .workers(2)
    .run()
    .await?;

    hub.shutdown();
    Ok(())
}
