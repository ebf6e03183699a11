use actix_web::{get, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::{
        conversation::repository_pg::ConversationPgRepository,
        typing::{
            repository_redis::TypingRedisRepository, schema::TypingIndicator,
            service::TypingService,
        },
    },
};

pub type TypingSvc = TypingService<TypingRedisRepository, ConversationPgRepository>;

#[get("/conversations/{conversation_id}/typing")]
pub async fn get_typing(
    typing_svc: web::Data<TypingSvc>,
    conversation_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<Vec<TypingIndicator>>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let typing = typing_svc.observe(*conversation_id, user_id).await?;

    Ok(success::Success::ok(Some(typing)))
}
