use actix_web::{get, post, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::{
        block::repository_pg::BlockPgRepository,
        conversation::repository_pg::ConversationPgRepository,
        message::{
            model::{MessageCursor, MessagePage, MessageQueryRequest, SendMessageBody},
            repository_pg::MessageRepositoryPg,
            schema::MessageEntity,
            service::MessageService,
        },
    },
    utils::{ValidatedJson, ValidatedQuery},
};

pub type MessageSvc =
    MessageService<MessageRepositoryPg, ConversationPgRepository, BlockPgRepository>;

#[get("/conversations/{conversation_id}/messages")]
pub async fn get_messages(
    message_svc: web::Data<MessageSvc>,
    conversation_id: web::Path<Uuid>,
    ValidatedQuery(query): ValidatedQuery<MessageQueryRequest>,
    req: HttpRequest,
) -> Result<success::Success<MessagePage>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let before = query.cursor.as_deref().map(str::parse::<MessageCursor>).transpose()?;
    let page = message_svc.page(*conversation_id, user_id, query.limit, before).await?;

    Ok(success::Success::ok(Some(page)).message("Successfully retrieved messages"))
}

#[post("/conversations/{conversation_id}/messages")]
pub async fn send_message(
    message_svc: web::Data<MessageSvc>,
    conversation_id: web::Path<Uuid>,
    ValidatedJson(body): ValidatedJson<SendMessageBody>,
    req: HttpRequest,
) -> Result<success::Success<MessageEntity>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let message =
        message_svc.append(*conversation_id, user_id, body.message, body.client_ref).await?;

    Ok(success::Success::created(Some(message)))
}
