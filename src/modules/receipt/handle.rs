use actix_web::{post, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::{
        block::repository_pg::BlockPgRepository,
        conversation::repository_pg::ConversationPgRepository,
        receipt::{
            model::{MarkMessagesBody, StatusChange},
            repository_pg::ReceiptPgRepository,
            service::ReceiptService,
        },
    },
    utils::ValidatedJson,
};

pub type ReceiptSvc =
    ReceiptService<ReceiptPgRepository, ConversationPgRepository, BlockPgRepository>;

#[post("/conversations/{conversation_id}/read")]
pub async fn mark_read(
    receipt_svc: web::Data<ReceiptSvc>,
    conversation_id: web::Path<Uuid>,
    ValidatedJson(body): ValidatedJson<MarkMessagesBody>,
    req: HttpRequest,
) -> Result<success::Success<Vec<StatusChange>>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let changes = receipt_svc.mark_read(*conversation_id, user_id, &body.message_ids).await?;

    Ok(success::Success::ok(Some(changes)).message("Messages marked as read"))
}

#[post("/conversations/{conversation_id}/delivered")]
pub async fn mark_delivered(
    receipt_svc: web::Data<ReceiptSvc>,
    conversation_id: web::Path<Uuid>,
    ValidatedJson(body): ValidatedJson<MarkMessagesBody>,
    req: HttpRequest,
) -> Result<success::Success<Vec<StatusChange>>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let changes =
        receipt_svc.acknowledge_delivered(*conversation_id, user_id, &body.message_ids).await?;

    Ok(success::Success::ok(Some(changes)))
}
