use actix_web::{delete, get, post, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::{
        block::repository_pg::BlockPgRepository,
        conversation::{
            model::{
                AddParticipantBody, ConversationDetail, ConversationListQuery,
                NewDirectConversation, NewGroupConversationBody,
            },
            repository_pg::ConversationPgRepository,
            service::ConversationService,
        },
        message::repository_pg::MessageRepositoryPg,
    },
    utils::{ValidatedJson, ValidatedQuery},
};

pub type ConversationSvc =
    ConversationService<ConversationPgRepository, MessageRepositoryPg, BlockPgRepository>;

#[get("/conversations")]
pub async fn get_conversations(
    conversation_svc: web::Data<ConversationSvc>,
    ValidatedQuery(query): ValidatedQuery<ConversationListQuery>,
    req: HttpRequest,
) -> Result<success::Success<Vec<ConversationDetail>>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let conversations = conversation_svc.list_for_user(user_id, query.include_archived).await?;

    Ok(success::Success::ok(Some(conversations)).message("Successfully retrieved conversations"))
}

#[get("/conversations/{conversation_id}")]
pub async fn get_conversation(
    conversation_svc: web::Data<ConversationSvc>,
    conversation_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<ConversationDetail>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let conversation = conversation_svc.get_for_user(*conversation_id, user_id).await?;

    Ok(success::Success::ok(Some(conversation)))
}

#[post("/conversations/direct")]
pub async fn find_or_create_direct(
    conversation_svc: web::Data<ConversationSvc>,
    ValidatedJson(body): ValidatedJson<NewDirectConversation>,
    req: HttpRequest,
) -> Result<success::Success<ConversationDetail>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let conversation = conversation_svc.find_or_create_direct(user_id, body.recipient_id).await?;

    Ok(success::Success::ok(Some(conversation)))
}

#[post("/conversations/group")]
pub async fn create_group(
    conversation_svc: web::Data<ConversationSvc>,
    ValidatedJson(body): ValidatedJson<NewGroupConversationBody>,
    req: HttpRequest,
) -> Result<success::Success<ConversationDetail>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let conversation = conversation_svc
        .create_group(user_id, body.name, body.description, body.member_ids)
        .await?;

    Ok(success::Success::created(Some(conversation)).message("Successfully created conversation"))
}

#[post("/conversations/{conversation_id}/participants")]
pub async fn add_participant(
    conversation_svc: web::Data<ConversationSvc>,
    conversation_id: web::Path<Uuid>,
    ValidatedJson(body): ValidatedJson<AddParticipantBody>,
    req: HttpRequest,
) -> Result<success::Success<ConversationDetail>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let conversation =
        conversation_svc.add_participant(*conversation_id, user_id, body.user_id).await?;

    Ok(success::Success::ok(Some(conversation)).message("Participant added"))
}

#[delete("/conversations/{conversation_id}")]
pub async fn leave_conversation(
    conversation_svc: web::Data<ConversationSvc>,
    conversation_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    conversation_svc.leave(*conversation_id, user_id).await?;

    Ok(success::Success::no_content())
}
