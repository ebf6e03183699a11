use actix_web::{get, patch, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::metadata::{
        model::MetadataPatch, repository_pg::MetadataPgRepository, schema::ConversationMetadata,
        service::MetadataService,
    },
    utils::ValidatedJson,
};

pub type MetadataSvc = MetadataService<MetadataPgRepository>;

#[get("/conversations/{conversation_id}/metadata")]
pub async fn get_metadata(
    metadata_svc: web::Data<MetadataSvc>,
    conversation_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<ConversationMetadata>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let metadata = metadata_svc.get(*conversation_id, user_id).await?;

    Ok(success::Success::ok(Some(metadata)))
}

#[patch("/conversations/{conversation_id}/metadata")]
pub async fn set_metadata(
    metadata_svc: web::Data<MetadataSvc>,
    conversation_id: web::Path<Uuid>,
    ValidatedJson(body): ValidatedJson<MetadataPatch>,
    req: HttpRequest,
) -> Result<success::Success<ConversationMetadata>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let metadata = metadata_svc.set(*conversation_id, user_id, body).await?;

    Ok(success::Success::ok(Some(metadata)).message("Conversation settings updated"))
}
