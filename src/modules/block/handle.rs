use actix_web::{delete, get, post, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::block::{
        model::BlockUserBody, repository_pg::BlockPgRepository, schema::BlockEntity,
        service::BlockService,
    },
    utils::ValidatedJson,
};

pub type BlockSvc = BlockService<BlockPgRepository>;

#[get("/blocks")]
pub async fn get_blocks(
    block_svc: web::Data<BlockSvc>,
    req: HttpRequest,
) -> Result<success::Success<Vec<BlockEntity>>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let blocks = block_svc.list(user_id).await?;

    Ok(success::Success::ok(Some(blocks)))
}

#[post("/blocks")]
pub async fn block_user(
    block_svc: web::Data<BlockSvc>,
    ValidatedJson(body): ValidatedJson<BlockUserBody>,
    req: HttpRequest,
) -> Result<success::Success<BlockEntity>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let block = block_svc.block(user_id, body.user_id, body.reason).await?;

    Ok(success::Success::created(Some(block)).message("User blocked"))
}

#[delete("/blocks/{user_id}")]
pub async fn unblock_user(
    block_svc: web::Data<BlockSvc>,
    blocked_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    block_svc.unblock(user_id, *blocked_id).await?;

    Ok(success::Success::no_content())
}
