use actix_web::{get, post, web, HttpRequest};

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::presence::{
        model::{HeartbeatBody, PresenceQuery},
        repository_redis::PresenceRedisRepository,
        schema::PresenceRecord,
        service::PresenceService,
    },
    utils::{ValidatedJson, ValidatedQuery},
};

pub type PresenceSvc = PresenceService<PresenceRedisRepository>;

#[post("/presence/heartbeat")]
pub async fn heartbeat(
    presence_svc: web::Data<PresenceSvc>,
    ValidatedJson(body): ValidatedJson<HeartbeatBody>,
    req: HttpRequest,
) -> Result<success::Success<PresenceRecord>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let record = presence_svc.heartbeat(user_id, body.status).await?;

    Ok(success::Success::ok(Some(record)))
}

#[post("/presence/sign-out")]
pub async fn sign_out(
    presence_svc: web::Data<PresenceSvc>,
    req: HttpRequest,
) -> Result<success::Success<PresenceRecord>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let record = presence_svc.sign_out(user_id).await?;

    Ok(success::Success::ok(Some(record)))
}

#[get("/presence")]
pub async fn get_presence(
    presence_svc: web::Data<PresenceSvc>,
    ValidatedQuery(query): ValidatedQuery<PresenceQuery>,
) -> Result<success::Success<Vec<PresenceRecord>>, error::Error> {
    let user_ids = query.parse_ids().map_err(|_| error::Error::bad_request("Invalid user id"))?;

    let records = presence_svc.get_batch(&user_ids).await?;

    Ok(success::Success::ok(Some(records)))
}
