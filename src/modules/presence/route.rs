use actix_web::web::ServiceConfig;

use crate::modules::presence::handle::*;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(heartbeat).service(sign_out).service(get_presence);
}
