use actix_web::web::ServiceConfig;

use crate::modules::typing::handle::*;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(get_typing);
}
