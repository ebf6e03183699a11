use actix_web::web::ServiceConfig;

use crate::modules::metadata::handle::*;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(get_metadata).service(set_metadata);
}
