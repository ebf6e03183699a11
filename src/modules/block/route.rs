use actix_web::web::ServiceConfig;

use crate::modules::block::handle::*;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(get_blocks).service(block_user).service(unblock_user);
}
