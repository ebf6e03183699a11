use actix_web::web::ServiceConfig;

use crate::modules::conversation::handle::*;

// literal segments before `{conversation_id}` so "direct" never parses as an id
pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(get_conversations)
        .service(find_or_create_direct)
        .service(create_group)
        .service(get_conversation)
        .service(add_participant)
        .service(leave_conversation);
}
