use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::modules::presence::schema::PresenceStatus;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatBody {
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PresenceQuery {
    /// Comma separated user ids.
    #[validate(length(min = 1))]
    pub user_ids: String,
}

impl PresenceQuery {
    pub fn parse_ids(&self) -> Result<Vec<Uuid>, uuid::Error> {
        self.user_ids.split(',').map(|s| Uuid::parse_str(s.trim())).collect()
    }
}
