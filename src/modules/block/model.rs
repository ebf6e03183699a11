use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BlockUserBody {
    pub user_id: Uuid,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}
