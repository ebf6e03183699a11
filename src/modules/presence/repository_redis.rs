use uuid::Uuid;

use crate::{
    api::error,
    configs::RedisCache,
    modules::presence::{repository::PresenceRepository, schema::PresenceRecord},
};

const PRESENCE_PREFIX: &str = "presence:";

/// Keys outlive the staleness window so `last_seen` stays readable for a day
/// after the last heartbeat.
const PRESENCE_RETENTION_SECS: usize = 24 * 60 * 60;

fn presence_key(user_id: &Uuid) -> String {
    format!("{PRESENCE_PREFIX}{user_id}")
}

#[derive(Clone)]
pub struct PresenceRedisRepository {
    cache: RedisCache,
}

impl PresenceRedisRepository {
    pub fn new(cache: RedisCache) -> Self {
        Self { cache }
    }
}

#[async_trait::async_trait]
impl PresenceRepository for PresenceRedisRepository {
    async fn upsert(&self, record: &PresenceRecord) -> Result<(), error::SystemError> {
        self.cache.set(&presence_key(&record.user_id), record, PRESENCE_RETENTION_SECS).await
    }

    async fn find(&self, user_id: &Uuid) -> Result<Option<PresenceRecord>, error::SystemError> {
        self.cache.get(&presence_key(user_id)).await
    }

    async fn find_many(
        &self,
        user_ids: &[Uuid],
    ) -> Result<Vec<Option<PresenceRecord>>, error::SystemError> {
        let keys: Vec<String> = user_ids.iter().map(presence_key).collect();
        self.cache.get_many(&keys).await
    }
}
