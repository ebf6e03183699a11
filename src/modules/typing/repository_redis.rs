use std::collections::HashMap;

use chrono::{DateTime, Utc};
use deadpool_redis::redis::{self, AsyncCommands};
use uuid::Uuid;

use crate::{
    api::error,
    configs::RedisCache,
    modules::typing::{repository::TypingRepository, schema::TypingIndicator},
};

const TYPING_PREFIX: &str = "typing:";

fn typing_key(conversation_id: &Uuid) -> String {
    format!("{TYPING_PREFIX}{conversation_id}")
}

/// `typing:{conversation_id}` is a hash of user id -> RFC 3339 start time.
/// The key expiry is refreshed on every start so abandoned hashes disappear.
#[derive(Clone)]
pub struct TypingRedisRepository {
    cache: RedisCache,
    key_ttl_secs: i64,
}

impl TypingRedisRepository {
    pub fn new(cache: RedisCache, ttl: std::time::Duration) -> Self {
        let key_ttl_secs = (ttl.as_secs() as i64).max(1) * 2;
        Self { cache, key_ttl_secs }
    }
}

#[async_trait::async_trait]
impl TypingRepository for TypingRedisRepository {
    async fn upsert(&self, indicator: &TypingIndicator) -> Result<(), error::SystemError> {
        let mut conn = self.cache.pool().get().await?;
        let key = typing_key(&indicator.conversation_id);

        redis::pipe()
            .hset(&key, indicator.user_id.to_string(), indicator.started_at.to_rfc3339())
            .expire(&key, self.key_ttl_secs)
            .query_async::<()>(&mut *conn)
            .await?;

        Ok(())
    }

    async fn remove(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<(), error::SystemError> {
        let mut conn = self.cache.pool().get().await?;
        conn.hdel::<_, _, ()>(typing_key(conversation_id), user_id.to_string()).await?;
        Ok(())
    }

    async fn find_by_conversation(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Vec<TypingIndicator>, error::SystemError> {
        let mut conn = self.cache.pool().get().await?;
        let raw: HashMap<String, String> = conn.hgetall(typing_key(conversation_id)).await?;

        let indicators = raw
            .into_iter()
            .filter_map(|(user, started_at)| {
                let user_id = Uuid::parse_str(&user).ok()?;
                let started_at = DateTime::parse_from_rfc3339(&started_at).ok()?.with_timezone(&Utc);
                Some(TypingIndicator { conversation_id: *conversation_id, user_id, started_at })
            })
            .collect();

        Ok(indicators)
    }
}
