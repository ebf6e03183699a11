use std::sync::Arc;
use uuid::Uuid;

use crate::{
    api::error,
    modules::{
        delivery::transport::{PushEvent, PushHub, PushTransport, Topic},
        presence::{
            repository::PresenceRepository,
            schema::{PresenceRecord, PresenceStatus},
        },
    },
    utils::Clock,
};

#[derive(Clone)]
pub struct PresenceService<P>
where
    P: PresenceRepository + Send + Sync + 'static,
{
    presence_repo: Arc<P>,
    hub: Arc<PushHub>,
    clock: Arc<dyn Clock>,
    stale_after: chrono::Duration,
}

impl<P> PresenceService<P>
where
    P: PresenceRepository + Send + Sync + 'static,
{
    pub fn with_dependencies(
        presence_repo: Arc<P>,
        hub: Arc<PushHub>,
        clock: Arc<dyn Clock>,
        stale_after: std::time::Duration,
    ) -> Self {
        let stale_after =
            chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::seconds(60));
        PresenceService { presence_repo, hub, clock, stale_after }
    }

    /// `offline` cannot be asserted by a heartbeat; it is inferred from silence
    /// or set through [`PresenceService::sign_out`].
    pub async fn heartbeat(
        &self,
        user_id: Uuid,
        status: PresenceStatus,
    ) -> Result<PresenceRecord, error::SystemError> {
        if status == PresenceStatus::Offline {
            return Err(error::SystemError::bad_request(
                "Heartbeat status must be online or away",
            ));
        }

        self.store(user_id, status).await
    }

    pub async fn sign_out(&self, user_id: Uuid) -> Result<PresenceRecord, error::SystemError> {
        self.store(user_id, PresenceStatus::Offline).await
    }

    pub async fn get(&self, user_id: Uuid) -> Result<PresenceRecord, error::SystemError> {
        let now = self.clock.now();
        let record = self.presence_repo.find(&user_id).await?;

        Ok(match record {
            Some(r) => r.effective(now, self.stale_after),
            None => PresenceRecord::unknown(user_id),
        })
    }

    pub async fn get_batch(
        &self,
        user_ids: &[Uuid],
    ) -> Result<Vec<PresenceRecord>, error::SystemError> {
        let now = self.clock.now();
        let records = self.presence_repo.find_many(user_ids).await?;

        Ok(user_ids
            .iter()
            .zip(records)
            .map(|(user_id, record)| match record {
                Some(r) => r.effective(now, self.stale_after),
                None => PresenceRecord::unknown(*user_id),
            })
            .collect())
    }

    async fn store(
        &self,
        user_id: Uuid,
        status: PresenceStatus,
    ) -> Result<PresenceRecord, error::SystemError> {
        let previous = self.get(user_id).await?.status;

        let record = PresenceRecord { user_id, status, last_seen: Some(self.clock.now()) };
        self.presence_repo.upsert(&record).await?;

        if previous != status {
            tracing::debug!(%user_id, ?status, "presence changed");
            self.hub.publish(Topic::Presence, PushEvent::PresenceChanged { presence: record.clone() });
        }

        Ok(record)
    }
}
