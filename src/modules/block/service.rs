use std::sync::Arc;
use uuid::Uuid;

use crate::{
    api::error,
    modules::block::{repository::BlockRepository, schema::BlockEntity},
    utils::Clock,
};

#[derive(Clone)]
pub struct BlockService<B>
where
    B: BlockRepository + Send + Sync + 'static,
{
    block_repo: Arc<B>,
    clock: Arc<dyn Clock>,
}

impl<B> BlockService<B>
where
    B: BlockRepository + Send + Sync + 'static,
{
    pub fn with_dependencies(block_repo: Arc<B>, clock: Arc<dyn Clock>) -> Self {
        BlockService { block_repo, clock }
    }

    pub async fn block(
        &self,
        blocker_id: Uuid,
        blocked_id: Uuid,
        reason: Option<String>,
    ) -> Result<BlockEntity, error::SystemError> {
        if blocker_id == blocked_id {
            return Err(error::SystemError::bad_request("You cannot block yourself"));
        }

        let block = self
            .block_repo
            .upsert(&blocker_id, &blocked_id, reason.as_deref(), self.clock.now())
            .await?;

        tracing::info!(%blocker_id, %blocked_id, "user blocked");
        Ok(block)
    }

    /// Returns whether an edge was removed. History hidden by the block becomes
    /// visible again since nothing was deleted.
    pub async fn unblock(&self, blocker_id: Uuid, blocked_id: Uuid) -> Result<bool, error::SystemError> {
        let removed = self.block_repo.delete(&blocker_id, &blocked_id).await?;

        if removed {
            tracing::info!(%blocker_id, %blocked_id, "user unblocked");
        }
        Ok(removed)
    }

    pub async fn list(&self, blocker_id: Uuid) -> Result<Vec<BlockEntity>, error::SystemError> {
        self.block_repo.find_by_blocker(&blocker_id).await
    }

    /// Users whose content is hidden from `viewer_id`.
    pub async fn hidden_senders(&self, viewer_id: Uuid) -> Result<Vec<Uuid>, error::SystemError> {
        let blocks = self.block_repo.find_by_blocker(&viewer_id).await?;
        Ok(blocks.into_iter().map(|b| b.blocked_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::Fixture;

    #[tokio::test]
    async fn test_block_is_idempotent() {
        let fx = Fixture::new();
        let (alice, bob) = (fx.user(), fx.user());
        let svc = fx.block_service();

        let first = svc.block(alice, bob, Some("spam".into())).await.unwrap();
        let second = svc.block(alice, bob, None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(svc.list(alice).await.unwrap().len(), 1);
        assert_eq!(svc.hidden_senders(alice).await.unwrap(), vec![bob]);
        assert!(svc.hidden_senders(bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unblock_twice_reports_nothing_removed() {
        let fx = Fixture::new();
        let (alice, bob) = (fx.user(), fx.user());
        let svc = fx.block_service();

        svc.block(alice, bob, None).await.unwrap();
        assert!(svc.unblock(alice, bob).await.unwrap());
        assert!(!svc.unblock(alice, bob).await.unwrap());
    }

    #[tokio::test]
    async fn test_cannot_block_self() {
        let fx = Fixture::new();
        let alice = fx.user();

        let err = fx.block_service().block(alice, alice, None).await.unwrap_err();
        assert!(matches!(err, error::SystemError::BadRequest(_)));
    }
}
