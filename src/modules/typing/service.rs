use std::sync::Arc;
use uuid::Uuid;

use crate::{
    api::error,
    modules::{
        conversation::{repository::ConversationRepository, service::require_active_participant},
        delivery::transport::{PushEvent, PushHub, PushTransport, Topic},
        typing::{repository::TypingRepository, schema::TypingIndicator},
    },
    utils::Clock,
};

#[derive(Clone)]
pub struct TypingService<T, C>
where
    T: TypingRepository + Send + Sync + 'static,
    C: ConversationRepository + Send + Sync + 'static,
{
    typing_repo: Arc<T>,
    conversation_repo: Arc<C>,
    hub: Arc<PushHub>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl<T, C> TypingService<T, C>
where
    T: TypingRepository + Send + Sync + 'static,
    C: ConversationRepository + Send + Sync + 'static,
{
    pub fn with_dependencies(
        typing_repo: Arc<T>,
        conversation_repo: Arc<C>,
        hub: Arc<PushHub>,
        clock: Arc<dyn Clock>,
        ttl: std::time::Duration,
    ) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(5));
        TypingService { typing_repo, conversation_repo, hub, clock, ttl }
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Upserts a fresh indicator; a repeated start simply moves `started_at`.
    pub async fn start(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<TypingIndicator, error::SystemError> {
        require_active_participant(self.conversation_repo.as_ref(), conversation_id, user_id)
            .await?;

        let indicator = TypingIndicator { conversation_id, user_id, started_at: self.clock.now() };
        self.typing_repo.upsert(&indicator).await?;

        self.hub.publish(
            Topic::Conversation(conversation_id),
            PushEvent::TypingChanged { indicator: indicator.clone(), active: true },
        );
        Ok(indicator)
    }

    pub async fn stop(&self, conversation_id: Uuid, user_id: Uuid) -> Result<(), error::SystemError> {
        require_active_participant(self.conversation_repo.as_ref(), conversation_id, user_id)
            .await?;

        self.typing_repo.remove(&conversation_id, &user_id).await?;

        let indicator = TypingIndicator { conversation_id, user_id, started_at: self.clock.now() };
        self.hub.publish(
            Topic::Conversation(conversation_id),
            PushEvent::TypingChanged { indicator, active: false },
        );
        Ok(())
    }

    /// Live indicators of everyone but the viewer. Expired rows are filtered
    /// here even if the producer never got to delete them.
    pub async fn observe(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
    ) -> Result<Vec<TypingIndicator>, error::SystemError> {
        require_active_participant(self.conversation_repo.as_ref(), conversation_id, viewer_id)
            .await?;

        let now = self.clock.now();
        let mut live: Vec<TypingIndicator> = self
            .typing_repo
            .find_by_conversation(&conversation_id)
            .await?
            .into_iter()
            .filter(|t| t.user_id != viewer_id && t.is_live(now, self.ttl))
            .collect();

        live.sort_by_key(|t| t.started_at);
        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::Fixture;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_unrefreshed_indicator_expires_for_readers() {
        let fx = Fixture::new();
        let (alice, bob) = (fx.user(), fx.user());
        let conversation = fx.direct(alice, bob).await;
        let svc = fx.typing_service();

        svc.start(conversation.id, alice).await.unwrap();
        assert_eq!(svc.observe(conversation.id, bob).await.unwrap().len(), 1);
        assert!(svc.observe(conversation.id, alice).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(svc.observe(conversation.id, bob).await.unwrap().len(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(svc.observe(conversation.id, bob).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_refreshes_and_stop_removes() {
        let fx = Fixture::new();
        let (alice, bob) = (fx.user(), fx.user());
        let conversation = fx.direct(alice, bob).await;
        let svc = fx.typing_service();

        svc.start(conversation.id, alice).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        svc.start(conversation.id, alice).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(svc.observe(conversation.id, bob).await.unwrap().len(), 1);

        svc.stop(conversation.id, alice).await.unwrap();
        assert!(svc.observe(conversation.id, bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outsider_cannot_type() {
        let fx = Fixture::new();
        let (alice, bob, carol) = (fx.user(), fx.user(), fx.user());
        let conversation = fx.direct(alice, bob).await;

        let err = fx.typing_service().start(conversation.id, carol).await.unwrap_err();
        assert!(matches!(err, error::SystemError::NotAParticipant { .. }));
    }

    #[tokio::test]
    async fn test_outsider_cannot_clear_typing() {
        let fx = Fixture::new();
        let (alice, bob, carol) = (fx.user(), fx.user(), fx.user());
        let conversation = fx.direct(alice, bob).await;
        let svc = fx.typing_service();

        svc.start(conversation.id, alice).await.unwrap();
        let err = svc.stop(conversation.id, carol).await.unwrap_err();
        assert!(matches!(err, error::SystemError::NotAParticipant { .. }));
        assert_eq!(fx.store.typing_rows(conversation.id).len(), 1);
    }
}
