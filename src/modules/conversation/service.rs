use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use uuid::Uuid;

use crate::{
    api::error,
    modules::{
        block::repository::BlockRepository,
        conversation::{
            model::{ConversationDetail, NewGroupConversation},
            repository::ConversationRepository,
            schema::{ConversationType, ParticipantEntity},
        },
        message::repository::MessageRepository,
    },
    utils::Clock,
};

/// Loads the caller's participant row, failing unless it is active.
pub async fn require_active_participant<C>(
    conversation_repo: &C,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<ParticipantEntity, error::SystemError>
where
    C: ConversationRepository + ?Sized,
{
    conversation_repo
        .find_participant(&conversation_id, &user_id)
        .await?
        .filter(ParticipantEntity::is_active)
        .ok_or_else(|| error::SystemError::not_a_participant(conversation_id, user_id))
}

#[derive(Clone)]
pub struct ConversationService<C, M, B>
where
    C: ConversationRepository + Send + Sync + 'static,
    M: MessageRepository + Send + Sync + 'static,
    B: BlockRepository + Send + Sync + 'static,
{
    conversation_repo: Arc<C>,
    message_repo: Arc<M>,
    block_repo: Arc<B>,
    clock: Arc<dyn Clock>,
}

impl<C, M, B> ConversationService<C, M, B>
where
    C: ConversationRepository + Send + Sync + 'static,
    M: MessageRepository + Send + Sync + 'static,
    B: BlockRepository + Send + Sync + 'static,
{
    pub fn with_dependencies(
        conversation_repo: Arc<C>,
        message_repo: Arc<M>,
        block_repo: Arc<B>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        ConversationService { conversation_repo, message_repo, block_repo, clock }
    }

    pub async fn find_or_create_direct(
        &self,
        user_id: Uuid,
        recipient_id: Uuid,
    ) -> Result<ConversationDetail, error::SystemError> {
        if user_id == recipient_id {
            return Err(error::SystemError::bad_request(
                "A direct conversation needs two different users",
            ));
        }

        let (conversation, created) = self
            .conversation_repo
            .find_or_create_direct(&user_id, &recipient_id, self.clock.now())
            .await?;

        if created {
            tracing::info!(conversation_id = %conversation.id, %user_id, %recipient_id, "direct conversation created");
        }

        self.get_for_user(conversation.id, user_id).await
    }

    pub async fn create_group(
        &self,
        creator_id: Uuid,
        name: String,
        description: Option<String>,
        member_ids: Vec<Uuid>,
    ) -> Result<ConversationDetail, error::SystemError> {
        let mut seen = HashSet::from([creator_id]);
        let mut members = vec![creator_id];
        members.extend(member_ids.into_iter().filter(|id| seen.insert(*id)));

        if members.len() < 2 {
            return Err(error::SystemError::bad_request(
                "A group needs at least one member besides the creator",
            ));
        }

        let group = NewGroupConversation {
            name: name.trim().to_string(),
            description,
            created_by: creator_id,
            member_ids: members,
        };
        let conversation = self.conversation_repo.create_group(&group, self.clock.now()).await?;

        tracing::info!(conversation_id = %conversation.id, %creator_id, members = group.member_ids.len(), "group conversation created");
        self.get_for_user(conversation.id, creator_id).await
    }

    /// Most recently updated first. Archived conversations are skipped unless
    /// asked for; direct chats with a user the viewer blocked are hidden and
    /// blocked senders never show up as the last message.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        include_archived: bool,
    ) -> Result<Vec<ConversationDetail>, error::SystemError> {
        let conversations = self.conversation_repo.find_by_user(&user_id).await?;
        if conversations.is_empty() {
            return Ok(vec![]);
        }

        let conversation_ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();
        let hidden = self.hidden_senders(user_id).await?;

        let participants = self.conversation_repo.find_participants(&conversation_ids).await?;
        let mut participant_map = participants.into_iter().fold(
            HashMap::<Uuid, Vec<ParticipantEntity>>::new(),
            |mut acc, participant| {
                acc.entry(participant.conversation_id).or_default().push(participant);
                acc
            },
        );

        let mut last_messages: HashMap<Uuid, _> = self
            .message_repo
            .find_last_messages(&conversation_ids, &hidden)
            .await?
            .into_iter()
            .map(|m| (m.conversation_id, m))
            .collect();

        let hidden: HashSet<Uuid> = hidden.into_iter().collect();

        let details = conversations
            .into_iter()
            .filter_map(|conversation| {
                let participants = participant_map.remove(&conversation.id).unwrap_or_default();
                let viewer = participants.iter().find(|p| p.user_id == user_id)?.clone();

                if viewer.archived && !include_archived {
                    return None;
                }

                let touches_block = conversation._type == ConversationType::Direct
                    && participants.iter().any(|p| hidden.contains(&p.user_id));
                if touches_block {
                    return None;
                }

                let last_message = last_messages.remove(&conversation.id);
                Some(ConversationDetail::assemble(conversation, &participants, last_message, &viewer))
            })
            .collect();

        Ok(details)
    }

    pub async fn get_for_user(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<ConversationDetail, error::SystemError> {
        let conversation = self
            .conversation_repo
            .find_by_id(&conversation_id)
            .await?
            .ok_or_else(|| error::SystemError::not_found("Conversation not found"))?;

        let participants = self.conversation_repo.find_participants(&[conversation_id]).await?;
        let viewer = participants
            .iter()
            .find(|p| p.user_id == user_id && p.is_active())
            .cloned()
            .ok_or_else(|| error::SystemError::not_a_participant(conversation_id, user_id))?;

        let hidden = self.hidden_senders(user_id).await?;
        let last_message =
            self.message_repo.find_last_messages(&[conversation_id], &hidden).await?.pop();

        Ok(ConversationDetail::assemble(conversation, &participants, last_message, &viewer))
    }

    /// Group only. Re-adding a member who left restores their old row.
    pub async fn add_participant(
        &self,
        conversation_id: Uuid,
        actor_id: Uuid,
        user_id: Uuid,
    ) -> Result<ConversationDetail, error::SystemError> {
        let conversation = self
            .conversation_repo
            .find_by_id(&conversation_id)
            .await?
            .ok_or_else(|| error::SystemError::not_found("Conversation not found"))?;

        if conversation._type != ConversationType::Group {
            return Err(error::SystemError::bad_request(
                "Participants can only be added to group conversations",
            ));
        }

        require_active_participant(self.conversation_repo.as_ref(), conversation_id, actor_id)
            .await?;

        self.conversation_repo.upsert_participant(&conversation_id, &user_id, self.clock.now()).await?;

        tracing::info!(%conversation_id, %actor_id, %user_id, "participant added");
        self.get_for_user(conversation_id, actor_id).await
    }

    /// Soft leave. The row and the history stay, so the user can be brought
    /// back by `add_participant` or by looking the direct pair up again.
    pub async fn leave(&self, conversation_id: Uuid, user_id: Uuid) -> Result<(), error::SystemError> {
        require_active_participant(self.conversation_repo.as_ref(), conversation_id, user_id)
            .await?;

        self.conversation_repo.leave(&conversation_id, &user_id, self.clock.now()).await?;

        tracing::info!(%conversation_id, %user_id, "participant left conversation");
        Ok(())
    }

    /// Users whose presence `user_id` gets to see: active members of the
    /// conversations they are active in, minus anyone they blocked.
    pub async fn presence_peers(&self, user_id: Uuid) -> Result<HashSet<Uuid>, error::SystemError> {
        let conversation_ids: Vec<Uuid> =
            self.conversation_repo.find_by_user(&user_id).await?.into_iter().map(|c| c.id).collect();
        if conversation_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let hidden: HashSet<Uuid> = self.hidden_senders(user_id).await?.into_iter().collect();
        let participants = self.conversation_repo.find_participants(&conversation_ids).await?;

        Ok(participants
            .into_iter()
            .filter(|p| p.is_active() && p.user_id != user_id && !hidden.contains(&p.user_id))
            .map(|p| p.user_id)
            .collect())
    }

    async fn hidden_senders(&self, viewer_id: Uuid) -> Result<Vec<Uuid>, error::SystemError> {
        let blocks = self.block_repo.find_by_blocker(&viewer_id).await?;
        Ok(blocks.into_iter().map(|b| b.blocked_id).collect())
    }
}
