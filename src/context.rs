use std::fmt;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::chat::{
    ChannelRef, ChatClient, ChatResult, GuildRef, MessageRef, OutgoingMessage, UserRef,
};

/// How an invocation reached the process.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// A plain chat message; its raw mentions are available.
    Message(MessageRef),
    /// An interaction (slash command and similar); no raw message exists.
    Interaction { id: u64 },
}

/// Everything known about one invocation, plus the client used to answer it.
#[derive(Clone)]
pub struct InvocationContext {
    pub id: Uuid,
    pub author: UserRef,
    /// The account this process runs as.
    pub me: UserRef,
    pub channel: ChannelRef,
    pub guild: Option<GuildRef>,
    pub trigger: Trigger,
    /// Mobile clients cannot preview text files inline.
    pub author_on_mobile: bool,
    client: Arc<dyn ChatClient>,
}

impl InvocationContext {
    pub fn from_message(
        client: Arc<dyn ChatClient>,
        me: UserRef,
        channel: ChannelRef,
        message: MessageRef,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            author: message.author.clone(),
            me,
            channel,
            guild: None,
            trigger: Trigger::Message(message),
            author_on_mobile: false,
            client,
        }
    }

    pub fn from_interaction(
        client: Arc<dyn ChatClient>,
        me: UserRef,
        channel: ChannelRef,
        author: UserRef,
        interaction_id: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            author,
            me,
            channel,
            guild: None,
            trigger: Trigger::Interaction { id: interaction_id },
            author_on_mobile: false,
            client,
        }
    }

    pub fn in_guild(mut self, guild: GuildRef) -> Self {
        self.guild = Some(guild);
        self
    }

    pub fn on_mobile(mut self, on_mobile: bool) -> Self {
        self.author_on_mobile = on_mobile;
        self
    }

    /// The triggering message, unless this is an interaction.
    pub fn message(&self) -> Option<&MessageRef> {
        match &self.trigger {
            Trigger::Message(message) => Some(message),
            Trigger::Interaction { .. } => None,
        }
    }

    pub fn is_interaction(&self) -> bool {
        matches!(self.trigger, Trigger::Interaction { .. })
    }

    pub fn client(&self) -> &Arc<dyn ChatClient> {
        &self.client
    }

    /// Sends to the channel the invocation came from.
    pub async fn send(&self, message: OutgoingMessage) -> ChatResult<MessageRef> {
        debug!(
            invocation = %self.id,
            channel = self.channel.id,
            has_file = message.file.is_some(),
            has_embed = message.embed.is_some(),
            "sending to invocation channel"
        );
        self.client.send(self.channel.id, message).await
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("id", &self.id)
            .field("author", &self.author)
            .field("me", &self.me)
            .field("channel", &self.channel)
            .field("guild", &self.guild)
            .field("trigger", &self.trigger)
            .field("author_on_mobile", &self.author_on_mobile)
            .finish_non_exhaustive()
    }
}
