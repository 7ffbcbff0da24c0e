//! Terminal stand-in for a chat platform.
//!
//! [`ConsoleClient`] renders deliveries to stdout and keeps a history of them,
//! and [`ConsoleSession`] turns typed lines into invocation contexts, resolving
//! mention literals like `<@5>` the way a platform would.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::SecretString;

use crate::chat::{
    parse_mentions, ChannelId, ChannelRef, ChatClient, ChatError, ChatResult, MentionToken,
    MessageRef, OutgoingMessage, RoleRef, UserRef,
};
use crate::context::InvocationContext;

/// Longest message content a chat platform accepts, in characters.
pub const CONTENT_LIMIT: usize = 2000;

pub struct ConsoleClient {
    me: UserRef,
    token: Option<SecretString>,
    echo: bool,
    next_id: AtomicU64,
    history: Mutex<Vec<(ChannelId, OutgoingMessage)>>,
}

impl ConsoleClient {
    pub fn new(me: UserRef, token: Option<SecretString>) -> Self {
        Self {
            me,
            token,
            echo: true,
            next_id: AtomicU64::new(1),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Records deliveries without printing them.
    pub fn silent(me: UserRef, token: Option<SecretString>) -> Self {
        Self {
            echo: false,
            ..Self::new(me, token)
        }
    }

    pub fn history(&self) -> Vec<(ChannelId, OutgoingMessage)> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    fn record(&self, channel: ChannelId, message: &OutgoingMessage) -> ChatResult<()> {
        let mut history = self
            .history
            .lock()
            .map_err(|e| ChatError::SendFailed(format!("history lock poisoned: {}", e)))?;
        history.push((channel, message.clone()));
        Ok(())
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn check_content(message: &OutgoingMessage) -> ChatResult<()> {
        if let Some(content) = &message.content {
            let length = content.chars().count();
            if length > CONTENT_LIMIT {
                return Err(ChatError::ContentTooLong {
                    length,
                    limit: CONTENT_LIMIT,
                });
            }
        }
        Ok(())
    }
}

pub fn render(message: &OutgoingMessage) -> String {
    let mut parts = Vec::new();
    if let Some(content) = &message.content {
        parts.push(content.clone());
    }
    if let Some(file) = &message.file {
        let body = file.text().unwrap_or("<binary>");
        parts.push(format!("[file {} ({} bytes)]\n{}", file.filename, file.data.len(), body));
    }
    if let Some(embed) = &message.embed {
        let mut lines = vec![format!(
            "[embed] {}",
            embed.title.as_deref().unwrap_or_default()
        )];
        if let Some(description) = &embed.description {
            lines.push(description.clone());
        }
        for field in &embed.fields {
            lines.push(format!("{}: {}", field.name, field.value));
        }
        parts.push(lines.join("\n"));
    }
    parts.join("\n")
}

#[async_trait]
impl ChatClient for ConsoleClient {
    async fn send(&self, channel: ChannelId, message: OutgoingMessage) -> ChatResult<MessageRef> {
        if message.content.is_none() && message.file.is_none() && message.embed.is_none() {
            return Err(ChatError::EmptyMessage);
        }
        if let Some(content) = &message.content {
            if content.is_empty() {
                return Err(ChatError::EmptyMessage);
            }
        }
        Self::check_content(&message)?;
        self.record(channel, &message)?;
        let rendered = render(&message);
        if self.echo {
            println!("{}", rendered);
        }
        Ok(MessageRef::new(
            self.allocate_id(),
            channel,
            self.me.clone(),
            &rendered,
        ))
    }

    async fn edit(
        &self,
        message: &MessageRef,
        update: OutgoingMessage,
    ) -> ChatResult<MessageRef> {
        if message.author != self.me {
            return Err(ChatError::Forbidden(format!(
                "message {} belongs to someone else",
                message.id
            )));
        }
        if message.id >= self.next_id.load(Ordering::SeqCst) {
            return Err(ChatError::UnknownMessage(message.id));
        }
        Self::check_content(&update)?;
        self.record(message.channel_id, &update)?;
        let rendered = render(&update);
        if self.echo {
            println!("[edited {}]\n{}", message.id, rendered);
        }
        let mut edited = message.clone();
        edited.content = rendered;
        Ok(edited)
    }

    fn token(&self) -> Option<SecretString> {
        self.token.clone()
    }
}

/// Builds invocation contexts for lines typed by one local operator.
pub struct ConsoleSession {
    client: Arc<dyn ChatClient>,
    me: UserRef,
    operator: UserRef,
    channel: ChannelRef,
    next_id: u64,
}

impl ConsoleSession {
    pub fn new(client: Arc<dyn ChatClient>, me: UserRef, operator: UserRef) -> Self {
        Self {
            client,
            me,
            operator,
            channel: ChannelRef::new(1, "console"),
            next_id: 1,
        }
    }

    /// Wraps `line` in a message authored by the operator.
    pub fn message(&mut self, line: &str) -> MessageRef {
        let mut message = MessageRef::new(self.next_id, self.channel.id, self.operator.clone(), line);
        self.next_id += 1;
        for token in parse_mentions(line) {
            match token {
                MentionToken::User(id) => message.mentions.push(UserRef::new(id, &format!("user{}", id))),
                MentionToken::Channel(id) => message
                    .channel_mentions
                    .push(ChannelRef::new(id, &format!("channel{}", id))),
                MentionToken::Role(id) => message
                    .role_mentions
                    .push(RoleRef::new(id, &format!("role{}", id))),
            }
        }
        message
    }

    pub fn context(&mut self, line: &str) -> InvocationContext {
        let message = self.message(line);
        InvocationContext::from_message(
            self.client.clone(),
            self.me.clone(),
            self.channel.clone(),
            message,
        )
    }
}
