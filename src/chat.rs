//! Chat platform contract.
//!
//! The REPL never talks to a concrete chat service. Everything it needs from the
//! platform is expressed here: plain value types for accounts, channels, roles,
//! guilds and messages, the outgoing message shape (content, attachment, embed,
//! allowed mentions), and the [`ChatClient`] trait that performs the sends.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use secrecy::SecretString;
use thiserror::Error;

pub type UserId = u64;
pub type ChannelId = u64;
pub type RoleId = u64;
pub type GuildId = u64;
pub type MessageId = u64;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChatError {
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Message content is {length} characters, limit is {limit}")]
    ContentTooLong { length: usize, limit: usize },
    #[error("Cannot send an empty message")]
    EmptyMessage,
    #[error("Missing permission: {0}")]
    Forbidden(String),
    #[error("Unknown message: {0}")]
    UnknownMessage(MessageId),
}

pub type ChatResult<T> = Result<T, ChatError>;

/// Anything that can be referred to with a platform mention literal.
pub trait Mentionable {
    fn mention(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct UserRef {
    pub id: UserId,
    pub name: String,
    pub bot: bool,
}

impl UserRef {
    pub fn new(id: UserId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            bot: false,
        }
    }
}

impl Mentionable for UserRef {
    fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ChannelRef {
    pub id: ChannelId,
    pub name: String,
    pub guild_id: Option<GuildId>,
}

impl ChannelRef {
    pub fn new(id: ChannelId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            guild_id: None,
        }
    }
}

impl Mentionable for ChannelRef {
    fn mention(&self) -> String {
        format!("<#{}>", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RoleRef {
    pub id: RoleId,
    pub name: String,
}

impl RoleRef {
    pub fn new(id: RoleId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

impl Mentionable for RoleRef {
    fn mention(&self) -> String {
        format!("<@&{}>", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GuildRef {
    pub id: GuildId,
    pub name: String,
}

/// A message as seen by the REPL, either the one that triggered an invocation or
/// the confirmation the platform hands back after a send.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRef {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub author: UserRef,
    pub content: String,
    pub jump_url: String,
    /// Mentioned accounts, in order of appearance.
    pub mentions: Vec<UserRef>,
    pub channel_mentions: Vec<ChannelRef>,
    pub role_mentions: Vec<RoleRef>,
    pub created_at: DateTime<Utc>,
}

impl MessageRef {
    pub fn new(id: MessageId, channel_id: ChannelId, author: UserRef, content: &str) -> Self {
        Self {
            id,
            channel_id,
            guild_id: None,
            author,
            content: content.to_string(),
            jump_url: jump_url(None, channel_id, id),
            mentions: Vec::new(),
            channel_mentions: Vec::new(),
            role_mentions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn in_guild(mut self, guild_id: GuildId) -> Self {
        self.guild_id = Some(guild_id);
        self.jump_url = jump_url(Some(guild_id), self.channel_id, self.id);
        self
    }
}

pub fn jump_url(guild_id: Option<GuildId>, channel_id: ChannelId, message_id: MessageId) -> String {
    match guild_id {
        Some(guild) => format!("https://discord.com/channels/{guild}/{channel_id}/{message_id}"),
        None => format!("https://discord.com/channels/@me/{channel_id}/{message_id}"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MentionToken {
    User(UserId),
    Channel(ChannelId),
    Role(RoleId),
}

lazy_static! {
    static ref MENTION_PATTERN: Regex = Regex::new(r"<(@&|@!?|#)(\d+)>").unwrap();
}

/// Extracts mention literals from raw message text, in order of first appearance.
/// Repeated mentions of the same entity are reported once.
pub fn parse_mentions(content: &str) -> Vec<MentionToken> {
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for captures in MENTION_PATTERN.captures_iter(content) {
        let Ok(id) = captures[2].parse::<u64>() else {
            continue;
        };
        let token = match &captures[1] {
            "@&" => MentionToken::Role(id),
            "#" => MentionToken::Channel(id),
            _ => MentionToken::User(id),
        };
        if seen.insert(token.clone()) {
            tokens.push(token);
        }
    }
    tokens
}

/// A named binary payload sent as an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: &str, data: Vec<u8>) -> Self {
        Self {
            filename: filename.to_string(),
            data,
        }
    }

    /// The payload as text, when it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn field(mut self, name: &str, value: &str, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.to_string(),
            value: value.to_string(),
            inline,
        });
        self
    }
}

/// Which mention kinds may notify their targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowedMentions {
    pub everyone: bool,
    pub users: bool,
    pub roles: bool,
    pub replied_user: bool,
}

impl AllowedMentions {
    pub fn none() -> Self {
        Self {
            everyone: false,
            users: false,
            roles: false,
            replied_user: false,
        }
    }

    pub fn all() -> Self {
        Self {
            everyone: true,
            users: true,
            roles: true,
            replied_user: true,
        }
    }

    pub fn is_none(&self) -> bool {
        *self == Self::none()
    }
}

impl Default for AllowedMentions {
    fn default() -> Self {
        Self::all()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub file: Option<Attachment>,
    pub embed: Option<Embed>,
    /// `None` leaves the client's default in place.
    pub allowed_mentions: Option<AllowedMentions>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn file(file: Attachment) -> Self {
        Self {
            file: Some(file),
            ..Default::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embed: Some(embed),
            ..Default::default()
        }
    }

    pub fn with_allowed_mentions(mut self, allowed_mentions: AllowedMentions) -> Self {
        self.allowed_mentions = Some(allowed_mentions);
        self
    }
}

/// The chat service the REPL delivers through.
#[mockall::automock]
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Posts a new message and returns the platform's record of it.
    async fn send(&self, channel: ChannelId, message: OutgoingMessage) -> ChatResult<MessageRef>;

    /// Replaces the content of a message this client sent earlier.
    async fn edit(&self, message: &MessageRef, update: OutgoingMessage)
        -> ChatResult<MessageRef>;

    /// The credential this client authenticates with, if any.
    fn token(&self) -> Option<SecretString>;
}
