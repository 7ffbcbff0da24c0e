use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::chat::{Attachment, ChannelRef, Embed, GuildRef, MessageRef, RoleRef, UserRef};
use crate::paginator::PaginatorInterface;

// 値の型システム
#[derive(Clone, Debug, Default, strum::IntoStaticStr)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    User(UserRef),
    Channel(ChannelRef),
    Role(RoleRef),
    Guild(GuildRef),
    Message(MessageRef),
    File(Attachment),
    Embed(Embed),
    Paginator(Arc<dyn PaginatorInterface>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        self.into()
    }

    /// Debug representation shown when a value is delivered as text.
    pub fn repr(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format!("{:?}", f),
            Value::String(s) => format!("{:?}", s),
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Map(entries) => {
                let entries: Vec<String> = entries
                    .iter()
                    .map(|(key, value)| format!("{:?}: {}", key, value.repr()))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
            Value::User(user) => format!("<User id={} name={:?} bot={}>", user.id, user.name, user.bot),
            Value::Channel(channel) => format!("<Channel id={} name={:?}>", channel.id, channel.name),
            Value::Role(role) => format!("<Role id={} name={:?}>", role.id, role.name),
            Value::Guild(guild) => format!("<Guild id={} name={:?}>", guild.id, guild.name),
            Value::Message(message) => format!(
                "<Message id={} channel_id={} author={:?}>",
                message.id, message.channel_id, message.author.name
            ),
            Value::File(file) => format!(
                "<Attachment filename={:?} size={}>",
                file.filename,
                file.data.len()
            ),
            Value::Embed(embed) => format!(
                "<Embed title={:?} fields={}>",
                embed.title,
                embed.fields.len()
            ),
            Value::Paginator(paginator) => format!(
                "<Paginator pages={} owner={:?}>",
                paginator.page_count(),
                paginator.owner()
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            _ => write!(f, "{}", self.repr()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::User(a), Value::User(b)) => a == b,
            (Value::Channel(a), Value::Channel(b)) => a == b,
            (Value::Role(a), Value::Role(b)) => a == b,
            (Value::Guild(a), Value::Guild(b)) => a == b,
            (Value::Message(a), Value::Message(b)) => a == b,
            (Value::File(a), Value::File(b)) => a == b,
            (Value::Embed(a), Value::Embed(b)) => a == b,
            // 同一インスタンスのみ等しい
            (Value::Paginator(a), Value::Paginator(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<UserRef> for Value {
    fn from(user: UserRef) -> Self {
        Value::User(user)
    }
}

impl From<ChannelRef> for Value {
    fn from(channel: ChannelRef) -> Self {
        Value::Channel(channel)
    }
}

impl From<RoleRef> for Value {
    fn from(role: RoleRef) -> Self {
        Value::Role(role)
    }
}

impl From<GuildRef> for Value {
    fn from(guild: GuildRef) -> Self {
        Value::Guild(guild)
    }
}

impl From<MessageRef> for Value {
    fn from(message: MessageRef) -> Self {
        Value::Message(message)
    }
}

impl From<Attachment> for Value {
    fn from(file: Attachment) -> Self {
        Value::File(file)
    }
}

impl From<Embed> for Value {
    fn from(embed: Embed) -> Self {
        Value::Embed(embed)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(option: Option<T>) -> Self {
        option.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}
