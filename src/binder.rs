//! Per-invocation argument binding.
//!
//! An invocation runs with two artifacts next to its scope: the [`Bindings`]
//! (context shorthand, the last result as `_`, and one synthetic variable per
//! mentioned entity) and the [`Convertables`] table mapping each raw mention
//! literal to its synthetic variable. The evaluator front end rewrites source
//! text with the table only when the verbatim source fails to parse.

use indexmap::IndexMap;

use crate::chat::Mentionable;
use crate::context::InvocationContext;
use crate::value::Value;

pub const LAST_RESULT: &str = "_";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings(IndexMap<String, Value>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Mention literal → synthetic identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Convertables(IndexMap<String, String>);

impl Convertables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, literal: &str) -> Option<&str> {
        self.0.get(literal).map(String::as_str)
    }

    pub fn insert(&mut self, literal: impl Into<String>, identifier: impl Into<String>) {
        self.0.insert(literal.into(), identifier.into());
    }

    pub fn contains(&self, literal: &str) -> bool {
        self.0.contains_key(literal)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(literal, identifier)| (literal.as_str(), identifier.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Rewrites every mention literal in `source` to its identifier.
    pub fn apply(&self, source: &str) -> String {
        self.0
            .iter()
            .fold(source.to_string(), |text, (literal, identifier)| {
                text.replace(literal.as_str(), identifier)
            })
    }
}

/// Builds the bindings and convertables for one invocation.
#[derive(Debug, Clone)]
pub struct ArgumentBinder {
    scope_prefix: String,
}

impl ArgumentBinder {
    pub fn new(scope_prefix: &str) -> Self {
        Self {
            scope_prefix: scope_prefix.to_string(),
        }
    }

    /// Shorthand variables derived from the invocation itself.
    pub fn context_bindings(&self, ctx: &InvocationContext) -> Bindings {
        let message: Value = ctx.message().cloned().into();
        let mut bindings = Bindings::new();
        let mut bind = |name: &str, value: Value| {
            bindings.insert(format!("{}{}", self.scope_prefix, name), value);
        };
        bind("author", ctx.author.clone().into());
        bind("channel", ctx.channel.clone().into());
        bind("guild", ctx.guild.clone().into());
        bind("me", ctx.me.clone().into());
        bind("message", message.clone());
        bind("msg", message);
        bindings
    }

    pub fn bind(&self, ctx: &InvocationContext, last_result: Value) -> (Bindings, Convertables) {
        let mut bindings = self.context_bindings(ctx);
        bindings.insert(LAST_RESULT, last_result);
        let mut convertables = Convertables::new();

        // interaction 経由では生のメンションが取れない
        if let Some(message) = ctx.message() {
            bind_mentions("user", &message.mentions, &mut bindings, &mut convertables);
            bind_mentions(
                "channel",
                &message.channel_mentions,
                &mut bindings,
                &mut convertables,
            );
            bind_mentions("role", &message.role_mentions, &mut bindings, &mut convertables);
        }

        (bindings, convertables)
    }
}

fn bind_mentions<T>(
    kind: &str,
    entities: &[T],
    bindings: &mut Bindings,
    convertables: &mut Convertables,
) where
    T: Mentionable + Clone + Into<Value>,
{
    let mut index = 0;
    for entity in entities {
        let literal = entity.mention();
        if convertables.contains(&literal) {
            continue;
        }
        let identifier = format!("__{}_mention_{}", kind, index);
        bindings.insert(identifier.clone(), entity.clone().into());
        convertables.insert(literal, identifier);
        index += 1;
    }
}
