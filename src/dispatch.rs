//! Result dispatch.
//!
//! Every value an evaluation produces is delivered exactly once. Delivery runs
//! in three steps:
//!
//! 1. [`normalize`]: values with no delivery of their own become their `repr()`.
//! 2. [`classify`]: a pure decision, first match wins:
//!    message → file → embed → paginator → short text → previewable file → pages.
//! 3. [`ResultDispatcher::deliver`]: performs the one send the decision calls for
//!    and hands back the platform's answer, which becomes the next `_`.
//!
//! Credential redaction and mention suppression only happen for short text.
//! Files and pages carry the text as produced.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::chat::{AllowedMentions, Attachment, ChatResult, Embed, MessageRef, OutgoingMessage};
use crate::config::{DispatchConfig, ReplConfig};
use crate::context::InvocationContext;
use crate::error::InternalResult;
use crate::paginator::{PaginatorInterface, PaginatorResult, PaginatorView, WrappedPaginator};
use crate::value::Value;

/// A value reduced to the shapes the dispatcher knows how to deliver.
#[derive(Debug, Clone)]
pub enum Normalized {
    Message(MessageRef),
    File(Attachment),
    Embed(Embed),
    Paginator(Arc<dyn PaginatorInterface>),
    Text(String),
}

pub fn normalize(value: Value) -> Normalized {
    match value {
        Value::Message(message) => Normalized::Message(message),
        Value::File(file) => Normalized::File(file),
        Value::Embed(embed) => Normalized::Embed(embed),
        Value::Paginator(paginator) => Normalized::Paginator(paginator),
        Value::String(text) => Normalized::Text(text),
        other => Normalized::Text(other.repr()),
    }
}

/// The single delivery chosen for one value.
#[derive(Debug, Clone, strum::Display)]
pub enum Dispatch {
    /// Post a link to an existing message.
    Message(MessageRef),
    File(Attachment),
    Embed(Embed),
    Paginator(Arc<dyn PaginatorInterface>),
    /// Empty or whitespace-only text, replaced by a placeholder.
    BlankText,
    ShortText(String),
    /// Too long for a message, small enough for the client's file preview.
    InlineFile(String),
    PaginatedText(String),
}

/// Whether long text may go out as a previewable file for this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePreview {
    pub limit: usize,
    pub allowed: bool,
}

impl FilePreview {
    pub fn new(limit: usize, allowed: bool) -> Self {
        Self { limit, allowed }
    }

    pub fn accepts(&self, length: usize) -> bool {
        self.allowed && length < self.limit
    }
}

pub fn classify(value: Value, config: &DispatchConfig, preview: &FilePreview) -> Dispatch {
    match normalize(value) {
        Normalized::Message(message) => Dispatch::Message(message),
        Normalized::File(file) => Dispatch::File(file),
        Normalized::Embed(embed) => Dispatch::Embed(embed),
        Normalized::Paginator(paginator) => Dispatch::Paginator(paginator),
        Normalized::Text(text) => {
            let length = text.chars().count();
            if length <= config.message_limit {
                if text.trim().is_empty() {
                    Dispatch::BlankText
                } else {
                    Dispatch::ShortText(text)
                }
            } else if preview.accepts(length) {
                Dispatch::InlineFile(text)
            } else {
                Dispatch::PaginatedText(text)
            }
        }
    }
}

/// Replaces every occurrence of `token` in `text` with `marker`.
pub fn redact_credential(text: &str, token: Option<&SecretString>, marker: &str) -> String {
    let Some(token) = token.map(|token| token.expose_secret()) else {
        return text.to_string();
    };
    if token.is_empty() || !text.contains(token) {
        return text.to_string();
    }
    warn!("result contained the client credential, redacting it");
    text.replace(token, marker)
}

/// Decides what a result does after evaluation. Whatever is returned becomes `_`.
#[mockall::automock]
#[async_trait]
pub trait ResultHandler: Send + Sync {
    async fn handle_result(&self, ctx: &InvocationContext, value: Value) -> InternalResult<Value>;
}

#[derive(Debug, Clone)]
pub struct ResultDispatcher {
    config: DispatchConfig,
    force_paginator: bool,
}

impl ResultDispatcher {
    pub fn new(config: &ReplConfig) -> Self {
        Self {
            config: config.dispatch.clone(),
            force_paginator: config.flags.force_paginator,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// File previews are skipped when paging is forced and for mobile users.
    pub fn file_preview(&self, ctx: &InvocationContext) -> FilePreview {
        FilePreview::new(
            self.config.file_preview_limit,
            !self.force_paginator && !ctx.author_on_mobile,
        )
    }

    pub fn classify(&self, ctx: &InvocationContext, value: Value) -> Dispatch {
        classify(value, &self.config, &self.file_preview(ctx))
    }

    pub async fn deliver(&self, ctx: &InvocationContext, dispatch: Dispatch) -> InternalResult<Value> {
        debug!(invocation = %ctx.id, kind = %dispatch, "delivering result");
        let sent = match dispatch {
            Dispatch::Message(message) => {
                ctx.send(OutgoingMessage::text(format!(
                    "<Message <{}>>",
                    message.jump_url
                )))
                .await?
            }
            Dispatch::File(file) => ctx.send(OutgoingMessage::file(file)).await?,
            Dispatch::Embed(embed) => ctx.send(OutgoingMessage::embed(embed)).await?,
            Dispatch::Paginator(paginator) => paginator.send_to(ctx).await?,
            Dispatch::BlankText => {
                self.send_short_text(ctx, self.config.empty_placeholder.clone())
                    .await?
            }
            Dispatch::ShortText(text) => {
                let text = redact_credential(
                    &text,
                    ctx.client().token().as_ref(),
                    &self.config.redaction_marker,
                );
                self.send_short_text(ctx, text).await?
            }
            Dispatch::InlineFile(text) => {
                let file = Attachment::new(&self.config.output_file_name, text.into_bytes());
                ctx.send(OutgoingMessage::file(file)).await?
            }
            Dispatch::PaginatedText(text) => {
                let paginator = self.paginate(&text)?;
                let interface = PaginatorView::new(&paginator, Some(ctx.author.id));
                interface.send_to(ctx).await?
            }
        };
        Ok(Value::Message(sent))
    }

    /// Fenced pages for text too long for a message or a file preview.
    pub fn paginate(&self, text: &str) -> PaginatorResult<WrappedPaginator> {
        let mut paginator = WrappedPaginator::new(
            &self.config.fence_prefix,
            &self.config.fence_suffix,
            self.config.page_max_size,
        )?;
        paginator.add_line(text);
        Ok(paginator)
    }

    async fn send_short_text(
        &self,
        ctx: &InvocationContext,
        text: String,
    ) -> ChatResult<MessageRef> {
        ctx.send(OutgoingMessage::text(text).with_allowed_mentions(AllowedMentions::none()))
            .await
    }
}

#[async_trait]
impl ResultHandler for ResultDispatcher {
    async fn handle_result(&self, ctx: &InvocationContext, value: Value) -> InternalResult<Value> {
        let dispatch = self.classify(ctx, value);
        self.deliver(ctx, dispatch).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::chat::{ChannelRef, ChatError, MockChatClient, UserRef};
    use crate::error::Error;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const TOKEN: &str = "bot-secret-token";

    fn default_preview() -> FilePreview {
        FilePreview::new(50_000, true)
    }

    fn kind(value: Value) -> String {
        classify(value, &DispatchConfig::default(), &default_preview()).to_string()
    }

    /// Client that records every outgoing message and echoes it back.
    fn recording_client(token: Option<&'static str>) -> (MockChatClient, Arc<Mutex<Vec<OutgoingMessage>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let log = sent.clone();
        let mut client = MockChatClient::new();
        client.expect_send().returning(move |channel, message| {
            let mut log = log.lock().unwrap();
            log.push(message.clone());
            Ok(MessageRef::new(
                100 + log.len() as u64,
                channel,
                UserRef::new(2, "me"),
                message.content.as_deref().unwrap_or_default(),
            ))
        });
        client
            .expect_token()
            .returning(move || token.map(SecretString::from));
        (client, sent)
    }

    fn context(client: MockChatClient) -> InvocationContext {
        let author = UserRef::new(1, "alice");
        InvocationContext::from_message(
            Arc::new(client),
            UserRef::new(2, "me"),
            ChannelRef::new(20, "general"),
            MessageRef::new(10, 20, author, "!py"),
        )
    }

    #[test]
    fn test_classification_order() {
        let message = MessageRef::new(1, 2, UserRef::new(3, "a"), "x");
        assert_eq!(kind(Value::Message(message)), "Message");
        assert_eq!(kind(Value::File(Attachment::new("a.txt", vec![]))), "File");
        assert_eq!(kind(Value::Embed(Embed::new())), "Embed");
        assert_eq!(kind(Value::from("hello")), "ShortText");
        assert_eq!(kind(Value::from("  \n\t")), "BlankText");
        assert_eq!(kind(Value::from("")), "BlankText");
        assert_eq!(kind(Value::from("x".repeat(2001))), "InlineFile");
        assert_eq!(kind(Value::from("x".repeat(60_000))), "PaginatedText");
    }

    #[test]
    fn test_paginator_values_are_not_stringified() {
        let mut paginator = WrappedPaginator::new("```", "```", 100).unwrap();
        paginator.add_line("page");
        let view: Arc<dyn PaginatorInterface> = Arc::new(PaginatorView::new(&paginator, None));
        assert_eq!(kind(Value::Paginator(view)), "Paginator");
    }

    #[test]
    fn test_non_text_values_become_their_repr() {
        match classify(
            Value::List(vec![Value::Integer(1), Value::Null]),
            &DispatchConfig::default(),
            &default_preview(),
        ) {
            Dispatch::ShortText(text) => assert_eq!(text, "[1, null]"),
            other => panic!("unexpected dispatch {other}"),
        }
        assert_eq!(kind(Value::User(UserRef::new(1, "a"))), "ShortText");
    }

    #[test]
    fn test_limits_count_characters_not_bytes() {
        // 2000 two-byte characters still fit one message
        assert_eq!(kind(Value::from("\u{e9}".repeat(2000))), "ShortText");
        assert_eq!(kind(Value::from("\u{e9}".repeat(2001))), "InlineFile");
    }

    #[test]
    fn test_file_preview_threshold_is_exclusive() {
        let config = DispatchConfig::default();
        let preview = FilePreview::new(4000, true);
        let at_limit = classify(Value::from("x".repeat(4000)), &config, &preview);
        assert!(matches!(at_limit, Dispatch::PaginatedText(_)));
        let below = classify(Value::from("x".repeat(3999)), &config, &preview);
        assert!(matches!(below, Dispatch::InlineFile(_)));
        let above = classify(Value::from("x".repeat(5000)), &config, &preview);
        assert!(matches!(above, Dispatch::PaginatedText(_)));
        let disallowed = classify(Value::from("x".repeat(2500)), &config, &FilePreview::new(4000, false));
        assert!(matches!(disallowed, Dispatch::PaginatedText(_)));
    }

    #[test]
    fn test_redaction() {
        let token = SecretString::from(TOKEN);
        assert_eq!(
            redact_credential(&format!("a {TOKEN} b {TOKEN}"), Some(&token), "[token omitted]"),
            "a [token omitted] b [token omitted]"
        );
        assert_eq!(redact_credential("plain", Some(&token), "[x]"), "plain");
        assert_eq!(redact_credential("plain", None, "[x]"), "plain");
        assert_eq!(
            redact_credential("plain", Some(&SecretString::from("")), "[x]"),
            "plain"
        );
    }

    proptest! {
        #[test]
        fn test_redacted_text_never_contains_token(
            before in "[a-z ]{0,50}",
            after in "[a-z ]{0,50}",
            repeats in 1usize..4,
        ) {
            let token = SecretString::from(TOKEN);
            let text = format!("{before}{}{after}", TOKEN.repeat(repeats));
            let redacted = redact_credential(&text, Some(&token), "[token omitted]");
            prop_assert!(!redacted.contains(TOKEN));
            prop_assert_eq!(redacted.matches("[token omitted]").count(), repeats);
        }

        #[test]
        fn test_text_dispatch_is_total(text in "\\PC{0,2500}") {
            let length = text.chars().count();
            let dispatch = classify(Value::from(text.clone()), &DispatchConfig::default(), &default_preview());
            match dispatch {
                Dispatch::BlankText => prop_assert!(length <= 2000 && text.trim().is_empty()),
                Dispatch::ShortText(t) => prop_assert!(length <= 2000 && t == text),
                Dispatch::InlineFile(t) => prop_assert!(length > 2000 && t == text),
                other => prop_assert!(false, "unexpected {}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_hello_is_sent_without_mentions() {
        let (client, sent) = recording_client(None);
        let dispatcher = ResultDispatcher::new(&ReplConfig::default());
        let ctx = context(client);

        let retained = dispatcher.handle_result(&ctx, Value::from("hello")).await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content.as_deref(), Some("hello"));
        assert_eq!(sent[0].allowed_mentions, Some(AllowedMentions::none()));
        assert!(matches!(retained, Value::Message(m) if m.id == 101 && m.content == "hello"));
    }

    #[tokio::test]
    async fn test_empty_string_becomes_placeholder() {
        let (client, sent) = recording_client(None);
        let dispatcher = ResultDispatcher::new(&ReplConfig::default());
        dispatcher.handle_result(&context(client), Value::from("")).await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].content.as_deref(), Some("\u{200b}"));
        assert_eq!(sent[0].allowed_mentions, Some(AllowedMentions::none()));
    }

    #[tokio::test]
    async fn test_short_text_is_redacted() {
        let (client, sent) = recording_client(Some(TOKEN));
        let dispatcher = ResultDispatcher::new(&ReplConfig::default());
        dispatcher
            .handle_result(&context(client), Value::from(format!("token={TOKEN} <@1> @everyone")))
            .await
            .unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(
            sent[0].content.as_deref(),
            Some("token=[token omitted] <@1> @everyone")
        );
        assert_eq!(sent[0].allowed_mentions, Some(AllowedMentions::none()));
    }

    #[tokio::test]
    async fn test_long_text_goes_to_output_file() {
        let (client, sent) = recording_client(Some(TOKEN));
        let dispatcher = ResultDispatcher::new(&ReplConfig::default());
        let text = format!("{}{TOKEN}", "\u{e9}".repeat(5000));
        dispatcher
            .handle_result(&context(client), Value::from(text.clone()))
            .await
            .unwrap();

        let sent = sent.lock().unwrap();
        let file = sent[0].file.as_ref().unwrap();
        assert_eq!(file.filename, "output.py");
        // no redaction outside of short text
        assert_eq!(file.text(), Some(text.as_str()));
        assert!(sent[0].content.is_none());
    }

    #[tokio::test]
    async fn test_text_over_preview_limit_is_paginated() {
        let (client, sent) = recording_client(None);
        let mut config = ReplConfig::default();
        config.dispatch.file_preview_limit = 4000;
        let dispatcher = ResultDispatcher::new(&config);
        let text = "word ".repeat(2000);

        let retained = dispatcher
            .handle_result(&context(client), Value::from(text.clone()))
            .await
            .unwrap();

        let pages = dispatcher.paginate(&text).unwrap().pages();
        assert!(pages.len() > 1);
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content.as_deref(), Some(pages[0].as_str()));
        assert_eq!(sent[0].allowed_mentions, Some(AllowedMentions::none()));
        assert!(matches!(retained, Value::Message(_)));
    }

    #[test]
    fn test_dispatched_pages_rebuild_the_text() {
        let mut config = ReplConfig::default();
        config.dispatch.file_preview_limit = 4000;
        let dispatcher = ResultDispatcher::new(&config);
        let text = (0..3000)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");

        let paginator = dispatcher.paginate(&text).unwrap();
        let mut rebuilt = String::new();
        for page in paginator.pages() {
            assert!(page.chars().count() <= 1980);
            let body = page
                .strip_prefix("```py\n")
                .and_then(|rest| rest.strip_suffix("\n```"))
                .unwrap();
            rebuilt.push_str(body);
        }
        assert_eq!(rebuilt, text);
    }

    #[tokio::test]
    async fn test_mobile_author_gets_pages_instead_of_file() {
        let (client, sent) = recording_client(None);
        let dispatcher = ResultDispatcher::new(&ReplConfig::default());
        let ctx = context(client).on_mobile(true);
        dispatcher.handle_result(&ctx, Value::from("x".repeat(3000))).await.unwrap();

        let sent = sent.lock().unwrap();
        assert!(sent[0].file.is_none());
        assert!(sent[0].content.as_deref().unwrap().starts_with("```py"));
    }

    #[tokio::test]
    async fn test_force_paginator_flag() {
        let (client, sent) = recording_client(None);
        let mut config = ReplConfig::default();
        config.flags.force_paginator = true;
        let dispatcher = ResultDispatcher::new(&config);
        dispatcher
            .handle_result(&context(client), Value::from("x".repeat(3000)))
            .await
            .unwrap();
        assert!(sent.lock().unwrap()[0].file.is_none());
    }

    #[tokio::test]
    async fn test_message_values_are_linked() {
        let (client, sent) = recording_client(None);
        let dispatcher = ResultDispatcher::new(&ReplConfig::default());
        let message = MessageRef::new(5, 6, UserRef::new(7, "b"), "old").in_guild(8);
        dispatcher
            .handle_result(&context(client), Value::Message(message))
            .await
            .unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(
            sent[0].content.as_deref(),
            Some("<Message <https://discord.com/channels/8/6/5>>")
        );
    }

    #[tokio::test]
    async fn test_files_and_embeds_are_sent_as_is() {
        let (client, sent) = recording_client(None);
        let dispatcher = ResultDispatcher::new(&ReplConfig::default());
        let ctx = context(client);
        let file = Attachment::new("data.bin", vec![0, 1, 2]);
        let embed = Embed::new().title("t").field("k", "v", true);

        dispatcher.handle_result(&ctx, Value::File(file.clone())).await.unwrap();
        dispatcher.handle_result(&ctx, Value::Embed(embed.clone())).await.unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0], OutgoingMessage::file(file));
        assert_eq!(sent[1], OutgoingMessage::embed(embed));
    }

    #[tokio::test]
    async fn test_send_failure_propagates() {
        let mut client = MockChatClient::new();
        client
            .expect_send()
            .times(1)
            .returning(|_, _| Err(ChatError::Forbidden("send messages".to_string())));
        client.expect_token().returning(|| None);
        let dispatcher = ResultDispatcher::new(&ReplConfig::default());

        let result = dispatcher.handle_result(&context(client), Value::from("hi")).await;
        assert!(matches!(result, Err(Error::Chat(ChatError::Forbidden(_)))));
    }
}
