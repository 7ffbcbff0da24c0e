//! Paged delivery for text too long for one message.
//!
//! [`WrappedPaginator`] splits text into fenced pages that each fit a size
//! budget, and [`PaginatorView`] is the interactive, owner-bound display that
//! sends the first page and lets its owner flip through the rest.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::chat::{AllowedMentions, ChatError, ChatResult, MessageRef, OutgoingMessage, UserId};
use crate::context::InvocationContext;

#[derive(Debug, Error)]
pub enum PaginatorError {
    #[error("Page size {max_size} cannot hold {overhead} characters of fences")]
    BudgetTooSmall { max_size: usize, overhead: usize },
    #[error("User {user} does not own this paginator")]
    NotOwner { user: UserId },
    #[error("Page {page} out of range (0..{total})")]
    PageOutOfRange { page: usize, total: usize },
    #[error("Paginator has not been sent yet")]
    NotSent,
    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),
}

pub type PaginatorResult<T> = Result<T, PaginatorError>;

/// Something that knows how to present itself in an invocation's channel.
#[async_trait]
pub trait PaginatorInterface: Send + Sync + fmt::Debug {
    /// Only this user may navigate; `None` means anyone.
    fn owner(&self) -> Option<UserId>;

    fn page_count(&self) -> usize;

    async fn send_to(&self, ctx: &InvocationContext) -> ChatResult<MessageRef>;
}

/// Splits text into fenced pages that never exceed `max_size` characters.
#[derive(Debug, Clone)]
pub struct WrappedPaginator {
    prefix: String,
    suffix: String,
    max_size: usize,
    bodies: Vec<String>,
}

impl WrappedPaginator {
    pub fn new(prefix: &str, suffix: &str, max_size: usize) -> PaginatorResult<Self> {
        let overhead = prefix.chars().count() + suffix.chars().count() + 2;
        if max_size <= overhead {
            return Err(PaginatorError::BudgetTooSmall { max_size, overhead });
        }
        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            max_size,
            bodies: Vec::new(),
        })
    }

    /// Characters left for content once the fences are paid for.
    pub fn body_budget(&self) -> usize {
        self.max_size - self.prefix.chars().count() - self.suffix.chars().count() - 2
    }

    /// Appends a line, joining it to the current page with a newline when it fits.
    /// Lines larger than a page are wrapped after a newline, else after a space,
    /// else at the budget.
    pub fn add_line(&mut self, line: &str) {
        let budget = self.body_budget();
        if let Some(last) = self.bodies.last_mut() {
            if last.chars().count() + 1 + line.chars().count() <= budget {
                last.push('\n');
                last.push_str(line);
                return;
            }
        }

        if line.is_empty() {
            self.bodies.push(String::new());
            return;
        }

        let mut rest = line;
        while !rest.is_empty() {
            let (chunk, tail) = split_chunk(rest, budget);
            self.bodies.push(chunk.to_string());
            rest = tail;
        }
    }

    /// Page contents without fences.
    pub fn bodies(&self) -> &[String] {
        &self.bodies
    }

    /// Rendered pages, fences included.
    pub fn pages(&self) -> Vec<String> {
        self.bodies
            .iter()
            .map(|body| format!("{}\n{}\n{}", self.prefix, body, self.suffix))
            .collect()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

fn split_chunk(text: &str, budget: usize) -> (&str, &str) {
    let Some((limit, _)) = text.char_indices().nth(budget) else {
        return (text, "");
    };
    let window = &text[..limit];
    let cut = window
        .rfind('\n')
        .or_else(|| window.rfind(' '))
        .map(|position| position + 1)
        .unwrap_or(limit);
    text.split_at(cut)
}

#[derive(Debug, Default)]
struct ViewState {
    current: usize,
    message: Option<MessageRef>,
}

/// Interactive page display bound to one owner.
#[derive(Debug)]
pub struct PaginatorView {
    id: Uuid,
    pages: Vec<String>,
    owner: Option<UserId>,
    state: Mutex<ViewState>,
}

impl PaginatorView {
    pub fn new(paginator: &WrappedPaginator, owner: Option<UserId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pages: paginator.pages(),
            owner,
            state: Mutex::new(ViewState::default()),
        }
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub async fn current_page(&self) -> usize {
        self.state.lock().await.current
    }

    /// Shows `page` in place of the current one. Only the owner may do this.
    pub async fn turn_page(
        &self,
        ctx: &InvocationContext,
        by: UserId,
        page: usize,
    ) -> PaginatorResult<MessageRef> {
        if let Some(owner) = self.owner {
            if owner != by {
                return Err(PaginatorError::NotOwner { user: by });
            }
        }
        let Some(content) = self.pages.get(page) else {
            return Err(PaginatorError::PageOutOfRange {
                page,
                total: self.pages.len(),
            });
        };

        let mut state = self.state.lock().await;
        let Some(message) = state.message.as_ref() else {
            return Err(PaginatorError::NotSent);
        };
        let update =
            OutgoingMessage::text(content.clone()).with_allowed_mentions(AllowedMentions::none());
        let edited = ctx.client().edit(message, update).await?;
        debug!(paginator = %self.id, page, "page turned");
        state.current = page;
        state.message = Some(edited.clone());
        Ok(edited)
    }
}

#[async_trait]
impl PaginatorInterface for PaginatorView {
    fn owner(&self) -> Option<UserId> {
        self.owner
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    async fn send_to(&self, ctx: &InvocationContext) -> ChatResult<MessageRef> {
        let mut state = self.state.lock().await;
        let content = self
            .pages
            .get(state.current)
            .cloned()
            .ok_or(ChatError::EmptyMessage)?;
        debug!(
            paginator = %self.id,
            pages = self.pages.len(),
            owner = ?self.owner,
            "sending paginator"
        );
        let sent = ctx
            .send(OutgoingMessage::text(content).with_allowed_mentions(AllowedMentions::none()))
            .await?;
        state.message = Some(sent.clone());
        Ok(sent)
    }
}
