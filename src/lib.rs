//! # chatrepl: evaluate code from a chat and answer in the same chat
//!
//! An operator sends source text to a running process through a chat
//! platform; an evaluator runs it and yields values one by one; each value is
//! delivered back into the channel it came from. This crate owns everything
//! around the evaluator:
//!
//! ## Invocation Pipeline
//!
//! ```text
//! InvocationContext → ArgumentBinder → Evaluator → ResultDispatcher → ChatClient
//!                          ↑                              │
//!                     ScopeProvider ←──── last result ────┘
//! ```
//!
//! ### Scope and Bindings
//!
//! The [`scope`] module keeps the variable environment, either one scope for
//! the life of the process or a fresh one per invocation. The [`binder`]
//! module adds per-invocation shorthand (`_author`, `_channel`, ...), the last
//! result as `_`, and one variable per entity mentioned in the triggering
//! message, together with the table the front end uses to rewrite mention
//! literals into those variables.
//!
//! ### Result Dispatch
//!
//! The [`dispatch`] module turns any [`value::Value`] into exactly one
//! delivery: a message link, a file, an embed, a paginator, a short message
//! (credential redacted, mentions silenced), a previewable `output.py` file,
//! or a fenced, owner-bound paginated view ([`paginator`]).
//!
//! ### Invocation Loop
//!
//! [`feature::ReplFeature`] ties it together: it drives an
//! [`evaluator::Evaluator`], dispatches each yielded value and remembers what
//! the dispatch returned as the next `_`.
//!
//! ## Platform Boundary
//!
//! The chat service is reached only through [`chat::ChatClient`]. A terminal
//! implementation lives in [`console`].

pub mod binder;
pub mod chat;
pub mod config;
pub mod console;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod evaluator;
pub mod feature;
pub mod paginator;
pub mod scope;
pub mod value;

// Re-exports
pub use error::*;
pub use feature::ReplFeature;
pub use value::Value;
