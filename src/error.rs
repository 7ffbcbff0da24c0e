use thiserror::Error;

use crate::chat::ChatError;
use crate::config::ConfigError;
use crate::evaluator::EvalError;
use crate::paginator::PaginatorError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),
    // eval error
    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Paginator error: {0}")]
    Paginator(#[from] PaginatorError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

// エラー作成用のヘルパー関数
impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
