//! Evaluator contract and the literal evaluator used by the console.
//!
//! An [`Evaluator`] receives source text together with the scope, the
//! invocation's bindings and the convertables table, and answers with a lazy
//! stream of produced values. The stream is finite and is consumed once.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tracing::debug;

use crate::binder::{Bindings, Convertables};
use crate::scope::ScopeHandle;
use crate::value::Value;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("Syntax error in statement {index}: {message}")]
    Syntax { index: usize, message: String },
    #[error("Name '{0}' is not defined")]
    UndefinedName(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
}

pub type EvalResult<T> = Result<T, EvalError>;

pub type ValueStream = BoxStream<'static, EvalResult<Value>>;

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        source: &str,
        scope: ScopeHandle,
        bindings: Bindings,
        convertables: &Convertables,
    ) -> EvalResult<ValueStream>;
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(serde_json::Value),
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Statement {
    Assign(String, Expr),
    Expr(Expr),
}

/// Evaluates JSON literals, names, and `name = expr` assignments.
///
/// Statements are separated by newlines or `;`. Each expression statement
/// yields its value; assignments store into the scope and yield nothing.
#[derive(Debug, Clone, Default)]
pub struct LiteralEvaluator;

impl LiteralEvaluator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Evaluator for LiteralEvaluator {
    async fn evaluate(
        &self,
        source: &str,
        scope: ScopeHandle,
        bindings: Bindings,
        convertables: &Convertables,
    ) -> EvalResult<ValueStream> {
        let statements = match parse(source) {
            Ok(statements) => statements,
            Err(first_error) if !convertables.is_empty() => {
                debug!(error = %first_error, "retrying parse with mention substitution");
                parse(&convertables.apply(source)).map_err(|_| first_error)?
            }
            Err(error) => return Err(error),
        };

        let bindings = Arc::new(bindings);
        let values = stream::iter(statements)
            .filter_map(move |statement| {
                let scope = scope.clone();
                let bindings = bindings.clone();
                async move { execute(statement, &scope, &bindings).await.transpose() }
            })
            .boxed();
        Ok(values)
    }
}

async fn execute(
    statement: Statement,
    scope: &ScopeHandle,
    bindings: &Bindings,
) -> EvalResult<Option<Value>> {
    match statement {
        Statement::Assign(name, expr) => {
            let value = resolve(expr, scope, bindings).await?;
            scope.write().await.set(name, value);
            Ok(None)
        }
        Statement::Expr(expr) => resolve(expr, scope, bindings).await.map(Some),
    }
}

async fn resolve(expr: Expr, scope: &ScopeHandle, bindings: &Bindings) -> EvalResult<Value> {
    match expr {
        Expr::Literal(json) => Ok(Value::from(json)),
        Expr::Name(name) => {
            if let Some(value) = bindings.get(&name) {
                return Ok(value.clone());
            }
            scope
                .read()
                .await
                .get(&name)
                .cloned()
                .ok_or(EvalError::UndefinedName(name))
        }
    }
}

fn parse(source: &str) -> EvalResult<Vec<Statement>> {
    split_statements(source)
        .into_iter()
        .enumerate()
        .map(|(index, raw)| parse_statement(index, raw))
        .collect()
}

fn parse_statement(index: usize, raw: &str) -> EvalResult<Statement> {
    if let Some((target, expr)) = raw.split_once('=') {
        let target = target.trim();
        if is_identifier(target) {
            return Ok(Statement::Assign(
                target.to_string(),
                parse_expr(index, expr.trim())?,
            ));
        }
    }
    parse_expr(index, raw).map(Statement::Expr)
}

fn parse_expr(index: usize, raw: &str) -> EvalResult<Expr> {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(raw) {
        return Ok(Expr::Literal(json));
    }
    if is_identifier(raw) {
        return Ok(Expr::Name(raw.to_string()));
    }
    Err(EvalError::Syntax {
        index,
        message: format!("cannot parse `{}`", raw),
    })
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Splits on newlines and `;` outside of string literals, dropping empty statements.
fn split_statements(source: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (position, c) in source.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '\n' | ';' => {
                statements.push(&source[start..position]);
                start = position + c.len_utf8();
            }
            _ => {}
        }
    }
    statements.push(&source[start..]);
    statements
        .into_iter()
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .collect()
}
