//! malxp - a small Lisp interpreter with macros, tail calls and atoms
//!
//! This crate reads textual source into an in-memory [`ast::Value`] tree and evaluates it
//! against a chain of lexically scoped environments. Closures capture their defining
//! environment, calls in tail position run in constant host stack, and macros rewrite
//! their unevaluated arguments before evaluation.
//!
//! ```lisp
//! (def! inc (fn* (x) (+ x 1)))       ; closures
//! (let* (a 1 b (inc a)) (list a b))  ; sequential bindings
//! (defmacro! unless (fn* (p a b) `(if ~p ~b ~a)))
//! (def! counter (atom 0))
//! (swap! counter + 5)                ; atoms
//! ```
//!
//! ## Evaluation model
//!
//! - `nil` and `false` are the only false values
//! - Special forms (`def!`, `let*`, `do`, `if`, `fn*`, `quote`, `quasiquote`,
//!   `quasiquoteexpand`, `macroexpand`, `defmacro!`) receive their arguments unevaluated
//! - Everything else is a call: the head is evaluated to a function and applied
//! - Integer arithmetic detects overflow rather than wrapping
//!
//! ## Modules
//!
//! - `reader`: text to [`ast::Value`]
//! - `printer`: [`ast::Value`] back to text
//! - `evaluator`: environments, special forms and the tail-call loop
//! - `builtinops`: the primitive library installed in the root environment

use std::fmt;

use crate::ast::Value;
use crate::evaluator::Arity;

/// Maximum nesting depth accepted by the reader
/// Keeps recursive descent well inside the host stack
pub const MAX_PARSE_DEPTH: usize = 256;

/// Default maximum depth of non-tail evaluation on a thread
///
/// Every evaluation that is still waiting on an inner one counts, including those
/// re-entered through `apply`, `eval` and `swap!`. Calls in tail position are
/// iterated and do not count. The default fits the 2 MiB stack of a spawned
/// thread in an unoptimized build; threads with a larger stack can raise it with
/// [`evaluator::set_max_eval_depth`].
pub const MAX_EVAL_DEPTH: usize = 128;

/// Categorizes the different kinds of syntax errors.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum SyntaxErrorKind {
    /// Invalid or unexpected syntax (stray closing bracket, malformed map)
    InvalidSyntax,
    /// Input ended before the form was complete (unterminated string, unclosed bracket)
    Incomplete,
    /// Input held no form at all, only whitespace or comments
    Empty,
    /// Form nesting exceeded [`MAX_PARSE_DEPTH`]
    TooDeeplyNested,
    /// Extra input found after a complete form
    TrailingContent,
    /// Syntax of the wider language family that this reader does not accept
    Unsupported,
    /// Implementation-imposed limit exceeded (integer literal out of range)
    ImplementationLimit,
}

/// A structured error describing where and why reading failed.
#[derive(Debug, PartialEq, Clone)]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The offending token, if identifiable
    pub found: Option<String>,
}

impl SyntaxError {
    pub fn new(
        kind: SyntaxErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        SyntaxError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// A SyntaxError with a kind and message but no context
    pub fn from_message(kind: SyntaxErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// A SyntaxError with context extracted from input at a byte offset
    pub fn with_context(
        kind: SyntaxErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        Self::with_context_and_found(kind, message, input, error_offset, None)
    }

    pub fn with_context_and_found(
        kind: SyntaxErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        // Offsets come from the tokenizer and are byte positions; snippets are cut on chars.
        let char_offset = input
            .char_indices()
            .take_while(|(i, _)| *i < error_offset)
            .count();
        let context_start = char_offset.saturating_sub(20);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SyntaxError {}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("SyntaxError: {0}")]
    SyntaxError(#[from] SyntaxError),
    #[error("NameError: '{0}' not found")]
    NameError(String),
    #[error("ArityError: {}expected {expected} arguments, got {got}", in_expression(.expression))]
    ArityError {
        expected: Arity,
        got: usize,
        expression: Option<String>,
    },
    #[error("NotCallableError: {0} is not a function")]
    NotCallableError(String),
    #[error("TypeError: {0}")]
    TypeError(String),
    #[error("EvaluationError: {0}")]
    EvalError(String),
    #[error("IoError: {0}")]
    IoError(String),
    #[error("UserError: {0}")]
    UserError(Value),
}

fn in_expression(expression: &Option<String>) -> String {
    match expression {
        Some(expr) => format!("{expr}: "),
        None => String::new(),
    }
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: Arity, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: Arity, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }

    /// Attach expression context to an ArityError that has none yet
    pub(crate) fn with_expression(self, expression: impl FnOnce() -> String) -> Self {
        match self {
            Error::ArityError {
                expected,
                got,
                expression: None,
            } => Error::arity_error_with_expr(expected, got, expression()),
            other => other,
        }
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod printer;
pub mod reader;
