//! Shared helpers for the integration tests.
//!
//! ```ignore
//! mod common;
//! use common::*;
//! ```
//!
//! - [`new_env`] - a fresh global environment
//! - [`eval_str`] - evaluate one form in a fresh environment
//! - [`eval_str_with_env`] - evaluate one form in an existing environment
//! - [`eval_all`] - evaluate several forms, returning the last value
//! - [`rep_str`] - read, evaluate and print, panicking on error

#![allow(dead_code)]

pub use malxp::Error;
pub use malxp::ast::{Value, kw, sym, val};
pub use malxp::evaluator::{Env, create_global_env, eval, rep};
pub use malxp::reader::read_str;

/// Create a global environment resolving files against the working directory
#[must_use]
pub fn new_env() -> Env {
    create_global_env().unwrap_or_else(|e| panic!("global environment failed: {e}"))
}

/// Evaluate one form in a fresh environment
pub fn eval_str(source: &str) -> Result<Value, Error> {
    eval_str_with_env(source, &new_env())
}

/// Evaluate one form in the given environment
pub fn eval_str_with_env(source: &str, env: &Env) -> Result<Value, Error> {
    eval(&read_str(source)?, env)
}

/// Evaluate a sequence of forms as one `do` body
pub fn eval_all(source: &str, env: &Env) -> Result<Value, Error> {
    eval_str_with_env(&format!("(do {source}\n)"), env)
}

/// Print the result of evaluating `source` readably
pub fn rep_str(source: &str, env: &Env) -> String {
    match rep(source, env) {
        Ok(text) => text,
        Err(e) => panic!("'{source}' failed: {e}"),
    }
}
