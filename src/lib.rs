//! minischeme - a small Scheme-like interpreter with lexical closures
//!
//! This crate tokenizes source text, parses the tokens into nested
//! [`ast::Expression`] trees and evaluates them against a chain of shared,
//! mutable environment frames.
//!
//! ```scheme
//! (define (make-adder n) (lambda (x) (+ x n)))
//! (define add5 (make-adder 5))
//! (add5 3)            ; => 8
//! (/ 7 2)             ; => 3.5
//! ```
//!
//! ## Language
//!
//! - Numbers are integers (`i64`) or floats (`f64`); mixing the two yields a float
//! - `define` binds a variable, or a procedure with the `(define (name args...) body)` shorthand
//! - `lambda` creates a closure over the environment it is evaluated in
//! - `+`, `-`, `*` and `/` are variadic builtins
//!
//! ## Modules
//!
//! - `scheme`: tokenizer and parser
//! - `ast`: numbers, expressions and runtime values
//! - `evaluator`: environments and the evaluation engine
//! - `builtinops`: the fixed table of builtin procedures and special forms
//!
//! ## Example
//!
//! ```
//! use minischeme::evaluator::{make_global_environment, run};
//! use minischeme::ast::Value;
//!
//! let env = make_global_environment();
//! let result = run("(define x 3) (* x x)", &env).unwrap();
//! assert_eq!(result, Some(Value::from(9)));
//! ```

use thiserror::Error;

use crate::evaluator::Arity;

/// Maximum evaluation depth before evaluation fails with [`Error::RecursionLimit`].
///
/// Each nested expression and each procedure body adds one level. The host
/// stack is grown on demand, so this ceiling is the effective limit.
pub const MAX_EVAL_DEPTH: usize = 20_000;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// No tokens at all
    Empty,
    /// Input ended while one or more combinations were still open
    Incomplete,
    /// A `)` with no matching `(`
    UnexpectedClose,
    /// Extra tokens after a complete expression
    TrailingContent,
}

/// A structured error describing a parsing failure.
#[derive(Debug, PartialEq, Eq, Clone, Error)]
#[error("{message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Index of the offending token, if there is one
    pub position: Option<usize>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, position: Option<usize>) -> Self {
        ParseError {
            kind,
            message: message.into(),
            position,
        }
    }
}

/// Every failure of an evaluation that is not a name-resolution failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("cannot evaluate an empty combination")]
    EmptyCombination,
    #[error("malformed {form}: {reason}")]
    MalformedForm { form: &'static str, reason: String },
    #[error("cannot apply non-procedure: {0}")]
    NotCallable(String),
    #[error("expected {expected} arguments, got {got}")]
    Arity { expected: Arity, got: usize },
    #[error("'{op}' expects numeric arguments, got {found}")]
    TypeMismatch { op: String, found: String },
    #[error("{0}")]
    Arithmetic(String),
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("ParseError: {0}")]
    ParseError(#[from] ParseError),
    #[error("NameError: name '{0}' is not defined")]
    NameError(String),
    #[error("EvaluationError: {0}")]
    EvaluationError(#[from] EvaluationError),
    #[error("RecursionError: maximum evaluation depth exceeded (max: {limit})")]
    RecursionLimit { limit: usize },
}

impl Error {
    /// Create an arity error for a call that received `got` arguments
    pub fn arity_error(expected: Arity, got: usize) -> Self {
        EvaluationError::Arity { expected, got }.into()
    }

    pub fn malformed(form: &'static str, reason: impl Into<String>) -> Self {
        EvaluationError::MalformedForm {
            form,
            reason: reason.into(),
        }
        .into()
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        EvaluationError::Arithmetic(message.into()).into()
    }

    /// True for an unbound-symbol failure
    pub fn is_name_error(&self) -> bool {
        matches!(self, Error::NameError(_))
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod scheme;
mod stack;

pub use ast::{Expression, Number, Value};
pub use evaluator::{Environment, apply, evaluate, make_global_environment, run};
pub use scheme::{parse, parse_program, tokenize};
