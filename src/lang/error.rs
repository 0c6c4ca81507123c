//! Error carriers for the scripting language.
//!
//! Parse errors are fatal and location-aware. Runtime errors short-circuit
//! evaluation and keep the underlying host cause for unwrapping.

use std::fmt;

use thiserror::Error;

use super::value::Kind;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: invalid identifier: {literal}")]
    InvalidIdentifier { line: u32, literal: String },

    #[error("line {line}: character is not an expected symbol: {literal}")]
    UnexpectedSymbol { line: u32, literal: String },

    #[error("line {line}: invalid number literal: {literal}")]
    InvalidNumberLiteral { line: u32, literal: String },

    #[error("line {line}: unterminated multi-line comment")]
    UnterminatedComment { line: u32 },

    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: u32 },

    #[error("line {line}: unexpected token encountered: got {got}")]
    UnexpectedToken { line: u32, got: String },

    #[error("line {line}: unexpected token encountered: got {got} but expected {expected}")]
    UnexpectedTokenWanted {
        line: u32,
        got: String,
        expected: String,
    },

    #[error("all export statements must be declared at the top level of the module")]
    ExportNotAtTopLevel,

    #[error("all import statements must be declared at the top level of the module")]
    ImportNotAtTopLevel,

    #[error("all interface statements must be declared at the top level of the module")]
    InterfaceNotAtTopLevel,

    #[error("an export statement must be followed by a declaration")]
    ExportMustHaveDeclaration,

    #[error("line {line}: assignment is only allowed to a bare identifier")]
    AssignmentNotAllowed { line: u32 },

    #[error("functions cannot be called at the top level of the program")]
    CallAtTopLevel,

    #[error("line {line}: missing lambda argument name")]
    MissingLambdaArg { line: u32 },

    #[error("unexpected end of input")]
    UnexpectedEof,
}

/// Error produced while evaluating a script. The first error encountered
/// propagates up to the statement loop, which stops and returns it.
#[derive(Debug)]
pub struct RuntimeError {
    msg: String,
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RuntimeError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            cause: None,
        }
    }

    /// Lifts a host error into the script error channel, preserving its text
    /// and keeping the original for unwrapping.
    pub fn lift<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            msg: err.to_string(),
            cause: Some(Box::new(err)),
        }
    }

    pub fn type_error(fn_name: &str, expected: Kind) -> Self {
        Self::new(format!("expected {expected} as argument to {fn_name}"))
    }

    pub fn message(&self) -> &str {
        &self.msg
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        Self::lift(err)
    }
}
