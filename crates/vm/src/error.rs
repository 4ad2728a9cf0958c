use std::fmt;

use crate::value::Val;

/// Errors from bounds-checked data access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: i64, len: usize },
    #[error("expected {expected}")]
    WrongKind { expected: &'static str },
    #[error("value is shared and cannot be changed in place")]
    Shared,
    #[error("the last slot of a chain link must be a chain link or END")]
    BrokenChain,
}

/// What went wrong while expanding or running code.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("lookup error: {0}")]
    Unbound(String),
    #[error("{callee}: {problem}")]
    Arity { callee: String, problem: String },
    #[error("{context}: expected {expected}; received {got}")]
    Type {
        context: String,
        expected: &'static str,
        got: String,
    },
    #[error("object is not callable: {0}")]
    NotCallable(String),
    #[error("symbol is already bound: {0}")]
    AlreadyBound(String),
    #[error("{0}")]
    Malformed(String),
    #[error("integer overflow in {0}")]
    Overflow(&'static str),
    #[error("division by zero in {0}")]
    DivisionByZero(&'static str),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Raised by the program itself.
    #[error("{0}")]
    Raised(String),
    /// A request to end the process with the given status.
    #[error("exit with status {0}")]
    Exit(i32),
}

/// An evaluation error, with enough context to point at the offending code.
#[derive(thiserror::Error)]
#[error("{kind}")]
pub struct EvalError {
    pub kind: ErrorKind,
    /// Forms that were being evaluated, innermost first.
    pub context: Vec<Val>,
    /// Names of the enclosing call and expansion frames, innermost first.
    pub trace: Vec<String>,
}

impl EvalError {
    pub fn new(kind: ErrorKind) -> Self {
        EvalError {
            kind,
            context: vec![],
            trace: vec![],
        }
    }

    pub fn with_context(mut self, form: &Val) -> Self {
        self.context.push(form.clone());
        self
    }

    pub fn with_frame(mut self, name: impl Into<String>) -> Self {
        self.trace.push(name.into());
        self
    }

    /// Returns `true` if this is a request to exit rather than a failure.
    pub fn exit_status(&self) -> Option<i32> {
        match self.kind {
            ErrorKind::Exit(status) => Some(status),
            _ => None,
        }
    }
}

impl fmt::Debug for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalError")
            .field("kind", &self.kind)
            .field("trace", &self.trace)
            .finish()
    }
}

impl From<ErrorKind> for EvalError {
    fn from(kind: ErrorKind) -> Self {
        EvalError::new(kind)
    }
}

impl From<DataError> for EvalError {
    fn from(e: DataError) -> Self {
        EvalError::new(e.into())
    }
}

impl From<std::io::Error> for EvalError {
    fn from(e: std::io::Error) -> Self {
        EvalError::new(e.into())
    }
}

pub type Result<T, E = EvalError> = std::result::Result<T, E>;
