//! Sandbox error types.

use std::fmt;
use thiserror::Error;

/// Exception classes raised by toolscript code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Exception,
    NameError,
    /// A function-local name read before it was assigned.
    UnboundLocalError,
    TypeError,
    ValueError,
    AttributeError,
    IndexError,
    KeyError,
    ZeroDivisionError,
    OverflowError,
    RuntimeError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 11] = [
        Self::Exception,
        Self::NameError,
        Self::UnboundLocalError,
        Self::TypeError,
        Self::ValueError,
        Self::AttributeError,
        Self::IndexError,
        Self::KeyError,
        Self::ZeroDivisionError,
        Self::OverflowError,
        Self::RuntimeError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Exception => "Exception",
            Self::NameError => "NameError",
            Self::UnboundLocalError => "UnboundLocalError",
            Self::TypeError => "TypeError",
            Self::ValueError => "ValueError",
            Self::AttributeError => "AttributeError",
            Self::IndexError => "IndexError",
            Self::KeyError => "KeyError",
            Self::ZeroDivisionError => "ZeroDivisionError",
            Self::OverflowError => "OverflowError",
            Self::RuntimeError => "RuntimeError",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Whether an `except <handler>` clause catches this kind.
    pub fn caught_by(self, handler: &str) -> bool {
        match handler {
            "Exception" | "BaseException" => true,
            "ArithmeticError" => matches!(self, Self::ZeroDivisionError | Self::OverflowError),
            "LookupError" => matches!(self, Self::IndexError | Self::KeyError),
            "NameError" => matches!(self, Self::NameError | Self::UnboundLocalError),
            _ => self.name() == handler,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors from parsing or running toolscript.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum Error {
    /// The program text is not valid toolscript.
    #[error("invalid syntax (line {line}, column {column}): {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// The program uses a construct outside the supported language.
    #[error("unsupported construct '{construct}' (line {line})")]
    Unsupported { construct: String, line: usize },

    /// An exception raised while running; catchable with `try/except`.
    #[error("{kind}: {message}")]
    Runtime {
        kind: ErrorKind,
        message: String,
        /// Line of the statement that raised, 0 until known.
        line: usize,
    },

    /// A tool, builtin or import was refused by policy.
    #[error("capability denied: {0}")]
    CapabilityDenied(String),

    #[error("execution step limit of {0} exceeded")]
    StepLimit(u64),

    #[error("maximum call depth of {0} exceeded")]
    DepthLimit(usize),

    #[error("sequence length limit of {0} exceeded")]
    SequenceLimit(usize),
}

impl Error {
    pub fn runtime(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Runtime {
            kind,
            message: message.into(),
            line: 0,
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::runtime(ErrorKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::runtime(ErrorKind::ValueError, message)
    }

    pub fn name_error(name: &str) -> Self {
        Self::runtime(ErrorKind::NameError, format!("name '{name}' is not defined"))
    }

    pub fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    pub fn unsupported(construct: impl Into<String>, line: usize) -> Self {
        Self::Unsupported {
            construct: construct.into(),
            line,
        }
    }

    /// Whether `try/except` may intercept this error.
    ///
    /// Limits and capability denials always abort the program.
    pub fn is_catchable(&self) -> bool {
        matches!(self, Self::Runtime { .. })
    }

    /// Attach a line number to a runtime error that has none yet.
    pub fn at_line(self, at: usize) -> Self {
        match self {
            Self::Runtime {
                kind,
                message,
                line: 0,
            } => Self::Runtime {
                kind,
                message,
                line: at,
            },
            other => other,
        }
    }

    /// Source line the error refers to, if known.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Syntax { line, .. } | Self::Unsupported { line, .. } => Some(*line),
            Self::Runtime { line, .. } if *line > 0 => Some(*line),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
