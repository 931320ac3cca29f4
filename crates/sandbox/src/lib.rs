//! Toolscript sandbox: a closed Python subset for model-generated code.
//!
//! Generated programs are never handed to a general-purpose runtime. They are
//! parsed into a small syntax tree and interpreted here, where the only
//! reachable capabilities are the host's declared tools and the builtins the
//! [`policy::Policy`] allows.
//!
//! # Example
//!
//! ```
//! use policy::Policy;
//! use sandbox::{EmptyToolHost, Executor};
//!
//! let executor = Executor::new(EmptyToolHost, Policy::standard());
//! let code = "def answer_user_question(question):\n    return question.upper()\n";
//! assert_eq!(executor.execute(code, "hello"), "HELLO");
//! ```

pub mod ast;
mod builtins;
mod error;
mod executor;
mod format;
mod host;
mod interp;
mod lexer;
mod limits;
mod methods;
mod parser;
mod value;

pub use builtins::Builtin;
pub use error::{Error, ErrorKind, Result};
pub use executor::{ENTRY_FUNCTION, Executor, MISSING_ENTRY};
pub use format::format_value;
pub use host::{EmptyToolHost, Param, ParamType, ToolCall, ToolError, ToolHost, ToolSpec};
pub use interp::Interpreter;
pub use lexer::{Tok, Token, tokenize};
pub use limits::Limits;
pub use parser::parse;
pub use value::{Exception, Record, Value, format_float};
