//! DWS Interpreter Library
//!
//! Lexer, parser and tree-walking interpreter for an object-oriented
//! Pascal-family scripting language.

pub mod ast;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod util;

pub use ast::Span;
pub use error::{CompileError, Result};
pub use interp::{Interpreter, InterpreterConfig, RuntimeError, Value};
