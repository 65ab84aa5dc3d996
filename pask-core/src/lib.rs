#![forbid(unsafe_code)]

//! Semantic-analysis and code-generation core for pask, a small
//! Pascal-family teaching language.
//!
//! Two passes over one tree: the static checker ([`sema`]) elaborates the
//! parser's raw AST into a type-exact tree, and the code generator
//! ([`lower`]) lowers the elaborated tree to stack-machine code, one blob
//! per procedure. Lexing, parsing, the machine itself and all I/O live
//! outside this crate.

pub mod ast;
pub mod diagnostics;
pub mod lower;
pub mod sema;
pub mod symbols;
pub mod types;

pub use diagnostics::{Diagnostics, StaticError};
pub use lower::generate_program;
pub use sema::Checker;
pub use symbols::SymbolTable;
pub use types::Type;
