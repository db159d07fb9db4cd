//! The host sublanguage: a small, self-contained, Python-flavored,
//! indentation-sensitive scripting language that templates embed statements
//! and expressions in.
//!
//! spec treats the host language's lexer/parser/evaluator as an
//! out-of-scope external collaborator ("assumed available as a black-box
//! embedding facility"). Rust ships no such facility, so this module
//! supplies one: a tokenizer, a recursive-descent parser, and a
//! tree-walking interpreter with thread-backed generator semantics.

pub mod ast;
pub mod indent;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod routine;
pub mod text;
pub mod token;
pub mod value;

pub use routine::{Produced, Resume, RoutineHandle, SharedEnv};
pub use value::{FeatureMask, RuntimeError, Value};
