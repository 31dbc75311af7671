//! Core compiler for the Ember language.
//!
//! Ember source is compiled to C or to JavaScript. The pipeline is roughly:
//!
//!   source .em
//!     -> splitter   (comments, statements, balanced groups)
//!     -> parser     (expressions, by ordered matching)
//!     -> compiler   (scopes, bindings, statements, lifting of functions)
//!     -> typecheck  (inference and validation against the registries)
//!     -> codegen_c / codegen_js
//!
//! Front-ends such as the CLI should depend on this crate rather than
//! reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------

pub mod error;

// ---------------------------------------------------------------------
// Front-end: text splitting and expression parsing
// ---------------------------------------------------------------------

pub mod splitter;
pub mod parser;
pub mod control;
pub mod ast;

// ---------------------------------------------------------------------
// Semantic layers: types, symbols, registries, type checking
// ---------------------------------------------------------------------

pub mod types;
pub mod symbols;
pub mod registry;
pub mod typecheck;
pub mod closure;

// ---------------------------------------------------------------------
// Builtins
// ---------------------------------------------------------------------

pub mod builtins;

// ---------------------------------------------------------------------
// Back-end: code generation and compiler orchestration
// ---------------------------------------------------------------------

pub mod codegen;
pub mod codegen_c;
pub mod codegen_js;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use ast::Program;
pub use codegen::{Emitter, Target};
pub use compiler::{Compiler, compile, compile_program};
pub use error::CoreError;
