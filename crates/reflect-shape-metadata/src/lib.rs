//! Source metadata for reflect-shape
//!
//! Resolves documentation and declared argument names for runtime
//! functions and named types by parsing their originating source units on
//! demand.
//!
//! ## Components
//!
//! - [`symbol`]: executable-address → symbol resolution and qualified-name parsing
//! - [`lexer`] / [`collect`]: declaration-level scanner for Go-syntax sources
//! - [`lookup`]: per-package cache that answers function and type queries
//!
//! Every failure surfaced here is a soft failure for the shape builder:
//! callers log it and fall back to positional names and empty docs.

#![warn(missing_docs)]

pub mod collect;
pub mod error;
pub mod lexer;
pub mod lookup;
pub mod symbol;

pub use collect::{
    parse_file, FieldDecl, FileDecls, FuncDecl, FuncLit, PackageDecls, Receiver, TypeDecl,
    TypeDeclKind, Var,
};
pub use error::{MetadataError, ParseError};
pub use lookup::{FieldMetadata, FuncMetadata, Lookup, LookupOptions, TypeMetadata, VarMetadata};
pub use symbol::{CodeAddr, NameKind, QualifiedName, Symbol, SymbolResolver, SymbolTable};
