//! Reflect Shape
//!
//! Builds deduplicated, cycle-safe shape graphs from runtime types: kinds,
//! fields, methods, parameters and return values, enriched with argument
//! names and documentation read from source.
//!
//! # Architecture
//!
//! ```text
//! TypeTable + Value → Extractor → shape graph (arena of Shape nodes)
//!                         │
//!                         └─ fixup → metadata Lookup → source files
//! ```
//!
//! - [`rtype`]: runtime type descriptors and live values supplied by the host
//! - [`shape`]: the node model
//! - [`extractor`]: the graph builder, packages, method sets and display
//! - [`describe`]: struct, interface and named-type documentation views
//! - [`config`]: extractor options, loadable from TOML
//!
//! Metadata is best-effort: a failed lookup degrades to positional names
//! and empty docs and is reported through `tracing`.

pub mod config;
pub mod describe;
pub mod error;
pub mod extractor;
mod fixup;
pub mod rtype;
pub mod shape;

pub use config::{Config, ConfigError};
pub use describe::{truncate_doc, FieldView, InterfaceView, MethodView, NamedView, StructView};
pub use error::{ShapeError, TypeError};
pub use extractor::{Extractor, Package, ShapeDisplay};
pub use rtype::{
    InterfaceMethod, Kind, MethodDecl, MethodValue, Signature, StructField, Type, TypeId, TypeRepr,
    TypeTable, Value,
};
pub use shape::{Field, Function, Info, Method, NodeId, Param, Shape, ShapeBody, ShapeKey};

pub use reflect_shape_metadata as metadata;
pub use reflect_shape_metadata::{CodeAddr, Lookup, LookupOptions, Symbol, SymbolResolver, SymbolTable};
