//! Documentation views
//!
//! Struct, interface and named-type views combine a shape with the docs the
//! metadata lookup finds for its declaration. Lookup failures leave the docs
//! empty.

use std::fmt;

use reflect_shape_metadata::TypeMetadata;
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::error::ShapeError;
use crate::extractor::Extractor;
use crate::rtype::Kind;
use crate::shape::{NodeId, Shape, ShapeBody};

/// First `size` characters of `doc`, followed by `...` when cut.
pub fn truncate_doc(doc: &str, size: usize) -> String {
    match doc.char_indices().nth(size) {
        Some((end, _)) => format!("{}...", &doc[..end]),
        None => doc.to_string(),
    }
}

/// Struct field with its doc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldView {
    /// Field name
    pub name: String,
    /// Field shape
    pub shape: NodeId,
    /// Raw struct tag
    pub tag: String,
    /// Whether the field is embedded
    pub embedded: bool,
    /// Field doc, or its trailing comment
    pub doc: String,
}

/// Struct declaration view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructView {
    /// Type name
    pub name: String,
    /// Type doc
    pub doc: String,
    /// Fields in declaration order
    pub fields: Vec<FieldView>,
    truncation: usize,
}

impl fmt::Display for StructView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.fields.iter().map(|field| field.name.as_str()).collect();
        write!(
            f,
            "&Struct{{Name: {:?}, Fields: {:?}, Doc: {:?}}}",
            self.name,
            names,
            truncate_doc(&self.doc, self.truncation)
        )
    }
}

/// Interface method with its doc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodView {
    /// Method name
    pub name: String,
    /// Function shape
    pub shape: NodeId,
    /// Method doc
    pub doc: String,
}

/// Interface declaration view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceView {
    /// Type name
    pub name: String,
    /// Type doc
    pub doc: String,
    /// Methods in declaration order
    pub methods: Vec<MethodView>,
    truncation: usize,
}

impl fmt::Display for InterfaceView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.methods.iter().map(|m| m.name.as_str()).collect();
        write!(
            f,
            "&Interface{{Name: {:?}, Methods: {:?}, Doc: {:?}}}",
            self.name,
            names,
            truncate_doc(&self.doc, self.truncation)
        )
    }
}

/// Any named type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedView {
    /// Type name
    pub name: String,
    /// Kind of the underlying type
    pub kind: Kind,
    /// Type doc
    pub doc: String,
    truncation: usize,
}

impl fmt::Display for NamedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "&Type{{Name: {:?}, Kind: {}, Doc: {:?}}}",
            self.name,
            self.kind,
            truncate_doc(&self.doc, self.truncation)
        )
    }
}

fn mismatch(id: NodeId, expected: &'static str, shape: &Shape) -> ShapeError {
    ShapeError::KindMismatch {
        node: id.0,
        expected,
        found: shape.body.variant_name(),
    }
}

impl Extractor {
    fn type_metadata(&self, shape: &Shape) -> Option<TypeMetadata> {
        if self.config().skip_docs {
            return None;
        }
        let lookup = self.lookup()?;
        let info = &shape.info;
        match lookup.lookup_type(&info.package, &info.name) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                warn!(ty = %info.full_name(), error = %err, "type metadata lookup failed");
                None
            }
        }
    }

    /// Struct view of a struct node
    pub fn describe_struct(&self, id: NodeId) -> Result<StructView, ShapeError> {
        let shape = self.shape(id)?;
        let ShapeBody::Struct { fields } = &shape.body else {
            return Err(mismatch(id, "struct", shape));
        };

        let metadata = self.type_metadata(shape);
        let docs = metadata
            .as_ref()
            .map(TypeMetadata::field_docs)
            .unwrap_or_else(FxHashMap::default);
        let fields = fields
            .iter()
            .map(|field| FieldView {
                name: field.name.clone(),
                shape: field.shape,
                tag: field.tag.clone(),
                embedded: field.embedded,
                doc: docs.get(field.name.as_str()).map_or_else(String::new, |d| d.to_string()),
            })
            .collect();

        Ok(StructView {
            name: shape.info.name.clone(),
            doc: metadata.as_ref().map(|m| m.doc.clone()).unwrap_or_default(),
            fields,
            truncation: self.config().doc_truncation_size,
        })
    }

    /// Interface view of an interface node
    pub fn describe_interface(&self, id: NodeId) -> Result<InterfaceView, ShapeError> {
        let shape = self.shape(id)?;
        let ShapeBody::Interface { methods } = &shape.body else {
            return Err(mismatch(id, "interface", shape));
        };

        let metadata = self.type_metadata(shape);
        let docs = metadata
            .as_ref()
            .map(TypeMetadata::field_docs)
            .unwrap_or_else(FxHashMap::default);
        let methods = methods
            .iter()
            .map(|method| MethodView {
                name: method.name.clone(),
                shape: method.shape,
                doc: docs.get(method.name.as_str()).map_or_else(String::new, |d| d.to_string()),
            })
            .collect();

        Ok(InterfaceView {
            name: shape.info.name.clone(),
            doc: metadata.as_ref().map(|m| m.doc.clone()).unwrap_or_default(),
            methods,
            truncation: self.config().doc_truncation_size,
        })
    }

    /// View of any named node
    pub fn describe_named(&self, id: NodeId) -> Result<NamedView, ShapeError> {
        let shape = self.shape(id)?;
        let named = self
            .types()
            .get(shape.info.ty)
            .is_some_and(|ty| ty.is_named() && !ty.pkg_path.is_empty());
        if !named {
            return Err(mismatch(id, "named", shape));
        }

        Ok(NamedView {
            name: shape.info.name.clone(),
            kind: shape.info.kind,
            doc: self
                .type_metadata(shape)
                .map(|m| m.doc)
                .unwrap_or_default(),
            truncation: self.config().doc_truncation_size,
        })
    }
}
