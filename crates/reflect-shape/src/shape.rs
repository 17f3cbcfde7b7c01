//! Shape node model
//!
//! A shape graph is an arena of [`Shape`] nodes owned by the
//! [`Extractor`](crate::Extractor); edges are [`NodeId`]s. Every node carries
//! the common [`Info`] record and a variant-specific [`ShapeBody`].
//!
//! | Variant      | Produced for                                   |
//! |--------------|------------------------------------------------|
//! | `Primitive`  | bool, numbers, strings, unsafe pointers        |
//! | `Struct`     | struct types                                   |
//! | `Interface`  | interface types                                |
//! | `Function`   | function types and function values             |
//! | `Container`  | slices, arrays (one arg) and maps (two args)   |
//! | `Unknown`    | channels and undefined types                   |
//! | `ForwardRef` | transient; never reachable after extraction    |

use std::fmt;

use once_cell::unsync::OnceCell;
use reflect_shape_metadata::CodeAddr;

use crate::rtype::{Kind, TypeId, TypeTable};

/// Index of a shape node within its extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Deduplication key: the type, plus the code address for function values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeKey {
    /// Base type
    pub ty: TypeId,
    /// Code address; `CodeAddr::NONE` for anything but function values
    pub addr: CodeAddr,
}

/// Attributes common to every shape node.
#[derive(Debug, Clone)]
pub struct Info {
    /// Declared or derived name
    pub name: String,
    /// Package path
    pub package: String,
    /// Kind of the base type
    pub kind: Kind,
    /// Pointer indirections stripped to reach the base type
    pub lv: u32,
    /// Base type
    pub ty: TypeId,
    /// Deduplication key
    pub key: ShapeKey,
    /// Creation order within the extractor
    pub number: u32,
    /// Whether the node describes a method
    pub is_method: bool,
    /// Whether all child references point past forward references
    pub completed: bool,
    identity: OnceCell<String>,
}

impl Info {
    pub(crate) fn new(name: String, package: String, kind: Kind, key: ShapeKey, number: u32) -> Self {
        Self {
            name,
            package,
            kind,
            lv: 0,
            ty: key.ty,
            key,
            number,
            is_method: false,
            completed: false,
            identity: OnceCell::new(),
        }
    }

    /// `package.name`, or the bare name for predeclared types
    pub fn full_name(&self) -> String {
        if self.package.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.package, self.name)
        }
    }

    /// Memoized identity: `fullname:type@size`
    pub fn identity(&self, types: &TypeTable) -> &str {
        self.identity.get_or_init(|| {
            format!(
                "{}:{}@{}",
                self.full_name(),
                types.describe(self.ty),
                types.size(self.ty)
            )
        })
    }

    pub(crate) fn reset_identity(&mut self) {
        self.identity = OnceCell::new();
    }
}

/// Struct field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Field shape
    pub shape: NodeId,
    /// Raw struct tag
    pub tag: String,
    /// Whether the field is embedded
    pub embedded: bool,
}

/// Interface method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    /// Method name
    pub name: String,
    /// Function shape
    pub shape: NodeId,
}

/// Function parameter or result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Declared name or positional placeholder
    pub name: String,
    /// Shape of the parameter type
    pub shape: NodeId,
    /// Doc comment from source
    pub doc: String,
}

/// Function signature with naming.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Function {
    /// Parameters; methods extracted from method values include the receiver
    pub params: Vec<Param>,
    /// Results
    pub returns: Vec<Param>,
    /// Whether the last parameter is variadic
    pub is_variadic: bool,
    /// Doc comment from source
    pub doc: String,
    /// Receiver variable name from source
    pub recv: Option<String>,
}

impl Function {
    /// Parameter names in order
    pub fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    /// Result names in order
    pub fn return_names(&self) -> Vec<&str> {
        self.returns.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Variant-specific part of a shape node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeBody {
    /// Scalar
    Primitive,
    /// Struct with ordered fields
    Struct {
        /// Fields in declaration order
        fields: Vec<Field>,
    },
    /// Interface with ordered methods
    Interface {
        /// Methods in declaration order
        methods: Vec<Method>,
    },
    /// Function
    Function(Function),
    /// Generic container: one arg for sequences, key and value for maps
    Container {
        /// Element shapes
        args: Vec<NodeId>,
    },
    /// Not expanded
    Unknown,
    /// Placeholder redirecting to the real node once it exists
    ForwardRef {
        /// Redirect target; `None` while the referenced node is being built
        target: Option<NodeId>,
    },
}

impl ShapeBody {
    /// Variant name, for diagnostics
    pub fn variant_name(&self) -> &'static str {
        match self {
            ShapeBody::Primitive => "primitive",
            ShapeBody::Struct { .. } => "struct",
            ShapeBody::Interface { .. } => "interface",
            ShapeBody::Function(_) => "function",
            ShapeBody::Container { .. } => "container",
            ShapeBody::Unknown => "unknown",
            ShapeBody::ForwardRef { .. } => "forward-ref",
        }
    }

    /// Child node references, forward-ref targets excluded
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            ShapeBody::Struct { fields } => fields.iter().map(|f| f.shape).collect(),
            ShapeBody::Interface { methods } => methods.iter().map(|m| m.shape).collect(),
            ShapeBody::Function(func) => func
                .params
                .iter()
                .chain(func.returns.iter())
                .map(|p| p.shape)
                .collect(),
            ShapeBody::Container { args } => args.clone(),
            ShapeBody::Primitive | ShapeBody::Unknown | ShapeBody::ForwardRef { .. } => Vec::new(),
        }
    }

    pub(crate) fn children_mut(&mut self) -> Vec<&mut NodeId> {
        match self {
            ShapeBody::Struct { fields } => fields.iter_mut().map(|f| &mut f.shape).collect(),
            ShapeBody::Interface { methods } => methods.iter_mut().map(|m| &mut m.shape).collect(),
            ShapeBody::Function(func) => func
                .params
                .iter_mut()
                .chain(func.returns.iter_mut())
                .map(|p| &mut p.shape)
                .collect(),
            ShapeBody::Container { args } => args.iter_mut().collect(),
            ShapeBody::Primitive | ShapeBody::Unknown | ShapeBody::ForwardRef { .. } => Vec::new(),
        }
    }
}

/// A node of the shape graph.
#[derive(Debug, Clone)]
pub struct Shape {
    /// Common attributes
    pub info: Info,
    /// Variant data
    pub body: ShapeBody,
}

impl Shape {
    /// Node name
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Kind of the base type
    pub fn kind(&self) -> Kind {
        self.info.kind
    }

    /// Pointer level
    pub fn lv(&self) -> u32 {
        self.info.lv
    }

    /// Struct fields, if this is a struct shape
    pub fn fields(&self) -> Option<&[Field]> {
        match &self.body {
            ShapeBody::Struct { fields } => Some(fields),
            _ => None,
        }
    }

    /// Interface methods, if this is an interface shape
    pub fn interface_methods(&self) -> Option<&[Method]> {
        match &self.body {
            ShapeBody::Interface { methods } => Some(methods),
            _ => None,
        }
    }

    /// Function data, if this is a function shape
    pub fn function(&self) -> Option<&Function> {
        match &self.body {
            ShapeBody::Function(func) => Some(func),
            _ => None,
        }
    }

    /// Container args, if this is a container shape
    pub fn args(&self) -> Option<&[NodeId]> {
        match &self.body {
            ShapeBody::Container { args } => Some(args),
            _ => None,
        }
    }

    /// Whether this node is a forward reference
    pub fn is_forward_ref(&self) -> bool {
        matches!(self.body, ShapeBody::ForwardRef { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(types: &TypeTable, ty: TypeId) -> Info {
        Info::new(
            "Person".to_string(),
            "example.com/app".to_string(),
            types.kind(ty),
            ShapeKey {
                ty,
                addr: CodeAddr::NONE,
            },
            0,
        )
    }

    #[test]
    fn test_identity_is_memoized_until_reset() {
        let types = TypeTable::new();
        let int = types.basic(Kind::Int);
        let string = types.basic(Kind::String);
        let mut info = info(&types, int);

        assert_eq!(info.identity(&types), "example.com/app.Person:int@8");
        info.ty = string;
        assert_eq!(info.identity(&types), "example.com/app.Person:int@8");
        info.reset_identity();
        assert_eq!(info.identity(&types), "example.com/app.Person:string@16");

        let clone = info.clone();
        assert_eq!(clone.identity(&types), info.identity(&types));
    }

    #[test]
    fn test_children() {
        let mut body = ShapeBody::Function(Function {
            params: vec![Param {
                name: "x".into(),
                shape: NodeId(1),
                doc: String::new(),
            }],
            returns: vec![Param {
                name: "ret0".into(),
                shape: NodeId(2),
                doc: String::new(),
            }],
            ..Function::default()
        });
        assert_eq!(body.children(), vec![NodeId(1), NodeId(2)]);
        for child in body.children_mut() {
            *child = NodeId(child.0 + 10);
        }
        assert_eq!(body.children(), vec![NodeId(11), NodeId(12)]);
        assert!(ShapeBody::ForwardRef { target: Some(NodeId(3)) }.children().is_empty());
        assert_eq!(ShapeBody::Unknown.variant_name(), "unknown");
    }
}
