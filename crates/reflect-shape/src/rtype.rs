//! Runtime type model
//!
//! The host describes its types to the extractor through a [`TypeTable`]:
//! an arena of type descriptors addressed by [`TypeId`]. Unnamed composite
//! types are interned so that structurally identical types share one id;
//! named types are declared first and defined later, which is how
//! self-referential types are built.
//!
//! ```text
//! let person = types.declare("example.com/app", "Person");
//! let ptr = types.pointer_to(person);
//! types.define(person, TypeRepr::Struct(vec![StructField::new("Father", ptr)]))?;
//! ```
//!
//! Live values travel alongside as [`Value`] trees. `Value::Zero` stands for
//! "no value" and is accepted wherever a value is expected.

use std::fmt;

use reflect_shape_metadata::CodeAddr;
use rustc_hash::FxHashMap;

use crate::error::TypeError;

/// Machine word size used for layout.
const WORD: usize = 8;

/// Index of a type within its [`TypeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Type kinds.
///
/// Basic kinds come first so that a basic kind's discriminant doubles as its
/// predeclared [`TypeId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    Invalid = 0,
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
    UnsafePointer,
    Array,
    Chan,
    Func,
    Interface,
    Map,
    Pointer,
    Slice,
    Struct,
}

const BASIC_KINDS: [Kind; 19] = [
    Kind::Invalid,
    Kind::Bool,
    Kind::Int,
    Kind::Int8,
    Kind::Int16,
    Kind::Int32,
    Kind::Int64,
    Kind::Uint,
    Kind::Uint8,
    Kind::Uint16,
    Kind::Uint32,
    Kind::Uint64,
    Kind::Uintptr,
    Kind::Float32,
    Kind::Float64,
    Kind::Complex64,
    Kind::Complex128,
    Kind::String,
    Kind::UnsafePointer,
];

impl Kind {
    /// Kind name as printed in type strings
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Invalid => "invalid",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Int8 => "int8",
            Kind::Int16 => "int16",
            Kind::Int32 => "int32",
            Kind::Int64 => "int64",
            Kind::Uint => "uint",
            Kind::Uint8 => "uint8",
            Kind::Uint16 => "uint16",
            Kind::Uint32 => "uint32",
            Kind::Uint64 => "uint64",
            Kind::Uintptr => "uintptr",
            Kind::Float32 => "float32",
            Kind::Float64 => "float64",
            Kind::Complex64 => "complex64",
            Kind::Complex128 => "complex128",
            Kind::String => "string",
            Kind::UnsafePointer => "unsafe.Pointer",
            Kind::Array => "array",
            Kind::Chan => "chan",
            Kind::Func => "func",
            Kind::Interface => "interface",
            Kind::Map => "map",
            Kind::Pointer => "ptr",
            Kind::Slice => "slice",
            Kind::Struct => "struct",
        }
    }

    /// Whether this is a predeclared scalar kind
    pub fn is_basic(self) -> bool {
        (self as u8) <= (Kind::UnsafePointer as u8)
    }

    /// (size, align) of a basic kind
    fn layout(self) -> (usize, usize) {
        match self {
            Kind::Invalid => (0, 1),
            Kind::Bool | Kind::Int8 | Kind::Uint8 => (1, 1),
            Kind::Int16 | Kind::Uint16 => (2, 2),
            Kind::Int32 | Kind::Uint32 | Kind::Float32 => (4, 4),
            Kind::Complex64 => (8, 4),
            Kind::Complex128 => (16, 8),
            Kind::String | Kind::Interface => (2 * WORD, WORD),
            Kind::Slice => (3 * WORD, WORD),
            _ => (WORD, WORD),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// Struct field descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField {
    /// Field name; the type name for embedded fields
    pub name: String,
    /// Field type
    pub ty: TypeId,
    /// Raw struct tag
    pub tag: String,
    /// Whether the field is embedded
    pub embedded: bool,
}

impl StructField {
    /// Plain named field without a tag
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty,
            tag: String::new(),
            embedded: false,
        }
    }

    /// Set the struct tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Mark the field as embedded
    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }
}

/// Function signature. A variadic function's last parameter is a slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Parameter types
    pub params: Vec<TypeId>,
    /// Result types
    pub results: Vec<TypeId>,
    /// Whether the last parameter is variadic
    pub variadic: bool,
}

/// Interface method descriptor; `ty` is a function type without receiver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceMethod {
    /// Method name
    pub name: String,
    /// Method signature type
    pub ty: TypeId,
}

/// Underlying type structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRepr {
    /// Predeclared scalar
    Basic(Kind),
    /// `*T`
    Pointer(TypeId),
    /// `[]T`
    Slice(TypeId),
    /// `[N]T`
    Array { elem: TypeId, len: usize },
    /// `map[K]V`
    Map { key: TypeId, value: TypeId },
    /// `chan T`
    Chan(TypeId),
    /// `struct { ... }`
    Struct(Vec<StructField>),
    /// `func(...) ...`
    Func(Signature),
    /// `interface { ... }`
    Interface(Vec<InterfaceMethod>),
    /// Declared named type awaiting its definition
    Undefined,
}

impl TypeRepr {
    /// Kind of this structure
    pub fn kind(&self) -> Kind {
        match self {
            TypeRepr::Basic(kind) => *kind,
            TypeRepr::Pointer(_) => Kind::Pointer,
            TypeRepr::Slice(_) => Kind::Slice,
            TypeRepr::Array { .. } => Kind::Array,
            TypeRepr::Map { .. } => Kind::Map,
            TypeRepr::Chan(_) => Kind::Chan,
            TypeRepr::Struct(_) => Kind::Struct,
            TypeRepr::Func(_) => Kind::Func,
            TypeRepr::Interface(_) => Kind::Interface,
            TypeRepr::Undefined => Kind::Invalid,
        }
    }
}

/// Method declared on a named type.
///
/// `func_ty` takes the receiver as its first parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    /// Method name
    pub name: String,
    /// Signature including the receiver
    pub func_ty: TypeId,
    /// Code address of the method body
    pub addr: CodeAddr,
}

impl MethodDecl {
    /// Whether the method name is exported
    pub fn is_exported(&self) -> bool {
        self.name.chars().next().is_some_and(char::is_uppercase)
    }
}

/// Runtime type descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    /// Declared name; empty for unnamed types
    pub name: String,
    /// Import path of the declaring package; empty for predeclared types
    pub pkg_path: String,
    /// Underlying structure
    pub repr: TypeRepr,
    /// Declared methods, in declaration order
    pub methods: Vec<MethodDecl>,
}

impl Type {
    fn unnamed(repr: TypeRepr) -> Self {
        Self {
            name: String::new(),
            pkg_path: String::new(),
            repr,
            methods: Vec::new(),
        }
    }

    /// Kind of the underlying structure
    pub fn kind(&self) -> Kind {
        self.repr.kind()
    }

    /// Whether the type has a declared name
    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Last element of an import path.
pub(crate) fn package_name(pkg_path: &str) -> &str {
    pkg_path.rsplit('/').next().unwrap_or(pkg_path)
}

// ============================================================================
// TypeTable
// ============================================================================

/// Arena of runtime types.
#[derive(Debug, Clone)]
pub struct TypeTable {
    /// Storage for all types, indexed by TypeId
    types: Vec<Type>,

    /// Interned unnamed types
    interned: FxHashMap<TypeRepr, TypeId>,

    /// Named types by (package path, name)
    named: FxHashMap<(String, String), TypeId>,

    /// The predeclared `error` interface
    error: TypeId,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    /// Create a table holding the predeclared types
    pub fn new() -> Self {
        let mut table = TypeTable {
            types: Vec::new(),
            interned: FxHashMap::default(),
            named: FxHashMap::default(),
            error: TypeId(0),
        };

        for kind in BASIC_KINDS {
            let id = TypeId(table.types.len() as u32);
            table.types.push(Type {
                name: kind.as_str().to_string(),
                pkg_path: String::new(),
                repr: TypeRepr::Basic(kind),
                methods: Vec::new(),
            });
            table.interned.insert(TypeRepr::Basic(kind), id);
            table.named.insert((String::new(), kind.as_str().to_string()), id);
        }

        let error = table.declare("", "error");
        let string = table.basic(Kind::String);
        let error_fn = table.func(Vec::new(), vec![string], false);
        table.types[error.0 as usize].repr = TypeRepr::Interface(vec![InterfaceMethod {
            name: "Error".to_string(),
            ty: error_fn,
        }]);
        table.error = error;
        table
    }

    fn intern(&mut self, repr: TypeRepr) -> TypeId {
        if let Some(&id) = self.interned.get(&repr) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(Type::unnamed(repr.clone()));
        self.interned.insert(repr, id);
        id
    }

    /// Predeclared type of a basic kind; non-basic kinds map to `invalid`
    pub fn basic(&self, kind: Kind) -> TypeId {
        if kind.is_basic() {
            TypeId(kind as u32)
        } else {
            TypeId(Kind::Invalid as u32)
        }
    }

    /// The predeclared `error` interface
    pub fn error_type(&self) -> TypeId {
        self.error
    }

    /// `*elem`
    pub fn pointer_to(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeRepr::Pointer(elem))
    }

    /// `[]elem`
    pub fn slice_of(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeRepr::Slice(elem))
    }

    /// `[len]elem`
    pub fn array_of(&mut self, elem: TypeId, len: usize) -> TypeId {
        self.intern(TypeRepr::Array { elem, len })
    }

    /// `map[key]value`
    pub fn map_of(&mut self, key: TypeId, value: TypeId) -> TypeId {
        self.intern(TypeRepr::Map { key, value })
    }

    /// `chan elem`
    pub fn chan_of(&mut self, elem: TypeId) -> TypeId {
        self.intern(TypeRepr::Chan(elem))
    }

    /// Unnamed function type
    pub fn func(&mut self, params: Vec<TypeId>, results: Vec<TypeId>, variadic: bool) -> TypeId {
        self.intern(TypeRepr::Func(Signature {
            params,
            results,
            variadic,
        }))
    }

    /// Unnamed struct type
    pub fn struct_of(&mut self, fields: Vec<StructField>) -> TypeId {
        self.intern(TypeRepr::Struct(fields))
    }

    /// Unnamed interface type
    pub fn interface(&mut self, methods: Vec<InterfaceMethod>) -> TypeId {
        self.intern(TypeRepr::Interface(methods))
    }

    /// Declare the named type `pkg_path.name`, returning the existing id if
    /// it was declared before
    pub fn declare(&mut self, pkg_path: &str, name: &str) -> TypeId {
        let key = (pkg_path.to_string(), name.to_string());
        if let Some(&id) = self.named.get(&key) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(Type {
            name: name.to_string(),
            pkg_path: pkg_path.to_string(),
            repr: TypeRepr::Undefined,
            methods: Vec::new(),
        });
        self.named.insert(key, id);
        id
    }

    /// Give a declared named type its underlying structure
    pub fn define(&mut self, id: TypeId, repr: TypeRepr) -> Result<(), TypeError> {
        let described = self.describe(id);
        let ty = self
            .types
            .get_mut(id.0 as usize)
            .ok_or(TypeError::UnknownType { id: id.0 })?;
        if !ty.is_named() {
            return Err(TypeError::NotNamed { name: described });
        }
        if ty.repr != TypeRepr::Undefined {
            return Err(TypeError::AlreadyDefined { name: described });
        }
        ty.repr = repr;
        Ok(())
    }

    /// Declare and define a named type in one step
    pub fn named(&mut self, pkg_path: &str, name: &str, repr: TypeRepr) -> Result<TypeId, TypeError> {
        let id = self.declare(pkg_path, name);
        self.define(id, repr)?;
        Ok(id)
    }

    /// Attach a method to a named type
    pub fn add_method(
        &mut self,
        owner: TypeId,
        name: &str,
        func_ty: TypeId,
        addr: CodeAddr,
    ) -> Result<(), TypeError> {
        if self.kind(func_ty) != Kind::Func {
            return Err(TypeError::NotAFunction {
                owner: self.describe(owner),
                method: name.to_string(),
                found: self.describe(func_ty),
            });
        }
        let described = self.describe(owner);
        let ty = self
            .types
            .get_mut(owner.0 as usize)
            .ok_or(TypeError::UnknownType { id: owner.0 })?;
        if !ty.is_named() {
            return Err(TypeError::NotNamed { name: described });
        }
        ty.methods.push(MethodDecl {
            name: name.to_string(),
            func_ty,
            addr,
        });
        Ok(())
    }

    /// Named type by package path and name
    pub fn lookup_named(&self, pkg_path: &str, name: &str) -> Option<TypeId> {
        self.named
            .get(&(pkg_path.to_string(), name.to_string()))
            .copied()
    }

    /// Type by id
    pub fn get(&self, id: TypeId) -> Option<&Type> {
        self.types.get(id.0 as usize)
    }

    /// Kind of a type; `Invalid` for unknown ids
    pub fn kind(&self, id: TypeId) -> Kind {
        self.get(id).map_or(Kind::Invalid, Type::kind)
    }

    /// Number of types in the table
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the table is empty (never true: predeclared types exist)
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Whether `id` is the predeclared `error` interface
    pub fn is_error(&self, id: TypeId) -> bool {
        id == self.error
    }

    /// Whether `id` is `context.Context`
    pub fn is_context(&self, id: TypeId) -> bool {
        self.get(id)
            .is_some_and(|ty| ty.pkg_path == "context" && ty.name == "Context")
    }

    /// Size in bytes, with natural field alignment
    pub fn size(&self, id: TypeId) -> usize {
        self.layout(id, &mut Vec::new()).0
    }

    fn layout(&self, id: TypeId, visiting: &mut Vec<TypeId>) -> (usize, usize) {
        let Some(ty) = self.get(id) else {
            return (0, 1);
        };
        if visiting.contains(&id) {
            return (0, 1);
        }
        match &ty.repr {
            TypeRepr::Basic(kind) => kind.layout(),
            TypeRepr::Pointer(_) | TypeRepr::Map { .. } | TypeRepr::Chan(_) | TypeRepr::Func(_) => {
                (WORD, WORD)
            }
            TypeRepr::Slice(_) => Kind::Slice.layout(),
            TypeRepr::Interface(_) => Kind::Interface.layout(),
            TypeRepr::Array { elem, len } => {
                visiting.push(id);
                let (size, align) = self.layout(*elem, visiting);
                visiting.pop();
                (size * len, align)
            }
            TypeRepr::Struct(fields) => {
                visiting.push(id);
                let mut size = 0;
                let mut align = 1;
                for field in fields {
                    let (fsize, falign) = self.layout(field.ty, visiting);
                    size = round_up(size, falign) + fsize;
                    align = align.max(falign);
                }
                visiting.pop();
                (round_up(size, align), align)
            }
            TypeRepr::Undefined => (0, 1),
        }
    }

    /// Canonical type string: `*T`, `[]T`, `map[K]V`, `func(A) R`, `pkg.Name`
    pub fn describe(&self, id: TypeId) -> String {
        let mut out = String::new();
        self.write_type(&mut out, id);
        out
    }

    fn write_type(&self, out: &mut String, id: TypeId) {
        let Some(ty) = self.get(id) else {
            out.push_str("<invalid>");
            return;
        };
        if ty.is_named() {
            if !ty.pkg_path.is_empty() {
                out.push_str(package_name(&ty.pkg_path));
                out.push('.');
            }
            out.push_str(&ty.name);
            return;
        }

        match &ty.repr {
            TypeRepr::Basic(kind) => out.push_str(kind.as_str()),
            TypeRepr::Pointer(elem) => {
                out.push('*');
                self.write_type(out, *elem);
            }
            TypeRepr::Slice(elem) => {
                out.push_str("[]");
                self.write_type(out, *elem);
            }
            TypeRepr::Array { elem, len } => {
                out.push_str(&format!("[{len}]"));
                self.write_type(out, *elem);
            }
            TypeRepr::Map { key, value } => {
                out.push_str("map[");
                self.write_type(out, *key);
                out.push(']');
                self.write_type(out, *value);
            }
            TypeRepr::Chan(elem) => {
                out.push_str("chan ");
                self.write_type(out, *elem);
            }
            TypeRepr::Func(sig) => {
                out.push_str("func");
                self.write_signature(out, sig);
            }
            TypeRepr::Struct(fields) if fields.is_empty() => out.push_str("struct {}"),
            TypeRepr::Struct(fields) => {
                out.push_str("struct { ");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str("; ");
                    }
                    if !field.embedded {
                        out.push_str(&field.name);
                        out.push(' ');
                    }
                    self.write_type(out, field.ty);
                    if !field.tag.is_empty() {
                        out.push_str(&format!(" {:?}", field.tag));
                    }
                }
                out.push_str(" }");
            }
            TypeRepr::Interface(methods) if methods.is_empty() => out.push_str("interface {}"),
            TypeRepr::Interface(methods) => {
                out.push_str("interface { ");
                for (i, method) in methods.iter().enumerate() {
                    if i > 0 {
                        out.push_str("; ");
                    }
                    out.push_str(&method.name);
                    match self.get(method.ty).map(|t| &t.repr) {
                        Some(TypeRepr::Func(sig)) => self.write_signature(out, sig),
                        _ => out.push_str("()"),
                    }
                }
                out.push_str(" }");
            }
            TypeRepr::Undefined => out.push_str("<undefined>"),
        }
    }

    fn write_signature(&self, out: &mut String, sig: &Signature) {
        out.push('(');
        for (i, &param) in sig.params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let last = i + 1 == sig.params.len();
            match self.get(param).map(|t| &t.repr) {
                Some(TypeRepr::Slice(elem)) if last && sig.variadic => {
                    out.push_str("...");
                    self.write_type(out, *elem);
                }
                _ => self.write_type(out, param),
            }
        }
        out.push(')');

        match sig.results.as_slice() {
            [] => {}
            [single] => {
                out.push(' ');
                self.write_type(out, *single);
            }
            results => {
                out.push_str(" (");
                for (i, &result) in results.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_type(out, result);
                }
                out.push(')');
            }
        }
    }
}

fn round_up(n: usize, align: usize) -> usize {
    n.div_ceil(align.max(1)) * align.max(1)
}

// ============================================================================
// Values
// ============================================================================

static ZERO: Value = Value::Zero;

/// Live value accompanying a type during extraction.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value: nil or zero-initialised
    #[default]
    Zero,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    Uint(u64),
    /// Floating point
    Float(f64),
    /// String
    Str(String),
    /// Non-nil pointer
    Ptr(Box<Value>),
    /// Slice or array elements
    Seq(Vec<Value>),
    /// Map entries
    Map(Vec<(Value, Value)>),
    /// Struct fields in declaration order
    Struct(Vec<Value>),
    /// Function value
    Func(CodeAddr),
    /// Method expression; its signature includes the receiver
    Method(MethodValue),
}

/// Method expression value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodValue {
    /// Method name
    pub name: String,
    /// Package path of the receiver type
    pub pkg_path: String,
    /// Code address of the method body
    pub func: CodeAddr,
}

impl Value {
    /// Pointer to `inner`
    pub fn ptr(inner: Value) -> Self {
        Value::Ptr(Box::new(inner))
    }

    /// Pointee, or `Zero` for anything but a pointer
    pub fn elem(&self) -> &Value {
        match self {
            Value::Ptr(inner) => inner,
            _ => &ZERO,
        }
    }

    /// First sequence element, or `Zero`
    pub fn first_elem(&self) -> &Value {
        match self {
            Value::Seq(items) => items.first().unwrap_or(&ZERO),
            _ => &ZERO,
        }
    }

    /// An arbitrary map entry, or `(Zero, Zero)`
    pub fn first_entry(&self) -> (&Value, &Value) {
        match self {
            Value::Map(entries) => entries.first().map_or((&ZERO, &ZERO), |(k, v)| (k, v)),
            _ => (&ZERO, &ZERO),
        }
    }

    /// Struct field `i`, or `Zero`
    pub fn field(&self, i: usize) -> &Value {
        match self {
            Value::Struct(fields) => fields.get(i).unwrap_or(&ZERO),
            _ => &ZERO,
        }
    }

    /// Code address of a function or method value
    pub fn code_addr(&self) -> CodeAddr {
        match self {
            Value::Func(addr) => *addr,
            Value::Method(method) => method.func,
            _ => CodeAddr::NONE,
        }
    }
}
