//! Shape graph builder
//!
//! The [`Extractor`] walks a (type, value) pair depth-first into an arena of
//! shape nodes. Each visited key gets a `ForwardRef` placeholder before its
//! children are expanded, so recursive references land on the placeholder
//! instead of recursing forever. A second pass replaces every reachable
//! placeholder with the node it stands for, adding up pointer levels on the
//! way.
//!
//! ## Deduplication
//!
//! | Key                      | Used for                                 |
//! |--------------------------|------------------------------------------|
//! | `(type, CodeAddr::NONE)` | every non-function type                  |
//! | `(type, code address)`   | function values                          |
//!
//! A function value whose type was already extracted through another
//! function value reuses the earlier node's structure and only re-derives
//! its name (and, with `revisit_arglist`, its argument names).
//!
//! The seen table lives as long as the extractor: repeated `extract` calls
//! share nodes.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use reflect_shape_metadata::{CodeAddr, Lookup, QualifiedName, SymbolResolver};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ShapeError, TypeError};
use crate::fixup;
use crate::rtype::{package_name, Kind, MethodValue, Signature, TypeId, TypeRepr, TypeTable, Value};
use crate::shape::{Field, Function, Info, Method, NodeId, Param, Shape, ShapeBody, ShapeKey};

/// Named shapes of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Last element of the import path
    pub name: String,
    /// Import path
    pub path: String,
    shapes: BTreeMap<String, (NodeId, bool)>,
}

impl Package {
    fn new(path: &str) -> Self {
        Self {
            name: package_name(path).to_string(),
            path: path.to_string(),
            shapes: BTreeMap::new(),
        }
    }

    /// Sorted names, methods excluded
    pub fn names(&self) -> Vec<&str> {
        self.shapes
            .iter()
            .filter(|(_, (_, is_method))| !is_method)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Sorted names, methods included
    pub fn names_with_methods(&self) -> Vec<&str> {
        self.shapes.keys().map(String::as_str).collect()
    }

    /// Shape registered under `name`
    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.shapes.get(name).map(|(id, _)| *id)
    }
}

/// Name derived for a function node.
struct FuncNaming {
    name: String,
    package: String,
    is_method: bool,
    /// Whether the signature takes the receiver as its first parameter
    receiver_param: bool,
}

/// Shape graph builder session.
pub struct Extractor {
    types: Arc<TypeTable>,
    symbols: Arc<dyn SymbolResolver>,
    lookup: Option<Arc<Lookup>>,
    config: Config,

    /// Node arena
    nodes: Vec<Shape>,

    /// Key → canonical node
    seen: FxHashMap<ShapeKey, NodeId>,

    /// First node built for each function type from a live function value
    functions: FxHashMap<TypeId, NodeId>,

    /// (base, extra pointer level) → leveled copy
    leveled: FxHashMap<(NodeId, u32), NodeId>,

    /// Forward reference → resolved node
    resolved: FxHashMap<NodeId, NodeId>,
    resolving: FxHashSet<NodeId>,

    packages: BTreeMap<String, Package>,
    method_sets: FxHashMap<TypeId, Vec<(String, NodeId)>>,

    /// Counter for anonymous function names
    counter: u32,
}

impl Extractor {
    /// Create an extractor without a metadata lookup
    pub fn new(types: Arc<TypeTable>, symbols: Arc<dyn SymbolResolver>, config: Config) -> Self {
        Self {
            types,
            symbols,
            lookup: None,
            config,
            nodes: Vec::new(),
            seen: FxHashMap::default(),
            functions: FxHashMap::default(),
            leveled: FxHashMap::default(),
            resolved: FxHashMap::default(),
            resolving: FxHashSet::default(),
            packages: BTreeMap::new(),
            method_sets: FxHashMap::default(),
            counter: 0,
        }
    }

    /// Use `lookup` for argument names and docs
    pub fn with_lookup(mut self, lookup: Arc<Lookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Use a metadata lookup built from the configuration and the
    /// extractor's own symbol resolver
    pub fn with_source_lookup(self) -> Self {
        let lookup = Lookup::new(Arc::clone(&self.symbols), self.config.lookup_options());
        self.with_lookup(Arc::new(lookup))
    }

    /// Runtime type table
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metadata lookup, if configured
    pub fn lookup(&self) -> Option<&Arc<Lookup>> {
        self.lookup.as_ref()
    }

    // ========================================================================
    // Extraction
    // ========================================================================

    /// Extract the shape of `value`, whose type is `ty`.
    ///
    /// Leading pointers are stripped; the returned node's pointer level
    /// counts them. On error nothing created by this call is kept.
    pub fn extract(&mut self, ty: TypeId, value: &Value) -> Result<NodeId, ShapeError> {
        let types = Arc::clone(&self.types);
        let mut ty = ty;
        let mut value = value;
        let mut lv = 0;
        while let Some(TypeRepr::Pointer(elem)) = types.get(ty).map(|t| &t.repr) {
            if lv as usize > self.config.max_depth {
                return Err(ShapeError::invariant(format!(
                    "pointer chain deeper than {} at {}",
                    self.config.max_depth,
                    types.describe(ty)
                )));
            }
            ty = *elem;
            value = value.elem();
            lv += 1;
        }

        let start = self.nodes.len();
        let result = self.walk(ty, value, 0).and_then(|root| self.complete(root));
        match result {
            Ok(root) => {
                self.register_packages(start);
                Ok(self.with_level(root, lv))
            }
            Err(err) => {
                warn!(ty = %types.describe(ty), error = %err, "extraction failed");
                self.rollback(start);
                Err(err)
            }
        }
    }

    fn push(&mut self, shape: Shape) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(shape);
        id
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Shape {
        &mut self.nodes[id.0 as usize]
    }

    fn walk(&mut self, ty: TypeId, value: &Value, depth: usize) -> Result<NodeId, ShapeError> {
        if depth > self.config.max_depth {
            return Err(ShapeError::invariant(format!(
                "recursion depth {} exceeded at {}",
                self.config.max_depth,
                self.types.describe(ty)
            )));
        }

        let types = Arc::clone(&self.types);
        let kind = types.kind(ty);
        let addr = match kind {
            Kind::Func => value.code_addr(),
            _ => CodeAddr::NONE,
        };
        let key = ShapeKey { ty, addr };
        if let Some(&id) = self.seen.get(&key) {
            return Ok(id);
        }
        if addr.is_some() {
            if let Some(&cached) = self.functions.get(&ty) {
                return self.rebind_function(cached, key, value);
            }
        }

        let (name, package) = types
            .get(ty)
            .map(|t| (t.name.clone(), t.pkg_path.clone()))
            .unwrap_or_default();
        let number = self.nodes.len() as u32;
        let id = self.push(Shape {
            info: Info::new(name, package, kind, key, number),
            body: ShapeBody::ForwardRef { target: None },
        });
        self.seen.insert(key, id);

        let body = match types.get(ty).map(|t| &t.repr) {
            Some(TypeRepr::Pointer(elem)) => {
                let target = self.walk(*elem, value.elem(), depth + 1)?;
                self.node_mut(id).info.lv += 1;
                ShapeBody::ForwardRef {
                    target: Some(target),
                }
            }
            Some(TypeRepr::Slice(elem)) | Some(TypeRepr::Array { elem, .. }) => {
                self.node_mut(id).info.name = kind.as_str().to_string();
                let arg = self.walk(*elem, value.first_elem(), depth + 1)?;
                ShapeBody::Container { args: vec![arg] }
            }
            Some(TypeRepr::Map { key, value: elem }) => {
                self.node_mut(id).info.name = kind.as_str().to_string();
                let (k, v) = value.first_entry();
                let key = self.walk(*key, k, depth + 1)?;
                let elem = self.walk(*elem, v, depth + 1)?;
                ShapeBody::Container {
                    args: vec![key, elem],
                }
            }
            Some(TypeRepr::Chan(_)) => ShapeBody::Unknown,
            Some(TypeRepr::Struct(fields)) => {
                let mut out = Vec::with_capacity(fields.len());
                for (i, field) in fields.iter().enumerate() {
                    let shape = self.walk(field.ty, value.field(i), depth + 1)?;
                    out.push(Field {
                        name: field.name.clone(),
                        shape,
                        tag: field.tag.clone(),
                        embedded: field.embedded,
                    });
                }
                ShapeBody::Struct { fields: out }
            }
            Some(TypeRepr::Func(sig)) => self.function_body(id, sig, value, depth)?,
            Some(TypeRepr::Interface(methods)) => {
                let mut out = Vec::with_capacity(methods.len());
                for method in methods {
                    let shape = self.walk(method.ty, &Value::Zero, depth + 1)?;
                    out.push(Method {
                        name: method.name.clone(),
                        shape,
                    });
                }
                ShapeBody::Interface { methods: out }
            }
            Some(TypeRepr::Basic(Kind::Invalid)) | Some(TypeRepr::Undefined) | None => {
                warn!(ty = %types.describe(ty), "type is not defined, not expanded");
                ShapeBody::Unknown
            }
            Some(TypeRepr::Basic(_)) => ShapeBody::Primitive,
        };

        self.save(id, body);
        Ok(id)
    }

    /// Store the finished body, unless the node was already finalized.
    fn save(&mut self, id: NodeId, body: ShapeBody) {
        let node = self.node_mut(id);
        if matches!(node.body, ShapeBody::ForwardRef { target: None }) {
            node.body = body;
        }
    }

    fn function_body(
        &mut self,
        id: NodeId,
        sig: &Signature,
        value: &Value,
        depth: usize,
    ) -> Result<ShapeBody, ShapeError> {
        let ty = self.nodes[id.0 as usize].info.ty;
        let naming = self.function_name(ty, value);

        let mut params = Vec::with_capacity(sig.params.len());
        for (i, &param) in sig.params.iter().enumerate() {
            let shape = self.walk(param, &Value::Zero, depth + 1)?;
            // function-typed parameters are named after their shape
            let name = match self.types.kind(param) {
                Kind::Func => Some(&self.nodes[shape.0 as usize].info.name)
                    .filter(|name| !name.is_empty())
                    .cloned()
                    .unwrap_or_else(|| fixup::param_placeholder(i)),
                _ => fixup::param_placeholder(i),
            };
            params.push(Param {
                name,
                shape,
                doc: String::new(),
            });
        }
        let mut returns = Vec::with_capacity(sig.results.len());
        for (i, &result) in sig.results.iter().enumerate() {
            let shape = self.walk(result, &Value::Zero, depth + 1)?;
            returns.push(Param {
                name: fixup::return_placeholder(i),
                shape,
                doc: String::new(),
            });
        }

        let mut func = Function {
            params,
            returns,
            is_variadic: sig.variadic,
            doc: String::new(),
            recv: None,
        };
        let addr = value.code_addr();
        self.name_function(&mut func, sig, addr, &naming);

        let name = self.anonymous_name(naming.name);
        let info = &mut self.node_mut(id).info;
        info.name = name;
        info.package = naming.package;
        info.is_method = naming.is_method;

        if addr.is_some() {
            self.functions.entry(ty).or_insert(id);
        }
        Ok(ShapeBody::Function(func))
    }

    /// Name and package of a function value.
    fn function_name(&self, ty: TypeId, value: &Value) -> FuncNaming {
        let declared = || FuncNaming {
            name: self.types.get(ty).map(|t| t.name.clone()).unwrap_or_default(),
            package: self.types.get(ty).map(|t| t.pkg_path.clone()).unwrap_or_default(),
            is_method: false,
            receiver_param: false,
        };

        if let Value::Method(MethodValue { name, pkg_path, .. }) = value {
            return FuncNaming {
                name: name.clone(),
                package: pkg_path.clone(),
                is_method: true,
                receiver_param: true,
            };
        }
        let addr = value.code_addr();
        if !addr.is_some() {
            return declared();
        }
        match self
            .symbols
            .resolve(addr)
            .and_then(|symbol| QualifiedName::parse(&symbol.name))
        {
            // bound method values carry their receiver outside the signature
            Some(qname) => FuncNaming {
                name: qname.local_name(),
                is_method: qname.bound,
                package: qname.package,
                receiver_param: false,
            },
            None => {
                debug!(addr = %addr, "no symbol for function value");
                declared()
            }
        }
    }

    fn anonymous_name(&mut self, name: String) -> String {
        if !name.is_empty() {
            return name;
        }
        let name = format!("func{}", self.counter);
        self.counter += 1;
        name
    }

    fn name_function(&self, func: &mut Function, sig: &Signature, addr: CodeAddr, naming: &FuncNaming) {
        if let Some(lookup) = &self.lookup {
            if addr.is_some() {
                let fullname = format!("{}.{}", naming.package, naming.name);
                fixup::apply(lookup, &self.config, addr, &fullname, naming.receiver_param, func);
            }
        }
        fixup::fill_names(&self.types, &self.config, sig, func);
    }

    /// Reuse an extracted function type for another function value.
    fn rebind_function(
        &mut self,
        cached: NodeId,
        key: ShapeKey,
        value: &Value,
    ) -> Result<NodeId, ShapeError> {
        let types = Arc::clone(&self.types);
        let Some(TypeRepr::Func(sig)) = types.get(key.ty).map(|t| &t.repr) else {
            return Err(ShapeError::invariant(format!(
                "function node {cached} has a non-function type"
            )));
        };

        let mut shape = self.nodes[cached.0 as usize].clone();
        let naming = self.function_name(key.ty, value);
        if let ShapeBody::Function(func) = &mut shape.body {
            func.doc.clear();
            func.recv = None;
            if self.config.revisit_arglist {
                self.name_function(func, sig, key.addr, &naming);
            } else if let Some(lookup) = &self.lookup {
                let fullname = format!("{}.{}", naming.package, naming.name);
                fixup::attach_doc(lookup, &self.config, key.addr, &fullname, func);
            }
        }

        shape.info.name = self.anonymous_name(naming.name);
        shape.info.package = naming.package;
        shape.info.is_method = naming.is_method;
        shape.info.key = key;
        shape.info.number = self.nodes.len() as u32;
        shape.info.reset_identity();

        let id = self.push(shape);
        self.seen.insert(key, id);
        debug!(node = %id, from = %cached, "function type revisited");
        Ok(id)
    }

    // ========================================================================
    // Forward reference resolution
    // ========================================================================

    /// Copy of `base` with `lv` more pointer indirections
    fn with_level(&mut self, base: NodeId, lv: u32) -> NodeId {
        if lv == 0 {
            return base;
        }
        if let Some(&id) = self.leveled.get(&(base, lv)) {
            return id;
        }
        let mut shape = self.nodes[base.0 as usize].clone();
        shape.info.lv += lv;
        let id = self.push(shape);
        self.leveled.insert((base, lv), id);
        id
    }

    /// Follow a forward reference to the node it stands for
    fn resolve(&mut self, id: NodeId) -> Result<NodeId, ShapeError> {
        if let Some(&resolved) = self.resolved.get(&id) {
            return Ok(resolved);
        }
        let node = self.shape(id)?;
        let ShapeBody::ForwardRef { target } = node.body else {
            return Ok(id);
        };
        let lv = node.info.lv;
        let Some(target) = target else {
            return Err(ShapeError::invariant(format!(
                "forward reference {id} was never filled"
            )));
        };

        if !self.resolving.insert(id) {
            warn!(node = %id, "pointer cycle without a base type, not expanded");
            self.node_mut(id).body = ShapeBody::Unknown;
            return Ok(id);
        }
        let base = self.resolve(target);
        self.resolving.remove(&id);

        let resolved = self.with_level(base?, lv);
        self.resolved.insert(id, resolved);
        Ok(resolved)
    }

    /// Replace every forward reference reachable from `root`
    fn complete(&mut self, root: NodeId) -> Result<NodeId, ShapeError> {
        let root = self.resolve(root)?;
        self.complete_from(root)?;

        let pending: Vec<(ShapeKey, NodeId)> = self
            .seen
            .iter()
            .filter(|(_, id)| self.nodes[id.0 as usize].is_forward_ref())
            .map(|(key, id)| (*key, *id))
            .collect();
        for (key, id) in pending {
            let resolved = self.resolve(id)?;
            self.seen.insert(key, resolved);
        }

        self.complete_levels()?;
        Ok(root)
    }

    /// Refresh pointer copies cloned from a base that was not completed yet
    fn complete_levels(&mut self) -> Result<(), ShapeError> {
        loop {
            let stale: Vec<(NodeId, NodeId)> = self
                .leveled
                .iter()
                .filter(|(_, id)| !self.nodes[id.0 as usize].info.completed)
                .map(|((base, _), id)| (*base, *id))
                .collect();
            if stale.is_empty() {
                return Ok(());
            }
            for (base, copy) in stale {
                self.complete_from(base)?;
                let body = self.nodes[base.0 as usize].body.clone();
                let node = self.node_mut(copy);
                node.body = body;
                node.info.completed = true;
            }
        }
    }

    fn complete_from(&mut self, root: NodeId) -> Result<(), ShapeError> {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if self.shape(id)?.info.completed {
                continue;
            }
            let children = self.nodes[id.0 as usize].body.children();
            let mut resolved = Vec::with_capacity(children.len());
            for child in children {
                resolved.push(self.resolve(child)?);
            }

            let node = self.node_mut(id);
            for (slot, &child) in node.body.children_mut().into_iter().zip(&resolved) {
                *slot = child;
            }
            node.info.completed = true;
            stack.extend(resolved);
        }
        Ok(())
    }

    /// Forget every node created at or after `start`
    fn rollback(&mut self, start: usize) {
        let keep = |id: NodeId| (id.0 as usize) < start;
        self.nodes.truncate(start);
        self.seen.retain(|_, id| keep(*id));
        self.functions.retain(|_, id| keep(*id));
        self.leveled.retain(|(base, _), id| keep(*base) && keep(*id));
        self.resolved.retain(|from, to| keep(*from) && keep(*to));
        self.resolving.clear();
        self.method_sets
            .retain(|_, methods| methods.iter().all(|(_, id)| keep(*id)));
    }

    fn register_packages(&mut self, start: usize) {
        for index in start..self.nodes.len() {
            let shape = &self.nodes[index];
            if shape.info.lv > 0
                || shape.info.name.is_empty()
                || shape.info.package.is_empty()
                || matches!(
                    shape.body,
                    ShapeBody::ForwardRef { .. } | ShapeBody::Container { .. }
                )
            {
                continue;
            }
            let name = self.scope_name(shape);
            let (path, is_method) = (shape.info.package.clone(), shape.info.is_method);
            self.packages
                .entry(path.clone())
                .or_insert_with(|| Package::new(&path))
                .shapes
                .insert(name, (NodeId(index as u32), is_method));
        }
    }

    /// Scope name of a shape: methods extracted from method values are
    /// qualified by their receiver type
    fn scope_name(&self, shape: &Shape) -> String {
        if shape.info.is_method && !shape.info.name.contains('.') {
            let recv = shape
                .function()
                .and_then(|func| func.params.first())
                .map(|param| &self.nodes[param.shape.0 as usize].info.name)
                .filter(|name| !name.is_empty());
            if let Some(recv) = recv {
                return format!("{recv}.{}", shape.info.name);
            }
        }
        shape.info.name.clone()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Node by id
    pub fn shape(&self, id: NodeId) -> Result<&Shape, ShapeError> {
        self.nodes
            .get(id.0 as usize)
            .ok_or(ShapeError::UnknownNode { node: id.0 })
    }

    /// Memoized identity of a node
    pub fn identity(&self, id: NodeId) -> Result<&str, ShapeError> {
        Ok(self.shape(id)?.info.identity(&self.types))
    }

    /// Whether two nodes share their (type, code address) key
    pub fn equal(&self, a: NodeId, b: NodeId) -> Result<bool, ShapeError> {
        Ok(self.shape(a)?.info.key == self.shape(b)?.info.key)
    }

    /// The seen table
    pub fn seen(&self) -> impl Iterator<Item = (ShapeKey, NodeId)> + '_ {
        self.seen.iter().map(|(key, id)| (*key, *id))
    }

    /// Number of nodes in the arena
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing was extracted yet
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Packages seen so far, sorted by path
    pub fn packages(&self) -> impl Iterator<Item = &Package> + '_ {
        self.packages.values()
    }

    /// Package by import path
    pub fn package(&self, path: &str) -> Option<&Package> {
        self.packages.get(path)
    }

    /// Method set of a named type, extracted from method values.
    ///
    /// Unexported methods are skipped unless `include_unexported` is set.
    /// The result is cached per type.
    pub fn methods(&mut self, id: NodeId) -> Result<Vec<(String, NodeId)>, ShapeError> {
        let ty = self.shape(id)?.info.ty;
        if let Some(cached) = self.method_sets.get(&ty) {
            return Ok(cached.clone());
        }

        let types = Arc::clone(&self.types);
        let mut out = Vec::new();
        if let Some(rtype) = types.get(ty) {
            for method in &rtype.methods {
                if !method.is_exported() && !self.config.include_unexported {
                    continue;
                }
                let value = Value::Method(MethodValue {
                    name: method.name.clone(),
                    pkg_path: rtype.pkg_path.clone(),
                    func: method.addr,
                });
                let shape = self.extract(method.func_ty, &value)?;
                out.push((method.name.clone(), shape));
            }
        }
        self.method_sets.insert(ty, out.clone());
        Ok(out)
    }

    /// Printable form of a node: `*pkg.Name`, `slice[int]`, `pkg.F(A) (R)`
    pub fn display(&self, id: NodeId) -> Result<ShapeDisplay<'_>, ShapeError> {
        self.shape(id)?;
        Ok(ShapeDisplay {
            extractor: self,
            id,
        })
    }

    // ========================================================================
    // Reset
    // ========================================================================

    /// Overwrite the name of a node and of its pointer copies
    pub fn reset_name(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), ShapeError> {
        self.shape(id)?;
        let name = name.into();
        for copy in self.with_copies(id) {
            self.node_mut(copy).info.name = name.clone();
        }
        Ok(())
    }

    /// Overwrite the package path of a node and of its pointer copies
    pub fn reset_package(&mut self, id: NodeId, package: impl Into<String>) -> Result<(), ShapeError> {
        self.shape(id)?;
        let package = package.into();
        for copy in self.with_copies(id) {
            self.node_mut(copy).info.package = package.clone();
        }
        Ok(())
    }

    /// `id` followed by every pointer copy made from it
    fn with_copies(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        let mut i = 0;
        while i < out.len() {
            let base = out[i];
            out.extend(
                self.leveled
                    .iter()
                    .filter(|((from, _), _)| *from == base)
                    .map(|(_, copy)| *copy),
            );
            i += 1;
        }
        out
    }

    /// Overwrite a node's type and drop its memoized identity
    pub fn reset_type(&mut self, id: NodeId, ty: TypeId) -> Result<(), ShapeError> {
        self.shape(id)?;
        if self.types.get(ty).is_none() {
            return Err(TypeError::UnknownType { id: ty.0 }.into());
        }
        let info = &mut self.node_mut(id).info;
        info.ty = ty;
        info.key.ty = ty;
        info.reset_identity();
        Ok(())
    }

    fn write_shape(&self, out: &mut fmt::Formatter<'_>, id: NodeId, visiting: &mut Vec<NodeId>) -> fmt::Result {
        let Some(shape) = self.nodes.get(id.0 as usize) else {
            return out.write_str("<invalid>");
        };
        for _ in 0..shape.info.lv {
            out.write_char('*')?;
        }
        let name = if shape.info.name.is_empty() {
            shape.info.kind.as_str().to_string()
        } else {
            shape.info.full_name()
        };
        out.write_str(&name)?;

        match &shape.body {
            ShapeBody::Container { args } => {
                out.write_char('[')?;
                self.write_list(out, args.iter().copied(), visiting)?;
                out.write_char(']')
            }
            ShapeBody::Function(func) if !visiting.contains(&id) => {
                visiting.push(id);
                out.write_char('(')?;
                self.write_list(out, func.params.iter().map(|p| p.shape), visiting)?;
                out.write_str(") (")?;
                self.write_list(out, func.returns.iter().map(|r| r.shape), visiting)?;
                visiting.pop();
                out.write_char(')')
            }
            _ => Ok(()),
        }
    }

    fn write_list(
        &self,
        out: &mut fmt::Formatter<'_>,
        ids: impl Iterator<Item = NodeId>,
        visiting: &mut Vec<NodeId>,
    ) -> fmt::Result {
        for (i, id) in ids.enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            self.write_shape(out, id, visiting)?;
        }
        Ok(())
    }
}

/// Display adapter returned by [`Extractor::display`].
pub struct ShapeDisplay<'a> {
    extractor: &'a Extractor,
    id: NodeId,
}

impl fmt::Display for ShapeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.extractor.write_shape(f, self.id, &mut Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtype::StructField;
    use reflect_shape_metadata::{Symbol, SymbolTable};

    const APP: &str = "example.com/app";

    fn extractor(types: TypeTable, symbols: SymbolTable) -> Extractor {
        Extractor::new(Arc::new(types), Arc::new(symbols), Config::default())
    }

    fn person(types: &mut TypeTable) -> TypeId {
        let person = types.declare(APP, "Person");
        let string = types.basic(Kind::String);
        let ptr = types.pointer_to(person);
        types
            .define(
                person,
                TypeRepr::Struct(vec![
                    StructField::new("Name", string),
                    StructField::new("Father", ptr),
                ]),
            )
            .unwrap();
        person
    }

    fn assert_no_forward_refs(e: &Extractor, root: NodeId) {
        let mut stack = vec![root];
        let mut visited = FxHashSet::default();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let shape = e.shape(id).unwrap();
            assert!(!shape.is_forward_ref(), "forward ref reachable at {id}");
            assert!(shape.info.completed);
            stack.extend(shape.body.children());
        }
    }

    #[test]
    fn test_primitive_and_dedup() {
        let types = TypeTable::new();
        let int = types.basic(Kind::Int);
        let mut e = extractor(types, SymbolTable::new());

        let a = e.extract(int, &Value::Int(1)).unwrap();
        let b = e.extract(int, &Value::Int(2)).unwrap();
        assert_eq!(a, b);
        assert_eq!(e.shape(a).unwrap().body, ShapeBody::Primitive);
        assert_eq!(e.identity(a).unwrap(), "int:int@8");
        assert_eq!(e.display(a).unwrap().to_string(), "int");
    }

    #[test]
    fn test_recursive_struct() {
        let mut types = TypeTable::new();
        let person = person(&mut types);
        let mut e = extractor(types, SymbolTable::new());

        let root = e.extract(person, &Value::Zero).unwrap();
        assert_no_forward_refs(&e, root);

        let fields = e.shape(root).unwrap().fields().unwrap().to_vec();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].name, "Father");
        let father = e.shape(fields[1].shape).unwrap();
        assert_eq!(father.info.lv, 1);
        assert!(father.fields().is_some());
        assert_eq!(
            e.identity(fields[1].shape).unwrap(),
            e.identity(root).unwrap()
        );
        assert!(e.equal(root, fields[1].shape).unwrap());
        assert_eq!(e.display(fields[1].shape).unwrap().to_string(), "*example.com/app.Person");
    }

    #[test]
    fn test_pointer_levels() {
        let mut types = TypeTable::new();
        let person = person(&mut types);
        let p1 = types.pointer_to(person);
        let p2 = types.pointer_to(p1);
        let mut e = extractor(types, SymbolTable::new());

        let v0 = e.extract(person, &Value::Zero).unwrap();
        let v1 = e.extract(p1, &Value::ptr(Value::Zero)).unwrap();
        let v2 = e.extract(p2, &Value::Zero).unwrap();

        assert_eq!(e.shape(v0).unwrap().lv(), 0);
        assert_eq!(e.shape(v1).unwrap().lv(), 1);
        assert_eq!(e.shape(v2).unwrap().lv(), 2);
        let id0 = e.identity(v0).unwrap().to_string();
        assert_eq!(e.identity(v1).unwrap(), id0);
        assert_eq!(e.identity(v2).unwrap(), id0);
    }

    #[test]
    fn test_deep_pointer_field() {
        let mut types = TypeTable::new();
        let node = types.declare(APP, "Node");
        let string = types.basic(Kind::String);
        let mut ptr = types.pointer_to(node);
        for _ in 0..7 {
            ptr = types.pointer_to(ptr);
        }
        let sptr = types.pointer_to(string);
        types
            .define(
                node,
                TypeRepr::Struct(vec![
                    StructField::new("Label", sptr),
                    StructField::new("Next", ptr),
                ]),
            )
            .unwrap();
        let mut e = extractor(types, SymbolTable::new());

        let root = e.extract(node, &Value::Zero).unwrap();
        assert_no_forward_refs(&e, root);
        let fields = e.shape(root).unwrap().fields().unwrap().to_vec();
        assert_eq!(e.display(fields[0].shape).unwrap().to_string(), "*string");
        assert_eq!(
            e.display(fields[1].shape).unwrap().to_string(),
            "********example.com/app.Node"
        );

        // seen entries of pointer types point at resolved nodes
        for (_, id) in e.seen() {
            assert!(!e.shape(id).unwrap().is_forward_ref());
        }
    }

    #[test]
    fn test_containers() {
        let mut types = TypeTable::new();
        let int = types.basic(Kind::Int);
        let string = types.basic(Kind::String);
        let ints = types.slice_of(int);
        let map = types.map_of(string, int);
        let ptr = types.pointer_to(int);
        let ptr_ptr = types.pointer_to(ptr);
        let map_of_ptr = types.map_of(string, ptr_ptr);
        let ch = types.chan_of(int);
        let mut e = extractor(types, SymbolTable::new());

        let s = e.extract(ints, &Value::Seq(vec![Value::Int(1)])).unwrap();
        assert_eq!(e.display(s).unwrap().to_string(), "slice[int]");
        let m = e.extract(map, &Value::Zero).unwrap();
        assert_eq!(e.display(m).unwrap().to_string(), "map[string, int]");
        let mp = e.extract(map_of_ptr, &Value::Zero).unwrap();
        assert_eq!(e.display(mp).unwrap().to_string(), "map[string, **int]");
        let c = e.extract(ch, &Value::Zero).unwrap();
        assert_eq!(e.shape(c).unwrap().body, ShapeBody::Unknown);
    }

    #[test]
    fn test_closures_distinct_by_address() {
        let mut types = TypeTable::new();
        let int = types.basic(Kind::Int);
        let sig = types.func(vec![int, int], vec![int], false);
        let mut symbols = SymbolTable::new();
        symbols.insert(CodeAddr(1), Symbol::new(format!("{APP}.TestFunction.func1"), "app.go", 10));
        symbols.insert(CodeAddr(2), Symbol::new(format!("{APP}.TestFunction.func2"), "app.go", 11));
        let mut e = extractor(types, symbols);

        let f = e.extract(sig, &Value::Func(CodeAddr(1))).unwrap();
        let g = e.extract(sig, &Value::Func(CodeAddr(2))).unwrap();
        let f2 = e.extract(sig, &Value::Func(CodeAddr(1))).unwrap();

        assert!(!e.equal(f, g).unwrap());
        assert_ne!(e.identity(f).unwrap(), e.identity(g).unwrap());
        assert!(e.equal(f, f2).unwrap());
        assert_eq!(e.identity(f).unwrap(), e.identity(f2).unwrap());
        assert_eq!(
            e.display(f).unwrap().to_string(),
            "example.com/app.TestFunction.func1(int, int) (int)"
        );
        assert_eq!(
            e.shape(g).unwrap().function().unwrap().param_names(),
            vec!["args0", "args1"]
        );
    }

    #[test]
    fn test_anonymous_function_names() {
        let mut types = TypeTable::new();
        let sig = types.func(vec![], vec![], false);
        let mut e = extractor(types, SymbolTable::new());

        let a = e.extract(sig, &Value::Func(CodeAddr(5))).unwrap();
        let b = e.extract(sig, &Value::Func(CodeAddr(6))).unwrap();
        assert_eq!(e.shape(a).unwrap().name(), "func0");
        assert_eq!(e.shape(b).unwrap().name(), "func1");
        assert_eq!(e.display(a).unwrap().to_string(), "func0() ()");
    }

    #[test]
    fn test_depth_guard_rolls_back() {
        let mut types = TypeTable::new();
        let int = types.basic(Kind::Int);
        let mut ty = int;
        for _ in 0..10 {
            ty = types.slice_of(ty);
        }
        let config = Config {
            max_depth: 4,
            ..Config::default()
        };
        let mut e = Extractor::new(Arc::new(types), Arc::new(SymbolTable::new()), config);

        let err = e.extract(ty, &Value::Zero).unwrap_err();
        assert!(matches!(err, ShapeError::InternalInvariantViolation { .. }));
        assert!(e.is_empty());
        assert_eq!(e.seen().count(), 0);

        // the extractor stays usable
        assert!(e.extract(int, &Value::Zero).is_ok());
    }

    #[test]
    fn test_pointer_cycle_degrades() {
        let mut types = TypeTable::new();
        let p = types.declare(APP, "P");
        types.define(p, TypeRepr::Pointer(p)).unwrap();
        let holder = types
            .named(APP, "Holder", TypeRepr::Struct(vec![StructField::new("P", p)]))
            .unwrap();
        let mut e = extractor(types, SymbolTable::new());

        let root = e.extract(holder, &Value::Zero).unwrap();
        assert_no_forward_refs(&e, root);

        // a bare self-pointer never reaches a base type
        assert!(matches!(
            e.extract(p, &Value::Zero),
            Err(ShapeError::InternalInvariantViolation { .. })
        ));
    }

    #[test]
    fn test_interface_methods() {
        let mut types = TypeTable::new();
        let string = types.basic(Kind::String);
        let greet = types.func(vec![string], vec![string], false);
        let greeter = types
            .named(
                APP,
                "Greeter",
                TypeRepr::Interface(vec![crate::rtype::InterfaceMethod {
                    name: "Greet".into(),
                    ty: greet,
                }]),
            )
            .unwrap();
        let mut e = extractor(types, SymbolTable::new());

        let root = e.extract(greeter, &Value::Zero).unwrap();
        let methods = e.shape(root).unwrap().interface_methods().unwrap().to_vec();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name, "Greet");
        assert_eq!(e.shape(methods[0].shape).unwrap().kind(), Kind::Func);
    }

    #[test]
    fn test_packages_and_reset() {
        let mut types = TypeTable::new();
        let person = person(&mut types);
        let int = types.basic(Kind::Int);
        let mut e = extractor(types, SymbolTable::new());

        let root = e.extract(person, &Value::Zero).unwrap();
        let pkg = e.package(APP).unwrap();
        assert_eq!(pkg.name, "app");
        assert_eq!(pkg.names(), vec!["Person"]);
        assert_eq!(pkg.get("Person"), Some(root));

        let before = e.identity(root).unwrap().to_string();
        e.reset_name(root, "Human").unwrap();
        assert_eq!(e.identity(root).unwrap(), before);
        e.reset_package(root, "example.com/other").unwrap();
        e.reset_type(root, int).unwrap();
        assert_eq!(e.identity(root).unwrap(), "example.com/other.Human:int@8");

        assert!(matches!(
            e.reset_name(NodeId(999), "x"),
            Err(ShapeError::UnknownNode { node: 999 })
        ));
    }

    fn double_pointer_node(types: &mut TypeTable) -> TypeId {
        let node = types.declare(APP, "Node");
        let ptr = types.pointer_to(node);
        let ptr_ptr = types.pointer_to(ptr);
        types
            .define(node, TypeRepr::Struct(vec![StructField::new("Next", ptr_ptr)]))
            .unwrap();
        node
    }

    #[test]
    fn test_pointer_to_double_pointer_struct() {
        let mut types = TypeTable::new();
        let node = double_pointer_node(&mut types);
        let node_ptr = types.pointer_to(node);
        let mut e = extractor(types, SymbolTable::new());

        let root = e.extract(node, &Value::Zero).unwrap();
        assert_no_forward_refs(&e, root);

        let ptr = e.extract(node_ptr, &Value::Zero).unwrap();
        assert_no_forward_refs(&e, ptr);
        let shape = e.shape(ptr).unwrap();
        assert_eq!(shape.lv(), 1);
        let next = shape.fields().unwrap()[0].shape;
        assert_eq!(e.display(next).unwrap().to_string(), "**example.com/app.Node");
    }

    #[test]
    fn test_seen_entries_fully_resolved() {
        let mut types = TypeTable::new();
        let node = double_pointer_node(&mut types);
        let mut e = extractor(types, SymbolTable::new());

        e.extract(node, &Value::Zero).unwrap();
        let entries: Vec<NodeId> = e.seen().map(|(_, id)| id).collect();
        assert!(!entries.is_empty());
        for id in entries {
            assert_no_forward_refs(&e, id);
        }
    }

    #[test]
    fn test_function_typed_params_named_after_shape() {
        let mut types = TypeTable::new();
        let int = types.basic(Kind::Int);
        let callback = types.func(vec![int], vec![], false);
        let handler = types
            .named(
                APP,
                "Handler",
                TypeRepr::Func(Signature {
                    params: vec![int],
                    results: vec![int],
                    variadic: false,
                }),
            )
            .unwrap();
        let register = types.func(vec![handler, callback, int], vec![], false);
        let mut e = extractor(types, SymbolTable::new());

        let id = e.extract(register, &Value::Zero).unwrap();
        let func = e.shape(id).unwrap().function().unwrap();
        assert_eq!(func.param_names(), vec!["Handler", "func0", "args2"]);
    }

    #[test]
    fn test_reset_reaches_pointer_copies() {
        let mut types = TypeTable::new();
        let person = person(&mut types);
        let p1 = types.pointer_to(person);
        let mut e = extractor(types, SymbolTable::new());

        let root = e.extract(person, &Value::Zero).unwrap();
        let ptr = e.extract(p1, &Value::Zero).unwrap();
        assert_ne!(root, ptr);

        e.reset_name(root, "Human").unwrap();
        e.reset_package(root, "example.com/other").unwrap();
        assert_eq!(e.display(ptr).unwrap().to_string(), "*example.com/other.Human");
        assert_eq!(e.identity(ptr).unwrap(), e.identity(root).unwrap());
    }
}
