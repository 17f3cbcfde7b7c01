//! Cached metadata lookup for functions and named types
//!
//! Each package path owns one cache entry that moves through two states:
//!
//! | State     | Populated by                 | Satisfies                         |
//! |-----------|------------------------------|-----------------------------------|
//! | `Partial` | a function lookup (one file) | function lookups in parsed files  |
//! | `Full`    | a type lookup (all files)    | every lookup in the package       |
//!
//! Parse and read failures are cached next to successes, so a broken source
//! unit is never parsed twice. A `Full` entry replaces a `Partial` one and
//! reuses the files it already holds.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::collect::{parse_file, FileDecls, FuncDecl, PackageDecls, TypeDecl, Var};
use crate::error::MetadataError;
use crate::symbol::{CodeAddr, NameKind, QualifiedName, SymbolResolver};

const SOURCE_EXTENSION: &str = "go";
const TEST_FILE_SUFFIX: &str = "_test.go";
const TEST_PACKAGE_SUFFIX: &str = "_test";

/// Lookup behavior switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupOptions {
    /// Parse `_test.go` files during full package loads
    pub include_test_files: bool,
    /// Answer queries for lower-case declarations
    pub include_unexported: bool,
    /// Import-path prefix → source directory mappings
    pub package_roots: Vec<(String, PathBuf)>,
}

/// Declared parameter or result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarMetadata {
    /// Declared name, empty when unnamed
    pub name: String,
    /// Doc or trailing comment
    pub doc: String,
}

impl From<&Var> for VarMetadata {
    fn from(var: &Var) -> Self {
        Self {
            name: var.name.clone(),
            doc: var.doc.clone(),
        }
    }
}

/// Source metadata of a function, method, or closure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuncMetadata {
    /// Declared name, empty for closures
    pub name: String,
    /// Receiver variable name, for methods with a named receiver
    pub recv: Option<String>,
    /// Doc comment
    pub doc: String,
    /// Parameters, receiver excluded
    pub params: Vec<VarMetadata>,
    /// Results
    pub returns: Vec<VarMetadata>,
    /// Whether the last parameter is variadic
    pub variadic: bool,
}

impl FuncMetadata {
    fn from_decl(decl: &FuncDecl) -> Self {
        Self {
            name: decl.name.clone(),
            recv: decl
                .recv
                .as_ref()
                .map(|r| r.name.clone())
                .filter(|name| !name.is_empty()),
            doc: decl.doc.clone(),
            params: decl.params.iter().map(VarMetadata::from).collect(),
            returns: decl.results.iter().map(VarMetadata::from).collect(),
            variadic: decl.variadic,
        }
    }

    /// Declared parameter names
    pub fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    /// Declared result names
    pub fn return_names(&self) -> Vec<&str> {
        self.returns.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Struct field or interface member documentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMetadata {
    /// Field name
    pub name: String,
    /// Doc, falling back to the trailing comment
    pub doc: String,
}

/// Source metadata of a named type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeMetadata {
    /// Type name
    pub name: String,
    /// Doc, falling back to the trailing comment
    pub doc: String,
    /// Fields in declaration order
    pub fields: Vec<FieldMetadata>,
}

impl TypeMetadata {
    fn from_decl(decl: &TypeDecl) -> Self {
        Self {
            name: decl.name.clone(),
            doc: doc_or_comment(&decl.doc, &decl.comment),
            fields: decl
                .fields
                .iter()
                .map(|f| FieldMetadata {
                    name: f.name.clone(),
                    doc: doc_or_comment(&f.doc, &f.comment),
                })
                .collect(),
        }
    }

    /// Field docs keyed by field name
    pub fn field_docs(&self) -> FxHashMap<&str, &str> {
        self.fields
            .iter()
            .map(|f| (f.name.as_str(), f.doc.as_str()))
            .collect()
    }
}

fn doc_or_comment(doc: &str, comment: &str) -> String {
    if doc.is_empty() {
        comment.trim().to_string()
    } else {
        doc.trim().to_string()
    }
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

// ============================================================================
// Cache
// ============================================================================

type FileResult = Result<Arc<FileDecls>, MetadataError>;

enum PackageEntry {
    /// Individually parsed files
    Partial(FxHashMap<PathBuf, FileResult>),
    /// Every file of the package
    Full(Result<Arc<PackageDecls>, MetadataError>),
}

#[derive(Default)]
struct LookupCache {
    packages: FxHashMap<String, PackageEntry>,
    dirs: FxHashMap<String, PathBuf>,
}

/// Where a function declaration is searched.
enum Scope {
    File(Arc<FileDecls>),
    Package(Arc<PackageDecls>),
}

impl Scope {
    fn function(&self, name: &str) -> Option<&FuncDecl> {
        match self {
            Scope::File(f) => f.function(name),
            Scope::Package(p) => p.function(name),
        }
    }

    fn method(&self, recv: &str, name: &str) -> Option<&FuncDecl> {
        match self {
            Scope::File(f) => f.method(recv, name),
            Scope::Package(p) => p.method(recv, name),
        }
    }

    fn declaration(&self, components: &[String]) -> Option<&FuncDecl> {
        match components {
            [name] => self.function(name),
            [recv, name] => self.method(recv, name),
            _ => None,
        }
    }
}

/// Metadata lookup service.
///
/// Shared across extraction sessions; the cache sits behind one mutex that
/// is held for each read-or-populate sequence, parsing included.
pub struct Lookup {
    resolver: Arc<dyn SymbolResolver>,
    options: LookupOptions,
    cache: Mutex<LookupCache>,
}

impl Lookup {
    /// Create a lookup over `resolver`
    pub fn new(resolver: Arc<dyn SymbolResolver>, options: LookupOptions) -> Self {
        Self {
            resolver,
            options,
            cache: Mutex::new(LookupCache::default()),
        }
    }

    /// Lookup options
    pub fn options(&self) -> &LookupOptions {
        &self.options
    }

    /// Symbol resolver used for function lookups
    pub fn resolver(&self) -> &Arc<dyn SymbolResolver> {
        &self.resolver
    }

    /// Map `pkg_path` to the directory holding its sources
    pub fn register_package_dir(&self, pkg_path: impl Into<String>, dir: impl Into<PathBuf>) {
        self.cache.lock().dirs.insert(pkg_path.into(), dir.into());
    }

    /// Source metadata of the function at `addr`.
    pub fn lookup_function(&self, addr: CodeAddr) -> Result<FuncMetadata, MetadataError> {
        let symbol = self
            .resolver
            .resolve(addr)
            .ok_or_else(|| MetadataError::not_found(format!("symbol at {addr}")))?;
        let qname = QualifiedName::parse(&symbol.name)
            .ok_or_else(|| MetadataError::not_found(format!("function {}", symbol.name)))?;

        let kind = qname.kind();
        match kind {
            NameKind::Closure { depth, .. } if depth > 1 => {
                return Err(MetadataError::unsupported(format!(
                    "nested closure {}",
                    symbol.name
                )));
            }
            NameKind::Other => {
                return Err(MetadataError::unsupported(format!("function {}", symbol.name)));
            }
            _ => {}
        }

        let scope = {
            let mut cache = self.cache.lock();
            if let Some(dir) = symbol.file.parent() {
                cache
                    .dirs
                    .entry(qname.package.clone())
                    .or_insert_with(|| dir.to_path_buf());
            }
            self.function_scope(&mut cache, &qname.package, &symbol.file)?
        };

        let not_found = || MetadataError::not_found(format!("function {}", symbol.name));
        let metadata = match kind {
            NameKind::Function(name) => {
                self.check_exported(name, &symbol.name)?;
                FuncMetadata::from_decl(scope.function(name).ok_or_else(not_found)?)
            }
            NameKind::Method { recv, name } => {
                self.check_exported(name, &symbol.name)?;
                FuncMetadata::from_decl(scope.method(recv, name).ok_or_else(not_found)?)
            }
            NameKind::Closure { enclosing, .. } => {
                let decl = scope.declaration(enclosing).ok_or_else(not_found)?;
                self.check_exported(&decl.name, &symbol.name)?;
                let lit = decl.literal_at(symbol.line).ok_or_else(not_found)?;
                if lit.depth > 1 {
                    return Err(MetadataError::unsupported(format!(
                        "nested closure {}",
                        symbol.name
                    )));
                }
                FuncMetadata {
                    params: lit.params.iter().map(VarMetadata::from).collect(),
                    returns: lit.results.iter().map(VarMetadata::from).collect(),
                    variadic: lit.variadic,
                    ..FuncMetadata::default()
                }
            }
            NameKind::Other => return Err(not_found()),
        };
        Ok(metadata)
    }

    /// Source metadata of the named type `name` declared in `pkg_path`.
    pub fn lookup_type(&self, pkg_path: &str, name: &str) -> Result<TypeMetadata, MetadataError> {
        // generic instantiations: `Wrap[int]` → `Wrap`
        let name = name.split('[').next().unwrap_or(name);
        let pkg_path = pkg_path.strip_suffix(TEST_PACKAGE_SUFFIX).unwrap_or(pkg_path);
        self.check_exported(name, name)?;

        let package = {
            let mut cache = self.cache.lock();
            self.full_package(&mut cache, pkg_path)?
        };
        let decl = package
            .type_decl(name)
            .ok_or_else(|| MetadataError::not_found(format!("type {pkg_path}.{name}")))?;
        Ok(TypeMetadata::from_decl(decl))
    }

    fn check_exported(&self, name: &str, what: &str) -> Result<(), MetadataError> {
        if self.options.include_unexported || is_exported(name) {
            Ok(())
        } else {
            Err(MetadataError::not_found(format!("unexported {what}")))
        }
    }

    /// The cached declarations covering `file`, parsing it if needed.
    fn function_scope(
        &self,
        cache: &mut LookupCache,
        pkg_path: &str,
        file: &Path,
    ) -> Result<Scope, MetadataError> {
        let entry = cache
            .packages
            .entry(pkg_path.to_string())
            .or_insert_with(|| PackageEntry::Partial(FxHashMap::default()));
        let files = match entry {
            PackageEntry::Full(result) => {
                debug!(pkg_path, "function lookup: full package cache hit");
                return result.clone().map(Scope::Package);
            }
            PackageEntry::Partial(files) => files,
        };

        if let Some(result) = files.get(file) {
            debug!(path = %file.display(), "function lookup: file cache hit");
            return result.clone().map(Scope::File);
        }

        let result = parse_path(file).map(Arc::new);
        if let Err(err) = &result {
            warn!(path = %file.display(), error = %err, "caching failed source unit");
        }
        files.insert(file.to_path_buf(), result.clone());
        result.map(Scope::File)
    }

    /// The fully parsed package, loading and caching it on first use.
    fn full_package(
        &self,
        cache: &mut LookupCache,
        pkg_path: &str,
    ) -> Result<Arc<PackageDecls>, MetadataError> {
        if let Some(PackageEntry::Full(result)) = cache.packages.get(pkg_path) {
            debug!(pkg_path, "type lookup: full package cache hit");
            return result.clone();
        }

        let dir = self.package_dir(cache, pkg_path).ok_or_else(|| {
            MetadataError::not_found(format!("source directory of package {pkg_path}"))
        })?;

        let parsed = match cache.packages.remove(pkg_path) {
            Some(PackageEntry::Partial(files)) => files,
            _ => FxHashMap::default(),
        };
        debug!(pkg_path, dir = %dir.display(), reused = parsed.len(), "loading package");

        let result = self.load_package(&dir, parsed).map(Arc::new);
        if let Err(err) = &result {
            warn!(pkg_path, error = %err, "caching failed package");
        }
        cache
            .packages
            .insert(pkg_path.to_string(), PackageEntry::Full(result.clone()));
        result
    }

    fn package_dir(&self, cache: &LookupCache, pkg_path: &str) -> Option<PathBuf> {
        if let Some(dir) = cache.dirs.get(pkg_path) {
            return Some(dir.clone());
        }
        if pkg_path == "main" {
            return None;
        }
        self.options
            .package_roots
            .iter()
            .filter_map(|(prefix, root)| {
                if pkg_path == prefix.as_str() {
                    return Some((prefix.len(), root.clone()));
                }
                let rest = pkg_path.strip_prefix(prefix.as_str())?.strip_prefix('/')?;
                Some((prefix.len(), root.join(rest)))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, dir)| dir)
    }

    fn load_package(
        &self,
        dir: &Path,
        mut parsed: FxHashMap<PathBuf, FileResult>,
    ) -> Result<PackageDecls, MetadataError> {
        let entries = fs::read_dir(dir).map_err(|e| MetadataError::Io {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| self.is_package_source(path))
            .collect();
        if paths.is_empty() {
            return Err(MetadataError::not_found(format!(
                "source files in {}",
                dir.display()
            )));
        }
        paths.sort();

        let mut package = PackageDecls::default();
        for path in paths {
            let file = match parsed.remove(&path) {
                Some(result) => result?,
                None => Arc::new(parse_path(&path)?),
            };
            if package.name.is_empty() && !file.package.ends_with(TEST_PACKAGE_SUFFIX) {
                package.name = file.package.clone();
            }
            package.insert(file);
        }
        Ok(package)
    }

    fn is_package_source(&self, path: &Path) -> bool {
        let is_source = path.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXTENSION);
        if !is_source || !path.is_file() {
            return false;
        }
        let is_test = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(TEST_FILE_SUFFIX));
        self.options.include_test_files || !is_test
    }
}

fn parse_path(path: &Path) -> Result<FileDecls, MetadataError> {
    debug!(path = %path.display(), "parsing source unit");
    let source = fs::read_to_string(path).map_err(|e| MetadataError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_file(path, &source).map_err(|e| MetadataError::ParseFailure {
        path: path.to_path_buf(),
        line: e.line,
        message: e.message,
    })
}
