//! Executable symbol resolution
//!
//! The host runtime owns the mapping from a function value's code address to
//! its symbol-table entry. This module defines that boundary
//! ([`SymbolResolver`]), an in-memory implementation ([`SymbolTable`]), and
//! the parser for qualified symbol names.
//!
//! ## Symbol name forms
//!
//! | Symbol                          | Meaning                             |
//! |---------------------------------|-------------------------------------|
//! | `example.com/app/pkg.F`         | package-level function `F`          |
//! | `example.com/app/pkg.T.M`       | method `M`, value receiver `T`      |
//! | `example.com/app/pkg.(*T).M`    | method `M`, pointer receiver `T`    |
//! | `example.com/app/pkg.(*T).M-fm` | bound method value                  |
//! | `example.com/app/pkg.F.func1`   | closure declared inside `F`         |
//! | `example.com/app/pkg.F.func1.2` | closure nested inside a closure     |

use std::fmt;
use std::path::PathBuf;

use rustc_hash::FxHashMap;

/// Suffix the runtime appends to bound method values.
const BOUND_METHOD_SUFFIX: &str = "-fm";

/// Executable address of a function value. `CodeAddr(0)` means "no code".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct CodeAddr(pub u64);

impl CodeAddr {
    /// The null address
    pub const NONE: CodeAddr = CodeAddr(0);

    /// Whether this address refers to code
    pub fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for CodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Symbol-table entry for a code address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Fully qualified symbol name
    pub name: String,
    /// Source file declaring the function
    pub file: PathBuf,
    /// Line of the function's entry
    pub line: u32,
}

impl Symbol {
    /// Create a symbol entry
    pub fn new(name: impl Into<String>, file: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            line,
        }
    }
}

/// Resolves code addresses to symbol-table entries.
pub trait SymbolResolver: Send + Sync {
    /// Look up the symbol for `addr`
    fn resolve(&self, addr: CodeAddr) -> Option<Symbol>;
}

/// In-memory symbol table.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    entries: FxHashMap<CodeAddr, Symbol>,
}

impl SymbolTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `symbol` at `addr`, replacing any previous entry
    pub fn insert(&mut self, addr: CodeAddr, symbol: Symbol) {
        self.entries.insert(addr, symbol);
    }

    /// Number of registered symbols
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, addr: CodeAddr) -> Option<Symbol> {
        self.entries.get(&addr).cloned()
    }
}

/// What a qualified name refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameKind<'a> {
    /// Package-level function
    Function(&'a str),
    /// Method on a named receiver type
    Method {
        /// Receiver type name, without `(*` `)`
        recv: &'a str,
        /// Method name
        name: &'a str,
    },
    /// Anonymous closure
    Closure {
        /// Components naming the enclosing declaration
        enclosing: &'a [String],
        /// Closure nesting level, 1 for a closure directly inside a declaration
        depth: usize,
    },
    /// Unrecognized layout
    Other,
}

/// A parsed qualified symbol name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    /// Import path of the declaring package
    pub package: String,
    /// Components after the package, receivers normalized (`(*T)` → `T`)
    pub components: Vec<String>,
    /// Whether the symbol is a bound method value (`-fm`)
    pub bound: bool,
}

impl QualifiedName {
    /// Parse a fully qualified symbol name.
    ///
    /// Returns `None` when the name has no package qualifier.
    pub fn parse(symbol: &str) -> Option<Self> {
        // generic instantiations render as `F[...]`
        let symbol = symbol.replace("[...]", "");
        let (dir, tail) = match symbol.rfind('/') {
            Some(i) => symbol.split_at(i + 1),
            None => ("", symbol.as_str()),
        };

        let mut parts = tail.split('.');
        let local = parts.next().filter(|s| !s.is_empty())?;
        let mut components: Vec<String> = parts.map(normalize_receiver).collect();
        if components.is_empty() || components.iter().any(|c| c.is_empty()) {
            return None;
        }

        let mut bound = false;
        if let Some(last) = components.last_mut() {
            if let Some(stripped) = last.strip_suffix(BOUND_METHOD_SUFFIX) {
                *last = stripped.to_string();
                bound = true;
            }
        }

        Some(Self {
            package: format!("{dir}{local}"),
            components,
            bound,
        })
    }

    /// Classify the name
    pub fn kind(&self) -> NameKind<'_> {
        if let Some(i) = self.components.iter().position(|c| is_closure_component(c)) {
            return NameKind::Closure {
                enclosing: &self.components[..i],
                depth: self.components.len() - i,
            };
        }
        match self.components.as_slice() {
            [name] => NameKind::Function(name),
            [recv, name] => NameKind::Method { recv, name },
            _ => NameKind::Other,
        }
    }

    /// Declared name relative to the package (`F`, `T.M`, `F.func1`)
    pub fn local_name(&self) -> String {
        self.components.join(".")
    }

    /// Receiver type name when the symbol is a method
    pub fn receiver(&self) -> Option<&str> {
        match self.kind() {
            NameKind::Method { recv, .. } => Some(recv),
            _ => None,
        }
    }
}

fn normalize_receiver(component: &str) -> String {
    component.trim_start_matches("(*").trim_end_matches(')').to_string()
}

/// `funcN` or a bare number, as the runtime names closures.
fn is_closure_component(component: &str) -> bool {
    let digits = component.strip_prefix("func").unwrap_or(component);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_function() {
        let q = QualifiedName::parse("example.com/app/models.ListUser").unwrap();
        assert_eq!(q.package, "example.com/app/models");
        assert_eq!(q.kind(), NameKind::Function("ListUser"));
        assert!(!q.bound);
    }

    #[test]
    fn test_parse_pointer_method() {
        let q = QualifiedName::parse("example.com/app.(*S1).M").unwrap();
        assert_eq!(q.package, "example.com/app");
        assert_eq!(q.kind(), NameKind::Method { recv: "S1", name: "M" });
        assert_eq!(q.local_name(), "S1.M");
    }

    #[test]
    fn test_parse_bound_method() {
        let q = QualifiedName::parse("example.com/app.S0.M-fm").unwrap();
        assert!(q.bound);
        assert_eq!(q.receiver(), Some("S0"));
        assert_eq!(q.local_name(), "S0.M");
    }

    #[test]
    fn test_parse_closures() {
        let q = QualifiedName::parse("example.com/app.TestFunction.func1").unwrap();
        match q.kind() {
            NameKind::Closure { enclosing, depth } => {
                assert_eq!(enclosing, ["TestFunction".to_string()]);
                assert_eq!(depth, 1);
            }
            other => panic!("unexpected kind {other:?}"),
        }

        let nested = QualifiedName::parse("example.com/app.Outer.func1.2").unwrap();
        assert!(matches!(nested.kind(), NameKind::Closure { depth: 2, .. }));
    }

    #[test]
    fn test_parse_without_package_dir() {
        let q = QualifiedName::parse("main.run").unwrap();
        assert_eq!(q.package, "main");
        assert_eq!(q.kind(), NameKind::Function("run"));
    }

    #[test]
    fn test_parse_generic_instantiation() {
        let q = QualifiedName::parse("example.com/app.Map[...]").unwrap();
        assert_eq!(q.kind(), NameKind::Function("Map"));
    }

    #[test]
    fn test_parse_rejects_unqualified() {
        assert!(QualifiedName::parse("run").is_none());
        assert!(QualifiedName::parse("").is_none());
    }

    #[test]
    fn test_symbol_table() {
        let mut table = SymbolTable::new();
        table.insert(CodeAddr(0x10), Symbol::new("main.run", "/src/main.go", 3));
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve(CodeAddr(0x10)).unwrap().line, 3);
        assert!(table.resolve(CodeAddr(0x20)).is_none());
    }
}
