//! Integration tests for metadata lookup
//!
//! Lays out Go-syntax packages in a temporary directory and resolves
//! functions through a symbol table, the way a host runtime would.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reflect_shape_metadata::{
    CodeAddr, Lookup, LookupOptions, MetadataError, Symbol, SymbolTable,
};
use tempfile::TempDir;

const APP: &str = r#"package app

import "context"

// Foo is a function.
// This is Foo.
func Foo(ctx context.Context, name string) error {
	return nil
}

func FooWithRetNames(ctx context.Context) (n int, err error) { return 0, nil }

func FooVariadic(prefix string, xs ...int) {}

type S struct{}

// Hello greets.
func (s *S) Hello(name string) string { return name }

func TestFunction() {
	f := func(x int, y string) {
		g := func() {
		}
		_ = g
	}
	_ = f
}

func unexported() {}
"#;

const MODELS: &str = r#"package models

// Person is a person.
type Person struct {
	Name string // name of person
	// Father is the father
	Father *Person
}

type Wrap[T any] struct {
	Value T // the value
}
"#;

const MODELS_TEST: &str = r#"package models

type Helper struct{}
"#;

const FOO: CodeAddr = CodeAddr(0x10);
const HELLO: CodeAddr = CodeAddr(0x11);
const HELLO_BOUND: CodeAddr = CodeAddr(0x12);
const CLOSURE: CodeAddr = CodeAddr(0x13);
const NESTED_CLOSURE: CodeAddr = CodeAddr(0x14);
const UNEXPORTED: CodeAddr = CodeAddr(0x15);
const BROKEN: CodeAddr = CodeAddr(0x16);
const MISSING: CodeAddr = CodeAddr(0x17);
const RET_NAMES: CodeAddr = CodeAddr(0x18);
const VARIADIC: CodeAddr = CodeAddr(0x19);

/// 1-based line of the first occurrence of `needle`
fn line_of(source: &str, needle: &str) -> u32 {
    let offset = source.find(needle).unwrap();
    source[..offset].matches('\n').count() as u32 + 1
}

struct Fixture {
    dir: TempDir,
    symbols: SymbolTable,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "app/app.go", APP);
        write(dir.path(), "models/models.go", MODELS);
        write(dir.path(), "models/models_test.go", MODELS_TEST);
        write(dir.path(), "bad/bad.go", "package bad\n\nfunc F( {\n");

        let app = dir.path().join("app/app.go");
        let mut symbols = SymbolTable::new();
        let mut add = |addr, name: &str, file: &PathBuf, needle: &str| {
            symbols.insert(addr, Symbol::new(name, file.clone(), line_of(APP, needle)));
        };
        add(FOO, "example.com/app.Foo", &app, "func Foo(");
        add(RET_NAMES, "example.com/app.FooWithRetNames", &app, "func FooWithRetNames(");
        add(VARIADIC, "example.com/app.FooVariadic", &app, "func FooVariadic(");
        add(HELLO, "example.com/app.(*S).Hello", &app, "func (s *S)");
        add(HELLO_BOUND, "example.com/app.(*S).Hello-fm", &app, "func (s *S)");
        add(CLOSURE, "example.com/app.TestFunction.func1", &app, "f := func");
        add(NESTED_CLOSURE, "example.com/app.TestFunction.func1.1", &app, "g := func");
        add(UNEXPORTED, "example.com/app.unexported", &app, "func unexported");
        add(MISSING, "example.com/app.Missing", &app, "func Foo(");
        symbols.insert(
            BROKEN,
            Symbol::new("example.com/bad.F", dir.path().join("bad/bad.go"), 3),
        );

        Self { dir, symbols }
    }

    fn lookup(&self, options: LookupOptions) -> Lookup {
        let options = LookupOptions {
            package_roots: vec![("example.com".to_string(), self.dir.path().to_path_buf())],
            ..options
        };
        Lookup::new(Arc::new(self.symbols.clone()), options)
    }
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[test]
fn test_function_doc_and_names() {
    let fixture = Fixture::new();
    let lookup = fixture.lookup(LookupOptions::default());

    let foo = lookup.lookup_function(FOO).unwrap();
    assert_eq!(foo.name, "Foo");
    assert_eq!(foo.doc, "Foo is a function.\nThis is Foo.");
    assert_eq!(foo.param_names(), vec!["ctx", "name"]);
    assert_eq!(foo.return_names(), vec![""]);
    assert_eq!(foo.recv, None);

    let ret = lookup.lookup_function(RET_NAMES).unwrap();
    assert_eq!(ret.return_names(), vec!["n", "err"]);

    let variadic = lookup.lookup_function(VARIADIC).unwrap();
    assert_eq!(variadic.param_names(), vec!["prefix", "xs"]);
    assert!(variadic.variadic);
}

#[test]
fn test_method_receiver_name() {
    let fixture = Fixture::new();
    let lookup = fixture.lookup(LookupOptions::default());

    let hello = lookup.lookup_function(HELLO).unwrap();
    assert_eq!(hello.recv.as_deref(), Some("s"));
    assert_eq!(hello.param_names(), vec!["name"]);
    assert_eq!(hello.doc, "Hello greets.");

    let bound = lookup.lookup_function(HELLO_BOUND).unwrap();
    assert_eq!(bound, hello);
}

#[test]
fn test_closures() {
    let fixture = Fixture::new();
    let lookup = fixture.lookup(LookupOptions::default());

    let closure = lookup.lookup_function(CLOSURE).unwrap();
    assert_eq!(closure.name, "");
    assert_eq!(closure.param_names(), vec!["x", "y"]);
    assert!(closure.returns.is_empty());

    let err = lookup.lookup_function(NESTED_CLOSURE).unwrap_err();
    assert!(err.is_unsupported(), "unexpected error: {err}");
}

#[test]
fn test_unexported_and_missing() {
    let fixture = Fixture::new();

    let lookup = fixture.lookup(LookupOptions::default());
    assert!(lookup.lookup_function(UNEXPORTED).unwrap_err().is_not_found());
    assert!(lookup.lookup_function(MISSING).unwrap_err().is_not_found());
    assert!(lookup.lookup_function(CodeAddr(0xdead)).unwrap_err().is_not_found());

    let lookup = fixture.lookup(LookupOptions {
        include_unexported: true,
        ..LookupOptions::default()
    });
    assert_eq!(lookup.lookup_function(UNEXPORTED).unwrap().name, "unexported");
}

#[test]
fn test_parse_failure_is_sticky() {
    let fixture = Fixture::new();
    let lookup = fixture.lookup(LookupOptions::default());

    let first = lookup.lookup_function(BROKEN).unwrap_err();
    assert!(matches!(first, MetadataError::ParseFailure { line: 3, .. }));

    // repairing the file does not clear the cached failure
    write(fixture.dir.path(), "bad/bad.go", "package bad\n\nfunc F() {}\n");
    assert_eq!(lookup.lookup_function(BROKEN).unwrap_err(), first);

    // a full load reuses the failed unit
    let full = lookup.lookup_type("example.com/bad", "F").unwrap_err();
    assert_eq!(full, first);
}

#[test]
fn test_type_docs_via_package_roots() {
    let fixture = Fixture::new();
    let lookup = fixture.lookup(LookupOptions::default());

    let person = lookup.lookup_type("example.com/models", "Person").unwrap();
    assert_eq!(person.doc, "Person is a person.");
    let docs = person.field_docs();
    assert_eq!(docs["Name"], "name of person");
    assert_eq!(docs["Father"], "Father is the father");

    let wrap = lookup.lookup_type("example.com/models", "Wrap[int]").unwrap();
    assert_eq!(wrap.field_docs()["Value"], "the value");

    // external test packages resolve to the package under test
    let from_test = lookup.lookup_type("example.com/models_test", "Person").unwrap();
    assert_eq!(from_test, person);

    assert!(lookup
        .lookup_type("example.com/models", "Helper")
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_test_files_included_when_configured() {
    let fixture = Fixture::new();
    let lookup = fixture.lookup(LookupOptions {
        include_test_files: true,
        ..LookupOptions::default()
    });
    assert_eq!(lookup.lookup_type("example.com/models", "Helper").unwrap().name, "Helper");
}

#[test]
fn test_partial_entry_upgrades_to_full() {
    let fixture = Fixture::new();
    let lookup = Lookup::new(Arc::new(fixture.symbols.clone()), LookupOptions::default());

    // no package roots: the directory is only known after a function lookup
    assert!(lookup.lookup_type("example.com/app", "S").unwrap_err().is_not_found());

    lookup.lookup_function(FOO).unwrap();
    let s = lookup.lookup_type("example.com/app", "S").unwrap();
    assert_eq!(s.name, "S");
    assert_eq!(s.doc, "");

    // the full entry keeps answering function lookups
    assert_eq!(lookup.lookup_function(HELLO).unwrap().recv.as_deref(), Some("s"));
}

#[test]
fn test_registered_package_dir() {
    let fixture = Fixture::new();
    let lookup = Lookup::new(Arc::new(SymbolTable::new()), LookupOptions::default());
    lookup.register_package_dir("main", fixture.dir.path().join("models"));
    assert_eq!(lookup.lookup_type("main", "Person").unwrap().name, "Person");
}
