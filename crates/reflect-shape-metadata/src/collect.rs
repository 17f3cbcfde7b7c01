//! Declaration collector for Go-syntax source units
//!
//! A single pass over the token stream produced by [`crate::lexer`] that
//! records only what the metadata overlay needs: function and method
//! signatures with parameter and result names, function literals nested in
//! bodies, and type declarations with their fields. Expressions and
//! statements are skipped by delimiter balance and the newline rule.
//!
//! ## Doc comments
//!
//! | Attached text       | Source                                              |
//! |---------------------|-----------------------------------------------------|
//! | `doc`               | own-line comment group ending on the line above     |
//! | `comment`           | comment following the last token on the same line   |
//! | parameter `doc`     | either of the above, the own-line group preferred   |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::ParseError;
use crate::lexer::{tokenize, Comment, Token, TokenKind};

/// Keywords that start a type literal and therefore never name a parameter.
const TYPE_KEYWORDS: &[&str] = &["func", "map", "chan", "struct", "interface"];

// ============================================================================
// Declarations
// ============================================================================

/// A named parameter, result, or receiver slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Var {
    /// Declared name, empty for unnamed entries
    pub name: String,
    /// Doc or trailing comment
    pub doc: String,
}

/// Method receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receiver {
    /// Receiver variable name, empty when omitted
    pub name: String,
    /// Receiver base type name, without `*` or type arguments
    pub type_name: String,
}

/// Function literal found inside a declaration body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncLit {
    /// Line of the `func` keyword
    pub start_line: u32,
    /// Line of the closing brace
    pub end_line: u32,
    /// Nesting level, 1 for a literal directly inside the declaration
    pub depth: usize,
    /// Parameters
    pub params: Vec<Var>,
    /// Results
    pub results: Vec<Var>,
    /// Whether the last parameter is variadic
    pub variadic: bool,
}

/// Top-level function or method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDecl {
    /// Function name
    pub name: String,
    /// Receiver, for methods
    pub recv: Option<Receiver>,
    /// Doc comment
    pub doc: String,
    /// Parameters
    pub params: Vec<Var>,
    /// Results
    pub results: Vec<Var>,
    /// Whether the last parameter is variadic
    pub variadic: bool,
    /// Line of the `func` keyword
    pub start_line: u32,
    /// Line of the closing brace, or of the signature end when bodiless
    pub end_line: u32,
    /// Function literals in the body, inner literals first
    pub literals: Vec<FuncLit>,
}

impl FuncDecl {
    /// The innermost function literal whose line span contains `line`
    pub fn literal_at(&self, line: u32) -> Option<&FuncLit> {
        self.literals
            .iter()
            .filter(|lit| lit.start_line <= line && line <= lit.end_line)
            .min_by_key(|lit| (lit.end_line - lit.start_line, usize::MAX - lit.depth))
    }
}

/// What a type declaration declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDeclKind {
    /// `struct { ... }`
    Struct,
    /// `interface { ... }`
    Interface,
    /// Any other type expression
    Other,
}

/// Struct field or interface member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    /// Field name; the type name for embedded fields
    pub name: String,
    /// Doc comment
    pub doc: String,
    /// Trailing comment
    pub comment: String,
    /// Whether the field is embedded
    pub embedded: bool,
}

/// Type declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    /// Type name, without type parameters
    pub name: String,
    /// Doc comment
    pub doc: String,
    /// Trailing comment
    pub comment: String,
    /// Declared kind
    pub kind: TypeDeclKind,
    /// Fields (struct) or members (interface)
    pub fields: Vec<FieldDecl>,
    /// Line of the type name
    pub line: u32,
}

/// Declarations collected from one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDecls {
    /// File path
    pub path: PathBuf,
    /// Package clause name
    pub package: String,
    /// Package-level functions by name
    pub functions: FxHashMap<String, FuncDecl>,
    /// Methods by (receiver type, method name)
    pub methods: FxHashMap<(String, String), FuncDecl>,
    /// Types by name
    pub types: FxHashMap<String, TypeDecl>,
}

impl FileDecls {
    fn new(path: PathBuf, package: String) -> Self {
        Self {
            path,
            package,
            functions: FxHashMap::default(),
            methods: FxHashMap::default(),
            types: FxHashMap::default(),
        }
    }

    fn insert_func(&mut self, decl: FuncDecl) {
        match &decl.recv {
            Some(recv) => {
                let key = (recv.type_name.clone(), decl.name.clone());
                self.methods.insert(key, decl);
            }
            None => {
                self.functions.insert(decl.name.clone(), decl);
            }
        }
    }

    /// Package-level function by name
    pub fn function(&self, name: &str) -> Option<&FuncDecl> {
        self.functions.get(name)
    }

    /// Method by receiver type and name
    pub fn method(&self, recv: &str, name: &str) -> Option<&FuncDecl> {
        self.methods.get(&(recv.to_string(), name.to_string()))
    }

    /// Type declaration by name
    pub fn type_decl(&self, name: &str) -> Option<&TypeDecl> {
        self.types.get(name)
    }
}

/// Declarations collected from every file of one package directory.
#[derive(Debug, Clone, Default)]
pub struct PackageDecls {
    /// Package clause name
    pub name: String,
    /// Parsed files by path
    pub files: FxHashMap<PathBuf, Arc<FileDecls>>,
}

impl PackageDecls {
    /// Create an empty package
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: FxHashMap::default(),
        }
    }

    /// Add a parsed file
    pub fn insert(&mut self, file: Arc<FileDecls>) {
        self.files.insert(file.path.clone(), file);
    }

    /// Parsed file by path
    pub fn file(&self, path: &Path) -> Option<&Arc<FileDecls>> {
        self.files.get(path)
    }

    /// Package-level function by name, in any file
    pub fn function(&self, name: &str) -> Option<&FuncDecl> {
        self.files.values().find_map(|f| f.function(name))
    }

    /// Method by receiver type and name, in any file
    pub fn method(&self, recv: &str, name: &str) -> Option<&FuncDecl> {
        self.files.values().find_map(|f| f.method(recv, name))
    }

    /// Type declaration by name, in any file
    pub fn type_decl(&self, name: &str) -> Option<&TypeDecl> {
        self.files.values().find_map(|f| f.type_decl(name))
    }
}

/// Collect the declarations of one source file.
pub fn parse_file(path: impl Into<PathBuf>, source: &str) -> Result<FileDecls, ParseError> {
    let lexed = tokenize(source)?;
    let collector = Collector {
        source,
        tokens: &lexed.tokens,
        comments: &lexed.comments,
    };
    collector.file(path.into())
}

// ============================================================================
// Collector
// ============================================================================

struct Signature {
    params: Vec<Var>,
    results: Vec<Var>,
    variadic: bool,
    /// Index of the first token after the signature
    end: usize,
}

struct Collector<'a> {
    source: &'a str,
    tokens: &'a [Token],
    comments: &'a [Comment],
}

impl<'a> Collector<'a> {
    fn file(&self, path: PathBuf) -> Result<FileDecls, ParseError> {
        if !self.is_word(0, "package") {
            return Err(self.error(0, "expected package clause"));
        }
        let package = self
            .ident(1)
            .ok_or_else(|| self.error(1, "expected package name"))?;
        let mut decls = FileDecls::new(path, package.to_string());

        let mut i = 2;
        while let Some(tok) = self.tokens.get(i) {
            match (tok.kind, tok.text(self.source)) {
                (TokenKind::Semicolon, _) => i += 1,
                (TokenKind::Ident, "import" | "var" | "const") => i = self.skip_decl(i + 1)?,
                (TokenKind::Ident, "func") => {
                    let (decl, next) = self.func_decl(i)?;
                    decls.insert_func(decl);
                    i = next;
                }
                (TokenKind::Ident, "type") => i = self.type_decl(i, &mut decls.types)?,
                (_, text) => {
                    return Err(self.error(i, format!("unexpected {text:?} at top level")));
                }
            }
        }
        Ok(decls)
    }

    // ------------------------------------------------------------------------
    // Token access
    // ------------------------------------------------------------------------

    fn kind(&self, i: usize) -> Option<TokenKind> {
        self.tokens.get(i).map(|t| t.kind)
    }

    fn text(&self, i: usize) -> &'a str {
        self.tokens.get(i).map_or("", |t| t.text(self.source))
    }

    fn ident(&self, i: usize) -> Option<&'a str> {
        (self.kind(i) == Some(TokenKind::Ident)).then(|| self.text(i))
    }

    fn is_word(&self, i: usize, word: &str) -> bool {
        self.ident(i) == Some(word)
    }

    fn is_operator(&self, i: usize, prefix: &str) -> bool {
        self.kind(i) == Some(TokenKind::Operator) && self.text(i).starts_with(prefix)
    }

    fn error(&self, i: usize, message: impl Into<String>) -> ParseError {
        let line = self
            .tokens
            .get(i)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line);
        ParseError::new(line, message)
    }

    // ------------------------------------------------------------------------
    // Skipping
    // ------------------------------------------------------------------------

    /// Index of the delimiter closing the one at `open`.
    fn skip_balanced(&self, open: usize) -> Result<usize, ParseError> {
        let mut stack = Vec::new();
        for (j, tok) in self.tokens.iter().enumerate().skip(open) {
            match tok.kind {
                TokenKind::LeftParen => stack.push(TokenKind::RightParen),
                TokenKind::LeftBracket => stack.push(TokenKind::RightBracket),
                TokenKind::LeftBrace => stack.push(TokenKind::RightBrace),
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                    if stack.pop() != Some(tok.kind) {
                        return Err(self.error(j, "mismatched delimiter"));
                    }
                    if stack.is_empty() {
                        return Ok(j);
                    }
                }
                _ => {}
            }
        }
        Err(self.error(open, "unclosed delimiter"))
    }

    /// Skip an `import`, `var` or `const` declaration body.
    fn skip_decl(&self, i: usize) -> Result<usize, ParseError> {
        if self.kind(i) == Some(TokenKind::LeftParen) {
            return Ok(self.skip_balanced(i)? + 1);
        }
        self.statement_end(i, self.tokens.len())
    }

    /// Exclusive end of the statement starting at `i`, bounded by `limit`.
    ///
    /// A statement ends at `;`, or at a line break after a token that can
    /// terminate a statement.
    fn statement_end(&self, i: usize, limit: usize) -> Result<usize, ParseError> {
        let mut j = i;
        while j < limit {
            match self.tokens[j].kind {
                TokenKind::Semicolon => return Ok(j),
                TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => {
                    j = self.skip_balanced(j)?;
                }
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                    return Err(self.error(j, "unexpected closing delimiter"));
                }
                _ => {}
            }
            let last = self.tokens[j];
            match self.tokens.get(j + 1) {
                Some(next) if j + 1 < limit => {
                    if next.line > last.end_line && last.ends_statement(self.source) {
                        return Ok(j + 1);
                    }
                }
                _ => return Ok(j + 1),
            }
            j += 1;
        }
        Ok(limit)
    }

    fn starts_type(&self, i: usize) -> bool {
        match self.kind(i) {
            Some(TokenKind::Ident | TokenKind::Star | TokenKind::LeftBracket) => true,
            Some(TokenKind::Operator) => self.is_operator(i, "<-"),
            _ => false,
        }
    }

    /// Index of the first token after the type expression at `i`.
    fn skip_type(&self, i: usize) -> Result<usize, ParseError> {
        let Some(tok) = self.tokens.get(i) else {
            return Ok(i);
        };
        match tok.kind {
            TokenKind::Star | TokenKind::Ellipsis => self.skip_type(i + 1),
            TokenKind::LeftParen => Ok(self.skip_balanced(i)? + 1),
            TokenKind::LeftBracket => {
                let close = self.skip_balanced(i)?;
                self.skip_type(close + 1)
            }
            TokenKind::Operator if self.is_operator(i, "<-") => self.skip_type(i + 1),
            TokenKind::Ident => match tok.text(self.source) {
                "map" if self.kind(i + 1) == Some(TokenKind::LeftBracket) => {
                    let close = self.skip_balanced(i + 1)?;
                    self.skip_type(close + 1)
                }
                "chan" => {
                    let next = if self.is_operator(i + 1, "<-") { i + 2 } else { i + 1 };
                    self.skip_type(next)
                }
                "func" if self.kind(i + 1) == Some(TokenKind::LeftParen) => {
                    Ok(self.signature(i + 1)?.end)
                }
                "struct" | "interface" if self.kind(i + 1) == Some(TokenKind::LeftBrace) => {
                    Ok(self.skip_balanced(i + 1)? + 1)
                }
                _ => {
                    let mut j = i + 1;
                    if self.kind(j) == Some(TokenKind::Dot) && self.ident(j + 1).is_some() {
                        j += 2;
                    }
                    let same_line = self.tokens.get(j).is_some_and(|t| t.line == tok.line);
                    if same_line && self.kind(j) == Some(TokenKind::LeftBracket) {
                        j = self.skip_balanced(j)? + 1;
                    }
                    Ok(j)
                }
            },
            _ => Ok(i + 1),
        }
    }

    // ------------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------------

    /// Own-line comment group ending on the line above `line`, starting
    /// after byte offset `after`.
    fn doc_before(&self, line: u32, after: usize) -> String {
        let upto = self.comments.partition_point(|c| c.end_line < line);
        let mut group = Vec::new();
        let mut next_line = line;
        for comment in self.comments[..upto].iter().rev() {
            if comment.span.start < after || !comment.own_line || comment.end_line + 1 != next_line
            {
                break;
            }
            group.push(comment.text.as_str());
            next_line = comment.line;
        }
        group.reverse();
        group.join("\n").trim().to_string()
    }

    /// Comment on `line` starting in `[from, to)` that follows code.
    fn trailing_comment(&self, line: u32, from: usize, to: usize) -> String {
        self.comments
            .iter()
            .find(|c| !c.own_line && c.line == line && c.span.start >= from && c.span.start < to)
            .map(|c| c.text.clone())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------------

    fn func_decl(&self, i: usize) -> Result<(FuncDecl, usize), ParseError> {
        let start_line = self.tokens[i].line;
        let doc = self.doc_before(start_line, 0);

        let mut j = i + 1;
        let mut recv = None;
        if self.kind(j) == Some(TokenKind::LeftParen) {
            let close = self.skip_balanced(j)?;
            recv = Some(self.receiver(j + 1, close)?);
            j = close + 1;
        }

        let name = self
            .ident(j)
            .ok_or_else(|| self.error(j, "expected function name"))?
            .to_string();
        j += 1;
        if self.kind(j) == Some(TokenKind::LeftBracket) {
            j = self.skip_balanced(j)? + 1;
        }
        if self.kind(j) != Some(TokenKind::LeftParen) {
            return Err(self.error(j, format!("expected parameter list for {name}")));
        }

        let sig = self.signature(j)?;
        j = sig.end;
        let mut end_line = self.tokens[j - 1].end_line;
        let mut literals = Vec::new();
        if self.kind(j) == Some(TokenKind::LeftBrace) {
            let close = self.scan_body(j, 0, &mut literals)?;
            end_line = self.tokens[close].line;
            j = close + 1;
        }

        let decl = FuncDecl {
            name,
            recv,
            doc,
            params: sig.params,
            results: sig.results,
            variadic: sig.variadic,
            start_line,
            end_line,
            literals,
        };
        Ok((decl, j))
    }

    fn receiver(&self, start: usize, end: usize) -> Result<Receiver, ParseError> {
        let entries = self.split_entries(start, end)?;
        let &(s, e) = entries
            .first()
            .ok_or_else(|| self.error(start, "empty receiver"))?;

        let mut j = s;
        let mut name = "";
        let follows_name = !matches!(
            self.kind(s + 1),
            Some(TokenKind::LeftBracket | TokenKind::Dot)
        );
        if e - s >= 2 && self.kind(s) == Some(TokenKind::Ident) && follows_name {
            name = self.text(s);
            j += 1;
        }
        while self.kind(j) == Some(TokenKind::Star) {
            j += 1;
        }
        let type_name = self
            .ident(j)
            .ok_or_else(|| self.error(j, "expected receiver type"))?;
        Ok(Receiver {
            name: name.to_string(),
            type_name: type_name.to_string(),
        })
    }

    /// Parameter list at `open`, plus the result list that follows it.
    fn signature(&self, open: usize) -> Result<Signature, ParseError> {
        let close = self.skip_balanced(open)?;
        let (params, variadic) = self.var_list(open, close)?;

        let mut end = close + 1;
        let mut results = Vec::new();
        let close_line = self.tokens[close].line;
        match self.tokens.get(end) {
            Some(t) if t.kind == TokenKind::LeftParen => {
                let rclose = self.skip_balanced(end)?;
                results = self.var_list(end, rclose)?.0;
                end = rclose + 1;
            }
            Some(t) if t.line == close_line && self.starts_type(end) => {
                end = self.skip_type(end)?;
                results.push(Var::default());
            }
            _ => {}
        }

        Ok(Signature {
            params,
            results,
            variadic,
            end,
        })
    }

    /// Comma-separated entries between `start` and `end`, as token ranges.
    fn split_entries(&self, start: usize, end: usize) -> Result<Vec<(usize, usize)>, ParseError> {
        let mut entries = Vec::new();
        let mut s = start;
        let mut j = start;
        while j < end {
            match self.tokens[j].kind {
                TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => {
                    j = self.skip_balanced(j)?;
                }
                TokenKind::Comma => {
                    if j > s {
                        entries.push((s, j));
                    }
                    s = j + 1;
                }
                _ => {}
            }
            j += 1;
        }
        if end > s {
            entries.push((s, end));
        }
        Ok(entries)
    }

    /// Whether the entry starts with a parameter name followed by a type.
    fn is_named_entry(&self, s: usize, e: usize) -> bool {
        let Some(first) = self.ident(s) else {
            return false;
        };
        if e - s < 2 || TYPE_KEYWORDS.contains(&first) {
            return false;
        }
        match self.kind(s + 1) {
            Some(TokenKind::Dot) => false,
            // `x []T` names x, `List[T]` is a generic type
            Some(TokenKind::LeftBracket) => self
                .skip_balanced(s + 1)
                .is_ok_and(|close| close + 1 < e),
            _ => true,
        }
    }

    fn var_list(&self, open: usize, close: usize) -> Result<(Vec<Var>, bool), ParseError> {
        let entries = self.split_entries(open + 1, close)?;
        let named = entries.iter().any(|&(s, e)| self.is_named_entry(s, e));

        let mut vars = Vec::with_capacity(entries.len());
        let mut variadic = false;
        for (k, &(s, e)) in entries.iter().enumerate() {
            let bound = entries
                .get(k + 1)
                .map_or(self.tokens[close].span.start, |&(next, _)| {
                    self.tokens[next].span.start
                });
            let last = self.tokens[e - 1];

            let mut doc = self.doc_before(self.tokens[s].line, self.tokens[open].span.end);
            if doc.is_empty() {
                doc = self.trailing_comment(last.end_line, last.span.end, bound);
            }

            let type_start = if named && e - s > 1 { s + 1 } else { s };
            if k + 1 == entries.len() && self.kind(type_start) == Some(TokenKind::Ellipsis) {
                variadic = true;
            }

            let name = if named { self.text(s).to_string() } else { String::new() };
            vars.push(Var { name, doc });
        }
        Ok((vars, variadic))
    }

    /// Scan the block at `open` for function literals; returns the index of
    /// the closing brace.
    fn scan_body(
        &self,
        open: usize,
        depth: usize,
        out: &mut Vec<FuncLit>,
    ) -> Result<usize, ParseError> {
        let mut j = open + 1;
        while let Some(tok) = self.tokens.get(j) {
            match tok.kind {
                TokenKind::RightBrace => return Ok(j),
                TokenKind::LeftBrace => j = self.scan_body(j, depth, out)? + 1,
                TokenKind::Ident
                    if tok.text(self.source) == "func"
                        && self.kind(j + 1) == Some(TokenKind::LeftParen) =>
                {
                    let sig = self.signature(j + 1)?;
                    if self.kind(sig.end) != Some(TokenKind::LeftBrace) {
                        // a func type, not a literal
                        j = sig.end;
                        continue;
                    }
                    let close = self.scan_body(sig.end, depth + 1, out)?;
                    out.push(FuncLit {
                        start_line: tok.line,
                        end_line: self.tokens[close].line,
                        depth: depth + 1,
                        params: sig.params,
                        results: sig.results,
                        variadic: sig.variadic,
                    });
                    j = close + 1;
                }
                _ => j += 1,
            }
        }
        Err(self.error(open, "unclosed delimiter"))
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    fn type_decl(
        &self,
        i: usize,
        types: &mut FxHashMap<String, TypeDecl>,
    ) -> Result<usize, ParseError> {
        if self.kind(i + 1) != Some(TokenKind::LeftParen) {
            let (decl, next) = self.type_spec(i + 1, 0)?;
            types.insert(decl.name.clone(), decl);
            return Ok(next);
        }

        let close = self.skip_balanced(i + 1)?;
        let after = self.tokens[i + 1].span.end;
        let mut j = i + 2;
        while j < close {
            if self.kind(j) == Some(TokenKind::Semicolon) {
                j += 1;
                continue;
            }
            let (decl, next) = self.type_spec(j, after)?;
            types.insert(decl.name.clone(), decl);
            j = next;
        }
        Ok(close + 1)
    }

    fn type_spec(&self, j: usize, after: usize) -> Result<(TypeDecl, usize), ParseError> {
        let name = self
            .ident(j)
            .ok_or_else(|| self.error(j, "expected type name"))?
            .to_string();
        let line = self.tokens[j].line;
        let doc = self.doc_before(line, after);

        let mut k = j + 1;
        if self.kind(k) == Some(TokenKind::LeftBracket) && self.is_type_params(k) {
            k = self.skip_balanced(k)? + 1;
        }
        if self.kind(k) == Some(TokenKind::Operator) && self.text(k) == "=" {
            k += 1;
        }
        if k >= self.tokens.len() {
            return Err(self.error(k, format!("expected type for {name}")));
        }

        let opens_block = self.kind(k + 1) == Some(TokenKind::LeftBrace);
        let (kind, fields, end) = match self.text(k) {
            "struct" if opens_block => {
                let close = self.skip_balanced(k + 1)?;
                let fields = self.members(k + 1, close, TypeDeclKind::Struct)?;
                (TypeDeclKind::Struct, fields, close + 1)
            }
            "interface" if opens_block => {
                let close = self.skip_balanced(k + 1)?;
                let fields = self.members(k + 1, close, TypeDeclKind::Interface)?;
                (TypeDeclKind::Interface, fields, close + 1)
            }
            _ => (TypeDeclKind::Other, Vec::new(), self.skip_type(k)?),
        };

        let last = self.tokens[end - 1];
        let to = self.tokens.get(end).map_or(usize::MAX, |t| t.span.start);
        let comment = self.trailing_comment(last.end_line, last.span.end, to);

        let decl = TypeDecl {
            name,
            doc,
            comment,
            kind,
            fields,
            line,
        };
        Ok((decl, end))
    }

    /// `[T any]` versus an array length such as `[N]`.
    fn is_type_params(&self, open: usize) -> bool {
        let Ok(close) = self.skip_balanced(open) else {
            return false;
        };
        close > open + 2
            && self.kind(open + 1) == Some(TokenKind::Ident)
            && (matches!(
                self.kind(open + 2),
                Some(TokenKind::Ident | TokenKind::Comma | TokenKind::Star)
            ) || self.is_operator(open + 2, "~"))
    }

    /// Fields of a struct or members of an interface between braces.
    fn members(
        &self,
        open: usize,
        close: usize,
        kind: TypeDeclKind,
    ) -> Result<Vec<FieldDecl>, ParseError> {
        let after = self.tokens[open].span.end;
        let mut fields = Vec::new();
        let mut j = open + 1;
        while j < close {
            if self.kind(j) == Some(TokenKind::Semicolon) {
                j += 1;
                continue;
            }
            let end = self.statement_end(j, close)?;

            let last = self.tokens[end - 1];
            let to = self.tokens.get(end).map_or(usize::MAX, |t| t.span.start);
            let doc = self.doc_before(self.tokens[j].line, after);
            let comment = self.trailing_comment(last.end_line, last.span.end, to);

            let entries = match kind {
                TypeDeclKind::Interface => self.interface_member(j, end),
                _ => self.struct_field(j, end)?,
            };
            fields.extend(entries.into_iter().map(|(name, embedded)| FieldDecl {
                name,
                doc: doc.clone(),
                comment: comment.clone(),
                embedded,
            }));
            j = end;
        }
        Ok(fields)
    }

    fn struct_field(&self, s: usize, e: usize) -> Result<Vec<(String, bool)>, ParseError> {
        // drop the tag
        let e = if e - s > 1 && self.kind(e - 1) == Some(TokenKind::Literal) {
            e - 1
        } else {
            e
        };

        let embedded = match self.kind(s + 1) {
            _ if self.kind(s) == Some(TokenKind::Star) || e - s == 1 => true,
            Some(TokenKind::Dot) => true,
            Some(TokenKind::LeftBracket) => self.skip_balanced(s + 1)? + 1 == e,
            _ => false,
        };
        if embedded {
            return Ok(self
                .embedded_name(s, e)
                .map(|name| vec![(name, true)])
                .unwrap_or_default());
        }

        let mut names = Vec::new();
        let mut j = s;
        while let Some(name) = self.ident(j) {
            names.push((name.to_string(), false));
            if self.kind(j + 1) != Some(TokenKind::Comma) {
                break;
            }
            j += 2;
        }
        Ok(names)
    }

    fn interface_member(&self, s: usize, e: usize) -> Vec<(String, bool)> {
        if let Some(name) = self.ident(s) {
            if self.kind(s + 1) == Some(TokenKind::LeftParen) {
                return vec![(name.to_string(), false)];
            }
        }
        // type-set unions such as `~int | ~string` declare nothing
        let has_operator = (s..e).any(|j| self.kind(j) == Some(TokenKind::Operator));
        if has_operator {
            return Vec::new();
        }
        self.embedded_name(s, e)
            .map(|name| vec![(name, true)])
            .unwrap_or_default()
    }

    /// Base type name of an embedded field: `*pkg.T[X]` → `T`.
    fn embedded_name(&self, s: usize, e: usize) -> Option<String> {
        let mut name = None;
        for j in s..e {
            match self.kind(j) {
                Some(TokenKind::Ident) => name = Some(self.text(j).to_string()),
                Some(TokenKind::Star | TokenKind::Dot) => {}
                _ => break,
            }
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"package app

import (
	"context"
	"fmt"
)

// Foo is a function.
// This is Foo.
func Foo(ctx context.Context, name string) error {
	return nil
}

func FooWithRetNames(x, y int) (n int, err error) { return 0, nil }

func FooWithoutArgNames(context.Context, string) (int, error) { return 0, nil }

func FooVariadic(prefix string, xs ...int) {}

func Generic[T any](xs []T, f func(T) bool) []T { return nil }

func Params(
	// the name
	name string,
	age int, // the age
) {}

type S struct{}

// Hello greets.
func (s *S) Hello(name string) string {
	return fmt.Sprintf("hello %s", name)
}

func (S) Untitled(int) {}

func (l *List[T]) Push(v T) {}

func Outer() {
	f := func(x int) int {
		g := func() {
		}
		_ = g
		return x
	}
	_ = f
	var h func(int) error
	_ = h
}
"#;

    fn parsed() -> FileDecls {
        parse_file("/src/app/app.go", SOURCE).unwrap()
    }

    fn names(vars: &[Var]) -> Vec<&str> {
        vars.iter().map(|v| v.name.as_str()).collect()
    }

    #[test]
    fn test_package_and_function_doc() {
        let file = parsed();
        assert_eq!(file.package, "app");
        let foo = file.function("Foo").unwrap();
        assert_eq!(foo.doc, "Foo is a function.\nThis is Foo.");
        assert_eq!(names(&foo.params), vec!["ctx", "name"]);
        assert_eq!(names(&foo.results), vec![""]);
        assert!(!foo.variadic);
    }

    #[test]
    fn test_grouped_and_named_results() {
        let file = parsed();
        let f = file.function("FooWithRetNames").unwrap();
        assert_eq!(names(&f.params), vec!["x", "y"]);
        assert_eq!(names(&f.results), vec!["n", "err"]);
        assert_eq!(f.doc, "");
    }

    #[test]
    fn test_unnamed_params() {
        let file = parsed();
        let f = file.function("FooWithoutArgNames").unwrap();
        assert_eq!(names(&f.params), vec!["", ""]);
        assert_eq!(names(&f.results), vec!["", ""]);
    }

    #[test]
    fn test_variadic_and_generic() {
        let file = parsed();
        let v = file.function("FooVariadic").unwrap();
        assert_eq!(names(&v.params), vec!["prefix", "xs"]);
        assert!(v.variadic);

        let g = file.function("Generic").unwrap();
        assert_eq!(names(&g.params), vec!["xs", "f"]);
        assert_eq!(names(&g.results), vec![""]);
    }

    #[test]
    fn test_param_docs() {
        let file = parsed();
        let p = file.function("Params").unwrap();
        assert_eq!(p.params[0].doc, "the name");
        assert_eq!(p.params[1].doc, "the age");
    }

    #[test]
    fn test_methods() {
        let file = parsed();
        let hello = file.method("S", "Hello").unwrap();
        let recv = hello.recv.as_ref().unwrap();
        assert_eq!(recv.name, "s");
        assert_eq!(recv.type_name, "S");
        assert_eq!(hello.doc, "Hello greets.");
        assert_eq!(names(&hello.params), vec!["name"]);

        let untitled = file.method("S", "Untitled").unwrap();
        assert_eq!(untitled.recv.as_ref().unwrap().name, "");
        assert_eq!(names(&untitled.params), vec![""]);

        let push = file.method("List", "Push").unwrap();
        assert_eq!(push.recv.as_ref().unwrap().name, "l");
        assert!(file.function("Hello").is_none());
    }

    #[test]
    fn test_function_literals() {
        let file = parsed();
        let outer = file.function("Outer").unwrap();
        assert_eq!(outer.literals.len(), 2);

        let f = outer.literal_at(outer.start_line + 1).unwrap();
        assert_eq!(f.depth, 1);
        assert_eq!(names(&f.params), vec!["x"]);
        assert_eq!(names(&f.results), vec![""]);

        let g = outer.literal_at(outer.start_line + 2).unwrap();
        assert_eq!(g.depth, 2);
        assert!(g.params.is_empty());
    }

    #[test]
    fn test_type_declarations() {
        let source = r#"package models

// Person is a person.
type Person struct {
	// Name of the person
	Name string `json:"name"`
	Father *Person // father
	A, B int
	*Base
	fmt.Stringer
}

type (
	// ID is an identifier.
	ID int

	// Wrap wraps.
	Wrap[T any] struct {
		Value T
	}

	Arr [4]int // fixed
)

// Reader reads.
type Reader interface {
	// Read reads
	Read(p []byte) (int, error)
	io.Closer
	~int | ~string
}
"#;
        let file = parse_file("/src/models/models.go", source).unwrap();

        let person = file.type_decl("Person").unwrap();
        assert_eq!(person.kind, TypeDeclKind::Struct);
        assert_eq!(person.doc, "Person is a person.");
        let fields: Vec<_> = person
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.embedded))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("Name", false),
                ("Father", false),
                ("A", false),
                ("B", false),
                ("Base", true),
                ("Stringer", true),
            ]
        );
        assert_eq!(person.fields[0].doc, "Name of the person");
        assert_eq!(person.fields[1].comment, "father");

        assert_eq!(file.type_decl("ID").unwrap().doc, "ID is an identifier.");
        assert_eq!(file.type_decl("ID").unwrap().kind, TypeDeclKind::Other);
        let wrap = file.type_decl("Wrap").unwrap();
        assert_eq!(wrap.kind, TypeDeclKind::Struct);
        assert_eq!(wrap.fields[0].name, "Value");
        assert_eq!(file.type_decl("Arr").unwrap().comment, "fixed");

        let reader = file.type_decl("Reader").unwrap();
        assert_eq!(reader.kind, TypeDeclKind::Interface);
        assert_eq!(reader.fields.len(), 2);
        assert_eq!(reader.fields[0].name, "Read");
        assert_eq!(reader.fields[0].doc, "Read reads");
        assert!(reader.fields[1].embedded);
    }

    #[test]
    fn test_var_and_const_are_skipped() {
        let source = "package a\n\nvar x = map[string]int{\n\t\"a\": 1,\n}\n\nconst (\n\tA = 1\n)\n\nvar f = func() {}\n\nfunc After() {}\n";
        let file = parse_file("/a.go", source).unwrap();
        assert!(file.function("After").is_some());
    }

    #[test]
    fn test_parse_errors() {
        let err = parse_file("/a.go", "func F() {}").unwrap_err();
        assert!(err.message.contains("package"));

        let err = parse_file("/a.go", "package a\n\nfunc F( {\n").unwrap_err();
        assert_eq!(err.line, 3);

        let err = parse_file("/a.go", "package a\n\n}\n").unwrap_err();
        assert!(err.message.contains("top level"));
    }
}
