//! Lexer for Go-syntax source units.
//!
//! This module implements a declaration-oriented lexer using the logos library.
//! Code tokens and comments are split into two streams: the collector walks
//! the token stream and queries the comment index by line to attach docs.

use logos::Logos;

use crate::error::ParseError;

/// Logos-based token enum for lexing.
///
/// Operators the collector never inspects individually are folded into
/// [`RawToken::Operator`]; literals are kept opaque.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum RawToken {
    #[regex(r"//[^\n]*")]
    LineComment,

    #[token("/*", lex_block_comment)]
    BlockComment,

    #[regex(r"[_\p{XID_Start}][_\p{XID_Continue}]*")]
    Ident,

    #[regex(r"`[^`]*`")]
    RawString,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    String,

    #[regex(r"'([^'\\\n]|\\.)+'")]
    Rune,

    #[regex(r"[0-9][0-9a-zA-Z_.]*")]
    Number,

    #[token("...")]
    Ellipsis,

    #[token("(")]
    LeftParen,

    #[token(")")]
    RightParen,

    #[token("[")]
    LeftBracket,

    #[token("]")]
    RightBracket,

    #[token("{")]
    LeftBrace,

    #[token("}")]
    RightBrace,

    #[token(",")]
    Comma,

    #[token(".")]
    Dot,

    #[token(";")]
    Semicolon,

    #[token("*")]
    Star,

    #[regex(r"[-+/%&|^<>=!:~]+")]
    Operator,
}

/// Lex a block comment (handles nested stars but not nested comments)
fn lex_block_comment(lex: &mut logos::Lexer<RawToken>) -> bool {
    let remainder = lex.remainder();
    if let Some(end) = remainder.find("*/") {
        // Consume everything up to and including "*/"
        lex.bump(end + 2);
        true
    } else {
        // Unterminated comment - consume to end and report
        lex.bump(remainder.len());
        false
    }
}

/// Token kinds visible to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword
    Ident,
    /// String, rune, or numeric literal
    Literal,
    /// `...`
    Ellipsis,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `;`
    Semicolon,
    /// `*`
    Star,
    /// Any other operator
    Operator,
}

/// Byte range in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start byte offset
    pub start: usize,
    /// End byte offset (exclusive)
    pub end: usize,
}

/// A code token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Token kind
    pub kind: TokenKind,
    /// Source range
    pub span: Span,
    /// 1-based line of the token start
    pub line: u32,
    /// 1-based line of the token end (differs for raw strings)
    pub end_line: u32,
}

impl Token {
    /// Source text of the token
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.start..self.span.end]
    }

    /// Whether a newline after this token terminates a statement
    pub fn ends_statement(&self, source: &str) -> bool {
        match self.kind {
            TokenKind::Ident
            | TokenKind::Literal
            | TokenKind::RightParen
            | TokenKind::RightBracket
            | TokenKind::RightBrace => true,
            TokenKind::Operator => matches!(self.text(source), "++" | "--"),
            _ => false,
        }
    }
}

/// A comment with its cleaned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    /// Text without comment markers
    pub text: String,
    /// Source range
    pub span: Span,
    /// First line
    pub line: u32,
    /// Last line
    pub end_line: u32,
    /// Whether no code token precedes the comment on its first line
    pub own_line: bool,
}

/// Output of [`tokenize`].
#[derive(Debug, Clone, Default)]
pub struct Lexed {
    /// Code tokens in source order
    pub tokens: Vec<Token>,
    /// Comments in source order
    pub comments: Vec<Comment>,
}

/// Maps byte offsets to 1-based line numbers.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn line(&self, offset: usize) -> u32 {
        let idx = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        idx as u32 + 1
    }
}

/// Split `source` into code tokens and comments.
pub fn tokenize(source: &str) -> Result<Lexed, ParseError> {
    let lines = LineIndex::new(source);
    let mut lexed = Lexed::default();
    let mut last_code_line = 0u32;
    let mut lexer = RawToken::lexer(source);

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = Span {
            start: range.start,
            end: range.end,
        };
        let line = lines.line(span.start);
        let end_line = lines.line(span.end.saturating_sub(1).max(span.start));

        let raw = match result {
            Ok(raw) => raw,
            Err(()) => {
                let found = source[span.start..].chars().next().unwrap_or('\0');
                let message = if source[span.start..].starts_with("/*") {
                    "unterminated block comment".to_string()
                } else {
                    format!("unexpected character {found:?}")
                };
                return Err(ParseError::new(line, message));
            }
        };

        let kind = match raw {
            RawToken::LineComment | RawToken::BlockComment => {
                lexed.comments.push(Comment {
                    text: comment_text(lexer.slice()),
                    span,
                    line,
                    end_line,
                    own_line: last_code_line != line,
                });
                continue;
            }
            RawToken::Ident => TokenKind::Ident,
            RawToken::RawString | RawToken::String | RawToken::Rune | RawToken::Number => {
                TokenKind::Literal
            }
            RawToken::Ellipsis => TokenKind::Ellipsis,
            RawToken::LeftParen => TokenKind::LeftParen,
            RawToken::RightParen => TokenKind::RightParen,
            RawToken::LeftBracket => TokenKind::LeftBracket,
            RawToken::RightBracket => TokenKind::RightBracket,
            RawToken::LeftBrace => TokenKind::LeftBrace,
            RawToken::RightBrace => TokenKind::RightBrace,
            RawToken::Comma => TokenKind::Comma,
            RawToken::Dot => TokenKind::Dot,
            RawToken::Semicolon => TokenKind::Semicolon,
            RawToken::Star => TokenKind::Star,
            RawToken::Operator => TokenKind::Operator,
        };

        last_code_line = end_line;
        lexed.tokens.push(Token {
            kind,
            span,
            line,
            end_line,
        });
    }

    Ok(lexed)
}

/// Strip comment markers and trim each line.
fn comment_text(raw: &str) -> String {
    if let Some(line) = raw.strip_prefix("//") {
        return line.trim().to_string();
    }
    let inner = raw
        .strip_prefix("/*")
        .and_then(|s| s.strip_suffix("*/"))
        .unwrap_or(raw);
    inner
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
