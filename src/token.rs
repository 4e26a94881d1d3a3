//! Tokens produced by the lexer.
//!
//! A token is a tag plus a source range; literal tokens additionally carry
//! their decoded value so the parser never has to re-parse `raw` text.

use std::path::PathBuf;

/// A half-open byte range `[start, end)` into the source text, plus the file
/// it came from and the 0-indexed line the range starts on.
///
/// Kept deliberately small (`Copy`-able sans the `PathBuf`, which is cheap to
/// clone since translation units share one file path) so back-references can
/// be stashed on AST nodes without lifetime gymnastics.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub start: u32,
    pub end: u32,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: PathBuf, start: u32, end: u32, line: u32) -> Self {
        SourceLocation { file, start, end, line }
    }

    /// A zero-width location used for synthesized nodes (inserted casts,
    /// synthesized constructor declarations) that have no source span of
    /// their own.
    pub fn synthetic(file: PathBuf) -> Self {
        SourceLocation { file, start: 0, end: 0, line: 0 }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line + 1)
    }
}

/// The decoded payload of a literal token.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Int(u64),
    Float(f64),
    String(String),
    Bool(bool),
}

/// Token tags. Keywords are their own variants rather than a generic
/// `Identifier` re-tag at the parser boundary — the lexer re-tags a matched
/// keyword at scan time, so the parser never string-compares identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // literals
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    Identifier,

    // keywords: primitive types
    KwBool,
    KwInt,
    KwFloat,
    KwColor,
    KwPoint,
    KwVector,
    KwNormal,
    KwMatrix,
    KwString,
    KwVoid,
    KwClosure,

    // keywords: shader kinds
    KwShader,
    KwSurface,
    KwDisplacement,
    KwVolume,

    // keywords: declarations / statements
    KwStruct,
    KwOutput,
    KwIf,
    KwElse,
    KwWhile,
    KwFor,
    KwDo,
    KwBreak,
    KwContinue,
    KwReturn,

    // keywords: boolean / logical literals & aliases
    KwTrue,
    KwFalse,

    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    AttrOpen,  // [[
    AttrClose, // ]]
    Comma,
    Semicolon,
    Dot,
    Ellipsis, // ...

    // operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AmpAmp,
    PipePipe,
    Bang,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,
    PlusPlus,
    MinusMinus,
    Question,
    Colon,

    Newline,
    Eof,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: SourceLocation,
    pub raw: String,
    pub literal: Option<LiteralValue>,
}

impl Token {
    pub fn new(kind: TokenKind, loc: SourceLocation, raw: String) -> Self {
        Token { kind, loc, raw, literal: None }
    }

    pub fn with_literal(mut self, value: LiteralValue) -> Self {
        self.literal = Some(value);
        self
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

/// Maps identifier text to a keyword token kind, or `None` for a plain
/// identifier. A single fixed table, consulted once per identifier scan.
pub fn keyword_kind(text: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match text {
        "bool" => KwBool,
        "int" => KwInt,
        "float" => KwFloat,
        "color" => KwColor,
        "point" => KwPoint,
        "vector" => KwVector,
        "normal" => KwNormal,
        "matrix" => KwMatrix,
        "string" => KwString,
        "void" => KwVoid,
        "closure" => KwClosure,
        "shader" => KwShader,
        "surface" => KwSurface,
        "displacement" => KwDisplacement,
        "volume" => KwVolume,
        "struct" => KwStruct,
        "output" => KwOutput,
        "if" => KwIf,
        "else" => KwElse,
        "while" => KwWhile,
        "for" => KwFor,
        "do" => KwDo,
        "break" => KwBreak,
        "continue" => KwContinue,
        "return" => KwReturn,
        "true" => KwTrue,
        "false" => KwFalse,
        // `and`, `or`, `not` are lexical aliases for the logical operators,
        // re-tagged directly to the operator token rather than a keyword.
        "and" => AmpAmp,
        "or" => PipePipe,
        "not" => Bang,
        _ => return None,
    })
}
