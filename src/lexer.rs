//! Tokenizer: turns source bytes into a sequence of [`Token`]s.
//!
//! Numeric/string/compound-punctuation recognition, newline tokens
//! preserved (a direct parser discards them),
//! and maximal-munch over compound operators. The embedded-lexer-in-one-file
//! shape, this language's richer numeric-literal grammar (hex floats, signed
//! exponents), and its longer compound-operator table all follow.

use crate::diagnostics::DiagnosticSink;
use crate::token::{keyword_kind, LiteralValue, SourceLocation, Token, TokenKind};
use std::path::{Path, PathBuf};

pub struct Lexer<'a> {
    file: PathBuf,
    src: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(file: impl AsRef<Path>, src: &'a str) -> Self {
        Lexer { file: file.as_ref().to_path_buf(), src: src.as_bytes(), pos: 0, line: 0 }
    }

    /// Tokenizes the entire input, appending diagnostics to `sink` for any
    /// lexical errors encountered. Always terminates with exactly one `Eof`
    /// token.
    pub fn tokenize(mut self, sink: &mut dyn DiagnosticSink) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token(sink);
            let is_eof = tok.is_eof();
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn peek(&self) -> u8 {
        *self.src.get(self.pos).unwrap_or(&0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        *self.src.get(self.pos + offset).unwrap_or(&0)
    }

    fn bump(&mut self) -> u8 {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn loc(&self, start: usize) -> SourceLocation {
        SourceLocation::new(self.file.clone(), start as u32, self.pos as u32, self.line)
    }

    fn raw(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    fn skip_whitespace_and_comments(&mut self, sink: &mut dyn DiagnosticSink) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' => {
                    self.pos += 1;
                }
                b'/' if self.peek_at(1) == b'/' => {
                    while self.peek() != b'\n' && self.peek() != 0 {
                        self.pos += 1;
                    }
                }
                b'/' if self.peek_at(1) == b'*' => {
                    let start = self.pos;
                    let start_line = self.line;
                    self.pos += 2;
                    loop {
                        if self.peek() == 0 {
                            sink.error(
                                &self.loc(start),
                                &format!(
                                    "unterminated block comment starting on line {}",
                                    start_line + 1
                                ),
                            );
                            return;
                        }
                        if self.peek() == b'*' && self.peek_at(1) == b'/' {
                            self.pos += 2;
                            break;
                        }
                        if self.peek() == b'\n' {
                            self.line += 1;
                        }
                        self.pos += 1;
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self, sink: &mut dyn DiagnosticSink) -> Token {
        self.skip_whitespace_and_comments(sink);

        let start = self.pos;
        let c = self.peek();

        if c == 0 {
            return Token::new(TokenKind::Eof, self.loc(start), String::new());
        }

        if c == b'\n' {
            self.pos += 1;
            let tok = Token::new(TokenKind::Newline, self.loc(start), "\n".to_string());
            self.line += 1;
            return tok;
        }

        if c.is_ascii_digit() || (c == b'.' && self.peek_at(1).is_ascii_digit()) {
            return self.lex_number(start);
        }

        if c == b'_' || c.is_ascii_alphabetic() {
            return self.lex_identifier(start);
        }

        if c == b'"' {
            return self.lex_string(start, sink);
        }

        self.lex_punctuation(start, sink)
    }

    fn lex_identifier(&mut self, start: usize) -> Token {
        while self.peek() == b'_' || self.peek().is_ascii_alphanumeric() {
            self.pos += 1;
        }
        let raw = self.raw(start);
        let kind = keyword_kind(&raw).unwrap_or(TokenKind::Identifier);
        let mut tok = Token::new(kind, self.loc(start), raw);
        if kind == TokenKind::KwTrue || kind == TokenKind::KwFalse {
            tok = tok.with_literal(LiteralValue::Bool(kind == TokenKind::KwTrue));
        }
        tok
    }

    /// Numeric literal scan: optional `0x` prefix selects hex;
    /// a literal is float iff it has a decimal point or an exponent
    /// (`e`/`E` decimal, `p`/`P` hex); sign characters inside an exponent
    /// belong to the literal.
    fn lex_number(&mut self, start: usize) -> Token {
        let is_hex = self.peek() == b'0' && (self.peek_at(1) == b'x' || self.peek_at(1) == b'X');
        if is_hex {
            self.pos += 2;
        }

        let mut is_float = false;
        let digit_ok = |b: u8, hex: bool| -> bool {
            if hex { b.is_ascii_hexdigit() } else { b.is_ascii_digit() }
        };

        while digit_ok(self.peek(), is_hex) {
            self.pos += 1;
        }

        if self.peek() == b'.' && (digit_ok(self.peek_at(1), is_hex) || !is_hex) {
            is_float = true;
            self.pos += 1;
            while digit_ok(self.peek(), is_hex) {
                self.pos += 1;
            }
        }

        let exp_marker = if is_hex { [b'p', b'P'] } else { [b'e', b'E'] };
        if self.peek() == exp_marker[0] || self.peek() == exp_marker[1] {
            let save = self.pos;
            self.pos += 1;
            if self.peek() == b'+' || self.peek() == b'-' {
                self.pos += 1;
            }
            if self.peek().is_ascii_digit() {
                is_float = true;
                while self.peek().is_ascii_digit() {
                    self.pos += 1;
                }
            } else {
                // Not actually an exponent (e.g. a bare trailing `e`
                // identifier char) — back out.
                self.pos = save;
            }
        }

        let raw = self.raw(start);
        let loc = self.loc(start);
        if is_float {
            let value = parse_float_literal(&raw);
            Token::new(TokenKind::FloatLiteral, loc, raw).with_literal(LiteralValue::Float(value))
        } else {
            let value = parse_int_literal(&raw);
            Token::new(TokenKind::IntLiteral, loc, raw).with_literal(LiteralValue::Int(value))
        }
    }

    /// String literals: no escape processing beyond termination on `"` or
    /// newline.
    fn lex_string(&mut self, start: usize, sink: &mut dyn DiagnosticSink) -> Token {
        self.pos += 1; // opening quote
        let content_start = self.pos;
        loop {
            match self.peek() {
                b'"' => {
                    let content = self.raw(content_start);
                    self.pos += 1;
                    let raw = self.raw(start);
                    let loc = self.loc(start);
                    return Token::new(TokenKind::StringLiteral, loc, raw)
                        .with_literal(LiteralValue::String(content));
                }
                0 | b'\n' => {
                    sink.error(&self.loc(start), "unterminated string literal");
                    let raw = self.raw(start);
                    let loc = self.loc(start);
                    return Token::new(TokenKind::Error, loc, raw);
                }
                _ => self.pos += 1,
            }
        }
    }

    /// Maximal-munch punctuation scan over the compound-operator table.
    fn lex_punctuation(&mut self, start: usize, sink: &mut dyn DiagnosticSink) -> Token {
        use TokenKind::*;

        macro_rules! tok {
            ($kind:expr, $len:expr) => {{
                self.pos += $len;
                return Token::new($kind, self.loc(start), self.raw(start));
            }};
        }

        let c0 = self.peek();
        let c1 = self.peek_at(1);
        let c2 = self.peek_at(2);

        match (c0, c1, c2) {
            (b'<', b'<', b'=') => tok!(ShlAssign, 3),
            (b'>', b'>', b'=') => tok!(ShrAssign, 3),
            (b'.', b'.', b'.') => tok!(Ellipsis, 3),
            _ => {}
        }

        match (c0, c1) {
            (b'<', b'=') => tok!(Le, 2),
            (b'>', b'=') => tok!(Ge, 2),
            (b'=', b'=') => tok!(Eq, 2),
            (b'!', b'=') => tok!(Ne, 2),
            (b'&', b'&') => tok!(AmpAmp, 2),
            (b'|', b'|') => tok!(PipePipe, 2),
            (b'<', b'<') => tok!(Shl, 2),
            (b'>', b'>') => tok!(Shr, 2),
            (b'+', b'+') => tok!(PlusPlus, 2),
            (b'-', b'-') => tok!(MinusMinus, 2),
            (b'+', b'=') => tok!(PlusAssign, 2),
            (b'-', b'=') => tok!(MinusAssign, 2),
            (b'*', b'=') => tok!(StarAssign, 2),
            (b'/', b'=') => tok!(SlashAssign, 2),
            (b'%', b'=') => tok!(PercentAssign, 2),
            (b'&', b'=') => tok!(AmpAssign, 2),
            (b'|', b'=') => tok!(PipeAssign, 2),
            (b'^', b'=') => tok!(CaretAssign, 2),
            (b'[', b'[') => tok!(AttrOpen, 2),
            (b']', b']') => tok!(AttrClose, 2),
            _ => {}
        }

        match c0 {
            b'(' => tok!(LParen, 1),
            b')' => tok!(RParen, 1),
            b'{' => tok!(LBrace, 1),
            b'}' => tok!(RBrace, 1),
            b'[' => tok!(LBracket, 1),
            b']' => tok!(RBracket, 1),
            b',' => tok!(Comma, 1),
            b';' => tok!(Semicolon, 1),
            b'.' => tok!(Dot, 1),
            b'+' => tok!(Plus, 1),
            b'-' => tok!(Minus, 1),
            b'*' => tok!(Star, 1),
            b'/' => tok!(Slash, 1),
            b'%' => tok!(Percent, 1),
            b'=' => tok!(Assign, 1),
            b'<' => tok!(Lt, 1),
            b'>' => tok!(Gt, 1),
            b'!' => tok!(Bang, 1),
            b'&' => tok!(Amp, 1),
            b'|' => tok!(Pipe, 1),
            b'^' => tok!(Caret, 1),
            b'~' => tok!(Tilde, 1),
            b'?' => tok!(Question, 1),
            b':' => tok!(Colon, 1),
            _ => {}
        }

        self.pos += 1;
        let loc = self.loc(start);
        sink.error(&loc, &format!("invalid character '{}'", c0 as char));
        Token::new(TokenKind::Error, loc, self.raw(start))
    }
}

/// Integer literals are parsed as unsigned .
pub fn parse_int_literal(raw: &str) -> u64 {
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).unwrap_or(0)
    } else {
        raw.parse::<u64>().unwrap_or(0)
    }
}

/// Float literals are parsed as IEEE-754 binary64 . Hex floats
/// (`0x1.8p3`) are not representable by `str::parse`, so they're decoded by
/// hand; decimal floats go through the standard parser.
pub fn parse_float_literal(raw: &str) -> f64 {
    if raw.starts_with("0x") || raw.starts_with("0X") {
        parse_hex_float(raw)
    } else {
        raw.parse::<f64>().unwrap_or(0.0)
    }
}

fn parse_hex_float(raw: &str) -> f64 {
    let body = &raw[2..];
    let (mantissa_str, exp_str) = match body.find(['p', 'P']) {
        Some(idx) => (&body[..idx], &body[idx + 1..]),
        None => (body, "0"),
    };
    let (int_part, frac_part) = match mantissa_str.find('.') {
        Some(idx) => (&mantissa_str[..idx], &mantissa_str[idx + 1..]),
        None => (mantissa_str, ""),
    };
    let mut mantissa = i64::from_str_radix(int_part, 16).unwrap_or(0) as f64;
    for (i, ch) in frac_part.chars().enumerate() {
        if let Some(d) = ch.to_digit(16) {
            mantissa += d as f64 / 16f64.powi(i as i32 + 1);
        }
    }
    let exp: i32 = exp_str.parse().unwrap_or(0);
    mantissa * 2f64.powi(exp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;

    fn lex(src: &str) -> Vec<Token> {
        let mut sink = CollectingSink::new();
        Lexer::new("test.osl", src).tokenize(&mut sink)
    }

    #[test]
    fn terminates_with_eof() {
        let toks = lex("int x = 1;");
        assert_eq!(toks.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn empty_input_is_just_eof() {
        let toks = lex("");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].kind, TokenKind::Eof);
    }

    #[test]
    fn keywords_are_retagged() {
        let toks = lex("color surface shader");
        assert_eq!(toks[0].kind, TokenKind::KwColor);
        assert_eq!(toks[1].kind, TokenKind::KwSurface);
        assert_eq!(toks[2].kind, TokenKind::KwShader);
    }

    #[test]
    fn logical_aliases() {
        let toks = lex("a and b or not c");
        assert_eq!(toks[1].kind, TokenKind::AmpAmp);
        assert_eq!(toks[3].kind, TokenKind::PipePipe);
        assert_eq!(toks[4].kind, TokenKind::Bang);
    }

    #[test]
    fn integer_literal_value() {
        let toks = lex("42");
        assert_eq!(toks[0].literal, Some(LiteralValue::Int(42)));
    }

    #[test]
    fn hex_integer_literal() {
        let toks = lex("0x2A");
        assert_eq!(toks[0].kind, TokenKind::IntLiteral);
        assert_eq!(toks[0].literal, Some(LiteralValue::Int(42)));
    }

    #[test]
    fn float_literal_with_decimal_point() {
        let toks = lex("3.25");
        assert_eq!(toks[0].kind, TokenKind::FloatLiteral);
        assert_eq!(toks[0].literal, Some(LiteralValue::Float(3.25)));
    }

    #[test]
    fn float_literal_with_exponent() {
        let toks = lex("1e3");
        assert_eq!(toks[0].kind, TokenKind::FloatLiteral);
        assert_eq!(toks[0].literal, Some(LiteralValue::Float(1000.0)));
    }

    #[test]
    fn signed_exponent_is_part_of_literal() {
        let toks = lex("1e-3");
        assert_eq!(toks.len(), 2); // literal + eof, not split on '-'
        assert_eq!(toks[0].kind, TokenKind::FloatLiteral);
        assert!((toks[0].literal.clone().unwrap() == LiteralValue::Float(0.001)));
    }

    #[test]
    fn string_literal_raw_text_matches_source() {
        let src = r#""hello world""#;
        let toks = lex(src);
        assert_eq!(toks[0].kind, TokenKind::StringLiteral);
        assert_eq!(&src[toks[0].loc.start as usize..toks[0].loc.end as usize], src);
        assert_eq!(toks[0].literal, Some(LiteralValue::String("hello world".to_string())));
    }

    #[test]
    fn unterminated_string_reports_error() {
        let mut sink = CollectingSink::new();
        let toks = Lexer::new("test.osl", "\"abc").tokenize(&mut sink);
        assert_eq!(toks[0].kind, TokenKind::Error);
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn unterminated_block_comment_reports_error() {
        let mut sink = CollectingSink::new();
        let _ = Lexer::new("test.osl", "/* never closed").tokenize(&mut sink);
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn line_comment_runs_to_newline() {
        let toks = lex("1 // comment\n2");
        assert_eq!(toks[0].kind, TokenKind::IntLiteral);
        assert_eq!(toks[1].kind, TokenKind::Newline);
        assert_eq!(toks[2].kind, TokenKind::IntLiteral);
    }

    #[test]
    fn maximal_munch_compound_operators() {
        let toks = lex("<<= >>= <= >= == != && || << >> ++ -- += -= *= /= %= &= |= ^= [[ ]] ...");
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        use TokenKind::*;
        assert_eq!(
            &kinds[..kinds.len() - 1],
            &[
                ShlAssign, ShrAssign, Le, Ge, Eq, Ne, AmpAmp, PipePipe, Shl, Shr, PlusPlus,
                MinusMinus, PlusAssign, MinusAssign, StarAssign, SlashAssign, PercentAssign,
                AmpAssign, PipeAssign, CaretAssign, AttrOpen, AttrClose, Ellipsis,
            ]
        );
    }

    #[test]
    fn invalid_byte_produces_error_token_and_continues() {
        let mut sink = CollectingSink::new();
        let toks = Lexer::new("test.osl", "1 @ 2").tokenize(&mut sink);
        assert_eq!(sink.error_count(), 1);
        assert_eq!(toks[0].kind, TokenKind::IntLiteral);
        assert_eq!(toks[2].kind, TokenKind::Error);
        assert_eq!(toks[4].kind, TokenKind::IntLiteral);
    }

    #[test]
    fn raw_text_matches_source_range_for_every_token() {
        let src = "float x = 1.5 + foo(2);";
        for tok in lex(src) {
            if tok.kind == TokenKind::Eof {
                continue;
            }
            assert_eq!(&src[tok.loc.start as usize..tok.loc.end as usize], tok.raw);
        }
    }
}
