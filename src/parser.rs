//! Recursive-descent / Pratt parser.
//!
//! A `Parser` struct (`tokens: Vec<Token>`, `pos: usize`, `check`/`advance`/
//! `consume` helpers) with a `#[cfg(test)] mod tests` convention of parsing
//! literal source strings and asserting on the resulting tree. This parser
//! never aborts on the first syntax error: a failure synthesizes an `Error`
//! node and parsing resumes at the next token.

use crate::ast::{
    ArrayDim, Arena, Attribute, BinOp, MetaDecl, NodeId, NodeKind, ParamDecl, PostfixOp, PrefixOp,
    Program, TypeSpec,
};
use crate::diagnostics::DiagnosticSink;
use crate::token::{SourceLocation, Token, TokenKind};
use crate::types::{PrimKind, ShaderKind};

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    arena: Arena,
    sink: &'a mut dyn DiagnosticSink,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, sink: &'a mut dyn DiagnosticSink) -> Self {
        // Newline tokens are only meaningful to a line-oriented lexer
        // consumer; a direct-grammar parser discards them.
        let tokens: Vec<Token> =
            tokens.into_iter().filter(|t| t.kind != TokenKind::Newline).collect();
        Parser { tokens, pos: 0, arena: Arena::new(), sink }
    }

    pub fn parse(mut self) -> Program {
        let mut decls = Vec::new();
        while !self.at_eof() {
            if let Some(id) = self.parse_top_level() {
                decls.push(id);
            }
        }
        for window in decls.windows(2) {
            self.arena.link(window[0], window[1]);
        }
        Program { arena: self.arena, decls }
    }

    // ---- token-stream helpers ----

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_n(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consumes `kind` or reports an `expected X, found Y` diagnostic and
    /// synchronizes by consuming the offending token.
    fn expect(&mut self, kind: TokenKind, what: &str) -> Token {
        if self.check(kind) {
            self.advance()
        } else {
            let tok = self.peek().clone();
            self.sink.error(&tok.loc, &format!("expected {}, found '{}'", what, tok.raw));
            if !self.at_eof() {
                self.advance();
            }
            tok
        }
    }

    fn error_node(&mut self) -> NodeId {
        let tok = self.advance();
        self.arena.alloc(NodeKind::Error, tok.loc)
    }

    fn is_primitive_type_start(&self) -> bool {
        use TokenKind::*;
        matches!(
            self.peek().kind,
            KwBool | KwInt | KwFloat | KwColor | KwPoint | KwVector | KwNormal | KwMatrix
                | KwString | KwVoid | KwClosure
        )
    }

    fn is_shader_kind_start(&self) -> bool {
        use TokenKind::*;
        matches!(self.peek().kind, KwShader | KwSurface | KwDisplacement | KwVolume)
    }

    // ---- top level ----

    fn parse_top_level(&mut self) -> Option<NodeId> {
        let attributes = self.parse_attributes_opt();

        if self.check(TokenKind::KwStruct) {
            return Some(self.parse_struct_decl());
        }
        if self.is_shader_kind_start() {
            return Some(self.parse_shader_decl(attributes));
        }
        if self.is_primitive_type_start() || self.check(TokenKind::Identifier) {
            return Some(self.parse_var_or_func_decl(attributes));
        }

        let tok = self.peek().clone();
        self.sink.error(&tok.loc, &format!("unexpected token '{}' at top level", tok.raw));
        Some(self.error_node())
    }

    /// `__attribute__((attr, attr(args), ...))`.
    fn parse_attributes_opt(&mut self) -> Vec<Attribute> {
        let mut attrs = Vec::new();
        while self.check(TokenKind::Identifier) && self.peek().raw == "__attribute__" {
            self.advance();
            self.expect(TokenKind::LParen, "'('");
            self.expect(TokenKind::LParen, "'('");
            if !self.check(TokenKind::RParen) {
                loop {
                    let name_tok = self.expect(TokenKind::Identifier, "attribute name");
                    let mut args = Vec::new();
                    if self.eat(TokenKind::LParen) {
                        if !self.check(TokenKind::RParen) {
                            loop {
                                args.push(self.parse_assignment());
                                if !self.eat(TokenKind::Comma) {
                                    break;
                                }
                            }
                        }
                        self.expect(TokenKind::RParen, "')'");
                    }
                    attrs.push(Attribute { name: name_tok.raw, args });
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "')'");
            self.expect(TokenKind::RParen, "')'");
        }
        attrs
    }

    fn parse_type_spec(&mut self) -> TypeSpec {
        use TokenKind::*;
        let prim = match self.peek().kind {
            KwBool => Some(PrimKind::Bool),
            KwInt => Some(PrimKind::Int),
            KwFloat => Some(PrimKind::Float),
            KwColor => Some(PrimKind::Color),
            KwPoint => Some(PrimKind::Point),
            KwVector => Some(PrimKind::Vector),
            KwNormal => Some(PrimKind::Normal),
            KwMatrix => Some(PrimKind::Matrix),
            KwString => Some(PrimKind::String),
            KwVoid => Some(PrimKind::Void),
            _ => None,
        };
        if let Some(p) = prim {
            self.advance();
            return TypeSpec::Prim(p);
        }
        if self.check(KwClosure) {
            self.advance();
            return TypeSpec::Closure(Box::new(self.parse_type_spec()));
        }
        if self.is_shader_kind_start() {
            let kind = self.shader_kind_from_tok();
            self.advance();
            return TypeSpec::Shader(kind);
        }
        let tok = self.expect(Identifier, "a type name");
        TypeSpec::Named(tok.raw)
    }

    fn shader_kind_from_tok(&self) -> ShaderKind {
        match self.peek().kind {
            TokenKind::KwShader => ShaderKind::Shader,
            TokenKind::KwSurface => ShaderKind::Surface,
            TokenKind::KwDisplacement => ShaderKind::Displacement,
            TokenKind::KwVolume => ShaderKind::Volume,
            _ => ShaderKind::Shader,
        }
    }

    /// Disambiguates a variable-group declaration from a function
    /// declaration by looking past the type and name for `(`.
    fn parse_var_or_func_decl(&mut self, attributes: Vec<Attribute>) -> NodeId {
        let loc = self.peek().loc.clone();
        let type_spec = self.parse_type_spec();
        let name_tok = self.expect(TokenKind::Identifier, "a declaration name");

        if self.check(TokenKind::LParen) {
            return self.parse_function_decl(type_spec, name_tok.raw, attributes, loc);
        }

        self.parse_variable_group(type_spec, name_tok.raw, attributes, loc)
    }

    fn parse_variable_group(
        &mut self,
        type_spec: TypeSpec,
        first_name: String,
        attributes: Vec<Attribute>,
        loc: SourceLocation,
    ) -> NodeId {
        let mut vars = vec![self.parse_one_variable(type_spec.clone(), first_name, attributes.clone())];
        while self.eat(TokenKind::Comma) {
            let name_tok = self.expect(TokenKind::Identifier, "a variable name");
            vars.push(self.parse_one_variable(type_spec.clone(), name_tok.raw, attributes.clone()));
        }
        self.expect(TokenKind::Semicolon, "';'");
        for w in vars.windows(2) {
            self.arena.link(w[0], w[1]);
        }
        self.arena.alloc(NodeKind::VariableGroup { type_spec, vars }, loc)
    }

    fn parse_one_variable(
        &mut self,
        type_spec: TypeSpec,
        name: String,
        attributes: Vec<Attribute>,
    ) -> NodeId {
        let loc = self.peek().loc.clone();
        let array_dim = self.parse_array_dim_opt();
        let init = if self.eat(TokenKind::Assign) { Some(self.parse_assignment()) } else { None };
        self.arena.alloc(NodeKind::Variable { type_spec, name, array_dim, init, attributes }, loc)
    }

    /// `None` means no `[...]` was written at all; `Some(Unsized)` is `[]`;
    /// `Some(Sized(_))` is `[expr]`. Keeping these three states distinct
    /// lets the checker tell "no array" apart from "unsized array", which
    /// is legal only in parameter position.
    fn parse_array_dim_opt(&mut self) -> Option<ArrayDim> {
        if self.eat(TokenKind::LBracket) {
            let dim = if self.check(TokenKind::RBracket) {
                ArrayDim::Unsized
            } else {
                ArrayDim::Sized(self.parse_assignment())
            };
            self.expect(TokenKind::RBracket, "']'");
            Some(dim)
        } else {
            None
        }
    }

    fn parse_function_decl(
        &mut self,
        ret: TypeSpec,
        name: String,
        attributes: Vec<Attribute>,
        loc: SourceLocation,
    ) -> NodeId {
        self.expect(TokenKind::LParen, "'('");
        let params = self.parse_params();
        self.expect(TokenKind::RParen, "')'");

        let body = if self.check(TokenKind::LBrace) {
            Some(self.parse_block())
        } else {
            self.expect(TokenKind::Semicolon, "';' or a function body");
            None
        };

        self.arena.alloc(NodeKind::Function { ret, name, params, body, attributes }, loc)
    }

    fn parse_params(&mut self) -> Vec<NodeId> {
        let mut params = Vec::new();
        if self.check(TokenKind::RParen) {
            return params;
        }
        loop {
            if self.eat(TokenKind::Ellipsis) {
                break;
            }
            params.push(self.parse_param());
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        for w in params.windows(2) {
            self.arena.link(w[0], w[1]);
        }
        params
    }

    fn parse_param(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        let is_output = self.eat(TokenKind::KwOutput);
        let type_spec = self.parse_type_spec();
        let name_tok = self.expect(TokenKind::Identifier, "a parameter name");
        let array_dim = self.parse_array_dim_opt();
        let default = if self.eat(TokenKind::Assign) { Some(self.parse_assignment()) } else { None };
        self.arena.alloc(
            NodeKind::Param(ParamDecl {
                name: name_tok.raw,
                type_spec,
                array_dim,
                is_output,
                default,
                loc: loc.clone(),
            }),
            loc,
        )
    }

    fn parse_shader_decl(&mut self, attributes: Vec<Attribute>) -> NodeId {
        let loc = self.peek().loc.clone();
        let kind = self.shader_kind_from_tok();
        self.advance();
        let name_tok = self.expect(TokenKind::Identifier, "a shader name");

        self.expect(TokenKind::LParen, "'('");
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                params.push(self.parse_param());
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'");
        for w in params.windows(2) {
            self.arena.link(w[0], w[1]);
        }

        let meta = self.parse_metadata_opt();
        let body = self.parse_block();

        self.arena.alloc(
            NodeKind::Shader { kind, name: name_tok.raw, params, meta, body, attributes },
            loc,
        )
    }

    fn parse_metadata_opt(&mut self) -> Vec<NodeId> {
        let mut metas = Vec::new();
        if self.eat(TokenKind::AttrOpen) {
            if !self.check(TokenKind::AttrClose) {
                loop {
                    let loc = self.peek().loc.clone();
                    let _type_spec = self.parse_type_spec();
                    let name_tok = self.expect(TokenKind::Identifier, "a metadata name");
                    self.expect(TokenKind::Assign, "'='");
                    let value = self.parse_assignment();
                    metas.push(
                        self.arena
                            .alloc(NodeKind::Metadatum(MetaDecl { name: name_tok.raw, value }), loc),
                    );
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::AttrClose, "']]'");
        }
        for w in metas.windows(2) {
            self.arena.link(w[0], w[1]);
        }
        metas
    }

    fn parse_struct_decl(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        self.advance(); // 'struct'
        let name_tok = self.expect(TokenKind::Identifier, "a struct name");
        self.expect(TokenKind::LBrace, "'{'");
        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_eof() {
            let field_loc = self.peek().loc.clone();
            let type_spec = self.parse_type_spec();
            let field_name = self.expect(TokenKind::Identifier, "a field name").raw;
            let array_dim = self.parse_array_dim_opt();
            self.expect(TokenKind::Semicolon, "';'");
            fields.push(self.arena.alloc(
                NodeKind::Variable {
                    type_spec,
                    name: field_name,
                    array_dim,
                    init: None,
                    attributes: vec![],
                },
                field_loc,
            ));
        }
        self.expect(TokenKind::RBrace, "'}'");
        self.expect(TokenKind::Semicolon, "';'");
        for w in fields.windows(2) {
            self.arena.link(w[0], w[1]);
        }
        self.arena.alloc(NodeKind::StructDecl { name: name_tok.raw, fields }, loc)
    }

    // ---- statements ----

    fn parse_block(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        self.expect(TokenKind::LBrace, "'{'");
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.at_eof() {
            stmts.push(self.parse_statement());
        }
        self.expect(TokenKind::RBrace, "'}'");
        self.arena.alloc(NodeKind::Block(stmts), loc)
    }

    fn parse_statement(&mut self) -> NodeId {
        use TokenKind::*;
        let loc = self.peek().loc.clone();
        match self.peek().kind {
            LBrace => self.parse_block(),
            Semicolon => {
                self.advance();
                self.arena.alloc(NodeKind::Empty, loc)
            }
            KwIf => self.parse_if(),
            KwWhile => self.parse_while(),
            KwDo => self.parse_do_while(),
            KwFor => self.parse_for(),
            KwBreak => {
                self.advance();
                self.expect(Semicolon, "';'");
                self.arena.alloc(NodeKind::Break, loc)
            }
            KwContinue => {
                self.advance();
                self.expect(Semicolon, "';'");
                self.arena.alloc(NodeKind::Continue, loc)
            }
            KwReturn => {
                self.advance();
                let value = if self.check(Semicolon) { None } else { Some(self.parse_expression()) };
                self.expect(Semicolon, "';'");
                self.arena.alloc(NodeKind::Return(value), loc)
            }
            KwOutput => {
                // `output` only has meaning inside a parameter list; seeing
                // it here means the user wrote it on a local variable.
                self.sink.error(&loc, "'output' is only meaningful on a parameter");
                self.advance();
                self.parse_statement()
            }
            _ if self.starts_declaration() => self.parse_local_decl(),
            _ => {
                let expr = self.parse_expression();
                self.expect(Semicolon, "';'");
                self.arena.alloc(NodeKind::ExprStmt(expr), loc)
            }
        }
    }

    /// Distinguishes a declaration-statement from an expression-statement:
    /// a primitive-type keyword, `closure`, a shader-kind keyword, or
    /// `identifier identifier` (a named-struct-typed local).
    fn starts_declaration(&self) -> bool {
        if self.is_primitive_type_start() {
            return true;
        }
        if self.check(TokenKind::Identifier) && self.peek_n(1).kind == TokenKind::Identifier {
            return true;
        }
        false
    }

    fn parse_local_decl(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        let type_spec = self.parse_type_spec();
        let name_tok = self.expect(TokenKind::Identifier, "a variable name");
        self.parse_variable_group(type_spec, name_tok.raw, Vec::new(), loc)
    }

    fn parse_if(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        self.advance();
        self.expect(TokenKind::LParen, "'('");
        let cond = self.parse_expression();
        self.expect(TokenKind::RParen, "')'");
        let then_branch = self.parse_statement();
        let else_branch = if self.eat(TokenKind::KwElse) { Some(self.parse_statement()) } else { None };
        self.arena.alloc(NodeKind::If { cond, then_branch, else_branch }, loc)
    }

    fn parse_while(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        self.advance();
        self.expect(TokenKind::LParen, "'('");
        let cond = self.parse_expression();
        self.expect(TokenKind::RParen, "')'");
        let body = self.parse_statement();
        self.arena.alloc(NodeKind::While { cond, body }, loc)
    }

    fn parse_do_while(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        self.advance();
        let body = self.parse_statement();
        self.expect(TokenKind::KwWhile, "'while'");
        self.expect(TokenKind::LParen, "'('");
        let cond = self.parse_expression();
        self.expect(TokenKind::RParen, "')'");
        self.expect(TokenKind::Semicolon, "';'");
        self.arena.alloc(NodeKind::DoWhile { body, cond }, loc)
    }

    fn parse_for(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        self.advance();
        self.expect(TokenKind::LParen, "'('");

        let init = if self.check(TokenKind::Semicolon) {
            self.advance();
            None
        } else if self.starts_declaration() {
            Some(self.parse_local_decl())
        } else {
            let e = self.parse_expression();
            self.expect(TokenKind::Semicolon, "';'");
            Some(self.arena.alloc(NodeKind::ExprStmt(e), loc.clone()))
        };

        let cond = if self.check(TokenKind::Semicolon) { None } else { Some(self.parse_expression()) };
        self.expect(TokenKind::Semicolon, "';'");

        let step = if self.check(TokenKind::RParen) { None } else { Some(self.parse_expression()) };
        self.expect(TokenKind::RParen, "')'");

        let body = self.parse_statement();
        self.arena.alloc(NodeKind::For { init, cond, step, body }, loc)
    }

    // ---- expressions: Pratt / precedence climbing ----
    // Precedence table, tightest first:
    //   1 mul/div/mod, 2 add/sub, 3 shift, 4 relational/equality,
    //   5 bit-and, 6 bit-xor, 7 bit-or, 8 logical-and, 9 logical-or,
    //   10 assignment (right-assoc). Ternary sits between logical-or and
    //   assignment: it is parsed as the operand of assignment, i.e. binds
    //   tighter than assignment but looser than `||`.

    pub fn parse_expression(&mut self) -> NodeId {
        self.parse_comma()
    }

    fn parse_comma(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        let first = self.parse_assignment();
        if !self.check(TokenKind::Comma) {
            return first;
        }
        let mut items = vec![first];
        while self.eat(TokenKind::Comma) {
            items.push(self.parse_assignment());
        }
        self.arena.alloc(NodeKind::Comma(items), loc)
    }

    fn parse_assignment(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        let lhs = self.parse_ternary();
        let op = match self.peek().kind {
            TokenKind::Assign => BinOp::Assign,
            TokenKind::PlusAssign => BinOp::AddAssign,
            TokenKind::MinusAssign => BinOp::SubAssign,
            TokenKind::StarAssign => BinOp::MulAssign,
            TokenKind::SlashAssign => BinOp::DivAssign,
            TokenKind::PercentAssign => BinOp::ModAssign,
            TokenKind::AmpAssign => BinOp::AndAssign,
            TokenKind::PipeAssign => BinOp::OrAssign,
            TokenKind::CaretAssign => BinOp::XorAssign,
            TokenKind::ShlAssign => BinOp::ShlAssign,
            TokenKind::ShrAssign => BinOp::ShrAssign,
            _ => return lhs,
        };
        self.advance();
        // Right-associative: the RHS is itself a full assignment-expr.
        let rhs = self.parse_assignment();
        self.arena.alloc(NodeKind::Binary { op, lhs, rhs }, loc)
    }

    fn parse_ternary(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        let cond = self.parse_logical_or();
        if !self.eat(TokenKind::Question) {
            return cond;
        }
        let then_branch = self.parse_assignment();
        self.expect(TokenKind::Colon, "':'");
        let else_branch = self.parse_ternary();
        self.arena.alloc(NodeKind::Ternary { cond, then_branch, else_branch }, loc)
    }

    fn parse_logical_or(&mut self) -> NodeId {
        let mut lhs = self.parse_logical_and();
        while self.check(TokenKind::PipePipe) {
            let loc = self.peek().loc.clone();
            self.advance();
            let rhs = self.parse_logical_and();
            lhs = self.arena.alloc(NodeKind::Binary { op: BinOp::Or, lhs, rhs }, loc);
        }
        lhs
    }

    fn parse_logical_and(&mut self) -> NodeId {
        let mut lhs = self.parse_bit_or();
        while self.check(TokenKind::AmpAmp) {
            let loc = self.peek().loc.clone();
            self.advance();
            let rhs = self.parse_bit_or();
            lhs = self.arena.alloc(NodeKind::Binary { op: BinOp::And, lhs, rhs }, loc);
        }
        lhs
    }

    fn parse_bit_or(&mut self) -> NodeId {
        let mut lhs = self.parse_bit_xor();
        while self.check(TokenKind::Pipe) {
            let loc = self.peek().loc.clone();
            self.advance();
            let rhs = self.parse_bit_xor();
            lhs = self.arena.alloc(NodeKind::Binary { op: BinOp::BitOr, lhs, rhs }, loc);
        }
        lhs
    }

    fn parse_bit_xor(&mut self) -> NodeId {
        let mut lhs = self.parse_bit_and();
        while self.check(TokenKind::Caret) {
            let loc = self.peek().loc.clone();
            self.advance();
            let rhs = self.parse_bit_and();
            lhs = self.arena.alloc(NodeKind::Binary { op: BinOp::BitXor, lhs, rhs }, loc);
        }
        lhs
    }

    fn parse_bit_and(&mut self) -> NodeId {
        let mut lhs = self.parse_equality();
        while self.check(TokenKind::Amp) {
            let loc = self.peek().loc.clone();
            self.advance();
            let rhs = self.parse_equality();
            lhs = self.arena.alloc(NodeKind::Binary { op: BinOp::BitAnd, lhs, rhs }, loc);
        }
        lhs
    }

    fn parse_equality(&mut self) -> NodeId {
        let mut lhs = self.parse_relational();
        loop {
            let op = match self.peek().kind {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::Ne => BinOp::Ne,
                _ => break,
            };
            let loc = self.peek().loc.clone();
            self.advance();
            let rhs = self.parse_relational();
            lhs = self.arena.alloc(NodeKind::Binary { op, lhs, rhs }, loc);
        }
        lhs
    }

    fn parse_relational(&mut self) -> NodeId {
        let mut lhs = self.parse_shift();
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            let loc = self.peek().loc.clone();
            self.advance();
            let rhs = self.parse_shift();
            lhs = self.arena.alloc(NodeKind::Binary { op, lhs, rhs }, loc);
        }
        lhs
    }

    fn parse_shift(&mut self) -> NodeId {
        let mut lhs = self.parse_additive();
        loop {
            let op = match self.peek().kind {
                TokenKind::Shl => BinOp::Shl,
                TokenKind::Shr => BinOp::Shr,
                _ => break,
            };
            let loc = self.peek().loc.clone();
            self.advance();
            let rhs = self.parse_additive();
            lhs = self.arena.alloc(NodeKind::Binary { op, lhs, rhs }, loc);
        }
        lhs
    }

    fn parse_additive(&mut self) -> NodeId {
        let mut lhs = self.parse_multiplicative();
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let loc = self.peek().loc.clone();
            self.advance();
            let rhs = self.parse_multiplicative();
            lhs = self.arena.alloc(NodeKind::Binary { op, lhs, rhs }, loc);
        }
        lhs
    }

    fn parse_multiplicative(&mut self) -> NodeId {
        let mut lhs = self.parse_unary();
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            let loc = self.peek().loc.clone();
            self.advance();
            let rhs = self.parse_unary();
            lhs = self.arena.alloc(NodeKind::Binary { op, lhs, rhs }, loc);
        }
        lhs
    }

    fn parse_unary(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        let op = match self.peek().kind {
            TokenKind::Bang => Some(PrefixOp::Not),
            TokenKind::Minus => Some(PrefixOp::Neg),
            TokenKind::Tilde => Some(PrefixOp::BitCompl),
            TokenKind::PlusPlus => Some(PrefixOp::PreInc),
            TokenKind::MinusMinus => Some(PrefixOp::PreDec),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary();
            return self.arena.alloc(NodeKind::Unary { op, operand }, loc);
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> NodeId {
        let mut expr = self.parse_primary();
        loop {
            let loc = self.peek().loc.clone();
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let field_tok = self.expect(TokenKind::Identifier, "a field name");
                    expr = self.arena.alloc(
                        NodeKind::Projection { base: expr, field: field_tok.raw, field_index: None },
                        loc,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let mut indices = vec![self.parse_expression()];
                    self.expect(TokenKind::RBracket, "']'");
                    while self.eat(TokenKind::LBracket) {
                        indices.push(self.parse_expression());
                        self.expect(TokenKind::RBracket, "']'");
                    }
                    expr = self.arena.alloc(NodeKind::Index { base: expr, indices }, loc);
                }
                TokenKind::PlusPlus => {
                    self.advance();
                    expr =
                        self.arena.alloc(NodeKind::Postfix { op: PostfixOp::PostInc, operand: expr }, loc);
                }
                TokenKind::MinusMinus => {
                    self.advance();
                    expr =
                        self.arena.alloc(NodeKind::Postfix { op: PostfixOp::PostDec, operand: expr }, loc);
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_primary(&mut self) -> NodeId {
        use TokenKind::*;
        let loc = self.peek().loc.clone();

        match self.peek().kind {
            IntLiteral => {
                let tok = self.advance();
                let v = match tok.literal {
                    Some(crate::token::LiteralValue::Int(v)) => v,
                    _ => 0,
                };
                self.arena.alloc(NodeKind::IntLit(v), loc)
            }
            FloatLiteral => {
                let tok = self.advance();
                let v = match tok.literal {
                    Some(crate::token::LiteralValue::Float(v)) => v,
                    _ => 0.0,
                };
                self.arena.alloc(NodeKind::FloatLit(v), loc)
            }
            KwTrue | KwFalse => {
                let tok = self.advance();
                self.arena.alloc(NodeKind::BoolLit(tok.kind == KwTrue), loc)
            }
            StringLiteral => self.parse_string_concat(),
            LBrace => self.parse_brace_init(),
            LParen => self.parse_paren_or_cast(),
            _ if self.is_primitive_type_start() => self.parse_constructor(),
            Identifier => self.parse_ident_or_call(),
            _ => {
                let tok = self.peek().clone();
                self.sink.error(&tok.loc, &format!("unexpected token '{}' in expression", tok.raw));
                self.error_node()
            }
        }
    }

    /// Adjacent string literals concatenate at the parser level (C-style).
    fn parse_string_concat(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        let mut combined = String::new();
        while self.check(TokenKind::StringLiteral) {
            let tok = self.advance();
            if let Some(crate::token::LiteralValue::String(s)) = tok.literal {
                combined.push_str(&s);
            }
        }
        self.arena.alloc(NodeKind::StringLit(combined), loc)
    }

    fn parse_brace_init(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        self.advance();
        let mut items = Vec::new();
        if !self.check(TokenKind::RBrace) {
            loop {
                items.push(self.parse_assignment());
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "'}'");
        self.arena.alloc(NodeKind::BraceInit(items), loc)
    }

    /// A parenthesised prefix whose first token is a primitive-type
    /// keyword immediately followed by `)` is a cast; otherwise it's a
    /// parenthesised (possibly comma-compound) expression.
    fn parse_paren_or_cast(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        self.advance(); // '('

        if self.is_primitive_type_start() && self.peek_n(1).kind == TokenKind::RParen {
            let type_spec = self.parse_type_spec();
            self.expect(TokenKind::RParen, "')'");
            let operand = self.parse_unary();
            return self.arena.alloc(NodeKind::Cast { type_spec, operand }, loc);
        }

        let inner = self.parse_comma();
        self.expect(TokenKind::RParen, "')'");
        match &self.arena.get(inner).kind {
            NodeKind::Comma(_) => inner,
            _ => self.arena.alloc(NodeKind::Paren(inner), loc),
        }
    }

    fn parse_constructor(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        let type_spec = self.parse_type_spec();
        self.expect(TokenKind::LParen, "'('");
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_assignment());
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'");
        self.arena.alloc(NodeKind::Constructor { type_spec, args }, loc)
    }

    fn parse_ident_or_call(&mut self) -> NodeId {
        let loc = self.peek().loc.clone();
        let name_tok = self.advance();
        if self.eat(TokenKind::LParen) {
            let mut args = Vec::new();
            if !self.check(TokenKind::RParen) {
                loop {
                    args.push(self.parse_assignment());
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "')'");
            return self.arena.alloc(NodeKind::Call { callee: name_tok.raw, args }, loc);
        }
        self.arena.alloc(NodeKind::Ident { name: name_tok.raw, symbol: None }, loc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> (Program, CollectingSink) {
        let mut sink = CollectingSink::new();
        let tokens = Lexer::new("test.osl", src).tokenize(&mut sink);
        let program = Parser::new(tokens, &mut sink).parse();
        (program, sink)
    }

    #[test]
    fn parses_simple_variable_group() {
        let (program, sink) = parse("int a = 1;");
        assert_eq!(sink.error_count(), 0);
        assert_eq!(program.decls.len(), 1);
        match &program.arena.get(program.decls[0]).kind {
            NodeKind::VariableGroup { vars, .. } => assert_eq!(vars.len(), 1),
            other => panic!("expected VariableGroup, got {:?}", other),
        }
    }

    #[test]
    fn parses_multi_variable_group() {
        let (program, sink) = parse("float a, b = 2.0, c;");
        assert_eq!(sink.error_count(), 0);
        match &program.arena.get(program.decls[0]).kind {
            NodeKind::VariableGroup { vars, .. } => assert_eq!(vars.len(), 3),
            other => panic!("expected VariableGroup, got {:?}", other),
        }
    }

    #[test]
    fn parses_function_with_body() {
        let (program, sink) = parse("float f(float x) { return x; }");
        assert_eq!(sink.error_count(), 0);
        match &program.arena.get(program.decls[0]).kind {
            NodeKind::Function { params, body, .. } => {
                assert_eq!(params.len(), 1);
                assert!(body.is_some());
            }
            other => panic!("expected Function, got {:?}", other),
        }
    }

    #[test]
    fn parses_builtin_function_declaration_without_body() {
        let (program, sink) = parse("float sin(float x);");
        assert_eq!(sink.error_count(), 0);
        match &program.arena.get(program.decls[0]).kind {
            NodeKind::Function { body, .. } => assert!(body.is_none()),
            other => panic!("expected Function, got {:?}", other),
        }
    }

    #[test]
    fn parses_struct_decl() {
        let (program, sink) = parse("struct Pair { float x; float y; };");
        assert_eq!(sink.error_count(), 0);
        match &program.arena.get(program.decls[0]).kind {
            NodeKind::StructDecl { fields, .. } => assert_eq!(fields.len(), 2),
            other => panic!("expected StructDecl, got {:?}", other),
        }
    }

    #[test]
    fn parses_shader_decl_with_metadata() {
        let (program, sink) =
            parse(r#"surface test(float Kd = 0.5 [[ string help = "diffuse weight" ]]) { }"#);
        assert_eq!(sink.error_count(), 0);
        match &program.arena.get(program.decls[0]).kind {
            NodeKind::Shader { params, .. } => assert_eq!(params.len(), 1),
            other => panic!("expected Shader, got {:?}", other),
        }
    }

    #[test]
    fn cast_vs_parenthesised_expression() {
        let (program, sink) = parse("float a = (float) 1; float b = (1 + 2) * 3;");
        assert_eq!(sink.error_count(), 0);
        let get_init = |idx: usize| -> NodeId {
            match &program.arena.get(program.decls[idx]).kind {
                NodeKind::VariableGroup { vars, .. } => match &program.arena.get(vars[0]).kind {
                    NodeKind::Variable { init, .. } => init.unwrap(),
                    _ => unreachable!(),
                },
                _ => unreachable!(),
            }
        };
        match &program.arena.get(get_init(0)).kind {
            NodeKind::Cast { .. } => {}
            other => panic!("expected Cast, got {:?}", other),
        }
        match &program.arena.get(get_init(1)).kind {
            NodeKind::Binary { op: BinOp::Mul, .. } => {}
            other => panic!("expected Binary Mul, got {:?}", other),
        }
    }

    #[test]
    fn ternary_binds_tighter_than_assignment() {
        let (_program, sink) = parse("int a = 1; int b = a > 0 ? 1 : -1;");
        assert_eq!(sink.error_count(), 0);
    }

    #[test]
    fn constructor_and_projection() {
        let (program, sink) = parse("color c = color(1.0, 2.0, 3.0); float r = c.r;");
        assert_eq!(sink.error_count(), 0);
        match &program.arena.get(program.decls[1]).kind {
            NodeKind::VariableGroup { vars, .. } => match &program.arena.get(vars[0]).kind {
                NodeKind::Variable { init: Some(init), .. } => match &program.arena.get(*init).kind {
                    NodeKind::Projection { field, .. } => assert_eq!(field, "r"),
                    other => panic!("expected Projection, got {:?}", other),
                },
                other => panic!("unexpected variable shape: {:?}", other),
            },
            other => panic!("expected VariableGroup, got {:?}", other),
        }
    }

    #[test]
    fn recovers_from_syntax_error_and_keeps_parsing() {
        let (program, sink) = parse("@ int a = 1;");
        assert!(sink.error_count() >= 1);
        assert!(!program.decls.is_empty());
    }

    #[test]
    fn parses_every_top_level_decl() {
        let src = "int a = 1; float b = 2.0; struct S { int x; };";
        let (program, sink) = parse(src);
        assert_eq!(sink.error_count(), 0);
        assert_eq!(program.decls.len(), 3);
    }

    #[test]
    fn for_loop_and_while_loop_parse() {
        let (_program, sink) =
            parse("void f() { for (int i = 0; i < 10; i++) { } while (true) { break; } }");
        assert_eq!(sink.error_count(), 0);
    }

    #[test]
    fn ellipsis_parameter_list() {
        let (program, sink) = parse("void printf(string fmt, ...);");
        assert_eq!(sink.error_count(), 0);
        match &program.arena.get(program.decls[0]).kind {
            NodeKind::Function { params, .. } => assert_eq!(params.len(), 1),
            other => panic!("expected Function, got {:?}", other),
        }
    }

    #[test]
    fn unsized_array_parameter() {
        let (program, sink) = parse("void f(output float x[]) { }");
        assert_eq!(sink.error_count(), 0);
        match &program.arena.get(program.decls[0]).kind {
            NodeKind::Function { params, .. } => match &program.arena.get(params[0]).kind {
                NodeKind::Param(p) => {
                    assert!(p.is_output);
                    assert_eq!(p.array_dim, Some(ArrayDim::Unsized));
                }
                other => panic!("expected Param, got {:?}", other),
            },
            other => panic!("expected Function, got {:?}", other),
        }
    }
}
