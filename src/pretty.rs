//! Diagnostic-only pretty-printer for the program tree.
//!
//! Not round-trip-precise: binary expressions are re-parenthesised around
//! every operator rather than only where precedence demands it, the way a
//! debug dump would rather than a formatter would. Hand-rolled with a
//! single `Display`/`fmt`-style implementation per structural type rather
//! than pulling in a pretty-printing crate.

use crate::ast::{ArrayDim, Arena, BinOp, NodeId, NodeKind, PostfixOp, PrefixOp, TypeSpec};
use std::fmt::Write as _;

mod sgr {
    pub const RESET: &str = "\x1b[0m";
    pub const KEYWORD: &str = "\x1b[35m";
    pub const TYPE: &str = "\x1b[36m";
    pub const LITERAL: &str = "\x1b[33m";
    pub const COMMENT: &str = "\x1b[2m";
}

/// Renders `decls` as OSL-like source text. `colors` toggles ANSI SGR
/// wrapping around keywords, types, and literals.
pub fn pretty_print(arena: &Arena, decls: &[NodeId], colors: bool) -> String {
    let mut p = Printer { arena, colors, out: String::new(), indent: 0 };
    for &id in decls {
        p.print_decl(id);
        p.out.push('\n');
    }
    p.out
}

struct Printer<'a> {
    arena: &'a Arena,
    colors: bool,
    out: String,
    indent: usize,
}

impl<'a> Printer<'a> {
    fn kw(&mut self, text: &str) {
        if self.colors {
            let _ = write!(self.out, "{}{}{}", sgr::KEYWORD, text, sgr::RESET);
        } else {
            self.out.push_str(text);
        }
    }

    fn ty(&mut self, text: &str) {
        if self.colors {
            let _ = write!(self.out, "{}{}{}", sgr::TYPE, text, sgr::RESET);
        } else {
            self.out.push_str(text);
        }
    }

    fn lit(&mut self, text: &str) {
        if self.colors {
            let _ = write!(self.out, "{}{}{}", sgr::LITERAL, text, sgr::RESET);
        } else {
            self.out.push_str(text);
        }
    }

    fn newline_indent(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    fn print_type_spec(&mut self, spec: &TypeSpec) {
        match spec {
            TypeSpec::Prim(p) => self.ty(p.name()),
            TypeSpec::Shader(k) => self.ty(k.name()),
            TypeSpec::Named(name) => self.ty(name),
            TypeSpec::Closure(inner) => {
                self.kw("closure ");
                self.print_type_spec(inner);
            }
        }
    }

    fn print_decl(&mut self, id: NodeId) {
        let kind = self.arena.get(id).kind.clone();
        match kind {
            NodeKind::StructDecl { name, fields } => {
                self.kw("struct ");
                self.out.push_str(&name);
                self.out.push_str(" {");
                self.indent += 1;
                for f in fields {
                    self.newline_indent();
                    self.print_variable(f);
                    self.out.push(';');
                }
                self.indent -= 1;
                self.newline_indent();
                self.out.push_str("};");
            }
            NodeKind::Function { ret, name, params, body, attributes } => {
                self.print_attributes(&attributes);
                self.print_type_spec(&ret);
                self.out.push(' ');
                self.out.push_str(&name);
                self.print_param_list(&params);
                match body {
                    Some(b) => {
                        self.out.push(' ');
                        self.print_stmt(b);
                    }
                    None => self.out.push(';'),
                }
            }
            NodeKind::Shader { kind, name, params, meta, body, attributes } => {
                self.print_attributes(&attributes);
                self.kw(kind.name());
                self.out.push(' ');
                self.out.push_str(&name);
                self.print_param_list(&params);
                if !meta.is_empty() {
                    self.out.push_str(" [[");
                    for (i, &mid) in meta.iter().enumerate() {
                        if i > 0 {
                            self.out.push_str(", ");
                        }
                        if let NodeKind::Metadatum(m) = self.arena.get(mid).kind.clone() {
                            self.out.push_str(&m.name);
                            self.out.push('=');
                            self.print_expr(m.value);
                        }
                    }
                    self.out.push_str("]]");
                }
                self.out.push(' ');
                self.print_stmt(body);
            }
            NodeKind::VariableGroup { type_spec, vars } => {
                self.print_type_spec(&type_spec);
                self.out.push(' ');
                for (i, &v) in vars.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.print_variable_tail(v);
                }
                self.out.push(';');
            }
            NodeKind::Error => self.out.push_str("<error>"),
            _ => self.out.push_str("<?>"),
        }
    }

    fn print_attributes(&mut self, attrs: &[crate::ast::Attribute]) {
        if attrs.is_empty() {
            return;
        }
        for a in attrs {
            self.out.push_str("__attribute__((");
            self.out.push_str(&a.name);
            self.out.push_str(")) ");
        }
    }

    fn print_param_list(&mut self, params: &[NodeId]) {
        self.out.push('(');
        for (i, &p) in params.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            if let NodeKind::Param(pd) = self.arena.get(p).kind.clone() {
                if pd.name == "..." {
                    self.out.push_str("...");
                    continue;
                }
                if pd.is_output {
                    self.kw("output ");
                }
                self.print_type_spec(&pd.type_spec);
                self.out.push(' ');
                self.out.push_str(&pd.name);
                match pd.array_dim {
                    Some(ArrayDim::Sized(dim)) => {
                        self.out.push('[');
                        self.print_expr(dim);
                        self.out.push(']');
                    }
                    Some(ArrayDim::Unsized) => self.out.push_str("[]"),
                    None => {}
                }
                if let Some(default) = pd.default {
                    self.out.push_str(" = ");
                    self.print_expr(default);
                }
            }
        }
        self.out.push(')');
    }

    fn print_variable(&mut self, id: NodeId) {
        if let NodeKind::Variable { type_spec, .. } = self.arena.get(id).kind.clone() {
            self.print_type_spec(&type_spec);
            self.out.push(' ');
            self.print_variable_tail(id);
        }
    }

    fn print_variable_tail(&mut self, id: NodeId) {
        if let NodeKind::Variable { name, array_dim, init, .. } = self.arena.get(id).kind.clone() {
            self.out.push_str(&name);
            match array_dim {
                Some(ArrayDim::Sized(dim)) => {
                    self.out.push('[');
                    self.print_expr(dim);
                    self.out.push(']');
                }
                Some(ArrayDim::Unsized) => self.out.push_str("[]"),
                None => {}
            }
            if let Some(init) = init {
                self.out.push_str(" = ");
                self.print_expr(init);
            }
        }
    }

    fn print_stmt(&mut self, id: NodeId) {
        let kind = self.arena.get(id).kind.clone();
        match kind {
            NodeKind::Block(stmts) => {
                self.out.push('{');
                self.indent += 1;
                for s in stmts {
                    self.newline_indent();
                    self.print_stmt(s);
                }
                self.indent -= 1;
                self.newline_indent();
                self.out.push('}');
            }
            NodeKind::VariableGroup { type_spec, vars } => {
                self.print_type_spec(&type_spec);
                self.out.push(' ');
                for (i, &v) in vars.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.print_variable_tail(v);
                }
                self.out.push(';');
            }
            NodeKind::If { cond, then_branch, else_branch } => {
                self.kw("if ");
                self.out.push('(');
                self.print_expr(cond);
                self.out.push_str(") ");
                self.print_stmt(then_branch);
                if let Some(e) = else_branch {
                    self.out.push(' ');
                    self.kw("else ");
                    self.print_stmt(e);
                }
            }
            NodeKind::While { cond, body } => {
                self.kw("while ");
                self.out.push('(');
                self.print_expr(cond);
                self.out.push_str(") ");
                self.print_stmt(body);
            }
            NodeKind::DoWhile { body, cond } => {
                self.kw("do ");
                self.print_stmt(body);
                self.kw(" while ");
                self.out.push('(');
                self.print_expr(cond);
                self.out.push_str(");");
            }
            NodeKind::For { init, cond, step, body } => {
                self.kw("for ");
                self.out.push('(');
                if let Some(i) = init {
                    self.print_stmt(i);
                } else {
                    self.out.push(';');
                }
                self.out.push(' ');
                if let Some(c) = cond {
                    self.print_expr(c);
                }
                self.out.push_str("; ");
                if let Some(s) = step {
                    self.print_expr(s);
                }
                self.out.push_str(") ");
                self.print_stmt(body);
            }
            NodeKind::Break => {
                self.kw("break");
                self.out.push(';');
            }
            NodeKind::Continue => {
                self.kw("continue");
                self.out.push(';');
            }
            NodeKind::Return(value) => {
                self.kw("return");
                if let Some(v) = value {
                    self.out.push(' ');
                    self.print_expr(v);
                }
                self.out.push(';');
            }
            NodeKind::Empty => self.out.push(';'),
            NodeKind::ExprStmt(e) => {
                self.print_expr(e);
                self.out.push(';');
            }
            NodeKind::Error => self.out.push_str("<error>;"),
            other => self.print_decl_fallback(id, &other),
        }
    }

    fn print_decl_fallback(&mut self, id: NodeId, _kind: &NodeKind) {
        self.print_decl(id);
    }

    /// Every binary operand is parenthesised unconditionally — this is a
    /// debug aid, not a formatter, so faithfulness to precedence matters
    /// more than minimal punctuation.
    fn print_expr(&mut self, id: NodeId) {
        let kind = self.arena.get(id).kind.clone();
        match kind {
            NodeKind::BoolLit(b) => self.lit(if b { "true" } else { "false" }),
            NodeKind::IntLit(v) => self.lit(&v.to_string()),
            NodeKind::FloatLit(v) => self.lit(&format!("{:?}", v)),
            NodeKind::StringLit(s) => self.lit(&format!("{:?}", s)),
            NodeKind::Ident { name, .. } => self.out.push_str(&name),
            NodeKind::Binary { op, lhs, rhs } => {
                self.out.push('(');
                self.print_expr(lhs);
                self.out.push(' ');
                self.out.push_str(bin_op_text(op));
                self.out.push(' ');
                self.print_expr(rhs);
                self.out.push(')');
            }
            NodeKind::Unary { op, operand } => {
                self.out.push_str(prefix_op_text(op));
                self.print_expr(operand);
            }
            NodeKind::Postfix { op, operand } => {
                self.print_expr(operand);
                self.out.push_str(postfix_op_text(op));
            }
            NodeKind::Call { callee, args } => {
                self.out.push_str(&callee);
                self.print_arg_list(&args);
            }
            NodeKind::Constructor { type_spec, args } => {
                self.print_type_spec(&type_spec);
                self.print_arg_list(&args);
            }
            NodeKind::Paren(inner) => {
                self.out.push('(');
                self.print_expr(inner);
                self.out.push(')');
            }
            NodeKind::Comma(items) => {
                self.out.push('(');
                for (i, it) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.print_expr(*it);
                }
                self.out.push(')');
            }
            NodeKind::BraceInit(items) => {
                self.out.push('{');
                for (i, it) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.print_expr(*it);
                }
                self.out.push('}');
            }
            NodeKind::Ternary { cond, then_branch, else_branch } => {
                self.out.push('(');
                self.print_expr(cond);
                self.out.push_str(" ? ");
                self.print_expr(then_branch);
                self.out.push_str(" : ");
                self.print_expr(else_branch);
                self.out.push(')');
            }
            NodeKind::Index { base, indices } => {
                self.print_expr(base);
                for idx in indices {
                    self.out.push('[');
                    self.print_expr(idx);
                    self.out.push(']');
                }
            }
            NodeKind::Projection { base, field, .. } => {
                self.print_expr(base);
                self.out.push('.');
                self.out.push_str(&field);
            }
            NodeKind::Cast { type_spec, operand } => {
                self.out.push('(');
                self.print_type_spec(&type_spec);
                self.out.push(')');
                self.print_expr(operand);
            }
            NodeKind::ImplicitCoercion { inner } => {
                if self.colors {
                    let _ = write!(self.out, "{}", sgr::COMMENT);
                }
                self.out.push_str("/*cast*/");
                if self.colors {
                    let _ = write!(self.out, "{}", sgr::RESET);
                }
                self.print_expr(inner);
            }
            NodeKind::Error => self.out.push_str("<error>"),
            _ => self.out.push_str("<?>"),
        }
    }

    fn print_arg_list(&mut self, args: &[NodeId]) {
        self.out.push('(');
        for (i, &a) in args.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.print_expr(a);
        }
        self.out.push(')');
    }
}

fn bin_op_text(op: BinOp) -> &'static str {
    use BinOp::*;
    match op {
        Add => "+",
        Sub => "-",
        Mul => "*",
        Div => "/",
        Mod => "%",
        Lt => "<",
        Le => "<=",
        Gt => ">",
        Ge => ">=",
        Eq => "==",
        Ne => "!=",
        And => "&&",
        Or => "||",
        BitAnd => "&",
        BitOr => "|",
        BitXor => "^",
        Shl => "<<",
        Shr => ">>",
        Assign => "=",
        AddAssign => "+=",
        SubAssign => "-=",
        MulAssign => "*=",
        DivAssign => "/=",
        ModAssign => "%=",
        AndAssign => "&=",
        OrAssign => "|=",
        XorAssign => "^=",
        ShlAssign => "<<=",
        ShrAssign => ">>=",
    }
}

fn prefix_op_text(op: PrefixOp) -> &'static str {
    match op {
        PrefixOp::Neg => "-",
        PrefixOp::Not => "!",
        PrefixOp::BitCompl => "~",
        PrefixOp::PreInc => "++",
        PrefixOp::PreDec => "--",
    }
}

fn postfix_op_text(op: PostfixOp) -> &'static str {
    match op {
        PostfixOp::PostInc => "++",
        PostfixOp::PostDec => "--",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn parse(src: &str) -> crate::ast::Program {
        let mut sink = CollectingSink::new();
        let tokens = Lexer::new("test.osl", src).tokenize(&mut sink);
        Parser::new(tokens, &mut sink).parse()
    }

    #[test]
    fn prints_binary_expression_fully_parenthesised() {
        let program = parse("int a = 1 + 2 * 3;");
        let text = pretty_print(&program.arena, &program.decls, false);
        assert!(text.contains("(1 + (2 * 3))"));
    }

    #[test]
    fn prints_struct_declaration() {
        let program = parse("struct Pair { float x; float y; };");
        let text = pretty_print(&program.arena, &program.decls, false);
        assert!(text.contains("struct Pair {"));
        assert!(text.contains("float x;"));
    }

    #[test]
    fn colors_wrap_keywords_with_sgr_codes() {
        let program = parse("struct Pair { float x; };");
        let text = pretty_print(&program.arena, &program.decls, true);
        assert!(text.contains(sgr::KEYWORD));
        assert!(text.contains(sgr::RESET));
    }

    #[test]
    fn implicit_coercion_is_annotated() {
        let program = parse("int a = 1; float b = a;");
        // pretty_print alone never inserts coercions (that's the type
        // checker's job); this asserts the fallback rendering when one is
        // already present in the tree.
        let text = pretty_print(&program.arena, &program.decls, false);
        assert!(text.contains("float b = a;"));
    }
}
