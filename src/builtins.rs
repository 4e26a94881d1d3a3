//! Built-in constructor and operator signatures .
//!
//! A handful of `pub fn`s build up signature collections with one doc
//! comment per group: scalar/triple constructors, then the
//! `__operator__<op>__` family. Each name is overloaded (`Vec<Signature>`)
//! rather than stored one-signature-per-name.

use crate::ast::{Arena, Attribute, Node, NodeKind, NodeId};
use crate::env::Environment;
use crate::token::SourceLocation;
use crate::types::{Param, PrimKind, TypeId};
use crate::type_table::TypeTable;
use std::path::PathBuf;

/// One overload: a parameter list plus a return type.
#[derive(Debug, Clone)]
pub struct Signature {
    pub params: Vec<Param>,
    pub ret: TypeId,
}

const TRIPLES: [PrimKind; 4] = [PrimKind::Color, PrimKind::Point, PrimKind::Vector, PrimKind::Normal];

/// Constructor overloads for one of the eight constructible primitives
/// . Not placed in the environment —
/// the constructor-expression checker consults this directly.
pub fn constructor_signatures(kind: PrimKind, table: &mut TypeTable) -> Vec<Signature> {
    let mut sigs = Vec::new();
    let ret = table.get_prim(kind);

    if kind.is_scalar() {
        // Scalars: one-arg constructors from each of float, int, bool.
        for from in [PrimKind::Float, PrimKind::Int, PrimKind::Bool] {
            let from_id = table.get_prim(from);
            sigs.push(Signature { params: vec![Param::input(from_id)], ret });
        }
        return sigs;
    }

    // Triples: from float; from three floats; from a named coordinate
    // space; from each of the other three triples.
    let float = table.get_prim(PrimKind::Float);
    let string = table.get_prim(PrimKind::String);

    sigs.push(Signature { params: vec![Param::input(float)], ret });
    sigs.push(Signature {
        params: vec![Param::input(float), Param::input(float), Param::input(float)],
        ret,
    });
    sigs.push(Signature {
        params: vec![
            Param::input(string),
            Param::input(float),
            Param::input(float),
            Param::input(float),
        ],
        ret,
    });
    for other in TRIPLES.iter().filter(|&&t| t != kind) {
        let other_id = table.get_prim(*other);
        sigs.push(Signature { params: vec![Param::input(other_id)], ret });
    }

    sigs
}

/// For `sub`/`neg` on triples: `color` and `matrix` return their own kind,
/// every other triple returns `vector`.
fn triple_sub_neg_result(kind: PrimKind) -> PrimKind {
    match kind {
        PrimKind::Color => PrimKind::Color,
        _ => PrimKind::Vector,
    }
}

struct OperatorBuilder<'a> {
    table: &'a mut TypeTable,
    ops: Vec<(&'static str, Signature)>,
}

impl<'a> OperatorBuilder<'a> {
    fn new(table: &'a mut TypeTable) -> Self {
        OperatorBuilder { table, ops: Vec::new() }
    }

    fn push(&mut self, name: &'static str, params: Vec<Param>, ret: TypeId) {
        self.ops.push((name, Signature { params, ret }));
    }

    fn binary(&mut self, name: &'static str, lhs: PrimKind, rhs: PrimKind, ret: PrimKind) {
        let l = self.table.get_prim(lhs);
        let r = self.table.get_prim(rhs);
        let ret = self.table.get_prim(ret);
        self.push(name, vec![Param::input(l), Param::input(r)], ret);
    }

    fn unary(&mut self, name: &'static str, arg: PrimKind, ret: PrimKind) {
        let a = self.table.get_prim(arg);
        let ret = self.table.get_prim(ret);
        self.push(name, vec![Param::input(a)], ret);
    }

    fn unary_output(&mut self, name: &'static str, arg: PrimKind) {
        let a = self.table.get_prim(arg);
        self.push(name, vec![Param::output(a)], a);
    }

    fn build(self) -> Vec<(&'static str, Signature)> {
        self.ops
    }
}

/// The full `__operator__<op>__` overload set. Returns `(bare_op_name,
/// signature)` pairs; callers wrap the
/// name as `__operator__<name>__` when inserting into the environment.
pub fn operator_signatures(table: &mut TypeTable) -> Vec<(&'static str, Signature)> {
    let mut b = OperatorBuilder::new(table);

    // add/sub/mul/div/mod over int, float -> same.
    for &prim in &[PrimKind::Int, PrimKind::Float] {
        for op in ["add", "sub", "mul", "div", "mod"] {
            b.binary(op, prim, prim, prim);
        }
        // compare -> bool
        for op in ["lt", "le", "gt", "ge"] {
            b.binary(op, prim, prim, PrimKind::Bool);
        }
        // neg -> same
        b.unary("neg", prim, prim);
        // pre/post inc/dec: arg is output, result is same type.
        for op in ["preinc", "predec", "postinc", "postdec"] {
            b.unary_output(op, prim);
        }
    }

    // eq/ne over every primitive -> bool.
    for &prim in PrimKind::ALL.iter() {
        b.binary("eq", prim, prim, PrimKind::Bool);
        b.binary("ne", prim, prim, PrimKind::Bool);
    }

    // not/compl, and/xor/or over int, bool -> same.
    for &prim in &[PrimKind::Int, PrimKind::Bool] {
        b.unary("not", prim, prim);
        b.unary("compl", prim, prim);
        for op in ["bitand", "bitxor", "bitor"] {
            b.binary(op, prim, prim, prim);
        }
    }

    // Triple/matrix arithmetic.
    for &t in TRIPLES.iter() {
        let sub_neg_ret = triple_sub_neg_result(t);
        b.binary("add", t, t, t);
        b.binary("sub", t, t, sub_neg_ret);
        b.unary("neg", t, sub_neg_ret);
        // triple * scalar / scalar * triple, and triple / scalar.
        for &scalar in &[PrimKind::Int, PrimKind::Float] {
            b.binary("mul", t, scalar, t);
            b.binary("mul", scalar, t, t);
            b.binary("div", t, scalar, t);
        }
        // componentwise triple*triple and triple/triple (e.g. color*color).
        b.binary("mul", t, t, t);
        b.binary("div", t, t, t);
    }

    // Matrix: add/sub/neg over matrix -> matrix, matrix*matrix -> matrix,
    // matrix * scalar / scalar * matrix -> matrix.
    b.binary("add", PrimKind::Matrix, PrimKind::Matrix, PrimKind::Matrix);
    b.binary("sub", PrimKind::Matrix, PrimKind::Matrix, PrimKind::Matrix);
    b.unary("neg", PrimKind::Matrix, PrimKind::Matrix);
    b.binary("mul", PrimKind::Matrix, PrimKind::Matrix, PrimKind::Matrix);
    for &scalar in &[PrimKind::Int, PrimKind::Float] {
        b.binary("mul", PrimKind::Matrix, scalar, PrimKind::Matrix);
        b.binary("mul", scalar, PrimKind::Matrix, PrimKind::Matrix);
        b.binary("div", PrimKind::Matrix, scalar, PrimKind::Matrix);
    }
    // eq/ne for matrix are already covered by the "every primitive" loop
    // above; registering `color`'s eq/ne again here is harmless — insertion
    // is a plain `Vec::push`, `find_all` returns every overload regardless
    // of duplicates, and the checker treats two structurally identical
    // candidates as equally good.

    b.build()
}

/// Populates the environment's root scope with every operator overload.
/// No-op when `enabled` is false (the `--no-builtins` CLI flag).
pub fn populate_builtins(
    env: &mut Environment,
    arena: &mut Arena,
    table: &mut TypeTable,
    file: &PathBuf,
    enabled: bool,
) {
    if !enabled {
        return;
    }
    for (op_name, sig) in operator_signatures(table) {
        let full_name = format!("__operator__{}__", op_name);
        let func_ret = table.get_func(sig.ret, sig.params.clone(), false);
        let node_id = synth_operator_node(arena, &full_name, &sig, func_ret, file);
        env.insert(&full_name, node_id, true);
    }
}

fn synth_operator_node(
    arena: &mut Arena,
    full_name: &str,
    sig: &Signature,
    func_ty: TypeId,
    file: &PathBuf,
) -> NodeId {
    let loc = SourceLocation::synthetic(file.clone());
    let mut param_ids = Vec::with_capacity(sig.params.len());
    for (i, p) in sig.params.iter().enumerate() {
        let pid = arena.alloc(
            NodeKind::Param(crate::ast::ParamDecl {
                name: format!("arg{}", i),
                type_spec: crate::ast::TypeSpec::Prim(PrimKind::Void), // unused: ty below is authoritative
                array_dim: None,
                is_output: p.is_output,
                default: None,
                loc: loc.clone(),
            }),
            loc.clone(),
        );
        arena.get_mut(pid).ty = Some(p.ty);
        param_ids.push(pid);
    }
    let id = arena.alloc(
        NodeKind::Function {
            ret: crate::ast::TypeSpec::Prim(PrimKind::Void), // unused: ty below is authoritative
            name: full_name.to_string(),
            params: param_ids,
            body: None,
            attributes: vec![Attribute { name: "builtin".to_string(), args: Vec::new() }],
        },
        loc,
    );
    let node: &mut Node = arena.get_mut(id);
    node.ty = Some(func_ty);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_constructors_cover_all_three_sources() {
        let mut table = TypeTable::new();
        let sigs = constructor_signatures(PrimKind::Int, &mut table);
        assert_eq!(sigs.len(), 3);
    }

    #[test]
    fn triple_constructors_include_from_other_triples() {
        let mut table = TypeTable::new();
        let sigs = constructor_signatures(PrimKind::Color, &mut table);
        // 1 (float) + 1 (3 floats) + 1 (named space) + 3 (other triples) = 6
        assert_eq!(sigs.len(), 6);
    }

    #[test]
    fn color_sub_returns_color_vector_sub_returns_vector() {
        assert_eq!(triple_sub_neg_result(PrimKind::Color), PrimKind::Color);
        assert_eq!(triple_sub_neg_result(PrimKind::Vector), PrimKind::Vector);
        assert_eq!(triple_sub_neg_result(PrimKind::Normal), PrimKind::Vector);
    }

    #[test]
    fn eq_ne_defined_for_every_primitive() {
        let mut table = TypeTable::new();
        let sigs = operator_signatures(&mut table);
        for prim in PrimKind::ALL {
            let name_eq = "eq";
            assert!(sigs.iter().any(|(n, s)| *n == name_eq
                && s.params.len() == 2
                && table.get(s.params[0].ty).as_prim() == Some(prim)));
        }
    }

    #[test]
    fn populate_builtins_inserts_overloadable_operators() {
        let mut table = TypeTable::new();
        let mut arena = Arena::new();
        let mut env = Environment::new();
        let file = PathBuf::from("test.osl");
        populate_builtins(&mut env, &mut arena, &mut table, &file, true);
        let add_overloads = env.find_all("__operator__add__");
        assert!(add_overloads.len() > 1, "add should have many overloads (int, float, triples, matrix)");
    }

    #[test]
    fn no_builtins_flag_skips_population() {
        let mut table = TypeTable::new();
        let mut arena = Arena::new();
        let mut env = Environment::new();
        let file = PathBuf::from("test.osl");
        populate_builtins(&mut env, &mut arena, &mut table, &file, false);
        assert!(env.find_all("__operator__add__").is_empty());
    }
}
