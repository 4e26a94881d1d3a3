//! The type checker: coercion lattice, overload resolution, and the
//! preorder/postorder program-tree walk.
//!
//! A `struct TypeChecker` holds a symbol table and walks the program tree
//! reporting diagnostics. It verifies *coercions* against a type threaded
//! downward as an expectation and upward as a result. Overload resolution
//! is deliberately free of `self`/environment access so it can be
//! unit-tested in isolation, alongside the big stateful struct.

use crate::ast::{ArrayDim, Arena, BinOp, NodeId, NodeKind, PostfixOp, PrefixOp, TypeSpec};
use crate::diagnostics::DiagnosticSink;
use crate::env::{Environment, InsertOutcome, ScopeOwner};
use crate::token::SourceLocation;
use crate::types::{Field, Param, PrimKind, Type, TypeId};
use crate::type_table::TypeTable;
use std::collections::HashMap;
use std::path::PathBuf;

// =====================================================================
// Coercion lattice // =====================================================================

/// Ranks are declared best-first so derived `Ord` gives the resolver the
/// comparison it needs directly: a lower rank is a better match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CoercionRank {
    Exact,
    BoolToInt,
    BoolOrIntToFloat,
    PointLike,
    Triple,
    ScalarToTriple,
    ScalarToMatrix,
    Array,
    Ellipsis,
    Impossible,
}

/// The coercion rank of converting a value of type `from` to `to`. Error
/// types are treated as `Exact` in either position so one failure doesn't
/// cascade into unrelated diagnostics .
pub fn coercion_rank(table: &TypeTable, from: TypeId, to: TypeId) -> CoercionRank {
    if from == to {
        return CoercionRank::Exact;
    }
    let from_ty = table.get(from);
    let to_ty = table.get(to);
    if from_ty.is_error() || to_ty.is_error() {
        return CoercionRank::Exact;
    }

    let (Some(fp), Some(tp)) = (from_ty.as_prim(), to_ty.as_prim()) else {
        return array_coercion_rank(table, from, to);
    };

    match (fp, tp) {
        (PrimKind::Bool, PrimKind::Int) => CoercionRank::BoolToInt,
        (PrimKind::Bool, PrimKind::Float) | (PrimKind::Int, PrimKind::Float) => {
            CoercionRank::BoolOrIntToFloat
        }
        _ if fp.is_point_like() && tp.is_point_like() => CoercionRank::PointLike,
        _ if fp.is_triple() && tp.is_triple() => CoercionRank::Triple,
        _ if fp.is_scalar() && tp.is_triple() => CoercionRank::ScalarToTriple,
        _ if fp.is_scalar() && tp == PrimKind::Matrix => CoercionRank::ScalarToMatrix,
        _ => CoercionRank::Impossible,
    }
}

fn array_coercion_rank(table: &TypeTable, from: TypeId, to: TypeId) -> CoercionRank {
    match (table.get(from), table.get(to)) {
        (Type::Array { elem: fe, count: fc }, Type::Array { elem: te, count: tc }) => {
            let elem_ok = coercion_rank(table, *fe, *te) == CoercionRank::Exact;
            let size_ok = *fc == 0 || *fc <= *tc;
            if elem_ok && size_ok {
                CoercionRank::Array
            } else {
                CoercionRank::Impossible
            }
        }
        _ => CoercionRank::Impossible,
    }
}

pub fn is_coercible(table: &TypeTable, from: TypeId, to: TypeId) -> bool {
    coercion_rank(table, from, to) != CoercionRank::Impossible
}

/// A coercion is lossy for `float->int`/`float->bool`, unless the source
/// is an integer literal whose value round-trips exactly through `float`
/// .
pub fn is_lossy(table: &TypeTable, from: TypeId, to: TypeId, literal_roundtrips: bool) -> bool {
    if literal_roundtrips {
        return false;
    }
    match (table.get(from).as_prim(), table.get(to).as_prim()) {
        (Some(PrimKind::Float), Some(PrimKind::Int)) => true,
        (Some(PrimKind::Float), Some(PrimKind::Bool)) => true,
        _ => false,
    }
}

/// An integer literal's value round-trips through `f64` when converting
/// it to `float` and back recovers the same value .
pub fn int_literal_roundtrips_through_float(value: u64) -> bool {
    (value as f64) as u64 == value
}

pub fn is_incomplete(struct_field_count: usize, compound_len: usize) -> bool {
    compound_len < struct_field_count
}

/// Casts permit everything coercion does, plus triple<->triple,
/// float/int->bool, and float->int .
pub fn is_castable(table: &TypeTable, from: TypeId, to: TypeId) -> bool {
    if is_coercible(table, from, to) {
        return true;
    }
    let (Some(fp), Some(tp)) = (table.get(from).as_prim(), table.get(to).as_prim()) else {
        return false;
    };
    if fp.is_triple() && tp.is_triple() {
        return true;
    }
    if (fp == PrimKind::Float || fp == PrimKind::Int) && tp == PrimKind::Bool {
        return true;
    }
    if fp == PrimKind::Float && tp == PrimKind::Int {
        return true;
    }
    false
}

// =====================================================================
// Overload resolution // =====================================================================

#[derive(Debug, Clone)]
pub struct Candidate {
    pub decl: NodeId,
    pub params: Vec<Param>,
    pub ret: TypeId,
    pub has_ellipsis: bool,
}

#[derive(Debug)]
pub enum ResolveOutcome {
    Selected { index: usize, arg_ranks: Vec<CoercionRank> },
    NoViable,
    /// Indices (into `candidates`) of the tied/incomparable maximal set.
    Ambiguous(Vec<usize>),
}

fn ret_rank_of(table: &TypeTable, candidates: &[Candidate], idx: usize, expected_ret: Option<TypeId>) -> CoercionRank {
    match expected_ret {
        Some(expected) => coercion_rank(table, candidates[idx].ret, expected),
        None => CoercionRank::Exact,
    }
}

/// `a` dominates `b` when it is no worse in every argument position and
/// strictly better in at least one; pointwise ties are broken by
/// comparing return-type coercion rank against the expected type.
fn dominates(
    table: &TypeTable,
    candidates: &[Candidate],
    expected_ret: Option<TypeId>,
    a_idx: usize,
    a_ranks: &[CoercionRank],
    b_idx: usize,
    b_ranks: &[CoercionRank],
) -> bool {
    let mut strictly_better = false;
    for (ra, rb) in a_ranks.iter().zip(b_ranks.iter()) {
        if ra > rb {
            return false;
        }
        if ra < rb {
            strictly_better = true;
        }
    }
    if strictly_better {
        return true;
    }
    ret_rank_of(table, candidates, a_idx, expected_ret) < ret_rank_of(table, candidates, b_idx, expected_ret)
}

/// Resolves a call against `candidates`, taking only argument types,
/// l-value-ness (for `output` parameters), and an optional expected return
/// type as input — no environment access, so this is cheap to unit-test
/// directly .
pub fn resolve_overload(
    table: &TypeTable,
    candidates: &[Candidate],
    arg_types: &[TypeId],
    arg_is_lvalue: &[bool],
    expected_ret: Option<TypeId>,
) -> ResolveOutcome {
    let mut viable: Vec<(usize, Vec<CoercionRank>)> = Vec::new();

    'candidate: for (idx, cand) in candidates.iter().enumerate() {
        let k = cand.params.len();
        let arg_count = arg_types.len();
        if !(arg_count == k || (arg_count > k && cand.has_ellipsis)) {
            continue;
        }
        if let Some(expected) = expected_ret {
            if !is_coercible(table, cand.ret, expected) {
                continue;
            }
        }
        let mut ranks = Vec::with_capacity(arg_count);
        for i in 0..k {
            let param = cand.params[i];
            if param.is_output && !arg_is_lvalue[i] {
                continue 'candidate;
            }
            let rank = coercion_rank(table, arg_types[i], param.ty);
            if rank == CoercionRank::Impossible {
                continue 'candidate;
            }
            ranks.push(rank);
        }
        for _ in k..arg_count {
            ranks.push(CoercionRank::Ellipsis);
        }
        viable.push((idx, ranks));
    }

    if viable.is_empty() {
        return ResolveOutcome::NoViable;
    }
    if viable.len() == 1 {
        let (idx, ranks) = viable.into_iter().next().unwrap();
        return ResolveOutcome::Selected { index: idx, arg_ranks: ranks };
    }

    let mut maximal = Vec::new();
    for (vi, (idx_i, ranks_i)) in viable.iter().enumerate() {
        let dominated = viable.iter().enumerate().any(|(vj, (idx_j, ranks_j))| {
            vi != vj && dominates(table, candidates, expected_ret, *idx_j, ranks_j, *idx_i, ranks_i)
        });
        if !dominated {
            maximal.push(vi);
        }
    }

    if maximal.len() == 1 {
        let (idx, ranks) = &viable[maximal[0]];
        ResolveOutcome::Selected { index: *idx, arg_ranks: ranks.clone() }
    } else {
        ResolveOutcome::Ambiguous(maximal.into_iter().map(|vi| viable[vi].0).collect())
    }
}

// =====================================================================
// The preorder/postorder walker
// =====================================================================

pub struct TypeChecker<'a> {
    table: &'a mut TypeTable,
    arena: &'a mut Arena,
    env: Environment,
    sink: &'a mut dyn DiagnosticSink,
    file: PathBuf,
    struct_types: HashMap<String, TypeId>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(
        table: &'a mut TypeTable,
        arena: &'a mut Arena,
        sink: &'a mut dyn DiagnosticSink,
        file: PathBuf,
    ) -> Self {
        TypeChecker { table, arena, env: Environment::new(), sink, file, struct_types: HashMap::new() }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Checks a whole translation unit: structs first (so later
    /// declarations can name them), then function/shader signatures are
    /// hoisted (so forward and mutually-recursive calls resolve), then
    /// every body and top-level initialiser is checked in source order.
    pub fn check_program(&mut self, decls: &[NodeId], enable_builtins: bool) {
        crate::builtins::populate_builtins(&mut self.env, self.arena, self.table, &self.file, enable_builtins);

        for &id in decls {
            if matches!(&self.arena.get(id).kind, NodeKind::StructDecl { .. }) {
                self.hoist_struct(id);
            }
        }
        for &id in decls {
            if matches!(&self.arena.get(id).kind, NodeKind::Function { .. }) {
                self.hoist_function(id);
            }
        }
        for &id in decls {
            self.check_top_level(id);
        }
    }

    fn resolve_type_spec(&mut self, spec: &TypeSpec) -> TypeId {
        match spec {
            TypeSpec::Prim(p) => self.table.get_prim(*p),
            TypeSpec::Shader(k) => self.table.get_shader(*k),
            TypeSpec::Closure(inner) => {
                let inner_id = self.resolve_type_spec(inner);
                self.table.get_closure(inner_id)
            }
            TypeSpec::Named(name) => {
                if let Some(id) = self.struct_types.get(name) {
                    *id
                } else {
                    let loc = self.file_loc();
                    self.sink.error(&loc, &format!("unknown type '{}'", name));
                    self.table.get_error()
                }
            }
        }
    }

    fn file_loc(&self) -> SourceLocation {
        SourceLocation::synthetic(self.file.clone())
    }

    /// Folds a parsed `ArrayDim` against an already-resolved element type.
    /// `Unsized` (`[]`) is only legal where `allow_unsized` is set
    /// (parameter position); elsewhere it is reported and absorbed into
    /// `Type::Error` like any other malformed declaration.
    fn resolve_array_dim(
        &mut self,
        elem_ty: TypeId,
        array_dim: Option<ArrayDim>,
        allow_unsized: bool,
        loc: &SourceLocation,
    ) -> TypeId {
        match array_dim {
            None => elem_ty,
            Some(ArrayDim::Unsized) => {
                if allow_unsized {
                    self.table.get_array_unsized(elem_ty)
                } else {
                    self.sink.error(loc, "unsized array is only legal in parameter position");
                    self.table.get_error()
                }
            }
            Some(ArrayDim::Sized(dim_id)) => {
                let dim_ty = self.check_expr(dim_id, None);
                let int_ty = self.table.get_prim(PrimKind::Int);
                if is_coercible(self.table, dim_ty, int_ty) {
                    match self.eval_const_int(dim_id) {
                        Some(n) if n > 0 => self.table.get_array_sized(elem_ty, n as u32),
                        _ => {
                            let dloc = self.arena.get(dim_id).loc.clone();
                            self.sink.error(&dloc, "array dimension must be a constant positive integer");
                            self.table.get_error()
                        }
                    }
                } else {
                    let dloc = self.arena.get(dim_id).loc.clone();
                    self.sink.error(&dloc, "array dimension must be of type int");
                    self.table.get_error()
                }
            }
        }
    }

    fn hoist_struct(&mut self, id: NodeId) {
        let (name, fields) = match &self.arena.get(id).kind {
            NodeKind::StructDecl { name, fields } => (name.clone(), fields.clone()),
            _ => unreachable!(),
        };
        let loc = self.arena.get(id).loc.clone();
        if name.starts_with("__operator__") {
            self.sink.error(&loc, &format!("'{}' is a reserved name", name));
        }

        let struct_id = self.table.create_struct(name.clone(), fields.len());
        self.struct_types.insert(name, struct_id);

        let mut field_descs = Vec::with_capacity(fields.len());
        for &field_id in &fields {
            let (type_spec, field_name, array_dim, field_loc) = match &self.arena.get(field_id).kind {
                NodeKind::Variable { type_spec, name, array_dim, .. } => {
                    (type_spec.clone(), name.clone(), *array_dim, self.arena.get(field_id).loc.clone())
                }
                _ => unreachable!(),
            };
            let elem_ty = self.resolve_type_spec(&type_spec);
            let ty = self.resolve_array_dim(elem_ty, array_dim, false, &field_loc);
            self.arena.set_type(field_id, ty);
            field_descs.push(Field { name: field_name, ty });
        }
        self.table.finalize_struct(struct_id, field_descs);
        self.arena.set_type(id, struct_id);
    }

    fn hoist_function(&mut self, id: NodeId) {
        let (name, ret, params, attrs) = match &self.arena.get(id).kind {
            NodeKind::Function { name, ret, params, attributes, .. } => {
                (name.clone(), ret.clone(), params.clone(), attributes.clone())
            }
            _ => unreachable!(),
        };
        let ret_ty = self.resolve_type_spec(&ret);
        let loc = self.arena.get(id).loc.clone();

        let mut param_tys = Vec::with_capacity(params.len());
        let mut has_ellipsis = false;
        for &pid in &params {
            let p = match &self.arena.get(pid).kind {
                NodeKind::Param(p) => p.clone(),
                _ => continue,
            };
            if p.name == "..." {
                has_ellipsis = true;
                continue;
            }
            let elem_ty = self.resolve_type_spec(&p.type_spec);
            let ty = self.resolve_array_dim(elem_ty, p.array_dim, true, &p.loc);
            self.arena.set_type(pid, ty);
            param_tys.push(Param { ty, is_output: p.is_output });
        }

        let is_builtin = attrs.iter().any(|a| a.name == "builtin");
        let is_constructor = attrs.iter().any(|a| a.name == "constructor");
        let func_ty = self.table.get_func(ret_ty, param_tys, has_ellipsis);
        self.arena.set_type(id, func_ty);

        if is_constructor {
            match self.table.get(ret_ty).as_prim() {
                Some(p) if p.is_scalar() || p.is_triple() || p == PrimKind::Matrix => {}
                _ => self.sink.error(
                    &loc,
                    &format!("constructor '{}' must return a constructible primitive", name),
                ),
            }
            // Constructors are reachable only via constructor-call syntax,
            // never as an ordinary function name.
            return;
        }

        if is_builtin && name.starts_with("__operator__") {
            // Populated separately via populate_builtins; user source
            // re-declaring the same name is a plain redefinition below.
        }

        match self.env.insert(&name, id, true) {
            InsertOutcome::Redefinition(_) => {
                self.sink.error(&loc, &format!("redefinition of '{}'", name));
            }
            InsertOutcome::Shadows(_) => {
                self.sink.warn(&loc, &format!("'{}' shadows a previous definition", name));
            }
            _ => {}
        }
    }

    fn check_top_level(&mut self, id: NodeId) {
        let kind = self.arena.get(id).kind.clone();
        match kind {
            NodeKind::StructDecl { .. } => {} // fully handled in hoist_struct
            NodeKind::Function { ret, name, params, body, attributes } => {
                self.check_function_body(id, &ret, &name, &params, body, &attributes)
            }
            NodeKind::Shader { kind, name, params, meta, body, attributes } => {
                self.check_shader(id, kind, &name, &params, &meta, body, &attributes)
            }
            NodeKind::VariableGroup { type_spec, vars } => self.check_variable_group(&type_spec, &vars, true),
            NodeKind::Error => {}
            other => unreachable!("unexpected top-level node {:?}", other),
        }
    }

    fn check_function_body(
        &mut self,
        id: NodeId,
        _ret: &TypeSpec,
        name: &str,
        params: &[NodeId],
        body: Option<NodeId>,
        attributes: &[crate::ast::Attribute],
    ) {
        let loc = self.arena.get(id).loc.clone();
        let is_builtin = attributes.iter().any(|a| a.name == "builtin");
        let has_ellipsis =
            params.iter().any(|&p| matches!(&self.arena.get(p).kind, NodeKind::Param(pd) if pd.name == "..."));

        if is_builtin && body.is_some() {
            self.sink.error(&loc, &format!("built-in function '{}' must not have a body", name));
        }
        if !is_builtin && body.is_none() {
            self.sink.error(&loc, &format!("function '{}' requires a body", name));
        }
        if has_ellipsis && !is_builtin {
            self.sink.error(&loc, "only a built-in function may use '...'");
        }

        for &pid in params {
            self.check_param_void(pid);
        }

        if let Some(body_id) = body {
            self.env.push(ScopeOwner::FuncOrShader(id));
            for &pid in params {
                let pname = match &self.arena.get(pid).kind {
                    NodeKind::Param(p) if p.name != "..." => Some(p.name.clone()),
                    _ => None,
                };
                if let Some(pname) = pname {
                    self.env.insert(&pname, pid, false);
                }
            }
            self.check_stmt(body_id);
            self.env.pop();
        }
    }

    fn check_shader(
        &mut self,
        id: NodeId,
        _kind: crate::types::ShaderKind,
        _name: &str,
        params: &[NodeId],
        meta: &[NodeId],
        body: NodeId,
        _attributes: &[crate::ast::Attribute],
    ) {
        for &pid in params {
            self.check_param_void(pid);
            let (type_spec, array_dim, default, loc, name) = match &self.arena.get(pid).kind {
                NodeKind::Param(p) => {
                    (p.type_spec.clone(), p.array_dim, p.default.clone(), p.loc.clone(), p.name.clone())
                }
                _ => continue,
            };
            if name == "..." {
                continue;
            }
            let elem_ty = self.resolve_type_spec(&type_spec);
            let ty = self.resolve_array_dim(elem_ty, array_dim, true, &loc);
            self.arena.set_type(pid, ty);
            match default {
                None => self.sink.error(&loc, "shader parameters require an initialiser"),
                Some(init) => {
                    let init_ty = self.check_expr(init, Some(ty));
                    if !is_coercible(self.table, init_ty, ty) {
                        self.sink.error(
                            &loc,
                            &format!(
                                "expected {} got {}",
                                self.table.display(ty),
                                self.table.display(init_ty)
                            ),
                        );
                    } else if init_ty != ty {
                        self.wrap_coercion(pid, init, ty);
                    }
                }
            }
        }
        for &mid in meta {
            if let NodeKind::Metadatum(m) = self.arena.get(mid).kind.clone() {
                self.check_expr(m.value, None);
            }
        }

        self.env.push(ScopeOwner::FuncOrShader(id));
        for &pid in params {
            let pname = match &self.arena.get(pid).kind {
                NodeKind::Param(p) if p.name != "..." => Some(p.name.clone()),
                _ => None,
            };
            if let Some(pname) = pname {
                self.env.insert(&pname, pid, false);
            }
        }
        self.check_stmt(body);
        self.env.pop();
    }

    fn check_param_void(&mut self, pid: NodeId) {
        let (type_spec, loc, name) = match &self.arena.get(pid).kind {
            NodeKind::Param(p) => (p.type_spec.clone(), p.loc.clone(), p.name.clone()),
            _ => return,
        };
        if name == "..." {
            return;
        }
        if let TypeSpec::Prim(PrimKind::Void) = type_spec {
            self.sink.error(&loc, &format!("parameter '{}' cannot have type void", name));
        }
    }

    fn check_variable_group(&mut self, type_spec: &TypeSpec, vars: &[NodeId], is_global: bool) {
        let declared_ty = self.resolve_type_spec(type_spec);
        for &vid in vars {
            self.check_one_variable(vid, declared_ty, is_global);
        }
    }

    fn check_one_variable(&mut self, vid: NodeId, declared_ty: TypeId, is_global: bool) {
        let (name, array_dim, init, attributes, loc) = match &self.arena.get(vid).kind {
            NodeKind::Variable { name, array_dim, init, attributes, .. } => {
                (name.clone(), *array_dim, *init, attributes.clone(), self.arena.get(vid).loc.clone())
            }
            _ => return,
        };

        let is_builtin_global = attributes.iter().any(|a| a.name == "builtin");
        if is_global && is_builtin_global && init.is_some() {
            self.sink.error(&loc, &format!("built-in global '{}' cannot have an initialiser", name));
        }

        let ty = if array_dim.is_some() {
            self.resolve_array_dim(declared_ty, array_dim, false, &loc)
        } else if matches!(self.table.get(declared_ty), Type::Prim(PrimKind::Void)) {
            self.sink.error(&loc, &format!("variable '{}' cannot have type void", name));
            self.table.get_error()
        } else {
            declared_ty
        };

        self.arena.set_type(vid, ty);

        if let Some(init_id) = init {
            let init_ty = self.check_expr(init_id, Some(ty));
            if !is_coercible(self.table, init_ty, ty) {
                let iloc = self.arena.get(init_id).loc.clone();
                self.sink.error(
                    &iloc,
                    &format!("expected {} got {}", self.table.display(ty), self.table.display(init_ty)),
                );
            } else if init_ty != ty {
                self.wrap_coercion(vid, init_id, ty);
            }
        }

        match self.env.insert(&name, vid, false) {
            InsertOutcome::Redefinition(_) => {
                self.sink.error(&loc, &format!("redefinition of '{}'", name));
            }
            InsertOutcome::Shadows(_) => {
                self.sink.warn(&loc, &format!("'{}' shadows a previous definition", name));
            }
            _ => {}
        }
    }

    /// The only constant evaluation the checker performs: a literal-only
    /// expression after paren-stripping.
    fn eval_const_int(&self, id: NodeId) -> Option<i64> {
        match &self.arena.get(id).kind {
            NodeKind::IntLit(v) => Some(*v as i64),
            NodeKind::Paren(inner) => self.eval_const_int(*inner),
            NodeKind::Unary { op: PrefixOp::Neg, operand } => self.eval_const_int(*operand).map(|v| -v),
            _ => None,
        }
    }

    /// Allocates an `ImplicitCoercion` wrapper around `child` and splices
    /// it into `parent`'s matching slot, so the coercion is a real part of
    /// the tree and not just a computed side effect.
    fn wrap_coercion(&mut self, parent: NodeId, child: NodeId, target: TypeId) -> NodeId {
        let loc = self.arena.get(child).loc.clone();
        let wrapped = self.arena.alloc(NodeKind::ImplicitCoercion { inner: child }, loc);
        self.arena.set_type(wrapped, target);
        self.replace_child(parent, child, wrapped);
        wrapped
    }

    fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) {
        match &mut self.arena.get_mut(parent).kind {
            NodeKind::Variable { init, .. } => {
                if *init == Some(old) {
                    *init = Some(new);
                }
            }
            NodeKind::Param(p) => {
                if p.default == Some(old) {
                    p.default = Some(new);
                }
            }
            NodeKind::Return(v) => {
                if *v == Some(old) {
                    *v = Some(new);
                }
            }
            NodeKind::Binary { lhs, rhs, .. } => {
                if *lhs == old {
                    *lhs = new;
                }
                if *rhs == old {
                    *rhs = new;
                }
            }
            NodeKind::Unary { operand, .. } => {
                if *operand == old {
                    *operand = new;
                }
            }
            NodeKind::Postfix { operand, .. } => {
                if *operand == old {
                    *operand = new;
                }
            }
            NodeKind::Call { args, .. } | NodeKind::Constructor { args, .. } => {
                for a in args.iter_mut() {
                    if *a == old {
                        *a = new;
                    }
                }
            }
            NodeKind::BraceInit(items) | NodeKind::Comma(items) => {
                for it in items.iter_mut() {
                    if *it == old {
                        *it = new;
                    }
                }
            }
            NodeKind::Ternary { then_branch, else_branch, .. } => {
                if *then_branch == old {
                    *then_branch = new;
                }
                if *else_branch == old {
                    *else_branch = new;
                }
            }
            NodeKind::Index { indices, .. } => {
                for i in indices.iter_mut() {
                    if *i == old {
                        *i = new;
                    }
                }
            }
            _ => {}
        }
    }

    // ---- statements ----

    fn check_stmt(&mut self, id: NodeId) {
        let kind = self.arena.get(id).kind.clone();
        match kind {
            NodeKind::Block(stmts) => {
                self.env.push(ScopeOwner::Block);
                for s in stmts {
                    self.check_stmt(s);
                }
                self.env.pop();
            }
            NodeKind::VariableGroup { type_spec, vars } => self.check_variable_group(&type_spec, &vars, false),
            NodeKind::If { cond, then_branch, else_branch } => {
                self.check_bool_expr(cond);
                self.check_stmt(then_branch);
                if let Some(e) = else_branch {
                    self.check_stmt(e);
                }
            }
            NodeKind::While { cond, body } => {
                self.check_bool_expr(cond);
                self.env.push(ScopeOwner::Loop(id));
                self.check_stmt(body);
                self.env.pop();
            }
            NodeKind::DoWhile { body, cond } => {
                self.env.push(ScopeOwner::Loop(id));
                self.check_stmt(body);
                self.env.pop();
                self.check_bool_expr(cond);
            }
            NodeKind::For { init, cond, step, body } => {
                self.env.push(ScopeOwner::Loop(id));
                if let Some(i) = init {
                    self.check_stmt(i);
                }
                if let Some(c) = cond {
                    self.check_bool_expr(c);
                }
                if let Some(s) = step {
                    self.check_expr(s, None);
                }
                self.check_stmt(body);
                self.env.pop();
            }
            NodeKind::Break => {
                if self.env.enclosing_loop().is_none() {
                    let loc = self.arena.get(id).loc.clone();
                    self.sink.error(&loc, "'break' outside a loop");
                }
            }
            NodeKind::Continue => {
                if self.env.enclosing_loop().is_none() {
                    let loc = self.arena.get(id).loc.clone();
                    self.sink.error(&loc, "'continue' outside a loop");
                }
            }
            NodeKind::Return(value) => self.check_return(id, value),
            NodeKind::Empty => {}
            NodeKind::ExprStmt(e) => {
                self.check_expr(e, None);
            }
            NodeKind::Error => {}
            other => unreachable!("unexpected statement node {:?}", other),
        }
    }

    fn check_bool_expr(&mut self, id: NodeId) {
        let bool_ty = self.table.get_prim(PrimKind::Bool);
        let ty = self.check_expr(id, Some(bool_ty));
        if !is_coercible(self.table, ty, bool_ty) {
            let loc = self.arena.get(id).loc.clone();
            self.sink.error(&loc, &format!("expected bool got {}", self.table.display(ty)));
        }
    }

    fn check_return(&mut self, id: NodeId, value: Option<NodeId>) {
        let loc = self.arena.get(id).loc.clone();
        let Some(enclosing) = self.env.enclosing_func_or_shader() else {
            self.sink.error(&loc, "'return' outside a function");
            return;
        };
        let is_shader = matches!(&self.arena.get(enclosing).kind, NodeKind::Shader { .. });
        if is_shader {
            if value.is_some() {
                self.sink.error(&loc, "shaders cannot return a value");
            }
            return;
        }
        let ret_ty = match &self.arena.get(enclosing).kind {
            NodeKind::Function { ret, .. } => {
                let ret = ret.clone();
                self.resolve_type_spec(&ret)
            }
            _ => self.table.get_error(),
        };
        let is_void = matches!(self.table.get(ret_ty), Type::Prim(PrimKind::Void));
        match value {
            None => {
                if !is_void {
                    self.sink.error(&loc, "missing return value");
                }
            }
            Some(v) if is_void => {
                self.sink.error(&loc, "void function cannot return a value");
                self.check_expr(v, None);
            }
            Some(v) => {
                let vty = self.check_expr(v, Some(ret_ty));
                if !is_coercible(self.table, vty, ret_ty) {
                    let vloc = self.arena.get(v).loc.clone();
                    self.sink.error(
                        &vloc,
                        &format!("expected {} got {}", self.table.display(ret_ty), self.table.display(vty)),
                    );
                } else if vty != ret_ty {
                    self.wrap_coercion(id, v, ret_ty);
                }
            }
        }
    }

    // ---- expressions ----

    fn check_expr(&mut self, id: NodeId, expected: Option<TypeId>) -> TypeId {
        let kind = self.arena.get(id).kind.clone();
        let ty = match kind {
            NodeKind::BoolLit(_) => self.table.get_prim(PrimKind::Bool),
            NodeKind::IntLit(_) => self.table.get_prim(PrimKind::Int),
            NodeKind::FloatLit(_) => self.table.get_prim(PrimKind::Float),
            NodeKind::StringLit(_) => self.table.get_prim(PrimKind::String),
            NodeKind::Ident { name, .. } => self.check_ident(id, &name),
            NodeKind::Binary { op, lhs, rhs } => self.check_binary(id, op, lhs, rhs, expected),
            NodeKind::Unary { op, operand } => self.check_unary(id, op, operand),
            NodeKind::Postfix { op, operand } => self.check_postfix(id, op, operand),
            NodeKind::Call { callee, args } => self.check_call(id, &callee, &args, expected),
            NodeKind::Constructor { type_spec, args } => self.check_constructor(id, &type_spec, &args),
            NodeKind::Paren(inner) => self.check_expr(inner, expected),
            NodeKind::Comma(items) => {
                let mut last = self.table.get_error();
                for it in items {
                    last = self.check_expr(it, None);
                }
                last
            }
            NodeKind::BraceInit(items) => self.check_brace_init(id, &items, expected),
            NodeKind::Ternary { cond, then_branch, else_branch } => {
                self.check_ternary(id, cond, then_branch, else_branch, expected)
            }
            NodeKind::Index { base, indices } => self.check_index(id, base, &indices),
            NodeKind::Projection { base, field, .. } => self.check_projection(id, base, &field),
            NodeKind::Cast { type_spec, operand } => self.check_cast(id, &type_spec, operand),
            NodeKind::ImplicitCoercion { .. } => self.arena.get(id).ty.unwrap_or_else(|| self.table.get_error()),
            NodeKind::Error => self.table.get_error(),
            other => unreachable!("unexpected expression node {:?}", other),
        };
        self.arena.set_type(id, ty);
        ty
    }

    fn check_ident(&mut self, id: NodeId, name: &str) -> TypeId {
        let loc = self.arena.get(id).loc.clone();
        match self.env.find_one(name) {
            Some(decl) => {
                if let NodeKind::Ident { symbol, .. } = &mut self.arena.get_mut(id).kind {
                    *symbol = Some(decl);
                }
                self.arena.get(decl).ty.unwrap_or_else(|| self.table.get_error())
            }
            None => {
                if !self.env.find_all(name).is_empty() {
                    self.sink.error(&loc, &format!("'{}' is overloaded; cannot be used as a value here", name));
                } else {
                    self.sink.error(&loc, &format!("unknown identifier '{}'", name));
                }
                self.table.get_error()
            }
        }
    }

    fn is_lvalue(&self, id: NodeId) -> bool {
        match &self.arena.get(id).kind {
            NodeKind::Ident { .. } => true,
            NodeKind::Index { base, .. } => self.is_lvalue(*base),
            NodeKind::Projection { base, .. } => self.is_lvalue(*base),
            NodeKind::Paren(inner) => self.is_lvalue(*inner),
            _ => false,
        }
    }

    fn check_binary(&mut self, id: NodeId, op: BinOp, lhs: NodeId, rhs: NodeId, expected: Option<TypeId>) -> TypeId {
        if op.is_logical() {
            self.check_bool_expr(lhs);
            self.check_bool_expr(rhs);
            return self.table.get_prim(PrimKind::Bool);
        }
        if op == BinOp::Assign {
            return self.check_assignment(id, lhs, rhs);
        }
        if op.is_compound_assign() {
            return self.check_compound_assignment(id, op, lhs, rhs);
        }

        let lty = self.check_expr(lhs, None);
        let rty = self.check_expr(rhs, None);
        self.resolve_operator_call(id, op.op_name(), &[lhs, rhs], &[lty, rty], expected)
    }

    fn check_assignment(&mut self, id: NodeId, lhs: NodeId, rhs: NodeId) -> TypeId {
        let lty = self.check_expr(lhs, None);
        if !self.is_lvalue(lhs) {
            let loc = self.arena.get(lhs).loc.clone();
            self.sink.error(&loc, "left-hand side of assignment must be an l-value");
        }
        let rty = self.check_expr(rhs, Some(lty));
        if !is_coercible(self.table, rty, lty) {
            let loc = self.arena.get(id).loc.clone();
            self.sink.error(
                &loc,
                &format!("expected {} got {}", self.table.display(lty), self.table.display(rty)),
            );
        } else if rty != lty {
            self.wrap_coercion(id, rhs, lty);
        }
        lty
    }

    fn check_compound_assignment(&mut self, id: NodeId, op: BinOp, lhs: NodeId, rhs: NodeId) -> TypeId {
        let lty = self.check_expr(lhs, None);
        if !self.is_lvalue(lhs) {
            let loc = self.arena.get(lhs).loc.clone();
            self.sink.error(&loc, "left-hand side of assignment must be an l-value");
        }
        let rty = self.check_expr(rhs, None);
        let result_ty = self.resolve_operator_call(id, op.op_name(), &[lhs, rhs], &[lty, rty], Some(lty));
        if !is_coercible(self.table, result_ty, lty) {
            let loc = self.arena.get(id).loc.clone();
            self.sink.error(
                &loc,
                &format!("expected {} got {}", self.table.display(lty), self.table.display(result_ty)),
            );
        }
        lty
    }

    fn check_unary(&mut self, id: NodeId, op: PrefixOp, operand: NodeId) -> TypeId {
        let is_mutating = matches!(op, PrefixOp::PreInc | PrefixOp::PreDec);
        let oty = self.check_expr(operand, None);
        if is_mutating && !self.is_lvalue(operand) {
            let loc = self.arena.get(operand).loc.clone();
            self.sink.error(&loc, "operand of increment/decrement must be an l-value");
        }
        self.resolve_operator_call(id, op.op_name(), &[operand], &[oty], None)
    }

    fn check_postfix(&mut self, id: NodeId, op: PostfixOp, operand: NodeId) -> TypeId {
        let oty = self.check_expr(operand, None);
        if !self.is_lvalue(operand) {
            let loc = self.arena.get(operand).loc.clone();
            self.sink.error(&loc, "operand of increment/decrement must be an l-value");
        }
        self.resolve_operator_call(id, op.op_name(), &[operand], &[oty], None)
    }

    /// Dispatches a unary/binary operator through `__operator__<op>__`
    /// overload resolution, inserting coercions on arguments. `call_site`
    /// is also the parent node whose `lhs`/`rhs`/`operand` slot gets
    /// patched when an argument needs wrapping.
    fn resolve_operator_call(
        &mut self,
        call_site: NodeId,
        op_name: &str,
        arg_nodes: &[NodeId],
        arg_types: &[TypeId],
        expected: Option<TypeId>,
    ) -> TypeId {
        let full_name = format!("__operator__{}__", op_name);
        self.resolve_call_generic(call_site, &full_name, arg_nodes, arg_types, expected, true)
    }

    fn check_call(&mut self, id: NodeId, callee: &str, args: &[NodeId], expected: Option<TypeId>) -> TypeId {
        let arg_types: Vec<TypeId> = args.iter().map(|&a| self.check_expr(a, None)).collect();
        self.resolve_call_generic(id, callee, args, &arg_types, expected, false)
    }

    fn resolve_call_generic(
        &mut self,
        call_site: NodeId,
        name: &str,
        arg_nodes: &[NodeId],
        arg_types: &[TypeId],
        expected: Option<TypeId>,
        is_operator: bool,
    ) -> TypeId {
        let decls = self.env.find_all(name);
        if decls.is_empty() {
            if !is_operator {
                let loc = self.arena.get(call_site).loc.clone();
                self.sink.error(&loc, &format!("unknown function '{}'", name));
            }
            return self.table.get_error();
        }
        let candidates: Vec<Candidate> = decls
            .iter()
            .filter_map(|&d| match self.arena.get(d).ty {
                Some(ty) => match self.table.get(ty) {
                    Type::Func { ret, params, has_ellipsis } => {
                        Some(Candidate { decl: d, params: params.clone(), ret: *ret, has_ellipsis: *has_ellipsis })
                    }
                    _ => None,
                },
                None => None,
            })
            .collect();

        let lvalues: Vec<bool> = arg_nodes.iter().map(|&a| self.is_lvalue(a)).collect();
        let outcome = resolve_overload(self.table, &candidates, arg_types, &lvalues, expected);

        match outcome {
            ResolveOutcome::Selected { index, arg_ranks } => {
                let params = candidates[index].params.clone();
                let ret = candidates[index].ret;
                for (i, (&arg, &rank)) in arg_nodes.iter().zip(arg_ranks.iter()).enumerate() {
                    if rank == CoercionRank::Ellipsis {
                        continue;
                    }
                    let param_ty = params[i].ty;
                    if arg_types[i] != param_ty {
                        self.wrap_coercion(call_site, arg, param_ty);
                    }
                }
                ret
            }
            ResolveOutcome::NoViable => {
                let loc = self.arena.get(call_site).loc.clone();
                self.sink.error(&loc, &format!("no viable overload for '{}'", name));
                self.table.get_error()
            }
            ResolveOutcome::Ambiguous(idxs) => {
                let loc = self.arena.get(call_site).loc.clone();
                self.sink.error(&loc, &format!("ambiguous call to '{}'", name));
                for i in idxs {
                    let cand = candidates[i].clone();
                    let func_ty = self.table.get_func(cand.ret, cand.params, cand.has_ellipsis);
                    let rendered = self.table.display(func_ty);
                    self.sink.note(&loc, &format!("candidate: {}", rendered));
                }
                self.table.get_error()
            }
        }
    }

    fn check_constructor(&mut self, id: NodeId, type_spec: &TypeSpec, args: &[NodeId]) -> TypeId {
        let ty = self.resolve_type_spec(type_spec);
        let arg_types: Vec<TypeId> = args.iter().map(|&a| self.check_expr(a, None)).collect();

        let Some(prim) = self.table.get(ty).as_prim() else {
            let loc = self.arena.get(id).loc.clone();
            self.sink.error(&loc, "only scalar and triple types have constructors");
            return self.table.get_error();
        };
        let sigs = crate::builtins::constructor_signatures(prim, self.table);
        let candidates: Vec<Candidate> =
            sigs.into_iter().map(|s| Candidate { decl: id, params: s.params, ret: s.ret, has_ellipsis: false }).collect();
        let lvalues = vec![false; args.len()];
        let outcome = resolve_overload(self.table, &candidates, &arg_types, &lvalues, Some(ty));
        match outcome {
            ResolveOutcome::Selected { index, .. } => {
                let params = candidates[index].params.clone();
                for (i, &arg) in args.iter().enumerate() {
                    if arg_types[i] != params[i].ty {
                        self.wrap_coercion(id, arg, params[i].ty);
                    }
                }
                ty
            }
            _ => {
                let loc = self.arena.get(id).loc.clone();
                self.sink.error(&loc, &format!("no matching constructor for '{}'", self.table.display(ty)));
                self.table.get_error()
            }
        }
    }

    fn check_brace_init(&mut self, id: NodeId, items: &[NodeId], expected: Option<TypeId>) -> TypeId {
        let elem_types: Vec<TypeId> = items.iter().map(|&it| self.check_expr(it, None)).collect();

        if let Some(target) = expected {
            match self.table.get(target).clone() {
                Type::Struct { fields, .. } => {
                    if items.len() > fields.len() {
                        let loc = self.arena.get(id).loc.clone();
                        self.sink.error(
                            &loc,
                            &format!("expected {} initialisers, got {}", fields.len(), items.len()),
                        );
                    } else if is_incomplete(fields.len(), items.len()) {
                        let loc = self.arena.get(id).loc.clone();
                        let first_missing = &fields[items.len()].name;
                        self.sink.warn(&loc, &format!("missing initializer for field '{}'", first_missing));
                    }
                    for (i, &item) in items.iter().enumerate() {
                        if let Some(field) = fields.get(i) {
                            if !is_coercible(self.table, elem_types[i], field.ty) {
                                let loc = self.arena.get(item).loc.clone();
                                self.sink.error(
                                    &loc,
                                    &format!(
                                        "expected {} got {}",
                                        self.table.display(field.ty),
                                        self.table.display(elem_types[i])
                                    ),
                                );
                            } else if elem_types[i] != field.ty {
                                self.wrap_coercion(id, item, field.ty);
                            }
                        }
                    }
                    return target;
                }
                Type::Array { elem, .. } => {
                    for (i, &item) in items.iter().enumerate() {
                        if !is_coercible(self.table, elem_types[i], elem) {
                            let loc = self.arena.get(item).loc.clone();
                            self.sink.error(
                                &loc,
                                &format!("expected {} got {}", self.table.display(elem), self.table.display(elem_types[i])),
                            );
                        } else if elem_types[i] != elem {
                            self.wrap_coercion(id, item, elem);
                        }
                    }
                    return self.table.get_array_sized(elem, items.len().max(1) as u32);
                }
                _ => {}
            }
        }
        self.table.get_compound(elem_types)
    }

    fn check_ternary(
        &mut self,
        id: NodeId,
        cond: NodeId,
        then_branch: NodeId,
        else_branch: NodeId,
        expected: Option<TypeId>,
    ) -> TypeId {
        self.check_bool_expr(cond);
        let then_ty = self.check_expr(then_branch, expected);
        let else_ty = self.check_expr(else_branch, Some(then_ty));
        if !is_coercible(self.table, else_ty, then_ty) {
            let loc = self.arena.get(else_branch).loc.clone();
            self.sink.error(
                &loc,
                &format!("expected {} got {}", self.table.display(then_ty), self.table.display(else_ty)),
            );
        } else if else_ty != then_ty {
            self.wrap_coercion(id, else_branch, then_ty);
        }
        then_ty
    }

    fn check_index(&mut self, id: NodeId, base: NodeId, indices: &[NodeId]) -> TypeId {
        let base_ty = self.check_expr(base, None);
        let int_ty = self.table.get_prim(PrimKind::Int);
        for &idx in indices {
            let ity = self.check_expr(idx, Some(int_ty));
            if !is_coercible(self.table, ity, int_ty) {
                let loc = self.arena.get(idx).loc.clone();
                self.sink.error(&loc, &format!("expected int got {}", self.table.display(ity)));
            } else if ity != int_ty {
                self.wrap_coercion(id, idx, int_ty);
            }
        }

        match self.table.get(base_ty).clone() {
            Type::Array { elem, .. } => elem,
            Type::Prim(p) if p.is_triple() => {
                if indices.len() != 1 {
                    let loc = self.arena.get(base).loc.clone();
                    self.sink.error(&loc, "a triple takes exactly one index");
                    self.table.get_error()
                } else {
                    self.table.get_prim(PrimKind::Float)
                }
            }
            Type::Prim(PrimKind::Matrix) => {
                if indices.len() == 2 {
                    self.table.get_prim(PrimKind::Float)
                } else {
                    let loc = self.arena.get(base).loc.clone();
                    self.sink.error(&loc, "matrix requires double indexing m[i][j]");
                    self.table.get_error()
                }
            }
            Type::Error => self.table.get_error(),
            _ => {
                let loc = self.arena.get(base).loc.clone();
                self.sink.error(&loc, &format!("cannot index {}", self.table.display(base_ty)));
                self.table.get_error()
            }
        }
    }

    fn check_projection(&mut self, id: NodeId, base: NodeId, field: &str) -> TypeId {
        let base_ty = self.check_expr(base, None);
        let loc = self.arena.get(id).loc.clone();

        match self.table.get(base_ty).clone() {
            Type::Prim(PrimKind::Color) => self.projection_component(id, &["r", "g", "b"], field, &loc),
            Type::Prim(p) if p.is_point_like() => self.projection_component(id, &["x", "y", "z"], field, &loc),
            Type::Struct { fields, .. } => {
                if let Some((index, f)) = fields.iter().enumerate().find(|(_, f)| f.name == field) {
                    if let NodeKind::Projection { field_index, .. } = &mut self.arena.get_mut(id).kind {
                        *field_index = Some(index);
                    }
                    f.ty
                } else {
                    self.sink.error(&loc, &format!("no field named '{}'", field));
                    self.table.get_error()
                }
            }
            Type::Error => self.table.get_error(),
            _ => {
                self.sink.error(&loc, &format!("cannot project field '{}' from {}", field, self.table.display(base_ty)));
                self.table.get_error()
            }
        }
    }

    fn projection_component(&mut self, id: NodeId, names: &[&str], field: &str, loc: &SourceLocation) -> TypeId {
        if let Some(index) = names.iter().position(|n| *n == field) {
            if let NodeKind::Projection { field_index, .. } = &mut self.arena.get_mut(id).kind {
                *field_index = Some(index);
            }
            self.table.get_prim(PrimKind::Float)
        } else {
            self.sink.error(loc, &format!("no component named '{}'", field));
            self.table.get_error()
        }
    }

    fn check_cast(&mut self, id: NodeId, type_spec: &TypeSpec, operand: NodeId) -> TypeId {
        let target = self.resolve_type_spec(type_spec);
        let oty = self.check_expr(operand, Some(target));
        if !is_castable(self.table, oty, target) {
            let loc = self.arena.get(id).loc.clone();
            self.sink.error(
                &loc,
                &format!("cannot cast {} to {}", self.table.display(oty), self.table.display(target)),
            );
            return self.table.get_error();
        }
        if oty != target {
            let lit_roundtrip = matches!(
                &self.arena.get(operand).kind,
                NodeKind::IntLit(v) if int_literal_roundtrips_through_float(*v)
            );
            if is_lossy(self.table, oty, target, lit_roundtrip) {
                let loc = self.arena.get(id).loc.clone();
                self.sink.warn(
                    &loc,
                    &format!("lossy conversion from {} to {}", self.table.display(oty), self.table.display(target)),
                );
            }
        }
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use std::path::PathBuf;

    fn check(src: &str) -> (crate::ast::Program, CollectingSink) {
        let mut sink = CollectingSink::new();
        let tokens = Lexer::new("test.osl", src).tokenize(&mut sink);
        let mut program = Parser::new(tokens, &mut sink).parse();
        let mut table = TypeTable::new();
        {
            let mut checker =
                TypeChecker::new(&mut table, &mut program.arena, &mut sink, PathBuf::from("test.osl"));
            checker.check_program(&program.decls, true);
        }
        (program, sink)
    }

    // ---- coercion lattice ----

    #[test]
    fn exact_match_has_lowest_rank() {
        let mut table = TypeTable::new();
        let int_ty = table.get_prim(PrimKind::Int);
        assert_eq!(coercion_rank(&table, int_ty, int_ty), CoercionRank::Exact);
    }

    #[test]
    fn bool_to_int_ranks_better_than_bool_to_float() {
        let mut table = TypeTable::new();
        let b = table.get_prim(PrimKind::Bool);
        let i = table.get_prim(PrimKind::Int);
        let f = table.get_prim(PrimKind::Float);
        assert!(coercion_rank(&table, b, i) < coercion_rank(&table, b, f));
    }

    #[test]
    fn point_like_ranks_better_than_color() {
        let mut table = TypeTable::new();
        let point = table.get_prim(PrimKind::Point);
        let vector = table.get_prim(PrimKind::Vector);
        let color = table.get_prim(PrimKind::Color);
        assert!(coercion_rank(&table, point, vector) < coercion_rank(&table, point, color));
    }

    #[test]
    fn scalar_to_triple_worse_than_triple_to_triple() {
        let mut table = TypeTable::new();
        let f = table.get_prim(PrimKind::Float);
        let color = table.get_prim(PrimKind::Color);
        let vector = table.get_prim(PrimKind::Vector);
        assert!(coercion_rank(&table, vector, color) < coercion_rank(&table, f, color));
    }

    #[test]
    fn lossy_suppressed_for_roundtripping_int_literal() {
        let mut table = TypeTable::new();
        let f = table.get_prim(PrimKind::Float);
        let i = table.get_prim(PrimKind::Int);
        assert!(is_lossy(&table, f, i, false));
        assert!(!is_lossy(&table, f, i, true));
    }

    #[test]
    fn array_coercion_allows_unsized_source() {
        let mut table = TypeTable::new();
        let float = table.get_prim(PrimKind::Float);
        let unsized_arr = table.get_array_unsized(float);
        let sized_arr = table.get_array_sized(float, 4);
        assert_eq!(coercion_rank(&table, unsized_arr, sized_arr), CoercionRank::Array);
    }

    // ---- overload resolution ----

    #[test]
    fn resolves_unique_viable_candidate() {
        let mut table = TypeTable::new();
        let int_ty = table.get_prim(PrimKind::Int);
        let float_ty = table.get_prim(PrimKind::Float);
        let candidates = vec![Candidate {
            decl: NodeId(0),
            params: vec![Param::input(int_ty)],
            ret: float_ty,
            has_ellipsis: false,
        }];
        let outcome = resolve_overload(&table, &candidates, &[int_ty], &[false], None);
        assert!(matches!(outcome, ResolveOutcome::Selected { index: 0, .. }));
    }

    #[test]
    fn exact_match_beats_coercing_overload() {
        let mut table = TypeTable::new();
        let int_ty = table.get_prim(PrimKind::Int);
        let float_ty = table.get_prim(PrimKind::Float);
        let candidates = vec![
            Candidate { decl: NodeId(0), params: vec![Param::input(float_ty)], ret: float_ty, has_ellipsis: false },
            Candidate { decl: NodeId(1), params: vec![Param::input(int_ty)], ret: float_ty, has_ellipsis: false },
        ];
        let outcome = resolve_overload(&table, &candidates, &[int_ty], &[false], None);
        assert!(matches!(outcome, ResolveOutcome::Selected { index: 1, .. }));
    }

    #[test]
    fn tie_broken_by_return_type_against_expected() {
        let mut table = TypeTable::new();
        let float_ty = table.get_prim(PrimKind::Float);
        let int_ty = table.get_prim(PrimKind::Int);
        let candidates = vec![
            Candidate { decl: NodeId(0), params: vec![Param::input(float_ty)], ret: int_ty, has_ellipsis: false },
            Candidate { decl: NodeId(1), params: vec![Param::input(float_ty)], ret: float_ty, has_ellipsis: false },
        ];
        let outcome = resolve_overload(&table, &candidates, &[float_ty], &[false], Some(float_ty));
        assert!(matches!(outcome, ResolveOutcome::Selected { index: 1, .. }));
    }

    #[test]
    fn output_param_requires_lvalue_argument() {
        let mut table = TypeTable::new();
        let int_ty = table.get_prim(PrimKind::Int);
        let candidates = vec![Candidate {
            decl: NodeId(0),
            params: vec![Param::output(int_ty)],
            ret: int_ty,
            has_ellipsis: false,
        }];
        let outcome = resolve_overload(&table, &candidates, &[int_ty], &[false], None);
        assert!(matches!(outcome, ResolveOutcome::NoViable));
    }

    // ---- end-to-end scenarios ----

    #[test]
    fn scenario_int_to_float_initialiser_inserts_cast() {
        let (program, sink) = check("int a = 1; float b = a;");
        assert_eq!(sink.error_count(), 0);
        match &program.arena.get(program.decls[1]).kind {
            NodeKind::VariableGroup { vars, .. } => match &program.arena.get(vars[0]).kind {
                NodeKind::Variable { init: Some(init), .. } => {
                    assert!(matches!(&program.arena.get(*init).kind, NodeKind::ImplicitCoercion { .. }));
                }
                other => panic!("{:?}", other),
            },
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn scenario_overload_resolves_to_int_exact_match() {
        let (_program, sink) =
            check("float f(float x) { return x; } float f(int x) { return x; } float y = f(1);");
        assert_eq!(sink.error_count(), 0);
    }

    #[test]
    fn scenario_overload_breaks_tie_by_return_type() {
        let (_program, sink) =
            check("float g(float x) { return x; } int g(int x) { return x; } float y = g(1.0);");
        assert_eq!(sink.error_count(), 0);
    }

    #[test]
    fn scenario_color_projection_yields_float() {
        let (_program, sink) = check("color c = color(1.0, 2.0, 3.0); float r = c.r;");
        assert_eq!(sink.error_count(), 0);
    }

    #[test]
    fn scenario_zero_sized_array_is_an_error() {
        let (_program, sink) = check("int a[0];");
        assert!(sink.error_count() >= 1);
    }

    #[test]
    fn scenario_void_output_parameter_is_rejected() {
        // spec end-to-end scenario 6: `output` on a return position is
        // rejected at parse time; the checker's own void-parameter rule is
        // exercised directly here instead.
        let (_program, sink) = check("void h(output void z) {}");
        assert!(sink.error_count() >= 1);
    }

    #[test]
    fn scenario_output_before_return_type_is_a_parse_error() {
        let mut sink = CollectingSink::new();
        let tokens = Lexer::new("test.osl", "output void h() {}").tokenize(&mut sink);
        let _ = Parser::new(tokens, &mut sink).parse();
        assert!(sink.error_count() >= 1);
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let (_program, sink) = check("void f() { break; }");
        assert!(sink.error_count() >= 1);
    }

    #[test]
    fn return_value_required_for_non_void_function() {
        let (_program, sink) = check("float f() { return; }");
        assert!(sink.error_count() >= 1);
    }

    #[test]
    fn struct_field_assigned_through_projection() {
        let (_program, sink) =
            check("struct Pair { float x; float y; }; void f() { Pair p; p.x = 1.0; }");
        assert_eq!(sink.error_count(), 0);
    }
}
