//! Hash-consed type interning.
//!
//! Two structurally equal types share one `TypeId`; struct types are the
//! deliberate exception and always get a fresh id. A plain `HashMap` plus a
//! backing `Vec` arena, no interning crate pulled in (see DESIGN.md).

use crate::types::{Field, Param, PrimKind, ShaderKind, Type, TypeId};
use std::collections::HashMap;

pub struct TypeTable {
    types: Vec<Type>,
    cache: HashMap<Type, TypeId>,
    error_id: TypeId,
}

impl TypeTable {
    pub fn new() -> Self {
        let mut table = TypeTable { types: Vec::new(), cache: HashMap::new(), error_id: TypeId(0) };
        table.error_id = table.intern(Type::Error);
        table
    }

    fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(id) = self.cache.get(&ty) {
            return *id;
        }
        let id = TypeId(self.types.len() as u32);
        self.cache.insert(ty.clone(), id);
        self.types.push(ty);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn get_error(&self) -> TypeId {
        self.error_id
    }

    pub fn get_prim(&mut self, kind: PrimKind) -> TypeId {
        self.intern(Type::Prim(kind))
    }

    pub fn get_shader(&mut self, kind: ShaderKind) -> TypeId {
        self.intern(Type::Shader(kind))
    }

    pub fn get_closure(&mut self, inner: TypeId) -> TypeId {
        self.intern(Type::Closure(inner))
    }

    /// `n` must be `> 0`; the positivity invariant is enforced by the type
    /// checker before this is ever called — array dimensions are statically
    /// evaluated there, not here.
    pub fn get_array_sized(&mut self, elem: TypeId, n: u32) -> TypeId {
        debug_assert!(n > 0, "sized array must have a positive count");
        self.intern(Type::Array { elem, count: n })
    }

    pub fn get_array_unsized(&mut self, elem: TypeId) -> TypeId {
        self.intern(Type::Array { elem, count: 0 })
    }

    pub fn get_func(&mut self, ret: TypeId, params: Vec<Param>, has_ellipsis: bool) -> TypeId {
        self.intern(Type::Func { ret, params, has_ellipsis })
    }

    pub fn get_compound(&mut self, elems: Vec<TypeId>) -> TypeId {
        self.intern(Type::Compound(elems))
    }

    /// Always returns a fresh id, even for a `name`/`fields` pair identical
    /// to one already interned — struct identity is nominal.
    pub fn create_struct(&mut self, name: String, field_count: usize) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        let placeholder_fields = vec![
            Field { name: String::new(), ty: self.error_id };
            field_count
        ];
        self.types.push(Type::Struct { name, fields: placeholder_fields });
        // Deliberately not inserted into `cache`: struct types never
        // participate in hash-consing lookups.
        id
    }

    pub fn finalize_struct(&mut self, id: TypeId, fields: Vec<Field>) {
        if let Type::Struct { fields: slot, .. } = &mut self.types[id.0 as usize] {
            *slot = fields;
        } else {
            panic!("finalize_struct called on a non-struct TypeId");
        }
    }

    pub fn struct_name(&self, id: TypeId) -> Option<&str> {
        match self.get(id) {
            Type::Struct { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn struct_field(&self, id: TypeId, name: &str) -> Option<(usize, &Field)> {
        match self.get(id) {
            Type::Struct { fields, .. } => {
                fields.iter().enumerate().find(|(_, f)| f.name == name)
            }
            _ => None,
        }
    }

    /// Human-readable rendering used in diagnostics (`expected X got Y`).
    pub fn display(&self, id: TypeId) -> String {
        match self.get(id) {
            Type::Error => "<error>".to_string(),
            Type::Prim(p) => p.name().to_string(),
            Type::Closure(inner) => format!("closure {}", self.display(*inner)),
            Type::Shader(k) => k.name().to_string(),
            Type::Array { elem, count } => {
                if *count == 0 {
                    format!("{}[]", self.display(*elem))
                } else {
                    format!("{}[{}]", self.display(*elem), count)
                }
            }
            Type::Func { ret, params, has_ellipsis } => {
                let mut parts: Vec<String> = params
                    .iter()
                    .map(|p| {
                        if p.is_output {
                            format!("output {}", self.display(p.ty))
                        } else {
                            self.display(p.ty)
                        }
                    })
                    .collect();
                if *has_ellipsis {
                    parts.push("...".to_string());
                }
                format!("{}({})", self.display(*ret), parts.join(", "))
            }
            Type::Compound(elems) => {
                let parts: Vec<String> = elems.iter().map(|e| self.display(*e)).collect();
                format!("{{{}}}", parts.join(", "))
            }
            Type::Struct { name, .. } => name.clone(),
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successive_prim_lookups_share_identity() {
        let mut table = TypeTable::new();
        let a = table.get_prim(PrimKind::Int);
        let b = table.get_prim(PrimKind::Int);
        assert_eq!(a, b);
    }

    #[test]
    fn func_types_distinguish_order_and_ellipsis() {
        let mut table = TypeTable::new();
        let r = table.get_prim(PrimKind::Float);
        let a = table.get_prim(PrimKind::Int);
        let b = table.get_prim(PrimKind::Bool);

        let f1 = table.get_func(r, vec![Param::input(a), Param::input(b)], false);
        let f2 = table.get_func(r, vec![Param::input(a), Param::input(b)], false);
        let f3 = table.get_func(r, vec![Param::input(a), Param::input(b)], true);
        let f4 = table.get_func(r, vec![Param::input(b), Param::input(a)], false);

        assert_eq!(f1, f2);
        assert_ne!(f1, f3);
        assert_ne!(f1, f4);
    }

    #[test]
    fn struct_declarations_are_never_hash_consed() {
        let mut table = TypeTable::new();
        let s1 = table.create_struct("Point2".to_string(), 2);
        let s2 = table.create_struct("Point2".to_string(), 2);
        assert_ne!(s1, s2, "two struct declarations must yield distinct identities");
    }

    #[test]
    fn array_sized_vs_unsized_distinct() {
        let mut table = TypeTable::new();
        let elem = table.get_prim(PrimKind::Float);
        let sized = table.get_array_sized(elem, 3);
        let unsized_ = table.get_array_unsized(elem);
        assert_ne!(sized, unsized_);
    }

    #[test]
    fn finalize_struct_fills_field_slots() {
        let mut table = TypeTable::new();
        let float = table.get_prim(PrimKind::Float);
        let id = table.create_struct("Pair".to_string(), 1);
        table.finalize_struct(id, vec![Field { name: "x".to_string(), ty: float }]);
        assert_eq!(table.struct_field(id, "x").unwrap().0, 0);
    }
}
