//! The context: an arena owning the uniqued type table and constant pool.
//!
//! Everything a module references by [`Type`] or [`Const`] handle lives
//! here. Handles from the same context compare by identity; across
//! contexts, [`Context::types_structurally_eq`] compares structure. Once a
//! handle is published the term behind it never changes, so shared reads
//! are safe wherever the context itself can be shared.

use std::collections::HashMap;

use lhd_types::{ApInt, Logic, LogicBit, TimeValue};

use crate::{Const, ConstData, ConstKind, IrError, Type, TypeKind};

/// Arena owning uniqued types and constants.
#[derive(Debug, Default)]
pub struct Context {
    types: Vec<TypeKind>,
    type_ids: HashMap<TypeKind, Type>,
    consts: Vec<ConstData>,
    const_ids: HashMap<ConstData, Const>,
}

impl Context {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    // ---- types ----

    /// Intern a type term, returning the unique handle for its content.
    pub fn ty(&mut self, kind: TypeKind) -> Type {
        if let Some(ty) = self.type_ids.get(&kind) {
            return *ty;
        }
        let ty = Type::new(self.types.len());
        self.types.push(kind.clone());
        self.type_ids.insert(kind, ty);
        ty
    }

    /// The structural content behind a type handle.
    pub fn kind(&self, ty: Type) -> &TypeKind {
        &self.types[ty.index()]
    }

    /// The void type.
    pub fn void_ty(&mut self) -> Type {
        self.ty(TypeKind::Void)
    }

    /// The label type of basic-block targets.
    pub fn label_ty(&mut self) -> Type {
        self.ty(TypeKind::Label)
    }

    /// The simulation time type.
    pub fn time_ty(&mut self) -> Type {
        self.ty(TypeKind::Time)
    }

    /// An integer type; `width` must be at least one.
    pub fn int_ty(&mut self, width: u32) -> Type {
        assert!(width >= 1, "integer width must be at least one bit");
        self.ty(TypeKind::Int(width))
    }

    /// A logic vector type; `width` must be at least one.
    pub fn logic_ty(&mut self, width: u32) -> Type {
        assert!(width >= 1, "logic width must be at least one bit");
        self.ty(TypeKind::Logic(width))
    }

    /// An aggregate type with the given ordered fields.
    pub fn struct_ty(&mut self, fields: Vec<Type>) -> Type {
        self.ty(TypeKind::Struct(fields))
    }

    /// A fixed-length array type.
    pub fn array_ty(&mut self, elem: Type, length: usize) -> Type {
        self.ty(TypeKind::Array(elem, length))
    }

    /// A typed address.
    pub fn ptr_ty(&mut self, elem: Type) -> Type {
        self.ty(TypeKind::Ptr(elem))
    }

    /// A signal carrying the element type.
    pub fn signal_ty(&mut self, elem: Type) -> Type {
        self.ty(TypeKind::Signal(elem))
    }

    /// A function signature.
    pub fn func_ty(&mut self, inputs: Vec<Type>, outputs: Vec<Type>) -> Type {
        self.ty(TypeKind::Func(inputs, outputs))
    }

    /// An entity/process signature over signal element types.
    pub fn comp_ty(&mut self, inputs: Vec<Type>, outputs: Vec<Type>) -> Type {
        self.ty(TypeKind::Comp(inputs, outputs))
    }

    // ---- type queries ----

    /// Whether `ty` is an integer type of the given width.
    pub fn is_int(&self, ty: Type, width: u32) -> bool {
        matches!(self.kind(ty), TypeKind::Int(w) if *w == width)
    }

    /// Whether `ty` is a logic type of the given width.
    pub fn is_logic(&self, ty: Type, width: u32) -> bool {
        matches!(self.kind(ty), TypeKind::Logic(w) if *w == width)
    }

    /// The bit width of an integer or logic type.
    pub fn width(&self, ty: Type) -> Option<u32> {
        match self.kind(ty) {
            TypeKind::Int(w) | TypeKind::Logic(w) => Some(*w),
            _ => None,
        }
    }

    /// The element type behind a pointer.
    pub fn ptr_elem(&self, ty: Type) -> Option<Type> {
        match self.kind(ty) {
            TypeKind::Ptr(elem) => Some(*elem),
            _ => None,
        }
    }

    /// The element type carried by a signal.
    pub fn signal_elem(&self, ty: Type) -> Option<Type> {
        match self.kind(ty) {
            TypeKind::Signal(elem) => Some(*elem),
            _ => None,
        }
    }

    /// The ordered fields of a struct type.
    pub fn struct_fields(&self, ty: Type) -> Option<&[Type]> {
        match self.kind(ty) {
            TypeKind::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Input and output type lists of a function or component signature.
    pub fn signature(&self, ty: Type) -> Option<(&[Type], &[Type])> {
        match self.kind(ty) {
            TypeKind::Func(ins, outs) | TypeKind::Comp(ins, outs) => {
                Some((ins.as_slice(), outs.as_slice()))
            }
            _ => None,
        }
    }

    /// Structural equality across contexts. Within one context prefer
    /// plain handle equality.
    pub fn types_structurally_eq(&self, a: Type, other: &Context, b: Type) -> bool {
        match (self.kind(a), other.kind(b)) {
            (TypeKind::Void, TypeKind::Void)
            | (TypeKind::Label, TypeKind::Label)
            | (TypeKind::Time, TypeKind::Time) => true,
            (TypeKind::Int(x), TypeKind::Int(y)) | (TypeKind::Logic(x), TypeKind::Logic(y)) => {
                x == y
            }
            (TypeKind::Struct(xs), TypeKind::Struct(ys)) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys)
                        .all(|(x, y)| self.types_structurally_eq(*x, other, *y))
            }
            (TypeKind::Array(x, n), TypeKind::Array(y, m)) => {
                n == m && self.types_structurally_eq(*x, other, *y)
            }
            (TypeKind::Ptr(x), TypeKind::Ptr(y)) | (TypeKind::Signal(x), TypeKind::Signal(y)) => {
                self.types_structurally_eq(*x, other, *y)
            }
            (TypeKind::Func(xi, xo), TypeKind::Func(yi, yo))
            | (TypeKind::Comp(xi, xo), TypeKind::Comp(yi, yo)) => {
                xi.len() == yi.len()
                    && xo.len() == yo.len()
                    && xi
                        .iter()
                        .zip(yi)
                        .chain(xo.iter().zip(yo))
                        .all(|(x, y)| self.types_structurally_eq(*x, other, *y))
            }
            _ => false,
        }
    }

    // ---- constants ----

    fn intern_const(&mut self, data: ConstData) -> Const {
        if let Some(c) = self.const_ids.get(&data) {
            return *c;
        }
        let c = Const::new(self.consts.len());
        self.consts.push(data.clone());
        self.const_ids.insert(data, c);
        c
    }

    /// Intern an integer constant; the type is derived from the width.
    pub fn const_int(&mut self, value: ApInt) -> Const {
        let ty = self.int_ty(value.width());
        self.intern_const(ConstData {
            ty,
            kind: ConstKind::Int(value),
        })
    }

    /// Intern a logic constant; the type is derived from the width.
    pub fn const_logic(&mut self, value: Logic) -> Const {
        let ty = self.logic_ty(value.width());
        self.intern_const(ConstData {
            ty,
            kind: ConstKind::Logic(value),
        })
    }

    /// Intern a time constant.
    pub fn const_time(&mut self, value: TimeValue) -> Const {
        let ty = self.time_ty();
        self.intern_const(ConstData {
            ty,
            kind: ConstKind::Time(value),
        })
    }

    /// Intern an aggregate constant of the given struct or array type.
    pub fn const_aggregate(&mut self, ty: Type, elems: Vec<Const>) -> Const {
        debug_assert!(matches!(
            self.kind(ty),
            TypeKind::Struct(_) | TypeKind::Array(..)
        ));
        self.intern_const(ConstData {
            ty,
            kind: ConstKind::Aggregate(elems),
        })
    }

    /// The payload behind a constant handle.
    pub fn const_data(&self, konst: Const) -> &ConstData {
        &self.consts[konst.index()]
    }

    /// The canonical null value of a type: zero for integers, all-`0`
    /// for logic, time zero, and the element-wise null for aggregates.
    /// Signals and pointers have no null and fail as unrepresentable.
    pub fn null_of(&mut self, ty: Type) -> Result<Const, IrError> {
        match self.kind(ty).clone() {
            TypeKind::Int(w) => Ok(self.const_int(ApInt::zero(w))),
            TypeKind::Logic(w) => Ok(self.const_logic(Logic::new(w, LogicBit::O))),
            TypeKind::Time => Ok(self.const_time(TimeValue::ZERO)),
            TypeKind::Struct(fields) => {
                let elems = fields
                    .into_iter()
                    .map(|f| self.null_of(f))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(self.intern_const(ConstData {
                    ty,
                    kind: ConstKind::Aggregate(elems),
                }))
            }
            TypeKind::Array(elem, len) => {
                let null = self.null_of(elem)?;
                Ok(self.intern_const(ConstData {
                    ty,
                    kind: ConstKind::Aggregate(vec![null; len]),
                }))
            }
            _ => Err(IrError::Unrepresentable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_structure_yields_identical_handles() {
        let mut ctx = Context::new();
        let a = ctx.int_ty(8);
        let b = ctx.int_ty(8);
        assert_eq!(a, b);
        let s1 = {
            let f = vec![ctx.int_ty(8), ctx.logic_ty(4)];
            ctx.struct_ty(f)
        };
        let s2 = {
            let f = vec![ctx.int_ty(8), ctx.logic_ty(4)];
            ctx.struct_ty(f)
        };
        assert_eq!(s1, s2);
        assert_ne!(ctx.int_ty(8), ctx.int_ty(9));
    }

    #[test]
    fn structural_equality_across_contexts() {
        let mut a = Context::new();
        let mut b = Context::new();
        // Allocate in different orders so the raw indices differ.
        let _pad = b.logic_ty(17);
        let ta = {
            let elem = a.int_ty(8);
            a.signal_ty(elem)
        };
        let tb = {
            let elem = b.int_ty(8);
            b.signal_ty(elem)
        };
        assert!(a.types_structurally_eq(ta, &b, tb));
        let tc = {
            let elem = b.int_ty(9);
            b.signal_ty(elem)
        };
        assert!(!a.types_structurally_eq(ta, &b, tc));
    }

    #[test]
    fn constants_unique_by_type_and_bits() {
        let mut ctx = Context::new();
        let a = ctx.const_int(ApInt::from_u64(8, 42));
        let b = ctx.const_int(ApInt::from_u64(8, 42));
        let c = ctx.const_int(ApInt::from_u64(16, 42));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn null_values() {
        let mut ctx = Context::new();
        let i8t = ctx.int_ty(8);
        let null = ctx.null_of(i8t).unwrap();
        assert_eq!(ctx.const_data(null).as_int().unwrap(), &ApInt::zero(8));

        let arr = ctx.array_ty(i8t, 3);
        let null = ctx.null_of(arr).unwrap();
        match &ctx.const_data(null).kind {
            ConstKind::Aggregate(elems) => assert_eq!(elems.len(), 3),
            other => panic!("expected aggregate null, got {other:?}"),
        }

        let sig = ctx.signal_ty(i8t);
        assert_eq!(ctx.null_of(sig), Err(IrError::Unrepresentable));
    }
}
