//! Positioned instruction builder.
//!
//! The builder checks the operand contract of every opcode before
//! constructing the instruction, appends the result to its current
//! container, and hands back the instruction value. It is the type-safe
//! front door of the IR; the assembly reader bypasses it and trusts the
//! written types instead.

use lhd_types::{ApInt, Logic, TimeValue};

use crate::{
    BinaryOp, CmpOp, Const, Context, ConvertOp, InstKind, IrError, Module, Type, TypeKind,
    UnaryOp, UnitKind, Value, ValueData,
};

/// Builds instructions at the end of a block or entity body.
pub struct Builder<'a> {
    /// The module being built into.
    pub module: &'a mut Module,
    /// The context owning types and constants.
    pub ctx: &'a mut Context,
    pos: Value,
}

impl<'a> Builder<'a> {
    /// A builder appending to the given block or entity.
    pub fn new(module: &'a mut Module, ctx: &'a mut Context, pos: Value) -> Self {
        Builder { module, ctx, pos }
    }

    /// Move the insertion point to another block or entity.
    pub fn set_pos(&mut self, pos: Value) {
        self.pos = pos;
    }

    /// The current insertion container.
    pub fn pos(&self) -> Value {
        self.pos
    }

    fn ty_of(&mut self, value: Value) -> Type {
        self.module.value_ty(self.ctx, value)
    }

    fn push(&mut self, kind: InstKind, ty: Type) -> Result<Value, IrError> {
        let inst = self.module.build_inst(kind, ty, None);
        match self.module.append_inst(self.pos, inst) {
            Ok(()) => Ok(inst),
            Err(err) => {
                self.module.erase_inst(inst);
                Err(err)
            }
        }
    }

    // ---- constants ----

    /// Materialize a context constant.
    pub fn konst(&mut self, konst: Const) -> Value {
        self.module.const_value(self.ctx, konst)
    }

    /// An integer constant value.
    pub fn int(&mut self, width: u32, value: u64) -> Value {
        let konst = self.ctx.const_int(ApInt::from_u64(width, value));
        self.konst(konst)
    }

    /// An integer constant from an arbitrary-precision value.
    pub fn apint(&mut self, value: ApInt) -> Value {
        let konst = self.ctx.const_int(value);
        self.konst(konst)
    }

    /// A logic constant from its literal text.
    pub fn logic(&mut self, text: &str) -> Result<Value, IrError> {
        let value = Logic::parse(text)?;
        let konst = self.ctx.const_logic(value);
        Ok(self.konst(konst))
    }

    /// A time constant.
    pub fn time(&mut self, value: TimeValue) -> Value {
        let konst = self.ctx.const_time(value);
        self.konst(konst)
    }

    // ---- value computation ----

    fn check_arith_ty(&mut self, ty: Type) -> Result<(), IrError> {
        match self.ctx.kind(ty) {
            TypeKind::Int(_) | TypeKind::Logic(_) => Ok(()),
            _ => Err(IrError::TypeMismatch),
        }
    }

    /// A binary operation chosen at run time; the named wrappers below
    /// are the usual entry points.
    pub fn binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        let lhs_ty = self.ty_of(lhs);
        let rhs_ty = self.ty_of(rhs);
        self.check_arith_ty(lhs_ty)?;
        if op.is_shift() {
            if !matches!(self.ctx.kind(rhs_ty), TypeKind::Int(_)) {
                return Err(IrError::TypeMismatch);
            }
        } else if lhs_ty != rhs_ty {
            return Err(IrError::TypeMismatch);
        }
        self.push(InstKind::Binary { op, lhs, rhs }, lhs_ty)
    }

    /// Wrapping addition.
    pub fn add(&mut self, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::Add, lhs, rhs)
    }

    /// Wrapping subtraction.
    pub fn sub(&mut self, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::Sub, lhs, rhs)
    }

    /// Unsigned multiplication.
    pub fn umul(&mut self, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::Umul, lhs, rhs)
    }

    /// Signed multiplication.
    pub fn smul(&mut self, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::Smul, lhs, rhs)
    }

    /// Unsigned division.
    pub fn udiv(&mut self, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::Udiv, lhs, rhs)
    }

    /// Signed division.
    pub fn sdiv(&mut self, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::Sdiv, lhs, rhs)
    }

    /// Unsigned remainder.
    pub fn urem(&mut self, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::Urem, lhs, rhs)
    }

    /// Signed remainder.
    pub fn srem(&mut self, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::Srem, lhs, rhs)
    }

    /// Unsigned modulo.
    pub fn umod(&mut self, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::Umod, lhs, rhs)
    }

    /// Signed modulo.
    pub fn smod(&mut self, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::Smod, lhs, rhs)
    }

    /// Logical shift left.
    pub fn lsl(&mut self, lhs: Value, amount: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::Lsl, lhs, amount)
    }

    /// Logical shift right.
    pub fn lsr(&mut self, lhs: Value, amount: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::Lsr, lhs, amount)
    }

    /// Arithmetic shift right.
    pub fn asr(&mut self, lhs: Value, amount: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::Asr, lhs, amount)
    }

    /// Bitwise and.
    pub fn and(&mut self, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::And, lhs, rhs)
    }

    /// Bitwise or.
    pub fn or(&mut self, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::Or, lhs, rhs)
    }

    /// Bitwise exclusive or.
    pub fn xor(&mut self, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        self.binary(BinaryOp::Xor, lhs, rhs)
    }

    /// Bitwise complement.
    pub fn not(&mut self, arg: Value) -> Result<Value, IrError> {
        let ty = self.ty_of(arg);
        self.check_arith_ty(ty)?;
        self.push(
            InstKind::Unary {
                op: UnaryOp::Not,
                arg,
            },
            ty,
        )
    }

    /// Comparison producing `Int(1)`.
    pub fn cmp(&mut self, op: CmpOp, lhs: Value, rhs: Value) -> Result<Value, IrError> {
        let lhs_ty = self.ty_of(lhs);
        let rhs_ty = self.ty_of(rhs);
        self.check_arith_ty(lhs_ty)?;
        if lhs_ty != rhs_ty {
            return Err(IrError::TypeMismatch);
        }
        let bit = self.ctx.int_ty(1);
        self.push(InstKind::Cmp { op, lhs, rhs }, bit)
    }

    /// Width conversion.
    pub fn convert(&mut self, op: ConvertOp, arg: Value, target: Type) -> Result<Value, IrError> {
        let arg_ty = self.ty_of(arg);
        let from = self.ctx.width(arg_ty).ok_or(IrError::TypeMismatch)?;
        let to = self.ctx.width(target).ok_or(IrError::TypeMismatch)?;
        let ok = match op {
            ConvertOp::Trunc => to <= from,
            ConvertOp::Zext | ConvertOp::Sext => to >= from,
            ConvertOp::Lmap => to == from,
        };
        if !ok {
            return Err(IrError::TypeMismatch);
        }
        self.push(InstKind::Convert { op, arg }, target)
    }

    /// Truncate to a narrower type.
    pub fn trunc(&mut self, arg: Value, target: Type) -> Result<Value, IrError> {
        self.convert(ConvertOp::Trunc, arg, target)
    }

    /// Zero-extend to a wider type.
    pub fn zext(&mut self, arg: Value, target: Type) -> Result<Value, IrError> {
        self.convert(ConvertOp::Zext, arg, target)
    }

    /// Sign-extend to a wider type.
    pub fn sext(&mut self, arg: Value, target: Type) -> Result<Value, IrError> {
        self.convert(ConvertOp::Sext, arg, target)
    }

    /// Reinterpret between integer and logic of the same width.
    pub fn lmap(&mut self, arg: Value, target: Type) -> Result<Value, IrError> {
        self.convert(ConvertOp::Lmap, arg, target)
    }

    /// Slice of an aggregate or vector.
    pub fn extract(&mut self, arg: Value, index: usize, length: usize) -> Result<Value, IrError> {
        let arg_ty = self.ty_of(arg);
        let result = match self.ctx.kind(arg_ty).clone() {
            TypeKind::Int(w) => {
                if index + length > w as usize {
                    return Err(IrError::TypeMismatch);
                }
                self.ctx.int_ty(length as u32)
            }
            TypeKind::Logic(w) => {
                if index + length > w as usize {
                    return Err(IrError::TypeMismatch);
                }
                self.ctx.logic_ty(length as u32)
            }
            TypeKind::Array(elem, n) => {
                if index + length > n {
                    return Err(IrError::TypeMismatch);
                }
                if length == 1 {
                    elem
                } else {
                    self.ctx.array_ty(elem, length)
                }
            }
            TypeKind::Struct(fields) => {
                *fields.get(index).ok_or(IrError::TypeMismatch)?
            }
            _ => return Err(IrError::TypeMismatch),
        };
        self.push(InstKind::Extract { arg, index, length }, result)
    }

    /// Replace a field or element inside an aggregate.
    pub fn insert(&mut self, target: Value, value: Value, index: usize) -> Result<Value, IrError> {
        let target_ty = self.ty_of(target);
        let value_ty = self.ty_of(value);
        let expected = match self.ctx.kind(target_ty) {
            TypeKind::Array(elem, n) => {
                if index >= *n {
                    return Err(IrError::TypeMismatch);
                }
                *elem
            }
            TypeKind::Struct(fields) => *fields.get(index).ok_or(IrError::TypeMismatch)?,
            _ => return Err(IrError::TypeMismatch),
        };
        if expected != value_ty {
            return Err(IrError::TypeMismatch);
        }
        self.push(
            InstKind::Insert {
                target,
                value,
                index,
            },
            target_ty,
        )
    }

    /// Concatenate logic vectors.
    pub fn cat(&mut self, parts: Vec<Value>) -> Result<Value, IrError> {
        let mut width = 0;
        for part in &parts {
            let ty = self.ty_of(*part);
            match self.ctx.kind(ty) {
                TypeKind::Logic(w) => width += *w,
                _ => return Err(IrError::TypeMismatch),
            }
        }
        if width == 0 {
            return Err(IrError::TypeMismatch);
        }
        let ty = self.ctx.logic_ty(width);
        self.push(InstKind::Cat { parts }, ty)
    }

    /// Select bit ranges out of a logic vector.
    pub fn sel(&mut self, arg: Value, ranges: Vec<(usize, usize)>) -> Result<Value, IrError> {
        let arg_ty = self.ty_of(arg);
        let w = match self.ctx.kind(arg_ty) {
            TypeKind::Logic(w) => *w as usize,
            _ => return Err(IrError::TypeMismatch),
        };
        let mut total = 0;
        for (offset, length) in &ranges {
            if offset + length > w {
                return Err(IrError::TypeMismatch);
            }
            total += length;
        }
        if total == 0 {
            return Err(IrError::TypeMismatch);
        }
        let ty = self.ctx.logic_ty(total as u32);
        self.push(InstKind::Sel { arg, ranges }, ty)
    }

    // ---- memory and signals ----

    /// Process-local storage of the given element type.
    pub fn alloc(&mut self, elem: Type, init: Option<Value>) -> Result<Value, IrError> {
        if let Some(init) = init {
            if self.ty_of(init) != elem {
                return Err(IrError::TypeMismatch);
            }
        }
        let ty = self.ctx.ptr_ty(elem);
        self.push(InstKind::Alloc { init }, ty)
    }

    /// Signal declaration, entity level.
    pub fn sig(&mut self, elem: Type, init: Option<Value>) -> Result<Value, IrError> {
        if let Some(init) = init {
            if self.ty_of(init) != elem {
                return Err(IrError::TypeMismatch);
            }
        }
        let ty = self.ctx.signal_ty(elem);
        self.push(InstKind::Sig { init }, ty)
    }

    /// Memory read.
    pub fn load(&mut self, ptr: Value) -> Result<Value, IrError> {
        let ptr_ty = self.ty_of(ptr);
        let elem = self.ctx.ptr_elem(ptr_ty).ok_or(IrError::TypeMismatch)?;
        self.push(InstKind::Load { ptr }, elem)
    }

    /// Memory write.
    pub fn store(&mut self, ptr: Value, value: Value) -> Result<Value, IrError> {
        let ptr_ty = self.ty_of(ptr);
        let elem = self.ctx.ptr_elem(ptr_ty).ok_or(IrError::TypeMismatch)?;
        if self.ty_of(value) != elem {
            return Err(IrError::TypeMismatch);
        }
        let void = self.ctx.void_ty();
        self.push(InstKind::Store { ptr, value }, void)
    }

    /// Read the current value of a signal.
    pub fn probe(&mut self, signal: Value) -> Result<Value, IrError> {
        let sig_ty = self.ty_of(signal);
        let elem = self.ctx.signal_elem(sig_ty).ok_or(IrError::TypeMismatch)?;
        self.push(InstKind::Probe { signal }, elem)
    }

    /// Schedule a signal change, optionally after a time delay.
    pub fn drive(
        &mut self,
        signal: Value,
        value: Value,
        delay: Option<Value>,
    ) -> Result<Value, IrError> {
        let sig_ty = self.ty_of(signal);
        let elem = self.ctx.signal_elem(sig_ty).ok_or(IrError::TypeMismatch)?;
        if self.ty_of(value) != elem {
            return Err(IrError::TypeMismatch);
        }
        if let Some(delay) = delay {
            let delay_ty = self.ty_of(delay);
            if !matches!(self.ctx.kind(delay_ty), TypeKind::Time) {
                return Err(IrError::TypeMismatch);
            }
        }
        let void = self.ctx.void_ty();
        self.push(
            InstKind::Drive {
                signal,
                value,
                delay,
            },
            void,
        )
    }

    /// Storage element gated by an `Int(1)` enable.
    pub fn reg(&mut self, signal: Value, value: Value, enable: Value) -> Result<Value, IrError> {
        let sig_ty = self.ty_of(signal);
        let elem = self.ctx.signal_elem(sig_ty).ok_or(IrError::TypeMismatch)?;
        if self.ty_of(value) != elem {
            return Err(IrError::TypeMismatch);
        }
        let en_ty = self.ty_of(enable);
        if !self.ctx.is_int(en_ty, 1) {
            return Err(IrError::TypeMismatch);
        }
        let void = self.ctx.void_ty();
        self.push(
            InstKind::Reg {
                signal,
                value,
                enable,
            },
            void,
        )
    }

    // ---- control flow ----

    fn expect_block(&self, value: Value) -> Result<(), IrError> {
        match self.module.data(value) {
            ValueData::Block(_) => Ok(()),
            _ => Err(IrError::TypeMismatch),
        }
    }

    /// Unconditional branch.
    pub fn br(&mut self, dest: Value) -> Result<Value, IrError> {
        self.expect_block(dest)?;
        let void = self.ctx.void_ty();
        self.push(InstKind::Br { dest }, void)
    }

    /// Conditional branch on an `Int(1)` value.
    pub fn br_cond(
        &mut self,
        cond: Value,
        if_true: Value,
        if_false: Value,
    ) -> Result<Value, IrError> {
        let cond_ty = self.ty_of(cond);
        if !self.ctx.is_int(cond_ty, 1) {
            return Err(IrError::TypeMismatch);
        }
        self.expect_block(if_true)?;
        self.expect_block(if_false)?;
        let void = self.ctx.void_ty();
        self.push(
            InstKind::BrCond {
                cond,
                if_true,
                if_false,
            },
            void,
        )
    }

    /// Multi-way branch; cases must carry constants of the key's type.
    pub fn switch(
        &mut self,
        key: Value,
        cases: Vec<(Value, Value)>,
        default: Option<Value>,
    ) -> Result<Value, IrError> {
        let key_ty = self.ty_of(key);
        for (value, dest) in &cases {
            if self.ty_of(*value) != key_ty {
                return Err(IrError::TypeMismatch);
            }
            self.expect_block(*dest)?;
        }
        if let Some(default) = default {
            self.expect_block(default)?;
        }
        let void = self.ctx.void_ty();
        self.push(
            InstKind::Switch {
                key,
                cases,
                default,
            },
            void,
        )
    }

    /// Return, with values matching the unit's outputs.
    pub fn ret(&mut self, values: Vec<Value>) -> Result<Value, IrError> {
        let void = self.ctx.void_ty();
        self.push(InstKind::Ret { values }, void)
    }

    /// Suspend for a relative or absolute time.
    pub fn wait_time(&mut self, delay: Value, absolute: bool) -> Result<Value, IrError> {
        let delay_ty = self.ty_of(delay);
        if !matches!(self.ctx.kind(delay_ty), TypeKind::Time) {
            return Err(IrError::TypeMismatch);
        }
        let void = self.ctx.void_ty();
        self.push(InstKind::WaitTime { delay, absolute }, void)
    }

    /// Suspend until the observed value changes, resuming at `dest`.
    pub fn wait_cond(&mut self, cond: Value, dest: Value) -> Result<Value, IrError> {
        let cond_ty = self.ty_of(cond);
        if !self.ctx.is_int(cond_ty, 1) {
            return Err(IrError::TypeMismatch);
        }
        self.expect_block(dest)?;
        let void = self.ctx.void_ty();
        self.push(InstKind::WaitCond { cond, dest }, void)
    }

    /// Suspend until any input changes.
    pub fn wait_any(&mut self) -> Result<Value, IrError> {
        let void = self.ctx.void_ty();
        self.push(InstKind::WaitAny, void)
    }

    // ---- calls and instantiation ----

    /// Call a function; the result is the function's single output, or
    /// void for none.
    pub fn call(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, IrError> {
        let sig = match self.module.data(callee) {
            ValueData::Unit(data) if data.kind != UnitKind::Entity => data.sig,
            _ => return Err(IrError::TypeMismatch),
        };
        let (ins, outs) = self.ctx.signature(sig).ok_or(IrError::TypeMismatch)?;
        if ins.len() != args.len() {
            return Err(IrError::TypeMismatch);
        }
        let (ins, outs) = (ins.to_vec(), outs.to_vec());
        for (arg, expected) in args.iter().zip(&ins) {
            if self.ty_of(*arg) != *expected {
                return Err(IrError::TypeMismatch);
            }
        }
        let ty = match outs.first() {
            Some(ty) => *ty,
            None => self.ctx.void_ty(),
        };
        self.push(InstKind::Call { callee, args }, ty)
    }

    /// Instantiate an entity or process with matching input and output
    /// signals.
    pub fn inst(
        &mut self,
        callee: Value,
        inputs: Vec<Value>,
        outputs: Vec<Value>,
    ) -> Result<Value, IrError> {
        let sig = match self.module.data(callee) {
            ValueData::Unit(data) => data.sig,
            _ => return Err(IrError::TypeMismatch),
        };
        let (ins, outs) = self.ctx.signature(sig).ok_or(IrError::TypeMismatch)?;
        if ins.len() != inputs.len() || outs.len() != outputs.len() {
            return Err(IrError::TypeMismatch);
        }
        let (ins, outs) = (ins.to_vec(), outs.to_vec());
        for (value, expected) in inputs.iter().zip(&ins).chain(outputs.iter().zip(&outs)) {
            if self.ty_of(*value) != *expected {
                return Err(IrError::TypeMismatch);
            }
        }
        let void = self.ctx.void_ty();
        self.push(
            InstKind::Instantiate {
                callee,
                inputs,
                outputs,
            },
            void,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process_fixture() -> (Context, Module, Value, Value) {
        let mut ctx = Context::new();
        let mut module = Module::new("test");
        let i8t = ctx.int_ty(8);
        let sig = ctx.signal_ty(i8t);
        let comp = ctx.comp_ty(vec![sig, sig], vec![sig]);
        let proc = module.create_unit(&ctx, UnitKind::Process, "p", comp);
        let block = module.create_block(proc, Some("entry".into()));
        (ctx, module, proc, block)
    }

    #[test]
    fn arithmetic_requires_matching_types() {
        let (mut ctx, mut module, proc, block) = process_fixture();
        let a = module.unit(proc).inputs[0];
        let mut b = Builder::new(&mut module, &mut ctx, block);
        let x = b.probe(a).unwrap();
        let y = b.int(8, 1);
        assert!(b.add(x, y).is_ok());
        let wide = b.int(16, 1);
        assert_eq!(b.add(x, wide), Err(IrError::TypeMismatch));
        // Signals themselves are not arithmetic values.
        assert_eq!(b.add(a, a), Err(IrError::TypeMismatch));
    }

    #[test]
    fn comparison_result_is_one_bit() {
        let (mut ctx, mut module, proc, block) = process_fixture();
        let a = module.unit(proc).inputs[0];
        let mut b = Builder::new(&mut module, &mut ctx, block);
        let x = b.probe(a).unwrap();
        let y = b.int(8, 3);
        let c = b.cmp(CmpOp::Ult, x, y).unwrap();
        let ty = b.module.value_ty(b.ctx, c);
        assert!(b.ctx.is_int(ty, 1));
    }

    #[test]
    fn drive_checks_signal_element() {
        let (mut ctx, mut module, proc, block) = process_fixture();
        let input = module.unit(proc).inputs[0];
        let out = module.unit(proc).outputs[0];
        let mut b = Builder::new(&mut module, &mut ctx, block);
        let x = b.probe(input).unwrap();
        assert!(b.drive(out, x, None).is_ok());
        let narrow = b.int(4, 0);
        assert_eq!(b.drive(out, narrow, None), Err(IrError::TypeMismatch));
        // Driving a non-signal is rejected.
        assert_eq!(b.drive(x, x, None), Err(IrError::TypeMismatch));
    }

    #[test]
    fn conversions_check_direction() {
        let (mut ctx, mut module, proc, block) = process_fixture();
        let input = module.unit(proc).inputs[0];
        let mut b = Builder::new(&mut module, &mut ctx, block);
        let x = b.probe(input).unwrap();
        let i16t = b.ctx.int_ty(16);
        let i4t = b.ctx.int_ty(4);
        assert!(b.zext(x, i16t).is_ok());
        assert!(b.trunc(x, i4t).is_ok());
        assert_eq!(b.trunc(x, i16t), Err(IrError::TypeMismatch));
        let l8t = b.ctx.logic_ty(8);
        assert!(b.lmap(x, l8t).is_ok());
    }

    #[test]
    fn extract_computes_slice_types() {
        let (mut ctx, mut module, proc, block) = process_fixture();
        let input = module.unit(proc).inputs[0];
        let mut b = Builder::new(&mut module, &mut ctx, block);
        let x = b.probe(input).unwrap();
        let slice = b.extract(x, 2, 3).unwrap();
        let ty = b.module.value_ty(b.ctx, slice);
        assert!(b.ctx.is_int(ty, 3));
        assert_eq!(b.extract(x, 6, 3), Err(IrError::TypeMismatch));
    }

    #[test]
    fn failed_builds_leave_no_garbage() {
        let (mut ctx, mut module, proc, block) = process_fixture();
        let input = module.unit(proc).inputs[0];
        let mut b = Builder::new(&mut module, &mut ctx, block);
        let x = b.probe(input).unwrap();
        let before = b.module.value_count();
        let wide = b.int(16, 1);
        let after_const = b.module.value_count();
        assert_eq!(b.add(x, wide), Err(IrError::TypeMismatch));
        assert_eq!(b.module.value_count(), after_const);
        assert_eq!(after_const, before + 1);
    }
}
