//! Constant folding over integer and logic arithmetic.
//!
//! Instructions whose operands are all constants are computed with the
//! arbitrary-precision routines, replaced by the resulting constant and
//! erased. A constant zero divisor is reported and the instruction left
//! untouched.

use core::cmp::Ordering;

use lhd_ir::{
    BinaryOp, CmpOp, Const, ConstKind, Context, ConvertOp, Diagnostic, DiagnosticSink,
    InstKind, IrError, Module, UnaryOp, UnitKind, Value,
};
use lhd_types::{ApInt, Logic};
use tracing::trace;

/// Fold every unit of the module. Returns the number of folded
/// instructions.
pub fn fold_module(
    module: &mut Module,
    ctx: &mut Context,
    sink: &mut dyn DiagnosticSink,
) -> usize {
    let units: Vec<Value> = module.units().collect();
    units
        .into_iter()
        .map(|unit| fold_unit(module, ctx, unit, sink))
        .sum()
}

/// Fold one unit to a fixed point. Returns the number of folded
/// instructions.
pub fn fold_unit(
    module: &mut Module,
    ctx: &mut Context,
    unit: Value,
    sink: &mut dyn DiagnosticSink,
) -> usize {
    let mut folded = 0;
    loop {
        let insts: Vec<Value> = match module.unit(unit).kind {
            UnitKind::Entity => module.entity_insts(unit).collect(),
            UnitKind::Process | UnitKind::Function => {
                let blocks: Vec<Value> = module.blocks(unit).collect();
                blocks
                    .into_iter()
                    .flat_map(|b| module.insts(b).collect::<Vec<_>>())
                    .collect()
            }
            UnitKind::Declaration => return folded,
        };
        let mut changed = false;
        for inst in insts {
            match try_fold(module, ctx, inst) {
                Ok(Some(konst)) => {
                    let replacement = module.const_value(ctx, konst);
                    trace!(?inst, ?konst, "folded instruction");
                    module.replace_all_uses_with(inst, replacement);
                    module.erase_inst(inst);
                    folded += 1;
                    changed = true;
                }
                Ok(None) => {}
                Err(err) => {
                    debug_assert_eq!(err, IrError::DivZero);
                    sink.report(Diagnostic::from(err));
                }
            }
        }
        if !changed {
            return folded;
        }
    }
}

/// The constant payload of a value, when it is a materialized constant.
fn const_of(module: &Module, ctx: &Context, value: Value) -> Option<ConstKind> {
    let konst = module.value_const(value)?;
    Some(ctx.const_data(konst).kind.clone())
}

/// Compute the folded replacement for an instruction, if its operands
/// allow it. `Err(DivZero)` reports a constant zero divisor.
fn try_fold(module: &Module, ctx: &mut Context, inst: Value) -> Result<Option<Const>, IrError> {
    let kind = module.inst(inst).kind.clone();
    let result_ty = module.inst(inst).ty;
    match kind {
        InstKind::Unary {
            op: UnaryOp::Not,
            arg,
        } => match const_of(module, ctx, arg) {
            Some(ConstKind::Int(v)) => Ok(Some(ctx.const_int(v.not()))),
            Some(ConstKind::Logic(v)) => Ok(Some(ctx.const_logic(v.not()))),
            _ => Ok(None),
        },
        InstKind::Binary { op, lhs, rhs } => {
            let (Some(a), Some(b)) = (const_of(module, ctx, lhs), const_of(module, ctx, rhs))
            else {
                return Ok(None);
            };
            match (a, b) {
                (ConstKind::Int(a), ConstKind::Int(b)) => fold_int_binary(ctx, op, &a, &b),
                (ConstKind::Logic(a), ConstKind::Logic(b)) => {
                    let result = match op {
                        BinaryOp::And => a.and(&b),
                        BinaryOp::Or => a.or(&b),
                        BinaryOp::Xor => a.xor(&b),
                        _ => return Ok(None),
                    };
                    match result {
                        Ok(v) => Ok(Some(ctx.const_logic(v))),
                        Err(_) => Ok(None),
                    }
                }
                _ => Ok(None),
            }
        }
        InstKind::Cmp { op, lhs, rhs } => {
            let (Some(a), Some(b)) = (const_of(module, ctx, lhs), const_of(module, ctx, rhs))
            else {
                return Ok(None);
            };
            let truth = match (a, b) {
                (ConstKind::Int(a), ConstKind::Int(b)) => {
                    let Ok(unsigned) = a.ucmp(&b) else {
                        return Ok(None);
                    };
                    let Ok(signed) = a.scmp(&b) else {
                        return Ok(None);
                    };
                    match op {
                        CmpOp::Eq => unsigned == Ordering::Equal,
                        CmpOp::Ne => unsigned != Ordering::Equal,
                        CmpOp::Ugt => unsigned == Ordering::Greater,
                        CmpOp::Ult => unsigned == Ordering::Less,
                        CmpOp::Uge => unsigned != Ordering::Less,
                        CmpOp::Ule => unsigned != Ordering::Greater,
                        CmpOp::Sgt => signed == Ordering::Greater,
                        CmpOp::Slt => signed == Ordering::Less,
                        CmpOp::Sge => signed != Ordering::Less,
                        CmpOp::Sle => signed != Ordering::Greater,
                    }
                }
                (ConstKind::Logic(a), ConstKind::Logic(b)) => match op {
                    CmpOp::Eq => a == b,
                    CmpOp::Ne => a != b,
                    _ => return Ok(None),
                },
                _ => return Ok(None),
            };
            Ok(Some(ctx.const_int(ApInt::from_u64(1, truth as u64))))
        }
        InstKind::Convert { op, arg } => {
            let target_width = match ctx.width(result_ty) {
                Some(w) => w,
                None => return Ok(None),
            };
            match (op, const_of(module, ctx, arg)) {
                (ConvertOp::Trunc, Some(ConstKind::Int(v))) => {
                    Ok(v.trunc(target_width).ok().map(|v| ctx.const_int(v)))
                }
                (ConvertOp::Zext, Some(ConstKind::Int(v))) => {
                    Ok(v.zext(target_width).ok().map(|v| ctx.const_int(v)))
                }
                (ConvertOp::Sext, Some(ConstKind::Int(v))) => {
                    Ok(v.sext(target_width).ok().map(|v| ctx.const_int(v)))
                }
                (ConvertOp::Lmap, Some(ConstKind::Int(v))) => {
                    Ok(Some(ctx.const_logic(Logic::from_apint(&v))))
                }
                (ConvertOp::Lmap, Some(ConstKind::Logic(v))) => {
                    Ok(v.to_apint().map(|v| ctx.const_int(v)))
                }
                _ => Ok(None),
            }
        }
        // Opcodes whose operands are not required to be constant.
        _ => Ok(None),
    }
}

fn fold_int_binary(
    ctx: &mut Context,
    op: BinaryOp,
    a: &ApInt,
    b: &ApInt,
) -> Result<Option<Const>, IrError> {
    let shift_amount = || b.to_u64().map(|s| s.min(u64::from(u32::MAX)) as u32);
    let result = match op {
        BinaryOp::Add => a.add(b),
        BinaryOp::Sub => a.sub(b),
        BinaryOp::Umul => a.umul(b),
        BinaryOp::Smul => a.smul(b),
        BinaryOp::Udiv | BinaryOp::Sdiv | BinaryOp::Urem | BinaryOp::Srem | BinaryOp::Umod
        | BinaryOp::Smod => {
            if b.is_zero() {
                return Err(IrError::DivZero);
            }
            match op {
                BinaryOp::Udiv => a.udiv(b),
                BinaryOp::Sdiv => a.sdiv(b),
                BinaryOp::Urem | BinaryOp::Umod => a.urem(b),
                BinaryOp::Srem => a.srem(b),
                _ => a.smod(b),
            }
        }
        BinaryOp::Lsl => match shift_amount() {
            Ok(s) => Ok(a.lsl(s)),
            Err(_) => Ok(ApInt::zero(a.width())),
        },
        BinaryOp::Lsr => match shift_amount() {
            Ok(s) => Ok(a.lsr(s)),
            Err(_) => Ok(ApInt::zero(a.width())),
        },
        BinaryOp::Asr => match shift_amount() {
            Ok(s) => Ok(a.asr(s)),
            Err(_) => Ok(a.asr(a.width())),
        },
        BinaryOp::And => a.and(b),
        BinaryOp::Or => a.or(b),
        BinaryOp::Xor => a.xor(b),
    };
    match result {
        Ok(v) => Ok(Some(ctx.const_int(v))),
        // Width mismatches are a verifier concern; leave the
        // instruction alone here.
        Err(_) => Ok(None),
    }
}
