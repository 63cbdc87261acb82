//! Instruction taxonomy: opcodes, operand contracts and terminator rules.

use bitflags::bitflags;

use crate::{Type, Value};

/// Unary value operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnaryOp {
    /// Bitwise complement.
    Not,
}

/// Binary value operations over matching integer or logic operands;
/// shifts take an integer amount on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOp {
    /// Wrapping addition.
    Add,
    /// Wrapping subtraction.
    Sub,
    /// Unsigned multiplication.
    Umul,
    /// Signed multiplication.
    Smul,
    /// Unsigned division.
    Udiv,
    /// Signed division, truncating towards zero.
    Sdiv,
    /// Unsigned remainder.
    Urem,
    /// Signed remainder, sign of the dividend.
    Srem,
    /// Unsigned modulo; identical to `Urem`.
    Umod,
    /// Signed modulo, sign of the divisor.
    Smod,
    /// Logical shift left.
    Lsl,
    /// Logical shift right.
    Lsr,
    /// Arithmetic shift right.
    Asr,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
}

impl BinaryOp {
    /// Whether the right-hand operand is a shift amount rather than a
    /// value of the left-hand type.
    pub const fn is_shift(self) -> bool {
        matches!(self, Self::Lsl | Self::Lsr | Self::Asr)
    }

    /// Keyword used by the assembly form.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Umul => "mul unsigned",
            Self::Smul => "mul signed",
            Self::Udiv => "div unsigned",
            Self::Sdiv => "div signed",
            Self::Urem => "rem unsigned",
            Self::Srem => "rem signed",
            Self::Umod => "mod unsigned",
            Self::Smod => "mod signed",
            Self::Lsl => "lsl",
            Self::Lsr => "lsr",
            Self::Asr => "asr",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
        }
    }
}

/// Comparison operations; the result is always `Int(1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CmpOp {
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Signed greater-than.
    Sgt,
    /// Signed less-than.
    Slt,
    /// Signed greater-or-equal.
    Sge,
    /// Signed less-or-equal.
    Sle,
    /// Unsigned greater-than.
    Ugt,
    /// Unsigned less-than.
    Ult,
    /// Unsigned greater-or-equal.
    Uge,
    /// Unsigned less-or-equal.
    Ule,
}

impl CmpOp {
    /// Keyword used by the assembly form.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Sgt => "sgt",
            Self::Slt => "slt",
            Self::Sge => "sge",
            Self::Sle => "sle",
            Self::Ugt => "ugt",
            Self::Ult => "ult",
            Self::Uge => "uge",
            Self::Ule => "ule",
        }
    }

    /// Parse the assembly keyword.
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Some(match s {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "sgt" => Self::Sgt,
            "slt" => Self::Slt,
            "sge" => Self::Sge,
            "sle" => Self::Sle,
            "ugt" => Self::Ugt,
            "ult" => Self::Ult,
            "uge" => Self::Uge,
            "ule" => Self::Ule,
            _ => return None,
        })
    }
}

/// Width conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConvertOp {
    /// Narrow to a smaller width.
    Trunc,
    /// Widen with zero padding.
    Zext,
    /// Widen with sign replication.
    Sext,
    /// Reinterpret integer bits as logic or back, same width.
    Lmap,
}

bitflags! {
    /// The unit kinds an instruction may appear in.
    pub struct Placement: u8 {
        /// Concurrent context of an entity body.
        const ENTITY = 0b001;
        /// Sequential context of a process body.
        const PROCESS = 0b010;
        /// Pure context of a function body.
        const FUNCTION = 0b100;
    }
}

/// The payload of an instruction: its opcode and operands.
///
/// Operand order here defines the use indices recorded in the use graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    /// Unary value computation.
    Unary {
        /// The operation.
        op: UnaryOp,
        /// The operand.
        arg: Value,
    },
    /// Binary value computation.
    Binary {
        /// The operation.
        op: BinaryOp,
        /// Left operand.
        lhs: Value,
        /// Right operand; the shift amount for shift operations.
        rhs: Value,
    },
    /// Comparison producing `Int(1)`.
    Cmp {
        /// The comparison predicate.
        op: CmpOp,
        /// Left operand.
        lhs: Value,
        /// Right operand.
        rhs: Value,
    },
    /// Process-local storage; yields `Ptr(t)`.
    Alloc {
        /// Optional initial value of the element type.
        init: Option<Value>,
    },
    /// Signal declaration; entity level only, yields `Signal(t)`.
    Sig {
        /// Optional initial value of the element type.
        init: Option<Value>,
    },
    /// Memory read through a pointer.
    Load {
        /// The address.
        ptr: Value,
    },
    /// Memory write through a pointer.
    Store {
        /// The address.
        ptr: Value,
        /// The stored value.
        value: Value,
    },
    /// Read the current value of a signal.
    Probe {
        /// The observed signal.
        signal: Value,
    },
    /// Schedule a signal change.
    Drive {
        /// The driven signal.
        signal: Value,
        /// The scheduled value.
        value: Value,
        /// Optional delay; a delta step when absent.
        delay: Option<Value>,
    },
    /// Storage element: latches `value` into `signal` while `enable`
    /// holds. Entity level only.
    Reg {
        /// The stored-into signal.
        signal: Value,
        /// The data input.
        value: Value,
        /// The `Int(1)` enable.
        enable: Value,
    },
    /// Slice `length` elements or bits starting at `index`.
    Extract {
        /// The sliced aggregate or vector.
        arg: Value,
        /// First element or bit.
        index: usize,
        /// Number of elements or bits.
        length: usize,
    },
    /// Replace a field, element or bit inside an aggregate.
    Insert {
        /// The container being updated.
        target: Value,
        /// The replacement value.
        value: Value,
        /// The field or element position.
        index: usize,
    },
    /// Concatenate logic vectors, most significant part first.
    Cat {
        /// The concatenated parts.
        parts: Vec<Value>,
    },
    /// Select bit ranges out of a logic vector.
    Sel {
        /// The source vector.
        arg: Value,
        /// Selected `(offset, length)` ranges.
        ranges: Vec<(usize, usize)>,
    },
    /// Width conversion.
    Convert {
        /// The conversion flavour.
        op: ConvertOp,
        /// The converted value.
        arg: Value,
    },
    /// Unconditional branch. Terminator.
    Br {
        /// The target block.
        dest: Value,
    },
    /// Conditional branch. Terminator.
    BrCond {
        /// The `Int(1)` condition.
        cond: Value,
        /// Target when the condition is one.
        if_true: Value,
        /// Target when the condition is zero.
        if_false: Value,
    },
    /// Multi-way branch; cases are tried in declaration order.
    /// Terminator.
    Switch {
        /// The discriminating value.
        key: Value,
        /// `(case value, target)` pairs.
        cases: Vec<(Value, Value)>,
        /// Fallback target when no case matches.
        default: Option<Value>,
    },
    /// Return from a process or function. Terminator.
    Ret {
        /// Returned values matching the unit's outputs.
        values: Vec<Value>,
    },
    /// Suspend for a time amount. Terminator.
    WaitTime {
        /// Delay or absolute time operand of time type.
        delay: Value,
        /// Whether `delay` is an absolute wake-up point.
        absolute: bool,
    },
    /// Suspend until the observed value changes, then continue at
    /// `dest`. Terminator.
    WaitCond {
        /// The observed `Int(1)` value.
        cond: Value,
        /// The resume block.
        dest: Value,
    },
    /// Suspend until any input changes. Terminator.
    WaitAny,
    /// Structural instantiation of an entity or process. Entity level
    /// only.
    Instantiate {
        /// The instantiated unit.
        callee: Value,
        /// Input signals, one per signature input.
        inputs: Vec<Value>,
        /// Output signals, one per signature output.
        outputs: Vec<Value>,
    },
    /// Function call.
    Call {
        /// The called function.
        callee: Value,
        /// Arguments, one per signature input.
        args: Vec<Value>,
    },
}

impl InstKind {
    /// Whether this instruction must terminate a block.
    pub const fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Br { .. }
                | Self::BrCond { .. }
                | Self::Switch { .. }
                | Self::Ret { .. }
                | Self::WaitTime { .. }
                | Self::WaitCond { .. }
                | Self::WaitAny
        )
    }

    /// The unit kinds this instruction may be placed in.
    pub fn placement(&self) -> Placement {
        use InstKind::*;
        match self {
            Unary { .. } | Binary { .. } | Cmp { .. } | Extract { .. } | Insert { .. }
            | Cat { .. } | Sel { .. } | Convert { .. } => Placement::all(),
            Alloc { .. } | Load { .. } | Store { .. } => {
                Placement::PROCESS | Placement::FUNCTION
            }
            Probe { .. } | Drive { .. } => Placement::ENTITY | Placement::PROCESS,
            Sig { .. } | Reg { .. } | Instantiate { .. } => Placement::ENTITY,
            Br { .. } | BrCond { .. } | Switch { .. } | Ret { .. } => {
                Placement::PROCESS | Placement::FUNCTION
            }
            WaitTime { .. } | WaitCond { .. } | WaitAny => Placement::PROCESS,
            Call { .. } => Placement::PROCESS | Placement::FUNCTION,
        }
    }

    /// The assembly mnemonic of the opcode.
    pub fn mnemonic(&self) -> &'static str {
        use InstKind::*;
        match self {
            Unary { .. } => "not",
            Binary { op, .. } => match op {
                BinaryOp::Add => "add",
                BinaryOp::Sub => "sub",
                BinaryOp::Umul | BinaryOp::Smul => "mul",
                BinaryOp::Udiv | BinaryOp::Sdiv => "div",
                BinaryOp::Urem | BinaryOp::Srem => "rem",
                BinaryOp::Umod | BinaryOp::Smod => "mod",
                BinaryOp::Lsl => "lsl",
                BinaryOp::Lsr => "lsr",
                BinaryOp::Asr => "asr",
                BinaryOp::And => "and",
                BinaryOp::Or => "or",
                BinaryOp::Xor => "xor",
            },
            Cmp { .. } => "cmp",
            Alloc { .. } => "alloc",
            Sig { .. } => "sig",
            Load { .. } => "ld",
            Store { .. } => "st",
            Probe { .. } => "prb",
            Drive { .. } => "drv",
            Reg { .. } => "reg",
            Extract { .. } => "extract",
            Insert { .. } => "insert",
            Cat { .. } => "cat",
            Sel { .. } => "sel",
            Convert { op, .. } => match op {
                ConvertOp::Trunc => "trunc",
                ConvertOp::Zext | ConvertOp::Sext => "ext",
                ConvertOp::Lmap => "lmap",
            },
            Br { .. } | BrCond { .. } => "br",
            Switch { .. } => "switch",
            Ret { .. } => "ret",
            WaitTime { .. } | WaitCond { .. } | WaitAny => "wait",
            Instantiate { .. } => "inst",
            Call { .. } => "call",
        }
    }

    /// Operands in use-index order.
    pub fn operands(&self) -> Vec<Value> {
        let mut out = Vec::new();
        self.visit_operands(|v| out.push(v));
        out
    }

    fn visit_operands(&self, mut f: impl FnMut(Value)) {
        use InstKind::*;
        match self {
            Unary { arg, .. } | Load { ptr: arg } | Probe { signal: arg }
            | Extract { arg, .. } | Sel { arg, .. } | Convert { arg, .. } | Br { dest: arg } => {
                f(*arg)
            }
            Binary { lhs, rhs, .. } | Cmp { lhs, rhs, .. } => {
                f(*lhs);
                f(*rhs);
            }
            Alloc { init } | Sig { init } => {
                if let Some(init) = init {
                    f(*init);
                }
            }
            Store { ptr, value } => {
                f(*ptr);
                f(*value);
            }
            Drive {
                signal,
                value,
                delay,
            } => {
                f(*signal);
                f(*value);
                if let Some(delay) = delay {
                    f(*delay);
                }
            }
            Reg {
                signal,
                value,
                enable,
            } => {
                f(*signal);
                f(*value);
                f(*enable);
            }
            Insert { target, value, .. } => {
                f(*target);
                f(*value);
            }
            Cat { parts } => parts.iter().copied().for_each(f),
            BrCond {
                cond,
                if_true,
                if_false,
            } => {
                f(*cond);
                f(*if_true);
                f(*if_false);
            }
            Switch {
                key,
                cases,
                default,
            } => {
                f(*key);
                for (value, dest) in cases {
                    f(*value);
                    f(*dest);
                }
                if let Some(default) = default {
                    f(*default);
                }
            }
            Ret { values } => values.iter().copied().for_each(f),
            WaitTime { delay, .. } => f(*delay),
            WaitCond { cond, dest } => {
                f(*cond);
                f(*dest);
            }
            WaitAny => {}
            Instantiate {
                callee,
                inputs,
                outputs,
            } => {
                f(*callee);
                inputs.iter().copied().for_each(&mut f);
                outputs.iter().copied().for_each(&mut f);
            }
            Call { callee, args } => {
                f(*callee);
                args.iter().copied().for_each(f);
            }
        }
    }

    /// Mutable references to the operand slots, in use-index order.
    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        use InstKind::*;
        let mut out: Vec<&mut Value> = Vec::new();
        match self {
            Unary { arg, .. } | Load { ptr: arg } | Probe { signal: arg }
            | Extract { arg, .. } | Sel { arg, .. } | Convert { arg, .. } | Br { dest: arg } => {
                out.push(arg)
            }
            Binary { lhs, rhs, .. } | Cmp { lhs, rhs, .. } => {
                out.push(lhs);
                out.push(rhs);
            }
            Alloc { init } | Sig { init } => {
                if let Some(init) = init {
                    out.push(init);
                }
            }
            Store { ptr, value } => {
                out.push(ptr);
                out.push(value);
            }
            Drive {
                signal,
                value,
                delay,
            } => {
                out.push(signal);
                out.push(value);
                if let Some(delay) = delay {
                    out.push(delay);
                }
            }
            Reg {
                signal,
                value,
                enable,
            } => {
                out.push(signal);
                out.push(value);
                out.push(enable);
            }
            Insert { target, value, .. } => {
                out.push(target);
                out.push(value);
            }
            Cat { parts } => out.extend(parts.iter_mut()),
            BrCond {
                cond,
                if_true,
                if_false,
            } => {
                out.push(cond);
                out.push(if_true);
                out.push(if_false);
            }
            Switch {
                key,
                cases,
                default,
            } => {
                out.push(key);
                for (value, dest) in cases {
                    out.push(value);
                    out.push(dest);
                }
                if let Some(default) = default {
                    out.push(default);
                }
            }
            Ret { values } => out.extend(values.iter_mut()),
            WaitTime { delay, .. } => out.push(delay),
            WaitCond { cond, dest } => {
                out.push(cond);
                out.push(dest);
            }
            WaitAny => {}
            Instantiate {
                callee,
                inputs,
                outputs,
            } => {
                out.push(callee);
                out.extend(inputs.iter_mut());
                out.extend(outputs.iter_mut());
            }
            Call { callee, args } => {
                out.push(callee);
                out.extend(args.iter_mut());
            }
        }
        out
    }
}

/// An instruction value: opcode payload, result type and list links.
#[derive(Debug, Clone)]
pub struct InstData {
    /// Opcode and operands.
    pub kind: InstKind,
    /// Result type; void when the instruction produces nothing.
    pub ty: Type,
    /// Optional SSA name.
    pub name: Option<String>,
    /// The block or entity this instruction currently lives in.
    pub parent: Option<Value>,
    /// Previous instruction in the container.
    pub prev: Option<Value>,
    /// Next instruction in the container.
    pub next: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminators_are_exactly_the_control_instructions() {
        let block = Value::new(0);
        let val = Value::new(1);
        assert!(InstKind::Br { dest: block }.is_terminator());
        assert!(InstKind::Ret { values: vec![] }.is_terminator());
        assert!(InstKind::WaitAny.is_terminator());
        assert!(!InstKind::Probe { signal: val }.is_terminator());
        assert!(!InstKind::Unary {
            op: UnaryOp::Not,
            arg: val
        }
        .is_terminator());
    }

    #[test]
    fn operand_order_is_stable() {
        let kind = InstKind::Switch {
            key: Value::new(1),
            cases: vec![(Value::new(2), Value::new(3))],
            default: Some(Value::new(4)),
        };
        let ops: Vec<_> = kind.operands();
        assert_eq!(
            ops,
            vec![Value::new(1), Value::new(2), Value::new(3), Value::new(4)]
        );
        let mut kind = kind;
        assert_eq!(kind.operands_mut().len(), 4);
    }

    #[test]
    fn placement_rules() {
        let v = Value::new(0);
        assert!(InstKind::Sig { init: None }
            .placement()
            .contains(Placement::ENTITY));
        assert!(!InstKind::Sig { init: None }
            .placement()
            .contains(Placement::PROCESS));
        assert!(!InstKind::Load { ptr: v }
            .placement()
            .contains(Placement::ENTITY));
        assert!(InstKind::WaitAny.placement() == Placement::PROCESS);
        assert!(InstKind::Drive {
            signal: v,
            value: v,
            delay: None
        }
        .placement()
        .contains(Placement::ENTITY | Placement::PROCESS));
    }
}
