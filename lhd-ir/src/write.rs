//! The assembly writer.
//!
//! One unit per stanza, stanzas separated by blank lines, instructions
//! indented by two spaces. Local references carry a `%` sigil, global
//! references `@`. Constants are printed inline as typed literals, so the
//! reader can rebuild the constant pool without a symbol table.

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};

use crate::{
    BinaryOp, ConstKind, Context, ConvertOp, Dir, InstKind, Module, Type, TypeKind, UnitKind,
    Value, ValueData,
};

/// Render a type term in assembly syntax.
pub fn type_to_string(ctx: &Context, ty: Type) -> String {
    match ctx.kind(ty) {
        TypeKind::Void => "void".into(),
        TypeKind::Label => "label".into(),
        TypeKind::Time => "time".into(),
        TypeKind::Int(w) => format!("i{w}"),
        TypeKind::Logic(w) => format!("l{w}"),
        TypeKind::Struct(fields) => {
            let fields: Vec<String> = fields.iter().map(|f| type_to_string(ctx, *f)).collect();
            format!("{{{}}}", fields.join(", "))
        }
        TypeKind::Array(elem, n) => format!("[{} x {}]", n, type_to_string(ctx, *elem)),
        TypeKind::Ptr(elem) => format!("{}*", type_to_string(ctx, *elem)),
        TypeKind::Signal(elem) => format!("{}$", type_to_string(ctx, *elem)),
        TypeKind::Func(ins, outs) | TypeKind::Comp(ins, outs) => {
            let ins: Vec<String> = ins.iter().map(|t| type_to_string(ctx, *t)).collect();
            let outs: Vec<String> = outs.iter().map(|t| type_to_string(ctx, *t)).collect();
            format!("({}) ({})", ins.join(", "), outs.join(", "))
        }
    }
}

fn escape_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            out.push(c);
        } else {
            for byte in c.to_string().as_bytes() {
                out.push_str(&format!("\\u{byte:02x}"));
            }
        }
    }
    out
}

fn const_to_string(ctx: &Context, konst: crate::Const) -> String {
    let data = ctx.const_data(konst);
    match &data.kind {
        ConstKind::Int(v) => format!("i{}'d{}", v.width(), v.to_string_radix(10)),
        ConstKind::Logic(v) => format!("l{}'{}", v.width(), v),
        ConstKind::Time(v) => v.to_string(),
        ConstKind::Aggregate(elems) => {
            let elems: Vec<String> = elems.iter().map(|e| const_to_string(ctx, *e)).collect();
            match ctx.kind(data.ty) {
                TypeKind::Array(..) => format!("[{}]", elems.join(", ")),
                _ => format!("{{{}}}", elems.join(", ")),
            }
        }
    }
}

struct UnitWriter<'a> {
    module: &'a Module,
    ctx: &'a Context,
    names: HashMap<Value, String>,
    taken: HashSet<String>,
    counter: usize,
}

impl<'a> UnitWriter<'a> {
    fn new(module: &'a Module, ctx: &'a Context) -> Self {
        UnitWriter {
            module,
            ctx,
            names: HashMap::new(),
            taken: HashSet::new(),
            counter: 0,
        }
    }

    /// The printed form of a local value, assigning `%N` to the nameless.
    fn local(&mut self, value: Value) -> String {
        if let Some(konst) = self.module.value_const(value) {
            return const_to_string(self.ctx, konst);
        }
        if let Some(name) = self.names.get(&value) {
            return name.clone();
        }
        let name = match self.module.name_of(value) {
            Some(given) => {
                let escaped = escape_name(given);
                if self.taken.contains(&escaped) {
                    self.numbered()
                } else {
                    escaped
                }
            }
            None => self.numbered(),
        };
        self.taken.insert(name.clone());
        let name = format!("%{name}");
        self.names.insert(value, name.clone());
        name
    }

    fn numbered(&mut self) -> String {
        loop {
            let candidate = self.counter.to_string();
            self.counter += 1;
            if !self.taken.contains(&candidate) {
                return candidate;
            }
        }
    }

    fn ty(&self, value: Value) -> String {
        let ty = match self.module.data(value) {
            ValueData::Const { ty, .. }
            | ValueData::Arg { ty, .. }
            | ValueData::Unresolved { ty, .. } => *ty,
            ValueData::Inst(data) => data.ty,
            ValueData::Unit(data) => data.sig,
            ValueData::Block(_) => return "label".into(),
        };
        type_to_string(self.ctx, ty)
    }

    fn write_header(&mut self, out: &mut dyn Write, unit: Value) -> io::Result<()> {
        let data = self.module.unit(unit);
        let keyword = match data.kind {
            UnitKind::Declaration => "decl",
            UnitKind::Function => "func",
            UnitKind::Process => "proc",
            UnitKind::Entity => "entity",
        };
        write!(out, "{} @{}", keyword, escape_name(&data.name))?;
        if data.kind == UnitKind::Declaration {
            let (ins, outs) = self.ctx.signature(data.sig).expect("unit signature");
            let ins: Vec<String> = ins.iter().map(|t| type_to_string(self.ctx, *t)).collect();
            let outs: Vec<String> = outs.iter().map(|t| type_to_string(self.ctx, *t)).collect();
            return writeln!(out, " ({}) ({})", ins.join(", "), outs.join(", "));
        }
        let dir_keyword = |dir: Dir| match (data.kind, dir) {
            (UnitKind::Function, _) => "",
            (_, Dir::In) => "in ",
            (_, Dir::Out) => "out ",
        };
        let mut sides = Vec::new();
        for (args, dir) in [(&data.inputs, Dir::In), (&data.outputs, Dir::Out)] {
            if data.kind == UnitKind::Function && dir == Dir::Out {
                // Function results are anonymous; `ret` names the values.
                let (_, outs) = self.ctx.signature(data.sig).expect("unit signature");
                let outs: Vec<String> =
                    outs.iter().map(|t| type_to_string(self.ctx, *t)).collect();
                sides.push(format!("({})", outs.join(", ")));
                continue;
            }
            let mut parts = Vec::new();
            for arg in args.iter() {
                let ty = self.ty(*arg);
                let name = self.local(*arg);
                parts.push(format!("{}{} {}", dir_keyword(dir), ty, name));
            }
            sides.push(format!("({})", parts.join(", ")));
        }
        writeln!(out, " {} {} {{", sides[0], sides[1])
    }

    fn write_inst(&mut self, out: &mut dyn Write, inst: Value) -> io::Result<()> {
        let data = self.module.inst(inst);
        let kind = data.kind.clone();
        let produces = !matches!(self.ctx.kind(data.ty), TypeKind::Void);
        write!(out, "  ")?;
        if produces {
            let name = self.local(inst);
            write!(out, "{name} = ")?;
        }
        match &kind {
            InstKind::Unary { arg, .. } => {
                write!(out, "not {} {}", self.ty(*arg), self.local(*arg))?;
            }
            InstKind::Binary { op, lhs, rhs } => {
                let mnemonic = match op {
                    BinaryOp::Add => "add",
                    BinaryOp::Sub => "sub",
                    BinaryOp::Umul => "mul unsigned",
                    BinaryOp::Smul => "mul signed",
                    BinaryOp::Udiv => "div unsigned",
                    BinaryOp::Sdiv => "div signed",
                    BinaryOp::Urem => "rem unsigned",
                    BinaryOp::Srem => "rem signed",
                    BinaryOp::Umod => "mod unsigned",
                    BinaryOp::Smod => "mod signed",
                    BinaryOp::Lsl => "lsl",
                    BinaryOp::Lsr => "lsr",
                    BinaryOp::Asr => "asr",
                    BinaryOp::And => "and",
                    BinaryOp::Or => "or",
                    BinaryOp::Xor => "xor",
                };
                write!(out, "{mnemonic} {} {}", self.ty(*lhs), self.local(*lhs))?;
                if op.is_shift() {
                    write!(out, ", {} {}", self.ty(*rhs), self.local(*rhs))?;
                } else {
                    write!(out, ", {}", self.local(*rhs))?;
                }
            }
            InstKind::Cmp { op, lhs, rhs } => {
                write!(
                    out,
                    "cmp {} {} {}, {}",
                    op.mnemonic(),
                    self.ty(*lhs),
                    self.local(*lhs),
                    self.local(*rhs)
                )?;
            }
            InstKind::Alloc { init } => {
                let elem = self.ctx.ptr_elem(data.ty).expect("alloc yields a pointer");
                write!(out, "alloc {}", type_to_string(self.ctx, elem))?;
                if let Some(init) = init {
                    write!(out, ", {}", self.local(*init))?;
                }
            }
            InstKind::Sig { init } => {
                let elem = self.ctx.signal_elem(data.ty).expect("sig yields a signal");
                write!(out, "sig {}", type_to_string(self.ctx, elem))?;
                if let Some(init) = init {
                    write!(out, ", {}", self.local(*init))?;
                }
            }
            InstKind::Load { ptr } => {
                write!(out, "ld {} {}", self.ty(*ptr), self.local(*ptr))?;
            }
            InstKind::Store { ptr, value } => {
                write!(
                    out,
                    "st {} {}, {}",
                    self.ty(*ptr),
                    self.local(*ptr),
                    self.local(*value)
                )?;
            }
            InstKind::Probe { signal } => {
                write!(out, "prb {} {}", self.ty(*signal), self.local(*signal))?;
            }
            InstKind::Drive {
                signal,
                value,
                delay,
            } => {
                write!(
                    out,
                    "drv {} {}, {}",
                    self.ty(*signal),
                    self.local(*signal),
                    self.local(*value)
                )?;
                if let Some(delay) = delay {
                    write!(out, ", {}", self.local(*delay))?;
                }
            }
            InstKind::Reg {
                signal,
                value,
                enable,
            } => {
                write!(
                    out,
                    "reg {} {}, {}, {}",
                    self.ty(*signal),
                    self.local(*signal),
                    self.local(*value),
                    self.local(*enable)
                )?;
            }
            InstKind::Extract { arg, index, length } => {
                write!(
                    out,
                    "extract {} {}, {}, {}",
                    self.ty(*arg),
                    self.local(*arg),
                    index,
                    length
                )?;
            }
            InstKind::Insert {
                target,
                value,
                index,
            } => {
                write!(
                    out,
                    "insert {} {}, {} {}, {}",
                    self.ty(*target),
                    self.local(*target),
                    self.ty(*value),
                    self.local(*value),
                    index
                )?;
            }
            InstKind::Cat { parts } => {
                write!(out, "cat ")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(out, ", ")?;
                    }
                    write!(out, "{} {}", self.ty(*part), self.local(*part))?;
                }
            }
            InstKind::Sel { arg, ranges } => {
                write!(out, "sel {} {}, [", self.ty(*arg), self.local(*arg))?;
                for (i, (offset, length)) in ranges.iter().enumerate() {
                    if i > 0 {
                        write!(out, ", ")?;
                    }
                    write!(out, "{offset}:{length}")?;
                }
                write!(out, "]")?;
            }
            InstKind::Convert { op, arg } => {
                let keyword = match op {
                    ConvertOp::Trunc => "trunc",
                    ConvertOp::Zext => "ext",
                    ConvertOp::Sext => "ext signed",
                    ConvertOp::Lmap => "lmap",
                };
                write!(
                    out,
                    "{keyword} {} {}, {}",
                    self.ty(*arg),
                    self.local(*arg),
                    type_to_string(self.ctx, data.ty)
                )?;
            }
            InstKind::Br { dest } => {
                write!(out, "br {}", self.local(*dest))?;
            }
            InstKind::BrCond {
                cond,
                if_true,
                if_false,
            } => {
                write!(
                    out,
                    "br {}, {}, {}",
                    self.local(*cond),
                    self.local(*if_true),
                    self.local(*if_false)
                )?;
            }
            InstKind::Switch {
                key,
                cases,
                default,
            } => {
                write!(out, "switch {} {} [", self.ty(*key), self.local(*key))?;
                for (i, (value, dest)) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(out, ", ")?;
                    }
                    write!(out, "{}: {}", self.local(*value), self.local(*dest))?;
                }
                write!(out, "]")?;
                if let Some(default) = default {
                    write!(out, " default {}", self.local(*default))?;
                }
            }
            InstKind::Ret { values } => {
                write!(out, "ret")?;
                for (i, value) in values.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(out, "{sep}{} {}", self.ty(*value), self.local(*value))?;
                }
            }
            InstKind::WaitTime { delay, absolute } => {
                write!(out, "wait ")?;
                if *absolute {
                    write!(out, "abs ")?;
                }
                write!(out, "{}", self.local(*delay))?;
            }
            InstKind::WaitCond { cond, dest } => {
                write!(out, "wait cond {}, {}", self.local(*cond), self.local(*dest))?;
            }
            InstKind::WaitAny => {
                write!(out, "wait")?;
            }
            InstKind::Instantiate {
                callee,
                inputs,
                outputs,
            } => {
                let name = match self.module.data(*callee) {
                    ValueData::Unit(data) => escape_name(&data.name),
                    other => panic!("instantiation of non-unit {other:?}"),
                };
                let inputs: Vec<String> = inputs.iter().map(|v| self.local(*v)).collect();
                let outputs: Vec<String> = outputs.iter().map(|v| self.local(*v)).collect();
                write!(
                    out,
                    "inst @{} ({}) ({})",
                    name,
                    inputs.join(", "),
                    outputs.join(", ")
                )?;
            }
            InstKind::Call { callee, args } => {
                let name = match self.module.data(*callee) {
                    ValueData::Unit(data) => escape_name(&data.name),
                    other => panic!("call of non-unit {other:?}"),
                };
                let args: Vec<String> = args.iter().map(|v| self.local(*v)).collect();
                write!(out, "call @{} ({})", name, args.join(", "))?;
            }
        }
        writeln!(out)
    }

    fn write_unit(&mut self, out: &mut dyn Write, unit: Value) -> io::Result<()> {
        self.write_header(out, unit)?;
        let data = self.module.unit(unit);
        if data.kind == UnitKind::Declaration {
            return Ok(());
        }
        if data.kind == UnitKind::Entity {
            for inst in self.module.entity_insts(unit).collect::<Vec<_>>() {
                self.write_inst(out, inst)?;
            }
        } else {
            for block in self.module.blocks(unit).collect::<Vec<_>>() {
                let label = self.local(block);
                writeln!(out, "{label}:")?;
                for inst in self.module.insts(block).collect::<Vec<_>>() {
                    self.write_inst(out, inst)?;
                }
            }
        }
        writeln!(out, "}}")
    }
}

/// Pretty-print a module: a `mod` header followed by one stanza per
/// unit.
pub fn write_module(
    module: &Module,
    ctx: &Context,
    out: &mut dyn Write,
) -> io::Result<()> {
    writeln!(out, "mod @{}", escape_name(module.name()))?;
    for unit in module.units() {
        writeln!(out)?;
        UnitWriter::new(module, ctx).write_unit(out, unit)?;
    }
    Ok(())
}

/// Convenience wrapper rendering into a string.
pub fn module_to_string(module: &Module, ctx: &Context) -> String {
    let mut out = Vec::new();
    write_module(module, ctx, &mut out).expect("writing into memory cannot fail");
    String::from_utf8(out).expect("assembly output is utf-8")
}
