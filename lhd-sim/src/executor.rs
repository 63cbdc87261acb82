//! The instruction executor: discrete-event interpretation of one
//! process against a value environment.

use std::collections::HashMap;

use lhd_ir::{
    BinaryOp, CmpOp, Const, ConstKind, Context, ConvertOp, InstKind, Module, UnaryOp,
    UnitKind, Value, ValueData,
};
use lhd_types::{ApInt, Logic, TimeValue};
use tracing::trace;

use crate::{Event, ExecState, SimError, Wakeup};

/// Interprets a single process, one instruction at a time.
///
/// The surrounding scheduler owns simulation time and the signal-value
/// map: it binds signal values with [`set_value`](Executor::set_value),
/// advances [`set_time`](Executor::set_time), drains the produced drive
/// events and resumes the executor when its [`Wakeup`] fires.
pub struct Executor<'a> {
    module: &'a Module,
    ctx: &'a mut Context,
    unit: Value,
    state: ExecState,
    ins: Option<Value>,
    env: HashMap<Value, Const>,
    memory: HashMap<Value, Const>,
    now: TimeValue,
    events: Vec<Event>,
    wakeup: Option<Wakeup>,
    resume_block: Option<Value>,
    results: Vec<Const>,
}

impl<'a> Executor<'a> {
    /// An executor positioned at the first instruction of the unit's
    /// entry block.
    pub fn new(module: &'a Module, ctx: &'a mut Context, unit: Value) -> Self {
        debug_assert!(matches!(
            module.unit(unit).kind,
            UnitKind::Process | UnitKind::Function
        ));
        let ins = module
            .entry_block(unit)
            .and_then(|b| module.block(b).first_inst);
        Executor {
            module,
            ctx,
            unit,
            state: ExecState::Ready,
            ins,
            env: HashMap::new(),
            memory: HashMap::new(),
            now: TimeValue::ZERO,
            events: Vec::new(),
            wakeup: None,
            resume_block: None,
            results: Vec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> ExecState {
        self.state
    }

    /// The pending wakeup request while suspended.
    pub fn wakeup(&self) -> Option<Wakeup> {
        self.wakeup
    }

    /// Current simulation time, as told by the scheduler.
    pub fn now(&self) -> TimeValue {
        self.now
    }

    /// Advance the executor's notion of simulation time.
    pub fn set_time(&mut self, now: TimeValue) {
        self.now = now;
    }

    /// Bind a value, typically a signal carried by a unit argument.
    pub fn set_value(&mut self, target: Value, value: Const) {
        self.env.insert(target, value);
    }

    /// The constant currently bound to a value.
    pub fn value_of(&self, value: Value) -> Option<Const> {
        if let Some(konst) = self.module.value_const(value) {
            return Some(konst);
        }
        self.env.get(&value).copied()
    }

    /// Values returned by the last `ret`.
    pub fn results(&self) -> &[Const] {
        &self.results
    }

    /// Drain the drive events produced so far.
    pub fn drain_events(&mut self) -> Vec<Event> {
        core::mem::take(&mut self.events)
    }

    /// Resume a suspended executor at its wait destination.
    pub fn resume(&mut self) {
        debug_assert_eq!(self.state, ExecState::Suspended);
        let block = self
            .resume_block
            .or_else(|| self.module.entry_block(self.unit))
            .expect("process has an entry block");
        self.ins = self.module.block(block).first_inst;
        self.wakeup = None;
        self.resume_block = None;
        self.state = ExecState::Ready;
    }

    /// Run until the executor leaves the running state: a wait
    /// suspends, `ret` completes a cycle, an error stops.
    pub fn run(&mut self) -> Result<ExecState, SimError> {
        if self.state == ExecState::Stopped {
            return Err(SimError::Stopped);
        }
        self.state = ExecState::Running;
        while self.state == ExecState::Running {
            if let Err(err) = self.step() {
                self.state = ExecState::Stopped;
                return Err(err);
            }
        }
        Ok(self.state)
    }

    fn lookup(&self, value: Value) -> Result<Const, SimError> {
        self.value_of(value).ok_or(SimError::Unbound(value))
    }

    fn lookup_int(&self, value: Value) -> Result<ApInt, SimError> {
        match &self.ctx.const_data(self.lookup(value)?).kind {
            ConstKind::Int(v) => Ok(v.clone()),
            _ => Err(SimError::Unbound(value)),
        }
    }

    fn lookup_time(&self, value: Value) -> Result<TimeValue, SimError> {
        match &self.ctx.const_data(self.lookup(value)?).kind {
            ConstKind::Time(t) => Ok(*t),
            _ => Err(SimError::Unbound(value)),
        }
    }

    fn bind(&mut self, inst: Value, konst: Const) {
        self.env.insert(inst, konst);
    }

    /// The block control falls into when a positional wait resumes: the
    /// next block in declaration order, wrapping to the entry.
    fn block_after(&self, block: Value) -> Option<Value> {
        self.module
            .block(block)
            .next
            .or_else(|| self.module.entry_block(self.unit))
    }

    /// Execute one instruction.
    pub fn step(&mut self) -> Result<(), SimError> {
        let Some(inst) = self.ins else {
            // Nothing to execute: an empty body completes immediately.
            self.state = ExecState::Ready;
            return Ok(());
        };
        let data = self.module.inst(inst);
        let kind = data.kind.clone();
        trace!(?inst, mnemonic = kind.mnemonic(), "step");
        let mut next_block: Option<Value> = None;
        match kind {
            InstKind::Unary {
                op: UnaryOp::Not,
                arg,
            } => {
                let operand = self.ctx.const_data(self.lookup(arg)?).kind.clone();
                let konst = match operand {
                    ConstKind::Int(v) => self.ctx.const_int(v.not()),
                    ConstKind::Logic(v) => self.ctx.const_logic(v.not()),
                    _ => return Err(SimError::Unsupported(inst)),
                };
                self.bind(inst, konst);
            }
            InstKind::Binary { op, lhs, rhs } => {
                let konst = self.eval_binary(inst, op, lhs, rhs)?;
                self.bind(inst, konst);
            }
            InstKind::Cmp { op, lhs, rhs } => {
                let a = self.lookup_int(lhs)?;
                let b = self.lookup_int(rhs)?;
                let unsigned = a.ucmp(&b)?;
                let signed = a.scmp(&b)?;
                use core::cmp::Ordering::*;
                let truth = match op {
                    CmpOp::Eq => unsigned == Equal,
                    CmpOp::Ne => unsigned != Equal,
                    CmpOp::Ugt => unsigned == Greater,
                    CmpOp::Ult => unsigned == Less,
                    CmpOp::Uge => unsigned != Less,
                    CmpOp::Ule => unsigned != Greater,
                    CmpOp::Sgt => signed == Greater,
                    CmpOp::Slt => signed == Less,
                    CmpOp::Sge => signed != Less,
                    CmpOp::Sle => signed != Greater,
                };
                let konst = self.ctx.const_int(ApInt::from_u64(1, truth as u64));
                self.bind(inst, konst);
            }
            InstKind::Convert { op, arg } => {
                let target = self
                    .ctx
                    .width(data.ty)
                    .ok_or(SimError::Unsupported(inst))?;
                let operand = self.ctx.const_data(self.lookup(arg)?).kind.clone();
                let konst = match (op, operand) {
                    (ConvertOp::Trunc, ConstKind::Int(v)) => {
                        let r = v.trunc(target)?;
                        self.ctx.const_int(r)
                    }
                    (ConvertOp::Zext, ConstKind::Int(v)) => {
                        let r = v.zext(target)?;
                        self.ctx.const_int(r)
                    }
                    (ConvertOp::Sext, ConstKind::Int(v)) => {
                        let r = v.sext(target)?;
                        self.ctx.const_int(r)
                    }
                    (ConvertOp::Lmap, ConstKind::Int(v)) => {
                        let r = Logic::from_apint(&v);
                        self.ctx.const_logic(r)
                    }
                    (ConvertOp::Lmap, ConstKind::Logic(v)) => match v.to_apint() {
                        Some(r) => self.ctx.const_int(r),
                        None => return Err(SimError::Unsupported(inst)),
                    },
                    _ => return Err(SimError::Unsupported(inst)),
                };
                self.bind(inst, konst);
            }
            InstKind::Alloc { init } => {
                let initial = match init {
                    Some(v) => self.lookup(v)?,
                    None => {
                        let elem = self
                            .ctx
                            .ptr_elem(data.ty)
                            .expect("alloc yields a pointer");
                        self.ctx
                            .null_of(elem)
                            .map_err(|_| SimError::Unsupported(inst))?
                    }
                };
                self.memory.insert(inst, initial);
            }
            InstKind::Load { ptr } => {
                let konst = *self
                    .memory
                    .get(&ptr)
                    .ok_or(SimError::Unbound(ptr))?;
                self.bind(inst, konst);
            }
            InstKind::Store { ptr, value } => {
                let konst = self.lookup(value)?;
                self.memory.insert(ptr, konst);
            }
            InstKind::Probe { signal } => {
                let konst = self.lookup(signal)?;
                self.bind(inst, konst);
            }
            InstKind::Drive {
                signal,
                value,
                delay,
            } => {
                let konst = self.lookup(value)?;
                let time = match delay {
                    Some(delay) => self.now + self.lookup_time(delay)?,
                    None => self.now + TimeValue::delta(1),
                };
                trace!(?signal, ?time, "drive event");
                self.events.push(Event {
                    time,
                    signal,
                    value: konst,
                });
            }
            InstKind::Br { dest } => next_block = Some(dest),
            InstKind::BrCond {
                cond,
                if_true,
                if_false,
            } => {
                let cond = self.lookup_int(cond)?;
                next_block = Some(if cond.is_zero() { if_false } else { if_true });
            }
            InstKind::Switch {
                key,
                cases,
                default,
            } => {
                let key = self.lookup(key)?;
                let mut taken = None;
                for (value, dest) in cases {
                    // Constants are uniqued, so handle equality is
                    // strict value equality.
                    if self.lookup(value)? == key {
                        taken = Some(dest);
                        break;
                    }
                }
                next_block = Some(match taken.or(default) {
                    Some(dest) => dest,
                    None => return Err(SimError::NoMatch),
                });
            }
            InstKind::Ret { values } => {
                self.results = values
                    .into_iter()
                    .map(|v| self.lookup(v))
                    .collect::<Result<_, _>>()?;
                self.state = ExecState::Ready;
                self.ins = self
                    .module
                    .entry_block(self.unit)
                    .and_then(|b| self.module.block(b).first_inst);
                return Ok(());
            }
            InstKind::WaitTime { delay, absolute } => {
                let t = self.lookup_time(delay)?;
                let at = if absolute { t } else { self.now + t };
                self.suspend(inst, Wakeup::At(at), None);
                return Ok(());
            }
            InstKind::WaitCond { cond, dest } => {
                self.suspend(inst, Wakeup::Change(cond), Some(dest));
                return Ok(());
            }
            InstKind::WaitAny => {
                self.suspend(inst, Wakeup::AnyInput, None);
                return Ok(());
            }
            InstKind::Call { callee, args } => {
                let konst = self.call_function(callee, &args)?;
                self.bind(inst, konst);
            }
            InstKind::Sig { .. }
            | InstKind::Reg { .. }
            | InstKind::Instantiate { .. }
            | InstKind::Extract { .. }
            | InstKind::Insert { .. }
            | InstKind::Cat { .. }
            | InstKind::Sel { .. } => {
                return Err(SimError::Unsupported(inst));
            }
        }

        self.ins = match next_block {
            Some(block) => self.module.block(block).first_inst,
            None => self.module.inst(inst).next,
        };
        if self.ins.is_none() {
            // Fell off a block without a terminator.
            return Err(SimError::Unsupported(inst));
        }
        Ok(())
    }

    fn suspend(&mut self, inst: Value, wakeup: Wakeup, dest: Option<Value>) {
        let parent = self.module.inst(inst).parent.expect("wait is placed");
        self.wakeup = Some(wakeup);
        self.resume_block = dest.or_else(|| self.block_after(parent));
        self.state = ExecState::Suspended;
        self.ins = None;
    }

    fn eval_binary(
        &mut self,
        inst: Value,
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
    ) -> Result<Const, SimError> {
        let a = self.ctx.const_data(self.lookup(lhs)?).kind.clone();
        let b = self.ctx.const_data(self.lookup(rhs)?).kind.clone();
        match (a, b) {
            (ConstKind::Int(a), ConstKind::Int(b)) => {
                let result = match op {
                    BinaryOp::Add => a.add(&b)?,
                    BinaryOp::Sub => a.sub(&b)?,
                    BinaryOp::Umul => a.umul(&b)?,
                    BinaryOp::Smul => a.smul(&b)?,
                    BinaryOp::Udiv => a.udiv(&b)?,
                    BinaryOp::Sdiv => a.sdiv(&b)?,
                    BinaryOp::Urem | BinaryOp::Umod => a.urem(&b)?,
                    BinaryOp::Srem => a.srem(&b)?,
                    BinaryOp::Smod => a.smod(&b)?,
                    BinaryOp::Lsl => a.lsl(shift_amount(&b)),
                    BinaryOp::Lsr => a.lsr(shift_amount(&b)),
                    BinaryOp::Asr => a.asr(shift_amount(&b)),
                    BinaryOp::And => a.and(&b)?,
                    BinaryOp::Or => a.or(&b)?,
                    BinaryOp::Xor => a.xor(&b)?,
                };
                Ok(self.ctx.const_int(result))
            }
            (ConstKind::Logic(a), ConstKind::Logic(b)) => {
                let result = match op {
                    BinaryOp::And => a.and(&b)?,
                    BinaryOp::Or => a.or(&b)?,
                    BinaryOp::Xor => a.xor(&b)?,
                    _ => return Err(SimError::Unsupported(inst)),
                };
                Ok(self.ctx.const_logic(result))
            }
            _ => Err(SimError::Unsupported(inst)),
        }
    }

    /// Evaluate a function call in a nested executor.
    fn call_function(&mut self, callee: Value, args: &[Value]) -> Result<Const, SimError> {
        let arg_consts: Vec<Const> = args
            .iter()
            .map(|v| self.lookup(*v))
            .collect::<Result<_, _>>()?;
        let param_values: Vec<Value> = match self.module.data(callee) {
            ValueData::Unit(data) => data.inputs.clone(),
            _ => return Err(SimError::Unbound(callee)),
        };
        let mut callee_exec = Executor::new(self.module, self.ctx, callee);
        for (param, konst) in param_values.into_iter().zip(arg_consts) {
            callee_exec.set_value(param, konst);
        }
        callee_exec.run()?;
        let result = callee_exec
            .results()
            .first()
            .copied()
            .ok_or(SimError::Unbound(callee))?;
        Ok(result)
    }
}

/// Clamp a shift amount into the host range; anything beyond the
/// operand width saturates inside the shift routines anyway.
fn shift_amount(amount: &ApInt) -> u32 {
    amount
        .to_u64()
        .map(|v| v.min(u64::from(u32::MAX)) as u32)
        .unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lhd_ir::Builder;

    #[test]
    fn a_function_computes_and_returns() {
        let mut ctx = Context::new();
        let mut module = Module::new("sim");
        let i8t = ctx.int_ty(8);
        let sig = ctx.func_ty(vec![i8t, i8t], vec![i8t]);
        let func = module.create_unit(&ctx, UnitKind::Function, "addmul", sig);
        let a = module.unit(func).inputs[0];
        let b = module.unit(func).inputs[1];
        let entry = module.create_block(func, Some("entry".into()));
        {
            let mut build = Builder::new(&mut module, &mut ctx, entry);
            let sum = build.add(a, b).unwrap();
            let two = build.int(8, 2);
            let twice = build.umul(sum, two).unwrap();
            build.ret(vec![twice]).unwrap();
        }
        let three = ctx.const_int(ApInt::from_u64(8, 3));
        let four = ctx.const_int(ApInt::from_u64(8, 4));
        let mut exec = Executor::new(&module, &mut ctx, func);
        exec.set_value(a, three);
        exec.set_value(b, four);
        assert_eq!(exec.run().unwrap(), ExecState::Ready);
        let result = exec.results()[0];
        assert_eq!(
            ctx.const_data(result).as_int().unwrap(),
            &ApInt::from_u64(8, 14)
        );
    }

    #[test]
    fn memory_cells_hold_values() {
        let mut ctx = Context::new();
        let mut module = Module::new("mem");
        let i8t = ctx.int_ty(8);
        let sig = ctx.func_ty(vec![], vec![i8t]);
        let func = module.create_unit(&ctx, UnitKind::Function, "cell", sig);
        let entry = module.create_block(func, Some("entry".into()));
        {
            let mut build = Builder::new(&mut module, &mut ctx, entry);
            let init = build.int(8, 9);
            let cell = build.alloc(i8t, Some(init)).unwrap();
            let seven = build.int(8, 7);
            build.store(cell, seven).unwrap();
            let loaded = build.load(cell).unwrap();
            build.ret(vec![loaded]).unwrap();
        }
        let mut exec = Executor::new(&module, &mut ctx, func);
        exec.run().unwrap();
        let result = exec.results()[0];
        assert_eq!(
            ctx.const_data(result).as_int().unwrap(),
            &ApInt::from_u64(8, 7)
        );
    }

    #[test]
    fn missing_switch_case_stops_the_executor() {
        let mut ctx = Context::new();
        let mut module = Module::new("nomatch");
        let i8t = ctx.int_ty(8);
        let sig_i8 = ctx.signal_ty(i8t);
        let comp = ctx.comp_ty(vec![sig_i8], vec![]);
        let proc = module.create_unit(&ctx, UnitKind::Process, "p", comp);
        let input = module.unit(proc).inputs[0];
        let entry = module.create_block(proc, Some("entry".into()));
        let only = module.create_block(proc, Some("only".into()));
        {
            let mut build = Builder::new(&mut module, &mut ctx, entry);
            let key = build.probe(input).unwrap();
            let zero = build.int(8, 0);
            build.switch(key, vec![(zero, only)], None).unwrap();
            build.set_pos(only);
            build.ret(vec![]).unwrap();
        }
        let five = ctx.const_int(ApInt::from_u64(8, 5));
        let mut exec = Executor::new(&module, &mut ctx, proc);
        exec.set_value(input, five);
        assert_eq!(exec.run().unwrap_err(), SimError::NoMatch);
        assert_eq!(exec.state(), ExecState::Stopped);
        assert_eq!(exec.run().unwrap_err(), SimError::Stopped);
    }

    #[test]
    fn wait_suspends_and_resumes() {
        let mut ctx = Context::new();
        let mut module = Module::new("waits");
        let i8t = ctx.int_ty(8);
        let sig_i8 = ctx.signal_ty(i8t);
        let comp = ctx.comp_ty(vec![sig_i8], vec![sig_i8]);
        let proc = module.create_unit(&ctx, UnitKind::Process, "p", comp);
        let input = module.unit(proc).inputs[0];
        let output = module.unit(proc).outputs[0];
        let entry = module.create_block(proc, Some("entry".into()));
        let after = module.create_block(proc, Some("after".into()));
        {
            let mut build = Builder::new(&mut module, &mut ctx, entry);
            let delay = build.time(TimeValue::ps(2_000));
            build.wait_time(delay, false).unwrap();
            build.set_pos(after);
            let v = build.probe(input).unwrap();
            build.drive(output, v, None).unwrap();
            build.ret(vec![]).unwrap();
        }
        let konst = ctx.const_int(ApInt::from_u64(8, 0x5a));
        let mut exec = Executor::new(&module, &mut ctx, proc);
        exec.set_value(input, konst);
        exec.set_time(TimeValue::ps(1_000));
        assert_eq!(exec.run().unwrap(), ExecState::Suspended);
        assert_eq!(exec.wakeup(), Some(Wakeup::At(TimeValue::ps(3_000))));

        exec.set_time(TimeValue::ps(3_000));
        exec.resume();
        assert_eq!(exec.run().unwrap(), ExecState::Ready);
        let events = exec.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].signal, output);
        assert_eq!(
            events[0].time,
            TimeValue {
                ps: 3_000,
                delta: 1
            }
        );
    }
}
