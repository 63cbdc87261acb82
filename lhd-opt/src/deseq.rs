//! Desequentialisation: turning a process with conditional signal
//! drives into an entity with explicit storage elements plus a
//! combinational helper process.
//!
//! For every drive the pass computes the boolean condition under which
//! control reaches it, expressed over symbols standing for probe-time
//! values. Per signal the conditions are OR-ed and normalised: a
//! condition of constant one means the signal is always driven and
//! becomes combinational logic; anything else describes a storage
//! element, realised as a `reg` gated by the factored enable. The
//! replacement entity preserves the process interface exactly.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use lhd_ir::{
    Builder, CmpOp, Context, InstKind, IrError, Module, Type, TypeKind, UnitKind, Value,
    ValueData,
};
use tracing::{debug, trace};

use crate::BoolExpr;

type Cond = BoolExpr<Value>;

struct DriveRecord {
    signal: Value,
    value: Value,
    cond: Cond,
}

struct SignalPlan {
    signal: Value,
    drives: Vec<DriveRecord>,
    combined: Cond,
}

/// Rewrite `proc` into an interface-identical entity, replace all uses
/// of the process with the entity, and erase the process. Returns the
/// entity.
pub fn desequentialize(
    module: &mut Module,
    ctx: &mut Context,
    proc: Value,
) -> Result<Value, IrError> {
    if module.unit(proc).kind != UnitKind::Process {
        return Err(IrError::TypeMismatch);
    }
    let entry = module.entry_block(proc).ok_or(IrError::MalformedBlock)?;
    validate(module, proc)?;

    // Give every switch edge a probe-level symbol by materializing the
    // per-case comparison as an instruction ahead of the switch.
    let switch_cmps = symbolize_switches(module, ctx, proc)?;

    // Step 1: collect (signal, value, reach condition) per drive, in
    // block declaration order.
    let mut records: Vec<DriveRecord> = Vec::new();
    for block in module.blocks(proc).collect::<Vec<_>>() {
        let cond = block_condition(module, entry, block, &switch_cmps, &mut HashSet::new());
        for inst in module.insts(block).collect::<Vec<_>>() {
            if let InstKind::Drive { signal, value, .. } = &module.inst(inst).kind {
                trace!(signal = ?*signal, ?inst, "drive record");
                records.push(DriveRecord {
                    signal: *signal,
                    value: *value,
                    cond: cond.clone(),
                });
            }
        }
    }

    // Steps 2 and 3: group by signal and classify through the
    // normalised disjunction of the drive conditions.
    let mut plans: Vec<SignalPlan> = Vec::new();
    records.sort_by_key(|r| r.signal);
    let grouped = records.into_iter().group_by(|r| r.signal);
    for (signal, group) in &grouped {
        let drives: Vec<DriveRecord> = group.collect();
        let combined = Cond::or(drives.iter().map(|d| d.cond.clone()).collect())
            .disjunctive_cnf();
        debug!(
            ?signal,
            storage = combined != Cond::Const1,
            "classified driven signal"
        );
        plans.push(SignalPlan {
            signal,
            drives,
            combined,
        });
    }

    // Step 4: the replacement entity with the identical interface.
    let name = module.unit(proc).name.clone();
    let sig = module.unit(proc).sig;
    let entity = module.create_unit(ctx, UnitKind::Entity, name.clone(), sig);
    let mut entity_map: HashMap<Value, Value> = HashMap::new();
    {
        let proc_args: Vec<Value> = module
            .unit(proc)
            .inputs
            .iter()
            .chain(&module.unit(proc).outputs)
            .copied()
            .collect();
        let entity_args: Vec<Value> = module
            .unit(entity)
            .inputs
            .iter()
            .chain(&module.unit(entity).outputs)
            .copied()
            .collect();
        for (p, e) in proc_args.into_iter().zip(entity_args) {
            let arg_name = module.name_of(p).map(String::from);
            module.set_value_name(e, arg_name);
            entity_map.insert(p, e);
        }
    }

    // Storage elements live directly in the entity.
    for plan in plans.iter().filter(|p| p.combined != Cond::Const1) {
        let target = *entity_map.get(&plan.signal).ok_or(IrError::Unrepresentable)?;
        let mut build = Builder::new(module, ctx, entity);
        let enable = emit_cond(&mut build, &plan.combined, &mut entity_map)?;
        let data = emit_drive_value(&mut build, plan, &mut entity_map)?;
        build.reg(target, data, enable)?;
    }

    // Steps 4–5: always-driven signals form the combinational process,
    // instantiated from the entity.
    let comb_plans: Vec<&SignalPlan> =
        plans.iter().filter(|p| p.combined == Cond::Const1).collect();
    if !comb_plans.is_empty() {
        // The process interface: every argument the combinational cones
        // read, in declaration order, to the driven signals.
        let mut deps: HashSet<Value> = HashSet::new();
        for plan in &comb_plans {
            for drive in &plan.drives {
                collect_arg_deps(module, drive.value, &mut deps);
                collect_cond_deps(module, &drive.cond, &mut deps);
            }
        }
        let comb_inputs: Vec<Value> = module
            .unit(proc)
            .inputs
            .iter()
            .chain(&module.unit(proc).outputs)
            .copied()
            .filter(|arg| deps.contains(arg))
            .collect();
        let comb_outputs: Vec<Value> = comb_plans.iter().map(|p| p.signal).collect();
        let in_tys: Vec<Type> = comb_inputs
            .iter()
            .map(|v| module.value_ty(ctx, *v))
            .collect();
        let out_tys: Vec<Type> = comb_outputs
            .iter()
            .map(|v| module.value_ty(ctx, *v))
            .collect();
        let comb_sig = ctx.comp_ty(in_tys, out_tys);
        let comb = module.create_unit(
            ctx,
            UnitKind::Process,
            format!("{name}.comb"),
            comb_sig,
        );
        let mut comb_map: HashMap<Value, Value> = HashMap::new();
        let comb_ins = module.unit(comb).inputs.clone();
        let comb_outs = module.unit(comb).outputs.clone();
        for (p, c) in comb_inputs
            .iter()
            .zip(comb_ins)
            .chain(comb_outputs.iter().zip(comb_outs))
        {
            let arg_name = module.name_of(*p).map(String::from);
            module.set_value_name(c, arg_name);
            comb_map.insert(*p, c);
        }
        let comb_entry = module.create_block(comb, Some("entry".into()));
        for plan in &comb_plans {
            let mut build = Builder::new(module, ctx, comb_entry);
            let value = emit_drive_value(&mut build, plan, &mut comb_map)?;
            let target = comb_map[&plan.signal];
            build.drive(target, value, None)?;
        }
        Builder::new(module, ctx, comb_entry).wait_any()?;

        let inst_inputs: Vec<Value> =
            comb_inputs.iter().map(|v| entity_map[v]).collect();
        let inst_outputs: Vec<Value> =
            comb_outputs.iter().map(|v| entity_map[v]).collect();
        Builder::new(module, ctx, entity).inst(comb, inst_inputs, inst_outputs)?;
    }

    // Step 6: the entity takes over the process's place.
    module.replace_all_uses_with(proc, entity);
    module.erase_unit(proc);
    Ok(entity)
}

/// Reject processes whose drives the pass cannot express before any
/// rewriting starts.
fn validate(module: &Module, proc: Value) -> Result<(), IrError> {
    for block in module.blocks(proc) {
        for inst in module.insts(block) {
            match &module.inst(inst).kind {
                InstKind::Drive { signal, value, .. } => {
                    if !matches!(module.data(*signal), ValueData::Arg { .. }) {
                        return Err(IrError::Unrepresentable);
                    }
                    check_importable(module, *value)?;
                }
                InstKind::BrCond { cond, .. } => check_importable(module, *cond)?,
                InstKind::Switch { key, cases, .. } => {
                    check_importable(module, *key)?;
                    for (value, _) in cases {
                        check_importable(module, *value)?;
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Whether a value is a cone of constants, arguments, probes and pure
/// computation that `import_value` can clone into another unit.
fn check_importable(module: &Module, value: Value) -> Result<(), IrError> {
    match module.data(value) {
        ValueData::Const { .. } | ValueData::Arg { .. } => Ok(()),
        ValueData::Inst(data) => match &data.kind {
            InstKind::Probe { .. }
            | InstKind::Unary { .. }
            | InstKind::Binary { .. }
            | InstKind::Cmp { .. }
            | InstKind::Convert { .. }
            | InstKind::Extract { .. }
            | InstKind::Insert { .. }
            | InstKind::Cat { .. }
            | InstKind::Sel { .. } => {
                for op in data.kind.operands() {
                    check_importable(module, op)?;
                }
                Ok(())
            }
            _ => Err(IrError::Unrepresentable),
        },
        _ => Err(IrError::Unrepresentable),
    }
}

/// Insert one `cmp eq` per switch case so that switch edges have plain
/// `Int(1)` symbols like conditional branches do.
fn symbolize_switches(
    module: &mut Module,
    ctx: &mut Context,
    proc: Value,
) -> Result<HashMap<Value, Vec<Value>>, IrError> {
    let mut cmps: HashMap<Value, Vec<Value>> = HashMap::new();
    let bit = ctx.int_ty(1);
    let blocks: Vec<Value> = module.blocks(proc).collect();
    for block in blocks {
        let Some(term) = module.terminator(block) else {
            continue;
        };
        let InstKind::Switch { key, cases, .. } = module.inst(term).kind.clone() else {
            continue;
        };
        let mut case_cmps = Vec::with_capacity(cases.len());
        for (value, _) in cases {
            let cmp = module.build_inst(
                InstKind::Cmp {
                    op: CmpOp::Eq,
                    lhs: key,
                    rhs: value,
                },
                bit,
                None,
            );
            module.insert_inst_before(term, cmp)?;
            case_cmps.push(cmp);
        }
        cmps.insert(term, case_cmps);
    }
    Ok(cmps)
}

/// The boolean condition under which control reaches `block` from the
/// entry: the disjunction over all incoming edges of the edge condition
/// conjoined with the predecessor's own condition. Back edges contribute
/// nothing new and are cut off.
fn block_condition(
    module: &Module,
    entry: Value,
    block: Value,
    switch_cmps: &HashMap<Value, Vec<Value>>,
    visiting: &mut HashSet<Value>,
) -> Cond {
    if block == entry {
        return Cond::Const1;
    }
    if !visiting.insert(block) {
        return Cond::Const0;
    }
    let mut terms = Vec::new();
    for u in module.uses(block).to_vec() {
        let user = u.user;
        let Some(parent) = module.inst(user).parent else {
            continue;
        };
        let pre = block_condition(module, entry, parent, switch_cmps, visiting);
        let edge = match &module.inst(user).kind {
            InstKind::Br { .. } | InstKind::WaitCond { .. } => pre,
            InstKind::BrCond { cond, .. } => {
                // Operand order is (cond, true, false): index two is the
                // negated edge.
                let lit = if u.index == 2 {
                    Cond::Symbol(*cond).negate()
                } else {
                    Cond::Symbol(*cond)
                };
                Cond::and(vec![lit, pre])
            }
            InstKind::Switch { cases, .. } => {
                let case_syms = &switch_cmps[&user];
                let default_index = (1 + 2 * cases.len()) as u16;
                let lit = if u.index == default_index {
                    Cond::and(
                        case_syms
                            .iter()
                            .map(|c| Cond::Symbol(*c).negate())
                            .collect(),
                    )
                } else {
                    // Destination operands sit at 2, 4, 6, …
                    let case = (u.index as usize - 2) / 2;
                    Cond::Symbol(case_syms[case])
                };
                Cond::and(vec![lit, pre])
            }
            _ => Cond::Const0,
        };
        terms.push(edge);
    }
    visiting.remove(&block);
    Cond::or(terms)
}

/// Arguments (signals) a value cone reads.
fn collect_arg_deps(module: &Module, value: Value, deps: &mut HashSet<Value>) {
    match module.data(value) {
        ValueData::Arg { .. } => {
            deps.insert(value);
        }
        ValueData::Inst(data) => {
            for op in data.kind.operands() {
                collect_arg_deps(module, op, deps);
            }
        }
        _ => {}
    }
}

fn collect_cond_deps(module: &Module, cond: &Cond, deps: &mut HashSet<Value>) {
    match cond {
        Cond::Symbol(v) => collect_arg_deps(module, *v, deps),
        Cond::Not(inner) => collect_cond_deps(module, inner, deps),
        Cond::And(cs) | Cond::Or(cs) => {
            for c in cs {
                collect_cond_deps(module, c, deps);
            }
        }
        Cond::Const0 | Cond::Const1 => {}
    }
}

/// Clone a pure value cone into the builder's unit, translating
/// arguments through `map` and sharing already-imported values.
fn import_value(
    build: &mut Builder<'_>,
    map: &mut HashMap<Value, Value>,
    value: Value,
) -> Result<Value, IrError> {
    if let Some(mapped) = map.get(&value) {
        return Ok(*mapped);
    }
    let data = build.module.data(value).clone();
    let imported = match data {
        ValueData::Const { value: konst, .. } => build.konst(konst),
        ValueData::Inst(inst_data) => match inst_data.kind {
            InstKind::Probe { signal } => {
                let signal = import_value(build, map, signal)?;
                build.probe(signal)?
            }
            InstKind::Unary { arg, .. } => {
                let arg = import_value(build, map, arg)?;
                build.not(arg)?
            }
            InstKind::Binary { op, lhs, rhs } => {
                let lhs = import_value(build, map, lhs)?;
                let rhs = import_value(build, map, rhs)?;
                build.binary(op, lhs, rhs)?
            }
            InstKind::Cmp { op, lhs, rhs } => {
                let lhs = import_value(build, map, lhs)?;
                let rhs = import_value(build, map, rhs)?;
                build.cmp(op, lhs, rhs)?
            }
            InstKind::Convert { op, arg } => {
                let arg = import_value(build, map, arg)?;
                build.convert(op, arg, inst_data.ty)?
            }
            InstKind::Extract { arg, index, length } => {
                let arg = import_value(build, map, arg)?;
                build.extract(arg, index, length)?
            }
            InstKind::Insert {
                target,
                value,
                index,
            } => {
                let target = import_value(build, map, target)?;
                let value = import_value(build, map, value)?;
                build.insert(target, value, index)?
            }
            InstKind::Cat { parts } => {
                let parts = parts
                    .into_iter()
                    .map(|p| import_value(build, map, p))
                    .collect::<Result<Vec<_>, _>>()?;
                build.cat(parts)?
            }
            InstKind::Sel { arg, ranges } => {
                let arg = import_value(build, map, arg)?;
                build.sel(arg, ranges)?
            }
            _ => return Err(IrError::Unrepresentable),
        },
        // Arguments must have been pre-mapped to the new interface.
        _ => return Err(IrError::Unrepresentable),
    };
    map.insert(value, imported);
    Ok(imported)
}

/// Materialize a boolean condition as `Int(1)` logic in the builder's
/// unit.
fn emit_cond(
    build: &mut Builder<'_>,
    cond: &Cond,
    map: &mut HashMap<Value, Value>,
) -> Result<Value, IrError> {
    match cond {
        Cond::Const0 => Ok(build.int(1, 0)),
        Cond::Const1 => Ok(build.int(1, 1)),
        Cond::Symbol(v) => import_value(build, map, *v),
        Cond::Not(inner) => {
            let inner = emit_cond(build, inner, map)?;
            build.not(inner)
        }
        Cond::And(cs) | Cond::Or(cs) => {
            let is_and = matches!(cond, Cond::And(_));
            let mut acc = None;
            for c in cs {
                let value = emit_cond(build, c, map)?;
                acc = Some(match acc {
                    None => value,
                    Some(prev) if is_and => build.and(prev, value)?,
                    Some(prev) => build.or(prev, value)?,
                });
            }
            acc.ok_or(IrError::Unrepresentable)
        }
    }
}

/// The driven value of a signal: its drives folded into a mux chain in
/// block order, so that the drive latest in the process wins.
fn emit_drive_value(
    build: &mut Builder<'_>,
    plan: &SignalPlan,
    map: &mut HashMap<Value, Value>,
) -> Result<Value, IrError> {
    let mut drives = plan.drives.iter();
    let first = drives.next().expect("signals come from drive records");
    let mut acc = import_value(build, map, first.value)?;
    for drive in drives {
        let cond = emit_cond(build, &drive.cond, map)?;
        let value = import_value(build, map, drive.value)?;
        acc = emit_mux(build, cond, value, acc)?;
    }
    Ok(acc)
}

/// `cond ? then_value : else_value` over integer or logic operands,
/// spelled with mask-and-merge since the IR has no select opcode.
fn emit_mux(
    build: &mut Builder<'_>,
    cond: Value,
    then_value: Value,
    else_value: Value,
) -> Result<Value, IrError> {
    let ty = build.module.value_ty(build.ctx, then_value);
    match build.ctx.kind(ty).clone() {
        TypeKind::Int(width) => {
            let int_ty = build.ctx.int_ty(width);
            let mask = build.sext(cond, int_ty)?;
            let inverse = build.not(mask)?;
            let then_part = build.and(then_value, mask)?;
            let else_part = build.and(else_value, inverse)?;
            build.or(then_part, else_part)
        }
        TypeKind::Logic(width) => {
            let int_ty = build.ctx.int_ty(width);
            let logic_ty = build.ctx.logic_ty(width);
            let wide = build.sext(cond, int_ty)?;
            let mask = build.lmap(wide, logic_ty)?;
            let inverse = build.not(mask)?;
            let then_part = build.and(then_value, mask)?;
            let else_part = build.and(else_value, inverse)?;
            build.or(then_part, else_part)
        }
        _ => Err(IrError::Unrepresentable),
    }
}
