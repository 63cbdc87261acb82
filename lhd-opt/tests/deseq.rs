//! Desequentialisation of a latch-based clock-gating cell: a process
//! that drives its internal latch state only while the clock is low,
//! and the gated clock on every path.

use lhd_ir::prelude::*;
use lhd_opt::desequentialize;

/// Build the gating process:
///
/// inputs CK, E; outputs Q (latch state), GCK (gated clock).
/// When CK is low the latch is transparent (Q := E) and GCK is held
/// low; when CK is high GCK follows the held Q.
fn build_lagce(ctx: &mut Context, module: &mut Module) -> Value {
    let bit = ctx.int_ty(1);
    let sig_bit = ctx.signal_ty(bit);
    let comp = ctx.comp_ty(vec![sig_bit, sig_bit], vec![sig_bit, sig_bit]);
    let proc = module.create_unit(ctx, UnitKind::Process, "lagce", comp);
    let ck = module.unit(proc).inputs[0];
    let e = module.unit(proc).inputs[1];
    let q = module.unit(proc).outputs[0];
    let gck = module.unit(proc).outputs[1];
    for (arg, name) in [(ck, "ck"), (e, "e"), (q, "q"), (gck, "gck")] {
        module.set_value_name(arg, Some(name.into()));
    }
    let entry = module.create_block(proc, Some("entry".into()));
    let low = module.create_block(proc, Some("low".into()));
    let high = module.create_block(proc, Some("high".into()));
    let done = module.create_block(proc, Some("done".into()));

    let mut b = Builder::new(module, ctx, entry);
    let ck_val = b.probe(ck).unwrap();
    b.br_cond(ck_val, high, low).unwrap();

    b.set_pos(low);
    let e_val = b.probe(e).unwrap();
    b.drive(q, e_val, None).unwrap();
    let zero = b.int(1, 0);
    b.drive(gck, zero, None).unwrap();
    b.br(done).unwrap();

    b.set_pos(high);
    let q_val = b.probe(q).unwrap();
    b.drive(gck, q_val, None).unwrap();
    b.br(done).unwrap();

    b.set_pos(done);
    b.wait_any().unwrap();

    proc
}

#[test]
fn gating_process_becomes_latch_plus_combinational() {
    let mut ctx = Context::new();
    let mut module = Module::new("gate");
    let proc = build_lagce(&mut ctx, &mut module);
    let proc_sig = module.unit(proc).sig;

    let entity = desequentialize(&mut module, &mut ctx, proc).expect("pass succeeds");

    // The interface is preserved exactly: same signature type, same
    // unit name, entity kind.
    assert_eq!(module.unit(entity).kind, UnitKind::Entity);
    assert_eq!(module.unit(entity).name, "lagce");
    assert_eq!(module.unit(entity).sig, proc_sig);
    assert_eq!(module.unit_by_name("lagce"), Some(entity));

    let e_q = module.unit(entity).outputs[0];
    let e_gck = module.unit(entity).outputs[1];
    let e_ck = module.unit(entity).inputs[0];
    let e_e = module.unit(entity).inputs[1];

    // One storage element on Q, enabled by ¬CK and fed by E.
    let regs: Vec<Value> = module
        .entity_insts(entity)
        .filter(|i| matches!(module.inst(*i).kind, InstKind::Reg { .. }))
        .collect();
    assert_eq!(regs.len(), 1);
    let InstKind::Reg {
        signal,
        value,
        enable,
    } = module.inst(regs[0]).kind.clone()
    else {
        unreachable!()
    };
    assert_eq!(signal, e_q);
    match &module.inst(enable).kind {
        InstKind::Unary {
            op: UnaryOp::Not,
            arg,
        } => match &module.inst(*arg).kind {
            InstKind::Probe { signal } => assert_eq!(*signal, e_ck),
            other => panic!("enable should negate a clock probe, got {other:?}"),
        },
        other => panic!("enable should be a negation, got {other:?}"),
    }
    match &module.inst(value).kind {
        InstKind::Probe { signal } => assert_eq!(*signal, e_e),
        other => panic!("latch data should probe the E input, got {other:?}"),
    }

    // The gated clock is always driven, so it moved into a
    // combinational helper process instantiated with the latched Q as
    // an input and GCK as the output.
    let insts: Vec<Value> = module
        .entity_insts(entity)
        .filter(|i| matches!(module.inst(*i).kind, InstKind::Instantiate { .. }))
        .collect();
    assert_eq!(insts.len(), 1);
    let InstKind::Instantiate {
        callee,
        inputs,
        outputs,
    } = module.inst(insts[0]).kind.clone()
    else {
        unreachable!()
    };
    let comb = module.unit_by_name("lagce.comb").expect("helper exists");
    assert_eq!(callee, comb);
    assert_eq!(module.unit(comb).kind, UnitKind::Process);
    assert_eq!(inputs, vec![e_ck, e_q]);
    assert_eq!(outputs, vec![e_gck]);

    // The helper drives its single output from CK and Q and suspends on
    // input changes.
    let comb_entry = module.entry_block(comb).expect("helper has a body");
    let comb_insts: Vec<Value> = module.insts(comb_entry).collect();
    let drives: Vec<&Value> = comb_insts
        .iter()
        .filter(|i| matches!(module.inst(**i).kind, InstKind::Drive { .. }))
        .collect();
    assert_eq!(drives.len(), 1);
    assert!(matches!(
        module.inst(*comb_insts.last().unwrap()).kind,
        InstKind::WaitAny
    ));

    // The original process is gone.
    assert!(module
        .units()
        .all(|u| module.unit(u).kind != UnitKind::Process || u == comb));
}

#[test]
fn always_driven_signal_has_no_storage() {
    let mut ctx = Context::new();
    let mut module = Module::new("comb_only");
    let bit = ctx.int_ty(1);
    let sig_bit = ctx.signal_ty(bit);
    let comp = ctx.comp_ty(vec![sig_bit], vec![sig_bit]);
    let proc = module.create_unit(&ctx, UnitKind::Process, "inv", comp);
    let input = module.unit(proc).inputs[0];
    let output = module.unit(proc).outputs[0];
    let entry = module.create_block(proc, Some("entry".into()));
    {
        let mut b = Builder::new(&mut module, &mut ctx, entry);
        let v = b.probe(input).unwrap();
        let n = b.not(v).unwrap();
        b.drive(output, n, None).unwrap();
        b.wait_any().unwrap();
    }

    let entity = desequentialize(&mut module, &mut ctx, proc).unwrap();
    assert!(module
        .entity_insts(entity)
        .all(|i| !matches!(module.inst(i).kind, InstKind::Reg { .. })));
    assert!(module.unit_by_name("inv.comb").is_some());
}

#[test]
fn conditionally_driven_signal_becomes_storage_only() {
    let mut ctx = Context::new();
    let mut module = Module::new("latch");
    let byte = ctx.int_ty(8);
    let bit = ctx.int_ty(1);
    let sig_bit = ctx.signal_ty(bit);
    let sig_byte_in = ctx.signal_ty(byte);
    let sig_byte_out = ctx.signal_ty(byte);
    let comp = ctx.comp_ty(vec![sig_bit, sig_byte_in], vec![sig_byte_out]);
    let proc = module.create_unit(&ctx, UnitKind::Process, "hold", comp);
    let en = module.unit(proc).inputs[0];
    let data = module.unit(proc).inputs[1];
    let out = module.unit(proc).outputs[0];
    let entry = module.create_block(proc, Some("entry".into()));
    let store = module.create_block(proc, Some("store".into()));
    let done = module.create_block(proc, Some("done".into()));
    {
        let mut b = Builder::new(&mut module, &mut ctx, entry);
        let e = b.probe(en).unwrap();
        b.br_cond(e, store, done).unwrap();
        b.set_pos(store);
        let v = b.probe(data).unwrap();
        b.drive(out, v, None).unwrap();
        b.br(done).unwrap();
        b.set_pos(done);
        b.wait_any().unwrap();
    }

    let entity = desequentialize(&mut module, &mut ctx, proc).unwrap();
    // Exactly one reg, no combinational helper.
    let regs = module
        .entity_insts(entity)
        .filter(|i| matches!(module.inst(*i).kind, InstKind::Reg { .. }))
        .count();
    assert_eq!(regs, 1);
    assert!(module.unit_by_name("hold.comb").is_none());
    assert!(module
        .entity_insts(entity)
        .all(|i| !matches!(module.inst(i).kind, InstKind::Instantiate { .. })));
}
