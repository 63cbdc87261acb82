//! Functional equivalence across desequentialisation: an always-driven
//! signal must compute the same values through the combinational helper
//! process that it computed through the original sequential body.

use lhd_ir::prelude::*;
use lhd_opt::desequentialize;
use lhd_sim::Executor;

/// proc @xor_mask: output q is driven on every path, so the pass turns
/// the whole body into combinational logic.
fn build_masked_xor(ctx: &mut Context, module: &mut Module) -> Value {
    let byte = ctx.int_ty(8);
    let bit = ctx.int_ty(1);
    let sig_bit = ctx.signal_ty(bit);
    let sig_byte1 = ctx.signal_ty(byte);
    let sig_byte2 = ctx.signal_ty(byte);
    let sig_byte_out = ctx.signal_ty(byte);
    let comp = ctx.comp_ty(
        vec![sig_bit, sig_byte1, sig_byte2],
        vec![sig_byte_out],
    );
    let proc = module.create_unit(ctx, UnitKind::Process, "xor_mask", comp);
    let sel = module.unit(proc).inputs[0];
    let x = module.unit(proc).inputs[1];
    let y = module.unit(proc).inputs[2];
    let q = module.unit(proc).outputs[0];
    let entry = module.create_block(proc, Some("entry".into()));
    let plain = module.create_block(proc, Some("plain".into()));
    let masked = module.create_block(proc, Some("masked".into()));
    let done = module.create_block(proc, Some("done".into()));

    let mut b = Builder::new(module, ctx, entry);
    let vsel = b.probe(sel).unwrap();
    let vx = b.probe(x).unwrap();
    let vy = b.probe(y).unwrap();
    b.br_cond(vsel, masked, plain).unwrap();
    b.set_pos(plain);
    let xor = b.xor(vx, vy).unwrap();
    b.drive(q, xor, None).unwrap();
    b.br(done).unwrap();
    b.set_pos(masked);
    let xor2 = b.xor(vx, vy).unwrap();
    let mask = b.int(8, 0x0f);
    let and = b.and(xor2, mask).unwrap();
    b.drive(q, and, None).unwrap();
    b.br(done).unwrap();
    b.set_pos(done);
    b.ret(vec![]).unwrap();

    proc
}

fn run_once(
    module: &Module,
    ctx: &mut Context,
    proc: Value,
    bindings: &[(Value, Const)],
) -> ApInt {
    let mut exec = Executor::new(module, ctx, proc);
    for (target, konst) in bindings {
        exec.set_value(*target, *konst);
    }
    exec.run().unwrap();
    let events = exec.drain_events();
    assert_eq!(events.len(), 1);
    ctx.const_data(events[0].value).as_int().unwrap().clone()
}

#[test]
fn combinational_helper_matches_the_original_process() {
    let stimuli: [(u64, u64, u64); 4] = [
        (0, 0x12, 0x34),
        (1, 0x12, 0x34),
        (0, 0xff, 0x0f),
        (1, 0xff, 0x0f),
    ];

    for (sel_v, x_v, y_v) in stimuli {
        // Run the original process.
        let mut ctx = Context::new();
        let mut module = Module::new("equiv");
        let proc = build_masked_xor(&mut ctx, &mut module);
        let sel = ctx.const_int(ApInt::from_u64(1, sel_v));
        let x = ctx.const_int(ApInt::from_u64(8, x_v));
        let y = ctx.const_int(ApInt::from_u64(8, y_v));
        let args: Vec<Value> = module.unit(proc).inputs.clone();
        let before = run_once(
            &module,
            &mut ctx,
            proc,
            &[(args[0], sel), (args[1], x), (args[2], y)],
        );

        // Desequentialize and run the combinational helper the entity
        // instantiates in its place.
        desequentialize(&mut module, &mut ctx, proc).unwrap();
        let comb = module
            .unit_by_name("xor_mask.comb")
            .expect("always-driven output becomes a helper process");
        let comb_args: Vec<Value> = module.unit(comb).inputs.clone();
        // The helper keeps the original argument order for the inputs
        // it still needs; here that is all three.
        let after = run_once(
            &module,
            &mut ctx,
            comb,
            &[(comb_args[0], sel), (comb_args[1], x), (comb_args[2], y)],
        );

        assert_eq!(before, after, "sel={sel_v} x={x_v:#x} y={y_v:#x}");
    }
}
