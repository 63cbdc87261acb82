//! An ALU process driven through successive delta cycles: a switch on a
//! two-bit opcode selects between add, sub, and, or.

use lhd_ir::prelude::*;
use lhd_sim::{Event, ExecState, Executor};
use rstest::rstest;

struct Alu {
    module: Module,
    a: Value,
    b: Value,
    op: Value,
    q: Value,
    proc: Value,
}

/// proc @alu (in i8$ %a, in i8$ %b, in l2$ %op) (out i8$ %q)
fn build_alu(ctx: &mut Context) -> Alu {
    let mut module = Module::new("alu");
    let i8t = ctx.int_ty(8);
    let l2t = ctx.logic_ty(2);
    let sig_a = ctx.signal_ty(i8t);
    let sig_b = ctx.signal_ty(i8t);
    let sig_op = ctx.signal_ty(l2t);
    let sig_q = ctx.signal_ty(i8t);
    let comp = ctx.comp_ty(vec![sig_a, sig_b, sig_op], vec![sig_q]);
    let proc = module.create_unit(ctx, UnitKind::Process, "alu", comp);
    let a = module.unit(proc).inputs[0];
    let b = module.unit(proc).inputs[1];
    let op = module.unit(proc).inputs[2];
    let q = module.unit(proc).outputs[0];
    for (arg, name) in [(a, "a"), (b, "b"), (op, "op"), (q, "q")] {
        module.set_value_name(arg, Some(name.into()));
    }

    let entry = module.create_block(proc, Some("entry".into()));
    let cases: Vec<Value> = ["do_add", "do_sub", "do_and", "do_or"]
        .into_iter()
        .map(|n| module.create_block(proc, Some(n.into())))
        .collect();
    let done = module.create_block(proc, Some("done".into()));

    let mut build = Builder::new(&mut module, ctx, entry);
    let va = build.probe(a).unwrap();
    let vb = build.probe(b).unwrap();
    let vop = build.probe(op).unwrap();
    let selectors: Vec<Value> = ["00", "01", "10", "11"]
        .into_iter()
        .map(|bits| build.logic(bits).unwrap())
        .collect();
    build
        .switch(
            vop,
            selectors.into_iter().zip(cases.iter().copied()).collect(),
            None,
        )
        .unwrap();

    for (i, case) in cases.iter().enumerate() {
        build.set_pos(*case);
        let result = match i {
            0 => build.add(va, vb).unwrap(),
            1 => build.sub(va, vb).unwrap(),
            2 => build.and(va, vb).unwrap(),
            _ => build.or(va, vb).unwrap(),
        };
        build.drive(q, result, None).unwrap();
        build.br(done).unwrap();
    }
    build.set_pos(done);
    build.ret(vec![]).unwrap();

    Alu {
        module,
        a,
        b,
        op,
        q,
        proc,
    }
}

#[test]
fn stimulus_over_four_delta_cycles() {
    let mut ctx = Context::new();
    let alu = build_alu(&mut ctx);
    let a = ctx.const_int(ApInt::from_u64(8, 0x12));
    let b = ctx.const_int(ApInt::from_u64(8, 0x0a));
    let opcodes: Vec<Const> = ["00", "01", "10", "11"]
        .into_iter()
        .map(|bits| ctx.const_logic(Logic::parse(bits).unwrap()))
        .collect();

    let mut exec = Executor::new(&alu.module, &mut ctx, alu.proc);
    exec.set_value(alu.a, a);
    exec.set_value(alu.b, b);

    let mut outputs = Vec::new();
    for (delta, opcode) in opcodes.into_iter().enumerate() {
        exec.set_time(TimeValue::delta(delta as u32));
        exec.set_value(alu.op, opcode);
        assert_eq!(exec.run().unwrap(), ExecState::Ready);
        let events: Vec<Event> = exec.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].signal, alu.q);
        assert_eq!(events[0].time.delta, delta as u32 + 1);
        outputs.push(events[0].value);
    }

    let expected = [0x1c_u64, 0x08, 0x02, 0x1a];
    for (output, expected) in outputs.into_iter().zip(expected) {
        assert_eq!(
            ctx.const_data(output).as_int().unwrap(),
            &ApInt::from_u64(8, expected)
        );
    }
}

#[rstest]
#[case("00", 0xff_u64.wrapping_add(0x01) & 0xff)]
#[case("01", 0xfe)]
fn wrapping_alu_cases(#[case] opcode: &str, #[case] expected: u64) {
    let mut ctx = Context::new();
    let alu = build_alu(&mut ctx);
    let a = ctx.const_int(ApInt::from_u64(8, 0xff));
    let b = ctx.const_int(ApInt::from_u64(8, 0x01));
    let op = ctx.const_logic(Logic::parse(opcode).unwrap());

    let mut exec = Executor::new(&alu.module, &mut ctx, alu.proc);
    exec.set_value(alu.a, a);
    exec.set_value(alu.b, b);
    exec.set_value(alu.op, op);
    exec.run().unwrap();
    let events = exec.drain_events();
    assert_eq!(
        ctx.const_data(events[0].value).as_int().unwrap(),
        &ApInt::from_u64(8, expected)
    );
}
