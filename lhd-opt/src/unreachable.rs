//! Unreachable-block elimination.
//!
//! A block is removed when its predecessor count reaches zero, where the
//! count is the number of terminator edges targeting it. Removal of one
//! block can orphan its successors, so a work-list propagates the
//! effect. The entry block is never removed, even without predecessors.

use std::collections::{HashMap, HashSet};

use lhd_ir::{Module, UnitKind, Value};
use tracing::debug;

/// Delete every block of the unit that cannot keep a predecessor.
/// Returns the number of deleted blocks.
pub fn delete_unreachable_blocks(module: &mut Module, unit: Value) -> usize {
    if !matches!(
        module.unit(unit).kind,
        UnitKind::Process | UnitKind::Function
    ) {
        return 0;
    }
    let Some(entry) = module.entry_block(unit) else {
        return 0;
    };
    let blocks: Vec<Value> = module.blocks(unit).collect();
    let mut preds: HashMap<Value, usize> = blocks
        .iter()
        .map(|b| (*b, module.predecessor_count(*b)))
        .collect();

    let mut doomed: HashSet<Value> = HashSet::new();
    let mut worklist: Vec<Value> = blocks
        .iter()
        .copied()
        .filter(|b| *b != entry && preds[b] == 0)
        .collect();
    doomed.extend(&worklist);

    while let Some(block) = worklist.pop() {
        // Dropping this block drops one edge per terminator operand.
        for succ in module.successors(block) {
            let count = preds.get_mut(&succ).expect("successor is in the unit");
            *count = count.saturating_sub(1);
            if *count == 0 && succ != entry && doomed.insert(succ) {
                worklist.push(succ);
            }
        }
    }

    // Preserve declaration order when erasing, purely for determinism.
    let doomed: Vec<Value> = blocks.into_iter().filter(|b| doomed.contains(b)).collect();
    if !doomed.is_empty() {
        debug!(unit = ?unit, count = doomed.len(), "deleting unreachable blocks");
    }
    let count = doomed.len();
    module.erase_blocks(&doomed);
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use lhd_ir::{Builder, Context};

    fn process_fixture() -> (Context, Module, Value) {
        let mut ctx = Context::new();
        let mut module = Module::new("ube");
        let i8t = ctx.int_ty(8);
        let sig = ctx.signal_ty(i8t);
        let comp = ctx.comp_ty(vec![sig], vec![sig]);
        let proc = module.create_unit(&ctx, UnitKind::Process, "p", comp);
        (ctx, module, proc)
    }

    #[test]
    fn orphan_blocks_are_removed() {
        // The S4 seed scenario: entry → b1 and an orphan b2.
        let (mut ctx, mut module, proc) = process_fixture();
        let entry = module.create_block(proc, Some("entry".into()));
        let b1 = module.create_block(proc, Some("b1".into()));
        let b2 = module.create_block(proc, Some("b2".into()));
        {
            let mut b = Builder::new(&mut module, &mut ctx, entry);
            b.br(b1).unwrap();
            b.set_pos(b1);
            b.wait_any().unwrap();
            b.set_pos(b2);
            b.wait_any().unwrap();
        }
        assert_eq!(delete_unreachable_blocks(&mut module, proc), 1);
        let left: Vec<Value> = module.blocks(proc).collect();
        assert_eq!(left, vec![entry, b1]);
    }

    #[test]
    fn orphan_chains_cascade() {
        let (mut ctx, mut module, proc) = process_fixture();
        let entry = module.create_block(proc, Some("entry".into()));
        let dead1 = module.create_block(proc, Some("dead1".into()));
        let dead2 = module.create_block(proc, Some("dead2".into()));
        {
            let mut b = Builder::new(&mut module, &mut ctx, entry);
            b.wait_any().unwrap();
            // dead1 branches to dead2, so dead2 has one predecessor
            // until dead1 goes away.
            b.set_pos(dead1);
            b.br(dead2).unwrap();
            b.set_pos(dead2);
            b.wait_any().unwrap();
        }
        assert_eq!(delete_unreachable_blocks(&mut module, proc), 2);
        assert_eq!(module.blocks(proc).collect::<Vec<_>>(), vec![entry]);
    }

    #[test]
    fn entry_survives_without_predecessors() {
        let (mut ctx, mut module, proc) = process_fixture();
        let entry = module.create_block(proc, Some("entry".into()));
        {
            let mut b = Builder::new(&mut module, &mut ctx, entry);
            b.wait_any().unwrap();
        }
        assert_eq!(delete_unreachable_blocks(&mut module, proc), 0);
        assert_eq!(module.blocks(proc).count(), 1);
    }

    #[test]
    fn reachable_diamond_is_kept() {
        let (mut ctx, mut module, proc) = process_fixture();
        let input = module.unit(proc).inputs[0];
        let entry = module.create_block(proc, Some("entry".into()));
        let then_bb = module.create_block(proc, Some("then".into()));
        let else_bb = module.create_block(proc, Some("else".into()));
        let join = module.create_block(proc, Some("join".into()));
        {
            let mut b = Builder::new(&mut module, &mut ctx, entry);
            let v = b.probe(input).unwrap();
            let zero = b.int(8, 0);
            let c = b.cmp(lhd_ir::CmpOp::Ne, v, zero).unwrap();
            b.br_cond(c, then_bb, else_bb).unwrap();
            b.set_pos(then_bb);
            b.br(join).unwrap();
            b.set_pos(else_bb);
            b.br(join).unwrap();
            b.set_pos(join);
            b.wait_any().unwrap();
        }
        assert_eq!(delete_unreachable_blocks(&mut module, proc), 0);
        assert_eq!(module.blocks(proc).count(), 4);
    }

    #[test]
    fn after_the_pass_every_block_is_entry_or_has_predecessors() {
        let (mut ctx, mut module, proc) = process_fixture();
        let entry = module.create_block(proc, Some("entry".into()));
        let live = module.create_block(proc, Some("live".into()));
        let dead = module.create_block(proc, Some("dead".into()));
        let shared = module.create_block(proc, Some("shared".into()));
        {
            let mut b = Builder::new(&mut module, &mut ctx, entry);
            b.br(live).unwrap();
            b.set_pos(live);
            b.br(shared).unwrap();
            // `shared` also has an edge from the dead block; it must
            // survive on the strength of the live one.
            b.set_pos(dead);
            b.br(shared).unwrap();
            b.set_pos(shared);
            b.wait_any().unwrap();
        }
        assert_eq!(delete_unreachable_blocks(&mut module, proc), 1);
        for block in module.blocks(proc).collect::<Vec<_>>() {
            assert!(block == entry || module.predecessor_count(block) > 0);
        }
    }
}
