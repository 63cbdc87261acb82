//! The module: ownership root of units, blocks and instructions.
//!
//! All list surgery is O(1) given a handle; iteration follows the
//! doubly linked lists in insertion order. The module also owns the value
//! arena, so every structural operation that touches the use graph lives
//! here.

use std::collections::HashMap;

use crate::value::{BlockData, UnitData, ValueArena};
use crate::{
    Const, Context, Diagnostic, DiagnosticSink, Dir, InstData, InstKind, IrError, Placement,
    Type, UnitKind, Use, Value, ValueData,
};

/// A container of units with a shared value arena.
#[derive(Debug, Default)]
pub struct Module {
    name: String,
    pub(crate) values: ValueArena,
    first_unit: Option<Value>,
    last_unit: Option<Value>,
    const_values: HashMap<Const, Value>,
}

impl Module {
    /// An empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of live values in the arena, instructions and blocks
    /// included.
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    // ---- value access ----

    /// The payload of a value. Panics on stale handles.
    pub fn data(&self, value: Value) -> &ValueData {
        &self.values.get(value).data
    }

    /// The instruction payload of `value`; panics if it is not an
    /// instruction.
    pub fn inst(&self, value: Value) -> &InstData {
        match self.data(value) {
            ValueData::Inst(data) => data,
            other => panic!("expected instruction, found {other:?}"),
        }
    }

    fn inst_mut(&mut self, value: Value) -> &mut InstData {
        match &mut self.values.get_mut(value).data {
            ValueData::Inst(data) => data,
            other => panic!("expected instruction, found {other:?}"),
        }
    }

    /// The block payload of `value`; panics if it is not a block.
    pub fn block(&self, value: Value) -> &BlockData {
        match self.data(value) {
            ValueData::Block(data) => data,
            other => panic!("expected block, found {other:?}"),
        }
    }

    fn block_mut(&mut self, value: Value) -> &mut BlockData {
        match &mut self.values.get_mut(value).data {
            ValueData::Block(data) => data,
            other => panic!("expected block, found {other:?}"),
        }
    }

    /// The unit payload of `value`; panics if it is not a unit.
    pub fn unit(&self, value: Value) -> &UnitData {
        match self.data(value) {
            ValueData::Unit(data) => data,
            other => panic!("expected unit, found {other:?}"),
        }
    }

    fn unit_mut(&mut self, value: Value) -> &mut UnitData {
        match &mut self.values.get_mut(value).data {
            ValueData::Unit(data) => data,
            other => panic!("expected unit, found {other:?}"),
        }
    }

    /// The type of any value; blocks report the label type.
    pub fn value_ty(&self, ctx: &mut Context, value: Value) -> Type {
        self.data(value).ty(|| ctx.label_ty())
    }

    /// The optional name of a value.
    pub fn name_of(&self, value: Value) -> Option<&str> {
        self.data(value).name()
    }

    /// Rename an argument, block or instruction.
    pub fn set_value_name(&mut self, value: Value, name: Option<String>) {
        match &mut self.values.get_mut(value).data {
            ValueData::Arg { name: slot, .. } => *slot = name,
            ValueData::Block(data) => data.name = name,
            ValueData::Inst(data) => data.name = name,
            other => panic!("cannot rename {other:?}"),
        }
    }

    /// The context constant behind a materialized constant value.
    pub fn value_const(&self, value: Value) -> Option<Const> {
        match self.data(value) {
            ValueData::Const { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// The uses currently recorded on a value.
    pub fn uses(&self, value: Value) -> &[Use] {
        &self.values.get(value).uses
    }

    /// Materialize a context constant as a value of this module. One
    /// value is shared per constant.
    pub fn const_value(&mut self, ctx: &Context, konst: Const) -> Value {
        if let Some(v) = self.const_values.get(&konst) {
            return *v;
        }
        let ty = ctx.const_data(konst).ty;
        let v = self.values.alloc(ValueData::Const { ty, value: konst });
        self.const_values.insert(konst, v);
        v
    }

    // ---- units ----

    /// Create a unit and append it to the module. The argument values
    /// are created from the signature; for entities and processes the
    /// signature carries signal types.
    pub fn create_unit(
        &mut self,
        ctx: &Context,
        kind: UnitKind,
        name: impl Into<String>,
        sig: Type,
    ) -> Value {
        let (ins, outs) = ctx
            .signature(sig)
            .expect("unit signature must be a func or comp type");
        let (ins, outs) = (ins.to_vec(), outs.to_vec());
        let unit = self.values.alloc(ValueData::Unit(UnitData {
            kind,
            name: name.into(),
            sig,
            inputs: Vec::new(),
            outputs: Vec::new(),
            first_block: None,
            last_block: None,
            first_inst: None,
            last_inst: None,
            prev: self.last_unit,
            next: None,
            has_unresolved: false,
        }));
        let inputs: Vec<Value> = ins
            .into_iter()
            .map(|ty| {
                self.values.alloc(ValueData::Arg {
                    ty,
                    name: None,
                    unit,
                    dir: Dir::In,
                })
            })
            .collect();
        let outputs: Vec<Value> = outs
            .into_iter()
            .map(|ty| {
                self.values.alloc(ValueData::Arg {
                    ty,
                    name: None,
                    unit,
                    dir: Dir::Out,
                })
            })
            .collect();
        {
            let data = self.unit_mut(unit);
            data.inputs = inputs;
            data.outputs = outputs;
        }
        match self.last_unit {
            Some(last) => self.unit_mut(last).next = Some(unit),
            None => self.first_unit = Some(unit),
        }
        self.last_unit = Some(unit);
        unit
    }

    /// Units in declaration order.
    pub fn units(&self) -> impl Iterator<Item = Value> + '_ {
        std::iter::successors(self.first_unit, move |u| self.unit(*u).next)
    }

    /// Find a unit by its global name.
    pub fn unit_by_name(&self, name: &str) -> Option<Value> {
        self.units().find(|u| self.unit(*u).name == name)
    }

    /// Detach a unit from the module without destroying it.
    pub fn remove_unit(&mut self, unit: Value) {
        let (prev, next) = {
            let data = self.unit_mut(unit);
            let links = (data.prev, data.next);
            data.prev = None;
            data.next = None;
            links
        };
        match prev {
            Some(prev) => self.unit_mut(prev).next = next,
            None => self.first_unit = next,
        }
        match next {
            Some(next) => self.unit_mut(next).prev = prev,
            None => self.last_unit = prev,
        }
    }

    /// Remove and destroy a unit together with its body. The unit must
    /// no longer have users.
    pub fn erase_unit(&mut self, unit: Value) {
        self.remove_unit(unit);
        let blocks: Vec<Value> = self.blocks(unit).collect();
        self.erase_blocks(&blocks);
        let insts: Vec<Value> = self.entity_insts(unit).collect();
        for inst in &insts {
            self.unlink_uses(*inst);
        }
        for inst in insts {
            self.values.free(inst);
        }
        let data = match self.values.free(unit) {
            ValueData::Unit(data) => data,
            _ => unreachable!(),
        };
        for arg in data.inputs.into_iter().chain(data.outputs) {
            self.values.free(arg);
        }
    }

    // ---- blocks ----

    /// Create a block and append it to a process or function body. The
    /// first block created becomes the entry and is never removed.
    pub fn create_block(&mut self, unit: Value, name: Option<String>) -> Value {
        debug_assert!(
            matches!(
                self.unit(unit).kind,
                UnitKind::Process | UnitKind::Function
            ),
            "only processes and functions have blocks"
        );
        let prev = self.unit(unit).last_block;
        let block = self.values.alloc(ValueData::Block(BlockData {
            name,
            unit,
            first_inst: None,
            last_inst: None,
            prev,
            next: None,
        }));
        match prev {
            Some(prev) => self.block_mut(prev).next = Some(block),
            None => self.unit_mut(unit).first_block = Some(block),
        }
        self.unit_mut(unit).last_block = Some(block);
        block
    }

    /// Blocks of a unit in declaration order.
    pub fn blocks(&self, unit: Value) -> impl Iterator<Item = Value> + '_ {
        std::iter::successors(self.unit(unit).first_block, move |b| {
            self.block(*b).next
        })
    }

    /// The entry block of a process or function.
    pub fn entry_block(&self, unit: Value) -> Option<Value> {
        self.unit(unit).first_block
    }

    /// Remove and destroy a set of blocks, instructions included. Uses
    /// held by the doomed instructions are unlinked before anything is
    /// freed, so the set may contain blocks referencing one another.
    pub fn erase_blocks(&mut self, blocks: &[Value]) {
        for block in blocks {
            let insts: Vec<Value> = self.insts(*block).collect();
            for inst in insts {
                self.unlink_uses(inst);
            }
        }
        for block in blocks {
            let insts: Vec<Value> = self.insts(*block).collect();
            for inst in insts {
                self.values.free(inst);
            }
            let unit = self.block(*block).unit;
            let (prev, next) = {
                let data = self.block_mut(*block);
                (data.prev, data.next)
            };
            match prev {
                Some(prev) => self.block_mut(prev).next = next,
                None => self.unit_mut(unit).first_block = next,
            }
            match next {
                Some(next) => self.block_mut(next).prev = prev,
                None => self.unit_mut(unit).last_block = prev,
            }
            self.values.free(*block);
        }
    }

    // ---- instructions ----

    /// Allocate an instruction value, recording one use per operand.
    /// The instruction starts detached; place it with
    /// [`append_inst`](Self::append_inst) or the insert operations.
    pub fn build_inst(&mut self, kind: InstKind, ty: Type, name: Option<String>) -> Value {
        let operands = kind.operands();
        let inst = self.values.alloc(ValueData::Inst(InstData {
            kind,
            ty,
            name,
            parent: None,
            prev: None,
            next: None,
        }));
        for (index, op) in operands.into_iter().enumerate() {
            self.values.add_use(op, inst, index as u16);
        }
        inst
    }

    fn container_placement(&self, container: Value) -> Placement {
        match self.data(container) {
            ValueData::Block(data) => match self.unit(data.unit).kind {
                UnitKind::Process => Placement::PROCESS,
                UnitKind::Function => Placement::FUNCTION,
                other => panic!("block in unexpected unit kind {other:?}"),
            },
            ValueData::Unit(data) => {
                debug_assert_eq!(data.kind, UnitKind::Entity);
                Placement::ENTITY
            }
            other => panic!("expected block or entity container, found {other:?}"),
        }
    }

    /// Append an instruction to a block or entity body, enforcing the
    /// placement rules and the terminator discipline.
    pub fn append_inst(&mut self, container: Value, inst: Value) -> Result<(), IrError> {
        debug_assert!(self.inst(inst).parent.is_none(), "instruction already placed");
        if !self
            .inst(inst)
            .kind
            .placement()
            .contains(self.container_placement(container))
        {
            return Err(IrError::MalformedBlock);
        }
        let last = match self.data(container) {
            ValueData::Block(data) => data.last_inst,
            ValueData::Unit(data) => data.last_inst,
            _ => unreachable!(),
        };
        if let Some(last) = last {
            if self.inst(last).kind.is_terminator() {
                return Err(IrError::MalformedBlock);
            }
        }
        self.link_inst(container, inst, last, None);
        Ok(())
    }

    /// Prepend an instruction to a block or entity body.
    pub fn prepend_inst(&mut self, container: Value, inst: Value) -> Result<(), IrError> {
        debug_assert!(self.inst(inst).parent.is_none(), "instruction already placed");
        if !self
            .inst(inst)
            .kind
            .placement()
            .contains(self.container_placement(container))
        {
            return Err(IrError::MalformedBlock);
        }
        let first = match self.data(container) {
            ValueData::Block(data) => data.first_inst,
            ValueData::Unit(data) => data.first_inst,
            _ => unreachable!(),
        };
        if self.inst(inst).kind.is_terminator() && first.is_some() {
            return Err(IrError::MalformedBlock);
        }
        self.link_inst(container, inst, None, first);
        Ok(())
    }

    /// Insert a detached instruction before an existing one.
    pub fn insert_inst_before(&mut self, existing: Value, inst: Value) -> Result<(), IrError> {
        let container = self.inst(existing).parent.expect("existing must be placed");
        if !self
            .inst(inst)
            .kind
            .placement()
            .contains(self.container_placement(container))
            // A terminator inserted before anything would be followed by
            // that instruction.
            || self.inst(inst).kind.is_terminator()
        {
            return Err(IrError::MalformedBlock);
        }
        let prev = self.inst(existing).prev;
        self.link_inst(container, inst, prev, Some(existing));
        Ok(())
    }

    /// Insert a detached instruction after an existing one.
    pub fn insert_inst_after(&mut self, existing: Value, inst: Value) -> Result<(), IrError> {
        let container = self.inst(existing).parent.expect("existing must be placed");
        if !self
            .inst(inst)
            .kind
            .placement()
            .contains(self.container_placement(container))
            || self.inst(existing).kind.is_terminator()
        {
            return Err(IrError::MalformedBlock);
        }
        let next = self.inst(existing).next;
        if self.inst(inst).kind.is_terminator() && next.is_some() {
            return Err(IrError::MalformedBlock);
        }
        self.link_inst(container, inst, Some(existing), next);
        Ok(())
    }

    fn link_inst(
        &mut self,
        container: Value,
        inst: Value,
        prev: Option<Value>,
        next: Option<Value>,
    ) {
        {
            let data = self.inst_mut(inst);
            data.parent = Some(container);
            data.prev = prev;
            data.next = next;
        }
        match prev {
            Some(prev) => self.inst_mut(prev).next = Some(inst),
            None => match &mut self.values.get_mut(container).data {
                ValueData::Block(data) => data.first_inst = Some(inst),
                ValueData::Unit(data) => data.first_inst = Some(inst),
                _ => unreachable!(),
            },
        }
        match next {
            Some(next) => self.inst_mut(next).prev = Some(inst),
            None => match &mut self.values.get_mut(container).data {
                ValueData::Block(data) => data.last_inst = Some(inst),
                ValueData::Unit(data) => data.last_inst = Some(inst),
                _ => unreachable!(),
            },
        }
    }

    /// Detach an instruction from its container without destroying it.
    pub fn remove_from_parent(&mut self, inst: Value) {
        let (container, prev, next) = {
            let data = self.inst_mut(inst);
            let links = (data.parent, data.prev, data.next);
            data.parent = None;
            data.prev = None;
            data.next = None;
            links
        };
        let container = match container {
            Some(c) => c,
            None => return,
        };
        match prev {
            Some(prev) => self.inst_mut(prev).next = next,
            None => match &mut self.values.get_mut(container).data {
                ValueData::Block(data) => data.first_inst = next,
                ValueData::Unit(data) => data.first_inst = next,
                _ => unreachable!(),
            },
        }
        match next {
            Some(next) => self.inst_mut(next).prev = prev,
            None => match &mut self.values.get_mut(container).data {
                ValueData::Block(data) => data.last_inst = prev,
                ValueData::Unit(data) => data.last_inst = prev,
                _ => unreachable!(),
            },
        }
    }

    /// Drop the uses an instruction holds on its operands.
    pub fn unlink_uses(&mut self, value: Value) {
        let operands = match self.data(value) {
            ValueData::Inst(data) => data.kind.operands(),
            _ => return,
        };
        for (index, op) in operands.into_iter().enumerate() {
            self.values.remove_use(op, value, index as u16);
        }
    }

    /// Remove an instruction from its container and destroy it. The
    /// instruction must no longer have users.
    pub fn erase_inst(&mut self, inst: Value) {
        self.remove_from_parent(inst);
        self.unlink_uses(inst);
        self.values.free(inst);
    }

    /// Instructions of a block, in order.
    pub fn insts(&self, block: Value) -> impl Iterator<Item = Value> + '_ {
        std::iter::successors(self.block(block).first_inst, move |i| {
            self.inst(*i).next
        })
    }

    /// Concurrent instructions of an entity body, in order.
    pub fn entity_insts(&self, unit: Value) -> impl Iterator<Item = Value> + '_ {
        std::iter::successors(self.unit(unit).first_inst, move |i| self.inst(*i).next)
    }

    /// The terminator of a block: its last instruction, when that is a
    /// terminator.
    pub fn terminator(&self, block: Value) -> Option<Value> {
        let last = self.block(block).last_inst?;
        self.inst(last).kind.is_terminator().then_some(last)
    }

    /// Blocks a block's terminator can transfer control to.
    pub fn successors(&self, block: Value) -> Vec<Value> {
        let Some(term) = self.terminator(block) else {
            return Vec::new();
        };
        self.inst(term)
            .kind
            .operands()
            .into_iter()
            .filter(|v| matches!(self.data(*v), ValueData::Block(_)))
            .collect()
    }

    /// Number of terminators targeting this block.
    pub fn predecessor_count(&self, block: Value) -> usize {
        self.uses(block).len()
    }

    // ---- parser support ----

    pub(crate) fn alloc_unresolved(&mut self, ty: Type, name: String) -> Value {
        self.values.alloc(ValueData::Unresolved { ty, name })
    }

    pub(crate) fn free_detached(&mut self, value: Value) {
        self.values.free(value);
    }

    pub(crate) fn set_unresolved_flag(&mut self, unit: Value) {
        self.unit_mut(unit).has_unresolved = true;
    }

    // ---- substitution ----

    /// Rewrite every use of `old` to refer to `new` instead.
    pub fn replace_all_uses_with(&mut self, old: Value, new: Value) {
        assert_ne!(old, new, "cannot replace a value with itself");
        let uses = core::mem::take(&mut self.values.get_mut(old).uses);
        for u in &uses {
            let data = self.inst_mut(u.user);
            let mut operands = data.kind.operands_mut();
            *operands[u.index as usize] = new;
        }
        self.values.get_mut(new).uses.extend(uses);
    }

    // ---- merging ----

    /// Merge another module into this one, link style. Both modules must
    /// share one context. Two definitions of one global name collide;
    /// a declaration is satisfied by a definition from either side.
    pub fn merge(
        &mut self,
        ctx: &Context,
        other: &Module,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<(), IrError> {
        let mut collided = false;
        for unit in other.units() {
            let data = other.unit(unit);
            if let Some(existing) = self.unit_by_name(&data.name) {
                if self.unit(existing).kind.is_definition() && data.kind.is_definition() {
                    sink.report(Diagnostic::error(format!(
                        "duplicate definition of @{}",
                        data.name
                    )));
                    collided = true;
                }
            }
        }
        if collided {
            return Err(IrError::NameCollision);
        }

        // First pass: create shells so instantiations can resolve their
        // callees, preferring definitions over declarations.
        let mut unit_map: HashMap<Value, Value> = HashMap::new();
        for unit in other.units().collect::<Vec<_>>() {
            let data = other.unit(unit);
            match self.unit_by_name(&data.name) {
                Some(existing) if !data.kind.is_definition() => {
                    unit_map.insert(unit, existing);
                }
                Some(existing) => {
                    // Incoming definition replaces our declaration.
                    let shell =
                        self.create_unit(ctx, data.kind, data.name.clone(), data.sig);
                    self.replace_all_uses_with(existing, shell);
                    self.erase_unit(existing);
                    unit_map.insert(unit, shell);
                }
                None => {
                    let shell =
                        self.create_unit(ctx, data.kind, data.name.clone(), data.sig);
                    unit_map.insert(unit, shell);
                }
            }
        }
        // Second pass: copy bodies.
        for (src, dst) in unit_map.clone() {
            self.copy_unit_body(other, src, dst, &unit_map);
        }
        Ok(())
    }

    fn copy_unit_body(
        &mut self,
        src_module: &Module,
        src: Value,
        dst: Value,
        unit_map: &HashMap<Value, Value>,
    ) {
        let src_data = src_module.unit(src);
        if !src_data.kind.is_definition() {
            return;
        }
        let mut map: HashMap<Value, Value> = unit_map.clone();
        // Arguments map positionally; their names travel along.
        let dst_args: Vec<Value> = self
            .unit(dst)
            .inputs
            .iter()
            .chain(&self.unit(dst).outputs)
            .copied()
            .collect();
        let src_args: Vec<Value> = src_data
            .inputs
            .iter()
            .chain(&src_data.outputs)
            .copied()
            .collect();
        for (a, b) in src_args.iter().zip(&dst_args) {
            map.insert(*a, *b);
            let name = src_module.name_of(*a).map(String::from);
            self.set_value_name(*b, name);
        }
        // Blocks first so that branches can resolve forward targets.
        for block in src_module.blocks(src) {
            let name = src_module.block(block).name.clone();
            let copy = self.create_block(dst, name);
            map.insert(block, copy);
        }
        // Instructions; forward references to instructions are patched
        // through unresolved placeholders.
        let mut pending: HashMap<Value, Value> = HashMap::new();
        let src_containers: Vec<(Value, Vec<Value>)> = if src_data.kind == UnitKind::Entity {
            vec![(src, src_module.entity_insts(src).collect())]
        } else {
            src_module
                .blocks(src)
                .map(|b| (b, src_module.insts(b).collect()))
                .collect()
        };
        for (container, insts) in &src_containers {
            let dst_container = *map.get(container).unwrap_or(&dst);
            for inst in insts {
                let data = src_module.inst(*inst);
                let mut kind = data.kind.clone();
                for op in kind.operands_mut() {
                    *op = self.map_operand(src_module, *op, &mut map, &mut pending);
                }
                let copy = self.build_inst(kind, data.ty, data.name.clone());
                self.append_inst(dst_container, copy)
                    .expect("copied body preserves well-formedness");
                map.insert(*inst, copy);
                if let Some(placeholder) = pending.remove(inst) {
                    self.replace_all_uses_with(placeholder, copy);
                    self.values.free(placeholder);
                }
            }
        }
        debug_assert!(pending.is_empty(), "dangling instruction references");
    }

    fn map_operand(
        &mut self,
        src_module: &Module,
        op: Value,
        map: &mut HashMap<Value, Value>,
        pending: &mut HashMap<Value, Value>,
    ) -> Value {
        if let Some(mapped) = map.get(&op) {
            return *mapped;
        }
        match src_module.data(op) {
            ValueData::Const { ty, value } => {
                let v = match self.const_values.get(value) {
                    Some(v) => *v,
                    None => {
                        let v = self.values.alloc(ValueData::Const {
                            ty: *ty,
                            value: *value,
                        });
                        self.const_values.insert(*value, v);
                        v
                    }
                };
                map.insert(op, v);
                v
            }
            ValueData::Unresolved { ty, name } => {
                let v = self.values.alloc(ValueData::Unresolved {
                    ty: *ty,
                    name: name.clone(),
                });
                map.insert(op, v);
                v
            }
            ValueData::Inst(data) => {
                // Forward reference; a placeholder stands in until the
                // instruction itself is copied.
                let placeholder = self.values.alloc(ValueData::Unresolved {
                    ty: data.ty,
                    name: data.name.clone().unwrap_or_default(),
                });
                pending.insert(op, placeholder);
                map.insert(op, placeholder);
                placeholder
            }
            other => panic!("operand kind not mappable across modules: {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UnaryOp;
    use lhd_types::ApInt;

    fn simple_func(ctx: &mut Context, module: &mut Module, name: &str) -> (Value, Value) {
        let i8t = ctx.int_ty(8);
        let sig = ctx.func_ty(vec![i8t], vec![i8t]);
        let unit = module.create_unit(ctx, UnitKind::Function, name, sig);
        let block = module.create_block(unit, Some("entry".into()));
        (unit, block)
    }

    #[test]
    fn instruction_lists_support_surgery() {
        let mut ctx = Context::new();
        let mut module = Module::new("test");
        let (unit, block) = simple_func(&mut ctx, &mut module, "f");
        let arg = module.unit(unit).inputs[0];
        let i8t = ctx.int_ty(8);

        let a = module.build_inst(
            InstKind::Unary {
                op: UnaryOp::Not,
                arg,
            },
            i8t,
            None,
        );
        module.append_inst(block, a).unwrap();
        let b = module.build_inst(
            InstKind::Unary {
                op: UnaryOp::Not,
                arg: a,
            },
            i8t,
            None,
        );
        module.append_inst(block, b).unwrap();
        let c = module.build_inst(
            InstKind::Unary {
                op: UnaryOp::Not,
                arg,
            },
            i8t,
            None,
        );
        module.insert_inst_before(b, c).unwrap();
        assert_eq!(module.insts(block).collect::<Vec<_>>(), vec![a, c, b]);

        module.remove_from_parent(c);
        assert_eq!(module.insts(block).collect::<Vec<_>>(), vec![a, b]);
        assert!(module.inst(c).parent.is_none());
        module.prepend_inst(block, c).unwrap();
        assert_eq!(module.insts(block).collect::<Vec<_>>(), vec![c, a, b]);
        module.remove_from_parent(c);
        module.erase_inst(c);

        // The use graph stays consistent through the surgery.
        assert_eq!(module.uses(a).len(), 1);
        assert_eq!(module.uses(arg).len(), 1);
    }

    #[test]
    fn second_terminator_is_rejected() {
        let mut ctx = Context::new();
        let mut module = Module::new("test");
        let (_, block) = simple_func(&mut ctx, &mut module, "f");
        let void = ctx.void_ty();
        let ret = module.build_inst(InstKind::Ret { values: vec![] }, void, None);
        module.append_inst(block, ret).unwrap();
        let ret2 = module.build_inst(InstKind::Ret { values: vec![] }, void, None);
        assert_eq!(
            module.append_inst(block, ret2),
            Err(IrError::MalformedBlock)
        );
    }

    #[test]
    fn entities_reject_sequential_instructions() {
        let mut ctx = Context::new();
        let mut module = Module::new("test");
        let i8t = ctx.int_ty(8);
        let sig_ty = ctx.signal_ty(i8t);
        let comp = ctx.comp_ty(vec![sig_ty], vec![sig_ty]);
        let entity = module.create_unit(&ctx, UnitKind::Entity, "top", comp);
        let void = ctx.void_ty();
        let ret = module.build_inst(InstKind::Ret { values: vec![] }, void, None);
        assert_eq!(
            module.append_inst(entity, ret),
            Err(IrError::MalformedBlock)
        );
    }

    #[test]
    fn replace_all_uses_rewrites_operands() {
        let mut ctx = Context::new();
        let mut module = Module::new("test");
        let (unit, block) = simple_func(&mut ctx, &mut module, "f");
        let arg = module.unit(unit).inputs[0];
        let i8t = ctx.int_ty(8);
        let user = module.build_inst(
            InstKind::Unary {
                op: UnaryOp::Not,
                arg,
            },
            i8t,
            None,
        );
        module.append_inst(block, user).unwrap();

        let konst = ctx.const_int(ApInt::from_u64(8, 7));
        let cv = module.const_value(&ctx, konst);
        module.replace_all_uses_with(arg, cv);

        assert!(module.uses(arg).is_empty());
        assert_eq!(module.uses(cv), &[Use { user, index: 0 }][..]);
        match &module.inst(user).kind {
            InstKind::Unary { arg, .. } => assert_eq!(*arg, cv),
            _ => unreachable!(),
        }
    }

    #[test]
    fn merge_detects_name_collisions() {
        let mut ctx = Context::new();
        let mut a = Module::new("a");
        let mut b = Module::new("b");
        simple_func(&mut ctx, &mut a, "f");
        simple_func(&mut ctx, &mut b, "f");
        let mut diags = Vec::new();
        assert_eq!(a.merge(&ctx, &b, &mut diags), Err(IrError::NameCollision));
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn merge_copies_units() {
        let mut ctx = Context::new();
        let mut a = Module::new("a");
        let mut b = Module::new("b");
        simple_func(&mut ctx, &mut a, "f");
        let (unit, block) = simple_func(&mut ctx, &mut b, "g");
        let arg = b.unit(unit).inputs[0];
        let i8t = ctx.int_ty(8);
        let not = b
            .build_inst(
                InstKind::Unary {
                    op: UnaryOp::Not,
                    arg,
                },
                i8t,
                Some("x".into()),
            );
        b.append_inst(block, not).unwrap();
        let void = ctx.void_ty();
        let ret = b.build_inst(InstKind::Ret { values: vec![not] }, void, None);
        b.append_inst(block, ret).unwrap();

        let mut diags = Vec::new();
        a.merge(&ctx, &b, &mut diags).unwrap();
        assert!(diags.is_empty());
        let g = a.unit_by_name("g").expect("g was merged");
        let blocks: Vec<_> = a.blocks(g).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(a.insts(blocks[0]).count(), 2);
    }
}
