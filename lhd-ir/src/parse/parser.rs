//! Recursive-descent parser over the token stream.
//!
//! Unit headers are parsed in a first pass so that instantiations and
//! calls can refer to units defined later in the file. Local names may
//! also be referenced before their definition; an unresolved placeholder
//! stands in and is substituted away when the definition appears. Names
//! still pending at the end of a unit are reported and left in place as
//! sentinels.

use std::collections::HashMap;

use crate::parse::{Token, TokenKind};
use crate::{
    BinaryOp, CmpOp, Context, ConvertOp, Diagnostic, DiagnosticSink, InstKind, Module,
    SourceRange, Type, TypeKind, UnaryOp, UnitKind, Value, ValueData,
};

pub(crate) struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    ctx: &'a mut Context,
    sink: &'a mut dyn DiagnosticSink,
    pub(crate) errors: usize,
}

/// Local parse failure; the caller recovers to a synchronisation point.
struct Bail;

type Parse<T> = Result<T, Bail>;

const UNIT_KEYWORDS: [&str; 4] = ["decl", "func", "proc", "entity"];

struct UnitScope {
    names: HashMap<String, Value>,
    pending: HashMap<String, Value>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(
        tokens: Vec<Token>,
        ctx: &'a mut Context,
        sink: &'a mut dyn DiagnosticSink,
    ) -> Self {
        Parser {
            tokens,
            pos: 0,
            ctx,
            sink,
            errors: 0,
        }
    }

    // ---- token helpers ----

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn range(&self) -> SourceRange {
        self.tokens[self.pos].range
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error(&mut self, message: impl Into<String>) -> Bail {
        self.errors += 1;
        let range = self.range();
        self.sink
            .report(Diagnostic::error(message).with_range(range));
        Bail
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Parse<()> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn expect_ident(&mut self, word: &str) -> Parse<()> {
        match self.peek() {
            TokenKind::Ident(w) if w == word => {
                self.bump();
                Ok(())
            }
            _ => Err(self.error(format!("expected keyword '{word}'"))),
        }
    }

    fn expect_local(&mut self, what: &str) -> Parse<String> {
        match self.bump() {
            TokenKind::Local(name) => Ok(name),
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn expect_global(&mut self, what: &str) -> Parse<String> {
        match self.bump() {
            TokenKind::Global(name) => Ok(name),
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn at_unit_keyword(&self) -> bool {
        matches!(self.peek(), TokenKind::Ident(w) if UNIT_KEYWORDS.contains(&w.as_str()))
    }

    /// Skip ahead to the next top-level keyword outside any braces.
    fn recover(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                TokenKind::Eof => return,
                TokenKind::LBrace => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    self.bump();
                }
                _ if depth == 0 && self.at_unit_keyword() => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    // ---- types ----

    fn parse_type(&mut self) -> Parse<Type> {
        let mut ty = match self.bump() {
            TokenKind::Ident(word) => match word.as_str() {
                "void" => self.ctx.void_ty(),
                "label" => self.ctx.label_ty(),
                "time" => self.ctx.time_ty(),
                _ => {
                    let width = word[1..].parse::<u32>().ok().filter(|w| *w >= 1);
                    match (word.bytes().next(), width) {
                        (Some(b'i'), Some(w)) => self.ctx.int_ty(w),
                        (Some(b'l'), Some(w)) => self.ctx.logic_ty(w),
                        _ => return Err(self.error(format!("unknown type {word:?}"))),
                    }
                }
            },
            TokenKind::LBrace => {
                let mut fields = Vec::new();
                if !self.eat(&TokenKind::RBrace) {
                    loop {
                        fields.push(self.parse_type()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RBrace, "'}' after struct fields")?;
                }
                self.ctx.struct_ty(fields)
            }
            TokenKind::LBracket => {
                let len = match self.bump() {
                    TokenKind::Num(n) => n as usize,
                    _ => return Err(self.error("expected array length")),
                };
                self.expect_ident("x")?;
                let elem = self.parse_type()?;
                self.expect(TokenKind::RBracket, "']' after array type")?;
                self.ctx.array_ty(elem, len)
            }
            _ => return Err(self.error("expected a type")),
        };
        loop {
            if self.eat(&TokenKind::Star) {
                ty = self.ctx.ptr_ty(ty);
            } else if self.eat(&TokenKind::Dollar) {
                ty = self.ctx.signal_ty(ty);
            } else {
                return Ok(ty);
            }
        }
    }

    fn parse_type_list(&mut self) -> Parse<Vec<Type>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut tys = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                tys.push(self.parse_type()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
        }
        Ok(tys)
    }

    // ---- module and unit structure ----

    pub(crate) fn parse_module(&mut self) -> Module {
        let name = if matches!(self.peek(), TokenKind::Ident(w) if w == "mod") {
            self.bump();
            self.expect_global("module name").unwrap_or_else(|Bail| {
                self.recover();
                String::from("unnamed")
            })
        } else {
            String::from("unnamed")
        };
        let mut module = Module::new(name);

        // First pass: headers only, so later bodies can resolve any
        // unit by name.
        let mut bodies = Vec::new();
        while !matches!(self.peek(), TokenKind::Eof) {
            if !self.at_unit_keyword() {
                let _ = self.error("expected a unit definition");
                self.recover();
                continue;
            }
            match self.parse_unit_header(&mut module) {
                Ok((unit, kind)) => {
                    let body_start = self.pos;
                    if kind.is_definition() {
                        self.skip_body();
                    }
                    bodies.push((unit, body_start));
                }
                Err(Bail) => self.recover(),
            }
        }
        let end = self.pos;

        // Second pass: bodies.
        for (unit, body_start) in bodies {
            self.pos = body_start;
            if module.unit(unit).kind.is_definition() {
                if let Err(Bail) = self.parse_unit_body(&mut module, unit) {
                    self.recover();
                }
            }
        }
        self.pos = end;
        module
    }

    fn skip_body(&mut self) {
        if !self.eat(&TokenKind::LBrace) {
            return;
        }
        let mut depth = 1usize;
        while depth > 0 {
            match self.bump() {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                TokenKind::Eof => return,
                _ => {}
            }
        }
    }

    /// Parse `decl|func|proc|entity @name (…) (…)` and create the unit
    /// with named arguments. Leaves the position at the body brace.
    fn parse_unit_header(&mut self, module: &mut Module) -> Parse<(Value, UnitKind)> {
        let keyword = match self.bump() {
            TokenKind::Ident(w) => w,
            _ => return Err(self.error("expected unit keyword")),
        };
        let name = self.expect_global("unit name")?;
        match keyword.as_str() {
            "decl" => {
                let ins = self.parse_type_list()?;
                let outs = self.parse_type_list()?;
                let all_signals = ins
                    .iter()
                    .chain(&outs)
                    .all(|t| matches!(self.ctx.kind(*t), TypeKind::Signal(_)));
                let sig = if !ins.is_empty() && all_signals {
                    self.ctx.comp_ty(ins, outs)
                } else {
                    self.ctx.func_ty(ins, outs)
                };
                let unit = module.create_unit(self.ctx, UnitKind::Declaration, name, sig);
                Ok((unit, UnitKind::Declaration))
            }
            "func" => {
                let (in_tys, in_names) = self.parse_named_args(false)?;
                let outs = self.parse_type_list()?;
                let sig = self.ctx.func_ty(in_tys, outs);
                let unit = module.create_unit(self.ctx, UnitKind::Function, name, sig);
                let args = module.unit(unit).inputs.clone();
                for (arg, name) in args.into_iter().zip(in_names) {
                    module.set_value_name(arg, name);
                }
                Ok((unit, UnitKind::Function))
            }
            "proc" | "entity" => {
                let kind = if keyword == "proc" {
                    UnitKind::Process
                } else {
                    UnitKind::Entity
                };
                let (in_tys, in_names) = self.parse_named_args(true)?;
                let (out_tys, out_names) = self.parse_named_args(true)?;
                let sig = self.ctx.comp_ty(in_tys, out_tys);
                let unit = module.create_unit(self.ctx, kind, name, sig);
                let args: Vec<Value> = module
                    .unit(unit)
                    .inputs
                    .iter()
                    .chain(&module.unit(unit).outputs)
                    .copied()
                    .collect();
                for (arg, name) in args.into_iter().zip(in_names.into_iter().chain(out_names))
                {
                    module.set_value_name(arg, name);
                }
                Ok((unit, kind))
            }
            other => Err(self.error(format!("unknown unit keyword {other:?}"))),
        }
    }

    /// `( [in|out] <ty> %name, … )`; direction keywords are accepted and
    /// ignored beyond their documentation value.
    fn parse_named_args(&mut self, directed: bool) -> Parse<(Vec<Type>, Vec<Option<String>>)> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut tys = Vec::new();
        let mut names = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                if directed {
                    if let TokenKind::Ident(w) = self.peek() {
                        if w == "in" || w == "out" {
                            self.bump();
                        }
                    }
                }
                tys.push(self.parse_type()?);
                names.push(match self.peek() {
                    TokenKind::Local(_) => Some(self.expect_local("argument name")?),
                    _ => None,
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
        }
        Ok((tys, names))
    }

    fn parse_unit_body(&mut self, module: &mut Module, unit: Value) -> Parse<()> {
        self.expect(TokenKind::LBrace, "'{' starting unit body")?;
        let mut scope = UnitScope {
            names: HashMap::new(),
            pending: HashMap::new(),
        };
        let args: Vec<Value> = module
            .unit(unit)
            .inputs
            .iter()
            .chain(&module.unit(unit).outputs)
            .copied()
            .collect();
        for arg in args {
            if let Some(name) = module.name_of(arg) {
                scope.names.insert(name.to_string(), arg);
            }
        }
        let is_entity = module.unit(unit).kind == UnitKind::Entity;
        let mut container = if is_entity { Some(unit) } else { None };
        loop {
            match self.peek() {
                TokenKind::RBrace => {
                    self.bump();
                    break;
                }
                TokenKind::Eof => {
                    return Err(self.error("unexpected end of input inside unit body"));
                }
                TokenKind::Local(_) if *self.peek_at(1) == TokenKind::Colon && !is_entity => {
                    let name = self.expect_local("block label")?;
                    self.bump();
                    let block = module.create_block(unit, Some(name.clone()));
                    self.define(module, &mut scope, name, block);
                    container = Some(block);
                }
                _ => {
                    let Some(container) = container else {
                        return Err(self.error("instruction before the first block label"));
                    };
                    self.parse_inst(module, &mut scope, container)?;
                }
            }
        }
        // Whatever is still pending was never defined.
        let pending: Vec<String> = scope.pending.keys().cloned().collect();
        if !pending.is_empty() {
            for name in pending {
                self.errors += 1;
                self.sink.report(Diagnostic::error(format!(
                    "undefined name %{name} in @{}",
                    module.unit(unit).name
                )));
            }
            module.set_unresolved_flag(unit);
        }
        Ok(())
    }

    fn define(&mut self, module: &mut Module, scope: &mut UnitScope, name: String, value: Value) {
        if let Some(placeholder) = scope.pending.remove(&name) {
            module.replace_all_uses_with(placeholder, value);
            module.free_detached(placeholder);
        }
        scope.names.insert(name, value);
    }

    /// Resolve a `%name` reference, creating a placeholder when the
    /// definition has not been seen yet.
    fn resolve(
        &mut self,
        module: &mut Module,
        scope: &mut UnitScope,
        name: String,
        ty: Type,
    ) -> Value {
        if let Some(v) = scope.names.get(&name) {
            return *v;
        }
        if let Some(v) = scope.pending.get(&name) {
            return *v;
        }
        let placeholder = module.alloc_unresolved(ty, name.clone());
        scope.pending.insert(name, placeholder);
        placeholder
    }

    /// An operand of known type: a local reference or an inline
    /// literal.
    fn parse_operand(
        &mut self,
        module: &mut Module,
        scope: &mut UnitScope,
        ty: Type,
    ) -> Parse<Value> {
        match self.peek().clone() {
            TokenKind::Local(name) => {
                self.bump();
                Ok(self.resolve(module, scope, name, ty))
            }
            _ => self.parse_const_operand(module),
        }
    }

    fn parse_const_operand(&mut self, module: &mut Module) -> Parse<Value> {
        let konst = self.parse_const()?;
        Ok(module.const_value(self.ctx, konst))
    }

    /// A typed literal; aggregates infer their type from the elements.
    fn parse_const(&mut self) -> Parse<crate::Const> {
        match self.bump() {
            TokenKind::IntLit(v) => Ok(self.ctx.const_int(v)),
            TokenKind::LogicLit(v) => Ok(self.ctx.const_logic(v)),
            TokenKind::TimeLit(v) => Ok(self.ctx.const_time(v)),
            TokenKind::LBrace => {
                let mut elems = Vec::new();
                if !self.eat(&TokenKind::RBrace) {
                    loop {
                        elems.push(self.parse_const()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RBrace, "'}' after struct literal")?;
                }
                let tys: Vec<Type> =
                    elems.iter().map(|c| self.ctx.const_data(*c).ty).collect();
                let ty = self.ctx.struct_ty(tys);
                Ok(self.ctx.const_aggregate(ty, elems))
            }
            TokenKind::LBracket => {
                let mut elems = Vec::new();
                loop {
                    elems.push(self.parse_const()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "']' after array literal")?;
                let elem_ty = self.ctx.const_data(elems[0]).ty;
                let ty = self.ctx.array_ty(elem_ty, elems.len());
                Ok(self.ctx.const_aggregate(ty, elems))
            }
            _ => Err(self.error("expected an operand")),
        }
    }

    fn parse_num(&mut self, what: &str) -> Parse<usize> {
        match self.bump() {
            TokenKind::Num(n) => Ok(n as usize),
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn block_ref(&mut self, module: &mut Module, scope: &mut UnitScope) -> Parse<Value> {
        let name = self.expect_local("block reference")?;
        let label = self.ctx.label_ty();
        Ok(self.resolve(module, scope, name, label))
    }

    fn callee_ref(&mut self, module: &mut Module) -> Parse<Value> {
        let name = self.expect_global("unit reference")?;
        match module.unit_by_name(&name) {
            Some(unit) => Ok(unit),
            None => Err(self.error(format!("reference to unknown unit @{name}"))),
        }
    }

    /// One instruction, appended to `container`.
    fn parse_inst(
        &mut self,
        module: &mut Module,
        scope: &mut UnitScope,
        container: Value,
    ) -> Parse<()> {
        let result_name = if matches!(self.peek(), TokenKind::Local(_))
            && *self.peek_at(1) == TokenKind::Eq
        {
            let name = self.expect_local("result name")?;
            self.bump();
            Some(name)
        } else {
            None
        };
        let opcode = match self.bump() {
            TokenKind::Ident(w) => w,
            _ => return Err(self.error("expected an instruction")),
        };
        let line = self.tokens[self.pos.saturating_sub(1)].line;
        let (kind, ty) = self.parse_inst_kind(module, scope, &opcode, line)?;
        let inst = module.build_inst(kind, ty, result_name.clone());
        if let Err(err) = module.append_inst(container, inst) {
            module.erase_inst(inst);
            return Err(self.error(format!("instruction not allowed here: {err}")));
        }
        if let Some(name) = result_name {
            self.define(module, scope, name, inst);
        }
        Ok(())
    }

    fn signedness(&mut self, opcode: &str) -> Parse<bool> {
        match self.bump() {
            TokenKind::Ident(w) if w == "signed" => Ok(true),
            TokenKind::Ident(w) if w == "unsigned" => Ok(false),
            _ => Err(self.error(format!("expected signed/unsigned after '{opcode}'"))),
        }
    }

    fn parse_inst_kind(
        &mut self,
        module: &mut Module,
        scope: &mut UnitScope,
        opcode: &str,
        line: u32,
    ) -> Parse<(InstKind, Type)> {
        let void = self.ctx.void_ty();
        match opcode {
            "not" => {
                let ty = self.parse_type()?;
                let arg = self.parse_operand(module, scope, ty)?;
                Ok((
                    InstKind::Unary {
                        op: UnaryOp::Not,
                        arg,
                    },
                    ty,
                ))
            }
            "add" | "sub" | "and" | "or" | "xor" | "mul" | "div" | "rem" | "mod" => {
                let op = match opcode {
                    "add" => BinaryOp::Add,
                    "sub" => BinaryOp::Sub,
                    "and" => BinaryOp::And,
                    "or" => BinaryOp::Or,
                    "xor" => BinaryOp::Xor,
                    signed_op => {
                        let signed = self.signedness(signed_op)?;
                        match (signed_op, signed) {
                            ("mul", false) => BinaryOp::Umul,
                            ("mul", true) => BinaryOp::Smul,
                            ("div", false) => BinaryOp::Udiv,
                            ("div", true) => BinaryOp::Sdiv,
                            ("rem", false) => BinaryOp::Urem,
                            ("rem", true) => BinaryOp::Srem,
                            ("mod", false) => BinaryOp::Umod,
                            _ => BinaryOp::Smod,
                        }
                    }
                };
                let ty = self.parse_type()?;
                let lhs = self.parse_operand(module, scope, ty)?;
                self.expect(TokenKind::Comma, "',' between operands")?;
                let rhs = self.parse_operand(module, scope, ty)?;
                Ok((InstKind::Binary { op, lhs, rhs }, ty))
            }
            "lsl" | "lsr" | "asr" => {
                let op = match opcode {
                    "lsl" => BinaryOp::Lsl,
                    "lsr" => BinaryOp::Lsr,
                    _ => BinaryOp::Asr,
                };
                let ty = self.parse_type()?;
                let lhs = self.parse_operand(module, scope, ty)?;
                self.expect(TokenKind::Comma, "',' before shift amount")?;
                let amount_ty = self.parse_type()?;
                let rhs = self.parse_operand(module, scope, amount_ty)?;
                Ok((InstKind::Binary { op, lhs, rhs }, ty))
            }
            "cmp" => {
                let op = match self.bump() {
                    TokenKind::Ident(w) => match CmpOp::from_mnemonic(&w) {
                        Some(op) => op,
                        None => return Err(self.error(format!("unknown comparison {w:?}"))),
                    },
                    _ => return Err(self.error("expected comparison mode")),
                };
                let ty = self.parse_type()?;
                let lhs = self.parse_operand(module, scope, ty)?;
                self.expect(TokenKind::Comma, "',' between operands")?;
                let rhs = self.parse_operand(module, scope, ty)?;
                let bit = self.ctx.int_ty(1);
                Ok((InstKind::Cmp { op, lhs, rhs }, bit))
            }
            "trunc" | "lmap" => {
                let op = if opcode == "trunc" {
                    ConvertOp::Trunc
                } else {
                    ConvertOp::Lmap
                };
                let ty = self.parse_type()?;
                let arg = self.parse_operand(module, scope, ty)?;
                self.expect(TokenKind::Comma, "',' before target type")?;
                let target = self.parse_type()?;
                Ok((InstKind::Convert { op, arg }, target))
            }
            "ext" => {
                let op = if matches!(self.peek(), TokenKind::Ident(w) if w == "signed") {
                    self.bump();
                    ConvertOp::Sext
                } else {
                    ConvertOp::Zext
                };
                let ty = self.parse_type()?;
                let arg = self.parse_operand(module, scope, ty)?;
                self.expect(TokenKind::Comma, "',' before target type")?;
                let target = self.parse_type()?;
                Ok((InstKind::Convert { op, arg }, target))
            }
            "extract" => {
                let ty = self.parse_type()?;
                let arg = self.parse_operand(module, scope, ty)?;
                self.expect(TokenKind::Comma, "','")?;
                let index = self.parse_num("slice index")?;
                self.expect(TokenKind::Comma, "','")?;
                let length = self.parse_num("slice length")?;
                let result = self.slice_ty(ty, index, length)?;
                Ok((InstKind::Extract { arg, index, length }, result))
            }
            "insert" => {
                let ty = self.parse_type()?;
                let target = self.parse_operand(module, scope, ty)?;
                self.expect(TokenKind::Comma, "','")?;
                let value_ty = self.parse_type()?;
                let value = self.parse_operand(module, scope, value_ty)?;
                self.expect(TokenKind::Comma, "','")?;
                let index = self.parse_num("insert index")?;
                Ok((
                    InstKind::Insert {
                        target,
                        value,
                        index,
                    },
                    ty,
                ))
            }
            "cat" => {
                let mut parts = Vec::new();
                let mut width = 0;
                loop {
                    let ty = self.parse_type()?;
                    width += self.ctx.width(ty).unwrap_or(0);
                    parts.push(self.parse_operand(module, scope, ty)?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                let ty = self.ctx.logic_ty(width.max(1));
                Ok((InstKind::Cat { parts }, ty))
            }
            "sel" => {
                let ty = self.parse_type()?;
                let arg = self.parse_operand(module, scope, ty)?;
                self.expect(TokenKind::Comma, "','")?;
                self.expect(TokenKind::LBracket, "'['")?;
                let mut ranges = Vec::new();
                let mut total = 0;
                loop {
                    let offset = self.parse_num("range offset")?;
                    self.expect(TokenKind::Colon, "':'")?;
                    let length = self.parse_num("range length")?;
                    total += length;
                    ranges.push((offset, length));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "']'")?;
                let ty = self.ctx.logic_ty(total.max(1) as u32);
                Ok((InstKind::Sel { arg, ranges }, ty))
            }
            "alloc" | "sig" => {
                let elem = self.parse_type()?;
                let init = if self.eat(&TokenKind::Comma) {
                    Some(self.parse_operand(module, scope, elem)?)
                } else {
                    None
                };
                if opcode == "alloc" {
                    let ty = self.ctx.ptr_ty(elem);
                    Ok((InstKind::Alloc { init }, ty))
                } else {
                    let ty = self.ctx.signal_ty(elem);
                    Ok((InstKind::Sig { init }, ty))
                }
            }
            "ld" => {
                let ptr_ty = self.parse_type()?;
                let ptr = self.parse_operand(module, scope, ptr_ty)?;
                let elem = self
                    .ctx
                    .ptr_elem(ptr_ty)
                    .ok_or_else(|| self.error("ld expects a pointer type"))?;
                Ok((InstKind::Load { ptr }, elem))
            }
            "st" => {
                let ptr_ty = self.parse_type()?;
                let ptr = self.parse_operand(module, scope, ptr_ty)?;
                self.expect(TokenKind::Comma, "','")?;
                let elem = self
                    .ctx
                    .ptr_elem(ptr_ty)
                    .ok_or_else(|| self.error("st expects a pointer type"))?;
                let value = self.parse_operand(module, scope, elem)?;
                Ok((InstKind::Store { ptr, value }, void))
            }
            "prb" => {
                let sig_ty = self.parse_type()?;
                let signal = self.parse_operand(module, scope, sig_ty)?;
                let elem = self
                    .ctx
                    .signal_elem(sig_ty)
                    .ok_or_else(|| self.error("prb expects a signal type"))?;
                Ok((InstKind::Probe { signal }, elem))
            }
            "drv" => {
                let sig_ty = self.parse_type()?;
                let signal = self.parse_operand(module, scope, sig_ty)?;
                self.expect(TokenKind::Comma, "','")?;
                let elem = self
                    .ctx
                    .signal_elem(sig_ty)
                    .ok_or_else(|| self.error("drv expects a signal type"))?;
                let value = self.parse_operand(module, scope, elem)?;
                let delay = if self.eat(&TokenKind::Comma) {
                    let time = self.ctx.time_ty();
                    Some(self.parse_operand(module, scope, time)?)
                } else {
                    None
                };
                Ok((
                    InstKind::Drive {
                        signal,
                        value,
                        delay,
                    },
                    void,
                ))
            }
            "reg" => {
                let sig_ty = self.parse_type()?;
                let signal = self.parse_operand(module, scope, sig_ty)?;
                self.expect(TokenKind::Comma, "','")?;
                let elem = self
                    .ctx
                    .signal_elem(sig_ty)
                    .ok_or_else(|| self.error("reg expects a signal type"))?;
                let value = self.parse_operand(module, scope, elem)?;
                self.expect(TokenKind::Comma, "','")?;
                let bit = self.ctx.int_ty(1);
                let enable = self.parse_operand(module, scope, bit)?;
                Ok((
                    InstKind::Reg {
                        signal,
                        value,
                        enable,
                    },
                    void,
                ))
            }
            "br" => {
                if *self.peek_at(1) == TokenKind::Comma {
                    let bit = self.ctx.int_ty(1);
                    let cond = self.parse_operand(module, scope, bit)?;
                    self.expect(TokenKind::Comma, "','")?;
                    let if_true = self.block_ref(module, scope)?;
                    self.expect(TokenKind::Comma, "','")?;
                    let if_false = self.block_ref(module, scope)?;
                    Ok((
                        InstKind::BrCond {
                            cond,
                            if_true,
                            if_false,
                        },
                        void,
                    ))
                } else {
                    let dest = self.block_ref(module, scope)?;
                    Ok((InstKind::Br { dest }, void))
                }
            }
            "switch" => {
                let key_ty = self.parse_type()?;
                let key = self.parse_operand(module, scope, key_ty)?;
                self.expect(TokenKind::LBracket, "'[' before switch cases")?;
                let mut cases = Vec::new();
                if !self.eat(&TokenKind::RBracket) {
                    loop {
                        let value = self.parse_const_operand(module)?;
                        self.expect(TokenKind::Colon, "':'")?;
                        let dest = self.block_ref(module, scope)?;
                        cases.push((value, dest));
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RBracket, "']' after switch cases")?;
                }
                let default = if matches!(self.peek(), TokenKind::Ident(w) if w == "default") {
                    self.bump();
                    Some(self.block_ref(module, scope)?)
                } else {
                    None
                };
                Ok((
                    InstKind::Switch {
                        key,
                        cases,
                        default,
                    },
                    void,
                ))
            }
            "ret" => {
                let mut values = Vec::new();
                // Operands only on the same source line; `ret` is often
                // followed directly by another instruction.
                while self.line() == line
                    && !matches!(
                        self.peek(),
                        TokenKind::RBrace | TokenKind::Eof
                    )
                {
                    let ty = self.parse_type()?;
                    values.push(self.parse_operand(module, scope, ty)?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                Ok((InstKind::Ret { values }, void))
            }
            "wait" => {
                if self.line() != line {
                    return Ok((InstKind::WaitAny, void));
                }
                match self.peek().clone() {
                    TokenKind::Ident(w) if w == "abs" => {
                        self.bump();
                        let time = self.ctx.time_ty();
                        let delay = self.parse_operand(module, scope, time)?;
                        Ok((
                            InstKind::WaitTime {
                                delay,
                                absolute: true,
                            },
                            void,
                        ))
                    }
                    TokenKind::Ident(w) if w == "cond" => {
                        self.bump();
                        let bit = self.ctx.int_ty(1);
                        let cond = self.parse_operand(module, scope, bit)?;
                        self.expect(TokenKind::Comma, "','")?;
                        let dest = self.block_ref(module, scope)?;
                        Ok((InstKind::WaitCond { cond, dest }, void))
                    }
                    TokenKind::TimeLit(_) | TokenKind::Local(_) => {
                        let time = self.ctx.time_ty();
                        let delay = self.parse_operand(module, scope, time)?;
                        Ok((
                            InstKind::WaitTime {
                                delay,
                                absolute: false,
                            },
                            void,
                        ))
                    }
                    _ => Ok((InstKind::WaitAny, void)),
                }
            }
            "inst" => {
                let callee = self.callee_ref(module)?;
                let inputs = self.parse_value_list(module, scope)?;
                let outputs = self.parse_value_list(module, scope)?;
                Ok((
                    InstKind::Instantiate {
                        callee,
                        inputs,
                        outputs,
                    },
                    void,
                ))
            }
            "call" => {
                let callee = self.callee_ref(module)?;
                let args = self.parse_value_list(module, scope)?;
                let sig = match module.data(callee) {
                    ValueData::Unit(data) => data.sig,
                    _ => unreachable!("callee_ref yields units"),
                };
                let ty = match self.ctx.signature(sig).and_then(|(_, outs)| outs.first()) {
                    Some(ty) => *ty,
                    None => void,
                };
                Ok((InstKind::Call { callee, args }, ty))
            }
            other => Err(self.error(format!("unknown instruction {other:?}"))),
        }
    }

    /// `( %a, %b, … )` where operand types come from the callee
    /// signature; unresolved entries get a void placeholder type.
    fn parse_value_list(
        &mut self,
        module: &mut Module,
        scope: &mut UnitScope,
    ) -> Parse<Vec<Value>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut values = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                let void = self.ctx.void_ty();
                values.push(self.parse_operand(module, scope, void)?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
        }
        Ok(values)
    }

    fn slice_ty(&mut self, ty: Type, index: usize, length: usize) -> Parse<Type> {
        match self.ctx.kind(ty).clone() {
            TypeKind::Int(_) => Ok(self.ctx.int_ty(length.max(1) as u32)),
            TypeKind::Logic(_) => Ok(self.ctx.logic_ty(length.max(1) as u32)),
            TypeKind::Array(elem, _) => {
                if length == 1 {
                    Ok(elem)
                } else {
                    Ok(self.ctx.array_ty(elem, length))
                }
            }
            TypeKind::Struct(fields) => fields
                .get(index)
                .copied()
                .ok_or_else(|| self.error("struct field index out of range")),
            _ => Err(self.error("extract expects an aggregate or vector")),
        }
    }
}
