//! Code generator: lowers an analyzed, optimized AST into a flat stream of
//! stack-machine `Instruction`s.
//!
//! The calling convention, activation-record layout, and built-in-skip-jump
//! shape are all carried over from the reference generator's
//! `InstructionsGenerator`; what changes is the AST being walked. Functions
//! (user-declared and built-in alike) share one emission shell: a leading
//! `JMP` over the body so straight-line top-level code never falls into it,
//! an `INT 0, ACTIVATION_RECORD_SIZE + total_param_slots` prologue that
//! reserves the AR header *and* the incoming parameter slots before any body
//! code runs, parameter copy-down from negative offsets, the body, and a
//! trailing `RET` if the body doesn't already end in one.

use std::collections::HashMap;

use crate::ast::{
    block_has_return, what_do_i_dereference, BinOpKind, Block, Expr, ExprKind, Param, Stmt,
    StmtKind, UnOpKind,
};
use crate::builtins::builtin_signature;
use crate::error::CodeGenError;
use crate::instruction::{Instruction, Opcode, OprCode};
use crate::symtab::{SymbolTable, ACTIVATION_RECORD_SIZE};
use crate::types::{Type, TypeKind};

struct LoopCtx {
    break_jumps: Vec<usize>,
    continue_jumps: Vec<usize>,
}

#[derive(Clone, Copy)]
struct FuncCtx {
    return_size: u32,
    total_param_slots: u32,
}

pub struct CodeGen {
    symtab: SymbolTable,
    instructions: Vec<Instruction>,
    label_addresses: HashMap<String, usize>,
    pending_gotos: Vec<(String, usize)>,
    pending_forward_calls: HashMap<String, Vec<usize>>,
    loop_stack: Vec<LoopCtx>,
    func_stack: Vec<FuncCtx>,
}

/// Generate a complete instruction stream for `program`. `referenced_builtins`
/// is the (already dependency-closed) list of built-ins the analyzer observed
/// being called, in emission order.
pub fn generate(
    program: &Block,
    referenced_builtins: &[String],
) -> Result<Vec<Instruction>, CodeGenError> {
    let mut cg = CodeGen {
        symtab: SymbolTable::new(),
        instructions: Vec::new(),
        label_addresses: HashMap::new(),
        pending_gotos: Vec::new(),
        pending_forward_calls: HashMap::new(),
        loop_stack: Vec::new(),
        func_stack: Vec::new(),
    };

    if !referenced_builtins.is_empty() {
        let skip = cg.emit(Opcode::Jmp, 0, 0);
        cg.emit_builtins(referenced_builtins)?;
        let after = cg.here();
        cg.patch(skip, after as i64);
    }

    cg.gen_top_level(&program.statements)?;

    cg.emit(Opcode::Int, 0, 1);
    let main_addr = cg
        .symtab
        .lookup("main")
        .map(|(r, _)| r.address)
        .ok_or_else(|| CodeGenError::Logic("\"main\" is not declared".to_string()))?;
    cg.emit(Opcode::Cal, 0, main_addr);
    cg.emit(Opcode::Ret, 0, 0);

    for (label, jmp_idx) in cg.pending_gotos.clone() {
        let addr = cg
            .label_addresses
            .get(&label)
            .copied()
            .ok_or_else(|| CodeGenError::Logic(format!("undefined label `{label}`")))?;
        cg.instructions[jmp_idx].parameter = addr as i64;
    }

    Ok(cg.instructions)
}

impl CodeGen {
    fn emit(&mut self, opcode: Opcode, level: i64, parameter: i64) -> usize {
        self.instructions.push(Instruction::new(opcode, level, parameter));
        self.instructions.len() - 1
    }

    fn here(&self) -> usize {
        self.instructions.len()
    }

    fn patch(&mut self, idx: usize, parameter: i64) {
        self.instructions[idx].parameter = parameter;
    }

    /// Reserve one scratch slot of `ty` in the current scope and emit the
    /// `INT` that actually bumps the VM's stack top to cover it, so the slot
    /// isn't silently clobbered by the next value pushed.
    fn alloc_temp(&mut self, ty: Type) -> i64 {
        let (_, addr) = self.symtab.allocate_temp(ty);
        self.emit(Opcode::Int, 0, ty.slot_size() as i64);
        addr
    }

    /// Reserve `count` contiguous scratch slots of `elem_ty` and emit the
    /// matching `INT` reservation. See `alloc_temp`.
    fn alloc_temp_block(&mut self, elem_ty: Type, count: u32) -> i64 {
        let addr = self.symtab.allocate_temp_block(elem_ty, count);
        self.emit(Opcode::Int, 0, (elem_ty.slot_size() * count) as i64);
        addr
    }

    // ---- top level -----------------------------------------------------

    fn gen_top_level(&mut self, stmts: &[Stmt]) -> Result<(), CodeGenError> {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::DeclVar { ty, name, init, .. } => {
                    self.gen_global_decl_var(*ty, name, init.as_ref())?;
                }
                StmtKind::DeclFunc {
                    return_type,
                    name,
                    params,
                    body,
                } => {
                    self.gen_decl_func(*return_type, name, params, body.as_ref())?;
                }
                _ => return Err(CodeGenError::Logic("non-declaration at top level".into())),
            }
        }
        Ok(())
    }

    fn gen_global_decl_var(
        &mut self,
        ty: Type,
        name: &str,
        init: Option<&Expr>,
    ) -> Result<(), CodeGenError> {
        let size = ty.slot_size();
        self.emit(Opcode::Int, 0, size as i64);
        let addr = self.symtab.insert_variable(name, ty, false);
        if let Some(init) = init {
            self.track_pointee(name, init);
            self.gen_init_assign(ty, addr, 0, init)?;
        }
        Ok(())
    }

    /// If `name` is a stack-pointer variable and `init` is a plain `&x`
    /// capture, remember `x`'s (level, address) for later dereferences.
    fn track_pointee(&mut self, name: &str, init: &Expr) {
        let ExprKind::AddrOf(target) = &init.kind else {
            return;
        };
        let Some((target_rec, target_level)) = self.symtab.lookup(target) else {
            return;
        };
        let pointee = (target_level, target_rec.address);
        if let Some(rec) = self.symtab.lookup_mut(name) {
            if rec.ty.points_to_stack {
                rec.pointee = Some(pointee);
            }
        }
    }

    fn gen_decl_func(
        &mut self,
        return_type: Type,
        name: &str,
        params: &[Param],
        body: Option<&Block>,
    ) -> Result<(), CodeGenError> {
        let Some(body) = body else {
            // Forward declaration only: register the signature with a
            // not-yet-resolved address so call sites can record themselves
            // for later patching.
            if self.symtab.lookup(name).is_none() {
                self.symtab.insert_function(
                    name,
                    return_type,
                    params.iter().map(|p| p.ty).collect(),
                    -1,
                );
            }
            return Ok(());
        };

        let param_pairs: Vec<(String, Type)> =
            params.iter().map(|p| (p.name.clone(), p.ty)).collect();
        self.emit_function_shell(name, return_type, &param_pairs, |cg| {
            cg.gen_stmts(&body.statements)
        })?;
        if !block_has_return(body) {
            self.emit(Opcode::Ret, 0, 0);
        }
        Ok(())
    }

    /// Shared shell for user functions and built-ins: leading skip-`JMP`,
    /// `INT` prologue, parameter copy-down, caller-supplied body, scope
    /// teardown, and skip-`JMP` backpatch. Does *not* append a trailing
    /// `RET`; callers decide whether the body already ends in one.
    fn emit_function_shell(
        &mut self,
        name: &str,
        return_type: Type,
        params: &[(String, Type)],
        emit_body: impl FnOnce(&mut CodeGen) -> Result<(), CodeGenError>,
    ) -> Result<(), CodeGenError> {
        let skip = self.emit(Opcode::Jmp, 0, 0);
        let entry = self.here();

        if let Some(rec) = self.symtab.lookup_mut(name) {
            rec.address = entry as i64;
        } else {
            self.symtab.insert_function(
                name,
                return_type,
                params.iter().map(|(_, t)| *t).collect(),
                entry as i64,
            );
        }
        if let Some(pending) = self.pending_forward_calls.remove(name) {
            for idx in pending {
                self.instructions[idx].parameter = entry as i64;
            }
        }

        let total_param_slots: u32 = params.iter().map(|(_, t)| t.slot_size()).sum();
        self.func_stack.push(FuncCtx {
            return_size: return_type.slot_size(),
            total_param_slots,
        });
        self.symtab.push_scope(true);
        self.emit(
            Opcode::Int,
            0,
            (ACTIVATION_RECORD_SIZE + total_param_slots) as i64,
        );

        let mut prefix = 0u32;
        for (pname, pty) in params {
            let neg_offset = -(total_param_slots as i64 - prefix as i64);
            let local_addr = self.symtab.insert_variable(pname, *pty, false);
            for s in 0..pty.slot_size() as i64 {
                self.emit(Opcode::Lod, 0, neg_offset + s);
                self.emit(Opcode::Sto, 0, local_addr + s);
            }
            prefix += pty.slot_size();
        }

        emit_body(self)?;

        self.symtab.pop_scope();
        self.func_stack.pop();
        let after = self.here();
        self.patch(skip, after as i64);
        Ok(())
    }

    // ---- statements ------------------------------------------------------

    fn gen_stmts(&mut self, stmts: &[Stmt]) -> Result<(), CodeGenError> {
        for s in stmts {
            self.gen_stmt(s)?;
        }
        Ok(())
    }

    fn gen_stmt(&mut self, stmt: &Stmt) -> Result<(), CodeGenError> {
        if let Some(label) = &stmt.label {
            self.label_addresses.insert(label.clone(), self.here());
        }
        match &stmt.kind {
            StmtKind::Block(b) => {
                let bytes = crate::ast::declared_var_slots(b);
                self.emit(Opcode::Int, 0, bytes as i64);
                self.symtab.push_scope(false);
                self.gen_stmts(&b.statements)?;
                self.symtab.pop_scope();
                self.emit(Opcode::Int, 0, -(bytes as i64));
            }
            StmtKind::DeclVar { ty, name, init, .. } => {
                let size = ty.slot_size();
                self.emit(Opcode::Int, 0, size as i64);
                let addr = self.symtab.insert_variable(name, *ty, false);
                if let Some(init) = init {
                    self.track_pointee(name, init);
                    self.gen_init_assign(*ty, addr, 0, init)?;
                }
            }
            StmtKind::DeclFunc { .. } => {
                return Err(CodeGenError::Logic("nested function declaration".into()))
            }
            StmtKind::If { cond, then, els } => self.gen_if(cond, then, els.as_deref())?,
            StmtKind::While {
                cond,
                body,
                is_do_while,
                is_repeat_until,
            } => self.gen_while(cond, body, *is_do_while, *is_repeat_until)?,
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => self.gen_for(init.as_deref(), cond.as_ref(), step.as_ref(), body)?,
            StmtKind::BreakContinue(kind) => {
                let idx = self.emit(Opcode::Jmp, 0, 0);
                let ctx = self
                    .loop_stack
                    .last_mut()
                    .ok_or_else(|| CodeGenError::Logic("break/continue outside loop".into()))?;
                match kind {
                    crate::ast::BreakContinueKind::Break => ctx.break_jumps.push(idx),
                    crate::ast::BreakContinueKind::Continue => ctx.continue_jumps.push(idx),
                }
            }
            StmtKind::Return(expr) => self.gen_return(expr.as_ref())?,
            StmtKind::Goto(label) => {
                let idx = self.emit(Opcode::Jmp, 0, 0);
                self.pending_gotos.push((label.clone(), idx));
            }
            StmtKind::ExprStmt(e) => {
                self.gen_expr(e)?;
            }
        }
        Ok(())
    }

    /// Store the freshly-pushed value of `init` (evaluated here) into the
    /// `size`-slot local at `addr, level`.
    fn gen_init_assign(
        &mut self,
        ty: Type,
        addr: i64,
        level: i64,
        init: &Expr,
    ) -> Result<(), CodeGenError> {
        self.gen_expr(init)?;
        let size = ty.slot_size();
        for i in (0..size as i64).rev() {
            self.emit(Opcode::Sto, level, addr + i);
        }
        Ok(())
    }

    fn gen_if(&mut self, cond: &Expr, then: &Stmt, els: Option<&Stmt>) -> Result<(), CodeGenError> {
        self.gen_expr(cond)?;
        let jmc = self.emit(Opcode::Jmc, 0, 0);
        self.gen_stmt(then)?;
        if let Some(els) = els {
            let jmp_end = self.emit(Opcode::Jmp, 0, 0);
            let else_addr = self.here();
            self.patch(jmc, else_addr as i64);
            self.gen_stmt(els)?;
            let end = self.here();
            self.patch(jmp_end, end as i64);
        } else {
            let end = self.here();
            self.patch(jmc, end as i64);
        }
        Ok(())
    }

    fn gen_while(
        &mut self,
        cond: &Expr,
        body: &Stmt,
        is_do_while: bool,
        is_repeat_until: bool,
    ) -> Result<(), CodeGenError> {
        let loop_start = self.here();
        self.loop_stack.push(LoopCtx {
            break_jumps: Vec::new(),
            continue_jumps: Vec::new(),
        });

        if is_do_while || is_repeat_until {
            self.gen_stmt(body)?;
            let cond_check = self.here();
            self.gen_expr(cond)?;
            let exit = if is_repeat_until {
                // Loops while the condition is false.
                self.emit(Opcode::Jmc, 0, loop_start as i64);
                self.here()
            } else {
                // do-while: loops while the condition is true.
                let jmc_false = self.emit(Opcode::Jmc, 0, 0);
                self.emit(Opcode::Jmp, 0, loop_start as i64);
                let exit = self.here();
                self.patch(jmc_false, exit as i64);
                exit
            };
            let ctx = self.loop_stack.pop().unwrap();
            for idx in ctx.continue_jumps {
                self.patch(idx, cond_check as i64);
            }
            for idx in ctx.break_jumps {
                self.patch(idx, exit as i64);
            }
        } else {
            self.gen_expr(cond)?;
            let jmc_exit = self.emit(Opcode::Jmc, 0, 0);
            self.gen_stmt(body)?;
            self.emit(Opcode::Jmp, 0, loop_start as i64);
            let exit = self.here();
            self.patch(jmc_exit, exit as i64);
            let ctx = self.loop_stack.pop().unwrap();
            for idx in ctx.continue_jumps {
                self.patch(idx, loop_start as i64);
            }
            for idx in ctx.break_jumps {
                self.patch(idx, exit as i64);
            }
        }
        Ok(())
    }

    fn gen_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        step: Option<&Expr>,
        body: &Stmt,
    ) -> Result<(), CodeGenError> {
        if let Some(init) = init {
            self.gen_stmt(init)?;
        }
        let loop_start = self.here();
        let jmc_exit = if let Some(cond) = cond {
            self.gen_expr(cond)?;
            Some(self.emit(Opcode::Jmc, 0, 0))
        } else {
            None
        };

        self.loop_stack.push(LoopCtx {
            break_jumps: Vec::new(),
            continue_jumps: Vec::new(),
        });
        self.gen_stmt(body)?;
        let ctx = self.loop_stack.pop().unwrap();

        let step_addr = self.here();
        if let Some(step) = step {
            self.gen_expr(step)?;
        }
        self.emit(Opcode::Jmp, 0, loop_start as i64);
        let exit = self.here();
        if let Some(jmc_exit) = jmc_exit {
            self.patch(jmc_exit, exit as i64);
        }

        for idx in ctx.continue_jumps {
            self.patch(idx, step_addr as i64);
        }
        for idx in ctx.break_jumps {
            self.patch(idx, exit as i64);
        }
        Ok(())
    }

    fn gen_return(&mut self, expr: Option<&Expr>) -> Result<(), CodeGenError> {
        let ctx = *self
            .func_stack
            .last()
            .ok_or_else(|| CodeGenError::Logic("return outside function".into()))?;
        if let Some(expr) = expr {
            self.gen_expr(expr)?;
            let size = expr.ty_unwrap().slot_size();
            let base = -(ctx.return_size as i64 + ctx.total_param_slots as i64);
            for i in (0..size as i64).rev() {
                self.emit(Opcode::Sto, 0, base + i);
            }
        }
        self.emit(Opcode::Ret, 0, 0);
        Ok(())
    }

    // ---- expressions -------------------------------------------------

    fn gen_expr(&mut self, expr: &Expr) -> Result<(), CodeGenError> {
        match &expr.kind {
            ExprKind::IntLit(n) => {
                self.emit(Opcode::Lit, 0, *n);
            }
            ExprKind::BoolLit(b) => {
                self.emit(Opcode::Lit, 0, *b as i64);
            }
            ExprKind::FloatLit { whole, frac } => {
                self.emit(Opcode::Lit, 0, *whole);
                self.emit(Opcode::Lit, 0, *frac);
            }
            ExprKind::StringLit(s) => self.gen_string_literal(s)?,
            ExprKind::Identifier(name) => self.gen_identifier_load(name)?,
            ExprKind::Assign { name, lvalue, rhs } => self.gen_assign(name, lvalue.as_deref(), rhs)?,
            ExprKind::Ternary { cond, then, els } => self.gen_ternary(cond, then, els)?,
            ExprKind::BinOp { op, left, right } => self.gen_binop(*op, left, right)?,
            ExprKind::UnOp { op, operand } => self.gen_unop(*op, operand)?,
            ExprKind::Cast { target, expr: inner } => self.gen_cast(*target, inner)?,
            ExprKind::Call { name, args } => {
                self.gen_call(name, args)?;
            }
            ExprKind::New { ty, count } => {
                self.gen_new(*ty, count.as_deref())?;
            }
            ExprKind::Delete(inner) => {
                self.gen_expr(inner)?;
                self.emit(Opcode::Del, 0, 0);
            }
            ExprKind::Deref(inner) => self.gen_deref_rvalue(inner)?,
            ExprKind::AddrOf(name) => {
                let (rec, _level) = self
                    .symtab
                    .lookup(name)
                    .ok_or_else(|| CodeGenError::Logic(format!("undeclared `{name}`")))?;
                self.emit(Opcode::Lit, 0, rec.address);
            }
            ExprKind::SizeOf(ty) => {
                self.emit(Opcode::Lit, 0, ty.kind.slot_size() as i64);
            }
        }
        Ok(())
    }

    fn gen_identifier_load(&mut self, name: &str) -> Result<(), CodeGenError> {
        let (rec, level) = self
            .symtab
            .lookup(name)
            .ok_or_else(|| CodeGenError::Logic(format!("undeclared `{name}`")))?;
        let addr = rec.address;
        let size = rec.ty.slot_size();
        for i in 0..size as i64 {
            self.emit(Opcode::Lod, level as i64, addr + i);
        }
        Ok(())
    }

    fn gen_assign(
        &mut self,
        name: &str,
        lvalue: Option<&Expr>,
        rhs: &Expr,
    ) -> Result<(), CodeGenError> {
        if lvalue.is_some() {
            let rec = self
                .symtab
                .lookup(name)
                .ok_or_else(|| CodeGenError::Logic(format!("undeclared `{name}`")))?
                .0
                .clone();
            if rec.ty.points_to_stack {
                let (level, addr) = rec.pointee.ok_or_else(|| {
                    CodeGenError::Logic(format!("`{name}` has no tracked pointee"))
                })?;
                self.gen_expr(rhs)?;
                self.emit(Opcode::Lit, 0, level as i64);
                self.emit(Opcode::Lit, 0, addr);
                self.emit(Opcode::Pst, 0, 0);
            } else {
                self.gen_identifier_load(name)?;
                self.gen_expr(rhs)?;
                self.emit(Opcode::Sta, 0, 0);
            }
            return Ok(());
        }

        // Plain named assignment. If the rhs is a stack-pointer-producing
        // `AddrOf`, remember the pointee statically so a later `*name = ..`
        // or `*name` can resolve it without a runtime indirection.
        self.track_pointee(name, rhs);

        self.gen_expr(rhs)?;
        let (rec, level) = self
            .symtab
            .lookup(name)
            .ok_or_else(|| CodeGenError::Logic(format!("undeclared `{name}`")))?;
        let addr = rec.address;
        let size = rec.ty.slot_size();
        for i in (0..size as i64).rev() {
            self.emit(Opcode::Sto, level as i64, addr + i);
        }
        Ok(())
    }

    fn gen_ternary(&mut self, cond: &Expr, then: &Expr, els: &Expr) -> Result<(), CodeGenError> {
        self.gen_expr(cond)?;
        let jmc = self.emit(Opcode::Jmc, 0, 0);
        self.gen_expr(then)?;
        let jmp_end = self.emit(Opcode::Jmp, 0, 0);
        let else_addr = self.here();
        self.patch(jmc, else_addr as i64);
        self.gen_expr(els)?;
        let end = self.here();
        self.patch(jmp_end, end as i64);
        Ok(())
    }

    fn gen_binop(&mut self, op: BinOpKind, left: &Expr, right: &Expr) -> Result<(), CodeGenError> {
        if matches!(op, BinOpKind::And | BinOpKind::Or) {
            return self.gen_logical(op, left, right);
        }

        let lty = left.ty_unwrap();
        let rty = right.ty_unwrap();

        if lty.is_pointer() && !rty.is_pointer() {
            self.gen_expr(left)?;
            self.gen_expr(right)?;
            let elem_size = lty.dereferenced().slot_size().max(1) as i64;
            self.emit(Opcode::Lit, 0, elem_size);
            self.emit(Opcode::Opr, 0, OprCode::Mul as i64);
            self.emit_opr(op, false);
            return Ok(());
        }

        self.gen_expr(left)?;
        if !lty.is_float() && rty.is_float() {
            self.emit(Opcode::Itr, 0, 0);
        }
        self.gen_expr(right)?;
        if !rty.is_float() && lty.is_float() {
            self.emit(Opcode::Itr, 0, 0);
        }
        let use_float = lty.is_float() || rty.is_float();
        self.emit_opr(op, use_float);
        Ok(())
    }

    fn emit_opr(&mut self, op: BinOpKind, as_float: bool) {
        let code = match op {
            BinOpKind::Add => OprCode::Add,
            BinOpKind::Sub => OprCode::Sub,
            BinOpKind::Mul => OprCode::Mul,
            BinOpKind::Div => OprCode::Div,
            BinOpKind::Mod => OprCode::Mod,
            BinOpKind::Eq => OprCode::Eq,
            BinOpKind::Neq => OprCode::Neq,
            BinOpKind::Lt => OprCode::Lt,
            BinOpKind::Leq => OprCode::Leq,
            BinOpKind::Gt => OprCode::Gt,
            BinOpKind::Geq => OprCode::Geq,
            BinOpKind::And | BinOpKind::Or => unreachable!("handled by gen_logical"),
        };
        let opcode = if as_float { Opcode::Opf } else { Opcode::Opr };
        self.emit(opcode, 0, code as i64);
    }

    /// `&&`/`||` are not short-circuiting: both operands are always
    /// evaluated (so e.g. `f() && g()` always calls `g`), combined with
    /// `MUL`/`ADD`, and folded back to a 0/1 boolean with `LIT 0; NEQ`.
    fn gen_logical(&mut self, op: BinOpKind, left: &Expr, right: &Expr) -> Result<(), CodeGenError> {
        self.gen_expr(left)?;
        self.gen_expr(right)?;
        let combine = match op {
            BinOpKind::And => OprCode::Mul,
            BinOpKind::Or => OprCode::Add,
            _ => unreachable!(),
        };
        self.emit(Opcode::Opr, 0, combine as i64);
        self.emit(Opcode::Lit, 0, 0);
        self.emit(Opcode::Opr, 0, OprCode::Neq as i64);
        Ok(())
    }

    fn gen_unop(&mut self, op: UnOpKind, operand: &Expr) -> Result<(), CodeGenError> {
        match op {
            UnOpKind::Neg => {
                self.gen_expr(operand)?;
                let as_float = operand.ty_unwrap().is_float();
                let opcode = if as_float { Opcode::Opf } else { Opcode::Opr };
                self.emit(opcode, 0, OprCode::Neg as i64);
            }
            UnOpKind::Not => {
                // No dedicated boolean-not opcode; `!x` lowers to `x == 0`.
                self.gen_expr(operand)?;
                self.emit(Opcode::Lit, 0, 0);
                self.emit(Opcode::Opr, 0, OprCode::Eq as i64);
            }
        }
        Ok(())
    }

    fn gen_cast(&mut self, target: Type, inner: &Expr) -> Result<(), CodeGenError> {
        let from = inner.ty_unwrap();
        self.gen_expr(inner)?;
        if target.is_float() && !from.is_float() {
            self.emit(Opcode::Itr, 0, 0);
        } else if !target.is_float() && from.is_float() {
            self.emit(Opcode::Rti, 0, 0);
        }
        Ok(())
    }

    fn gen_call(&mut self, name: &str, args: &[Expr]) -> Result<(), CodeGenError> {
        let (rec, level) = self
            .symtab
            .lookup(name)
            .ok_or_else(|| CodeGenError::Logic(format!("undeclared function `{name}`")))?;
        let return_size = rec.ty.slot_size();
        let param_slots: u32 = rec.params.iter().map(|p| p.slot_size()).sum();
        let address = rec.address;

        self.emit(Opcode::Int, 0, return_size as i64);
        for a in args {
            self.gen_expr(a)?;
        }
        let cal_idx = self.emit(Opcode::Cal, level as i64, address);
        if address < 0 {
            self.pending_forward_calls
                .entry(name.to_string())
                .or_default()
                .push(cal_idx);
        }
        if param_slots > 0 {
            self.emit(Opcode::Int, 0, -(param_slots as i64));
        }
        Ok(())
    }

    fn gen_deref_rvalue(&mut self, inner: &Expr) -> Result<(), CodeGenError> {
        let name = what_do_i_dereference(inner)
            .ok_or_else(|| CodeGenError::Logic("dereference of non-lvalue".into()))?
            .to_string();
        let rec = self
            .symtab
            .lookup(&name)
            .ok_or_else(|| CodeGenError::Logic(format!("undeclared `{name}`")))?
            .0
            .clone();
        if rec.ty.points_to_stack {
            let (level, addr) = rec
                .pointee
                .ok_or_else(|| CodeGenError::Logic(format!("`{name}` has no tracked pointee")))?;
            self.emit(Opcode::Lit, 0, level as i64);
            self.emit(Opcode::Lit, 0, addr);
            self.emit(Opcode::Pld, 0, 0);
        } else {
            self.gen_expr(inner)?;
            self.emit(Opcode::Lda, 0, 0);
        }
        Ok(())
    }

    fn gen_new(&mut self, ty: Type, count: Option<&Expr>) -> Result<(), CodeGenError> {
        let elem_size = ty.kind.slot_size().max(1) as i64;
        match count {
            Some(c) => self.gen_expr(c)?,
            None => {
                self.emit(Opcode::Lit, 0, 1);
            }
        }
        self.emit(Opcode::Lit, 0, elem_size);
        self.emit(Opcode::Opr, 0, OprCode::Mul as i64);

        let total_addr = self.alloc_temp(Type::new(TypeKind::Int));
        self.emit(Opcode::Sto, 0, total_addr);
        self.emit(Opcode::Lod, 0, total_addr);
        self.emit(Opcode::New, 0, 0);

        let addr_addr = self.alloc_temp(Type::new(TypeKind::Int));
        self.emit(Opcode::Sto, 0, addr_addr);
        self.emit(Opcode::Lod, 0, addr_addr);
        self.emit(Opcode::Lit, 0, 1);
        self.emit(Opcode::Opr, 0, OprCode::Sub as i64);
        self.emit(Opcode::Lod, 0, total_addr);
        self.emit(Opcode::Sta, 0, 0);
        self.emit(Opcode::Lod, 0, addr_addr);
        Ok(())
    }

    /// A string is a heap block whose slot `-1` holds its byte count, with
    /// bytes in slots `0..count-1` — no terminator of any kind.
    fn gen_string_literal(&mut self, s: &str) -> Result<(), CodeGenError> {
        let len = s.len() as i64;
        self.emit(Opcode::Lit, 0, len.max(1));
        self.emit(Opcode::New, 0, 0);

        let addr_addr = self.alloc_temp(Type::new(TypeKind::Int));
        self.emit(Opcode::Sto, 0, addr_addr);
        self.emit(Opcode::Lod, 0, addr_addr);
        self.emit(Opcode::Lit, 0, 1);
        self.emit(Opcode::Opr, 0, OprCode::Sub as i64);
        self.emit(Opcode::Lit, 0, len);
        self.emit(Opcode::Sta, 0, 0);

        for (i, ch) in s.chars().enumerate() {
            self.emit(Opcode::Lod, 0, addr_addr);
            self.emit(Opcode::Lit, 0, i as i64);
            self.emit(Opcode::Opr, 0, OprCode::Add as i64);
            self.emit(Opcode::Lit, 0, ch as i64);
            self.emit(Opcode::Sta, 0, 0);
        }

        self.emit(Opcode::Lod, 0, addr_addr);
        Ok(())
    }

    // ---- built-ins -----------------------------------------------------

    fn emit_builtins(&mut self, names: &[String]) -> Result<(), CodeGenError> {
        for name in names {
            self.emit_one_builtin(name)?;
        }
        Ok(())
    }

    fn emit_one_builtin(&mut self, name: &str) -> Result<(), CodeGenError> {
        let sig = builtin_signature(name)
            .ok_or_else(|| CodeGenError::Logic(format!("unknown built-in `{name}`")))?;
        let params: Vec<(String, Type)> = sig
            .params
            .iter()
            .enumerate()
            .map(|(i, t)| (format!("_p{i}"), *t))
            .collect();
        let return_type = sig.return_type;
        let total_param_slots: u32 = sig.params.iter().map(|p| p.slot_size()).sum();
        let return_base = -(return_type.slot_size() as i64 + total_param_slots as i64);

        match name {
            // Digit-extraction loop: peel `n % 10` into a small on-stack
            // buffer (addressed dynamically via `PST`/`PLD`, since there is
            // no `DUP`), then walk the buffer backwards to print
            // most-significant digit first.
            "print_int" => self.emit_function_shell(name, return_type, &params, |cg| {
                const MAX_DIGITS: u32 = 20;
                let buf_base = cg.alloc_temp_block(Type::new(TypeKind::Int), MAX_DIGITS);
                let count = cg.alloc_temp(Type::new(TypeKind::Int));
                let (p0_rec, p0_level) = cg
                    .symtab
                    .lookup("_p0")
                    .ok_or_else(|| CodeGenError::Logic("undeclared `_p0`".into()))?;
                let p0_addr = p0_rec.address;
                let p0_level = p0_level as i64;

                cg.emit(Opcode::Lit, 0, 0);
                cg.emit(Opcode::Sto, 0, count);

                let loop_start = cg.here();
                cg.emit(Opcode::Lit, 0, '0' as i64);
                cg.emit(Opcode::Lod, p0_level, p0_addr);
                cg.emit(Opcode::Lit, 0, 10);
                cg.emit(Opcode::Opr, 0, OprCode::Mod as i64);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Lit, 0, 0);
                cg.emit(Opcode::Lod, 0, count);
                cg.emit(Opcode::Lit, 0, buf_base);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Pst, 0, 0);

                cg.emit(Opcode::Lod, p0_level, p0_addr);
                cg.emit(Opcode::Lit, 0, 10);
                cg.emit(Opcode::Opr, 0, OprCode::Div as i64);
                cg.emit(Opcode::Sto, p0_level, p0_addr);

                cg.emit(Opcode::Lod, 0, count);
                cg.emit(Opcode::Lit, 0, 1);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Sto, 0, count);

                cg.emit(Opcode::Lod, p0_level, p0_addr);
                cg.emit(Opcode::Lit, 0, 0);
                cg.emit(Opcode::Opr, 0, OprCode::Neq as i64);
                let jmc_done = cg.emit(Opcode::Jmc, 0, 0);
                cg.emit(Opcode::Jmp, 0, loop_start as i64);
                let done = cg.here();
                cg.patch(jmc_done, done as i64);

                let i_var = cg.alloc_temp(Type::new(TypeKind::Int));
                cg.emit(Opcode::Lod, 0, count);
                cg.emit(Opcode::Lit, 0, 1);
                cg.emit(Opcode::Opr, 0, OprCode::Sub as i64);
                cg.emit(Opcode::Sto, 0, i_var);

                let wloop_start = cg.here();
                cg.emit(Opcode::Lod, 0, i_var);
                cg.emit(Opcode::Lit, 0, 0);
                cg.emit(Opcode::Opr, 0, OprCode::Geq as i64);
                let jmc_wdone = cg.emit(Opcode::Jmc, 0, 0);

                cg.emit(Opcode::Lit, 0, 0);
                cg.emit(Opcode::Lod, 0, i_var);
                cg.emit(Opcode::Lit, 0, buf_base);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Pld, 0, 0);
                cg.emit(Opcode::Wri, 0, 0);

                cg.emit(Opcode::Lod, 0, i_var);
                cg.emit(Opcode::Lit, 0, 1);
                cg.emit(Opcode::Opr, 0, OprCode::Sub as i64);
                cg.emit(Opcode::Sto, 0, i_var);
                cg.emit(Opcode::Jmp, 0, wloop_start as i64);
                let wdone = cg.here();
                cg.patch(jmc_wdone, wdone as i64);
                Ok(())
            })?,
            // Accumulate `total = total * 10 + (byte - '0')` over consecutive
            // ASCII digit bytes; the first non-digit byte (newline, '.', or
            // anything else) ends the number and is consumed but discarded.
            "read_int" => self.emit_function_shell(name, return_type, &params, |cg| {
                let total = cg.alloc_temp(Type::new(TypeKind::Int));
                let ch = cg.alloc_temp(Type::new(TypeKind::Int));
                cg.emit(Opcode::Lit, 0, 0);
                cg.emit(Opcode::Sto, 0, total);

                let loop_start = cg.here();
                cg.emit(Opcode::Rea, 0, 0);
                cg.emit(Opcode::Sto, 0, ch);

                cg.emit(Opcode::Lod, 0, ch);
                cg.emit(Opcode::Lit, 0, '0' as i64);
                cg.emit(Opcode::Opr, 0, OprCode::Geq as i64);
                let jmc_not_digit_lo = cg.emit(Opcode::Jmc, 0, 0);
                cg.emit(Opcode::Lod, 0, ch);
                cg.emit(Opcode::Lit, 0, '9' as i64);
                cg.emit(Opcode::Opr, 0, OprCode::Leq as i64);
                let jmc_not_digit_hi = cg.emit(Opcode::Jmc, 0, 0);

                cg.emit(Opcode::Lod, 0, total);
                cg.emit(Opcode::Lit, 0, 10);
                cg.emit(Opcode::Opr, 0, OprCode::Mul as i64);
                cg.emit(Opcode::Lod, 0, ch);
                cg.emit(Opcode::Lit, 0, '0' as i64);
                cg.emit(Opcode::Opr, 0, OprCode::Sub as i64);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Sto, 0, total);
                cg.emit(Opcode::Jmp, 0, loop_start as i64);

                let done = cg.here();
                cg.patch(jmc_not_digit_lo, done as i64);
                cg.patch(jmc_not_digit_hi, done as i64);
                cg.emit(Opcode::Lod, 0, total);
                cg.emit(Opcode::Sto, 0, return_base);
                Ok(())
            })?,
            // Strings are length-prefixed (slot -1 = byte count), not
            // NUL-terminated, so every string built-in reads that slot
            // instead of scanning for a sentinel byte.
            "print_str" => self.emit_function_shell(name, return_type, &params, |cg| {
                let len = cg.alloc_temp(Type::new(TypeKind::Int));
                cg.gen_identifier_load("_p0")?;
                cg.emit(Opcode::Lit, 0, -1);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Lda, 0, 0);
                cg.emit(Opcode::Sto, 0, len);

                let idx = cg.alloc_temp(Type::new(TypeKind::Int));
                cg.emit(Opcode::Lit, 0, 0);
                cg.emit(Opcode::Sto, 0, idx);
                let loop_start = cg.here();
                cg.emit(Opcode::Lod, 0, idx);
                cg.emit(Opcode::Lod, 0, len);
                cg.emit(Opcode::Opr, 0, OprCode::Lt as i64);
                let jmc_done = cg.emit(Opcode::Jmc, 0, 0);
                cg.gen_identifier_load("_p0")?;
                cg.emit(Opcode::Lod, 0, idx);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Lda, 0, 0);
                cg.emit(Opcode::Wri, 0, 0);
                cg.emit(Opcode::Lod, 0, idx);
                cg.emit(Opcode::Lit, 0, 1);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Sto, 0, idx);
                cg.emit(Opcode::Jmp, 0, loop_start as i64);
                let done = cg.here();
                cg.patch(jmc_done, done as i64);
                Ok(())
            })?,
            "strlen" => self.emit_function_shell(name, return_type, &params, |cg| {
                cg.gen_identifier_load("_p0")?;
                cg.emit(Opcode::Lit, 0, -1);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Lda, 0, 0);
                cg.emit(Opcode::Sto, 0, return_base);
                Ok(())
            })?,
            // Short-circuits to 0 on a length mismatch or the first differing
            // byte; only a full walk of equal-length, all-equal bytes
            // reaches the `matched` branch and returns 1.
            "strcmp" => self.emit_function_shell(name, return_type, &params, |cg| {
                let len_a = cg.alloc_temp(Type::new(TypeKind::Int));
                let len_b = cg.alloc_temp(Type::new(TypeKind::Int));
                let idx = cg.alloc_temp(Type::new(TypeKind::Int));
                cg.gen_call_builtin_by_addr("strlen", &["_p0"], len_a)?;
                cg.gen_call_builtin_by_addr("strlen", &["_p1"], len_b)?;

                cg.emit(Opcode::Lod, 0, len_a);
                cg.emit(Opcode::Lod, 0, len_b);
                cg.emit(Opcode::Opr, 0, OprCode::Eq as i64);
                let jmc_len_mismatch = cg.emit(Opcode::Jmc, 0, 0);

                cg.emit(Opcode::Lit, 0, 0);
                cg.emit(Opcode::Sto, 0, idx);
                let loop_start = cg.here();
                cg.emit(Opcode::Lod, 0, idx);
                cg.emit(Opcode::Lod, 0, len_a);
                cg.emit(Opcode::Opr, 0, OprCode::Lt as i64);
                let jmc_matched = cg.emit(Opcode::Jmc, 0, 0);
                for p in ["_p0", "_p1"] {
                    cg.gen_identifier_load(p)?;
                    cg.emit(Opcode::Lod, 0, idx);
                    cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                    cg.emit(Opcode::Lda, 0, 0);
                }
                cg.emit(Opcode::Opr, 0, OprCode::Eq as i64);
                let jmc_byte_mismatch = cg.emit(Opcode::Jmc, 0, 0);
                cg.emit(Opcode::Lod, 0, idx);
                cg.emit(Opcode::Lit, 0, 1);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Sto, 0, idx);
                cg.emit(Opcode::Jmp, 0, loop_start as i64);

                let matched = cg.here();
                cg.patch(jmc_matched, matched as i64);
                cg.emit(Opcode::Lit, 0, 1);
                cg.emit(Opcode::Sto, 0, return_base);
                let jmp_end = cg.emit(Opcode::Jmp, 0, 0);

                let mismatch = cg.here();
                cg.patch(jmc_len_mismatch, mismatch as i64);
                cg.patch(jmc_byte_mismatch, mismatch as i64);
                cg.emit(Opcode::Lit, 0, 0);
                cg.emit(Opcode::Sto, 0, return_base);

                let end = cg.here();
                cg.patch(jmp_end, end as i64);
                Ok(())
            })?,
            "strcat" => self.emit_function_shell(name, return_type, &params, |cg| {
                let len_a = cg.alloc_temp(Type::new(TypeKind::Int));
                let len_b = cg.alloc_temp(Type::new(TypeKind::Int));
                let out_addr = cg.alloc_temp(Type::new(TypeKind::Int));
                let idx = cg.alloc_temp(Type::new(TypeKind::Int));

                cg.gen_call_builtin_by_addr("strlen", &["_p0"], len_a)?;
                cg.gen_call_builtin_by_addr("strlen", &["_p1"], len_b)?;

                cg.emit(Opcode::Lod, 0, len_a);
                cg.emit(Opcode::Lod, 0, len_b);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::New, 0, 0);
                cg.emit(Opcode::Sto, 0, out_addr);

                cg.emit(Opcode::Lod, 0, out_addr);
                cg.emit(Opcode::Lit, 0, -1);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Lod, 0, len_a);
                cg.emit(Opcode::Lod, 0, len_b);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Sta, 0, 0);

                // copy _p0[0..len_a) then _p1[0..len_b) into out_addr.
                cg.emit(Opcode::Lit, 0, 0);
                cg.emit(Opcode::Sto, 0, idx);
                for (src, len_var) in [("_p0", len_a), ("_p1", len_b)] {
                    let loop_start = cg.here();
                    cg.emit(Opcode::Lod, 0, idx);
                    cg.emit(Opcode::Lod, 0, len_var);
                    cg.emit(Opcode::Opr, 0, OprCode::Lt as i64);
                    let jmc_done = cg.emit(Opcode::Jmc, 0, 0);
                    cg.emit(Opcode::Lod, 0, out_addr);
                    cg.emit(Opcode::Lod, 0, idx);
                    cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                    cg.gen_identifier_load(src)?;
                    cg.emit(Opcode::Lod, 0, idx);
                    cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                    cg.emit(Opcode::Lda, 0, 0);
                    cg.emit(Opcode::Sta, 0, 0);
                    cg.emit(Opcode::Lod, 0, idx);
                    cg.emit(Opcode::Lit, 0, 1);
                    cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                    cg.emit(Opcode::Sto, 0, idx);
                    cg.emit(Opcode::Jmp, 0, loop_start as i64);
                    let done = cg.here();
                    cg.patch(jmc_done, done as i64);
                    if src == "_p0" {
                        cg.emit(Opcode::Lit, 0, 0);
                        cg.emit(Opcode::Sto, 0, idx);
                    }
                }

                cg.emit(Opcode::Lod, 0, out_addr);
                cg.emit(Opcode::Sto, 0, return_base);
                Ok(())
            })?,
            // Stages incoming bytes in a fixed-size on-stack buffer (no
            // dynamic-growth heap primitive exists in this instruction set),
            // then allocates the exact-size heap string once the final
            // length is known.
            "read_str" => self.emit_function_shell(name, return_type, &params, |cg| {
                const STAGE_LEN: u32 = 256;
                let stage_base =
                    cg.alloc_temp_block(Type::new(TypeKind::Int), STAGE_LEN);
                let len = cg.alloc_temp(Type::new(TypeKind::Int));
                let ch = cg.alloc_temp(Type::new(TypeKind::Int));
                let out_addr = cg.alloc_temp(Type::new(TypeKind::Int));
                let idx = cg.alloc_temp(Type::new(TypeKind::Int));

                cg.emit(Opcode::Lit, 0, 0);
                cg.emit(Opcode::Sto, 0, len);
                let loop_start = cg.here();
                cg.emit(Opcode::Rea, 0, 0);
                cg.emit(Opcode::Sto, 0, ch);
                cg.emit(Opcode::Lod, 0, ch);
                cg.emit(Opcode::Lit, 0, 10);
                cg.emit(Opcode::Opr, 0, OprCode::Neq as i64);
                let jmc_newline = cg.emit(Opcode::Jmc, 0, 0);
                cg.emit(Opcode::Lod, 0, len);
                cg.emit(Opcode::Lit, 0, STAGE_LEN as i64);
                cg.emit(Opcode::Opr, 0, OprCode::Lt as i64);
                let jmc_full = cg.emit(Opcode::Jmc, 0, 0);

                cg.emit(Opcode::Lod, 0, ch);
                cg.emit(Opcode::Lit, 0, 0);
                cg.emit(Opcode::Lod, 0, len);
                cg.emit(Opcode::Lit, 0, stage_base);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Pst, 0, 0);

                cg.emit(Opcode::Lod, 0, len);
                cg.emit(Opcode::Lit, 0, 1);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Sto, 0, len);
                cg.emit(Opcode::Jmp, 0, loop_start as i64);

                let done = cg.here();
                cg.patch(jmc_newline, done as i64);
                cg.patch(jmc_full, done as i64);

                cg.emit(Opcode::Lod, 0, len);
                cg.emit(Opcode::New, 0, 0);
                cg.emit(Opcode::Sto, 0, out_addr);
                cg.emit(Opcode::Lod, 0, out_addr);
                cg.emit(Opcode::Lit, 0, -1);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Lod, 0, len);
                cg.emit(Opcode::Sta, 0, 0);

                cg.emit(Opcode::Lit, 0, 0);
                cg.emit(Opcode::Sto, 0, idx);
                let copy_start = cg.here();
                cg.emit(Opcode::Lod, 0, idx);
                cg.emit(Opcode::Lod, 0, len);
                cg.emit(Opcode::Opr, 0, OprCode::Lt as i64);
                let jmc_copy_done = cg.emit(Opcode::Jmc, 0, 0);
                cg.emit(Opcode::Lod, 0, out_addr);
                cg.emit(Opcode::Lod, 0, idx);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Lit, 0, 0);
                cg.emit(Opcode::Lod, 0, idx);
                cg.emit(Opcode::Lit, 0, stage_base);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Pld, 0, 0);
                cg.emit(Opcode::Sta, 0, 0);
                cg.emit(Opcode::Lod, 0, idx);
                cg.emit(Opcode::Lit, 0, 1);
                cg.emit(Opcode::Opr, 0, OprCode::Add as i64);
                cg.emit(Opcode::Sto, 0, idx);
                cg.emit(Opcode::Jmp, 0, copy_start as i64);
                let copy_done = cg.here();
                cg.patch(jmc_copy_done, copy_done as i64);

                cg.emit(Opcode::Lod, 0, out_addr);
                cg.emit(Opcode::Sto, 0, return_base);
                Ok(())
            })?,
            "print_float" => self.emit_function_shell(name, return_type, &params, |cg| {
                cg.gen_call_builtin_int_arg("print_int", "_p0", 0)?;
                cg.emit(Opcode::Lit, 0, '.' as i64);
                cg.emit(Opcode::Wri, 0, 0);
                cg.gen_call_builtin_int_arg("print_int", "_p0", 1)?;
                Ok(())
            })?,
            // The whole part is read by the generic digit-run reader, which
            // naturally stops at (and consumes) the non-digit '.'; the
            // fractional part is then read the same way.
            "read_float" => self.emit_function_shell(name, return_type, &params, |cg| {
                cg.gen_call_no_args_into("read_int", 0)?;
                cg.gen_call_no_args_into("read_int", 1)?;
                Ok(())
            })?,
            _ => return Err(CodeGenError::Logic(format!("unimplemented built-in `{name}`"))),
        }
        Ok(())
    }

    /// Call an already-emitted zero/one-arg builtin and store its (single
    /// slot) result into `dest_addr` in the current frame. Used by builtins
    /// that compose other builtins (e.g. `strcat` over `strlen`).
    fn gen_call_builtin_by_addr(
        &mut self,
        name: &str,
        arg_locals: &[&str],
        dest_addr: i64,
    ) -> Result<(), CodeGenError> {
        let (rec, level) = self
            .symtab
            .lookup(name)
            .ok_or_else(|| CodeGenError::Logic(format!("built-in `{name}` not yet emitted")))?;
        let address = rec.address;
        let return_size = rec.ty.slot_size();
        let param_slots: u32 = rec.params.iter().map(|p| p.slot_size()).sum();
        self.emit(Opcode::Int, 0, return_size as i64);
        for local in arg_locals {
            self.gen_identifier_load(local)?;
        }
        self.emit(Opcode::Cal, level as i64, address);
        if param_slots > 0 {
            self.emit(Opcode::Int, 0, -(param_slots as i64));
        }
        self.emit(Opcode::Sto, 0, dest_addr);
        Ok(())
    }

    /// Call `print_int` on the `slot`-th VM slot of a float-typed local
    /// (0 = whole part, 1 = fractional part), discarding its (void) result.
    fn gen_call_builtin_int_arg(
        &mut self,
        name: &str,
        local: &str,
        slot: i64,
    ) -> Result<(), CodeGenError> {
        let (rec, local_level) = self
            .symtab
            .lookup(local)
            .ok_or_else(|| CodeGenError::Logic(format!("undeclared `{local}`")))?;
        let addr = rec.address + slot;
        let local_level = local_level as i64;
        let (callee, level) = self
            .symtab
            .lookup(name)
            .ok_or_else(|| CodeGenError::Logic(format!("built-in `{name}` not yet emitted")))?;
        let address = callee.address;
        let param_slots: u32 = callee.params.iter().map(|p| p.slot_size()).sum();
        self.emit(Opcode::Int, 0, 0);
        self.emit(Opcode::Lod, local_level, addr);
        self.emit(Opcode::Cal, level as i64, address);
        if param_slots > 0 {
            self.emit(Opcode::Int, 0, -(param_slots as i64));
        }
        Ok(())
    }

    /// Call a zero-argument builtin (e.g. `read_int`) and store its result
    /// into the `slot`-th slot of this function's own return area.
    fn gen_call_no_args_into(&mut self, name: &str, slot: i64) -> Result<(), CodeGenError> {
        let (rec, level) = self
            .symtab
            .lookup(name)
            .ok_or_else(|| CodeGenError::Logic(format!("built-in `{name}` not yet emitted")))?;
        let address = rec.address;
        let return_size = rec.ty.slot_size();
        let ctx = *self
            .func_stack
            .last()
            .ok_or_else(|| CodeGenError::Logic("builtin call outside function".into()))?;
        self.emit(Opcode::Int, 0, return_size as i64);
        self.emit(Opcode::Cal, level as i64, address);
        let base = -(ctx.return_size as i64 + ctx.total_param_slots as i64);
        self.emit(Opcode::Sto, 0, base + slot);
        Ok(())
    }
}

impl Expr {
    fn ty_unwrap(&self) -> Type {
        self.ty
            .unwrap_or_else(|| panic!("codegen reached an un-typed expression at line {}", self.line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::builtins::close_over_dependencies;
    use crate::instruction::render;
    use crate::parser::Parser;

    fn compile(src: &str) -> Vec<Instruction> {
        let mut block = Parser::parse_source(src).unwrap();
        let referenced = analyze(&mut block).unwrap();
        let closed = close_over_dependencies(&referenced);
        generate(&block, &closed).unwrap()
    }

    #[test]
    fn empty_main_has_expected_shape() {
        let ins = compile("int main() { return 0; }");
        // JMP(main-wrapper), INT 0,3, LIT 0,0, STO 0,-1, RET, INT 0,1, CAL 0,1, RET
        assert_eq!(ins.len(), 8);
        assert_eq!(ins[0].opcode, Opcode::Jmp);
        assert_eq!(ins[1].opcode, Opcode::Int);
        assert_eq!(ins[1].parameter, 3);
        assert_eq!(ins[2].opcode, Opcode::Lit);
        assert_eq!(ins[3].opcode, Opcode::Sto);
        assert_eq!(ins[3].parameter, -1);
        assert_eq!(ins[4].opcode, Opcode::Ret);
        assert_eq!(ins[5].opcode, Opcode::Int);
        assert_eq!(ins[5].parameter, 1);
        assert_eq!(ins[6].opcode, Opcode::Cal);
        assert_eq!(ins[6].level, 0);
        assert_eq!(ins[6].parameter, 1);
        assert_eq!(ins[7].opcode, Opcode::Ret);
    }

    #[test]
    fn forward_declared_function_call_gets_patched() {
        let ins = compile("int f(); int main() { return f(); } int f() { return 3; }");
        for i in &ins {
            if i.opcode == Opcode::Cal {
                let target = &ins[i.parameter as usize];
                assert_eq!(target.opcode, Opcode::Int);
                assert_eq!(target.parameter, ACTIVATION_RECORD_SIZE as i64);
            }
        }
    }

    #[test]
    fn heap_pointer_store_uses_sta() {
        let ins = compile(
            "int main() { int* p; p = new int; *p = 7; delete p; return 0; }",
        );
        assert!(ins.iter().any(|i| i.opcode == Opcode::Sta));
        assert!(ins.iter().any(|i| i.opcode == Opcode::New));
        assert!(ins.iter().any(|i| i.opcode == Opcode::Del));
    }

    #[test]
    fn stack_pointer_assign_uses_pst_with_literal_pointee() {
        let ins = compile("int main() { int a; int* p; p = &a; *p = 5; return 0; }");
        assert!(ins.iter().any(|i| i.opcode == Opcode::Pst));
        // no PST with heap-dynamic operands: level and address are literals
        // directly preceding it.
        let pst_idx = ins.iter().position(|i| i.opcode == Opcode::Pst).unwrap();
        assert_eq!(ins[pst_idx - 1].opcode, Opcode::Lit);
        assert_eq!(ins[pst_idx - 2].opcode, Opcode::Lit);
    }

    #[test]
    fn while_loop_break_and_continue_patch_to_distinct_targets() {
        let ins = compile(
            "int main() { int i; i = 0; while (i < 3) { if (i == 1) { continue; } if (i == 2) { break; } i = i + 1; } return 0; }",
        );
        let break_jmp = ins
            .iter()
            .enumerate()
            .filter(|(_, i)| i.opcode == Opcode::Jmp)
            .map(|(idx, i)| (idx, i.parameter))
            .last();
        assert!(break_jmp.is_some());
    }

    #[test]
    fn render_includes_every_instruction_on_its_own_line() {
        let ins = compile("int main() { return 0; }");
        let text = render(&ins);
        assert_eq!(text.lines().count(), ins.len());
    }

    #[test]
    fn print_int_digit_buffer_uses_pst_and_pld() {
        let ins = compile("int main() { print_int(42); return 0; }");
        assert!(ins.iter().any(|i| i.opcode == Opcode::Pst));
        assert!(ins.iter().any(|i| i.opcode == Opcode::Pld));
        assert!(ins.iter().any(|i| i.opcode == Opcode::Wri));
    }

    #[test]
    fn string_literal_slot_minus_one_holds_length_not_length_plus_one() {
        let ins = compile("int main() { string s = \"hi\"; return 0; }");
        let new_idx = ins.iter().position(|i| i.opcode == Opcode::New).unwrap();
        assert_eq!(ins[new_idx - 1].opcode, Opcode::Lit);
        assert_eq!(ins[new_idx - 1].parameter, 2);
    }

    #[test]
    fn strcmp_pulls_in_strlen_dependency() {
        let ins = compile("int main() { return strcmp(\"a\", \"b\"); }");
        assert!(ins.iter().any(|i| i.opcode == Opcode::Cal));
    }

    #[test]
    fn function_prologue_reserves_space_for_parameters() {
        let ins = compile("int f(int x) { return x; } int main() { return f(5); }");
        assert!(ins
            .iter()
            .any(|i| i.opcode == Opcode::Int && i.parameter == 4));
    }

    #[test]
    fn logical_and_evaluates_both_operands_unconditionally() {
        let ins = compile("int main() { return 1 && 2; }");
        assert!(!ins.iter().any(|i| i.opcode == Opcode::Jmc));
        assert!(ins
            .iter()
            .any(|i| i.opcode == Opcode::Opr && i.parameter == OprCode::Mul as i64));
        assert!(ins
            .iter()
            .any(|i| i.opcode == Opcode::Opr && i.parameter == OprCode::Neq as i64));
    }

    #[test]
    fn logical_or_combines_with_add() {
        let ins = compile("int main() { return 0 || 1; }");
        assert!(!ins.iter().any(|i| i.opcode == Opcode::Jmc));
        assert!(ins
            .iter()
            .any(|i| i.opcode == Opcode::Opr && i.parameter == OprCode::Add as i64));
        assert!(ins
            .iter()
            .any(|i| i.opcode == Opcode::Opr && i.parameter == OprCode::Neq as i64));
    }
}
