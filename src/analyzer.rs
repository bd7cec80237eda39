//! Semantic analysis: a single stateful pre-order traversal that checks
//! declaration rules, typing, and control-flow validity, and annotates every
//! expression node with its resolved `Type` for the code generator to
//! consume directly.

use std::collections::{HashMap, HashSet};

use crate::ast::*;
use crate::builtins;
use crate::error::{AnalyzeError, AnalyzeErrors};
use crate::symtab::{SymbolKind, SymbolTable};
use crate::types::{Type, TypeKind};

struct FunctionCtx {
    return_type: Type,
}

pub struct Analyzer {
    symtab: SymbolTable,
    loop_depth: u32,
    function_bodies: HashMap<String, bool>,
    function_stack: Vec<FunctionCtx>,
    declared_labels: HashSet<String>,
    pending_gotos: Vec<(String, u32)>,
    pending_forward_calls: HashMap<String, Vec<u32>>,
    referenced_builtins: Vec<String>,
    referenced_builtins_seen: HashSet<String>,
}

type AResult<T> = Result<T, AnalyzeError>;

impl Analyzer {
    fn new() -> Self {
        Analyzer {
            symtab: SymbolTable::new(),
            loop_depth: 0,
            function_bodies: HashMap::new(),
            function_stack: Vec::new(),
            declared_labels: HashSet::new(),
            pending_gotos: Vec::new(),
            pending_forward_calls: HashMap::new(),
            referenced_builtins: Vec::new(),
            referenced_builtins_seen: HashSet::new(),
        }
    }

    fn err(msg: impl Into<String>, line: u32) -> AnalyzeError {
        AnalyzeError::new(msg, line)
    }

    // ---- statements -----------------------------------------------------

    fn visit_stmts(&mut self, stmts: &mut [Stmt]) -> AResult<()> {
        for s in stmts.iter_mut() {
            self.visit_stmt(s)?;
        }
        Ok(())
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) -> AResult<()> {
        if let Some(label) = &stmt.label {
            if self.declared_labels.contains(label) {
                return Err(Self::err(
                    format!("label \"{label}\" already declared"),
                    stmt.line,
                ));
            }
            self.declared_labels.insert(label.clone());
        }

        match &mut stmt.kind {
            StmtKind::Block(block) => {
                self.symtab.push_scope(false);
                self.visit_stmts(&mut block.statements)?;
                self.symtab.pop_scope();
                Ok(())
            }
            StmtKind::DeclVar {
                ty,
                name,
                is_const,
                init,
            } => self.visit_decl_var(stmt.line, ty, name, *is_const, init),
            StmtKind::DeclFunc {
                return_type,
                name,
                params,
                body,
            } => self.visit_decl_func(stmt.line, return_type, name, params, body),
            StmtKind::If { cond, then, els } => {
                self.check_expr(cond)?;
                self.visit_stmt(then)?;
                if let Some(els) = els {
                    self.visit_stmt(els)?;
                }
                Ok(())
            }
            StmtKind::While {
                cond, body, ..
            } => {
                self.check_expr(cond)?;
                self.loop_depth += 1;
                let r = self.visit_stmt(body);
                self.loop_depth -= 1;
                r
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.symtab.push_scope(false);
                let result = (|| {
                    if let Some(init) = init {
                        self.visit_stmt(init)?;
                    }
                    if let Some(cond) = cond {
                        self.check_expr(cond)?;
                    }
                    if let Some(step) = step {
                        self.check_expr(step)?;
                    }
                    self.loop_depth += 1;
                    let r = self.visit_stmt(body);
                    self.loop_depth -= 1;
                    r
                })();
                self.symtab.pop_scope();
                result
            }
            StmtKind::BreakContinue(_) => {
                if self.loop_depth == 0 {
                    return Err(Self::err(
                        "break/continue statement outside of a loop",
                        stmt.line,
                    ));
                }
                Ok(())
            }
            StmtKind::Return(expr) => self.visit_return(stmt.line, expr),
            StmtKind::Goto(target) => {
                self.pending_gotos.push((target.clone(), stmt.line));
                Ok(())
            }
            StmtKind::ExprStmt(expr) => self.check_expr(expr).map(|_| ()),
        }
    }

    fn visit_decl_var(
        &mut self,
        line: u32,
        ty: &mut Type,
        name: &str,
        is_const: bool,
        init: &mut Option<Expr>,
    ) -> AResult<()> {
        if ty.kind == TypeKind::Void {
            return Err(Self::err("variable cannot have type void", line));
        }
        if ty.is_pointer() && ty.kind == TypeKind::Float {
            return Err(Self::err("pointer to float is not allowed", line));
        }
        if ty.pointer_level > 1 {
            return Err(Self::err(
                "pointers to pointers are not supported",
                line,
            ));
        }
        if self.symtab.declared_in_current_scope(name) {
            return Err(Self::err(format!("\"{name}\" is already declared"), line));
        }

        let mut assigned = false;
        if let Some(init_expr) = init {
            self.check_expr(init_expr)?;
            self.check_pointer_discipline(line, name, *ty, init_expr)?;
            self.check_assignment_type(line, name, *ty, init_expr)?;
            if ty.is_pointer() {
                ty.points_to_stack = points_to_stack_of(init_expr);
            }
            assigned = true;
        }

        self.symtab.insert_variable(name, *ty, is_const);
        if assigned {
            if let Some(rec) = self.symtab.lookup_mut(name) {
                rec.assigned = true;
            }
        }
        Ok(())
    }

    fn visit_decl_func(
        &mut self,
        line: u32,
        return_type: &mut Type,
        name: &str,
        params: &mut [Param],
        body: &mut Option<Block>,
    ) -> AResult<()> {
        let existing_has_body = self.function_bodies.get(name).copied().unwrap_or(false);
        if existing_has_body && body.is_some() {
            return Err(Self::err(format!("function \"{name}\" is already declared"), line));
        }

        self.symtab.insert_function(
            name,
            *return_type,
            params.iter().map(|p| p.ty).collect(),
            -1,
        );
        self.function_bodies
            .insert(name.to_string(), existing_has_body || body.is_some());

        if body.is_some() {
            if let Some(lines) = self.pending_forward_calls.remove(name) {
                let _ = lines; // resolved: body has now been seen.
            }
        }

        if let Some(body) = body {
            self.symtab.push_scope(true);
            self.function_stack.push(FunctionCtx {
                return_type: *return_type,
            });
            for p in params.iter() {
                self.symtab.insert_variable(&p.name, p.ty, false);
                if let Some(rec) = self.symtab.lookup_mut(&p.name) {
                    rec.assigned = true;
                }
            }
            let result = self.visit_stmts(&mut body.statements);
            self.function_stack.pop();
            self.symtab.pop_scope();
            result?;

            if return_type.kind != TypeKind::Void && !block_has_return(body) {
                return Err(Self::err(
                    format!("function \"{name}\" does not return a value on every path"),
                    line,
                ));
            }
        }
        Ok(())
    }

    fn visit_return(&mut self, line: u32, expr: &mut Option<Expr>) -> AResult<()> {
        let return_type = self
            .function_stack
            .last()
            .map(|f| f.return_type)
            .unwrap_or_else(|| Type::new(TypeKind::Void));

        match expr {
            Some(e) => {
                self.check_expr(e)?;
                if return_type.is_void() {
                    return Err(Self::err("void function cannot return a value", line));
                }
                if e.ty_unwrap().is_string() != return_type.is_string() {
                    return Err(Self::err("cannot return string from a non-string function (or vice versa)", line));
                }
                if !types_compatible(e.ty_unwrap(), return_type) {
                    return Err(Self::err("return type does not match function's declared return type", line));
                }
            }
            None => {
                if !return_type.is_void() {
                    return Err(Self::err(
                        format!("function must return a value of type {return_type}"),
                        line,
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_pointer_discipline(
        &self,
        line: u32,
        name: &str,
        ty: Type,
        rhs: &Expr,
    ) -> AResult<()> {
        let rhs_is_pointer_producing = is_pointer_producing(rhs);
        if ty.is_pointer() && !rhs_is_pointer_producing {
            return Err(Self::err(
                format!("\"{name}\" is a pointer and must be initialized from an address, a new expression, or a pointer-valued expression"),
                line,
            ));
        }
        if !ty.is_pointer() && rhs_is_pointer_producing {
            return Err(Self::err(
                format!("\"{name}\" is not a pointer and cannot be assigned an address or new expression"),
                line,
            ));
        }
        Ok(())
    }

    fn check_assignment_type(&self, line: u32, name: &str, ty: Type, rhs: &Expr) -> AResult<()> {
        if ty.is_pointer() {
            return Ok(());
        }
        let rhs_ty = rhs.ty_unwrap();
        if ty.is_string() != rhs_ty.is_string() {
            return Err(Self::err(
                format!("cannot assign a string value to non-string \"{name}\" (or vice versa)"),
                line,
            ));
        }
        if !types_compatible(rhs_ty, ty) {
            return Err(Self::err(
                format!("type mismatch assigning to \"{name}\""),
                line,
            ));
        }
        Ok(())
    }

    // ---- expressions ------------------------------------------------

    fn check_expr(&mut self, expr: &mut Expr) -> AResult<Type> {
        let line = expr.line;
        let ty = match &mut expr.kind {
            ExprKind::IntLit(_) => Type::new(TypeKind::Int),
            ExprKind::BoolLit(_) => Type::new(TypeKind::Bool),
            ExprKind::FloatLit { .. } => Type::new(TypeKind::Float),
            ExprKind::StringLit(_) => Type::new(TypeKind::String),
            ExprKind::Identifier(name) => {
                let (rec, _level) = self
                    .symtab
                    .lookup(name)
                    .ok_or_else(|| Self::err(format!("\"{name}\" is not declared"), line))?;
                if rec.kind != SymbolKind::Variable {
                    return Err(Self::err(format!("\"{name}\" is not a variable"), line));
                }
                if !rec.assigned {
                    return Err(Self::err(
                        format!("\"{name}\" is used before being assigned a value"),
                        line,
                    ));
                }
                rec.ty
            }
            ExprKind::Assign { name, lvalue, rhs } => {
                self.check_expr(rhs)?;
                match lvalue {
                    None => self.check_name_assign(line, name, rhs)?,
                    Some(lv) => self.check_deref_assign(line, lv, rhs)?,
                }
            }
            ExprKind::Ternary { cond, then, els } => {
                self.check_expr(cond)?;
                self.check_expr(then)?;
                self.check_expr(els)?;
                then.ty_unwrap()
            }
            ExprKind::BinOp { op, left, right } => self.check_binop(line, *op, left, right)?,
            ExprKind::UnOp { op, operand } => self.check_unop(line, *op, operand)?,
            ExprKind::Cast { target, expr: inner } => self.check_cast(line, *target, inner)?,
            ExprKind::Call { name, args } => self.check_call(line, name, args)?,
            ExprKind::New { ty, count } => {
                if let Some(c) = count {
                    self.check_expr(c)?;
                }
                if ty.kind == TypeKind::Void {
                    return Err(Self::err("cannot allocate void with new", line));
                }
                if ty.kind == TypeKind::Float {
                    return Err(Self::err("pointer to float is not allowed", line));
                }
                *ty
            }
            ExprKind::Delete(inner) => {
                let t = self.check_expr(inner)?;
                if !t.is_pointer() {
                    return Err(Self::err("cannot delete a non-pointer value", line));
                }
                Type::new(TypeKind::Void)
            }
            ExprKind::Deref(inner) => {
                let t = self.check_expr(inner)?;
                if !t.is_pointer() {
                    return Err(Self::err("cannot dereference a non-pointer value", line));
                }
                if t.pointer_level > 1 {
                    return Err(Self::err("pointers to pointers are not supported", line));
                }
                if t.points_to_stack {
                    // stack pointers dereference fine; only arithmetic on
                    // them is restricted (checked in check_binop).
                }
                t.dereferenced()
            }
            ExprKind::AddrOf(name) => {
                let (rec, _level) = self
                    .symtab
                    .lookup(name)
                    .ok_or_else(|| Self::err(format!("\"{name}\" is not declared"), line))?;
                if rec.kind != SymbolKind::Variable {
                    return Err(Self::err(format!("\"{name}\" is not a variable"), line));
                }
                Type::pointer(rec.ty.kind, rec.ty.pointer_level + 1, true)
            }
            ExprKind::SizeOf(_) => Type::new(TypeKind::Int),
        };
        expr.ty = Some(ty);
        Ok(ty)
    }

    fn check_name_assign(&mut self, line: u32, name: &str, rhs: &Expr) -> AResult<Type> {
        let is_pointer;
        let is_const;
        let already_assigned;
        {
            let (rec, _level) = self
                .symtab
                .lookup(name)
                .ok_or_else(|| Self::err(format!("\"{name}\" is not declared"), line))?;
            if rec.kind != SymbolKind::Variable {
                return Err(Self::err(format!("\"{name}\" is not a variable"), line));
            }
            is_pointer = rec.ty.is_pointer();
            is_const = rec.is_const;
            already_assigned = rec.assigned;
        }
        if is_const && already_assigned {
            return Err(Self::err(
                format!("\"{name}\" is const and cannot be reassigned"),
                line,
            ));
        }

        let ty = self.symtab.lookup(name).unwrap().0.ty;
        self.check_pointer_discipline(line, name, ty, rhs)?;
        self.check_assignment_type(line, name, ty, rhs)?;

        let new_points_to_stack = if is_pointer {
            points_to_stack_of(rhs)
        } else {
            false
        };
        let rec = self.symtab.lookup_mut(name).unwrap();
        rec.assigned = true;
        if is_pointer {
            rec.ty.points_to_stack = new_points_to_stack;
        }
        Ok(rec.ty)
    }

    fn check_deref_assign(&mut self, line: u32, lvalue: &mut Expr, rhs: &Expr) -> AResult<Type> {
        let base_ty = self.check_expr(lvalue)?;
        let base_name = match &lvalue.kind {
            ExprKind::Deref(inner) => what_do_i_dereference(inner),
            _ => None,
        };
        let base_name = base_name
            .ok_or_else(|| Self::err("left side of assignment through '*' must dereference an identifier", line))?
            .to_string();
        let target_ty = base_ty;
        if !types_compatible(rhs.ty_unwrap(), target_ty) {
            return Err(Self::err(
                format!("type mismatch assigning through pointer \"{base_name}\""),
                line,
            ));
        }
        Ok(target_ty)
    }

    fn check_binop(
        &mut self,
        line: u32,
        op: BinOpKind,
        left: &mut Expr,
        right: &mut Expr,
    ) -> AResult<Type> {
        let lt = self.check_expr(left)?;
        let rt = self.check_expr(right)?;

        if lt.is_string() || rt.is_string() {
            return Err(Self::err(
                "string operand is not allowed in a binary operator expression",
                line,
            ));
        }
        if (lt.is_pointer() && lt.points_to_stack) || (rt.is_pointer() && rt.points_to_stack) {
            return Err(Self::err(
                "arithmetic on a stack-captured pointer is not supported",
                line,
            ));
        }
        if matches!(op, BinOpKind::Div | BinOpKind::Mod) && is_literal_zero(right) {
            return Err(Self::err("division by zero", line));
        }

        if lt.is_pointer() || rt.is_pointer() {
            let ptr_ty = if lt.is_pointer() { lt } else { rt };
            return Ok(ptr_ty);
        }

        let ty = match op {
            BinOpKind::And
            | BinOpKind::Or
            | BinOpKind::Eq
            | BinOpKind::Neq
            | BinOpKind::Lt
            | BinOpKind::Leq
            | BinOpKind::Gt
            | BinOpKind::Geq => Type::new(TypeKind::Bool),
            _ => {
                if lt.is_float() || rt.is_float() {
                    Type::new(TypeKind::Float)
                } else {
                    Type::new(TypeKind::Int)
                }
            }
        };
        Ok(ty)
    }

    fn check_unop(&mut self, line: u32, op: UnOpKind, operand: &mut Expr) -> AResult<Type> {
        let t = self.check_expr(operand)?;
        if t.is_string() {
            return Err(Self::err(
                "string operand is not allowed in a unary operator expression",
                line,
            ));
        }
        Ok(match op {
            UnOpKind::Not => Type::new(TypeKind::Bool),
            UnOpKind::Neg => t,
        })
    }

    fn check_cast(&mut self, line: u32, target: Type, inner: &mut Expr) -> AResult<Type> {
        let t = self.check_expr(inner)?;
        if target.is_string() {
            return Err(Self::err("cannot cast to type string", line));
        }
        if t.is_string() {
            return Err(Self::err("cannot cast a string value", line));
        }
        if target.is_void() {
            return Err(Self::err("cannot cast to type void", line));
        }
        Ok(target)
    }

    fn check_call(&mut self, line: u32, name: &str, args: &mut [Expr]) -> AResult<Type> {
        for a in args.iter_mut() {
            self.check_expr(a)?;
        }

        if let Some(sig) = builtins::builtin_signature(name) {
            if !self.referenced_builtins_seen.contains(name) {
                self.referenced_builtins_seen.insert(name.to_string());
                self.referenced_builtins.push(name.to_string());
            }
            if args.len() != sig.params.len() {
                return Err(Self::err(
                    format!("\"{name}\" expects {} argument(s), found {}", sig.params.len(), args.len()),
                    line,
                ));
            }
            for (arg, param_ty) in args.iter().zip(sig.params.iter()) {
                if !types_compatible(arg.ty_unwrap(), *param_ty) {
                    return Err(Self::err(
                        format!("argument type mismatch in call to \"{name}\""),
                        line,
                    ));
                }
            }
            return Ok(sig.return_type);
        }

        let (return_type, params, has_body) = {
            let (rec, _level) = self
                .symtab
                .lookup(name)
                .ok_or_else(|| Self::err(format!("function \"{name}\" is not declared"), line))?;
            if rec.kind != SymbolKind::Function {
                return Err(Self::err(format!("\"{name}\" is not a function"), line));
            }
            (
                rec.ty,
                rec.params.clone(),
                self.function_bodies.get(name).copied().unwrap_or(false),
            )
        };

        if args.len() != params.len() {
            return Err(Self::err(
                format!("\"{name}\" expects {} argument(s), found {}", params.len(), args.len()),
                line,
            ));
        }
        for (arg, param_ty) in args.iter().zip(params.iter()) {
            if !types_compatible(arg.ty_unwrap(), *param_ty) {
                return Err(Self::err(
                    format!("argument type mismatch in call to \"{name}\""),
                    line,
                ));
            }
        }

        if !has_body {
            self.pending_forward_calls
                .entry(name.to_string())
                .or_default()
                .push(line);
        }

        Ok(return_type)
    }
}

impl Expr {
    fn ty_unwrap(&self) -> Type {
        self.ty.expect("expression type resolved before use")
    }
}

fn is_literal_zero(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::IntLit(0) | ExprKind::FloatLit { whole: 0, frac: 0 }
    )
}

/// Strict base-type compatibility with int→float widening, matching §4.4's
/// "widening only inside arithmetic/assignment, never across call arity".
fn types_compatible(from: Type, to: Type) -> bool {
    if from.matches(to) {
        return true;
    }
    !from.is_pointer() && !to.is_pointer() && from.kind == TypeKind::Int && to.kind == TypeKind::Float
}

/// Does `expr` produce a pointer value by construction (ignoring its
/// resolved static type)? Used for the pointer-discipline check, which must
/// run before the rhs's `Type` pointer-ness is trusted for the edge cases
/// named in §4.2 (address-of, new, or a binop textually containing one).
fn is_pointer_producing(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::AddrOf(_) => true,
        ExprKind::New { .. } => true,
        ExprKind::BinOp { left, right, .. } => contains_addr_of(left) || contains_addr_of(right),
        ExprKind::Ternary { then, els, .. } => is_pointer_producing(then) && is_pointer_producing(els),
        ExprKind::Cast { expr, .. } => is_pointer_producing(expr),
        _ => expr.ty.map(|t| t.is_pointer()).unwrap_or(false),
    }
}

fn points_to_stack_of(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::AddrOf(_) => true,
        ExprKind::New { .. } => false,
        ExprKind::BinOp { left, right, .. } => contains_addr_of(left) || contains_addr_of(right),
        ExprKind::Ternary { then, els, .. } => points_to_stack_of(then) && points_to_stack_of(els),
        _ => false,
    }
}

/// Run the full semantic analysis pass over `program`, mutating it in place
/// with resolved types and pointer-stack flags. On success, returns the
/// deduplicated, emission-ordered list of built-in functions referenced
/// anywhere in the program (see `builtins::close_over_dependencies`).
pub fn analyze(program: &mut Block) -> Result<Vec<String>, AnalyzeErrors> {
    let mut a = Analyzer::new();

    a.visit_stmts(&mut program.statements)
        .map_err(|e| AnalyzeErrors(vec![e]))?;

    match a.symtab.lookup("main") {
        None => {
            return Err(AnalyzeErrors(vec![AnalyzeError::new(
                "\"main\" is not declared",
                0,
            )]));
        }
        Some((rec, _)) => {
            if rec.kind != SymbolKind::Function {
                return Err(AnalyzeErrors(vec![AnalyzeError::new(
                    "\"main\" must be a function",
                    0,
                )]));
            }
            if rec.ty.kind != TypeKind::Int || rec.ty.is_pointer() {
                return Err(AnalyzeErrors(vec![AnalyzeError::new(
                    "\"main\" must return int",
                    0,
                )]));
            }
        }
    }

    let mut final_errors = Vec::new();
    for (label, line) in &a.pending_gotos {
        if !a.declared_labels.contains(label) {
            final_errors.push(AnalyzeError::new(
                format!("label \"{label}\" is not declared"),
                *line,
            ));
        }
    }
    for (name, lines) in &a.pending_forward_calls {
        if !a.function_bodies.get(name).copied().unwrap_or(false) {
            for line in lines {
                final_errors.push(AnalyzeError::new(
                    format!("function \"{name}\" is referenced but never defined"),
                    *line,
                ));
            }
        }
    }
    if !final_errors.is_empty() {
        return Err(AnalyzeErrors(final_errors));
    }

    Ok(builtins::close_over_dependencies(&a.referenced_builtins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn analyze_src(src: &str) -> Result<Vec<String>, AnalyzeErrors> {
        let mut block = Parser::parse_source(src).unwrap();
        analyze(&mut block)
    }

    #[test]
    fn accepts_minimal_main() {
        assert!(analyze_src("int main() { return 0; }").is_ok());
    }

    #[test]
    fn rejects_missing_main() {
        let err = analyze_src("int f() { return 0; }").unwrap_err();
        assert!(err.0[0].message.contains("main"));
    }

    #[test]
    fn rejects_redeclared_variable() {
        let err = analyze_src("int main(){ int a=1; int a=2; return 0; }").unwrap_err();
        assert!(err.0[0].message.contains("already declared"));
    }

    #[test]
    fn rejects_use_before_assignment() {
        let err = analyze_src("int main(){ int a; return a; }").unwrap_err();
        assert!(err.0[0].message.contains("used before"));
    }

    #[test]
    fn rejects_duplicate_label() {
        let err = analyze_src("int main(){ L: ; L: ; return 0; }").unwrap_err();
        assert!(err.0[0].message.contains("already declared"));
    }

    #[test]
    fn rejects_undefined_goto_target() {
        let err = analyze_src("int main(){ goto nowhere; return 0; }").unwrap_err();
        assert!(err.0[0].message.contains("not declared"));
    }

    #[test]
    fn accepts_forward_declared_function() {
        assert!(analyze_src("int f(); int main(){ return f(); } int f(){ return 3; }").is_ok());
    }

    #[test]
    fn rejects_unresolved_forward_reference() {
        let err = analyze_src("int f(); int main(){ return f(); }").unwrap_err();
        assert!(err.0[0].message.contains("never defined"));
    }

    #[test]
    fn rejects_division_by_literal_zero() {
        let err = analyze_src("int main(){ return 1/0; }").unwrap_err();
        assert!(err.0[0].message.contains("division by zero"));
    }

    #[test]
    fn rejects_break_outside_loop() {
        let err = analyze_src("int main(){ break; return 0; }").unwrap_err();
        assert!(err.0[0].message.contains("outside of a loop"));
    }

    #[test]
    fn rejects_const_reassignment() {
        let err = analyze_src("int main(){ const int a=1; a=2; return 0; }").unwrap_err();
        assert!(err.0[0].message.contains("const"));
    }

    #[test]
    fn tracks_stack_pointer_flag() {
        let mut block =
            Parser::parse_source("int main(){ int a=1; int *p=&a; return a; }").unwrap();
        analyze(&mut block).unwrap();
        let StmtKind::DeclFunc { body, .. } = &block.statements[0].kind else {
            panic!()
        };
        let body = body.as_ref().unwrap();
        let StmtKind::DeclVar { ty, .. } = &body.statements[1].kind else {
            panic!()
        };
        assert!(ty.points_to_stack);
    }

    #[test]
    fn rejects_string_in_binop() {
        let err = analyze_src("int main(){ string s=\"a\"; return s+s; }")
            .map(|_| ())
            .unwrap_err();
        assert!(err.0[0].message.contains("string operand"));
    }
}
