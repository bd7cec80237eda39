//! Pre-codegen peephole optimizer: folds algebraic/boolean identities out of
//! the AST. Runs after the analyzer so every node already carries a
//! resolved `Type`.
//!
//! The reference tree this is modeled on gives each node a parent
//! back-pointer so a rewrite can replace itself in its parent's slot and
//! revisit the parent to let folds cascade. In Rust it is simpler to pass
//! `&mut Expr` and replace the node in place with `std::mem::replace`,
//! which gets the same cascading behavior without a back-link at all.

use crate::ast::{BinOpKind, Block, Expr, ExprKind, Stmt, StmtKind};
use crate::types::TypeKind;

pub fn optimize(block: &mut Block) {
    optimize_stmts(&mut block.statements);
}

fn optimize_stmts(stmts: &mut [Stmt]) {
    for s in stmts {
        optimize_stmt(s);
    }
}

fn optimize_stmt(stmt: &mut Stmt) {
    match &mut stmt.kind {
        StmtKind::Block(b) => optimize_stmts(&mut b.statements),
        StmtKind::DeclVar { init: Some(e), .. } => optimize_expr(e),
        StmtKind::DeclVar { .. } => {}
        StmtKind::DeclFunc { body: Some(b), .. } => optimize_stmts(&mut b.statements),
        StmtKind::DeclFunc { .. } => {}
        StmtKind::If { cond, then, els } => {
            optimize_expr(cond);
            optimize_stmt(then);
            if let Some(els) = els {
                optimize_stmt(els);
            }
        }
        StmtKind::While { cond, body, .. } => {
            optimize_expr(cond);
            optimize_stmt(body);
        }
        StmtKind::For {
            init,
            cond,
            step,
            body,
        } => {
            if let Some(init) = init {
                optimize_stmt(init);
            }
            if let Some(cond) = cond {
                optimize_expr(cond);
            }
            if let Some(step) = step {
                optimize_expr(step);
            }
            optimize_stmt(body);
        }
        StmtKind::BreakContinue(_) | StmtKind::Goto(_) => {}
        StmtKind::Return(Some(e)) => optimize_expr(e),
        StmtKind::Return(None) => {}
        StmtKind::ExprStmt(e) => optimize_expr(e),
    }
}

/// Recursively optimize `expr`'s children, then try to fold `expr` itself if
/// it is a `BinOp`. A successful fold replaces `*expr` with the surviving
/// child (or a literal) and re-runs on the result, so cascading folds (e.g.
/// `(x + 0) * 1`) collapse in one pass.
fn optimize_expr(expr: &mut Expr) {
    match &mut expr.kind {
        ExprKind::Assign { rhs, lvalue, .. } => {
            optimize_expr(rhs);
            if let Some(lv) = lvalue {
                optimize_expr(lv);
            }
        }
        ExprKind::Ternary { cond, then, els } => {
            optimize_expr(cond);
            optimize_expr(then);
            optimize_expr(els);
        }
        ExprKind::BinOp { left, right, .. } => {
            optimize_expr(left);
            optimize_expr(right);
        }
        ExprKind::UnOp { operand, .. } => optimize_expr(operand),
        ExprKind::Cast { expr: inner, .. } => optimize_expr(inner),
        ExprKind::Call { args, .. } => {
            for a in args {
                optimize_expr(a);
            }
        }
        ExprKind::New { count: Some(c), .. } => optimize_expr(c),
        ExprKind::Delete(inner) | ExprKind::Deref(inner) => optimize_expr(inner),
        _ => {}
    }

    if let Some(replacement) = try_fold(expr) {
        *expr = replacement;
        optimize_expr(expr);
    }
}

fn is_int_zero(e: &Expr) -> bool {
    matches!(e.kind, ExprKind::IntLit(0))
}

fn is_int_one(e: &Expr) -> bool {
    matches!(e.kind, ExprKind::IntLit(1))
}

fn is_bool(e: &Expr, value: bool) -> bool {
    matches!(e.kind, ExprKind::BoolLit(b) if b == value)
}

fn zero_of_matching_kind(e: &Expr) -> Expr {
    let ty = e.ty;
    let mut lit = Expr::new(e.line, ExprKind::IntLit(0));
    lit.ty = ty.or(Some(crate::types::Type::new(TypeKind::Int)));
    lit
}

fn try_fold(expr: &Expr) -> Option<Expr> {
    let ExprKind::BinOp { op, left, right } = &expr.kind else {
        return None;
    };

    match op {
        BinOpKind::Add => {
            if is_int_zero(left) {
                return Some((**right).clone());
            }
            if is_int_zero(right) {
                return Some((**left).clone());
            }
        }
        BinOpKind::Sub => {
            if is_int_zero(right) {
                return Some((**left).clone());
            }
        }
        BinOpKind::Mul => {
            if is_int_zero(left) || is_int_zero(right) {
                return Some(zero_of_matching_kind(expr));
            }
            if is_int_one(left) {
                return Some((**right).clone());
            }
            if is_int_one(right) {
                return Some((**left).clone());
            }
        }
        BinOpKind::Div => {
            if is_int_one(right) {
                return Some((**left).clone());
            }
        }
        BinOpKind::And => {
            if is_bool(left, false) || is_bool(right, false) {
                return Some(Expr::new(expr.line, ExprKind::BoolLit(false)));
            }
            if is_bool(left, true) {
                return Some((**right).clone());
            }
            if is_bool(right, true) {
                return Some((**left).clone());
            }
        }
        BinOpKind::Or => {
            if is_bool(left, true) || is_bool(right, true) {
                return Some(Expr::new(expr.line, ExprKind::BoolLit(true)));
            }
            if is_bool(left, false) {
                return Some((**right).clone());
            }
            if is_bool(right, false) {
                return Some((**left).clone());
            }
        }
        _ => {}
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::parser::Parser;

    #[test]
    fn folds_add_zero() {
        let mut block = Parser::parse_source("int main(){ int x = 2+0; return x; }").unwrap();
        analyze(&mut block).unwrap();
        optimize(&mut block);
        let StmtKind::DeclFunc { body, .. } = &block.statements[0].kind else {
            panic!()
        };
        let body = body.as_ref().unwrap();
        let StmtKind::DeclVar { init: Some(e), .. } = &body.statements[0].kind else {
            panic!()
        };
        assert!(matches!(e.kind, ExprKind::IntLit(2)));
    }

    #[test]
    fn folds_mul_zero_to_zero() {
        let mut block = Parser::parse_source("int main(){ int x = 5*0; return x; }").unwrap();
        analyze(&mut block).unwrap();
        optimize(&mut block);
        let StmtKind::DeclFunc { body, .. } = &block.statements[0].kind else {
            panic!()
        };
        let body = body.as_ref().unwrap();
        let StmtKind::DeclVar { init: Some(e), .. } = &body.statements[0].kind else {
            panic!()
        };
        assert!(matches!(e.kind, ExprKind::IntLit(0)));
    }

    #[test]
    fn folds_cascade_add_zero_then_mul_one() {
        let mut block = Parser::parse_source("int main(){ int x = (2+0)*1; return x; }").unwrap();
        analyze(&mut block).unwrap();
        optimize(&mut block);
        let StmtKind::DeclFunc { body, .. } = &block.statements[0].kind else {
            panic!()
        };
        let body = body.as_ref().unwrap();
        let StmtKind::DeclVar { init: Some(e), .. } = &body.statements[0].kind else {
            panic!()
        };
        assert!(matches!(e.kind, ExprKind::IntLit(2)));
    }
}
