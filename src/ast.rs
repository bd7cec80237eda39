//! The abstract syntax tree produced by the parser and consumed by the
//! analyzer, optimizer, and code generator.
//!
//! The original tree this language is modeled on used a class hierarchy with
//! runtime type discrimination (visitor + dynamic cast). Here it is a tagged
//! union of node variants; traversal is ordinary recursion and pattern
//! matching instead of double dispatch.

use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakContinueKind {
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOpKind {
    Neg,
    Not,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub ty: Type,
    pub name: String,
}

/// One function argument / expression node. Carries the source line it was
/// parsed from and, once the analyzer has run, its resolved static `Type`.
#[derive(Debug, Clone)]
pub struct Expr {
    pub line: u32,
    pub kind: ExprKind,
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(line: u32, kind: ExprKind) -> Self {
        Expr {
            line,
            kind,
            ty: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLit(i64),
    BoolLit(bool),
    FloatLit { whole: i64, frac: i64 },
    StringLit(String),
    Identifier(String),
    /// `name = rhs` or, when `lvalue` is set, `*lvalue = rhs` where `name`
    /// names the identifier the dereference chain ultimately roots in.
    Assign {
        name: String,
        lvalue: Option<Box<Expr>>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    BinOp {
        op: BinOpKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnOp {
        op: UnOpKind,
        operand: Box<Expr>,
    },
    Cast {
        target: Type,
        expr: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    New {
        ty: Type,
        count: Option<Box<Expr>>,
    },
    Delete(Box<Expr>),
    Deref(Box<Expr>),
    AddrOf(String),
    SizeOf(Type),
}

/// A statement. `label` holds the textual goto-target label attached to this
/// statement, if any (`label: stmt`).
#[derive(Debug, Clone)]
pub struct Stmt {
    pub line: u32,
    pub label: Option<String>,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(line: u32, kind: StmtKind) -> Self {
        Stmt {
            line,
            label: None,
            kind,
        }
    }

    pub fn with_label(mut self, label: String) -> Self {
        self.label = Some(label);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

impl Block {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Block { statements }
    }
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Block(Block),
    DeclVar {
        ty: Type,
        name: String,
        is_const: bool,
        init: Option<Expr>,
    },
    DeclFunc {
        return_type: Type,
        name: String,
        params: Vec<Param>,
        body: Option<Block>,
    },
    If {
        cond: Expr,
        then: Box<Stmt>,
        els: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        is_do_while: bool,
        is_repeat_until: bool,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    BreakContinue(BreakContinueKind),
    Return(Option<Expr>),
    Goto(String),
    ExprStmt(Expr),
}

/// Counts break/continue statements reachable from `stmt` without crossing
/// into a nested loop (a nested loop owns its own break/continue targets).
pub fn count_break_continue(stmt: &Stmt) -> (u32, u32) {
    match &stmt.kind {
        StmtKind::Block(b) => b
            .statements
            .iter()
            .map(count_break_continue)
            .fold((0, 0), |(ab, ac), (b, c)| (ab + b, ac + c)),
        StmtKind::If { then, els, .. } => {
            let (b1, c1) = count_break_continue(then);
            let (b2, c2) = els
                .as_ref()
                .map(|e| count_break_continue(e))
                .unwrap_or((0, 0));
            (b1 + b2, c1 + c2)
        }
        StmtKind::BreakContinue(BreakContinueKind::Break) => (1, 0),
        StmtKind::BreakContinue(BreakContinueKind::Continue) => (0, 1),
        // A nested loop owns its own break/continue accounting.
        StmtKind::While { .. } | StmtKind::For { .. } => (0, 0),
        _ => (0, 0),
    }
}

/// Sum of declared-variable slot sizes directly inside `block` (not
/// recursing into nested blocks, which manage their own scope).
pub fn declared_var_slots(block: &Block) -> u32 {
    block
        .statements
        .iter()
        .map(|s| match &s.kind {
            StmtKind::DeclVar { ty, .. } => ty.slot_size(),
            _ => 0,
        })
        .sum()
}

/// True if `stmt` definitely returns on every control-flow path, per the
/// "return presence" rule: a `Return`, or an `If` whose both branches
/// definitely return.
pub fn contains_return_statement(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) => true,
        StmtKind::Block(b) => b
            .statements
            .last()
            .map(contains_return_statement)
            .unwrap_or(false),
        StmtKind::If {
            then,
            els: Some(els),
            ..
        } => contains_return_statement(then) && contains_return_statement(els),
        _ => false,
    }
}

/// True if `block`, taken as a function body, definitely returns on every
/// control-flow path (see `contains_return_statement`).
pub fn block_has_return(block: &Block) -> bool {
    block
        .statements
        .last()
        .map(contains_return_statement)
        .unwrap_or(false)
}

/// Does this expression tree contain an `AddrOf` node anywhere, textually?
/// Used by the pointer-discipline check: a binop rhs containing a reference
/// to a stack address is itself treated as pointer-producing.
pub fn contains_addr_of(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::AddrOf(_) => true,
        ExprKind::BinOp { left, right, .. } => contains_addr_of(left) || contains_addr_of(right),
        ExprKind::Ternary { then, els, .. } => contains_addr_of(then) || contains_addr_of(els),
        ExprKind::UnOp { operand, .. } => contains_addr_of(operand),
        ExprKind::Cast { expr, .. } => contains_addr_of(expr),
        _ => false,
    }
}

/// The identifier an lvalue dereference chain ultimately roots in, e.g.
/// `*p` roots in `p`; used to resolve `Assign { lvalue: Some(..), .. }`.
pub fn what_do_i_dereference(expr: &Expr) -> Option<&str> {
    match &expr.kind {
        ExprKind::Identifier(name) => Some(name),
        ExprKind::Deref(inner) => what_do_i_dereference(inner),
        _ => None,
    }
}
