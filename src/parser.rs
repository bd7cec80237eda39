//! Hand-written recursive-descent parser with precedence climbing for
//! expressions, producing the AST of `crate::ast`.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::types::{Type, TypeKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    pub fn parse_source(source: &str) -> PResult<Block> {
        let tokens = Lexer::tokenize(source).map_err(|e| ParseError {
            message: e.message,
            line: e.line,
        })?;
        let mut parser = Parser::new(tokens);
        parser.parse_program()
    }

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(ParseError {
                message: format!("expected {what}, found {:?}", self.peek()),
                line: self.line(),
            })
        }
    }

    fn expect_ident(&mut self) -> PResult<String> {
        match self.peek().clone() {
            TokenKind::Ident(s) => {
                self.advance();
                Ok(s)
            }
            other => Err(ParseError {
                message: format!("expected identifier, found {other:?}"),
                line: self.line(),
            }),
        }
    }

    fn at_type_start(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::KwInt
                | TokenKind::KwBool
                | TokenKind::KwFloat
                | TokenKind::KwString
                | TokenKind::KwVoid
        )
    }

    fn parse_type_kind(&mut self) -> PResult<TypeKind> {
        let kind = match self.peek() {
            TokenKind::KwInt => TypeKind::Int,
            TokenKind::KwBool => TypeKind::Bool,
            TokenKind::KwFloat => TypeKind::Float,
            TokenKind::KwString => TypeKind::String,
            TokenKind::KwVoid => TypeKind::Void,
            other => {
                return Err(ParseError {
                    message: format!("expected type, found {other:?}"),
                    line: self.line(),
                })
            }
        };
        self.advance();
        Ok(kind)
    }

    fn parse_pointer_stars(&mut self) -> u32 {
        let mut level = 0;
        while self.check(&TokenKind::Star) {
            self.advance();
            level += 1;
        }
        level
    }

    // ---- top level -------------------------------------------------

    fn parse_program(&mut self) -> PResult<Block> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::Eof) {
            statements.push(self.parse_decl()?);
        }
        Ok(Block::new(statements))
    }

    fn parse_decl(&mut self) -> PResult<Stmt> {
        let line = self.line();
        let is_const = if self.check(&TokenKind::KwConst) {
            self.advance();
            true
        } else {
            false
        };
        let kind = self.parse_type_kind()?;
        let pointer_level = self.parse_pointer_stars();
        let name = self.expect_ident()?;

        if self.check(&TokenKind::LParen) {
            return self.parse_func_decl(line, kind, pointer_level, name);
        }

        let ty = Type::pointer(kind, pointer_level, false);
        let init = if self.check(&TokenKind::Eq) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semi, "';'")?;
        Ok(Stmt::new(
            line,
            StmtKind::DeclVar {
                ty,
                name,
                is_const,
                init,
            },
        ))
    }

    fn parse_func_decl(
        &mut self,
        line: u32,
        kind: TypeKind,
        pointer_level: u32,
        name: String,
    ) -> PResult<Stmt> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let pkind = self.parse_type_kind()?;
                let plevel = self.parse_pointer_stars();
                let pname = self.expect_ident()?;
                params.push(Param {
                    ty: Type::pointer(pkind, plevel, false),
                    name: pname,
                });
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        let return_type = Type::pointer(kind, pointer_level, false);
        let body = if self.check(&TokenKind::Semi) {
            self.advance();
            None
        } else {
            Some(self.parse_block()?)
        };
        Ok(Stmt::new(
            line,
            StmtKind::DeclFunc {
                return_type,
                name,
                params,
                body,
            },
        ))
    }

    // ---- statements --------------------------------------------------

    fn parse_block(&mut self) -> PResult<Block> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            statements.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Block::new(statements))
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let label = self.try_parse_label();
        let mut stmt = self.parse_stmt_body()?;
        if let Some(label) = label {
            stmt = stmt.with_label(label);
        }
        Ok(stmt)
    }

    fn try_parse_label(&mut self) -> Option<String> {
        if let TokenKind::Ident(name) = self.peek().clone() {
            if matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Colon)) {
                self.advance();
                self.advance();
                return Some(name);
            }
        }
        None
    }

    fn parse_stmt_body(&mut self) -> PResult<Stmt> {
        let line = self.line();
        match self.peek() {
            TokenKind::LBrace => Ok(Stmt::new(line, StmtKind::Block(self.parse_block()?))),
            TokenKind::Semi => {
                self.advance();
                Ok(Stmt::new(line, StmtKind::Block(Block::new(Vec::new()))))
            }
            TokenKind::KwConst => {
                let decl = self.parse_decl()?;
                Ok(decl)
            }
            k if self.at_type_start_kind(k) => {
                let decl = self.parse_var_decl_stmt()?;
                Ok(decl)
            }
            TokenKind::KwIf => self.parse_if(line),
            TokenKind::KwWhile => self.parse_while(line),
            TokenKind::KwDo => self.parse_do_while(line),
            TokenKind::KwRepeat => self.parse_repeat_until(line),
            TokenKind::KwFor => self.parse_for(line),
            TokenKind::KwBreak => {
                self.advance();
                self.expect(TokenKind::Semi, "';'")?;
                Ok(Stmt::new(
                    line,
                    StmtKind::BreakContinue(BreakContinueKind::Break),
                ))
            }
            TokenKind::KwContinue => {
                self.advance();
                self.expect(TokenKind::Semi, "';'")?;
                Ok(Stmt::new(
                    line,
                    StmtKind::BreakContinue(BreakContinueKind::Continue),
                ))
            }
            TokenKind::KwReturn => {
                self.advance();
                let expr = if self.check(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semi, "';'")?;
                Ok(Stmt::new(line, StmtKind::Return(expr)))
            }
            TokenKind::KwGoto => {
                self.advance();
                let target = self.expect_ident()?;
                self.expect(TokenKind::Semi, "';'")?;
                Ok(Stmt::new(line, StmtKind::Goto(target)))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semi, "';'")?;
                Ok(Stmt::new(line, StmtKind::ExprStmt(expr)))
            }
        }
    }

    fn at_type_start_kind(&self, k: &TokenKind) -> bool {
        matches!(
            k,
            TokenKind::KwInt | TokenKind::KwBool | TokenKind::KwFloat | TokenKind::KwString
        )
    }

    fn parse_var_decl_stmt(&mut self) -> PResult<Stmt> {
        let line = self.line();
        let kind = self.parse_type_kind()?;
        let pointer_level = self.parse_pointer_stars();
        let name = self.expect_ident()?;
        let ty = Type::pointer(kind, pointer_level, false);
        let init = if self.check(&TokenKind::Eq) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semi, "';'")?;
        Ok(Stmt::new(
            line,
            StmtKind::DeclVar {
                ty,
                name,
                is_const: false,
                init,
            },
        ))
    }

    fn parse_if(&mut self, line: u32) -> PResult<Stmt> {
        self.advance();
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        let then = Box::new(self.parse_stmt()?);
        let els = if self.check(&TokenKind::KwElse) {
            self.advance();
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::new(line, StmtKind::If { cond, then, els }))
    }

    fn parse_while(&mut self, line: u32) -> PResult<Stmt> {
        self.advance();
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::new(
            line,
            StmtKind::While {
                cond,
                body,
                is_do_while: false,
                is_repeat_until: false,
            },
        ))
    }

    fn parse_do_while(&mut self, line: u32) -> PResult<Stmt> {
        self.advance();
        let body = Box::new(self.parse_stmt()?);
        self.expect(TokenKind::KwWhile, "'while'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::Semi, "';'")?;
        Ok(Stmt::new(
            line,
            StmtKind::While {
                cond,
                body,
                is_do_while: true,
                is_repeat_until: false,
            },
        ))
    }

    fn parse_repeat_until(&mut self, line: u32) -> PResult<Stmt> {
        self.advance();
        let body = Box::new(self.parse_stmt()?);
        self.expect(TokenKind::KwUntil, "'until'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::Semi, "';'")?;
        Ok(Stmt::new(
            line,
            StmtKind::While {
                cond,
                body,
                is_do_while: true,
                is_repeat_until: true,
            },
        ))
    }

    fn parse_for(&mut self, line: u32) -> PResult<Stmt> {
        self.advance();
        self.expect(TokenKind::LParen, "'('")?;
        let init = if self.check(&TokenKind::Semi) {
            self.advance();
            None
        } else if self.at_type_start_kind(self.peek()) {
            Some(Box::new(self.parse_var_decl_stmt()?))
        } else {
            let e = self.parse_expr()?;
            let l = e.line;
            self.expect(TokenKind::Semi, "';'")?;
            Some(Box::new(Stmt::new(l, StmtKind::ExprStmt(e))))
        };
        let cond = if self.check(&TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semi, "';'")?;
        let step = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::RParen, "')'")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::new(
            line,
            StmtKind::For {
                init,
                cond,
                step,
                body,
            },
        ))
    }

    // ---- expressions ---------------------------------------------------

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        let line = self.line();
        let lhs = self.parse_ternary()?;
        if self.check(&TokenKind::Eq) {
            self.advance();
            let rhs = Box::new(self.parse_assignment()?);
            return match lhs.kind {
                ExprKind::Identifier(name) => Ok(Expr::new(
                    line,
                    ExprKind::Assign {
                        name,
                        lvalue: None,
                        rhs,
                    },
                )),
                ExprKind::Deref(ref inner) => {
                    let name = what_do_i_dereference(inner)
                        .ok_or_else(|| ParseError {
                            message: "left side of assignment through '*' must dereference an identifier".into(),
                            line,
                        })?
                        .to_string();
                    Ok(Expr::new(
                        line,
                        ExprKind::Assign {
                            name,
                            lvalue: Some(Box::new(lhs)),
                            rhs,
                        },
                    ))
                }
                _ => Err(ParseError {
                    message: "invalid assignment target".into(),
                    line,
                }),
            };
        }
        Ok(lhs)
    }

    fn parse_ternary(&mut self) -> PResult<Expr> {
        let line = self.line();
        let cond = self.parse_logic_or()?;
        if self.check(&TokenKind::Question) {
            self.advance();
            let then = Box::new(self.parse_expr()?);
            self.expect(TokenKind::Colon, "':'")?;
            let els = Box::new(self.parse_assignment()?);
            return Ok(Expr::new(
                line,
                ExprKind::Ternary {
                    cond: Box::new(cond),
                    then,
                    els,
                },
            ));
        }
        Ok(cond)
    }

    fn parse_logic_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_logic_and()?;
        while self.check(&TokenKind::PipePipe) {
            let line = self.line();
            self.advance();
            let rhs = self.parse_logic_and()?;
            lhs = Expr::new(
                line,
                ExprKind::BinOp {
                    op: BinOpKind::Or,
                    left: Box::new(lhs),
                    right: Box::new(rhs),
                },
            );
        }
        Ok(lhs)
    }

    fn parse_logic_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.check(&TokenKind::AmpAmp) {
            let line = self.line();
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::new(
                line,
                ExprKind::BinOp {
                    op: BinOpKind::And,
                    left: Box::new(lhs),
                    right: Box::new(rhs),
                },
            );
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinOpKind::Eq,
                TokenKind::NotEq => BinOpKind::Neq,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::new(
                line,
                ExprKind::BinOp {
                    op,
                    left: Box::new(lhs),
                    right: Box::new(rhs),
                },
            );
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Lt => BinOpKind::Lt,
                TokenKind::Leq => BinOpKind::Leq,
                TokenKind::Gt => BinOpKind::Gt,
                TokenKind::Geq => BinOpKind::Geq,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::new(
                line,
                ExprKind::BinOp {
                    op,
                    left: Box::new(lhs),
                    right: Box::new(rhs),
                },
            );
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOpKind::Add,
                TokenKind::Minus => BinOpKind::Sub,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::new(
                line,
                ExprKind::BinOp {
                    op,
                    left: Box::new(lhs),
                    right: Box::new(rhs),
                },
            );
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOpKind::Mul,
                TokenKind::Slash => BinOpKind::Div,
                TokenKind::Percent => BinOpKind::Mod,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::new(
                line,
                ExprKind::BinOp {
                    op,
                    left: Box::new(lhs),
                    right: Box::new(rhs),
                },
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let line = self.line();
        match self.peek() {
            TokenKind::Bang => {
                self.advance();
                let operand = Box::new(self.parse_unary()?);
                Ok(Expr::new(line, ExprKind::UnOp { op: UnOpKind::Not, operand }))
            }
            TokenKind::Minus => {
                self.advance();
                let operand = Box::new(self.parse_unary()?);
                Ok(Expr::new(line, ExprKind::UnOp { op: UnOpKind::Neg, operand }))
            }
            TokenKind::Star => {
                self.advance();
                let operand = Box::new(self.parse_unary()?);
                Ok(Expr::new(line, ExprKind::Deref(operand)))
            }
            TokenKind::Amp => {
                self.advance();
                let name = self.expect_ident()?;
                Ok(Expr::new(line, ExprKind::AddrOf(name)))
            }
            TokenKind::LParen if self.at_cast_start() => {
                self.advance();
                let kind = self.parse_type_kind()?;
                let level = self.parse_pointer_stars();
                self.expect(TokenKind::RParen, "')'")?;
                let expr = Box::new(self.parse_unary()?);
                Ok(Expr::new(
                    line,
                    ExprKind::Cast {
                        target: Type::pointer(kind, level, false),
                        expr,
                    },
                ))
            }
            _ => self.parse_primary(),
        }
    }

    fn at_cast_start(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|t| &t.kind),
            Some(
                TokenKind::KwInt
                    | TokenKind::KwBool
                    | TokenKind::KwFloat
                    | TokenKind::KwString
                    | TokenKind::KwVoid
            )
        )
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let line = self.line();
        match self.peek().clone() {
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::new(line, ExprKind::IntLit(v)))
            }
            TokenKind::Float { whole, frac } => {
                self.advance();
                Ok(Expr::new(line, ExprKind::FloatLit { whole, frac }))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::new(line, ExprKind::StringLit(s)))
            }
            TokenKind::KwTrue => {
                self.advance();
                Ok(Expr::new(line, ExprKind::BoolLit(true)))
            }
            TokenKind::KwFalse => {
                self.advance();
                Ok(Expr::new(line, ExprKind::BoolLit(false)))
            }
            TokenKind::KwNew => {
                self.advance();
                let kind = self.parse_type_kind()?;
                let count = if self.check(&TokenKind::LBracket) {
                    self.advance();
                    let e = self.parse_expr()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    Some(Box::new(e))
                } else {
                    None
                };
                Ok(Expr::new(
                    line,
                    ExprKind::New {
                        ty: Type::pointer(kind, 1, false),
                        count,
                    },
                ))
            }
            TokenKind::KwDelete => {
                self.advance();
                let e = Box::new(self.parse_unary()?);
                Ok(Expr::new(line, ExprKind::Delete(e)))
            }
            TokenKind::KwSizeof => {
                self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                let kind = self.parse_type_kind()?;
                let level = self.parse_pointer_stars();
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr::new(
                    line,
                    ExprKind::SizeOf(Type::pointer(kind, level, false)),
                ))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.check(&TokenKind::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, "')'")?;
                    Ok(Expr::new(line, ExprKind::Call { name, args }))
                } else {
                    Ok(Expr::new(line, ExprKind::Identifier(name)))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let e = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(e)
            }
            other => Err(ParseError {
                message: format!("unexpected token {other:?} in expression"),
                line,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_main() {
        let block = Parser::parse_source("int main() { return 0; }").unwrap();
        assert_eq!(block.statements.len(), 1);
        match &block.statements[0].kind {
            StmtKind::DeclFunc { name, body, .. } => {
                assert_eq!(name, "main");
                assert!(body.is_some());
            }
            other => panic!("expected DeclFunc, got {other:?}"),
        }
    }

    #[test]
    fn parses_pointer_declaration_and_deref_assign() {
        let block =
            Parser::parse_source("int main(){ int a=1; int *p=&a; *p=5; return a; }").unwrap();
        let StmtKind::DeclFunc { body, .. } = &block.statements[0].kind else {
            panic!()
        };
        let body = body.as_ref().unwrap();
        assert_eq!(body.statements.len(), 4);
        match &body.statements[2].kind {
            StmtKind::ExprStmt(Expr {
                kind: ExprKind::Assign { name, lvalue, .. },
                ..
            }) => {
                assert_eq!(name, "p");
                assert!(lvalue.is_some());
            }
            other => panic!("expected deref assign, got {other:?}"),
        }
    }

    #[test]
    fn parses_label_and_goto() {
        let block = Parser::parse_source("int main(){ L: goto L; return 0; }").unwrap();
        let StmtKind::DeclFunc { body, .. } = &block.statements[0].kind else {
            panic!()
        };
        let body = body.as_ref().unwrap();
        assert_eq!(body.statements[0].label.as_deref(), Some("L"));
        assert!(matches!(body.statements[0].kind, StmtKind::Goto(_)));
    }

    #[test]
    fn parses_cast_expression() {
        let block = Parser::parse_source("int main(){ float f = (float)1; return 0; }").unwrap();
        let StmtKind::DeclFunc { body, .. } = &block.statements[0].kind else {
            panic!()
        };
        let body = body.as_ref().unwrap();
        match &body.statements[0].kind {
            StmtKind::DeclVar { init: Some(e), .. } => {
                assert!(matches!(e.kind, ExprKind::Cast { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
