//! Expressions, lowest precedence first:
//! relational (`= <> < > <= >= in is implements`), additive
//! (`+ - or xor`), multiplicative (`* / div mod and shl shr as`), unary.

use super::Parser;
use crate::ast::*;
use crate::error::Result;
use crate::lexer::Token;
use std::rc::Rc;

impl Parser {
    pub(super) fn parse_expr(&mut self) -> Result<Spanned<Expr>> {
        if self.check(&Token::If) {
            return self.parse_if_expr();
        }
        self.parse_relational()
    }

    fn parse_if_expr(&mut self) -> Result<Spanned<Expr>> {
        let start = self.expect(&Token::If, "'if'")?;
        let cond = self.parse_expr()?;
        self.expect(&Token::Then, "'then'")?;
        let then_expr = self.parse_expr()?;
        self.expect(&Token::Else, "'else'")?;
        let else_expr = self.parse_expr()?;
        let span = start.merge(else_expr.span);
        Ok(Spanned::new(
            Expr::IfExpr {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    fn parse_relational(&mut self) -> Result<Spanned<Expr>> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinOp::Eq,
                Some(Token::Ne) => BinOp::Ne,
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::Le) => BinOp::Le,
                Some(Token::Ge) => BinOp::Ge,
                Some(Token::In) => BinOp::In,
                Some(Token::Is) => {
                    self.advance();
                    left = self.parse_is(left)?;
                    continue;
                }
                Some(Token::Implements) => {
                    self.advance();
                    let target = self.expect_ident()?;
                    let span = left.span.merge(target.span);
                    left = Spanned::new(
                        Expr::Implements {
                            expr: Box::new(left),
                            target,
                        },
                        span,
                    );
                    continue;
                }
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    /// Right side of `is`: a type name, or a value for the truthiness form
    fn parse_is(&mut self, left: Spanned<Expr>) -> Result<Spanned<Expr>> {
        let target = match self.peek() {
            Some(Token::Ident(_)) if !self.check_at(1, &Token::LParen) && !self.check_at(1, &Token::Dot) => {
                IsTarget::Type(self.expect_ident()?)
            }
            _ => IsTarget::Value(Box::new(self.parse_additive()?)),
        };
        let span = left.span.merge(self.prev_span());
        Ok(Spanned::new(
            Expr::Is {
                expr: Box::new(left),
                target,
            },
            span,
        ))
    }

    fn parse_additive(&mut self) -> Result<Spanned<Expr>> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                Some(Token::Or) => BinOp::Or,
                Some(Token::Xor) => BinOp::Xor,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Spanned<Expr>> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Div) => BinOp::IntDiv,
                Some(Token::Mod) => BinOp::Mod,
                Some(Token::And) => BinOp::And,
                Some(Token::Shl) => BinOp::Shl,
                Some(Token::Shr) => BinOp::Shr,
                Some(Token::As) => {
                    self.advance();
                    let target = self.expect_ident()?;
                    let span = left.span.merge(target.span);
                    left = Spanned::new(
                        Expr::As {
                            expr: Box::new(left),
                            target,
                        },
                        span,
                    );
                    continue;
                }
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Spanned<Expr>> {
        let start = self.span();
        let op = match self.peek() {
            Some(Token::Not) => UnOp::Not,
            Some(Token::Minus) => UnOp::Neg,
            Some(Token::Plus) => UnOp::Plus,
            Some(Token::At) => {
                self.advance();
                let target = self.parse_postfix()?;
                let span = start.merge(target.span);
                return Ok(Spanned::new(Expr::AddressOf(Box::new(target)), span));
            }
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        let span = start.merge(operand.span);

        // fold negative literals so `-9223372036854775808`-style bounds stay literal
        let node = match (op, &operand.node) {
            (UnOp::Neg, Expr::IntLit(n)) => Expr::IntLit(n.wrapping_neg()),
            (UnOp::Neg, Expr::FloatLit(x)) => Expr::FloatLit(-x),
            _ => Expr::Unary {
                op,
                expr: Box::new(operand),
            },
        };
        Ok(Spanned::new(node, span))
    }

    fn parse_postfix(&mut self) -> Result<Spanned<Expr>> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let member = self.expect_member_name()?;
                    let span = expr.span.merge(member.span);
                    expr = Spanned::new(
                        Expr::Member {
                            object: Box::new(expr),
                            member,
                        },
                        span,
                    );
                }
                Some(Token::LParen) => {
                    let args = self.parse_args()?;
                    let span = expr.span.merge(self.prev_span());
                    expr = Spanned::new(
                        Expr::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let mut indices = vec![self.parse_expr()?];
                    while self.match_token(&Token::Comma) {
                        indices.push(self.parse_expr()?);
                    }
                    self.expect(&Token::RBracket, "']'")?;
                    let span = expr.span.merge(self.prev_span());
                    expr = Spanned::new(
                        Expr::Index {
                            object: Box::new(expr),
                            indices,
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// `(a, b, c)` including the parentheses
    pub(super) fn parse_args(&mut self) -> Result<Vec<Spanned<Expr>>> {
        self.expect(&Token::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "')'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Spanned<Expr>> {
        let start = self.span();
        let Some(tok) = self.peek().cloned() else {
            return Err(self.error_expected("expression"));
        };

        let node = match tok {
            Token::IntLit(n) => {
                self.advance();
                Expr::IntLit(n)
            }
            Token::FloatLit(x) => {
                self.advance();
                Expr::FloatLit(x)
            }
            Token::StrLit(_) | Token::CharCode(_) => Expr::StrLit(self.parse_string()?),
            Token::True => {
                self.advance();
                Expr::BoolLit(true)
            }
            Token::False => {
                self.advance();
                Expr::BoolLit(false)
            }
            Token::Nil => {
                self.advance();
                Expr::Nil
            }
            Token::SelfKw => {
                self.advance();
                Expr::SelfRef
            }
            Token::Ident(name) => {
                self.advance();
                if self.in_ensure && name.eq_ignore_ascii_case("old") && !self.check(&Token::LParen) {
                    Expr::Old(self.expect_ident()?)
                } else if self.in_ensure && name.eq_ignore_ascii_case("old") {
                    self.advance();
                    let target = self.expect_ident()?;
                    self.expect(&Token::RParen, "')'")?;
                    Expr::Old(target)
                } else {
                    Expr::Ident(name)
                }
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                return Ok(Spanned::new(inner.node, start.merge(self.prev_span())));
            }
            Token::LBracket => {
                self.advance();
                let mut elems = Vec::new();
                if !self.check(&Token::RBracket) {
                    loop {
                        let low = self.parse_expr()?;
                        if self.match_token(&Token::DotDot) {
                            let high = self.parse_expr()?;
                            let span = low.span.merge(high.span);
                            elems.push(Spanned::new(
                                Expr::Range {
                                    low: Box::new(low),
                                    high: Box::new(high),
                                },
                                span,
                            ));
                        } else {
                            elems.push(low);
                        }
                        if !self.match_token(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&Token::RBracket, "']'")?;
                Expr::ArrayLit(elems)
            }
            Token::Inherited => {
                self.advance();
                let method = if self.check_ident() {
                    Some(self.expect_ident()?)
                } else {
                    None
                };
                let has_parens = self.check(&Token::LParen);
                let args = if has_parens { self.parse_args()? } else { Vec::new() };
                Expr::Inherited {
                    method,
                    args,
                    has_parens,
                }
            }
            Token::New => {
                self.advance();
                let class = self.expect_ident()?;
                let args = if self.check(&Token::LParen) {
                    self.parse_args()?
                } else {
                    Vec::new()
                };
                Expr::New { class, args }
            }
            Token::Lambda => Expr::Lambda(self.parse_lambda()?),
            Token::Function | Token::Procedure => Expr::Lambda(self.parse_anonymous_routine()?),
            _ => return Err(self.error_expected("expression")),
        };
        Ok(Spanned::new(node, start.merge(self.prev_span())))
    }

    /// Adjacent string literals and `#nn` codes form one string
    fn parse_string(&mut self) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.peek() {
                Some(Token::StrLit(s)) => out.push_str(s),
                Some(Token::CharCode(code)) => match char::from_u32(*code) {
                    Some(c) => out.push(c),
                    None => return Err(self.error(format!("invalid character code #{code}"))),
                },
                _ => break,
            }
            self.advance();
        }
        Ok(out)
    }

    /// `lambda (a, b: Integer): Integer => expr` or with a `begin ... end` body
    fn parse_lambda(&mut self) -> Result<Rc<RoutineDecl>> {
        let start = self.expect(&Token::Lambda, "'lambda'")?;
        let params = if self.check(&Token::LParen) {
            self.parse_params()?
        } else {
            Vec::new()
        };
        let ret_ty = if self.match_token(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = if self.match_token(&Token::FatArrow) {
            let value = self.parse_expr()?;
            let span = value.span;
            Body {
                nested: Vec::new(),
                stmts: vec![Spanned::new(Stmt::Exit(Some(value)), span)],
            }
        } else {
            self.parse_anonymous_body()?
        };

        Ok(Rc::new(anonymous(params, ret_ty, body, start.merge(self.prev_span()))))
    }

    /// `function (x: Integer): Integer begin ... end`
    fn parse_anonymous_routine(&mut self) -> Result<Rc<RoutineDecl>> {
        let start = self.span();
        let is_function = self.check(&Token::Function);
        self.advance();
        let params = if self.check(&Token::LParen) {
            self.parse_params()?
        } else {
            Vec::new()
        };
        let ret_ty = if is_function {
            self.expect(&Token::Colon, "':'")?;
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_anonymous_body()?;
        Ok(Rc::new(anonymous(params, ret_ty, body, start.merge(self.prev_span()))))
    }
}

fn binary(left: Spanned<Expr>, op: BinOp, right: Spanned<Expr>) -> Spanned<Expr> {
    let span = left.span.merge(right.span);
    Spanned::new(
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}

fn anonymous(params: Vec<Param>, ret_ty: Option<TypeRef>, body: Body, span: Span) -> RoutineDecl {
    RoutineDecl {
        name: Spanned::new("<lambda>".to_string(), span),
        owner: None,
        kind: RoutineKind::Lambda,
        is_class: false,
        params,
        ret_ty,
        directives: Directives::default(),
        require: Vec::new(),
        ensure: Vec::new(),
        body: Some(body),
        span,
    }
}
