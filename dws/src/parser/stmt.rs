//! Statements

use super::{ends_stmt_list, Parser};
use crate::ast::*;
use crate::error::Result;
use crate::lexer::Token;

impl Parser {
    /// `stmt; stmt; ...` up to a closing keyword
    pub(super) fn parse_stmt_list(&mut self) -> Result<Vec<Spanned<Stmt>>> {
        let mut stmts = Vec::new();
        loop {
            while self.match_token(&Token::Semi) {}
            if ends_stmt_list(self.peek()) {
                break;
            }
            stmts.push(self.parse_stmt()?);
            if self.match_token(&Token::Semi) {
                continue;
            }
            if ends_stmt_list(self.peek()) {
                break;
            }
            return Err(self.error_expected("';'"));
        }
        Ok(stmts)
    }

    pub(super) fn parse_stmt(&mut self) -> Result<Spanned<Stmt>> {
        let start = self.span();
        let stmt = match self.peek() {
            Some(Token::Begin) => {
                self.advance();
                let stmts = self.parse_stmt_list()?;
                self.expect(&Token::End, "'end'")?;
                Stmt::Block(stmts)
            }
            Some(Token::If) => self.parse_if()?,
            Some(Token::While) => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect(&Token::Do, "'do'")?;
                let body = Box::new(self.parse_body_stmt()?);
                Stmt::While { cond, body }
            }
            Some(Token::Repeat) => {
                self.advance();
                let body = self.parse_stmt_list()?;
                self.expect(&Token::Until, "'until'")?;
                let cond = self.parse_expr()?;
                Stmt::Repeat { body, cond }
            }
            Some(Token::For) => self.parse_for()?,
            Some(Token::Case) => self.parse_case()?,
            Some(Token::Try) => self.parse_try()?,
            Some(Token::Raise) => {
                self.advance();
                if self.at_stmt_end() {
                    Stmt::Raise(None)
                } else {
                    Stmt::Raise(Some(self.parse_expr()?))
                }
            }
            Some(Token::Exit) => {
                self.advance();
                if self.at_stmt_end() {
                    Stmt::Exit(None)
                } else {
                    Stmt::Exit(Some(self.parse_expr()?))
                }
            }
            Some(Token::Break) => {
                self.advance();
                Stmt::Break
            }
            Some(Token::Continue) => {
                self.advance();
                Stmt::Continue
            }
            Some(Token::Var) => {
                self.advance();
                Stmt::Var(self.parse_var_decl()?)
            }
            Some(Token::Const) => {
                self.advance();
                Stmt::Const(self.parse_const_decl()?)
            }
            _ => {
                let target = self.parse_expr()?;
                let op = match self.peek() {
                    Some(Token::Assign) => Some(AssignOp::Assign),
                    Some(Token::PlusAssign) => Some(AssignOp::Add),
                    Some(Token::MinusAssign) => Some(AssignOp::Sub),
                    Some(Token::StarAssign) => Some(AssignOp::Mul),
                    Some(Token::SlashAssign) => Some(AssignOp::Div),
                    _ => None,
                };
                match op {
                    Some(op) => {
                        self.advance();
                        let value = self.parse_expr()?;
                        Stmt::Assign { target, op, value }
                    }
                    None => Stmt::Expr(target),
                }
            }
        };
        Ok(Spanned::new(stmt, start.merge(self.prev_span())))
    }

    fn at_stmt_end(&self) -> bool {
        self.check(&Token::Semi) || super::ends_stmt_list(self.peek())
    }

    /// Body of `do`/`then`/`else`: a single statement, possibly empty
    fn parse_body_stmt(&mut self) -> Result<Spanned<Stmt>> {
        if self.check(&Token::Semi) || ends_stmt_list(self.peek()) {
            return Ok(Spanned::new(Stmt::Block(Vec::new()), self.span()));
        }
        self.parse_stmt()
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        self.expect(&Token::If, "'if'")?;
        let cond = self.parse_expr()?;
        self.expect(&Token::Then, "'then'")?;
        let then_branch = Box::new(self.parse_body_stmt()?);
        let else_branch = if self.match_token(&Token::Else) {
            Some(Box::new(self.parse_body_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        self.expect(&Token::For, "'for'")?;
        let declare = self.match_token(&Token::Var);
        let var = self.expect_ident()?;

        if self.match_token(&Token::In) {
            let collection = self.parse_expr()?;
            self.expect(&Token::Do, "'do'")?;
            let body = Box::new(self.parse_body_stmt()?);
            return Ok(Stmt::ForIn {
                var,
                declare,
                collection,
                body,
            });
        }

        self.expect(&Token::Assign, "':='")?;
        let start = self.parse_expr()?;
        let descending = match self.peek() {
            Some(Token::To) => false,
            Some(Token::Downto) => true,
            _ => return Err(self.error_expected("'to' or 'downto'")),
        };
        self.advance();
        let end = self.parse_expr()?;
        let step = if self.match_word("step") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(&Token::Do, "'do'")?;
        let body = Box::new(self.parse_body_stmt()?);
        Ok(Stmt::For {
            var,
            declare,
            start,
            end,
            descending,
            step,
            body,
        })
    }

    fn parse_case(&mut self) -> Result<Stmt> {
        self.expect(&Token::Case, "'case'")?;
        let subject = self.parse_expr()?;
        self.expect(&Token::Of, "'of'")?;

        let mut branches = Vec::new();
        let mut else_branch = None;
        loop {
            while self.match_token(&Token::Semi) {}
            if self.check(&Token::End) {
                break;
            }
            if self.match_token(&Token::Else) {
                else_branch = Some(self.parse_stmt_list()?);
                break;
            }

            let mut labels = Vec::new();
            loop {
                let low = self.parse_expr()?;
                if self.match_token(&Token::DotDot) {
                    let high = self.parse_expr()?;
                    labels.push(CaseLabel::Range(low, high));
                } else {
                    labels.push(CaseLabel::Value(low));
                }
                if !self.match_token(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::Colon, "':'")?;
            let body = Box::new(self.parse_body_stmt()?);
            branches.push(CaseBranch { labels, body });

            if !self.match_token(&Token::Semi) && !self.check(&Token::End) && !self.check(&Token::Else) {
                return Err(self.error_expected("';'"));
            }
        }
        self.expect(&Token::End, "'end'")?;
        Ok(Stmt::Case {
            subject,
            branches,
            else_branch,
        })
    }

    fn parse_try(&mut self) -> Result<Stmt> {
        self.expect(&Token::Try, "'try'")?;
        let body = self.parse_stmt_list()?;

        let except = if self.match_token(&Token::Except) {
            Some(self.parse_except_block()?)
        } else {
            None
        };
        let finally = if self.match_token(&Token::Finally) {
            Some(self.parse_stmt_list()?)
        } else {
            None
        };
        if except.is_none() && finally.is_none() {
            return Err(self.error_expected("'except' or 'finally'"));
        }
        self.expect(&Token::End, "'end'")?;
        Ok(Stmt::Try {
            body,
            except,
            finally,
        })
    }

    fn parse_except_block(&mut self) -> Result<ExceptBlock> {
        if !self.check(&Token::On) {
            return Ok(ExceptBlock::CatchAll(self.parse_stmt_list()?));
        }

        let mut handlers = Vec::new();
        while self.match_token(&Token::On) {
            let first = self.expect_ident()?;
            let (var, class) = if self.match_token(&Token::Colon) {
                (Some(first), self.expect_ident()?)
            } else {
                (None, first)
            };
            self.expect(&Token::Do, "'do'")?;
            let body = Box::new(self.parse_body_stmt()?);
            handlers.push(ExceptHandler { var, class, body });
            while self.match_token(&Token::Semi) {}
        }

        let else_body = if self.match_token(&Token::Else) {
            Some(self.parse_stmt_list()?)
        } else {
            None
        };
        Ok(ExceptBlock::Handlers {
            handlers,
            else_body,
        })
    }
}
