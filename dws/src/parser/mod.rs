//! Recursive-descent parser
//!
//! Turns the token stream into a [`Program`]. Keywords arrive as dedicated
//! tokens; directive words (`virtual`, `read`, `helper`, ...) stay
//! identifiers and are recognized by context.

mod decl;
mod expr;
mod stmt;

#[cfg(test)]
mod tests;

use crate::ast::{Item, Program, Span, Spanned};
use crate::error::{CompileError, Result};
use crate::lexer::{tokenize, Token};
use std::mem::discriminant;

/// Parse a token stream into a program
pub fn parse(_filename: &str, source: &str, tokens: Vec<(Token, Span)>) -> Result<Program> {
    let mut parser = Parser::new(tokens, source.len());
    parser.parse_program()
}

/// Tokenize and parse in one step
pub fn parse_source(source: &str) -> Result<Program> {
    let tokens = tokenize(source)?;
    parse("<input>", source, tokens)
}

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    eof: Span,
    /// `old` is only an operator inside `ensure` clauses
    in_ensure: bool,
}

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>, source_len: usize) -> Self {
        let eof = tokens
            .last()
            .map(|(_, s)| Span::with_position(source_len, source_len, s.line, s.column + 1))
            .unwrap_or_else(|| Span::with_position(0, 0, 1, 1));
        Self {
            tokens,
            pos: 0,
            eof,
            in_ensure: false,
        }
    }

    // ---- token helpers ----

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    fn span(&self) -> Span {
        self.tokens.get(self.pos).map(|(_, s)| *s).unwrap_or(self.eof)
    }

    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|p| self.tokens.get(p))
            .map(|(_, s)| *s)
            .unwrap_or(self.eof)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn advance(&mut self) -> Option<(Token, Span)> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &Token) -> bool {
        self.peek()
            .is_some_and(|t| discriminant(t) == discriminant(kind))
    }

    fn check_at(&self, n: usize, kind: &Token) -> bool {
        self.peek_at(n)
            .is_some_and(|t| discriminant(t) == discriminant(kind))
    }

    fn check_word(&self, word: &str) -> bool {
        self.peek().is_some_and(|t| t.is_word(word))
    }

    fn check_ident(&self) -> bool {
        matches!(self.peek(), Some(Token::Ident(_)))
    }

    fn match_token(&mut self, kind: &Token) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn match_word(&mut self, word: &str) -> bool {
        if self.check_word(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &Token, what: &str) -> Result<Span> {
        if self.check(kind) {
            let span = self.span();
            self.pos += 1;
            Ok(span)
        } else {
            Err(self.error_expected(what))
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<Span> {
        if self.check_word(word) {
            let span = self.span();
            self.pos += 1;
            Ok(span)
        } else {
            Err(self.error_expected(&format!("'{word}'")))
        }
    }

    fn expect_ident(&mut self) -> Result<Spanned<String>> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let node = Spanned::new(name.clone(), self.span());
                self.pos += 1;
                Ok(node)
            }
            _ => Err(self.error_expected("identifier")),
        }
    }

    /// Identifier in a position where keywords are also valid names
    /// (member names after `.`)
    fn expect_member_name(&mut self) -> Result<Spanned<String>> {
        let span = self.span();
        let name = match self.peek() {
            Some(Token::Ident(name)) => name.clone(),
            Some(tok) if is_keyword(tok) => tok.to_string(),
            _ => return Err(self.error_expected("member name")),
        };
        self.pos += 1;
        Ok(Spanned::new(name, span))
    }

    fn error_expected(&self, what: &str) -> CompileError {
        let found = match self.peek() {
            Some(tok) => format!("'{tok}'"),
            None => "end of input".to_string(),
        };
        CompileError::parser(format!("expected {what}, found {found}"), self.span())
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::parser(message, self.span())
    }

    // ---- program ----

    pub fn parse_program(&mut self) -> Result<Program> {
        let mut program = Program::default();

        if self.match_token(&Token::Program) {
            let name = self.expect_ident()?;
            self.expect(&Token::Semi, "';'")?;
            program.name = Some(name.node);
        }

        while !self.at_end() {
            if self.match_token(&Token::Semi) {
                continue;
            }
            if self.check(&Token::Dot) && self.pos + 1 == self.tokens.len() {
                self.pos += 1;
                break;
            }
            self.parse_item(&mut program.items)?;
        }

        Ok(program)
    }

    fn parse_item(&mut self, items: &mut Vec<Item>) -> Result<()> {
        match self.peek() {
            Some(Token::Type) => {
                self.advance();
                for decl in self.parse_type_section()? {
                    items.push(Item::Type(decl));
                }
            }
            Some(Token::Var) => {
                self.advance();
                for (stmt, span) in self.parse_var_section()? {
                    items.push(Item::Stmt(Spanned::new(stmt, span)));
                }
            }
            Some(Token::Const) => {
                self.advance();
                for (stmt, span) in self.parse_const_section()? {
                    items.push(Item::Stmt(Spanned::new(stmt, span)));
                }
            }
            Some(Token::Procedure | Token::Function | Token::Constructor | Token::Destructor) => {
                items.push(Item::Routine(self.parse_routine(false, true)?));
            }
            Some(Token::Class)
                if matches!(self.peek_at(1), Some(Token::Procedure | Token::Function)) =>
            {
                self.advance();
                items.push(Item::Routine(self.parse_routine(true, true)?));
            }
            _ => {
                let stmt = self.parse_stmt()?;
                if !self.at_end() && !self.check(&Token::Dot) {
                    self.expect(&Token::Semi, "';'")?;
                }
                items.push(Item::Stmt(stmt));
            }
        }
        Ok(())
    }
}

fn is_keyword(tok: &Token) -> bool {
    !matches!(
        tok,
        Token::IntLit(_)
            | Token::FloatLit(_)
            | Token::StrLit(_)
            | Token::CharCode(_)
            | Token::Ident(_)
            | Token::Assign
            | Token::PlusAssign
            | Token::MinusAssign
            | Token::StarAssign
            | Token::SlashAssign
            | Token::Eq
            | Token::Ne
            | Token::Le
            | Token::Ge
            | Token::Lt
            | Token::Gt
            | Token::Plus
            | Token::Minus
            | Token::Star
            | Token::Slash
            | Token::FatArrow
            | Token::At
            | Token::LParen
            | Token::RParen
            | Token::LBracket
            | Token::RBracket
            | Token::Comma
            | Token::Semi
            | Token::Colon
            | Token::DotDot
            | Token::Dot
    )
}

/// Whether a statement list should stop before this token
fn ends_stmt_list(tok: Option<&Token>) -> bool {
    match tok {
        None => true,
        Some(tok) => {
            matches!(
                tok,
                Token::End | Token::Until | Token::Except | Token::Finally | Token::Else
            ) || tok.is_word("ensure")
        }
    }
}
