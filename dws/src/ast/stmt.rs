//! Statements

use super::{Expr, Spanned, TypeRef};
use serde::{Deserialize, Serialize};

/// Statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    /// Expression evaluated for its side effects (usually a call)
    Expr(Spanned<Expr>),

    /// `target := value`, `target += value`, ...
    Assign {
        target: Spanned<Expr>,
        op: AssignOp,
        value: Spanned<Expr>,
    },

    /// `var a, b: T := init;`
    Var(VarDecl),

    /// `const N = 10;`
    Const(ConstDecl),

    /// `begin ... end`
    Block(Vec<Spanned<Stmt>>),

    If {
        cond: Spanned<Expr>,
        then_branch: Box<Spanned<Stmt>>,
        else_branch: Option<Box<Spanned<Stmt>>>,
    },

    While {
        cond: Spanned<Expr>,
        body: Box<Spanned<Stmt>>,
    },

    Repeat {
        body: Vec<Spanned<Stmt>>,
        cond: Spanned<Expr>,
    },

    For {
        var: Spanned<String>,
        /// `for var i := ...` declares the loop variable in a fresh scope
        declare: bool,
        start: Spanned<Expr>,
        end: Spanned<Expr>,
        descending: bool,
        step: Option<Spanned<Expr>>,
        body: Box<Spanned<Stmt>>,
    },

    ForIn {
        var: Spanned<String>,
        declare: bool,
        collection: Spanned<Expr>,
        body: Box<Spanned<Stmt>>,
    },

    Case {
        subject: Spanned<Expr>,
        branches: Vec<CaseBranch>,
        else_branch: Option<Vec<Spanned<Stmt>>>,
    },

    Try {
        body: Vec<Spanned<Stmt>>,
        except: Option<ExceptBlock>,
        finally: Option<Vec<Spanned<Stmt>>>,
    },

    /// `raise [expr]`
    Raise(Option<Spanned<Expr>>),

    /// `exit [value]`
    Exit(Option<Spanned<Expr>>),

    Break,
    Continue,
}

/// Assignment operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
}

/// Variable declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDecl {
    pub names: Vec<Spanned<String>>,
    pub ty: Option<TypeRef>,
    pub init: Option<Spanned<Expr>>,
}

/// Constant declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstDecl {
    pub name: Spanned<String>,
    pub ty: Option<TypeRef>,
    pub value: Spanned<Expr>,
}

/// One `case` arm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseBranch {
    pub labels: Vec<CaseLabel>,
    pub body: Box<Spanned<Stmt>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CaseLabel {
    Value(Spanned<Expr>),
    Range(Spanned<Expr>, Spanned<Expr>),
}

/// The `except` part of a `try` statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExceptBlock {
    /// `on E: T do ...` handlers with an optional `else`
    Handlers {
        handlers: Vec<ExceptHandler>,
        else_body: Option<Vec<Spanned<Stmt>>>,
    },
    /// Bare statements: catch everything
    CatchAll(Vec<Spanned<Stmt>>),
}

/// `on E: EFoo do stmt`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptHandler {
    pub var: Option<Spanned<String>>,
    pub class: Spanned<String>,
    pub body: Box<Spanned<Stmt>>,
}
