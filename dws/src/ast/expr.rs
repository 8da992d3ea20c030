//! Expressions

use super::{RoutineDecl, Spanned};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    IntLit(i64),
    FloatLit(f64),
    StrLit(String),
    BoolLit(bool),
    Nil,

    /// Variable, routine, constant or type name
    Ident(String),

    /// `Self`
    SelfRef,

    Binary {
        left: Box<Spanned<Expr>>,
        op: BinOp,
        right: Box<Spanned<Expr>>,
    },

    Unary {
        op: UnOp,
        expr: Box<Spanned<Expr>>,
    },

    /// `callee(args)`; the callee may be a name, a member access or any
    /// expression producing a function pointer
    Call {
        callee: Box<Spanned<Expr>>,
        args: Vec<Spanned<Expr>>,
    },

    /// `object.member`
    Member {
        object: Box<Spanned<Expr>>,
        member: Spanned<String>,
    },

    /// `object[i, j]`
    Index {
        object: Box<Spanned<Expr>>,
        indices: Vec<Spanned<Expr>>,
    },

    /// `[a, b, c]` (array or set literal)
    ArrayLit(Vec<Spanned<Expr>>),

    /// `lo..hi` inside a set literal
    Range {
        low: Box<Spanned<Expr>>,
        high: Box<Spanned<Expr>>,
    },

    /// `expr is TFoo` or `expr is True`
    Is {
        expr: Box<Spanned<Expr>>,
        target: IsTarget,
    },

    /// `expr as TFoo`
    As {
        expr: Box<Spanned<Expr>>,
        target: Spanned<String>,
    },

    /// `expr implements IFoo`
    Implements {
        expr: Box<Spanned<Expr>>,
        target: Spanned<String>,
    },

    /// `inherited [Name][(args)]`
    Inherited {
        method: Option<Spanned<String>>,
        args: Vec<Spanned<Expr>>,
        has_parens: bool,
    },

    /// `new TFoo(args)`
    New {
        class: Spanned<String>,
        args: Vec<Spanned<Expr>>,
    },

    /// `lambda (...) => expr`, `function (...) begin ... end`
    Lambda(Rc<RoutineDecl>),

    /// `@Routine`, `@obj.Method`
    AddressOf(Box<Spanned<Expr>>),

    /// `if c then a else b` used as a value
    IfExpr {
        cond: Box<Spanned<Expr>>,
        then_expr: Box<Spanned<Expr>>,
        else_expr: Box<Spanned<Expr>>,
    },

    /// `old Name` inside an `ensure` clause
    Old(Spanned<String>),
}

/// Right-hand side of `is`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IsTarget {
    /// Type test against a class or interface name
    Type(Spanned<String>),
    /// Truthiness comparison (`x is True`)
    Value(Box<Spanned<Expr>>),
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// `/` (always real division)
    Div,
    /// `div`
    IntDiv,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::IntDiv => "div",
            BinOp::Mod => "mod",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
            BinOp::Eq => "=",
            BinOp::Ne => "<>",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::In => "in",
        };
        write!(f, "{s}")
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Plus,
    Not,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnOp::Neg => write!(f, "-"),
            UnOp::Plus => write!(f, "+"),
            UnOp::Not => write!(f, "not"),
        }
    }
}
