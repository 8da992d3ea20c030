//! Abstract Syntax Tree definitions

mod expr;
mod span;
mod stmt;
mod types;

pub use expr::*;
pub use span::*;
pub use stmt::*;
pub use types::*;

use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// A program is a sequence of declarations and statements, executed in order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Program {
    pub name: Option<String>,
    pub items: Vec<Item>,
}

/// Top-level item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Item {
    Type(TypeDecl),
    Routine(Rc<RoutineDecl>),
    Stmt(Spanned<Stmt>),
}

/// Procedure, function, method, constructor, destructor or lambda
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineDecl {
    pub name: Spanned<String>,
    /// `TFoo` in `procedure TFoo.Bar;`
    pub owner: Option<Spanned<String>>,
    pub kind: RoutineKind,
    /// `class procedure` / `class function`
    pub is_class: bool,
    pub params: Vec<Param>,
    pub ret_ty: Option<TypeRef>,
    pub directives: Directives,
    pub require: Vec<Contract>,
    pub ensure: Vec<Contract>,
    pub body: Option<Body>,
    pub span: Span,
}

impl RoutineDecl {
    /// Number of parameters without default values
    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }

    pub fn accepts_arg_count(&self, count: usize) -> bool {
        count >= self.required_params() && count <= self.params.len()
    }

    pub fn is_function(&self) -> bool {
        self.ret_ty.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutineKind {
    Procedure,
    Function,
    Constructor,
    Destructor,
    Lambda,
}

/// Method directives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directives {
    pub is_virtual: bool,
    pub is_override: bool,
    pub is_abstract: bool,
    pub is_overload: bool,
    pub is_reintroduce: bool,
    pub is_static: bool,
    pub is_forward: bool,
}

/// `require`/`ensure` clause
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub cond: Spanned<Expr>,
    pub message: Option<Spanned<Expr>>,
}

/// Routine body: nested routines plus statements (local `var`/`const`
/// sections become leading statements)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Body {
    pub nested: Vec<Rc<RoutineDecl>>,
    pub stmts: Vec<Spanned<Stmt>>,
}

/// Routine parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: Spanned<String>,
    pub ty: Option<TypeRef>,
    pub mode: ParamMode,
    pub default: Option<Spanned<Expr>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamMode {
    Value,
    Const,
    Var,
    Out,
    Lazy,
}

impl ParamMode {
    /// Whether the argument must be a caller-side variable
    pub fn is_by_ref(self) -> bool {
        matches!(self, ParamMode::Var | ParamMode::Out)
    }
}

/// `Name = <type definition>;`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: Spanned<String>,
    pub kind: TypeDeclKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeDeclKind {
    Class(ClassDecl),
    Interface(InterfaceDecl),
    Record(RecordDecl),
    Helper(HelperDecl),
    Enum(EnumDecl),
    Alias(TypeRef),
}

/// `(A, B = 5, C)`, `enum (..)` or `flags (..)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDecl {
    pub kind: EnumKind,
    pub members: Vec<EnumMember>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnumKind {
    /// Members are also visible as bare names
    Plain,
    /// Members only reachable as `TEnum.Member`
    Scoped,
    /// Scoped, with implicit values doubling from 1
    Flags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: Spanned<String>,
    pub value: Option<Spanned<Expr>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassDecl {
    pub parent: Option<Spanned<String>>,
    pub interfaces: Vec<Spanned<String>>,
    pub is_abstract: bool,
    pub is_external: bool,
    /// `TFoo = class;`
    pub is_forward: bool,
    pub members: Vec<Member>,
}

/// Member of a class, record or helper body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Member {
    Field(FieldDecl),
    Method(Rc<RoutineDecl>),
    Property(PropertyDecl),
    Const(ConstDecl),
}

/// Field or `class var`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDecl {
    pub names: Vec<Spanned<String>>,
    pub ty: Option<TypeRef>,
    pub init: Option<Spanned<Expr>>,
    pub is_class: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: Spanned<String>,
    pub index_params: Vec<Param>,
    pub ty: TypeRef,
    pub read: Option<Spanned<String>>,
    pub write: Option<Spanned<String>>,
    pub is_class: bool,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceDecl {
    pub parent: Option<Spanned<String>>,
    pub methods: Vec<Rc<RoutineDecl>>,
    pub properties: Vec<PropertyDecl>,
    pub is_forward: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordDecl {
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelperDecl {
    pub target: TypeRef,
    pub parent: Option<Spanned<String>>,
    pub members: Vec<Member>,
}
