//! Type annotations

use super::{Expr, Param, Spanned};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A type as written in the source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeRef {
    /// Integer, String, TFoo, IBar, ...
    Named(String),
    /// `array of T` or `array[lo..hi] of T`
    Array {
        bounds: Option<(Box<Spanned<Expr>>, Box<Spanned<Expr>>)>,
        elem: Box<TypeRef>,
    },
    /// `set of T`
    Set(Box<TypeRef>),
    /// `class of T`
    ClassOf(String),
    /// `function(...): T [of object]` / `procedure(...) [of object]`
    Routine {
        params: Vec<Param>,
        ret: Option<Box<TypeRef>>,
        of_object: bool,
    },
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    /// Name of a plain named type
    pub fn as_name(&self) -> Option<&str> {
        match self {
            TypeRef::Named(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{name}"),
            TypeRef::Array { bounds: None, elem } => write!(f, "array of {elem}"),
            TypeRef::Array { bounds: Some(_), elem } => write!(f, "array[] of {elem}"),
            TypeRef::Set(elem) => write!(f, "set of {elem}"),
            TypeRef::ClassOf(name) => write!(f, "class of {name}"),
            TypeRef::Routine { ret: Some(ret), .. } => write!(f, "function: {ret}"),
            TypeRef::Routine { ret: None, .. } => write!(f, "procedure"),
        }
    }
}
