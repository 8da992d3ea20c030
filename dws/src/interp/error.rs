//! Runtime errors for the interpreter
//!
//! Two channels share one `Result`: hard errors (malformed program state,
//! never catchable by script code) and raised script exceptions carrying
//! an exception object. Loop and routine exits travel the same way.

use super::value::ObjectRef;
use crate::ast::Span;
use std::fmt;

/// Runtime error during interpretation
#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<Span>,
}

/// Kinds of runtime errors
#[derive(Debug, Clone)]
pub enum ErrorKind {
    /// Undefined variable
    UndefinedVariable,
    /// Undefined function
    UndefinedFunction,
    /// Type mismatch
    TypeError,
    /// Division by zero
    DivisionByZero,
    /// Argument count mismatch
    ArityMismatch,
    /// Index out of bounds
    IndexOutOfBounds,
    /// Non-variable passed to a `var` parameter
    VarParamRequired,
    /// Construction of an abstract class
    AbstractInstantiation,
    /// Construction of an external class
    ExternalClass,
    /// More than one overload fits equally well
    AmbiguousCall,
    /// No overload accepts the arguments
    NoMatchingOverload,
    /// Unresolvable type name
    UnknownType,
    /// Operation not valid for its operands
    InvalidOperation,
    /// Script exception (catchable by `try..except`)
    Exception(Box<ExceptionValue>),
    /// Control flow: break from loop
    Break,
    /// Control flow: continue to next loop iteration
    Continue,
    /// Control flow: leave the current routine
    Exit,
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        // Compare discriminants only; the exception payload is not part of
        // the kind's identity
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// A raised script exception
#[derive(Debug, Clone)]
pub struct ExceptionValue {
    /// The exception instance (`E` in `on E: Exception do`)
    pub object: ObjectRef,
    pub class_name: String,
    pub message: String,
    /// Where it was raised
    pub span: Span,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
            span: None,
        }
    }

    /// Attach a source position unless one is already set
    pub fn at(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    pub fn undefined_variable(name: &str) -> Self {
        Self::new(ErrorKind::UndefinedVariable, format!("Unknown name \"{name}\""))
    }

    pub fn undefined_function(name: &str) -> Self {
        Self::new(ErrorKind::UndefinedFunction, format!("function '{name}' not found"))
    }

    pub fn type_error(expected: &str, got: &str) -> Self {
        Self::new(ErrorKind::TypeError, format!("type error: expected {expected}, got {got}"))
    }

    pub fn division_by_zero() -> Self {
        Self::new(ErrorKind::DivisionByZero, "division by zero")
    }

    pub fn arity_mismatch(name: &str, expected: usize, got: usize) -> Self {
        Self::new(
            ErrorKind::ArityMismatch,
            format!("function {name} expects {expected} argument(s), got {got}"),
        )
    }

    pub fn index_out_of_bounds(index: i64, low: i64, high: i64) -> Self {
        Self::new(
            ErrorKind::IndexOutOfBounds,
            format!("index {index} out of bounds [{low}..{high}]"),
        )
    }

    pub fn var_param_required(param: &str) -> Self {
        Self::new(
            ErrorKind::VarParamRequired,
            format!("var parameter requires a variable (parameter \"{param}\")"),
        )
    }

    pub fn abstract_instantiation(class: &str) -> Self {
        Self::new(
            ErrorKind::AbstractInstantiation,
            format!("cannot create instance of abstract class \"{class}\""),
        )
    }

    pub fn external_class(class: &str) -> Self {
        Self::new(
            ErrorKind::ExternalClass,
            format!("cannot create instance of external class \"{class}\""),
        )
    }

    pub fn ambiguous_call(name: &str) -> Self {
        Self::new(ErrorKind::AmbiguousCall, format!("ambiguous overloaded call to \"{name}\""))
    }

    pub fn no_matching_overload(name: &str) -> Self {
        Self::new(
            ErrorKind::NoMatchingOverload,
            format!("there is no overloaded version of \"{name}\" that can be called with these arguments"),
        )
    }

    pub fn unknown_type(name: &str) -> Self {
        Self::new(ErrorKind::UnknownType, format!("unknown type \"{name}\""))
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOperation, msg)
    }

    pub fn exception(value: ExceptionValue) -> Self {
        let message = value.message.clone();
        let span = value.span;
        RuntimeError {
            kind: ErrorKind::Exception(Box::new(value)),
            message,
            span: Some(span),
        }
    }

    pub fn control(kind: ErrorKind) -> Self {
        Self::new(kind, "")
    }

    pub fn is_exception(&self) -> bool {
        matches!(self.kind, ErrorKind::Exception(_))
    }

    pub fn is_control_flow(&self) -> bool {
        matches!(self.kind, ErrorKind::Break | ErrorKind::Continue | ErrorKind::Exit)
    }

    pub fn exception_value(&self) -> Option<&ExceptionValue> {
        match &self.kind {
            ErrorKind::Exception(exc) => Some(exc),
            _ => None,
        }
    }
}

/// Append `[line: L, column: C]` unless the message already has one
fn with_location(message: &str, span: Option<Span>) -> String {
    match span {
        Some(span) if !message.contains("[line:") => format!("{message} {}", span.location()),
        _ => message.to_string(),
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Exception(exc) => write!(
                f,
                "Exception: {}: {}",
                exc.class_name,
                with_location(&exc.message, Some(exc.span))
            ),
            _ => write!(f, "Runtime error: {}", with_location(&self.message, self.span)),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Result type for interpreter operations
pub type InterpResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_variable() {
        let err = RuntimeError::undefined_variable("foo");
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
        assert!(err.message.contains("foo"));
    }

    #[test]
    fn test_type_error() {
        let err = RuntimeError::type_error("Integer", "Boolean");
        assert_eq!(err.kind, ErrorKind::TypeError);
        assert!(err.message.contains("Integer"));
        assert!(err.message.contains("Boolean"));
    }

    #[test]
    fn test_var_param_required() {
        let err = RuntimeError::var_param_required("x");
        assert_eq!(err.kind, ErrorKind::VarParamRequired);
        assert!(err.message.contains("var parameter requires a variable"));
    }

    #[test]
    fn test_display_appends_location() {
        let err = RuntimeError::division_by_zero().at(Span::with_position(0, 1, 3, 7));
        assert_eq!(err.to_string(), "Runtime error: division by zero [line: 3, column: 7]");
    }

    #[test]
    fn test_at_keeps_first_span() {
        let err = RuntimeError::division_by_zero()
            .at(Span::with_position(0, 1, 1, 1))
            .at(Span::with_position(5, 6, 9, 9));
        assert_eq!(err.span.map(|s| s.line), Some(1));
    }

    #[test]
    fn test_display_without_span() {
        let err = RuntimeError::arity_mismatch("foo", 3, 2);
        let display = err.to_string();
        assert!(display.starts_with("Runtime error:"));
        assert!(!display.contains("[line:"));
    }

    #[test]
    fn test_control_flow_kinds() {
        assert!(RuntimeError::control(ErrorKind::Break).is_control_flow());
        assert!(RuntimeError::control(ErrorKind::Exit).is_control_flow());
        assert!(!RuntimeError::division_by_zero().is_control_flow());
        assert!(!RuntimeError::division_by_zero().is_exception());
    }
}
