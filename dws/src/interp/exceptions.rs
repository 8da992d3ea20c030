//! Script exceptions raised by the runtime itself

use super::error::{ExceptionValue, RuntimeError};
use super::eval::Interpreter;
use super::value::{ArrayRef, ObjectInstance, Value};
use crate::ast::Span;
use std::cell::RefCell;
use std::rc::Rc;

impl Interpreter {
    /// Build a catchable exception of the named class (falling back to
    /// `Exception` when the class is unknown)
    pub(crate) fn exception(&mut self, class_name: &str, message: &str, span: Span) -> RuntimeError {
        let class = self
            .registry
            .lookup_class(class_name)
            .or_else(|| self.registry.lookup_class("Exception"));
        let Some(class) = class else {
            return RuntimeError::invalid_operation(message.to_string()).at(span);
        };

        let object = match self.instantiate(&class) {
            Ok(object) => object,
            Err(_) => Rc::new(RefCell::new(ObjectInstance::new(Rc::clone(&class)))),
        };
        object
            .borrow_mut()
            .fields
            .insert("message".to_string(), Value::str(message));

        tracing::debug!(class = %class.name, message, line = span.line, "raising runtime exception");
        RuntimeError::exception(ExceptionValue {
            object,
            class_name: class.name.clone(),
            message: message.to_string(),
            span,
        })
    }

    /// `ERangeError` for an array index outside its bounds
    pub(crate) fn range_error(&mut self, array: &ArrayRef, index: i64, span: Span) -> RuntimeError {
        let (low, high) = {
            let array = array.borrow();
            (array.low, array.high())
        };
        let message = if index < low {
            format!("Lower bound exceeded! Index {index} {}", span.location())
        } else {
            format!("Upper bound exceeded! Index {index} (max {high}) {}", span.location())
        };
        self.exception("ERangeError", &message, span)
    }

    pub(crate) fn not_instantiated(&mut self, span: Span) -> RuntimeError {
        let message = format!("Object not instantiated {}", span.location());
        self.exception("Exception", &message, span)
    }

    pub(crate) fn already_destroyed(&mut self, span: Span) -> RuntimeError {
        let message = format!("Object already destroyed {}", span.location());
        self.exception("Exception", &message, span)
    }

    /// `raise <expr>`: the value must be an exception object
    pub(crate) fn raise_value(&mut self, value: Value, span: Span) -> RuntimeError {
        let Some(object) = value.as_object() else {
            if value.is_nil() {
                return self.not_instantiated(span);
            }
            return RuntimeError::type_error("exception object", &value.type_name()).at(span);
        };

        let (class_name, message) = {
            let obj = object.borrow();
            let message = obj
                .fields
                .get("message")
                .map(|m| m.to_string())
                .unwrap_or_default();
            (obj.class.name.clone(), message)
        };
        tracing::debug!(class = %class_name, message = %message, line = span.line, "raise");
        RuntimeError::exception(ExceptionValue {
            object,
            class_name,
            message,
            span,
        })
    }

    /// `ExceptObject`: the exception whose handler is running, or nil
    pub(crate) fn current_exception_object(&self) -> Value {
        self.handling
            .last()
            .and_then(RuntimeError::exception_value)
            .map_or(Value::Nil, |exc| Value::Object(Rc::clone(&exc.object)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::value::ArrayValue;

    #[test]
    fn test_exception_object_carries_message() {
        let mut interp = Interpreter::new();
        let err = interp.exception("EConvertError", "bad", Span::with_position(0, 1, 2, 3));
        let exc = err.exception_value().expect("exception");
        assert_eq!(exc.class_name, "EConvertError");
        assert_eq!(exc.object.borrow().fields.get("message"), Some(&Value::str("bad")));
        assert!(exc.object.borrow().class.inherits_from("Exception"));
    }

    #[test]
    fn test_unknown_exception_class_falls_back() {
        let mut interp = Interpreter::new();
        let err = interp.exception("ENoSuchClass", "x", Span::default());
        assert_eq!(err.exception_value().map(|e| e.class_name.as_str()), Some("Exception"));
    }

    #[test]
    fn test_range_error_message() {
        let mut interp = Interpreter::new();
        let array = ArrayValue::dynamic(vec![Value::Int(1)], None).into_ref();
        let err = interp.range_error(&array, 5, Span::with_position(0, 1, 4, 9));
        assert!(err.message.starts_with("Upper bound exceeded! Index 5"));
        assert!(err.message.contains("[line: 4, column: 9]"));
        assert_eq!(err.exception_value().map(|e| e.class_name.as_str()), Some("ERangeError"));
    }

    #[test]
    fn test_raise_non_object_is_hard_error() {
        let mut interp = Interpreter::new();
        let err = interp.raise_value(Value::Int(3), Span::default());
        assert!(!err.is_exception());
    }
}
