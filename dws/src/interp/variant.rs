//! Variant arithmetic, conversions and the `Var*` builtins
//!
//! Type codes follow the OLE `VARTYPE` numbering.

use super::builtins::{Builtin, BuiltinFn};
use super::error::{ErrorKind, InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::ops::{compare_values, ordering_matches};
use super::value::{TypeTag, Value};
use crate::ast::{BinOp, Span};
use std::collections::HashMap;

pub const VAR_EMPTY: i64 = 0;
pub const VAR_NULL: i64 = 1;
pub const VAR_INTEGER: i64 = 3;
pub const VAR_DOUBLE: i64 = 5;
pub const VAR_BOOLEAN: i64 = 11;
pub const VAR_VARIANT: i64 = 12;
pub const VAR_STRING: i64 = 256;
pub const VAR_ARRAY: i64 = 0x2000;

/// `VarType` code of a value
pub fn var_type_code(value: &Value) -> i64 {
    match value {
        Value::Variant(v) => match (&v.value, v.actual_type) {
            (None, TypeTag::Null) => VAR_NULL,
            (None, _) => VAR_EMPTY,
            (Some(Value::Variant(_)), _) => VAR_VARIANT,
            (Some(inner), _) => var_type_code(inner),
        },
        Value::Int(_) => VAR_INTEGER,
        Value::Float(_) => VAR_DOUBLE,
        Value::Str(_) => VAR_STRING,
        Value::Bool(_) => VAR_BOOLEAN,
        Value::Array(_) => VAR_ARRAY,
        Value::Enum(_) => VAR_INTEGER,
        Value::TypeCast(tc) => var_type_code(&tc.value),
        _ => VAR_EMPTY,
    }
}

/// Unassigned, `Null` and nil all count as "no value"
fn is_nullish(value: &Value) -> bool {
    match value {
        Value::Variant(v) => v.is_nullish(),
        Value::Nil => true,
        _ => false,
    }
}

fn is_unassigned(value: &Value) -> bool {
    matches!(value, Value::Variant(v) if v.value.is_none() && v.actual_type != TypeTag::Null)
}

/// String rendering used by `VarToStr` and `String(v)`; empty and null
/// render as ''
pub fn variant_to_str(value: &Value) -> String {
    match value.clone().unwrap_all() {
        Value::Nil => String::new(),
        other => other.to_string(),
    }
}

/// Boolean reading of a string: `1`, `t`, `y`, `yes`, `true`
pub(crate) fn str_to_bool(s: &str) -> bool {
    let s = s.trim();
    matches!(s, "1" | "t" | "T" | "y" | "Y") || s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("true")
}

impl Interpreter {
    pub(crate) fn variant_to_int(&mut self, value: &Value, span: Span) -> InterpResult<Value> {
        match value.clone().unwrap_all() {
            Value::Nil => Ok(Value::Int(0)),
            Value::Int(n) => Ok(Value::Int(n)),
            Value::Float(x) => Ok(Value::Int(x.trunc() as i64)),
            Value::Bool(b) => Ok(Value::Int(i64::from(b))),
            Value::Enum(e) => Ok(Value::Int(e.ordinal)),
            Value::Str(s) => match s.trim().parse::<i64>() {
                Ok(n) => Ok(Value::Int(n)),
                Err(_) => Err(self.convert_error(&format!("cannot convert string '{s}' to Integer"), span)),
            },
            other => Err(self.convert_error(&format!("cannot convert {} to Integer", other.type_tag()), span)),
        }
    }

    pub(crate) fn variant_to_float(&mut self, value: &Value, span: Span) -> InterpResult<Value> {
        match value.clone().unwrap_all() {
            Value::Nil => Ok(Value::Float(0.0)),
            Value::Int(n) => Ok(Value::Float(n as f64)),
            Value::Float(x) => Ok(Value::Float(x)),
            Value::Bool(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
            Value::Str(s) => match s.trim().parse::<f64>() {
                Ok(x) => Ok(Value::Float(x)),
                Err(_) => Err(self.convert_error(&format!("cannot convert string '{s}' to Float"), span)),
            },
            other => Err(self.convert_error(&format!("cannot convert {} to Float", other.type_tag()), span)),
        }
    }

    pub(crate) fn variant_to_bool(&mut self, value: &Value, span: Span) -> InterpResult<Value> {
        match value.clone().unwrap_all() {
            Value::Nil => Ok(Value::Bool(false)),
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::Int(n) => Ok(Value::Bool(n != 0)),
            Value::Float(x) => Ok(Value::Bool(x != 0.0)),
            Value::Str(s) => Ok(Value::Bool(str_to_bool(&s))),
            other => Err(self.convert_error(&format!("cannot convert {} to Boolean", other.type_tag()), span)),
        }
    }

    fn convert_error(&mut self, message: &str, span: Span) -> RuntimeError {
        let message = format!("{message} {}", span.location());
        self.exception("EConvertError", &message, span)
    }

    /// Operator with at least one variant operand
    pub(crate) fn variant_binary_op(&mut self, op: BinOp, left: Value, right: Value, span: Span) -> InterpResult<Value> {
        if is_nullish(&left) || is_nullish(&right) {
            let equal = match (is_nullish(&left), is_nullish(&right)) {
                (true, true) => true,
                (true, false) => is_unassigned(&left) && !right.is_truthy(),
                (false, true) => is_unassigned(&right) && !left.is_truthy(),
                (false, false) => false,
            };
            return match op {
                BinOp::Eq => Ok(Value::Bool(equal)),
                BinOp::Ne => Ok(Value::Bool(!equal)),
                _ => Err(RuntimeError::new(
                    ErrorKind::InvalidOperation,
                    "cannot perform operation on unassigned Variant",
                )
                .at(span)),
            };
        }

        let left = left.unwrap_all();
        let right = right.unwrap_all();
        let incompatible = || {
            RuntimeError::new(
                ErrorKind::TypeError,
                format!(
                    "incompatible Variant types for operator {op}: {} and {}",
                    left.type_tag(),
                    right.type_tag()
                ),
            )
            .at(span)
        };

        let numeric = |v: &Value| matches!(v, Value::Int(_) | Value::Float(_));
        match (&left, &right) {
            (a, b) if numeric(a) && numeric(b) => {
                if matches!(op, BinOp::IntDiv | BinOp::Mod | BinOp::Shl | BinOp::Shr)
                    && !(matches!(a, Value::Int(_)) && matches!(b, Value::Int(_)))
                {
                    return Err(incompatible());
                }
                self.binary_op(op, left.clone(), right.clone(), span)
            }
            (Value::Str(_), Value::Str(_)) if op == BinOp::Add || op.is_comparison() => {
                self.binary_op(op, left.clone(), right.clone(), span)
            }
            (Value::Bool(_), Value::Bool(_))
                if op.is_comparison() || matches!(op, BinOp::And | BinOp::Or | BinOp::Xor) =>
            {
                self.binary_op(op, left.clone(), right.clone(), span)
            }
            (Value::Str(a), b) | (b, Value::Str(a)) if op == BinOp::Add => {
                let text = if matches!(left, Value::Str(_)) {
                    format!("{a}{b}")
                } else {
                    format!("{b}{a}")
                };
                Ok(Value::Str(text))
            }
            _ if op.is_comparison() => {
                let (l, r) = (Value::Str(left.to_string()), Value::Str(right.to_string()));
                match compare_values(&l, &r) {
                    Some(ordering) => Ok(Value::Bool(ordering_matches(op, ordering))),
                    None => Err(incompatible()),
                }
            }
            (a, b)
                if matches!(op, BinOp::And | BinOp::Or | BinOp::Xor)
                    && (numeric(a) || matches!(a, Value::Bool(_)))
                    && (numeric(b) || matches!(b, Value::Bool(_))) =>
            {
                let (x, y) = (a.is_truthy(), b.is_truthy());
                let result = match op {
                    BinOp::And => x && y,
                    BinOp::Or => x || y,
                    _ => x ^ y,
                };
                Ok(Value::Bool(result).into_variant())
            }
            _ => Err(incompatible()),
        }
    }
}

fn single(args: &[Value], name: &str, span: Span) -> InterpResult<Value> {
    match args {
        [value] => Ok(value.clone()),
        _ => Err(RuntimeError::arity_mismatch(name, 1, args.len()).at(span)),
    }
}

fn var_type(_: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    Ok(Value::Int(var_type_code(&single(&args, "VarType", span)?)))
}

fn var_is_null(_: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    Ok(Value::Bool(is_nullish(&single(&args, "VarIsNull", span)?)))
}

fn var_is_empty(_: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    Ok(Value::Bool(is_nullish(&single(&args, "VarIsEmpty", span)?)))
}

fn var_is_numeric(_: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    let value = single(&args, "VarIsNumeric", span)?.unwrap_all();
    Ok(Value::Bool(matches!(value, Value::Int(_) | Value::Float(_))))
}

fn var_is_str(_: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    let value = single(&args, "VarIsStr", span)?.unwrap_all();
    Ok(Value::Bool(matches!(value, Value::Str(_))))
}

fn var_is_array(_: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    let value = single(&args, "VarIsArray", span)?.unwrap_all();
    Ok(Value::Bool(matches!(value, Value::Array(_))))
}

fn var_to_str(_: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    Ok(Value::Str(variant_to_str(&single(&args, "VarToStr", span)?)))
}

fn var_to_int(interp: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    let value = single(&args, "VarToInt", span)?;
    interp.variant_to_int(&value, span)
}

fn var_to_float(interp: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    let value = single(&args, "VarToFloat", span)?;
    interp.variant_to_float(&value, span)
}

fn var_as_type(interp: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    let [value, code] = args.as_slice() else {
        return Err(RuntimeError::arity_mismatch("VarAsType", 2, args.len()).at(span));
    };
    let Some(code) = code.as_int() else {
        return Err(RuntimeError::type_error("Integer type code", &code.type_name()).at(span));
    };

    let converted = match code {
        VAR_EMPTY => return Ok(Value::unassigned()),
        VAR_INTEGER => interp.variant_to_int(value, span)?,
        VAR_DOUBLE => interp.variant_to_float(value, span)?,
        VAR_STRING => Value::Str(variant_to_str(value)),
        VAR_BOOLEAN => interp.variant_to_bool(value, span)?,
        other => {
            return Err(RuntimeError::invalid_operation(format!("unsupported VarType code: {other}")).at(span));
        }
    };
    Ok(converted.into_variant())
}

fn var_clear(_: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    match single(&args, "VarClear", span)? {
        Value::Ref(target) => target.set(Value::unassigned()).map_err(|e| e.at(span))?,
        _ => return Err(RuntimeError::var_param_required("V").at(span)),
    }
    Ok(Value::Nil)
}

fn unassigned(_: &mut Interpreter, _: Vec<Value>, _: Span) -> InterpResult<Value> {
    Ok(Value::unassigned())
}

fn null(_: &mut Interpreter, _: Vec<Value>, _: Span) -> InterpResult<Value> {
    Ok(Value::null())
}

/// Register the variant introspection builtins
pub(crate) fn register(builtins: &mut HashMap<String, Builtin>) {
    let raw = |func: BuiltinFn| Builtin {
        func,
        var_params: &[],
        raw: true,
    };
    builtins.insert("vartype".into(), raw(var_type));
    builtins.insert("varisnull".into(), raw(var_is_null));
    builtins.insert("varisempty".into(), raw(var_is_empty));
    builtins.insert("varisclear".into(), raw(var_is_empty));
    builtins.insert("varisnumeric".into(), raw(var_is_numeric));
    builtins.insert("varisstr".into(), raw(var_is_str));
    builtins.insert("varisarray".into(), raw(var_is_array));
    builtins.insert("vartostr".into(), raw(var_to_str));
    builtins.insert("vartoint".into(), raw(var_to_int));
    builtins.insert("vartofloat".into(), raw(var_to_float));
    builtins.insert("varastype".into(), raw(var_as_type));
    builtins.insert("unassigned".into(), raw(unassigned));
    builtins.insert("null".into(), raw(null));
    builtins.insert(
        "varclear".into(),
        Builtin {
            func: var_clear,
            var_params: &[0],
            raw: true,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(value: Value) -> Value {
        value.into_variant()
    }

    #[test]
    fn test_var_type_codes() {
        assert_eq!(var_type_code(&Value::unassigned()), VAR_EMPTY);
        assert_eq!(var_type_code(&Value::null()), VAR_NULL);
        assert_eq!(var_type_code(&v(Value::Int(1))), VAR_INTEGER);
        assert_eq!(var_type_code(&v(Value::Float(1.5))), VAR_DOUBLE);
        assert_eq!(var_type_code(&v(Value::Bool(true))), VAR_BOOLEAN);
        assert_eq!(var_type_code(&v(Value::str("s"))), VAR_STRING);
        assert_eq!(var_type_code(&Value::Nil), VAR_EMPTY);
    }

    #[test]
    fn test_mixed_numeric_promotes() {
        let mut interp = Interpreter::new();
        let sum = interp
            .variant_binary_op(BinOp::Add, v(Value::Int(1)), v(Value::Float(0.5)), Span::default())
            .expect("add");
        assert_eq!(sum, Value::Float(1.5));
    }

    #[test]
    fn test_string_concatenation_with_number() {
        let mut interp = Interpreter::new();
        let text = interp
            .variant_binary_op(BinOp::Add, v(Value::str("n=")), v(Value::Int(42)), Span::default())
            .expect("concat");
        assert_eq!(text, Value::str("n=42"));
    }

    #[test]
    fn test_unassigned_equality() {
        let mut interp = Interpreter::new();
        let eq = interp
            .variant_binary_op(BinOp::Eq, Value::unassigned(), Value::unassigned(), Span::default())
            .expect("eq");
        assert_eq!(eq, Value::Bool(true));
        let ne = interp
            .variant_binary_op(BinOp::Ne, Value::unassigned(), v(Value::Int(5)), Span::default())
            .expect("ne");
        assert_eq!(ne, Value::Bool(true));
    }

    #[test]
    fn test_unassigned_arithmetic_is_error() {
        let mut interp = Interpreter::new();
        let err = interp
            .variant_binary_op(BinOp::Add, Value::unassigned(), v(Value::Int(1)), Span::default())
            .expect_err("unassigned");
        assert!(err.message.contains("cannot perform operation on unassigned Variant"));
    }

    #[test]
    fn test_incompatible_types() {
        let mut interp = Interpreter::new();
        let err = interp
            .variant_binary_op(BinOp::Mul, v(Value::str("a")), v(Value::Bool(true)), Span::default())
            .expect_err("incompatible");
        assert_eq!(err.message, "incompatible Variant types for operator *: STRING and BOOLEAN");
    }

    #[test]
    fn test_conversions() {
        let mut interp = Interpreter::new();
        let span = Span::default();
        assert_eq!(interp.variant_to_int(&v(Value::Float(3.9)), span).ok(), Some(Value::Int(3)));
        assert_eq!(interp.variant_to_int(&v(Value::Bool(true)), span).ok(), Some(Value::Int(1)));
        assert_eq!(interp.variant_to_int(&v(Value::str(" 12 ")), span).ok(), Some(Value::Int(12)));
        assert_eq!(interp.variant_to_bool(&v(Value::str("Yes")), span).ok(), Some(Value::Bool(true)));
        assert_eq!(interp.variant_to_bool(&v(Value::str("no")), span).ok(), Some(Value::Bool(false)));
        assert_eq!(variant_to_str(&Value::unassigned()), "");

        let err = interp.variant_to_int(&v(Value::str("abc")), span).expect_err("bad int");
        assert_eq!(err.exception_value().map(|e| e.class_name.as_str()), Some("EConvertError"));
    }
}
