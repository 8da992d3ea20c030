//! Binary and unary operators

use super::env::EnvRef;
use super::error::{InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::types::{array_to_set, ordinal};
use super::value::Value;
use crate::ast::{BinOp, Expr, Span, Spanned, UnOp};
use std::cmp::Ordering;
use std::rc::Rc;

impl Interpreter {
    /// Evaluate `left op right`. Boolean `and`/`or` short-circuit; the right
    /// operand is not evaluated once the result is known.
    pub(crate) fn eval_binary(
        &mut self,
        op: BinOp,
        left: &Spanned<Expr>,
        right: &Spanned<Expr>,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Value> {
        let lhs = self.eval(left, env)?;

        if matches!(op, BinOp::And | BinOp::Or) {
            if let Value::Bool(l) = lhs {
                return match (op, l) {
                    (BinOp::And, false) => Ok(Value::Bool(false)),
                    (BinOp::Or, true) => Ok(Value::Bool(true)),
                    _ => {
                        let rhs = self.eval(right, env)?;
                        self.binary_op(op, Value::Bool(l), rhs, span)
                    }
                };
            }
        }

        let rhs = self.eval(right, env)?;
        self.binary_op(op, lhs, rhs, span)
    }

    /// Apply a binary operator to two evaluated operands
    pub(crate) fn binary_op(&mut self, op: BinOp, left: Value, right: Value, span: Span) -> InterpResult<Value> {
        let left = strip_cast(left);
        let right = strip_cast(right);

        if op == BinOp::In {
            return self.membership(left, right, span);
        }
        if matches!(left, Value::Variant(_)) || matches!(right, Value::Variant(_)) {
            return self.variant_binary_op(op, left, right, span);
        }

        match (op, &left, &right) {
            (BinOp::Eq, _, _) => return Ok(Value::Bool(values_equal(&left, &right))),
            (BinOp::Ne, _, _) => return Ok(Value::Bool(!values_equal(&left, &right))),
            _ => {}
        }
        if op.is_comparison() {
            return match compare_values(&left, &right) {
                Some(ordering) => Ok(Value::Bool(ordering_matches(op, ordering))),
                None => Err(operand_error(op, &left, &right).at(span)),
            };
        }

        match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => int_op(op, *a, *b).map_err(|e| e.at(span)),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let (a, b) = (left.as_float().unwrap_or(0.0), right.as_float().unwrap_or(0.0));
                match float_op(op, a, b) {
                    Some(result) => result.map_err(|e| e.at(span)),
                    None => Err(operand_error(op, &left, &right).at(span)),
                }
            }
            (Value::Str(a), Value::Str(b)) if op == BinOp::Add => Ok(Value::Str(format!("{a}{b}"))),
            (Value::Bool(a), Value::Bool(b)) => match op {
                BinOp::And => Ok(Value::Bool(*a && *b)),
                BinOp::Or => Ok(Value::Bool(*a || *b)),
                BinOp::Xor => Ok(Value::Bool(a ^ b)),
                _ => Err(operand_error(op, &left, &right).at(span)),
            },
            (Value::Set(a), Value::Set(b)) => match op {
                BinOp::Add => Ok(Value::Set(a.union(b).copied().collect())),
                BinOp::Sub => Ok(Value::Set(a.difference(b).copied().collect())),
                BinOp::Mul => Ok(Value::Set(a.intersection(b).copied().collect())),
                _ => Err(operand_error(op, &left, &right).at(span)),
            },
            (Value::Set(_), Value::Array(arr)) => {
                let set = Value::Set(array_to_set(&arr.borrow().elems));
                self.binary_op(op, left.clone(), set, span)
            }
            (Value::Array(arr), Value::Set(_)) => {
                let set = Value::Set(array_to_set(&arr.borrow().elems));
                self.binary_op(op, set, right.clone(), span)
            }
            _ => Err(operand_error(op, &left, &right).at(span)),
        }
    }

    /// `x in [..]`
    fn membership(&mut self, item: Value, collection: Value, span: Span) -> InterpResult<Value> {
        let item = item.unwrap_variant();
        match collection.unwrap_variant() {
            Value::Set(set) => Ok(Value::Bool(ordinal(&item).is_some_and(|n| set.contains(&n)))),
            Value::Array(arr) => Ok(Value::Bool(
                arr.borrow().elems.iter().any(|e| values_equal(&e.clone().unwrap_variant(), &item)),
            )),
            Value::Str(s) => match item {
                Value::Str(sub) => Ok(Value::Bool(s.contains(sub.as_str()))),
                other => Err(RuntimeError::type_error("String", &other.type_name()).at(span)),
            },
            other => Err(RuntimeError::type_error("set or array", &other.type_name()).at(span)),
        }
    }

    pub(crate) fn unary_op(&mut self, op: UnOp, value: Value, span: Span) -> InterpResult<Value> {
        let is_variant = matches!(value, Value::Variant(_));
        let result = match (op, strip_cast(value).unwrap_variant()) {
            (UnOp::Neg, Value::Int(n)) => Value::Int(n.wrapping_neg()),
            (UnOp::Neg, Value::Float(x)) => Value::Float(-x),
            (UnOp::Plus, v @ (Value::Int(_) | Value::Float(_))) => v,
            (UnOp::Not, Value::Bool(b)) => Value::Bool(!b),
            (UnOp::Not, Value::Int(n)) => Value::Int(!n),
            (UnOp::Not, Value::Nil) if is_variant => Value::Bool(true),
            (op, other) => {
                return Err(RuntimeError::type_error(
                    "operand for unary operator",
                    &format!("{op} {}", other.type_name()),
                )
                .at(span));
            }
        };
        Ok(result)
    }
}

fn strip_cast(value: Value) -> Value {
    match value {
        Value::TypeCast(tc) => tc.value,
        other => other,
    }
}

fn operand_error(op: BinOp, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::type_error(
        "compatible operands",
        &format!("{} {op} {}", left.type_name(), right.type_name()),
    )
}

fn int_op(op: BinOp, a: i64, b: i64) -> InterpResult<Value> {
    let value = match op {
        BinOp::Add => Value::Int(a.wrapping_add(b)),
        BinOp::Sub => Value::Int(a.wrapping_sub(b)),
        BinOp::Mul => Value::Int(a.wrapping_mul(b)),
        BinOp::Div => {
            if b == 0 {
                return Err(RuntimeError::division_by_zero());
            }
            Value::Float(a as f64 / b as f64)
        }
        BinOp::IntDiv => {
            if b == 0 {
                return Err(RuntimeError::division_by_zero());
            }
            Value::Int(a.wrapping_div(b))
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(RuntimeError::division_by_zero());
            }
            Value::Int(a.wrapping_rem(b))
        }
        BinOp::And => Value::Int(a & b),
        BinOp::Or => Value::Int(a | b),
        BinOp::Xor => Value::Int(a ^ b),
        BinOp::Shl => Value::Int(a.wrapping_shl(b as u32)),
        BinOp::Shr => Value::Int(((a as u64).wrapping_shr(b as u32)) as i64),
        _ => {
            return Err(RuntimeError::type_error(
                "numeric operator",
                &format!("Integer {op} Integer"),
            ));
        }
    };
    Ok(value)
}

fn float_op(op: BinOp, a: f64, b: f64) -> Option<InterpResult<Value>> {
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Some(Err(RuntimeError::division_by_zero()));
            }
            a / b
        }
        _ => return None,
    };
    Some(Ok(Value::Float(value)))
}

/// Ordering of two comparable plain values
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            left.as_float()?.partial_cmp(&right.as_float()?)
        }
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Enum(a), Value::Enum(b)) if Rc::ptr_eq(&a.info, &b.info) => Some(a.ordinal.cmp(&b.ordinal)),
        (Value::Set(a), Value::Set(b)) => {
            if a == b {
                Some(Ordering::Equal)
            } else if a.is_subset(b) {
                Some(Ordering::Less)
            } else if a.is_superset(b) {
                Some(Ordering::Greater)
            } else {
                None
            }
        }
        _ => None,
    }
}

pub(crate) fn ordering_matches(op: BinOp, ordering: Ordering) -> bool {
    match op {
        BinOp::Eq => ordering == Ordering::Equal,
        BinOp::Ne => ordering != Ordering::Equal,
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::Gt => ordering == Ordering::Greater,
        BinOp::Le => ordering != Ordering::Greater,
        BinOp::Ge => ordering != Ordering::Less,
        _ => false,
    }
}

/// `=` semantics: identity for objects and interfaces, structure for data
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Nil, other) | (other, Value::Nil) => other.is_nil(),
        (Value::Set(a), Value::Array(b)) | (Value::Array(b), Value::Set(a)) => *a == array_to_set(&b.borrow().elems),
        _ => left == right,
    }
}
