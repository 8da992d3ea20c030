//! Pseudo-methods on arrays and strings (`a.Add(x)`, `s.Length`, ...)

use super::call::CallArgs;
use super::error::{InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::ops::{compare_values, values_equal};
use super::types::ordinal;
use super::value::{ArrayRef, ArrayValue, Value};
use crate::ast::Span;
use crate::util::normalize;
use std::cmp::Ordering;

impl Interpreter {
    /// `arr.name(args)`; `Ok(None)` when arrays have no such method
    pub(crate) fn array_method(
        &mut self,
        arr: &ArrayRef,
        name: &str,
        args: Option<CallArgs<'_>>,
        span: Span,
    ) -> InterpResult<Option<Value>> {
        let key = normalize(name);
        if !is_array_method(&key) {
            return Ok(None);
        }
        let args = match args {
            Some(args) => self.eval_args(args)?,
            None => Vec::new(),
        };

        let value = match key.as_str() {
            "length" | "count" => {
                method_args(name, &args, 0, 0)?;
                Value::Int(arr.borrow().elems.len() as i64)
            }
            "high" => {
                method_args(name, &args, 0, 0)?;
                Value::Int(arr.borrow().high())
            }
            "low" => {
                method_args(name, &args, 0, 0)?;
                Value::Int(arr.borrow().low)
            }
            "add" | "push" => {
                method_args(name, &args, 1, usize::MAX)?;
                self.require_dynamic(arr, name, span)?;
                let mut array = arr.borrow_mut();
                array.elems.extend(args.into_iter().map(|v| v.copy_value()));
                Value::Nil
            }
            "pop" => {
                method_args(name, &args, 0, 0)?;
                self.require_dynamic(arr, name, span)?;
                let popped = arr.borrow_mut().elems.pop();
                match popped {
                    Some(value) => value,
                    None => return Err(self.range_error(arr, 0, span)),
                }
            }
            "delete" => {
                method_args(name, &args, 1, 2)?;
                self.require_dynamic(arr, name, span)?;
                let index = index_arg(&args, 0)?;
                let count = match args.get(1) {
                    Some(v) => ordinal(v).ok_or_else(|| RuntimeError::type_error("Integer", &v.type_name()))?,
                    None => 1,
                };
                let Some(start) = arr.borrow().slot(index) else {
                    return Err(self.range_error(arr, index, span));
                };
                let mut array = arr.borrow_mut();
                let end = start.saturating_add(usize::try_from(count.max(0)).unwrap_or(0)).min(array.elems.len());
                array.elems.drain(start..end);
                Value::Nil
            }
            "insert" => {
                method_args(name, &args, 2, 2)?;
                self.require_dynamic(arr, name, span)?;
                let index = index_arg(&args, 0)?;
                let len = arr.borrow().elems.len();
                let at = match usize::try_from(index) {
                    Ok(at) if at <= len => at,
                    _ => return Err(self.range_error(arr, index, span)),
                };
                arr.borrow_mut().elems.insert(at, args[1].copy_value());
                Value::Nil
            }
            "indexof" => {
                method_args(name, &args, 1, 2)?;
                let array = arr.borrow();
                let from = match args.get(1) {
                    Some(v) => array.slot(ordinal(v).unwrap_or(array.low)).unwrap_or(array.elems.len()),
                    None => 0,
                };
                let found = array.elems[from.min(array.elems.len())..]
                    .iter()
                    .position(|e| values_equal(&e.clone().unwrap_all(), &args[0]));
                Value::Int(found.map_or(-1, |i| array.low + (from + i) as i64))
            }
            "contains" => {
                method_args(name, &args, 1, 1)?;
                let array = arr.borrow();
                Value::Bool(array.elems.iter().any(|e| values_equal(&e.clone().unwrap_all(), &args[0])))
            }
            "reverse" => {
                method_args(name, &args, 0, 0)?;
                arr.borrow_mut().elems.reverse();
                Value::Nil
            }
            "sort" => {
                method_args(name, &args, 0, 1)?;
                self.sort_array(arr, args.into_iter().next(), span)?;
                Value::Nil
            }
            "map" => {
                method_args(name, &args, 1, 1)?;
                let elems = arr.borrow().elems.clone();
                let mut mapped = Vec::with_capacity(elems.len());
                for elem in elems {
                    mapped.push(self.call_function_value(args[0].clone(), vec![elem], span)?);
                }
                Value::Array(ArrayValue::dynamic(mapped, None).into_ref())
            }
            "filter" => {
                method_args(name, &args, 1, 1)?;
                let (elems, elem_ty) = {
                    let array = arr.borrow();
                    (array.elems.clone(), array.elem_ty.clone())
                };
                let mut kept = Vec::new();
                for elem in elems {
                    if self.call_function_value(args[0].clone(), vec![elem.clone()], span)?.is_truthy() {
                        kept.push(elem);
                    }
                }
                Value::Array(ArrayValue::dynamic(kept, elem_ty).into_ref())
            }
            "join" => {
                method_args(name, &args, 0, 1)?;
                let sep = args.first().map(|s| s.to_string()).unwrap_or_default();
                let array = arr.borrow();
                let parts: Vec<String> = array.elems.iter().map(|e| e.to_string()).collect();
                Value::Str(parts.join(&sep))
            }
            "setlength" => {
                method_args(name, &args, 1, 1)?;
                let len = index_arg(&args, 0)?.max(0);
                self.resize_array(arr, usize::try_from(len).unwrap_or(0))?;
                Value::Nil
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    fn require_dynamic(&mut self, arr: &ArrayRef, name: &str, span: Span) -> InterpResult<()> {
        if arr.borrow().is_static {
            return Err(RuntimeError::invalid_operation(format!("{name} is not available on static arrays")).at(span));
        }
        Ok(())
    }

    /// `SetLength` on a dynamic array; new slots get the element type's
    /// zero value
    pub(crate) fn resize_array(&mut self, arr: &ArrayRef, len: usize) -> InterpResult<()> {
        let (current, elem_ty, is_static) = {
            let array = arr.borrow();
            (array.elems.len(), array.elem_ty.clone(), array.is_static)
        };
        if is_static {
            return Err(RuntimeError::invalid_operation("cannot resize a static array"));
        }
        if len <= current {
            arr.borrow_mut().elems.truncate(len);
            return Ok(());
        }
        let mut extra = Vec::with_capacity(len - current);
        for _ in current..len {
            let zero = match &elem_ty {
                Some(ty) => self.zero_value(ty)?,
                None => Value::Nil,
            };
            extra.push(zero);
        }
        arr.borrow_mut().elems.extend(extra);
        Ok(())
    }

    /// Stable in-place sort; `cmp(a, b)` returns negative, zero or positive
    pub(crate) fn sort_array(&mut self, arr: &ArrayRef, cmp: Option<Value>, span: Span) -> InterpResult<()> {
        let elems = arr.borrow().elems.clone();
        let sorted = self.merge_sort(elems, cmp.as_ref(), span)?;
        arr.borrow_mut().elems = sorted;
        Ok(())
    }

    fn merge_sort(&mut self, mut items: Vec<Value>, cmp: Option<&Value>, span: Span) -> InterpResult<Vec<Value>> {
        if items.len() <= 1 {
            return Ok(items);
        }
        let right = items.split_off(items.len() / 2);
        let left = self.merge_sort(items, cmp, span)?;
        let right = self.merge_sort(right, cmp, span)?;

        let mut merged = Vec::with_capacity(left.len() + right.len());
        let mut left = left.into_iter().peekable();
        let mut right = right.into_iter().peekable();
        while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
            let take_left = self.sort_le(a, b, cmp, span)?;
            let next = if take_left { left.next() } else { right.next() };
            merged.extend(next);
        }
        merged.extend(left);
        merged.extend(right);
        Ok(merged)
    }

    fn sort_le(&mut self, a: &Value, b: &Value, cmp: Option<&Value>, span: Span) -> InterpResult<bool> {
        match cmp {
            Some(cmp) => match self.call_function_value(cmp.clone(), vec![a.clone(), b.clone()], span)?.unwrap_all() {
                Value::Int(n) => Ok(n <= 0),
                Value::Float(x) => Ok(x <= 0.0),
                other => Err(RuntimeError::type_error("Integer", &other.type_name()).at(span)),
            },
            None => {
                let (a, b) = (a.clone().unwrap_all(), b.clone().unwrap_all());
                match compare_values(&a, &b) {
                    Some(ordering) => Ok(ordering != Ordering::Greater),
                    None => Err(RuntimeError::type_error("comparable elements", &format!(
                        "{} and {}",
                        a.type_name(),
                        b.type_name()
                    ))
                    .at(span)),
                }
            }
        }
    }

    /// `s.name(args)`; `Ok(None)` when strings have no such method
    pub(crate) fn string_method(
        &mut self,
        s: &str,
        name: &str,
        args: Option<CallArgs<'_>>,
        _span: Span,
    ) -> InterpResult<Option<Value>> {
        let key = normalize(name);
        if !is_string_method(&key) {
            return Ok(None);
        }
        let args = match args {
            Some(args) => self.eval_args(args)?,
            None => Vec::new(),
        };

        let value = match key.as_str() {
            "length" => {
                method_args(name, &args, 0, 0)?;
                Value::Int(s.chars().count() as i64)
            }
            "low" => Value::Int(1),
            "high" => Value::Int(s.chars().count() as i64),
            "uppercase" | "toupper" => Value::Str(s.to_uppercase()),
            "lowercase" | "tolower" => Value::Str(s.to_lowercase()),
            "trim" => Value::Str(s.trim().to_string()),
            "contains" => {
                method_args(name, &args, 1, 1)?;
                Value::Bool(s.contains(&args[0].to_string()))
            }
            "startswith" => {
                method_args(name, &args, 1, 1)?;
                Value::Bool(s.starts_with(&args[0].to_string()))
            }
            "endswith" => {
                method_args(name, &args, 1, 1)?;
                Value::Bool(s.ends_with(&args[0].to_string()))
            }
            "indexof" => {
                method_args(name, &args, 1, 1)?;
                let needle = args[0].to_string();
                // 1-based character position, 0 when absent
                let pos = s.find(&needle).map_or(0, |byte| s[..byte].chars().count() as i64 + 1);
                Value::Int(pos)
            }
            "split" => {
                method_args(name, &args, 1, 1)?;
                let sep = args[0].to_string();
                let parts = s.split(sep.as_str()).map(Value::str).collect();
                Value::Array(ArrayValue::dynamic(parts, None).into_ref())
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }
}

fn is_array_method(key: &str) -> bool {
    matches!(
        key,
        "length"
            | "count"
            | "high"
            | "low"
            | "add"
            | "push"
            | "pop"
            | "delete"
            | "insert"
            | "indexof"
            | "contains"
            | "reverse"
            | "sort"
            | "map"
            | "filter"
            | "join"
            | "setlength"
    )
}

fn is_string_method(key: &str) -> bool {
    matches!(
        key,
        "length"
            | "low"
            | "high"
            | "uppercase"
            | "toupper"
            | "lowercase"
            | "tolower"
            | "trim"
            | "contains"
            | "startswith"
            | "endswith"
            | "indexof"
            | "split"
    )
}

fn method_args(name: &str, args: &[Value], min: usize, max: usize) -> InterpResult<()> {
    if args.len() < min || args.len() > max {
        let expected = if args.len() < min { min } else { max };
        return Err(RuntimeError::arity_mismatch(name, expected, args.len()));
    }
    Ok(())
}

fn index_arg(args: &[Value], i: usize) -> InterpResult<i64> {
    ordinal(&args[i]).ok_or_else(|| RuntimeError::type_error("Integer", &args[i].type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn output(source: &str) -> String {
        let program = parse_source(source).expect("parse");
        let (mut interp, out) = Interpreter::with_captured_output();
        if let Err(e) = interp.run(&program) {
            panic!("unexpected error: {e}");
        }
        let text = out.borrow().clone();
        text
    }

    #[test]
    fn test_array_growth_and_queries() {
        let src = "
var a: array of Integer;
a.Add(3);
a.Push(1, 2);
a.Insert(0, 9);
PrintLn(a.Join(','));
a.Delete(1);
PrintLn(IntToStr(a.Pop()) + ' ' + a.Join(','));
PrintLn(IntToStr(a.IndexOf(1)) + ' ' + IntToStr(a.IndexOf(7)) + ' ' + BoolToStr(a.Contains(9)));
PrintLn(IntToStr(a.Low) + '..' + IntToStr(a.High) + ' n=' + IntToStr(a.Count));
";
        assert_eq!(output(src), "9,3,1,2\n2 9,1\n1 -1 True\n0..1 n=2\n");
    }

    #[test]
    fn test_sort_with_comparator() {
        let src = "
var a := [5, 1, 4, 2, 3];
a.Sort(lambda (x, y: Integer): Integer => y - x);
PrintLn(a.Join(' '));
a.Sort(lambda (x, y: Integer): Integer => x - y);
PrintLn(a.Join(' '));
var s := ['pear', 'apple', 'fig'];
s.Sort;
PrintLn(s.Join(' '));
";
        assert_eq!(output(src), "5 4 3 2 1\n1 2 3 4 5\napple fig pear\n");
    }

    #[test]
    fn test_map_filter_reverse() {
        let src = "
var a := [1, 2, 3, 4];
var evens := a.Filter(lambda (x: Integer): Boolean => x mod 2 = 0);
var squares := a.Map(lambda (x: Integer): Integer => x * x);
squares.Reverse;
PrintLn(evens.Join(',') + ' ' + squares.Join(','));
";
        assert_eq!(output(src), "2,4 16,9,4,1\n");
    }

    #[test]
    fn test_set_length_fills_zero_values() {
        let src = "
var a: array of Integer;
a.SetLength(3);
a[2] := 7;
PrintLn(a.Join(','));
a.SetLength(1);
PrintLn(IntToStr(a.Length));
";
        assert_eq!(output(src), "0,0,7\n1\n");
    }

    #[test]
    fn test_string_methods() {
        let src = "
var s := '  Hello ';
PrintLn(s.Trim.ToUpper + IntToStr(s.Length) + IntToStr('abcabc'.IndexOf('ca')));
";
        assert_eq!(output(src), "HELLO83\n");
    }
}
