//! `is`, `as`, `implements` and explicit `T(x)` casts

use super::env::EnvRef;
use super::error::{InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::registry::{class_explicitly_implements_interface, class_implements_interface, is_class_compatible, InterfaceInfo};
use super::types::{ordinal, Primitive};
use super::value::{EnumValue, InterfaceInstance, ObjectRef, TypeCastValue, Value};
use super::variant::{str_to_bool, variant_to_str};
use crate::ast::{Expr, IsTarget, Span, Spanned};
use crate::util::normalize;
use std::rc::Rc;

impl Interpreter {
    /// `x is T` type test, or `x is True` truthiness comparison
    pub(crate) fn eval_is(
        &mut self,
        operand: &Spanned<Expr>,
        target: &IsTarget,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Value> {
        let value = self.eval(operand, env)?;
        match target {
            IsTarget::Value(rhs) => {
                let rhs = self.eval(rhs, env)?;
                Ok(Value::Bool(value.is_truthy() == rhs.is_truthy()))
            }
            IsTarget::Type(name) => {
                let result = self.is_instance(&value, &name.node);
                tracing::trace!(target = %name.node, result, line = span.line, "type test");
                Ok(Value::Bool(result))
            }
        }
    }

    /// Class-chain match first, then transitive interface conformance.
    /// Nil and non-objects are never instances.
    fn is_instance(&self, value: &Value, type_name: &str) -> bool {
        let Some(obj) = value.as_object() else {
            return false;
        };
        let class = Rc::clone(&obj.borrow().class);
        let key = self.registry.resolve_name(type_name);
        if class.ancestors().any(|c| c.key == key) {
            return true;
        }
        self.registry
            .interfaces
            .get(&key)
            .is_some_and(|intf| class_implements_interface(&class, intf))
    }

    /// `x as T`; every failure is a catchable exception
    pub(crate) fn cast_as(&mut self, value: Value, target: &str, span: Span) -> InterpResult<Value> {
        if let Some(prim) = Primitive::from_name(&self.registry.resolve_name(target)) {
            return self.primitive_cast(value, prim, span);
        }

        let value = match value {
            // An unassigned variant casts like nil
            Value::Variant(v) => v.value.unwrap_or(Value::Nil).unwrap_all(),
            Value::TypeCast(tc) => tc.value,
            other => other,
        };
        if matches!(value, Value::Nil) {
            return Ok(Value::Nil);
        }

        let class = self.registry.lookup_class(target);
        let intf = self.registry.lookup_interface(target);
        match (value, class, intf) {
            (Value::Interface(inst), Some(class), _) => {
                let Some(obj) = inst.object.clone() else {
                    let message = format!("cannot cast nil interface to class \"{}\"", class.name);
                    return Err(self.cast_error(&message, span));
                };
                let actual = Rc::clone(&obj.borrow().class);
                if !is_class_compatible(&actual, &class) {
                    let message = format!("cannot cast interface of \"{}\" to class \"{}\"", actual.name, class.name);
                    return Err(self.cast_error(&message, span));
                }
                Ok(Value::Object(obj))
            }
            (Value::Interface(inst), None, Some(intf)) => match inst.object.clone() {
                // A nil interface stays nil under the new interface type
                None => Ok(Value::Interface(Rc::new(InterfaceInstance {
                    interface: intf,
                    object: None,
                }))),
                Some(obj) => self.object_to_interface(obj, &intf, span),
            },
            (Value::Object(obj), Some(class), _) => {
                let actual = Rc::clone(&obj.borrow().class);
                if !is_class_compatible(&actual, &class) {
                    let message = format!("Cannot cast instance of type \"{}\" to class \"{}\"", actual.name, class.name);
                    return Err(self.cast_error(&message, span));
                }
                Ok(Value::Object(obj))
            }
            (Value::Object(obj), None, Some(intf)) => self.object_to_interface(obj, &intf, span),
            (other, Some(class), _) => {
                let message = format!("Cannot cast instance of type \"{}\" to class \"{}\"", other.type_name(), class.name);
                Err(self.cast_error(&message, span))
            }
            (other, None, Some(intf)) => {
                let message = format!(
                    "Cannot cast instance of type \"{}\" to interface \"{}\"",
                    other.type_name(),
                    intf.name
                );
                Err(self.cast_error(&message, span))
            }
            (_, None, None) => {
                let message = format!("type \"{target}\" not found (neither class nor interface)");
                Err(self.cast_error(&message, span))
            }
        }
    }

    /// Wrap an object in an interface it implements
    pub(crate) fn object_to_interface(
        &mut self,
        obj: ObjectRef,
        intf: &Rc<InterfaceInfo>,
        span: Span,
    ) -> InterpResult<Value> {
        let class = Rc::clone(&obj.borrow().class);
        if !class_implements_interface(&class, intf) {
            let message = format!("Cannot cast instance of type \"{}\" to interface \"{}\"", class.name, intf.name);
            return Err(self.cast_error(&message, span));
        }
        Ok(Value::Interface(Rc::new(InterfaceInstance {
            interface: Rc::clone(intf),
            object: Some(obj),
        })))
    }

    fn cast_error(&mut self, message: &str, span: Span) -> RuntimeError {
        let message = format!("{message} {}", span.location());
        self.exception("Exception", &message, span)
    }

    /// `x implements I`: only interfaces declared on the exact class count
    pub(crate) fn eval_implements(&mut self, value: Value, target: &str, span: Span) -> InterpResult<Value> {
        let Some(intf) = self.registry.lookup_interface(target) else {
            return Err(RuntimeError::unknown_type(target).at(span));
        };
        let class = match value.unwrap_all() {
            Value::Nil => return Ok(Value::Bool(false)),
            Value::Object(obj) => Rc::clone(&obj.borrow().class),
            Value::Interface(inst) => match &inst.object {
                Some(obj) => Rc::clone(&obj.borrow().class),
                None => return Ok(Value::Bool(false)),
            },
            Value::ClassRef(class) | Value::ClassInfo(class) => class,
            other => return Err(RuntimeError::type_error("object or class", &other.type_name()).at(span)),
        };
        Ok(Value::Bool(class_explicitly_implements_interface(&class, &intf)))
    }

    /// `Integer(x)`, `TFoo(obj)`, `IBar(obj)`; `Ok(None)` when `name` is
    /// not a castable type
    pub(crate) fn explicit_cast(
        &mut self,
        name: &str,
        args: &[Spanned<Expr>],
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Option<Value>> {
        let [arg] = args else {
            return Ok(None);
        };
        let resolved = self.registry.resolve_name(name);

        if normalize(name) == "char" || resolved == "char" {
            let value = self.eval(arg, env)?.unwrap_all();
            return match ordinal(&value) {
                Some(code) if !matches!(value, Value::Str(_)) => {
                    let c = u32::try_from(code).ok().and_then(char::from_u32).unwrap_or('\0');
                    Ok(Some(Value::Str(c.to_string())))
                }
                _ => self.primitive_cast(value, Primitive::String, span).map(Some),
            };
        }

        if let Some(prim) = Primitive::from_name(&resolved) {
            let value = self.eval(arg, env)?;
            return self.primitive_cast(value, prim, span).map(Some);
        }

        if let Some(info) = self.registry.lookup_enum(name) {
            let value = self.eval(arg, env)?.unwrap_all();
            return match ordinal(&value) {
                Some(n) if !matches!(value, Value::Str(_)) => Ok(Some(Value::Enum(EnumValue::new(&info, n)))),
                _ => Err(RuntimeError::type_error(&info.name, &value.type_name()).at(arg.span)),
            };
        }

        if let Some(class) = self.registry.lookup_class(name) {
            let value = self.eval(arg, env)?;
            return match self.cast_as(value, name, span)? {
                Value::Nil => Ok(Some(Value::Nil)),
                cast => Ok(Some(Value::TypeCast(Box::new(TypeCastValue { class, value: cast })))),
            };
        }

        if self.registry.lookup_interface(name).is_some() {
            let value = self.eval(arg, env)?;
            return self.cast_as(value, name, span).map(Some);
        }

        Ok(None)
    }

    /// Conversion to a scalar type through the variant rules
    pub(crate) fn primitive_cast(&mut self, value: Value, prim: Primitive, span: Span) -> InterpResult<Value> {
        match prim {
            Primitive::Integer => self.variant_to_int(&value, span),
            Primitive::Float => self.variant_to_float(&value, span),
            Primitive::String => Ok(Value::Str(variant_to_str(&value))),
            Primitive::Boolean => match value.clone().unwrap_all() {
                Value::Str(s) => Ok(Value::Bool(str_to_bool(&s))),
                _ => self.variant_to_bool(&value, span),
            },
            Primitive::Variant => Ok(value.copy_value().into_variant()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    const SHAPES: &str = "
type
  IShape = interface
    function Area: Float;
  end;
  ISolid = interface(IShape)
    function Volume: Float;
  end;
  TBase = class end;
  TCube = class(TBase, ISolid)
    function Area: Float;
    function Volume: Float;
  end;
  TBigCube = class(TCube) end;
  TOther = class end;
function TCube.Area: Float; begin Result := 6; end;
function TCube.Volume: Float; begin Result := 1; end;
";

    fn run(body: &str) -> (InterpResult<()>, String) {
        let source = format!("{SHAPES}{body}");
        let program = parse_source(&source).expect("parse");
        let (mut interp, out) = Interpreter::with_captured_output();
        let result = interp.run(&program);
        let text = out.borrow().clone();
        (result, text)
    }

    fn output(body: &str) -> String {
        let (result, text) = run(body);
        if let Err(e) = result {
            panic!("unexpected error: {e}\noutput so far: {text}");
        }
        text
    }

    #[test]
    fn test_is_walks_classes_and_interfaces() {
        let out = output(
            "var c := TBigCube.Create;
             PrintLn(c is TBase); PrintLn(c is TCube); PrintLn(c is IShape); PrintLn(c is TOther);
             var n: TBase := nil; PrintLn(n is TBase);",
        );
        assert_eq!(out, "True\nTrue\nTrue\nFalse\nFalse\n");
    }

    #[test]
    fn test_is_true_compares_truthiness() {
        assert_eq!(output("PrintLn(1 is True); PrintLn('' is False);"), "True\nTrue\n");
    }

    #[test]
    fn test_as_upcast_returns_same_object() {
        let out = output("var c := TCube.Create; var b := c as TBase; PrintLn(b = c); PrintLn(b.ClassName);");
        assert_eq!(out, "True\nTCube\n");
    }

    #[test]
    fn test_as_incompatible_class_raises() {
        let (result, _) = run("var o := TOther.Create; var c := o as TCube;");
        let err = result.expect_err("cast fails");
        let exc = err.exception_value().expect("catchable");
        assert_eq!(exc.class_name, "Exception");
        assert!(exc.message.starts_with("Cannot cast instance of type \"TOther\" to class \"TCube\" [line: "));
    }

    #[test]
    fn test_as_interface_round_trip() {
        let out = output(
            "var c := TBigCube.Create;
             var s := c as IShape;
             PrintLn(s.Area);
             var back := s as TCube;
             PrintLn(back.ClassName);",
        );
        assert_eq!(out, "6\nTBigCube\n");
    }

    #[test]
    fn test_nil_casts() {
        let out = output(
            "var o: TBase := nil;
             PrintLn(Assigned(o as TCube));
             var s: IShape;
             var t := s as ISolid;
             PrintLn(Assigned(t));",
        );
        assert_eq!(out, "False\nFalse\n");
        let (result, _) = run("var s: IShape; var c := s as TCube;");
        let message = result.expect_err("nil interface to class").message;
        assert!(message.starts_with("cannot cast nil interface to class \"TCube\""));
    }

    #[test]
    fn test_unknown_cast_target() {
        let (result, _) = run("var c := TCube.Create; var x := c as TMissing;");
        let message = result.expect_err("unknown type").message;
        assert!(message.starts_with("type \"TMissing\" not found (neither class nor interface) [line: "));
    }

    #[test]
    fn test_implements_is_explicit_only() {
        let out = output(
            "PrintLn(TCube implements ISolid);
             PrintLn(TBigCube implements ISolid);
             PrintLn(TBigCube.Create is ISolid);
             var n: TCube := nil;
             PrintLn(n implements ISolid);",
        );
        assert_eq!(out, "True\nFalse\nTrue\nFalse\n");
    }

    #[test]
    fn test_implements_unknown_interface_is_hard_error() {
        let (result, _) = run("PrintLn(TCube implements IMissing);");
        let err = result.expect_err("unknown interface");
        assert!(!err.is_exception());
    }

    #[test]
    fn test_primitive_casts() {
        let out = output(
            "PrintLn(Integer(3.9)); PrintLn(Integer(True)); PrintLn(Integer('12'));
             PrintLn(Boolean('yes')); PrintLn(Boolean('T')); PrintLn(Boolean('no'));
             PrintLn(String(42) + '!'); PrintLn(Char(65));",
        );
        assert_eq!(out, "3\n1\n12\nTrue\nTrue\nFalse\n42!\nA\n");
    }

    #[test]
    fn test_variant_as_primitive() {
        assert_eq!(output("var v: Variant := '7'; PrintLn((v as Integer) + 1);"), "8\n");
    }
}
