//! Declared types at run time: resolution, zero values, implicit
//! conversions and overload scoring

use super::error::{InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::registry::{ClassInfo, EnumInfo, InterfaceInfo, RecordInfo, class_implements_interface};
use super::value::{ArrayValue, EnumValue, InterfaceInstance, RecordValue, Value};
use crate::ast::{Span, TypeRef};
use crate::util::normalize;
use std::collections::BTreeSet;
use std::rc::Rc;

/// Built-in scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Integer,
    Float,
    String,
    Boolean,
    Variant,
}

impl Primitive {
    /// Map a type name (including the usual Pascal aliases) to a primitive
    pub fn from_name(name: &str) -> Option<Primitive> {
        let prim = match normalize(name).as_str() {
            "integer" | "int64" | "int32" | "int16" | "int8" | "byte" | "word" | "cardinal"
            | "longint" | "longword" | "shortint" | "smallint" | "uint64" | "uint32"
            | "nativeint" | "nativeuint" => Primitive::Integer,
            "float" | "double" | "real" | "extended" | "single" | "currency" | "tdatetime" => {
                Primitive::Float
            }
            "string" | "char" | "widechar" | "ansichar" | "ansistring" | "unicodestring"
            | "widestring" => Primitive::String,
            "boolean" | "bytebool" | "wordbool" | "longbool" => Primitive::Boolean,
            "variant" | "olevariant" => Primitive::Variant,
            _ => return None,
        };
        Some(prim)
    }

    /// Key used to attach helpers to the type
    pub fn key(self) -> &'static str {
        match self {
            Primitive::Integer => "integer",
            Primitive::Float => "float",
            Primitive::String => "string",
            Primitive::Boolean => "boolean",
            Primitive::Variant => "variant",
        }
    }

    pub fn zero(self) -> Value {
        match self {
            Primitive::Integer => Value::Int(0),
            Primitive::Float => Value::Float(0.0),
            Primitive::String => Value::Str(String::new()),
            Primitive::Boolean => Value::Bool(false),
            Primitive::Variant => Value::unassigned(),
        }
    }
}

/// A declared type resolved against the registry
#[derive(Debug, Clone)]
pub enum RuntimeType {
    Primitive(Primitive),
    Class(Rc<ClassInfo>),
    Interface(Rc<InterfaceInfo>),
    Record(Rc<RecordInfo>),
    Enum(Rc<EnumInfo>),
    ClassOf(Rc<ClassInfo>),
    Array,
    Set,
    Routine,
    /// Unresolved name; accepts anything
    Unknown,
}

impl RuntimeType {
    /// How well `value` fits a parameter of this type: `None` when it does
    /// not fit at all, higher is better
    pub fn match_score(&self, value: &Value) -> Option<u32> {
        let value = match value {
            Value::TypeCast(tc) => &tc.value,
            other => other,
        };
        match (self, value) {
            (RuntimeType::Primitive(Primitive::Variant), Value::Variant(_)) => Some(3),
            (RuntimeType::Primitive(Primitive::Variant), _) => Some(1),
            (RuntimeType::Primitive(_), Value::Variant(_)) => Some(1),
            (RuntimeType::Primitive(Primitive::Integer), Value::Int(_)) => Some(3),
            (RuntimeType::Primitive(Primitive::Float), Value::Float(_)) => Some(3),
            (RuntimeType::Primitive(Primitive::Float), Value::Int(_)) => Some(2),
            (RuntimeType::Primitive(Primitive::String), Value::Str(_)) => Some(3),
            (RuntimeType::Primitive(Primitive::Boolean), Value::Bool(_)) => Some(3),
            (RuntimeType::Class(target), Value::Object(obj)) => {
                let class = Rc::clone(&obj.borrow().class);
                if class.key == target.key {
                    Some(3)
                } else if class.inherits_from(&target.key) {
                    Some(2)
                } else {
                    None
                }
            }
            (RuntimeType::Interface(target), Value::Interface(inst)) => {
                inst.interface.extends(&target.key).then_some(3)
            }
            (RuntimeType::Interface(target), Value::Object(obj)) => {
                class_implements_interface(&obj.borrow().class, target).then_some(2)
            }
            (RuntimeType::Record(target), Value::Record(rec)) => (rec.info.key == target.key).then_some(3),
            (RuntimeType::Enum(target), Value::Enum(e)) => Rc::ptr_eq(&e.info, target).then_some(3),
            (RuntimeType::ClassOf(target), Value::ClassRef(c) | Value::ClassInfo(c)) => {
                c.inherits_from(&target.key).then_some(3)
            }
            (
                RuntimeType::Class(_) | RuntimeType::Interface(_) | RuntimeType::ClassOf(_) | RuntimeType::Routine,
                Value::Nil,
            ) => Some(1),
            (RuntimeType::Array, Value::Array(_)) => Some(3),
            (RuntimeType::Set, Value::Set(_)) => Some(3),
            (RuntimeType::Set, Value::Array(_)) => Some(2),
            (RuntimeType::Routine, Value::FuncPtr(_)) => Some(3),
            (RuntimeType::Unknown, _) => Some(1),
            _ => None,
        }
    }
}

/// Helper-table key for a declared type
pub fn helper_key_for_type(ty: &TypeRef) -> String {
    match ty {
        TypeRef::Named(name) => Primitive::from_name(name)
            .map(|p| p.key().to_string())
            .unwrap_or_else(|| normalize(name)),
        TypeRef::Array { .. } => "array".to_string(),
        TypeRef::Set(_) => "set".to_string(),
        TypeRef::ClassOf(name) => normalize(name),
        TypeRef::Routine { .. } => "routine".to_string(),
    }
}

/// Helper-table keys that apply to a value, most specific first
pub fn helper_keys_for_value(value: &Value) -> Vec<String> {
    match value {
        Value::Int(_) => vec!["integer".to_string()],
        Value::Float(_) => vec!["float".to_string()],
        Value::Str(_) => vec!["string".to_string()],
        Value::Bool(_) => vec!["boolean".to_string()],
        Value::Variant(_) => vec!["variant".to_string()],
        Value::Record(rec) => vec![rec.info.key.clone()],
        Value::RecordType(info) => vec![info.key.clone()],
        Value::Enum(e) => vec![e.info.key.clone()],
        Value::EnumType(info) => vec![info.key.clone()],
        Value::Object(obj) => obj.borrow().class.ancestors().map(|c| c.key.clone()).collect(),
        Value::ClassRef(c) | Value::ClassInfo(c) => c.ancestors().map(|c| c.key.clone()).collect(),
        Value::Array(_) => vec!["array".to_string()],
        Value::Set(_) => vec!["set".to_string()],
        _ => Vec::new(),
    }
}

impl Interpreter {
    /// Resolve a declared type; unknown names resolve to `Unknown`
    pub fn runtime_type(&self, ty: &TypeRef) -> RuntimeType {
        match ty {
            TypeRef::Named(name) => {
                if let Some(prim) = Primitive::from_name(name) {
                    return RuntimeType::Primitive(prim);
                }
                let key = self.registry.resolve_name(name);
                if let Some(prim) = Primitive::from_name(&key) {
                    RuntimeType::Primitive(prim)
                } else if let Some(class) = self.registry.classes.get(&key) {
                    RuntimeType::Class(Rc::clone(class))
                } else if let Some(intf) = self.registry.interfaces.get(&key) {
                    RuntimeType::Interface(Rc::clone(intf))
                } else if let Some(rec) = self.registry.records.get(&key) {
                    RuntimeType::Record(Rc::clone(rec))
                } else if let Some(info) = self.registry.enums.get(&key) {
                    RuntimeType::Enum(Rc::clone(info))
                } else if let Some(target) = self.registry.aliases.get(&key).cloned() {
                    self.runtime_type(&target)
                } else {
                    RuntimeType::Unknown
                }
            }
            TypeRef::Array { .. } => RuntimeType::Array,
            TypeRef::Set(_) => RuntimeType::Set,
            TypeRef::ClassOf(name) => match self.registry.lookup_class(name) {
                Some(class) => RuntimeType::ClassOf(class),
                None => RuntimeType::Unknown,
            },
            TypeRef::Routine { .. } => RuntimeType::Routine,
        }
    }

    /// Default value of a freshly declared variable or field
    pub fn zero_value(&mut self, ty: &TypeRef) -> InterpResult<Value> {
        match ty {
            TypeRef::Named(name) => {
                if let Some(prim) = Primitive::from_name(name) {
                    return Ok(prim.zero());
                }
                let key = self.registry.resolve_name(name);
                if let Some(prim) = Primitive::from_name(&key) {
                    return Ok(prim.zero());
                }
                if let Some(intf) = self.registry.interfaces.get(&key) {
                    return Ok(Value::Interface(Rc::new(InterfaceInstance {
                        interface: Rc::clone(intf),
                        object: None,
                    })));
                }
                if let Some(rec) = self.registry.records.get(&key).cloned() {
                    return self.new_record(&rec);
                }
                if let Some(info) = self.registry.enums.get(&key) {
                    return Ok(Value::Enum(EnumValue::new(info, info.low())));
                }
                if let Some(target) = self.registry.aliases.get(&key).cloned() {
                    if target.as_name().is_none() {
                        return self.zero_value(&target);
                    }
                }
                Ok(Value::Nil)
            }
            TypeRef::Array { bounds: None, elem } => Ok(Value::Array(
                ArrayValue::dynamic(Vec::new(), Some((**elem).clone())).into_ref(),
            )),
            TypeRef::Array {
                bounds: Some((low, high)),
                elem,
            } => {
                let env = self.global_env.clone();
                let low_span = low.span;
                let low = self.eval(low, &env)?;
                let high = self.eval(high, &env)?;
                let (Some(low), Some(high)) = (ordinal(&low), ordinal(&high)) else {
                    return Err(RuntimeError::type_error("ordinal array bounds", &low.type_name()).at(low_span));
                };
                let len = usize::try_from(high - low + 1).unwrap_or(0);
                let mut elems = Vec::with_capacity(len);
                for _ in 0..len {
                    elems.push(self.zero_value(elem)?);
                }
                Ok(Value::Array(
                    ArrayValue {
                        elems,
                        low,
                        is_static: true,
                        elem_ty: Some((**elem).clone()),
                    }
                    .into_ref(),
                ))
            }
            TypeRef::Set(_) => Ok(Value::Set(BTreeSet::new())),
            TypeRef::ClassOf(_) | TypeRef::Routine { .. } => Ok(Value::Nil),
        }
    }

    /// A record with every field at its initializer or zero value
    pub fn new_record(&mut self, info: &Rc<RecordInfo>) -> InterpResult<Value> {
        let mut fields = indexmap::IndexMap::new();
        for (key, field) in &info.fields {
            let value = match (&field.init, &field.ty) {
                (Some(init), _) => {
                    let env = super::env::child_env(&self.global_env);
                    self.eval(init, &env)?
                }
                (None, Some(ty)) => self.zero_value(ty)?,
                (None, None) => Value::Nil,
            };
            fields.insert(key.clone(), value);
        }
        Ok(Value::Record(RecordValue {
            info: Rc::clone(info),
            fields,
        }))
    }

    /// Implicit conversion of a value into a declared parameter, variable
    /// or result type
    pub fn coerce_to(&mut self, value: Value, ty: &RuntimeType, span: Span) -> InterpResult<Value> {
        let value = strip_cast(value);
        match (ty, value) {
            (RuntimeType::Primitive(Primitive::Variant), v) => Ok(v.copy_value().into_variant()),
            (RuntimeType::Primitive(prim), Value::Variant(v)) => {
                let inner = Value::Variant(v);
                match prim {
                    Primitive::Integer => self.variant_to_int(&inner, span),
                    Primitive::Float => self.variant_to_float(&inner, span),
                    Primitive::String => Ok(Value::Str(super::variant::variant_to_str(&inner))),
                    Primitive::Boolean => self.variant_to_bool(&inner, span),
                    Primitive::Variant => Ok(inner),
                }
            }
            (RuntimeType::Primitive(Primitive::Float), Value::Int(n)) => Ok(Value::Float(n as f64)),
            (RuntimeType::Interface(intf), v) => self.wrap_interface(v, intf, span),
            (RuntimeType::Set, Value::Array(arr)) => Ok(Value::Set(array_to_set(&arr.borrow().elems))),
            (_, v) => Ok(v.copy_value()),
        }
    }

    /// Conversion applied when storing into a slot that already holds a
    /// value; the current value stands in for the slot's declared type
    pub fn coerce_assign(&mut self, current: &Value, value: Value, span: Span) -> InterpResult<Value> {
        match (current, strip_cast(value)) {
            (Value::Float(_), Value::Int(n)) => Ok(Value::Float(n as f64)),
            (Value::Variant(_), v) => Ok(v.copy_value().into_variant()),
            (Value::Int(_), v @ Value::Variant(_)) => self.variant_to_int(&v, span),
            (Value::Float(_), v @ Value::Variant(_)) => self.variant_to_float(&v, span),
            (Value::Str(_), v @ Value::Variant(_)) => Ok(Value::Str(super::variant::variant_to_str(&v))),
            (Value::Bool(_), v @ Value::Variant(_)) => self.variant_to_bool(&v, span),
            (Value::Interface(cur), v) => {
                let intf = Rc::clone(&cur.interface);
                self.wrap_interface(v, &intf, span)
            }
            (Value::Set(_), Value::Array(arr)) => Ok(Value::Set(array_to_set(&arr.borrow().elems))),
            (_, v) => Ok(v.copy_value()),
        }
    }

    /// View a value through an interface type
    fn wrap_interface(&mut self, value: Value, intf: &Rc<InterfaceInfo>, span: Span) -> InterpResult<Value> {
        match value.unwrap_all() {
            Value::Nil => Ok(Value::Interface(Rc::new(InterfaceInstance {
                interface: Rc::clone(intf),
                object: None,
            }))),
            Value::Interface(inst) if inst.interface.extends(&intf.key) => Ok(Value::Interface(inst)),
            Value::Interface(inst) => match &inst.object {
                Some(obj) => {
                    let obj = Rc::clone(obj);
                    self.object_to_interface(obj, intf, span)
                }
                None => Ok(Value::Interface(Rc::new(InterfaceInstance {
                    interface: Rc::clone(intf),
                    object: None,
                }))),
            },
            Value::Object(obj) => self.object_to_interface(obj, intf, span),
            other => Err(RuntimeError::type_error(&intf.name, &other.type_name()).at(span)),
        }
    }
}

/// Drop an explicit cast once the value is stored
fn strip_cast(value: Value) -> Value {
    match value {
        Value::TypeCast(tc) => tc.value,
        other => other,
    }
}

/// Integer value of an ordinal (integers, booleans, single characters,
/// enumeration members)
pub fn ordinal(value: &Value) -> Option<i64> {
    match value {
        Value::Int(n) => Some(*n),
        Value::Enum(e) => Some(e.ordinal),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Str(s) if s.chars().count() == 1 => s.chars().next().map(|c| c as i64),
        Value::Variant(v) => v.value.as_ref().and_then(ordinal),
        _ => None,
    }
}

/// Set members from array-literal elements
pub fn array_to_set(elems: &[Value]) -> BTreeSet<i64> {
    elems.iter().filter_map(ordinal).collect()
}
