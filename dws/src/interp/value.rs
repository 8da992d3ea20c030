//! Runtime values for the interpreter

use super::env::EnvRef;
use super::refs::Reference;
use super::registry::{ClassInfo, EnumInfo, InterfaceInfo, MethodOwner, RecordInfo};
use crate::ast::{Expr, RoutineDecl, Spanned, TypeRef};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a class instance
pub type ObjectRef = Rc<RefCell<ObjectInstance>>;

/// Shared handle to array storage
pub type ArrayRef = Rc<RefCell<ArrayValue>>;

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit integer (all integer-like script types)
    Int(i64),
    /// 64-bit floating point
    Float(f64),
    Str(String),
    Bool(bool),
    /// `nil` object, interface or pointer
    Nil,
    /// Class instance (reference semantics)
    Object(ObjectRef),
    /// Object viewed through an interface
    Interface(Rc<InterfaceInstance>),
    /// Record (value semantics)
    Record(RecordValue),
    Variant(Box<VariantValue>),
    /// Routine, bound method or closure
    FuncPtr(Rc<FunctionPointer>),
    /// Dynamic arrays share storage; static arrays are copied on assignment
    Array(ArrayRef),
    Set(BTreeSet<i64>),
    /// Metaclass value (`class of T`, `obj.ClassType`)
    ClassRef(Rc<ClassInfo>),
    /// Bare class identifier used as a value (`TFoo implements IBar`)
    ClassInfo(Rc<ClassInfo>),
    /// Bare record type identifier (`TPoint.Origin`)
    RecordType(Rc<RecordInfo>),
    /// Member of an enumerated type
    Enum(EnumValue),
    /// Bare enumerated type identifier (`TColor.Red`, `for c in TColor`)
    EnumType(Rc<EnumInfo>),
    /// Object carrying an explicit static class (`TBase(obj)`)
    TypeCast(Box<TypeCastValue>),
    /// Binding of a `var`/`out` parameter or a by-reference `Self`
    Ref(Rc<Reference>),
    /// Unevaluated `lazy` argument
    Lazy(Rc<LazyThunk>),
}

/// Coarse runtime type of a value (also the `ActualType` of a variant)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Integer,
    Float,
    String,
    Boolean,
    Nil,
    Object,
    Interface,
    Record,
    Variant,
    FunctionPointer,
    Array,
    Set,
    Class,
    ClassInfo,
    RecordType,
    Enum,
    EnumType,
    TypeCast,
    Reference,
    Lazy,
    /// Variant holding nothing
    Empty,
    /// Variant holding the explicit `Null`
    Null,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeTag::Integer => "INTEGER",
            TypeTag::Float => "FLOAT",
            TypeTag::String => "STRING",
            TypeTag::Boolean => "BOOLEAN",
            TypeTag::Nil => "NIL",
            TypeTag::Object => "OBJECT",
            TypeTag::Interface => "INTERFACE",
            TypeTag::Record => "RECORD",
            TypeTag::Variant => "VARIANT",
            TypeTag::FunctionPointer => "FUNCTION_POINTER",
            TypeTag::Array => "ARRAY",
            TypeTag::Set => "SET",
            TypeTag::Class => "CLASS",
            TypeTag::ClassInfo => "CLASSINFO",
            TypeTag::RecordType => "RECORD_TYPE",
            TypeTag::Enum => "ENUM",
            TypeTag::EnumType => "ENUM_TYPE",
            TypeTag::TypeCast => "TYPE_CAST",
            TypeTag::Reference => "REFERENCE",
            TypeTag::Lazy => "LAZY",
            TypeTag::Empty => "UNASSIGNED",
            TypeTag::Null => "NULL",
        };
        write!(f, "{s}")
    }
}

pub struct ObjectInstance {
    pub class: Rc<ClassInfo>,
    /// Keyed by normalized field name, in declaration order (root class first)
    pub fields: IndexMap<String, Value>,
    pub destroyed: bool,
}

impl ObjectInstance {
    pub fn new(class: Rc<ClassInfo>) -> Self {
        ObjectInstance {
            class,
            fields: IndexMap::new(),
            destroyed: false,
        }
    }
}

impl fmt::Debug for ObjectInstance {
    // Field values may point back at this object; print names only
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectInstance")
            .field("class", &self.class.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

/// An object seen through an interface; the object may be nil
pub struct InterfaceInstance {
    pub interface: Rc<InterfaceInfo>,
    pub object: Option<ObjectRef>,
}

impl fmt::Debug for InterfaceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceInstance")
            .field("interface", &self.interface.name)
            .field("object", &self.object.as_ref().map(|o| o.borrow().class.name.clone()))
            .finish()
    }
}

#[derive(Clone)]
pub struct RecordValue {
    pub info: Rc<RecordInfo>,
    pub fields: IndexMap<String, Value>,
}

impl fmt::Debug for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordValue")
            .field("type", &self.info.name)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Enumeration member: the ordinal tagged with its type
#[derive(Clone)]
pub struct EnumValue {
    pub info: Rc<EnumInfo>,
    pub ordinal: i64,
}

impl EnumValue {
    pub fn new(info: &Rc<EnumInfo>, ordinal: i64) -> Self {
        EnumValue {
            info: Rc::clone(info),
            ordinal,
        }
    }

    /// Declared member name; `?` for an ordinal between members
    pub fn name(&self) -> String {
        self.info.name_of(self.ordinal).unwrap_or("?").to_string()
    }
}

impl fmt::Debug for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.info.name, self.ordinal)
    }
}

#[derive(Debug, Clone)]
pub struct VariantValue {
    pub value: Option<Value>,
    pub actual_type: TypeTag,
}

impl VariantValue {
    pub fn unassigned() -> Self {
        VariantValue {
            value: None,
            actual_type: TypeTag::Empty,
        }
    }

    pub fn null() -> Self {
        VariantValue {
            value: None,
            actual_type: TypeTag::Null,
        }
    }

    /// Unassigned, explicit Null or boxed nil
    pub fn is_nullish(&self) -> bool {
        matches!(self.value, None | Some(Value::Nil))
    }
}

/// Callable value: a routine plus the scope it closes over, and for
/// methods the receiver it is bound to
pub struct FunctionPointer {
    pub decl: Rc<RoutineDecl>,
    pub closure: EnvRef,
    pub receiver: Option<Value>,
    pub owner: Option<MethodOwner>,
}

impl fmt::Debug for FunctionPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionPointer")
            .field("name", &self.decl.name.node)
            .field("bound", &self.receiver.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ArrayValue {
    pub elems: Vec<Value>,
    /// Index of the first element (0 for dynamic arrays)
    pub low: i64,
    pub is_static: bool,
    /// Element type, used to fill new slots on `SetLength`
    pub elem_ty: Option<TypeRef>,
}

impl ArrayValue {
    pub fn dynamic(elems: Vec<Value>, elem_ty: Option<TypeRef>) -> Self {
        ArrayValue {
            elems,
            low: 0,
            is_static: false,
            elem_ty,
        }
    }

    pub fn high(&self) -> i64 {
        self.low + self.elems.len() as i64 - 1
    }

    /// Translate a script index into a vector slot
    pub fn slot(&self, index: i64) -> Option<usize> {
        let offset = index.checked_sub(self.low)?;
        usize::try_from(offset).ok().filter(|&i| i < self.elems.len())
    }

    pub fn into_ref(self) -> ArrayRef {
        Rc::new(RefCell::new(self))
    }
}

#[derive(Debug, Clone)]
pub struct TypeCastValue {
    pub class: Rc<ClassInfo>,
    pub value: Value,
}

/// Argument expression re-evaluated in the caller's scope on each use
pub struct LazyThunk {
    pub expr: Spanned<Expr>,
    pub env: EnvRef,
}

impl fmt::Debug for LazyThunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LazyThunk({})", self.expr.span)
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn unassigned() -> Self {
        Value::Variant(Box::new(VariantValue::unassigned()))
    }

    pub fn null() -> Self {
        Value::Variant(Box::new(VariantValue::null()))
    }

    /// Box into a variant; boxing a variant returns it unchanged
    pub fn into_variant(self) -> Value {
        match self {
            Value::Variant(_) => self,
            other => {
                let actual_type = other.type_tag();
                Value::Variant(Box::new(VariantValue {
                    value: Some(other),
                    actual_type,
                }))
            }
        }
    }

    /// Payload of a variant (nil when unassigned); other values unchanged
    pub fn unwrap_variant(self) -> Value {
        match self {
            Value::Variant(v) => v.value.unwrap_or(Value::Nil),
            other => other,
        }
    }

    /// Strip variant boxing and explicit type casts
    pub fn unwrap_all(self) -> Value {
        match self {
            Value::Variant(v) => v.value.map(Value::unwrap_all).unwrap_or(Value::Nil),
            Value::TypeCast(tc) => tc.value.unwrap_all(),
            other => other,
        }
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Int(_) => TypeTag::Integer,
            Value::Float(_) => TypeTag::Float,
            Value::Str(_) => TypeTag::String,
            Value::Bool(_) => TypeTag::Boolean,
            Value::Nil => TypeTag::Nil,
            Value::Object(_) => TypeTag::Object,
            Value::Interface(_) => TypeTag::Interface,
            Value::Record(_) => TypeTag::Record,
            Value::Variant(_) => TypeTag::Variant,
            Value::FuncPtr(_) => TypeTag::FunctionPointer,
            Value::Array(_) => TypeTag::Array,
            Value::Set(_) => TypeTag::Set,
            Value::ClassRef(_) => TypeTag::Class,
            Value::ClassInfo(_) => TypeTag::ClassInfo,
            Value::RecordType(_) => TypeTag::RecordType,
            Value::Enum(_) => TypeTag::Enum,
            Value::EnumType(_) => TypeTag::EnumType,
            Value::TypeCast(_) => TypeTag::TypeCast,
            Value::Ref(_) => TypeTag::Reference,
            Value::Lazy(_) => TypeTag::Lazy,
        }
    }

    /// Script-level type name for error messages
    pub fn type_name(&self) -> String {
        match self {
            Value::Int(_) => "Integer".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Str(_) => "String".to_string(),
            Value::Bool(_) => "Boolean".to_string(),
            Value::Nil => "nil".to_string(),
            Value::Object(obj) => obj.borrow().class.name.clone(),
            Value::Interface(intf) => intf.interface.name.clone(),
            Value::Record(rec) => rec.info.name.clone(),
            Value::Variant(_) => "Variant".to_string(),
            Value::FuncPtr(_) => "function pointer".to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Set(_) => "set".to_string(),
            Value::ClassRef(class) | Value::ClassInfo(class) => format!("class of {}", class.name),
            Value::RecordType(info) => info.name.clone(),
            Value::Enum(e) => e.info.name.clone(),
            Value::EnumType(info) => info.name.clone(),
            Value::TypeCast(tc) => tc.class.name.clone(),
            Value::Ref(_) => "reference".to_string(),
            Value::Lazy(_) => "lazy expression".to_string(),
        }
    }

    /// Truthiness: booleans, non-zero numbers, non-empty strings; nil and
    /// empty variants are false; anything else is true
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Nil => false,
            Value::Variant(v) => v.value.as_ref().is_some_and(Value::is_truthy),
            Value::Interface(intf) => intf.object.is_some(),
            Value::TypeCast(tc) => tc.value.is_truthy(),
            _ => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Variant(v) => v.value.as_ref().and_then(Value::as_int),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            Value::Variant(v) => v.value.as_ref().and_then(Value::as_float),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Variant(v) => v.value.as_ref().and_then(Value::as_bool),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Variant(v) => v.value.as_ref().and_then(Value::as_str),
            _ => None,
        }
    }

    /// Object behind an object, interface or type-cast value
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj.clone()),
            Value::Interface(intf) => intf.object.clone(),
            Value::TypeCast(tc) => tc.value.as_object(),
            Value::Variant(v) => v.value.as_ref().and_then(Value::as_object),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::Interface(intf) => intf.object.is_none(),
            Value::TypeCast(tc) => tc.value.is_nil(),
            _ => false,
        }
    }

    /// Copy with value semantics: records and static arrays are duplicated
    /// deeply, everything else is shared
    pub fn copy_value(&self) -> Value {
        match self {
            Value::Record(rec) => Value::Record(RecordValue {
                info: rec.info.clone(),
                fields: rec
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.copy_value()))
                    .collect(),
            }),
            Value::Array(arr) if arr.borrow().is_static => Value::Array(deep_copy_array(arr)),
            Value::Variant(v) => Value::Variant(Box::new(VariantValue {
                value: v.value.as_ref().map(Value::copy_value),
                actual_type: v.actual_type,
            })),
            other => other.clone(),
        }
    }
}

/// Fresh array storage with every element copied by value
pub fn deep_copy_array(arr: &ArrayRef) -> ArrayRef {
    let src = arr.borrow();
    ArrayValue {
        elems: src.elems.iter().map(Value::copy_value).collect(),
        low: src.low,
        is_static: src.is_static,
        elem_ty: src.elem_ty.clone(),
    }
    .into_ref()
}

/// Float rendering: up to 15 significant digits, no trailing zeros
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    if x.fract() == 0.0 && x.abs() < 1e15 {
        return format!("{x:.0}");
    }
    let rounded: f64 = format!("{x:.14e}").parse().unwrap_or(x);
    format!("{rounded}")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Nil => write!(f, "nil"),
            Value::Object(obj) => write!(f, "{}", obj.borrow().class.name),
            Value::Interface(intf) => match &intf.object {
                Some(obj) => write!(f, "{}", obj.borrow().class.name),
                None => write!(f, "nil"),
            },
            Value::Record(rec) => {
                write!(f, "(")?;
                for (i, (key, value)) in rec.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    let name = rec.info.fields.get(key).map_or(key.as_str(), |fi| fi.name.as_str());
                    write!(f, "{name}: {value}")?;
                }
                write!(f, ")")
            }
            Value::Variant(v) => match (&v.value, v.actual_type) {
                (Some(inner), _) => write!(f, "{inner}"),
                (None, TypeTag::Null) => write!(f, "Null"),
                (None, _) => Ok(()),
            },
            Value::FuncPtr(fp) => write!(f, "<function {}>", fp.decl.name.node),
            Value::Array(arr) => {
                write!(f, "[")?;
                for (i, elem) in arr.borrow().elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, "]")
            }
            Value::Set(set) => {
                write!(f, "[")?;
                for (i, elem) in set.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, "]")
            }
            Value::ClassRef(class) | Value::ClassInfo(class) => write!(f, "{}", class.name),
            Value::RecordType(info) => write!(f, "{}", info.name),
            Value::Enum(e) => write!(f, "{}", e.ordinal),
            Value::EnumType(info) => write!(f, "{}", info.name),
            Value::TypeCast(tc) => write!(f, "{}", tc.value),
            Value::Ref(_) => write!(f, "<reference>"),
            Value::Lazy(_) => write!(f, "<lazy>"),
        }
    }
}

impl PartialEq for Value {
    /// Structural for plain data, identity for anything with shared state
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Interface(a), Value::Interface(b)) => match (&a.object, &b.object) {
                (Some(x), Some(y)) => Rc::ptr_eq(x, y),
                (None, None) => true,
                _ => false,
            },
            (Value::Interface(i), Value::Nil) | (Value::Nil, Value::Interface(i)) => i.object.is_none(),
            (Value::Interface(i), Value::Object(o)) | (Value::Object(o), Value::Interface(i)) => {
                i.object.as_ref().is_some_and(|x| Rc::ptr_eq(x, o))
            }
            (Value::Record(a), Value::Record(b)) => {
                Rc::ptr_eq(&a.info, &b.info) && a.fields == b.fields
            }
            (Value::Variant(a), Value::Variant(b)) => a.value == b.value,
            (Value::FuncPtr(a), Value::FuncPtr(b)) => {
                Rc::ptr_eq(&a.decl, &b.decl)
                    && match (&a.receiver, &b.receiver) {
                        (Some(x), Some(y)) => x == y,
                        (None, None) => Rc::ptr_eq(&a.closure, &b.closure),
                        _ => false,
                    }
            }
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || a.borrow().elems == b.borrow().elems,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::ClassRef(a) | Value::ClassInfo(a), Value::ClassRef(b) | Value::ClassInfo(b)) => {
                Rc::ptr_eq(a, b)
            }
            (Value::RecordType(a), Value::RecordType(b)) => Rc::ptr_eq(a, b),
            (Value::Enum(a), Value::Enum(b)) => Rc::ptr_eq(&a.info, &b.info) && a.ordinal == b.ordinal,
            (Value::EnumType(a), Value::EnumType(b)) => Rc::ptr_eq(a, b),
            (Value::TypeCast(a), b) => a.value == *b,
            (a, Value::TypeCast(b)) => *a == b.value,
            _ => false,
        }
    }
}
