//! Storage locations
//!
//! A [`Reference`] names a slot that can be read and written later: a
//! variable in a particular scope, an object field, a class var, an array
//! element, a record field inside another location or a character of a
//! string. `var`/`out` parameters and by-reference `Self` are bound to
//! references, so writes in the callee land in the caller's slot.

use super::env::{owner_of, EnvRef};
use super::error::{InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::registry::VarStore;
use super::types::ordinal;
use super::value::{ArrayRef, ObjectRef, Value};
use crate::ast::{Expr, Spanned};
use crate::util::normalize;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub enum Reference {
    /// Variable `name` in scope `env`
    Var { env: EnvRef, name: String },
    /// Instance field (normalized key)
    Field { object: ObjectRef, name: String },
    /// `class var` slot of a class, record or helper
    Static { store: VarStore, name: String },
    /// Array element by script index
    Element { array: ArrayRef, index: i64 },
    /// Record field of the value stored at `base`
    Member { base: Rc<Reference>, name: String },
    /// 1-based character of the string stored at `base`
    Char { base: Rc<Reference>, index: i64 },
    /// Anonymous temporary
    Cell(Rc<RefCell<Value>>),
}

impl Reference {
    pub fn cell(value: Value) -> Rc<Reference> {
        Rc::new(Reference::Cell(Rc::new(RefCell::new(value))))
    }

    pub fn get(&self) -> InterpResult<Value> {
        match self {
            Reference::Var { env, name } => match env.borrow().get_local(name) {
                Some(Value::Ref(inner)) => inner.get(),
                Some(value) => Ok(value),
                None => Err(RuntimeError::undefined_variable(name)),
            },
            Reference::Field { object, name } => object
                .borrow()
                .fields
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::undefined_variable(name)),
            Reference::Static { store, name } => store
                .borrow()
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::undefined_variable(name)),
            Reference::Element { array, index } => {
                let array = array.borrow();
                match array.slot(*index) {
                    Some(slot) => Ok(array.elems[slot].clone()),
                    None => Err(RuntimeError::index_out_of_bounds(*index, array.low, array.high())),
                }
            }
            Reference::Member { base, name } => match base.get()?.unwrap_all() {
                Value::Record(rec) => rec
                    .fields
                    .get(name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::undefined_variable(name)),
                Value::Object(obj) => obj
                    .borrow()
                    .fields
                    .get(name)
                    .cloned()
                    .ok_or_else(|| RuntimeError::undefined_variable(name)),
                other => Err(RuntimeError::type_error("record", &other.type_name())),
            },
            Reference::Char { base, index } => match base.get()?.unwrap_variant() {
                Value::Str(s) => char_at(&s, *index)
                    .map(|c| Value::Str(c.to_string()))
                    .ok_or_else(|| RuntimeError::index_out_of_bounds(*index, 1, s.chars().count() as i64)),
                other => Err(RuntimeError::type_error("String", &other.type_name())),
            },
            Reference::Cell(cell) => Ok(cell.borrow().clone()),
        }
    }

    pub fn set(&self, value: Value) -> InterpResult<()> {
        match self {
            Reference::Var { env, name } => {
                let existing = env.borrow().get_local(name);
                match existing {
                    Some(Value::Ref(inner)) => inner.set(value),
                    _ => {
                        env.borrow_mut().define(name, value);
                        Ok(())
                    }
                }
            }
            Reference::Field { object, name } => {
                object.borrow_mut().fields.insert(name.clone(), value);
                Ok(())
            }
            Reference::Static { store, name } => {
                store.borrow_mut().insert(name.clone(), value);
                Ok(())
            }
            Reference::Element { array, index } => {
                let mut array = array.borrow_mut();
                match array.slot(*index) {
                    Some(slot) => {
                        array.elems[slot] = value;
                        Ok(())
                    }
                    None => Err(RuntimeError::index_out_of_bounds(*index, array.low, array.high())),
                }
            }
            Reference::Member { base, name } => match base.get()? {
                Value::Record(mut rec) => {
                    rec.fields.insert(name.clone(), value);
                    base.set(Value::Record(rec))
                }
                other => match other.as_object() {
                    Some(obj) => {
                        obj.borrow_mut().fields.insert(name.clone(), value);
                        Ok(())
                    }
                    None => Err(RuntimeError::type_error("record", &other.type_name())),
                },
            },
            Reference::Char { base, index } => {
                let Value::Str(s) = base.get()?.unwrap_variant() else {
                    return Err(RuntimeError::type_error("String", "non-string"));
                };
                let Some(replacement) = value.as_str().and_then(|r| r.chars().next()) else {
                    return Err(RuntimeError::type_error("Char", &value.type_name()));
                };
                let mut chars: Vec<char> = s.chars().collect();
                let slot = usize::try_from(*index - 1)
                    .ok()
                    .filter(|&i| i < chars.len())
                    .ok_or_else(|| RuntimeError::index_out_of_bounds(*index, 1, chars.len() as i64))?;
                chars[slot] = replacement;
                base.set(Value::Str(chars.into_iter().collect()))
            }
            Reference::Cell(cell) => {
                *cell.borrow_mut() = value;
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Var { name, .. } => write!(f, "Var({name})"),
            Reference::Field { name, .. } => write!(f, "Field({name})"),
            Reference::Static { name, .. } => write!(f, "Static({name})"),
            Reference::Element { index, .. } => write!(f, "Element({index})"),
            Reference::Member { base, name } => write!(f, "Member({base:?}.{name})"),
            Reference::Char { base, index } => write!(f, "Char({base:?}[{index}])"),
            Reference::Cell(_) => write!(f, "Cell"),
        }
    }
}

/// 1-based character access
pub fn char_at(s: &str, index: i64) -> Option<char> {
    let index = usize::try_from(index.checked_sub(1)?).ok()?;
    s.chars().nth(index)
}

impl Interpreter {
    /// Location designated by an expression, or `None` when the expression
    /// is not a variable (literals, calls, properties, ...)
    pub fn lvalue(&mut self, expr: &Spanned<Expr>, env: &EnvRef) -> InterpResult<Option<Rc<Reference>>> {
        match &expr.node {
            Expr::Ident(name) => self.ident_ref(name, env),
            Expr::SelfRef => Ok(self.self_ref(env)),
            Expr::Member { object, member } => {
                let key = normalize(&member.node);
                let base = self.eval(object, env)?;
                match base.unwrap_variant() {
                    Value::Record(rec) => {
                        if !rec.fields.contains_key(&key) {
                            return Ok(rec.info.members.has_class_var(&key).then(|| {
                                Rc::new(Reference::Static {
                                    store: Rc::clone(&rec.info.members.class_vars),
                                    name: key.clone(),
                                })
                            }));
                        }
                        let container = match self.lvalue(object, env)? {
                            Some(r) => r,
                            None => Reference::cell(Value::Record(rec)),
                        };
                        Ok(Some(Rc::new(Reference::Member { base: container, name: key })))
                    }
                    Value::ClassRef(class) | Value::ClassInfo(class) => Ok(class.find_class_var(&key).map(|owner| {
                        Rc::new(Reference::Static {
                            store: Rc::clone(&owner.members.class_vars),
                            name: key,
                        })
                    })),
                    Value::RecordType(info) => Ok(info.members.has_class_var(&key).then(|| {
                        Rc::new(Reference::Static {
                            store: Rc::clone(&info.members.class_vars),
                            name: key,
                        })
                    })),
                    other => Ok(other.as_object().and_then(|obj| object_slot(&obj, &key))),
                }
            }
            Expr::Index { object, indices } => {
                let mut base_ref = self.lvalue(object, env)?;
                let mut current = self.eval(object, env)?;
                for index_expr in indices {
                    let index_value = self.eval(index_expr, env)?;
                    let Some(index) = ordinal(&index_value) else {
                        return Err(RuntimeError::type_error("ordinal index", &index_value.type_name())
                            .at(index_expr.span));
                    };
                    let next = match current.unwrap_variant() {
                        Value::Array(array) => {
                            if array.borrow().slot(index).is_none() {
                                return Err(self.range_error(&array, index, index_expr.span));
                            }
                            Rc::new(Reference::Element { array, index })
                        }
                        Value::Str(_) => match base_ref {
                            Some(base) => Rc::new(Reference::Char { base, index }),
                            None => return Ok(None),
                        },
                        _ => return Ok(None),
                    };
                    current = next.get().map_err(|e| e.at(index_expr.span))?;
                    base_ref = Some(next);
                }
                Ok(base_ref)
            }
            _ => Ok(None),
        }
    }

    fn ident_ref(&mut self, name: &str, env: &EnvRef) -> InterpResult<Option<Rc<Reference>>> {
        let found = env.borrow().get_scoped(name);
        if let Some((binding, false)) = &found {
            return Ok(Some(binding_ref(binding, env, name)));
        }

        if let Some(r) = self.self_member_ref(name, env) {
            return Ok(Some(r));
        }

        match found {
            Some((binding, true)) => Ok(Some(binding_ref(&binding, env, name))),
            _ => Ok(None),
        }
    }

    /// Field or class var of the current `Self`
    fn self_member_ref(&mut self, name: &str, env: &EnvRef) -> Option<Rc<Reference>> {
        let key = normalize(name);
        let raw_self = env.borrow().get("self")?;
        let self_value = match &raw_self {
            Value::Ref(r) => r.get().ok()?,
            other => other.clone(),
        };

        let found = match self_value.unwrap_variant() {
            Value::Record(rec) if rec.fields.contains_key(&key) => {
                let base = self.self_ref(env)?;
                Some(Rc::new(Reference::Member { base, name: key.clone() }))
            }
            Value::Record(rec) => rec.info.members.has_class_var(&key).then(|| {
                Rc::new(Reference::Static {
                    store: Rc::clone(&rec.info.members.class_vars),
                    name: key.clone(),
                })
            }),
            Value::ClassRef(class) | Value::ClassInfo(class) => class.find_class_var(&key).map(|owner| {
                Rc::new(Reference::Static {
                    store: Rc::clone(&owner.members.class_vars),
                    name: key.clone(),
                })
            }),
            Value::RecordType(info) => info.members.has_class_var(&key).then(|| {
                Rc::new(Reference::Static {
                    store: Rc::clone(&info.members.class_vars),
                    name: key.clone(),
                })
            }),
            other => other.as_object().and_then(|obj| object_slot(&obj, &key)),
        };
        if found.is_some() {
            return found;
        }

        // Class vars declared on the helper of the running method
        let owner = self.current_owner()?;
        owner.members().has_class_var(&key).then(|| {
            Rc::new(Reference::Static {
                store: Rc::clone(&owner.members().class_vars),
                name: key,
            })
        })
    }

    /// Location of `Self` (by-reference for record methods)
    pub fn self_ref(&self, env: &EnvRef) -> Option<Rc<Reference>> {
        match env.borrow().get("self")? {
            Value::Ref(r) => Some(r),
            _ => owner_of(env, "self").map(|owner| {
                Rc::new(Reference::Var {
                    env: owner,
                    name: "self".to_string(),
                })
            }),
        }
    }
}

/// Reference for an existing binding: reuse a bound reference, otherwise
/// point at the scope that holds the variable
fn binding_ref(binding: &Value, env: &EnvRef, name: &str) -> Rc<Reference> {
    if let Value::Ref(r) = binding {
        return Rc::clone(r);
    }
    let owner = owner_of(env, name).unwrap_or_else(|| Rc::clone(env));
    Rc::new(Reference::Var {
        env: owner,
        name: normalize(name),
    })
}

/// Field or class var slot of an object
pub(crate) fn object_slot(obj: &ObjectRef, key: &str) -> Option<Rc<Reference>> {
    if obj.borrow().fields.contains_key(key) {
        return Some(Rc::new(Reference::Field {
            object: Rc::clone(obj),
            name: key.to_string(),
        }));
    }
    let class = Rc::clone(&obj.borrow().class);
    class.find_class_var(key).map(|owner| {
        Rc::new(Reference::Static {
            store: Rc::clone(&owner.members.class_vars),
            name: key.to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::env::{child_env, Environment};
    use crate::interp::value::ArrayValue;

    #[test]
    fn test_var_reference_writes_through() {
        let outer = Environment::new().into_ref();
        outer.borrow_mut().define("x", Value::Int(1));
        let inner = child_env(&outer);

        let r = Reference::Var {
            env: Rc::clone(&outer),
            name: "x".to_string(),
        };
        inner.borrow_mut().define("p", Value::Ref(Rc::new(r)));

        if let Some(Value::Ref(r)) = inner.borrow().get("p") {
            r.set(Value::Int(42)).expect("set");
        }
        assert_eq!(outer.borrow().get("x"), Some(Value::Int(42)));
    }

    #[test]
    fn test_element_reference_bounds() {
        let array = ArrayValue::dynamic(vec![Value::Int(1), Value::Int(2)], None).into_ref();
        let ok = Reference::Element { array: Rc::clone(&array), index: 1 };
        ok.set(Value::Int(7)).expect("in range");
        assert_eq!(array.borrow().elems[1], Value::Int(7));

        let bad = Reference::Element { array, index: 2 };
        assert!(bad.get().is_err());
    }

    #[test]
    fn test_char_reference() {
        let cell = Reference::cell(Value::str("cat"));
        let c = Reference::Char { base: Rc::clone(&cell), index: 1 };
        assert_eq!(c.get().expect("get"), Value::str("c"));
        c.set(Value::str("b")).expect("set");
        assert_eq!(cell.get().expect("get"), Value::str("bat"));
    }

    #[test]
    fn test_char_at_is_one_based() {
        assert_eq!(char_at("abc", 1), Some('a'));
        assert_eq!(char_at("abc", 3), Some('c'));
        assert_eq!(char_at("abc", 0), None);
        assert_eq!(char_at("abc", 4), None);
    }
}
