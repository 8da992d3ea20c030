//! Member access, method and constructor dispatch, properties
//!
//! Every receiver kind (object, interface, record, metaclass, record type,
//! enumeration, array, string, primitive) goes through [`Interpreter::access_member`].
//! A method named without parentheses is called when it can take zero
//! arguments and otherwise becomes a bound function pointer.

use super::call::CallArgs;
use super::env::{child_env, EnvRef};
use super::error::{InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::refs::{object_slot, Reference};
use super::registry::{
    ClassInfo, ConstInfo, EnumInfo, HelperInfo, MemberTables, MethodOwner, PropertyInfo, RecordInfo,
};
use super::types::helper_keys_for_value;
use super::value::{EnumValue, FunctionPointer, InterfaceInstance, ObjectInstance, ObjectRef, RecordValue, Value};
use crate::ast::{Expr, RoutineDecl, RoutineKind, Span, Spanned};
use crate::util::normalize;
use std::cell::RefCell;
use std::rc::Rc;

/// Built-in properties of an enumeration member
fn enum_member(value: &EnumValue, name: &str) -> Option<Value> {
    match normalize(name).as_str() {
        "name" | "tostring" => Some(Value::Str(value.name())),
        "qualifiedname" => Some(Value::Str(format!("{}.{}", value.info.name, value.name()))),
        "value" | "ord" => Some(Value::Int(value.ordinal)),
        _ => None,
    }
}

/// Receiver of a property access
pub(crate) struct PropertyHost {
    pub value: Value,
    /// Location of a record receiver, so setters and field writes land in it
    pub slot: Option<Rc<Reference>>,
    /// Helper declaring the property, searched before the value's own members
    pub helper: Option<Rc<HelperInfo>>,
}

impl PropertyHost {
    fn new(value: Value, slot: Option<Rc<Reference>>) -> Self {
        PropertyHost {
            value,
            slot,
            helper: None,
        }
    }

    /// Value passed as `Self` to accessor methods
    fn receiver(&self) -> Value {
        match &self.slot {
            Some(slot) if matches!(self.value, Value::Record(_)) => Value::Ref(Rc::clone(slot)),
            _ => self.value.clone(),
        }
    }
}

/// What a property accessor name resolves to
enum Accessor {
    Slot(Rc<Reference>),
    Call {
        overloads: Vec<Rc<RoutineDecl>>,
        receiver: Value,
        owner: MethodOwner,
    },
}

impl Interpreter {
    /// `target.name` or `target.name(args)`; `Ok(None)` when the receiver
    /// has no such member
    pub(crate) fn access_member(
        &mut self,
        target: Value,
        target_ref: Option<Rc<Reference>>,
        name: &str,
        args: Option<CallArgs<'_>>,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Option<Value>> {
        let target = match target {
            Value::Ref(r) => r.get().map_err(|e| e.at(span))?.unwrap_variant(),
            Value::Lazy(_) => self.read_binding(target, span)?,
            Value::Variant(_) => target.unwrap_variant(),
            other => other,
        };

        match target {
            Value::Object(obj) => self.object_member(obj, None, name, args, env, span),
            Value::TypeCast(tc) => match tc.value.as_object() {
                Some(obj) => self.object_member(obj, Some(Rc::clone(&tc.class)), name, args, env, span),
                None => Err(self.not_instantiated(span)),
            },
            Value::Interface(inst) => self.interface_member(&inst, name, args, env, span),
            Value::Record(rec) => self.record_member(rec, target_ref, name, args, env, span),
            Value::ClassRef(class) | Value::ClassInfo(class) => self.class_member(&class, name, args, env, span),
            Value::RecordType(info) => self.record_type_member(&info, name, args, env, span),
            Value::Enum(value) => {
                let receiver = Value::Enum(value.clone());
                if let Some(found) = self.helper_member(&receiver, target_ref, name, args, env, span)? {
                    return Ok(Some(found));
                }
                Ok(enum_member(&value, name))
            }
            Value::EnumType(info) => self.enum_type_member(&info, name, args, env, span),
            Value::Nil if normalize(name) == "free" => Ok(Some(Value::Nil)),
            Value::Nil => Err(self.not_instantiated(span)),
            Value::Array(arr) => {
                let receiver = Value::Array(Rc::clone(&arr));
                if let Some(value) = self.helper_member(&receiver, target_ref, name, args.clone(), env, span)? {
                    return Ok(Some(value));
                }
                self.array_method(&arr, name, args, span)
            }
            Value::Str(s) => {
                let receiver = Value::Str(s.clone());
                if let Some(value) = self.helper_member(&receiver, target_ref, name, args.clone(), env, span)? {
                    return Ok(Some(value));
                }
                self.string_method(&s, name, args, span)
            }
            other => self.helper_member(&other, target_ref, name, args, env, span),
        }
    }

    fn object_member(
        &mut self,
        obj: ObjectRef,
        static_class: Option<Rc<ClassInfo>>,
        name: &str,
        args: Option<CallArgs<'_>>,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Option<Value>> {
        let key = normalize(name);
        let (class, destroyed, field) = {
            let o = obj.borrow();
            (Rc::clone(&o.class), o.destroyed, o.fields.get(&key).cloned())
        };
        if destroyed {
            return Err(self.already_destroyed(span));
        }

        match key.as_str() {
            "classname" => return Ok(Some(Value::str(class.name.clone()))),
            "classtype" => return Ok(Some(Value::ClassRef(class))),
            "classparent" => return Ok(Some(class.parent.clone().map_or(Value::Nil, Value::ClassRef))),
            "free" | "destroy" if args.as_ref().is_none_or(CallArgs::is_empty) => {
                self.destroy_object(&obj, span)?;
                return Ok(Some(Value::Nil));
            }
            _ => {}
        }

        if let Some(value) = field {
            return self.member_value(value, args, span).map(Some);
        }

        let lookup = static_class.unwrap_or_else(|| Rc::clone(&class));
        if let Some((_, prop)) = lookup.find_property(&key) {
            if prop.index_params.is_empty() {
                let value = self.read_property(PropertyHost::new(Value::Object(Rc::clone(&obj)), None), &prop, Vec::new(), span)?;
                return self.member_value(value, args, span).map(Some);
            }
        }

        if let Some((mut owner, mut overloads)) = lookup.find_method(&key) {
            // A cast fixes the class for static methods only
            if overloads.iter().any(|d| d.directives.is_virtual || d.directives.is_override || d.directives.is_abstract) {
                if let Some(found) = class.find_method(&key) {
                    (owner, overloads) = found;
                }
            }
            tracing::trace!(class = %class.name, method = name, owner = %owner.name, "dispatching method");
            let receiver = Value::Object(obj);
            return self
                .dispatch_method(name, &overloads, receiver, MethodOwner::Class(owner), args, env, span)
                .map(Some);
        }

        if let Some((owner, overloads)) = lookup.find_class_method(&key) {
            let receiver = Value::ClassRef(Rc::clone(&class));
            return self
                .dispatch_method(name, &overloads, receiver, MethodOwner::Class(owner), args, env, span)
                .map(Some);
        }

        if let Some(owner) = class.find_class_var(&key) {
            let value = owner.members.class_vars.borrow().get(&key).cloned().unwrap_or(Value::Nil);
            return self.member_value(value, args, span).map(Some);
        }

        if let Some((owner, info)) = class.find_constant(&key) {
            let value = self.constant_value(&owner.members, &key, &info, Value::ClassInfo(Rc::clone(&owner)))?;
            return Ok(Some(value));
        }

        self.helper_member(&Value::Object(obj), None, name, args, env, span)
    }

    fn interface_member(
        &mut self,
        inst: &Rc<InterfaceInstance>,
        name: &str,
        args: Option<CallArgs<'_>>,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Option<Value>> {
        let Some(obj) = inst.object.clone() else {
            return Err(self.not_instantiated(span));
        };
        if let Some(prop) = inst.interface.find_property(name) {
            if prop.index_params.is_empty() {
                let value = self.read_property(PropertyHost::new(Value::Object(obj), None), &prop, Vec::new(), span)?;
                return self.member_value(value, args, span).map(Some);
            }
        }
        let builtin = matches!(normalize(name).as_str(), "classname" | "classtype");
        if !inst.interface.has_method(name) && !builtin {
            return Ok(None);
        }
        self.object_member(obj, None, name, args, env, span)
    }

    fn record_member(
        &mut self,
        rec: RecordValue,
        target_ref: Option<Rc<Reference>>,
        name: &str,
        args: Option<CallArgs<'_>>,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Option<Value>> {
        let key = normalize(name);
        if let Some(value) = rec.fields.get(&key).cloned() {
            return self.member_value(value, args, span).map(Some);
        }

        let info = Rc::clone(&rec.info);
        if let Some(prop) = info.members.properties.get(&key).cloned() {
            if prop.index_params.is_empty() {
                let host = PropertyHost::new(Value::Record(rec), target_ref);
                let value = self.read_property(host, &prop, Vec::new(), span)?;
                return self.member_value(value, args, span).map(Some);
            }
        }

        if let Some(overloads) = info.members.methods.get(&key).cloned() {
            // Record methods see the caller's variable as `Self`
            let receiver = match target_ref.clone() {
                Some(slot) => Value::Ref(slot),
                None => Value::Record(rec),
            };
            return self
                .dispatch_method(name, &overloads, receiver, MethodOwner::Record(info), args, env, span)
                .map(Some);
        }

        if let Some(value) = self.record_static_member(&info, &key, name, args.clone(), env, span)? {
            return Ok(Some(value));
        }

        self.helper_member(&Value::Record(rec), target_ref, name, args, env, span)
    }

    fn record_type_member(
        &mut self,
        info: &Rc<RecordInfo>,
        name: &str,
        args: Option<CallArgs<'_>>,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Option<Value>> {
        let key = normalize(name);
        if let Some(value) = self.record_static_member(info, &key, name, args.clone(), env, span)? {
            return Ok(Some(value));
        }
        self.helper_member(&Value::RecordType(Rc::clone(info)), None, name, args, env, span)
    }

    /// `TColor.Red`, `TColor.Low`, `TColor.ByName('Red')`
    fn enum_type_member(
        &mut self,
        info: &Rc<EnumInfo>,
        name: &str,
        args: Option<CallArgs<'_>>,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Option<Value>> {
        if let Some(ordinal) = info.lookup(name) {
            return Ok(Some(Value::Enum(EnumValue::new(info, ordinal))));
        }
        let receiver = Value::EnumType(Rc::clone(info));
        if let Some(found) = self.helper_member(&receiver, None, name, args.clone(), env, span)? {
            return Ok(Some(found));
        }
        let args = match args {
            Some(args) => self.eval_args(args)?,
            None => Vec::new(),
        };
        match (normalize(name).as_str(), args.as_slice()) {
            ("low", []) => Ok(Some(Value::Int(info.low()))),
            ("high", []) => Ok(Some(Value::Int(info.high()))),
            ("byname", [arg]) => {
                let text = arg.clone().unwrap_all();
                let Some(text) = text.as_str() else {
                    return Err(RuntimeError::type_error("String", &text.type_name()).at(span));
                };
                // `TColor.Red` is accepted as well as `Red`; unknown names give 0
                let member = text.rsplit('.').next().unwrap_or(text);
                Ok(Some(Value::Int(info.lookup(member).unwrap_or(0))))
            }
            ("byname", _) => Err(RuntimeError::arity_mismatch("ByName", 1, args.len()).at(span)),
            _ => Ok(None),
        }
    }

    /// Class methods, class vars and constants of a record type
    fn record_static_member(
        &mut self,
        info: &Rc<RecordInfo>,
        key: &str,
        name: &str,
        args: Option<CallArgs<'_>>,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Option<Value>> {
        if let Some(overloads) = info.members.class_methods.get(key).cloned() {
            let receiver = Value::RecordType(Rc::clone(info));
            let owner = MethodOwner::Record(Rc::clone(info));
            return self.dispatch_method(name, &overloads, receiver, owner, args, env, span).map(Some);
        }
        if let Some(prop) = info.members.properties.get(key).filter(|p| p.is_class).cloned() {
            let host = PropertyHost::new(Value::RecordType(Rc::clone(info)), None);
            return self.read_property(host, &prop, Vec::new(), span).map(Some);
        }
        let class_var = info.members.class_vars.borrow().get(key).cloned();
        if let Some(value) = class_var {
            return self.member_value(value, args, span).map(Some);
        }
        if let Some(constant) = info.members.constants.get(key).cloned() {
            let scope = Value::RecordType(Rc::clone(info));
            return self.constant_value(&info.members, key, &constant, scope).map(Some);
        }
        Ok(None)
    }

    /// Members reached through a class name or metaclass value
    fn class_member(
        &mut self,
        class: &Rc<ClassInfo>,
        name: &str,
        args: Option<CallArgs<'_>>,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Option<Value>> {
        let key = normalize(name);
        match key.as_str() {
            "classname" => return Ok(Some(Value::str(class.name.clone()))),
            "classtype" => return Ok(Some(Value::ClassRef(Rc::clone(class)))),
            "classparent" => return Ok(Some(class.parent.clone().map_or(Value::Nil, Value::ClassRef))),
            _ => {}
        }

        if class.find_constructor(&key).is_some() {
            let args = args.unwrap_or(CallArgs::bare(env));
            return self.create_object(class, Some(name), args, span).map(Some);
        }

        if let Some((owner, overloads)) = class.find_class_method(&key) {
            let receiver = Value::ClassRef(Rc::clone(class));
            return self
                .dispatch_method(name, &overloads, receiver, MethodOwner::Class(owner), args, env, span)
                .map(Some);
        }

        if let Some(owner) = class.find_class_var(&key) {
            let value = owner.members.class_vars.borrow().get(&key).cloned().unwrap_or(Value::Nil);
            return self.member_value(value, args, span).map(Some);
        }

        if let Some((owner, info)) = class.find_constant(&key) {
            let value = self.constant_value(&owner.members, &key, &info, Value::ClassInfo(Rc::clone(&owner)))?;
            return Ok(Some(value));
        }

        if let Some((_, prop)) = class.find_property(&key).filter(|(_, p)| p.is_class) {
            let host = PropertyHost::new(Value::ClassRef(Rc::clone(class)), None);
            return self.read_property(host, &prop, Vec::new(), span).map(Some);
        }

        self.helper_member(&Value::ClassRef(Rc::clone(class)), None, name, args, env, span)
    }

    /// Members contributed by helpers for the receiver's type, most recent
    /// helper first, each followed by its parent chain
    fn helper_member(
        &mut self,
        receiver: &Value,
        receiver_ref: Option<Rc<Reference>>,
        name: &str,
        args: Option<CallArgs<'_>>,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Option<Value>> {
        let key = normalize(name);
        for type_key in helper_keys_for_value(receiver) {
            for helper in self.registry.helpers_for(&type_key) {
                if let Some(value) = self.helper_chain_member(&helper, receiver, receiver_ref.clone(), &key, name, args.clone(), env, span)? {
                    return Ok(Some(value));
                }
            }
        }
        Ok(None)
    }

    #[allow(clippy::too_many_arguments)]
    fn helper_chain_member(
        &mut self,
        helper: &Rc<HelperInfo>,
        receiver: &Value,
        receiver_ref: Option<Rc<Reference>>,
        key: &str,
        name: &str,
        args: Option<CallArgs<'_>>,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Option<Value>> {
        for h in helper.chain() {
            let owner = MethodOwner::Helper(Rc::clone(&h));
            let overloads = h
                .members
                .methods
                .get(key)
                .or_else(|| h.members.class_methods.get(key))
                .cloned();
            if let Some(overloads) = overloads {
                let this = match &receiver_ref {
                    Some(slot) => Value::Ref(Rc::clone(slot)),
                    None => receiver.clone(),
                };
                tracing::trace!(helper = %h.name, method = name, "dispatching helper method");
                return self.dispatch_method(name, &overloads, this, owner, args, env, span).map(Some);
            }
            if let Some(prop) = h.members.properties.get(key).cloned() {
                if prop.index_params.is_empty() {
                    let host = PropertyHost {
                        value: receiver.clone(),
                        slot: receiver_ref,
                        helper: Some(Rc::clone(&h)),
                    };
                    return self.read_property(host, &prop, Vec::new(), span).map(Some);
                }
            }
            let class_var = h.members.class_vars.borrow().get(key).cloned();
            if let Some(value) = class_var {
                return self.member_value(value, args, span).map(Some);
            }
            if let Some(constant) = h.members.constants.get(key).cloned() {
                return self.constant_value(&h.members, key, &constant, receiver.clone()).map(Some);
            }
        }
        Ok(None)
    }

    /// Field, class var or property value, called when arguments follow
    fn member_value(&mut self, value: Value, args: Option<CallArgs<'_>>, span: Span) -> InterpResult<Value> {
        match args {
            Some(args) => self.call_value(value, args, span),
            None => Ok(value),
        }
    }

    /// Call a method overload set on a receiver, or bind it into a
    /// function pointer when named without arguments and it needs some
    pub(crate) fn dispatch_method(
        &mut self,
        name: &str,
        overloads: &[Rc<RoutineDecl>],
        receiver: Value,
        owner: MethodOwner,
        args: Option<CallArgs<'_>>,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Value> {
        let closure = Rc::clone(&self.global_env);
        match args {
            Some(args) => self.call_overloads(name, overloads, closure, Some(receiver), Some(owner), args, span),
            None if overloads.iter().any(|d| d.accepts_arg_count(0)) => {
                self.call_overloads(name, overloads, closure, Some(receiver), Some(owner), CallArgs::bare(env), span)
            }
            None => match overloads.first() {
                Some(decl) => Ok(self.bound_method(decl, receiver, owner)),
                None => Err(RuntimeError::undefined_function(name).at(span)),
            },
        }
    }

    fn bound_method(&self, decl: &Rc<RoutineDecl>, receiver: Value, owner: MethodOwner) -> Value {
        Value::FuncPtr(Rc::new(FunctionPointer {
            decl: Rc::clone(decl),
            closure: Rc::clone(&self.global_env),
            receiver: Some(receiver),
            owner: Some(owner),
        }))
    }

    /// Unqualified name inside a method: a member of `Self`, or of the
    /// running helper
    pub(crate) fn self_member(
        &mut self,
        name: &str,
        args: Option<CallArgs<'_>>,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Option<Value>> {
        let Some(raw) = env.borrow().get("self") else {
            return Ok(None);
        };
        let slot = match &raw {
            Value::Ref(r) => Some(Rc::clone(r)),
            _ => None,
        };
        let this = self.read_binding(raw, span)?.unwrap_variant();

        if let Some(MethodOwner::Helper(helper)) = self.current_owner() {
            let key = normalize(name);
            if let Some(value) = self.helper_chain_member(&helper, &this, slot.clone(), &key, name, args.clone(), env, span)? {
                return Ok(Some(value));
            }
        }

        let slot = match &this {
            Value::Record(_) => slot.or_else(|| self.self_ref(env)),
            _ => slot,
        };
        match this {
            Value::Nil => Ok(None),
            this @ (Value::Object(_)
            | Value::TypeCast(_)
            | Value::Record(_)
            | Value::ClassRef(_)
            | Value::ClassInfo(_)
            | Value::RecordType(_)) => self.access_member(this, slot, name, args, env, span),
            // Primitive receivers of helper methods expose only helper members
            other => self.helper_member(&other, slot, name, args, env, span),
        }
    }

    /// `@Method` inside a method
    pub(crate) fn self_method_pointer(&mut self, name: &str, env: &EnvRef) -> InterpResult<Option<Value>> {
        let Some(raw) = env.borrow().get("self") else {
            return Ok(None);
        };
        let this = match raw {
            Value::Ref(r) => r.get()?,
            other => other,
        };
        self.method_pointer(this, name, Span::default())
    }

    /// `@target.Method`: a pointer bound to the receiver
    pub(crate) fn method_pointer(&mut self, target: Value, name: &str, span: Span) -> InterpResult<Option<Value>> {
        let key = normalize(name);
        let target = target.unwrap_variant();
        let found = match &target {
            Value::Object(_) | Value::TypeCast(_) | Value::Interface(_) => {
                let Some(obj) = target.as_object() else {
                    return Err(self.not_instantiated(span));
                };
                let class = Rc::clone(&obj.borrow().class);
                class
                    .find_method(&key)
                    .map(|(owner, set)| (set, Value::Object(Rc::clone(&obj)), MethodOwner::Class(owner)))
                    .or_else(|| {
                        class
                            .find_class_method(&key)
                            .map(|(owner, set)| (set, Value::ClassRef(Rc::clone(&class)), MethodOwner::Class(owner)))
                    })
            }
            Value::ClassRef(class) | Value::ClassInfo(class) => class
                .find_class_method(&key)
                .map(|(owner, set)| (set, Value::ClassRef(Rc::clone(class)), MethodOwner::Class(owner))),
            Value::Record(rec) => rec
                .info
                .members
                .methods
                .get(&key)
                .cloned()
                .map(|set| (set, target.copy_value(), MethodOwner::Record(Rc::clone(&rec.info)))),
            _ => None,
        };
        Ok(found.and_then(|(set, receiver, owner)| {
            set.first().map(|decl| self.bound_method(decl, receiver, owner))
        }))
    }

    /// Allocate an instance with every field initialized, root class first
    pub(crate) fn instantiate(&mut self, class: &Rc<ClassInfo>) -> InterpResult<ObjectRef> {
        if class.is_abstract {
            return Err(RuntimeError::abstract_instantiation(&class.name));
        }
        if class.is_external {
            return Err(RuntimeError::external_class(&class.name));
        }

        let object = Rc::new(RefCell::new(ObjectInstance::new(Rc::clone(class))));
        for c in class.lineage() {
            for (key, field) in &c.fields {
                let value = match (&field.init, &field.ty) {
                    (Some(init), _) => {
                        let env = child_env(&self.global_env);
                        self.eval(init, &env)?
                    }
                    (None, Some(ty)) => self.zero_value(ty)?,
                    (None, None) => Value::Nil,
                };
                object.borrow_mut().fields.insert(key.clone(), value);
            }
        }
        Ok(object)
    }

    /// `TClass.Create(args)` and named constructors. The constructor set
    /// is taken from the nearest class whose overloads accept the
    /// argument count.
    pub(crate) fn create_object(
        &mut self,
        class: &Rc<ClassInfo>,
        ctor_name: Option<&str>,
        args: CallArgs<'_>,
        span: Span,
    ) -> InterpResult<Value> {
        let name = ctor_name.unwrap_or("Create");
        let key = normalize(name);
        let object = self.instantiate(class).map_err(|e| e.at(span))?;
        tracing::debug!(class = %class.name, constructor = name, "creating object");

        let argc = args.len();
        let found = class.ancestors().find_map(|c| {
            c.constructors
                .get(&key)
                .filter(|set| set.iter().any(|d| d.accepts_arg_count(argc)))
                .map(|set| (Rc::clone(&c), set.clone()))
        });
        match found {
            Some((owner, overloads)) => {
                let closure = Rc::clone(&self.global_env);
                let receiver = Value::Object(Rc::clone(&object));
                self.call_overloads(name, &overloads, closure, Some(receiver), Some(MethodOwner::Class(owner)), args, span)?;
            }
            None if argc == 0 => {}
            None if class.find_constructor(&key).is_some() => {
                return Err(RuntimeError::no_matching_overload(name).at(span));
            }
            None => {
                return Err(RuntimeError::invalid_operation(format!(
                    "class \"{}\" has no constructor \"{name}\" taking arguments",
                    class.name
                ))
                .at(span));
            }
        }
        Ok(Value::Object(object))
    }

    /// Run the destructor, then mark the instance destroyed
    fn destroy_object(&mut self, obj: &ObjectRef, span: Span) -> InterpResult<()> {
        let class = Rc::clone(&obj.borrow().class);
        if let Some((owner, overloads)) = class.find_method("destroy") {
            if let Some(decl) = overloads.iter().find(|d| d.accepts_arg_count(0)) {
                let closure = Rc::clone(&self.global_env);
                let receiver = Value::Object(Rc::clone(obj));
                self.invoke(decl, closure, Some(receiver), Some(MethodOwner::Class(owner)), Vec::new(), span)?;
            }
        }
        obj.borrow_mut().destroyed = true;
        tracing::trace!(class = %class.name, "object destroyed");
        Ok(())
    }

    /// `inherited [Name][(args)]`: static dispatch into the parent of the
    /// running method's class
    pub(crate) fn eval_inherited(
        &mut self,
        method: Option<&Spanned<String>>,
        args: &[Spanned<Expr>],
        has_parens: bool,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Value> {
        let Some(frame) = self.current_frame().cloned() else {
            return Err(RuntimeError::invalid_operation("inherited used outside of a method").at(span));
        };
        let Some(MethodOwner::Class(class)) = &frame.owner else {
            return Err(RuntimeError::invalid_operation("inherited is only valid inside class methods").at(span));
        };
        let Some(parent) = class.parent.clone() else {
            return Err(RuntimeError::invalid_operation(format!("class \"{}\" has no parent class", class.name)).at(span));
        };
        let receiver = match env.borrow().get("self") {
            Some(Value::Ref(r)) => r.get()?,
            Some(value) => value,
            None => return Err(RuntimeError::undefined_variable("Self").at(span)),
        };

        let bare = method.is_none() && !has_parens;
        let name = method.map_or_else(|| frame.name.clone(), |m| m.node.clone());
        let key = normalize(&name);
        let call_args = if bare {
            // Forward the running method's own parameters
            let mut values = Vec::with_capacity(frame.decl.params.len());
            for param in &frame.decl.params {
                values.push(env.borrow().get(&param.name.node).unwrap_or(Value::Nil));
            }
            CallArgs::Values(values)
        } else {
            CallArgs::Exprs(args, env)
        };

        let found = match frame.decl.kind {
            RoutineKind::Constructor => parent.find_constructor(&key),
            _ => None,
        }
        .or_else(|| parent.find_method(&key))
        .map(|(owner, set)| (owner, set, false))
        .or_else(|| parent.find_class_method(&key).map(|(owner, set)| (owner, set, true)));

        if let Some((owner, overloads, is_class)) = found {
            let argc = call_args.len();
            let exact = overloads.iter().find(|d| d.params.len() == argc);
            let decl = match exact {
                Some(decl) => Rc::clone(decl),
                None if bare => match overloads.iter().find(|d| d.accepts_arg_count(0)) {
                    Some(decl) => {
                        let decl = Rc::clone(decl);
                        return self.invoke_inherited(&decl, owner, receiver, is_class, CallArgs::bare(env), span);
                    }
                    None => return Err(RuntimeError::arity_mismatch(&name, overloads[0].params.len(), argc).at(span)),
                },
                None => {
                    let expected = overloads.first().map_or(0, |d| d.params.len());
                    return Err(RuntimeError::arity_mismatch(&name, expected, argc).at(span));
                }
            };
            return self.invoke_inherited(&decl, owner, receiver, is_class, call_args, span);
        }

        if let Some((_, prop)) = parent.find_property(&key) {
            if !args.is_empty() {
                return Err(RuntimeError::invalid_operation(format!("property \"{name}\" cannot be called")).at(span));
            }
            return self.read_property(PropertyHost::new(receiver, None), &prop, Vec::new(), span);
        }

        if parent.has_field(&key) {
            if !args.is_empty() {
                return Err(RuntimeError::invalid_operation(format!("field \"{name}\" cannot be called")).at(span));
            }
            if let Some(obj) = receiver.as_object() {
                return Ok(obj.borrow().fields.get(&key).cloned().unwrap_or(Value::Nil));
            }
        }

        if bare {
            return Ok(Value::Nil);
        }
        Err(RuntimeError::invalid_operation(format!(
            "method \"{name}\" not found in class \"{}\"",
            parent.name
        ))
        .at(span))
    }

    fn invoke_inherited(
        &mut self,
        decl: &Rc<RoutineDecl>,
        owner: Rc<ClassInfo>,
        receiver: Value,
        is_class: bool,
        args: CallArgs<'_>,
        span: Span,
    ) -> InterpResult<Value> {
        let receiver = match (&receiver, is_class) {
            (Value::Object(obj), true) => Value::ClassRef(Rc::clone(&obj.borrow().class)),
            _ => receiver,
        };
        tracing::trace!(class = %owner.name, method = %decl.name.node, "inherited call");
        let values = self.prepare_args(decl, args, None, span)?;
        let closure = Rc::clone(&self.global_env);
        self.invoke(decl, closure, Some(receiver), Some(MethodOwner::Class(owner)), values, span)
    }

    /// Evaluate and memoize a class, record or helper constant. `scope`
    /// becomes `Self` so constants can refer to their siblings.
    fn constant_value(&mut self, members: &MemberTables, key: &str, info: &ConstInfo, scope: Value) -> InterpResult<Value> {
        if let Some(value) = members.constant_values.borrow().get(key) {
            return Ok(value.clone());
        }
        let env = child_env(&self.global_env);
        env.borrow_mut().define("self", scope);
        let value = self.eval(&info.value, &env)?;
        members
            .constant_values
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        Ok(value)
    }

    // ---- properties ----

    /// Property `name` visible on `host`, with the helper declaring it
    fn find_property_for(&self, host: &Value, name: &str) -> Option<(PropertyInfo, Option<Rc<HelperInfo>>)> {
        let key = normalize(name);
        let own = match host {
            Value::Object(obj) => obj.borrow().class.find_property(&key).map(|(_, p)| p),
            Value::TypeCast(tc) => tc.class.find_property(&key).map(|(_, p)| p),
            Value::Interface(inst) => inst.interface.find_property(&key),
            Value::Record(rec) => rec.info.members.properties.get(&key).cloned(),
            Value::ClassRef(class) | Value::ClassInfo(class) => {
                class.find_property(&key).map(|(_, p)| p).filter(|p| p.is_class)
            }
            _ => None,
        };
        if let Some(prop) = own {
            return Some((prop, None));
        }
        for type_key in helper_keys_for_value(host) {
            for helper in self.registry.helpers_for(&type_key) {
                for h in helper.chain() {
                    if let Some(prop) = h.members.properties.get(&key) {
                        return Some((prop.clone(), Some(Rc::clone(&h))));
                    }
                }
            }
        }
        None
    }

    /// Host and property for `host.Name[...]` / `Name[...]` when `Name`
    /// is an indexed property
    pub(crate) fn indexed_property_target(
        &mut self,
        object: &Spanned<Expr>,
        env: &EnvRef,
    ) -> InterpResult<Option<(PropertyHost, PropertyInfo)>> {
        let (host, slot, name) = match &object.node {
            Expr::Member { object: host_expr, member } if is_plain_path(host_expr) => {
                let host = self.eval(host_expr, env)?.unwrap_variant();
                let slot = match host {
                    Value::Record(_) => self.lvalue(host_expr, env)?,
                    _ => None,
                };
                (host, slot, member.node.as_str())
            }
            Expr::Ident(name) => {
                let local = env.borrow().get_scoped(name);
                if matches!(local, Some((_, false))) {
                    return Ok(None);
                }
                let Some(raw) = env.borrow().get("self") else {
                    return Ok(None);
                };
                let slot = match &raw {
                    Value::Ref(r) => Some(Rc::clone(r)),
                    _ => self.self_ref(env),
                };
                let host = self.read_binding(raw, object.span)?;
                (host, slot, name.as_str())
            }
            _ => return Ok(None),
        };
        let host = match host {
            Value::Interface(inst) => match &inst.object {
                Some(obj) => Value::Object(Rc::clone(obj)),
                None => return Ok(None),
            },
            other => other,
        };
        let Some((prop, helper)) = self.find_property_for(&host, name) else {
            return Ok(None);
        };
        if prop.index_params.is_empty() {
            return Ok(None);
        }
        let slot = if matches!(host, Value::Object(_)) { None } else { slot };
        Ok(Some((PropertyHost { value: host, slot, helper }, prop)))
    }

    /// Non-indexed property `name` on `host`, for assignments
    pub(crate) fn plain_property(&self, host: &Value, name: &str) -> Option<(PropertyInfo, Option<Rc<HelperInfo>>)> {
        let host = match host {
            Value::Interface(inst) => Value::Object(inst.object.clone()?),
            other => other.clone(),
        };
        self.find_property_for(&host, name)
            .filter(|(p, _)| p.index_params.is_empty())
    }

    fn resolve_accessor(&self, host: &PropertyHost, name: &str) -> Option<Accessor> {
        let key = normalize(name);
        if let Some(helper) = &host.helper {
            for h in helper.chain() {
                if h.members.has_class_var(&key) {
                    return Some(Accessor::Slot(Rc::new(Reference::Static {
                        store: Rc::clone(&h.members.class_vars),
                        name: key,
                    })));
                }
                let set = h.members.methods.get(&key).or_else(|| h.members.class_methods.get(&key));
                if let Some(set) = set {
                    return Some(Accessor::Call {
                        overloads: set.clone(),
                        receiver: host.receiver(),
                        owner: MethodOwner::Helper(Rc::clone(&h)),
                    });
                }
            }
        }

        match &host.value {
            Value::Object(obj) => {
                if let Some(slot) = object_slot(obj, &key) {
                    return Some(Accessor::Slot(slot));
                }
                let class = Rc::clone(&obj.borrow().class);
                if let Some((owner, overloads)) = class.find_method(&key) {
                    return Some(Accessor::Call {
                        overloads,
                        receiver: Value::Object(Rc::clone(obj)),
                        owner: MethodOwner::Class(owner),
                    });
                }
                class.find_class_method(&key).map(|(owner, overloads)| Accessor::Call {
                    overloads,
                    receiver: Value::ClassRef(Rc::clone(&class)),
                    owner: MethodOwner::Class(owner),
                })
            }
            Value::ClassRef(class) | Value::ClassInfo(class) => {
                if let Some(owner) = class.find_class_var(&key) {
                    return Some(Accessor::Slot(Rc::new(Reference::Static {
                        store: Rc::clone(&owner.members.class_vars),
                        name: key,
                    })));
                }
                class.find_class_method(&key).map(|(owner, overloads)| Accessor::Call {
                    overloads,
                    receiver: Value::ClassRef(Rc::clone(class)),
                    owner: MethodOwner::Class(owner),
                })
            }
            Value::Record(rec) => {
                if rec.fields.contains_key(&key) {
                    let base = host
                        .slot
                        .clone()
                        .unwrap_or_else(|| Reference::cell(host.value.clone()));
                    return Some(Accessor::Slot(Rc::new(Reference::Member { base, name: key })));
                }
                record_accessor(&rec.info, &key, host.receiver())
            }
            Value::RecordType(info) => record_accessor(info, &key, host.value.clone()),
            _ => None,
        }
    }

    /// Read a property through its field or getter; index arguments go
    /// first in the getter's parameter list
    pub(crate) fn read_property(
        &mut self,
        host: PropertyHost,
        prop: &PropertyInfo,
        indices: Vec<Value>,
        span: Span,
    ) -> InterpResult<Value> {
        let Some(reader) = &prop.read else {
            return Err(RuntimeError::invalid_operation(format!("property \"{}\" is write-only", prop.name)).at(span));
        };
        match self.resolve_accessor(&host, reader) {
            Some(Accessor::Slot(slot)) if indices.is_empty() => slot.get().map_err(|e| e.at(span)),
            Some(Accessor::Slot(_)) => Err(RuntimeError::invalid_operation(format!(
                "indexed property \"{}\" needs a getter method",
                prop.name
            ))
            .at(span)),
            Some(Accessor::Call {
                overloads,
                receiver,
                owner,
            }) => {
                let closure = Rc::clone(&self.global_env);
                self.call_overloads(reader, &overloads, closure, Some(receiver), Some(owner), CallArgs::Values(indices), span)
            }
            None => Err(RuntimeError::invalid_operation(format!(
                "accessor \"{reader}\" of property \"{}\" not found",
                prop.name
            ))
            .at(span)),
        }
    }

    /// Write a property through its field or setter; the value is the
    /// setter's last argument
    pub(crate) fn write_property(
        &mut self,
        host: PropertyHost,
        prop: &PropertyInfo,
        mut indices: Vec<Value>,
        value: Value,
        span: Span,
    ) -> InterpResult<()> {
        let Some(writer) = &prop.write else {
            return Err(RuntimeError::invalid_operation(format!("property \"{}\" is read-only", prop.name)).at(span));
        };
        let ty = self.runtime_type(&prop.ty);
        let value = self.coerce_to(value, &ty, span)?;
        match self.resolve_accessor(&host, writer) {
            Some(Accessor::Slot(slot)) if indices.is_empty() => slot.set(value).map_err(|e| e.at(span)),
            Some(Accessor::Slot(_)) => Err(RuntimeError::invalid_operation(format!(
                "indexed property \"{}\" needs a setter method",
                prop.name
            ))
            .at(span)),
            Some(Accessor::Call {
                overloads,
                receiver,
                owner,
            }) => {
                indices.push(value);
                let closure = Rc::clone(&self.global_env);
                self.call_overloads(writer, &overloads, closure, Some(receiver), Some(owner), CallArgs::Values(indices), span)?;
                Ok(())
            }
            None => Err(RuntimeError::invalid_operation(format!(
                "accessor \"{writer}\" of property \"{}\" not found",
                prop.name
            ))
            .at(span)),
        }
    }

    fn default_property(&self, host: &Value) -> Option<(PropertyInfo, Option<Rc<HelperInfo>>)> {
        let own = match host {
            Value::Object(obj) => obj.borrow().class.find_default_property().map(|(_, p)| p),
            Value::Record(rec) => rec.info.members.properties.values().find(|p| p.is_default).cloned(),
            _ => None,
        };
        if let Some(prop) = own {
            return Some((prop, None));
        }
        helper_keys_for_value(host).into_iter().find_map(|type_key| {
            self.registry.helpers_for(&type_key).into_iter().find_map(|helper| {
                helper.chain().into_iter().find_map(|h| {
                    let prop = h.members.properties.values().find(|p| p.is_default).cloned();
                    prop.map(|p| (p, Some(Rc::clone(&h))))
                })
            })
        })
    }

    fn default_property_host(
        &mut self,
        host: Value,
        host_ref: Option<Rc<Reference>>,
        span: Span,
    ) -> InterpResult<(PropertyHost, PropertyInfo)> {
        let host = match host.unwrap_all() {
            Value::Interface(inst) => match &inst.object {
                Some(obj) => Value::Object(Rc::clone(obj)),
                None => return Err(self.not_instantiated(span)),
            },
            other => other,
        };
        if let Some(obj) = host.as_object() {
            if obj.borrow().destroyed {
                return Err(self.already_destroyed(span));
            }
        }
        match self.default_property(&host) {
            Some((prop, helper)) => Ok((PropertyHost { value: host, slot: host_ref, helper }, prop)),
            None => Err(RuntimeError::invalid_operation(format!(
                "{} has no default property",
                host.type_name()
            ))
            .at(span)),
        }
    }

    /// `host[i, ...]` on an object or record with a default property
    pub(crate) fn read_default_property(
        &mut self,
        host: Value,
        host_ref: Option<Rc<Reference>>,
        indices: Vec<Value>,
        span: Span,
    ) -> InterpResult<Value> {
        let (host, prop) = self.default_property_host(host, host_ref, span)?;
        self.read_property(host, &prop, indices, span)
    }

    pub(crate) fn write_default_property(
        &mut self,
        host: Value,
        host_ref: Option<Rc<Reference>>,
        indices: Vec<Value>,
        value: Value,
        span: Span,
    ) -> InterpResult<()> {
        let (host, prop) = self.default_property_host(host, host_ref, span)?;
        self.write_property(host, &prop, indices, value, span)
    }

    /// Assign through a non-indexed property of `host`; `Ok(false)` when
    /// `name` is not a property there
    pub(crate) fn assign_property(
        &mut self,
        host: Value,
        host_ref: Option<Rc<Reference>>,
        name: &str,
        value: Value,
        span: Span,
    ) -> InterpResult<bool> {
        let host = match host.unwrap_variant() {
            Value::Interface(inst) => match &inst.object {
                Some(obj) => Value::Object(Rc::clone(obj)),
                None => return Err(self.not_instantiated(span)),
            },
            Value::TypeCast(tc) => tc.value.clone(),
            other => other,
        };
        let Some((prop, helper)) = self.plain_property(&host, name) else {
            return Ok(false);
        };
        let slot = match host {
            Value::Record(_) => host_ref,
            _ => None,
        };
        self.write_property(PropertyHost { value: host, slot, helper }, &prop, Vec::new(), value, span)?;
        Ok(true)
    }
}

/// Class var or method of a record used as a property accessor
fn record_accessor(info: &Rc<RecordInfo>, key: &str, receiver: Value) -> Option<Accessor> {
    if info.members.has_class_var(key) {
        return Some(Accessor::Slot(Rc::new(Reference::Static {
            store: Rc::clone(&info.members.class_vars),
            name: key.to_string(),
        })));
    }
    let owner = MethodOwner::Record(Rc::clone(info));
    if let Some(set) = info.members.methods.get(key) {
        return Some(Accessor::Call {
            overloads: set.clone(),
            receiver,
            owner,
        });
    }
    info.members.class_methods.get(key).map(|set| Accessor::Call {
        overloads: set.clone(),
        receiver: Value::RecordType(Rc::clone(info)),
        owner,
    })
}

/// Expressions that can be evaluated twice without side effects
fn is_plain_path(expr: &Spanned<Expr>) -> bool {
    match &expr.node {
        Expr::Ident(_) | Expr::SelfRef => true,
        Expr::Member { object, .. } => is_plain_path(object),
        Expr::Index { object, indices } => {
            is_plain_path(object) && indices.iter().all(|i| is_plain_path(i) || is_literal(i))
        }
        _ => false,
    }
}

fn is_literal(expr: &Spanned<Expr>) -> bool {
    matches!(
        expr.node,
        Expr::IntLit(_) | Expr::StrLit(_) | Expr::FloatLit(_) | Expr::BoolLit(_)
    )
}
