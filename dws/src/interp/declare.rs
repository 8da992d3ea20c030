//! Declaration processing: types and routines become registry entries
//!
//! Method bodies are written out of line (`procedure TFoo.Bar; begin ... end;`),
//! so implementations are gathered before any type is built and merged
//! into the declarations found in the type bodies.

use super::error::{InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::env::child_env;
use super::registry::{
    ClassInfo, ConstInfo, EnumInfo, FieldInfo, HelperInfo, InterfaceInfo, MemberTables, PropertyInfo, RecordInfo,
};
use super::types::{helper_key_for_type, ordinal};
use super::value::{EnumValue, Value};
use crate::ast::{
    ClassDecl, EnumDecl, EnumKind, HelperDecl, InterfaceDecl, Item, Member, Program, PropertyDecl, RecordDecl, RoutineDecl,
    RoutineKind, TypeDecl, TypeDeclKind,
};
use crate::parser::parse_source;
use crate::util::normalize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Built-in classes every program can use
const PRELUDE: &str = r#"
type
  TObject = class
    constructor Create;
    destructor Destroy; virtual;
  end;

  Exception = class(TObject)
    Message: String;
    constructor Create(Msg: String);
    constructor CreateFmt(Fmt: String; Args: array of Variant);
  end;

  EConvertError = class(Exception);
  ERangeError = class(Exception);
  EDivByZero = class(Exception);
  EAssertionFailed = class(Exception);
  EInvalidOp = class(Exception);
  EScriptStackOverflow = class(Exception);
  EHost = class(Exception);

constructor TObject.Create;
begin
end;

destructor TObject.Destroy;
begin
end;

constructor Exception.Create(Msg: String);
begin
  Message := Msg;
end;

constructor Exception.CreateFmt(Fmt: String; Args: array of Variant);
begin
  Message := Format(Fmt, Args);
end;
"#;

/// Out-of-line method bodies by (owner, method) key
#[derive(Default)]
pub(crate) struct Implementations {
    bodies: HashMap<(String, String), Vec<Rc<RoutineDecl>>>,
}

impl Implementations {
    pub(crate) fn collect(program: &Program) -> Self {
        let mut bodies: HashMap<(String, String), Vec<Rc<RoutineDecl>>> = HashMap::new();
        for item in &program.items {
            if let Item::Routine(decl) = item
                && let Some(owner) = &decl.owner
            {
                bodies
                    .entry((normalize(&owner.node), normalize(&decl.name.node)))
                    .or_default()
                    .push(Rc::clone(decl));
            }
        }
        Implementations { bodies }
    }

    /// Implementation matching a declaration; a single implementation
    /// written without a parameter list matches any signature
    fn take(&mut self, owner: &str, decl: &RoutineDecl) -> Option<Rc<RoutineDecl>> {
        let list = self.bodies.get_mut(&(owner.to_string(), normalize(&decl.name.node)))?;
        let pos = list
            .iter()
            .position(|imp| same_signature(decl, imp))
            .or_else(|| (list.len() == 1 && list[0].params.is_empty()).then_some(0))?;
        Some(list.remove(pos))
    }

    /// Implementations never matched by a declaration of `owner`
    fn rest(&mut self, owner: &str) -> Vec<Rc<RoutineDecl>> {
        let keys: Vec<_> = self.bodies.keys().filter(|(o, _)| o == owner).cloned().collect();
        keys.into_iter()
            .filter_map(|k| self.bodies.remove(&k))
            .flatten()
            .collect()
    }
}

fn same_signature(decl: &RoutineDecl, imp: &RoutineDecl) -> bool {
    decl.params.len() == imp.params.len()
        && decl.params.iter().zip(&imp.params).all(|(a, b)| match (&a.ty, &b.ty) {
            (Some(x), Some(y)) => normalize(&x.to_string()) == normalize(&y.to_string()),
            _ => true,
        })
}

/// Declaration from the type body, body and contracts from the implementation
fn merge_implementation(decl: &Rc<RoutineDecl>, imp: &RoutineDecl) -> Rc<RoutineDecl> {
    let params = if decl.params.is_empty() { imp.params.clone() } else { decl.params.clone() };
    Rc::new(RoutineDecl {
        name: decl.name.clone(),
        owner: imp.owner.clone(),
        kind: decl.kind,
        is_class: decl.is_class || imp.is_class,
        params,
        ret_ty: decl.ret_ty.clone().or_else(|| imp.ret_ty.clone()),
        directives: decl.directives,
        require: if imp.require.is_empty() { decl.require.clone() } else { imp.require.clone() },
        ensure: if imp.ensure.is_empty() { decl.ensure.clone() } else { imp.ensure.clone() },
        body: imp.body.clone(),
        span: imp.span,
    })
}

impl Interpreter {
    /// Register every type and routine of a program without running it
    pub fn load(&mut self, program: &Program) -> InterpResult<()> {
        let mut impls = Implementations::collect(program);
        for item in &program.items {
            self.declare_item(item, &mut impls)?;
        }
        Ok(())
    }

    /// Register one type or free routine; statements are ignored
    pub(crate) fn declare_item(&mut self, item: &Item, impls: &mut Implementations) -> InterpResult<()> {
        match item {
            Item::Type(decl) => self.declare_type(decl, impls),
            Item::Routine(decl) if decl.owner.is_none() => {
                if decl.directives.is_forward && decl.body.is_none() {
                    return Ok(());
                }
                let key = normalize(&decl.name.node);
                tracing::trace!(routine = %decl.name.node, "declared routine");
                let overloads = self.functions.entry(key).or_default();
                // A redefinition with the same signature replaces the old one
                overloads.retain(|existing| !same_signature(existing, decl));
                overloads.push(Rc::clone(decl));
                Ok(())
            }
            Item::Routine(_) | Item::Stmt(_) => Ok(()),
        }
    }

    pub(crate) fn load_prelude(&mut self) {
        let program = match parse_source(PRELUDE) {
            Ok(program) => program,
            Err(e) => {
                tracing::error!(error = %e, "prelude failed to parse");
                return;
            }
        };
        if let Err(e) = self.load(&program) {
            tracing::error!(error = %e, "prelude failed to load");
        }
    }

    fn declare_type(&mut self, decl: &TypeDecl, impls: &mut Implementations) -> InterpResult<()> {
        let name = &decl.name.node;
        match &decl.kind {
            TypeDeclKind::Class(class) => self.declare_class(decl, class, impls),
            TypeDeclKind::Interface(intf) => self.declare_interface(decl, intf),
            TypeDeclKind::Record(record) => self.declare_record(decl, record, impls),
            TypeDeclKind::Helper(helper) => self.declare_helper(decl, helper, impls),
            TypeDeclKind::Enum(body) => self.declare_enum(decl, body),
            TypeDeclKind::Alias(target) => {
                tracing::debug!(alias = %name, target = %target, "registered alias");
                self.registry.aliases.insert(normalize(name), target.clone());
                Ok(())
            }
        }
    }

    fn declare_class(&mut self, decl: &TypeDecl, class: &ClassDecl, impls: &mut Implementations) -> InterpResult<()> {
        if class.is_forward {
            return Ok(());
        }
        let name = &decl.name.node;
        let key = normalize(name);

        let parent = match &class.parent {
            Some(parent) => match self.registry.lookup_class(&parent.node) {
                Some(info) => Some(info),
                // `class(IFoo)`: the first entry may be an interface
                None if self.registry.lookup_interface(&parent.node).is_some() => self.registry.lookup_class("TObject"),
                None => return Err(RuntimeError::unknown_type(&parent.node).at(parent.span)),
            },
            None if key != "tobject" => self.registry.lookup_class("TObject"),
            None => None,
        };

        let mut info = ClassInfo::new(name, parent);
        info.is_abstract = class.is_abstract;
        info.is_external = class.is_external;
        info.span = decl.span;

        let interface_names = class
            .parent
            .iter()
            .filter(|p| self.registry.lookup_class(&p.node).is_none())
            .chain(&class.interfaces);
        for intf in interface_names {
            match self.registry.lookup_interface(&intf.node) {
                Some(found) => info.interfaces.push(found),
                None => return Err(RuntimeError::unknown_type(&intf.node).at(intf.span)),
            }
        }

        for member in &class.members {
            match member {
                Member::Field(field) if field.is_class => self.declare_class_var(&info.members, field)?,
                Member::Field(field) => {
                    for field_name in &field.names {
                        info.fields.insert(
                            normalize(&field_name.node),
                            FieldInfo {
                                name: field_name.node.clone(),
                                ty: field.ty.clone(),
                                init: field.init.clone(),
                            },
                        );
                    }
                }
                Member::Method(method) => {
                    let method = resolve_method(&key, method, impls);
                    if method.kind == RoutineKind::Constructor {
                        info.constructors
                            .entry(normalize(&method.name.node))
                            .or_default()
                            .push(method);
                    } else {
                        info.members.add_method(method);
                    }
                }
                Member::Property(prop) => declare_property(&mut info.members, prop),
                Member::Const(c) => declare_constant(&mut info.members, c),
            }
        }
        for orphan in impls.rest(&key) {
            if orphan.kind == RoutineKind::Constructor {
                info.constructors
                    .entry(normalize(&orphan.name.node))
                    .or_default()
                    .push(orphan);
            } else {
                info.members.add_method(orphan);
            }
        }

        self.registry.register_class(Rc::new(info));
        Ok(())
    }

    fn declare_interface(&mut self, decl: &TypeDecl, intf: &InterfaceDecl) -> InterpResult<()> {
        if intf.is_forward {
            return Ok(());
        }
        let parent = match &intf.parent {
            Some(parent) => match self.registry.lookup_interface(&parent.node) {
                Some(found) => Some(found),
                None => return Err(RuntimeError::unknown_type(&parent.node).at(parent.span)),
            },
            None => None,
        };
        let mut info = InterfaceInfo::new(&decl.name.node, parent);
        for method in &intf.methods {
            info.methods.insert(normalize(&method.name.node), Rc::clone(method));
        }
        for prop in &intf.properties {
            info.properties.insert(normalize(&prop.name.node), property_info(prop));
        }
        self.registry.register_interface(Rc::new(info));
        Ok(())
    }

    fn declare_record(&mut self, decl: &TypeDecl, record: &RecordDecl, impls: &mut Implementations) -> InterpResult<()> {
        let key = normalize(&decl.name.node);
        let mut info = RecordInfo::new(&decl.name.node);
        for member in &record.members {
            match member {
                Member::Field(field) if field.is_class => self.declare_class_var(&info.members, field)?,
                Member::Field(field) => {
                    for field_name in &field.names {
                        info.fields.insert(
                            normalize(&field_name.node),
                            FieldInfo {
                                name: field_name.node.clone(),
                                ty: field.ty.clone(),
                                init: field.init.clone(),
                            },
                        );
                    }
                }
                Member::Method(method) => info.members.add_method(resolve_method(&key, method, impls)),
                Member::Property(prop) => declare_property(&mut info.members, prop),
                Member::Const(c) => declare_constant(&mut info.members, c),
            }
        }
        for orphan in impls.rest(&key) {
            info.members.add_method(orphan);
        }
        self.registry.register_record(Rc::new(info));
        Ok(())
    }

    /// Assign ordinals and register the type; members of a plain
    /// enumeration also become global names
    fn declare_enum(&mut self, decl: &TypeDecl, body: &EnumDecl) -> InterpResult<()> {
        // Explicit values may refer to members declared before them
        let scope = child_env(&self.global_env);
        let mut members = Vec::with_capacity(body.members.len());
        let mut previous: Option<i64> = None;
        for member in &body.members {
            let ordinal = match &member.value {
                Some(expr) => {
                    let value = self.eval(expr, &scope)?;
                    ordinal(&value)
                        .ok_or_else(|| RuntimeError::type_error("ordinal", &value.type_name()).at(expr.span))?
                }
                None => implicit_ordinal(body.kind, previous).ok_or_else(|| {
                    RuntimeError::invalid_operation(format!("Enumeration value overflow in {}", decl.name.node))
                        .at(member.name.span)
                })?,
            };
            scope.borrow_mut().define(&member.name.node, Value::Int(ordinal));
            members.push((member.name.node.clone(), ordinal));
            previous = Some(ordinal);
        }

        let info = Rc::new(EnumInfo::new(&decl.name.node, body.kind, members));
        if info.kind == EnumKind::Plain {
            let mut globals = self.global_env.borrow_mut();
            for (name, ordinal) in &info.members {
                globals.define(name, Value::Enum(EnumValue::new(&info, *ordinal)));
            }
        }
        self.registry.register_enum(info);
        Ok(())
    }

    fn declare_helper(&mut self, decl: &TypeDecl, helper: &HelperDecl, impls: &mut Implementations) -> InterpResult<()> {
        let key = normalize(&decl.name.node);
        let mut members = MemberTables::default();
        for member in &helper.members {
            match member {
                Member::Field(field) if field.is_class => self.declare_class_var(&members, field)?,
                Member::Field(field) => {
                    let span = field.names.first().map(|n| n.span).unwrap_or(decl.span);
                    return Err(RuntimeError::invalid_operation("helpers cannot declare instance fields").at(span));
                }
                Member::Method(method) => members.add_method(resolve_method(&key, method, impls)),
                Member::Property(prop) => declare_property(&mut members, prop),
                Member::Const(c) => declare_constant(&mut members, c),
            }
        }
        for orphan in impls.rest(&key) {
            members.add_method(orphan);
        }

        let target = helper_key_for_type(&helper.target);
        let target = match helper.target.as_name() {
            Some(name) if self.registry.aliases.contains_key(&normalize(name)) => self.registry.resolve_name(name),
            _ => target,
        };
        self.registry.register_helper(Rc::new(HelperInfo {
            name: decl.name.node.clone(),
            key,
            target,
            parent_name: helper.parent.as_ref().map(|p| p.node.clone()),
            parent: RefCell::new(None),
            members,
        }));
        self.registry.resolve_helper_parents();
        Ok(())
    }

    /// Evaluate a `class var` initializer (or zero value) into its slot
    fn declare_class_var(&mut self, members: &MemberTables, field: &crate::ast::FieldDecl) -> InterpResult<()> {
        let env = Rc::clone(&self.global_env);
        for field_name in &field.names {
            let value = match (&field.init, &field.ty) {
                (Some(init), Some(ty)) => {
                    let value = self.eval(init, &env)?;
                    let target = self.runtime_type(ty);
                    self.coerce_to(value, &target, init.span)?
                }
                (Some(init), None) => self.eval(init, &env)?.copy_value(),
                (None, Some(ty)) => self.zero_value(ty)?,
                (None, None) => Value::Nil,
            };
            members.class_vars.borrow_mut().insert(normalize(&field_name.node), value);
        }
        Ok(())
    }
}

/// Method from a type body with its out-of-line body attached
fn resolve_method(owner: &str, method: &Rc<RoutineDecl>, impls: &mut Implementations) -> Rc<RoutineDecl> {
    if method.body.is_some() || method.directives.is_abstract {
        return Rc::clone(method);
    }
    match impls.take(owner, method) {
        Some(imp) => merge_implementation(method, &imp),
        None => Rc::clone(method),
    }
}

fn property_info(prop: &PropertyDecl) -> PropertyInfo {
    PropertyInfo {
        name: prop.name.node.clone(),
        ty: prop.ty.clone(),
        index_params: prop.index_params.clone(),
        read: prop.read.as_ref().map(|r| r.node.clone()),
        write: prop.write.as_ref().map(|w| w.node.clone()),
        is_class: prop.is_class,
        is_default: prop.is_default,
    }
}

fn declare_property(members: &mut MemberTables, prop: &PropertyDecl) {
    members.properties.insert(normalize(&prop.name.node), property_info(prop));
}

/// Value of a member declared without `= expr`
fn implicit_ordinal(kind: EnumKind, previous: Option<i64>) -> Option<i64> {
    match (kind, previous) {
        (EnumKind::Flags, None) => Some(1),
        (EnumKind::Flags, Some(prev)) => u64::try_from(prev)
            .ok()?
            .checked_add(1)?
            .checked_next_power_of_two()
            .and_then(|n| i64::try_from(n).ok()),
        (_, None) => Some(0),
        (_, Some(prev)) => prev.checked_add(1),
    }
}

fn declare_constant(members: &mut MemberTables, c: &crate::ast::ConstDecl) {
    members.constants.insert(
        normalize(&c.name.node),
        ConstInfo {
            name: c.name.node.clone(),
            value: c.value.clone(),
        },
    );
}
