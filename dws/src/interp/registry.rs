//! Class, interface, record, enumeration and helper metadata
//!
//! Descriptors are immutable once registered (apart from class-var storage
//! and memoized constants) and are shared by every instance through `Rc`.
//! All tables are keyed by normalized names.

use super::value::Value;
use crate::ast::{EnumKind, Expr, Param, RoutineDecl, Span, Spanned, TypeRef};
use crate::util::normalize;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Shared storage for `class var` slots
pub type VarStore = Rc<RefCell<IndexMap<String, Value>>>;

/// Overload set keyed by normalized routine name
pub type MethodTable = IndexMap<String, Vec<Rc<RoutineDecl>>>;

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub ty: Option<TypeRef>,
    pub init: Option<Spanned<Expr>>,
}

#[derive(Debug, Clone)]
pub struct PropertyInfo {
    pub name: String,
    pub ty: TypeRef,
    pub index_params: Vec<Param>,
    /// Backing field or getter method
    pub read: Option<String>,
    /// Backing field or setter method
    pub write: Option<String>,
    pub is_class: bool,
    pub is_default: bool,
}

#[derive(Debug, Clone)]
pub struct ConstInfo {
    pub name: String,
    pub value: Spanned<Expr>,
}

/// Members shared by classes, records and helpers
#[derive(Default)]
pub struct MemberTables {
    pub methods: MethodTable,
    pub class_methods: MethodTable,
    pub properties: IndexMap<String, PropertyInfo>,
    pub class_vars: VarStore,
    pub constants: IndexMap<String, ConstInfo>,
    /// Constants are evaluated on first use, then memoized
    pub constant_values: RefCell<HashMap<String, Value>>,
}

impl MemberTables {
    pub fn add_method(&mut self, decl: Rc<RoutineDecl>) {
        let table = if decl.is_class {
            &mut self.class_methods
        } else {
            &mut self.methods
        };
        table.entry(normalize(&decl.name.node)).or_default().push(decl);
    }

    pub fn has_class_var(&self, key: &str) -> bool {
        self.class_vars.borrow().contains_key(key)
    }
}

/// Runtime class descriptor
pub struct ClassInfo {
    pub name: String,
    pub key: String,
    pub parent: Option<Rc<ClassInfo>>,
    /// Interfaces declared directly on this class
    pub interfaces: Vec<Rc<InterfaceInfo>>,
    /// Fields declared by this class (inherited ones live on the parent)
    pub fields: IndexMap<String, FieldInfo>,
    pub constructors: MethodTable,
    pub members: MemberTables,
    pub is_abstract: bool,
    pub is_external: bool,
    pub span: Span,
}

impl ClassInfo {
    pub fn new(name: &str, parent: Option<Rc<ClassInfo>>) -> Self {
        ClassInfo {
            name: name.to_string(),
            key: normalize(name),
            parent,
            interfaces: Vec::new(),
            fields: IndexMap::new(),
            constructors: IndexMap::new(),
            members: MemberTables::default(),
            is_abstract: false,
            is_external: false,
            span: Span::default(),
        }
    }

    /// This class followed by every ancestor up to the root
    pub fn ancestors(self: &Rc<Self>) -> impl Iterator<Item = Rc<ClassInfo>> {
        std::iter::successors(Some(Rc::clone(self)), |c| c.parent.clone())
    }

    /// Ancestors from the root down to this class
    pub fn lineage(self: &Rc<Self>) -> Vec<Rc<ClassInfo>> {
        let mut chain: Vec<_> = self.ancestors().collect();
        chain.reverse();
        chain
    }

    pub fn inherits_from(self: &Rc<Self>, name: &str) -> bool {
        let key = normalize(name);
        self.ancestors().any(|c| c.key == key)
    }

    /// Overloads of an instance method, from the most derived class that
    /// declares the name
    pub fn find_method(self: &Rc<Self>, name: &str) -> Option<(Rc<ClassInfo>, Vec<Rc<RoutineDecl>>)> {
        let key = normalize(name);
        self.ancestors()
            .find_map(|c| c.members.methods.get(&key).cloned().map(|m| (Rc::clone(&c), m)))
    }

    pub fn find_class_method(self: &Rc<Self>, name: &str) -> Option<(Rc<ClassInfo>, Vec<Rc<RoutineDecl>>)> {
        let key = normalize(name);
        self.ancestors()
            .find_map(|c| c.members.class_methods.get(&key).cloned().map(|m| (Rc::clone(&c), m)))
    }

    pub fn find_constructor(self: &Rc<Self>, name: &str) -> Option<(Rc<ClassInfo>, Vec<Rc<RoutineDecl>>)> {
        let key = normalize(name);
        self.ancestors()
            .find_map(|c| c.constructors.get(&key).cloned().map(|m| (Rc::clone(&c), m)))
    }

    pub fn find_property(self: &Rc<Self>, name: &str) -> Option<(Rc<ClassInfo>, PropertyInfo)> {
        let key = normalize(name);
        self.ancestors()
            .find_map(|c| c.members.properties.get(&key).cloned().map(|p| (Rc::clone(&c), p)))
    }

    pub fn find_default_property(self: &Rc<Self>) -> Option<(Rc<ClassInfo>, PropertyInfo)> {
        self.ancestors().find_map(|c| {
            c.members
                .properties
                .values()
                .find(|p| p.is_default)
                .cloned()
                .map(|p| (Rc::clone(&c), p))
        })
    }

    pub fn has_field(self: &Rc<Self>, name: &str) -> bool {
        let key = normalize(name);
        self.ancestors().any(|c| c.fields.contains_key(&key))
    }

    /// Class whose `class var` table holds `name`
    pub fn find_class_var(self: &Rc<Self>, name: &str) -> Option<Rc<ClassInfo>> {
        let key = normalize(name);
        self.ancestors().find(|c| c.members.has_class_var(&key))
    }

    pub fn find_constant(self: &Rc<Self>, name: &str) -> Option<(Rc<ClassInfo>, ConstInfo)> {
        let key = normalize(name);
        self.ancestors()
            .find_map(|c| c.members.constants.get(&key).cloned().map(|k| (Rc::clone(&c), k)))
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.clone()))
            .finish()
    }
}

/// Runtime interface descriptor
pub struct InterfaceInfo {
    pub name: String,
    pub key: String,
    pub parent: Option<Rc<InterfaceInfo>>,
    pub methods: IndexMap<String, Rc<RoutineDecl>>,
    pub properties: IndexMap<String, PropertyInfo>,
}

impl InterfaceInfo {
    pub fn new(name: &str, parent: Option<Rc<InterfaceInfo>>) -> Self {
        InterfaceInfo {
            name: name.to_string(),
            key: normalize(name),
            parent,
            methods: IndexMap::new(),
            properties: IndexMap::new(),
        }
    }

    pub fn ancestors(self: &Rc<Self>) -> impl Iterator<Item = Rc<InterfaceInfo>> {
        std::iter::successors(Some(Rc::clone(self)), |i| i.parent.clone())
    }

    /// Whether this interface is `key` or derives from it
    pub fn extends(self: &Rc<Self>, key: &str) -> bool {
        self.ancestors().any(|i| i.key == key)
    }

    /// Own and inherited methods; a redeclared name counts once
    pub fn all_methods(self: &Rc<Self>) -> Vec<Rc<RoutineDecl>> {
        let mut seen = IndexMap::new();
        for intf in self.ancestors() {
            for (key, decl) in &intf.methods {
                seen.entry(key.clone()).or_insert_with(|| Rc::clone(decl));
            }
        }
        seen.into_values().collect()
    }

    pub fn has_method(self: &Rc<Self>, name: &str) -> bool {
        let key = normalize(name);
        self.ancestors().any(|i| i.methods.contains_key(&key))
    }

    pub fn find_property(self: &Rc<Self>, name: &str) -> Option<PropertyInfo> {
        let key = normalize(name);
        self.ancestors().find_map(|i| i.properties.get(&key).cloned())
    }
}

impl fmt::Debug for InterfaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceInfo")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.clone()))
            .finish()
    }
}

/// Runtime record descriptor
pub struct RecordInfo {
    pub name: String,
    pub key: String,
    pub fields: IndexMap<String, FieldInfo>,
    pub members: MemberTables,
}

impl RecordInfo {
    pub fn new(name: &str) -> Self {
        RecordInfo {
            name: name.to_string(),
            key: normalize(name),
            fields: IndexMap::new(),
            members: MemberTables::default(),
        }
    }
}

impl fmt::Debug for RecordInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordInfo").field("name", &self.name).finish()
    }
}

/// Runtime enumeration descriptor
pub struct EnumInfo {
    pub name: String,
    pub key: String,
    pub kind: EnumKind,
    /// Declared names and ordinals, in declaration order
    pub members: Vec<(String, i64)>,
}

impl EnumInfo {
    pub fn new(name: &str, kind: EnumKind, members: Vec<(String, i64)>) -> Self {
        EnumInfo {
            name: name.to_string(),
            key: normalize(name),
            kind,
            members,
        }
    }

    pub fn low(&self) -> i64 {
        self.members.iter().map(|(_, n)| *n).min().unwrap_or(0)
    }

    pub fn high(&self) -> i64 {
        self.members.iter().map(|(_, n)| *n).max().unwrap_or(0)
    }

    /// Ordinal of a member, matched case-insensitively
    pub fn lookup(&self, name: &str) -> Option<i64> {
        self.members
            .iter()
            .find(|(member, _)| member.eq_ignore_ascii_case(name))
            .map(|(_, n)| *n)
    }

    /// First member declared with this ordinal
    pub fn name_of(&self, ordinal: i64) -> Option<&str> {
        self.members.iter().find(|(_, n)| *n == ordinal).map(|(name, _)| name.as_str())
    }

    /// Ordinal of the member declared after the one holding `ordinal`
    pub fn succ(&self, ordinal: i64) -> Option<i64> {
        let pos = self.members.iter().position(|(_, n)| *n == ordinal)?;
        self.members.get(pos + 1).map(|(_, n)| *n)
    }

    /// Ordinal of the member declared before the one holding `ordinal`
    pub fn pred(&self, ordinal: i64) -> Option<i64> {
        let pos = self.members.iter().position(|(_, n)| *n == ordinal)?;
        pos.checked_sub(1).and_then(|p| self.members.get(p)).map(|(_, n)| *n)
    }
}

impl fmt::Debug for EnumInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Methods and members attached to an existing type
pub struct HelperInfo {
    pub name: String,
    pub key: String,
    /// Normalized key of the extended type (see `helper_key_for_type`)
    pub target: String,
    pub parent_name: Option<String>,
    /// Resolved after every helper is registered
    pub parent: RefCell<Option<Rc<HelperInfo>>>,
    pub members: MemberTables,
}

impl HelperInfo {
    /// This helper, then its parent helpers
    pub fn chain(self: &Rc<Self>) -> Vec<Rc<HelperInfo>> {
        let mut chain = vec![Rc::clone(self)];
        let mut current = self.parent.borrow().clone();
        while let Some(helper) = current {
            if chain.iter().any(|h| Rc::ptr_eq(h, &helper)) {
                break;
            }
            current = helper.parent.borrow().clone();
            chain.push(helper);
        }
        chain
    }
}

impl fmt::Debug for HelperInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelperInfo")
            .field("name", &self.name)
            .field("target", &self.target)
            .finish()
    }
}

/// Declaring context of a method: decides what `Self`, unqualified member
/// names and `inherited` resolve against
#[derive(Debug, Clone)]
pub enum MethodOwner {
    Class(Rc<ClassInfo>),
    Record(Rc<RecordInfo>),
    Helper(Rc<HelperInfo>),
}

impl MethodOwner {
    pub fn members(&self) -> &MemberTables {
        match self {
            MethodOwner::Class(c) => &c.members,
            MethodOwner::Record(r) => &r.members,
            MethodOwner::Helper(h) => &h.members,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MethodOwner::Class(c) => &c.name,
            MethodOwner::Record(r) => &r.name,
            MethodOwner::Helper(h) => &h.name,
        }
    }
}

/// All declared types, by normalized name
#[derive(Default)]
pub struct TypeRegistry {
    pub classes: IndexMap<String, Rc<ClassInfo>>,
    pub interfaces: IndexMap<String, Rc<InterfaceInfo>>,
    pub records: IndexMap<String, Rc<RecordInfo>>,
    pub enums: IndexMap<String, Rc<EnumInfo>>,
    /// In declaration order; later helpers take precedence
    pub helpers: Vec<Rc<HelperInfo>>,
    pub aliases: HashMap<String, TypeRef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow aliases to the underlying type name
    pub fn resolve_name(&self, name: &str) -> String {
        let mut key = normalize(name);
        for _ in 0..16 {
            match self.aliases.get(&key).and_then(TypeRef::as_name) {
                Some(target) => key = normalize(target),
                None => break,
            }
        }
        key
    }

    pub fn lookup_class(&self, name: &str) -> Option<Rc<ClassInfo>> {
        self.classes.get(&self.resolve_name(name)).cloned()
    }

    pub fn lookup_interface(&self, name: &str) -> Option<Rc<InterfaceInfo>> {
        self.interfaces.get(&self.resolve_name(name)).cloned()
    }

    pub fn lookup_record(&self, name: &str) -> Option<Rc<RecordInfo>> {
        self.records.get(&self.resolve_name(name)).cloned()
    }

    pub fn lookup_enum(&self, name: &str) -> Option<Rc<EnumInfo>> {
        self.enums.get(&self.resolve_name(name)).cloned()
    }

    pub fn register_class(&mut self, class: Rc<ClassInfo>) {
        tracing::debug!(class = %class.name, parent = ?class.parent.as_ref().map(|p| &p.name), "registered class");
        self.classes.insert(class.key.clone(), class);
    }

    pub fn register_interface(&mut self, intf: Rc<InterfaceInfo>) {
        tracing::debug!(interface = %intf.name, "registered interface");
        self.interfaces.insert(intf.key.clone(), intf);
    }

    pub fn register_record(&mut self, record: Rc<RecordInfo>) {
        tracing::debug!(record = %record.name, "registered record");
        self.records.insert(record.key.clone(), record);
    }

    pub fn register_enum(&mut self, info: Rc<EnumInfo>) {
        tracing::debug!(name = %info.name, members = info.members.len(), "registered enum");
        self.enums.insert(info.key.clone(), info);
    }

    pub fn register_helper(&mut self, helper: Rc<HelperInfo>) {
        tracing::debug!(helper = %helper.name, target = %helper.target, "registered helper");
        self.helpers.retain(|h| h.key != helper.key);
        self.helpers.push(helper);
    }

    pub fn lookup_helper(&self, name: &str) -> Option<Rc<HelperInfo>> {
        let key = normalize(name);
        self.helpers.iter().rev().find(|h| h.key == key).cloned()
    }

    /// Helpers extending `target`, most recently declared first
    pub fn helpers_for(&self, target: &str) -> Vec<Rc<HelperInfo>> {
        self.helpers
            .iter()
            .rev()
            .filter(|h| h.target == target)
            .cloned()
            .collect()
    }

    /// Link each helper to its parent helper. Runs after all helpers of a
    /// program are registered so declaration order does not matter.
    pub fn resolve_helper_parents(&self) {
        for helper in &self.helpers {
            if let Some(parent) = &helper.parent_name {
                let resolved = self.lookup_helper(parent);
                if resolved.is_none() {
                    tracing::warn!(helper = %helper.name, parent = %parent, "unknown parent helper");
                }
                *helper.parent.borrow_mut() = resolved;
            }
        }
    }
}

/// `class` or any ancestor declares `iface` or an interface derived from it
pub fn class_implements_interface(class: &Rc<ClassInfo>, iface: &Rc<InterfaceInfo>) -> bool {
    class
        .ancestors()
        .any(|c| c.interfaces.iter().any(|declared| declared.extends(&iface.key)))
}

/// Only interfaces listed on this exact class count (used by `implements`)
pub fn class_explicitly_implements_interface(class: &Rc<ClassInfo>, iface: &Rc<InterfaceInfo>) -> bool {
    class.interfaces.iter().any(|declared| declared.key == iface.key)
}

/// `target` appears on the ancestor chain of `actual`
pub fn is_class_compatible(actual: &Rc<ClassInfo>, target: &Rc<ClassInfo>) -> bool {
    actual.ancestors().any(|c| c.key == target.key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Directives, RoutineKind};

    fn routine(name: &str) -> Rc<RoutineDecl> {
        Rc::new(RoutineDecl {
            name: Spanned::new(name.to_string(), Span::default()),
            owner: None,
            kind: RoutineKind::Procedure,
            is_class: false,
            params: Vec::new(),
            ret_ty: None,
            directives: Directives::default(),
            require: Vec::new(),
            ensure: Vec::new(),
            body: None,
            span: Span::default(),
        })
    }

    fn interface(name: &str, parent: Option<&Rc<InterfaceInfo>>, methods: &[&str]) -> Rc<InterfaceInfo> {
        let mut info = InterfaceInfo::new(name, parent.cloned());
        for m in methods {
            info.methods.insert(normalize(m), routine(m));
        }
        Rc::new(info)
    }

    fn class(name: &str, parent: Option<&Rc<ClassInfo>>, interfaces: &[&Rc<InterfaceInfo>]) -> Rc<ClassInfo> {
        let mut info = ClassInfo::new(name, parent.cloned());
        info.interfaces = interfaces.iter().map(|i| Rc::clone(i)).collect();
        Rc::new(info)
    }

    #[test]
    fn test_three_level_interface_methods() {
        let base = interface("IBase", None, &["BaseMethod"]);
        let middle = interface("IMiddle", Some(&base), &["MiddleMethod"]);
        let derived = interface("IDerived", Some(&middle), &["DerivedMethod"]);
        let k = class("TImpl", None, &[&derived]);

        assert_eq!(derived.all_methods().len(), 3);
        assert!(class_implements_interface(&k, &base));
        assert!(class_implements_interface(&k, &middle));
        assert!(class_implements_interface(&k, &derived));
    }

    #[test]
    fn test_implementation_inherited_from_parent_class() {
        let intf = interface("IPrintable", None, &["Print"]);
        let parent = class("TParent", None, &[&intf]);
        let child = class("TChild", Some(&parent), &[]);

        assert!(class_implements_interface(&child, &intf));
        assert!(!class_explicitly_implements_interface(&child, &intf));
        assert!(class_explicitly_implements_interface(&parent, &intf));
    }

    #[test]
    fn test_explicit_check_ignores_interface_inheritance() {
        let base = interface("IBase", None, &[]);
        let derived = interface("IDerived", Some(&base), &[]);
        let k = class("TK", None, &[&derived]);

        assert!(class_implements_interface(&k, &base));
        assert!(!class_explicitly_implements_interface(&k, &base));
    }

    #[test]
    fn test_class_compatibility() {
        let animal = class("TAnimal", None, &[]);
        let dog = class("TDog", Some(&animal), &[]);
        let car = class("TCar", None, &[]);

        assert!(is_class_compatible(&dog, &animal));
        assert!(is_class_compatible(&dog, &dog));
        assert!(!is_class_compatible(&animal, &dog));
        assert!(!is_class_compatible(&car, &animal));
        assert!(dog.inherits_from("tanimal"));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut registry = TypeRegistry::new();
        registry.register_class(class("TMyClass", None, &[]));
        registry.register_interface(interface("IMyIntf", None, &[]));

        assert!(registry.lookup_class("TMYCLASS").is_some());
        assert!(registry.lookup_class("tmyclass").is_some());
        assert!(registry.lookup_interface("imyintf").is_some());
        assert!(registry.lookup_class("TOther").is_none());
    }

    #[test]
    fn test_alias_resolution() {
        let mut registry = TypeRegistry::new();
        registry.register_class(class("TNode", None, &[]));
        registry.aliases.insert("tnodealias".to_string(), TypeRef::named("TNode"));
        assert!(registry.lookup_class("TNodeAlias").is_some());
    }

    #[test]
    fn test_method_lookup_prefers_most_derived() {
        let mut base = ClassInfo::new("TBase", None);
        base.members.add_method(routine("Speak"));
        base.members.add_method(routine("Walk"));
        let base = Rc::new(base);
        let mut derived = ClassInfo::new("TDerived", Some(Rc::clone(&base)));
        derived.members.add_method(routine("Speak"));
        let derived = Rc::new(derived);

        let (owner, _) = derived.find_method("SPEAK").expect("speak");
        assert_eq!(owner.name, "TDerived");
        let (owner, _) = derived.find_method("walk").expect("walk");
        assert_eq!(owner.name, "TBase");
    }

    #[test]
    fn test_helper_chain_and_precedence() {
        let make = |name: &str, parent: Option<&str>| {
            Rc::new(HelperInfo {
                name: name.to_string(),
                key: normalize(name),
                target: "integer".to_string(),
                parent_name: parent.map(str::to_string),
                parent: RefCell::new(None),
                members: MemberTables::default(),
            })
        };
        let mut registry = TypeRegistry::new();
        registry.register_helper(make("TChildHelper", Some("TBaseHelper")));
        registry.register_helper(make("TBaseHelper", None));
        registry.resolve_helper_parents();

        let helpers = registry.helpers_for("integer");
        assert_eq!(helpers[0].name, "TBaseHelper");
        let child = registry.lookup_helper("TChildHelper").expect("child");
        let chain: Vec<_> = child.chain().iter().map(|h| h.name.clone()).collect();
        assert_eq!(chain, vec!["TChildHelper", "TBaseHelper"]);
    }
}
