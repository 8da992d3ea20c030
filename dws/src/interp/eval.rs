//! Tree-walking evaluator: interpreter state and expression evaluation

use super::builtins::Builtin;
use super::call::CallArgs;
use super::declare::Implementations;
use super::env::{EnvRef, Environment};
use super::error::{ErrorKind, InterpResult, RuntimeError};
use super::refs::char_at;
use super::registry::{MethodOwner, TypeRegistry};
use super::types::ordinal;
use super::value::{ArrayValue, FunctionPointer, Value};
use crate::ast::{Expr, Item, Program, RoutineDecl, RoutineKind, Span, Spanned};
use crate::util::{normalize, same_name, suggest_similar};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Default maximum call depth before `EScriptStackOverflow` is raised
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1024;

/// Stack growth parameters for deep recursion
pub(crate) const STACK_RED_ZONE: usize = 128 * 1024; // 128KB remaining triggers growth
pub(crate) const STACK_GROW_SIZE: usize = 4 * 1024 * 1024; // Grow by 4MB each time

/// Interpreter settings
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Script-level call depth limit
    pub max_recursion_depth: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

/// Sink for `Print`/`PrintLn`
#[derive(Debug, Clone)]
pub enum Output {
    Stdout,
    Buffer(Rc<RefCell<String>>),
}

/// One active routine invocation
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub name: String,
    pub decl: Rc<RoutineDecl>,
    /// Declaring class/record/helper for methods
    pub owner: Option<MethodOwner>,
    pub span: Span,
}

/// The interpreter
pub struct Interpreter {
    pub(crate) config: InterpreterConfig,
    /// Global environment
    pub(crate) global_env: EnvRef,
    /// Global routines by normalized name (overload sets)
    pub(crate) functions: IndexMap<String, Vec<Rc<RoutineDecl>>>,
    /// Classes, interfaces, records and helpers
    pub(crate) registry: TypeRegistry,
    /// Builtin functions
    pub(crate) builtins: HashMap<String, Builtin>,
    /// Active invocations, innermost last
    pub(crate) call_stack: Vec<CallFrame>,
    /// Exceptions whose handlers are running, innermost last
    pub(crate) handling: Vec<RuntimeError>,
    pub(crate) output: Output,
    pub(crate) rng_state: u64,
}

impl Interpreter {
    /// Create a new interpreter
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        let mut interp = Interpreter {
            config,
            global_env: Environment::new().into_ref(),
            functions: IndexMap::new(),
            registry: TypeRegistry::new(),
            builtins: HashMap::new(),
            call_stack: Vec::new(),
            handling: Vec::new(),
            output: Output::Stdout,
            rng_state: 0x2545_F491_4F6C_DD1D,
        };
        interp.register_builtins();
        interp.load_prelude();
        interp
    }

    /// Interpreter whose output is collected into the returned buffer
    pub fn with_captured_output() -> (Self, Rc<RefCell<String>>) {
        let mut interp = Self::new();
        let buffer = Rc::new(RefCell::new(String::new()));
        interp.output = Output::Buffer(Rc::clone(&buffer));
        (interp, buffer)
    }

    pub fn set_output(&mut self, output: Output) {
        self.output = output;
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn global_env(&self) -> &EnvRef {
        &self.global_env
    }

    /// Run a program: declarations register as they are reached, statements execute in order
    pub fn run(&mut self, program: &Program) -> InterpResult<()> {
        tracing::info!(program = ?program.name, items = program.items.len(), "running program");
        let mut impls = Implementations::collect(program);

        // Declarations take effect in source order, interleaved with statements
        let env = Rc::clone(&self.global_env);
        for item in &program.items {
            let Item::Stmt(stmt) = item else {
                self.declare_item(item, &mut impls)?;
                continue;
            };
            match self.exec(stmt, &env) {
                Ok(()) => {}
                Err(e) if e.kind == ErrorKind::Exit => break,
                Err(e) if e.is_control_flow() => {}
                Err(e) => {
                    tracing::debug!(error = %e, "program aborted");
                    return Err(e);
                }
            }
        }
        tracing::info!("program finished");
        Ok(())
    }

    pub(crate) fn write_output(&mut self, text: &str) {
        match &self.output {
            Output::Stdout => print!("{text}"),
            Output::Buffer(buffer) => buffer.borrow_mut().push_str(text),
        }
    }

    pub(crate) fn current_frame(&self) -> Option<&CallFrame> {
        self.call_stack.last()
    }

    pub(crate) fn current_owner(&self) -> Option<MethodOwner> {
        self.call_stack.last().and_then(|f| f.owner.clone())
    }

    /// Evaluate an expression with automatic stack growth for deep recursion
    pub fn eval(&mut self, expr: &Spanned<Expr>, env: &EnvRef) -> InterpResult<Value> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.eval_inner(expr, env))
    }

    fn eval_inner(&mut self, expr: &Spanned<Expr>, env: &EnvRef) -> InterpResult<Value> {
        let span = expr.span;
        match &expr.node {
            Expr::IntLit(n) => Ok(Value::Int(*n)),
            Expr::FloatLit(f) => Ok(Value::Float(*f)),
            Expr::StrLit(s) => Ok(Value::Str(s.clone())),
            Expr::BoolLit(b) => Ok(Value::Bool(*b)),
            Expr::Nil => Ok(Value::Nil),

            Expr::Ident(name) => self.lookup_ident(name, env, span),

            Expr::SelfRef => {
                let value = env.borrow().get("self");
                match value {
                    Some(value) => self.read_binding(value, span),
                    None => Err(RuntimeError::undefined_variable("Self").at(span)),
                }
            }

            Expr::Binary { left, op, right } => self.eval_binary(*op, left, right, env, span),

            Expr::Unary { op, expr: operand } => {
                let value = self.eval(operand, env)?;
                self.unary_op(*op, value, span)
            }

            Expr::Call { callee, args } => self.eval_call(callee, args, env, span),

            Expr::Member { object, member } => self.eval_member(object, member, None, env, span),

            Expr::Index { object, indices } => self.eval_index(object, indices, env, span),

            Expr::ArrayLit(elems) => self.array_literal(elems, env),

            Expr::Range { .. } => Err(RuntimeError::invalid_operation(
                "range expression is only valid inside a set literal or case label",
            )
            .at(span)),

            Expr::Is { expr: operand, target } => self.eval_is(operand, target, env, span),

            Expr::As { expr: operand, target } => {
                let value = self.eval(operand, env)?;
                self.cast_as(value, &target.node, span)
            }

            Expr::Implements { expr: operand, target } => {
                let value = self.eval(operand, env)?;
                self.eval_implements(value, &target.node, span)
            }

            Expr::Inherited {
                method,
                args,
                has_parens,
            } => self.eval_inherited(method.as_ref(), args, *has_parens, env, span),

            Expr::New { class, args } => {
                let Some(info) = self.registry.lookup_class(&class.node) else {
                    return Err(RuntimeError::unknown_type(&class.node).at(class.span));
                };
                self.create_object(&info, Some("Create"), CallArgs::Exprs(args, env), span)
            }

            Expr::Lambda(decl) => Ok(Value::FuncPtr(Rc::new(FunctionPointer {
                decl: Rc::clone(decl),
                closure: Rc::clone(env),
                receiver: None,
                owner: self.current_owner(),
            }))),

            Expr::AddressOf(inner) => self.address_of(inner, env),

            Expr::IfExpr {
                cond,
                then_expr,
                else_expr,
            } => {
                if self.eval(cond, env)?.is_truthy() {
                    self.eval(then_expr, env)
                } else {
                    self.eval(else_expr, env)
                }
            }

            Expr::Old(name) => env
                .borrow()
                .get(&format!("old:{}", name.node))
                .ok_or_else(|| RuntimeError::undefined_variable(&format!("old {}", name.node)).at(span)),
        }
    }

    /// Resolve what a binding stands for: `var` parameters read through
    /// their reference, `lazy` parameters re-evaluate their expression
    pub(crate) fn read_binding(&mut self, value: Value, span: Span) -> InterpResult<Value> {
        match value {
            Value::Ref(r) => r.get().map_err(|e| e.at(span)),
            Value::Lazy(thunk) => {
                let env = Rc::clone(&thunk.env);
                self.eval(&thunk.expr, &env)
            }
            other => Ok(other),
        }
    }

    /// Unqualified name lookup: locals, then members of `Self`, then
    /// globals, routines, types and builtins
    fn lookup_ident(&mut self, name: &str, env: &EnvRef, span: Span) -> InterpResult<Value> {
        let found = env.borrow().get_scoped(name);
        if let Some((value, false)) = found {
            let value = self.read_binding(value, span)?;
            // A nested routine named without parentheses is a call
            if let Value::FuncPtr(fp) = &value {
                if fp.receiver.is_none()
                    && fp.decl.kind != RoutineKind::Lambda
                    && same_name(&fp.decl.name.node, name)
                    && fp.decl.accepts_arg_count(0)
                {
                    let fp = Rc::clone(fp);
                    return self.call_pointer(&fp, CallArgs::bare(env), span);
                }
            }
            return Ok(value);
        }

        if let Some(value) = self.self_member(name, None, env, span)? {
            return Ok(value);
        }

        if let Some((value, true)) = found {
            return self.read_binding(value, span);
        }

        let key = normalize(name);
        if key == "exceptobject" {
            return Ok(self.current_exception_object());
        }

        if let Some(overloads) = self.functions.get(&key).cloned() {
            let closure = Rc::clone(&self.global_env);
            return self.call_overloads(name, &overloads, closure, None, None, CallArgs::bare(env), span);
        }

        if let Some(class) = self.registry.lookup_class(name) {
            return Ok(Value::ClassInfo(class));
        }
        if let Some(record) = self.registry.lookup_record(name) {
            return Ok(Value::RecordType(record));
        }
        if let Some(info) = self.registry.lookup_enum(name) {
            return Ok(Value::EnumType(info));
        }

        if self.builtins.contains_key(&key) {
            return self.call_builtin(&key, &[], env, span);
        }

        Err(self.unknown_name(name, env).at(span))
    }

    fn unknown_name(&self, name: &str, env: &EnvRef) -> RuntimeError {
        let mut err = RuntimeError::undefined_variable(name);
        let env = env.borrow();
        let known: Vec<&str> = env
            .bindings()
            .keys()
            .chain(self.functions.keys())
            .map(String::as_str)
            .collect();
        if let Some(similar) = suggest_similar(name, known) {
            err.message.push_str(&format!(" (did you mean \"{similar}\"?)"));
        }
        err
    }

    fn eval_call(
        &mut self,
        callee: &Spanned<Expr>,
        args: &[Spanned<Expr>],
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Value> {
        match &callee.node {
            Expr::Ident(name) => self.call_named(name, args, env, span),
            Expr::Member { object, member } => self.eval_member(object, member, Some(args), env, span),
            _ => {
                let target = self.eval(callee, env)?;
                self.call_value(target, CallArgs::Exprs(args, env), span)
            }
        }
    }

    /// `Name(args)`: local routine pointers, methods of `Self`, global
    /// routines, type casts, then builtins
    fn call_named(&mut self, name: &str, args: &[Spanned<Expr>], env: &EnvRef, span: Span) -> InterpResult<Value> {
        // Enumeration members are never callable; `Low(..)` stays a builtin
        let found = env
            .borrow()
            .get_scoped(name)
            .filter(|(value, _)| !matches!(value, Value::Enum(_)));
        if let Some((value, false)) = found {
            let target = self.read_binding(value, span)?;
            return self.call_value(target, CallArgs::Exprs(args, env), span);
        }

        if let Some(value) = self.self_member(name, Some(CallArgs::Exprs(args, env)), env, span)? {
            return Ok(value);
        }

        if let Some((value, true)) = found {
            let target = self.read_binding(value, span)?;
            return self.call_value(target, CallArgs::Exprs(args, env), span);
        }

        let key = normalize(name);
        if let Some(overloads) = self.functions.get(&key).cloned() {
            let closure = Rc::clone(&self.global_env);
            return self.call_overloads(name, &overloads, closure, None, None, CallArgs::Exprs(args, env), span);
        }

        if let Some(value) = self.explicit_cast(name, args, env, span)? {
            return Ok(value);
        }

        if self.builtins.contains_key(&key) {
            return self.call_builtin(&key, args, env, span);
        }

        let mut err = RuntimeError::undefined_function(name);
        let known = self.functions.keys().chain(self.builtins.keys()).map(String::as_str);
        if let Some(similar) = suggest_similar(&key, known) {
            err.message.push_str(&format!(" (did you mean \"{similar}\"?)"));
        }
        Err(err.at(span))
    }

    /// Call whatever a value holds (function pointers, lambdas, bound methods)
    pub(crate) fn call_value(&mut self, target: Value, args: CallArgs<'_>, span: Span) -> InterpResult<Value> {
        match target.unwrap_variant() {
            Value::FuncPtr(fp) => self.call_pointer(&fp, args, span),
            Value::Nil => Err(RuntimeError::invalid_operation("function pointer is nil").at(span)),
            Value::ClassInfo(class) | Value::ClassRef(class) if args.is_empty() => Ok(Value::ClassRef(class)),
            other => Err(RuntimeError::type_error("callable", &other.type_name()).at(span)),
        }
    }

    fn eval_member(
        &mut self,
        object: &Spanned<Expr>,
        member: &Spanned<String>,
        args: Option<&[Spanned<Expr>]>,
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Value> {
        let target = self.eval(object, env)?;
        let target_ref = match target.unwrap_variant_ref() {
            Value::Record(_) | Value::Str(_) | Value::Int(_) | Value::Float(_) | Value::Array(_) => {
                self.lvalue(object, env)?
            }
            _ => None,
        };
        let call_args = args.map(|a| CallArgs::Exprs(a, env));
        let type_name = target.type_name();
        match self.access_member(target, target_ref, &member.node, call_args, env, span)? {
            Some(value) => Ok(value),
            None => Err(RuntimeError::invalid_operation(format!(
                "member \"{}\" not found in {}",
                member.node, type_name
            ))
            .at(member.span)),
        }
    }

    fn eval_index(
        &mut self,
        object: &Spanned<Expr>,
        indices: &[Spanned<Expr>],
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Value> {
        if let Some((host, property)) = self.indexed_property_target(object, env)? {
            let mut index_values = Vec::with_capacity(indices.len());
            for e in indices {
                index_values.push(self.eval(e, env)?);
            }
            return self.read_property(host, &property, index_values, span);
        }

        let mut value = self.eval(object, env)?;
        for (n, index_expr) in indices.iter().enumerate() {
            match value.unwrap_all() {
                Value::Array(array) => {
                    let index = self.eval_ordinal(index_expr, env)?;
                    let slot = array.borrow().slot(index);
                    value = match slot {
                        Some(slot) => array.borrow().elems[slot].clone(),
                        None => return Err(self.range_error(&array, index, index_expr.span)),
                    };
                }
                Value::Str(s) => {
                    let index = self.eval_ordinal(index_expr, env)?;
                    value = match char_at(&s, index) {
                        Some(c) => Value::Str(c.to_string()),
                        None => {
                            return Err(self.exception(
                                "ERangeError",
                                &format!(
                                    "string index {index} out of range [1..{}] {}",
                                    s.chars().count(),
                                    index_expr.span.location()
                                ),
                                index_expr.span,
                            ));
                        }
                    };
                }
                host @ (Value::Object(_) | Value::Interface(_) | Value::Record(_)) => {
                    let mut index_values = Vec::new();
                    for e in &indices[n..] {
                        index_values.push(self.eval(e, env)?);
                    }
                    let host_ref = if matches!(host, Value::Record(_)) {
                        self.lvalue(object, env)?
                    } else {
                        None
                    };
                    return self.read_default_property(host, host_ref, index_values, span);
                }
                Value::Nil => return Err(self.not_instantiated(span)),
                other => {
                    return Err(RuntimeError::type_error("array or string", &other.type_name()).at(span));
                }
            }
        }
        Ok(value)
    }

    pub(crate) fn eval_ordinal(&mut self, expr: &Spanned<Expr>, env: &EnvRef) -> InterpResult<i64> {
        let value = self.eval(expr, env)?;
        ordinal(&value).ok_or_else(|| RuntimeError::type_error("ordinal", &value.type_name()).at(expr.span))
    }

    /// `[a, b, lo..hi]`: an array value (converted to a set when stored
    /// into a set-typed slot)
    fn array_literal(&mut self, elems: &[Spanned<Expr>], env: &EnvRef) -> InterpResult<Value> {
        let mut values = Vec::with_capacity(elems.len());
        for elem in elems {
            match &elem.node {
                Expr::Range { low, high } => {
                    let low = self.eval_ordinal(low, env)?;
                    let high = self.eval_ordinal(high, env)?;
                    values.extend((low..=high).map(Value::Int));
                }
                _ => values.push(self.eval(elem, env)?),
            }
        }
        Ok(Value::Array(ArrayValue::dynamic(values, None).into_ref()))
    }

    /// `@Routine`, `@obj.Method`, `@Local`
    fn address_of(&mut self, inner: &Spanned<Expr>, env: &EnvRef) -> InterpResult<Value> {
        let span = inner.span;
        match &inner.node {
            Expr::Ident(name) => {
                if let Some((value, false)) = env.borrow().get_scoped(name) {
                    return Ok(value);
                }
                if let Some(ptr) = self.self_method_pointer(name, env)? {
                    return Ok(ptr);
                }
                if let Some(overloads) = self.functions.get(&normalize(name)) {
                    if let Some(decl) = overloads.first() {
                        return Ok(Value::FuncPtr(Rc::new(FunctionPointer {
                            decl: Rc::clone(decl),
                            closure: Rc::clone(&self.global_env),
                            receiver: None,
                            owner: None,
                        })));
                    }
                }
                match env.borrow().get(name) {
                    Some(value) => Ok(value),
                    None => Err(RuntimeError::undefined_function(name).at(span)),
                }
            }
            Expr::Member { object, member } => {
                let target = self.eval(object, env)?;
                match self.method_pointer(target, &member.node, span)? {
                    Some(ptr) => Ok(ptr),
                    None => Err(RuntimeError::invalid_operation(format!(
                        "\"{}\" is not a method",
                        member.node
                    ))
                    .at(member.span)),
                }
            }
            _ => self.eval(inner, env),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Value {
    /// Look through a variant without consuming it
    pub(crate) fn unwrap_variant_ref(&self) -> &Value {
        match self {
            Value::Variant(v) => v.value.as_ref().unwrap_or(self),
            other => other,
        }
    }
}
