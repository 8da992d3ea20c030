//! Call pipeline shared by functions, methods, constructors and function
//! pointers: overload selection, argument binding, invocation

use super::env::{child_env, EnvRef};
use super::error::{InterpResult, RuntimeError};
use super::eval::{Interpreter, CallFrame, STACK_GROW_SIZE, STACK_RED_ZONE};
use super::refs::Reference;
use super::registry::MethodOwner;
use super::types::RuntimeType;
use super::value::{FunctionPointer, LazyThunk, Value};
use crate::ast::{Body, Contract, Expr, IsTarget, ParamMode, RoutineDecl, RoutineKind, Span, Spanned};
use std::rc::Rc;

/// Arguments of a call, either still unevaluated at the call site or
/// already evaluated (callbacks from builtins, property accessors)
#[derive(Clone)]
pub enum CallArgs<'a> {
    Exprs(&'a [Spanned<Expr>], &'a EnvRef),
    Values(Vec<Value>),
}

impl<'a> CallArgs<'a> {
    /// A call written without arguments; defaults still see the call site
    pub fn bare(env: &'a EnvRef) -> Self {
        CallArgs::Exprs(&[], env)
    }

    pub fn len(&self) -> usize {
        match self {
            CallArgs::Exprs(exprs, _) => exprs.len(),
            CallArgs::Values(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Interpreter {
    /// Resolve an overload set against the arguments and run the winner
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn call_overloads(
        &mut self,
        name: &str,
        overloads: &[Rc<RoutineDecl>],
        closure: EnvRef,
        receiver: Option<Value>,
        owner: Option<MethodOwner>,
        args: CallArgs<'_>,
        span: Span,
    ) -> InterpResult<Value> {
        let (decl, evaluated) = self.select_overload(name, overloads, &args, span)?;
        let values = self.prepare_args(&decl, args, evaluated, span)?;
        self.invoke(&decl, closure, receiver, owner, values, span)
    }

    /// Pick one declaration. A single overload is used as is, so lazy
    /// arguments stay unevaluated; otherwise the arguments are evaluated
    /// once and every candidate of matching arity is scored.
    ///
    /// Only value and `const` arguments reuse the scoring results. A `var`
    /// or `out` argument is resolved to a location again (its index
    /// expressions run a second time) and a `lazy` argument is re-evaluated
    /// by the callee, so side effects in those arguments can happen twice
    /// when more than one overload is a candidate.
    fn select_overload(
        &mut self,
        name: &str,
        overloads: &[Rc<RoutineDecl>],
        args: &CallArgs<'_>,
        span: Span,
    ) -> InterpResult<(Rc<RoutineDecl>, Option<Vec<Value>>)> {
        if let [only] = overloads {
            return Ok((Rc::clone(only), None));
        }

        let argc = args.len();
        let candidates: Vec<&Rc<RoutineDecl>> = overloads.iter().filter(|d| d.accepts_arg_count(argc)).collect();
        match candidates.as_slice() {
            [] => return Err(RuntimeError::no_matching_overload(name).at(span)),
            [only] => return Ok((Rc::clone(only), None)),
            _ => {}
        }

        let (values, evaluated) = match args {
            CallArgs::Exprs(exprs, env) => {
                let mut values = Vec::with_capacity(exprs.len());
                for expr in exprs.iter() {
                    values.push(self.eval(expr, env)?);
                }
                (values.clone(), Some(values))
            }
            CallArgs::Values(values) => (values.clone(), None),
        };

        let mut best: Option<(u32, &Rc<RoutineDecl>)> = None;
        let mut tied = false;
        for decl in candidates {
            let Some(score) = self.overload_score(decl, &values) else {
                continue;
            };
            match best {
                Some((top, _)) if score < top => {}
                Some((top, _)) if score == top => tied = true,
                _ => {
                    best = Some((score, decl));
                    tied = false;
                }
            }
        }

        match best {
            None => Err(RuntimeError::no_matching_overload(name).at(span)),
            Some(_) if tied => Err(RuntimeError::ambiguous_call(name).at(span)),
            Some((score, decl)) => {
                tracing::trace!(name, score, params = decl.params.len(), "selected overload");
                Ok((Rc::clone(decl), evaluated))
            }
        }
    }

    /// Sum of per-argument fit scores; `None` when any argument does not
    /// fit. Exact arity wins over reliance on defaults.
    fn overload_score(&self, decl: &RoutineDecl, values: &[Value]) -> Option<u32> {
        let mut total = u32::from(decl.params.len() == values.len());
        for (param, value) in decl.params.iter().zip(values) {
            let ty = match &param.ty {
                Some(ty) => self.runtime_type(ty),
                None => RuntimeType::Unknown,
            };
            total += ty.match_score(value)?;
        }
        Some(total)
    }

    /// Bind call-site arguments to parameters: `var`/`out` by reference,
    /// `lazy` as thunks, missing trailing arguments from defaults evaluated
    /// in the caller's scope
    pub(crate) fn prepare_args(
        &mut self,
        decl: &RoutineDecl,
        args: CallArgs<'_>,
        evaluated: Option<Vec<Value>>,
        span: Span,
    ) -> InterpResult<Vec<Value>> {
        let argc = args.len();
        if !decl.accepts_arg_count(argc) {
            return Err(RuntimeError::arity_mismatch(&decl.name.node, decl.params.len(), argc).at(span));
        }

        let mut values = Vec::with_capacity(decl.params.len());
        match args {
            CallArgs::Exprs(exprs, env) => {
                let mut evaluated = evaluated.map(|v| v.into_iter().map(Some).collect::<Vec<_>>());
                for (i, param) in decl.params.iter().enumerate() {
                    let Some(expr) = exprs.get(i) else {
                        values.push(self.default_arg(decl, i, env, span)?);
                        continue;
                    };
                    let value = match param.mode {
                        ParamMode::Var | ParamMode::Out => match self.lvalue(expr, env)? {
                            Some(target) => Value::Ref(target),
                            None => {
                                return Err(RuntimeError::var_param_required(&param.name.node).at(expr.span));
                            }
                        },
                        ParamMode::Lazy => Value::Lazy(Rc::new(LazyThunk {
                            expr: expr.clone(),
                            env: Rc::clone(env),
                        })),
                        ParamMode::Value | ParamMode::Const => {
                            match evaluated.as_mut().and_then(|e| e.get_mut(i)).and_then(Option::take) {
                                Some(value) => value,
                                None => self.eval(expr, env)?,
                            }
                        }
                    };
                    values.push(value);
                }
            }
            CallArgs::Values(given) => {
                let mut given = given.into_iter();
                let global = Rc::clone(&self.global_env);
                for (i, param) in decl.params.iter().enumerate() {
                    let value = match given.next() {
                        // Evaluated arguments have no caller slot; a `var`
                        // parameter then writes to a private cell
                        Some(value) if param.mode.is_by_ref() && !matches!(value, Value::Ref(_)) => {
                            Value::Ref(Reference::cell(value))
                        }
                        Some(value) => value,
                        None => self.default_arg(decl, i, &global, span)?,
                    };
                    values.push(value);
                }
            }
        }
        Ok(values)
    }

    fn default_arg(&mut self, decl: &RoutineDecl, index: usize, env: &EnvRef, span: Span) -> InterpResult<Value> {
        match decl.params.get(index).and_then(|p| p.default.as_ref()) {
            Some(default) => self.eval(default, env),
            None => Err(RuntimeError::arity_mismatch(&decl.name.node, decl.params.len(), index).at(span)),
        }
    }

    /// Run a routine body with already-bound arguments
    pub(crate) fn invoke(
        &mut self,
        decl: &Rc<RoutineDecl>,
        closure: EnvRef,
        receiver: Option<Value>,
        owner: Option<MethodOwner>,
        args: Vec<Value>,
        span: Span,
    ) -> InterpResult<Value> {
        let Some(body) = &decl.body else {
            let name = qualified_name(decl, owner.as_ref());
            let message = if decl.directives.is_abstract {
                format!("abstract method \"{name}\" cannot be called")
            } else {
                format!("routine \"{name}\" has no implementation")
            };
            return Err(RuntimeError::invalid_operation(message).at(span));
        };

        let limit = self.config.max_recursion_depth;
        if self.call_stack.len() >= limit {
            tracing::debug!(depth = self.call_stack.len(), routine = %decl.name.node, "recursion limit reached");
            let message = format!("maximum recursion depth exceeded ({limit})");
            return Err(self.exception("EScriptStackOverflow", &message, span));
        }

        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.invoke_body(decl, body, closure, receiver, owner, args, span)
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn invoke_body(
        &mut self,
        decl: &Rc<RoutineDecl>,
        body: &Body,
        closure: EnvRef,
        receiver: Option<Value>,
        owner: Option<MethodOwner>,
        args: Vec<Value>,
        span: Span,
    ) -> InterpResult<Value> {
        let env = child_env(&closure);
        if let Some(receiver) = receiver {
            env.borrow_mut().define("self", receiver);
        }
        for nested in &body.nested {
            let ptr = FunctionPointer {
                decl: Rc::clone(nested),
                closure: Rc::clone(&env),
                receiver: None,
                owner: owner.clone(),
            };
            env.borrow_mut().define(&nested.name.node, Value::FuncPtr(Rc::new(ptr)));
        }

        for (param, value) in decl.params.iter().zip(args) {
            let value = match (&param.ty, param.mode) {
                (_, ParamMode::Var | ParamMode::Out | ParamMode::Lazy) => value,
                (Some(ty), _) => {
                    let ty = self.runtime_type(ty);
                    self.coerce_to(value, &ty, span)?
                }
                (None, _) => value.copy_value(),
            };
            env.borrow_mut().define(&param.name.node, value);
        }

        if decl.ret_ty.is_some() || decl.kind == RoutineKind::Lambda {
            let zero = match &decl.ret_ty {
                Some(ty) => self.zero_value(ty)?,
                None => Value::Nil,
            };
            env.borrow_mut().define("result", zero);
        }

        self.call_stack.push(CallFrame {
            name: decl.name.node.clone(),
            decl: Rc::clone(decl),
            owner: owner.clone(),
            span,
        });
        let outcome = self.run_routine(decl, body, owner.as_ref(), &env);
        self.call_stack.pop();
        outcome
    }

    fn run_routine(
        &mut self,
        decl: &RoutineDecl,
        body: &Body,
        owner: Option<&MethodOwner>,
        env: &EnvRef,
    ) -> InterpResult<Value> {
        let name = qualified_name(decl, owner);
        for contract in &decl.require {
            self.check_contract(contract, env, "Pre-condition", &name)?;
        }

        if !decl.ensure.is_empty() {
            let mut names = Vec::new();
            for contract in &decl.ensure {
                collect_old_names(&contract.cond, &mut names);
            }
            for old in names {
                let ident = Spanned::new(Expr::Ident(old.clone()), decl.span);
                let value = self.eval(&ident, env)?.copy_value();
                env.borrow_mut().define(&format!("old:{old}"), value);
            }
        }

        match self.exec_stmts(&body.stmts, env) {
            Ok(()) => {}
            Err(e) if e.is_control_flow() => {}
            Err(e) => return Err(e),
        }

        for contract in &decl.ensure {
            self.check_contract(contract, env, "Post-condition", &name)?;
        }

        let value = match decl.kind {
            RoutineKind::Constructor => env.borrow().get_local("self"),
            _ => env.borrow().get_local("result"),
        };
        match value {
            Some(value) => self.read_binding(value, decl.span),
            None => Ok(Value::Nil),
        }
    }

    fn check_contract(&mut self, contract: &Contract, env: &EnvRef, kind: &str, name: &str) -> InterpResult<()> {
        if self.eval(&contract.cond, env)?.is_truthy() {
            return Ok(());
        }
        let span = contract.cond.span;
        let mut message = format!("{kind} failed in {name} {}", span.location());
        if let Some(extra) = &contract.message {
            let extra = self.eval(extra, env)?;
            message.push_str(&format!(" : {extra}"));
        }
        Err(self.exception("EAssertionFailed", &message, span))
    }

    /// Call through a function pointer, lambda or bound method
    pub(crate) fn call_pointer(&mut self, fp: &Rc<FunctionPointer>, args: CallArgs<'_>, span: Span) -> InterpResult<Value> {
        let values = self.prepare_args(&fp.decl, args, None, span)?;
        self.invoke(&fp.decl, Rc::clone(&fp.closure), fp.receiver.clone(), fp.owner.clone(), values, span)
    }

    /// Call a callable value with evaluated arguments (comparators,
    /// `Map`/`Filter` callbacks)
    pub(crate) fn call_function_value(&mut self, target: Value, args: Vec<Value>, span: Span) -> InterpResult<Value> {
        self.call_value(target, CallArgs::Values(args), span)
    }

    /// Evaluate arguments for callees that take plain values
    pub(crate) fn eval_args(&mut self, args: CallArgs<'_>) -> InterpResult<Vec<Value>> {
        match args {
            CallArgs::Exprs(exprs, env) => {
                let mut values = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    values.push(self.eval(expr, env)?.unwrap_all());
                }
                Ok(values)
            }
            CallArgs::Values(values) => Ok(values.into_iter().map(Value::unwrap_all).collect()),
        }
    }
}

/// `TOwner.Name` for methods, `Name` for free routines
pub(crate) fn qualified_name(decl: &RoutineDecl, owner: Option<&MethodOwner>) -> String {
    match owner {
        Some(owner) => format!("{}.{}", owner.name(), decl.name.node),
        None => decl.name.node.clone(),
    }
}

/// Names captured by `old(...)` in a postcondition
fn collect_old_names(expr: &Spanned<Expr>, out: &mut Vec<String>) {
    match &expr.node {
        Expr::Old(name) => {
            if !out.iter().any(|n| n.eq_ignore_ascii_case(&name.node)) {
                out.push(name.node.clone());
            }
        }
        Expr::Binary { left, right, .. } => {
            collect_old_names(left, out);
            collect_old_names(right, out);
        }
        Expr::Unary { expr, .. }
        | Expr::As { expr, .. }
        | Expr::Implements { expr, .. }
        | Expr::AddressOf(expr)
        | Expr::Member { object: expr, .. } => collect_old_names(expr, out),
        Expr::Is { expr, target } => {
            collect_old_names(expr, out);
            if let IsTarget::Value(value) = target {
                collect_old_names(value, out);
            }
        }
        Expr::Call { callee, args } => {
            collect_old_names(callee, out);
            args.iter().for_each(|a| collect_old_names(a, out));
        }
        Expr::Index { object, indices } => {
            collect_old_names(object, out);
            indices.iter().for_each(|i| collect_old_names(i, out));
        }
        Expr::ArrayLit(elems) | Expr::New { args: elems, .. } => {
            elems.iter().for_each(|e| collect_old_names(e, out));
        }
        Expr::Range { low, high } => {
            collect_old_names(low, out);
            collect_old_names(high, out);
        }
        Expr::IfExpr {
            cond,
            then_expr,
            else_expr,
        } => {
            collect_old_names(cond, out);
            collect_old_names(then_expr, out);
            collect_old_names(else_expr, out);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::error::ErrorKind;
    use crate::interp::eval::InterpreterConfig;
    use crate::parser::parse_source;

    fn run_with(interp: &mut Interpreter, source: &str) -> InterpResult<()> {
        let program = parse_source(source).expect("parse");
        interp.run(&program)
    }

    fn output(source: &str) -> String {
        let (mut interp, out) = Interpreter::with_captured_output();
        if let Err(e) = run_with(&mut interp, source) {
            panic!("unexpected error: {e}");
        }
        let text = out.borrow().clone();
        text
    }

    #[test]
    fn test_default_parameters() {
        let src = "function Add(a: Integer; b: Integer = 10): Integer; begin Result := a + b; end;
                   PrintLn(Add(1)); PrintLn(Add(1, 2));";
        assert_eq!(output(src), "11\n3\n");
    }

    #[test]
    fn test_var_parameter_writes_through() {
        let src = "procedure Bump(var x: Integer); begin x := x + 1; end;
                   var n := 1; Bump(n); Bump(n); PrintLn(n);";
        assert_eq!(output(src), "3\n");
    }

    #[test]
    fn test_var_parameter_requires_variable() {
        let mut interp = Interpreter::new();
        let err = run_with(
            &mut interp,
            "procedure Bump(a: Integer; var x: Integer); begin end; Bump(1, 2);",
        )
        .expect_err("literal to var");
        assert_eq!(err.kind, ErrorKind::VarParamRequired);
        assert!(err.message.contains("var parameter requires a variable"));
    }

    #[test]
    fn test_lazy_parameter_is_reevaluated() {
        let src = "var i: Integer;
                   function Sum(var idx: Integer; lo, hi: Integer; lazy term: Integer): Integer;
                   begin
                     Result := 0;
                     for idx := lo to hi do Result := Result + term;
                   end;
                   PrintLn(Sum(i, 1, 4, i * i));";
        assert_eq!(output(src), "30\n");
    }

    #[test]
    fn test_overloads_by_type() {
        let src = "function Show(x: Integer): String; overload; begin Result := 'int'; end;
                   function Show(x: String): String; overload; begin Result := 'str'; end;
                   PrintLn(Show(1)); PrintLn(Show('a'));";
        assert_eq!(output(src), "int\nstr\n");
    }

    #[test]
    fn test_recursion_limit_is_catchable() {
        let mut interp = Interpreter::with_config(InterpreterConfig { max_recursion_depth: 50 });
        let err = run_with(&mut interp, "procedure Loop; begin Loop; end; Loop;").expect_err("overflow");
        let exc = err.exception_value().expect("catchable");
        assert_eq!(exc.class_name, "EScriptStackOverflow");
        assert!(exc.message.contains("maximum recursion depth exceeded (50)"));
    }

    #[test]
    fn test_contracts() {
        let mut interp = Interpreter::new();
        let err = run_with(
            &mut interp,
            "function Half(x: Integer): Integer;
             require x > 0;
             begin Result := x div 2; end;
             Half(-1);",
        )
        .expect_err("precondition");
        assert!(err.message.starts_with("Pre-condition failed in Half [line: 2"));

        let src = "procedure Grow(var x: Integer);
                   begin x := x + 1;
                   ensure x = old(x) + 1;
                   end;
                   var n := 1; Grow(n); PrintLn(n);";
        assert_eq!(output(src), "2\n");
    }

    #[test]
    fn test_nested_routines_see_enclosing_locals() {
        let src = "function Outer: Integer;
                   var base: Integer;
                   function Inner(x: Integer): Integer; begin Result := base + x; end;
                   begin base := 40; Result := Inner(2); end;
                   PrintLn(Outer);";
        assert_eq!(output(src), "42\n");
    }

    #[test]
    fn test_collect_old_names_dedups() {
        let program = parse_source(
            "procedure P(var x: Integer); begin ensure x = old(x) + old(X); end;",
        )
        .expect("parse");
        let Some(crate::ast::Item::Routine(decl)) = program.items.first() else {
            panic!("expected routine");
        };
        let mut names = Vec::new();
        collect_old_names(&decl.ensure[0].cond, &mut names);
        assert_eq!(names, vec!["x".to_string()]);
    }
}
