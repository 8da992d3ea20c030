//! Statement execution

use super::call::CallArgs;
use super::env::{EnvRef, child_env};
use super::error::{ErrorKind, InterpResult, RuntimeError};
use super::eval::{Interpreter, STACK_GROW_SIZE, STACK_RED_ZONE};
use super::ops::{compare_values, values_equal};
use super::refs::Reference;
use super::types::ordinal;
use super::value::{EnumValue, Value};
use crate::ast::{
    AssignOp, BinOp, CaseBranch, CaseLabel, ConstDecl, ExceptBlock, Expr, Span, Spanned, Stmt, TypeRef,
    VarDecl,
};
use std::cmp::Ordering;
use std::rc::Rc;

/// Outcome of one loop iteration
enum Flow {
    Next,
    Break,
}

/// Fold `break`/`continue` raised by a loop body into a [`Flow`]
fn loop_flow(result: InterpResult<()>) -> InterpResult<Flow> {
    match result {
        Ok(()) => Ok(Flow::Next),
        Err(e) if e.kind == ErrorKind::Break => Ok(Flow::Break),
        Err(e) if e.kind == ErrorKind::Continue => Ok(Flow::Next),
        Err(e) => Err(e),
    }
}

fn compound_op(op: AssignOp) -> Option<BinOp> {
    match op {
        AssignOp::Assign => None,
        AssignOp::Add => Some(BinOp::Add),
        AssignOp::Sub => Some(BinOp::Sub),
        AssignOp::Mul => Some(BinOp::Mul),
        AssignOp::Div => Some(BinOp::Div),
    }
}

impl Interpreter {
    pub(crate) fn exec_stmts(&mut self, stmts: &[Spanned<Stmt>], env: &EnvRef) -> InterpResult<()> {
        for stmt in stmts {
            self.exec(stmt, env)?;
        }
        Ok(())
    }

    /// Execute one statement with automatic stack growth
    pub fn exec(&mut self, stmt: &Spanned<Stmt>, env: &EnvRef) -> InterpResult<()> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.exec_inner(stmt, env))
    }

    fn exec_inner(&mut self, stmt: &Spanned<Stmt>, env: &EnvRef) -> InterpResult<()> {
        let span = stmt.span;
        match &stmt.node {
            Stmt::Expr(expr) => self.exec_expr(expr, env),

            Stmt::Assign { target, op, value } => {
                let rhs = self.eval(value, env)?;
                let rhs = match compound_op(*op) {
                    Some(bin) => {
                        let current = self.eval(target, env)?;
                        self.binary_op(bin, current, rhs, span)?
                    }
                    None => rhs,
                };
                self.assign_to(target, rhs, env, span)
            }

            Stmt::Var(decl) => self.exec_var(decl, env, span),

            Stmt::Const(decl) => self.exec_const(decl, env, span),

            Stmt::Block(stmts) => self.exec_stmts(stmts, env),

            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval(cond, env)?.is_truthy() {
                    self.exec(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.exec(else_branch, env)
                } else {
                    Ok(())
                }
            }

            Stmt::While { cond, body } => {
                while self.eval(cond, env)?.is_truthy() {
                    if let Flow::Break = loop_flow(self.exec(body, env))? {
                        break;
                    }
                }
                Ok(())
            }

            Stmt::Repeat { body, cond } => {
                loop {
                    if let Flow::Break = loop_flow(self.exec_stmts(body, env))? {
                        break;
                    }
                    if self.eval(cond, env)?.is_truthy() {
                        break;
                    }
                }
                Ok(())
            }

            Stmt::For {
                var,
                declare,
                start,
                end,
                descending,
                step,
                body,
            } => {
                let first = self.eval(start, env)?.unwrap_all();
                let from = ordinal(&first)
                    .ok_or_else(|| RuntimeError::type_error("ordinal", &first.type_name()).at(start.span))?;
                let to = self.eval_ordinal(end, env)?;
                // An enumeration start keeps the counter typed
                let counter_value = |n: i64| match &first {
                    Value::Enum(e) => Value::Enum(EnumValue::new(&e.info, n)),
                    _ => Value::Int(n),
                };
                let step = match step {
                    Some(expr) => {
                        let step = self.eval_ordinal(expr, env)?;
                        if step <= 0 {
                            let message = format!("FOR loop STEP should be strictly positive: {step} {}", expr.span.location());
                            return Err(self.exception("Exception", &message, expr.span));
                        }
                        step
                    }
                    None => 1,
                };

                let (loop_env, counter) = self.loop_variable(var, *declare, counter_value(from), env)?;
                let mut i = from;
                while (!descending && i <= to) || (*descending && i >= to) {
                    counter.set(counter_value(i)).map_err(|e| e.at(var.span))?;
                    if let Flow::Break = loop_flow(self.exec(body, &loop_env))? {
                        break;
                    }
                    let next = if *descending { i.checked_sub(step) } else { i.checked_add(step) };
                    match next {
                        Some(n) => i = n,
                        None => break,
                    }
                }
                Ok(())
            }

            Stmt::ForIn {
                var,
                declare,
                collection,
                body,
            } => {
                let items = match self.eval(collection, env)?.unwrap_all() {
                    Value::Array(arr) => arr.borrow().elems.clone(),
                    Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    Value::Set(set) => set.into_iter().map(Value::Int).collect(),
                    // Every ordinal from low to high, gaps included
                    Value::EnumType(info) => (info.low()..=info.high())
                        .map(|n| Value::Enum(EnumValue::new(&info, n)))
                        .collect(),
                    Value::Nil => Vec::new(),
                    other => {
                        return Err(RuntimeError::type_error("array, string, set or enumeration", &other.type_name())
                            .at(collection.span));
                    }
                };
                let first = items.first().cloned().unwrap_or(Value::Nil);
                let (loop_env, slot) = self.loop_variable(var, *declare, first, env)?;
                for item in items {
                    slot.set(item).map_err(|e| e.at(var.span))?;
                    if let Flow::Break = loop_flow(self.exec(body, &loop_env))? {
                        break;
                    }
                }
                Ok(())
            }

            Stmt::Case {
                subject,
                branches,
                else_branch,
            } => {
                let subject = self.eval(subject, env)?.unwrap_all();
                if let Some(branch) = self.matching_branch(&subject, branches, env)? {
                    return self.exec(&branch.body, env);
                }
                match else_branch {
                    Some(stmts) => self.exec_stmts(stmts, env),
                    None => Ok(()),
                }
            }

            Stmt::Try { body, except, finally } => {
                let mut outcome = self.exec_stmts(body, env);
                if let (Err(e), Some(block)) = (&outcome, except)
                    && e.is_exception()
                {
                    let error = e.clone();
                    outcome = self.handle_exception(error, block, env);
                }
                if let Some(finally) = finally {
                    // An error escaping the finally block replaces the pending one
                    self.exec_stmts(finally, env)?;
                }
                outcome
            }

            Stmt::Raise(Some(expr)) => {
                let value = self.eval(expr, env)?;
                Err(self.raise_value(value, span))
            }

            Stmt::Raise(None) => match self.handling.last() {
                Some(error) => Err(error.clone()),
                None => Err(RuntimeError::invalid_operation("re-raise outside of an exception handler").at(span)),
            },

            Stmt::Exit(value) => {
                if let Some(expr) = value {
                    let value = self.eval(expr, env)?;
                    let result = Spanned::new(Expr::Ident("Result".to_string()), span);
                    if let Some(slot) = self.lvalue(&result, env)? {
                        self.store(&slot, value, span)?;
                    }
                }
                Err(RuntimeError::control(ErrorKind::Exit))
            }

            Stmt::Break => Err(RuntimeError::control(ErrorKind::Break)),
            Stmt::Continue => Err(RuntimeError::control(ErrorKind::Continue)),
        }
    }

    /// Expression statement; a procedural variable named on its own is called
    fn exec_expr(&mut self, expr: &Spanned<Expr>, env: &EnvRef) -> InterpResult<()> {
        if let Expr::Ident(name) = &expr.node {
            let binding = env.borrow().get(name);
            if let Some(Value::FuncPtr(fp)) = binding {
                self.call_pointer(&fp, CallArgs::bare(env), expr.span)?;
                return Ok(());
            }
        }
        self.eval(expr, env)?;
        Ok(())
    }

    fn exec_var(&mut self, decl: &VarDecl, env: &EnvRef, span: Span) -> InterpResult<()> {
        for name in &decl.names {
            let value = match (&decl.init, &decl.ty) {
                (Some(init), Some(ty)) => {
                    let value = self.eval(init, env)?;
                    let target = self.runtime_type(ty);
                    let value = self.coerce_to(value, &target, span)?;
                    typed_array(value, ty)
                }
                (Some(init), None) => self.eval(init, env)?.copy_value(),
                (None, Some(ty)) => self.zero_value(ty)?,
                (None, None) => Value::unassigned(),
            };
            tracing::trace!(name = %name.node, "declare variable");
            env.borrow_mut().define(&name.node, value);
        }
        Ok(())
    }

    fn exec_const(&mut self, decl: &ConstDecl, env: &EnvRef, span: Span) -> InterpResult<()> {
        let value = self.eval(&decl.value, env)?;
        let value = match &decl.ty {
            Some(ty) => {
                let target = self.runtime_type(ty);
                let value = self.coerce_to(value, &target, span)?;
                typed_array(value, ty)
            }
            None => value.copy_value(),
        };
        env.borrow_mut().define(&decl.name.node, value);
        Ok(())
    }

    /// Scope and slot written by a `for` loop
    fn loop_variable(
        &mut self,
        var: &Spanned<String>,
        declare: bool,
        initial: Value,
        env: &EnvRef,
    ) -> InterpResult<(EnvRef, Rc<Reference>)> {
        if declare {
            let loop_env = child_env(env);
            loop_env.borrow_mut().define(&var.node, initial);
            let slot = Rc::new(Reference::Var {
                env: Rc::clone(&loop_env),
                name: crate::util::normalize(&var.node),
            });
            return Ok((loop_env, slot));
        }
        let ident = Spanned::new(Expr::Ident(var.node.clone()), var.span);
        match self.lvalue(&ident, env)? {
            Some(slot) => Ok((Rc::clone(env), slot)),
            None => Err(RuntimeError::undefined_variable(&var.node).at(var.span)),
        }
    }

    fn matching_branch<'b>(
        &mut self,
        subject: &Value,
        branches: &'b [CaseBranch],
        env: &EnvRef,
    ) -> InterpResult<Option<&'b CaseBranch>> {
        for branch in branches {
            for label in &branch.labels {
                let hit = match label {
                    CaseLabel::Value(expr) => {
                        let value = self.eval(expr, env)?.unwrap_all();
                        values_equal(subject, &value)
                    }
                    CaseLabel::Range(low, high) => {
                        let low = self.eval(low, env)?.unwrap_all();
                        let high = self.eval(high, env)?.unwrap_all();
                        matches!(compare_values(subject, &low), Some(Ordering::Greater | Ordering::Equal))
                            && matches!(compare_values(subject, &high), Some(Ordering::Less | Ordering::Equal))
                    }
                };
                if hit {
                    return Ok(Some(branch));
                }
            }
        }
        Ok(None)
    }

    /// Run the handler matching a caught exception, or hand the error back
    fn handle_exception(&mut self, error: RuntimeError, block: &ExceptBlock, env: &EnvRef) -> InterpResult<()> {
        let Some(exc) = error.exception_value() else {
            return Err(error);
        };
        let object = Rc::clone(&exc.object);
        let class = Rc::clone(&object.borrow().class);

        match block {
            ExceptBlock::CatchAll(stmts) => {
                tracing::debug!(class = %class.name, "exception caught");
                self.handling.push(error);
                let outcome = self.exec_stmts(stmts, env);
                self.handling.pop();
                outcome
            }
            ExceptBlock::Handlers { handlers, else_body } => {
                for handler in handlers {
                    let key = self.registry.resolve_name(&handler.class.node);
                    if !class.inherits_from(&key) {
                        continue;
                    }
                    tracing::debug!(class = %class.name, handler = %handler.class.node, "exception caught");
                    let handler_env = child_env(env);
                    if let Some(var) = &handler.var {
                        handler_env
                            .borrow_mut()
                            .define(&var.node, Value::Object(Rc::clone(&object)));
                    }
                    self.handling.push(error);
                    let outcome = self.exec(&handler.body, &handler_env);
                    self.handling.pop();
                    return outcome;
                }
                match else_body {
                    Some(stmts) => {
                        self.handling.push(error);
                        let outcome = self.exec_stmts(stmts, env);
                        self.handling.pop();
                        outcome
                    }
                    None => Err(error),
                }
            }
        }
    }

    /// Store into a location, converting to the type of what it holds
    pub(crate) fn store(&mut self, slot: &Reference, value: Value, span: Span) -> InterpResult<()> {
        let value = match slot.get() {
            Ok(current) => self.coerce_assign(&current, value, span)?,
            Err(_) => value.copy_value(),
        };
        slot.set(value).map_err(|e| e.at(span))
    }

    /// `target := value`
    pub(crate) fn assign_to(&mut self, target: &Spanned<Expr>, value: Value, env: &EnvRef, span: Span) -> InterpResult<()> {
        match &target.node {
            Expr::Ident(name) => {
                let is_local = matches!(env.borrow().get_scoped(name), Some((_, false)));
                if !is_local && let Some(this) = self.self_ref(env) {
                    let host = this.get()?;
                    if self.plain_property(&host.clone().unwrap_all(), name).is_some() {
                        let slot = matches!(host, Value::Record(_)).then_some(this);
                        self.assign_property(host, slot, name, value, span)?;
                        return Ok(());
                    }
                }
                match self.lvalue(target, env)? {
                    Some(slot) => self.store(&slot, value, span),
                    None => Err(RuntimeError::undefined_variable(name).at(target.span)),
                }
            }

            Expr::Member { object, member } => {
                let host = self.eval(object, env)?;
                match host.clone().unwrap_all() {
                    Value::Nil => return Err(self.not_instantiated(span)),
                    Value::Object(obj) if obj.borrow().destroyed => return Err(self.already_destroyed(span)),
                    _ => {}
                }
                if self.plain_property(&host.clone().unwrap_all(), &member.node).is_some() {
                    let host_ref = match host.clone().unwrap_all() {
                        Value::Record(_) => self.lvalue(object, env)?,
                        _ => None,
                    };
                    self.assign_property(host, host_ref, &member.node, value, span)?;
                    return Ok(());
                }
                match self.lvalue(target, env)? {
                    Some(slot) => self.store(&slot, value, span),
                    None => Err(RuntimeError::invalid_operation(format!(
                        "member \"{}\" not found in {}",
                        member.node,
                        host.type_name()
                    ))
                    .at(member.span)),
                }
            }

            Expr::Index { object, indices } => {
                if let Some((host, property)) = self.indexed_property_target(object, env)? {
                    let mut index_values = Vec::with_capacity(indices.len());
                    for e in indices {
                        index_values.push(self.eval(e, env)?);
                    }
                    return self.write_property(host, &property, index_values, value, span);
                }

                let base = self.eval(object, env)?.unwrap_all();
                if matches!(base, Value::Object(_) | Value::Interface(_) | Value::Record(_)) {
                    let mut index_values = Vec::with_capacity(indices.len());
                    for e in indices {
                        index_values.push(self.eval(e, env)?);
                    }
                    let host_ref = match base {
                        Value::Record(_) => self.lvalue(object, env)?,
                        _ => None,
                    };
                    return self.write_default_property(base, host_ref, index_values, value, span);
                }

                match self.lvalue(target, env)? {
                    Some(slot) => self.store(&slot, value, span),
                    None => Err(RuntimeError::invalid_operation("cannot assign to this element").at(span)),
                }
            }

            _ => match self.lvalue(target, env)? {
                Some(slot) => self.store(&slot, value, span),
                None => Err(RuntimeError::invalid_operation("left side cannot be assigned to").at(span)),
            },
        }
    }
}

/// Remember the declared element type of a dynamic array variable
fn typed_array(value: Value, ty: &TypeRef) -> Value {
    if let (Value::Array(arr), TypeRef::Array { elem, .. }) = (&value, ty) {
        let mut arr = arr.borrow_mut();
        if arr.elem_ty.is_none() {
            arr.elem_ty = Some((**elem).clone());
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn run(source: &str) -> (InterpResult<()>, String) {
        let program = parse_source(source).expect("parse");
        let (mut interp, out) = Interpreter::with_captured_output();
        let result = interp.run(&program);
        let text = out.borrow().clone();
        (result, text)
    }

    fn output(source: &str) -> String {
        let (result, text) = run(source);
        if let Err(e) = result {
            panic!("unexpected error: {e}\noutput so far: {text}");
        }
        text
    }

    #[test]
    fn test_loops() {
        let src = "
var s := '';
for var i := 1 to 3 do s := s + IntToStr(i);
for var i := 10 downto 1 step 4 do s := s + ',' + IntToStr(i);
var n := 0;
while True do begin
  n += 1;
  if n < 3 then continue;
  break;
end;
repeat n := n + 10 until n > 30;
PrintLn(s + ' ' + IntToStr(n));
";
        assert_eq!(output(src), "123,10,6,2 33\n");
    }

    #[test]
    fn test_for_step_must_be_positive() {
        let (result, _) = run("for var i := 1 to 3 step 0 do PrintLn(i);");
        let err = result.expect_err("zero step");
        assert!(err.is_exception());
        assert!(err.message.contains("FOR loop STEP should be strictly positive: 0"));
    }

    #[test]
    fn test_for_in() {
        let src = "
var s := '';
for var c in 'abc' do s := c + s;
for var x in [1, 2, 3] do s := s + IntToStr(x);
PrintLn(s);
";
        assert_eq!(output(src), "cba123\n");
    }

    #[test]
    fn test_case() {
        let src = "
for var i := 0 to 4 do
  case i of
    0: Print('zero ');
    1, 2: Print('small ');
    3..9: Print('big ');
  else
    Print('? ');
  end;
";
        assert_eq!(output(src), "zero small small big big ");
    }

    #[test]
    fn test_try_except_matches_by_ancestry() {
        let src = "
try
  raise EConvertError.Create('bad');
except
  on E: ERangeError do PrintLn('range');
  on E: Exception do PrintLn(E.ClassName + ': ' + E.Message);
end;
";
        assert_eq!(output(src), "EConvertError: bad\n");
    }

    #[test]
    fn test_except_else_and_reraise() {
        let src = "
try
  try
    raise Exception.Create('inner');
  except
    on E: EConvertError do PrintLn('no');
  else
    begin
      PrintLn('else ' + ExceptObject.ClassName);
      raise;
    end;
  end;
except
  on E: Exception do PrintLn('outer ' + E.Message);
end;
";
        assert_eq!(output(src), "else Exception\nouter inner\n");
    }

    #[test]
    fn test_finally_runs_for_hard_errors() {
        let (result, text) = run("
try
  PrintLn(Undeclared);
finally
  PrintLn('cleanup');
end;
");
        let err = result.expect_err("hard error");
        assert!(!err.is_exception());
        assert_eq!(text, "cleanup\n");
    }

    #[test]
    fn test_hard_errors_pass_through_except() {
        let (result, text) = run("
try
  var x := 1 div 0;
except
  PrintLn('caught');
end;
");
        assert!(result.is_err());
        assert_eq!(text, "");
    }

    #[test]
    fn test_finally_error_replaces_pending() {
        let src = "
try
  try
    raise Exception.Create('first');
  finally
    raise Exception.Create('second');
  end;
except
  on E: Exception do PrintLn(E.Message);
end;
";
        assert_eq!(output(src), "second\n");
    }

    #[test]
    fn test_exit_with_value() {
        let src = "
function Sign(x: Integer): Integer;
begin
  if x < 0 then Exit(-1);
  if x = 0 then Exit(0);
  Result := 1;
end;
PrintLn(IntToStr(Sign(-5)) + IntToStr(Sign(0)) + IntToStr(Sign(9)));
";
        assert_eq!(output(src), "-101\n");
    }

    #[test]
    fn test_compound_assignment() {
        let src = "
var x: Float := 1;
x += 2;
x *= 3;
var s := 'a';
s += 'b';
PrintLn(FloatToStr(x) + s);
";
        assert_eq!(output(src), "9ab\n");
    }

    #[test]
    fn test_procedural_variable_statement() {
        let src = "
procedure Hello;
begin
  PrintLn('hi');
end;
var p := @Hello;
p;
";
        assert_eq!(output(src), "hi\n");
    }

    #[test]
    fn test_bare_raise_outside_handler_is_hard_error() {
        let (result, _) = run("raise;");
        let err = result.expect_err("bare raise");
        assert!(!err.is_exception());
    }
}
