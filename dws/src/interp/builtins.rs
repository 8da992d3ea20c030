//! Builtin function library
//!
//! Leaf routines over plain values. Arguments arrive with variant boxing
//! removed unless the builtin is registered as `raw`; `var` positions
//! receive a [`Value::Ref`] to the caller's location.

use super::env::EnvRef;
use super::error::{InterpResult, RuntimeError};
use super::eval::Interpreter;
use super::types::{ordinal, Primitive};
use super::value::{deep_copy_array, format_float, ArrayValue, EnumValue, Value};
use crate::ast::{Expr, Span, Spanned};
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, Timelike};

/// Builtin function type
pub type BuiltinFn = fn(&mut Interpreter, Vec<Value>, Span) -> InterpResult<Value>;

#[derive(Clone, Copy)]
pub struct Builtin {
    pub func: BuiltinFn,
    /// Argument positions bound by reference
    pub var_params: &'static [usize],
    /// Pass variants through untouched
    pub raw: bool,
}

impl Builtin {
    fn plain(func: BuiltinFn) -> Self {
        Builtin {
            func,
            var_params: &[],
            raw: false,
        }
    }

    fn by_ref(func: BuiltinFn, var_params: &'static [usize]) -> Self {
        Builtin {
            func,
            var_params,
            raw: false,
        }
    }
}

impl Interpreter {
    /// Register builtin functions
    pub(crate) fn register_builtins(&mut self) {
        let table: &[(&str, Builtin)] = &[
            ("print", Builtin::plain(builtin_print)),
            ("println", Builtin::plain(builtin_println)),
            // conversions
            ("inttostr", Builtin::plain(builtin_int_to_str)),
            ("strtoint", Builtin::plain(builtin_str_to_int)),
            ("strtointdef", Builtin::plain(builtin_str_to_int_def)),
            ("floattostr", Builtin::plain(builtin_float_to_str)),
            ("strtofloat", Builtin::plain(builtin_str_to_float)),
            ("booltostr", Builtin::plain(builtin_bool_to_str)),
            ("inttohex", Builtin::plain(builtin_int_to_hex)),
            // strings
            ("length", Builtin::plain(builtin_length)),
            ("copy", Builtin::plain(builtin_copy)),
            ("pos", Builtin::plain(builtin_pos)),
            ("uppercase", Builtin::plain(builtin_upper_case)),
            ("lowercase", Builtin::plain(builtin_lower_case)),
            ("trim", Builtin::plain(builtin_trim)),
            ("chr", Builtin::plain(builtin_chr)),
            ("ord", Builtin::plain(builtin_ord)),
            ("stringofchar", Builtin::plain(builtin_string_of_char)),
            ("format", Builtin::plain(builtin_format)),
            // math
            ("abs", Builtin::plain(builtin_abs)),
            ("sqr", Builtin::plain(builtin_sqr)),
            ("sqrt", Builtin::plain(builtin_sqrt)),
            ("min", Builtin::plain(builtin_min)),
            ("max", Builtin::plain(builtin_max)),
            ("trunc", Builtin::plain(builtin_trunc)),
            ("round", Builtin::plain(builtin_round)),
            ("frac", Builtin::plain(builtin_frac)),
            ("int", Builtin::plain(builtin_int)),
            ("power", Builtin::plain(builtin_power)),
            ("pi", Builtin::plain(builtin_pi)),
            ("random", Builtin::plain(builtin_random)),
            ("randomize", Builtin::plain(builtin_randomize)),
            ("odd", Builtin::plain(builtin_odd)),
            // ordinals and containers
            ("inc", Builtin::by_ref(builtin_inc, &[0])),
            ("dec", Builtin::by_ref(builtin_dec, &[0])),
            ("succ", Builtin::plain(builtin_succ)),
            ("pred", Builtin::plain(builtin_pred)),
            ("low", Builtin::plain(builtin_low)),
            ("high", Builtin::plain(builtin_high)),
            ("setlength", Builtin::by_ref(builtin_set_length, &[0])),
            ("swap", Builtin::by_ref(builtin_swap, &[0, 1])),
            ("include", Builtin::by_ref(builtin_include, &[0])),
            ("exclude", Builtin::by_ref(builtin_exclude, &[0])),
            ("sort", Builtin::plain(builtin_sort)),
            // objects and diagnostics
            ("assigned", Builtin::plain(builtin_assigned)),
            ("assert", Builtin::plain(builtin_assert)),
            // date and time
            ("now", Builtin::plain(builtin_now)),
            ("date", Builtin::plain(builtin_date)),
            ("time", Builtin::plain(builtin_time)),
            ("datetimetostr", Builtin::plain(builtin_date_time_to_str)),
            ("formatdatetime", Builtin::plain(builtin_format_date_time)),
            ("unixtime", Builtin::plain(builtin_unix_time)),
        ];
        for (name, builtin) in table {
            self.builtins.insert((*name).to_string(), *builtin);
        }
        super::variant::register(&mut self.builtins);
        tracing::trace!(count = self.builtins.len(), "registered builtins");
    }

    /// Evaluate call-site arguments and invoke a builtin
    pub(crate) fn call_builtin(
        &mut self,
        key: &str,
        args: &[Spanned<Expr>],
        env: &EnvRef,
        span: Span,
    ) -> InterpResult<Value> {
        let Some(builtin) = self.builtins.get(key).copied() else {
            return Err(RuntimeError::undefined_function(key).at(span));
        };

        // `Low(Integer)` and `High(Integer)` name a type rather than a value
        if let ("low" | "high", [arg]) = (key, args)
            && let Expr::Ident(name) = &arg.node
            && !env.borrow().contains(name)
            && Primitive::from_name(name) == Some(Primitive::Integer)
        {
            return Ok(Value::Int(if key == "low" { i64::MIN } else { i64::MAX }));
        }

        let mut values = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            if builtin.var_params.contains(&i) {
                match self.lvalue(arg, env)? {
                    Some(target) => values.push(Value::Ref(target)),
                    None => return Err(RuntimeError::var_param_required(&format!("#{}", i + 1)).at(arg.span)),
                }
            } else {
                let value = self.eval(arg, env)?;
                values.push(if builtin.raw { value } else { value.unwrap_all() });
            }
        }
        (builtin.func)(self, values, span).map_err(|e| e.at(span))
    }

    /// Deterministic xorshift step
    fn next_random(&mut self) -> u64 {
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        x
    }
}

// ---- helpers ----

fn expect_args(name: &str, args: &[Value], min: usize, max: usize) -> InterpResult<()> {
    if args.len() < min || args.len() > max {
        return Err(RuntimeError::arity_mismatch(name, min, args.len()));
    }
    Ok(())
}

fn int_arg(args: &[Value], i: usize) -> InterpResult<i64> {
    let value = &args[i];
    ordinal(value).ok_or_else(|| RuntimeError::type_error("Integer", &value.type_name()))
}

fn float_arg(args: &[Value], i: usize) -> InterpResult<f64> {
    args[i]
        .as_float()
        .ok_or_else(|| RuntimeError::type_error("Float", &args[i].type_name()))
}

fn str_arg(args: &[Value], i: usize) -> InterpResult<String> {
    match &args[i] {
        Value::Str(s) => Ok(s.clone()),
        other => Err(RuntimeError::type_error("String", &other.type_name())),
    }
}

/// Deref a `var` argument
fn ref_arg(args: &[Value], i: usize) -> InterpResult<std::rc::Rc<super::refs::Reference>> {
    match &args[i] {
        Value::Ref(r) => Ok(std::rc::Rc::clone(r)),
        _ => Err(RuntimeError::var_param_required(&format!("#{}", i + 1))),
    }
}

// ---- output ----

fn builtin_print(interp: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    let text: String = args.iter().map(ToString::to_string).collect();
    interp.write_output(&text);
    Ok(Value::Nil)
}

fn builtin_println(interp: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    let mut text: String = args.iter().map(ToString::to_string).collect();
    text.push('\n');
    interp.write_output(&text);
    Ok(Value::Nil)
}

// ---- conversions ----

fn builtin_int_to_str(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("IntToStr", &args, 1, 1)?;
    Ok(Value::Str(int_arg(&args, 0)?.to_string()))
}

fn builtin_str_to_int(interp: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    expect_args("StrToInt", &args, 1, 1)?;
    let s = str_arg(&args, 0)?;
    match parse_int(&s) {
        Some(n) => Ok(Value::Int(n)),
        None => {
            let message = format!("'{s}' is not a valid integer value {}", span.location());
            Err(interp.exception("EConvertError", &message, span))
        }
    }
}

fn builtin_str_to_int_def(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("StrToIntDef", &args, 2, 2)?;
    let s = str_arg(&args, 0)?;
    Ok(Value::Int(parse_int(&s).unwrap_or(int_arg(&args, 1)?)))
}

/// Decimal or `$`-prefixed hex
fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    match s.strip_prefix('$') {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn builtin_float_to_str(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("FloatToStr", &args, 1, 1)?;
    Ok(Value::Str(format_float(float_arg(&args, 0)?)))
}

fn builtin_str_to_float(interp: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    expect_args("StrToFloat", &args, 1, 1)?;
    let s = str_arg(&args, 0)?;
    match s.trim().parse::<f64>() {
        Ok(x) => Ok(Value::Float(x)),
        Err(_) => {
            let message = format!("'{s}' is not a valid floating point value {}", span.location());
            Err(interp.exception("EConvertError", &message, span))
        }
    }
}

fn builtin_bool_to_str(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("BoolToStr", &args, 1, 1)?;
    Ok(Value::str(if args[0].is_truthy() { "True" } else { "False" }))
}

fn builtin_int_to_hex(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("IntToHex", &args, 1, 2)?;
    let n = int_arg(&args, 0)?;
    let digits = if args.len() > 1 { int_arg(&args, 1)?.max(0) as usize } else { 0 };
    Ok(Value::Str(format!("{n:0digits$X}")))
}

// ---- strings ----

fn builtin_length(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Length", &args, 1, 1)?;
    match &args[0] {
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::Array(arr) => Ok(Value::Int(arr.borrow().elems.len() as i64)),
        Value::Set(set) => Ok(Value::Int(set.len() as i64)),
        Value::Nil => Ok(Value::Int(0)),
        other => Err(RuntimeError::type_error("string or array", &other.type_name())),
    }
}

/// `Copy(s, index[, count])`, `Copy(arr[, index[, count]])` or
/// `Copy(record)`
fn builtin_copy(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Copy", &args, 1, 3)?;
    match &args[0] {
        Value::Str(s) => {
            let index = if args.len() > 1 { int_arg(&args, 1)? } else { 1 };
            let count = if args.len() > 2 { int_arg(&args, 2)? } else { i64::MAX };
            let start = usize::try_from(index.max(1) - 1).unwrap_or(0);
            let count = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
            Ok(Value::Str(s.chars().skip(start).take(count).collect()))
        }
        Value::Array(arr) if args.len() == 1 => {
            let copy = deep_copy_array(arr);
            copy.borrow_mut().is_static = false;
            copy.borrow_mut().low = 0;
            Ok(Value::Array(copy))
        }
        Value::Array(arr) => {
            let src = arr.borrow();
            let start = usize::try_from(int_arg(&args, 1)?.max(0)).unwrap_or(0);
            let count = if args.len() > 2 {
                usize::try_from(int_arg(&args, 2)?.max(0)).unwrap_or(0)
            } else {
                usize::MAX
            };
            let elems = src.elems.iter().skip(start).take(count).map(Value::copy_value).collect();
            Ok(Value::Array(ArrayValue::dynamic(elems, src.elem_ty.clone()).into_ref()))
        }
        Value::Record(_) => Ok(args[0].copy_value()),
        other => Err(RuntimeError::type_error("string, array or record", &other.type_name())),
    }
}

fn builtin_pos(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Pos", &args, 2, 2)?;
    let needle = str_arg(&args, 0)?;
    let haystack = str_arg(&args, 1)?;
    let pos = haystack
        .find(&needle)
        .map_or(0, |byte| haystack[..byte].chars().count() as i64 + 1);
    Ok(Value::Int(pos))
}

fn builtin_upper_case(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("UpperCase", &args, 1, 1)?;
    Ok(Value::Str(str_arg(&args, 0)?.to_uppercase()))
}

fn builtin_lower_case(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("LowerCase", &args, 1, 1)?;
    Ok(Value::Str(str_arg(&args, 0)?.to_lowercase()))
}

fn builtin_trim(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Trim", &args, 1, 1)?;
    Ok(Value::Str(str_arg(&args, 0)?.trim().to_string()))
}

fn builtin_chr(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Chr", &args, 1, 1)?;
    let code = int_arg(&args, 0)?;
    let c = u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| RuntimeError::invalid_operation(format!("invalid character code {code}")))?;
    Ok(Value::Str(c.to_string()))
}

fn builtin_ord(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Ord", &args, 1, 1)?;
    match &args[0] {
        Value::Str(s) => Ok(Value::Int(s.chars().next().map_or(0, |c| c as i64))),
        other => ordinal(other)
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::type_error("ordinal", &other.type_name())),
    }
}

fn builtin_string_of_char(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("StringOfChar", &args, 2, 2)?;
    let s = str_arg(&args, 0)?;
    let count = usize::try_from(int_arg(&args, 1)?.max(0)).unwrap_or(0);
    Ok(Value::Str(s.repeat(count)))
}

/// `Format(fmt, [args])` with `%d %s %f %.Nf %x %e %%`, optional `-` and
/// width
fn builtin_format(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Format", &args, 1, 2)?;
    let fmt = str_arg(&args, 0)?;
    let values: Vec<Value> = match args.get(1) {
        Some(Value::Array(arr)) => arr.borrow().elems.iter().map(|v| v.clone().unwrap_all()).collect(),
        Some(other) => vec![other.clone()],
        None => Vec::new(),
    };
    format_string(&fmt, &values)
}

pub(crate) fn format_string(fmt: &str, values: &[Value]) -> InterpResult<Value> {
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();
    let mut next = values.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let left_align = chars.next_if_eq(&'-').is_some();
        let mut width = String::new();
        while let Some(d) = chars.next_if(char::is_ascii_digit) {
            width.push(d);
        }
        let mut precision = None;
        if chars.next_if_eq(&'.').is_some() {
            let mut digits = String::new();
            while let Some(d) = chars.next_if(char::is_ascii_digit) {
                digits.push(d);
            }
            precision = digits.parse::<usize>().ok();
        }
        let Some(spec) = chars.next() else {
            return Err(RuntimeError::invalid_operation(format!("invalid format string \"{fmt}\"")));
        };
        let Some(value) = next.next() else {
            return Err(RuntimeError::invalid_operation(format!(
                "not enough arguments for format \"{fmt}\""
            )));
        };

        let text = match spec.to_ascii_lowercase() {
            'd' => match value {
                Value::Int(n) => n.to_string(),
                other => return Err(RuntimeError::type_error("Integer for %d", &other.type_name())),
            },
            's' => value.to_string(),
            'f' => format!("{:.*}", precision.unwrap_or(2), value.as_float().unwrap_or(0.0)),
            'e' => format!("{:.*e}", precision.unwrap_or(6), value.as_float().unwrap_or(0.0)),
            'g' | 'n' => format_float(value.as_float().unwrap_or(0.0)),
            'x' => format!("{:X}", value.as_int().unwrap_or(0)),
            other => {
                return Err(RuntimeError::invalid_operation(format!("unsupported format specifier %{other}")));
            }
        };

        let width = width.parse::<usize>().unwrap_or(0);
        if left_align {
            out.push_str(&format!("{text:<width$}"));
        } else {
            out.push_str(&format!("{text:>width$}"));
        }
    }
    Ok(Value::Str(out))
}

// ---- math ----

/// `Abs(Low(Integer))` has no positive counterpart and raises `ERangeError`
fn builtin_abs(interp: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    expect_args("Abs", &args, 1, 1)?;
    match &args[0] {
        Value::Int(n) => match n.checked_abs() {
            Some(abs) => Ok(Value::Int(abs)),
            None => {
                let message = format!("Integer overflow in Abs({n}) {}", span.location());
                Err(interp.exception("ERangeError", &message, span))
            }
        },
        Value::Float(x) => Ok(Value::Float(x.abs())),
        other => Err(RuntimeError::type_error("numeric", &other.type_name())),
    }
}

fn builtin_sqr(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Sqr", &args, 1, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(n.wrapping_mul(*n))),
        Value::Float(x) => Ok(Value::Float(x * x)),
        other => Err(RuntimeError::type_error("numeric", &other.type_name())),
    }
}

fn builtin_sqrt(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Sqrt", &args, 1, 1)?;
    Ok(Value::Float(float_arg(&args, 0)?.sqrt()))
}

fn builtin_min(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Min", &args, 2, 2)?;
    match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(*a.min(b))),
        _ => Ok(Value::Float(float_arg(&args, 0)?.min(float_arg(&args, 1)?))),
    }
}

fn builtin_max(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Max", &args, 2, 2)?;
    match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(*a.max(b))),
        _ => Ok(Value::Float(float_arg(&args, 0)?.max(float_arg(&args, 1)?))),
    }
}

fn builtin_trunc(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Trunc", &args, 1, 1)?;
    Ok(Value::Int(float_arg(&args, 0)?.trunc() as i64))
}

fn builtin_round(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Round", &args, 1, 1)?;
    Ok(Value::Int(float_arg(&args, 0)?.round() as i64))
}

fn builtin_frac(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Frac", &args, 1, 1)?;
    Ok(Value::Float(float_arg(&args, 0)?.fract()))
}

fn builtin_int(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Int", &args, 1, 1)?;
    Ok(Value::Float(float_arg(&args, 0)?.trunc()))
}

fn builtin_power(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Power", &args, 2, 2)?;
    Ok(Value::Float(float_arg(&args, 0)?.powf(float_arg(&args, 1)?)))
}

fn builtin_pi(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Pi", &args, 0, 0)?;
    Ok(Value::Float(std::f64::consts::PI))
}

/// `Random` gives a float in [0, 1); `Random(n)` an integer in [0, n)
fn builtin_random(interp: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Random", &args, 0, 1)?;
    let x = interp.next_random();
    if args.is_empty() {
        return Ok(Value::Float((x >> 11) as f64 / (1u64 << 53) as f64));
    }
    let range = int_arg(&args, 0)?;
    if range <= 0 {
        return Ok(Value::Int(0));
    }
    Ok(Value::Int((x % range as u64) as i64))
}

fn builtin_randomize(interp: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Randomize", &args, 0, 0)?;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now().hash(&mut hasher);
    // xorshift must never be seeded with zero
    interp.rng_state = hasher.finish() | 1;
    Ok(Value::Nil)
}

fn builtin_odd(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Odd", &args, 1, 1)?;
    Ok(Value::Bool(int_arg(&args, 0)? % 2 != 0))
}

// ---- ordinals and containers ----

fn step(name: &str, args: &[Value], sign: i64) -> InterpResult<Value> {
    expect_args(name, args, 1, 2)?;
    let target = ref_arg(args, 0)?;
    let delta = if args.len() > 1 { int_arg(args, 1)? } else { 1 };
    let updated = match target.get()?.unwrap_variant() {
        Value::Int(n) => Value::Int(n.wrapping_add(sign * delta)),
        Value::Enum(_) if args.len() > 1 => {
            return Err(RuntimeError::invalid_operation(format!("{name}() with delta not supported for enum types")));
        }
        Value::Enum(e) => Value::Enum(enum_step(name, &e, sign)?),
        Value::Float(x) => Value::Float(x + (sign * delta) as f64),
        Value::Str(s) if s.chars().count() == 1 => {
            let code = s.chars().next().map_or(0, |c| c as i64) + sign * delta;
            let c = u32::try_from(code).ok().and_then(char::from_u32).unwrap_or('\0');
            Value::Str(c.to_string())
        }
        other => return Err(RuntimeError::type_error("ordinal variable", &other.type_name())),
    };
    target.set(updated)?;
    Ok(Value::Nil)
}

fn builtin_inc(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    step("Inc", &args, 1)
}

fn builtin_dec(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    step("Dec", &args, -1)
}

/// Neighbouring member in declaration order; stepping off either end fails
fn enum_step(name: &str, value: &EnumValue, sign: i64) -> InterpResult<EnumValue> {
    let next = if sign > 0 {
        value.info.succ(value.ordinal)
    } else {
        value.info.pred(value.ordinal)
    };
    next.map(|n| EnumValue::new(&value.info, n)).ok_or_else(|| {
        let message = match (name, sign > 0) {
            ("Succ", _) => "Succ() cannot get successor of maximum enum value".to_string(),
            ("Pred", _) => "Pred() cannot get predecessor of minimum enum value".to_string(),
            (_, true) => format!("{name}() cannot increment enum beyond its maximum value"),
            (_, false) => format!("{name}() cannot decrement enum below its minimum value"),
        };
        RuntimeError::invalid_operation(message)
    })
}

fn builtin_succ(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Succ", &args, 1, 1)?;
    match &args[0] {
        Value::Enum(e) => Ok(Value::Enum(enum_step("Succ", e, 1)?)),
        _ => Ok(Value::Int(int_arg(&args, 0)? + 1)),
    }
}

fn builtin_pred(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Pred", &args, 1, 1)?;
    match &args[0] {
        Value::Enum(e) => Ok(Value::Enum(enum_step("Pred", e, -1)?)),
        _ => Ok(Value::Int(int_arg(&args, 0)? - 1)),
    }
}

fn builtin_low(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Low", &args, 1, 1)?;
    match &args[0] {
        Value::Array(arr) => Ok(Value::Int(arr.borrow().low)),
        Value::Str(_) => Ok(Value::Int(1)),
        Value::EnumType(info) => Ok(Value::Enum(EnumValue::new(info, info.low()))),
        Value::Enum(e) => Ok(Value::Enum(EnumValue::new(&e.info, e.info.low()))),
        other => Err(RuntimeError::type_error("array, string or enumeration", &other.type_name())),
    }
}

fn builtin_high(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("High", &args, 1, 1)?;
    match &args[0] {
        Value::Array(arr) => Ok(Value::Int(arr.borrow().high())),
        Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
        Value::EnumType(info) => Ok(Value::Enum(EnumValue::new(info, info.high()))),
        Value::Enum(e) => Ok(Value::Enum(EnumValue::new(&e.info, e.info.high()))),
        other => Err(RuntimeError::type_error("array, string or enumeration", &other.type_name())),
    }
}

fn builtin_set_length(interp: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("SetLength", &args, 2, 2)?;
    let target = ref_arg(&args, 0)?;
    let len = usize::try_from(int_arg(&args, 1)?.max(0)).unwrap_or(0);
    match target.get()?.unwrap_variant() {
        Value::Array(arr) => interp.resize_array(&arr, len),
        Value::Str(s) => {
            let mut chars: Vec<char> = s.chars().collect();
            chars.resize(len, ' ');
            target.set(Value::Str(chars.into_iter().collect()))
        }
        other => Err(RuntimeError::type_error("array or string", &other.type_name())),
    }?;
    Ok(Value::Nil)
}

fn builtin_swap(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Swap", &args, 2, 2)?;
    let (a, b) = (ref_arg(&args, 0)?, ref_arg(&args, 1)?);
    let (va, vb) = (a.get()?, b.get()?);
    a.set(vb)?;
    b.set(va)?;
    Ok(Value::Nil)
}

fn update_set(name: &str, args: &[Value], insert: bool) -> InterpResult<Value> {
    expect_args(name, args, 2, 2)?;
    let target = ref_arg(args, 0)?;
    let item = int_arg(args, 1)?;
    let mut set = match target.get()?.unwrap_variant() {
        Value::Set(set) => set,
        Value::Array(arr) => super::types::array_to_set(&arr.borrow().elems),
        other => return Err(RuntimeError::type_error("set", &other.type_name())),
    };
    if insert {
        set.insert(item);
    } else {
        set.remove(&item);
    }
    target.set(Value::Set(set))?;
    Ok(Value::Nil)
}

fn builtin_include(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    update_set("Include", &args, true)
}

fn builtin_exclude(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    update_set("Exclude", &args, false)
}

fn builtin_sort(interp: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    expect_args("Sort", &args, 1, 2)?;
    let Value::Array(arr) = &args[0] else {
        return Err(RuntimeError::type_error("array", &args[0].type_name()));
    };
    interp.sort_array(arr, args.get(1).cloned(), span)?;
    Ok(Value::Nil)
}

// ---- objects and diagnostics ----

fn builtin_assigned(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Assigned", &args, 1, 1)?;
    Ok(Value::Bool(!args[0].is_nil()))
}

/// `Assert(cond[, msg])` raises `EAssertionFailed`
fn builtin_assert(interp: &mut Interpreter, args: Vec<Value>, span: Span) -> InterpResult<Value> {
    expect_args("Assert", &args, 1, 2)?;
    if args[0].is_truthy() {
        return Ok(Value::Nil);
    }
    let mut message = format!("Assertion failed {}", span.location());
    if let Some(msg) = args.get(1) {
        message.push_str(&format!(" : {msg}"));
    }
    Err(interp.exception("EAssertionFailed", &message, span))
}

// ---- date and time ----

/// Day zero of `TDateTime`
fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn to_tdatetime(dt: NaiveDateTime) -> f64 {
    (dt - epoch()).num_milliseconds() as f64 / 86_400_000.0
}

fn from_tdatetime(value: f64) -> NaiveDateTime {
    epoch() + Duration::milliseconds((value * 86_400_000.0).round() as i64)
}

fn builtin_now(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Now", &args, 0, 0)?;
    Ok(Value::Float(to_tdatetime(Local::now().naive_local())))
}

fn builtin_date(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Date", &args, 0, 0)?;
    Ok(Value::Float(to_tdatetime(Local::now().naive_local()).trunc()))
}

fn builtin_time(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("Time", &args, 0, 0)?;
    Ok(Value::Float(to_tdatetime(Local::now().naive_local()).fract()))
}

fn builtin_date_time_to_str(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("DateTimeToStr", &args, 1, 1)?;
    let dt = from_tdatetime(float_arg(&args, 0)?);
    Ok(Value::Str(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
}

/// Pascal-style pattern: `yyyy yy mm dd hh nn ss zzz`
fn builtin_format_date_time(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("FormatDateTime", &args, 2, 2)?;
    let pattern = str_arg(&args, 0)?;
    let dt = from_tdatetime(float_arg(&args, 1)?);
    Ok(Value::Str(format_date_time(&pattern, dt)))
}

pub(crate) fn format_date_time(pattern: &str, dt: NaiveDateTime) -> String {
    const TOKENS: [(&str, &str); 8] = [
        ("yyyy", "%Y"),
        ("yy", "%y"),
        ("mm", "%m"),
        ("dd", "%d"),
        ("hh", "%H"),
        ("nn", "%M"),
        ("ss", "%S"),
        ("zzz", "ms"),
    ];
    let mut out = String::new();
    let mut rest = pattern;
    'outer: while !rest.is_empty() {
        for (token, spec) in TOKENS {
            if rest.len() >= token.len() && rest[..token.len()].eq_ignore_ascii_case(token) {
                if spec == "ms" {
                    out.push_str(&format!("{:03}", dt.nanosecond() / 1_000_000));
                } else {
                    out.push_str(&dt.format(spec).to_string());
                }
                rest = &rest[token.len()..];
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

fn builtin_unix_time(_: &mut Interpreter, args: Vec<Value>, _: Span) -> InterpResult<Value> {
    expect_args("UnixTime", &args, 0, 0)?;
    Ok(Value::Int(chrono::Utc::now().timestamp()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> InterpResult<Value> {
        let mut interp = Interpreter::new();
        let builtin = interp.builtins.get(name).copied().expect("registered");
        (builtin.func)(&mut interp, args, Span::default())
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("inttostr", vec![Value::Int(42)]).ok(), Some(Value::str("42")));
        assert_eq!(call("strtoint", vec![Value::str("$FF")]).ok(), Some(Value::Int(255)));
        assert_eq!(
            call("strtointdef", vec![Value::str("x"), Value::Int(7)]).ok(),
            Some(Value::Int(7))
        );
        assert_eq!(call("inttohex", vec![Value::Int(255), Value::Int(4)]).ok(), Some(Value::str("00FF")));
    }

    #[test]
    fn test_str_to_int_raises_convert_error() {
        let err = call("strtoint", vec![Value::str("abc")]).expect_err("bad");
        assert_eq!(err.exception_value().map(|e| e.class_name.as_str()), Some("EConvertError"));
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(
            call("copy", vec![Value::str("hello"), Value::Int(2), Value::Int(3)]).ok(),
            Some(Value::str("ell"))
        );
        assert_eq!(call("pos", vec![Value::str("lo"), Value::str("hello")]).ok(), Some(Value::Int(4)));
        assert_eq!(call("uppercase", vec![Value::str("abc")]).ok(), Some(Value::str("ABC")));
        assert_eq!(call("chr", vec![Value::Int(65)]).ok(), Some(Value::str("A")));
        assert_eq!(call("ord", vec![Value::str("a")]).ok(), Some(Value::Int(97)));
    }

    #[test]
    fn test_format() {
        let values = [Value::Int(3), Value::str("x"), Value::Float(1.5)];
        assert_eq!(
            format_string("%d-%s-%.1f-%%", &values).ok(),
            Some(Value::str("3-x-1.5-%"))
        );
        assert_eq!(format_string("[%5d]", &[Value::Int(42)]).ok(), Some(Value::str("[   42]")));
        assert!(format_string("%d", &[]).is_err());
    }

    #[test]
    fn test_math() {
        assert_eq!(call("abs", vec![Value::Int(-3)]).ok(), Some(Value::Int(3)));
        assert_eq!(call("max", vec![Value::Int(2), Value::Int(5)]).ok(), Some(Value::Int(5)));
        assert_eq!(call("trunc", vec![Value::Float(-2.7)]).ok(), Some(Value::Int(-2)));
        assert_eq!(call("round", vec![Value::Float(2.5)]).ok(), Some(Value::Int(3)));
    }

    #[test]
    fn test_abs_of_min_integer_raises_range_error() {
        let err = call("abs", vec![Value::Int(i64::MIN)]).expect_err("overflow");
        assert_eq!(err.exception_value().map(|e| e.class_name.as_str()), Some("ERangeError"));
        assert_eq!(call("abs", vec![Value::Int(i64::MIN + 1)]).ok(), Some(Value::Int(i64::MAX)));
    }

    #[test]
    fn test_enum_ordinal_builtins() {
        use crate::ast::EnumKind;
        use crate::interp::registry::EnumInfo;
        use std::rc::Rc;

        let info = Rc::new(EnumInfo::new(
            "TLevel",
            EnumKind::Plain,
            vec![("Low".to_string(), 0), ("Medium".to_string(), 5), ("High".to_string(), 6)],
        ));
        let at = |n| Value::Enum(EnumValue::new(&info, n));

        assert_eq!(call("ord", vec![at(5)]).ok(), Some(Value::Int(5)));
        assert_eq!(call("succ", vec![at(0)]).ok(), Some(at(5)));
        assert_eq!(call("pred", vec![at(6)]).ok(), Some(at(5)));
        assert_eq!(call("low", vec![Value::EnumType(Rc::clone(&info))]).ok(), Some(at(0)));
        assert_eq!(call("high", vec![at(0)]).ok(), Some(at(6)));

        let err = call("succ", vec![at(6)]).expect_err("past the end");
        assert!(err.message.contains("successor of maximum"), "{}", err.message);
        assert!(call("pred", vec![at(0)]).is_err());
    }

    #[test]
    fn test_random_range() {
        let mut interp = Interpreter::new();
        for _ in 0..100 {
            let value = builtin_random(&mut interp, vec![Value::Int(10)], Span::default()).expect("random");
            let n = value.as_int().expect("int");
            assert!((0..10).contains(&n));
        }
    }

    #[test]
    fn test_format_date_time() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(14, 5, 7))
            .expect("valid date");
        assert_eq!(format_date_time("yyyy-mm-dd hh:nn:ss", dt), "2024-03-09 14:05:07");
        assert_eq!(from_tdatetime(to_tdatetime(dt)), dt);
    }

    #[test]
    fn test_assert_message() {
        let err = call("assert", vec![Value::Bool(false), Value::str("boom")]).expect_err("assert");
        assert_eq!(err.exception_value().map(|e| e.class_name.as_str()), Some("EAssertionFailed"));
        assert!(err.message.starts_with("Assertion failed [line:"));
        assert!(err.message.ends_with(" : boom"));
    }
}
