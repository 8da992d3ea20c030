//! Integration tests for the DWS interpreter
//!
//! Runs whole programs through the lexer, parser and interpreter and checks
//! the printed output and the errors that escape to the top level.

use dws::interp::{
    ErrorKind, Interpreter, InterpreterConfig, Output, RuntimeError, class_explicitly_implements_interface,
    class_implements_interface,
};
use dws::parser::parse_source;
use std::cell::RefCell;
use std::rc::Rc;

/// Helper to run a program and return its result plus everything it printed
fn run(source: &str) -> (Result<(), RuntimeError>, String) {
    run_with(InterpreterConfig::default(), source)
}

fn run_with(config: InterpreterConfig, source: &str) -> (Result<(), RuntimeError>, String) {
    let program = parse_source(source).expect("program should parse");
    let buffer = Rc::new(RefCell::new(String::new()));
    let mut interp = Interpreter::with_config(config);
    interp.set_output(Output::Buffer(Rc::clone(&buffer)));
    let result = interp.run(&program);
    let text = buffer.borrow().clone();
    (result, text)
}

/// Helper to run a program that must succeed
fn output(source: &str) -> String {
    let (result, text) = run(source);
    if let Err(e) = result {
        panic!("unexpected error: {e}\noutput so far: {text}");
    }
    text
}

/// Helper to run a program that must fail
fn failure(source: &str) -> RuntimeError {
    let (result, _) = run(source);
    result.expect_err("program should fail")
}

const HIERARCHY: &str = "
type
  IBase = interface
    function Name: String;
  end;
  IMiddle = interface(IBase)
    function Level: Integer;
  end;
  IDerived = interface(IMiddle)
    procedure Touch;
  end;
  IOther = interface
    procedure Other;
  end;
  TAnimal = class(TObject, IMiddle)
    function Name: String; virtual;
    function Level: Integer;
  end;
  TDog = class(TAnimal)
    function Name: String; override;
  end;
  TPuppy = class(TDog)
  end;
  TCar = class
  end;
  TAll = class(TObject, IDerived)
    function Name: String;
    function Level: Integer;
    procedure Touch;
  end;

function TAnimal.Name: String; begin Result := 'animal'; end;
function TAnimal.Level: Integer; begin Result := 1; end;
function TDog.Name: String; begin Result := 'dog'; end;
function TAll.Name: String; begin Result := 'all'; end;
function TAll.Level: Integer; begin Result := 3; end;
procedure TAll.Touch; begin PrintLn('touched'); end;
";

fn with_hierarchy(body: &str) -> String {
    format!("{HIERARCHY}{body}")
}

// ============================================
// is / as across the class hierarchy
// ============================================

#[test]
fn test_descendant_is_and_as_ancestor() {
    let out = output(&with_hierarchy(
        "var p := TPuppy.Create;
         PrintLn(p is TObject);
         PrintLn(p is TAnimal);
         PrintLn(p is TDog);
         var a := p as TAnimal;
         PrintLn(a = p);
         PrintLn(a.Name);",
    ));
    assert_eq!(out, "True\nTrue\nTrue\nTrue\ndog\n");
}

#[test]
fn test_unrelated_class_cast_names_both_classes() {
    let out = output(&with_hierarchy(
        "var c := TCar.Create;
         try
           var d := c as TDog;
         except
           on E: Exception do PrintLn(E.Message);
         end;",
    ));
    assert!(out.starts_with("Cannot cast instance of type \"TCar\" to class \"TDog\" [line: "));
    assert!(out.contains("TCar") && out.contains("TDog"));
}

#[test]
fn test_downcast_of_ancestor_instance_raises() {
    let err = failure(&with_hierarchy("var a := TAnimal.Create; var d := a as TDog;"));
    let exc = err.exception_value().expect("cast failures are catchable");
    assert_eq!(exc.class_name, "Exception");
    assert!(exc.message.starts_with("Cannot cast instance of type \"TAnimal\" to class \"TDog\""));
}

#[test]
fn test_cast_error_location() {
    let src = "type TA = class end;
type TB = class end;
var a := TA.Create;
var b := a as TB;";
    let err = failure(src);
    assert_eq!(
        err.to_string(),
        "Exception: Exception: Cannot cast instance of type \"TA\" to class \"TB\" [line: 4, column: 10]"
    );
}

#[test]
fn test_unknown_cast_target_is_catchable() {
    let out = output(&with_hierarchy(
        "try
           var x := TCar.Create as TNowhere;
         except
           on E: Exception do PrintLn(E.Message);
         end;",
    ));
    assert!(out.starts_with("type \"TNowhere\" not found (neither class nor interface) [line: "));
}

#[test]
fn test_is_with_nil_and_primitives() {
    let out = output(&with_hierarchy(
        "var n: TAnimal := nil;
         PrintLn(n is TAnimal);
         PrintLn(n is IBase);
         PrintLn(42 is TObject);",
    ));
    assert_eq!(out, "False\nFalse\nFalse\n");
}

#[test]
fn test_is_true_false_form() {
    let out = output("var s := 'x'; PrintLn(s is True); PrintLn(0 is False); PrintLn(nil is True);");
    assert_eq!(out, "True\nTrue\nFalse\n");
}

// ============================================
// Interfaces
// ============================================

#[test]
fn test_interface_conformance_is_transitive() {
    let out = output(&with_hierarchy(
        "var d := TDog.Create;
         PrintLn(d is IMiddle);
         PrintLn(d is IBase);
         PrintLn(d is IDerived);
         var b := d as IBase;
         PrintLn(b.Name);",
    ));
    assert_eq!(out, "True\nTrue\nFalse\ndog\n");
}

#[test]
fn test_implements_ignores_inherited_declarations() {
    let out = output(&with_hierarchy(
        "PrintLn(TAnimal implements IMiddle);
         PrintLn(TDog implements IMiddle);
         PrintLn(TDog.Create is IMiddle);
         var cls := TDog.Create.ClassType;
         PrintLn(cls implements IMiddle);
         var none: TDog := nil;
         PrintLn(none implements IMiddle);",
    ));
    assert_eq!(out, "True\nFalse\nTrue\nFalse\nFalse\n");
}

#[test]
fn test_implements_unknown_interface_is_hard_error() {
    let err = failure(&with_hierarchy("PrintLn(TDog implements IMissing);"));
    assert_eq!(err.kind, ErrorKind::UnknownType);
    assert!(!err.is_exception());
}

#[test]
fn test_interface_to_interface_casts() {
    let out = output(&with_hierarchy(
        "var m: IMiddle := TAll.Create;
         var d := m as IDerived;
         d.Touch;
         var back := d as TAll;
         PrintLn(back.Level);",
    ));
    assert_eq!(out, "touched\n3\n");

    let err = failure(&with_hierarchy("var m: IMiddle := TDog.Create; var o := m as IOther;"));
    let message = &err.exception_value().expect("catchable").message;
    assert!(message.starts_with("Cannot cast instance of type \"TDog\" to interface \"IOther\""));
}

#[test]
fn test_interface_to_unrelated_class_raises() {
    let err = failure(&with_hierarchy("var b: IBase := TDog.Create; var c := b as TCar;"));
    assert!(err.message.starts_with("cannot cast interface of \"TDog\" to class \"TCar\" [line: "));
    assert!(err.is_exception());
}

#[test]
fn test_nil_casts_never_raise() {
    let out = output(&with_hierarchy(
        "var n: TAnimal := nil;
         PrintLn(Assigned(n as TDog));
         PrintLn(Assigned(n as IBase));
         var m: IMiddle;
         var o := m as IOther;
         PrintLn(Assigned(o));
         PrintLn(o is IOther);",
    ));
    assert_eq!(out, "False\nFalse\nFalse\nFalse\n");
}

#[test]
fn test_nil_interface_to_class_raises() {
    let err = failure(&with_hierarchy("var m: IMiddle; var d := m as TDog;"));
    assert!(err.message.starts_with("cannot cast nil interface to class \"TDog\""));
}

#[test]
fn test_interface_shares_the_object() {
    let src = "
type
  ICounter = interface
    procedure Bump;
  end;
  TCounter = class(TObject, ICounter)
    N: Integer;
    procedure Bump;
  end;
procedure TCounter.Bump; begin N := N + 1; end;
var c := TCounter.Create;
var i1: ICounter := c;
var i2 := c as ICounter;
i1.Bump;
i2.Bump;
PrintLn(c.N);
PrintLn(i1 = i2);";
    assert_eq!(output(src), "2\nTrue\n");
}

#[test]
fn test_registry_three_level_interfaces() {
    let program = parse_source(HIERARCHY).expect("parse");
    let mut interp = Interpreter::new();
    interp.run(&program).expect("declarations");

    let registry = interp.registry();
    let derived = registry.lookup_interface("iderived").expect("IDerived");
    assert_eq!(derived.all_methods().len(), 3);

    let all = registry.lookup_class("TALL").expect("TAll");
    for name in ["IBase", "IMiddle", "IDerived"] {
        let intf = registry.lookup_interface(name).expect("interface");
        assert!(class_implements_interface(&all, &intf), "TAll should implement {name}");
    }

    let dog = registry.lookup_class("TDog").expect("TDog");
    let middle = registry.lookup_interface("IMiddle").expect("IMiddle");
    assert!(class_implements_interface(&dog, &middle));
    assert!(!class_explicitly_implements_interface(&dog, &middle));
}

// ============================================
// Construction and dispatch
// ============================================

#[test]
fn test_document_end_to_end() {
    let src = "
type
  IPrintable = interface
    procedure Print;
    function GetName: String;
  end;
  TDocument = class(TObject, IPrintable)
    FName: String;
    constructor Create(AName: String);
    procedure Print;
    function GetName: String;
  end;
constructor TDocument.Create(AName: String); begin FName := AName; end;
procedure TDocument.Print; begin PrintLn('Printing ' + FName); end;
function TDocument.GetName: String; begin Result := FName; end;
var doc := TDocument.Create('report');
PrintLn(doc.GetName());
doc.Print();
var p: IPrintable := doc;
p.Print;";
    insta::assert_snapshot!(output(src), @r"
    report
    Printing report
    Printing report
    ");
}

#[test]
fn test_constructor_overload_selection() {
    let src = "
type
  TPoint = class
    X: Integer;
    Y: Integer := 5;
    constructor Create; overload;
    constructor Create(a: Integer); overload;
  end;
constructor TPoint.Create; begin end;
constructor TPoint.Create(a: Integer); begin X := a; end;
var p := TPoint.Create;
PrintLn(IntToStr(p.X) + ',' + IntToStr(p.Y));
var q := TPoint.Create(7);
PrintLn(IntToStr(q.X) + ',' + IntToStr(q.Y));";
    assert_eq!(output(src), "0,5\n7,5\n");
}

#[test]
fn test_inherited_uses_static_parent() {
    let src = "
type
  TBase = class
    function Describe: String; virtual;
  end;
  TMid = class(TBase)
    function Describe: String; override;
  end;
  TLeaf = class(TMid)
    function Describe: String; override;
  end;
function TBase.Describe: String; begin Result := 'base'; end;
function TMid.Describe: String; begin Result := 'mid>' + inherited Describe; end;
function TLeaf.Describe: String; begin Result := 'leaf>' + inherited; end;
var o: TBase := TLeaf.Create;
PrintLn(o.Describe);";
    assert_eq!(output(src), "leaf>mid>base\n");
}

#[test]
fn test_parameterless_method_auto_invokes() {
    let src = "
type
  TGreeter = class
    function Hello: String;
    function Greet(who: String): String;
  end;
function TGreeter.Hello: String; begin Result := 'hello'; end;
function TGreeter.Greet(who: String): String; begin Result := 'hi ' + who; end;
var g := TGreeter.Create;
PrintLn(g.Hello);
var f := g.Greet;
PrintLn(f('bob'));";
    assert_eq!(output(src), "hello\nhi bob\n");
}

#[test]
fn test_abstract_class_is_hard_error() {
    let err = failure("type TShape = class abstract end; var s := TShape.Create;");
    assert_eq!(err.kind, ErrorKind::AbstractInstantiation);
}

#[test]
fn test_destroyed_object_access() {
    let out = output(
        "type TFoo = class X: Integer; end;
         var f := TFoo.Create;
         f.Free;
         try
           PrintLn(f.X);
         except
           on E: Exception do PrintLn(E.Message);
         end;",
    );
    assert!(out.starts_with("Object already destroyed"));

    let out = output(
        "type TFoo = class X: Integer; end;
         var f: TFoo;
         try
           f.X := 1;
         except
           on E: Exception do PrintLn(E.Message);
         end;",
    );
    assert!(out.starts_with("Object not instantiated"));
}

// ============================================
// Call pipeline
// ============================================

#[test]
fn test_var_parameter_requires_variable_in_any_position() {
    let first = failure("procedure P(var a: Integer; b: Integer); begin end; P(1 + 1, 2);");
    let second = failure("procedure P(a: Integer; var b: Integer); begin end; var x := 1; P(x, 5);");
    for err in [first, second] {
        assert_eq!(err.kind, ErrorKind::VarParamRequired);
        assert!(err.message.contains("var parameter requires a variable"));
        assert!(!err.is_exception());
    }
}

#[test]
fn test_var_parameter_writes_through_fields_and_elements() {
    let src = "
type TBox = class V: Integer; end;
procedure Twice(var x: Integer); begin x := x * 2; end;
var b := TBox.Create;
b.V := 4;
Twice(b.V);
var a := [1, 2, 3];
Twice(a[2]);
PrintLn(IntToStr(b.V) + ' ' + a.Join(','));";
    assert_eq!(output(src), "8 1,2,6\n");
}

#[test]
fn test_lazy_parameter_only_evaluated_on_use() {
    let src = "
var calls := 0;
function Next: Integer; begin calls += 1; Result := calls * 10; end;
function Pick(first: Boolean; lazy a, b: Integer): Integer;
begin
  if first then Result := a else Result := b;
end;
PrintLn(Pick(True, Next, Next));
PrintLn(calls);";
    assert_eq!(output(src), "10\n1\n");
}

#[test]
fn test_defaults_evaluated_in_caller_scope() {
    let src = "
var base := 1;
function AddBase(x: Integer; y: Integer = base): Integer; begin Result := x + y; end;
procedure Inner;
var base: Integer;
begin
  base := 100;
  PrintLn(AddBase(1));
end;
Inner;
PrintLn(AddBase(1));";
    assert_eq!(output(src), "101\n2\n");
}

#[test]
fn test_defaults_without_parentheses_see_caller_scope() {
    let src = "
var k := 1;
type TBox = class
  V: Integer;
  constructor Create(x: Integer = k);
  procedure Show(x: Integer = k);
end;
constructor TBox.Create(x: Integer = k); begin V := x; end;
procedure TBox.Show(x: Integer = k); begin PrintLn(IntToStr(V) + '/' + IntToStr(x)); end;
procedure Echo(x: Integer = k); begin PrintLn(x); end;
procedure Outer;
var k: Integer;
begin
  k := 5;
  Echo;
  var b := TBox.Create;
  b.Show;
end;
Outer;
Echo;";
    assert_eq!(output(src), "5\n5/5\n1\n");
}

#[test]
fn test_overloaded_var_argument_is_resolved_twice() {
    // Scoring evaluates the argument once; binding the var parameter
    // resolves the location again
    let src = "
var calls := 0;
var a := [0, 0, 0];
function Next: Integer; begin calls += 1; Result := calls; end;
procedure Bump(var x: Integer); overload; begin x += 10; end;
procedure Bump(var s: String); overload; begin s := s + '!'; end;
Bump(a[Next]);
PrintLn(calls);
PrintLn(a.Join(','));";
    assert_eq!(output(src), "2\n0,0,10\n");
}

#[test]
fn test_recursion_limit_is_catchable() {
    let src = "
function Deep(n: Integer): Integer;
begin
  Result := Deep(n + 1);
end;
try
  Deep(0);
except
  on E: EScriptStackOverflow do PrintLn(E.ClassName + ': ' + E.Message);
end;
PrintLn('alive');";
    let (result, out) = run_with(InterpreterConfig { max_recursion_depth: 64 }, src);
    assert!(result.is_ok(), "{result:?}");
    assert_eq!(out, "EScriptStackOverflow: maximum recursion depth exceeded (64)\nalive\n");
}

#[test]
fn test_recursion_limit_through_methods_and_lambdas() {
    let src = "
type TLoop = class procedure Spin; end;
procedure TLoop.Spin; begin Spin; end;
TLoop.Create.Spin;";
    let (result, _) = run_with(InterpreterConfig { max_recursion_depth: 32 }, src);
    let err = result.expect_err("overflow");
    assert!(err.message.contains("maximum recursion depth exceeded (32)"));

    let src = "var f: function(n: Integer): Integer;
f := lambda (n: Integer): Integer => f(n + 1);
f(0);";
    let (result, _) = run_with(InterpreterConfig { max_recursion_depth: 32 }, src);
    let err = result.expect_err("overflow");
    assert_eq!(err.exception_value().map(|e| e.class_name.as_str()), Some("EScriptStackOverflow"));
}

#[test]
fn test_closures_capture_creation_scope() {
    let src = "
function MakeCounter: function: Integer;
var n: Integer;
begin
  n := 0;
  Result := lambda: Integer begin n := n + 1; Result := n; end;
end;
var c := MakeCounter;
c; c;
PrintLn(c());";
    assert_eq!(output(src), "3\n");
}

// ============================================
// Values
// ============================================

#[test]
fn test_record_value_semantics() {
    let src = "
type TPoint = record X, Y: Integer; end;
procedure Mutate(p: TPoint); begin p.X := 99; end;
var a: TPoint;
a.X := 1;
var b := a;
b.X := 2;
var c := Copy(a);
c.X := 3;
Mutate(a);
PrintLn(IntToStr(a.X) + IntToStr(b.X) + IntToStr(c.X));";
    assert_eq!(output(src), "123\n");
}

#[test]
fn test_dynamic_array_copy_isolates() {
    let src = "
var a := [1, 2, 3];
var shared := a;
var copied := Copy(a);
shared[0] := 7;
copied[1] := 9;
PrintLn(a.Join(',') + ' ' + copied.Join(','));";
    assert_eq!(output(src), "7,2,3 1,9,3\n");
}

#[test]
fn test_sort_follows_comparator_sign() {
    let src = "
var a := [3, 1, 2, 5, 4];
a.Sort(lambda (x, y: Integer): Integer => x - y);
PrintLn(a.Join(' '));
a.Sort(lambda (x, y: Integer): Integer => y - x);
PrintLn(a.Join(' '));
var words := ['bb', 'a', 'ccc'];
Sort(words, lambda (x, y: String): Integer => Length(x) - Length(y));
PrintLn(words.Join(' '));";
    insta::assert_snapshot!(output(src), @r"
    1 2 3 4 5
    5 4 3 2 1
    a bb ccc
    ");
}

#[test]
fn test_variant_coercion() {
    let src = "
var v: Variant := 42;
PrintLn('n=' + v);
var w: Variant := 1.5;
PrintLn(v + w);
var e: Variant;
var f: Variant;
PrintLn(e = f);
PrintLn(e <> v);
PrintLn(VarType(e));
PrintLn(VarType(v));
PrintLn(VarType(w));
v := 'text';
PrintLn(VarType(v));
var n: Integer := w;
PrintLn(n);";
    assert_eq!(output(src), "n=42\n43.5\nTrue\nTrue\n0\n3\n5\n256\n1\n");
}

#[test]
fn test_variant_incompatible_operands() {
    let err = failure("var s: Variant := 'a'; var b: Variant := True; var x := s * b;");
    assert!(err.message.contains("incompatible Variant types for operator *"));

    let err = failure("var u: Variant; var x := u + 1;");
    assert!(err.message.contains("cannot perform operation on unassigned Variant"));
}

// ============================================
// Errors and exceptions
// ============================================

#[test]
fn test_hard_errors_are_not_catchable() {
    let (result, out) = run(
        "try
           PrintLn(1 div 0);
         except
           PrintLn('caught');
         end;",
    );
    let err = result.expect_err("division by zero");
    assert_eq!(err.kind, ErrorKind::DivisionByZero);
    assert!(!err.is_exception());
    assert_eq!(out, "");
}

#[test]
fn test_handler_matches_base_exception_class() {
    let src = "
type EMine = class(EConvertError);
try
  raise EMine.Create('custom');
except
  on E: ERangeError do PrintLn('wrong');
  on E: EConvertError do PrintLn(E.ClassName + ' ' + E.Message);
end;";
    assert_eq!(output(src), "EMine custom\n");
}

#[test]
fn test_uncaught_exception_display() {
    let err = failure("\n  raise EHost.Create('boom');");
    assert_eq!(err.to_string(), "Exception: EHost: boom [line: 2, column: 3]");
}

#[test]
fn test_assert_raises_assertion_failed() {
    let out = output(
        "try
           Assert(1 = 2, 'math');
         except
           on E: EAssertionFailed do PrintLn(E.Message);
         end;",
    );
    assert!(out.starts_with("Assertion failed [line: 2, column: "));
    assert!(out.trim_end().ends_with(" : math"));
}

#[test]
fn test_range_error_is_catchable() {
    let out = output(
        "var a := [1, 2];
         try
           PrintLn(a[5]);
         except
           on E: ERangeError do PrintLn('range');
         end;",
    );
    assert_eq!(out, "range\n");
}

#[test]
fn test_finally_and_exit_ordering() {
    let src = "
function Work: Integer;
begin
  try
    Result := 1;
    Exit;
  finally
    PrintLn('cleanup');
  end;
  Result := 2;
end;
PrintLn(Work);";
    insta::assert_snapshot!(output(src), @r"
    cleanup
    1
    ");
}

// ============================================
// Builtins, helpers and class members
// ============================================

#[test]
fn test_builtin_library_sample() {
    let src = "
PrintLn(Format('%d-%s-%.2f', [7, 'x', 1.5]));
PrintLn(IntToHex(255, 4));
PrintLn(StrToIntDef('nope', -1));
PrintLn(UpperCase('abc') + LowerCase('DEF'));
PrintLn(Pos('c', 'abcd'));
PrintLn(Copy('hello', 2, 3));
PrintLn(Max(3, 9) - Min(3, 9));
var i := 5;
Inc(i, 2);
Dec(i);
PrintLn(i);";
    assert_eq!(output(src), "7-x-1.50\n00FF\n-1\nABCdef\n3\nell\n6\n6\n");
}

#[test]
fn test_helper_and_class_members() {
    let src = "
type
  TStrHelper = helper for String
    function Shout: String;
  end;
  TRegistry = class
    class var Count: Integer;
    const Prefix = 'item';
    constructor Create;
  end;
function TStrHelper.Shout: String; begin Result := UpperCase(Self) + '!'; end;
constructor TRegistry.Create; begin Count := Count + 1; end;
TRegistry.Create;
TRegistry.Create;
PrintLn(TRegistry.Prefix + IntToStr(TRegistry.Count));
PrintLn('hey'.Shout);";
    assert_eq!(output(src), "item2\nHEY!\n");
}

#[test]
fn test_case_insensitive_identifiers() {
    let src = "
TYPE tfoo = CLASS
  function VALUE: integer;
END;
function TFOO.value: INTEGER; begin result := 5; end;
var O := TFoo.create;
printLN(o.Value);";
    assert_eq!(output(src), "5\n");
}

#[test]
fn test_abs_of_lowest_integer_raises_range_error() {
    let src = "
PrintLn(Low(Integer) = -9223372036854775807 - 1);
try
  PrintLn(Abs(Low(Integer)));
except
  on E: ERangeError do PrintLn(E.ClassName);
end;
PrintLn(Abs(-High(Integer)));";
    assert_eq!(output(src), "True\nERangeError\n9223372036854775807\n");
}

// ============================================
// Enumerations
// ============================================

#[test]
fn test_enum_ordinals_and_names() {
    let src = "
type TColor = (Red, Green, Blue);
var c: TColor;
PrintLn(Ord(c));
c := Blue;
PrintLn(Ord(c));
PrintLn(c.Name);
PrintLn(TColor.Green.QualifiedName);
PrintLn(Ord(Succ(Red)));
PrintLn(Pred(Blue) = Green);
PrintLn(Ord(Low(TColor)));
PrintLn(Ord(High(TColor)));
PrintLn(Red < Blue);
PrintLn(TColor.ByName('green'));
PrintLn(Integer(Green));
PrintLn(TColor(2).Name);";
    assert_eq!(
        output(src),
        "0\n2\nBlue\nTColor.Green\n1\nTrue\n0\n2\nTrue\n1\n1\nBlue\n"
    );
}

#[test]
fn test_enum_iteration_and_sets() {
    let src = "
type TColor = (Red, Green, Blue);
var s: set of TColor;
for var c in TColor do PrintLn(c.Name);
s := [Red, Blue];
Include(s, Green);
Exclude(s, Red);
PrintLn(Green in s);
PrintLn(Red in s);
for var c := Red to Blue do
  if c in s then PrintLn(c.QualifiedName);";
    assert_eq!(
        output(src),
        "Red\nGreen\nBlue\nTrue\nFalse\nTColor.Green\nTColor.Blue\n"
    );
}

#[test]
fn test_enum_explicit_values_scoped_and_flags() {
    let src = "
type TLevel = (Low, Medium = 5, High);
type TMode = enum (Idle, Busy);
type TBits = flags (A, B, C);
PrintLn(Ord(Medium));
PrintLn(Ord(High));
PrintLn(Ord(High(TLevel)));
PrintLn(Ord(TMode.Busy));
PrintLn(Ord(TBits.C));
case Medium of
  Low: PrintLn('low');
  Medium: PrintLn('medium');
else
  PrintLn('other');
end;
var n := 0;
for var l in TLevel do n += 1;
PrintLn(n);
PrintLn(TLevel(3).Name);
PrintLn(Succ(Low).Name);";
    assert_eq!(output(src), "5\n6\n6\n1\n4\nmedium\n7\n?\nMedium\n");
}

#[test]
fn test_enum_stepping_past_the_ends_fails() {
    let err = failure("type TColor = (Red, Green, Blue); PrintLn(Succ(Blue));");
    assert!(err.message.contains("successor of maximum enum value"), "{}", err.message);

    let err = failure("type TColor = (Red, Green, Blue); var c := Red; Dec(c);");
    assert!(err.message.contains("below its minimum value"), "{}", err.message);

    let err = failure("type TColor = (Red, Green, Blue); var c := Red; Inc(c, 2);");
    assert!(err.message.contains("delta not supported"), "{}", err.message);

    // scoped members are not global names
    let err = failure("type TMode = enum (Idle, Busy); PrintLn(Ord(Busy));");
    assert_eq!(err.kind, ErrorKind::UndefinedVariable);
}
