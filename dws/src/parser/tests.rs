//! Parser tests for DWS syntax

use crate::ast::*;
use crate::lexer::tokenize;
use crate::parser::parse;

/// Helper to parse a DWS program and return the AST
fn parse_program(source: &str) -> crate::Result<Program> {
    let tokens = tokenize(source)?;
    parse("test.dws", source, tokens)
}

/// Helper to parse and expect success
fn parse_ok(source: &str) -> Program {
    parse_program(source).expect("Parse should succeed")
}

/// Helper to check if parsing fails
fn parse_fails(source: &str) -> bool {
    parse_program(source).is_err()
}

/// The single statement of a one-statement program
fn only_stmt(source: &str) -> Stmt {
    let prog = parse_ok(source);
    assert_eq!(prog.items.len(), 1, "expected one item in {source:?}");
    match &prog.items[0] {
        Item::Stmt(stmt) => stmt.node.clone(),
        other => panic!("Expected statement, got {other:?}"),
    }
}

/// The expression of `PrintLn(<expr>);`
fn print_arg(source: &str) -> Expr {
    match only_stmt(source) {
        Stmt::Expr(Spanned {
            node: Expr::Call { mut args, .. },
            ..
        }) => args.remove(0).node,
        other => panic!("Expected call statement, got {other:?}"),
    }
}

fn only_type(source: &str) -> TypeDecl {
    let prog = parse_ok(source);
    match &prog.items[0] {
        Item::Type(decl) => decl.clone(),
        other => panic!("Expected type declaration, got {other:?}"),
    }
}

fn class_decl(source: &str) -> ClassDecl {
    match only_type(source).kind {
        TypeDeclKind::Class(class) => class,
        other => panic!("Expected class, got {other:?}"),
    }
}

// ============================================
// Expressions
// ============================================

#[test]
fn test_parse_literals() {
    assert!(matches!(print_arg("PrintLn(42);"), Expr::IntLit(42)));
    assert!(matches!(print_arg("PrintLn(True);"), Expr::BoolLit(true)));
    assert!(matches!(print_arg("PrintLn(nil);"), Expr::Nil));
    match print_arg("PrintLn(1.5);") {
        Expr::FloatLit(x) => assert_eq!(x, 1.5),
        other => panic!("Expected FloatLit, got {other:?}"),
    }
}

#[test]
fn test_parse_adjacent_strings_and_char_codes() {
    match print_arg("PrintLn('it''s'#13#10'done');") {
        Expr::StrLit(s) => assert_eq!(s, "it's\r\ndone"),
        other => panic!("Expected StrLit, got {other:?}"),
    }
}

#[test]
fn test_parse_negative_literal_folds() {
    assert!(matches!(print_arg("PrintLn(-7);"), Expr::IntLit(-7)));
}

#[test]
fn test_parse_precedence() {
    // 1 + 2 * 3 = 7 parses as (1 + (2 * 3)) = 7
    let Expr::Binary { left, op, .. } = print_arg("PrintLn(1 + 2 * 3 = 7);") else {
        panic!("Expected comparison");
    };
    assert_eq!(op, BinOp::Eq);
    let Expr::Binary { right, op, .. } = left.node else {
        panic!("Expected addition");
    };
    assert_eq!(op, BinOp::Add);
    assert!(matches!(right.node, Expr::Binary { op: BinOp::Mul, .. }));
}

#[test]
fn test_parse_integer_operators() {
    let Expr::Binary { left, op, .. } = print_arg("PrintLn(7 div 2 mod 3);") else {
        panic!("Expected binary");
    };
    assert_eq!(op, BinOp::Mod);
    assert!(matches!(left.node, Expr::Binary { op: BinOp::IntDiv, .. }));
}

#[test]
fn test_parse_postfix_chain() {
    // a.b[1](2).c
    let Expr::Member { object, member } = print_arg("PrintLn(a.b[1](2).c);") else {
        panic!("Expected member");
    };
    assert_eq!(member.node, "c");
    let Expr::Call { callee, args } = object.node else {
        panic!("Expected call");
    };
    assert_eq!(args.len(), 1);
    assert!(matches!(callee.node, Expr::Index { .. }));
}

#[test]
fn test_parse_keyword_member_name() {
    let Expr::Member { member, .. } = print_arg("PrintLn(obj.Create);") else {
        panic!("Expected member");
    };
    assert!(member.node.eq_ignore_ascii_case("create"));
}

#[test]
fn test_parse_is_type_and_is_value() {
    match print_arg("PrintLn(o is TFoo);") {
        Expr::Is {
            target: IsTarget::Type(name),
            ..
        } => assert_eq!(name.node, "TFoo"),
        other => panic!("Expected type test, got {other:?}"),
    }
    assert!(matches!(
        print_arg("PrintLn(v is True);"),
        Expr::Is {
            target: IsTarget::Value(_),
            ..
        }
    ));
}

#[test]
fn test_parse_as_and_implements() {
    match print_arg("PrintLn(o as IFoo);") {
        Expr::As { target, .. } => assert_eq!(target.node, "IFoo"),
        other => panic!("Expected as, got {other:?}"),
    }
    match print_arg("PrintLn(TBar implements IFoo);") {
        Expr::Implements { expr, target } => {
            assert!(matches!(expr.node, Expr::Ident(ref n) if n == "TBar"));
            assert_eq!(target.node, "IFoo");
        }
        other => panic!("Expected implements, got {other:?}"),
    }
}

#[test]
fn test_parse_as_binds_tighter_than_member_comparison() {
    // (o as TFoo).X needs parentheses; `o as TFoo = nil` compares the cast
    let Expr::Binary { left, op, .. } = print_arg("PrintLn(o as TFoo = nil);") else {
        panic!("Expected comparison");
    };
    assert_eq!(op, BinOp::Eq);
    assert!(matches!(left.node, Expr::As { .. }));
}

#[test]
fn test_parse_set_literal_with_range() {
    let Expr::Binary { right, op, .. } = print_arg("PrintLn(x in [1, 3..5]);") else {
        panic!("Expected in");
    };
    assert_eq!(op, BinOp::In);
    let Expr::ArrayLit(elems) = right.node else {
        panic!("Expected literal");
    };
    assert_eq!(elems.len(), 2);
    assert!(matches!(elems[1].node, Expr::Range { .. }));
}

#[test]
fn test_parse_if_expression() {
    assert!(matches!(
        print_arg("PrintLn(if a then 1 else 2);"),
        Expr::IfExpr { .. }
    ));
}

#[test]
fn test_parse_lambda_arrow() {
    let Expr::Lambda(decl) = print_arg("PrintLn(lambda (x, y: Integer): Integer => x + y);") else {
        panic!("Expected lambda");
    };
    assert_eq!(decl.kind, RoutineKind::Lambda);
    assert_eq!(decl.params.len(), 2);
    assert!(decl.is_function());
    let body = decl.body.as_ref().unwrap();
    assert!(matches!(body.stmts[0].node, Stmt::Exit(Some(_))));
}

#[test]
fn test_parse_anonymous_function() {
    let Expr::Lambda(decl) =
        print_arg("PrintLn(function (n: Integer): Integer begin Result := n * 2; end);")
    else {
        panic!("Expected anonymous function");
    };
    assert_eq!(decl.params[0].name.node, "n");
    assert_eq!(decl.body.as_ref().unwrap().stmts.len(), 1);
}

#[test]
fn test_parse_address_of() {
    let Expr::AddressOf(target) = print_arg("PrintLn(@obj.Method);") else {
        panic!("Expected address-of");
    };
    assert!(matches!(target.node, Expr::Member { .. }));
}

#[test]
fn test_parse_new_and_inherited() {
    match print_arg("PrintLn(new TFoo(1, 2));") {
        Expr::New { class, args } => {
            assert_eq!(class.node, "TFoo");
            assert_eq!(args.len(), 2);
        }
        other => panic!("Expected new, got {other:?}"),
    }
    match print_arg("PrintLn(inherited);") {
        Expr::Inherited {
            method: None,
            has_parens: false,
            ..
        } => {}
        other => panic!("Expected bare inherited, got {other:?}"),
    }
    match print_arg("PrintLn(inherited Show(1));") {
        Expr::Inherited {
            method: Some(m),
            args,
            has_parens: true,
        } => {
            assert_eq!(m.node, "Show");
            assert_eq!(args.len(), 1);
        }
        other => panic!("Expected named inherited, got {other:?}"),
    }
}

// ============================================
// Statements
// ============================================

#[test]
fn test_parse_var_and_const_sections() {
    let prog = parse_ok("var a, b: Integer; c: String := 'x'; const N = 10; M: Float = 1.5;");
    assert_eq!(prog.items.len(), 4);
    let Item::Stmt(first) = &prog.items[0] else {
        panic!("Expected var");
    };
    let Stmt::Var(decl) = &first.node else {
        panic!("Expected var");
    };
    assert_eq!(decl.names.len(), 2);
    assert!(decl.init.is_none());
    assert!(matches!(&prog.items[3], Item::Stmt(s) if matches!(s.node, Stmt::Const(_))));
}

#[test]
fn test_parse_var_needs_type_or_init() {
    assert!(parse_fails("var x;"));
}

#[test]
fn test_parse_compound_assignment() {
    match only_stmt("x += 2;") {
        Stmt::Assign { op, .. } => assert_eq!(op, AssignOp::Add),
        other => panic!("Expected assignment, got {other:?}"),
    }
    match only_stmt("s.Items[0] := 'a';") {
        Stmt::Assign { target, op, .. } => {
            assert_eq!(op, AssignOp::Assign);
            assert!(matches!(target.node, Expr::Index { .. }));
        }
        other => panic!("Expected assignment, got {other:?}"),
    }
}

#[test]
fn test_parse_if_else_dangling() {
    let Stmt::If {
        then_branch,
        else_branch,
        ..
    } = only_stmt("if a then if b then x := 1 else x := 2;")
    else {
        panic!("Expected if");
    };
    // the else belongs to the inner if
    assert!(else_branch.is_none());
    assert!(matches!(
        then_branch.node,
        Stmt::If {
            else_branch: Some(_),
            ..
        }
    ));
}

#[test]
fn test_parse_for_with_step_and_var() {
    match only_stmt("for var i := 10 downto 1 step 3 do PrintLn(i);") {
        Stmt::For {
            var,
            declare,
            descending,
            step,
            ..
        } => {
            assert_eq!(var.node, "i");
            assert!(declare);
            assert!(descending);
            assert!(matches!(step.map(|s| s.node), Some(Expr::IntLit(3))));
        }
        other => panic!("Expected for, got {other:?}"),
    }
}

#[test]
fn test_parse_for_in() {
    match only_stmt("for c in 'abc' do Print(c);") {
        Stmt::ForIn { var, declare, .. } => {
            assert_eq!(var.node, "c");
            assert!(!declare);
        }
        other => panic!("Expected for-in, got {other:?}"),
    }
}

#[test]
fn test_parse_loops() {
    assert!(matches!(only_stmt("while i < 3 do i += 1;"), Stmt::While { .. }));
    match only_stmt("repeat i += 1; PrintLn(i) until i > 3;") {
        Stmt::Repeat { body, .. } => assert_eq!(body.len(), 2),
        other => panic!("Expected repeat, got {other:?}"),
    }
    // empty loop body
    assert!(matches!(only_stmt("while False do ;"), Stmt::While { .. }));
}

#[test]
fn test_parse_case_labels() {
    let Stmt::Case {
        branches,
        else_branch,
        ..
    } = only_stmt("case x of 1, 2: PrintLn('low'); 3..9: PrintLn('mid') else PrintLn('high') end;")
    else {
        panic!("Expected case");
    };
    assert_eq!(branches.len(), 2);
    assert_eq!(branches[0].labels.len(), 2);
    assert!(matches!(branches[1].labels[0], CaseLabel::Range(..)));
    assert_eq!(else_branch.map(|b| b.len()), Some(1));
}

#[test]
fn test_parse_try_except_handlers() {
    let src = "try
        raise Exception.Create('x');
    except
        on E: EConvertError do PrintLn(E.Message);
        on EDivByZero do PrintLn('div');
    else
        raise;
    end;";
    let Stmt::Try {
        except: Some(ExceptBlock::Handlers { handlers, else_body }),
        finally: None,
        ..
    } = only_stmt(src)
    else {
        panic!("Expected try/except with handlers");
    };
    assert_eq!(handlers.len(), 2);
    assert_eq!(handlers[0].var.as_ref().map(|v| v.node.as_str()), Some("E"));
    assert!(handlers[1].var.is_none());
    let else_body = else_body.expect("else part");
    assert!(matches!(else_body[0].node, Stmt::Raise(None)));
}

#[test]
fn test_parse_try_catch_all_and_finally() {
    match only_stmt("try x := 1; except PrintLn('e'); finally PrintLn('f'); end;") {
        Stmt::Try {
            except: Some(ExceptBlock::CatchAll(stmts)),
            finally: Some(fin),
            ..
        } => {
            assert_eq!(stmts.len(), 1);
            assert_eq!(fin.len(), 1);
        }
        other => panic!("Expected try/except/finally, got {other:?}"),
    }
}

#[test]
fn test_parse_try_needs_except_or_finally() {
    assert!(parse_fails("try x := 1; end;"));
}

#[test]
fn test_parse_exit_with_value() {
    let prog = parse_ok("function F: Integer; begin if True then exit(3); exit; end;");
    let Item::Routine(f) = &prog.items[0] else {
        panic!("Expected routine");
    };
    let stmts = &f.body.as_ref().unwrap().stmts;
    assert!(matches!(&stmts[0].node, Stmt::If { then_branch, .. } if matches!(then_branch.node, Stmt::Exit(Some(_)))));
    assert!(matches!(stmts[1].node, Stmt::Exit(None)));
}

#[test]
fn test_parse_program_header_and_final_dot() {
    let prog = parse_ok("program Demo; begin PrintLn(1); end.");
    assert_eq!(prog.name.as_deref(), Some("Demo"));
    assert_eq!(prog.items.len(), 1);
}

// ============================================
// Routines
// ============================================

#[test]
fn test_parse_param_modes_and_defaults() {
    let prog = parse_ok(
        "procedure P(var a: Integer; const b: String; lazy c: Integer; out d: Float; e: Integer = 5);
         begin end;",
    );
    let Item::Routine(p) = &prog.items[0] else {
        panic!("Expected routine");
    };
    let modes: Vec<ParamMode> = p.params.iter().map(|p| p.mode).collect();
    assert_eq!(
        modes,
        vec![
            ParamMode::Var,
            ParamMode::Const,
            ParamMode::Lazy,
            ParamMode::Out,
            ParamMode::Value
        ]
    );
    assert_eq!(p.required_params(), 4);
    assert!(p.accepts_arg_count(4));
    assert!(p.accepts_arg_count(5));
    assert!(!p.accepts_arg_count(3));
}

#[test]
fn test_parse_shared_param_type() {
    let prog = parse_ok("function Add(a, b: Integer): Integer; begin Result := a + b; end;");
    let Item::Routine(f) = &prog.items[0] else {
        panic!("Expected routine");
    };
    assert_eq!(f.kind, RoutineKind::Function);
    assert_eq!(f.params.len(), 2);
    assert_eq!(f.params[1].ty.as_ref().and_then(|t| t.as_name()), Some("Integer"));
}

#[test]
fn test_parse_nested_routine_and_locals() {
    let prog = parse_ok(
        "procedure Outer;
         var n: Integer;
           procedure Inner; begin n += 1; end;
         begin Inner; PrintLn(n); end;",
    );
    let Item::Routine(p) = &prog.items[0] else {
        panic!("Expected routine");
    };
    let body = p.body.as_ref().unwrap();
    assert_eq!(body.nested.len(), 1);
    // local var section becomes a leading statement
    assert!(matches!(body.stmts[0].node, Stmt::Var(_)));
    assert_eq!(body.stmts.len(), 3);
}

#[test]
fn test_parse_forward_declaration() {
    let prog = parse_ok("procedure Later; forward; procedure Later; begin end;");
    let Item::Routine(fwd) = &prog.items[0] else {
        panic!("Expected routine");
    };
    assert!(fwd.directives.is_forward);
    assert!(fwd.body.is_none());
}

#[test]
fn test_parse_contracts_with_old() {
    let prog = parse_ok(
        "procedure Inc(var n: Integer);
         require
           n >= 0 : 'negative';
         begin
           n += 1;
         ensure
           n = old n + 1;
         end;",
    );
    let Item::Routine(p) = &prog.items[0] else {
        panic!("Expected routine");
    };
    assert_eq!(p.require.len(), 1);
    assert!(p.require[0].message.is_some());
    assert_eq!(p.ensure.len(), 1);
    let Expr::Binary { right, .. } = &p.ensure[0].cond.node else {
        panic!("Expected comparison");
    };
    let Expr::Binary { left, .. } = &right.node else {
        panic!("Expected addition");
    };
    assert!(matches!(&left.node, Expr::Old(name) if name.node == "n"));
}

#[test]
fn test_parse_old_is_plain_name_outside_ensure() {
    assert!(matches!(print_arg("PrintLn(old);"), Expr::Ident(ref n) if n == "old"));
}

#[test]
fn test_parse_method_implementation_owner() {
    let prog = parse_ok("procedure TFoo.Show(x: Integer); begin end;");
    let Item::Routine(m) = &prog.items[0] else {
        panic!("Expected routine");
    };
    assert_eq!(m.owner.as_ref().map(|o| o.node.as_str()), Some("TFoo"));
    assert_eq!(m.name.node, "Show");
}

#[test]
fn test_parse_class_method_implementation() {
    let prog = parse_ok("class function TFoo.Make: TFoo; begin Result := TFoo.Create; end;");
    let Item::Routine(m) = &prog.items[0] else {
        panic!("Expected routine");
    };
    assert!(m.is_class);
}

// ============================================
// Types
// ============================================

#[test]
fn test_parse_class_declaration() {
    let class = class_decl(
        "type TAnimal = class(TObject, ISpeaker)
         private
           FName: String;
         public
           constructor Create(AName: String);
           function Speak: String; virtual; abstract;
           procedure Rename(s: String); virtual; overload;
           property Name: String read FName write FName;
         end;",
    );
    assert_eq!(class.parent.as_ref().map(|p| p.node.as_str()), Some("TObject"));
    assert_eq!(class.interfaces.len(), 1);
    assert_eq!(class.members.len(), 5);

    let methods: Vec<&RoutineDecl> = class
        .members
        .iter()
        .filter_map(|m| match m {
            Member::Method(r) => Some(r.as_ref()),
            _ => None,
        })
        .collect();
    assert_eq!(methods[0].kind, RoutineKind::Constructor);
    assert!(methods[1].directives.is_virtual && methods[1].directives.is_abstract);
    assert!(methods[2].directives.is_overload);
    assert!(methods.iter().all(|m| m.body.is_none()));
}

#[test]
fn test_parse_class_modifiers() {
    let class = class_decl("type TShape = class abstract end;");
    assert!(class.is_abstract);
    let class = class_decl("type THost = class external 'Host' end;");
    assert!(class.is_external);
    let class = class_decl("type TLater = class;");
    assert!(class.is_forward);
    let class = class_decl("type EMine = class(Exception);");
    assert!(!class.is_forward);
    assert!(class.members.is_empty());
}

#[test]
fn test_parse_inline_method_body() {
    let class = class_decl(
        "type TCounter = class
           Count: Integer;
           procedure Bump; begin Count += 1; end;
         end;",
    );
    let Member::Method(m) = &class.members[1] else {
        panic!("Expected method");
    };
    assert!(m.body.is_some());
}

#[test]
fn test_parse_class_vars_consts_and_class_methods() {
    let class = class_decl(
        "type TReg = class
           class var Count: Integer := 0;
           Total: Integer;
           const Limit = 10;
           class function Make: TReg;
           class property Size: Integer read Count;
         end;",
    );
    let Member::Field(count) = &class.members[0] else {
        panic!("Expected field");
    };
    assert!(count.is_class);
    assert!(count.init.is_some());
    // fields after `class var` stay in the class-var section
    let Member::Field(total) = &class.members[1] else {
        panic!("Expected field");
    };
    assert!(total.is_class);
    assert!(matches!(class.members[2], Member::Const(_)));
    assert!(matches!(&class.members[3], Member::Method(m) if m.is_class));
    assert!(matches!(&class.members[4], Member::Property(p) if p.is_class));
}

#[test]
fn test_parse_indexed_default_property() {
    let class = class_decl(
        "type TList = class
           function GetItem(i: Integer): String;
           property Items[i: Integer]: String read GetItem; default;
         end;",
    );
    let Member::Property(prop) = &class.members[1] else {
        panic!("Expected property");
    };
    assert_eq!(prop.index_params.len(), 1);
    assert!(prop.is_default);
    assert!(prop.write.is_none());
}

#[test]
fn test_parse_interface() {
    match only_type(
        "type IShape = interface(IBase)
           ['{00000000-0000-0000-0000-000000000001}']
           function Area: Float;
           property Size: Integer read GetSize;
         end;",
    )
    .kind
    {
        TypeDeclKind::Interface(intf) => {
            assert_eq!(intf.parent.map(|p| p.node), Some("IBase".to_string()));
            assert_eq!(intf.methods.len(), 1);
            assert_eq!(intf.properties.len(), 1);
        }
        other => panic!("Expected interface, got {other:?}"),
    }
}

#[test]
fn test_parse_record() {
    match only_type(
        "type TPoint = record
           X, Y: Integer;
           function Sum: Integer; begin Result := X + Y; end;
         end;",
    )
    .kind
    {
        TypeDeclKind::Record(rec) => {
            assert_eq!(rec.members.len(), 2);
            assert!(matches!(&rec.members[0], Member::Field(f) if f.names.len() == 2));
        }
        other => panic!("Expected record, got {other:?}"),
    }
}

#[test]
fn test_parse_helpers() {
    match only_type("type TIntHelper = helper for Integer function Twice: Integer; end;").kind {
        TypeDeclKind::Helper(helper) => {
            assert_eq!(helper.target.as_name(), Some("Integer"));
            assert!(helper.parent.is_none());
        }
        other => panic!("Expected helper, got {other:?}"),
    }
    match only_type("type TMore = record helper(TIntHelper) for Integer end;").kind {
        TypeDeclKind::Helper(helper) => {
            assert_eq!(helper.parent.map(|p| p.node), Some("TIntHelper".to_string()));
        }
        other => panic!("Expected helper, got {other:?}"),
    }
}

#[test]
fn test_parse_type_expressions() {
    let prog = parse_ok(
        "type
           TInts = array of Integer;
           TFixed = array[1..3] of String;
           TFlags = set of Integer;
           TMeta = class of TObject;
           TCmp = function(a, b: Integer): Integer;
           TEvent = procedure(Sender: TObject) of object;",
    );
    let kinds: Vec<&TypeDeclKind> = prog
        .items
        .iter()
        .map(|item| match item {
            Item::Type(decl) => &decl.kind,
            other => panic!("Expected type, got {other:?}"),
        })
        .collect();
    assert_eq!(kinds.len(), 6);
    assert!(matches!(kinds[0], TypeDeclKind::Alias(TypeRef::Array { bounds: None, .. })));
    assert!(matches!(kinds[1], TypeDeclKind::Alias(TypeRef::Array { bounds: Some(_), .. })));
    assert!(matches!(kinds[2], TypeDeclKind::Alias(TypeRef::Set(_))));
    assert!(matches!(kinds[3], TypeDeclKind::Alias(TypeRef::ClassOf(n)) if n == "TObject"));
    assert!(matches!(
        kinds[4],
        TypeDeclKind::Alias(TypeRef::Routine { ret: Some(_), of_object: false, .. })
    ));
    assert!(matches!(
        kinds[5],
        TypeDeclKind::Alias(TypeRef::Routine { ret: None, of_object: true, .. })
    ));
}

fn enum_decl(source: &str) -> EnumDecl {
    match only_type(source).kind {
        TypeDeclKind::Enum(decl) => decl,
        other => panic!("Expected enum, got {other:?}"),
    }
}

#[test]
fn test_parse_enum_types() {
    let plain = enum_decl("type TColor = (Red, Green, Blue);");
    assert_eq!(plain.kind, EnumKind::Plain);
    let names: Vec<_> = plain.members.iter().map(|m| m.name.node.as_str()).collect();
    assert_eq!(names, ["Red", "Green", "Blue"]);
    assert!(plain.members.iter().all(|m| m.value.is_none()));

    let valued = enum_decl("type TLevel = (Low, Medium = 5, High);");
    assert!(valued.members[0].value.is_none());
    assert!(matches!(valued.members[1].value.as_ref().map(|v| &v.node), Some(Expr::IntLit(5))));

    assert_eq!(enum_decl("type TMode = enum (Idle, Busy);").kind, EnumKind::Scoped);
    assert_eq!(enum_decl("type TBits = flags (A, B, C);").kind, EnumKind::Flags);
}

#[test]
fn test_parse_enum_requires_closing_paren() {
    assert!(parse_fails("type TColor = (Red, Green;"));
    assert!(parse_fails("type TColor = ();"));
}

// ============================================
// Errors and spans
// ============================================

#[test]
fn test_parse_error_missing_semicolon() {
    let err = parse_program("x := 1\ny := 2;").unwrap_err();
    assert!(err.message().starts_with("expected ';'"), "{}", err.message());
    let span = err.span().unwrap();
    assert_eq!((span.line, span.column), (2, 1));
}

#[test]
fn test_parse_error_at_end_of_input() {
    let src = "begin PrintLn(1);";
    let err = parse_program(src).unwrap_err();
    assert_eq!(err.message(), "expected 'end', found end of input");
    assert_eq!(err.span().unwrap().start, src.len());
}

#[test]
fn test_parse_error_bad_class_member() {
    let err = parse_program("type T = class 42 end;").unwrap_err();
    assert!(err.message().starts_with("expected class member"));
}

#[test]
fn test_parse_expression_spans() {
    let prog = parse_ok("x := foo(1,\n  bar);");
    let Item::Stmt(stmt) = &prog.items[0] else {
        panic!("Expected statement");
    };
    let Stmt::Assign { value, .. } = &stmt.node else {
        panic!("Expected assignment");
    };
    assert_eq!((value.span.line, value.span.column), (1, 6));
    assert_eq!(&"x := foo(1,\n  bar);"[value.span.start..value.span.end], "foo(1,\n  bar)");
}

#[test]
fn test_lexer_rejects_stray_character() {
    assert!(parse_fails("x := 1 ? 2;"));
}
