//! Fixture-driven lex -> parse -> check scenarios exercising the full
//! pipeline through the public API.

use oslc::ast::{NodeId, NodeKind, Program};
use oslc::diagnostics::{CollectingSink, DiagnosticSink};
use oslc::lexer::Lexer;
use oslc::parser::Parser;
use oslc::type_table::TypeTable;
use oslc::typechecker::TypeChecker;
use std::path::PathBuf;

fn compile(src: &str) -> (Program, CollectingSink) {
    let mut sink = CollectingSink::new();
    let tokens = Lexer::new("fixture.osl", src).tokenize(&mut sink);
    let mut program = Parser::new(tokens, &mut sink).parse();
    let mut table = TypeTable::new();
    let mut checker = TypeChecker::new(&mut table, &mut program.arena, &mut sink, PathBuf::from("fixture.osl"));
    checker.check_program(&program.decls, true);
    (program, sink)
}

fn variable(program: &Program, decl_index: usize) -> NodeId {
    match &program.arena.get(program.decls[decl_index]).kind {
        NodeKind::VariableGroup { vars, .. } => vars[0],
        other => panic!("expected a variable group, found {:?}", other),
    }
}

#[test]
fn int_to_float_initialiser_is_clean_and_carries_a_cast() {
    let (program, sink) = compile("int a = 1; float b = a;");
    assert_eq!(sink.error_count(), 0);
    assert_eq!(sink.warn_count(), 0);

    let b = variable(&program, 1);
    match &program.arena.get(b).kind {
        NodeKind::Variable { init: Some(init), .. } => {
            assert!(matches!(&program.arena.get(*init).kind, NodeKind::ImplicitCoercion { .. }));
        }
        other => panic!("{:?}", other),
    }
}

#[test]
fn overload_resolution_picks_exact_int_match() {
    let (_program, sink) = compile(
        "float f(float x) { return x; } float f(int x) { return x; } float y = f(1);",
    );
    assert_eq!(sink.error_count(), 0);
}

#[test]
fn overload_resolution_breaks_argument_ties_with_return_type() {
    let (_program, sink) = compile(
        "float g(float x) { return x; } int g(int x) { return x; } float y = g(1.0);",
    );
    assert_eq!(sink.error_count(), 0);
}

#[test]
fn color_component_projection_yields_float_with_index_zero() {
    let (program, sink) = compile("color c = color(1.0, 2.0, 3.0); float r = c.r;");
    assert_eq!(sink.error_count(), 0);

    let r = variable(&program, 1);
    match &program.arena.get(r).kind {
        NodeKind::Variable { init: Some(init), .. } => match &program.arena.get(*init).kind {
            NodeKind::Projection { field_index, .. } => assert_eq!(*field_index, Some(0)),
            other => panic!("{:?}", other),
        },
        other => panic!("{:?}", other),
    }
}

#[test]
fn zero_sized_array_dimension_is_rejected() {
    let (_program, sink) = compile("int a[0];");
    assert!(sink.error_count() >= 1);
}

#[test]
fn void_typed_parameter_is_rejected() {
    let (_program, sink) = compile("void h(output void z) {}");
    assert!(sink.error_count() >= 1);
}

#[test]
fn a_struct_field_round_trips_through_an_assignment() {
    let (_program, sink) = compile(
        "struct Pair { float x; float y; };
         void f() { Pair p; p.x = 1.0; p.y = p.x; }",
    );
    assert_eq!(sink.error_count(), 0);
}

#[test]
fn warns_as_errors_promotes_lossy_conversion_warning() {
    let mut sink = CollectingSink::new();
    sink.warns_as_errors = true;
    let tokens = Lexer::new("fixture.osl", "float f = 1.5; int a = (int) f;").tokenize(&mut sink);
    let mut program = Parser::new(tokens, &mut sink).parse();
    let mut table = TypeTable::new();
    let mut checker = TypeChecker::new(&mut table, &mut program.arena, &mut sink, PathBuf::from("fixture.osl"));
    checker.check_program(&program.decls, true);

    assert_eq!(sink.warn_count(), 0, "warning must be promoted to an error, not also counted as a warning");
    assert!(sink.error_count() >= 1);
}

#[test]
fn shader_parameter_requires_an_initialiser() {
    let (_program, sink) = compile("shader s(float x) {}");
    assert!(sink.error_count() >= 1);
}

#[test]
fn unknown_identifier_is_reported_once_per_use() {
    let (_program, sink) = compile("void f() { int a = undeclared_name; }");
    assert_eq!(sink.error_count(), 1);
}
