//! Black-box tests against the public `rlox::vm::VM` entry point, exercising
//! the source-to-output scenarios named in spec.md §8.

use rlox::error::InterpretationError;
use rlox::vm::VM;

fn run(source: &str) -> rlox::Result<String> {
    let mut vm = VM::new();
    let mut out = String::new();
    vm.interpret_with_output(source, &mut out)?;
    Ok(out)
}

#[test]
fn arithmetic_precedence() {
    assert_eq!("7\n", run("print 1 + 2 * 3;").unwrap());
}

#[test]
fn string_concatenation_with_variables() {
    let source = r#"var a = "foo"; var b = "bar"; print a + b;"#;
    assert_eq!("foobar\n", run(source).unwrap());
}

#[test]
fn while_loop_prints_three_lines() {
    let source = "var x = 0; while (x < 3) { print x; x = x + 1; }";
    assert_eq!("0\n1\n2\n", run(source).unwrap());
}

#[test]
fn if_else_picks_the_true_branch() {
    let source = r#"if (1 < 2) print "yes"; else print "no";"#;
    assert_eq!("yes\n", run(source).unwrap());
}

#[test]
fn nested_blocks_shadow_independently() {
    let source = "{ var x = 1; { var x = 2; print x; } print x; }";
    assert_eq!("2\n1\n", run(source).unwrap());
}

#[test]
fn interned_strings_compare_equal_by_identity() {
    assert_eq!("true\n", run(r#"print "a" == "a";"#).unwrap());
}

#[test]
fn reading_local_in_its_own_initializer_is_a_compile_error() {
    let result = run("{ var x = x; }");
    assert!(matches!(result, Err(InterpretationError::CompileError)));
}

#[test]
fn redeclaring_a_name_in_the_same_scope_is_a_compile_error() {
    let result = run("{ var a; var a; }");
    assert!(matches!(result, Err(InterpretationError::CompileError)));
}

#[test]
fn assigning_to_a_non_lvalue_is_a_compile_error() {
    let result = run("1 + 2 = 3;");
    assert!(matches!(result, Err(InterpretationError::CompileError)));
}

#[test]
fn reading_an_undefined_global_is_a_runtime_error() {
    let result = run("print undefined_name;");
    assert!(matches!(result, Err(InterpretationError::RuntimeError)));
}

#[test]
fn adding_a_number_and_a_string_is_a_runtime_error() {
    let result = run(r#"print 1 + "x";"#);
    assert!(matches!(result, Err(InterpretationError::RuntimeError)));
}

#[test]
fn a_vm_instance_keeps_globals_across_separate_interpret_calls() {
    let mut vm = VM::new();
    let mut out = String::new();
    vm.interpret_with_output("var counter = 0;", &mut out).unwrap();
    vm.interpret_with_output("counter = counter + 1;", &mut out)
        .unwrap();
    vm.interpret_with_output("print counter;", &mut out).unwrap();
    assert_eq!("1\n", out);
}
