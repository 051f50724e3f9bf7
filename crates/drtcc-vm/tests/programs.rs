//! End-to-end tests: source text through the lexer/parser/codegen pipeline
//! and into the virtual machine, checking the process exit status `main`'s
//! `return` value produces.

use drtcc_codegen::generate;
use drtcc_vm::{Vm, VmConfig};

fn run(src: &str) -> i32 {
    let mut parsed = drtcc_parser::parse(src).expect("parses");
    assert!(parsed.lex_errors.is_empty(), "{:?}", parsed.lex_errors);
    let out = generate(&parsed.ast, &mut parsed.interner, parsed.root).expect("generates");
    let mut vm = Vm::new(&out.text, &out.data, VmConfig::default());
    vm.exec(out.main_entry, &[]).expect("runs to completion")
}

#[test]
fn arithmetic_honors_precedence() {
    assert_eq!(run("int main(){ return 1 + 2 * 3; }"), 7);
}

#[test]
fn while_loop_accumulates() {
    let src = "int main(){ int i; int s; i=0; s=0; while(i<5){ s=s+i; i=i+1; } return s; }";
    assert_eq!(run(src), 10);
}

#[test]
fn recursive_fibonacci() {
    let src = "int fib(int n){ if (n < 2) return n; return fib(n-1) + fib(n-2); } \
               int main(){ return fib(10); }";
    assert_eq!(run(src), 55);
}

#[test]
fn pointer_arithmetic_over_malloced_memory() {
    let src = "int main(){ int *p; p = malloc(8); *p = 42; *(p+1) = 43; return *p + *(p+1); }";
    assert_eq!(run(src), 85);
}

#[test]
fn string_literal_indexing() {
    let src = r#"int main(){ char *s; s = "ab"; return s[0] + s[1]; }"#;
    assert_eq!(run(src), 'a' as i32 + 'b' as i32);
}

#[test]
fn enum_members_are_usable_constants() {
    let src = "enum { A, B, C }; int main(){ return C - A; }";
    assert_eq!(run(src), 2);
}

#[test]
fn ternary_and_if_else_select_correctly() {
    let src = "int main(){ int i; i = 0; if (i < 1) { i = 2; } else { i = 3; } return i ? 1 : 0; }";
    assert_eq!(run(src), 1);
}

#[test]
fn explicit_exit_call_halts_with_its_argument() {
    let src = "int main(){ exit(7); return 0; }";
    assert_eq!(run(src), 7);
}

#[test]
fn printf_reports_the_rendered_byte_count() {
    let src = r#"int main(){ return printf("hi\n"); }"#;
    assert_eq!(run(src), 3);
}

#[test]
fn out_of_memory_surfaces_as_a_fault() {
    let src = "int main(){ int *p; p = malloc(999999); return 0; }";
    let mut parsed = drtcc_parser::parse(src).expect("parses");
    let out = generate(&parsed.ast, &mut parsed.interner, parsed.root).expect("generates");
    let mut vm = Vm::new(&out.text, &out.data, VmConfig { heap_pages: 1, ..VmConfig::default() });
    assert!(vm.exec(out.main_entry, &[]).is_err());
}
