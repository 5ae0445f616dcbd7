use std::{
    io::Write,
    path::{Path, PathBuf},
    process::Command,
};

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use unindent::unindent;
use vslc::{
    compile,
    error::CompileError,
    link::{LinkOptions, Linker, Platform},
    parse::read_str,
    target::CodegenError,
};

/// `for i in 0..3 print i`, tal como lo entrega el parser.
const FOR_LOOP: &str = r#"
    PROGRAM
     GLOBAL_LIST
      GLOBAL
       FUNCTION
        IDENTIFIER_DATA(main)
        PARAMETER_LIST
        STATEMENT
         BLOCK
          STATEMENT_LIST
           STATEMENT_LIST
            STATEMENT
             FOR_STATEMENT
              IDENTIFIER_DATA(i)
              EXPRESSION
               NUMBER_DATA(0)
              EXPRESSION
               NUMBER_DATA(3)
              STATEMENT
               PRINT_STATEMENT
                PRINT_LIST
                 PRINT_ITEM
                  EXPRESSION
                   IDENTIFIER_DATA(i)
           STATEMENT
            RETURN_STATEMENT
             EXPRESSION
              NUMBER_DATA(0)
"#;

/// El mismo programa, escrito a mano con `while`.
const WHILE_LOOP: &str = r#"
    GLOBAL_LIST
     FUNCTION
      IDENTIFIER_DATA(main)
      PARAMETER_LIST
      BLOCK
       DECLARATION_LIST
        DECLARATION
         IDENTIFIER_DATA(i)
       STATEMENT_LIST
        ASSIGNMENT_STATEMENT
         IDENTIFIER_DATA(i)
         NUMBER_DATA(0)
        WHILE_STATEMENT
         RELATION(<)
          IDENTIFIER_DATA(i)
          NUMBER_DATA(3)
         BLOCK
          STATEMENT_LIST
           PRINT_STATEMENT
            IDENTIFIER_DATA(i)
           ASSIGNMENT_STATEMENT
            IDENTIFIER_DATA(i)
            EXPRESSION(+)
             IDENTIFIER_DATA(i)
             NUMBER_DATA(1)
        RETURN_STATEMENT
         NUMBER_DATA(0)
"#;

const FIBONACCI: &str = r#"
    GLOBAL_LIST
     FUNCTION
      IDENTIFIER_DATA(main)
      PARAMETER_LIST
       IDENTIFIER_DATA(n)
      BLOCK
       STATEMENT_LIST
        PRINT_STATEMENT
         STRING_DATA("fib")
         EXPRESSION(call)
          IDENTIFIER_DATA(fib)
          ARGUMENT_LIST
           IDENTIFIER_DATA(n)
        RETURN_STATEMENT
         NUMBER_DATA(0)
     FUNCTION
      IDENTIFIER_DATA(fib)
      PARAMETER_LIST
       IDENTIFIER_DATA(n)
      IF_STATEMENT
       RELATION(<)
        IDENTIFIER_DATA(n)
        NUMBER_DATA(2)
       RETURN_STATEMENT
        IDENTIFIER_DATA(n)
       RETURN_STATEMENT
        EXPRESSION(+)
         EXPRESSION(call)
          IDENTIFIER_DATA(fib)
          ARGUMENT_LIST
           EXPRESSION(-)
            IDENTIFIER_DATA(n)
            NUMBER_DATA(1)
         EXPRESSION(call)
          IDENTIFIER_DATA(fib)
          ARGUMENT_LIST
           EXPRESSION(-)
            IDENTIFIER_DATA(n)
            NUMBER_DATA(2)
"#;

/// Ocho parámetros, un arreglo global y `break`.
const STACK_ARGUMENTS: &str = r#"
    GLOBAL_LIST
     ARRAY_DECLARATION
      IDENTIFIER_DATA(v)
      NUMBER_DATA(8)
     FUNCTION
      IDENTIFIER_DATA(main)
      PARAMETER_LIST
      BLOCK
       DECLARATION_LIST
        DECLARATION
         IDENTIFIER_DATA(i)
       STATEMENT_LIST
        ASSIGNMENT_STATEMENT
         IDENTIFIER_DATA(i)
         NUMBER_DATA(0)
        WHILE_STATEMENT
         RELATION(!=)
          IDENTIFIER_DATA(i)
          NUMBER_DATA(100)
         BLOCK
          STATEMENT_LIST
           IF_STATEMENT
            RELATION(=)
             IDENTIFIER_DATA(i)
             NUMBER_DATA(8)
            BREAK_STATEMENT
           ASSIGNMENT_STATEMENT
            ARRAY_INDEXING
             IDENTIFIER_DATA(v)
             IDENTIFIER_DATA(i)
            EXPRESSION(*)
             IDENTIFIER_DATA(i)
             IDENTIFIER_DATA(i)
           ASSIGNMENT_STATEMENT
            IDENTIFIER_DATA(i)
            EXPRESSION(+)
             IDENTIFIER_DATA(i)
             NUMBER_DATA(1)
        RETURN_STATEMENT
         EXPRESSION(call)
          IDENTIFIER_DATA(sum)
          ARGUMENT_LIST
           ARRAY_INDEXING
            IDENTIFIER_DATA(v)
            NUMBER_DATA(0)
           ARRAY_INDEXING
            IDENTIFIER_DATA(v)
            NUMBER_DATA(1)
           ARRAY_INDEXING
            IDENTIFIER_DATA(v)
            NUMBER_DATA(2)
           ARRAY_INDEXING
            IDENTIFIER_DATA(v)
            NUMBER_DATA(3)
           ARRAY_INDEXING
            IDENTIFIER_DATA(v)
            NUMBER_DATA(4)
           ARRAY_INDEXING
            IDENTIFIER_DATA(v)
            NUMBER_DATA(5)
           ARRAY_INDEXING
            IDENTIFIER_DATA(v)
            NUMBER_DATA(6)
           EXPRESSION(/)
            ARRAY_INDEXING
             IDENTIFIER_DATA(v)
             NUMBER_DATA(7)
            NUMBER_DATA(7)
     FUNCTION
      IDENTIFIER_DATA(sum)
      PARAMETER_LIST
       IDENTIFIER_DATA(a)
       IDENTIFIER_DATA(b)
       IDENTIFIER_DATA(c)
       IDENTIFIER_DATA(d)
       IDENTIFIER_DATA(e)
       IDENTIFIER_DATA(f)
       IDENTIFIER_DATA(g)
       IDENTIFIER_DATA(h)
      BLOCK
       DECLARATION_LIST
        DECLARATION
         IDENTIFIER_DATA(total)
       STATEMENT_LIST
        ASSIGNMENT_STATEMENT
         IDENTIFIER_DATA(total)
         EXPRESSION(+)
          EXPRESSION(+)
           EXPRESSION(+)
            IDENTIFIER_DATA(a)
            IDENTIFIER_DATA(b)
           EXPRESSION(+)
            IDENTIFIER_DATA(c)
            IDENTIFIER_DATA(d)
          EXPRESSION(+)
           EXPRESSION(+)
            IDENTIFIER_DATA(e)
            IDENTIFIER_DATA(f)
           EXPRESSION(-)
            IDENTIFIER_DATA(g)
            EXPRESSION(-)
             IDENTIFIER_DATA(h)
        RETURN_STATEMENT
         IDENTIFIER_DATA(total)
"#;

fn assemble(dump: &str) -> Result<String, CompileError> {
    let tree = read_str("test", &unindent(dump)).unwrap();

    let mut output = Vec::new();
    compile(tree, Platform::Linux, &mut output)?;

    Ok(String::from_utf8(output).unwrap())
}

/// Solo es posible ejecutar en x86-64 Linux y con un compilador de C presente.
fn can_execute() -> bool {
    let cc = Command::new("cc")
        .arg("--version")
        .output()
        .map_or(false, |output| output.status.success());

    cfg!(all(target_os = "linux", target_arch = "x86_64")) && cc
}

fn build(dump: &str) -> Option<(TempDir, PathBuf)> {
    if !can_execute() {
        eprintln!("skipping: unable to assemble and run x86-64 Linux executables");
        return None;
    }

    let assembly = assemble(dump).unwrap();
    let dir = tempfile::tempdir().expect("Unable to create temporary directory");
    let executable = dir.path().join("program");

    let mut linker = Linker::spawn(Platform::Linux, &executable, LinkOptions::empty()).unwrap();
    linker.stdin().write_all(assembly.as_bytes()).unwrap();
    linker.finish().unwrap();

    Some((dir, executable))
}

fn run(executable: &Path, args: &[&str]) -> (String, Option<i32>) {
    let output = Command::new(executable).args(args).output().unwrap();
    (String::from_utf8(output.stdout).unwrap(), output.status.code())
}

#[test]
fn for_loop_behaves_like_its_while_loop() {
    let (_for_dir, for_loop) = match build(FOR_LOOP) {
        Some(built) => built,
        None => return,
    };

    let (_while_dir, while_loop) = build(WHILE_LOOP).unwrap();

    let expected = ("0 \n1 \n2 \n".to_owned(), Some(0));
    assert_eq!(run(&for_loop, &[]), expected);
    assert_eq!(run(&while_loop, &[]), expected);
}

#[test]
fn arguments_reach_the_entry_function() {
    let (_dir, fibonacci) = match build(FIBONACCI) {
        Some(built) => built,
        None => return,
    };

    assert_eq!(run(&fibonacci, &["10"]), ("fib 55 \n".to_owned(), Some(0)));
    assert_eq!(run(&fibonacci, &["1"]), ("fib 1 \n".to_owned(), Some(0)));
}

#[test]
fn wrong_argument_count_aborts() {
    let (_dir, fibonacci) = match build(FIBONACCI) {
        Some(built) => built,
        None => return,
    };

    let (stdout, status) = run(&fibonacci, &["1", "2"]);
    assert_eq!(stdout, "Wrong number of arguments\n");
    assert_eq!(status, Some(1));
}

#[test]
fn stack_arguments_and_arrays() {
    let (_dir, program) = match build(STACK_ARGUMENTS) {
        Some(built) => built,
        None => return,
    };

    // 0 + 1 + 4 + 9 + 16 + 25 + 36 + 49 / 7
    assert_eq!(run(&program, &[]), (String::new(), Some(98)));
}

#[test]
fn for_loops_desugar_into_while_loops() {
    let desugared = assemble(FOR_LOOP).unwrap();
    let manual = assemble(WHILE_LOOP).unwrap();

    // El límite oculta una local más, por lo demás el listado coincide en estructura
    assert!(desugared.contains("_WHILE0:"));
    assert!(desugared.contains("_WHILEEND0:"));
    assert_eq!(desugared.matches("pushq   $0").count(), 2);
    assert_eq!(manual.matches("pushq   $0").count(), 1);
}

#[test]
fn output_is_deterministic() {
    assert_eq!(assemble(FIBONACCI).unwrap(), assemble(FIBONACCI).unwrap());
}

#[test]
fn strings_are_emitted_once() {
    let assembly = assemble(FIBONACCI).unwrap();
    assert_eq!(assembly.matches(".asciz \"fib\"").count(), 1);
}

#[test]
fn argument_mismatch_is_a_compile_error() {
    let dump = FIBONACCI.replacen(
        "ARGUMENT_LIST\n           IDENTIFIER_DATA(n)",
        "ARGUMENT_LIST",
        1,
    );

    let tree = read_str("test", &unindent(&dump)).unwrap();
    let mut output = Vec::new();

    match compile(tree, Platform::Linux, &mut output) {
        Err(CompileError::Codegen(CodegenError::ArgumentCount {
            name,
            expected,
            found,
        })) => {
            assert_eq!(name, "fib");
            assert_eq!((expected, found), (1, 0));
        }

        other => panic!("expected an argument count error, got {:?}", other),
    }

    // `main` se genera antes de detectar el error, pero nada llega a la salida
    assert!(output.is_empty());
}
