//! Generación de código.
//!
//! El AST enlazado se recorre una única vez en postorden y se emite
//! ensamblador x86-64 conforme se avanza. Toda expresión deja su valor
//! en `%rax`; los valores intermedios se preservan en el stack con
//! `push`/`pop`, por lo cual no hay asignación de registros.
//!
//! El listado completo consiste de, en orden: la sección de strings, la
//! sección de variables globales, una rutina por función, el punto de
//! entrada `main` y rutinas auxiliares que llaman a la biblioteca de C
//! con el stack alineado.

use std::io::{self, Write};

use thiserror::Error;
use tracing::debug;

use crate::{
    arch::{
        x86_64::{local_offset, parameter_offset, Address, Reg, VALUE_SIZE},
        Directives,
    },
    link::Platform,
    symbols::{StringList, Symbol, SymbolKind, Tables},
    tree::{Node, NodeKind, ShapeError},
};

mod expressions;
mod statements;

pub type Codegen<T> = Result<T, CodegenError>;

/// Error de generación de código.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("Program contains no functions")]
    NoFunctions,

    #[error("Symbol `{0}` is undefined")]
    Undefined(String),

    #[error("Expected a variable, but `{name}` is a {found}")]
    ExpectedVariable { name: String, found: SymbolKind },

    #[error("Expected an array, but `{name}` is a {found}")]
    ExpectedArray { name: String, found: SymbolKind },

    #[error("Expected a function, but `{name}` is a {found}")]
    ExpectedFunction { name: String, found: SymbolKind },

    #[error("Function `{name}` takes {expected} argument(s), but {found} were supplied")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Length of array `{0}` is not a non-negative integer literal")]
    ArrayLength(String),

    #[error("`break` outside of a loop")]
    BreakOutsideLoop,

    #[error("Unknown relation `{0}`")]
    UnknownRelation(String),

    #[error("Unknown operator `{op}` with {arity} operand(s)")]
    UnknownOperator { op: String, arity: usize },

    #[error("Unexpected {kind} node in {context}")]
    UnexpectedNode {
        kind: NodeKind,
        context: &'static str,
    },

    #[error("String literal was not interned")]
    Uninterned,

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Funciones de la biblioteca de C que se invocan a través de `safe_<nombre>`.
const LIBC: &[&str] = &["printf", "putchar", "puts", "strtol", "exit"];

/// Emite el programa completo.
///
/// La primera función declarada es el punto de entrada. El listado se
/// escribe a `output` solo si la generación concluye sin errores.
pub fn emit<W: Write>(
    root: &Node,
    tables: &Tables,
    strings: &StringList,
    platform: Platform,
    output: &mut W,
) -> Codegen<()> {
    let mut listing = Vec::new();
    generate(root, tables, strings, platform, &mut listing)?;

    output.write_all(&listing)?;
    output.flush()?;

    Ok(())
}

fn generate(
    root: &Node,
    tables: &Tables,
    strings: &StringList,
    platform: Platform,
    output: &mut Vec<u8>,
) -> Codegen<()> {
    let (_, entry) = tables
        .functions()
        .next()
        .ok_or(CodegenError::NoFunctions)?;

    let directives = platform.directives();
    let mut cx = Context {
        output,
        tables,
        strings,
        root,
        parameters: 0,
        if_counter: 0,
        while_counter: 0,
        loops: Vec::new(),
    };

    cx.string_table(directives)?;
    cx.global_variables(directives)?;

    directive!(cx, ".text")?;
    for (_, function) in tables.functions() {
        cx.function(function)?;
    }

    cx.entry(entry)?;
    cx.trampolines()?;

    for declaration in directives.declarations {
        directive!(cx, "{}", declaration)?;
    }

    Ok(())
}

/// Estado de generación.
pub struct Context<'a, W> {
    output: &'a mut W,
    tables: &'a Tables,
    strings: &'a StringList,
    root: &'a Node,

    /// Aridad de la función en generación.
    parameters: usize,

    if_counter: usize,
    while_counter: usize,

    /// Números de los `while` abiertos, el más interno al final.
    loops: Vec<usize>,
}

impl<'a, W: Write> Context<'a, W> {
    fn string_table(&mut self, directives: &Directives) -> Codegen<()> {
        directive!(self, ".section {}", directives.string_section)?;
        directive!(self, "intout: .asciz \"%ld \"")?;
        directive!(self, "strout: .asciz \"%s \"")?;
        directive!(self, "errout: .asciz \"Wrong number of arguments\"")?;

        for (index, string) in self.strings.iter().enumerate() {
            directive!(self, "string{}: \t.asciz {}", index, string)?;
        }

        Ok(())
    }

    fn global_variables(&mut self, directives: &Directives) -> Codegen<()> {
        directive!(self, ".section {}", directives.bss_section)?;
        directive!(self, ".align {}", VALUE_SIZE)?;

        for symbol in self.tables.globals.iter() {
            match symbol.kind {
                SymbolKind::GlobalVar => {
                    directive!(self, ".{}: \t.zero {}", symbol.name, VALUE_SIZE)?;
                }

                SymbolKind::GlobalArray => {
                    let size = self
                        .declaration(symbol)
                        .and_then(|node| node.children.get(1))
                        .and_then(Node::value)
                        .filter(|&length| length >= 0)
                        .and_then(|length| length.checked_mul(VALUE_SIZE))
                        .ok_or_else(|| CodegenError::ArrayLength(symbol.name.to_string()))?;

                    directive!(self, ".{}: \t.zero {}", symbol.name, size)?;
                }

                _ => (),
            }
        }

        Ok(())
    }

    fn function(&mut self, function: &Symbol) -> Codegen<()> {
        let node = self
            .declaration(function)
            .ok_or_else(|| CodegenError::Undefined(function.name.to_string()))?;

        let [_, _, body] = node.children_exactly::<3>()?;
        let locals = function
            .locals
            .as_ref()
            .map_or(0, |table| table.count(SymbolKind::LocalVar));

        self.parameters = function.arity();
        debug!(
            function = %function.name,
            parameters = self.parameters,
            locals,
            "generating function"
        );

        label!(self, ".{}", function.name)?;
        emit!(self, "pushq", "{}", Reg::Rbp)?;
        emit!(self, "movq", "{}, {}", Reg::Rsp, Reg::Rbp)?;

        // Parámetros en registros pasan al frame, seguidos de las locales en cero
        for register in Reg::argument_sequence().take(self.parameters) {
            emit!(self, "pushq", "{}", register)?;
        }

        for _ in 0..locals {
            emit!(self, "pushq", "$0")?;
        }

        self.statement(body)?;

        if !ends_in_return(body) {
            emit!(self, "movq", "$0, {}", Reg::Rax)?;
            self.epilogue()?;
        }

        Ok(())
    }

    fn epilogue(&mut self) -> Codegen<()> {
        emit!(self, "movq", "{}, {}", Reg::Rbp, Reg::Rsp)?;
        emit!(self, "popq", "{}", Reg::Rbp)?;
        emit!(self, "ret")?;

        Ok(())
    }

    /// Punto de entrada del proceso.
    ///
    /// Valida la cantidad de argumentos, los convierte a enteros e
    /// invoca a la función de entrada con ellos. El valor que esta
    /// retorna es el código de salida.
    fn entry(&mut self, first: &Symbol) -> Codegen<()> {
        let expected = first.arity();

        label!(self, "main")?;
        emit!(self, "pushq", "{}", Reg::Rbp)?;
        emit!(self, "movq", "{}, {}", Reg::Rsp, Reg::Rbp)?;

        // argc incluye el nombre del ejecutable
        emit!(self, "subq", "$1, {}", Reg::Rdi)?;
        emit!(self, "cmpq", "${}, {}", expected, Reg::Rdi)?;
        emit!(self, "jne", "ABORT")?;

        if expected > 0 {
            // Se recorre argv de derecha a izquierda, con %rcx como contador de `loop`
            emit!(self, "addq", "${}, {}", expected as i64 * VALUE_SIZE, Reg::Rsi)?;
            emit!(self, "movq", "{}, {}", Reg::Rdi, Reg::Rcx)?;

            label!(self, "PARSE_ARGV")?;
            emit!(self, "pushq", "{}", Reg::Rsi)?;
            emit!(self, "pushq", "{}", Reg::Rcx)?;

            emit!(self, "movq", "({}), {}", Reg::Rsi, Reg::Rdi)?;
            emit!(self, "movq", "$0, {}", Reg::Rsi)?;
            emit!(self, "movq", "$10, {}", Reg::Rdx)?;
            emit!(self, "call", "safe_strtol")?;

            emit!(self, "popq", "{}", Reg::Rcx)?;
            emit!(self, "popq", "{}", Reg::Rsi)?;
            emit!(self, "pushq", "{}", Reg::Rax)?;

            emit!(self, "subq", "${}, {}", VALUE_SIZE, Reg::Rsi)?;
            emit!(self, "loop", "PARSE_ARGV")?;

            for register in Reg::argument_sequence().take(expected) {
                emit!(self, "popq", "{}", register)?;
            }
        }

        emit!(self, "call", ".{}", first.name)?;
        emit!(self, "movq", "{}, {}", Reg::Rax, Reg::Rdi)?;
        emit!(self, "call", "safe_exit")?;

        label!(self, "ABORT")?;
        emit!(self, "leaq", "errout({}), {}", Reg::Rip, Reg::Rdi)?;
        emit!(self, "call", "safe_puts")?;
        emit!(self, "movq", "$1, {}", Reg::Rdi)?;
        emit!(self, "call", "safe_exit")?;

        Ok(())
    }

    /// Envoltorios que alinean `%rsp` a 16 bytes antes de entrar a libc.
    fn trampolines(&mut self) -> Codegen<()> {
        for function in LIBC {
            label!(self, "safe_{}", function)?;
            emit!(self, "pushq", "{}", Reg::Rbp)?;
            emit!(self, "movq", "{}, {}", Reg::Rsp, Reg::Rbp)?;
            emit!(self, "andq", "$-16, {}", Reg::Rsp)?;

            // Funciones variádicas esperan en %al la cantidad de registros vectoriales
            emit!(self, "movq", "$0, {}", Reg::Rax)?;
            emit!(self, "call", "{}", function)?;
            self.epilogue()?;
        }

        Ok(())
    }

    /// Nodo declarante de un símbolo global.
    fn declaration(&self, symbol: &Symbol) -> Option<&'a Node> {
        symbol
            .node
            .and_then(|position| self.root.children.get(position))
    }

    /// Resuelve el símbolo enlazado a un identificador.
    fn symbol(&self, identifier: &Node) -> Codegen<&'a Symbol> {
        let name = identifier.expect_name()?;
        identifier
            .symbol
            .and_then(|id| self.tables.get(id))
            .ok_or_else(|| CodegenError::Undefined(name.to_owned()))
    }

    /// Dirección de una variable escalar.
    fn variable(&self, identifier: &Node) -> Codegen<Address<'a>> {
        let symbol = self.symbol(identifier)?;
        let address = match symbol.kind {
            SymbolKind::GlobalVar => Address::Global(&symbol.name),
            SymbolKind::Parameter => Address::Frame(parameter_offset(symbol.sequence)),
            SymbolKind::LocalVar => {
                Address::Frame(local_offset(symbol.sequence, self.parameters))
            }

            found => {
                return Err(CodegenError::ExpectedVariable {
                    name: symbol.name.to_string(),
                    found,
                })
            }
        };

        Ok(address)
    }
}

/// Determina si el último enunciado alcanzable de un cuerpo es un `return`.
fn ends_in_return(node: &Node) -> bool {
    match node.kind {
        NodeKind::ReturnStatement => true,
        NodeKind::Block | NodeKind::StatementList => {
            node.children.last().map_or(false, ends_in_return)
        }

        _ => false,
    }
}
