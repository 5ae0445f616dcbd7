//! Compilador para VSL.
//!
//! # Entrada
//! El análisis léxico y sintáctico de VSL ocurre fuera de este crate.
//! Cada programa llega como el volcado textual de su árbol de parsing,
//! el cual se reconstruye en [`parse`]. Las ubicaciones dentro del
//! volcado se rastrean por medio de [`source`] para reportar errores.
//!
//! # Fases
//! El árbol de parsing se reduce a un AST en [`simplify`], donde
//! desaparecen nodos puramente gramaticales, se aplanan listas, se
//! pliegan constantes y se reescriben los ciclos `for`. Luego
//! [`semantic`] construye las tablas de símbolos descritas en
//! [`symbols`] y enlaza cada identificador del AST con su declaración.
//!
//! # Back end
//! La generación de código en [`target`] emite ensamblador x86-64 para
//! la ABI System V. Las diferencias entre plataformas se limitan a
//! nombres de secciones y símbolos. El ensamblado y enlazado se delegan
//! al compilador de C del sistema en [`link`].

#[macro_use]
mod macros;

pub mod error;
pub mod link;
pub mod parse;
pub mod semantic;
pub mod simplify;
pub mod source;
pub mod symbols;
pub mod tree;

mod arch;
mod codegen;

use std::io::Write;

use tracing::info;

use crate::{error::CompileError, link::Platform, semantic::Resolution, tree::Node};

/// Emisión de código.
///
/// Este módulo reexporta suficientes ítems internos relacionados a generación de código para
/// traducir un AST enlazado a ensamblador.
pub mod target {
    pub use crate::codegen::{emit, Codegen, CodegenError};
}

/// Ejecuta todas las fases sobre un árbol de parsing y escribe el ensamblador resultante.
///
/// Nada se escribe a `output` si alguna fase falla.
pub fn compile<W: Write>(
    parse_tree: Node,
    platform: Platform,
    output: &mut W,
) -> Result<(), CompileError> {
    let mut ast = simplify_tree(parse_tree);
    let resolution = resolve_names(&mut ast)?;

    target::emit(
        &ast,
        &resolution.tables,
        &resolution.strings,
        platform,
        output,
    )?;

    info!(platform = platform.name(), "generated assembly");
    Ok(())
}

/// Reduce el árbol de parsing a AST.
pub fn simplify_tree(parse_tree: Node) -> Node {
    let ast = simplify::simplify(parse_tree);
    info!("simplified parse tree");

    ast
}

/// Construye las tablas de símbolos y enlaza el AST contra ellas.
pub fn resolve_names(ast: &mut Node) -> Result<Resolution, CompileError> {
    let resolution = semantic::resolve(ast)?;
    info!(
        globals = resolution.tables.globals.len(),
        strings = resolution.strings.len(),
        "resolved names"
    );

    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use crate::parse::read_str;

    /// Acumula los eventos formateados por el subscriber de prueba.
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut captured = self.0.lock().unwrap();
            captured.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logged<F: FnOnce()>(body: F) -> String {
        let capture = Capture::default();
        let writer = capture.clone();

        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, body);

        let captured = capture.0.lock().unwrap();
        String::from_utf8(captured.clone()).unwrap()
    }

    const PROGRAM: &str = "GLOBAL_LIST\n FUNCTION\n  IDENTIFIER_DATA(main)\n  PARAMETER_LIST\n  RETURN_STATEMENT\n   NUMBER_DATA(0)\n";

    #[test]
    fn stages_log_their_boundaries() {
        let log = logged(|| {
            let mut ast = simplify_tree(read_str("test", PROGRAM).unwrap());
            let resolution = resolve_names(&mut ast).unwrap();
            assert_eq!(resolution.tables.globals.len(), 1);
        });

        assert!(log.contains("simplified parse tree"), "{}", log);
        assert!(log.contains("resolved names globals=1 strings=0"), "{}", log);
    }

    #[test]
    fn compile_logs_every_stage() {
        let mut output = Vec::new();
        let log = logged(|| {
            let tree = read_str("test", PROGRAM).unwrap();
            compile(tree, Platform::Linux, &mut output).unwrap();
        });

        assert!(!output.is_empty());
        for event in ["simplified parse tree", "resolved names", "generated assembly"] {
            assert!(log.contains(event), "missing `{}` in:\n{}", event, log);
        }
    }
}
