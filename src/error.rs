//! Errores y su presentación.
//!
//! Cada fase define su propio tipo de error. El compilador no se
//! recupera de ninguno: el primer error aborta la compilación completa.

use crate::{
    codegen::CodegenError,
    semantic::SemanticError,
    source::{Located, Location},
};

use std::{
    error::Error,
    fmt::{self, Display},
};

use thiserror::Error;

/// Error de cualquiera de las fases posteriores a la lectura del árbol.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

mod sealed {
    pub trait Sealed {}
}

pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn location(&self) -> &Location;
}

/// Reporte de un error ubicado, listo para mostrarse al usuario.
///
/// Se señala la línea ofensiva del volcado y se subrayan sus columnas.
pub struct Diagnostics {
    kind: &'static str,
    error: Box<dyn 'static + LocatedError>,
}

impl Diagnostics {
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }
}

impl<E: 'static + LocatedError> From<E> for Diagnostics {
    fn from(error: E) -> Self {
        Diagnostics {
            kind: "error",
            error: Box::new(error),
        }
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = self.error.location();
        writeln!(fmt, "{}: {}", self.kind, self.error.source())?;
        writeln!(fmt, " --> {}", location)?;

        let line_number = location.line();
        let digits = line_number.to_string().len();
        let line = location.source().line(line_number);

        writeln!(fmt, "{:digits$} |", "", digits = digits)?;
        writeln!(fmt, "{:>digits$} | {}", line_number, line, digits = digits)?;

        let columns = location.columns();
        writeln!(
            fmt,
            "{:digits$} | {:skip$}{:^<highlight$}",
            "",
            "",
            "",
            digits = digits,
            skip = columns.start.saturating_sub(1) as usize,
            highlight = columns.len(),
        )
    }
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.val()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}
