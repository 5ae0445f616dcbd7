//! Rastreo de ubicaciones originales en volcados de árboles.
//!
//! Los errores de lectura deben señalar la línea y columnas exactas del
//! volcado en donde ocurren, lo cual permite diagnosticar árboles
//! malformados producidos por el front end. Cada nodo ocupa una sola
//! línea, por lo que una ubicación nunca abarca más de una.

use std::{
    fmt::{self, Debug, Display, Formatter},
    io::{self, BufRead},
    ops::Range,
    rc::Rc,
};

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }
}

/// Rango de columnas dentro de una línea de un origen.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    line: u32,
    columns: Range<u32>,
}

impl Location {
    /// Columnas `columns` (base 1, exclusivo al final) de la línea `line`.
    ///
    /// Un rango vacío se extiende a una columna.
    pub fn new(from: &Rc<Source>, line: u32, columns: Range<u32>) -> Self {
        let end = columns.end.max(columns.start + 1);
        Location {
            from: Rc::clone(from),
            line,
            columns: columns.start..end,
        }
    }

    /// Número de línea, base 1.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Columnas señaladas, nunca vacías.
    pub fn columns(&self) -> Range<u32> {
        self.columns.clone()
    }

    pub fn source(&self) -> &Source {
        &self.from
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let Range { start, end } = self.columns;
        let line = self.line;

        write!(formatter, "{}:", self.from.name)?;
        if end == start + 1 {
            write!(formatter, "{}:{}", line, start)
        } else {
            write!(formatter, "[{}:{}-{}:{}]", line, start, line, end - 1)
        }
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Nombre de origen y contenido por líneas.
pub struct Source {
    name: String,
    lines: Vec<String>,
}

impl Source {
    /// Construye un origen a partir de texto en memoria.
    pub fn new<S: Into<String>>(name: S, text: &str) -> Rc<Self> {
        Rc::new(Source {
            name: name.into(),
            lines: text.lines().map(String::from).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Itera sobre las líneas, numeradas desde 1.
    pub fn lines(&self) -> impl Iterator<Item = (u32, &str)> {
        self.lines
            .iter()
            .enumerate()
            .map(|(index, line)| (index as u32 + 1, line.as_str()))
    }

    /// Contenido de la línea `line_number`. Una línea inexistente se presenta como vacía.
    pub fn line(&self, line_number: u32) -> &str {
        let index = (line_number as usize).wrapping_sub(1);
        self.lines.get(index).map_or("", String::as_str)
    }
}

/// Consume por completo un flujo de entrada.
pub fn consume<R, S>(reader: R, name: S) -> io::Result<Rc<Source>>
where
    R: BufRead,
    S: Into<String>,
{
    let lines = reader.lines().collect::<io::Result<Vec<_>>>()?;
    Ok(Rc::new(Source {
        name: name.into(),
        lines,
    }))
}
