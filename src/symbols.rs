//! Tablas de símbolos y lista de strings.
//!
//! Existe una tabla global y una tabla local por cada función. La
//! tabla local es propiedad exclusiva del símbolo de su función. El
//! orden de inserción es significativo: fija el número de secuencia de
//! cada símbolo y, por ende, la disposición del stack frame.

use std::{
    collections::HashMap,
    fmt::{self, Display},
    rc::Rc,
};

/// Clase de símbolo.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    GlobalVar,
    GlobalArray,
    Function,
    Parameter,
    LocalVar,
}

impl SymbolKind {
    /// Nombre utilizado en volcados de tablas.
    pub fn name(self) -> &'static str {
        match self {
            SymbolKind::GlobalVar => "GLOBAL_VAR",
            SymbolKind::GlobalArray => "GLOBAL_ARRAY",
            SymbolKind::Function => "FUNCTION",
            SymbolKind::Parameter => "PARAMETER",
            SymbolKind::LocalVar => "LOCAL_VAR",
        }
    }
}

impl Display for SymbolKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            SymbolKind::GlobalVar => "global variable",
            SymbolKind::GlobalArray => "global array",
            SymbolKind::Function => "function",
            SymbolKind::Parameter => "parameter",
            SymbolKind::LocalVar => "local variable",
        };

        fmt.write_str(description)
    }
}

/// Handle hacia un símbolo.
///
/// Los nodos del AST guardan handles en vez de referencias, por lo cual
/// las tablas pueden crecer o moverse sin invalidar el árbol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SymbolId {
    /// Posición en la tabla global.
    Global(usize),

    /// Posición en la tabla local de la función con índice global `function`.
    Local { function: usize, index: usize },
}

/// Una entrada de tabla.
#[derive(Debug)]
pub struct Symbol {
    pub name: Rc<str>,
    pub kind: SymbolKind,

    /// Rango de inserción dentro de la tabla dueña, comenzando en 0.
    pub sequence: usize,

    /// Posición del nodo declarante entre los hijos de la raíz del AST.
    ///
    /// Solo aplica a símbolos globales.
    pub node: Option<usize>,

    /// Tabla de parámetros y locales, solo para funciones.
    pub locals: Option<SymbolTable>,
}

/// Colección ordenada de símbolos con una capa de búsqueda base.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    names: HashMap<Rc<str>, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Default::default()
    }

    /// Inserta un símbolo visible en la capa base de esta tabla.
    ///
    /// Un nombre repetido en la misma capa opaca al anterior, pero ambos
    /// conservan su posición.
    pub fn insert(&mut self, name: Rc<str>, kind: SymbolKind, node: Option<usize>) -> usize {
        let index = self.allocate(Rc::clone(&name), kind);
        self.symbols[index].node = node;
        self.names.insert(name, index);

        index
    }

    /// Reserva una posición sin hacer el nombre visible en la capa base.
    ///
    /// Esto corresponde a variables de bloques internos, cuya visibilidad
    /// la controla la cadena de scopes y no la tabla.
    pub fn allocate(&mut self, name: Rc<str>, kind: SymbolKind) -> usize {
        let sequence = self.symbols.len();
        self.symbols.push(Symbol {
            name,
            kind,
            sequence,
            node: None,
            locals: (kind == SymbolKind::Function).then(SymbolTable::new),
        });

        sequence
    }

    /// Busca un nombre en la capa base.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn get(&self, index: usize) -> Option<&Symbol> {
        self.symbols.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Symbol> {
        self.symbols.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Cantidad de parámetros, los cuales siempre preceden a las locales.
    pub fn parameters(&self) -> usize {
        self.count(SymbolKind::Parameter)
    }

    /// Cantidad de símbolos de una clase.
    pub fn count(&self, kind: SymbolKind) -> usize {
        self.symbols.iter().filter(|symbol| symbol.kind == kind).count()
    }

    fn write_table(&self, fmt: &mut fmt::Formatter<'_>, nesting: usize) -> fmt::Result {
        for symbol in &self.symbols {
            writeln!(
                fmt,
                "{:nesting$}{}: {}({})",
                "",
                symbol.sequence,
                symbol.kind.name(),
                symbol.name,
                nesting = nesting
            )?;

            if let Some(locals) = &symbol.locals {
                locals.write_table(fmt, nesting + 4)?;
            }
        }

        Ok(())
    }
}

/// Todas las tablas de una compilación.
#[derive(Debug, Default)]
pub struct Tables {
    pub globals: SymbolTable,
}

impl Tables {
    /// Resuelve un handle.
    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        match id {
            SymbolId::Global(index) => self.globals.get(index),
            SymbolId::Local { function, index } => self
                .globals
                .get(function)
                .and_then(|function| function.locals.as_ref())
                .and_then(|locals| locals.get(index)),
        }
    }

    /// Funciones en orden de declaración, junto con su índice global.
    pub fn functions(&self) -> impl Iterator<Item = (usize, &Symbol)> {
        self.globals
            .iter()
            .enumerate()
            .filter(|(_, symbol)| symbol.kind == SymbolKind::Function)
    }
}

impl Symbol {
    /// Aridad de una función. Cero para cualquier otra clase de símbolo.
    pub fn arity(&self) -> usize {
        self.locals.as_ref().map_or(0, SymbolTable::parameters)
    }
}

impl Display for Tables {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.globals.write_table(fmt, 0)
    }
}

/// Literales de string, indexados por posición.
#[derive(Debug, Default)]
pub struct StringList {
    strings: Vec<String>,
    positions: HashMap<String, usize>,
}

impl StringList {
    pub fn new() -> Self {
        Default::default()
    }

    /// Agrega un literal y retorna su posición.
    ///
    /// Un literal idéntico a uno ya presente reutiliza su posición.
    pub fn add(&mut self, string: String) -> usize {
        if let Some(&position) = self.positions.get(&string) {
            return position;
        }

        let position = self.strings.len();
        self.positions.insert(string.clone(), position);
        self.strings.push(string);

        position
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Display for StringList {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, string) in self.iter().enumerate() {
            writeln!(fmt, "{}: {}", index, string)?;
        }

        Ok(())
    }
}
