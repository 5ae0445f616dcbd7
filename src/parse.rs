//! Lectura de árboles de parsing.
//!
//! El análisis léxico y sintáctico de VSL ocurre fuera de este
//! compilador. El front end entrega su árbol de parsing como un volcado
//! textual, con el mismo formato que produce `Display` para [`Node`]:
//!
//! ```text
//! PROGRAM
//!  GLOBAL_LIST
//!   GLOBAL
//!    FUNCTION
//!     IDENTIFIER_DATA(main)
//! ```
//!
//! Cada línea no vacía es un nodo. La cantidad de espacios al inicio
//! es su profundidad y cada hijo está exactamente un nivel por debajo
//! de su padre. El payload opcional va entre paréntesis inmediatamente
//! después del tipo y se interpreta según el mismo.

use std::rc::Rc;

use thiserror::Error;

use crate::{
    source::{Located, Location, Source},
    tree::{Data, Node, NodeKind},
};

/// Error de lectura.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Unknown node kind `{0}`")]
    UnknownKind(String),

    #[error("{0} requires a payload")]
    MissingPayload(NodeKind),

    #[error("{0} does not take a payload")]
    UnexpectedPayload(NodeKind),

    #[error("Bad integer literal `{0}`")]
    BadNumber(String),

    #[error("Unterminated payload, expected `)` at end of line")]
    UnclosedPayload,

    #[error("Node is nested {found} levels deep, but its parent allows at most {allowed}")]
    BadIndentation { found: usize, allowed: usize },

    #[error("Tree has more than one root")]
    MultipleRoots,

    #[error("Tree dump is empty")]
    Empty,
}

pub type Read<T> = Result<T, Located<ReadError>>;

/// Reconstruye el árbol contenido en un origen.
pub fn read_tree(source: &Rc<Source>) -> Read<Node> {
    // stack[d] es el último nodo visto a profundidad d, aún abierto
    let mut stack: Vec<Node> = Vec::new();
    let mut last_line = 0;

    for (line_number, line) in source.lines() {
        last_line = line_number;
        if line.trim().is_empty() {
            continue;
        }

        let depth = line.len() - line.trim_start_matches(' ').len();
        let at = |columns| Location::new(source, line_number, columns);

        if depth > stack.len() {
            let error = ReadError::BadIndentation {
                found: depth,
                allowed: stack.len(),
            };

            return Err(Located::at(error, at(1..depth as u32 + 1)));
        } else if depth == 0 && !stack.is_empty() {
            return Err(Located::at(ReadError::MultipleRoots, at(1..2)));
        }

        let node = read_node(&line[depth..], depth as u32 + 1, at)?;
        close_to(&mut stack, depth);
        stack.push(node);
    }

    close_to(&mut stack, 1);
    stack.pop().ok_or_else(|| {
        let location = Location::new(source, last_line.max(1), 1..2);
        Located::at(ReadError::Empty, location)
    })
}

/// Conveniencia para leer un volcado en memoria.
pub fn read_str(name: &str, text: &str) -> Read<Node> {
    read_tree(&Source::new(name, text))
}

/// Cierra nodos abiertos hasta que queden `depth`, adjuntando cada uno a su padre.
fn close_to(stack: &mut Vec<Node>, depth: usize) {
    while stack.len() > depth.max(1) {
        if let Some(child) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(child);
            }
        }
    }
}

/// Interpreta una línea sin su indentación. `column` es la columna de inicio.
fn read_node<F>(text: &str, column: u32, at: F) -> Read<Node>
where
    F: Fn(std::ops::Range<u32>) -> Location,
{
    let text = text.trim_end();
    let (name, payload) = match text.find('(') {
        Some(open) => (&text[..open], Some(&text[open + 1..])),
        None => (text, None),
    };

    let name_end = column + name.chars().count() as u32;
    let kind: NodeKind = name.trim().parse().map_err(|()| {
        let error = ReadError::UnknownKind(name.trim().to_owned());
        Located::at(error, at(column..name_end))
    })?;

    let payload_columns = name_end..column + text.chars().count() as u32;
    let payload = match payload {
        None => None,
        Some(payload) => match payload.strip_suffix(')') {
            Some(payload) => Some(payload),
            None => return Err(Located::at(ReadError::UnclosedPayload, at(payload_columns))),
        },
    };

    let fail = |error| Err(Located::at(error, at(payload_columns.clone())));
    let data = match (kind, payload) {
        (NodeKind::IdentifierData, Some(name)) => Data::Identifier(name.to_owned()),

        (NodeKind::NumberData, Some(number)) => match number.trim().parse() {
            Ok(value) => Data::Number(value),
            Err(_) => return fail(ReadError::BadNumber(number.to_owned())),
        },

        (NodeKind::StringData, Some(text)) => {
            match text.strip_prefix('#').map(|index| index.parse::<usize>()) {
                Some(Ok(index)) => Data::StringIndex(index),
                _ => Data::Text(text.to_owned()),
            }
        }

        (NodeKind::Expression | NodeKind::Relation, Some(op)) => Data::Operator(op.to_owned()),
        (NodeKind::Expression | NodeKind::Relation, None) => Data::None,

        (NodeKind::IdentifierData | NodeKind::NumberData | NodeKind::StringData, None) => {
            return fail(ReadError::MissingPayload(kind))
        }

        (_, Some(_)) => return fail(ReadError::UnexpectedPayload(kind)),
        (_, None) => Data::None,
    };

    Ok(Node::leaf(kind, data))
}
