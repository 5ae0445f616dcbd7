//! Simplificación del árbol de parsing a AST.
//!
//! Todas las reescrituras ocurren de abajo hacia arriba: los hijos de un
//! nodo se simplifican antes de inspeccionar al nodo mismo. Un nodo cuyo
//! tipo no requiere cambios se retorna intacto. Aplicar esta fase sobre
//! su propia salida no produce cambios.

use std::mem;

use tracing::warn;

use crate::tree::{Data, Node, NodeKind};

/// Variable oculta que guarda el límite superior de un `for`.
pub const FOR_END_VARIABLE: &str = "__FOR_END__";

/// Convierte un árbol de parsing en AST.
pub fn simplify(node: Node) -> Node {
    let Node {
        kind,
        data,
        symbol,
        children,
    } = node;

    let node = Node {
        kind,
        data,
        symbol,
        children: children.into_iter().map(simplify).collect(),
    };

    use NodeKind::*;
    match node.kind {
        // Nodos de valor puramente sintáctico con un único hijo
        Program | Global | Statement | PrintItem => eliminate_wrapper(node),

        ParameterList | ArgumentList | PrintStatement | Declaration | ArrayDeclaration => {
            squash(node)
        }

        GlobalList | VariableList | DeclarationList | StatementList | PrintList
        | ExpressionList => flatten(node),

        Expression => fold_constants(node),
        ForStatement => desugar_for(node),

        _ => node,
    }
}

fn eliminate_wrapper(node: Node) -> Node {
    if node.children.len() != 1 {
        return node;
    }

    let mut children = node.into_children();
    children.remove(0)
}

/// Adopta a los nietos de un envoltorio opcional de una lista.
fn squash(node: Node) -> Node {
    let squashes = match (node.kind, node.children.as_slice()) {
        (NodeKind::ParameterList | NodeKind::Declaration, [child]) => {
            child.kind == NodeKind::VariableList
        }

        (NodeKind::ArgumentList, [child]) => child.kind == NodeKind::ExpressionList,
        (NodeKind::PrintStatement, [child]) => child.kind == NodeKind::PrintList,
        (NodeKind::ArrayDeclaration, [child]) => child.kind == NodeKind::ArrayIndexing,
        _ => false,
    };

    if !squashes {
        return node;
    }

    let kind = node.kind;
    let mut children = node.into_children();
    let mut result = children.remove(0);
    result.kind = kind;

    result
}

/// `list(list(a, b), c)` se convierte en `list(a, b, c)`.
fn flatten(mut node: Node) -> Node {
    let nested = matches!(node.children.as_slice(), [list, _] if list.kind == node.kind);
    if !nested {
        return node;
    }

    match <[Node; 2]>::try_from(mem::take(&mut node.children)) {
        Ok([mut list, element]) => {
            list.children.push(element);
            list
        }

        Err(children) => {
            node.children = children;
            node
        }
    }
}

fn fold_constants(node: Node) -> Node {
    if node.data == Data::None {
        return eliminate_wrapper(node);
    }

    let operands: Option<Vec<i64>> = node.children.iter().map(Node::value).collect();
    let value = match (node.operator(), operands.as_deref()) {
        (Some("+"), Some(&[lhs, rhs])) => Some(lhs.wrapping_add(rhs)),
        (Some("-"), Some(&[lhs, rhs])) => Some(lhs.wrapping_sub(rhs)),
        (Some("*"), Some(&[lhs, rhs])) => Some(lhs.wrapping_mul(rhs)),
        (Some("-"), Some(&[operand])) => Some(operand.wrapping_neg()),

        (Some("/"), Some(&[lhs, rhs])) => {
            // Se difiere a tiempo de ejecución, donde la división atrapa
            let quotient = lhs.checked_div(rhs);
            if quotient.is_none() {
                warn!(lhs, rhs, "constant division traps at run time, not folding");
            }

            quotient
        }

        _ => None,
    };

    match value {
        // Los operandos originales se destruyen junto con `node`
        Some(value) => Node::number(value),
        None => node,
    }
}

/// Reemplaza `for v in start..end body` por un bloque equivalente.
///
/// ```text
/// begin
///     var v, __FOR_END__
///     v := start
///     __FOR_END__ := end
///     while v < __FOR_END__ begin
///         body
///         v := v + 1
///     end
/// end
/// ```
fn desugar_for(mut node: Node) -> Node {
    let variable = match node.children.first().and_then(Node::name) {
        Some(name) => name.to_owned(),
        None => return node,
    };

    // Un `for` malformado se deja intacto
    let children = mem::take(&mut node.children);
    let [declared, start, end, body] = match <[Node; 4]>::try_from(children) {
        Ok(children) => children,
        Err(children) => {
            node.children = children;
            return node;
        }
    };

    // Cada aparición del identificador es un nodo nuevo
    let var = || Node::identifier(&variable);
    let limit = || Node::identifier(FOR_END_VARIABLE);

    let declaration = Node::new(NodeKind::Declaration, Data::None, [declared, limit()]);
    let declarations = Node::new(NodeKind::DeclarationList, Data::None, [declaration]);

    let increment = Node::assignment(var(), Node::binary("+", var(), Node::number(1)));
    let inner = Node::new(NodeKind::StatementList, Data::None, [body, increment]);
    let looped = Node::while_loop(
        Node::relation("<", var(), limit()),
        Node::block(None, inner),
    );

    let statements = Node::new(
        NodeKind::StatementList,
        Data::None,
        [
            Node::assignment(var(), start),
            Node::assignment(limit(), end),
            looped,
        ],
    );

    Node::block(Some(declarations), statements)
}
