//! Árboles sintácticos.
//!
//! Tanto el árbol de parsing que entrega el front end como el AST que
//! resulta de [`crate::simplify`] se representan con el mismo tipo
//! [`Node`]. Cada nodo es dueño exclusivo de su payload y de sus hijos,
//! por lo cual destruir un subárbol es simplemente soltarlo. Ningún nodo
//! tiene dos padres; las reescrituras mueven hijos o sintetizan nodos
//! nuevos, nunca comparten instancias.
//!
//! La forma de cada producción está dada por el par (tipo, cantidad de
//! hijos). Las fases posteriores dependen de contratos posicionales fijos,
//! por ejemplo un `IF_STATEMENT` con `else` tiene exactamente tres hijos:
//! relación, rama verdadera y rama falsa.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use thiserror::Error;

use crate::symbols::{SymbolId, Tables};

/// Tipo de nodo.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Program,
    GlobalList,
    Global,
    Declaration,
    VariableList,
    Variable,
    ArrayDeclaration,
    ArrayIndexing,
    Function,
    ParameterList,
    Statement,
    Block,
    DeclarationList,
    StatementList,
    AssignmentStatement,
    ReturnStatement,
    PrintStatement,
    PrintList,
    PrintItem,
    BreakStatement,
    IfStatement,
    WhileStatement,
    Relation,
    ForStatement,
    ArgumentList,
    ExpressionList,
    Expression,
    IdentifierData,
    NumberData,
    StringData,
}

impl NodeKind {
    /// Todos los tipos, en el orden de la gramática.
    pub const ALL: [NodeKind; 30] = [
        NodeKind::Program,
        NodeKind::GlobalList,
        NodeKind::Global,
        NodeKind::Declaration,
        NodeKind::VariableList,
        NodeKind::Variable,
        NodeKind::ArrayDeclaration,
        NodeKind::ArrayIndexing,
        NodeKind::Function,
        NodeKind::ParameterList,
        NodeKind::Statement,
        NodeKind::Block,
        NodeKind::DeclarationList,
        NodeKind::StatementList,
        NodeKind::AssignmentStatement,
        NodeKind::ReturnStatement,
        NodeKind::PrintStatement,
        NodeKind::PrintList,
        NodeKind::PrintItem,
        NodeKind::BreakStatement,
        NodeKind::IfStatement,
        NodeKind::WhileStatement,
        NodeKind::Relation,
        NodeKind::ForStatement,
        NodeKind::ArgumentList,
        NodeKind::ExpressionList,
        NodeKind::Expression,
        NodeKind::IdentifierData,
        NodeKind::NumberData,
        NodeKind::StringData,
    ];

    /// Nombre canónico, tal como aparece en volcados del árbol.
    pub fn name(self) -> &'static str {
        use NodeKind::*;

        match self {
            Program => "PROGRAM",
            GlobalList => "GLOBAL_LIST",
            Global => "GLOBAL",
            Declaration => "DECLARATION",
            VariableList => "VARIABLE_LIST",
            Variable => "VARIABLE",
            ArrayDeclaration => "ARRAY_DECLARATION",
            ArrayIndexing => "ARRAY_INDEXING",
            Function => "FUNCTION",
            ParameterList => "PARAMETER_LIST",
            Statement => "STATEMENT",
            Block => "BLOCK",
            DeclarationList => "DECLARATION_LIST",
            StatementList => "STATEMENT_LIST",
            AssignmentStatement => "ASSIGNMENT_STATEMENT",
            ReturnStatement => "RETURN_STATEMENT",
            PrintStatement => "PRINT_STATEMENT",
            PrintList => "PRINT_LIST",
            PrintItem => "PRINT_ITEM",
            BreakStatement => "BREAK_STATEMENT",
            IfStatement => "IF_STATEMENT",
            WhileStatement => "WHILE_STATEMENT",
            Relation => "RELATION",
            ForStatement => "FOR_STATEMENT",
            ArgumentList => "ARGUMENT_LIST",
            ExpressionList => "EXPRESSION_LIST",
            Expression => "EXPRESSION",
            IdentifierData => "IDENTIFIER_DATA",
            NumberData => "NUMBER_DATA",
            StringData => "STRING_DATA",
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.name())
    }
}

impl FromStr for NodeKind {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .iter()
            .copied()
            .find(|kind| unicase::eq_ascii(kind.name(), string))
            .ok_or(())
    }
}

/// Datos adicionales de un nodo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Data {
    None,

    /// Nombre de un identificador.
    Identifier(String),

    /// Literal entero.
    Number(i64),

    /// Operador de una expresión o relación. Las llamadas usan `"call"`.
    Operator(String),

    /// Literal de string crudo, comillas incluidas.
    Text(String),

    /// Posición de un literal de string en la [`crate::symbols::StringList`].
    StringIndex(usize),
}

/// Un nodo del árbol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub data: Data,
    pub symbol: Option<SymbolId>,
    pub children: Vec<Node>,
}

/// Violación del contrato posicional de un tipo de nodo.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Malformed {kind} node: expected {expected} children, found {found}")]
    Children {
        kind: NodeKind,
        expected: String,
        found: usize,
    },

    #[error("Malformed {0} node: missing payload")]
    Payload(NodeKind),
}

impl Node {
    /// Construye un nodo. Los hijos se transfieren, no se copian.
    pub fn new<C>(kind: NodeKind, data: Data, children: C) -> Self
    where
        C: IntoIterator<Item = Node>,
    {
        Node {
            kind,
            data,
            symbol: None,
            children: children.into_iter().collect(),
        }
    }

    /// Construye un nodo sin hijos.
    pub fn leaf(kind: NodeKind, data: Data) -> Self {
        Node::new(kind, data, [])
    }

    pub fn identifier(name: &str) -> Self {
        Node::leaf(NodeKind::IdentifierData, Data::Identifier(name.to_owned()))
    }

    pub fn number(value: i64) -> Self {
        Node::leaf(NodeKind::NumberData, Data::Number(value))
    }

    /// `target := value`
    pub fn assignment(target: Node, value: Node) -> Self {
        Node::new(NodeKind::AssignmentStatement, Data::None, [target, value])
    }

    /// `lhs <op> rhs` como condición.
    pub fn relation(op: &str, lhs: Node, rhs: Node) -> Self {
        Node::new(NodeKind::Relation, Data::Operator(op.to_owned()), [lhs, rhs])
    }

    /// `lhs <op> rhs` como expresión aritmética.
    pub fn binary(op: &str, lhs: Node, rhs: Node) -> Self {
        Node::new(NodeKind::Expression, Data::Operator(op.to_owned()), [lhs, rhs])
    }

    pub fn while_loop(relation: Node, body: Node) -> Self {
        Node::new(NodeKind::WhileStatement, Data::None, [relation, body])
    }

    /// Bloque con declaraciones opcionales.
    pub fn block(declarations: Option<Node>, statements: Node) -> Self {
        let children = declarations.into_iter().chain(Some(statements));
        Node::new(NodeKind::Block, Data::None, children)
    }

    /// Nombre, si este es un `IDENTIFIER_DATA`.
    pub fn name(&self) -> Option<&str> {
        match (&self.kind, &self.data) {
            (NodeKind::IdentifierData, Data::Identifier(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Valor, si este es un `NUMBER_DATA`.
    pub fn value(&self) -> Option<i64> {
        match (&self.kind, &self.data) {
            (NodeKind::NumberData, Data::Number(value)) => Some(*value),
            _ => None,
        }
    }

    /// Operador de una expresión o relación.
    pub fn operator(&self) -> Option<&str> {
        match &self.data {
            Data::Operator(op) => Some(op.as_str()),
            _ => None,
        }
    }

    /// Como [`Node::name()`], pero la ausencia es una violación de contrato.
    pub fn expect_name(&self) -> Result<&str, ShapeError> {
        self.name().ok_or(ShapeError::Payload(self.kind))
    }

    /// Accede a los hijos verificando que sean exactamente `N`.
    pub fn children_exactly<const N: usize>(&self) -> Result<&[Node; N], ShapeError> {
        self.children
            .as_slice()
            .try_into()
            .map_err(|_| self.shape_error(N.to_string()))
    }

    /// Construye el error de forma para este nodo.
    pub fn shape_error<E: Into<String>>(&self, expected: E) -> ShapeError {
        ShapeError::Children {
            kind: self.kind,
            expected: expected.into(),
            found: self.children.len(),
        }
    }

    /// Finaliza el nodo sin tocar sus hijos, que se retornan intactos.
    pub fn into_children(self) -> Vec<Node> {
        self.children
    }

    /// Vista imprimible que incluye los símbolos enlazados.
    pub fn bound<'a>(&'a self, tables: &'a Tables) -> Bound<'a> {
        Bound { node: self, tables }
    }

    fn write_tree(
        &self,
        fmt: &mut fmt::Formatter<'_>,
        nesting: usize,
        tables: Option<&Tables>,
    ) -> fmt::Result {
        write!(fmt, "{:nesting$}{}", "", self.kind, nesting = nesting)?;

        match &self.data {
            Data::None => (),
            Data::Identifier(text) | Data::Operator(text) | Data::Text(text) => {
                write!(fmt, "({})", text)?
            }
            Data::Number(value) => write!(fmt, "({})", value)?,
            Data::StringIndex(index) => write!(fmt, "(#{})", index)?,
        }

        let symbol = tables.zip(self.symbol).and_then(|(tables, id)| tables.get(id));
        if let Some(symbol) = symbol {
            write!(fmt, " {}({})", symbol.kind.name(), symbol.sequence)?;
        }

        writeln!(fmt)?;
        for child in &self.children {
            child.write_tree(fmt, nesting + 1, tables)?;
        }

        Ok(())
    }
}

impl Display for Node {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(fmt, 0, None)
    }
}

/// Un árbol junto con las tablas contra las que fue enlazado.
pub struct Bound<'a> {
    node: &'a Node,
    tables: &'a Tables,
}

impl Display for Bound<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.node.write_tree(fmt, 0, Some(self.tables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn prints_kinds_and_payloads_by_depth() {
        let tree = Node::assignment(
            Node::identifier("x"),
            Node::binary(
                "+",
                Node::number(-3),
                Node::leaf(NodeKind::StringData, Data::StringIndex(2)),
            ),
        );

        assert_eq!(
            tree.to_string(),
            "ASSIGNMENT_STATEMENT\n IDENTIFIER_DATA(x)\n EXPRESSION(+)\n  NUMBER_DATA(-3)\n  STRING_DATA(#2)\n"
        );
    }

    #[test]
    fn kind_names_parse_case_insensitively() {
        assert_eq!("while_statement".parse::<NodeKind>(), Ok(NodeKind::WhileStatement));
        assert_eq!("Number_Data".parse::<NodeKind>(), Ok(NodeKind::NumberData));
        assert_eq!("WHILE".parse::<NodeKind>(), Err(()));

        for kind in NodeKind::ALL {
            assert_eq!(kind.name().parse::<NodeKind>(), Ok(kind));
        }
    }

    #[test]
    fn children_exactly_checks_arity() {
        let relation = Node::relation("<", Node::identifier("a"), Node::number(1));
        let [lhs, rhs] = relation.children_exactly::<2>().unwrap();
        assert_eq!(lhs.name(), Some("a"));
        assert_eq!(rhs.value(), Some(1));

        assert_eq!(
            relation.children_exactly::<3>().unwrap_err(),
            ShapeError::Children {
                kind: NodeKind::Relation,
                expected: "3".to_owned(),
                found: 2,
            }
        );
    }

    #[test]
    fn block_keeps_optional_declarations_first() {
        let statements = Node::new(NodeKind::StatementList, Data::None, []);
        let declarations = Node::new(NodeKind::DeclarationList, Data::None, []);

        let bare = Node::block(None, statements.clone());
        assert_eq!(bare.children.len(), 1);

        let full = Node::block(Some(declarations), statements);
        let kinds: Vec<_> = full.children.iter().map(|child| child.kind).collect();
        assert_eq!(kinds, [NodeKind::DeclarationList, NodeKind::StatementList]);
    }

    #[test]
    fn payload_accessors_respect_kind() {
        let expression = Node::leaf(NodeKind::Expression, Data::Identifier("x".into()));
        assert_eq!(expression.name(), None);
        assert_eq!(expression.expect_name(), Err(ShapeError::Payload(NodeKind::Expression)));
        assert_eq!(Node::identifier("y").expect_name(), Ok("y"));
    }
}
