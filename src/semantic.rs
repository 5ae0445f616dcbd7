//! Análisis semántico.
//!
//! La resolución de nombres ocurre en dos pasadas. La primera recorre
//! las declaraciones globales de la raíz y construye la tabla global,
//! incluyendo una tabla local vacía por cada función. La segunda pasada
//! recorre el cuerpo de cada función en el orden de la tabla global,
//! insertando parámetros y locales, enlazando cada referencia a un
//! identificador con su símbolo e internando literales de string.
//!
//! Una referencia que no se logra resolver queda sin símbolo. Esto no
//! es un error en esta fase, sino hasta que el generador de código
//! intenta utilizarla.

use std::{collections::HashMap, rc::Rc};

use thiserror::Error;
use tracing::debug;

use crate::{
    symbols::{StringList, SymbolId, SymbolKind, SymbolTable, Tables},
    tree::{Data, Node, NodeKind, ShapeError},
};

pub type Semantic<T> = Result<T, SemanticError>;

/// Error de análisis semántico.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Expected the tree root to be {}, found {0}", NodeKind::GlobalList)]
    BadRoot(NodeKind),

    #[error("Unexpected {0} node in a declaration list")]
    NotADeclaration(NodeKind),

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Resultado de resolver un programa.
#[derive(Debug, Default)]
pub struct Resolution {
    pub tables: Tables,
    pub strings: StringList,
}

/// Construye las tablas de símbolos y enlaza el AST contra ellas.
pub fn resolve(root: &mut Node) -> Semantic<Resolution> {
    if root.kind != NodeKind::GlobalList {
        return Err(SemanticError::BadRoot(root.kind));
    }

    let mut tables = Tables::default();
    scan_globals(root, &mut tables.globals)?;

    let mut strings = StringList::new();
    let functions: Vec<_> = tables
        .functions()
        .filter_map(|(index, function)| Some((index, function.node?)))
        .collect();

    for (function, position) in functions {
        let node = match root.children.get_mut(position) {
            Some(node) => node,
            None => continue,
        };

        // La tabla se extrae temporalmente para poder consultar la global mientras se llena
        let mut locals = tables
            .globals
            .get_mut(function)
            .and_then(|symbol| symbol.locals.take())
            .unwrap_or_default();

        let mut cx = Context {
            globals: &tables.globals,
            function,
            locals: &mut locals,
            scopes: Vec::new(),
            strings: &mut strings,
        };

        cx.bind_function(node)?;

        if let Some(symbol) = tables.globals.get_mut(function) {
            debug!(
                function = %symbol.name,
                parameters = locals.parameters(),
                locals = locals.count(SymbolKind::LocalVar),
                "bound function names"
            );

            symbol.locals = Some(locals);
        }
    }

    Ok(Resolution { tables, strings })
}

fn scan_globals(root: &mut Node, globals: &mut SymbolTable) -> Semantic<()> {
    for (position, global) in root.children.iter_mut().enumerate() {
        match global.kind {
            NodeKind::Declaration => {
                for variable in &mut global.children {
                    let name = variable.expect_name()?.into();
                    let index = globals.insert(name, SymbolKind::GlobalVar, Some(position));
                    variable.symbol = Some(SymbolId::Global(index));
                }
            }

            NodeKind::ArrayDeclaration => {
                let [array, _length] = global.children_exactly::<2>()?;
                let name = array.expect_name()?.into();

                let index = globals.insert(name, SymbolKind::GlobalArray, Some(position));
                global.children[0].symbol = Some(SymbolId::Global(index));
            }

            NodeKind::Function => {
                let [function, _, _] = global.children_exactly::<3>()?;
                let name = function.expect_name()?.into();

                let index = globals.insert(name, SymbolKind::Function, Some(position));
                global.children[0].symbol = Some(SymbolId::Global(index));
            }

            _ => (),
        }
    }

    Ok(())
}

struct Context<'a> {
    globals: &'a SymbolTable,
    function: usize,
    locals: &'a mut SymbolTable,

    /// Una capa por bloque abierto, la más interna al final.
    scopes: Vec<HashMap<Rc<str>, usize>>,

    strings: &'a mut StringList,
}

impl Context<'_> {
    fn bind_function(&mut self, function: &mut Node) -> Semantic<()> {
        function.children_exactly::<3>()?;
        let (name, rest) = function.children.split_at_mut(1);
        let (parameters, body) = rest.split_at_mut(1);

        name[0].symbol = Some(SymbolId::Global(self.function));
        for parameter in &mut parameters[0].children {
            let name = parameter.expect_name()?.into();
            let index = self.locals.insert(name, SymbolKind::Parameter, None);
            parameter.symbol = Some(self.local(index));
        }

        self.bind(&mut body[0])
    }

    fn bind(&mut self, node: &mut Node) -> Semantic<()> {
        match node.kind {
            NodeKind::Block => {
                self.scopes.push(HashMap::new());

                let result = node
                    .children
                    .iter_mut()
                    .try_for_each(|child| match child.kind {
                        NodeKind::DeclarationList => child
                            .children
                            .iter_mut()
                            .try_for_each(|declaration| self.declare(declaration)),

                        NodeKind::Declaration => self.declare(child),
                        _ => self.bind(child),
                    });

                self.scopes.pop();
                result
            }

            NodeKind::IdentifierData => {
                node.symbol = self.lookup(node.expect_name()?);
                Ok(())
            }

            NodeKind::StringData => {
                if let Data::Text(text) = &node.data {
                    let index = self.strings.add(text.clone());
                    node.data = Data::StringIndex(index);
                }

                Ok(())
            }

            _ => node
                .children
                .iter_mut()
                .try_for_each(|child| self.bind(child)),
        }
    }

    fn declare(&mut self, declaration: &mut Node) -> Semantic<()> {
        if declaration.kind != NodeKind::Declaration {
            return Err(SemanticError::NotADeclaration(declaration.kind));
        }

        for variable in &mut declaration.children {
            let name: Rc<str> = variable.expect_name()?.into();
            let index = self.locals.allocate(Rc::clone(&name), SymbolKind::LocalVar);

            if let Some(scope) = self.scopes.last_mut() {
                scope.insert(name, index);
            }

            variable.symbol = Some(self.local(index));
        }

        Ok(())
    }

    /// Recorre la cadena de scopes desde el bloque más interno hasta la tabla global.
    fn lookup(&self, name: &str) -> Option<SymbolId> {
        let local = self
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
            .or_else(|| self.locals.lookup(name));

        match local {
            Some(index) => Some(self.local(index)),
            None => self.globals.lookup(name).map(SymbolId::Global),
        }
    }

    fn local(&self, index: usize) -> SymbolId {
        SymbolId::Local {
            function: self.function,
            index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse::read_str, simplify::simplify};
    use pretty_assertions::assert_eq;
    use unindent::unindent;

    fn resolved(dump: &str) -> (Node, Resolution) {
        let mut ast = simplify(read_str("test", &unindent(dump)).unwrap());
        let resolution = resolve(&mut ast).unwrap();
        (ast, resolution)
    }

    /// Busca el primer identificador con el nombre dado, en preorden.
    fn find<'a>(node: &'a Node, name: &str, skip: usize) -> Option<&'a Node> {
        fn walk<'a>(node: &'a Node, name: &str, found: &mut Vec<&'a Node>) {
            if node.name() == Some(name) {
                found.push(node);
            }

            for child in &node.children {
                walk(child, name, found);
            }
        }

        let mut found = Vec::new();
        walk(node, name, &mut found);
        found.get(skip).copied()
    }

    const SHADOWING: &str = r#"
        GLOBAL_LIST
         DECLARATION
          IDENTIFIER_DATA(x)
         FUNCTION
          IDENTIFIER_DATA(f)
          PARAMETER_LIST
           IDENTIFIER_DATA(a)
          BLOCK
           DECLARATION_LIST
            DECLARATION
             IDENTIFIER_DATA(x)
           STATEMENT_LIST
            BLOCK
             DECLARATION_LIST
              DECLARATION
               IDENTIFIER_DATA(x)
               IDENTIFIER_DATA(y)
             STATEMENT_LIST
              ASSIGNMENT_STATEMENT
               IDENTIFIER_DATA(x)
               IDENTIFIER_DATA(a)
            ASSIGNMENT_STATEMENT
             IDENTIFIER_DATA(x)
             IDENTIFIER_DATA(y)
            PRINT_STATEMENT
             STRING_DATA("x")
             STRING_DATA("y")
             STRING_DATA("x")
    "#;

    #[test]
    fn builds_global_and_local_tables() {
        let (_, resolution) = resolved(SHADOWING);

        assert_eq!(
            resolution.tables.to_string(),
            "0: GLOBAL_VAR(x)\n\
             1: FUNCTION(f)\n    \
             0: PARAMETER(a)\n    \
             1: LOCAL_VAR(x)\n    \
             2: LOCAL_VAR(x)\n    \
             3: LOCAL_VAR(y)\n"
        );
    }

    #[test]
    fn inner_declarations_shadow_outer_ones() {
        let (ast, _) = resolved(SHADOWING);
        let local = |index| Some(SymbolId::Local { function: 1, index });

        // Declaraciones: global, bloque externo, bloque interno
        assert_eq!(find(&ast, "x", 0).unwrap().symbol, Some(SymbolId::Global(0)));
        assert_eq!(find(&ast, "x", 1).unwrap().symbol, local(1));
        assert_eq!(find(&ast, "x", 2).unwrap().symbol, local(2));

        // Dentro del bloque interno se ve la `x` interna y el parámetro
        assert_eq!(find(&ast, "x", 3).unwrap().symbol, local(2));
        assert_eq!(find(&ast, "a", 1).unwrap().symbol, local(0));

        // Al salir del bloque interno vuelve a verse la `x` externa
        assert_eq!(find(&ast, "x", 4).unwrap().symbol, local(1));

        // `y` es invisible fuera de su bloque, aunque conserva su posición
        assert_eq!(find(&ast, "y", 1).unwrap().symbol, None);
    }

    #[test]
    fn function_names_bind_to_globals() {
        let (ast, _) = resolved(SHADOWING);
        assert_eq!(find(&ast, "f", 0).unwrap().symbol, Some(SymbolId::Global(1)));
    }

    #[test]
    fn strings_are_interned_once() {
        let (ast, resolution) = resolved(SHADOWING);
        assert_eq!(resolution.strings.to_string(), "0: \"x\"\n1: \"y\"\n");

        let print = ast.children[1].children[2].children[1].children[2].clone();
        let indices: Vec<_> = print.children.into_iter().map(|item| item.data).collect();
        assert_eq!(
            indices,
            [Data::StringIndex(0), Data::StringIndex(1), Data::StringIndex(0)]
        );
    }

    #[test]
    fn sequence_numbers_are_function_wide() {
        let (_, resolution) = resolved(
            r#"
            GLOBAL_LIST
             FUNCTION
              IDENTIFIER_DATA(g)
              PARAMETER_LIST
               IDENTIFIER_DATA(p)
               IDENTIFIER_DATA(q)
              BLOCK
               STATEMENT_LIST
                BLOCK
                 DECLARATION_LIST
                  DECLARATION
                   IDENTIFIER_DATA(a)
                 STATEMENT_LIST
                  RETURN_STATEMENT
                   IDENTIFIER_DATA(a)
                BLOCK
                 DECLARATION_LIST
                  DECLARATION
                   IDENTIFIER_DATA(b)
                 STATEMENT_LIST
                  RETURN_STATEMENT
                   IDENTIFIER_DATA(b)
            "#,
        );

        let (_, function) = resolution.tables.functions().next().unwrap();
        let locals = function.locals.as_ref().unwrap();
        let sequences: Vec<_> = locals
            .iter()
            .map(|symbol| (&*symbol.name, symbol.kind, symbol.sequence))
            .collect();

        assert_eq!(
            sequences,
            [
                ("p", SymbolKind::Parameter, 0),
                ("q", SymbolKind::Parameter, 1),
                ("a", SymbolKind::LocalVar, 2),
                ("b", SymbolKind::LocalVar, 3),
            ]
        );

        assert_eq!(function.arity(), 2);
    }

    #[test]
    fn unresolved_references_stay_unbound() {
        let (ast, _) = resolved(
            r#"
            GLOBAL_LIST
             FUNCTION
              IDENTIFIER_DATA(main)
              PARAMETER_LIST
              RETURN_STATEMENT
               IDENTIFIER_DATA(nowhere)
            "#,
        );

        assert_eq!(find(&ast, "nowhere", 0).unwrap().symbol, None);
    }

    #[test]
    fn root_must_be_a_global_list() {
        let mut ast = Node::leaf(NodeKind::Block, Data::None);
        assert!(matches!(
            resolve(&mut ast),
            Err(SemanticError::BadRoot(NodeKind::Block))
        ));
    }

    #[test]
    fn malformed_functions_are_rejected() {
        let mut ast = Node::new(
            NodeKind::GlobalList,
            Data::None,
            [Node::new(NodeKind::Function, Data::None, [Node::identifier("f")])],
        );

        assert!(matches!(resolve(&mut ast), Err(SemanticError::Shape(_))));
    }
}
