use std::io::Write;

use super::{Codegen, CodegenError, Context};
use crate::{
    arch::x86_64::{immediate, Reg, VALUE_SIZE},
    symbols::SymbolKind,
    tree::{Node, NodeKind, ShapeError},
};

impl<W: Write> Context<'_, W> {
    /// Evalúa una expresión, dejando su valor en `%rax`.
    pub(super) fn expression(&mut self, node: &Node) -> Codegen<()> {
        match node.kind {
            NodeKind::NumberData => {
                let value = node.value().ok_or(ShapeError::Payload(node.kind))?;
                let (opcode, value) = immediate(value);
                emit!(self, opcode, "{}, {}", value, Reg::Rax)?;
            }

            NodeKind::IdentifierData => {
                let address = self.variable(node)?;
                emit!(self, "movq", "{}, {}", address, Reg::Rax)?;
            }

            NodeKind::ArrayIndexing => {
                self.element(node)?;
                emit!(self, "movq", "({}), {}", Reg::R10, Reg::Rax)?;
            }

            NodeKind::Expression => self.operation(node)?,

            kind => {
                return Err(CodegenError::UnexpectedNode {
                    kind,
                    context: "expression",
                })
            }
        }

        Ok(())
    }

    /// Deja en `%r10` la dirección de un elemento de arreglo.
    pub(super) fn element(&mut self, indexing: &Node) -> Codegen<()> {
        let [array, index] = indexing.children_exactly::<2>()?;

        let symbol = self.symbol(array)?;
        if symbol.kind != SymbolKind::GlobalArray {
            return Err(CodegenError::ExpectedArray {
                name: symbol.name.to_string(),
                found: symbol.kind,
            });
        }

        self.expression(index)?;
        emit!(self, "leaq", ".{}({}), {}", symbol.name, Reg::Rip, Reg::R10)?;
        emit!(
            self,
            "leaq",
            "({}, {}, {}), {}",
            Reg::R10,
            Reg::Rax,
            VALUE_SIZE,
            Reg::R10
        )?;

        Ok(())
    }

    fn operation(&mut self, node: &Node) -> Codegen<()> {
        match (node.operator(), node.children.as_slice()) {
            (Some("call"), _) => self.call(node)?,

            // Paréntesis que no fueron simplificados
            (None, [inner]) => self.expression(inner)?,

            (Some("-"), [operand]) => {
                self.expression(operand)?;
                emit!(self, "negq", "{}", Reg::Rax)?;
            }

            (Some(op @ ("+" | "-" | "*" | "/")), [lhs, rhs]) => {
                self.expression(lhs)?;
                emit!(self, "pushq", "{}", Reg::Rax)?;
                self.expression(rhs)?;

                match op {
                    "+" | "*" => {
                        let opcode = if op == "+" { "addq" } else { "imulq" };
                        emit!(self, "popq", "{}", Reg::R10)?;
                        emit!(self, opcode, "{}, {}", Reg::R10, Reg::Rax)?;
                    }

                    _ => {
                        // El divisor o sustraendo pasa a %r10 y el operando izquierdo vuelve a %rax
                        emit!(self, "movq", "{}, {}", Reg::Rax, Reg::R10)?;
                        emit!(self, "popq", "{}", Reg::Rax)?;

                        if op == "-" {
                            emit!(self, "subq", "{}, {}", Reg::R10, Reg::Rax)?;
                        } else {
                            emit!(self, "cqo")?;
                            emit!(self, "idivq", "{}", Reg::R10)?;
                        }
                    }
                }
            }

            (Some(op), operands) => {
                return Err(CodegenError::UnknownOperator {
                    op: op.to_owned(),
                    arity: operands.len(),
                })
            }

            (None, _) => return Err(node.shape_error("1").into()),
        }

        Ok(())
    }

    /// Invoca a una función con la convención de llamada de System V.
    fn call(&mut self, call: &Node) -> Codegen<()> {
        let (callee, arguments) = match call.children.as_slice() {
            [callee] => (callee, &[] as &[Node]),
            [callee, list] if list.kind == NodeKind::ArgumentList => {
                (callee, list.children.as_slice())
            }

            _ => return Err(call.shape_error("1 or 2").into()),
        };

        let function = self.symbol(callee)?;
        if function.kind != SymbolKind::Function {
            return Err(CodegenError::ExpectedFunction {
                name: function.name.to_string(),
                found: function.kind,
            });
        } else if function.arity() != arguments.len() {
            return Err(CodegenError::ArgumentCount {
                name: function.name.to_string(),
                expected: function.arity(),
                found: arguments.len(),
            });
        }

        // De derecha a izquierda, de forma que el primer argumento quede en el tope
        for argument in arguments.iter().rev() {
            self.expression(argument)?;
            emit!(self, "pushq", "{}", Reg::Rax)?;
        }

        for register in Reg::argument_sequence().take(arguments.len()) {
            emit!(self, "popq", "{}", register)?;
        }

        emit!(self, "call", ".{}", function.name)?;

        // Se descartan los argumentos que se pasaron en el stack
        let on_stack = arguments.len().saturating_sub(Reg::MAX_ARGS);
        if on_stack > 0 {
            emit!(self, "addq", "${}, {}", on_stack as i64 * VALUE_SIZE, Reg::Rsp)?;
        }

        Ok(())
    }
}
