//! Emisión de enunciados y control de flujo.

use std::io::Write;

use super::{Codegen, CodegenError, Context};
use crate::{
    arch::x86_64::Reg,
    tree::{Data, Node, NodeKind},
};

impl<W: Write> Context<'_, W> {
    pub(super) fn statement(&mut self, node: &Node) -> Codegen<()> {
        use NodeKind::*;

        match node.kind {
            Block => {
                // Las declaraciones ya ocupan su espacio en el frame
                for child in &node.children {
                    if !matches!(child.kind, DeclarationList | Declaration) {
                        self.statement(child)?;
                    }
                }
            }

            StatementList => {
                for statement in &node.children {
                    self.statement(statement)?;
                }
            }

            AssignmentStatement => self.assignment(node)?,

            ReturnStatement => {
                let [value] = node.children_exactly::<1>()?;
                self.expression(value)?;
                self.epilogue()?;
            }

            PrintStatement => self.print(node)?,

            BreakStatement => {
                let innermost = *self.loops.last().ok_or(CodegenError::BreakOutsideLoop)?;
                emit!(self, "jmp", "_WHILEEND{}", innermost)?;
            }

            IfStatement => self.if_statement(node)?,
            WhileStatement => self.while_statement(node)?,

            kind => {
                return Err(CodegenError::UnexpectedNode {
                    kind,
                    context: "statement",
                })
            }
        }

        Ok(())
    }

    fn assignment(&mut self, node: &Node) -> Codegen<()> {
        let [target, value] = node.children_exactly::<2>()?;

        match target.kind {
            NodeKind::IdentifierData => {
                let address = self.variable(target)?;
                self.expression(value)?;
                emit!(self, "movq", "{}, {}", Reg::Rax, address)?;
            }

            NodeKind::ArrayIndexing => {
                self.expression(value)?;
                emit!(self, "pushq", "{}", Reg::Rax)?;

                self.element(target)?;
                emit!(self, "popq", "{}", Reg::Rax)?;
                emit!(self, "movq", "{}, ({})", Reg::Rax, Reg::R10)?;
            }

            kind => {
                return Err(CodegenError::UnexpectedNode {
                    kind,
                    context: "assignment target",
                })
            }
        }

        Ok(())
    }

    /// Cada elemento se imprime seguido de un espacio y el enunciado termina con `\n`.
    fn print(&mut self, node: &Node) -> Codegen<()> {
        for item in &node.children {
            match (item.kind, &item.data) {
                (NodeKind::StringData, Data::StringIndex(index)) => {
                    if self.strings.get(*index).is_none() {
                        return Err(CodegenError::Uninterned);
                    }

                    emit!(self, "leaq", "string{}({}), {}", index, Reg::Rip, Reg::Rsi)?;
                    emit!(self, "leaq", "strout({}), {}", Reg::Rip, Reg::Rdi)?;
                }

                (NodeKind::StringData, _) => return Err(CodegenError::Uninterned),

                _ => {
                    self.expression(item)?;
                    emit!(self, "movq", "{}, {}", Reg::Rax, Reg::Rsi)?;
                    emit!(self, "leaq", "intout({}), {}", Reg::Rip, Reg::Rdi)?;
                }
            }

            emit!(self, "call", "safe_printf")?;
        }

        emit!(self, "movq", "$10, {}", Reg::Rdi)?;
        emit!(self, "call", "safe_putchar")?;

        Ok(())
    }

    fn if_statement(&mut self, node: &Node) -> Codegen<()> {
        let number = self.if_counter;
        self.if_counter += 1;

        match node.children.as_slice() {
            [relation, then] => {
                self.relation(relation, &format!("_IFTHENEND{}", number))?;
                self.statement(then)?;
                label!(self, "_IFTHENEND{}", number)?;
            }

            [relation, then, otherwise] => {
                self.relation(relation, &format!("_IFTHENELSE{}", number))?;
                self.statement(then)?;
                emit!(self, "jmp", "_IFTHENELSEEND{}", number)?;

                label!(self, "_IFTHENELSE{}", number)?;
                self.statement(otherwise)?;
                label!(self, "_IFTHENELSEEND{}", number)?;
            }

            _ => return Err(node.shape_error("2 or 3").into()),
        }

        Ok(())
    }

    fn while_statement(&mut self, node: &Node) -> Codegen<()> {
        let [relation, body] = node.children_exactly::<2>()?;

        let number = self.while_counter;
        self.while_counter += 1;

        label!(self, "_WHILE{}", number)?;
        self.relation(relation, &format!("_WHILEEND{}", number))?;

        self.loops.push(number);
        let body = self.statement(body);
        self.loops.pop();
        body?;

        emit!(self, "jmp", "_WHILE{}", number)?;
        label!(self, "_WHILEEND{}", number)?;

        Ok(())
    }

    /// Compara ambos operandos y salta a `skip` si la relación no se cumple.
    fn relation(&mut self, relation: &Node, skip: &str) -> Codegen<()> {
        if relation.kind != NodeKind::Relation {
            return Err(CodegenError::UnexpectedNode {
                kind: relation.kind,
                context: "condition",
            });
        }

        let jump = match relation.operator() {
            Some("=") => "jne",
            Some("!=") => "je",
            Some("<") => "jge",
            Some(">") => "jle",
            other => {
                let op = other.unwrap_or_default().to_owned();
                return Err(CodegenError::UnknownRelation(op));
            }
        };

        let [lhs, rhs] = relation.children_exactly::<2>()?;
        self.expression(lhs)?;
        emit!(self, "pushq", "{}", Reg::Rax)?;
        self.expression(rhs)?;

        emit!(self, "popq", "{}", Reg::R10)?;
        emit!(self, "cmpq", "{}, {}", Reg::Rax, Reg::R10)?;
        emit!(self, jump, "{}", skip)?;

        Ok(())
    }
}
