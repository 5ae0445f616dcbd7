//! x86-64 con la ABI System V, en sintaxis AT&T.
//!
//! # Disposición del stack frame
//! Al entrar a una función se guarda `%rbp` y se establece un nuevo
//! frame. Los primeros seis parámetros llegan en registros y se copian
//! de inmediato al stack, en orden, seguidos de un espacio de 8 bytes
//! por cada variable local. Los parámetros a partir del séptimo quedan
//! donde los colocó el llamador, por encima de la dirección de retorno.
//!
//! ```text
//!        ...
//!  +24   parámetro 7
//!  +16   parámetro 6
//!   +8   dirección de retorno
//!    0   %rbp anterior            <- %rbp
//!   -8   parámetro 0
//!        ...
//!  -48   parámetro 5
//!  -56   primera local
//!        ...
//! ```

use std::fmt::{self, Display};

/// Esta es una arquitectura de 64 bits.
pub const VALUE_SIZE: i64 = 8;

/// Registro de procesador.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reg {
    Rax,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    Rsp,
    Rbp,
    Rip,
}

impl Reg {
    /* La ABI indica que se coloquen los primeros 6 argumentos en los registros %rdi, %rsi, %rdx, %rcx,
     * %r8 y %r9. Si hay más se ponen en el stack en orden inverso.
     */
    pub const MAX_ARGS: usize = 6;

    pub fn argument_sequence() -> impl Iterator<Item = Reg> {
        use Reg::*;

        std::iter::successors(Some(Rdi), |last| match last {
            Rdi => Some(Rsi),
            Rsi => Some(Rdx),
            Rdx => Some(Rcx),
            Rcx => Some(R8),
            R8 => Some(R9),
            _ => None,
        })
    }
}

impl Display for Reg {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Reg::*;

        let name = match self {
            Rax => "%rax",
            Rcx => "%rcx",
            Rdx => "%rdx",
            Rsi => "%rsi",
            Rdi => "%rdi",
            R8 => "%r8",
            R9 => "%r9",
            R10 => "%r10",
            Rsp => "%rsp",
            Rbp => "%rbp",
            Rip => "%rip",
        };

        formatter.write_str(name)
    }
}

/// Ubicación en memoria de un valor con nombre.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address<'a> {
    /// Etiqueta `.<nombre>` relativa a `%rip`.
    Global(&'a str),

    /// Desplazamiento en bytes respecto a `%rbp`.
    Frame(i64),
}

impl Display for Address<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Global(name) => write!(formatter, ".{}({})", name, Reg::Rip),
            Address::Frame(offset) => write!(formatter, "{}({})", offset, Reg::Rbp),
        }
    }
}

/// Desplazamiento del parámetro con número de secuencia `sequence`.
pub fn parameter_offset(sequence: usize) -> i64 {
    if sequence < Reg::MAX_ARGS {
        -(sequence as i64 + 1) * VALUE_SIZE
    } else {
        2 * VALUE_SIZE + (sequence - Reg::MAX_ARGS) as i64 * VALUE_SIZE
    }
}

/// Desplazamiento de una local, dada la cantidad de parámetros de su función.
///
/// Las secuencias de las locales comienzan luego de las de los
/// parámetros, pero solo los parámetros en registros ocupan espacio en
/// el frame propio.
pub fn local_offset(sequence: usize, parameters: usize) -> i64 {
    let on_caller_stack = parameters.saturating_sub(Reg::MAX_ARGS);
    -((sequence - on_caller_stack) as i64 + 1) * VALUE_SIZE
}

/// Operando inmediato. Se indica si requiere `movabsq`.
pub fn immediate(value: i64) -> (&'static str, String) {
    let opcode = if i32::try_from(value).is_ok() {
        "movq"
    } else {
        "movabsq"
    };

    (opcode, format!("${}", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn six_argument_registers() {
        let registers: Vec<_> = Reg::argument_sequence().map(|reg| reg.to_string()).collect();
        assert_eq!(registers, ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"]);
        assert_eq!(registers.len(), Reg::MAX_ARGS);
    }

    #[test_case(0, -8)]
    #[test_case(5, -48)]
    #[test_case(6, 16; "first stack parameter")]
    #[test_case(8, 32)]
    fn parameter_offsets(sequence: usize, offset: i64) {
        assert_eq!(parameter_offset(sequence), offset);
    }

    #[test_case(2, 2, -24; "after two parameters")]
    #[test_case(6, 6, -56; "after six parameters")]
    #[test_case(8, 8, -56; "after eight parameters")]
    #[test_case(10, 8, -72)]
    fn local_offsets(sequence: usize, parameters: usize, offset: i64) {
        assert_eq!(local_offset(sequence, parameters), offset);
    }

    #[test]
    fn addresses_render_in_att_syntax() {
        assert_eq!(Address::Global("counter").to_string(), ".counter(%rip)");
        assert_eq!(Address::Frame(-16).to_string(), "-16(%rbp)");
    }

    #[test]
    fn wide_immediates_need_movabsq() {
        assert_eq!(immediate(-5), ("movq", "$-5".to_owned()));
        assert_eq!(immediate(1 << 40), ("movabsq", "$1099511627776".to_owned()));
    }
}
