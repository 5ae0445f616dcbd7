macro_rules! emit {
    ($cx:expr, $opcode:expr) => {
        writeln!($cx.output, "\t{}", $opcode)
    };

    ($cx:expr, $opcode:expr, $($format:tt)*) => {{
        write!($cx.output, "\t{:8}", $opcode)?;
        writeln!($cx.output, $($format)*)
    }};
}

macro_rules! label {
    ($cx:expr, $($format:tt)*) => {{
        write!($cx.output, $($format)*)?;
        writeln!($cx.output, ":")
    }};
}

macro_rules! directive {
    ($cx:expr, $($format:tt)*) => {
        writeln!($cx.output, $($format)*)
    };
}
