//! Detalles específicos del sistema objetivo.
//!
//! La ISA es siempre x86-64 con la convención de llamada System V,
//! descrita en [`x86_64`]. Lo que cambia entre plataformas son los
//! nombres de secciones y la forma de declarar símbolos externos, lo
//! cual se agrupa en [`Directives`].

pub mod x86_64;

/// Directivas de ensamblador que dependen de la plataforma.
pub struct Directives {
    /// Sección de literales de string.
    pub string_section: &'static str,

    /// Sección de datos inicializados en cero.
    pub bss_section: &'static str,

    /// Líneas que se emiten al final del listado para exportar `main`
    /// y enlazar contra la biblioteca de C.
    pub declarations: &'static [&'static str],
}

pub static LINUX: Directives = Directives {
    string_section: ".rodata",
    bss_section: ".bss",
    declarations: &[
        ".global main",
        // El stack no requiere permisos de ejecución
        ".section .note.GNU-stack,\"\",@progbits",
    ],
};

/// En Mach-O los símbolos de C llevan un `_` al inicio.
pub static MACOS: Directives = Directives {
    string_section: "__TEXT, __cstring",
    bss_section: "__DATA, __bss",
    declarations: &[
        ".set printf, _printf",
        ".set putchar, _putchar",
        ".set puts, _puts",
        ".set strtol, _strtol",
        ".set exit, _exit",
        ".set _main, main",
        ".global _main",
    ],
};
