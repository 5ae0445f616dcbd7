//! Construcción de ejecutables.
//!
//! Una vez que se ha emitido código ensamblador, este debe ser
//! ensamblado y enlazado contra la biblioteca de C del sistema para
//! producir un binario ejecutable. Ambas tareas se delegan al
//! compilador de C del sistema, `cc`.

use std::{
    io::{self, BufWriter},
    path::Path,
    process::{Child, ChildStdin, Command, ExitStatus, Stdio},
    str::FromStr,
};

use bitflags::bitflags;
use thiserror::Error;
use tracing::info;

use crate::arch::{self, Directives};

bitflags! {
    /// Opciones a aplicar durante el enlazado.
    pub struct LinkOptions: u32 {
        /// Remover símbolos de depuración del ejecutable final.
        const STRIP = 0x01;
    }
}

/// Un error de ensamblado o enlazado.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LinkerError {
    /// Ocurrió un evento de error de E/S durante la invocación
    /// de comandos externos.
    #[error("I/O error")]
    Io(#[from] io::Error),

    /// El enlazador inició su ejecución, pero falló en enlazar.
    #[error("Linker exited with status code {0:?}")]
    Failed(ExitStatus),
}

/// Plataforma objetivo.
///
/// Ambas plataformas comparten ISA y convención de llamada. Difieren
/// en el formato de objeto, lo cual afecta nombres de secciones y de
/// símbolos externos.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
}

impl Platform {
    /// Plataforma sobre la que corre el compilador.
    pub fn host() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Nombre aceptado en línea de comandos.
    pub fn name(self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
        }
    }

    pub(crate) fn directives(self) -> &'static Directives {
        match self {
            Platform::Linux => &arch::LINUX,
            Platform::MacOs => &arch::MACOS,
        }
    }

    /// Argumentos adicionales al comando de enlazado que se necesitan
    /// para esta plataforma.
    fn link_params(self) -> &'static [&'static str] {
        match self {
            // Las llamadas a la biblioteca de C no pasan por la PLT
            Platform::Linux => &["-no-pie"],
            Platform::MacOs => &[],
        }
    }
}

impl FromStr for Platform {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        [Platform::Linux, Platform::MacOs]
            .into_iter()
            .find(|platform| unicase::eq_ascii(platform.name(), string))
            .ok_or(())
    }
}

/// Instancia del enlazador para un ejecutable definido.
pub struct Linker {
    child: Child,
    stdin: BufWriter<ChildStdin>,
}

impl Linker {
    /// Inicia una instancia del enlazador.
    ///
    /// El enlazador tratará de emitir un ejecutable y escribirlo a
    /// la ruta indicada por `output`.
    pub fn spawn<O>(platform: Platform, output: &O, opts: LinkOptions) -> Result<Self, LinkerError>
    where
        O: AsRef<Path> + ?Sized,
    {
        // Para ensamblar el código máquina generado por codegen,
        // se hace pipe del mismo al stdin del compilador de C.
        let mut command = Command::new("cc");
        command
            .args(platform.link_params())
            .arg("-o")
            .arg(output.as_ref())
            .args(["-x", "assembler", "-"])
            .stdin(Stdio::piped());

        if opts.contains(LinkOptions::STRIP) {
            command.arg("-s");
        }

        info!(?platform, output = %output.as_ref().display(), "spawning linker");

        let mut child = command.spawn()?;
        let stdin = child.stdin.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "linker stdin is not piped")
        })?;

        Ok(Linker {
            child,
            stdin: BufWriter::new(stdin),
        })
    }

    /// Obtiene la entrada estándar del proceso que espera recibir ensamblador.
    ///
    /// Luego de crear una instancia con [`Linker::spawn()`], se debe escribir
    /// código ensamblador en la forma exacta en que fue emitido por las fases
    /// de generación de código.
    pub fn stdin(&mut self) -> &mut BufWriter<ChildStdin> {
        &mut self.stdin
    }

    /// Indica el fin del flujo de código y finaliza el enlazado.
    pub fn finish(mut self) -> Result<(), LinkerError> {
        self.stdin.into_inner().map_err(io::Error::from)?;

        let status = self.child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(LinkerError::Failed(status))
        }
    }
}
