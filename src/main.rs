//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{anyhow, bail, Context};
use bitflags::bitflags;
use clap::{self, crate_version, Arg, ArgMatches, Command};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vslc::{
    error::Diagnostics,
    link::{LinkOptions, Linker, Platform},
    parse, resolve_names, simplify_tree, source, target,
};

use std::{
    fs::{self, File},
    io::{self, BufReader, Write},
    process,
    str::FromStr,
};

bitflags! {
    /// Representaciones intermedias a imprimir en stderr.
    struct DumpOptions: u32 {
        const TREE = 0x01;
        const AST = 0x02;
        const SYMBOLS = 0x04;
    }
}

fn main() -> anyhow::Result<()> {
    // RUST_LOG tiene prioridad sobre el nivel por omisión
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Parsing de CLI
    let args = cli().get_matches();

    let platform = match args.value_of("target") {
        Some(target) => {
            Platform::from_str(target).map_err(|()| anyhow!("Unknown target: {}", target))?
        }

        None => Platform::host(),
    };

    let asm = args.is_present("asm");
    let output = args
        .value_of("output")
        .unwrap_or(if asm { "-" } else { "a.out" });

    let dumps = dump_options(&args);

    // Se extraen argumentos necesarios
    let input = args.value_of("input").unwrap_or("-");
    let source = if input == "-" {
        source::consume(io::stdin().lock(), "<stdin>")
    } else {
        File::open(input).and_then(|file| source::consume(BufReader::new(file), input))
    }
    .with_context(|| format!("Failed to read tree dump: {}", input))?;

    let parse_tree = match parse::read_tree(&source) {
        Ok(tree) => tree,
        Err(error) => {
            eprint!("{}", Diagnostics::from(error).kind("Malformed tree"));
            process::exit(1);
        }
    };

    if dumps.contains(DumpOptions::TREE) {
        eprint!("{}", parse_tree);
    }

    let mut ast = simplify_tree(parse_tree);
    if dumps.contains(DumpOptions::AST) {
        eprint!("{}", ast);
    }

    let resolution = resolve_names(&mut ast).context("Name resolution failed")?;
    if dumps.contains(DumpOptions::SYMBOLS) {
        eprint!("{}", resolution.tables);
        eprint!("{}", resolution.strings);
        eprint!("{}", ast.bound(&resolution.tables));
    }

    // Nada se escribe a la salida hasta que la generación concluye con éxito
    let mut assembly = Vec::new();
    target::emit(
        &ast,
        &resolution.tables,
        &resolution.strings,
        platform,
        &mut assembly,
    )
    .context("Code generation failed")?;

    info!(bytes = assembly.len(), platform = platform.name(), "generated assembly");

    match (asm, output) {
        // Salida a stdout sin enlazado
        (true, "-") => {
            let mut stdout = io::stdout();
            stdout
                .write_all(&assembly)
                .and_then(|()| stdout.flush())
                .context("Failed to emit to stdout")?;
        }

        // Salida a archivo sin enlazado
        (true, path) => {
            fs::write(path, &assembly)
                .with_context(|| format!("Failed to emit to file: {}", path))?;
        }

        // Salida a stdout con enlazado
        (false, "-") => bail!("Refusing to write executable to stdout"),

        // Salida a archivo con enlazado
        (false, path) => {
            let mut options = LinkOptions::empty();
            if args.is_present("strip") {
                options |= LinkOptions::STRIP;
            }

            let mut linker = Linker::spawn(platform, path, options).context("Failed to link")?;
            linker
                .stdin()
                .write_all(&assembly)
                .context("Failed to emit assembly to assembler")?;

            linker
                .finish()
                .with_context(|| format!("Failed to generate executable: {}", path))?;
        }
    };

    Ok(())
}

fn cli() -> Command<'static> {
    Command::new("vslc")
        .version(crate_version!())
        .about("VSL compiler back end")
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .default_value("-")
                .help("Parse tree dump ('-' for stdin)"),
        )
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .value_name("PLATFORM")
                .takes_value(true)
                .possible_values(["linux", "macos"])
                .help("Target platform [default: host]"),
        )
        .arg(
            Arg::new("asm")
                .short('S')
                .help("Generate assembly instead of linking"),
        )
        .arg(Arg::new("strip").short('s').help("Strip executables"))
        .arg(
            Arg::new("output")
                .short('o')
                .takes_value(true)
                .value_name("FILE")
                .help("Output file ('-' along with -S for stdout)"),
        )
        .arg(
            Arg::new("dump-tree")
                .long("dump-tree")
                .help("Print the parse tree to stderr"),
        )
        .arg(
            Arg::new("dump-ast")
                .long("dump-ast")
                .help("Print the simplified tree to stderr"),
        )
        .arg(
            Arg::new("dump-symbols")
                .long("dump-symbols")
                .help("Print symbol tables, strings and the bound tree to stderr"),
        )
}

fn dump_options(args: &ArgMatches) -> DumpOptions {
    let mut dumps = DumpOptions::empty();
    for (flag, dump) in [
        ("dump-tree", DumpOptions::TREE),
        ("dump-ast", DumpOptions::AST),
        ("dump-symbols", DumpOptions::SYMBOLS),
    ] {
        if args.is_present(flag) {
            dumps |= dump;
        }
    }

    dumps
}
