//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del front end y expone
//! una CLI. Sin argumentos se lee `testfile.txt` y se escriben
//! `parser.txt` y, de haber errores, `error.txt` en el directorio actual.

use anyhow::{anyhow, Context};
use bitflags::bitflags;
use clap::{crate_version, Arg, ArgAction, Command};
use sysy_frontend::{error::Diagnostics, lex, parse};
use tracing::info;
use tracing_subscriber::EnvFilter;

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    str::FromStr,
};

const LISTING_FILE: &str = "lexer.txt";
const TRACE_FILE: &str = "parser.txt";
const ERROR_FILE: &str = "error.txt";

bitflags! {
    /// Archivos de salida solicitados.
    struct Artifacts: u32 {
        /// Listado de tokens en `lexer.txt`.
        const TOKENS = 0x01;

        /// Traza sintáctica en `parser.txt`.
        const TRACE = 0x02;
    }
}

impl FromStr for Artifacts {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string {
            "tokens" => Ok(Artifacts::TOKENS),
            "trace" => Ok(Artifacts::TRACE),
            _ => Err(()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new("SysY front end")
        .version(crate_version!())
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .default_value("testfile.txt")
                .help("Source file"),
        )
        .arg(
            Arg::new("emit")
                .long("emit")
                .value_name("ARTIFACTS")
                .action(ArgAction::Append)
                .value_delimiter(',')
                .value_parser(["tokens", "trace"])
                .default_value("trace")
                .help("Outputs to write: 'tokens' (lexer.txt), 'trace' (parser.txt)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase log verbosity"),
        )
        .get_matches();

    init_logging(args.get_count("verbose"));

    // Se extraen argumentos necesarios
    let input = args
        .get_one::<String>("input")
        .map(String::as_str)
        .unwrap_or("testfile.txt");

    let mut artifacts = Artifacts::empty();
    for name in args.get_many::<String>("emit").into_iter().flatten() {
        artifacts |= Artifacts::from_str(name)
            .map_err(|()| anyhow!("main.rs allowed a bad artifact: {}", name))?;
    }

    let file = File::open(input).with_context(|| format!("Failed to open for reading: {}", input))?;
    let tokens = lex::tokenize(BufReader::new(file))
        .with_context(|| format!("Failed to tokenize: {}", input))?;

    info!(count = tokens.len(), input, "lexical analysis finished");

    let mut diagnostics = Diagnostics::default();
    if artifacts.contains(Artifacts::TOKENS) {
        // Sin parser, el listado mismo reporta `&` y `|` aislados
        let standalone = if artifacts.contains(Artifacts::TRACE) {
            None
        } else {
            Some(&mut diagnostics)
        };

        let mut output = create(LISTING_FILE)?;
        lex::write_listing(&tokens, standalone, &mut output)
            .and_then(|()| output.flush())
            .with_context(|| format!("Failed to write: {}", LISTING_FILE))?;
    }

    let mut outcome = Ok(());
    if artifacts.contains(Artifacts::TRACE) {
        // La traza parcial se conserva aun si el análisis falla
        let mut output = create(TRACE_FILE)?;
        outcome = parse::parse(&tokens, &mut diagnostics, &mut output).map(|_| ());

        output
            .flush()
            .with_context(|| format!("Failed to write: {}", TRACE_FILE))?;

        if outcome.is_ok() {
            info!("syntax analysis finished");
        }
    }

    diagnostics.sort_by_line();
    if diagnostics.has_errors() {
        info!(count = diagnostics.len(), "writing diagnostics");

        let mut output = create(ERROR_FILE)?;
        diagnostics
            .write(&mut output)
            .and_then(|()| output.flush())
            .with_context(|| format!("Failed to write: {}", ERROR_FILE))?;
    }

    outcome.with_context(|| format!("Failed to parse: {}", input))
}

fn create(path: &str) -> anyhow::Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("Failed to open for writing: {}", path))?;
    Ok(BufWriter::new(file))
}

/// Instala el suscriptor de logs, que escribe a stderr.
///
/// `RUST_LOG` tiene prioridad sobre `-v`.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sysy_frontend={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}
