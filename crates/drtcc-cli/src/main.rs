//! Command-line driver: reads a source file, runs it through the lexer,
//! parser and code generator, then executes the result on [`drtcc_vm::Vm`].

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use drtcc_vm::{Vm, VmConfig};

/// Compile and run a drtcc source file.
#[derive(Parser, Debug)]
#[command(name = "drtcc", version, about)]
struct Cli {
    /// Source file to compile and run.
    path: PathBuf,

    /// Arguments forwarded to the guest program's `main(argc, argv)`.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Silence all logging, including errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start the VM with instruction tracing already enabled, equivalent to
    /// the guest calling `trace(1)` before `main` runs.
    #[arg(long)]
    trace: bool,

    /// Number of 4 KiB pages to back the guest heap with.
    #[arg(long, default_value_t = VmConfig::default().heap_pages)]
    heap_pages: u32,
}

fn init_logging(cli: &Cli) {
    use tracing_subscriber::EnvFilter;

    let default_level = if cli.quiet {
        "off"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Read `path` as UTF-8 source text.
///
/// This is the one step in the pipeline with no `spec.md`-mandated error
/// format of its own (a missing or unreadable file isn't a lex/parse/codegen
/// error band), so it's the one place this driver reaches for `anyhow`
/// context rather than a hand-rolled `Display` impl.
fn read_source(path: &PathBuf) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let source = match read_source(&cli.path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("drtcc: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let mut parsed = match drtcc_parser::parse(&source) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    if !parsed.lex_errors.is_empty() {
        for err in &parsed.lex_errors {
            eprintln!("{err}");
        }
        return ExitCode::FAILURE;
    }

    let program = match drtcc_codegen::generate(&parsed.ast, &mut parsed.interner, parsed.root) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let config = VmConfig { heap_pages: cli.heap_pages, trace_on_boot: cli.trace, ..VmConfig::default() };
    let mut vm = Vm::new(&program.text, &program.data, config);

    match vm.exec(program.main_entry, &cli.args) {
        Ok(status) => ExitCode::from(status.rem_euclid(256) as u8),
        Err(err) => {
            eprintln!("drtcc: {err}");
            ExitCode::FAILURE
        }
    }
}
