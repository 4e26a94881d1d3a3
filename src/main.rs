//! `oslc` — compiles one or more shading-language source files, reporting
//! diagnostics and exiting non-zero on any error.

use clap::Parser as ClapParser;
use oslc::config::CompilerConfig;
use oslc::diagnostics::{DiagnosticSink, TerminalSink};
use oslc::lexer::Lexer;
use oslc::parser::Parser;
use oslc::type_table::TypeTable;
use oslc::typechecker::TypeChecker;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "oslc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Front-end compiler for a shading language in the OSL lineage", long_about = None)]
struct Cli {
    /// Input source files
    inputs: Vec<PathBuf>,

    /// Disable ANSI colour in diagnostic output
    #[arg(long = "no-color")]
    no_color: bool,

    /// Treat warnings as errors
    #[arg(long = "warns-as-errors")]
    warns_as_errors: bool,

    /// Skip populating built-in constructor/operator overloads
    #[arg(long = "no-builtins")]
    no_builtins: bool,

    /// Pretty-print the checked program tree after compilation
    #[arg(long = "print-ast")]
    print_ast: bool,

    /// Stop after this many errors (clamped to at least 2)
    #[arg(long = "max-errors", default_value_t = usize::MAX)]
    max_errors: usize,

    /// Stop counting warnings past this many
    #[arg(long = "max-warns", default_value_t = usize::MAX)]
    max_warns: usize,

    /// Additional include-search directory, repeatable
    #[arg(short = 'I', long = "include-dir", value_name = "DIR")]
    include_dirs: Vec<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if cli.inputs.is_empty() {
        eprintln!("oslc: no input files");
        process::exit(1);
    }
    let config = CompilerConfig::new()
        .with_no_builtins(cli.no_builtins)
        .with_print_ast(cli.print_ast)
        .with_warns_as_errors(cli.warns_as_errors)
        .with_max_errors(cli.max_errors)
        .with_max_warns(cli.max_warns)
        .with_include_dirs(cli.include_dirs)
        .with_disable_colors(cli.no_color);

    let mut had_errors = false;
    for input in &cli.inputs {
        if !compile_one(input, &config) {
            had_errors = true;
        }
    }

    if had_errors {
        process::exit(1);
    }
}

/// Runs lexer -> parser -> (optional) built-ins -> type checker over one
/// file, printing diagnostics as they occur. Returns `false` if
/// the file produced any error.
fn compile_one(path: &PathBuf, config: &CompilerConfig) -> bool {
    let span = tracing::info_span!("compile", file = %path.display());
    let _enter = span.enter();

    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}: error: {}", path.display(), e);
            return false;
        }
    };

    let mut sink = TerminalSink::new(config.disable_colors, config.warns_as_errors, config.max_errors, config.max_warns);

    let tokens = {
        let _span = tracing::info_span!("lex").entered();
        Lexer::new(path, &source).tokenize(&mut sink)
    };

    let mut program = {
        let _span = tracing::info_span!("parse").entered();
        Parser::new(tokens, &mut sink).parse()
    };

    {
        let _span = tracing::info_span!("check").entered();
        let mut table = TypeTable::new();
        let mut checker = TypeChecker::new(&mut table, &mut program.arena, &mut sink, path.clone());
        checker.check_program(&program.decls, !config.no_builtins);
    }

    if config.print_ast {
        print!("{}", oslc::pretty_print(&program.arena, &program.decls, !config.disable_colors));
    }

    let errors = sink.error_count();
    let warns = sink.warn_count();
    if errors > 0 || warns > 0 {
        eprintln!(
            "{}: {} error(s), {} warning(s)",
            path.display(),
            errors,
            warns
        );
    }
    errors == 0
}
