//! DWS interpreter CLI

use clap::{Parser, Subcommand, ValueEnum};
use dws::error::{CompileError, report_error, report_runtime_error};
use dws::interp::{DEFAULT_MAX_RECURSION_DEPTH, Interpreter, InterpreterConfig};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dws", version, about = "DWS - Pascal-family script interpreter")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Explicit log level (overrides -v/-q)
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevel>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Command {
    /// Run a script
    Run {
        /// Script file
        file: PathBuf,
        /// Maximum script call depth
        #[arg(long, default_value_t = DEFAULT_MAX_RECURSION_DEPTH)]
        max_recursion: usize,
    },
    /// Parse and dump AST as JSON (debug)
    Parse {
        /// Script file
        file: PathBuf,
    },
    /// Tokenize and dump tokens (debug)
    Tokens {
        /// Script file
        file: PathBuf,
    },
    /// Interactive session
    Repl,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet, cli.log_level, cli.log_format);

    let ok = match cli.command {
        Command::Run { file, max_recursion } => run_file(&file, max_recursion),
        Command::Parse { file } => report(parse_file(&file)),
        Command::Tokens { file } => report(tokenize_file(&file)),
        Command::Repl => match dws::repl::Repl::new() {
            Ok(mut repl) => report(repl.run().map_err(Into::into)),
            Err(e) => report(Err(e.into())),
        },
    };

    if !ok {
        std::process::exit(1);
    }
}

fn setup_logging(verbose: u8, quiet: bool, log_level: Option<LogLevel>, log_format: LogFormat) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if let Some(level) = log_level {
        EnvFilter::new(match level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        })
    } else if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Script output owns stdout
    let formatter = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_level(true);

    match log_format {
        LogFormat::Pretty => {
            tracing_subscriber::registry().with(formatter).with(filter).init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry().with(formatter.json()).with(filter).init();
        }
    }
}

fn report(result: Result<(), Box<dyn std::error::Error>>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            eprintln!("Error: {e}");
            false
        }
    }
}

fn run_file(path: &Path, max_recursion: usize) -> bool {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: {}: {e}", path.display());
            return false;
        }
    };
    let filename = path.display().to_string();

    let program = match dws::parser::parse_source(&source) {
        Ok(program) => program,
        Err(e) => {
            report_error(&filename, &source, &e);
            return false;
        }
    };

    let mut interp = Interpreter::with_config(InterpreterConfig {
        max_recursion_depth: max_recursion,
    });
    match interp.run(&program) {
        Ok(()) => true,
        Err(e) => {
            report_runtime_error(&filename, &source, &e.to_string(), e.span);
            false
        }
    }
}

fn parse_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;
    let filename = path.display().to_string();

    let tokens = dws::lexer::tokenize(&source)?;
    let ast = dws::parser::parse(&filename, &source, tokens).inspect_err(|e: &CompileError| {
        report_error(&filename, &source, e);
    })?;

    println!("{}", serde_json::to_string_pretty(&ast)?);
    Ok(())
}

fn tokenize_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let source = std::fs::read_to_string(path)?;

    let tokens = dws::lexer::tokenize(&source)?;
    for (tok, span) in &tokens {
        println!("{:?} @ {}:{} ({}..{})", tok, span.line, span.column, span.start, span.end);
    }

    Ok(())
}
