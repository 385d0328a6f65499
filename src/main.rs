//! SIML command line
//!
//! Usage:
//!   siml flatten <module.json>   - Compile a module and print its flat objects
//!   siml check <module.json>     - Compile a module and report errors only
//!   siml version                 - Show version

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

use siml::{BuildConfig, FlatObject, Interpreter, Module, SimlError, VERSION};

#[derive(Parser)]
#[command(name = "siml")]
#[command(about = "SIML - staged evaluator and object flattener", long_about = None)]
struct Cli {
    /// Path to a TOML build configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log compiler internals (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a module and print its flat objects
    Flatten {
        /// Module syntax tree as JSON
        module: PathBuf,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print pseudo-code instead of JSON
        #[arg(long)]
        text: bool,

        /// Source text of the module, used to show the offending line of errors
        #[arg(long)]
        source: Option<PathBuf>,
    },

    /// Compile a module and only report errors
    Check {
        /// Module syntax tree as JSON
        module: PathBuf,

        #[arg(long)]
        source: Option<PathBuf>,
    },

    /// Show version
    Version,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => match BuildConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => fail(&e.to_string()),
        },
        None => BuildConfig::default(),
    };

    match cli.command {
        Commands::Flatten {
            module,
            output,
            text,
            source,
        } => {
            let objects = compile(&module, source.as_deref(), config);
            let rendered = if text {
                objects.iter().map(FlatObject::pseudo_code).collect::<Vec<_>>().join("\n")
            } else {
                match serde_json::to_string_pretty(&objects) {
                    Ok(json) => json,
                    Err(e) => fail(&format!("cannot serialize result: {}", e)),
                }
            };
            match output {
                Some(path) => {
                    if let Err(e) = fs::write(&path, rendered) {
                        fail(&format!("cannot write '{}': {}", path.display(), e));
                    }
                }
                None => println!("{}", rendered),
            }
        }
        Commands::Check { module, source } => {
            let objects = compile(&module, source.as_deref(), config);
            for object in &objects {
                println!("{} {}", "ok".green().bold(), object.name);
            }
        }
        Commands::Version => println!("SIML {}", VERSION),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "siml=debug",
        _ => "siml=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(message: &str) -> ! {
    eprintln!("{}: {}", "error".red(), message);
    process::exit(1);
}

fn read_module(path: &Path) -> Module {
    let text = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => fail(&format!("cannot read file '{}': {}", path.display(), e)),
    };
    match serde_json::from_str(&text) {
        Ok(module) => module,
        Err(e) => fail(&format!("invalid module '{}': {}", path.display(), e)),
    }
}

fn compile(path: &Path, source: Option<&Path>, config: BuildConfig) -> Vec<FlatObject> {
    let module = read_module(path);
    let mut interpreter = Interpreter::with_config(config);
    let result = interpreter.interpret(&module);
    for line in interpreter.output() {
        println!("{}", line);
    }
    match result {
        Ok(objects) => objects,
        Err(e) => {
            report(e, source);
            process::exit(1);
        }
    }
}

fn report(err: SimlError, source: Option<&Path>) {
    let err = match source.and_then(|p| fs::read_to_string(p).ok()) {
        Some(text) => err.with_source(&text),
        None => err,
    };
    eprintln!("{}", format!("{}", err).red());
}
