//! jsembed command-line tool
//!
//! Evaluates inline code or script files in an embedded JavaScript
//! context, and drives the context's debug channel.

use clap::{Parser, Subcommand};
use jsembed_cli::commands::{debug, eval, run, version, EngineArgs};
use jsembed_cli::output::{resolve_color_choice, StyledOutput};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jsembed")]
#[command(about = "Run scripts in an embedded JavaScript context", long_about = None)]
#[command(version)]
struct Cli {
    /// Log engine activity at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate inline code and print the result
    Eval {
        /// Source text
        code: String,
    },

    /// Run a script file and print its completion value
    Run {
        /// Script file
        file: PathBuf,
        /// Print the completion value as JSON
        #[arg(long)]
        print_json: bool,
    },

    /// Show tool and engine versions
    Version,

    /// Run a script, then send raw debug commands and print the replies
    Debug {
        /// Script file
        file: PathBuf,
        /// Commands sent in order, e.g. '{"id":1,"method":"Runtime.getVersion"}'
        #[arg(required = true)]
        commands: Vec<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "jsembed=debug" } else { "jsembed=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mut out = StyledOutput::new(resolve_color_choice(cli.color.as_deref()));

    let result = match cli.command {
        Commands::Eval { code } => eval::execute(code, &cli.engine, &mut out),
        Commands::Run { file, print_json } => {
            run::execute(run::RunArgs { file, print_json }, &cli.engine, &mut out)
        }
        Commands::Version => version::execute(&mut out),
        Commands::Debug { file, commands } => {
            debug::execute(debug::DebugArgs { file, commands }, &cli.engine, &mut out)
        }
    };

    if let Err(e) = result {
        out.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
