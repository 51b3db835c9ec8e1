//! The Garnet checker CLI.
//!
//! Provides the `garnetc` command with the following subcommands:
//!
//! - `garnetc check <tree.json>` - Type-check a serialized syntax tree
//! - `garnetc fmt <tree.json>` - Print a serialized tree as source text
//!
//! Trees are the JSON form of `garnet_ast::ParsedProgram`, as written by the
//! parser. Settings come from `--config`, or a `garnet.toml` next to the tree.

mod settings;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use garnet_ast::{NodeId, ParsedProgram};
use garnet_fmt::{format_annotated, format_tree};
use garnet_typeck::{check_with, DiagnosticOptions, TypeckResult};
use tracing::Level;

use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "garnetc", version, about = "The Garnet type checker")]
struct Cli {
    /// Log inference progress to stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Type-check a serialized syntax tree
    Check {
        /// Path to the tree (JSON)
        tree: PathBuf,

        /// Source text the tree was parsed from, for diagnostics
        #[arg(long)]
        source: Option<PathBuf>,

        /// Settings file (defaults to garnet.toml beside the tree)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the re-inference bound per specialization
        #[arg(long = "max-passes")]
        max_passes: Option<u32>,

        /// Print the program annotated with inferred types
        #[arg(long)]
        print: bool,

        /// Output the result and diagnostics as JSON
        #[arg(long)]
        json: bool,

        /// Disable colorized output
        #[arg(long = "no-color")]
        no_color: bool,
    },
    /// Print a serialized syntax tree as source text
    Fmt {
        /// Path to the tree (JSON)
        tree: PathBuf,

        /// Settings file (defaults to garnet.toml beside the tree)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match cli.command {
        Commands::Check {
            tree,
            source,
            config,
            max_passes,
            print,
            json,
            no_color,
        } => {
            let diag_opts = DiagnosticOptions {
                color: !no_color && !json,
                json,
            };
            run_check(&tree, source.as_deref(), config.as_deref(), max_passes, print, &diag_opts)
        }
        Commands::Fmt { tree, config } => run_fmt(&tree, config.as_deref()),
    };

    if let Err(e) = outcome {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(level)
        .init();
}

/// Read and validate a serialized tree.
fn load_tree(path: &Path) -> Result<ParsedProgram, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let program: ParsedProgram = serde_json::from_str(&text)
        .map_err(|e| format!("'{}' is not a syntax tree: {}", path.display(), e))?;
    program
        .prepare()
        .map_err(|e| format!("'{}' is malformed: {}", path.display(), e))
}

fn run_check(
    tree: &Path,
    source: Option<&Path>,
    config: Option<&Path>,
    max_passes: Option<u32>,
    print: bool,
    diag_opts: &DiagnosticOptions,
) -> Result<(), String> {
    let mut settings = Settings::load(config, tree)?;
    if let Some(max) = max_passes {
        settings.infer.max_fixpoint_passes = max;
    }
    let program = load_tree(tree)?;
    let result = check_with(&program, &settings.infer);

    if !result.is_ok() {
        report_diagnostics(&result, tree, source, diag_opts)?;
        return Err("type checking failed".to_string());
    }

    if diag_opts.json {
        let summary = serde_json::to_string_pretty(&result.summary())
            .map_err(|e| format!("Failed to serialize the result: {}", e))?;
        println!("{}", summary);
    } else if print {
        let annotate = |id: NodeId| result.type_name(id);
        print!(
            "{}",
            format_annotated(&result.ast, result.root, &annotate, &settings.format)
        );
    } else {
        println!("{}", result.result_name().unwrap_or_default());
    }
    Ok(())
}

/// Write every error of `result` to stderr, one JSON object per line in
/// JSON mode.
fn report_diagnostics(
    result: &TypeckResult,
    tree: &Path,
    source: Option<&Path>,
    diag_opts: &DiagnosticOptions,
) -> Result<(), String> {
    let (text, file_name) = match source {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
            (text, path.display().to_string())
        }
        None => (String::new(), tree.display().to_string()),
    };
    for error in &result.errors {
        let rendered = garnet_typeck::render_diagnostic(error, &text, &file_name, diag_opts);
        if diag_opts.json {
            eprintln!("{}", rendered);
        } else {
            eprint!("{}", rendered);
        }
    }
    Ok(())
}

fn run_fmt(tree: &Path, config: Option<&Path>) -> Result<(), String> {
    let settings = Settings::load(config, tree)?;
    let program = load_tree(tree)?;
    print!("{}", format_tree(&program.ast, program.root, &settings.format));
    Ok(())
}
