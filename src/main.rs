use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use cssx::{compile_file, find_sources, CssxError, FunctionRegistry, Value};

#[derive(Parser)]
#[command(name = "cssx", version)]
#[command(about = "cssx — compile .cssx styles to CSS + live expression maps")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .cssx file to .css + .cssx.map.json beside it
    Compile {
        /// Input .cssx file
        file: PathBuf,

        /// JSON file of build-time state bindings
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Batch compile all .cssx files under a directory
    Build {
        /// Input directory containing .cssx files
        dir: PathBuf,

        /// JSON file of build-time state bindings
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Compile a .cssx file without writing output
    Check {
        /// Input .cssx file
        file: PathBuf,

        /// JSON file of build-time state bindings
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Start a hot-reload dev server over a directory of .cssx files
    Dev {
        /// Directory containing .cssx sources
        dir: PathBuf,

        /// Server port
        #[arg(long, default_value_t = 3333)]
        port: u16,

        /// JSON file of build-time state bindings
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile { file, state } => {
            let static_state = load_state(state.as_deref());
            let output = match compile_file(&file, &FunctionRegistry::with_stdlib(), &static_state)
            {
                Ok(o) => o,
                Err(e) => {
                    eprintln!("error: {e}");
                    process::exit(1);
                }
            };
            if let Err(e) = cssx::compiler::write_outputs(&output) {
                eprintln!("error: {e}");
                process::exit(1);
            }
            eprintln!("wrote {}", output.css_output_path.display());
            if !output.map.is_empty() {
                eprintln!(
                    "wrote {} ({} dynamic expr(s))",
                    output.map_output_path.display(),
                    output.map.len()
                );
            }
        }

        Commands::Build { dir, state } => {
            let static_state = load_state(state.as_deref());
            let sources = match find_sources(&dir) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("error: {e}");
                    process::exit(1);
                }
            };
            if sources.is_empty() {
                eprintln!("no .cssx files found in {}", dir.display());
                process::exit(1);
            }

            eprintln!("compiling {} file(s)...", sources.len());
            let mut failed = 0;
            let mut deferred_total = 0;
            for source in &sources {
                let functions = FunctionRegistry::with_stdlib();
                match compile_file(source, &functions, &static_state)
                    .and_then(|o| cssx::compiler::write_outputs(&o).map(|()| o))
                {
                    Ok(output) => {
                        deferred_total += output.map.len();
                        eprintln!(
                            "  {} -> {} ({} dynamic)",
                            source.display(),
                            output.css_output_path.display(),
                            output.map.len()
                        );
                    }
                    Err(e) => {
                        eprintln!("  {} ... FAILED: {e}", source.display());
                        failed += 1;
                    }
                }
            }
            eprintln!(
                "done: {} compiled, {failed} failed, {deferred_total} dynamic expr(s)",
                sources.len() - failed
            );
            if failed > 0 {
                process::exit(1);
            }
        }

        Commands::Check { file, state } => {
            let static_state = load_state(state.as_deref());
            match compile_file(&file, &FunctionRegistry::with_stdlib(), &static_state) {
                Ok(output) => {
                    let total = cssx::scanner::scan(
                        &fs::read_to_string(&file).unwrap_or_default(),
                    )
                    .count();
                    eprintln!(
                        "{}: {} expression(s), {} resolved, {} deferred",
                        file.display(),
                        total,
                        total - output.map.len(),
                        output.map.len()
                    );
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    process::exit(1);
                }
            }
        }

        Commands::Dev { dir, port, state } => {
            let static_state = load_state(state.as_deref());
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("error: cannot create tokio runtime: {e}");
                    process::exit(1);
                }
            };
            rt.block_on(async {
                if let Err(e) = cssx::server::run_dev_server(dir, port, static_state).await {
                    eprintln!("error: dev server failed: {e}");
                    process::exit(1);
                }
            });
        }
    }
}

/// Load build-time state bindings from a JSON file; no file means an empty
/// scope.
fn load_state(path: Option<&Path>) -> HashMap<String, Value> {
    let Some(path) = path else {
        return HashMap::new();
    };
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {}", CssxError::read(path, e));
            process::exit(1);
        }
    };
    match serde_json::from_str(&text) {
        Ok(state) => state,
        Err(e) => {
            eprintln!(
                "error: {}",
                CssxError::BadState {
                    path: path.to_path_buf(),
                    source: e
                }
            );
            process::exit(1);
        }
    }
}
