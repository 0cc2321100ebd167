use clap::{Parser, Subcommand};
use lsp_types::Position;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use tracing_subscriber::EnvFilter;

use reflens::config::{get_config_path, load_config, save_config, ReflensConfig};
use reflens::errors::{ReflensError, Result};
use reflens::hover::{resolve_hover, HoverOptions};
use reflens::lsp::LspServer;
use reflens::revision::lookup_for;
use reflens::scanner::{scan_references, OsFileSystem};
use reflens::text::LineIndex;

/// Links @path references and explains hex hashes in text documents.
#[derive(Parser)]
#[command(
    name = "reflens",
    version,
    about = "Links @path references and explains hex hashes in text documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the language server on stdio
    Serve {
        /// Workspace root (default: the folder the editor reports)
        #[arg(short, long)]
        root: Option<String>,
    },
    /// List the @references in a file that resolve to existing paths
    Links {
        /// File to scan
        file: String,
        /// Workspace root (default: current directory)
        #[arg(short, long)]
        root: Option<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Show the hover for the hash at a position in a file
    Hover {
        /// File to inspect
        file: String,
        /// Zero-based line
        #[arg(short, long)]
        line: u32,
        /// Zero-based column in UTF-16 code units
        #[arg(short, long)]
        column: u32,
        /// Workspace root (default: current directory)
        #[arg(short, long)]
        root: Option<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Write a default .reflens/config.json
    Init {
        /// Workspace path (default: current directory)
        path: Option<String>,
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Logs go to stderr; stdout belongs to the protocol.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reflens=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Serve { root } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let mut server = LspServer::new(root.map(PathBuf::from));
            runtime.block_on(server.run_stdio())?;
            // LSP: exit code 1 when the client exits without a shutdown request.
            return Ok(if server.shutdown_requested() { 0 } else { 1 });
        }
        Commands::Links { file, root, json } => {
            let root = resolve_path(root);
            let text = read_document(Path::new(&file))?;
            let links = scan_references(&text, Some(&root), &OsFileSystem);
            if json {
                println!("{}", serde_json::to_string_pretty(&links)?);
            } else if links.is_empty() {
                println!("No links found in '{}'", file);
            } else {
                let index = LineIndex::new(&text);
                for link in &links {
                    let pos = index.offset_to_position(link.span.start);
                    println!(
                        "{}:{} {} -> {}",
                        pos.line + 1,
                        pos.character + 1,
                        link.span.slice(&text).unwrap_or_default(),
                        link.target.display()
                    );
                }
            }
        }
        Commands::Hover {
            file,
            line,
            column,
            root,
            json,
        } => {
            let root = resolve_path(root);
            let config = load_config(&root)?;
            let text = read_document(Path::new(&file))?;
            let index = LineIndex::new(&text);
            let offset = index
                .position_to_offset(Position::new(line, column))
                .ok_or_else(|| ReflensError::File {
                    message: format!("line {} is past the end of the file", line),
                    path: file.clone(),
                })?;

            let lookup = lookup_for(&config);
            let options = HoverOptions::from(&config);
            match resolve_hover(&text, offset, Some(&root), lookup.as_ref(), &options) {
                Some(content) if json => {
                    println!("{}", serde_json::to_string_pretty(&content)?);
                }
                Some(content) => println!("{}", content.to_markdown()),
                None => println!("No hash at {}:{}", line, column),
            }
        }
        Commands::Init { path, force } => {
            let root = resolve_path(path);
            let config_path = get_config_path(&root);
            if config_path.exists() && !force {
                return Err(ReflensError::Config {
                    message: format!(
                        "'{}' already exists; pass --force to overwrite",
                        config_path.display()
                    ),
                });
            }
            save_config(&root, &ReflensConfig::default())?;
            println!("Wrote {}", config_path.display());
        }
    }
    Ok(0)
}

fn read_document(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| ReflensError::File {
        message: e.to_string(),
        path: path.display().to_string(),
    })
}

/// Resolves an optional path argument to a `PathBuf`.
///
/// Defaults to the current working directory if no path is provided.
fn resolve_path(path: Option<String>) -> PathBuf {
    match path {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
