//! csyms: extract functions, global variables and types from a C/C++ file.
//!
//! Parses one translation unit (the target plus whatever it includes),
//! keeps the declarations that belong to the target, and prints them as a
//! YAML or JSON document:
//!
//! - `csyms -f src/module.c`: functions with bodies, globals, typedefs
//! - `csyms -f src/module.c -o build/flags.txt -c -d`: with compiler
//!   arguments, call references and documentation comments

mod analysis;
mod model;
mod options;
mod parser;
mod render;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "csyms",
    about = "Extract functions, global variables and types from a C/C++ source file"
)]
struct Cli {
    /// Target source file
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// File of whitespace-separated compiler arguments (-I, -D, -std=, ...)
    #[arg(short = 'o', long)]
    options: Option<PathBuf>,

    /// Reserved: would list included headers (currently no effect)
    #[arg(short = 'i', long)]
    #[allow(dead_code)]
    includes: bool,

    /// Record the functions each function calls
    #[arg(short = 'c', long)]
    calls: bool,

    /// Attach documentation comments
    #[arg(short = 'd', long)]
    docs: bool,

    /// Include declarations from every non-system file, not just the target
    #[arg(short = 'a', long)]
    all: bool,

    /// Keep function declarations without a body (header mode)
    #[arg(short = 'H', long)]
    header: bool,

    /// Write the document here instead of stdout
    #[arg(short = 'O', long)]
    output: Option<PathBuf>,

    /// Output format: yaml (default), json
    #[arg(long, default_value = "yaml")]
    format: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(target) = cli.file.as_deref() else {
        Cli::command().print_help().context("failed to print usage")?;
        println!();
        return Ok(());
    };

    // Fail on a bad format before doing any work
    let renderer = render::create_renderer(&cli.format)?;

    let tokens = match &cli.options {
        Some(path) => options::load(path)?,
        None => Vec::new(),
    };
    let args = options::CompilerArgs::from_tokens(&tokens);

    let source = parser::read_source(target)
        .with_context(|| format!("could not read file: {}", target.display()))?;
    let tu = parser::parse_translation_unit(target, &source, &args)
        .with_context(|| format!("failed to parse {}", target.display()))?;

    let filter = analysis::LocalityFilter::new(target, cli.all);
    let walk_options = analysis::WalkOptions {
        calls: cli.calls,
        docs: cli.docs,
        header: cli.header,
    };
    let model = analysis::walk(&tu, &filter, &walk_options, model::SymbolModel::new());

    let doc = model.into_document(&module_name(target));
    let rendered = renderer.render(&doc)?;

    match &cli.output {
        Some(path) => write_output(path, &rendered)?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(rendered.as_bytes())
                .context("failed to write to stdout")?;
        }
    }
    Ok(())
}

/// Basename of the target file.
fn module_name(target: &Path) -> String {
    target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| target.to_string_lossy().into_owned())
}

fn write_output(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory: {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}
