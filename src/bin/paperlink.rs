//! Paperlink CLI: exam paper segmentation, markscheme linking and tagging.
//!
//! Usage:
//!   paperlink ingest --paper <json> [--markscheme <json>] --rules <yaml|dir> [--config <yaml>]
//!   paperlink segment --paper <json> [--config <yaml>]
//!   paperlink check-rules <yaml>

use clap::{Args, Parser, Subcommand};
use paperlink::{
    FenceSegmenter, IngestPipeline, PaperInput, PipelineConfig, RulePack, RulePackRegistry,
    SourceDocument,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "paperlink",
    version,
    about = "Segment exam papers, link markschemes and tag topics"
)]
struct Cli {
    /// Log progress and diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on one paper and print the outcome as JSON
    Ingest(IngestArgs),
    /// Segment a question paper and print the questions as JSON
    Segment {
        #[arg(long)]
        paper: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate a rule pack
    CheckRules {
        /// Path to the rule pack YAML
        path: PathBuf,
    },
}

#[derive(Args)]
struct IngestArgs {
    /// Question paper fragments (JSON)
    #[arg(long)]
    paper: PathBuf,
    /// Markscheme fragments (JSON)
    #[arg(long)]
    markscheme: Option<PathBuf>,
    /// Rule pack file, or a directory of rule packs
    #[arg(long)]
    rules: PathBuf,
    /// Subject to tag against; defaults to the only loaded pack
    #[arg(long)]
    subject: Option<String>,
    /// Pipeline configuration (YAML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Identifier recorded on the outcome; defaults to the paper file stem
    #[arg(long)]
    paper_id: Option<String>,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn read_document(path: &Path) -> Result<SourceDocument, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| format!("invalid document {}: {}", path.display(), e))
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, String> {
    match path {
        Some(path) => PipelineConfig::from_path(path).map_err(|e| e.to_string()),
        None => Ok(PipelineConfig::default()),
    }
}

fn load_registry(path: &Path) -> Result<RulePackRegistry, String> {
    if path.is_dir() {
        return RulePackRegistry::load_dir(path).map_err(|e| e.to_string());
    }
    let pack = RulePack::from_path(path).map_err(|e| e.to_string())?;
    let mut registry = RulePackRegistry::new();
    registry.insert(pack).map_err(|e| e.to_string())?;
    Ok(registry)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("cannot serialize output: {}", e))?;
    println!("{}", json);
    Ok(())
}

fn cmd_ingest(args: IngestArgs) -> Result<(), String> {
    let config = load_config(args.config.as_deref())?;
    let registry = load_registry(&args.rules)?;
    let subject = match args.subject {
        Some(subject) => subject,
        None => match registry.subjects().collect::<Vec<_>>().as_slice() {
            [only] => only.to_string(),
            _ => return Err("several rule packs loaded; pass --subject".to_string()),
        },
    };
    let input = PaperInput {
        paper_id: args.paper_id.unwrap_or_else(|| {
            args.paper
                .file_stem()
                .map_or_else(|| "paper".to_string(), |s| s.to_string_lossy().into_owned())
        }),
        subject,
        question_paper: read_document(&args.paper)?,
        markscheme: args.markscheme.as_deref().map(read_document).transpose()?,
    };

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("failed to create tokio runtime: {}", e))?;
    let outcome = rt
        .block_on(IngestPipeline::new(config, registry).process(&input))
        .map_err(|e| e.to_string())?;
    for warning in &outcome.summary.leading_warnings {
        eprintln!("Warning: {}", warning);
    }
    print_json(&outcome)
}

fn cmd_segment(paper: &Path, config: Option<&Path>) -> Result<(), String> {
    let config = load_config(config)?;
    let document = read_document(paper)?;
    let result = FenceSegmenter::new(config.segmenter)
        .segment(&document)
        .map_err(|e| e.to_string())?;
    print_json(&result)
}

fn cmd_check_rules(path: &Path) -> Result<(), String> {
    let pack = RulePack::from_path(path).map_err(|e| e.to_string())?;
    println!(
        "{} @ {}: {} topics, {} rules, {} key terms",
        pack.subject(),
        pack.version(),
        pack.topics().len(),
        pack.rule_count(),
        pack.vocabulary().len()
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Ingest(args) => cmd_ingest(args),
        Commands::Segment { paper, config } => cmd_segment(&paper, config.as_deref()),
        Commands::CheckRules { path } => cmd_check_rules(&path),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
