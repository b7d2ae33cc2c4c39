//! weft command-line front end.
//!
//! Usage:
//!   # Compile one recorded editor transaction into an operations message
//!   weft compile transaction.json
//!   weft compile transaction.json --config weft.ron
//!   weft compile transaction.json --insert-text reject --tie-break lastremoved
//!
//!   # Inspect what a session would derive from a store document
//!   weft char-ids compiled.json
//!   weft snapshot compiled.json
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `weft=info`); results
//! are pretty JSON on stdout.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt};

use weft_crdt::{
    CharIdentityMap, CompilerConfig, DeltaStep, DocumentSnapshot, InsertTextPolicy,
    ResolutionTable, TieBreakPolicy, TransactionContext, apply_all,
};
use weft_types::{CompiledBlock, DocumentId, OperationId, OperationsMessage, ReplicaId};

/// Compile block editor deltas into CRDT operations.
#[derive(Parser, Debug)]
#[command(name = "weft")]
#[command(about = "Compile block editor deltas into CRDT operations")]
struct Args {
    /// Compiler configuration (RON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Text insertion policy, overriding the config (decompose, reject)
    #[arg(long, global = true)]
    insert_text: Option<InsertTextPolicy>,

    /// Mixed-replace tie-break, overriding the config (observed, firstremoved, lastremoved)
    #[arg(long, global = true)]
    tie_break: Option<TieBreakPolicy>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a transaction file into an operations message
    Compile { transaction: PathBuf },
    /// Print the character identity map of a compiled document
    CharIds { compiled: PathBuf },
    /// Print the editor snapshot of a compiled document
    Snapshot { compiled: PathBuf },
}

/// A recorded editor transaction.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct TransactionFile {
    document_id: DocumentId,
    #[serde(default)]
    before: Option<DocumentSnapshot>,
    /// Store document to derive `before` and `charIds` from.
    #[serde(default)]
    compiled_document: Option<Vec<CompiledBlock>>,
    /// Derived by replaying `steps` when absent.
    #[serde(default)]
    after: Option<DocumentSnapshot>,
    #[serde(default)]
    char_ids: Option<CharIdentityMap>,
    #[serde(default)]
    next_operation_id: Option<u64>,
    #[serde(default)]
    origin: Option<ReplicaId>,
    steps: Vec<DeltaStep>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CompileOutput {
    message: OperationsMessage,
    next_operation_id: OperationId,
    resolutions: ResolutionTable,
    char_ids: CharIdentityMap,
    dropped: Vec<DroppedOutput>,
}

#[derive(Serialize, Debug)]
struct DroppedOutput {
    index: usize,
    kind: &'static str,
    reason: String,
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weft=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    match args.command {
        Command::Compile { transaction } => {
            let file: TransactionFile = read_json(&transaction)?;
            print_json(&compile(file, &config)?)
        }
        Command::CharIds { compiled } => {
            let blocks: Vec<CompiledBlock> = read_json(&compiled)?;
            print_json(&CharIdentityMap::from_compiled(&blocks))
        }
        Command::Snapshot { compiled } => {
            let blocks: Vec<CompiledBlock> = read_json(&compiled)?;
            print_json(&DocumentSnapshot::from_compiled(&blocks))
        }
    }
}

fn load_config(args: &Args) -> Result<CompilerConfig> {
    let mut config = match &args.config {
        Some(path) => CompilerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CompilerConfig::default(),
    };
    if let Some(policy) = args.insert_text {
        config.insert_text = policy;
    }
    if let Some(policy) = args.tie_break {
        config.tie_break = policy;
    }
    Ok(config)
}

fn compile(file: TransactionFile, config: &CompilerConfig) -> Result<CompileOutput> {
    let before = match (&file.before, &file.compiled_document) {
        (Some(before), _) => before.clone(),
        (None, Some(blocks)) => DocumentSnapshot::from_compiled(blocks),
        (None, None) => bail!("transaction needs `before` or `compiledDocument`"),
    };
    let after = match file.after {
        Some(after) => after,
        None => apply_all(&before, &file.steps).context("replaying steps to derive `after`")?,
    };
    let char_ids = match (file.char_ids, &file.compiled_document) {
        (Some(char_ids), _) => char_ids,
        (None, Some(blocks)) => CharIdentityMap::from_compiled(blocks),
        (None, None) => CharIdentityMap::new(),
    };

    let mut context = TransactionContext::new(
        file.document_id,
        file.origin.unwrap_or_else(|| config.origin.clone()),
        file.next_operation_id
            .map_or_else(|| config.initial_operation_id(), OperationId),
        char_ids,
    );
    let batch = context.compile(&file.steps, &before, &after, config)?;
    tracing::info!(
        operations = batch.operations.len(),
        dropped = batch.dropped.len(),
        "compiled transaction"
    );

    Ok(CompileOutput {
        message: OperationsMessage::new(batch.operations),
        next_operation_id: context.next_op_id,
        resolutions: batch.resolutions,
        char_ids: context.char_ids,
        dropped: batch
            .dropped
            .into_iter()
            .map(|d| DroppedOutput {
                index: d.index,
                kind: d.kind,
                reason: d.reason.to_string(),
            })
            .collect(),
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
