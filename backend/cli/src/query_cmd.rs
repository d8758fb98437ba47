//! `nodebridge query`: load a tree fixture, submit queries from a non-owning
//! caller and print every delivery as one JSON line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tracing::{debug, info};

use nodebridge_config::load_and_prepare;
use nodebridge_core::{
    CallerIdentity, ChannelCallback, FetchFlags, MemoryTree, Query, Request, RequestArguments,
};
use nodebridge_dispatch::{CompletionToken, InteractionController, RequestPreparer};
use nodebridge_logging::init_logger;

const OWNER_THREAD: u64 = 1;
const CLIENT_THREAD: u64 = 2;

#[derive(Args)]
pub struct QueryArgs {
    /// YAML tree fixture
    #[arg(long)]
    tree: PathBuf,

    /// Query as JSON, e.g. '{"type":"by_node_id","node_id":{"owner_id":1,"descendant_id":4294967295}}'.
    /// Repeat to submit several; they share the fetch flags.
    #[arg(long = "query", required = true)]
    queries: Vec<String>,

    /// Fetch flags applied to every query
    #[arg(long = "flag", value_enum)]
    flags: Vec<FlagArg>,

    /// Interaction id of the first query; later ones count up
    #[arg(long, default_value_t = 1)]
    interaction_id: i64,

    /// Register a preparer for this owner id that finishes immediately
    #[arg(long = "preparer")]
    preparers: Vec<u32>,

    /// Pretty-print deliveries
    #[arg(long)]
    pretty: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum FlagArg {
    Ancestors,
    Siblings,
    Hybrid,
    DepthFirst,
    BreadthFirst,
    Uninterruptible,
    IncludeNotImportant,
    ReportViewIds,
    AccessibilityTool,
}

impl From<FlagArg> for FetchFlags {
    fn from(flag: FlagArg) -> Self {
        match flag {
            FlagArg::Ancestors => FetchFlags::PREFETCH_ANCESTORS,
            FlagArg::Siblings => FetchFlags::PREFETCH_SIBLINGS,
            FlagArg::Hybrid => FetchFlags::PREFETCH_DESCENDANTS_HYBRID,
            FlagArg::DepthFirst => FetchFlags::PREFETCH_DESCENDANTS_DEPTH_FIRST,
            FlagArg::BreadthFirst => FetchFlags::PREFETCH_DESCENDANTS_BREADTH_FIRST,
            FlagArg::Uninterruptible => FetchFlags::PREFETCH_UNINTERRUPTIBLE,
            FlagArg::IncludeNotImportant => FetchFlags::INCLUDE_NOT_IMPORTANT,
            FlagArg::ReportViewIds => FetchFlags::REPORT_VIEW_IDS,
            FlagArg::AccessibilityTool => FetchFlags::ACCESSIBILITY_TOOL,
        }
    }
}

/// Reports done as soon as it is asked.
struct ImmediatePreparer {
    owner_id: u32,
}

impl RequestPreparer for ImmediatePreparer {
    fn prepare(
        &self,
        descendant_id: u32,
        extra_data_key: &str,
        _args: &RequestArguments,
        token: CompletionToken,
    ) {
        debug!(owner_id = self.owner_id, descendant_id, key = extra_data_key, "Preparing");
        token.complete();
    }
}

pub async fn run(config_path: &Path, args: QueryArgs) -> Result<()> {
    let config = load_and_prepare(config_path).await?;
    let logging = config.logging();
    let _guard = init_logger(logging.level(), logging.dir(), logging.json())?;

    let raw = tokio::fs::read_to_string(&args.tree)
        .await
        .with_context(|| format!("Failed to read tree fixture: {}", args.tree.display()))?;
    let tree = MemoryTree::from_yaml(&raw)
        .with_context(|| format!("Invalid tree fixture: {}", args.tree.display()))?;
    let flags = args
        .flags
        .iter()
        .fold(FetchFlags::empty(), |acc, f| acc | FetchFlags::from(*f));
    let queries = args
        .queries
        .iter()
        .map(|q| serde_json::from_str::<Query>(q).with_context(|| format!("Invalid query: {q}")))
        .collect::<Result<Vec<_>>>()?;

    let pid = std::process::id();
    let controller = InteractionController::new(
        tree,
        config.dispatch(),
        CallerIdentity::new(pid, OWNER_THREAD),
    );
    let client = controller.client();
    for owner_id in &args.preparers {
        client.register_preparer(*owner_id, Arc::new(ImmediatePreparer { owner_id: *owner_id }));
    }
    let owner_loop = tokio::spawn(controller.run());

    let caller = CallerIdentity::new(pid, CLIENT_THREAD);
    let (callback, mut rx) = ChannelCallback::new();
    for (offset, query) in queries.into_iter().enumerate() {
        let answered = query.has_callback();
        let mut request = Request::new(query, flags, args.interaction_id + offset as i64);
        if answered {
            request = request.with_callback(Arc::clone(&callback));
        }
        client.submit(request, caller)?;
    }
    info!(queries = args.queries.len(), flags = ?flags, "Queries submitted");

    // The channel closes once every request holding the callback is done.
    drop(callback);
    let mut delivered = 0;
    while let Some(delivery) = rx.recv().await {
        let line = if args.pretty {
            serde_json::to_string_pretty(&delivery)?
        } else {
            serde_json::to_string(&delivery)?
        };
        println!("{line}");
        delivered += 1;
    }

    client.shutdown();
    owner_loop.await.context("Owner loop panicked")?;
    info!(delivered, "Done");
    Ok(())
}
