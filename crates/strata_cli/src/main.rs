// SPDX-License-Identifier: MIT OR Apache-2.0
//! Strata headless batch driver.
//!
//! Loads a graph document, recomputes it and optionally writes it back in
//! another encoding. Also lists the built-in node types.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use strata_graph::{
    create_terrain_registry, ConfigOverride, DocumentFormat, Graph, GraphConfig, GraphEvent,
    GraphManager, ManagerEvent, NodeCategory, NodeRegistry, UpdateReport,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Headless driver for Strata terrain graphs", long_about = None)]
#[command(version)]
struct Cli {
    /// Log engine activity at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a graph document and recompute every node
    Batch {
        /// Graph document (.json, .ron or .sgb)
        file: PathBuf,

        /// The document is a project holding several graphs
        #[arg(long)]
        project: bool,

        /// Heightmap shape override, e.g. 512x512
        #[arg(long, value_parser = parse_pair)]
        shape: Option<[u32; 2]>,

        /// Tiling override, e.g. 4x4
        #[arg(long, value_parser = parse_pair)]
        tiling: Option<[u32; 2]>,

        /// Tile overlap override in [0, 1)
        #[arg(long)]
        overlap: Option<f32>,

        /// RON engine settings applied before the individual overrides
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the document here after the update
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Encoding of the output (json, ron, binary); defaults to the
        /// output extension
        #[arg(short, long, value_parser = parse_format)]
        format: Option<DocumentFormat>,
    },

    /// List the available node types
    Inventory {
        /// Only list one category
        #[arg(long)]
        category: Option<String>,
    },

    /// Write a default engine settings file
    InitConfig {
        /// Destination RON file
        path: PathBuf,
    },
}

fn parse_pair(s: &str) -> Result<[u32; 2], String> {
    let (x, y) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let x = x.trim().parse().map_err(|e| format!("{}: {}", x, e))?;
    let y = y.trim().parse().map_err(|e| format!("{}: {}", y, e))?;
    Ok([x, y])
}

fn parse_format(s: &str) -> Result<DocumentFormat, String> {
    DocumentFormat::from_name(s).ok_or_else(|| format!("unknown format '{}'", s))
}

fn format_for(path: &Path) -> anyhow::Result<DocumentFormat> {
    DocumentFormat::from_path(path)
        .with_context(|| format!("cannot infer document format of {}", path.display()))
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("strata_graph={}", level).parse()?)
        .add_directive(format!("strata_cli={}", level).parse()?);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

fn print_report(report: &UpdateReport) {
    println!(
        "computed: {}, skipped: {}, failed: {}, pruned: {}",
        report.computed.len(),
        report.skipped.len(),
        report.failed.len(),
        report.pruned.len()
    );
    for (id, error) in &report.failed {
        println!("  failed {}: {}", id, error);
    }
    for id in &report.pruned {
        println!("  pruned {}", id);
    }
}

fn run_batch(
    registry: &NodeRegistry,
    file: &Path,
    overrides: ConfigOverride,
    output: Option<&Path>,
    format: Option<DocumentFormat>,
) -> anyhow::Result<()> {
    let mut graph = Graph::default();
    let summary = graph
        .load_from_file_with(file, format_for(file)?, registry, &overrides)
        .with_context(|| format!("failed to load {}", file.display()))?;
    if !summary.is_complete() {
        tracing::warn!("Document partially loaded: {:?}", summary);
    }
    tracing::info!(
        "Graph {}: {} nodes, {} links, shape {:?}",
        graph.id,
        graph.node_count(),
        graph.link_count(),
        graph.config().shape
    );

    graph.subscribe(|event| {
        if let GraphEvent::UpdateProgress { node_id, progress } = event {
            tracing::info!("[{:5.1}%] {}", progress, node_id);
        }
    });
    let report = graph.update();
    print_report(&report);

    if let Some(output) = output {
        let format = match format {
            Some(format) => format,
            None => format_for(output)?,
        };
        graph
            .save_to_file(output, format)
            .with_context(|| format!("failed to save {}", output.display()))?;
    }

    if !report.is_success() {
        bail!("{} nodes failed", report.failed.len());
    }
    Ok(())
}

fn run_project(
    registry: &NodeRegistry,
    file: &Path,
    overrides: ConfigOverride,
    output: Option<&Path>,
    format: Option<DocumentFormat>,
) -> anyhow::Result<()> {
    let mut manager = GraphManager::default();
    let summary = manager
        .load_from_file_with(file, format_for(file)?, registry, &overrides)
        .with_context(|| format!("failed to load {}", file.display()))?;
    if !summary.is_complete() {
        tracing::warn!("Project partially loaded: {:?}", summary);
    }
    manager.subscribe(|event| {
        if let ManagerEvent::BroadcastTagAdded(tag) = event {
            tracing::info!("Broadcasting {}", tag);
        }
    });

    let reports = manager.update();
    let mut failed = 0;
    for (graph_id, report) in &reports {
        println!("[{}]", graph_id);
        print_report(report);
        failed += report.failed.len();
    }

    if let Some(output) = output {
        let format = match format {
            Some(format) => format,
            None => format_for(output)?,
        };
        manager
            .save_to_file(output, format)
            .with_context(|| format!("failed to save {}", output.display()))?;
    }

    if failed > 0 {
        bail!("{} nodes failed", failed);
    }
    Ok(())
}

fn print_inventory(registry: &NodeRegistry, category: Option<&str>) -> anyhow::Result<()> {
    let categories: Vec<NodeCategory> = match category {
        Some(name) => {
            let found = NodeCategory::ALL
                .into_iter()
                .find(|c| c.name().eq_ignore_ascii_case(name));
            match found {
                Some(c) => vec![c],
                None => bail!("unknown category '{}'", name),
            }
        }
        None => NodeCategory::ALL.to_vec(),
    };

    for category in categories {
        let mut types = registry.types_in_category(category).peekable();
        if types.peek().is_none() {
            continue;
        }
        println!("{}", category);
        for node_type in types {
            println!("  {:<20} {}", node_type.id, node_type.description);
            let ports = |ports: &[strata_graph::Port]| {
                ports
                    .iter()
                    .map(|p| format!("{} ({})", p.id, p.data_type))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            if !node_type.inputs.is_empty() {
                println!("      inputs:     {}", ports(&node_type.inputs));
            }
            println!("      outputs:    {}", ports(&node_type.outputs));
            if !node_type.attributes.is_empty() {
                let keys: Vec<&str> = node_type.attributes.keys().map(String::as_str).collect();
                println!("      attributes: {}", keys.join(", "));
            }
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    tracing::debug!("Strata v{}", env!("CARGO_PKG_VERSION"));

    let registry = create_terrain_registry();

    match cli.command {
        Commands::Batch {
            file,
            project,
            shape,
            tiling,
            overlap,
            config,
            output,
            format,
        } => {
            let mut overrides = ConfigOverride::default();
            if let Some(path) = config {
                let settings = GraphConfig::load(&path)
                    .with_context(|| format!("failed to read settings {}", path.display()))?;
                overrides = ConfigOverride {
                    shape: Some(settings.shape),
                    tiling: Some(settings.tiling),
                    overlap: Some(settings.overlap),
                };
            }
            overrides.shape = shape.or(overrides.shape);
            overrides.tiling = tiling.or(overrides.tiling);
            overrides.overlap = overlap.or(overrides.overlap);

            if project {
                run_project(&registry, &file, overrides, output.as_deref(), format)?;
            } else {
                run_batch(&registry, &file, overrides, output.as_deref(), format)?;
            }
        }
        Commands::Inventory { category } => {
            print_inventory(&registry, category.as_deref())?;
        }
        Commands::InitConfig { path } => {
            GraphConfig::default().save(&path)?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}
