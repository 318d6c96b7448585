mod snapshot;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lore_core::batcher::{batches_by_tier, neighbor_names};
use lore_core::drift::{compute_drift, DriftInput};
use lore_core::graph::{annotate_pagerank, detect_communities, topological_sort_entities};
use lore_core::justification::score_justification;
use lore_core::llm::build_embedder;
use lore_core::models::language_for_path;
use lore_core::store::GraphStore;
use lore_core::{AstNormalizer, Config, InMemoryGraphStore, Pipeline, PipelineRun};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use snapshot::{read_diff, read_justifications, read_snapshot, write_json, Snapshot};

#[derive(Parser)]
#[command(name = "lore")]
#[command(about = "Keep a code knowledge graph annotated with business justifications", long_about = None)]
struct Cli {
    /// Config file (defaults to ./lore.toml, then ~/.config/lore/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the bottom-up processing levels of a snapshot
    Order {
        /// Snapshot JSON with `entities` and `edges`
        snapshot: PathBuf,
    },
    /// Print the LLM batches each level would be split into
    Batches {
        snapshot: PathBuf,
    },
    /// Detect communities in a snapshot
    Communities {
        snapshot: PathBuf,
    },
    /// Classify the change between two versions of an entity body
    Drift {
        before: PathBuf,
        after: PathBuf,

        /// Language of both bodies (derived from the file extension otherwise)
        #[arg(long)]
        language: Option<String>,
    },
    /// Score the quality of stored justifications
    Score {
        /// JSON array of justifications
        justifications: PathBuf,
    },
    /// Justify every entity of a snapshot
    Justify {
        snapshot: PathBuf,

        /// Write the resulting justifications here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Apply an incremental diff on top of a snapshot
    Apply {
        /// Snapshot as it stands after the diff
        snapshot: PathBuf,

        /// Diff JSON with `added`, `updated` and `deleted`
        diff: PathBuf,

        /// Justifications from the previous run
        #[arg(long)]
        justifications: Option<PathBuf>,

        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show the effective configuration
    Config {
        /// Print the default config file instead
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "lore=debug" } else { "lore=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Order { snapshot } => order(&read_snapshot(&snapshot)?, cli.json),
        Commands::Batches { snapshot } => {
            let config = load_config(cli.config.as_deref())?;
            batches(read_snapshot(&snapshot)?, &config, cli.json)
        }
        Commands::Communities { snapshot } => {
            let config = load_config(cli.config.as_deref())?;
            communities(read_snapshot(&snapshot)?, &config, cli.json)
        }
        Commands::Drift {
            before,
            after,
            language,
        } => {
            let config = load_config(cli.config.as_deref())?;
            drift(&before, &after, language.as_deref(), &config, cli.json).await
        }
        Commands::Score { justifications } => score(&justifications, cli.json),
        Commands::Justify { snapshot, out } => {
            let config = load_config(cli.config.as_deref())?;
            justify(read_snapshot(&snapshot)?, config, out.as_deref()).await
        }
        Commands::Apply {
            snapshot,
            diff,
            justifications,
            out,
        } => {
            let config = load_config(cli.config.as_deref())?;
            apply(
                read_snapshot(&snapshot)?,
                &diff,
                justifications.as_deref(),
                config,
                out.as_deref(),
            )
            .await
        }
        Commands::Config { default } => {
            if default {
                print!("{}", Config::default_config_string());
                return Ok(());
            }
            let config = load_config(cli.config.as_deref())?;
            write_json(&config, None)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::load()?,
    };
    Ok(config)
}

fn order(snapshot: &Snapshot, as_json: bool) -> Result<()> {
    let ids: Vec<String> = snapshot.entities.iter().map(|e| e.id.clone()).collect();
    let levels = topological_sort_entities(&ids, &snapshot.edges);

    if as_json {
        return write_json(&levels, None);
    }

    let names: HashMap<&str, &str> = snapshot
        .entities
        .iter()
        .map(|e| (e.id.as_str(), e.name.as_str()))
        .collect();
    for (index, level) in levels.iter().enumerate() {
        let members: Vec<&str> = level
            .iter()
            .map(|id| names.get(id.as_str()).copied().unwrap_or(id.as_str()))
            .collect();
        println!("Level {}: {}", index, members.join(", "));
    }
    Ok(())
}

fn batches(mut snapshot: Snapshot, config: &Config, as_json: bool) -> Result<()> {
    annotate_pagerank(&mut snapshot.entities, &snapshot.edges);

    let ids: Vec<String> = snapshot.entities.iter().map(|e| e.id.clone()).collect();
    let levels = topological_sort_entities(&ids, &snapshot.edges);
    let neighbors = neighbor_names(&snapshot.entities, &snapshot.edges);
    let by_id: HashMap<&str, _> = snapshot.entities.iter().map(|e| (e.id.as_str(), e)).collect();

    let mut report = Vec::new();
    for (index, level) in levels.iter().enumerate() {
        let members: Vec<_> = level
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).map(|e| (*e).clone()))
            .collect();

        for (tier, batch) in batches_by_tier(&members, &neighbors, &config.batching, &config.llm.tiers) {
            if !as_json {
                println!(
                    "Level {} [{}] {} entities, ~{} tokens{}",
                    index,
                    tier,
                    batch.len(),
                    batch.estimated_tokens,
                    if batch.solo { " (solo)" } else { "" }
                );
            }
            report.push(json!({
                "level": index,
                "tier": tier,
                "model": config.llm.model_for_tier(tier),
                "entity_ids": batch.entity_ids(),
                "estimated_tokens": batch.estimated_tokens,
                "solo": batch.solo,
            }));
        }
    }

    if as_json {
        write_json(&report, None)?;
    }
    Ok(())
}

fn communities(mut snapshot: Snapshot, config: &Config, as_json: bool) -> Result<()> {
    annotate_pagerank(&mut snapshot.entities, &snapshot.edges);
    let detection = detect_communities(&snapshot.entities, &snapshot.edges, &config.community);

    if as_json {
        return write_json(&detection, None);
    }

    println!("Modularity: {:.3}", detection.modularity);
    for community in &detection.communities {
        println!("{:>4}  {:<40} {} members", community.id, community.label, community.size());
    }
    Ok(())
}

async fn drift(before: &Path, after: &Path, language: Option<&str>, config: &Config, as_json: bool) -> Result<()> {
    let old = fs::read_to_string(before).with_context(|| format!("Failed to read {}", before.display()))?;
    let new = fs::read_to_string(after).with_context(|| format!("Failed to read {}", after.display()))?;
    let language = language.or_else(|| language_for_path(&after.to_string_lossy()));

    let normalizer = AstNormalizer::default().with_structural_comparison(config.pipeline.structural_comparison);
    let semantic = normalizer.is_semantic_change(&old, &new, language);
    let old_hash = normalizer.compute_semantic_fingerprint(&old, language);
    let new_hash = normalizer.compute_semantic_fingerprint(&new, language);
    let structurally_equal = matches!((&old_hash, &new_hash), (Some(a), Some(b)) if a == b);

    let vectors = if structurally_equal {
        Vec::new()
    } else {
        build_embedder(&config.embedding, &config.llm)?
            .embed(&[old.clone(), new.clone()])
            .await?
    };
    let input = DriftInput {
        ast_hash_old: old_hash.as_deref(),
        ast_hash_new: new_hash.as_deref(),
        embedding_old: vectors.first().map(Vec::as_slice).unwrap_or(&[]),
        embedding_new: vectors.get(1).map(Vec::as_slice).unwrap_or(&[]),
    };
    let result = compute_drift(&input, &config.drift);

    if as_json {
        return write_json(
            &json!({
                "language": language,
                "semantic_change": semantic,
                "fingerprint_before": old_hash,
                "fingerprint_after": new_hash,
                "category": result.category,
                "similarity": result.similarity,
            }),
            None,
        );
    }

    println!("Language:        {}", language.unwrap_or("unknown"));
    println!("Semantic change: {}", semantic);
    println!("Drift:           {} ({:.3})", result.category.as_str(), result.similarity);
    Ok(())
}

fn score(path: &Path, as_json: bool) -> Result<()> {
    let justifications = read_justifications(path)?;

    let mut report = Vec::with_capacity(justifications.len());
    for j in &justifications {
        let quality = score_justification(j);
        if !as_json {
            let flags = if quality.flags.is_empty() {
                String::new()
            } else {
                format!("  [{}]", quality.flags.join(", "))
            };
            println!("{:.2}  {}{}", quality.score, j.entity_id, flags);
        }
        report.push(json!({ "entity_id": j.entity_id, "quality": quality }));
    }

    if as_json {
        write_json(&report, None)?;
    }
    Ok(())
}

async fn justify(snapshot: Snapshot, config: Config, out: Option<&Path>) -> Result<()> {
    let store = Arc::new(InMemoryGraphStore::with_graph(snapshot.entities.clone(), snapshot.edges.clone()).await);
    let pipeline = Pipeline::from_config(config, store.clone())?;

    let run = pipeline.justify_entities(snapshot.entities.clone(), &snapshot.edges).await?;
    report_run(&run);
    write_current(&store, &snapshot, out).await
}

async fn apply(
    snapshot: Snapshot,
    diff_path: &Path,
    previous: Option<&Path>,
    config: Config,
    out: Option<&Path>,
) -> Result<()> {
    let diff = read_diff(diff_path)?;
    let store = Arc::new(InMemoryGraphStore::with_graph(snapshot.entities.clone(), snapshot.edges.clone()).await);

    if let Some(path) = previous {
        let justifications = read_justifications(path)?;
        store.bulk_upsert_justifications(&justifications).await?;
        info!(count = justifications.len(), "Loaded previous justifications");
    }

    let pipeline = Pipeline::from_config(config, store.clone())?;
    let run = pipeline.apply_diff(&diff).await?;
    report_run(&run);
    write_current(&store, &snapshot, out).await
}

fn report_run(run: &PipelineRun) {
    info!(
        run_id = %run.id,
        status = run.status.display_name(),
        justified = run.stats.justified,
        llm_calls = run.stats.llm_calls,
        low_quality = run.stats.low_quality,
        "Run finished"
    );
}

async fn write_current(store: &InMemoryGraphStore, snapshot: &Snapshot, out: Option<&Path>) -> Result<()> {
    let Some(repo_id) = snapshot.entities.first().map(|e| e.repo_id.clone()) else {
        return write_json(&Vec::<()>::new(), out);
    };
    let current = store.list_current_justifications(&repo_id).await?;
    write_json(&current, out)
}
