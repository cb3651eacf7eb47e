mod commands;
mod logging;
mod reporter;

use std::process;

use anyhow::Context;
use catalog_projector::config::load_configuration;
use catalog_projector::{AppConfig, CancelToken, Catalog, SearchIndex, ViewBuilder};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, SearchArgs};
use dotenv::dotenv;
use logging::ConsoleMode;
use reporter::CliReporter;
use tracing::{error, info, warn};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Cli::parse();
    let console = match &args.command {
        Some(Commands::Search(search)) if search.json => ConsoleMode::Machine,
        _ => ConsoleMode::Human,
    };
    let _guard = logging::init_logger(console);

    let config = match load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let result = match args.command {
        Some(Commands::RebuildView) => run_rebuild_view(&config),
        Some(Commands::SyncFile { id }) => run_view_update(&config, |view, catalog| {
            Ok(view.file_changed(catalog, id)?)
        }),
        Some(Commands::RemoveFile { id }) => {
            run_view_update(&config, |view, _| Ok(view.file_removed(id)?))
        }
        Some(Commands::SyncGroup { id }) => run_view_update(&config, |view, catalog| {
            Ok(view.duplicate_group_changed(catalog, id)?)
        }),
        Some(Commands::VerifyView) => run_verify_view(&config),
        Some(Commands::Reindex) => run_reindex(&config),
        Some(Commands::IndexFile { id }) => run_index_file(&config, id),
        Some(Commands::Search(args)) => run_search(&config, &args),
        Some(Commands::Optimize) => run_optimize(&config),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }
    Ok(())
}

fn open_catalog(config: &AppConfig) -> anyhow::Result<Catalog> {
    Catalog::open(&config.catalog.db_path)
        .with_context(|| format!("opening catalog {}", config.catalog.db_path))
}

fn run_rebuild_view(config: &AppConfig) -> anyhow::Result<()> {
    let catalog = open_catalog(config)?;
    let view = ViewBuilder::new(config.view.clone())?;
    let reporter = CliReporter::new();
    let outcome = view.rebuild(&catalog, &reporter, &CancelToken::new())?;

    info!(
        "{} entries materialized, {} skipped",
        format!("{}", outcome.succeeded).green(),
        format!("{}", outcome.skipped_count()).red(),
    );
    Ok(())
}

fn run_view_update<F>(config: &AppConfig, update: F) -> anyhow::Result<()>
where
    F: FnOnce(&ViewBuilder, &Catalog) -> anyhow::Result<catalog_projector::BatchOutcome>,
{
    let catalog = open_catalog(config)?;
    let view = ViewBuilder::new(config.view.clone())?;
    let outcome = update(&view, &catalog)?;
    info!(
        "{} entries updated, {} skipped",
        format!("{}", outcome.succeeded).green(),
        format!("{}", outcome.skipped_count()).red(),
    );
    Ok(())
}

fn run_verify_view(config: &AppConfig) -> anyhow::Result<()> {
    let view = ViewBuilder::new(config.view.clone())?;
    let report = view.verify()?;
    if report.is_consistent() {
        info!("{}", "View matches its ledger".green());
        return Ok(());
    }
    for path in &report.missing_on_disk {
        warn!("missing on disk: {}", path.red());
    }
    for path in &report.unexpected_on_disk {
        warn!("not in ledger: {}", path.yellow());
    }
    for path in &report.orphaned {
        warn!("orphaned row: {}", path.yellow());
    }
    anyhow::bail!("view has drifted from its ledger")
}

fn run_reindex(config: &AppConfig) -> anyhow::Result<()> {
    let catalog = open_catalog(config)?;
    let index = SearchIndex::open(&config.index)?;
    let reporter = CliReporter::new();
    let outcome = index.reindex_all(&catalog, &reporter)?;
    info!(
        "{} documents indexed, {} skipped",
        format!("{}", outcome.succeeded).green(),
        format!("{}", outcome.skipped_count()).red(),
    );
    Ok(())
}

fn run_index_file(config: &AppConfig, id: i64) -> anyhow::Result<()> {
    let catalog = open_catalog(config)?;
    let index = SearchIndex::open(&config.index)?;
    match catalog.get_file(id)? {
        Some(file) => index.upsert(&file)?,
        None => index.delete(id)?,
    }
    info!("File {} synced to index", id);
    Ok(())
}

fn run_search(config: &AppConfig, args: &SearchArgs) -> anyhow::Result<()> {
    let index = SearchIndex::open(&config.index)?;
    let response = index.try_search(&args.to_request())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    for hit in &response.hits {
        println!(
            "{:>8}  {:>10}  {}",
            hit.id.to_string().cyan(),
            hit.size,
            hit.path
        );
    }
    println!(
        "{} of {} hits in {:.2}ms",
        response.hits.len(),
        format!("{}", response.total_hits).green(),
        response.took.as_secs_f64() * 1000.0
    );
    if let Some(facets) = &response.facets {
        for (field, counts) in facets {
            let values: Vec<String> = counts
                .iter()
                .map(|c| format!("{}={}", c.value, c.count))
                .collect();
            println!("{}: {}", field.bold(), values.join(", "));
        }
    }
    Ok(())
}

fn run_optimize(config: &AppConfig) -> anyhow::Result<()> {
    let index = SearchIndex::open(&config.index)?;
    index.optimize()?;
    info!("Index optimized: {} documents", index.doc_count()?);
    Ok(())
}
