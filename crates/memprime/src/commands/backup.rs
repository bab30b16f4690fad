//! Backup command

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use camino::Utf8Path;
use memprime_backup::engine::{
    ArtifactOutcome, BackupServices, DestinationReport, IncrementalBackupEngine, RunOptions,
};
use memprime_backup::storage::LocalTreeProvider;
use memprime_backup::Feedback;

use crate::cli::BackupArgs;
use crate::output;

pub async fn run(args: BackupArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    output::header("Incremental Backup");

    let config = super::load_config(config_path)?;
    let storage_root = super::resolve_root(args.root, &config)?;
    let registry = super::resolve_registry(args.registry, &config)?;

    let options = RunOptions {
        announce: args.announce || config.announce,
        deep_validation: args.validate || config.deep_validation,
    };

    output::kv("Source", storage_root.as_str());
    output::kv("Registry", &registry.store_path().display().to_string());
    output::kv(
        "Deep validation",
        if options.deep_validation { "on" } else { "off" },
    );
    println!();

    let services = BackupServices {
        registry,
        trees: Arc::new(LocalTreeProvider),
        feedback: Arc::new(ConsoleFeedback::default()),
        database: None,
    };
    let engine = IncrementalBackupEngine::new(storage_root.into_std_path_buf(), services)
        .with_retry_policy(config.retry.clone());

    let spinner = output::spinner("Backing up...");
    let summary = engine.run(options).await?;
    spinner.finish_and_clear();

    if summary.nothing_to_do() && summary.skipped.is_empty() {
        output::info("Nothing to back up - no destinations configured");
        return Ok(());
    }

    for report in &summary.destinations {
        print_destination(report);
    }
    for slot in &summary.skipped {
        output::warning(&format!("{slot}: unreachable, skipped this run"));
    }
    println!();

    if summary.fully_succeeded() {
        output::success(&format!(
            "Backup complete: {} destination(s) processed",
            summary.destinations.len()
        ));
        Ok(())
    } else {
        Err(anyhow::anyhow!("backup finished with failures"))
    }
}

fn print_destination(report: &DestinationReport) {
    let rebuilt = report
        .directories
        .iter()
        .filter(|d| matches!(d.outcome, ArtifactOutcome::Created | ArtifactOutcome::Rebuilt))
        .count();
    let current = report
        .directories
        .iter()
        .filter(|d| d.outcome == ArtifactOutcome::UpToDate)
        .count();
    let failed: Vec<&str> = report
        .directories
        .iter()
        .filter(|d| d.outcome.is_failure())
        .map(|d| d.name.as_str())
        .collect();

    let database = match &report.database {
        ArtifactOutcome::Failed(reason) => format!("failed ({reason})"),
        _ => "fresh".to_string(),
    };

    let line = format!(
        "{}: database {}, {} rebuilt, {} current",
        report.slot, database, rebuilt, current
    );
    if report.fully_succeeded() {
        output::success(&line);
    } else {
        output::warning(&format!("{line}, failed: {}", failed.join(", ")));
    }
}

/// Feedback routed to the terminal; distinct error messages are shown once.
#[derive(Default)]
struct ConsoleFeedback {
    seen_errors: Mutex<HashSet<String>>,
}

impl Feedback for ConsoleFeedback {
    fn speak(&self, message: &str) {
        output::info(message);
    }

    fn error(&self, message: &str) {
        let mut seen = match self.seen_errors.lock() {
            Ok(seen) => seen,
            Err(poisoned) => poisoned.into_inner(),
        };
        if seen.insert(message.to_string()) {
            output::error(message);
        }
    }

    fn toast(&self, message: &str) {
        tracing::info!("{}", message);
    }
}
