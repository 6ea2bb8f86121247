use std::path::Path;

use stow_core::check::{CheckProgressEvent, DataSubset};
use stow_core::commands::check::{self, CheckReport, Verdict};
use stow_core::config::{self, CheckConfig, StowConfig};
use stow_core::crypto::PlaintextEngine;
use stow_core::repo::Repository;
use stow_core::storage::local_backend::LocalBackend;

use crate::cli::CheckArgs;
use crate::signal::SHUTDOWN;

pub(crate) fn run_check(
    config_path: Option<&str>,
    args: &CheckArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let file_config = match config_path {
        Some(path) => {
            tracing::info!("Using config: {path}");
            Some(config::load_config(Path::new(path))?)
        }
        None => None,
    };

    let repo_path = match (&args.repo, &file_config) {
        (Some(path), _) => path.clone(),
        (None, Some(cfg)) => cfg.repository.path.clone(),
        (None, None) => return Err("no repository given: pass --repo or --config".into()),
    };
    let blob_id_key = match &file_config {
        Some(cfg) => cfg.repository.blob_id_key()?,
        None => [0u8; 32],
    };
    let options = merge_check_config(file_config.as_ref(), args).to_options()?;

    let storage = LocalBackend::new(&repo_path)?;
    if !storage.root().is_dir() {
        return Err(format!("repository '{repo_path}' does not exist").into());
    }
    let repo = Repository::open(
        Box::new(storage),
        Box::new(PlaintextEngine::new(&blob_id_key)),
    );

    let on_progress = |event: CheckProgressEvent| match event {
        CheckProgressEvent::PacksCheckStarted { packs } => {
            eprintln!("Checking {packs} packs...");
        }
        CheckProgressEvent::StructureStarted { snapshots } => {
            eprintln!("Checking {snapshots} snapshots, trees and blobs...");
        }
        CheckProgressEvent::ReadDataStarted {
            subset,
            packs,
            total,
        } => {
            eprintln!("{}", read_data_message(subset, packs, total));
        }
        CheckProgressEvent::PackRead { done, total } => {
            eprintln!("  read-data: {done}/{total} packs");
        }
    };

    let report = check::run_with_progress(&repo, &options, Some(&SHUTDOWN), Some(&on_progress))?;
    print_report(&report);

    match report.verdict() {
        Verdict::Clean => {
            println!("no errors were found");
            Ok(())
        }
        Verdict::ErrorsFound => Err("repository contains errors".into()),
        Verdict::Incomplete => Err("check interrupted before completion".into()),
    }
}

fn read_data_message(subset: DataSubset, packs: usize, total: usize) -> String {
    if subset.is_all() {
        format!("Reading all pack data ({total} packs)...")
    } else {
        format!("Reading subset {subset}: {packs} of {total} packs...")
    }
}

/// Command-line flags override the config file's `check` section.
fn merge_check_config(file_config: Option<&StowConfig>, args: &CheckArgs) -> CheckConfig {
    let mut merged = file_config.map(|c| c.check.clone()).unwrap_or_default();
    if args.read_data {
        merged.read_data = true;
        merged.read_data_subset = None;
    }
    if let Some(subset) = &args.read_data_subset {
        merged.read_data = false;
        merged.read_data_subset = Some(subset.clone());
    }
    merged.check_unused |= args.check_unused;
    merged.orphaned_packs_are_errors |= args.orphans_are_errors;
    if let Some(workers) = args.workers {
        merged.workers = workers;
    }
    merged
}

fn print_report(report: &CheckReport) {
    for hint in &report.hints {
        println!("{hint}, this is non-critical");
    }
    for pack in &report.orphaned_packs {
        println!("pack {pack}: not referenced in any index");
    }
    if !report.orphaned_packs.is_empty() {
        println!(
            "{} additional files were found in the repo, which likely contain duplicate data",
            report.orphaned_packs.len()
        );
    }
    if !report.errors.is_empty() {
        println!("Errors found:");
        for err in &report.errors {
            println!("  {err}");
        }
    }
    if !report.unused_blobs.is_empty() {
        println!("Unused blobs:");
        for blob in &report.unused_blobs {
            println!("  {}", blob.to_hex());
        }
    }
}
