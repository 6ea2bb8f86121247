use std::sync::atomic::AtomicBool;

use tracing::{info, warn};

use stow_types::error::{Result, StowError};
use stow_types::{BlobId, PackId};

use crate::check::{
    CheckError, CheckProgressEvent, Checker, DataSubset, ErrorSender, Hint, ProgressFn,
    DEFAULT_WORKERS,
};
use crate::repo::RepositoryAccess;

/// What a check run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOptions {
    /// Re-read pack data: `Some(DataSubset::ALL)` reads every pack.
    pub read_data: Option<DataSubset>,
    /// Report indexed blobs that no snapshot references, as errors.
    pub check_unused: bool,
    pub orphaned_packs_are_errors: bool,
    pub workers: usize,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            read_data: None,
            check_unused: false,
            orphaned_packs_are_errors: false,
            workers: DEFAULT_WORKERS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    ErrorsFound,
    /// Cancelled before every phase finished.
    Incomplete,
}

/// Summary of a check run.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub hints: Vec<Hint>,
    /// Every finding except orphaned packs.
    pub errors: Vec<CheckError>,
    pub orphaned_packs: Vec<PackId>,
    /// Filled only when unused blobs were requested.
    pub unused_blobs: Vec<BlobId>,
    /// Packs selected for data verification.
    pub packs_read: usize,
    pub interrupted: bool,
    orphaned_packs_are_errors: bool,
}

impl CheckReport {
    pub fn verdict(&self) -> Verdict {
        if self.interrupted {
            Verdict::Incomplete
        } else if !self.errors.is_empty()
            || !self.unused_blobs.is_empty()
            || (self.orphaned_packs_are_errors && !self.orphaned_packs.is_empty())
        {
            Verdict::ErrorsFound
        } else {
            Verdict::Clean
        }
    }

    fn record(&mut self, err: CheckError) {
        match err {
            CheckError::OrphanedPack(pack_id) => {
                info!(pack = %pack_id, "pack not referenced in any index");
                self.orphaned_packs.push(pack_id);
            }
            err => {
                warn!("{err}");
                self.errors.push(err);
            }
        }
    }
}

/// Run `stow check` against `repo`.
pub fn run(repo: &dyn RepositoryAccess, options: &CheckOptions) -> Result<CheckReport> {
    run_with_progress(repo, options, None, None)
}

pub fn run_with_progress(
    repo: &dyn RepositoryAccess,
    options: &CheckOptions,
    shutdown: Option<&AtomicBool>,
    progress: Option<ProgressFn<'_>>,
) -> Result<CheckReport> {
    let mut checker = Checker::new(repo).with_workers(options.workers);
    if let Some(flag) = shutdown {
        checker = checker.with_shutdown(flag);
    }
    if let Some(callback) = progress {
        checker = checker.with_progress(callback);
    }

    let mut report = CheckReport {
        orphaned_packs_are_errors: options.orphaned_packs_are_errors,
        ..Default::default()
    };

    let (hints, index_errors) = checker.load_index();
    for hint in &hints {
        warn!("{hint}, non-critical: rebuilding the index removes the redundancy");
    }
    report.hints = hints;
    if !index_errors.is_empty() {
        warn!(errors = index_errors.len(), "index is damaged, aborting check");
        for err in index_errors {
            report.record(err);
        }
        return Ok(report);
    }

    if !run_phase(&mut report, |tx| checker.check_packs(tx))? {
        return Ok(report);
    }
    if !run_phase(&mut report, |tx| checker.check_structure(tx))? {
        return Ok(report);
    }

    if options.check_unused {
        report.unused_blobs = checker.unused_blobs();
        for blob in &report.unused_blobs {
            warn!(blob = %blob, "blob not referenced by any snapshot");
        }
    }

    if let Some(subset) = options.read_data {
        let total = checker.count_packs();
        let selected = subset.select(&checker.packs());
        if subset.is_all() {
            info!(packs = total, "reading all pack data");
        } else {
            info!(subset = %subset, packs = selected.len(), total, "reading a subset of pack data");
        }
        if let Some(callback) = progress {
            callback(CheckProgressEvent::ReadDataStarted {
                subset,
                packs: selected.len(),
                total,
            });
        }
        report.packs_read = selected.len();
        if !run_phase(&mut report, |tx| checker.read_packs(&selected, progress, tx))? {
            return Ok(report);
        }
    }

    info!(
        errors = report.errors.len(),
        orphaned = report.orphaned_packs.len(),
        unused = report.unused_blobs.len(),
        "check finished"
    );
    Ok(report)
}

/// Run one streaming phase on a scoped thread and drain its findings here.
///
/// Returns `Ok(false)` when the phase was interrupted.
fn run_phase<F>(report: &mut CheckReport, phase: F) -> Result<bool>
where
    F: FnOnce(ErrorSender) -> Result<()> + Send,
{
    let (tx, rx) = crossbeam_channel::unbounded();
    let outcome = std::thread::scope(|s| {
        let producer = s.spawn(move || phase(tx));
        for err in rx {
            report.record(err);
        }
        producer
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    });
    match outcome {
        Ok(()) => Ok(true),
        Err(StowError::Interrupted) => {
            warn!("check interrupted");
            report.interrupted = true;
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
