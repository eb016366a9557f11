use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::account_tokens::{extract_account_tokens, ExtractedTokens};
use crate::bill_date::{account_dir, extract_date_target, hierarchy_path, DateTarget};
use crate::error::{BatchError, PlacementError};
use crate::mapping_table::{AccountMatch, LookupTable, MatchedBy};
use crate::year_backfill::backfill_year_folders;

pub const DEFAULT_DOCUMENT_EXTENSION: &str = "pdf";
const TARGET_EXISTS_REASON: &str = "target already exists";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundReason {
    NoAccountToken,
    AccountNotMapped,
    NoDate,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoAccountToken => "no account number or extension in filename",
            Self::AccountNotMapped => "account not found in mapping",
            Self::NoDate => "no date in filename",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Moved {
        destination: PathBuf,
        hierarchy: String,
    },
    Skipped {
        reason: String,
    },
    NotFound {
        reason: NotFoundReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub file_name: String,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

impl FileReport {
    pub fn log_line(&self) -> String {
        match &self.outcome {
            FileOutcome::Moved { hierarchy, .. } => format!("MOVED '{}' -> {hierarchy}", self.file_name),
            FileOutcome::Skipped { reason } => format!("SKIPPED '{}': {reason}", self.file_name),
            FileOutcome::NotFound { reason } => format!("NOT FOUND '{}': {reason}", self.file_name),
        }
    }
}

/// Counters and per-file log of one batch, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub moved: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub total: usize,
    pub log: Vec<String>,
    pub files: Vec<FileReport>,
}

impl BatchResult {
    fn record(&mut self, report: FileReport) {
        match report.outcome {
            FileOutcome::Moved { .. } => self.moved += 1,
            FileOutcome::Skipped { .. } => self.skipped += 1,
            FileOutcome::NotFound { .. } => self.not_found += 1,
        }
        self.log.push(report.log_line());
        self.files.push(report);
    }

    pub fn failed(&self) -> usize {
        self.skipped + self.not_found
    }

    pub fn totals_line(&self) -> String {
        format!(
            "Moved: {} | Skipped: {} | Not Found: {}",
            self.moved, self.skipped, self.not_found
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub percent: u8,
    pub message: String,
}

/// Everything one batch needs. The table is shared, never mutated.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub table: Arc<LookupTable>,
    pub source: PathBuf,
    pub destination_root: PathBuf,
    pub document_extension: String,
}

impl BatchRequest {
    pub fn new(table: Arc<LookupTable>, source: impl Into<PathBuf>, destination_root: impl Into<PathBuf>) -> Self {
        Self {
            table,
            source: source.into(),
            destination_root: destination_root.into(),
            document_extension: DEFAULT_DOCUMENT_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.document_extension = extension.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub dir: PathBuf,
    pub file_name: String,
}

fn extension_suffix(extension: &str) -> String {
    format!(".{}", extension.trim().trim_start_matches('.').to_lowercase())
}

/// Lists the files a batch would process: the source itself when it is a
/// matching file, otherwise the matching files directly inside it, sorted by
/// name. An empty result is an error.
pub fn collect_candidates(source: &Path, extension: &str) -> Result<Vec<Candidate>, BatchError> {
    let suffix = extension_suffix(extension);
    let matches = |name: &str| name.to_lowercase().ends_with(&suffix);
    let mut candidates = Vec::new();

    if source.is_file() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if matches(&name) {
            let dir = source
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            candidates.push(Candidate { dir, file_name: name });
        }
    } else if source.is_dir() {
        let walker = WalkDir::new(source)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|e| BatchError::Enumerate {
                path: source.to_path_buf(),
                source: io::Error::from(e),
            })?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if matches(&name) {
                candidates.push(Candidate {
                    dir: source.to_path_buf(),
                    file_name: name,
                });
            }
        }
    } else {
        return Err(BatchError::SourceUnavailable {
            path: source.to_path_buf(),
        });
    }

    if candidates.is_empty() {
        return Err(BatchError::Empty {
            source_path: source.to_path_buf(),
            extension: suffix.trim_start_matches('.').to_string(),
        });
    }
    Ok(candidates)
}

/// Where a file would go, once its account and date are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePlan {
    pub tokens: ExtractedTokens,
    pub account: AccountMatch,
    pub date: DateTarget,
    pub account_dir: PathBuf,
    pub year_dir: PathBuf,
    pub destination: PathBuf,
}

impl FilePlan {
    pub fn hierarchy(&self) -> String {
        hierarchy_path(
            &self.account.entry.corporation,
            self.account.entry.provider,
            &self.account.token,
            &self.date,
        )
    }
}

/// Resolves tokens, account and date for `file_name` without touching the
/// filesystem.
pub fn plan_file(
    table: &LookupTable,
    destination_root: &Path,
    file_name: &str,
) -> Result<FilePlan, NotFoundReason> {
    let tokens = extract_account_tokens(file_name);
    if tokens.is_empty() {
        return Err(NotFoundReason::NoAccountToken);
    }

    let account = table
        .resolve(&tokens.last4, &tokens.extension)
        .ok_or(NotFoundReason::AccountNotMapped)?;

    let date = extract_date_target(file_name).ok_or(NotFoundReason::NoDate)?;

    let account_dir = account_dir(
        destination_root,
        account.entry.corporation.trim(),
        account.entry.provider,
        &account.token,
    );
    let year_dir = account_dir.join(&date.year_folder);
    let destination = year_dir.join(&date.normalized_filename);

    Ok(FilePlan {
        tokens,
        account,
        date,
        account_dir,
        year_dir,
        destination,
    })
}

// Rename first; fall back to copy + remove when the rename cannot work,
// e.g. across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !from.is_file() || to.exists() {
                return Err(rename_err);
            }
            fs::copy(from, to).map_err(|_| rename_err)?;
            finish_copied_move(from, to, |p| fs::remove_file(p))
        }
    }
}

// A copy whose source cannot be removed is undone, so the bill is never
// left in both places.
fn finish_copied_move(
    from: &Path,
    to: &Path,
    remove_source: impl FnOnce(&Path) -> io::Result<()>,
) -> io::Result<()> {
    let Err(err) = remove_source(from) else {
        return Ok(());
    };
    if let Err(cleanup_err) = fs::remove_file(to) {
        warn!(
            source = %from.display(),
            destination = %to.display(),
            error = %cleanup_err,
            "bill left in both places after a failed move"
        );
    }
    Err(err)
}

fn place_file(source: &Path, plan: &FilePlan) -> Result<FileOutcome, PlacementError> {
    fs::create_dir_all(&plan.account_dir).map_err(|source| PlacementError::CreateDir {
        path: plan.account_dir.clone(),
        source,
    })?;

    let backfill = backfill_year_folders(&plan.account_dir).map_err(|source| PlacementError::Backfill {
        path: plan.account_dir.clone(),
        source,
    })?;
    if backfill.moved > 0 || backfill.left_in_place > 0 {
        debug!(
            account_dir = %plan.account_dir.display(),
            moved = backfill.moved,
            left_in_place = backfill.left_in_place,
            "backfilled account folder"
        );
    }

    fs::create_dir_all(&plan.year_dir).map_err(|source| PlacementError::CreateDir {
        path: plan.year_dir.clone(),
        source,
    })?;

    if plan.destination.exists() {
        return Ok(FileOutcome::Skipped {
            reason: TARGET_EXISTS_REASON.to_string(),
        });
    }

    move_file(source, &plan.destination).map_err(|err| PlacementError::Move {
        from: source.to_path_buf(),
        to: plan.destination.clone(),
        source: err,
    })?;

    Ok(FileOutcome::Moved {
        destination: plan.destination.clone(),
        hierarchy: plan.hierarchy(),
    })
}

/// Runs one file through the full pipeline. Never fails: every problem is
/// folded into the outcome.
pub fn process_single_file(
    table: &LookupTable,
    destination_root: &Path,
    source_dir: &Path,
    file_name: &str,
) -> FileOutcome {
    let plan = match plan_file(table, destination_root, file_name) {
        Ok(plan) => plan,
        Err(reason) => {
            debug!(file = file_name, %reason, "not found");
            return FileOutcome::NotFound { reason };
        }
    };

    match place_file(&source_dir.join(file_name), &plan) {
        Ok(outcome) => {
            debug!(file = file_name, outcome = ?outcome, "placed");
            outcome
        }
        Err(err) => {
            debug!(file = file_name, error = %err, "skipped");
            FileOutcome::Skipped {
                reason: err.to_string(),
            }
        }
    }
}

fn percent_before(index: usize, total: usize) -> u8 {
    (index * 100 / total.max(1)).min(100) as u8
}

/// Processes every candidate of the request in order. Progress is reported
/// once before each file and once more (100%) at the end.
pub fn run_batch(
    request: &BatchRequest,
    mut on_progress: impl FnMut(ProgressEvent),
) -> Result<BatchResult, BatchError> {
    let candidates = collect_candidates(&request.source, &request.document_extension)?;
    let total = candidates.len();
    info!(
        source = %request.source.display(),
        destination = %request.destination_root.display(),
        total,
        "starting batch"
    );

    let mut result = BatchResult {
        total,
        ..BatchResult::default()
    };

    for (idx, candidate) in candidates.iter().enumerate() {
        on_progress(ProgressEvent {
            percent: percent_before(idx, total),
            message: format!("Processing file {} of {total}: {}", idx + 1, candidate.file_name),
        });
        let outcome = process_single_file(
            &request.table,
            &request.destination_root,
            &candidate.dir,
            &candidate.file_name,
        );
        result.record(FileReport {
            file_name: candidate.file_name.clone(),
            outcome,
        });
    }

    on_progress(ProgressEvent {
        percent: 100,
        message: result.totals_line(),
    });
    info!(
        moved = result.moved,
        skipped = result.skipped,
        not_found = result.not_found,
        "batch finished"
    );
    Ok(result)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PreviewOutcome {
    Planned {
        destination: PathBuf,
        hierarchy: String,
        matched_by: MatchedBy,
        target_exists: bool,
    },
    NotFound {
        reason: NotFoundReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewEntry {
    pub file_name: String,
    #[serde(flatten)]
    pub outcome: PreviewOutcome,
}

/// Dry run: reports where each candidate would go. Creates nothing and moves
/// nothing.
pub fn preview_batch(request: &BatchRequest) -> Result<Vec<PreviewEntry>, BatchError> {
    let candidates = collect_candidates(&request.source, &request.document_extension)?;
    Ok(candidates
        .into_iter()
        .map(|candidate| {
            let outcome = match plan_file(&request.table, &request.destination_root, &candidate.file_name) {
                Ok(plan) => PreviewOutcome::Planned {
                    target_exists: plan.destination.exists(),
                    hierarchy: plan.hierarchy(),
                    matched_by: plan.account.matched_by,
                    destination: plan.destination,
                },
                Err(reason) => PreviewOutcome::NotFound { reason },
            };
            PreviewEntry {
                file_name: candidate.file_name,
                outcome,
            }
        })
        .collect())
}
