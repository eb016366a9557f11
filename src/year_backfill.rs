use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

use crate::bill_date::{extract_date_target, is_year_folder_name};

/// What a backfill pass did to one account folder.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub already_organized: bool,
    pub moved: usize,
    pub left_in_place: usize,
}

/// Moves loose dated files of an account folder into `YYYY` subfolders,
/// keeping their names. A folder that already has any `YYYY` subfolder is
/// treated as organized and left untouched.
pub fn backfill_year_folders(account_dir: &Path) -> io::Result<BackfillReport> {
    let mut report = BackfillReport::default();
    let mut loose_files = Vec::new();

    for entry in fs::read_dir(account_dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name().to_string_lossy().to_string();
        if file_type.is_dir() && is_year_folder_name(&name) {
            report.already_organized = true;
            return Ok(report);
        }
        if file_type.is_file() {
            loose_files.push(name);
        }
    }
    loose_files.sort();

    for name in loose_files {
        let Some(target) = extract_date_target(&name) else {
            report.left_in_place += 1;
            continue;
        };
        let year_dir = account_dir.join(&target.year_folder);
        fs::create_dir_all(&year_dir)?;
        match fs::rename(account_dir.join(&name), year_dir.join(&name)) {
            Ok(()) => {
                debug!(file = %name, year = %target.year_folder, "backfilled into year folder");
                report.moved += 1;
            }
            Err(err) => {
                warn!(file = %name, error = %err, "could not move file into year folder");
                report.left_in_place += 1;
            }
        }
    }

    Ok(report)
}
