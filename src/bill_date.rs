use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::provider::Provider;

/// Where a dated bill goes inside its account folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateTarget {
    /// `YYYY-MM-DD`
    pub iso_date: String,
    /// `YYYY`
    pub year_folder: String,
    /// `YY-MM-DD` plus the original file extension.
    pub normalized_filename: String,
}

fn full_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([0-9]{4})-([0-9]{2})-([0-9]{2})").expect("full date regex")
    })
}

fn short_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([0-9]{2})-([0-9]{2})-([0-9]{2})").expect("short date regex")
    })
}

fn year_folder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{4}$").expect("year folder regex"))
}

/// Splits `name` into its stem and its extension (dot included, possibly
/// empty). A leading dot does not start an extension.
pub(crate) fn split_file_name(name: &str) -> (&str, String) {
    let path = Path::new(name);
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| format!(".{s}"))
        .unwrap_or_default();
    let stem = if ext.is_empty() {
        name
    } else {
        &name[..name.len() - ext.len()]
    };
    (stem, ext)
}

pub(crate) fn is_year_folder_name(name: &str) -> bool {
    year_folder_re().is_match(name)
}

/// Reads the bill date out of a filename. Two-digit years always land in
/// the 2000s.
pub fn extract_date_target(file_name: &str) -> Option<DateTarget> {
    let (stem, ext) = split_file_name(file_name);

    let (yyyy, mm, dd) = if let Some(caps) = full_date_re().captures(stem) {
        (caps[1].to_string(), caps[2].to_string(), caps[3].to_string())
    } else {
        let caps = short_date_re().captures(stem)?;
        (format!("20{}", &caps[1]), caps[2].to_string(), caps[3].to_string())
    };

    Some(DateTarget {
        iso_date: format!("{yyyy}-{mm}-{dd}"),
        normalized_filename: format!("{}-{mm}-{dd}{ext}", &yyyy[2..]),
        year_folder: yyyy,
    })
}

/// `<root>/<corporation>/<Provider>/<token>`
pub fn account_dir(
    destination_root: &Path,
    corporation: &str,
    provider: Provider,
    token: &str,
) -> PathBuf {
    destination_root
        .join(corporation)
        .join(provider.folder_name())
        .join(token)
}

/// Human-readable five-level chain reported for a moved file.
pub fn hierarchy_path(corporation: &str, provider: Provider, token: &str, target: &DateTarget) -> String {
    format!(
        "{corporation} -> {} -> {token} -> {} -> {}",
        provider.folder_name(),
        target.year_folder,
        target.normalized_filename
    )
}
