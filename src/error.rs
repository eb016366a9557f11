use std::io;
use std::path::PathBuf;

/// The mapping source could not be turned into rows at all.
///
/// Individual malformed rows never produce this error; they are skipped by
/// the table builder.
#[derive(Debug, thiserror::Error)]
pub enum MappingLoadError {
    #[error("mapping file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("mapping path is not a file: {}", path.display())]
    NotAFile { path: PathBuf },

    #[error("unsupported mapping format: .{extension} (expected .csv, .xlsx, .xls, .xlsm or .ods)")]
    UnsupportedFormat { extension: String },

    #[error("failed to read mapping file {}: {message}", path.display())]
    Unreadable { path: PathBuf, message: String },

    #[error("no worksheet found in {}", path.display())]
    NoWorksheet { path: PathBuf },
}

/// Batch-fatal failures. Anything that goes wrong with a single file is
/// reported through its `FileOutcome` instead.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("no .{extension} files found in {}", source_path.display())]
    Empty {
        source_path: PathBuf,
        extension: String,
    },

    #[error("source is neither a file nor a directory: {}", path.display())]
    SourceUnavailable { path: PathBuf },

    #[error("failed to list source directory {}: {source}", path.display())]
    Enumerate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("batch task terminated unexpectedly: {message}")]
    TaskAborted { message: String },
}

/// Failure while placing one file in the destination tree. The display text
/// is what ends up as the skip reason in the batch log.
#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to organize account folder {} by year: {source}", path.display())]
    Backfill {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to move {} to {}: {source}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, thiserror::Error)]
#[error("failed to initialize logging: {0}")]
pub struct LoggingInitError(#[from] tracing_subscriber::util::TryInitError);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placement_error_message_names_both_paths() {
        let err = PlacementError::Move {
            from: PathBuf::from("/in/a.pdf"),
            to: PathBuf::from("/out/b.pdf"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let text = err.to_string();
        assert!(text.contains("/in/a.pdf"));
        assert!(text.contains("/out/b.pdf"));
        assert!(text.ends_with("denied"));
    }

    #[test]
    fn empty_batch_error_mentions_extension() {
        let err = BatchError::Empty {
            source_path: PathBuf::from("/scans"),
            extension: "pdf".to_string(),
        };
        assert_eq!(err.to_string(), "no .pdf files found in /scans");
    }
}
