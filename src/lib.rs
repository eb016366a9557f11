//! Files scanned utility bills into `corporation/provider/account/year`
//! folders using an account mapping sheet and the account number and date
//! found in each filename.

pub mod account_tokens;
pub mod batch_task;
pub mod bill_date;
pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod mapping_table;
pub mod organizer;
pub mod provider;
pub mod year_backfill;

pub use account_tokens::{extract_account_tokens, ExtractedTokens};
pub use batch_task::{spawn_batch, BatchHandle};
pub use bill_date::{extract_date_target, DateTarget};
pub use error::{BatchError, ConfigError, LoggingInitError, MappingLoadError, PlacementError};
pub use mapping_table::{build_lookup_table, load_mapping_at_path, LookupTable, MappingEntry};
pub use organizer::{
    preview_batch, process_single_file, run_batch, BatchRequest, BatchResult, FileOutcome,
    NotFoundReason, ProgressEvent,
};
pub use provider::Provider;
pub use year_backfill::backfill_year_folders;
