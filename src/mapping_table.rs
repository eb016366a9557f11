use calamine::{open_workbook_auto, Reader};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::account_tokens::split_account_cell;
use crate::error::MappingLoadError;
use crate::provider::{Provider, PROVIDER_PRIORITY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingEntry {
    pub provider: Provider,
    pub corporation: String,
    pub last4: String,
    pub extension: String,
}

/// Which token of a filename produced a lookup hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Last4,
    Extension,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMatch {
    pub entry: Arc<MappingEntry>,
    /// Used verbatim as the account folder name.
    pub token: String,
    pub matched_by: MatchedBy,
}

/// `(provider, token) -> entry`, immutable once built.
///
/// An entry with both a last4 and an extension is reachable under both keys.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: BTreeMap<(Provider, String), Arc<MappingEntry>>,
}

impl LookupTable {
    pub fn get(&self, provider: Provider, token: &str) -> Option<&Arc<MappingEntry>> {
        self.entries.get(&(provider, token.to_string()))
    }

    /// Number of keys, which counts an entry twice when it has both tokens.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (Provider, &str, &MappingEntry)> {
        self.entries
            .iter()
            .map(|((provider, token), entry)| (*provider, token.as_str(), entry.as_ref()))
    }

    /// Probes every provider in priority order with `last4` first, then with
    /// `extension`. Empty tokens are never probed.
    pub fn resolve(&self, last4: &str, extension: &str) -> Option<AccountMatch> {
        let probes = [(last4, MatchedBy::Last4), (extension, MatchedBy::Extension)];
        for (token, matched_by) in probes {
            if token.is_empty() {
                continue;
            }
            for provider in PROVIDER_PRIORITY {
                if let Some(entry) = self.get(provider, token) {
                    return Some(AccountMatch {
                        entry: Arc::clone(entry),
                        token: token.to_string(),
                        matched_by,
                    });
                }
            }
        }
        None
    }

    fn insert(&mut self, entry: MappingEntry) {
        let entry = Arc::new(entry);
        // Later rows silently replace earlier ones under the same key.
        if !entry.last4.is_empty() {
            self.entries
                .insert((entry.provider, entry.last4.clone()), Arc::clone(&entry));
        }
        if !entry.extension.is_empty() {
            self.entries
                .insert((entry.provider, entry.extension.clone()), entry);
        }
    }
}

/// Fold state: the provider section we are in plus the table so far.
#[derive(Debug, Default)]
struct BuildState {
    current_provider: Option<Provider>,
    table: LookupTable,
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|s| s.trim()).unwrap_or_default()
}

fn fold_row(mut state: BuildState, row: &[String]) -> BuildState {
    let (cell0, corporation, account) = (cell(row, 0), cell(row, 1), cell(row, 2));

    if corporation.is_empty() && account.is_empty() {
        if let Some(provider) = Provider::parse(cell0) {
            state.current_provider = Some(provider);
            return state;
        }
    }

    let Some(provider) = state.current_provider else {
        return state;
    };
    if corporation.is_empty() || account.is_empty() {
        return state;
    }

    let (last4, extension) = split_account_cell(account);
    if last4.is_empty() && extension.is_empty() {
        debug!(corporation, account, "mapping row has no usable account token");
        return state;
    }

    state.table.insert(MappingEntry {
        provider,
        corporation: corporation.to_string(),
        last4,
        extension,
    });
    state
}

/// Builds the lookup table from positional rows (provider header rows
/// followed by `_, corporation, account` rows). Malformed rows are skipped.
pub fn build_lookup_table<R>(rows: impl IntoIterator<Item = R>) -> LookupTable
where
    R: AsRef<[String]>,
{
    rows.into_iter()
        .fold(BuildState::default(), |state, row| fold_row(state, row.as_ref()))
        .table
}

fn trim_cell(text: &str) -> String {
    text.trim()
        .trim_start_matches('\u{feff}')
        .trim()
        .to_string()
}

fn unreadable(path: &Path, message: impl ToString) -> MappingLoadError {
    MappingLoadError::Unreadable {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>, MappingLoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| unreadable(path, e))?;

    // Fields are decoded lossily so a legacy-encoded name costs one
    // character, not the row.
    let mut rows = Vec::new();
    for (idx, rec) in reader.byte_records().enumerate() {
        let rec = match rec {
            Ok(rec) => rec,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                return Err(unreadable(path, e));
            }
            Err(e) => {
                debug!(path = %path.display(), record = idx, error = %e, "skipping bad CSV record");
                continue;
            }
        };
        rows.push(
            rec.iter()
                .take(3)
                .map(|field| trim_cell(&String::from_utf8_lossy(field)))
                .collect(),
        );
    }
    Ok(rows)
}

fn read_workbook_rows(path: &Path) -> Result<Vec<Vec<String>>, MappingLoadError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| unreadable(path, e))?;
    let first_sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| MappingLoadError::NoWorksheet {
            path: path.to_path_buf(),
        })?;

    let range = workbook
        .worksheet_range(&first_sheet)
        .map_err(|e| unreadable(path, e))?;

    let rows = range
        .rows()
        .map(|row| {
            row.iter()
                .take(3)
                .map(|cell| trim_cell(&cell.to_string()))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    Ok(rows)
}

/// Reads the first three columns of every row of a `.csv` file or the first
/// worksheet of a spreadsheet.
pub fn read_mapping_rows(path: &Path) -> Result<Vec<Vec<String>>, MappingLoadError> {
    if !path.exists() {
        return Err(MappingLoadError::NotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(MappingLoadError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    let suffix = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match suffix.as_str() {
        "csv" => read_csv_rows(path),
        "xlsx" | "xls" | "xlsm" | "ods" => read_workbook_rows(path),
        _ => Err(MappingLoadError::UnsupportedFormat { extension: suffix }),
    }
}

/// Loads a mapping source and builds its lookup table.
pub fn load_mapping_at_path(path: &Path) -> Result<LookupTable, MappingLoadError> {
    let rows = read_mapping_rows(path)?;
    let row_count = rows.len();
    let table = build_lookup_table(rows);
    info!(
        path = %path.display(),
        rows = row_count,
        keys = table.entry_count(),
        "loaded mapping"
    );
    Ok(table)
}

/// A mapping file path together with the table it produced.
#[derive(Debug, Clone)]
pub struct LoadedMapping {
    pub path: PathBuf,
    pub table: Arc<LookupTable>,
}

impl LoadedMapping {
    pub fn load(path: &Path) -> Result<Self, MappingLoadError> {
        Ok(Self {
            path: path.to_path_buf(),
            table: Arc::new(load_mapping_at_path(path)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use uuid::Uuid;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn temp_file(name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bill_organizer_mapping_{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join(name);
        fs::write(&path, contents).expect("write fixture");
        path
    }

    #[test]
    fn rows_after_a_header_are_indexed_under_both_tokens() {
        let table = build_lookup_table(vec![
            row(&["BELL"]),
            row(&["", "CorpA", "416-555-1234 (AX12)"]),
            row(&["", "CorpB", "7788990"]),
        ]);
        assert_eq!(table.entry_count(), 3);
        let by_last4 = table.get(Provider::Bell, "1234").expect("last4 key");
        let by_ext = table.get(Provider::Bell, "AX12").expect("extension key");
        assert!(Arc::ptr_eq(by_last4, by_ext));
        assert_eq!(by_last4.corporation, "CorpA");
        assert_eq!(table.get(Provider::Bell, "8990").map(|e| e.corporation.as_str()), Some("CorpB"));
    }

    #[test]
    fn rows_before_any_header_are_ignored() {
        let table = build_lookup_table(vec![
            row(&["", "CorpA", "416-555-1234"]),
            row(&["Rogers", "", ""]),
            row(&["", "CorpB", "416-555-9999"]),
        ]);
        assert_eq!(table.entry_count(), 1);
        assert!(table.get(Provider::Rogers, "9999").is_some());
        assert!(table.get(Provider::Rogers, "1234").is_none());
    }

    #[test]
    fn consecutive_headers_register_nothing() {
        let table = build_lookup_table(vec![row(&["BELL", "", ""]), row(&["telus"]), row(&["ROGERS", ""])]);
        assert!(table.is_empty());
    }

    #[test]
    fn provider_name_with_data_is_not_a_header() {
        let table = build_lookup_table(vec![
            row(&["TELUS"]),
            row(&["BELL", "CorpA", "604-555-0001"]),
        ]);
        // Still in the TELUS section; the BELL cell is just a label.
        assert!(table.get(Provider::Telus, "0001").is_some());
        assert!(table.get(Provider::Bell, "0001").is_none());
    }

    #[test]
    fn incomplete_rows_are_skipped() {
        let table = build_lookup_table(vec![
            row(&["BELL"]),
            row(&["", "CorpA"]),
            row(&["", "", "416-555-1234"]),
            row(&["", "CorpC", "n/a"]),
        ]);
        assert!(table.is_empty());
    }

    #[test]
    fn later_rows_overwrite_earlier_keys() {
        let table = build_lookup_table(vec![
            row(&["BELL"]),
            row(&["", "Old Corp", "416-555-1234"]),
            row(&["", "New Corp", "905-555-1234"]),
        ]);
        assert_eq!(table.entry_count(), 1);
        assert_eq!(table.get(Provider::Bell, "1234").expect("key").corporation, "New Corp");
    }

    #[test]
    fn resolve_prefers_last4_then_provider_priority() {
        let table = build_lookup_table(vec![
            row(&["ROGERS"]),
            row(&["", "RogersCorp", "416-555-1234"]),
            row(&["TELUS"]),
            row(&["", "TelusCorp", "604-555-1234"]),
            row(&["BELL"]),
            row(&["", "BellCorp", "(5678)"]),
        ]);

        let hit = table.resolve("1234", "5678").expect("match");
        assert_eq!(hit.entry.corporation, "TelusCorp");
        assert_eq!(hit.token, "1234");
        assert_eq!(hit.matched_by, MatchedBy::Last4);

        let hit = table.resolve("0000", "5678").expect("match");
        assert_eq!(hit.entry.corporation, "BellCorp");
        assert_eq!(hit.matched_by, MatchedBy::Extension);

        assert!(table.resolve("", "").is_none());
        assert!(table.resolve("0000", "").is_none());
    }

    #[test]
    fn csv_mapping_only_reads_first_three_columns() {
        let path = temp_file(
            "mapping.csv",
            "BELL,,\n,CorpA,416-555-1234,ignored,more\n\"\",CorpB,\"514 555 4321 (B7)\"\nTELUS\n,CorpC,7788990\n",
        );
        let table = load_mapping_at_path(&path).expect("load csv");
        assert_eq!(table.get(Provider::Bell, "1234").expect("CorpA").corporation, "CorpA");
        assert_eq!(table.get(Provider::Bell, "B7").expect("CorpB").last4, "4321");
        assert_eq!(table.get(Provider::Telus, "8990").expect("CorpC").corporation, "CorpC");
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn latin1_rows_are_decoded_lossily_instead_of_failing_the_load() {
        let mut contents = b"BELL,,\n,CorpA,416-555-1234\n,Soci".to_vec();
        contents.extend_from_slice(b"\xE9t\xE9 B,514-555-9999\n,CorpC,905-555-7777\n");
        let path = temp_file("mapping.csv", contents);

        let table = load_mapping_at_path(&path).expect("load csv");
        assert_eq!(table.entry_count(), 3);
        assert_eq!(table.get(Provider::Bell, "1234").expect("CorpA").corporation, "CorpA");
        assert_eq!(
            table.get(Provider::Bell, "9999").expect("latin-1 row").corporation,
            "Soci\u{FFFD}t\u{FFFD} B"
        );
        assert!(table.get(Provider::Bell, "7777").is_some());
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    fn text_cell(reference: &str, text: &str) -> String {
        format!(r#"<c r="{reference}" t="inlineStr"><is><t>{text}</t></is></c>"#)
    }

    fn number_cell(reference: &str, value: &str) -> String {
        format!(r#"<c r="{reference}"><v>{value}</v></c>"#)
    }

    fn sheet_xml(rows: &[(u32, Vec<String>)]) -> String {
        let body = rows
            .iter()
            .map(|(n, cells)| format!(r#"<row r="{n}">{}</row>"#, cells.concat()))
            .collect::<String>();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{body}</sheetData></worksheet>"#
        )
    }

    fn write_workbook(path: &Path, sheets: &[(&str, String)]) {
        use std::io::Write;

        let sheet_entries = sheets
            .iter()
            .enumerate()
            .map(|(i, (name, _))| {
                format!(r#"<sheet name="{name}" sheetId="{}" r:id="rId{}"/>"#, i + 1, i + 1)
            })
            .collect::<String>();
        let rels = sheets
            .iter()
            .enumerate()
            .map(|(i, _)| {
                format!(
                    r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                    i + 1,
                    i + 1
                )
            })
            .collect::<String>();
        let overrides = (1..=sheets.len())
            .map(|i| {
                format!(
                    r#"<Override PartName="/xl/worksheets/sheet{i}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
                )
            })
            .collect::<String>();

        let mut parts = vec![
            (
                "[Content_Types].xml".to_string(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>{overrides}</Types>"#
                ),
            ),
            (
                "_rels/.rels".to_string(),
                r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.to_string(),
            ),
            (
                "xl/workbook.xml".to_string(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>{sheet_entries}</sheets></workbook>"#
                ),
            ),
            (
                "xl/_rels/workbook.xml.rels".to_string(),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}<Relationship Id="rIdStyles" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#
                ),
            ),
            (
                "xl/styles.xml".to_string(),
                r#"<?xml version="1.0" encoding="UTF-8"?><styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs></styleSheet>"#.to_string(),
            ),
        ];
        for (i, (_, xml)) in sheets.iter().enumerate() {
            parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), xml.clone()));
        }

        let file = fs::File::create(path).expect("create workbook");
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, xml) in parts {
            zip.start_file(name, options).expect("start part");
            zip.write_all(xml.as_bytes()).expect("write part");
        }
        zip.finish().expect("finish workbook");
    }

    #[test]
    fn workbook_mapping_reads_first_sheet_and_numeric_phone_cells() {
        let dir = std::env::temp_dir().join(format!("bill_organizer_mapping_{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("accounts.xlsx");

        let accounts = sheet_xml(&[
            (1, vec![text_cell("A1", "Accounts by provider")]),
            (2, vec![text_cell("A2", "BELL")]),
            (3, vec![text_cell("B3", "CorpA"), number_cell("C3", "4165551234")]),
            (4, vec![text_cell("B4", "CorpB"), text_cell("C4", "604-555-3333 (HQ1)")]),
            (5, vec![text_cell("A5", "Rogers")]),
            (6, vec![text_cell("B6", " CorpC "), text_cell("C6", "Acct 8765432 455")]),
        ]);
        let archived = sheet_xml(&[
            (1, vec![text_cell("A1", "TELUS")]),
            (2, vec![text_cell("B2", "Archived"), text_cell("C2", "999-999-0000")]),
        ]);
        write_workbook(&path, &[("Accounts", accounts), ("Archived", archived)]);

        let rows = read_mapping_rows(&path).expect("read rows");
        assert_eq!(rows[2], vec!["", "CorpA", "4165551234"]);

        let table = load_mapping_at_path(&path).expect("load workbook");
        assert_eq!(table.entry_count(), 5);
        assert_eq!(table.get(Provider::Bell, "1234").expect("numeric phone").corporation, "CorpA");
        assert_eq!(table.get(Provider::Bell, "HQ1").expect("extension").last4, "3333");
        assert_eq!(table.get(Provider::Rogers, "455").expect("trailing").corporation, "CorpC");
        assert!(table.get(Provider::Rogers, "5432").is_some());
        assert!(table.get(Provider::Telus, "0000").is_none());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn loaded_mapping_keeps_its_source_path() {
        let path = temp_file("mapping.csv", "TELUS\n,CorpB,604-555-3333\n");
        let loaded = LoadedMapping::load(&path).expect("load");
        assert_eq!(loaded.path, path);
        assert_eq!(loaded.table.entry_count(), 1);
        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn unreadable_sources_surface_load_errors() {
        let missing = std::env::temp_dir().join(format!("missing_{}.csv", Uuid::new_v4()));
        assert!(matches!(
            load_mapping_at_path(&missing),
            Err(MappingLoadError::NotFound { .. })
        ));

        let txt = temp_file("mapping.txt", "BELL\n");
        assert!(matches!(
            load_mapping_at_path(&txt),
            Err(MappingLoadError::UnsupportedFormat { .. })
        ));

        let broken = temp_file("mapping.xlsx", "not really a workbook");
        assert!(matches!(
            load_mapping_at_path(&broken),
            Err(MappingLoadError::Unreadable { .. })
        ));
    }
}
