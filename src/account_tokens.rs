use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::OnceLock;

use crate::bill_date::split_file_name;

/// Account identifiers pulled out of a bill filename.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedTokens {
    /// Exactly four digits, or empty.
    pub last4: String,
    /// Two to six alphanumerics, or empty.
    pub extension: String,
    /// Which rule produced `last4`, when one did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last4_rule: Option<Last4Rule>,
}

impl ExtractedTokens {
    pub fn is_empty(&self) -> bool {
        self.last4.is_empty() && self.extension.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Last4Rule {
    PhoneNumber,
    AccountNumber,
    DigitRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionStyle {
    /// `(AX12)` anywhere in the text.
    Parenthesized,
    /// ` 567` at the very end of the text.
    Trailing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionCode {
    pub code: String,
    pub style: ExtensionStyle,
}

/// A maximal run of ASCII digits and its byte offset in the searched text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitRun<'a> {
    pub digits: &'a str,
    pub start: usize,
}

type AccountRule = fn(&str) -> Option<String>;

/// Tried in order; the first rule that yields a token wins.
const ACCOUNT_RULES: &[(Last4Rule, AccountRule)] = &[
    (Last4Rule::PhoneNumber, phone_number_rule),
    (Last4Rule::AccountNumber, account_number_rule),
    (Last4Rule::DigitRun, digit_run_rule),
];

fn paren_group_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([^)]+)\)").expect("paren group regex"))
}

fn extension_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9A-Za-z]{2,6}$").expect("extension code regex"))
}

fn trailing_extension_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+([0-9]{3,4})\s*$").expect("trailing extension regex"))
}

fn phone_like_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[0-9]{3}[-\s]?[0-9]{3}[-\s]?[0-9]{4}").expect("phone-like regex")
    })
}

fn date_strip_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"_[0-9]{4}-[0-9]{2}-[0-9]{2}",
            r"_[0-9]{2}-[0-9]{2}-[0-9]{2}",
            r"[0-9]{4}-[0-9]{2}-[0-9]{2}",
            r"[0-9]{2}-[0-9]{2}-[0-9]{2}",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("date strip regex"))
        .collect()
    })
}

fn phone_number_res() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            r"[0-9]{3}\s+[0-9]{3}\s+[0-9]{4}",
            r"[0-9]{3}-[0-9]{3}-[0-9]{4}",
            r"[0-9]{10}",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("phone number regex"))
        .collect()
    })
}

fn digit_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]+").expect("digit run regex"))
}

fn digits_only(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn trailing4(digits: &str) -> Option<String> {
    (digits.len() >= 4).then(|| digits[digits.len() - 4..].to_string())
}

fn char_before(text: &str, byte_idx: usize) -> Option<char> {
    text[..byte_idx].chars().next_back()
}

// The masking 'X' in "XXXXXX1234567" is a letter, so it is covered here too.
fn preceded_by_letter(text: &str, byte_idx: usize) -> bool {
    char_before(text, byte_idx).is_some_and(char::is_alphabetic)
}

/// Finds an extension code using the two-step heuristic shared by mapping
/// cells and filenames: the first parenthesized group if it holds 2-6
/// alphanumerics, otherwise a 3-4 digit group after whitespace at the end.
///
/// A parenthesized group that is not a valid code suppresses the trailing
/// rule entirely.
pub fn find_extension(text: &str) -> Option<ExtensionCode> {
    if let Some(caps) = paren_group_re().captures(text) {
        let inner = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        return extension_code_re()
            .is_match(inner)
            .then(|| ExtensionCode {
                code: inner.to_string(),
                style: ExtensionStyle::Parenthesized,
            });
    }
    trailing_extension_re()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| ExtensionCode {
            code: m.as_str().to_string(),
            style: ExtensionStyle::Trailing,
        })
}

/// Splits the account cell of a mapping row into `(last4, extension)`.
pub fn split_account_cell(raw: &str) -> (String, String) {
    let extension = find_extension(raw);
    let remainder = match extension.as_ref().map(|e| e.style) {
        Some(ExtensionStyle::Parenthesized) => paren_group_re().replace_all(raw, "").into_owned(),
        Some(ExtensionStyle::Trailing) => trailing_extension_re().replace(raw, "").into_owned(),
        None => raw.to_string(),
    };

    let last4 = match phone_like_re().find(&remainder) {
        Some(m) => trailing4(&digits_only(m.as_str())),
        None => trailing4(&digits_only(&remainder)),
    }
    .unwrap_or_default();

    (last4, extension.map(|e| e.code).unwrap_or_default())
}

/// All maximal digit runs in `text`, left to right.
pub fn digit_runs(text: &str) -> Vec<DigitRun<'_>> {
    digit_run_re()
        .find_iter(text)
        .map(|m| DigitRun {
            digits: m.as_str(),
            start: m.start(),
        })
        .collect()
}

/// Ordering for account-number candidates: longer runs win, and among runs
/// of equal length the one that starts later (further right) wins.
pub fn prefer_account_run(a: &DigitRun<'_>, b: &DigitRun<'_>) -> Ordering {
    a.digits
        .len()
        .cmp(&b.digits.len())
        .then_with(|| a.start.cmp(&b.start))
}

fn phone_number_rule(text: &str) -> Option<String> {
    for re in phone_number_res() {
        let Some(m) = re.find(text) else {
            continue;
        };
        let digits = digits_only(m.as_str());
        if digits.len() != 10 {
            continue;
        }
        // Reject a 10-digit window cut out of a longer alphanumeric block.
        if char_before(text, m.start()).is_some_and(char::is_alphanumeric) {
            continue;
        }
        return trailing4(&digits);
    }
    None
}

fn account_number_rule(text: &str) -> Option<String> {
    digit_runs(text)
        .into_iter()
        .filter(|run| (7..=10).contains(&run.digits.len()))
        .filter(|run| !preceded_by_letter(text, run.start))
        .max_by(prefer_account_run)
        .and_then(|run| trailing4(run.digits))
}

fn looks_like_year(digits: &str) -> bool {
    digits.len() == 4 && (digits.starts_with("19") || digits.starts_with("20"))
}

fn digit_run_rule(text: &str) -> Option<String> {
    digit_runs(text)
        .into_iter()
        .filter(|run| run.digits.len() >= 4)
        .filter(|run| !looks_like_year(run.digits))
        .filter(|run| !preceded_by_letter(text, run.start))
        .max_by_key(|run| run.start)
        .and_then(|run| trailing4(run.digits))
}

fn strip_dates(stem: &str) -> String {
    date_strip_res()
        .iter()
        .fold(stem.to_string(), |text, re| re.replacen(&text, 1, "").into_owned())
}

fn strip_extension(text: &str, code: &str) -> String {
    let without_groups = paren_group_re().replace_all(text, "").into_owned();
    match Regex::new(&format!(r"\s+{}\s*", regex::escape(code))) {
        Ok(re) => re.replace_all(&without_groups, "").into_owned(),
        Err(_) => without_groups,
    }
}

/// Extracts the account tokens from a filename (extension is ignored).
pub fn extract_account_tokens(file_name: &str) -> ExtractedTokens {
    let (stem, _) = split_file_name(file_name);
    let extension = find_extension(stem).map(|e| e.code).unwrap_or_default();

    let mut working = strip_dates(stem);
    if !extension.is_empty() {
        working = strip_extension(&working, &extension);
    }

    for (rule, matcher) in ACCOUNT_RULES {
        if let Some(last4) = matcher(&working) {
            return ExtractedTokens {
                last4,
                extension,
                last4_rule: Some(*rule),
            };
        }
    }

    ExtractedTokens {
        last4: String::new(),
        extension,
        last4_rule: None,
    }
}
