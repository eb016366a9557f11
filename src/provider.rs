use serde::Serialize;
use std::fmt;

/// Utility companies the organizer knows how to file for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Provider {
    Bell,
    Telus,
    Rogers,
}

/// Lookup order used when a token could belong to more than one provider.
pub const PROVIDER_PRIORITY: [Provider; 3] = [Provider::Bell, Provider::Telus, Provider::Rogers];

impl Provider {
    /// Case-insensitive match against the provider names used in mapping
    /// sheets ("BELL", "Telus", ...).
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "BELL" => Some(Self::Bell),
            "TELUS" => Some(Self::Telus),
            "ROGERS" => Some(Self::Rogers),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Bell => "BELL",
            Self::Telus => "TELUS",
            Self::Rogers => "ROGERS",
        }
    }

    /// Folder name used in the destination tree.
    pub fn folder_name(self) -> &'static str {
        match self {
            Self::Bell => "Bell",
            Self::Telus => "Telus",
            Self::Rogers => "Rogers",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}
