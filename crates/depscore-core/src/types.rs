//! Package and score types shared by the scoring client and the tool handler.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Version placeholder used when the caller does not know the version.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Version string some assistants emit when they do not know the real one.
/// It is treated the same as an unknown version.
const PLACEHOLDER_VERSION: &str = "1.0.0";

fn default_ecosystem() -> String {
    "npm".to_string()
}

fn default_version() -> String {
    UNKNOWN_VERSION.to_string()
}

/// A package the caller wants scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    /// Package ecosystem (e.g. npm, pypi)
    #[serde(default = "default_ecosystem")]
    pub ecosystem: String,
    /// Package name
    pub depname: String,
    /// Package version, `unknown` if not known
    #[serde(default = "default_version")]
    pub version: String,
}

impl PackageRef {
    pub fn new(
        ecosystem: impl Into<String>,
        depname: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            ecosystem: ecosystem.into(),
            depname: depname.into(),
            version: version.into(),
        }
    }

    /// Version with range operators (`^`, `~`) removed.
    pub fn cleaned_version(&self) -> String {
        self.version.replace(['^', '~'], "")
    }

    /// Whether a concrete version should be pinned in the package URL.
    pub fn has_pinned_version(&self) -> bool {
        let version = self.cleaned_version();
        !(version.is_empty() || version == UNKNOWN_VERSION || version == PLACEHOLDER_VERSION)
    }

    /// Package URL sent to the scoring API.
    pub fn purl(&self) -> String {
        if self.has_pinned_version() {
            format!(
                "pkg:{}/{}@{}",
                self.ecosystem,
                self.depname,
                self.cleaned_version()
            )
        } else {
            format!("pkg:{}/{}", self.ecosystem, self.depname)
        }
    }
}

/// Score result for a single package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageScore {
    /// Package URL as reported back by the scoring API
    pub purl: String,
    /// Named sub-scores in the order the API reported them, `None` when
    /// the API has no score for the package
    pub scores: Option<Vec<(String, f64)>>,
}

impl PackageScore {
    pub fn scored(purl: impl Into<String>, scores: Vec<(String, f64)>) -> Self {
        Self {
            purl: purl.into(),
            scores: Some(scores),
        }
    }

    pub fn missing(purl: impl Into<String>) -> Self {
        Self {
            purl: purl.into(),
            scores: None,
        }
    }
}

/// Scale a raw score for display: fractions become percentages.
pub fn display_score(value: f64) -> f64 {
    if value <= 1.0 {
        (value * 100.0).round()
    } else {
        value
    }
}

impl fmt::Display for PackageScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scores {
            Some(scores) => {
                let entries = scores
                    .iter()
                    .map(|(name, value)| format!("{}: {}", name, display_score(*value)))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{}: {}", self.purl, entries)
            }
            None => write!(f, "{}: No score found", self.purl),
        }
    }
}
