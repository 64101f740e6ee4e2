//! Socket API request and response types.
//!
//! These types represent the raw JSON exchanged with the package-URL
//! scoring endpoint. Responses are deserialized and then mapped to
//! unified [`PackageScore`] values.

use depscore_core::{PackageRef, PackageScore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Score keys that are not shown as sub-scores.
const HIDDEN_SCORE_KEYS: [&str; 2] = ["overall", "uuid"];

// =============================================================================
// Request
// =============================================================================

/// A single component in a scoring request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Component {
    pub purl: String,
}

/// Body of `POST /v0/purl`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentsRequest {
    pub components: Vec<Component>,
}

impl ComponentsRequest {
    pub fn from_packages(packages: &[PackageRef]) -> Self {
        Self {
            components: packages
                .iter()
                .map(|p| Component { purl: p.purl() })
                .collect(),
        }
    }
}

// =============================================================================
// Response
// =============================================================================

/// One package record as returned by the scoring API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocketPackage {
    #[serde(default, rename = "type")]
    pub ecosystem: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub score: Option<Map<String, Value>>,
}

fn or_unknown(value: &Option<String>) -> &str {
    value
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl SocketPackage {
    /// Package URL reported back by the API.
    pub fn purl(&self) -> String {
        format!(
            "pkg:{}/{}@{}",
            or_unknown(&self.ecosystem),
            or_unknown(&self.name),
            or_unknown(&self.version)
        )
    }

    /// A record only counts as scored when it carries an `overall` entry.
    pub fn is_scored(&self) -> bool {
        self.score
            .as_ref()
            .is_some_and(|score| score.contains_key("overall"))
    }

    /// Map to the unified score type.
    ///
    /// `overall` and `uuid` are dropped from the listed sub-scores, the rest
    /// keep the API's order. Non-numeric entries are skipped.
    pub fn to_score(&self) -> PackageScore {
        let purl = self.purl();
        match &self.score {
            Some(score) if self.is_scored() => {
                let scores: Vec<(String, f64)> = score
                    .iter()
                    .filter(|(key, _)| !HIDDEN_SCORE_KEYS.contains(&key.as_str()))
                    .filter_map(|(key, value)| as_number(value).map(|n| (key.clone(), n)))
                    .collect();
                PackageScore::scored(purl, scores)
            }
            _ => PackageScore::missing(purl),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_request() {
        let request = ComponentsRequest::from_packages(&[
            PackageRef::new("npm", "express", "^4.18.2"),
            PackageRef::new("pypi", "requests", "unknown"),
        ]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "components": [
                    {"purl": "pkg:npm/express@4.18.2"},
                    {"purl": "pkg:pypi/requests"}
                ]
            })
        );
    }

    #[test]
    fn test_purl_defaults_to_unknown() {
        let pkg: SocketPackage = serde_json::from_str(r#"{"name":"","type":"npm"}"#).unwrap();
        assert_eq!(pkg.purl(), "pkg:npm/unknown@unknown");
    }

    #[test]
    fn test_to_score_filters_hidden_keys() {
        let pkg: SocketPackage = serde_json::from_value(serde_json::json!({
            "type": "npm",
            "name": "express",
            "version": "4.18.2",
            "score": {
                "overall": 0.9,
                "uuid": "abc",
                "license": 1,
                "maintenance": "0.75",
                "vulnerability": 0.5
            }
        }))
        .unwrap();

        let score = pkg.to_score();
        let scores = score.scores.expect("scored");
        assert_eq!(
            scores,
            vec![
                ("license".to_string(), 1.0),
                ("maintenance".to_string(), 0.75),
                ("vulnerability".to_string(), 0.5),
            ]
        );
    }

    #[test]
    fn test_to_score_without_overall_is_missing() {
        let pkg: SocketPackage = serde_json::from_value(serde_json::json!({
            "type": "npm",
            "name": "left-pad",
            "version": "1.3.0",
            "score": {"license": 1}
        }))
        .unwrap();

        assert!(!pkg.is_scored());
        assert_eq!(
            pkg.to_score(),
            PackageScore::missing("pkg:npm/left-pad@1.3.0")
        );
    }

    #[test]
    fn test_to_score_keeps_api_order() {
        let pkg: SocketPackage = serde_json::from_str(
            r#"{"type":"npm","name":"x","version":"1","score":{"supplyChain":0.2,"overall":0.5,"quality":0.9,"license":1}}"#,
        )
        .unwrap();

        assert_eq!(
            pkg.to_score().to_string(),
            "pkg:npm/x@1: supplyChain: 20, quality: 90, license: 100"
        );
    }
}
