//! Service version parsing and affected-version rules.
//!
//! Versions compare component-wise on their leading numeric segments:
//! `"1.24.0-ubuntu"` → `[1, 24, 0]`, `"9.6p1"` → `[9, 6]`. Missing trailing
//! components count as zero.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Which versions of a product a signature affects.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum VersionRule {
    /// Every version, including unknown ones.
    #[default]
    Any,
    /// Strictly older than `version`.
    Below { version: String },
    /// `from <= v < to`.
    Range { from: String, to: String },
    /// One of the listed versions.
    Exact { versions: Vec<String> },
}

impl VersionRule {
    pub fn below(version: &str) -> Self {
        Self::Below {
            version: version.to_string(),
        }
    }

    pub fn range(from: &str, to: &str) -> Self {
        Self::Range {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn exact(versions: &[&str]) -> Self {
        Self::Exact {
            versions: versions.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Whether a detected service version falls under this rule. Missing or
    /// unparsable versions only satisfy [`VersionRule::Any`].
    pub fn matches(&self, detected: Option<&str>) -> bool {
        if matches!(self, Self::Any) {
            return true;
        }
        let Some(version) = detected.and_then(parse_version) else {
            return false;
        };

        match self {
            Self::Any => true,
            Self::Below { version: bound } => {
                parse_version(bound).is_some_and(|b| compare(&version, &b) == Ordering::Less)
            }
            Self::Range { from, to } => match (parse_version(from), parse_version(to)) {
                (Some(lo), Some(hi)) => {
                    compare(&version, &lo) != Ordering::Less
                        && compare(&version, &hi) == Ordering::Less
                }
                _ => false,
            },
            Self::Exact { versions } => versions
                .iter()
                .filter_map(|v| parse_version(v))
                .any(|v| compare(&version, &v) == Ordering::Equal),
        }
    }

    /// Bounds of the rule that fail to parse, if any.
    pub fn invalid_bounds(&self) -> Vec<String> {
        let bounds: Vec<&String> = match self {
            Self::Any => Vec::new(),
            Self::Below { version } => vec![version],
            Self::Range { from, to } => vec![from, to],
            Self::Exact { versions } => versions.iter().collect(),
        };
        bounds
            .into_iter()
            .filter(|b| parse_version(b).is_none())
            .cloned()
            .collect()
    }
}

/// Leading numeric components of a version string.
pub fn parse_version(raw: &str) -> Option<Vec<u64>> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V']);
    let mut parts = Vec::new();

    for segment in trimmed.split('.') {
        let digits: String = segment.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            break;
        }
        parts.push(digits.parse().ok()?);
        if digits.len() != segment.len() {
            break;
        }
    }

    (!parts.is_empty()).then_some(parts)
}

/// Component-wise comparison, padding the shorter side with zeros.
pub fn compare(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}
