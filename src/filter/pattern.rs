//! Glob include/exclude rules over object names
//!
//! Used for objects that are not addressed by a database/schema/table
//! triple, such as dashboards or DAGs.

use glob::Pattern;
use serde::{Deserialize, Serialize};

/// Case-insensitive glob filter
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl PatternFilter {
    /// Compile a filter from glob strings
    pub fn new<S: AsRef<str>>(includes: &[S], excludes: &[S]) -> Result<Self, glob::PatternError> {
        Ok(Self {
            includes: compile(includes)?,
            excludes: compile(excludes)?,
        })
    }

    /// Whether a name passes the filter.
    ///
    /// With no includes every name is a candidate; excludes always win.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        let included = self.includes.is_empty() || self.includes.iter().any(|p| p.matches(&name));
        included && !self.excludes.iter().any(|p| p.matches(&name))
    }

    /// Whether any rule is configured
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }
}

fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Pattern>, glob::PatternError> {
    patterns
        .iter()
        .map(|p| Pattern::new(&p.as_ref().to_lowercase()))
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPatternFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    includes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    excludes: Vec<String>,
}

impl TryFrom<RawPatternFilter> for PatternFilter {
    type Error = String;

    fn try_from(raw: RawPatternFilter) -> Result<Self, Self::Error> {
        PatternFilter::new(&raw.includes, &raw.excludes)
            .map_err(|e| format!("invalid glob pattern: {e}"))
    }
}

impl From<&PatternFilter> for RawPatternFilter {
    fn from(filter: &PatternFilter) -> Self {
        let strings = |patterns: &[Pattern]| -> Vec<String> {
            patterns.iter().map(|p| p.as_str().to_string()).collect()
        };
        Self {
            includes: strings(&filter.includes),
            excludes: strings(&filter.excludes),
        }
    }
}

impl Serialize for PatternFilter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawPatternFilter::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PatternFilter {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawPatternFilter::deserialize(deserializer)?;
        PatternFilter::try_from(raw).map_err(serde::de::Error::custom)
    }
}
