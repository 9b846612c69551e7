// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use crate::model::{covers, Assignment};

/// Per-subscriber predicate over published assignments.
///
/// An assignment passes when its department equals `department` and it
/// carries every language in `languages`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilter {
    pub department: String,
    #[serde(default)]
    pub languages: Vec<String>,
}

impl SubscriptionFilter {
    pub fn new(department: impl Into<String>, languages: &[&str]) -> Self {
        Self {
            department: department.into(),
            languages: languages.iter().map(|l| (*l).to_owned()).collect(),
        }
    }

    /// Build from query-string values (`languages` is comma-separated).
    pub fn from_query(department: &str, languages: &str) -> Self {
        Self {
            department: department.trim().to_owned(),
            languages: languages
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    pub fn matches(&self, assignment: &Assignment) -> bool {
        assignment.department == self.department && covers(&assignment.languages, &self.languages)
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
