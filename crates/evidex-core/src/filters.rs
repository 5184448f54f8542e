//! Evidence filter description.
//!
//! `EvidenceFilters` is a pure value object; the storage crate turns it into
//! a parameterized query. It also has a compact textual form, e.g.
//! `err:yes submitted:no op:red-team type:image from:2021-01-01 to:2021-01-31`.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EvidexError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A three-valued filter flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tri {
    /// Unconstrained.
    #[default]
    Any,
    /// Require the property to hold.
    Yes,
    /// Require the property not to hold.
    No,
}

impl Tri {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tri::Any => "any",
            Tri::Yes => "yes",
            Tri::No => "no",
        }
    }
}

impl fmt::Display for Tri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tri {
    type Err = EvidexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "t" => Ok(Tri::Yes),
            "no" | "n" | "false" | "f" => Ok(Tri::No),
            "any" | "" => Ok(Tri::Any),
            other => Err(EvidexError::Validation(format!(
                "'{}' is not one of yes, no, any",
                other
            ))),
        }
    }
}

/// Constraints applied when listing evidence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceFilters {
    pub has_error: Tri,
    pub submitted: Tri,
    pub operation_slug: Option<String>,
    pub content_type: Option<String>,
    /// Inclusive lower bound on the recorded day.
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound on the recorded day.
    pub end_date: Option<NaiveDate>,
}

impl EvidenceFilters {
    /// True when no constraint is active. Empty slug and content type
    /// strings constrain nothing.
    pub fn is_empty(&self) -> bool {
        let blank = |value: &Option<String>| value.as_deref().map_or(true, str::is_empty);
        self.has_error == Tri::Any
            && self.submitted == Tri::Any
            && blank(&self.operation_slug)
            && blank(&self.content_type)
            && self.start_date.is_none()
            && self.end_date.is_none()
    }
}

impl fmt::Display for EvidenceFilters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if self.has_error != Tri::Any {
            parts.push(format!("err:{}", self.has_error));
        }
        if self.submitted != Tri::Any {
            parts.push(format!("submitted:{}", self.submitted));
        }
        if let Some(op) = self.operation_slug.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("op:{}", op));
        }
        if let Some(ct) = self.content_type.as_deref().filter(|s| !s.is_empty()) {
            parts.push(format!("type:{}", ct));
        }
        if let Some(start) = self.start_date {
            parts.push(format!("from:{}", start.format(DATE_FORMAT)));
        }
        if let Some(end) = self.end_date {
            parts.push(format!("to:{}", end.format(DATE_FORMAT)));
        }
        f.write_str(&parts.join(" "))
    }
}

impl FromStr for EvidenceFilters {
    type Err = EvidexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut filters = EvidenceFilters::default();
        for token in s.split_whitespace() {
            let (key, value) = token.split_once(':').ok_or_else(|| {
                EvidexError::Validation(format!("filter '{}' is not of the form key:value", token))
            })?;
            match key.to_ascii_lowercase().as_str() {
                "err" | "error" => filters.has_error = value.parse()?,
                "submitted" => filters.submitted = value.parse()?,
                "op" | "operation" => filters.operation_slug = non_empty(value),
                "type" => filters.content_type = non_empty(value),
                "from" => filters.start_date = Some(parse_date(value)?),
                "to" => filters.end_date = Some(parse_date(value)?),
                other => {
                    return Err(EvidexError::Validation(format!(
                        "unknown filter key '{}'",
                        other
                    )))
                }
            }
        }
        Ok(filters)
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, EvidexError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| EvidexError::Validation(format!("invalid date '{}': {}", value, e)))
}
