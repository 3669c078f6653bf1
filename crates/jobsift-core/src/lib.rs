//! Core domain model and identity derivation for jobsift.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobsift-core";

/// Canonical snapshot column order. Single source of truth for every CSV
/// reader and writer in the workspace.
pub const FIELDNAMES: [&str; 6] = ["url", "title", "location", "company", "ats_id", "id"];

/// Extra column carried by diff files on top of [`FIELDNAMES`].
pub const STATUS_FIELD: &str = "status";

/// Supported ATS platforms. The lowercase tag doubles as the identity-key
/// prefix and the default per-platform directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ashby,
    Greenhouse,
    Lever,
    Workable,
    Rippling,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Ashby,
        Platform::Greenhouse,
        Platform::Lever,
        Platform::Workable,
        Platform::Rippling,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Platform::Ashby => "ashby",
            Platform::Greenhouse => "greenhouse",
            Platform::Lever => "lever",
            Platform::Workable => "workable",
            Platform::Rippling => "rippling",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Error)]
#[error("unknown platform: {0}")]
pub struct ParsePlatformError(String);

impl FromStr for Platform {
    type Err = ParsePlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.tag() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| ParsePlatformError(s.to_string()))
    }
}

/// One normalized job posting, matching the snapshot schema column for column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRow {
    pub url: String,
    pub title: String,
    pub location: String,
    pub company: String,
    pub ats_id: String,
    pub id: String,
}

impl JobRow {
    /// Field values in [`FIELDNAMES`] order.
    pub fn values(&self) -> [&str; 6] {
        [
            &self.url,
            &self.title,
            &self.location,
            &self.company,
            &self.ats_id,
            &self.id,
        ]
    }

    /// Key used to match rows across snapshots: the trimmed `ats_id`, or one
    /// recovered from the URL when the source never exposed an id.
    pub fn diff_key(&self) -> String {
        let ats_id = self.ats_id.trim();
        if !ats_id.is_empty() {
            return ats_id.to_string();
        }
        extract_ats_id_from_url(self.url.trim())
    }

    /// Field-wise equality over the source data, ignoring the generated `id`.
    /// Values are compared trimmed so stray whitespace never shows up as an
    /// update.
    pub fn same_data(&self, other: &JobRow) -> bool {
        self.url.trim() == other.url.trim()
            && self.title.trim() == other.title.trim()
            && self.location.trim() == other.location.trim()
            && self.company.trim() == other.company.trim()
            && self.ats_id.trim() == other.ats_id.trim()
    }
}

/// Classification of one row in a diff between two consecutive snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    New,
    Updated,
    Removed,
}

impl ChangeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeStatus::New => "new",
            ChangeStatus::Updated => "updated",
            ChangeStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown change status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for ChangeStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(ChangeStatus::New),
            "updated" => Ok(ChangeStatus::Updated),
            "removed" => Ok(ChangeStatus::Removed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A [`JobRow`] together with its change classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRow {
    pub row: JobRow,
    pub status: ChangeStatus,
}

impl DiffRow {
    pub fn new(row: JobRow, status: ChangeStatus) -> Self {
        Self { row, status }
    }
}

/// Derive the deterministic job id from the platform tag, ats_id and URL.
///
/// The composite key is `"{platform}:{ats_id}:{url}"` hashed as a name-based
/// UUID in the standard URL namespace, so identical inputs always produce the
/// same id across runs with no stored state. Missing values coerce to empty
/// strings; an empty platform tag coerces to `"unknown"`.
///
/// The key layout is load-bearing: changing the delimiter, component order or
/// namespace silently reassigns every historical id and makes all jobs look
/// new on the next run.
pub fn generate_job_id(platform: &str, url: Option<&str>, ats_id: Option<&str>) -> String {
    let platform = if platform.is_empty() { "unknown" } else { platform };
    let key = format!(
        "{platform}:{}:{}",
        ats_id.unwrap_or_default(),
        url.unwrap_or_default()
    );
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}

/// Recover a platform-native job id embedded in a posting URL.
///
/// Handles the URL shapes the supported boards use:
/// - Greenhouse: `https://boards.greenhouse.io/company/jobs/998877`
/// - Workable:   `https://apply.workable.com/j/ABCD1234`
/// - Ashby/Lever: id is the last path segment
///
/// Returns an empty string when no id can be derived; never fails.
pub fn extract_ats_id_from_url(url: &str) -> String {
    if url.is_empty() {
        return String::new();
    }
    let Ok(parsed) = Url::parse(url) else {
        return String::new();
    };
    let path = parsed.path();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return String::new();
    }
    let host = parsed.host_str().unwrap_or_default();

    if path.contains("/jobs/") || host.ends_with("greenhouse.io") {
        if let Some(idx) = segments.iter().position(|s| *s == "jobs") {
            if let Some(next) = segments.get(idx + 1) {
                return (*next).to_string();
            }
        }
    }

    if path.contains("/j/") || host.ends_with("workable.com") {
        if let Some(idx) = segments.iter().position(|s| *s == "j") {
            if let Some(next) = segments.get(idx + 1) {
                return (*next).to_string();
            }
        }
    }

    segments
        .last()
        .map(|s| (*s).to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_is_deterministic() {
        let a = generate_job_id("ashby", Some("https://jobs.ashbyhq.com/acme/123"), Some("abc"));
        let b = generate_job_id("ashby", Some("https://jobs.ashbyhq.com/acme/123"), Some("abc"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn job_id_changes_with_any_input() {
        let base = generate_job_id("ashby", Some("https://x.test/a"), Some("1"));
        assert_ne!(base, generate_job_id("lever", Some("https://x.test/a"), Some("1")));
        assert_ne!(base, generate_job_id("ashby", Some("https://x.test/b"), Some("1")));
        assert_ne!(base, generate_job_id("ashby", Some("https://x.test/a"), Some("2")));
    }

    #[test]
    fn job_id_is_total_on_missing_inputs() {
        let id = generate_job_id("", None, None);
        assert_eq!(id.len(), 36);
        // Empty platform coerces to "unknown", so it matches the explicit tag.
        assert_eq!(id, generate_job_id("unknown", Some(""), Some("")));
    }

    #[test]
    fn extracts_greenhouse_segment_after_jobs() {
        assert_eq!(
            extract_ats_id_from_url("https://boards.greenhouse.io/acme/jobs/998877"),
            "998877"
        );
    }

    #[test]
    fn extracts_workable_segment_after_j() {
        assert_eq!(
            extract_ats_id_from_url("https://apply.workable.com/j/ABCD1234"),
            "ABCD1234"
        );
    }

    #[test]
    fn falls_back_to_last_path_segment() {
        assert_eq!(
            extract_ats_id_from_url("https://jobs.lever.co/acme/uuid-1234"),
            "uuid-1234"
        );
        assert_eq!(
            extract_ats_id_from_url("https://jobs.ashbyhq.com/acme/8f2b1c"),
            "8f2b1c"
        );
    }

    #[test]
    fn extractor_never_fails() {
        assert_eq!(extract_ats_id_from_url(""), "");
        assert_eq!(extract_ats_id_from_url("not a url"), "");
        assert_eq!(extract_ats_id_from_url("https://example.com"), "");
        assert_eq!(extract_ats_id_from_url("https://example.com/"), "");
    }

    #[test]
    fn same_data_ignores_generated_id_and_whitespace() {
        let a = JobRow {
            url: "https://x.test/1".into(),
            title: "Engineer".into(),
            location: "Remote".into(),
            company: "acme".into(),
            ats_id: "1".into(),
            id: "aaaa".into(),
        };
        let mut b = a.clone();
        b.id = "bbbb".into();
        b.title = " Engineer ".into();
        assert!(a.same_data(&b));

        b.title = "Engineer II".into();
        assert!(!a.same_data(&b));
    }

    #[test]
    fn diff_key_prefers_ats_id_then_url() {
        let row = JobRow {
            url: "https://boards.greenhouse.io/acme/jobs/42".into(),
            ats_id: "native".into(),
            ..JobRow::default()
        };
        assert_eq!(row.diff_key(), "native");

        let row = JobRow {
            url: "https://boards.greenhouse.io/acme/jobs/42".into(),
            ats_id: "  ".into(),
            ..JobRow::default()
        };
        assert_eq!(row.diff_key(), "42");
    }

    #[test]
    fn platform_tags_round_trip() {
        for platform in Platform::ALL {
            assert_eq!(platform.tag().parse::<Platform>().unwrap(), platform);
        }
        assert!("jobvite".parse::<Platform>().is_err());
    }
}
