//! Per-platform row normalizers: raw ATS payloads in, canonical job rows out.
//!
//! Each adapter maps one platform's company payload (as scraped from its
//! public board API) into [`JobRow`]s. Payload shapes vary per platform and
//! per API era, so decoding is deliberately tolerant: a payload may be a bare
//! job array or an object keyed by `jobs`/`postings`, unknown
//! shapes normalize to no rows, and individual entries that fail typed
//! deserialization are skipped rather than aborting the company.

use jobsift_core::{extract_ats_id_from_url, generate_job_id, JobRow, Platform};
use serde::Deserialize;
use serde_json::Value as JsonValue;

pub const CRATE_NAME: &str = "jobsift-adapters";

/// Normalizes one platform's raw company payload into canonical rows.
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Map a raw payload to rows. Infallible by contract: malformed entries
    /// are dropped, unknown payload shapes yield an empty list.
    fn normalize(&self, company: &str, payload: &JsonValue) -> Vec<JobRow>;
}

pub fn adapter_for_platform(platform: Platform) -> Box<dyn PlatformAdapter> {
    match platform {
        Platform::Ashby => Box::new(AshbyAdapter),
        Platform::Greenhouse => Box::new(GreenhouseAdapter),
        Platform::Lever => Box::new(LeverAdapter),
        Platform::Workable => Box::new(WorkableAdapter),
        Platform::Rippling => Box::new(RipplingAdapter),
    }
}

/// Locate the job list inside a payload: a bare array wins, then the first
/// present list key in priority order. Anything else fails closed.
fn job_entries<'a>(payload: &'a JsonValue, keys: &[&str]) -> &'a [JsonValue] {
    if let Some(list) = payload.as_array() {
        return list;
    }
    for key in keys {
        if let Some(list) = payload.get(*key).and_then(JsonValue::as_array) {
            return list;
        }
    }
    &[]
}

fn first_nonempty(candidates: &[Option<&str>]) -> String {
    candidates
        .iter()
        .copied()
        .flatten()
        .find(|s| !s.trim().is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Join the present, non-empty parts with a separator.
fn join_present(parts: &[Option<&str>], sep: &str) -> String {
    parts
        .iter()
        .filter_map(|p| *p)
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Stringify a JSON scalar id; some boards ship numeric codes.
fn scalar_string(value: Option<&JsonValue>) -> Option<String> {
    match value? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Assemble the canonical row: blank native ids fall back to the URL-derived
/// id, and the deterministic job id is minted from the final triple.
fn build_row(
    platform: Platform,
    company: &str,
    url: String,
    title: String,
    location: String,
    ats_id: String,
) -> JobRow {
    let ats_id = if ats_id.trim().is_empty() {
        extract_ats_id_from_url(&url)
    } else {
        ats_id
    };
    let id = generate_job_id(platform.tag(), Some(&url), Some(&ats_id));
    JobRow {
        url,
        title,
        location,
        company: company.to_string(),
        ats_id,
        id,
    }
}

// ---------------------------------------------------------------------------
// Ashby
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AshbyJob {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default, rename = "jobUrl", alias = "job_url")]
    job_url: Option<String>,
    #[serde(default, rename = "applyUrl", alias = "apply_url")]
    apply_url: Option<String>,
}

pub struct AshbyAdapter;

impl PlatformAdapter for AshbyAdapter {
    fn platform(&self) -> Platform {
        Platform::Ashby
    }

    fn normalize(&self, company: &str, payload: &JsonValue) -> Vec<JobRow> {
        let mut rows = Vec::new();
        for entry in job_entries(payload, &["jobs"]) {
            let Ok(job) = serde_json::from_value::<AshbyJob>(entry.clone()) else {
                continue;
            };
            let url = first_nonempty(&[job.job_url.as_deref(), job.apply_url.as_deref()]);
            rows.push(build_row(
                Platform::Ashby,
                company,
                url,
                job.title.unwrap_or_default(),
                job.location.unwrap_or_default(),
                job.id.unwrap_or_default(),
            ));
        }
        rows
    }
}

// ---------------------------------------------------------------------------
// Greenhouse
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GreenhouseJob {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    location: Option<GreenhouseLocation>,
    #[serde(default)]
    absolute_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GreenhouseLocation {
    #[serde(default)]
    name: Option<String>,
}

pub struct GreenhouseAdapter;

impl PlatformAdapter for GreenhouseAdapter {
    fn platform(&self) -> Platform {
        Platform::Greenhouse
    }

    fn normalize(&self, company: &str, payload: &JsonValue) -> Vec<JobRow> {
        let mut rows = Vec::new();
        for entry in job_entries(payload, &["jobs"]) {
            let Ok(job) = serde_json::from_value::<GreenhouseJob>(entry.clone()) else {
                continue;
            };
            let location = job
                .location
                .and_then(|l| l.name)
                .unwrap_or_default();
            let ats_id = job.id.map(|id| id.to_string()).unwrap_or_default();
            rows.push(build_row(
                Platform::Greenhouse,
                company,
                job.absolute_url.unwrap_or_default(),
                job.title.unwrap_or_default(),
                location,
                ats_id,
            ));
        }
        rows
    }
}

// ---------------------------------------------------------------------------
// Lever
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LeverJob {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "hostedUrl")]
    hosted_url: Option<String>,
    #[serde(default, rename = "applyUrl")]
    apply_url: Option<String>,
    #[serde(default)]
    categories: Option<LeverCategories>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeverCategories {
    #[serde(default)]
    location: Option<String>,
    #[serde(default, rename = "allLocations")]
    all_locations: Option<Vec<String>>,
}

pub struct LeverAdapter;

impl LeverAdapter {
    fn location(job: &LeverJob) -> String {
        if let Some(categories) = &job.categories {
            if let Some(location) = &categories.location {
                if !location.trim().is_empty() {
                    return location.clone();
                }
            }
            if let Some(all) = &categories.all_locations {
                let joined = all
                    .iter()
                    .filter(|l| !l.trim().is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                if !joined.is_empty() {
                    return joined;
                }
            }
        }
        job.country.clone().unwrap_or_default()
    }
}

impl PlatformAdapter for LeverAdapter {
    fn platform(&self) -> Platform {
        Platform::Lever
    }

    fn normalize(&self, company: &str, payload: &JsonValue) -> Vec<JobRow> {
        let mut rows = Vec::new();
        for entry in job_entries(payload, &["postings"]) {
            let Ok(job) = serde_json::from_value::<LeverJob>(entry.clone()) else {
                continue;
            };
            let url = first_nonempty(&[job.hosted_url.as_deref(), job.apply_url.as_deref()]);
            let location = Self::location(&job);
            rows.push(build_row(
                Platform::Lever,
                company,
                url,
                job.text.unwrap_or_default(),
                location,
                job.id.unwrap_or_default(),
            ));
        }
        rows
    }
}

// ---------------------------------------------------------------------------
// Workable
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WorkableJob {
    #[serde(default)]
    code: Option<JsonValue>,
    #[serde(default)]
    shortcode: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    shortlink: Option<String>,
    #[serde(default)]
    application_url: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    locations: Option<Vec<WorkableLocation>>,
}

#[derive(Debug, Deserialize)]
struct WorkableLocation {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

pub struct WorkableAdapter;

impl WorkableAdapter {
    /// Flatten to a single string: the top-level city/state/country triple
    /// wins; otherwise each entry of `locations` joins with ", " and entries
    /// join with "; ".
    fn location(job: &WorkableJob) -> String {
        let flat = join_present(
            &[job.city.as_deref(), job.state.as_deref(), job.country.as_deref()],
            ", ",
        );
        if !flat.is_empty() {
            return flat;
        }

        if let Some(locations) = &job.locations {
            let formatted = locations
                .iter()
                .map(|loc| {
                    join_present(
                        &[loc.city.as_deref(), loc.region.as_deref(), loc.country.as_deref()],
                        ", ",
                    )
                })
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("; ");
            if !formatted.is_empty() {
                return formatted;
            }
        }
        String::new()
    }
}

impl PlatformAdapter for WorkableAdapter {
    fn platform(&self) -> Platform {
        Platform::Workable
    }

    fn normalize(&self, company: &str, payload: &JsonValue) -> Vec<JobRow> {
        let mut rows = Vec::new();
        for entry in job_entries(payload, &["jobs"]) {
            let Ok(job) = serde_json::from_value::<WorkableJob>(entry.clone()) else {
                continue;
            };
            let url = first_nonempty(&[
                job.url.as_deref(),
                job.shortlink.as_deref(),
                job.application_url.as_deref(),
            ]);
            let ats_id = scalar_string(job.code.as_ref())
                .or_else(|| job.shortcode.clone())
                .or_else(|| job.url.clone())
                .unwrap_or_default();
            let location = Self::location(&job);
            rows.push(build_row(
                Platform::Workable,
                company,
                url,
                job.title.unwrap_or_default(),
                location,
                ats_id,
            ));
        }
        rows
    }
}

// ---------------------------------------------------------------------------
// Rippling
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RipplingJob {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "workLocations", alias = "work_locations")]
    work_locations: Option<Vec<String>>,
    #[serde(default)]
    locations: Option<Vec<RipplingLocation>>,
    #[serde(default, rename = "companyName", alias = "company_name")]
    company_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RipplingLocation {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

/// Board-level metadata carried alongside the job list; used to pick a
/// display name for the company when individual jobs do not carry one.
#[derive(Debug, Default, Deserialize)]
struct RipplingBoard {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    job_board: Option<RipplingJobBoard>,
}

#[derive(Debug, Deserialize)]
struct RipplingJobBoard {
    #[serde(default)]
    title: Option<String>,
}

pub struct RipplingAdapter;

impl RipplingAdapter {
    fn location(job: &RipplingJob) -> String {
        if let Some(work_locations) = &job.work_locations {
            let joined = work_locations
                .iter()
                .filter(|l| !l.trim().is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            if !joined.is_empty() {
                return joined;
            }
        }

        if let Some(locations) = &job.locations {
            let formatted = locations
                .iter()
                .map(|loc| match &loc.name {
                    Some(name) if !name.trim().is_empty() => name.clone(),
                    _ => join_present(
                        &[loc.city.as_deref(), loc.state.as_deref(), loc.country.as_deref()],
                        ", ",
                    ),
                })
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("; ");
            if !formatted.is_empty() {
                return formatted;
            }
        }
        String::new()
    }

    fn board_company(payload: &JsonValue, fallback: &str) -> String {
        let board = serde_json::from_value::<RipplingBoard>(payload.clone()).unwrap_or_default();
        board
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| board.job_board.and_then(|b| b.title))
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }
}

impl PlatformAdapter for RipplingAdapter {
    fn platform(&self) -> Platform {
        Platform::Rippling
    }

    fn normalize(&self, company: &str, payload: &JsonValue) -> Vec<JobRow> {
        let board_company = Self::board_company(payload, company);
        let mut rows = Vec::new();
        for entry in job_entries(payload, &["jobs"]) {
            let Ok(job) = serde_json::from_value::<RipplingJob>(entry.clone()) else {
                continue;
            };
            let url = job.url.clone().unwrap_or_default();
            let ats_id = job
                .uuid
                .clone()
                .filter(|s| !s.trim().is_empty())
                .or_else(|| job.id.clone())
                .unwrap_or_default();
            let title = job
                .name
                .clone()
                .filter(|s| !s.trim().is_empty())
                .or_else(|| job.title.clone())
                .unwrap_or_default();
            let row_company = job
                .company_name
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| board_company.clone());
            let location = Self::location(&job);
            rows.push(build_row(
                Platform::Rippling,
                &row_company,
                url,
                title,
                location,
                ats_id,
            ));
        }
        rows
    }
}
