//! Export pipeline orchestration: company JSON directories in, per-platform
//! snapshots out, plus the cross-source consolidation into a root corpus.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use jobsift_adapters::adapter_for_platform;
use jobsift_core::{JobRow, Platform};
use jobsift_store::{read_diff, read_snapshot, write_diff_csv, write_snapshot, write_snapshot_csv};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "jobsift-export";

pub const SNAPSHOT_FILENAME: &str = "jobs.csv";
pub const DIFF_PREFIX: &str = "jobs_diff_";

/// Registry of platforms the pipeline runs, loaded from `platforms.yaml` at
/// the data root. A missing file falls back to built-in defaults covering
/// every supported platform.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformRegistry {
    pub platforms: Vec<PlatformEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformEntry {
    pub platform: Platform,
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PlatformEntry {
    /// Directory under the data root holding this platform's companies and
    /// snapshot; defaults to the platform tag.
    pub fn dir_name(&self) -> &str {
        self.dir.as_deref().unwrap_or_else(|| self.platform.tag())
    }
}

impl PlatformRegistry {
    pub fn builtin() -> Self {
        Self {
            platforms: Platform::ALL
                .into_iter()
                .map(|platform| PlatformEntry {
                    platform,
                    dir: None,
                    enabled: true,
                })
                .collect(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("platforms.yaml");
        if !path.exists() {
            return Ok(Self::builtin());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn enabled(&self) -> impl Iterator<Item = &PlatformEntry> {
        self.platforms.iter().filter(|entry| entry.enabled)
    }

    pub fn entry_for(&self, platform: Platform) -> PlatformEntry {
        self.platforms
            .iter()
            .find(|entry| entry.platform == platform)
            .cloned()
            .unwrap_or(PlatformEntry {
                platform,
                dir: None,
                enabled: true,
            })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformExportSummary {
    pub platform: Platform,
    pub companies: usize,
    pub jobs: usize,
    pub diff_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsolidateSummary {
    pub snapshot_files: usize,
    pub unique_rows: usize,
    pub duplicates_dropped: usize,
    pub diff_files: usize,
    pub diff_rows: usize,
    pub snapshot_path: PathBuf,
    pub diff_path: Option<PathBuf>,
}

/// Runs per-platform exports and the cross-source consolidation below one
/// data root.
pub struct ExportPipeline {
    root: PathBuf,
}

impl ExportPipeline {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Export one platform: scan its `companies/*.json` files in sorted
    /// order, normalize every parsable payload, and persist the snapshot.
    /// Missing directories and unparsable files are skipped, never fatal;
    /// an empty run still rewrites the snapshot.
    pub fn export_platform(&self, entry: &PlatformEntry) -> Result<PlatformExportSummary> {
        let platform_dir = self.root.join(entry.dir_name());
        let companies_dir = platform_dir.join("companies");
        let adapter = adapter_for_platform(entry.platform);

        let mut rows = Vec::new();
        let mut companies = 0usize;

        if companies_dir.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(&companies_dir)
                .with_context(|| format!("listing {}", companies_dir.display()))?
                .filter_map(|dir_entry| dir_entry.ok())
                .map(|dir_entry| dir_entry.path())
                .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
                .collect();
            files.sort();

            for file in files {
                let company = file
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or_default()
                    .to_string();
                let payload = match fs::read_to_string(&file)
                    .map_err(anyhow::Error::from)
                    .and_then(|text| {
                        serde_json::from_str::<JsonValue>(&text).map_err(anyhow::Error::from)
                    }) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(
                            file = %file.display(),
                            error = %err,
                            "skipping unreadable company file"
                        );
                        continue;
                    }
                };
                companies += 1;
                rows.extend(adapter.normalize(&company, &payload));
            }
        } else {
            info!(
                dir = %companies_dir.display(),
                "companies directory does not exist"
            );
        }

        let diff_path = write_snapshot(&platform_dir.join(SNAPSHOT_FILENAME), &rows)?;
        info!(
            platform = %entry.platform,
            companies,
            jobs = rows.len(),
            "exported platform snapshot"
        );
        Ok(PlatformExportSummary {
            platform: entry.platform,
            companies,
            jobs: rows.len(),
            diff_path,
        })
    }

    /// Export every enabled platform in registry order.
    pub fn export_all(&self, registry: &PlatformRegistry) -> Result<Vec<PlatformExportSummary>> {
        let mut summaries = Vec::new();
        for entry in registry.enabled() {
            summaries.push(self.export_platform(entry)?);
        }
        Ok(summaries)
    }

    /// Merge per-platform snapshots and diff artifacts into the root corpus.
    ///
    /// Snapshots concatenate and deduplicate by URL, first occurrence wins
    /// (scan order is lexicographic over subdirectory paths). Diff files are
    /// merged the same way with the `status` column defaulted to `new` where
    /// absent, and written under a fresh timestamp for the merge itself.
    /// With no per-platform snapshots at all, nothing is written.
    pub fn consolidate(&self) -> Result<Option<ConsolidateSummary>> {
        let snapshot_path = self.root.join(SNAPSHOT_FILENAME);

        let mut snapshot_files = Vec::new();
        let mut diff_files = Vec::new();
        collect_artifacts(&self.root, &self.root, &mut snapshot_files, &mut diff_files)?;
        snapshot_files.sort();
        diff_files.sort();

        if snapshot_files.is_empty() {
            info!("no per-platform snapshots found; nothing to consolidate");
            return Ok(None);
        }

        let mut merged: Vec<JobRow> = Vec::new();
        let mut seen_urls = std::collections::HashSet::new();
        let mut total_rows = 0usize;
        for file in &snapshot_files {
            let rows = match read_snapshot(file) {
                Ok(rows) => rows,
                Err(err) => {
                    warn!(file = %file.display(), error = %err, "skipping unreadable snapshot");
                    continue;
                }
            };
            total_rows += rows.len();
            for row in rows {
                if seen_urls.insert(row.url.clone()) {
                    merged.push(row);
                }
            }
        }
        let duplicates_dropped = total_rows - merged.len();
        write_snapshot_csv(&snapshot_path, &merged)?;
        info!(
            files = snapshot_files.len(),
            rows = merged.len(),
            duplicates_dropped,
            "consolidated snapshots"
        );

        let mut diff_path = None;
        let mut diff_rows_written = 0usize;
        if !diff_files.is_empty() {
            let mut merged_diff = Vec::new();
            let mut seen_diff_urls = std::collections::HashSet::new();
            for file in &diff_files {
                let rows = match read_diff(file) {
                    Ok(rows) => rows,
                    Err(err) => {
                        warn!(file = %file.display(), error = %err, "skipping unreadable diff");
                        continue;
                    }
                };
                for diff_row in rows {
                    if seen_diff_urls.insert(diff_row.row.url.clone()) {
                        merged_diff.push(diff_row);
                    }
                }
            }
            let stamp = Local::now().format("%Y%m%d_%H%M%S");
            let candidate = self.root.join(format!("{DIFF_PREFIX}{stamp}.csv"));
            write_diff_csv(&candidate, &merged_diff)?;
            diff_rows_written = merged_diff.len();
            info!(
                files = diff_files.len(),
                rows = merged_diff.len(),
                path = %candidate.display(),
                "consolidated diffs"
            );
            diff_path = Some(candidate);
        }

        Ok(Some(ConsolidateSummary {
            snapshot_files: snapshot_files.len(),
            unique_rows: merged.len(),
            duplicates_dropped,
            diff_files: diff_files.len(),
            diff_rows: diff_rows_written,
            snapshot_path,
            diff_path,
        }))
    }
}

fn is_diff_filename(name: &str) -> bool {
    name.starts_with(DIFF_PREFIX) && name.ends_with(".csv")
}

/// Recursively collect per-platform `jobs.csv` and `jobs_diff_*.csv` files.
/// Root-level artifacts are the consolidator's own output and are excluded.
fn collect_artifacts(
    root: &Path,
    dir: &Path,
    snapshots: &mut Vec<PathBuf>,
    diffs: &mut Vec<PathBuf>,
) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            collect_artifacts(root, &path, snapshots, diffs)?;
            continue;
        }
        if dir == root {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == SNAPSHOT_FILENAME {
            snapshots.push(path);
        } else if is_diff_filename(name) {
            diffs.push(path);
        }
    }
    Ok(())
}
