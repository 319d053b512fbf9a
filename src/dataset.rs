//! The collected dataset and its persistence.
//!
//! The flat table has a fixed column order; missing metric groups become `0` for
//! numeric columns and an empty string for text columns.

use crate::metrics::format_timestamp;
use crate::models::AcceptedItem;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Canonical column order of the flat table.
pub const COLUMNS: [&str; 17] = [
    "pr_id",
    "pr_number",
    "repository",
    "title",
    "state",
    "merged",
    "user",
    "created_at",
    "closed_at",
    "merged_at",
    "num_files",
    "total_additions",
    "total_deletions",
    "time_analysis_hours",
    "description_chars",
    "num_comments",
    "num_participants",
];

/// Accepted items in collection order: repository, then page, then position in page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    items: Vec<AcceptedItem>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = AcceptedItem>) {
        self.items.extend(items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[AcceptedItem] {
        &self.items
    }

    pub fn rows(&self) -> impl Iterator<Item = DatasetRow> + '_ {
        self.items.iter().map(DatasetRow::from)
    }

    pub fn summary(&self) -> DatasetSummary {
        let merged = self
            .items
            .iter()
            .filter(|item| item.pull_request.is_merged())
            .count();
        let repositories: HashSet<_> = self.items.iter().map(|item| &item.repository).collect();

        DatasetSummary {
            total: self.items.len(),
            merged,
            closed_without_merge: self.items.len() - merged,
            repositories: repositories.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetSummary {
    pub total: usize,
    pub merged: usize,
    pub closed_without_merge: usize,
    pub repositories: usize,
}

/// One row of the flat table. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetRow {
    pub pr_id: u64,
    pub pr_number: u64,
    pub repository: String,
    pub title: String,
    pub state: String,
    pub merged: bool,
    pub user: String,
    pub created_at: String,
    pub closed_at: String,
    pub merged_at: String,
    pub num_files: u64,
    pub total_additions: u64,
    pub total_deletions: u64,
    pub time_analysis_hours: f64,
    pub description_chars: u64,
    pub num_comments: u64,
    pub num_participants: u64,
}

impl From<&AcceptedItem> for DatasetRow {
    fn from(item: &AcceptedItem) -> Self {
        let pr = &item.pull_request;
        let files = item.files.unwrap_or_default();
        let timestamp = |value: Option<chrono::DateTime<chrono::Utc>>| {
            value.map(format_timestamp).unwrap_or_default()
        };

        Self {
            pr_id: pr.id,
            pr_number: pr.number,
            repository: item.repository.to_string(),
            title: pr.title.clone(),
            state: pr.state.clone(),
            merged: pr.is_merged(),
            user: pr.author_login().unwrap_or_default().to_string(),
            created_at: timestamp(pr.created_at),
            closed_at: item
                .time
                .as_ref()
                .map(|time| time.closed_at.clone())
                .unwrap_or_else(|| timestamp(pr.closed_at)),
            merged_at: timestamp(pr.merged_at),
            num_files: files.num_files,
            total_additions: files.total_additions,
            total_deletions: files.total_deletions,
            time_analysis_hours: item
                .time
                .as_ref()
                .map_or(0.0, |time| time.time_analysis_hours),
            description_chars: item
                .description
                .as_ref()
                .map_or(0, |description| description.description_chars),
            num_comments: item.interaction.map_or(0, |i| i.num_comments),
            num_participants: item.interaction.map_or(0, |i| i.num_participants),
        }
    }
}

/// Persists a finished dataset.
pub trait DatasetSink {
    fn persist(&self, dataset: &Dataset) -> Result<()>;
}

/// Writes the flat table as CSV with a header row.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DatasetSink for CsvSink {
    fn persist(&self, dataset: &Dataset) -> Result<()> {
        let mut writer = csv::Writer::from_path(&self.path)
            .with_context(|| format!("failed to create {}", self.path.display()))?;
        if dataset.is_empty() {
            writer.write_record(COLUMNS)?;
        }
        for row in dataset.rows() {
            writer.serialize(row)?;
        }
        writer
            .flush()
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        tracing::info!("Dataset CSV saved to {}", self.path.display());
        Ok(())
    }
}

/// Writes the full accepted items, including description previews, as pretty JSON.
pub struct JsonSink {
    path: PathBuf,
}

impl JsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DatasetSink for JsonSink {
    fn persist(&self, dataset: &Dataset) -> Result<()> {
        let file = File::create(&self.path)
            .with_context(|| format!("failed to create {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, dataset.items())
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        writer
            .flush()
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        tracing::info!("Dataset JSON saved to {}", self.path.display());
        Ok(())
    }
}
