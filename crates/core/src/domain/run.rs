use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::pipe::PipeConfig;
use crate::error::CoreError;

pub const RUN_DOC_TYPE: &str = "run";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    #[default]
    NotStarted,
    Running,
    Finished,
    Error,
    /// Forced terminal state written by an administrator, never produced by the engine
    Stopped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Error => "ERROR",
            Self::Stopped => "STOPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NOT_STARTED" => Some(Self::NotStarted),
            "RUNNING" => Some(Self::Running),
            "FINISHED" => Some(Self::Finished),
            "ERROR" => Some(Self::Error),
            "STOPPED" => Some(Self::Stopped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error | Self::Stopped)
    }
}

impl std::str::FromStr for RunStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CoreError::UnknownRunStatus(s.to_string()))
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    #[default]
    NotStarted,
    Running,
    Finished,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct StepStats {
    pub label: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepStats {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: StepStatus::NotStarted,
            error: None,
        }
    }
}

/// Per-table statistics reported by connector steps.
///
/// Anything besides the table name and record count is connector defined and
/// kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TableStats {
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_records: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TableStats {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    pub fn with_records(mut self, num_records: u64) -> Self {
        self.num_records = Some(num_records);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Field-wise merge: fields present in `other` overwrite, the rest are kept.
    pub fn merge(&mut self, other: TableStats) {
        if other.num_records.is_some() {
            self.num_records = other.num_records;
        }
        self.extra.extend(other.extra);
    }
}

/// Persisted record of one pipe run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct RunDocument {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub connector_id: String,
    pub pipe_id: Uuid,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<i64>,
    /// Human readable form of `elapsed_ms`, e.g. "3 minutes"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub table_stats: BTreeMap<String, TableStats>,
    #[serde(default)]
    pub steps: Vec<StepStats>,
    #[serde(default)]
    pub num_records: u64,
    /// Name of the run log attachment, once attached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

impl RunDocument {
    pub fn new<I, S>(pipe: &PipeConfig, step_labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: Uuid::new_v4(),
            doc_type: RUN_DOC_TYPE.to_string(),
            connector_id: pipe.connector_id.clone(),
            pipe_id: pipe.id,
            start_time: Utc::now(),
            end_time: None,
            elapsed_ms: None,
            elapsed_time: None,
            status: RunStatus::NotStarted,
            message: String::new(),
            error: None,
            table_stats: BTreeMap::new(),
            steps: step_labels.into_iter().map(StepStats::new).collect(),
            num_records: 0,
            log_file: None,
        }
    }

    pub fn merge_table_stats(&mut self, stats: TableStats) {
        match self.table_stats.get_mut(&stats.table_name) {
            Some(existing) => existing.merge(stats),
            None => {
                self.table_stats.insert(stats.table_name.clone(), stats);
            }
        }
    }

    /// Sum of `num_records` over every table entry, saturating at `u64::MAX`.
    pub fn total_records(&self) -> u64 {
        self.table_stats
            .values()
            .filter_map(|s| s.num_records)
            .fold(0u64, |total, n| total.saturating_add(n))
    }

    /// Stamp end time and elapsed duration.
    pub fn stamp_end(&mut self, end: DateTime<Utc>) {
        let elapsed = end - self.start_time;
        self.end_time = Some(end);
        self.elapsed_ms = Some(elapsed.num_milliseconds());
        self.elapsed_time = Some(humanize_duration(elapsed));
    }
}

/// Coarse, human friendly rendering of a duration.
pub fn humanize_duration(duration: Duration) -> String {
    let seconds = duration.num_seconds().max(0);
    let minutes = (seconds as f64 / 60.0).round() as i64;
    let hours = (seconds as f64 / 3600.0).round() as i64;
    let days = (seconds as f64 / 86400.0).round() as i64;

    match seconds {
        0..=44 => "a few seconds".to_string(),
        45..=89 => "a minute".to_string(),
        _ if minutes < 45 => format!("{} minutes", minutes),
        _ if minutes < 90 => "an hour".to_string(),
        _ if hours < 22 => format!("{} hours", hours),
        _ if hours < 36 => "a day".to_string(),
        _ => format!("{} days", days),
    }
}
