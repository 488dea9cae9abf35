// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Background import job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Import job lifecycle.
///
/// `pending → running → {completed | failed | cancelled}`; `interrupted`
/// is applied at startup to any job still marked running from a previous
/// process. Interrupted and failed jobs may be resumed explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Interrupted,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Interrupted => "interrupted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            "interrupted" => Some(JobStatus::Interrupted),
            _ => None,
        }
    }

    /// Only interrupted and failed jobs accept a resume request.
    pub fn is_resumable(&self) -> bool {
        matches!(self, JobStatus::Interrupted | JobStatus::Failed)
    }
}

/// Configuration snapshot for an import job, persisted with the job so
/// resume re-runs with the original parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
    /// Device allow-list; empty means all cameras
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub cameras: Vec<String>,
    pub user_id: String,
}

/// A persisted background import job.
///
/// Mutated exclusively by its own worker task; `last_page` is the resume
/// checkpoint, advanced only after a page has been fully processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: String,
    pub status: JobStatus,
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// Known total asset count, when the source reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    pub processed: i64,
    pub imported: i64,
    pub skipped: i64,
    pub errors: i64,
    /// Last fully-processed page (0 = none)
    pub last_page: i64,
    pub config: ImportConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::Interrupted,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn test_resumable_states() {
        assert!(JobStatus::Interrupted.is_resumable());
        assert!(JobStatus::Failed.is_resumable());
        assert!(!JobStatus::Running.is_resumable());
        assert!(!JobStatus::Completed.is_resumable());
        assert!(!JobStatus::Cancelled.is_resumable());
    }
}
