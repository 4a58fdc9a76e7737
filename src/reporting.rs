use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::breadcrumbs::Breadcrumb;
use crate::context::{EnvironmentContext, PerformanceContext, UserContext};
use crate::error::ErrorRecord;

// Reporting modules
pub mod backends;
pub mod queue;

/// Lifecycle of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Accumulating,
    Flushing,
    Delivered,
    Retrying,
    Dropped,
}

impl Display for BatchState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accumulating => write!(f, "accumulating"),
            Self::Flushing => write!(f, "flushing"),
            Self::Delivered => write!(f, "delivered"),
            Self::Retrying => write!(f, "retrying"),
            Self::Dropped => write!(f, "dropped"),
        }
    }
}

/// An immutable group of error records plus contextual snapshots, sent
/// together to a backend. Either fully delivered, fully retried, or fully
/// dropped — never partially mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReportBatch {
    pub batch_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub records: Vec<ErrorRecord>,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub user: UserContext,
    pub environment: EnvironmentContext,
    pub performance: PerformanceContext,
}

/// Queue diagnostics. Local only, never transmitted.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatistics {
    pub queue_depth: usize,
    pub batches_sent: u64,
    pub batches_dropped: u64,
    pub records_dropped: u64,
    pub records_sampled_out: u64,
    pub last_flush_at: Option<DateTime<Utc>>,
}
