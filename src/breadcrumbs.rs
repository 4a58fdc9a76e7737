//! Bounded trail of recent events
//!
//! Breadcrumbs reconstruct the sequence of actions preceding a failure.
//! The trail is strict FIFO: once `max_breadcrumbs` is reached, recording a
//! new crumb evicts the oldest. Recording is O(1) amortized and never blocks
//! or throws.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default trail bound; presets override this
pub const DEFAULT_MAX_BREADCRUMBS: usize = 50;

/// Category of a recorded event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreadcrumbCategory {
    Console,
    Http,
    Navigation,
    UserAction,
    Custom,
}

impl Display for BreadcrumbCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Console => write!(f, "console"),
            Self::Http => write!(f, "http"),
            Self::Navigation => write!(f, "navigation"),
            Self::UserAction => write!(f, "user-action"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// One recorded event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breadcrumb {
    pub timestamp: DateTime<Utc>,
    pub category: BreadcrumbCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, serde_json::Value>>,
}

/// Bounded FIFO recorder for breadcrumbs
pub struct BreadcrumbRecorder {
    trail: Mutex<VecDeque<Breadcrumb>>,
    limit: AtomicUsize,
}

impl BreadcrumbRecorder {
    pub fn new(limit: usize) -> Self {
        Self {
            trail: Mutex::new(VecDeque::with_capacity(limit.max(1))),
            limit: AtomicUsize::new(limit.max(1)),
        }
    }

    /// Append a breadcrumb, evicting the oldest once the limit is reached
    pub fn record(
        &self,
        category: BreadcrumbCategory,
        message: impl Into<String>,
        data: Option<BTreeMap<String, serde_json::Value>>,
    ) {
        let crumb = Breadcrumb {
            timestamp: Utc::now(),
            category,
            message: message.into(),
            data,
        };
        let limit = self.limit.load(Ordering::Relaxed);
        let mut trail = match self.trail.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while trail.len() >= limit {
            trail.pop_front();
        }
        trail.push_back(crumb);
    }

    /// Immutable copy of the current trail, oldest first. Used when building
    /// a batch; never shared by reference.
    pub fn snapshot(&self) -> Vec<Breadcrumb> {
        let trail = match self.trail.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        trail.iter().cloned().collect()
    }

    /// Apply a runtime limit change, evicting oldest entries if the trail
    /// shrank below its current length
    pub fn set_limit(&self, limit: usize) {
        let limit = limit.max(1);
        self.limit.store(limit, Ordering::Relaxed);
        let mut trail = match self.trail.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while trail.len() > limit {
            trail.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        match self.trail.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BreadcrumbRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BREADCRUMBS)
    }
}
