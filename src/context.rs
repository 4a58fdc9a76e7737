//! Context snapshots attached to outgoing report batches
//!
//! Holds the user identity the host set, the environment hints the host
//! pushes (url, viewport, user agent — things the runtime cannot observe on
//! its own), and bounded lists of recent timing samples. Environment state
//! is captured fresh at snapshot time, since it can change between errors.

use std::env;
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::config::PrivacyConfig;

/// Cap for each timing sample list
pub const MAX_TIMING_SAMPLES: usize = 20;

/// Identity of the current user, set explicitly by the host application.
/// Absent fields are omitted from reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Environment snapshot captured at report time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentContext {
    pub url: String,
    pub user_agent_summary: String,
    pub viewport: Viewport,
    pub timezone: String,
    pub locale: String,
    /// Available memory in bytes, when the platform exposes it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_hint: Option<u64>,
}

/// Environment facts only the host can observe, pushed as they change
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTiming {
    pub route: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTiming {
    pub endpoint: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderTiming {
    pub component: String,
    pub duration_ms: u64,
}

/// One timing sample pushed by the host or the HTTP interceptor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum PerformanceSample {
    Navigation(NavigationTiming),
    Api(ApiTiming),
    Render(RenderTiming),
}

/// Bounded lists of recent timing samples
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceContext {
    pub navigation_timings: Vec<NavigationTiming>,
    pub api_timings: Vec<ApiTiming>,
    pub render_timings: Vec<RenderTiming>,
}

/// Snapshots user/environment/performance state on demand
pub struct ContextCollector {
    user: RwLock<UserContext>,
    hints: RwLock<EnvironmentHints>,
    performance: Mutex<PerformanceContext>,
}

impl ContextCollector {
    pub fn new() -> Self {
        Self {
            user: RwLock::new(UserContext::default()),
            hints: RwLock::new(EnvironmentHints::default()),
            performance: Mutex::new(PerformanceContext::default()),
        }
    }

    /// Merge a partial user context into the held one, last-write-wins per
    /// field
    pub fn set_user(&self, partial: UserContext) {
        let mut user = match self.user.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if partial.user_id.is_some() {
            user.user_id = partial.user_id;
        }
        if partial.username.is_some() {
            user.username = partial.username;
        }
        if partial.email.is_some() {
            user.email = partial.email;
        }
        if partial.session_id.is_some() {
            user.session_id = partial.session_id;
        }
    }

    /// Snapshot of the user context with the privacy policy applied
    pub fn collect_user(&self, privacy: &PrivacyConfig) -> UserContext {
        let mut user = match self.user.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if !privacy.include_username {
            user.username = None;
            user.email = None;
        }
        user
    }

    /// Push environment facts the runtime cannot observe itself
    pub fn update_environment(&self, partial: EnvironmentHints) {
        let mut hints = match self.hints.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if partial.url.is_some() {
            hints.url = partial.url;
        }
        if partial.user_agent_summary.is_some() {
            hints.user_agent_summary = partial.user_agent_summary;
        }
        if partial.viewport.is_some() {
            hints.viewport = partial.viewport;
        }
    }

    /// Fresh environment snapshot: host-pushed hints plus process-level
    /// facts read at call time
    pub fn collect_environment(&self) -> EnvironmentContext {
        let hints = match self.hints.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let mut sys = System::new();
        sys.refresh_memory();
        let available = sys.available_memory();

        EnvironmentContext {
            url: hints.url.unwrap_or_default(),
            user_agent_summary: hints.user_agent_summary.unwrap_or_default(),
            viewport: hints.viewport.unwrap_or_default(),
            timezone: chrono::Local::now().offset().to_string(),
            locale: env::var("LC_ALL")
                .or_else(|_| env::var("LANG"))
                .unwrap_or_else(|_| "en-US".to_string()),
            memory_hint: (available > 0).then_some(available),
        }
    }

    /// Append a timing sample with FIFO eviction per list
    pub fn update_performance(&self, sample: PerformanceSample) {
        let mut performance = match self.performance.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match sample {
            PerformanceSample::Navigation(timing) => {
                push_capped(&mut performance.navigation_timings, timing)
            }
            PerformanceSample::Api(timing) => push_capped(&mut performance.api_timings, timing),
            PerformanceSample::Render(timing) => push_capped(&mut performance.render_timings, timing),
        }
    }

    /// Snapshot of the current performance sample lists
    pub fn collect_performance(&self) -> PerformanceContext {
        match self.performance.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for ContextCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn push_capped<T>(samples: &mut Vec<T>, sample: T) {
    if samples.len() >= MAX_TIMING_SAMPLES {
        samples.remove(0);
    }
    samples.push(sample);
}
