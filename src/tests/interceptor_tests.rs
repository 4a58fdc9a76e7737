//! Tests for the global interceptors: HTTP interceptor, UI failure
//! boundary, long-task detection, and the uncaught-exception hook

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::breadcrumbs::BreadcrumbCategory;
    use crate::error::{ErrorKind, ErrorSource, RawError};
    use crate::interceptors::{HttpOutcome, RequestSummary, install_panic_hook, report_task_failure};
    use crate::tests::support::{pipeline_fixture, quiet_config};

    fn request(method: &str, url: &str) -> RequestSummary {
        RequestSummary {
            method: method.to_string(),
            url: url.to_string(),
        }
    }

    #[tokio::test]
    async fn test_http_success_records_breadcrumb_but_reports_nothing() {
        let (pipeline, _logger) = pipeline_fixture(quiet_config(100, 100));
        let interceptor = pipeline.http_interceptor();

        let result = interceptor.on_response(
            request("GET", "/api/users"),
            HttpOutcome::Response {
                status: 200,
                retry_after: None,
                duration_ms: 12,
            },
        );

        assert!(result.is_none());
        assert_eq!(pipeline.statistics().queue_depth, 0);

        // breadcrumb and timing are recorded regardless of outcome
        let crumbs = pipeline.breadcrumbs().snapshot();
        assert_eq!(crumbs.len(), 1);
        assert_eq!(crumbs[0].category, BreadcrumbCategory::Http);
        assert!(crumbs[0].message.contains("GET /api/users 200"));
        let timings = pipeline.context().collect_performance();
        assert_eq!(timings.api_timings.len(), 1);
        assert_eq!(timings.api_timings[0].status_code, Some(200));
    }

    #[tokio::test]
    async fn test_http_failure_classifies_and_reports() {
        let (pipeline, _logger) = pipeline_fixture(quiet_config(100, 100));
        let interceptor = pipeline.http_interceptor();

        let result = interceptor.on_response(
            request("POST", "/api/orders"),
            HttpOutcome::Response {
                status: 500,
                retry_after: None,
                duration_ms: 90,
            },
        );

        assert!(result.is_some());
        assert_eq!(pipeline.statistics().queue_depth, 1);
    }

    #[tokio::test]
    async fn test_http_transport_failure_maps_to_network_or_timeout() {
        let (pipeline, _logger) = pipeline_fixture(quiet_config(100, 100));

        let network = pipeline.classify(RawError::network("connection reset"), ErrorSource::Http);
        assert_eq!(network.record.kind, ErrorKind::Network);

        let timeout = pipeline.classify(RawError::timeout("deadline elapsed"), ErrorSource::Http);
        assert_eq!(timeout.record.kind, ErrorKind::Timeout);

        let interceptor = pipeline.http_interceptor();
        interceptor.on_response(
            request("GET", "/api/slow"),
            HttpOutcome::Transport {
                message: "deadline elapsed".to_string(),
                timed_out: true,
                duration_ms: 10_000,
            },
        );
        assert_eq!(pipeline.statistics().queue_depth, 1);
    }

    #[tokio::test]
    async fn test_ui_boundary_reports_and_renders_fallback_with_id() {
        let (pipeline, logger) = pipeline_fixture(quiet_config(100, 100));
        let boundary = pipeline.ui_boundary();

        let rendered = Arc::new(Mutex::new(Vec::new()));
        let sink = rendered.clone();
        boundary.set_fallback_renderer(Box::new(move |error_id: uuid::Uuid| {
            sink.lock().unwrap().push(error_id);
        }));

        let error_id = boundary.catch("cannot read property of undefined", "<OrderTable>\n<App>");

        assert_eq!(rendered.lock().unwrap().as_slice(), [error_id]);
        assert_eq!(pipeline.statistics().queue_depth, 1);
        assert!(
            logger
                .get_logs()
                .iter()
                .any(|l| l.message.contains("cannot read property"))
        );
    }

    #[tokio::test]
    async fn test_long_task_guard_records_diagnostic_breadcrumb() {
        let (pipeline, _logger) = pipeline_fixture(quiet_config(100, 100));

        {
            let _guard = crate::interceptors::LongTaskGuard::with_threshold(
                pipeline.clone(),
                "report generation",
                Duration::from_millis(0),
            );
            std::thread::sleep(Duration::from_millis(5));
        }

        // the crumb is diagnostic only: nothing was classified or queued
        assert_eq!(pipeline.statistics().queue_depth, 0);
        let crumbs = pipeline.breadcrumbs().snapshot();
        assert_eq!(crumbs.len(), 1);
        assert_eq!(crumbs[0].category, BreadcrumbCategory::Custom);
        assert!(crumbs[0].message.contains("report generation"));
    }

    #[tokio::test]
    async fn test_task_failure_reports_as_unhandled_rejection() {
        let (pipeline, logger) = pipeline_fixture(quiet_config(100, 100));

        report_task_failure(&pipeline, "background sync worker died");

        assert_eq!(pipeline.statistics().queue_depth, 1);
        assert!(
            logger
                .get_logs()
                .iter()
                .any(|l| l.message.contains("background sync worker died"))
        );
    }

    // The panic hook is process-global and installs through a `Once`, so
    // this test goes through the singleton pipeline like production code
    // does; the fixture pipelines elsewhere never touch the hook.
    #[tokio::test]
    async fn test_panic_hook_reports_uncaught_failures_without_rethrowing() {
        let pipeline = crate::pipeline::install(None);
        install_panic_hook(pipeline.clone()); // idempotent re-attachment

        let caught = catch_unwind(AssertUnwindSafe(|| {
            panic!("boom from a deep call");
        }));
        assert!(caught.is_err());

        assert!(
            pipeline
                .logger()
                .get_logs()
                .iter()
                .any(|l| l.message.contains("boom from a deep call"))
        );
    }
}
