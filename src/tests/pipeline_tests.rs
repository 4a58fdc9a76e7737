//! Tests for the pipeline facade: the no-throw guarantee, user message
//! surfacing, config propagation, and the singleton contract

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::breadcrumbs::BreadcrumbCategory;
    use crate::config::{ConfigPatch, EnvPreset};
    use crate::error::{ErrorSeverity, ErrorSource, RawError};
    use crate::tests::support::{MockBackend, chain, pipeline_fixture, quiet_config};

    #[tokio::test]
    async fn test_malformed_raw_error_never_throws_and_yields_an_id() {
        let (pipeline, logger) = pipeline_fixture(quiet_config(100, 100));

        let id = pipeline.report_error(RawError::default(), ErrorSource::Manual, None);

        assert!(!id.is_nil());
        assert_eq!(pipeline.statistics().queue_depth, 1);
        assert!(logger.get_logs().iter().any(|l| l.message.contains("unexpected")));
    }

    #[tokio::test]
    async fn test_empty_string_raw_error_never_throws() {
        let (pipeline, _logger) = pipeline_fixture(quiet_config(100, 100));
        let id = pipeline.report_error("", ErrorSource::Manual, None);
        assert!(!id.is_nil());
    }

    #[tokio::test]
    async fn test_user_message_surfaces_unless_handled_locally() {
        let (pipeline, _logger) = pipeline_fixture(quiet_config(100, 100));
        let shown = Arc::new(AtomicUsize::new(0));
        let counter = shown.clone();
        pipeline.set_user_message_sink(Box::new(move |_: &str, _: ErrorSeverity| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        pipeline.report_error(
            RawError::message("already toasted").with_handled_locally(true),
            ErrorSource::Manual,
            None,
        );
        assert_eq!(shown.load(Ordering::SeqCst), 0);

        pipeline.report_error(RawError::message("fresh failure"), ErrorSource::Manual, None);
        assert_eq!(shown.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_caller_context_lands_on_the_record() {
        let (pipeline, _logger) = pipeline_fixture(quiet_config(100, 100));
        let attempts = MockBackend::shared_attempts();
        let backend = MockBackend::ok("primary", attempts);
        pipeline.queue().set_backends(chain(&[backend.clone()]));

        let mut context = std::collections::BTreeMap::new();
        context.insert("view".to_string(), serde_json::json!("orders"));
        pipeline.report_error(
            RawError::message("save failed"),
            ErrorSource::Manual,
            Some(context),
        );
        pipeline.flush().await;

        let delivered = backend.delivered();
        assert_eq!(
            delivered[0].records[0].context.get("view").unwrap(),
            &serde_json::json!("orders")
        );
    }

    #[tokio::test]
    async fn test_config_update_propagates_breadcrumb_limit() {
        let (pipeline, _logger) = pipeline_fixture(quiet_config(100, 100));
        let attempts = MockBackend::shared_attempts();
        let backend = MockBackend::ok("primary", attempts);
        pipeline.queue().set_backends(chain(&[backend.clone()]));

        pipeline.update_config(ConfigPatch {
            max_breadcrumbs: Some(2),
            ..Default::default()
        });
        // update_config rebuilt the chain from config; restore the mock
        pipeline.queue().set_backends(chain(&[backend.clone()]));

        for i in 0..5 {
            pipeline.add_breadcrumb(BreadcrumbCategory::Console, format!("line {i}"), None);
        }
        pipeline.report_error(RawError::message("boom"), ErrorSource::Manual, None);
        pipeline.flush().await;

        assert_eq!(pipeline.get_config().max_breadcrumbs, 2);
        let delivered = backend.delivered();
        assert_eq!(delivered[0].breadcrumbs.len(), 2);
        assert_eq!(delivered[0].breadcrumbs[1].message, "line 4");
    }

    #[tokio::test]
    async fn test_statistics_track_sent_batches() {
        let (pipeline, _logger) = pipeline_fixture(quiet_config(100, 100));
        let attempts = MockBackend::shared_attempts();
        pipeline
            .queue()
            .set_backends(chain(&[MockBackend::ok("primary", attempts)]));

        pipeline.report_error(RawError::message("boom"), ErrorSource::Manual, None);
        pipeline.flush().await;

        let stats = pipeline.statistics();
        assert_eq!(stats.batches_sent, 1);
        assert_eq!(stats.batches_dropped, 0);
        assert_eq!(stats.queue_depth, 0);
    }

    #[test]
    fn test_install_is_idempotent() {
        let first = crate::pipeline::install(Some(EnvPreset::Development)) as *const _;
        let second = crate::pipeline::install(Some(EnvPreset::Production)) as *const _;
        assert_eq!(first, second);
        // the second preset argument is ignored; the live config is the
        // first one's
        assert_eq!(crate::pipeline::get_config().batch_size, 1);
    }
}
