//! Run driver
//!
//! Awaits one connector's `extract()`, writes whatever entities it produced
//! and always records run metadata. A fatal connector error is captured in
//! the metadata instead of being propagated; only failures to write the
//! metadata itself surface as `Err`.

use crate::connector::{Connector, ExtractContext};
use crate::error::Result;
use crate::models::{ItemError, RunMetadata, RunStatus};
use crate::output::EntitySink;
use chrono::Utc;
use std::fmt::Write as _;
use tracing::{error, info, warn};

/// Run `connector` to completion and write its output through `sink`
pub async fn run_connector(
    connector: &dyn Connector,
    ctx: ExtractContext,
    sink: &EntitySink,
) -> Result<RunMetadata> {
    let run_name = ctx.run_name().to_string();
    let start_time = Utc::now();
    info!(connector = connector.name(), run = %run_name, "Starting run");

    let outcome = connector.extract(&ctx).await;
    let (mut entities, item_errors) = ctx.into_parts();

    let mut fatal = match outcome {
        Ok(returned) => {
            entities.extend(returned);
            None
        }
        Err(e) => {
            error!(connector = connector.name(), error = %e, "Connector failed");
            Some((e.to_string(), error_chain(&e)))
        }
    };

    // Emitted entities are flushed even when the connector failed
    if let Err(e) = sink.write(&entities, &run_name).await {
        error!(run = %run_name, error = %e, "Failed to write entities");
        if fatal.is_none() {
            fatal = Some((e.to_string(), error_chain(&e)));
        }
    }

    let status = run_status(fatal.is_some(), &item_errors);
    let (error_message, stack_trace) = fatal.unzip();
    let metadata = RunMetadata {
        crawler_name: connector.name().to_string(),
        platform: connector.platform(),
        run_name,
        start_time,
        end_time: Utc::now(),
        status,
        error_message,
        stack_trace,
        entity_count: entities.len(),
        item_error_count: item_errors.len(),
        item_errors,
    };
    sink.write_run_metadata(&metadata).await?;

    match metadata.status {
        RunStatus::Success => info!(
            run = %metadata.run_name,
            entities = metadata.entity_count,
            "Run succeeded"
        ),
        RunStatus::Degraded => warn!(
            run = %metadata.run_name,
            entities = metadata.entity_count,
            skipped = metadata.item_error_count,
            "Run completed with skipped items"
        ),
        RunStatus::Failure => error!(
            run = %metadata.run_name,
            entities = metadata.entity_count,
            "Run failed"
        ),
    }
    Ok(metadata)
}

/// Classify a finished run
pub fn run_status(failed: bool, item_errors: &[ItemError]) -> RunStatus {
    if failed {
        RunStatus::Failure
    } else if item_errors.is_empty() {
        RunStatus::Success
    } else {
        RunStatus::Degraded
    }
}

/// Render an error and its sources, outermost first
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(out, "\nCaused by: {cause}");
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::{DataPlatform, Dataset, Entity};
    use crate::output::OutputConfig;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;
    use test_case::test_case;

    enum Behavior {
        Succeed,
        SkipOne,
        Fail,
    }

    struct FakeConnector(Behavior);

    #[async_trait]
    impl Connector for FakeConnector {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn platform(&self) -> Option<String> {
            Some("SQLITE".to_string())
        }

        async fn extract(&self, ctx: &ExtractContext) -> Result<Vec<Entity>> {
            ctx.emit(Dataset::new(DataPlatform::Sqlite, None, None, Some("main"), "early"));
            match self.0 {
                Behavior::Succeed => {}
                Behavior::SkipOne => ctx.report_item_error("table main.broken", "bad type"),
                Behavior::Fail => return Err(Error::auth("token rejected: socket closed")),
            }
            Ok(vec![Dataset::new(DataPlatform::Sqlite, None, None, Some("main"), "late").into()])
        }
    }

    fn sink(dir: &TempDir) -> EntitySink {
        let timestamp = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
        EntitySink::with_timestamp(OutputConfig::new(dir.path().display().to_string()), timestamp)
            .unwrap()
    }

    fn read_metadata(dir: &TempDir) -> RunMetadata {
        let path = Path::new(dir.path()).join("nightly/20240601T083000Z/run.json");
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test_case(Behavior::Succeed, RunStatus::Success, 2, 0 ; "success")]
    #[test_case(Behavior::SkipOne, RunStatus::Degraded, 2, 1 ; "degraded")]
    #[test_case(Behavior::Fail, RunStatus::Failure, 1, 0 ; "failure keeps emitted")]
    #[tokio::test]
    async fn test_run_status_and_counts(
        behavior: Behavior,
        status: RunStatus,
        entities: usize,
        skipped: usize,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let metadata = run_connector(&FakeConnector(behavior), ExtractContext::new("nightly"), &sink(&dir))
            .await
            .unwrap();

        assert_eq!(metadata.status, status);
        assert_eq!(metadata.entity_count, entities);
        assert_eq!(metadata.item_error_count, skipped);
        assert_eq!(metadata.crawler_name, "fake");
        assert_eq!(metadata.platform.as_deref(), Some("SQLITE"));
        assert_eq!(read_metadata(&dir), metadata);

        let chunk = dir.path().join("nightly/20240601T083000Z/1-of-1.json");
        let lines = std::fs::read_to_string(chunk).unwrap();
        assert_eq!(lines.lines().count(), entities);
    }

    #[tokio::test]
    async fn test_failure_records_message() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = run_connector(
            &FakeConnector(Behavior::Fail),
            ExtractContext::new("nightly"),
            &sink(&dir),
        )
        .await
        .unwrap();

        let message = metadata.error_message.unwrap();
        assert!(message.contains("token rejected"));
        assert!(message.contains("socket closed"));
        assert!(metadata.stack_trace.unwrap().starts_with(&message));
    }

    #[test]
    fn test_error_chain_follows_sources() {
        let parse_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = Error::JsonParse(parse_error);
        let chain = error_chain(&error);
        let lines: Vec<_> = chain.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("Caused by: "));
    }
}
