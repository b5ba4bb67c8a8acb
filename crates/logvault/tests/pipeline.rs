//! End-to-end behaviour of the logging pipeline

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logvault::{
    BufferPolicy, CallSite, LogRecord, LoggerBuilder, LoggerConfig, MemorySink, Metadata,
    PreserverConfig, SPAN_CATEGORY, SamplingPolicy, Severity, Sink, SinkError, SinkState,
    UserContext, Value,
};
use parking_lot::Mutex;
use tempfile::TempDir;

/// Rejects one message and remembers every other one
struct PickySink {
    state: SinkState,
    reject: &'static str,
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl Sink for PickySink {
    fn identifier(&self) -> &str {
        "picky"
    }
    fn min_severity(&self) -> Severity {
        self.state.min_severity()
    }
    fn set_min_severity(&self, severity: Severity) {
        self.state.set_min_severity(severity)
    }
    fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }
    fn set_enabled(&self, enabled: bool) {
        self.state.set_enabled(enabled)
    }
    async fn log(&self, record: &LogRecord) -> Result<(), SinkError> {
        if record.message() == self.reject {
            return Err(SinkError::rejected("not this one"));
        }
        self.seen.lock().push(record.message().to_string());
        Ok(())
    }
}

fn record(severity: Severity, category: &str, message: &str) -> LogRecord {
    LogRecord::new(severity, message, category, CallSite::new("app.rs", "run", 7))
}

fn memory() -> Arc<MemorySink> {
    Arc::new(MemorySink::new())
}

#[tokio::test]
async fn test_unbuffered_records_are_redacted_and_delivered() {
    let sink = memory();
    let logger = LoggerBuilder::new()
        .add_shared_sink(sink.clone())
        .with_default_sanitizer()
        .build()
        .await
        .unwrap();

    logger
        .log(record(Severity::Info, "Auth", "email a@b.com"))
        .await;
    logger
        .log(record(Severity::Info, "Auth", "nothing sensitive"))
        .await;

    assert_eq!(
        sink.messages(),
        vec!["email [EMAIL_REDACTED]", "nothing sensitive"]
    );
}

#[tokio::test]
async fn test_sanitize_flag_in_config_turns_redaction_off() {
    let sink = memory();
    let logger = LoggerBuilder::new()
        .add_shared_sink(sink.clone())
        .with_config(LoggerConfig::debug())
        .with_default_sanitizer()
        .build()
        .await
        .unwrap();

    logger.log(record(Severity::Info, "Auth", "a@b.com")).await;
    assert_eq!(sink.messages(), vec!["a@b.com"]);
}

#[tokio::test]
async fn test_severity_and_category_gate() {
    let sink = memory();
    let logger = LoggerBuilder::new()
        .add_shared_sink(sink.clone())
        .with_config(
            LoggerConfig::default()
                .with_min_severity(Severity::Info)
                .with_categories(["Net"]),
        )
        .build()
        .await
        .unwrap();

    logger.log(record(Severity::Debug, "Net", "too low")).await;
    logger.log(record(Severity::Error, "UI", "wrong category")).await;
    logger.log(record(Severity::Info, "Net", "kept")).await;

    assert_eq!(sink.messages(), vec!["kept"]);
}

#[tokio::test]
async fn test_sampling_always_keeps_errors() {
    let sink = memory();
    let logger = LoggerBuilder::new()
        .add_shared_sink(sink.clone())
        .with_sampling(SamplingPolicy::new(0.0))
        .build()
        .await
        .unwrap();

    for _ in 0..20 {
        logger.log(record(Severity::Info, "Any", "dropped")).await;
    }
    logger.log(record(Severity::Fatal, "Any", "kept")).await;

    assert_eq!(sink.messages(), vec!["kept"]);
}

#[tokio::test]
async fn test_config_sample_rate_zero_drops_info() {
    let sink = memory();
    let logger = LoggerBuilder::new()
        .add_shared_sink(sink.clone())
        .with_config(LoggerConfig::default().with_sample_rate(0.0))
        .build()
        .await
        .unwrap();

    logger.log(record(Severity::Info, "Any", "dropped")).await;
    logger.log(record(Severity::Error, "Any", "kept")).await;
    assert_eq!(sink.messages(), vec!["kept"]);

    logger
        .configure(LoggerConfig::default().with_sample_rate(1.0))
        .await;
    logger.log(record(Severity::Info, "Any", "now kept")).await;
    assert_eq!(sink.messages(), vec!["kept", "now kept"]);
}

#[tokio::test]
async fn test_user_context_attached() {
    let sink = memory();
    let logger = LoggerBuilder::new()
        .add_shared_sink(sink.clone())
        .with_static_context(UserContext::new("device-1").with_user_id("u-42"))
        .build()
        .await
        .unwrap();

    logger.log(record(Severity::Info, "Any", "hi")).await;
    let delivered = sink.records();
    let context = delivered[0].user_context().unwrap();
    assert_eq!(context.device_id, "device-1");
    assert_eq!(context.user_id.as_deref(), Some("u-42"));
}

#[tokio::test]
async fn test_buffer_max_size_flushes_batch() {
    let sink = memory();
    let logger = LoggerBuilder::new()
        .add_shared_sink(sink.clone())
        .with_buffer(BufferPolicy::new(3, Duration::ZERO, None, true))
        .build()
        .await
        .unwrap();

    logger.log(record(Severity::Info, "Any", "1")).await;
    logger.log(record(Severity::Info, "Any", "2")).await;
    assert!(sink.is_empty());

    logger.log(record(Severity::Info, "Any", "3")).await;
    assert_eq!(sink.messages(), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_manual_flush_and_background() {
    let sink = memory();
    let logger = LoggerBuilder::new()
        .add_shared_sink(sink.clone())
        .with_buffer(BufferPolicy::new(100, Duration::ZERO, None, true))
        .build()
        .await
        .unwrap();

    logger.log(record(Severity::Info, "Any", "a")).await;
    logger.flush().await;
    assert_eq!(sink.messages(), vec!["a"]);

    logger.log(record(Severity::Info, "Any", "b")).await;
    logger.enter_background().await;
    assert_eq!(sink.messages(), vec!["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn test_configure_rearms_timer_on_interval_change() {
    let sink = memory();
    let logger = LoggerBuilder::new()
        .add_shared_sink(sink.clone())
        .with_config(LoggerConfig::default().with_flush_interval(Duration::from_secs(60)))
        .with_config_buffer()
        .build()
        .await
        .unwrap();

    logger
        .configure(LoggerConfig::default().with_flush_interval(Duration::from_secs(1)))
        .await;
    logger.log(record(Severity::Info, "Any", "tick")).await;
    assert!(sink.is_empty());

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(sink.messages(), vec!["tick"]);
}

#[tokio::test]
async fn test_sink_management() {
    let first = Arc::new(MemorySink::new().with_identifier("first"));
    let second = Arc::new(MemorySink::new().with_identifier("second"));
    let logger = LoggerBuilder::new()
        .add_shared_sink(first.clone())
        .build()
        .await
        .unwrap();
    logger.add_sink(second.clone());
    assert_eq!(logger.sink_identifiers(), vec!["first", "second"]);

    logger
        .configure(LoggerConfig::default().with_disabled_sink("first"))
        .await;
    logger.log(record(Severity::Info, "Any", "x")).await;
    assert!(first.is_empty());
    assert_eq!(second.len(), 1);

    second.set_enabled(false);
    logger.log(record(Severity::Info, "Any", "y")).await;
    assert_eq!(second.len(), 1);

    assert_eq!(logger.remove_sink("second"), 1);
    assert_eq!(logger.sink_identifiers(), vec!["first"]);
}

#[tokio::test]
async fn test_preserved_records_recovered_after_shutdown() {
    let dir = TempDir::new().unwrap();
    {
        let logger = LoggerBuilder::new()
            .with_default_sanitizer()
            .with_crash_preservation(PreserverConfig::in_dir(dir.path()).with_capacity(2))
            .build()
            .await
            .unwrap();
        logger.log(record(Severity::Info, "Any", "one")).await;
        logger.log(record(Severity::Info, "Any", "mail x@y.io")).await;
        logger.log(record(Severity::Info, "Any", "three")).await;
        logger.shutdown().await;
    }

    let logger = LoggerBuilder::new()
        .with_crash_preservation(PreserverConfig::in_dir(dir.path()))
        .build()
        .await
        .unwrap();
    let recovery = logger.recover_crash_logs().await.unwrap();
    let messages: Vec<_> = recovery.records.iter().map(|r| r.message()).collect();
    assert_eq!(messages, vec!["mail [EMAIL_REDACTED]", "three"]);

    logger.clear_crash_logs().await;
    assert!(logger.recover_crash_logs().await.is_none());
}

#[tokio::test]
async fn test_macros_capture_call_site() {
    let sink = memory();
    let logger = LoggerBuilder::new()
        .add_shared_sink(sink.clone())
        .build()
        .await
        .unwrap();

    let line = line!() + 1;
    logvault::info!(logger, "value is {}", 42).await;
    logvault::error!(logger, category: "Net", "timeout").await;

    let delivered = sink.records();
    assert_eq!(delivered[0].message(), "value is 42");
    assert_eq!(delivered[0].category(), logvault::DEFAULT_CATEGORY);
    assert_eq!(delivered[0].location().line, line);
    assert_eq!(delivered[0].file_name(), "pipeline.rs");
    assert_eq!(delivered[1].severity(), Severity::Error);
    assert_eq!(delivered[1].category(), "Net");
}

#[tokio::test]
async fn test_rejected_record_does_not_drop_rest_of_batch() {
    let picky = Arc::new(PickySink {
        state: SinkState::default(),
        reject: "bad",
        seen: Mutex::new(Vec::new()),
    });
    let sink = memory();
    let logger = LoggerBuilder::new()
        .add_shared_sink(picky.clone())
        .add_shared_sink(sink.clone())
        .with_buffer(BufferPolicy::new(3, Duration::ZERO, None, true))
        .build()
        .await
        .unwrap();

    for message in ["a", "bad", "c"] {
        logger.log(record(Severity::Info, "Any", message)).await;
    }

    assert_eq!(*picky.seen.lock(), vec!["a", "c"]);
    assert_eq!(sink.messages(), vec!["a", "bad", "c"]);
}

#[tokio::test]
async fn test_crash_reported_once_despite_corrupt_snapshot() {
    let dir = TempDir::new().unwrap();
    let config = PreserverConfig::in_dir(dir.path());
    {
        let logger = LoggerBuilder::new()
            .with_crash_preservation(config.clone())
            .build()
            .await
            .unwrap();
        logger
            .crash_preserver()
            .unwrap()
            .persist_sync_with_signal(11);
    }
    std::fs::write(&config.snapshot_path, b"{garbage").unwrap();

    let logger = LoggerBuilder::new()
        .with_crash_preservation(config.clone())
        .build()
        .await
        .unwrap();
    let recovery = logger.recover_crash_logs().await.unwrap();
    assert_eq!(recovery.crash.unwrap().signal, Some(11));
    assert!(recovery.records.is_empty());

    let preserver = logger.crash_preserver().unwrap();
    assert!(!preserver.has_crash_data());
    assert!(logger.recover_crash_logs().await.is_none());
}

#[tokio::test]
async fn test_end_span_logs_duration() {
    let sink = memory();
    let logger = LoggerBuilder::new()
        .add_shared_sink(sink.clone())
        .build()
        .await
        .unwrap();

    let request = logger.start_span("request", None);
    let query = logger.start_span("query", Some(request));
    assert_eq!(logger.active_span_count(), 2);
    tokio::time::sleep(Duration::from_millis(5)).await;

    let mut extra = Metadata::new();
    extra.insert("rows".into(), 3i64.into());
    let span = logger.end_span(query, extra).await.unwrap();
    assert!(span.duration().unwrap() >= Duration::from_millis(5));
    assert_eq!(logger.active_span_count(), 1);

    let delivered = sink.records();
    assert_eq!(delivered.len(), 1);
    let record = &delivered[0];
    assert_eq!(record.severity(), Severity::Debug);
    assert_eq!(record.category(), SPAN_CATEGORY);
    assert!(record.message().starts_with("[query] completed in "));

    let metadata = record.metadata().unwrap();
    assert_eq!(metadata["name"], Value::from("query"));
    assert_eq!(metadata["parent_id"], Value::from(request.to_string()));
    assert_eq!(metadata["rows"], Value::from(3i64));
    match &metadata["duration_ms"] {
        Value::Float(ms) => assert!(*ms >= 5.0),
        other => panic!("duration_ms was {other:?}"),
    }
}

#[tokio::test]
async fn test_end_span_unknown_id_logs_nothing() {
    let sink = memory();
    let logger = LoggerBuilder::new()
        .add_shared_sink(sink.clone())
        .build()
        .await
        .unwrap();

    let id = logger.start_span("once", None);
    assert!(logger.end_span(id, Metadata::new()).await.is_some());
    assert!(logger.end_span(id, Metadata::new()).await.is_none());
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn test_measure_records_outcome() {
    let sink = memory();
    let logger = LoggerBuilder::new()
        .add_shared_sink(sink.clone())
        .with_span_category("Db")
        .build()
        .await
        .unwrap();

    let rows = logger
        .measure("select", || async { Ok::<_, String>(42) })
        .await;
    assert_eq!(rows, Ok(42));

    let failed = logger
        .measure("insert", || async { Err::<(), _>("constraint violated".to_string()) })
        .await;
    assert!(failed.is_err());
    assert_eq!(logger.active_span_count(), 0);

    let delivered = sink.records();
    assert_eq!(delivered.len(), 2);
    assert!(delivered.iter().all(|r| r.category() == "Db"));

    let ok = delivered[0].metadata().unwrap();
    assert_eq!(ok["success"], Value::from(true));
    assert!(!ok.contains_key("error"));

    let err = delivered[1].metadata().unwrap();
    assert_eq!(err["success"], Value::from(false));
    assert_eq!(err["error"], Value::from("constraint violated"));
}

#[tokio::test]
async fn test_span_records_respect_severity_gate() {
    let sink = memory();
    let logger = LoggerBuilder::new()
        .add_shared_sink(sink.clone())
        .with_config(LoggerConfig::default().with_min_severity(Severity::Info))
        .build()
        .await
        .unwrap();

    let id = logger.start_span("quiet", None);
    assert!(logger.end_span(id, Metadata::new()).await.is_some());
    assert!(sink.is_empty());
}
