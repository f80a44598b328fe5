//! Integration tests for the transport over in-memory pipes and real
//! processes.

use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use analysis_client::config::ServerConfig;
use analysis_client::protocol::inbound::{Inbound, Notification};
use analysis_client::transport::codec::MAX_LINE_BYTES;
use analysis_client::transport::{StopOutcome, Transport};
use analysis_client::AppError;

use super::test_helpers::{connected_line, in_memory_transport, status_line, TEST_TIMEOUT};

const GRACE: Duration = Duration::from_secs(1);

// ── Outbound ─────────────────────────────────────────────────────────────────

/// Requests are written as one JSON object per line with ids counting from 0.
#[tokio::test]
async fn requests_are_written_as_ndjson_with_sequential_ids() {
    let (mut transport, mut service) = in_memory_transport(GRACE);

    let first = transport
        .send_request("server.getVersion", None)
        .await
        .expect("first send");
    let second = transport
        .send_request("server.setSubscriptions", Some(json!({"subscriptions": ["STATUS"]})))
        .await
        .expect("second send");

    assert_eq!(first, "0");
    assert_eq!(second, "1");
    assert_eq!(
        service.next_request().await,
        json!({"id": "0", "method": "server.getVersion"})
    );
    assert_eq!(
        service.next_request().await,
        json!({"id": "1", "method": "server.setSubscriptions", "params": {"subscriptions": ["STATUS"]}})
    );

    transport.stop().await.expect("stop");
}

/// Stopping closes the service's input stream.
#[tokio::test]
async fn stop_closes_service_input() {
    let (mut transport, mut service) = in_memory_transport(GRACE);

    assert_eq!(transport.stop().await.expect("stop"), StopOutcome::Detached);

    let mut rest = Vec::new();
    let n = tokio::time::timeout(TEST_TIMEOUT, service.stdin.read_to_end(&mut rest))
        .await
        .expect("eof within timeout")
        .expect("read");
    assert_eq!(n, 0, "nothing may be written after stop");
}

/// `stop` is idempotent and sends fail afterwards.
#[tokio::test]
async fn stop_is_idempotent_and_blocks_sends() {
    let (mut transport, _service) = in_memory_transport(GRACE);

    assert_eq!(transport.stop().await.expect("first stop"), StopOutcome::Detached);
    assert_eq!(
        transport.stop().await.expect("second stop"),
        StopOutcome::AlreadyStopped
    );
    assert!(transport.is_stopped());

    let err = transport
        .send_request("server.getVersion", None)
        .await
        .expect_err("send after stop must fail");
    assert!(matches!(err, AppError::Write(_)));
}

// ── Inbound ──────────────────────────────────────────────────────────────────

/// The message stream can be taken exactly once.
#[tokio::test]
async fn message_stream_is_handed_out_once() {
    let (mut transport, _service) = in_memory_transport(GRACE);

    assert!(transport.take_messages().is_some());
    assert!(transport.take_messages().is_none());

    transport.stop().await.expect("stop");
}

/// A malformed line surfaces as a protocol error and the stream continues.
#[tokio::test]
async fn malformed_line_does_not_end_the_stream() {
    let (mut transport, mut service) = in_memory_transport(GRACE);
    let mut messages = transport.take_messages().expect("stream");

    service.emit("{this is not json").await;
    service.emit(&connected_line("1.39.0")).await;

    let first = tokio::time::timeout(TEST_TIMEOUT, messages.next())
        .await
        .expect("first item")
        .expect("stream open");
    assert!(matches!(first, Err(AppError::Protocol(_))));

    let second = tokio::time::timeout(TEST_TIMEOUT, messages.next())
        .await
        .expect("second item")
        .expect("stream open")
        .expect("valid message");
    assert!(matches!(
        second,
        Inbound::Notification(Notification::Connected { .. })
    ));

    transport.stop().await.expect("stop");
}

/// Blank lines produce nothing.
#[tokio::test]
async fn blank_lines_are_skipped() {
    let (mut transport, mut service) = in_memory_transport(GRACE);
    let mut messages = transport.take_messages().expect("stream");

    service.emit("").await;
    service.emit("   ").await;
    service.emit(&status_line(false)).await;

    let item = tokio::time::timeout(TEST_TIMEOUT, messages.next())
        .await
        .expect("item")
        .expect("stream open")
        .expect("valid message");
    assert_eq!(
        item,
        Inbound::Notification(Notification::StatusChanged {
            is_busy: Some(false)
        })
    );

    transport.stop().await.expect("stop");
}

/// A line longer than the limit is reported and the next line still arrives.
#[tokio::test]
async fn oversized_line_is_reported_then_stream_recovers() {
    let (mut transport, mut service) = in_memory_transport(GRACE);
    let mut messages = transport.take_messages().expect("stream");

    let writer = tokio::spawn(async move {
        let huge = format!("{{\"pad\":\"{}\"}}\n", "x".repeat(MAX_LINE_BYTES + 16));
        service.stdout.write_all(huge.as_bytes()).await.expect("write huge");
        service.emit(&status_line(true)).await;
        service
    });

    let first = tokio::time::timeout(TEST_TIMEOUT, messages.next())
        .await
        .expect("first item")
        .expect("stream open");
    assert!(
        matches!(first, Err(AppError::Protocol(ref m)) if m.contains("line too long")),
        "unexpected: {first:?}"
    );

    let second = tokio::time::timeout(TEST_TIMEOUT, messages.next())
        .await
        .expect("second item")
        .expect("stream open")
        .expect("valid message");
    assert_eq!(
        second,
        Inbound::Notification(Notification::StatusChanged {
            is_busy: Some(true)
        })
    );

    let _service = writer.await.expect("writer task");
    transport.stop().await.expect("stop");
}

/// When the service closes its output the stream ends.
#[tokio::test]
async fn stream_ends_when_service_output_closes() {
    let (mut transport, service) = in_memory_transport(GRACE);
    let mut messages = transport.take_messages().expect("stream");

    drop(service.stdout);

    let end = tokio::time::timeout(TEST_TIMEOUT, messages.next())
        .await
        .expect("end within timeout");
    assert!(end.is_none());

    transport.stop().await.expect("stop");
}

// ── Real processes ───────────────────────────────────────────────────────────

/// A missing executable is a launch error.
#[tokio::test]
async fn missing_executable_is_launch_error() {
    let config = ServerConfig {
        command: "analysis-client-test-no-such-binary".into(),
        args: Vec::new(),
    };

    let err = Transport::start(&config, GRACE).expect_err("spawn must fail");
    assert!(matches!(err, AppError::Launch(ref m) if m.contains("analysis-client-test-no-such-binary")));
}

/// A service that exits when its input closes is reported as exited.
#[cfg(unix)]
#[tokio::test]
async fn cooperative_process_exits_on_stop() {
    let config = ServerConfig {
        command: "sh".into(),
        args: vec!["-c".into(), "cat >/dev/null".into()],
    };
    let mut transport = Transport::start(&config, Duration::from_secs(5)).expect("spawn sh");
    assert!(transport.process_id().is_some());

    let outcome = tokio::time::timeout(TEST_TIMEOUT, transport.stop())
        .await
        .expect("stop within timeout")
        .expect("stop");
    assert!(matches!(outcome, StopOutcome::Exited(_)), "got {outcome:?}");
}

/// A service that ignores the stop request is killed after the grace period.
#[cfg(unix)]
#[tokio::test]
async fn stubborn_process_is_killed_after_grace() {
    let config = ServerConfig {
        command: "sh".into(),
        args: vec![
            "-c".into(),
            "trap '' TERM; while :; do sleep 1; done".into(),
        ],
    };
    let mut transport = Transport::start(&config, Duration::from_millis(300)).expect("spawn sh");

    let outcome = tokio::time::timeout(TEST_TIMEOUT, transport.stop())
        .await
        .expect("stop within timeout")
        .expect("stop");
    assert_eq!(outcome, StopOutcome::Killed);
}

/// Lines from a real process reach the message stream.
#[cfg(unix)]
#[tokio::test]
async fn process_output_reaches_message_stream() {
    let script = format!(
        "printf '%s\\n' {}; cat >/dev/null",
        super::test_helpers::sh_quote(&connected_line("1.39.0"))
    );
    let config = ServerConfig {
        command: "sh".into(),
        args: vec!["-c".into(), script],
    };
    let mut transport = Transport::start(&config, Duration::from_secs(2)).expect("spawn sh");
    let mut messages = transport.take_messages().expect("stream");

    let item = tokio::time::timeout(TEST_TIMEOUT, messages.next())
        .await
        .expect("item")
        .expect("stream open")
        .expect("valid message");
    assert_eq!(
        item,
        Inbound::Notification(Notification::Connected {
            version: "1.39.0".into(),
            pid: Some(1),
        })
    );

    transport.stop().await.expect("stop");
}
