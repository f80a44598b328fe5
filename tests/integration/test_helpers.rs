//! Shared helpers for transport, handshake and session integration tests.
//!
//! Provides in-memory service pipes, NDJSON line builders and configs that
//! launch `sh -c <script>` as a scripted stand-in for the analysis service.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use analysis_client::console::ConsoleBuffer;
use analysis_client::transport::Transport;
use analysis_client::ClientConfig;

/// Upper bound for any single wait in these tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The service's side of an in-memory transport.
pub struct FakeService {
    /// Write here to emit lines on the service's stdout.
    pub stdout: DuplexStream,
    /// Read here to see what the client wrote to the service's stdin.
    pub stdin: BufReader<DuplexStream>,
}

impl FakeService {
    /// Emit one NDJSON line.
    pub async fn emit(&mut self, line: &str) {
        self.stdout
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("emit line");
    }

    /// Read the next line the client sent, parsed as JSON.
    pub async fn next_request(&mut self) -> Value {
        let mut line = String::new();
        let n = tokio::time::timeout(TEST_TIMEOUT, self.stdin.read_line(&mut line))
            .await
            .expect("request within timeout")
            .expect("read request");
        assert!(n > 0, "client closed stdin before sending a request");
        serde_json::from_str(&line).expect("request is valid json")
    }
}

/// Build a transport over in-memory pipes plus the fake service driving them.
pub fn in_memory_transport(grace: Duration) -> (Transport, FakeService) {
    let (service_stdout, client_source) = tokio::io::duplex(64 * 1024);
    let (client_sink, service_stdin) = tokio::io::duplex(64 * 1024);

    let transport = Transport::from_streams(client_source, client_sink, grace);
    let service = FakeService {
        stdout: service_stdout,
        stdin: BufReader::new(service_stdin),
    };
    (transport, service)
}

/// `server.connected` notification line.
pub fn connected_line(version: &str) -> String {
    json!({"event": "server.connected", "params": {"version": version, "pid": 1}}).to_string()
}

/// `server.status` notification line.
pub fn status_line(is_analyzing: bool) -> String {
    json!({"event": "server.status", "params": {"analysis": {"isAnalyzing": is_analyzing}}})
        .to_string()
}

/// `analysis.errors` line with two counted issues and one TODO.
pub fn errors_line(file: &str) -> String {
    let issue = |kind: &str, message: &str, line: u32, column: u32| {
        json!({
            "severity": "WARNING",
            "type": kind,
            "location": {"file": file, "offset": 0, "length": 1, "startLine": line, "startColumn": column},
            "message": message,
        })
    };
    json!({
        "event": "analysis.errors",
        "params": {
            "file": file,
            "errors": [
                issue("COMPILE_TIME_ERROR", "Undefined name 'x'.", 3, 5),
                issue("TODO", "TODO: remove", 4, 1),
                issue("HINT", "Unused import.", 1, 8),
            ]
        }
    })
    .to_string()
}

/// Config launching `sh -c <script> sh <extra...>`.
pub fn script_config(script: &str, extra: &[&str]) -> ClientConfig {
    let mut args = vec!["-c".to_owned(), script.to_owned(), "sh".to_owned()];
    args.extend(extra.iter().map(|s| (*s).to_owned()));

    let mut config = ClientConfig::default();
    config.override_server(Some("sh".into()), args);
    config.timeouts.connect_seconds = 5;
    config.timeouts.shutdown_grace_seconds = 2;
    config
}

/// Single-quote `line` for use inside a shell script.
pub fn sh_quote(line: &str) -> String {
    format!("'{}'", line.replace('\'', r"'\''"))
}

/// Poll `buffer` until it contains `needle`.
pub async fn wait_for_output(buffer: &ConsoleBuffer, needle: &str) {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while !buffer.contents().contains(needle) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {needle:?}; console so far:\n{}",
            buffer.contents()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
