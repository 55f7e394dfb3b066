//! Container log forwarding.

use bollard::container::{LogOutput, LogsOptions};
use bollard::Docker;
use futures::StreamExt;
use tracing::{error, info};

/// Splits a byte stream into trimmed, non-empty lines.
///
/// Partial lines are kept until the next newline or [`LineBuffer::finish`].
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(line) = clean(&line) {
                lines.push(line);
            }
        }
        lines
    }

    /// Flush a trailing partial line.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        clean(&rest)
    }
}

fn clean(bytes: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(bytes).trim().to_string();
    (!line.is_empty()).then_some(line)
}

/// Follow a container's stdout/stderr and log one record per line.
///
/// Runs until the container's log stream closes.
pub async fn forward_logs(docker: Docker, container_id: String, execution: String) {
    let options = LogsOptions::<String> {
        follow: true,
        stdout: true,
        stderr: true,
        ..Default::default()
    };
    let mut stream = docker.logs(&container_id, Some(options));

    let mut stdout = LineBuffer::new();
    let mut stderr = LineBuffer::new();

    while let Some(item) = stream.next().await {
        let (stream_name, buffer, message) = match item {
            Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                ("stdout", &mut stdout, message)
            }
            Ok(LogOutput::StdErr { message }) => ("stderr", &mut stderr, message),
            Ok(LogOutput::StdIn { .. }) => continue,
            Err(e) => {
                error!(
                    %execution,
                    container_id = %container_id,
                    error = %e,
                    "failed to read container logs"
                );
                break;
            }
        };
        for line in buffer.push(&message) {
            emit(&execution, stream_name, &line);
        }
    }

    if let Some(line) = stdout.finish() {
        emit(&execution, "stdout", &line);
    }
    if let Some(line) = stderr.finish() {
        emit(&execution, "stderr", &line);
    }
}

fn emit(execution: &str, stream: &str, line: &str) {
    info!(execution, stream, line, "container");
}
