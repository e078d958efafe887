//! Backend output capture.
//!
//! Backends (llama-server and other C/C++ tooling) can emit non-UTF8 bytes on
//! stdout/stderr. `BufReader::lines()` would end the reader on invalid UTF-8,
//! so lines are read as bytes and decoded lossily.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

/// Ring buffer of the most recent output lines.
#[derive(Debug)]
pub struct OutputBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a line, removing the oldest if at capacity.
    pub fn push(&mut self, line: String) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Copy of all lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

/// Output buffer shared between the reader tasks and the supervisor.
pub type SharedOutput = Arc<Mutex<OutputBuffer>>;

pub fn shared_output(capacity: usize) -> SharedOutput {
    Arc::new(Mutex::new(OutputBuffer::new(capacity)))
}

/// Snapshot of a shared buffer.
pub fn snapshot(output: &SharedOutput) -> Vec<String> {
    output
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .lines()
}

/// Spawn a task that appends every line of `stream` to `output` and passes
/// it to `on_line`. The task ends at EOF or on a read error.
pub fn spawn_output_reader<F>(
    stream: impl AsyncRead + Unpin + Send + 'static,
    model: String,
    stream_type: &'static str,
    output: SharedOutput,
    on_line: F,
) -> JoinHandle<()>
where
    F: Fn(&str) + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }

                    let line = String::from_utf8_lossy(&buf).into_owned();
                    debug!(model = %model, %stream_type, "{line}");
                    on_line(&line);
                    output
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(line);
                }
                Err(e) => {
                    debug!(model = %model, %stream_type, error = %e, "Output reader exiting due to read error");
                    break;
                }
            }
        }

        debug!(model = %model, %stream_type, "Output reader task exiting");
    })
}
