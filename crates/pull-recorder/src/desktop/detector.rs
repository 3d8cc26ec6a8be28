//! Pull detection through an external model process.
//!
//! Each request is one JSON header line, `{"shape":[1,3,H,W]}`, followed by
//! the tensor as little-endian `f32`. The process answers with one line:
//! `{"scores":[start,end]}` or `{"error":"..."}`.

use pull_recorder_core::{
    CaptureError, CoreResult,
    inference::{InferenceEngine, InputTensor, RawScores},
};

use std::{io, panic::Location, process::Stdio, time::Duration};

use async_trait::async_trait;
use error_location::ErrorLocation;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, ChildStdout, Command},
    sync::Mutex,
};
use tracing::{debug, info, instrument, warn};

/// Upper bound on one round trip to the model process.
pub const INFERENCE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct RequestHeader {
    shape: [usize; 4],
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    scores: Option<Vec<f32>>,
    #[serde(default)]
    error: Option<String>,
}

/// Serialize one request: header line plus raw tensor bytes.
pub fn encode_request(input: &InputTensor) -> CoreResult<Vec<u8>> {
    let mut request = serde_json::to_vec(&RequestHeader { shape: input.shape }).map_err(|e| {
        CaptureError::InferenceFailed {
            reason: format!("failed to encode request header: {}", e),
            location: ErrorLocation::from(Location::caller()),
        }
    })?;

    request.reserve(1 + input.data.len() * 4);
    request.push(b'\n');
    for value in &input.data {
        request.extend_from_slice(&value.to_le_bytes());
    }

    Ok(request)
}

/// Parse one response line.
pub fn decode_response(line: &str) -> CoreResult<RawScores> {
    let response: Response =
        serde_json::from_str(line.trim()).map_err(|e| CaptureError::InferenceFailed {
            reason: format!("unreadable detector response: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

    match response {
        Response {
            error: Some(reason),
            ..
        } => Err(CaptureError::InferenceFailed {
            reason,
            location: ErrorLocation::from(Location::caller()),
        }),
        Response {
            scores: Some(scores),
            ..
        } => Ok(RawScores(scores)),
        Response { .. } => Err(CaptureError::InferenceFailed {
            reason: "detector response has no scores".to_string(),
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}

struct DetectorProcess {
    // Held so the process is killed when dropped.
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Inference engine that talks to a long-running model process.
///
/// The process is started on first use and restarted after any failure.
pub struct CommandInferenceEngine {
    command: Vec<String>,
    process: Mutex<Option<DetectorProcess>>,
}

impl CommandInferenceEngine {
    /// Engine for `command`: program followed by its arguments.
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            process: Mutex::new(None),
        }
    }

    fn spawn(&self) -> CoreResult<DetectorProcess> {
        let location = ErrorLocation::from(Location::caller());
        let Some((program, args)) = self.command.split_first() else {
            return Err(CaptureError::InferenceFailed {
                reason: "detector command is empty".to_string(),
                location,
            });
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::InferenceFailed {
                reason: format!("failed to start detector {}: {}", program, e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "pull_recorder::detector", "{}", line);
                }
            });
        }

        match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => {
                info!(program = %program, "Detector process started");
                Ok(DetectorProcess {
                    _child: child,
                    stdin,
                    stdout: BufReader::new(stdout),
                })
            }
            _ => Err(CaptureError::InferenceFailed {
                reason: "detector pipes not captured".to_string(),
                location,
            }),
        }
    }
}

async fn round_trip(process: &mut DetectorProcess, request: &[u8]) -> io::Result<String> {
    process.stdin.write_all(request).await?;
    process.stdin.flush().await?;

    let mut line = String::new();
    if process.stdout.read_line(&mut line).await? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "detector closed its output",
        ));
    }

    Ok(line)
}

#[async_trait]
impl InferenceEngine for CommandInferenceEngine {
    #[instrument(skip(self, input), fields(shape = ?input.shape))]
    async fn infer(&self, input: &InputTensor) -> CoreResult<RawScores> {
        let request = encode_request(input)?;
        let mut guard = self.process.lock().await;

        if guard.is_none() {
            *guard = Some(self.spawn()?);
        }
        let Some(process) = guard.as_mut() else {
            return Err(CaptureError::InferenceFailed {
                reason: "detector process not running".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        };

        let reason = match tokio::time::timeout(INFERENCE_TIMEOUT, round_trip(process, &request)).await
        {
            Ok(Ok(line)) => return decode_response(&line),
            Ok(Err(e)) => format!("detector I/O failed: {}", e),
            Err(_) => format!("detector did not answer within {:?}", INFERENCE_TIMEOUT),
        };

        warn!(reason = %reason, "Restarting detector process on next inference");
        *guard = None;

        Err(CaptureError::InferenceFailed {
            reason,
            location: ErrorLocation::from(Location::caller()),
        })
    }
}
