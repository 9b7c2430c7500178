//! Calbridge host process.
//!
//! Reads one JSON request per line on stdin and writes one JSON response per
//! line on stdout. Requests run concurrently; responses are written as they
//! complete and carry the request `id`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

use calbridge_calendar::{dispatch, BridgeRejection, CalendarBridge, SqliteCalendarStore};
use calbridge_core::{AppError, Config};

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
struct Response {
    id: Value,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<BridgeRejection>,
}

impl Response {
    fn resolve(id: Value, value: Value) -> Self {
        Self {
            id,
            ok: true,
            value: Some(value),
            error: None,
        }
    }

    fn reject(id: Value, rejection: BridgeRejection) -> Self {
        Self {
            id,
            ok: false,
            value: None,
            error: Some(rejection),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, validation) = Config::load_validated()?;
    calbridge_core::init(&config.logging.filter)?;

    for warning in &validation.warnings {
        tracing::warn!("Config warning: {}", warning);
    }

    let store = match SqliteCalendarStore::from_config(&config) {
        Ok(store) => store,
        Err(e) => {
            let err = AppError::from(e);
            tracing::error!(error = %err, "{}", err.user_message());
            return Err(err.into());
        }
    };
    tracing::info!(database = %config.database_path().display(), "Calendar store ready");

    serve(CalendarBridge::new(store), tokio::io::stdin(), tokio::io::stdout()).await?;

    tracing::info!("Input closed, shutting down");
    Ok(())
}

/// Serve requests from `input` until it closes.
async fn serve<R, W>(bridge: CalendarBridge, input: R, output: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(line) = rx.recv().await {
            output.write_all(line.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut tasks = JoinSet::new();
    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await.map_err(AppError::from)? {
        if line.trim().is_empty() {
            continue;
        }

        let bridge = bridge.clone();
        let tx = tx.clone();
        tasks.spawn(async move {
            let response = handle_line(&bridge, &line).await;
            match serde_json::to_string(&response) {
                Ok(json) => {
                    if tx.send(json).is_err() {
                        tracing::warn!("Output closed, dropping response");
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to encode response"),
            }
        });
        reap_finished(&mut tasks);
    }

    while let Some(joined) = tasks.join_next().await {
        log_task_result(joined);
    }

    drop(tx);
    writer.await??;
    Ok(())
}

/// Drop request tasks that have already completed.
fn reap_finished(tasks: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = tasks.try_join_next() {
        log_task_result(joined);
        reaped += 1;
    }
    reaped
}

fn log_task_result(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "Request task panicked");
        } else {
            tracing::error!(error = %e, "Request task failed");
        }
    }
}

async fn handle_line(bridge: &CalendarBridge, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed request line");
            return Response::reject(
                Value::Null,
                BridgeRejection::invalid_request(format!("Malformed request: {}", e)),
            );
        }
    };

    tracing::debug!(method = %request.method, "Dispatching request");
    match dispatch(bridge, &request.method, request.args).await {
        Ok(value) => Response::resolve(request.id, value),
        Err(rejection) => {
            tracing::info!(
                method = %request.method,
                code = %rejection.code,
                "Request rejected: {}",
                rejection.message
            );
            Response::reject(request.id, rejection)
        }
    }
}
