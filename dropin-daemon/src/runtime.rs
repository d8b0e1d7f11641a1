use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::error::{io_err, DaemonError};
use crate::launcher::Launcher;
use crate::paths::{
    logs_dir, run_dir, socket_path, stderr_log_path, stdout_log_path, STDERR_LOG, STDOUT_LOG,
};
use crate::protocol::{
    DaemonRequest, DaemonResponse, CMD_STABILITY, CMD_STATUS, CMD_STOP, CMD_WAIT_STABILITY,
};

/// Start the launcher and block the current thread until it is stopped.
pub fn start_blocking(base: &Path) -> Result<(), DaemonError> {
    ensure_runtime_dirs(base)?;
    // Dropping the guards flushes the log writers.
    let _guards = init_tracing(base)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(base.to_path_buf()))
}

/// Load the configuration under `base`, start the launcher and serve the
/// control socket until a `stop` request or ctrl-c.
pub async fn run(base: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&base)?;
    let launcher = {
        let base = base.clone();
        tokio::task::spawn_blocking(move || -> Result<Launcher, DaemonError> {
            let launcher = Launcher::load(&base)?;
            launcher.start()?;
            Ok(launcher)
        })
        .await
        .map_err(|err| DaemonError::Protocol(format!("launcher start join error: {err}")))??
    };
    let launcher = Arc::new(launcher);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let launcher = launcher.clone();
        tokio::spawn(async move {
            let result = socket_server_task(launcher, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let base = base.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(base, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, stopping launcher");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (socket_result, rotation_result, signal_result) =
        tokio::join!(socket_handle, rotation_handle, signal_handle);

    let stopping = launcher.clone();
    let stop_result = tokio::task::spawn_blocking(move || stopping.stop()).await;

    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    stop_result.map_err(|err| DaemonError::Protocol(format!("launcher stop join error: {err}")))
}

async fn socket_server_task(
    launcher: Arc<Launcher>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(launcher.base());
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let launcher = launcher.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, launcher, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    launcher: Arc<Launcher>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            CMD_STATUS => blocking(&launcher, |launcher| launcher.status()).await,
            CMD_STABILITY => blocking(&launcher, |launcher| launcher.stability()).await,
            CMD_WAIT_STABILITY => {
                blocking(&launcher, |launcher| launcher.wait_for_stability()).await
            }
            CMD_STOP => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == CMD_STOP {
            break;
        }
    }

    Ok(())
}

/// Run a launcher query off the async workers; the stability checks sleep.
async fn blocking<T, F>(launcher: &Arc<Launcher>, query: F) -> DaemonResponse
where
    T: Serialize + Send + 'static,
    F: FnOnce(&Launcher) -> T + Send + 'static,
{
    let launcher = launcher.clone();
    let outcome = tokio::task::spawn_blocking(move || query(&launcher))
        .await
        .map_err(|err| err.to_string())
        .and_then(|value| serde_json::to_value(value).map_err(|err| err.to_string()));
    match outcome {
        Ok(data) => DaemonResponse::ok(data),
        Err(err) => DaemonResponse::error(err),
    }
}

async fn log_rotation_task(
    base: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; nothing to rotate at startup.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let base = base.clone();
                // Failures are logged inside rotate_logs.
                tokio::task::spawn_blocking(move || crate::log_rotation::rotate_logs(&base))
                    .await
                    .ok();
            }
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(base: &Path) -> Result<(), DaemonError> {
    for dir in [run_dir(base), logs_dir(base)] {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }
    for log in [stdout_log_path(base), stderr_log_path(base)] {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log)
            .map_err(|e| io_err(&log, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    writer
        .write_all(&payload)
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Console output plus JSON lines in `logs/dropin.log`, with warnings and
/// errors also written to `logs/dropin-err.log`.
fn init_tracing(base: &Path) -> Result<Vec<WorkerGuard>, DaemonError> {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, Layer};

    let (all, all_guard) = tracing_appender::non_blocking(log_appender(base, STDOUT_LOG)?);
    let (errors, errors_guard) = tracing_appender::non_blocking(log_appender(base, STDERR_LOG)?);

    let console = fmt::layer().with_target(false).with_filter(env_filter());
    let file = fmt::layer()
        .json()
        .with_writer(all)
        .with_ansi(false)
        .with_filter(env_filter());
    let error_file = fmt::layer()
        .json()
        .with_writer(errors)
        .with_ansi(false)
        .with_filter(LevelFilter::WARN);

    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(error_file)
        .try_init();
    Ok(vec![all_guard, errors_guard])
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Appender for one launcher log. Size-based rotation is done by
/// [`rotate_logs`](crate::log_rotation::rotate_logs), so the appender never
/// rolls on its own.
fn log_appender(base: &Path, file: &str) -> Result<RollingFileAppender, DaemonError> {
    let dir = logs_dir(base);
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file)
        .build(&dir)
        .map_err(|source| DaemonError::Logging {
            path: dir.join(file),
            source,
        })
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
