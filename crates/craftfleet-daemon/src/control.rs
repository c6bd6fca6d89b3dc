//! Daemon control socket server.
//!
//! Accepts `DaemonCommand`s as NDJSON over a Unix domain socket, runs each
//! one against the fleet runtime, and answers with one `DaemonResponse`
//! line per command. Connections may stay open for several commands.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use craftfleet_control::daemon::{DaemonCommand, DaemonResponse};

use crate::handle::FleetHandle;

/// Maximum allowed line length for incoming NDJSON commands (1 MB).
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Bind the control socket and serve it on a background task until the
/// runtime stops.
///
/// Binding happens before this returns so that a bad socket path fails
/// daemon startup instead of a background task.
pub fn spawn_control_server(
    socket_path: PathBuf,
    handle: FleetHandle,
) -> Result<JoinHandle<()>, String> {
    let listener = bind(&socket_path)?;
    info!(path = %socket_path.display(), "daemon control socket listening");
    Ok(tokio::spawn(serve(listener, socket_path, handle)))
}

fn bind(socket_path: &Path) -> Result<UnixListener, String> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create socket dir {}: {e}", parent.display()))?;
    }

    // Remove stale socket file (unconditional: avoids TOCTOU race with exists()+remove())
    match std::fs::remove_file(socket_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(format!(
                "failed to remove stale socket {}: {e}",
                socket_path.display()
            ))
        }
    }

    let listener = UnixListener::bind(socket_path)
        .map_err(|e| format!("failed to bind control socket {}: {e}", socket_path.display()))?;

    // Owner-only: other local users must not drive the fleet.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
        {
            warn!(
                path = %socket_path.display(),
                error = %e,
                "failed to set daemon socket permissions to 0600"
            );
        }
    }

    Ok(listener)
}

async fn serve(listener: UnixListener, socket_path: PathBuf, handle: FleetHandle) {
    loop {
        tokio::select! {
            _ = handle.stopped() => break,
            accept = listener.accept() => match accept {
                Ok((stream, _addr)) => {
                    let handle = handle.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handle).await {
                            debug!(error = %e, "daemon control connection ended");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "daemon control socket accept error"),
            },
        }
    }

    let _ = std::fs::remove_file(&socket_path);
    info!("daemon control socket stopped");
}

/// Handle a single client connection.
async fn handle_connection(stream: UnixStream, handle: FleetHandle) -> Result<(), String> {
    let (reader, mut writer) = stream.into_split();
    // Cap total readable bytes per connection so next_line() cannot grow
    // without bound on input that never sends a newline.
    let mut lines = BufReader::new(reader.take(10 * 1024 * 1024)).lines();

    while let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? {
        if line.len() > MAX_LINE_LENGTH {
            let _ = write_response(&mut writer, &DaemonResponse::error("command too large")).await;
            return Err("oversized command".into());
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<DaemonCommand>(line) {
            Ok(command) => crate::handle_command(&handle, command).await,
            Err(e) => DaemonResponse::error(format!("invalid JSON: {e}")),
        };

        write_response(&mut writer, &response).await?;
    }

    Ok(())
}

async fn write_response(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), String> {
    let mut json = serde_json::to_string(response).map_err(|e| e.to_string())?;
    json.push('\n');
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| format!("failed to write response: {e}"))?;
    writer.flush().await.map_err(|e| e.to_string())
}
