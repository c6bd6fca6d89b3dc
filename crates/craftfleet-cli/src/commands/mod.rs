//! CLI command implementations for the `craftfleet` binary.

pub mod daemon;
pub mod fleet;
pub mod server;

use std::path::PathBuf;

use craftfleet_control::daemon::{DaemonClient, DaemonCommand, DaemonResponse};

/// Client for `socket`, or the default socket path.
pub fn client(socket: Option<PathBuf>) -> DaemonClient {
    match socket {
        Some(path) => DaemonClient::new(path),
        None => DaemonClient::default_path(),
    }
}

/// Send a command to a running daemon and fail on an error response.
fn request(client: &DaemonClient, command: &DaemonCommand) -> anyhow::Result<DaemonResponse> {
    if !client.is_running() {
        anyhow::bail!("Daemon is not running.\nStart it with `craftfleet daemon run`.");
    }

    let response = client
        .send(command)
        .map_err(|e| anyhow::anyhow!("failed to reach daemon: {e}"))?;

    if !response.ok {
        match &response.error {
            Some(code) => anyhow::bail!("{} ({code})", response.message),
            None => anyhow::bail!("{}", response.message),
        }
    }
    Ok(response)
}

/// Parse a JSON parameter object given on the command line.
fn parse_params(raw: &str) -> anyhow::Result<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("params must be a JSON object: {e}"))?;
    if !value.is_object() {
        anyhow::bail!("params must be a JSON object, got {value}");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_must_be_an_object() {
        assert_eq!(
            parse_params(r#"{"x": 1}"#).unwrap(),
            serde_json::json!({"x": 1})
        );
        assert!(parse_params("[1, 2]").is_err());
        assert!(parse_params("not json").is_err());
    }
}
