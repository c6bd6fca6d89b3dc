//! Control plane for the craftfleet daemon.
//!
//! Presentation layers (CLI, HTTP API, scripts) drive the fleet with
//! [`daemon::DaemonCommand`]s and receive [`daemon::DaemonResponse`]s. The
//! daemon serves them as newline-delimited JSON over a Unix domain socket;
//! [`daemon::DaemonClient`] is the blocking client used by the CLI.

pub mod daemon;
