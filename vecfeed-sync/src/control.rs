//! Operator control: cooperative shutdown signalling.
//!
//! Shutdown is a single-writer, multi-reader flag carried by a
//! `tokio::sync::watch` channel. The run loop observes it without polling
//! or blocking on console input; the operator side resolves a future when
//! the literal command `stop program` arrives on a line-based reader.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The only recognized operator command (case-insensitive).
pub const STOP_COMMAND: &str = "stop program";

/// Create the shutdown flag channel, initially unset.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolve when the stop command arrives on `reader`.
///
/// Unrecognized commands are logged and ignored. If the input closes or
/// errors without a stop command, the future never resolves — end of
/// console input is not a shutdown request, and the daemon keeps running
/// on its other signals.
pub async fn wait_for_stop_command<R>(reader: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().eq_ignore_ascii_case(STOP_COMMAND) => {
                info!("stop command received");
                return;
            }
            Ok(Some(line)) => {
                debug!(command = %line.trim(), "ignoring unrecognized command");
            }
            Ok(None) => {
                debug!("control input closed");
                std::future::pending::<()>().await;
            }
            Err(e) => {
                warn!(error = %e, "control input error");
                std::future::pending::<()>().await;
            }
        }
    }
}
