// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The wakeup bus: one `tokio::net::UnixDatagram` per running server,
//! discovered and notified by the builder after each successful build
//! (spec.md §4.4).

use std::path::{Path, PathBuf};
use tokio::net::UnixDatagram;
use tracing::debug;

/// A single byte is enough; the payload carries no meaning beyond "a new
/// serial may be available" (spec.md §4.4).
const PING: &[u8] = b"\0";

/// A server's inbound wakeup endpoint. Bound at `<wakeup_dir>/wakeup.<pid>`
/// so the builder can discover every live server by listing the directory.
/// The socket file is unlinked on drop so a crashed server doesn't leave a
/// stale entry for the builder to send into the void.
pub struct WakeupSocket {
    socket: UnixDatagram,
    path: PathBuf,
}

impl WakeupSocket {
    pub async fn bind(wakeup_dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(wakeup_dir)?;
        let path = wakeup_dir.join(format!("wakeup.{}", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let socket = UnixDatagram::bind(&path)?;
        Ok(Self { socket, path })
    }

    /// Resolves once a wakeup datagram arrives. The payload is discarded;
    /// only the fact of arrival matters to the caller.
    pub async fn recv(&self) -> std::io::Result<()> {
        let mut buf = [0u8; 1];
        self.socket.recv(&mut buf).await?;
        Ok(())
    }
}

impl Drop for WakeupSocket {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Sends a wakeup datagram to every `wakeup.*` socket found in `dir`
/// (spec.md §4.2 step 7, §4.4). A recipient that no longer exists or
/// refuses the datagram is skipped rather than failing the whole call: the
/// builder has no way to tell a crashed server from one that just exited.
/// Returns how many sends succeeded.
pub fn notify_all(dir: &Path) -> std::io::Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let sender = std::os::unix::net::UnixDatagram::unbound()?;
    let mut notified = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_wakeup = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("wakeup."));
        if !is_wakeup {
            continue;
        }
        match sender.send_to(PING, &path) {
            Ok(_) => notified += 1,
            Err(e) => debug!(?path, error = %e, "wakeup send failed, skipping"),
        }
    }
    Ok(notified)
}
