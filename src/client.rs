// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A minimal debug client: spawns `rtr-rib server` as a child process over
//! piped stdio and prints whatever it sends back (spec.md §4.5). Not part of
//! the core; useful for exercising a server by hand or in integration tests.

use crate::error::ClientError;
use crate::pdu::Pdu;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

/// Launches `server_exe server --data-dir <data_dir> --wakeup-dir
/// <wakeup_dir>` as a child process, sends a Reset Query, and prints every
/// PDU received until the child closes its stdout or sends End of Data.
pub async fn run_against_subprocess(
    server_exe: &str,
    data_dir: &str,
    wakeup_dir: &str,
) -> Result<(), ClientError> {
    let mut child = Command::new(server_exe)
        .args(["server", "--data-dir", data_dir, "--wakeup-dir", wakeup_dir])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;

    let mut stdin = child.stdin.take().expect("piped stdin");
    let mut stdout = child.stdout.take().expect("piped stdout");

    Pdu::ResetQuery.write(&mut stdin).await?;

    loop {
        match Pdu::read(&mut stdout).await {
            Ok(pdu) => {
                let done = matches!(pdu, Pdu::EndOfData { .. });
                info!(?pdu, "received");
                if done {
                    break;
                }
            }
            Err(e) => {
                info!(error = %e, "server closed the connection");
                break;
            }
        }
    }

    drop(stdin);
    child.kill().await.ok();
    Ok(())
}
