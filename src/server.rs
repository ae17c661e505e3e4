// SPDX-License-Identifier: Apache-2.0 OR MIT

//! One server session: the RTR state machine driving a single client
//! connection, plus the wakeup-triggered serial check (spec.md §4.3, §4.4).

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::pdu::{errno, Pdu};
use crate::prefix_set::PrefixSet;
use crate::wakeup::WakeupSocket;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info, warn};

/// Reads `<data_dir>/current`; absent or unparsable means no build has ever
/// completed (spec.md §7: not fatal, answered with a Cache Reset instead).
fn read_current(data_dir: &Path) -> Option<u32> {
    std::fs::read_to_string(data_dir.join("current"))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

/// Drives one client connection end to end: waits for a Reset or Serial
/// Query, answers it, then watches the wakeup bus for newly built serials
/// until the client disconnects (spec.md §4.3).
///
/// `last_known` tracks the serial most recently communicated to this client
/// (by a Reset/Serial Query reply or a prior Serial Notify), so a wakeup
/// datagram only produces a Serial Notify when `current` has actually moved
/// since then; two wakeups with no intervening build send nothing on the
/// second one (spec.md §4.3.3).
pub async fn run_session<S>(stream: S, config: &ServerConfig) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = stream;
    let wakeup = WakeupSocket::bind(&config.wakeup_dir).await?;
    let mut last_known = read_current(&config.data_dir);

    loop {
        tokio::select! {
            pdu = Pdu::read(&mut stream) => {
                match pdu {
                    Ok(Pdu::ResetQuery) => {
                        handle_reset(&mut stream, &config.data_dir, &mut last_known).await?
                    }
                    Ok(Pdu::SerialQuery { serial }) => {
                        handle_serial_query(&mut stream, &config.data_dir, serial, &mut last_known).await?
                    }
                    Ok(other) => {
                        warn!(pdu_type = other.pdu_type(), "unexpected PDU from client, closing");
                        return Ok(());
                    }
                    Err(e) => {
                        send_error_report(&mut stream, errno::INVALID_REQUEST, e.raw(), &e.to_string()).await?;
                        return Ok(());
                    }
                }
            }
            woken = wakeup.recv() => {
                woken?;
                let current = read_current(&config.data_dir);
                if current != last_known {
                    last_known = current;
                    if let Some(serial) = current {
                        debug!(serial, "wakeup: notifying client of new serial");
                        Pdu::SerialNotify { serial }.write(&mut stream).await?;
                    }
                }
            }
        }
    }
}

/// Copies a snapshot/delta file to the client verbatim between a Cache
/// Response and an End of Data, with no parsing or re-encoding of its
/// contents: the builder is the sole writer of these files and the bytes on
/// disk are already well-formed Prefix PDUs (spec.md §4.3.2). The copy is
/// chunked (`tokio::io::copy`), so an unbounded file is never buffered in
/// full (spec.md §5).
async fn stream_file<S: AsyncWrite + Unpin>(
    stream: &mut S,
    path: &Path,
    serial: u32,
) -> Result<bool, ServerError> {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(_) => return Ok(false),
    };
    Pdu::CacheResponse.write(stream).await?;
    let mut reader = BufReader::new(file);
    tokio::io::copy(&mut reader, stream).await?;
    Pdu::EndOfData { serial }.write(stream).await?;
    Ok(true)
}

/// Replies to a Reset Query: Cache Response, the current AXFR's raw bytes,
/// End of Data. Missing `current` (or an AXFR that fails to open) is
/// answered with a bare Cache Reset rather than treated as an error
/// (spec.md §7).
async fn handle_reset<S: AsyncWrite + Unpin>(
    stream: &mut S,
    data_dir: &Path,
    last_known: &mut Option<u32>,
) -> Result<(), ServerError> {
    let current = read_current(data_dir);
    *last_known = current;
    let Some(serial) = current else {
        info!("no current snapshot yet, replying Cache Reset");
        Pdu::CacheReset.write(stream).await?;
        return Ok(());
    };

    let path = PrefixSet::axfr_path(data_dir, serial);
    if !stream_file(stream, &path, serial).await? {
        warn!(?path, "current snapshot unreadable, replying Cache Reset");
        Pdu::CacheReset.write(stream).await?;
    }
    Ok(())
}

/// Replies to a Serial Query. If `<current>.ix.<client_serial>` is on disk,
/// stream it. Otherwise fall back to a full Cache Reset so the client
/// re-syncs via AXFR (spec.md §4.1.3, §4.3.2, §7). The builder never writes
/// a self-referential `<S>.ix.<S>` file, so a client already on `current`
/// takes this same fallback path rather than a special-cased empty reply.
async fn handle_serial_query<S: AsyncWrite + Unpin>(
    stream: &mut S,
    data_dir: &Path,
    client_serial: u32,
    last_known: &mut Option<u32>,
) -> Result<(), ServerError> {
    let current = read_current(data_dir);
    *last_known = current;
    let Some(current) = current else {
        info!("no current snapshot yet, replying Cache Reset");
        Pdu::CacheReset.write(stream).await?;
        return Ok(());
    };

    let path = PrefixSet::ixfr_path(data_dir, client_serial, current);
    if !stream_file(stream, &path, current).await? {
        debug!(client_serial, current, "no IXFR on disk, falling back to Cache Reset");
        Pdu::CacheReset.write(stream).await?;
    }
    Ok(())
}

async fn send_error_report<S: AsyncWrite + Unpin>(
    stream: &mut S,
    code: u16,
    encapsulated_pdu: &[u8],
    message: &str,
) -> Result<(), ServerError> {
    Pdu::ErrorReport {
        errno: code,
        encapsulated_pdu: encapsulated_pdu.to_vec(),
        message: message.to_string(),
    }
    .write(stream)
    .await?;
    Ok(())
}

/// Entry point for `rtr-rib server`: serves one client over stdin/stdout
/// (spec.md §4.3 "one process per connection, stdio transport").
pub async fn serve_stdio(config: &ServerConfig) -> Result<(), ServerError> {
    let stdin = tokio::io::stdin();
    let stdout = BufWriter::new(tokio::io::stdout());
    let mut stream = tokio::io::join(stdin, stdout);
    let result = run_session(&mut stream, config).await;
    stream.flush().await.ok();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::{Afi, PrefixAssertion};

    fn assertion(prefix: u128, length: u8, asn: u32) -> PrefixAssertion {
        PrefixAssertion {
            family: Afi::V4,
            prefix,
            length,
            max_length: length,
            asn,
            announce: true,
            color: 0,
        }
    }

    fn config(dir: &Path) -> ServerConfig {
        ServerConfig {
            data_dir: dir.to_path_buf(),
            wakeup_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn reset_query_with_no_current_replies_cache_reset() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, server) = tokio::io::duplex(4096);
        let cfg = config(dir.path());

        let handle = tokio::spawn(async move { run_session(server, &cfg).await });
        Pdu::ResetQuery.write(&mut client).await.unwrap();
        let reply = Pdu::read(&mut client).await.unwrap();
        assert_eq!(reply, Pdu::CacheReset);

        drop(client);
        handle.await.unwrap().ok();
    }

    #[tokio::test]
    async fn reset_query_with_current_streams_axfr() {
        let dir = tempfile::tempdir().unwrap();
        let set = PrefixSet::canonicalize(100, vec![assertion(1, 32, 1), assertion(2, 32, 2)]);
        set.save_axfr(dir.path()).unwrap();
        std::fs::write(dir.path().join("current"), "100\n").unwrap();

        let (mut client, server) = tokio::io::duplex(4096);
        let cfg = config(dir.path());
        let handle = tokio::spawn(async move { run_session(server, &cfg).await });

        Pdu::ResetQuery.write(&mut client).await.unwrap();
        assert_eq!(Pdu::read(&mut client).await.unwrap(), Pdu::CacheResponse);
        assert_eq!(Pdu::read(&mut client).await.unwrap(), Pdu::Prefix(assertion(1, 32, 1)));
        assert_eq!(Pdu::read(&mut client).await.unwrap(), Pdu::Prefix(assertion(2, 32, 2)));
        assert_eq!(Pdu::read(&mut client).await.unwrap(), Pdu::EndOfData { serial: 100 });

        drop(client);
        handle.await.unwrap().ok();
    }

    #[tokio::test]
    async fn serial_query_at_current_serial_falls_back_to_cache_reset() {
        // No `<S>.ix.<S>` file is ever written by the builder, so a client
        // already on `current` gets the same Cache Reset as any other miss.
        let dir = tempfile::tempdir().unwrap();
        let set = PrefixSet::canonicalize(100, vec![assertion(1, 32, 1)]);
        set.save_axfr(dir.path()).unwrap();
        std::fs::write(dir.path().join("current"), "100\n").unwrap();

        let (mut client, server) = tokio::io::duplex(4096);
        let cfg = config(dir.path());
        let handle = tokio::spawn(async move { run_session(server, &cfg).await });

        Pdu::SerialQuery { serial: 100 }.write(&mut client).await.unwrap();
        assert_eq!(Pdu::read(&mut client).await.unwrap(), Pdu::CacheReset);

        drop(client);
        handle.await.unwrap().ok();
    }

    #[tokio::test]
    async fn serial_query_with_known_delta_streams_ixfr() {
        let dir = tempfile::tempdir().unwrap();
        let old = PrefixSet::canonicalize(100, vec![assertion(1, 32, 1)]);
        let new = PrefixSet::canonicalize(200, vec![assertion(2, 32, 2)]);
        old.save_axfr(dir.path()).unwrap();
        new.save_axfr(dir.path()).unwrap();
        new.save_ixfr(&old, dir.path()).unwrap();
        std::fs::write(dir.path().join("current"), "200\n").unwrap();

        let (mut client, server) = tokio::io::duplex(4096);
        let cfg = config(dir.path());
        let handle = tokio::spawn(async move { run_session(server, &cfg).await });

        Pdu::SerialQuery { serial: 100 }.write(&mut client).await.unwrap();
        assert_eq!(Pdu::read(&mut client).await.unwrap(), Pdu::CacheResponse);
        let withdraw = Pdu::read(&mut client).await.unwrap();
        assert_eq!(withdraw, Pdu::Prefix(assertion(1, 32, 1).with_announce(false)));
        let announce = Pdu::read(&mut client).await.unwrap();
        assert_eq!(announce, Pdu::Prefix(assertion(2, 32, 2)));
        assert_eq!(Pdu::read(&mut client).await.unwrap(), Pdu::EndOfData { serial: 200 });

        drop(client);
        handle.await.unwrap().ok();
    }

    #[tokio::test]
    async fn serial_query_with_unknown_delta_falls_back_to_cache_reset() {
        let dir = tempfile::tempdir().unwrap();
        let set = PrefixSet::canonicalize(200, vec![assertion(1, 32, 1)]);
        set.save_axfr(dir.path()).unwrap();
        std::fs::write(dir.path().join("current"), "200\n").unwrap();

        let (mut client, server) = tokio::io::duplex(4096);
        let cfg = config(dir.path());
        let handle = tokio::spawn(async move { run_session(server, &cfg).await });

        Pdu::SerialQuery { serial: 1 }.write(&mut client).await.unwrap();
        assert_eq!(Pdu::read(&mut client).await.unwrap(), Pdu::CacheReset);

        drop(client);
        handle.await.unwrap().ok();
    }

    #[tokio::test]
    async fn malformed_pdu_gets_an_error_report() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, server) = tokio::io::duplex(4096);
        let cfg = config(dir.path());
        let handle = tokio::spawn(async move { run_session(server, &cfg).await });

        client.write_all(&[1u8, 2, 0, 0]).await.unwrap();
        let reply = Pdu::read(&mut client).await.unwrap();
        assert!(matches!(reply, Pdu::ErrorReport { .. }));

        drop(client);
        handle.await.unwrap().ok();
    }
}
