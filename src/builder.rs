// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Builder: turns validated ROAs into a new versioned prefix set, writes the
//! AXFR/IXFR journal, advances `current`, and wakes live servers
//! (spec.md §4.2).

use crate::config::BuilderConfig;
use crate::error::BuilderError;
use crate::prefix::PrefixAssertion;
use crate::prefix_set::PrefixSet;
use crate::roa::{decode_raw_roa, FileRoaSource, RoaSource};
use crate::wakeup;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

pub struct Builder {
    config: BuilderConfig,
    roa_source: Box<dyn RoaSource + Send + Sync>,
}

impl Builder {
    pub fn new(config: BuilderConfig) -> Self {
        Self::with_source(config, Box::new(FileRoaSource))
    }

    pub fn with_source(config: BuilderConfig, roa_source: Box<dyn RoaSource + Send + Sync>) -> Self {
        Self { config, roa_source }
    }

    /// Runs one build: steps 1-7 of spec.md §4.2, in order. Returns the new
    /// serial on success. Any error before step 5 (advancing `current`)
    /// leaves `current` untouched, so servers keep serving the last good
    /// version (spec.md §4.2 "Failure semantics").
    pub fn run(&self) -> Result<u32, BuilderError> {
        if self.config.roa_dirs.is_empty() {
            return Err(BuilderError::NoRoaDirs);
        }

        // Step 1: enumerate retained AXFRs.
        let mut retained = load_retained_snapshots(&self.config.data_dir)?;

        // Step 2: build the new canonical prefix set.
        let serial = next_serial(&retained);
        let assertions = self.collect_assertions();
        let new_set = PrefixSet::canonicalize(serial, assertions);

        // Step 3: write its AXFR file.
        new_set.save_axfr(&self.config.data_dir)?;

        // Step 4: write an IXFR against every retained prior snapshot.
        for old in &retained {
            new_set.save_ixfr(old, &self.config.data_dir)?;
        }

        // Step 5: atomically advance `current`.
        write_current(&self.config.data_dir, serial)?;

        // Step 6: append the new snapshot to the retained list.
        retained.push(new_set);

        // Step 7: wake any live servers. Missing/unreachable recipients are
        // ignored; the builder has no notion of which servers exist.
        let notified = wakeup::notify_all(&self.config.data_dir).unwrap_or(0);

        info!(
            serial,
            retained = retained.len(),
            notified,
            "build complete"
        );
        Ok(serial)
    }

    fn collect_assertions(&self) -> Vec<PrefixAssertion> {
        let mut assertions = Vec::new();
        for (path, result) in self.roa_source.load(&self.config.roa_dirs) {
            match result {
                Ok(raw) => match decode_raw_roa(&raw) {
                    Ok(mut decoded) => assertions.append(&mut decoded),
                    Err(e) => warn!(?path, error = %e, "skipping ROA"),
                },
                Err(e) => warn!(?path, error = %e, "skipping unreadable ROA"),
            }
        }
        assertions
    }
}

fn load_retained_snapshots(data_dir: &Path) -> Result<Vec<PrefixSet>, BuilderError> {
    let mut out = Vec::new();
    let entries = match std::fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("ax") {
            if let Ok(set) = PrefixSet::load_axfr(&path) {
                out.push(set);
            }
        }
    }
    out.sort_by_key(|s| s.serial);
    out
}

/// Mints the new serial as the current wall-clock epoch second, sleeping
/// out a collision against the highest retained serial rather than always
/// paying a fixed sleep: serials are monotonic so long as the builder isn't
/// invoked more than once per second, and this enforces that without a
/// separately persisted counter (spec.md §3.2, §9; see DESIGN.md O1).
fn next_serial(retained: &[PrefixSet]) -> u32 {
    let max = retained.iter().map(|s| s.serial).max();
    loop {
        let now = epoch_secs();
        match max {
            Some(max) if now <= max => {
                std::thread::sleep(std::time::Duration::from_millis(200));
            }
            _ => return now,
        }
    }
}

fn epoch_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs() as u32
}

/// Advances `current` via the write-temp-then-rename pattern (spec.md §3.2):
/// the rename is the sole coherence point servers rely on.
fn write_current(data_dir: &Path, serial: u32) -> std::io::Result<()> {
    let tmp = data_dir.join(format!(".current.{}.tmp", std::process::id()));
    std::fs::write(&tmp, format!("{serial}\n"))?;
    std::fs::rename(&tmp, data_dir.join("current"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoaError;
    use crate::roa::{RawPrefixEntry, RawRoa};
    use std::path::PathBuf;

    struct FixedRoaSource(Vec<Result<RawRoa, RoaError>>);

    impl RoaSource for FixedRoaSource {
        fn load(&self, _dirs: &[PathBuf]) -> Vec<(PathBuf, Result<RawRoa, RoaError>)> {
            self.0
                .iter()
                .enumerate()
                .map(|(i, r)| (PathBuf::from(format!("roa-{i}.roa")), clone_result(r)))
                .collect()
        }
    }

    fn clone_result(r: &Result<RawRoa, RoaError>) -> Result<RawRoa, RoaError> {
        match r {
            Ok(raw) => Ok(raw.clone()),
            Err(_) => Err(RoaError::MalformedRoa("fixture clone".into())),
        }
    }

    fn raw_roa(asn: u32, prefix: u128, length: u8) -> RawRoa {
        RawRoa {
            version: 0,
            asn,
            blocks: vec![(
                0x0001,
                vec![RawPrefixEntry {
                    prefix_len: length,
                    prefix_bits: prefix,
                    max_length: None,
                }],
            )],
        }
    }

    #[test]
    fn run_writes_axfr_and_advances_current() {
        let dir = tempfile::tempdir().unwrap();
        let config = BuilderConfig {
            roa_dirs: vec![dir.path().to_path_buf()],
            data_dir: dir.path().to_path_buf(),
        };
        let source = FixedRoaSource(vec![Ok(raw_roa(64512, 0xC0000200, 24))]);
        let builder = Builder::with_source(config, Box::new(source));

        let serial = builder.run().unwrap();
        assert!(PrefixSet::axfr_path(dir.path(), serial).exists());
        let current = std::fs::read_to_string(dir.path().join("current")).unwrap();
        assert_eq!(current.trim().parse::<u32>().unwrap(), serial);
    }

    #[test]
    fn skips_malformed_roa_without_failing_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = BuilderConfig {
            roa_dirs: vec![dir.path().to_path_buf()],
            data_dir: dir.path().to_path_buf(),
        };
        let source = FixedRoaSource(vec![
            Err(RoaError::MalformedRoa("bad version".into())),
            Ok(raw_roa(1, 1, 32)),
        ]);
        let builder = Builder::with_source(config, Box::new(source));
        let serial = builder.run().unwrap();
        let set = PrefixSet::load_axfr(&PrefixSet::axfr_path(dir.path(), serial)).unwrap();
        assert_eq!(set.assertions.len(), 1);
    }

    #[test]
    fn second_run_writes_ixfr_against_first_and_bumps_serial() {
        let dir = tempfile::tempdir().unwrap();
        let config = BuilderConfig {
            roa_dirs: vec![dir.path().to_path_buf()],
            data_dir: dir.path().to_path_buf(),
        };
        let first = Builder::with_source(
            config.clone(),
            Box::new(FixedRoaSource(vec![Ok(raw_roa(1, 1, 32))])),
        )
        .run()
        .unwrap();

        let second = Builder::with_source(
            config.clone(),
            Box::new(FixedRoaSource(vec![Ok(raw_roa(2, 2, 32))])),
        )
        .run()
        .unwrap();

        assert!(second > first, "serial must strictly increase");
        assert!(PrefixSet::ixfr_path(dir.path(), first, second).exists());
    }

    #[test]
    fn rejects_empty_roa_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = BuilderConfig {
            roa_dirs: vec![],
            data_dir: dir.path().to_path_buf(),
        };
        let builder = Builder::new(config);
        assert!(matches!(builder.run(), Err(BuilderError::NoRoaDirs)));
    }
}
