//! Polling driver.
//!
//! Walks the configured hosts in order, normalizes every neighbour record,
//! writes the batch to the store and, when every host polled cleanly, prunes
//! rows older than the retention window. A failed host never stops the
//! others, but it does suppress the cleanup pass: rows belonging to a device
//! we could not reach must not be aged out on its behalf.

use chrono::Utc;

use crate::config::{Config, HostSpec};
use crate::source::{self, canon_mac, Neighbour, NeighbourSource, SourceError};
use crate::store::{ArpLogStore, Sighting, StoreError};

const SECS_PER_DAY: i64 = 86_400;

/// What one run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub hosts_polled: usize,
    pub hosts_failed: usize,
    pub arp_entries: usize,
    pub ndp_entries: usize,
    /// Rows removed by retention cleanup; `None` when cleanup was skipped.
    pub pruned: Option<usize>,
}

impl RunReport {
    pub fn clean(&self) -> bool {
        self.hosts_failed == 0
    }
}

/// Poll every configured host and persist what was seen.
pub fn run(cfg: &Config, store: &mut ArpLogStore) -> Result<RunReport, StoreError> {
    let mut sightings = Vec::new();
    let mut failed = 0;
    let mut arp_total = 0;
    let mut ndp_total = 0;

    for spec in &cfg.hosts {
        tracing::info!("Connecting to {} [{}]", spec.backend, spec.host);
        let now = Utc::now().timestamp();
        match poll_host(spec, now, &mut sightings) {
            Ok((n_arp, n_ndp)) => {
                arp_total += n_arp;
                ndp_total += n_ndp;
                tracing::info!(
                    "[{}] Logged {} ARP entries, {} NDP entries",
                    spec.host,
                    n_arp,
                    n_ndp
                );
            }
            Err(e) => {
                tracing::error!("Connection to {:?} failed: {}", spec.host, e);
                failed += 1;
            }
        }
    }

    store.log_sightings(&sightings)?;

    let pruned = if failed == 0 {
        tracing::info!(
            "Cleaning up records more than {} days old",
            cfg.max_age_days
        );
        let cutoff = Utc::now().timestamp() - i64::from(cfg.max_age_days) * SECS_PER_DAY;
        let removed = store.prune_older_than(cutoff)?;
        tracing::debug!("Removed {} stale rows", removed);
        Some(removed)
    } else {
        tracing::error!("Some hosts couldn't be scanned, skipping cleanup");
        None
    };

    Ok(RunReport {
        hosts_polled: cfg.hosts.len(),
        hosts_failed: failed,
        arp_entries: arp_total,
        ndp_entries: ndp_total,
        pruned,
    })
}

fn poll_host(
    spec: &HostSpec,
    now: i64,
    out: &mut Vec<Sighting>,
) -> Result<(usize, usize), SourceError> {
    let mut src = source::open_source(spec)?;
    collect(src.as_mut(), now, out)
}

/// Drain one source into the sighting batch; returns `(arp, ndp)` counts.
fn collect(
    src: &mut dyn NeighbourSource,
    now: i64,
    out: &mut Vec<Sighting>,
) -> Result<(usize, usize), SourceError> {
    let mut n_arp = 0;
    let mut n_ndp = 0;
    for neighbour in src.get_all()? {
        let Some(sighting) = normalize(&neighbour, now) else {
            continue;
        };
        tracing::debug!("Found {} -> {}", sighting.ip_addr, sighting.mac_addr);
        if sighting.ip_addr.contains(':') {
            n_ndp += 1;
        } else {
            n_arp += 1;
        }
        out.push(sighting);
    }
    Ok((n_arp, n_ndp))
}

/// Apply the storage-side policies to one record: strip any `%ifname` scope
/// suffix, canonicalize the hardware address, and drop link-local IPv6
/// entries. Records that fail canonicalization are skipped.
fn normalize(neighbour: &Neighbour, now: i64) -> Option<Sighting> {
    let ip = neighbour.ip.split('%').next().unwrap_or(&neighbour.ip);

    let Some(mac) = canon_mac(&neighbour.mac) else {
        tracing::debug!(
            "Skipping unparseable hardware address ip={:?} mac={:?}",
            ip,
            neighbour.mac
        );
        return None;
    };

    if ip.starts_with("fe80:") {
        tracing::debug!("Skipping link-local ip={:?} mac={:?}", ip, mac);
        return None;
    }

    Some(Sighting {
        ip_addr: ip.to_string(),
        mac_addr: mac,
        seen_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbUrl;

    struct StaticSource {
        entries: Vec<Neighbour>,
    }

    impl NeighbourSource for StaticSource {
        fn get_arp4(&mut self) -> Result<Vec<Neighbour>, SourceError> {
            Ok(self
                .entries
                .iter()
                .filter(|n| !n.ip.contains(':'))
                .cloned()
                .collect())
        }

        fn get_ndp6(&mut self) -> Result<Vec<Neighbour>, SourceError> {
            Ok(self
                .entries
                .iter()
                .filter(|n| n.ip.contains(':'))
                .cloned()
                .collect())
        }
    }

    fn neighbour(ip: &str, mac: &str) -> Neighbour {
        Neighbour {
            ip: ip.to_string(),
            mac: mac.to_string(),
            dev: Some("eth0".to_string()),
        }
    }

    #[test]
    fn test_collect_normalizes_and_classifies() {
        let mut src = StaticSource {
            entries: vec![
                neighbour("192.0.2.5", "AA:BB:CC:00:11:22"),
                neighbour("2001:db8::1", "de:ad:be:ef:0:1"),
                neighbour("fe80::1%eth0", "aa:bb:cc:dd:ee:ff"),
                neighbour("192.0.2.6", "(incomplete)"),
            ],
        };

        let mut out = Vec::new();
        let (n_arp, n_ndp) = collect(&mut src, 42, &mut out).unwrap();

        assert_eq!((n_arp, n_ndp), (1, 1));
        assert_eq!(
            out,
            vec![
                Sighting {
                    ip_addr: "192.0.2.5".to_string(),
                    mac_addr: "aa:bb:cc:00:11:22".to_string(),
                    seen_at: 42,
                },
                Sighting {
                    ip_addr: "2001:db8::1".to_string(),
                    mac_addr: "de:ad:be:ef:00:01".to_string(),
                    seen_at: 42,
                },
            ]
        );
    }

    #[test]
    fn test_normalize_strips_scope_but_keeps_global() {
        let s = normalize(&neighbour("2001:db8::1%eth0", "aa:bb:cc:00:11:22"), 1).unwrap();
        assert_eq!(s.ip_addr, "2001:db8::1");
    }

    fn config_with_hosts(hosts: Vec<HostSpec>) -> Config {
        Config {
            db: DbUrl {
                path: ":memory:".to_string(),
            },
            hosts,
            max_age_days: 1,
        }
    }

    fn seed_old_row(store: &mut ArpLogStore) {
        // well past any retention window
        store
            .log_sightings(&[Sighting {
                ip_addr: "192.0.2.99".to_string(),
                mac_addr: "aa:bb:cc:00:11:99".to_string(),
                seen_at: 1_000,
            }])
            .unwrap();
    }

    #[test]
    fn test_failed_host_suppresses_cleanup() {
        let mut store = ArpLogStore::open_in_memory().unwrap();
        seed_old_row(&mut store);

        let cfg = config_with_hosts(vec![HostSpec {
            backend: "nosuch".to_string(),
            host: "example.com".to_string(),
            args: vec![],
        }]);
        let report = run(&cfg, &mut store).unwrap();

        assert_eq!(report.hosts_failed, 1);
        assert!(!report.clean());
        assert_eq!(report.pruned, None);
        // the stale row must survive a dirty run
        assert_eq!(store.rows().unwrap().len(), 1);
    }

    #[test]
    fn test_clean_run_prunes() {
        let mut store = ArpLogStore::open_in_memory().unwrap();
        seed_old_row(&mut store);

        let cfg = config_with_hosts(vec![]);
        let report = run(&cfg, &mut store).unwrap();

        assert!(report.clean());
        assert_eq!(report.pruned, Some(1));
        assert!(store.rows().unwrap().is_empty());
    }
}
