//! SNMP neighbour table backend.
//!
//! Bulk-walks `IF-MIB::ifName` and `IP-MIB::ipNetToPhysicalPhysAddress`
//! through `snmpbulkwalk` and decodes each neighbour row out of the numeric
//! OID suffix. One walk covers both address families, so the results are
//! memoized for the lifetime of the instance and `get_arp4`/`get_ndp6`
//! after the first call are served from the cache.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::process::Command;

use super::{canon_mac, Neighbour, NeighbourSource, SourceError};

const DEFAULT_COMMUNITY: &str = "public";

// .1.3.6.1.2.1.31.1.1.1.1.<ifindex>
const IFNAME_MIB: &str = "IF-MIB::ifName";
// .1.3.6.1.2.1.4.35.1.4.<ifindex>.<af>.<addrlen>.<addr octets...>
const PHYSADDR_MIB: &str = "IP-MIB::ipNetToPhysicalPhysAddress";

const AF_INET: u32 = 1;
const AF_INET6: u32 = 2;

/// Neighbour source for any SNMP-speaking device.
pub struct SnmpSource {
    host: String,
    community: String,
    cache4: Option<Vec<Neighbour>>,
    cache6: Option<Vec<Neighbour>>,
}

impl SnmpSource {
    pub fn new(host: &str, community: Option<&str>) -> Self {
        SnmpSource {
            host: host.to_string(),
            community: community.unwrap_or(DEFAULT_COMMUNITY).to_string(),
            cache4: None,
            cache6: None,
        }
    }

    /// Run one bulk walk, yielding `(numeric oid components, value)` pairs.
    fn walk(&self, mib: &str) -> Result<Vec<(Vec<String>, String)>, SourceError> {
        let community = format!("-c{}", self.community);
        let args = [
            "snmpbulkwalk",
            "-v2c",
            community.as_str(),
            "-Onq",
            self.host.as_str(),
            mib,
        ];
        let display = args.join(" ");

        let output = Command::new(args[0]).args(&args[1..]).output().map_err(|source| {
            SourceError::Spawn {
                command: display.clone(),
                source,
            }
        })?;
        if !output.status.success() {
            return Err(SourceError::CommandFailed {
                command: display,
                status: output.status,
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        let mut rows = Vec::new();
        for line in text.lines() {
            let mut tokens = line.split_whitespace();
            let (Some(oid), Some(value)) = (tokens.next(), tokens.next()) else {
                continue;
            };
            let parts = oid.split('.').map(str::to_string).collect();
            rows.push((parts, value.to_string()));
        }
        Ok(rows)
    }

    /// Walk both tables once and fill the per-family caches.
    fn refresh(&mut self) -> Result<(), SourceError> {
        if self.cache4.is_some() {
            return Ok(());
        }

        let mut idx2name = HashMap::new();
        for (oid, value) in self.walk(IFNAME_MIB)? {
            if let Some(ifindex) = oid.get(12).and_then(|c| c.parse::<u32>().ok()) {
                idx2name.insert(ifindex, value);
            }
        }

        let mut cache4 = Vec::new();
        let mut cache6 = Vec::new();
        for (oid, value) in self.walk(PHYSADDR_MIB)? {
            let Some((ifindex, af, ip)) = decode_phys_row(&oid) else {
                continue;
            };
            let Some(mac) = canon_mac(&value) else {
                tracing::debug!("Skipping unparseable hardware address {:?}", value);
                continue;
            };
            let dev = idx2name
                .get(&ifindex)
                .cloned()
                .unwrap_or_else(|| ifindex.to_string());
            let entry = Neighbour {
                ip,
                mac,
                dev: Some(dev),
            };
            match af {
                AF_INET => cache4.push(entry),
                AF_INET6 => cache6.push(entry),
                _ => {}
            }
        }

        self.cache4 = Some(cache4);
        self.cache6 = Some(cache6);
        Ok(())
    }
}

impl NeighbourSource for SnmpSource {
    fn get_arp4(&mut self) -> Result<Vec<Neighbour>, SourceError> {
        self.refresh()?;
        Ok(self.cache4.clone().unwrap_or_default())
    }

    fn get_ndp6(&mut self) -> Result<Vec<Neighbour>, SourceError> {
        self.refresh()?;
        Ok(self.cache6.clone().unwrap_or_default())
    }
}

/// Decode one `ipNetToPhysicalPhysAddress` row's OID suffix into
/// `(ifindex, address family, address)`. Rows for address families other
/// than IPv4/IPv6 or with a suffix of the wrong width decode to `None`.
fn decode_phys_row(oid: &[String]) -> Option<(u32, u32, String)> {
    let ifindex = oid.get(11)?.parse::<u32>().ok()?;
    let af = oid.get(12)?.parse::<u32>().ok()?;
    let octets: Vec<u8> = oid
        .get(14..)?
        .iter()
        .map(|c| c.parse::<u8>())
        .collect::<Result<_, _>>()
        .ok()?;

    let ip = match (af, octets.len()) {
        (AF_INET, 4) => Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]).to_string(),
        (AF_INET6, 16) => {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(&octets);
            Ipv6Addr::from(bytes).to_string()
        }
        _ => return None,
    };
    Some((ifindex, af, ip))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(s: &str) -> Vec<String> {
        s.split('.').map(str::to_string).collect()
    }

    #[test]
    fn test_decode_phys_row_ipv4() {
        // ifindex 3, af 1 (inet), length 4, address 192.0.2.5
        let parts = oid(".1.3.6.1.2.1.4.35.1.4.3.1.4.192.0.2.5");
        assert_eq!(
            decode_phys_row(&parts),
            Some((3, AF_INET, "192.0.2.5".to_string()))
        );
    }

    #[test]
    fn test_decode_phys_row_ipv6() {
        let parts = oid(
            ".1.3.6.1.2.1.4.35.1.4.7.2.16.32.1.13.184.0.0.0.0.0.0.0.0.0.0.0.1",
        );
        assert_eq!(
            decode_phys_row(&parts),
            Some((7, AF_INET6, "2001:db8::1".to_string()))
        );
    }

    #[test]
    fn test_decode_phys_row_rejects_other_families() {
        // af 4 would be DNS names; skip anything that is not inet/inet6
        let parts = oid(".1.3.6.1.2.1.4.35.1.4.3.4.4.192.0.2.5");
        assert_eq!(decode_phys_row(&parts), None);
    }

    #[test]
    fn test_decode_phys_row_rejects_short_suffix() {
        let parts = oid(".1.3.6.1.2.1.4.35.1.4.3.1.4.192.0");
        assert_eq!(decode_phys_row(&parts), None);
    }

    #[test]
    fn test_cached_results_served_without_walking() {
        // with a warm cache no snmpbulkwalk runs, so the bogus host is
        // never contacted
        let entry = Neighbour {
            ip: "192.0.2.5".to_string(),
            mac: "aa:bb:cc:00:11:22".to_string(),
            dev: Some("eth0".to_string()),
        };
        let mut src = SnmpSource {
            host: "host.invalid".to_string(),
            community: DEFAULT_COMMUNITY.to_string(),
            cache4: Some(vec![entry.clone()]),
            cache6: Some(vec![]),
        };
        assert_eq!(src.get_arp4().unwrap(), vec![entry]);
        assert!(src.get_ndp6().unwrap().is_empty());
        assert_eq!(src.get_all().unwrap().len(), 1);
    }
}
