//! Neighbour table acquisition.
//!
//! A `NeighbourSource` is one way of reading a device's ARP/NDP caches:
//! - shelling out to `ip`/`arp`/`ndp`/`netstat`, locally or over ssh
//! - the RouterOS management API
//! - an SNMP bulk walk of IP-MIB
//!
//! All backends normalize their output into the same `Neighbour` record.

mod routeros;
mod shell;
mod snmp;

pub use routeros::RouterOsSource;
pub use shell::{BsdSource, LinuxJsonSource, LinuxSource, SolarisSource};
pub use snmp::SnmpSource;

use std::fmt;
use std::io;
use std::process::ExitStatus;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::HostSpec;

/// One entry of a device's neighbour cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbour {
    pub ip: String,
    pub mac: String,
    /// Interface the entry was learned on, when the backend reports one.
    pub dev: Option<String>,
}

/// Errors raised while acquiring a neighbour table.
///
/// All of these are per-host: the polling driver logs them, counts the host
/// as failed and moves on.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: io::Error,
    },

    #[error("command {command} exited with {status}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
    },

    #[error("router api: {0}")]
    Api(String),

    #[error("unknown backend {0:?}")]
    UnknownBackend(String),

    #[error("unparseable json neighbour dump: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A source of neighbour-cache entries for one device.
pub trait NeighbourSource {
    /// Enumerate the IPv4 ARP cache.
    fn get_arp4(&mut self) -> Result<Vec<Neighbour>, SourceError>;

    /// Enumerate the IPv6 neighbour cache.
    fn get_ndp6(&mut self) -> Result<Vec<Neighbour>, SourceError>;

    /// Both address families, IPv4 first.
    fn get_all(&mut self) -> Result<Vec<Neighbour>, SourceError> {
        let mut all = self.get_arp4()?;
        all.extend(self.get_ndp6()?);
        Ok(all)
    }
}

/// The supported acquisition backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// `ip -4/-6 neigh`, plain line output
    Linux,
    /// `ip -json -4/-6 neigh`
    LinuxJson,
    /// `arp -na` / `ndp -na`
    Bsd,
    /// `arp -na` / `netstat -npf inet6`
    Solaris,
    /// RouterOS management API over TLS
    RouterOs,
    /// `snmpbulkwalk` of IF-MIB / IP-MIB
    Snmp,
}

impl FromStr for BackendKind {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux" => Ok(BackendKind::Linux),
            "linux-json" => Ok(BackendKind::LinuxJson),
            "bsd" => Ok(BackendKind::Bsd),
            "solaris" => Ok(BackendKind::Solaris),
            "routeros" => Ok(BackendKind::RouterOs),
            "snmp" => Ok(BackendKind::Snmp),
            other => Err(SourceError::UnknownBackend(other.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Linux => "linux",
            BackendKind::LinuxJson => "linux-json",
            BackendKind::Bsd => "bsd",
            BackendKind::Solaris => "solaris",
            BackendKind::RouterOs => "routeros",
            BackendKind::Snmp => "snmp",
        };
        f.write_str(name)
    }
}

/// Build the source matching a configured host entry.
pub fn open_source(spec: &HostSpec) -> Result<Box<dyn NeighbourSource>, SourceError> {
    let kind: BackendKind = spec.backend.parse()?;
    let host = spec.host.as_str();
    Ok(match kind {
        BackendKind::Linux => Box::new(LinuxSource::new(host)),
        BackendKind::LinuxJson => Box::new(LinuxJsonSource::new(host)),
        BackendKind::Bsd => Box::new(BsdSource::new(host)),
        BackendKind::Solaris => Box::new(SolarisSource::new(host)),
        BackendKind::RouterOs => Box::new(RouterOsSource::new(host)),
        BackendKind::Snmp => Box::new(SnmpSource::new(host, spec.args.first().map(String::as_str))),
    })
}

/// Canonicalize a hardware address to lowercase, colon-separated,
/// zero-padded octets. Returns `None` when any part fails to parse as hex,
/// so garbage entries can be skipped rather than stored.
pub fn canon_mac(mac: &str) -> Option<String> {
    let mut octets = Vec::new();
    for part in mac.split(':') {
        if part.is_empty() || part.len() > 2 {
            return None;
        }
        let octet = u8::from_str_radix(part, 16).ok()?;
        octets.push(format!("{octet:02x}"));
    }
    if octets.len() < 2 {
        return None;
    }
    Some(octets.join(":"))
}
