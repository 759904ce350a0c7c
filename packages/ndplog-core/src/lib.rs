//! ndplog core library
//!
//! This crate provides the working parts of the `ndplog` poller:
//! - Neighbour table acquisition (`ip neigh`/`arp`/`ndp` over a local or
//!   ssh-wrapped shell, the RouterOS management API, SNMP bulk walks)
//! - Configuration file loading
//! - The persistent arplog table (SQLite)
//! - The per-host polling driver with retention cleanup
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use ndplog_core::{config::Config, poll, store::ArpLogStore};
//!
//! fn main() -> anyhow::Result<()> {
//!     let cfg = Config::load(Path::new("/etc/ndplog.conf"))?;
//!     let mut store = ArpLogStore::open(&cfg.db)?;
//!     let report = poll::run(&cfg, &mut store)?;
//!     println!("{} ARP / {} NDP entries logged", report.arp_entries, report.ndp_entries);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod poll;
pub mod source;
pub mod store;

// Re-export commonly used types
pub use config::{Config, ConfigError, DbUrl, HostSpec};
pub use poll::RunReport;
pub use source::{BackendKind, Neighbour, NeighbourSource, SourceError};
pub use store::{ArpLogStore, Sighting, StoreError};
