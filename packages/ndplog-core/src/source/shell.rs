//! Command-line neighbour table backends.
//!
//! These backends read the neighbour caches the same way an administrator
//! would: by running `ip neigh`, `arp -na`, `ndp -na` or `netstat`, either
//! locally or wrapped in `ssh HOST '...'` for remote devices, and parsing
//! the line output.

use std::process::Command;

use serde::Deserialize;

use super::{Neighbour, NeighbourSource, SourceError};

/// Runs a command locally, or remotely over ssh when a host is set.
///
/// A host of `""` or `"-"` means the local machine.
struct CommandRunner {
    host: Option<String>,
}

impl CommandRunner {
    fn new(host: &str) -> Self {
        let host = match host {
            "" | "-" => None,
            h => Some(h.to_string()),
        };
        CommandRunner { host }
    }

    /// Run `args` and return its stdout. Non-zero exit is an error even if
    /// the command produced output.
    fn run(&self, args: &[&str]) -> Result<String, SourceError> {
        let display = args.join(" ");

        let output = match &self.host {
            Some(host) => Command::new("ssh")
                .arg(host)
                .arg(shell_join(args))
                .output(),
            None => Command::new(args[0]).args(&args[1..]).output(),
        }
        .map_err(|source| SourceError::Spawn {
            command: display.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(SourceError::CommandFailed {
                command: display,
                status: output.status,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Quote a single argument for the remote shell.
fn shell_escape(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Join arguments into one command string safe to pass through ssh.
fn shell_join(args: &[&str]) -> String {
    args.iter()
        .map(|a| shell_escape(a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `ip neigh` backend for Linux hosts.
pub struct LinuxSource {
    runner: CommandRunner,
}

impl LinuxSource {
    pub fn new(host: &str) -> Self {
        LinuxSource {
            runner: CommandRunner::new(host),
        }
    }
}

impl NeighbourSource for LinuxSource {
    fn get_arp4(&mut self) -> Result<Vec<Neighbour>, SourceError> {
        Ok(parse_ip_neigh(&self.runner.run(&["ip", "-4", "neigh"])?))
    }

    fn get_ndp6(&mut self) -> Result<Vec<Neighbour>, SourceError> {
        Ok(parse_ip_neigh(&self.runner.run(&["ip", "-6", "neigh"])?))
    }
}

/// `ip -json neigh` backend for Linux hosts with a recent iproute2.
pub struct LinuxJsonSource {
    runner: CommandRunner,
}

impl LinuxJsonSource {
    pub fn new(host: &str) -> Self {
        LinuxJsonSource {
            runner: CommandRunner::new(host),
        }
    }
}

impl NeighbourSource for LinuxJsonSource {
    fn get_arp4(&mut self) -> Result<Vec<Neighbour>, SourceError> {
        parse_ip_neigh_json(&self.runner.run(&["ip", "-json", "-4", "neigh"])?)
    }

    fn get_ndp6(&mut self) -> Result<Vec<Neighbour>, SourceError> {
        parse_ip_neigh_json(&self.runner.run(&["ip", "-json", "-6", "neigh"])?)
    }
}

/// `arp -na` / `ndp -na` backend for FreeBSD hosts.
pub struct BsdSource {
    runner: CommandRunner,
}

impl BsdSource {
    pub fn new(host: &str) -> Self {
        BsdSource {
            runner: CommandRunner::new(host),
        }
    }
}

impl NeighbourSource for BsdSource {
    fn get_arp4(&mut self) -> Result<Vec<Neighbour>, SourceError> {
        Ok(parse_bsd_arp(&self.runner.run(&["arp", "-na"])?))
    }

    fn get_ndp6(&mut self) -> Result<Vec<Neighbour>, SourceError> {
        Ok(parse_bsd_ndp(&self.runner.run(&["ndp", "-na"])?))
    }
}

/// `arp -na` / `netstat -npf inet6` backend for Solaris hosts.
pub struct SolarisSource {
    runner: CommandRunner,
}

impl SolarisSource {
    pub fn new(host: &str) -> Self {
        SolarisSource {
            runner: CommandRunner::new(host),
        }
    }
}

impl NeighbourSource for SolarisSource {
    fn get_arp4(&mut self) -> Result<Vec<Neighbour>, SourceError> {
        Ok(parse_solaris_arp(&self.runner.run(&["arp", "-na"])?))
    }

    fn get_ndp6(&mut self) -> Result<Vec<Neighbour>, SourceError> {
        Ok(parse_solaris_ndp(
            &self.runner.run(&["netstat", "-npf", "inet6"])?,
        ))
    }
}

/// Parse `ip neigh` line output.
///
/// Lines look like `192.0.2.5 dev eth0 lladdr aa:bb:cc:00:11:22 REACHABLE`;
/// entries without an lladdr (FAILED, incomplete) are skipped.
fn parse_ip_neigh(output: &str) -> Vec<Neighbour> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let mut ip = None;
        let mut mac = None;
        let mut dev = None;
        let mut i = 0;
        while i < tokens.len() {
            match (i, tokens[i]) {
                (0, t) => ip = Some(t),
                (_, "dev") => {
                    dev = tokens.get(i + 1).copied();
                    i += 1;
                }
                (_, "lladdr") => {
                    mac = tokens.get(i + 1).copied();
                    i += 1;
                }
                _ => {}
            }
            i += 1;
        }
        if let (Some(ip), Some(mac)) = (ip, mac) {
            entries.push(Neighbour {
                ip: ip.to_string(),
                mac: mac.to_string(),
                dev: dev.map(str::to_string),
            });
        }
    }
    entries
}

#[derive(Deserialize)]
struct IpNeighRow {
    dst: Option<String>,
    lladdr: Option<String>,
    dev: Option<String>,
}

/// Parse `ip -json neigh` output: a flat array of neighbour objects.
fn parse_ip_neigh_json(output: &str) -> Result<Vec<Neighbour>, SourceError> {
    let rows: Vec<IpNeighRow> = serde_json::from_str(output)?;
    Ok(rows
        .into_iter()
        .filter_map(|row| match (row.dst, row.lladdr) {
            (Some(ip), Some(mac)) => Some(Neighbour {
                ip,
                mac,
                dev: row.dev,
            }),
            _ => None,
        })
        .collect())
}

/// Parse FreeBSD `arp -na` output.
///
/// Rows look like `? (192.0.2.1) at aa:bb:cc:00:11:22 on em0 expires ...`.
/// Unresolved entries show `(incomplete)` in the hardware column.
fn parse_bsd_arp(output: &str) -> Vec<Neighbour> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 6 {
            continue;
        }
        if tokens[3] == "(incomplete)" {
            continue;
        }
        if tokens[0] != "?" || tokens[2] != "at" || tokens[4] != "on" {
            continue;
        }
        entries.push(Neighbour {
            ip: tokens[1]
                .trim_start_matches('(')
                .trim_end_matches(')')
                .to_string(),
            mac: tokens[3].to_string(),
            dev: Some(tokens[5].to_string()),
        });
    }
    entries
}

/// Parse FreeBSD `ndp -na` output: a `Neighbor ...` header row, then
/// `IP MAC DEV ...` rows.
fn parse_bsd_ndp(output: &str) -> Vec<Neighbour> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 || tokens[0] == "Neighbor" {
            continue;
        }
        if !tokens[0].contains(':') {
            continue;
        }
        entries.push(Neighbour {
            ip: tokens[0].to_string(),
            mac: tokens[1].to_string(),
            dev: Some(tokens[2].to_string()),
        });
    }
    entries
}

/// Parse Solaris `arp -na` output. The table header ends with a dashed
/// rule; data rows are `DEV IP ... MAC` with the hardware address in the
/// fourth or fifth column depending on the flags column.
fn parse_solaris_arp(output: &str) -> Vec<Neighbour> {
    let mut entries = Vec::new();
    let mut header = true;
    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if header {
            if tokens[0].starts_with('-') {
                header = false;
            }
            continue;
        }
        let mac = match (tokens.get(3), tokens.get(4)) {
            (Some(t), _) if t.contains(':') => t,
            (_, Some(t)) if t.contains(':') => t,
            _ => continue,
        };
        entries.push(Neighbour {
            ip: tokens[1].to_string(),
            mac: mac.to_string(),
            dev: Some(tokens[0].to_string()),
        });
    }
    entries
}

/// Parse Solaris `netstat -npf inet6` output: dashed header rule, then
/// `DEV MAC ... IP` rows with the address in the fifth column.
fn parse_solaris_ndp(output: &str) -> Vec<Neighbour> {
    let mut entries = Vec::new();
    let mut header = true;
    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if header {
            if tokens[0].starts_with('-') {
                header = false;
            }
            continue;
        }
        if tokens.len() < 5 {
            continue;
        }
        entries.push(Neighbour {
            ip: tokens[4].to_string(),
            mac: tokens[1].to_string(),
            dev: Some(tokens[0].to_string()),
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(ip: &str, mac: &str, dev: &str) -> Neighbour {
        Neighbour {
            ip: ip.to_string(),
            mac: mac.to_string(),
            dev: Some(dev.to_string()),
        }
    }

    #[test]
    fn test_parse_ip_neigh() {
        let output = "\
192.0.2.5 dev eth0 lladdr aa:bb:cc:00:11:22 REACHABLE
192.0.2.9 dev eth0  FAILED
fe80::1 dev br0 lladdr 00:11:22:33:44:55 router STALE
192.0.2.7 dev eth1 lladdr de:ad:be:ef:00:01 STALE
";
        assert_eq!(
            parse_ip_neigh(output),
            vec![
                n("192.0.2.5", "aa:bb:cc:00:11:22", "eth0"),
                n("fe80::1", "00:11:22:33:44:55", "br0"),
                n("192.0.2.7", "de:ad:be:ef:00:01", "eth1"),
            ]
        );
    }

    #[test]
    fn test_parse_ip_neigh_empty() {
        assert!(parse_ip_neigh("").is_empty());
    }

    #[test]
    fn test_parse_ip_neigh_json() {
        let output = r#"[
            {"dst": "192.0.2.5", "dev": "eth0", "lladdr": "aa:bb:cc:00:11:22", "state": ["REACHABLE"]},
            {"dst": "192.0.2.9", "dev": "eth0", "state": ["FAILED"]},
            {"dst": "2001:db8::1", "dev": "eth0", "lladdr": "00:11:22:33:44:55", "state": ["STALE"]}
        ]"#;
        assert_eq!(
            parse_ip_neigh_json(output).unwrap(),
            vec![
                n("192.0.2.5", "aa:bb:cc:00:11:22", "eth0"),
                n("2001:db8::1", "00:11:22:33:44:55", "eth0"),
            ]
        );
    }

    #[test]
    fn test_parse_ip_neigh_json_garbage() {
        assert!(parse_ip_neigh_json("not json").is_err());
    }

    #[test]
    fn test_parse_bsd_arp() {
        let output = "\
? (192.0.2.1) at aa:bb:cc:00:11:22 on em0 expires in 1193 seconds [ethernet]
? (192.0.2.2) at (incomplete) on em0 expired [ethernet]
? (192.0.2.3) at de:ad:be:ef:00:01 on em1 permanent [ethernet]
";
        assert_eq!(
            parse_bsd_arp(output),
            vec![
                n("192.0.2.1", "aa:bb:cc:00:11:22", "em0"),
                n("192.0.2.3", "de:ad:be:ef:00:01", "em1"),
            ]
        );
    }

    #[test]
    fn test_parse_bsd_ndp() {
        let output = "\
Neighbor                             Linklayer Address  Netif Expire    S Flags
2001:db8::1                          aa:bb:cc:00:11:22    em0 23h59m58s S R
fe80::2%em0                          de:ad:be:ef:00:01    em0 permanent R
";
        assert_eq!(
            parse_bsd_ndp(output),
            vec![
                n("2001:db8::1", "aa:bb:cc:00:11:22", "em0"),
                n("fe80::2%em0", "de:ad:be:ef:00:01", "em0"),
            ]
        );
    }

    #[test]
    fn test_parse_solaris_arp() {
        let output = "\
Net to Media Table: IPv4
Device   IP Address               Mask      Flags      Phys Addr
------ -------------------- --------------- -------- ---------------
net0   192.0.2.1            255.255.255.255 o        aa:bb:cc:00:11:22
net0   192.0.2.44           255.255.255.255 SPLA     de:ad:be:ef:00:01
";
        assert_eq!(
            parse_solaris_arp(output),
            vec![
                n("192.0.2.1", "aa:bb:cc:00:11:22", "net0"),
                n("192.0.2.44", "de:ad:be:ef:00:01", "net0"),
            ]
        );
    }

    #[test]
    fn test_parse_solaris_ndp() {
        let output = "\
Net to Media Table: IPv6
 If   Physical Address   Type     State      Destination/Mask
----- -----------------  ------- ------------ ---------------------------
net0  aa:bb:cc:00:11:22  dynamic REACHABLE    2001:db8::1
net0  de:ad:be:ef:00:01  local   REACHABLE    fe80::2
";
        assert_eq!(
            parse_solaris_ndp(output),
            vec![
                n("2001:db8::1", "aa:bb:cc:00:11:22", "net0"),
                n("fe80::2", "de:ad:be:ef:00:01", "net0"),
            ]
        );
    }

    #[test]
    fn test_shell_join_quotes() {
        assert_eq!(shell_join(&["ip", "-4", "neigh"]), "'ip' '-4' 'neigh'");
        assert_eq!(shell_escape("it's"), r"'it'\''s'");
    }
}
