//! RouterOS management API backend.
//!
//! Talks to a MikroTik router over the api-ssl service (port 8729) and
//! fetches `/ip/arp/print` and `/ipv6/neighbor/print`. The API frames
//! length-prefixed words into sentences; replies are `!re` rows terminated
//! by `!done`, with attributes carried as `=key=value` words.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;

use native_tls::{TlsConnector, TlsStream};

use super::{Neighbour, NeighbourSource, SourceError};

const API_SSL_PORT: u16 = 8729;
const DEFAULT_USERNAME: &str = "admin";

/// Neighbour source backed by the RouterOS management API.
///
/// The host string may carry credentials as `user:pass@host`; a credential
/// part without a `:` is a bare username with an empty password. Without
/// credentials the default `admin` account with an empty password is used.
pub struct RouterOsSource {
    host: String,
    username: String,
    password: String,
    session: Option<ApiSession>,
}

impl RouterOsSource {
    pub fn new(host: &str) -> Self {
        let (username, password, host) = split_credentials(host);
        RouterOsSource {
            host: host.to_string(),
            username,
            password,
            session: None,
        }
    }

    fn session(&mut self) -> Result<&mut ApiSession, SourceError> {
        if self.session.is_none() {
            let mut session = ApiSession::connect(&self.host)?;
            session.login(&self.username, &self.password)?;
            self.session = Some(session);
        }
        Ok(self.session.as_mut().unwrap())
    }

    fn fetch(&mut self, command: &str) -> Result<Vec<Neighbour>, SourceError> {
        let rows = self.session()?.talk(command)?;
        Ok(rows_to_neighbours(rows))
    }
}

impl NeighbourSource for RouterOsSource {
    fn get_arp4(&mut self) -> Result<Vec<Neighbour>, SourceError> {
        self.fetch("/ip/arp/print")
    }

    fn get_ndp6(&mut self) -> Result<Vec<Neighbour>, SourceError> {
        self.fetch("/ipv6/neighbor/print")
    }
}

/// Split an optional `user:pass@` prefix off a host string.
fn split_credentials(host: &str) -> (String, String, &str) {
    match host.rsplit_once('@') {
        Some((cred, host)) => match cred.split_once(':') {
            Some((user, pass)) => (user.to_string(), pass.to_string(), host),
            None => (cred.to_string(), String::new(), host),
        },
        None => (DEFAULT_USERNAME.to_string(), String::new(), host),
    }
}

/// Keep the reply rows that carry a hardware address.
fn rows_to_neighbours(rows: Vec<HashMap<String, String>>) -> Vec<Neighbour> {
    rows.into_iter()
        .filter_map(|mut row| {
            let mac = row.remove("mac-address")?;
            let ip = row.remove("address")?;
            Some(Neighbour {
                ip,
                mac,
                dev: row.remove("interface"),
            })
        })
        .collect()
}

/// An authenticated API connection.
struct ApiSession {
    stream: TlsStream<TcpStream>,
}

impl ApiSession {
    fn connect(host: &str) -> Result<Self, SourceError> {
        // Routers almost always run with a self-signed api-ssl certificate.
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| SourceError::Api(format!("tls setup: {e}")))?;

        let tcp = TcpStream::connect((host, API_SSL_PORT))?;
        let stream = connector
            .connect(host, tcp)
            .map_err(|e| SourceError::Api(format!("tls handshake with {host}: {e}")))?;
        Ok(ApiSession { stream })
    }

    fn login(&mut self, username: &str, password: &str) -> Result<(), SourceError> {
        let name = format!("=name={username}");
        let pass = format!("=password={password}");
        self.write_sentence(&["/login", &name, &pass])?;

        loop {
            let reply = self.read_sentence()?;
            match reply.first().map(String::as_str) {
                Some("!done") => return Ok(()),
                Some("!trap") | Some("!fatal") => {
                    return Err(SourceError::Api(format!(
                        "login failed: {}",
                        trap_message(&reply)
                    )));
                }
                _ => continue,
            }
        }
    }

    /// Send one command and collect every `!re` reply into an attribute map.
    fn talk(&mut self, command: &str) -> Result<Vec<HashMap<String, String>>, SourceError> {
        self.write_sentence(&[command])?;

        let mut rows = Vec::new();
        loop {
            let reply = self.read_sentence()?;
            match reply.first().map(String::as_str) {
                Some("!re") => rows.push(sentence_attributes(&reply)),
                Some("!done") => return Ok(rows),
                Some("!trap") | Some("!fatal") => {
                    return Err(SourceError::Api(format!(
                        "{command} failed: {}",
                        trap_message(&reply)
                    )));
                }
                Some(other) => {
                    return Err(SourceError::Api(format!("unexpected reply word {other:?}")));
                }
                None => {
                    return Err(SourceError::Api("connection closed mid-reply".to_string()));
                }
            }
        }
    }

    fn write_sentence(&mut self, words: &[&str]) -> Result<(), SourceError> {
        let mut buf = Vec::new();
        for word in words {
            buf.extend_from_slice(&encode_length(word.len() as u32));
            buf.extend_from_slice(word.as_bytes());
        }
        buf.push(0); // empty word terminates the sentence
        self.stream.write_all(&buf)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_sentence(&mut self) -> Result<Vec<String>, SourceError> {
        let mut words = Vec::new();
        loop {
            let len = decode_length(&mut self.stream)?;
            if len == 0 {
                return Ok(words);
            }
            let mut word = vec![0u8; len as usize];
            self.stream.read_exact(&mut word)?;
            words.push(String::from_utf8_lossy(&word).into_owned());
        }
    }
}

/// Collect the `=key=value` words of a reply sentence.
fn sentence_attributes(words: &[String]) -> HashMap<String, String> {
    words
        .iter()
        .filter_map(|w| w.strip_prefix('='))
        .filter_map(|w| w.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn trap_message(words: &[String]) -> String {
    sentence_attributes(words)
        .remove("message")
        .unwrap_or_else(|| "unknown error".to_string())
}

/// Encode a word length the way the API expects.
fn encode_length(len: u32) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else if len < 0x4000 {
        (len | 0x8000).to_be_bytes()[2..].to_vec()
    } else if len < 0x20_0000 {
        (len | 0xC0_0000).to_be_bytes()[1..].to_vec()
    } else if len < 0x1000_0000 {
        (len | 0xE000_0000).to_be_bytes().to_vec()
    } else {
        let mut buf = vec![0xF0];
        buf.extend_from_slice(&len.to_be_bytes());
        buf
    }
}

/// Decode a word length from the stream.
fn decode_length(reader: &mut impl Read) -> Result<u32, SourceError> {
    let first = read_byte(reader)? as u32;
    let (extra, base) = if first & 0x80 == 0 {
        return Ok(first);
    } else if first & 0xC0 == 0x80 {
        (1, first & 0x3F)
    } else if first & 0xE0 == 0xC0 {
        (2, first & 0x1F)
    } else if first & 0xF0 == 0xE0 {
        (3, first & 0x0F)
    } else {
        (4, 0)
    };

    let mut len = base;
    for _ in 0..extra {
        len = (len << 8) | read_byte(reader)? as u32;
    }
    Ok(len)
}

fn read_byte(reader: &mut impl Read) -> Result<u8, SourceError> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}
