use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use super::ssh::tcp_connect;
use super::{ConnectionError, DeviceTarget, Transport};

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

/// Split raw telnet bytes into printable data and the refusals owed to the
/// peer for each option it proposed.
fn strip_negotiation(raw: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut data = Vec::with_capacity(raw.len());
    let mut replies = Vec::new();
    let mut i = 0;
    while i < raw.len() {
        if raw[i] != IAC {
            data.push(raw[i]);
            i += 1;
            continue;
        }
        match raw.get(i + 1).copied() {
            Some(IAC) => {
                data.push(IAC);
                i += 2;
            }
            Some(DO) | Some(DONT) => {
                if let Some(opt) = raw.get(i + 2) {
                    replies.extend_from_slice(&[IAC, WONT, *opt]);
                }
                i += 3;
            }
            Some(WILL) | Some(WONT) => {
                if let Some(opt) = raw.get(i + 2) {
                    replies.extend_from_slice(&[IAC, DONT, *opt]);
                }
                i += 3;
            }
            Some(SB) => {
                // skip to IAC SE
                let end = raw[i..].windows(2).position(|w| w == [IAC, SE]);
                i = end.map(|p| i + p + 2).unwrap_or(raw.len());
            }
            _ => i += 2,
        }
    }
    (data, replies)
}

/// Plain TCP CLI session for devices that only speak telnet.
pub struct TelnetTransport {
    stream: Option<TcpStream>,
}

impl TelnetTransport {
    pub fn new() -> Self {
        Self { stream: None }
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "telnet session not open"))
    }

    /// Read until one of `needles` appears (case-insensitive) or the deadline passes.
    fn read_until(&mut self, needles: &[&str], deadline: Instant) -> io::Result<Option<String>> {
        let mut seen = String::new();
        while Instant::now() < deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Some(chunk) = self.recv(remaining.min(Duration::from_millis(500)))? {
                seen.push_str(&chunk);
                let lower = seen.to_lowercase();
                if needles.iter().any(|n| lower.contains(n)) {
                    return Ok(Some(seen));
                }
            }
        }
        Ok(None)
    }

    fn login(&mut self, target: &DeviceTarget, timeout: Duration) -> Result<(), ConnectionError> {
        let deadline = Instant::now() + timeout;
        let io_err = |e: io::Error| ConnectionError::Unreachable(format!("{}: {}", target.addr(), e));
        let timed_out = || ConnectionError::Timeout(format!("{} login prompt", target.addr()));

        let first = self
            .read_until(&["login:", "username:", "password:"], deadline)
            .map_err(io_err)?
            .ok_or_else(timed_out)?;
        if !first.to_lowercase().contains("password:") {
            self.send(&format!("{}\r\n", target.username)).map_err(io_err)?;
            self.read_until(&["password:"], deadline)
                .map_err(io_err)?
                .ok_or_else(timed_out)?;
        }
        self.send(&format!("{}\r\n", target.password)).map_err(io_err)?;

        let banner = self
            .read_until(&[">", "#", "]", "fail", "incorrect", "denied", "login:"], deadline)
            .map_err(io_err)?
            .ok_or_else(timed_out)?
            .to_lowercase();
        if ["fail", "incorrect", "denied", "login:"].iter().any(|m| banner.contains(m)) {
            return Err(ConnectionError::AuthFailed(format!("{}@{}", target.username, target.addr())));
        }
        Ok(())
    }
}

impl Default for TelnetTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for TelnetTransport {
    fn open(&mut self, target: &DeviceTarget, timeout: Duration) -> Result<(), ConnectionError> {
        self.close();
        self.stream = Some(tcp_connect(target, timeout)?);
        let result = self.login(target, timeout);
        if result.is_err() {
            self.close();
        }
        result
    }

    fn send(&mut self, data: &str) -> io::Result<()> {
        let stream = self.stream()?;
        stream.write_all(data.replace('\n', "\r\n").replace("\r\r\n", "\r\n").as_bytes())?;
        stream.flush()
    }

    fn recv(&mut self, wait: Duration) -> io::Result<Option<String>> {
        let stream = self.stream()?;
        stream.set_read_timeout(Some(wait.max(Duration::from_millis(1))))?;
        let mut buf = [0u8; 4096];
        let n = match stream.read(&mut buf) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "device closed the session")),
            Ok(n) => n,
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => return Ok(None),
            Err(e) => return Err(e),
        };
        let (data, replies) = strip_negotiation(&buf[..n]);
        if !replies.is_empty() {
            stream.write_all(&replies)?;
        }
        if data.is_empty() {
            // negotiation only; report activity so callers keep reading
            return Ok(Some(String::new()));
        }
        Ok(Some(String::from_utf8_lossy(&data).into_owned()))
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}
