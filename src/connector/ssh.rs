use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::{ConnectionError, DeviceTarget, Transport};

/// Keyboard-interactive prompt handler that always responds with the password
struct PasswordPrompt {
    password: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.clone()).collect()
    }
}

pub(super) fn resolve(target: &DeviceTarget) -> Result<SocketAddr, ConnectionError> {
    target
        .addr()
        .to_socket_addrs()
        .map_err(|e| ConnectionError::Unreachable(format!("invalid address {}: {}", target.addr(), e)))?
        .next()
        .ok_or_else(|| ConnectionError::Unreachable(format!("no address for {}", target.addr())))
}

pub(super) fn tcp_connect(target: &DeviceTarget, timeout: Duration) -> Result<TcpStream, ConnectionError> {
    let addr = resolve(target)?;
    let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
            ConnectionError::Timeout(format!("{} after {}s", addr, timeout.as_secs()))
        }
        _ => ConnectionError::Unreachable(format!("{}: {}", addr, e)),
    })?;
    tcp.set_read_timeout(Some(timeout)).ok();
    tcp.set_write_timeout(Some(timeout)).ok();
    Ok(tcp)
}

fn millis(d: Duration) -> u32 {
    // libssh2 treats 0 as "wait forever"
    d.as_millis().clamp(1, u32::MAX as u128) as u32
}

/// Interactive shell over SSH (ssh2 / libssh2), with a PTY so devices print
/// prompts and pagination the way they do for a human operator.
pub struct SshTransport {
    session: Option<ssh2::Session>,
    channel: Option<ssh2::Channel>,
}

impl SshTransport {
    pub fn new() -> Self {
        Self {
            session: None,
            channel: None,
        }
    }

    fn channel(&mut self) -> io::Result<&mut ssh2::Channel> {
        self.channel
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "ssh shell not open"))
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SshTransport {
    fn open(&mut self, target: &DeviceTarget, timeout: Duration) -> Result<(), ConnectionError> {
        self.close();
        let tcp = tcp_connect(target, timeout)?;

        let mut session = ssh2::Session::new()
            .map_err(|e| ConnectionError::Unreachable(format!("failed to create SSH session: {}", e)))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(millis(timeout));
        session
            .handshake()
            .map_err(|e| ConnectionError::Unreachable(format!("SSH handshake failed: {}", e)))?;

        // Password first, then keyboard-interactive for devices that only offer that
        let _ = session.userauth_password(&target.username, &target.password);
        if !session.authenticated() {
            let mut prompter = PasswordPrompt {
                password: target.password.clone(),
            };
            let _ = session.userauth_keyboard_interactive(&target.username, &mut prompter);
        }
        if !session.authenticated() {
            return Err(ConnectionError::AuthFailed(format!(
                "{}@{}: all methods exhausted",
                target.username,
                target.addr()
            )));
        }

        let mut channel = session
            .channel_session()
            .map_err(|e| ConnectionError::Unreachable(format!("failed to open channel: {}", e)))?;
        channel
            .request_pty("vt100", None, Some((200, 50, 0, 0)))
            .map_err(|e| ConnectionError::Unreachable(format!("PTY request refused: {}", e)))?;
        channel
            .shell()
            .map_err(|e| ConnectionError::Unreachable(format!("shell request refused: {}", e)))?;

        self.session = Some(session);
        self.channel = Some(channel);
        Ok(())
    }

    fn send(&mut self, data: &str) -> io::Result<()> {
        let channel = self.channel()?;
        channel.write_all(data.as_bytes())?;
        channel.flush()
    }

    fn recv(&mut self, wait: Duration) -> io::Result<Option<String>> {
        if let Some(session) = &self.session {
            session.set_timeout(millis(wait));
        }
        let channel = self.channel()?;
        let mut buf = [0u8; 8192];
        match channel.read(&mut buf) {
            Ok(0) if channel.eof() => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "device closed the session")),
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(String::from_utf8_lossy(&buf[..n]).into_owned())),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            let _ = channel.close();
        }
        if let Some(session) = self.session.take() {
            let _ = session.disconnect(None, "closing", None);
        }
    }
}
