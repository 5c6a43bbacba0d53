mod parser;
mod protocol;

use super::{Config, Credentials, Error, Logger, Result, Server, ServerMeta, Support};
use crate::probe::{Transport, TransportError};
use log::trace;
use protocol::{get_auth_login, AuthMech, Command, EhloLine, Line, StatusCode};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::{OwnedTrustAnchor, RootCertStore};

type TlsCon = rustls::ClientConnection;

fn create_tls_config<I>(anchors: I) -> Result<Arc<rustls::ClientConfig>>
where
    I: IntoIterator<Item = OwnedTrustAnchor>,
{
    let mut root_store = RootCertStore::empty();
    root_store.add_trust_anchors(anchors.into_iter());
    if root_store.is_empty() {
        return Err(Error::ProviderUnavailable(
            "no trust anchors available for STARTTLS".to_string(),
        ));
    }
    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

fn webpki_anchors() -> impl Iterator<Item = OwnedTrustAnchor> {
    webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            ta.subject,
            ta.spki,
            ta.name_constraints,
        )
    })
}

fn stream_recv_reply<T>(stream: &mut T, logger: &mut impl Logger) -> Result<Vec<Line>>
where
    T: Read,
{
    let mut parser = parser::Parser::new(stream, logger);
    parser.recv_reply()
}
fn stream_recv_line<T>(stream: &mut T, logger: &mut impl Logger) -> Result<Line>
where
    T: Read,
{
    let mut parser = parser::Parser::new(stream, logger);
    let line = parser.recv_line()?;
    if !line.last() {
        parser.recv_reply()?;
    }
    Ok(line)
}

/// Blocking SMTP transport. The handle lives for the whole process; each
/// [`Transport::connect`] opens a fresh session and [`Transport::close`]
/// ends it with QUIT.
pub struct SmtpTransport<L>
where
    L: Logger,
{
    config: Config,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    server: Server,
    tlscon: Option<TlsCon>,
    stream: Option<TcpStream>,
    logger: L,
}

impl<L> SmtpTransport<L>
where
    L: Logger,
{
    pub fn new(config: Config, logger: L) -> Result<SmtpTransport<L>> {
        SmtpTransport::with_trust_anchors(config, logger, webpki_anchors())
    }

    /// Like [`SmtpTransport::new`], verifying STARTTLS peers against `anchors`
    /// instead of the bundled web PKI roots.
    pub fn with_trust_anchors<I>(config: Config, logger: L, anchors: I) -> Result<SmtpTransport<L>>
    where
        I: IntoIterator<Item = OwnedTrustAnchor>,
    {
        let tls_config = if config.uses_starttls() {
            Some(create_tls_config(anchors)?)
        } else {
            None
        };
        Ok(SmtpTransport {
            config,
            tls_config,
            server: Server::new(String::new(), 0),
            tlscon: None,
            stream: None,
            logger,
        })
    }

    pub fn logger(&self) -> &L {
        &self.logger
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn recv_reply(&mut self) -> Result<Vec<Line>> {
        let stream = self.stream.as_mut().ok_or(Error::Network)?;
        let lines = match self.tlscon.as_mut() {
            Some(tlscon) => {
                stream_recv_reply(&mut rustls::Stream::new(tlscon, stream), &mut self.logger)
            }
            None => stream_recv_reply(stream, &mut self.logger),
        }?;
        if lines.iter().any(Line::closes_session) {
            self.terminate();
            return Err(Error::ServerUnavailable);
        }
        Ok(lines)
    }
    fn recv_line(&mut self) -> Result<Line> {
        let stream = self.stream.as_mut().ok_or(Error::Network)?;
        let line = match self.tlscon.as_mut() {
            Some(tlscon) => {
                stream_recv_line(&mut rustls::Stream::new(tlscon, stream), &mut self.logger)
            }
            None => stream_recv_line(stream, &mut self.logger),
        }?;
        if line.closes_session() {
            self.terminate();
            Err(Error::ServerUnavailable)
        } else {
            Ok(line)
        }
    }
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.logger.client(data);
        let stream = self.stream.as_mut().ok_or(Error::Network)?;
        match self.tlscon.as_mut() {
            Some(tlscon) => rustls::Stream::new(tlscon, stream).write_all(data),
            None => stream.write_all(data),
        }
        .map_err(|_| Error::Network)
    }
    fn send(&mut self, cmd: Command) -> Result<()> {
        self.write(cmd.to_string().as_bytes())
    }
    /// Sends credentials without passing them to the wire logger.
    fn send_secret(&mut self, data: &[u8]) -> Result<()> {
        self.logger.disable();
        let result = self.write(data);
        self.logger.enable();
        result
    }

    fn address_resolve(&self) -> Result<SocketAddr> {
        (self.server.address(), self.server.port())
            .to_socket_addrs()
            .map_err(|_| Error::Dns)?
            .next()
            .ok_or(Error::Dns)
    }

    fn init_connection(&mut self) -> Result<()> {
        let address = self.address_resolve()?;
        trace!("connecting to {}", address);

        let timeout = self.config.timeout_secs().map(Duration::from_secs);
        let client = match timeout {
            Some(t) => TcpStream::connect_timeout(&address, t),
            None => TcpStream::connect(address),
        }
        .map_err(|_| Error::ServerUnreachable)?;
        client.set_read_timeout(timeout).map_err(|_| Error::Network)?;
        client.set_write_timeout(timeout).map_err(|_| Error::Network)?;
        self.stream = Some(client);

        let rep = self.recv_line().map_err(|_| Error::InvalidServer)?;
        rep.expect(StatusCode::ServiceReady)
    }

    fn handshake(&mut self) -> Result<()> {
        self.send(Command::Ehlo(self.config.name.clone()))?;
        let rep = self.recv_reply()?;
        self.server.meta.tls = Support::NotSupported;
        self.server.meta.auth_plain = Support::NotSupported;
        self.server.meta.auth_login = Support::NotSupported;

        if !rep.iter().all(|l| l.is(StatusCode::Okay)) {
            trace!("EHLO refused, falling back to HELO");
            return self.helo();
        }
        for l in rep.iter() {
            let text = l.text().to_uppercase();
            let mut words = text.split(' ');
            match words.next() {
                Some(w) if w == EhloLine::StartTls.to_string() => {
                    self.server.meta.tls = Support::Supported;
                }
                Some(w) if w == EhloLine::Auth.to_string() => {
                    for mech in words {
                        if mech == AuthMech::Plain.to_string() {
                            self.server.meta.auth_plain = Support::Supported;
                        } else if mech == AuthMech::Login.to_string() {
                            self.server.meta.auth_login = Support::Supported;
                        }
                    }
                }
                _ => (),
            }
        }
        trace!("server capabilities: {:?}", self.server.meta);
        Ok(())
    }

    /// Plain SMTP greeting: no extensions, so no STARTTLS and no AUTH.
    fn helo(&mut self) -> Result<()> {
        self.send(Command::Helo(self.config.name.clone()))?;
        let rep = self.recv_reply()?;
        match rep.last() {
            Some(line) => line.expect(StatusCode::Okay),
            None => Err(Error::Protocol),
        }
    }

    fn start_tls(&mut self) -> Result<()> {
        self.send(Command::StartTls)?;
        self.recv_line()?.expect(StatusCode::ServiceReady)?;

        let tls_config = self
            .tls_config
            .clone()
            .ok_or_else(|| Error::Tls("STARTTLS is not enabled".to_string()))?;
        let name = rustls::ServerName::try_from(self.server.address())
            .map_err(|e| Error::Tls(e.to_string()))?;
        let mut con = TlsCon::new(tls_config, name).map_err(|e| Error::Tls(e.to_string()))?;
        let stream = self.stream.as_mut().ok_or(Error::Network)?;
        while con.is_handshaking() {
            con.complete_io(stream)
                .map_err(|e| Error::Tls(e.to_string()))?;
        }
        self.tlscon = Some(con);
        Ok(())
    }

    /// Any reply other than 235 is a rejection of the credentials.
    fn reply_auth_result(&mut self) -> Result<()> {
        let line = self.recv_line()?;
        if line.is(StatusCode::AuthSuccess) {
            Ok(())
        } else {
            trace!("credentials rejected: {} {}", line.code(), line.text());
            Err(Error::InvalidCred)
        }
    }
    fn challenge(&mut self) -> Result<()> {
        if self.recv_line()?.is(StatusCode::ServerChallenge) {
            Ok(())
        } else {
            Err(Error::InvalidCred)
        }
    }
    fn auth_plain(&mut self, credentials: &Credentials) -> Result<()> {
        trace!("authenticating with PLAIN");
        let cmd = Command::AuthPlain(credentials.username.clone(), credentials.password.clone());
        self.send_secret(cmd.to_string().as_bytes())?;
        self.reply_auth_result()
    }
    fn auth_login(&mut self, credentials: &Credentials) -> Result<()> {
        trace!("authenticating with LOGIN");
        self.send(Command::AuthLogin)?;
        self.challenge()?;
        self.send_secret(format!("{}\r\n", get_auth_login(&credentials.username)).as_bytes())?;
        self.challenge()?;
        self.send_secret(format!("{}\r\n", get_auth_login(&credentials.password)).as_bytes())?;
        self.reply_auth_result()
    }

    fn try_connect(&mut self, credentials: &Credentials) -> Result<()> {
        self.init_connection()?;
        self.handshake()?;
        if self.config.uses_starttls() && self.server.meta.tls == Support::Supported {
            self.start_tls()?;
            self.handshake()?;
        }
        if self.server.meta.auth_login == Support::Supported {
            self.auth_login(credentials)?;
        } else if self.server.meta.auth_plain == Support::Supported {
            self.auth_plain(credentials)?;
        }
        Ok(())
    }

    /// Opens a session and authenticates. A half-open session is torn down
    /// before the error is returned.
    pub fn open(&mut self, server: Server, credentials: Credentials) -> Result<()> {
        self.terminate();
        self.server = server;
        let result = self.try_connect(&credentials);
        if result.is_err() {
            self.terminate();
        }
        result
    }

    fn terminate(&mut self) {
        if let (Some(tlscon), Some(stream)) = (self.tlscon.as_mut(), self.stream.as_mut()) {
            tlscon.send_close_notify();
            while tlscon.wants_write() {
                if tlscon.write_tls(stream).is_err() {
                    break;
                }
            }
        }
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.tlscon.take();
        self.server.meta = ServerMeta::new();
    }

    /// Only a failure to deliver QUIT or to read its reply is an error; the
    /// reply code itself is just traced.
    fn try_close(&mut self) -> Result<()> {
        self.send(Command::Quit)?;
        match self.recv_line() {
            Ok(line) if line.is(StatusCode::ServiceClosingChannel) => Ok(()),
            Ok(line) => {
                trace!("QUIT answered with {} {}", line.code(), line.text());
                Ok(())
            }
            Err(Error::ServerUnavailable) | Err(Error::Protocol) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Ends the session with QUIT. The socket is released either way.
    pub fn quit(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::Network);
        }
        let result = self.try_close();
        self.terminate();
        result
    }
}

impl<L> Transport for SmtpTransport<L>
where
    L: Logger,
{
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        user: &str,
        password: &str,
    ) -> std::result::Result<(), TransportError> {
        let credentials = Credentials::new(user.to_string(), password.to_string());
        self.open(Server::new(host.to_string(), port), credentials)
            .map_err(TransportError::from)
    }

    fn close(&mut self) -> std::result::Result<(), TransportError> {
        self.quit().map_err(TransportError::from)
    }
}

impl<L: Logger> Drop for SmtpTransport<L> {
    fn drop(&mut self) {
        self.terminate();
    }
}
