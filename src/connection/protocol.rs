use base64::{engine::general_purpose, Engine};
use std::fmt;

use crate::{Error, Result};

/// Reply codes the probe acts on. Anything else is carried as a raw number.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum StatusCode {
    ServiceReady = 220,
    ServiceClosingChannel = 221,
    AuthSuccess = 235,
    Okay = 250,
    ServerChallenge = 334,
    ServiceNotAvailable = 421,
    TransactionFailed = 554,
}

#[derive(Debug)]
pub struct Line {
    code: u16,
    text: String,
    last: bool,
}

impl Line {
    pub fn new(code: u16, text: String, last: bool) -> Line {
        Line { code, text, last }
    }

    pub fn expect(&self, code: StatusCode) -> Result<()> {
        if self.is(code) {
            Ok(())
        } else {
            Err(Error::Protocol)
        }
    }
    pub fn is(&self, code: StatusCode) -> bool {
        self.code == code as u16
    }
    /// 421 and 554 mean the server is dropping the session.
    pub fn closes_session(&self) -> bool {
        self.is(StatusCode::ServiceNotAvailable) || self.is(StatusCode::TransactionFailed)
    }
    pub fn code(&self) -> u16 {
        self.code
    }
    pub fn text(&self) -> &str {
        &self.text
    }
    pub fn last(&self) -> bool {
        self.last
    }
}

pub enum EhloLine {
    StartTls,
    Auth,
}

impl fmt::Display for EhloLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EhloLine::StartTls => "STARTTLS",
            EhloLine::Auth => "AUTH",
        })
    }
}

pub enum AuthMech {
    Plain,
    Login,
}

impl fmt::Display for AuthMech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthMech::Plain => "PLAIN",
            AuthMech::Login => "LOGIN",
        })
    }
}

pub enum Command {
    Ehlo(String),
    Helo(String),
    Quit,
    StartTls,
    AuthPlain(String, String),
    AuthLogin,
}

pub fn get_auth_plain(username: &str, password: &str) -> String {
    let mut s = vec![0u8];
    s.extend_from_slice(username.as_bytes());
    s.push(0u8);
    s.extend_from_slice(password.as_bytes());
    general_purpose::STANDARD.encode(s)
}

pub fn get_auth_login(token: &str) -> String {
    general_purpose::STANDARD.encode(token)
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Ehlo(me) => write!(f, "EHLO {}", me),
            Command::Helo(me) => write!(f, "HELO {}", me),
            Command::StartTls => f.write_str("STARTTLS"),
            Command::Quit => f.write_str("QUIT"),
            Command::AuthPlain(un, pw) => write!(f, "AUTH PLAIN {}", get_auth_plain(un, pw)),
            Command::AuthLogin => f.write_str("AUTH LOGIN"),
        }?;
        f.write_str("\r\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_end_with_crlf() {
        assert_eq!(Command::Ehlo("localhost".to_string()).to_string(), "EHLO localhost\r\n");
        assert_eq!(Command::Helo("localhost".to_string()).to_string(), "HELO localhost\r\n");
        assert_eq!(Command::Quit.to_string(), "QUIT\r\n");
        assert_eq!(
            Command::AuthPlain("probe".to_string(), "secret".to_string()).to_string(),
            "AUTH PLAIN AHByb2JlAHNlY3JldA==\r\n"
        );
    }

    #[test]
    fn login_tokens() {
        assert_eq!(get_auth_login("probe"), "cHJvYmU=");
    }

    #[test]
    fn line_codes() {
        let line = Line::new(421, "closing".to_string(), true);
        assert!(line.closes_session());
        assert_eq!(line.expect(StatusCode::Okay), Err(Error::Protocol));
        assert!(Line::new(250, String::new(), true).expect(StatusCode::Okay).is_ok());
    }
}
