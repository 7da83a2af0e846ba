//! The line transport under the client: TLS connection to Twitch,
//! plus the capability/login handshake run on top of it.
//!
//! The client only ever talks to the [`Transport`] trait, so tests
//! (and eventually other transports) can swap the TLS stream out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tokio::io::{split, AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_stream::wrappers::LinesStream;

use crate::tmi::{self, write};

const TMI_URL_HOST: &str = "irc.chat.twitch.tv";
const TMI_TLS_PORT: u16 = 6697;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq)]
pub enum Login {
    Anonymous,
    Regular { login: String, token: String },
}

impl Default for Login {
    fn default() -> Self {
        Login::Anonymous
    }
}

impl Login {
    /// The nick to register with. Anonymous logins use one of Twitch's
    /// `justinfan` guest nicks, which require no PASS.
    pub fn nick(&self) -> String {
        match self {
            Login::Anonymous => {
                use rand::Rng;
                format!("justinfan{}", rand::thread_rng().gen_range(10000..99999))
            }
            Login::Regular { login, .. } => login.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection to Twitch IRC server failed")]
    ConnectionFailed,
    #[error("Encountered an I/O error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Failed to authenticate: {0}")]
    AuthFailed(String),
    #[error(transparent)]
    Generic(#[from] anyhow::Error),
    #[error("Timed out")]
    Timeout,
    #[error("Stream closed")]
    StreamClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

macro_rules! err {
    ($Variant:ident, $msg:expr) => {
        Err(err!(bare $Variant, $msg))
    };
    (bare $Variant:ident, $msg:expr) => {
        crate::conn::Error::$Variant(anyhow::anyhow!($msg))
    };
}

/// A duplex line channel. `next_line` yields received lines until the
/// peer goes away; `send` reports success per write so callers can
/// react without the error type of the underlying stream leaking out.
#[async_trait]
pub trait Transport: Send {
    /// Opens (or re-opens) the connection. Returns `false` on failure.
    async fn open(&mut self) -> bool;
    /// Writes one raw line, `\r\n` included. Returns `false` when the
    /// transport is closed or the write fails.
    async fn send(&mut self, line: &str) -> bool;
    async fn close(&mut self);
    fn is_connected(&self) -> bool;
    /// The next received line, or `None` once the stream is closed.
    async fn next_line(&mut self) -> Option<String>;
}

async fn connect_tls(host: &str, port: u16) -> Result<TlsStream<TcpStream>> {
    use tokio_rustls::{rustls::ClientConfig, webpki::DNSNameRef, TlsConnector};

    let mut config = ClientConfig::new();
    config.root_store =
        rustls_native_certs::load_native_certs().map_err(|err| anyhow::anyhow!("Failed to load native certs: {:?}", err))?;
    let config = TlsConnector::from(Arc::new(config));
    let dnsname = DNSNameRef::try_from_ascii_str(host).map_err(|err| anyhow::anyhow!(err))?;
    let stream = TcpStream::connect((host, port)).await?;
    let out = config
        .connect(dnsname, stream)
        .await
        .map_err(|err| anyhow::anyhow!(err))?;

    Ok(out)
}

/// The default transport: TLS to `irc.chat.twitch.tv:6697`.
pub struct Tls {
    host: String,
    port: u16,
    reader: Option<LinesStream<BufReader<ReadHalf<TlsStream<TcpStream>>>>>,
    writer: Option<WriteHalf<TlsStream<TcpStream>>>,
}

impl Tls {
    pub fn new() -> Tls {
        Tls::to(TMI_URL_HOST, TMI_TLS_PORT)
    }

    pub fn to(host: &str, port: u16) -> Tls {
        Tls {
            host: host.to_owned(),
            port,
            reader: None,
            writer: None,
        }
    }
}

impl Default for Tls {
    fn default() -> Self {
        Tls::new()
    }
}

#[async_trait]
impl Transport for Tls {
    async fn open(&mut self) -> bool {
        match tokio::time::timeout(CONNECT_TIMEOUT, connect_tls(&self.host, self.port)).await {
            Ok(Ok(stream)) => {
                let (read, write) = split(stream);
                self.reader = Some(LinesStream::new(BufReader::new(read).lines()));
                self.writer = Some(write);
                true
            }
            Ok(Err(err)) => {
                log::error!("Failed to connect to {}:{}: {}", self.host, self.port, err);
                false
            }
            Err(_) => {
                log::error!("Timed out while connecting to {}:{}", self.host, self.port);
                false
            }
        }
    }

    async fn send(&mut self, line: &str) -> bool {
        match &mut self.writer {
            Some(writer) => writer.write_all(line.as_bytes()).await.is_ok(),
            None => false,
        }
    }

    async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        self.reader = None;
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    async fn next_line(&mut self) -> Option<String> {
        match &mut self.reader {
            Some(reader) => match reader.next().await {
                Some(Ok(line)) => Some(line),
                _ => None,
            },
            None => None,
        }
    }
}

fn expected_cap_ack(request_membership_data: bool) -> &'static str {
    if request_membership_data {
        "twitch.tv/commands twitch.tv/tags twitch.tv/membership"
    } else {
        "twitch.tv/commands twitch.tv/tags"
    }
}

/// Runs the TMI handshake on a freshly opened transport:
///
/// 1. `CAP REQ` and its ACK
/// 2. `PASS`/`NICK`/`USER` (PASS skipped for anonymous logins)
/// 3. wait for `001`
///
/// Returns the nick that was registered. Auth rejections surface as
/// [`Error::AuthFailed`] with the server's notice text.
pub async fn handshake(transport: &mut dyn Transport, credentials: &Login, membership_data: bool) -> Result<String> {
    // 1. request capabilities
    // < CAP REQ :twitch.tv/commands twitch.tv/tags [twitch.tv/membership]
    if !transport.send(&write::cap(membership_data)).await {
        return Err(Error::ConnectionFailed);
    }
    // 2. wait for CAP * ACK :twitch.tv/commands twitch.tv/tags
    let line = transport.next_line().await.ok_or(Error::StreamClosed)?;
    match tmi::Message::parse(&line) {
        tmi::Message::Capability(capability) => {
            if capability.which() != expected_cap_ack(membership_data) {
                return err!(Generic, "Did not receive expected capabilities");
            }
        }
        _ => {
            return err!(Generic, "Did not receive expected capabilities");
        }
    }
    // 3. authenticate
    let nick = credentials.nick();
    if let Login::Regular { token, .. } = credentials {
        // < PASS oauth:<token>
        if !transport.send(&write::pass(token)).await {
            return Err(Error::ConnectionFailed);
        }
    }
    // < NICK <login>
    // < USER <login> 0 * :<login>
    if !transport.send(&write::nick(&nick)).await || !transport.send(&write::user(&nick)).await {
        return Err(Error::ConnectionFailed);
    }
    // 4. wait for response with command `001`, skipping the MOTD noise
    loop {
        let line = transport.next_line().await.ok_or(Error::StreamClosed)?;
        match tmi::Message::parse(&line) {
            tmi::Message::Welcome => return Ok(nick),
            tmi::Message::Notice(notice) => return Err(Error::AuthFailed(notice.message)),
            _ => continue,
        }
    }
}
