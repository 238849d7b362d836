use crate::config::ClientConfig;
use crate::constants::status::*;
use crate::core_error::{FtpError, Result};
use crate::core_listing::{parse_listing, Entry, ParseContext, ServerType};
use crate::core_network::{ControlChannel, ControlStream, DataStream, Direction};
use crate::core_reply::Reply;
use crate::helpers::split_path;
use crate::session::{Session, SessionPhase, TransferType};
use log::{debug, info, warn};
use std::borrow::Cow;
use tokio::io::{AsyncRead, AsyncWrite};

/// An authenticated FTP session and the operations it offers.
///
/// Every operation waits for its final reply before returning. Transfers
/// hand out a [`DataStream`] that must be finished (or dropped) before the
/// client can be used again.
pub struct FtpClient {
    session: Session,
    config: ClientConfig,
    banner: String,
}

impl FtpClient {
    /// Connects over TCP, logs in and detects the server type.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let address = config.address();
        let control = ControlChannel::connect(&address, config.timeout()).await?;
        info!("Connected to {}", address);
        Self::start(control, config).await
    }

    /// Same as [`FtpClient::connect`] over a stream opened by the caller,
    /// e.g. a control connection already secured with TLS.
    pub async fn with_stream(stream: Box<dyn ControlStream>, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let control = ControlChannel::new(stream, config.timeout());
        Self::start(control, config).await
    }

    async fn start(control: ControlChannel, config: ClientConfig) -> Result<Self> {
        let active_address = config.active_ip()?;
        let session = Session::new(control, config.mode, active_address);
        let mut client = Self {
            session,
            config,
            banner: String::new(),
        };
        client.read_banner().await?;
        client.login().await?;
        client.detect_server_type().await?;
        client.session.set_phase(SessionPhase::Idle);
        Ok(client)
    }

    pub fn server_type(&self) -> ServerType {
        self.session.server_type()
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    /// Text of the welcome reply.
    pub fn banner(&self) -> &str {
        &self.banner
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn read_banner(&mut self) -> Result<()> {
        loop {
            let reply = self.session.read_reply().await?;
            match reply.code {
                READY_MINUTE => debug!("Server not ready yet: {}", reply.message()),
                SERVICE_READY => {
                    self.banner = reply.text();
                    return Ok(());
                }
                _ if reply.is_failure() => return Err(FtpError::from_reply("CONNECT", "", &reply)),
                _ => {
                    return Err(FtpError::Protocol(format!(
                        "unexpected welcome reply: {}",
                        reply
                    )))
                }
            }
        }
    }

    async fn login(&mut self) -> Result<()> {
        let (username, password) = self.config.credentials();
        let mut reply = self.session.execute("USER", &username).await?;
        if reply.code == NEED_PASSWORD {
            reply = self.session.execute("PASS", &password).await?;
        }
        if reply.code == NEED_ACCOUNT {
            match self.config.account.clone() {
                Some(account) => reply = self.session.execute("ACCT", &account).await?,
                None => return Err(authentication_error(&reply)),
            }
        }
        if !reply.is_success() {
            return Err(authentication_error(&reply));
        }

        self.session.set_phase(SessionPhase::Authenticated);
        info!("Logged in as {}", username);
        Ok(())
    }

    /// Asks `SYST`, then falls back to the banner. The listing parser still
    /// corrects the guess on the first listing.
    async fn detect_server_type(&mut self) -> Result<()> {
        let reply = self.session.execute("SYST", "").await?;
        let mut server_type = if reply.code == NAME_SYSTEM {
            ServerType::from_system_reply(&reply.text())
        } else {
            debug!("SYST not usable: {}", reply);
            ServerType::Unknown
        };
        if server_type == ServerType::Unknown {
            server_type = ServerType::from_banner(&self.banner);
        }

        info!("Server type: {:?}", server_type);
        self.session.set_server_type(server_type);
        Ok(())
    }

    /// Lists `path` over a data connection. An empty path lists the current
    /// directory.
    pub async fn list_entries(&mut self, path: &str) -> Result<Vec<Entry>> {
        self.session.set_transfer_type(TransferType::Ascii).await?;
        let mut stream = self
            .session
            .open_transfer(Direction::Download, "LIST", path)
            .await?;
        let raw = stream.read_all().await?;
        stream.finish().await?;

        let text = decode_listing(&raw);
        Ok(self.parse_entries(text.lines()))
    }

    /// Lists `path` inline through `STAT`, without a data connection.
    pub async fn stat_entries(&mut self, path: &str) -> Result<Vec<Entry>> {
        let reply = self.session.execute("STAT", path).await?;
        if !reply.is_success() {
            return Err(FtpError::from_reply("STAT", path, &reply));
        }
        let body = stat_body(&reply);
        Ok(self.parse_entries(body.iter().map(String::as_str)))
    }

    fn parse_entries<'a, I>(&mut self, lines: I) -> Vec<Entry>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let listing = parse_listing(lines, self.session.server_type(), &ParseContext::default());
        if !listing.entries.is_empty() && listing.dialect != self.session.server_type() {
            info!("Listing dialect is {:?}", listing.dialect);
            self.session.set_server_type(listing.dialect);
        }
        listing.entries
    }

    /// Looks up the entry `path` names in its parent directory.
    ///
    /// Tries `STAT` first and falls back to `LIST` when the server refuses
    /// it. A missing entry or parent is `None`, and so is the root.
    pub async fn get_entry(&mut self, path: &str) -> Result<Option<Entry>> {
        let Some((parent, name)) = split_path(path) else {
            return Ok(None);
        };

        let entries = match self.stat_entries(&parent).await {
            Ok(entries) => entries,
            Err(FtpError::NotFound { .. }) => return Ok(None),
            Err(e) if e.reply_code().is_some() => {
                debug!("STAT refused ({}), listing {} instead", e, parent);
                match self.list_entries(&parent).await {
                    Ok(entries) => entries,
                    Err(FtpError::NotFound { .. }) => return Ok(None),
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };
        Ok(entries.into_iter().find(|entry| entry.name == name))
    }

    pub async fn exists(&mut self, path: &str) -> Result<bool> {
        Ok(self.get_entry(path).await?.is_some())
    }

    /// Opens `path` for reading in binary mode.
    pub async fn retr(&mut self, path: &str) -> Result<DataStream<'_>> {
        self.session.set_transfer_type(TransferType::Binary).await?;
        self.session
            .open_transfer(Direction::Download, "RETR", path)
            .await
    }

    /// Opens `path` for writing in binary mode.
    pub async fn stor(&mut self, path: &str) -> Result<DataStream<'_>> {
        self.session.set_transfer_type(TransferType::Binary).await?;
        self.session.open_transfer(Direction::Upload, "STOR", path).await
    }

    /// Copies the whole file at `path` into `writer`. Returns the byte count.
    ///
    /// A stalled data connection fails after the configured timeout and
    /// closes the session. A failing `writer` gives [`FtpError::Local`]; the
    /// session stays usable and reads the transfer's final reply before the
    /// next command.
    pub async fn download<W>(&mut self, path: &str, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut stream = self.retr(path).await?;
        let copied = stream.copy_to(writer).await?;
        stream.finish().await?;
        Ok(copied)
    }

    /// Stores everything `reader` yields at `path`. Returns the byte count.
    pub async fn upload<R>(&mut self, path: &str, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut stream = self.stor(path).await?;
        let copied = stream.copy_from(reader).await?;
        stream.finish().await?;
        Ok(copied)
    }

    pub async fn dele(&mut self, path: &str) -> Result<bool> {
        self.succeeds("DELE", path).await
    }

    /// `false` when the parent is missing or the directory already exists.
    pub async fn mkd(&mut self, path: &str) -> Result<bool> {
        self.succeeds("MKD", path).await
    }

    pub async fn rmd(&mut self, path: &str) -> Result<bool> {
        self.succeeds("RMD", path).await
    }

    /// Removes a file or a directory, whichever `path` is.
    ///
    /// When the type cannot be determined, `DELE` is tried first and `RMD`
    /// second. Returns `false` if the path does not exist or nothing worked.
    pub async fn delete(&mut self, path: &str) -> Result<bool> {
        match self.get_entry(path).await {
            Ok(Some(entry)) if entry.is_directory() => self.rmd(path).await,
            Ok(Some(_)) => self.dele(path).await,
            Ok(None) => Ok(false),
            Err(e) if !e.is_fatal() => {
                debug!("Could not classify {} ({}), trying DELE then RMD", path, e);
                if self.dele(path).await? {
                    Ok(true)
                } else {
                    self.rmd(path).await
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Renames `from` to `to` with `RNFR`/`RNTO`.
    pub async fn rename(&mut self, from: &str, to: &str) -> Result<bool> {
        let reply = self.session.execute("RNFR", from).await?;
        if reply.code != FILE_ACTION_PENDING {
            debug!("RNFR {} refused: {}", from, reply);
            return Ok(false);
        }
        self.succeeds("RNTO", to).await
    }

    /// Sends any command and returns the raw reply.
    pub async fn send_single_command(&mut self, verb: &str, arg: &str) -> Result<Reply> {
        self.session.execute(verb, arg).await
    }

    pub async fn noop(&mut self) -> Result<()> {
        let reply = self.session.execute("NOOP", "").await?;
        if !reply.is_success() {
            return Err(FtpError::from_reply("NOOP", "", &reply));
        }
        Ok(())
    }

    /// Current working directory, from the quoted path of a 257 reply.
    pub async fn pwd(&mut self) -> Result<String> {
        let reply = self.session.execute("PWD", "").await?;
        if reply.code != PATH_CREATED {
            return Err(FtpError::from_reply("PWD", "", &reply));
        }
        parse_quoted_path(reply.message())
            .ok_or_else(|| FtpError::Protocol(format!("no path in PWD reply: {}", reply)))
    }

    pub async fn cwd(&mut self, path: &str) -> Result<bool> {
        self.succeeds("CWD", path).await
    }

    /// Says goodbye with `QUIT` and closes the session. A server that is
    /// already gone is not an error.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.session.phase() == SessionPhase::Disconnected {
            return Ok(());
        }
        match self.session.execute("QUIT", "").await {
            Ok(reply) if reply.code == SERVICE_CLOSING => info!("Disconnected: {}", reply.message()),
            Ok(reply) => warn!("Unexpected QUIT reply: {}", reply),
            Err(e) => debug!("QUIT failed: {}", e),
        }
        self.session.set_phase(SessionPhase::Disconnected);
        Ok(())
    }

    async fn succeeds(&mut self, verb: &str, path: &str) -> Result<bool> {
        let reply = self.session.execute(verb, path).await?;
        if !reply.is_success() {
            debug!("{} {} refused: {}", verb, path, reply);
        }
        Ok(reply.is_success())
    }
}

fn authentication_error(reply: &Reply) -> FtpError {
    FtpError::Authentication {
        code: reply.code,
        message: reply.message().to_string(),
    }
}

/// Listings are decoded as UTF-8. Names in another encoding keep their
/// valid parts and get U+FFFD for the rest.
fn decode_listing(raw: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(raw)
}

/// Listing lines of a multi-line `STAT` reply.
///
/// Drops the first and last lines (status text), then strips the repeated
/// `DDD-` prefix and the indentation some servers put on each line.
fn stat_body(reply: &Reply) -> Vec<String> {
    if reply.lines.len() < 3 {
        return Vec::new();
    }
    let prefix = format!("{}-", reply.code);
    reply.lines[1..reply.lines.len() - 1]
        .iter()
        .map(|line| {
            let line = line.strip_prefix(&prefix).unwrap_or(line);
            line.trim_start().to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

/// Extracts `/some "odd" dir` from `"/some ""odd"" dir" is current directory`.
fn parse_quoted_path(message: &str) -> Option<String> {
    let start = message.find('"')? + 1;
    let mut path = String::new();
    let mut chars = message[start..].chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                path.push('"');
                chars.next();
            } else {
                return Some(path);
            }
        } else {
            path.push(c);
        }
    }
    None
}
