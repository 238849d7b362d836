use crate::core_error::{FtpError, Result};
use crate::core_reply::{Reply, ReplyParser};
use crate::helpers::{loggable_command, with_timeout};
use log::trace;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Any byte stream a control connection can run on: plain TCP, or a stream
/// already secured by the caller.
pub trait ControlStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ControlStream for T {}

/// The command connection: writes command lines, reads aggregated replies.
pub struct ControlChannel {
    reader: BufReader<Box<dyn ControlStream>>,
    timeout: Option<Duration>,
    local_ip: Option<IpAddr>,
    peer_ip: Option<IpAddr>,
}

impl ControlChannel {
    pub fn new(stream: Box<dyn ControlStream>, timeout: Option<Duration>) -> Self {
        Self {
            reader: BufReader::new(stream),
            timeout,
            local_ip: None,
            peer_ip: None,
        }
    }

    /// Opens a TCP control connection to `address` (`host:port`).
    pub async fn connect(address: &str, timeout: Option<Duration>) -> Result<Self> {
        let stream = with_timeout(timeout, "connect", TcpStream::connect(address)).await?;
        let local_ip = stream.local_addr().ok().map(|a| a.ip());
        let peer_ip = stream.peer_addr().ok().map(|a| a.ip());
        let mut channel = Self::new(Box::new(stream), timeout);
        channel.local_ip = local_ip;
        channel.peer_ip = peer_ip;
        Ok(channel)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Address of our end of the connection, advertised in active mode.
    pub fn local_ip(&self) -> Option<IpAddr> {
        self.local_ip
    }

    /// Address of the server, used when PASV advertises an unroutable one.
    pub fn peer_ip(&self) -> Option<IpAddr> {
        self.peer_ip
    }

    /// Writes `VERB argument\r\n`, leaving out the argument when empty.
    pub async fn send_line(&mut self, verb: &str, arg: &str) -> Result<()> {
        let line = if arg.is_empty() {
            format!("{}\r\n", verb)
        } else {
            format!("{} {}\r\n", verb, arg)
        };
        trace!(">>> {}", loggable_command(verb, arg));
        let timeout = self.timeout;
        let writer = self.reader.get_mut();
        with_timeout(timeout, "command write", async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        })
        .await
    }

    /// Reads one complete, possibly multi-line, reply.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        let mut parser = ReplyParser::new();
        loop {
            let line = self.read_line().await?;
            if let Some(reply) = parser.feed(&line)? {
                trace!("<<< {} {}", reply.code, reply.message());
                return Ok(reply);
            }
        }
    }

    pub async fn send_command(&mut self, verb: &str, arg: &str) -> Result<Reply> {
        self.send_line(verb, arg).await?;
        self.read_reply().await
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut buffer = Vec::new();
        let timeout = self.timeout;
        let reader = &mut self.reader;
        let read = with_timeout(timeout, "reply read", reader.read_until(b'\n', &mut buffer)).await?;
        if read == 0 {
            return Err(FtpError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed the control connection",
            )));
        }
        while matches!(buffer.last(), Some(b'\n') | Some(b'\r')) {
            buffer.pop();
        }
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
