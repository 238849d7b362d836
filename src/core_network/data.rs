use crate::config::TransferMode;
use crate::core_error::{FtpError, Result};
use crate::core_network::control::ControlChannel;
use crate::core_network::{pasv, port};
use crate::core_reply::Reply;
use crate::helpers::with_timeout;
use crate::session::Session;
use log::debug;
use std::io;
use std::net::Ipv4Addr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

const COPY_BUFFER_SIZE: usize = 16 * 1024;

/// A negotiated data connection that is not usable yet.
///
/// Passive connections are already connected; active ones wait for the server
/// to connect once the transfer command has been accepted.
pub enum PendingData {
    Connected(TcpStream),
    Listening(TcpListener),
}

impl PendingData {
    pub async fn establish(self, timeout: Option<Duration>) -> Result<TcpStream> {
        match self {
            PendingData::Connected(stream) => Ok(stream),
            PendingData::Listening(listener) => {
                let (stream, peer) = with_timeout(timeout, "data accept", listener.accept()).await?;
                debug!("Accepted active data connection from {}", peer);
                Ok(stream)
            }
        }
    }
}

/// Negotiates a data connection in the given mode.
pub async fn open_data_channel(
    control: &mut ControlChannel,
    mode: TransferMode,
    active_address: Option<Ipv4Addr>,
) -> Result<PendingData> {
    match mode {
        TransferMode::Passive => pasv::open_passive(control).await,
        TransferMode::Active => port::open_active(control, active_address).await,
    }
}

/// An open data connection, bound to the session that started it.
///
/// The session cannot issue commands while this value lives. Call
/// [`DataStream::finish`] once done: it closes the connection and reads the
/// server's final transfer reply. A stream dropped without `finish` leaves
/// that reply pending; the session reads it before its next command.
pub struct DataStream<'a> {
    session: &'a mut Session,
    stream: Option<TcpStream>,
    direction: Direction,
    verb: String,
    path: String,
    completed: Option<Reply>, // Final reply already received with the preliminary one
    finished: bool,
}

impl<'a> DataStream<'a> {
    pub(crate) fn new(
        session: &'a mut Session,
        stream: TcpStream,
        direction: Direction,
        verb: &str,
        path: &str,
        completed: Option<Reply>,
    ) -> Self {
        Self {
            session,
            stream: Some(stream),
            direction,
            verb: verb.to_string(),
            path: path.to_string(),
            completed,
            finished: false,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Reads the rest of the payload under the session timeout.
    pub(crate) async fn read_all(&mut self) -> Result<Vec<u8>> {
        let timeout = self.session.timeout();
        let mut buffer = Vec::new();
        let result = match self.stream.as_mut() {
            Some(stream) => with_timeout(timeout, "data read", stream.read_to_end(&mut buffer))
                .await
                .map(|_| buffer),
            None => Ok(buffer),
        };
        self.session.guard(result)
    }

    /// Copies the whole payload into `writer`.
    ///
    /// Every socket read runs under the session timeout; a socket failure
    /// closes the session. A failing `writer` is reported as
    /// [`FtpError::Local`] and only releases this stream.
    pub(crate) async fn copy_to<W>(&mut self, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let timeout = self.session.timeout();
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut copied = 0u64;
        loop {
            let read = match self.stream.as_mut() {
                Some(stream) => with_timeout(timeout, "data read", stream.read(&mut buffer)).await,
                None => Ok(0),
            };
            let read = self.session.guard(read)?;
            if read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..read])
                .await
                .map_err(FtpError::Local)?;
            copied += read as u64;
        }
        writer.flush().await.map_err(FtpError::Local)?;
        Ok(copied)
    }

    /// Sends everything `reader` yields, each socket write under the
    /// session timeout. Errors are split like in [`DataStream::copy_to`].
    pub(crate) async fn copy_from<R>(&mut self, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let timeout = self.session.timeout();
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut copied = 0u64;
        loop {
            let read = reader.read(&mut buffer).await.map_err(FtpError::Local)?;
            if read == 0 {
                break;
            }
            let written = match self.stream.as_mut() {
                Some(stream) => {
                    with_timeout(timeout, "data write", stream.write_all(&buffer[..read])).await
                }
                None => Err(FtpError::Transport(io::Error::from(io::ErrorKind::NotConnected))),
            };
            self.session.guard(written)?;
            copied += read as u64;
        }
        Ok(copied)
    }

    /// Closes the data connection and waits for the transfer-complete reply.
    pub async fn finish(mut self) -> Result<Reply> {
        if let Some(mut stream) = self.stream.take() {
            if self.direction == Direction::Upload {
                let timeout = self.session.timeout();
                if let Err(e) = with_timeout(timeout, "data shutdown", stream.shutdown()).await {
                    debug!("Data connection shutdown failed: {}", e);
                }
            }
            drop(stream);
        }

        self.finished = true;
        let completed = self.completed.take();
        let reply = self.session.complete_transfer(completed).await?;
        if reply.is_success() {
            debug!("{} {} complete: {}", self.verb, self.path, reply);
            Ok(reply)
        } else {
            Err(FtpError::from_reply(&self.verb, &self.path, &reply))
        }
    }
}

impl AsyncRead for DataStream<'_> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl AsyncWrite for DataStream<'_> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_write(cx, buf),
            None => Poll::Ready(Err(io::Error::from(io::ErrorKind::NotConnected))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().stream.as_mut() {
            Some(stream) => Pin::new(stream).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl Drop for DataStream<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.stream.take();
        self.session.release_unfinished(self.completed.is_some());
    }
}
