use crate::config::TransferMode;
use crate::core_error::{FtpError, Result};
use crate::core_listing::ServerType;
use crate::core_network::data::{self, DataStream, Direction};
use crate::core_network::ControlChannel;
use crate::core_reply::{Reply, ReplyClass};
use log::{debug, error, warn};
use std::net::Ipv4Addr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connected,
    Authenticated,
    Idle,
    Transferring,
}

/// Representation type set with `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Ascii,
    Binary,
}

impl TransferType {
    pub fn code(&self) -> &'static str {
        match self {
            TransferType::Ascii => "A",
            TransferType::Binary => "I",
        }
    }
}

/// State of one control connection.
///
/// Every control-channel failure that leaves the reply stream in an unknown
/// state moves the session to `Disconnected` for good.
pub struct Session {
    control: ControlChannel,
    phase: SessionPhase,
    server_type: ServerType,
    transfer_type: Option<TransferType>, // Last type the server accepted
    pending_completion: bool,            // A released transfer still owes its final reply
    mode: TransferMode,
    active_address: Option<Ipv4Addr>,
}

impl Session {
    pub fn new(
        control: ControlChannel,
        mode: TransferMode,
        active_address: Option<Ipv4Addr>,
    ) -> Self {
        Self {
            control,
            phase: SessionPhase::Connected,
            server_type: ServerType::Unknown,
            transfer_type: None,
            pending_completion: false,
            mode,
            active_address,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: SessionPhase) {
        debug!("Session phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    pub fn server_type(&self) -> ServerType {
        self.server_type
    }

    pub(crate) fn set_server_type(&mut self, server_type: ServerType) {
        self.server_type = server_type;
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.control.timeout()
    }

    /// Reads a reply without sending anything, e.g. the welcome banner.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        self.ensure_ready().await?;
        let result = self.control.read_reply().await;
        self.guard(result)
    }

    /// Sends one command and returns its reply, whatever the code.
    pub async fn execute(&mut self, verb: &str, arg: &str) -> Result<Reply> {
        self.ensure_ready().await?;
        self.round_trip(verb, arg).await
    }

    /// Sends `TYPE` unless the server already uses `transfer_type`.
    pub async fn set_transfer_type(&mut self, transfer_type: TransferType) -> Result<()> {
        if self.transfer_type == Some(transfer_type) {
            return Ok(());
        }
        let reply = self.execute("TYPE", transfer_type.code()).await?;
        if !reply.is_success() {
            return Err(FtpError::from_reply("TYPE", transfer_type.code(), &reply));
        }
        self.transfer_type = Some(transfer_type);
        Ok(())
    }

    /// Negotiates a data connection, sends `verb path` and returns the open stream.
    ///
    /// A failure reply to the transfer command is returned as an error and
    /// leaves the session idle.
    pub async fn open_transfer(
        &mut self,
        direction: Direction,
        verb: &str,
        path: &str,
    ) -> Result<DataStream<'_>> {
        self.ensure_ready().await?;

        let negotiated =
            data::open_data_channel(&mut self.control, self.mode, self.active_address).await;
        let pending = self.guard(negotiated)?;

        let reply = self.round_trip(verb, path).await?;
        let completed = match reply.class() {
            ReplyClass::Preliminary => None,
            ReplyClass::Success => Some(reply),
            _ => return Err(FtpError::from_reply(verb, path, &reply)),
        };

        let established = pending.establish(self.timeout()).await;
        let stream = self.guard(established)?;
        self.set_phase(SessionPhase::Transferring);
        Ok(DataStream::new(self, stream, direction, verb, path, completed))
    }

    /// Reads the final reply of the transfer in progress and returns to idle.
    pub(crate) async fn complete_transfer(&mut self, completed: Option<Reply>) -> Result<Reply> {
        if self.phase == SessionPhase::Disconnected {
            return Err(FtpError::Disconnected);
        }
        let reply = match completed {
            Some(reply) => reply,
            None => {
                let result = self.read_final_reply().await;
                self.guard(result)?
            }
        };
        self.set_phase(SessionPhase::Idle);
        Ok(reply)
    }

    /// Called when a data stream is dropped without `finish`.
    pub(crate) fn release_unfinished(&mut self, reply_received: bool) {
        if self.phase == SessionPhase::Disconnected {
            return;
        }
        if reply_received {
            self.set_phase(SessionPhase::Idle);
        } else {
            self.pending_completion = true;
        }
    }

    async fn round_trip(&mut self, verb: &str, arg: &str) -> Result<Reply> {
        let result = self.control.send_command(verb, arg).await;
        self.guard(result)
    }

    async fn read_final_reply(&mut self) -> Result<Reply> {
        loop {
            let reply = self.control.read_reply().await?;
            if !reply.is_preliminary() {
                return Ok(reply);
            }
        }
    }

    async fn ensure_ready(&mut self) -> Result<()> {
        match self.phase {
            SessionPhase::Disconnected => Err(FtpError::Disconnected),
            SessionPhase::Transferring if self.pending_completion => self.drain_pending().await,
            SessionPhase::Transferring => {
                let err = FtpError::Protocol("a data transfer is still in progress".to_string());
                self.guard(Err(err))
            }
            _ => Ok(()),
        }
    }

    /// Reads the reply owed by a data stream released without `finish`.
    async fn drain_pending(&mut self) -> Result<()> {
        self.pending_completion = false;
        warn!("Data stream released without finish, reading its final reply");
        match self.read_final_reply().await {
            Ok(reply) => {
                if !reply.is_success() {
                    warn!("Released transfer ended with {}", reply);
                }
                self.set_phase(SessionPhase::Idle);
                Ok(())
            }
            Err(e) => {
                let err = FtpError::Protocol(format!(
                    "final reply of a released transfer could not be read: {}",
                    e
                ));
                self.guard(Err(err))
            }
        }
    }

    /// Tears the session down when `result` carries a fatal error.
    pub(crate) fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() && self.phase != SessionPhase::Disconnected {
                error!("Closing session after error: {}", e);
                self.phase = SessionPhase::Disconnected;
            }
        }
        result
    }
}
