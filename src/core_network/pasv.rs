use crate::constants::status::PASSIVE_MODE;
use crate::core_error::{FtpError, Result};
use crate::core_network::control::ControlChannel;
use crate::core_network::data::PendingData;
use crate::helpers::with_timeout;
use log::debug;
use regex::Regex;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::sync::OnceLock;
use tokio::net::TcpStream;

fn pasv_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3})")
            .unwrap()
    })
}

/// Extracts the data endpoint from `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
pub fn parse_pasv_reply(text: &str) -> Result<SocketAddrV4> {
    let caps = pasv_regex()
        .captures(text)
        .ok_or_else(|| FtpError::Protocol(format!("invalid PASV reply: {}", text)))?;

    let mut numbers = [0u8; 6];
    for (i, number) in numbers.iter_mut().enumerate() {
        *number = caps[i + 1]
            .parse::<u8>()
            .map_err(|_| FtpError::Protocol(format!("PASV value out of range: {}", text)))?;
    }

    let ip = Ipv4Addr::new(numbers[0], numbers[1], numbers[2], numbers[3]);
    let port = u16::from(numbers[4]) * 256 + u16::from(numbers[5]);
    Ok(SocketAddrV4::new(ip, port))
}

/// Sends `PASV` and connects to the endpoint the server advertises.
pub async fn open_passive(control: &mut ControlChannel) -> Result<PendingData> {
    let reply = control.send_command("PASV", "").await?;
    if reply.code != PASSIVE_MODE {
        return Err(FtpError::from_reply("PASV", "", &reply));
    }

    let mut address = parse_pasv_reply(&reply.text())?;
    // Some servers behind NAT answer 0.0.0.0
    if address.ip().is_unspecified() {
        if let Some(IpAddr::V4(peer)) = control.peer_ip() {
            address.set_ip(peer);
        }
    }

    debug!("Opening passive data connection to {}", address);
    let stream = with_timeout(control.timeout(), "data connect", TcpStream::connect(address)).await?;
    Ok(PendingData::Connected(stream))
}
