use crate::core_error::{FtpError, Result};
use crate::core_network::control::ControlChannel;
use crate::core_network::data::PendingData;
use log::debug;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use tokio::net::TcpListener;

/// Formats `h1,h2,h3,h4,p1,p2` for a `PORT` command.
pub fn format_port_argument(address: SocketAddrV4) -> String {
    let [h1, h2, h3, h4] = address.ip().octets();
    let port = address.port();
    format!("{},{},{},{},{},{}", h1, h2, h3, h4, port >> 8, port & 0xff)
}

/// Listens on an ephemeral port and announces it with `PORT`.
///
/// `advertised` overrides the address sent to the server; the listener then
/// binds every interface. Without it, the local address of the control
/// connection is used for both.
pub async fn open_active(
    control: &mut ControlChannel,
    advertised: Option<Ipv4Addr>,
) -> Result<PendingData> {
    let (bind_ip, announce_ip) = match advertised {
        Some(ip) => (Ipv4Addr::UNSPECIFIED, ip),
        None => {
            let local = local_ipv4(control.local_ip()).ok_or_else(|| {
                FtpError::Config(
                    "active mode needs an IPv4 control connection or an active_address".to_string(),
                )
            })?;
            (local, local)
        }
    };

    let listener = TcpListener::bind(SocketAddrV4::new(bind_ip, 0)).await?;
    let port = listener.local_addr()?.port();
    let argument = format_port_argument(SocketAddrV4::new(announce_ip, port));

    let reply = control.send_command("PORT", &argument).await?;
    if !reply.is_success() {
        return Err(FtpError::from_reply("PORT", &argument, &reply));
    }

    debug!("Listening for active data connection on {}:{}", bind_ip, port);
    Ok(PendingData::Listening(listener))
}

fn local_ipv4(ip: Option<IpAddr>) -> Option<Ipv4Addr> {
    match ip? {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}
