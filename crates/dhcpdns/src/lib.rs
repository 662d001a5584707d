//! Discovers the DNS servers a network's DHCP or DHCPv6 infrastructure hands out.
//!
//! The interface used to reach a reference address is selected as the vantage point,
//! then a single minimal DHCP request is sent from it over a plain UDP socket.
//! The host's own DHCP client state is never touched.
//!
//! * DHCPv4: <https://datatracker.ietf.org/doc/html/rfc2131>, options from
//!   <https://datatracker.ietf.org/doc/html/rfc2132>
//! * DHCPv6: <https://datatracker.ietf.org/doc/html/rfc8415>, DNS option from
//!   <https://datatracker.ietf.org/doc/html/rfc3646>

mod detector;
pub mod dhcpv4;
pub mod dhcpv6;
pub mod interface;
mod outbound;
mod probe;
pub mod transport;

pub use detector::{Detector, Status, DEFAULT_KEEP_THRESHOLD};
pub use outbound::{resolve, select_vantage_point, Family, VantagePoint};
pub use probe::{probe, Discovery, Endpoints, Probe, ProbeConfig, Prober};

use error_derive::Error;

use std::{
    io,
    net::{IpAddr, SocketAddr},
};

#[derive(Debug, Error)]
pub enum Error {
    #[msg = "failed to resolve remote address"]
    AddressResolutionFailed(#[source] io::Error),

    #[msg = "failed to enumerate network interfaces"]
    InterfaceEnumerationFailed(#[source] io::Error),

    #[msg = "no interface owns {0}"]
    NoSuchInterface(IpAddr),

    #[msg = "[{0}] is not running"]
    InterfaceNotRunning(String),

    #[msg = "no link-local unicast address found on [{0}]"]
    NoLinkLocalAddress(String),

    #[msg = "failed to open socket"]
    SocketOpenFailed(#[source] io::Error),

    #[msg = "failed to send request"]
    SendFailed(#[source] io::Error),

    #[msg = "no reply received"]
    ReceiveTimeoutOrFailed(#[source] io::Error),

    #[msg = "reply is too short"]
    ReplyTooShort,

    #[msg = "reply has the wrong message type"]
    MalformedReply,

    #[msg = "transaction id does not match"]
    TransactionMismatch,

    #[msg = "option exceeds the reply"]
    TruncatedOption,

    #[msg = "no DNS found"]
    NoDNSFound,
}

impl Error {
    /// Whether the error means that nobody answered before the deadline
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::ReceiveTimeoutOrFailed(error) => matches!(
                error.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Detect the DHCP DNS servers of the interface that is used
/// to reach `remote` (an `address:port` pair) over IPv4.
pub fn detect4(remote: &str) -> Result<Vec<IpAddr>, Error> {
    probe(remote, Family::V4, &ProbeConfig::default()).map(|discovery| discovery.dns)
}

/// Detect the DHCPv6 DNS servers of the interface that is used
/// to reach `remote` (an `address:port` pair) over IPv6.
pub fn detect6(remote: &str) -> Result<Vec<IpAddr>, Error> {
    probe(remote, Family::V6, &ProbeConfig::default()).map(|discovery| discovery.dns)
}

/// The address a probe reply is expected at, for logging
pub(crate) fn display_local(address: &SocketAddr) -> String {
    match address {
        SocketAddr::V6(v6) if v6.scope_id() != 0 => {
            format!("[{}%{}]:{}", v6.ip(), v6.scope_id(), v6.port())
        },
        other => other.to_string(),
    }
}
