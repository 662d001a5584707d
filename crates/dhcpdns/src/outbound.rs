//! Selects the local interface and address the OS uses to reach a remote address

use std::net::{
    IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6, ToSocketAddrs, UdpSocket,
};

use crate::{
    interface::{self, HardwareAddress, Interface},
    Error,
};

/// Link-local addresses can only be bound together with a zone, except on windows
const REQUIRES_ZONE: bool = !cfg!(windows);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

/// The local end a probe is sent from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VantagePoint {
    pub ip: IpAddr,

    /// Name of the interface that owns `ip`
    pub interface: String,

    /// OS index of the interface
    pub index: u32,

    pub zone: Option<String>,

    pub hardware_address: Option<HardwareAddress>,
}

impl Family {
    #[must_use]
    pub fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    #[must_use]
    pub fn unspecified(self) -> IpAddr {
        match self {
            Self::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Self::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }
}

impl VantagePoint {
    /// The scope id to bind a link-local address with, `0` when there is no zone
    #[must_use]
    pub fn scope_id(&self) -> u32 {
        if self.zone.is_some() {
            self.index
        } else {
            0
        }
    }

    /// The vantage point's address on the given port, including the zone for IPv6
    #[must_use]
    pub fn socket_address(&self, port: u16) -> SocketAddr {
        match self.ip {
            IpAddr::V4(_) => SocketAddr::new(self.ip, port),
            IpAddr::V6(v6) => SocketAddr::V6(SocketAddrV6::new(v6, port, 0, self.scope_id())),
        }
    }
}

/// Find the vantage point used to reach `remote`, an `address:port` pair.
///
/// Only addresses of the given family are considered when `remote` is a hostname.
pub fn resolve(remote: &str, family: Family) -> Result<VantagePoint, Error> {
    let target = remote
        .to_socket_addrs()
        .map_err(Error::AddressResolutionFailed)?
        .find(|address| Family::of(address.ip()) == family)
        .ok_or_else(|| {
            Error::AddressResolutionFailed(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("{remote} has no {family:?} address"),
            ))
        })?;

    let local_ip = outbound_ip(target)?;
    log::debug!("Active local IP towards {target}: {local_ip}");

    let interfaces = interface::interfaces()?;
    select_vantage_point(local_ip, &interfaces)
}

/// Ask the OS which local address it would send from, by connecting
/// a throwaway UDP socket. No packet is sent.
fn outbound_ip(target: SocketAddr) -> Result<IpAddr, Error> {
    let unspecified = SocketAddr::new(Family::of(target.ip()).unspecified(), 0);

    let socket = UdpSocket::bind(unspecified).map_err(Error::AddressResolutionFailed)?;
    socket
        .connect(target)
        .map_err(Error::AddressResolutionFailed)?;
    let local = socket
        .local_addr()
        .map_err(Error::AddressResolutionFailed)?;

    Ok(local.ip())
}

/// Pick the vantage point among `interfaces`, given the local address
/// the OS selected for routing.
pub fn select_vantage_point(
    local_ip: IpAddr,
    interfaces: &[Interface],
) -> Result<VantagePoint, Error> {
    let Some(owner) = interfaces.iter().find(|interface| interface.owns(local_ip)) else {
        return Err(Error::NoSuchInterface(local_ip));
    };

    if !owner.running {
        return Err(Error::InterfaceNotRunning(owner.name.clone()));
    }

    // DHCPv6 messages have to originate from a link-local address
    let ip = match local_ip {
        IpAddr::V4(_) => local_ip,
        IpAddr::V6(_) => match owner.link_local_v6() {
            Some(link_local) => IpAddr::V6(link_local),
            None => return Err(Error::NoLinkLocalAddress(owner.name.clone())),
        },
    };

    let zone = REQUIRES_ZONE.then(|| owner.name.clone());

    let vantage_point = VantagePoint {
        ip,
        interface: owner.name.clone(),
        index: owner.index,
        zone,
        hardware_address: owner.hardware_address,
    };
    log::debug!("Selected vantage point {vantage_point:?}");

    Ok(vantage_point)
}
