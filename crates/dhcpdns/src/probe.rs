use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6},
    time::Duration,
};

use crate::{
    dhcpv4, dhcpv6, outbound,
    transport::{self, Reception, Transport},
    Error, Family, VantagePoint,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Bounds sending the request and receiving the reply, each
    pub timeout: Duration,

    pub dhcpv4: dhcpv4::Codec,

    pub dhcpv6: dhcpv6::Codec,

    pub endpoints: Endpoints,
}

/// Where requests are sent from and to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Endpoints {
    /// `0` lets the OS pick a port
    pub dhcpv4_client_port: u16,

    pub dhcpv4_server: SocketAddrV4,

    pub dhcpv6_client_port: u16,

    /// The scope is always taken from the vantage point
    pub dhcpv6_server: SocketAddrV6,
}

/// The result of a successful probe
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Discovery {
    /// Where the request was sent from
    pub vantage_point: VantagePoint,

    /// Never empty when produced by [probe], [Detector](crate::Detector)
    /// treats an empty list from other probers as a failure
    pub dns: Vec<IpAddr>,
}

/// Something that can discover the DNS servers towards a remote target
pub trait Prober {
    fn probe(&self, remote: &str) -> Result<Discovery, Error>;
}

/// Probes one address family with a fixed configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Probe {
    pub family: Family,
    pub config: ProbeConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: transport::DEFAULT_TIMEOUT,
            dhcpv4: dhcpv4::Codec::default(),
            dhcpv6: dhcpv6::Codec::default(),
            endpoints: Endpoints::default(),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            dhcpv4_client_port: dhcpv4::CLIENT_PORT,
            dhcpv4_server: SocketAddrV4::new(Ipv4Addr::BROADCAST, dhcpv4::SERVER_PORT),
            dhcpv6_client_port: dhcpv6::CLIENT_PORT,
            dhcpv6_server: SocketAddrV6::new(
                dhcpv6::ALL_DHCP_RELAY_AGENTS_AND_SERVERS,
                dhcpv6::SERVER_PORT,
                0,
                0,
            ),
        }
    }
}

impl Probe {
    #[must_use]
    pub fn new(family: Family) -> Self {
        Self {
            family,
            config: ProbeConfig::default(),
        }
    }
}

impl Prober for Probe {
    fn probe(&self, remote: &str) -> Result<Discovery, Error> {
        probe(remote, self.family, &self.config)
    }
}

/// Run a single request/reply exchange from the vantage point used to reach `remote`.
///
/// There are no retries, a silent network fails after `config.timeout`.
pub fn probe(remote: &str, family: Family, config: &ProbeConfig) -> Result<Discovery, Error> {
    log::debug!("Probing DHCP DNS towards {remote} ({family:?})");

    let vantage_point = outbound::resolve(remote, family)?;

    let dns = match family {
        Family::V4 => probe_v4(&vantage_point, config)?
            .into_iter()
            .map(IpAddr::V4)
            .collect(),
        Family::V6 => probe_v6(&vantage_point, config)?
            .into_iter()
            .map(IpAddr::V6)
            .collect(),
    };

    Ok(Discovery { vantage_point, dns })
}

fn probe_v4(vantage_point: &VantagePoint, config: &ProbeConfig) -> Result<Vec<Ipv4Addr>, Error> {
    let transport = Transport::open(
        vantage_point.socket_address(config.endpoints.dhcpv4_client_port),
        Some(&vantage_point.interface),
    )?
    .with_receive_buffer_size(dhcpv4::MAX_MESSAGE_SIZE);

    let request = config.dhcpv4.build(vantage_point);

    // Some systems only deliver broadcast replies to a wildcard bind
    // while a DHCP daemon holds the specific address
    let reception = if vantage_point.zone.is_some() {
        Reception::Wildcard
    } else {
        Reception::BoundAddress
    };

    let destination = SocketAddr::V4(config.endpoints.dhcpv4_server);
    let reply =
        transport.send_and_receive(destination, request.as_bytes(), config.timeout, reception)?;

    config.dhcpv4.parse_reply(&request, &reply)
}

fn probe_v6(vantage_point: &VantagePoint, config: &ProbeConfig) -> Result<Vec<Ipv6Addr>, Error> {
    let transport = Transport::open(
        vantage_point.socket_address(config.endpoints.dhcpv6_client_port),
        Some(&vantage_point.interface),
    )?
    .with_receive_buffer_size(dhcpv6::MAX_MESSAGE_SIZE);

    let request = config.dhcpv6.build(vantage_point);

    let server = config.endpoints.dhcpv6_server;
    let destination = SocketAddr::V6(SocketAddrV6::new(
        *server.ip(),
        server.port(),
        0,
        vantage_point.scope_id(),
    ));
    let reply = transport.send_and_receive(
        destination,
        request.as_bytes(),
        config.timeout,
        Reception::BoundAddress,
    )?;

    config.dhcpv6.parse_reply(&request, &reply)
}

#[cfg(test)]
mod tests {
    use std::{net::UdpSocket, thread, time::Duration};

    use super::*;

    /// A DHCPv4 server on the loopback interface that answers one request
    /// with the output of `respond`
    fn dhcpv4_server<F>(respond: F) -> (SocketAddrV4, thread::JoinHandle<Vec<u8>>)
    where
        F: FnOnce(&[u8]) -> Vec<u8> + Send + 'static,
    {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let SocketAddr::V4(address) = server.local_addr().unwrap() else {
            unreachable!("bound to an IPv4 address");
        };

        let handle = thread::spawn(move || {
            let mut buffer = [0; 1500];
            let (length, peer) = server.recv_from(&mut buffer).unwrap();
            let request = buffer[..length].to_vec();

            // The client re-binds before it listens for the reply
            thread::sleep(Duration::from_millis(200));
            server.send_to(&respond(&request), peer).unwrap();
            request
        });

        (address, handle)
    }

    fn ack(request: &[u8], options: &[u8]) -> Vec<u8> {
        let mut reply = vec![0; 240];
        reply[0] = 2;
        reply[1..3].copy_from_slice(&request[1..3]);
        reply[4..8].copy_from_slice(&request[4..8]);
        reply[28..44].copy_from_slice(&request[28..44]);
        reply[236..240].copy_from_slice(&request[236..240]);
        reply.extend_from_slice(options);
        reply
    }

    fn loopback_config(server: SocketAddrV4) -> ProbeConfig {
        ProbeConfig {
            endpoints: Endpoints {
                dhcpv4_client_port: 0,
                dhcpv4_server: server,
                ..Endpoints::default()
            },
            ..ProbeConfig::default()
        }
    }

    #[test]
    fn default_endpoints() {
        let endpoints = Endpoints::default();

        assert_eq!(endpoints.dhcpv4_client_port, 68);
        assert_eq!(endpoints.dhcpv4_server, "255.255.255.255:67".parse().unwrap());
        assert_eq!(endpoints.dhcpv6_client_port, 546);
        assert_eq!(endpoints.dhcpv6_server, "[ff02::1:2]:547".parse().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn discovers_dhcpv4_dns_over_loopback() {
        let (server, handle) = dhcpv4_server(|request| {
            ack(request, &[53, 1, 5, 6, 8, 192, 168, 1, 1, 9, 9, 9, 9, 255])
        });

        let discovery = probe("127.0.0.1:80", Family::V4, &loopback_config(server)).unwrap();
        let request = handle.join().unwrap();

        assert_eq!(request.len(), dhcpv4::MIN_MESSAGE_SIZE);
        assert_eq!(request[0], 1);
        assert_eq!(discovery.vantage_point.ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(
            discovery.dns,
            [
                IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
                IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9))
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn dhcpv4_replies_are_cut_at_maximum_size() {
        // The DNS option only starts after the receive buffer ends
        let (server, handle) = dhcpv4_server(|request| {
            let mut options = vec![0; dhcpv4::MAX_MESSAGE_SIZE];
            options.extend_from_slice(&[6, 4, 192, 168, 1, 1, 255]);
            ack(request, &options)
        });

        let result = probe("127.0.0.1:80", Family::V4, &loopback_config(server));
        handle.join().unwrap();

        assert!(matches!(result, Err(Error::NoDNSFound)));
    }

    #[test]
    fn unresolvable_target() {
        let result = probe("not an address", Family::V4, &ProbeConfig::default());
        assert!(matches!(result, Err(Error::AddressResolutionFailed(_))));
    }

    #[test]
    fn target_of_other_family() {
        let result = Probe::new(Family::V6).probe("127.0.0.1:80");
        assert!(matches!(result, Err(Error::AddressResolutionFailed(_))));
    }
}
