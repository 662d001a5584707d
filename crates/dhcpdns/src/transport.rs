//! UDP sockets bound to a vantage point, for a single request/reply exchange

use std::{
    io,
    net::{SocketAddr, UdpSocket},
    time::Duration,
};

use socket2::{Domain, Protocol, Socket, Type};

use crate::{display_local, Error, Family};

/// Deadline for sending the request and for receiving the reply, each
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 1500;

/// Socket options whose availability differs between platforms
pub trait SocketCapabilities {
    /// Allow binding a port that another local service (usually the OS DHCP client) holds.
    ///
    /// On windows `SO_REUSEADDR` does not help against the DHCP client service,
    /// the first bind receives the reply there, so the option is left alone.
    fn enable_address_reuse(&self, socket: &Socket) -> io::Result<()> {
        if cfg!(windows) {
            return Ok(());
        }
        socket.set_reuse_address(true)
    }

    /// Restrict the socket to one interface, to disambiguate multi-homed hosts
    fn bind_to_device(&self, socket: &Socket, device: &str) -> io::Result<()>;
}

/// Binds sockets to their device with `SO_BINDTODEVICE`
#[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceBinding;

/// For platforms without `SO_BINDTODEVICE`. Binding to a device does nothing,
/// the bound address alone decides which interface is used.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDeviceBinding;

#[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
pub type PlatformCapabilities = DeviceBinding;

#[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
pub type PlatformCapabilities = NoDeviceBinding;

#[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
impl SocketCapabilities for DeviceBinding {
    fn bind_to_device(&self, socket: &Socket, device: &str) -> io::Result<()> {
        socket.bind_device(Some(device.as_bytes()))
    }
}

impl SocketCapabilities for NoDeviceBinding {
    fn bind_to_device(&self, _socket: &Socket, _device: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Where the reply to a request is awaited
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Reception {
    /// On the socket the request was sent from
    #[default]
    BoundAddress,

    /// On a fresh socket bound to the wildcard address and the same port.
    ///
    /// Some systems deliver broadcast replies only to a wildcard bind when a
    /// DHCP daemon already holds the specific local address.
    Wildcard,
}

/// A bound UDP socket. It is closed when the transport is dropped
/// or consumed by [Transport::send_and_receive].
#[derive(Debug)]
pub struct Transport<C: SocketCapabilities = PlatformCapabilities> {
    socket: UdpSocket,
    local: SocketAddr,
    device: Option<String>,
    receive_buffer_size: usize,
    capabilities: C,
}

impl Transport {
    /// Open a socket bound to `local`, optionally restricted to `device`
    pub fn open(local: SocketAddr, device: Option<&str>) -> Result<Self, Error> {
        Self::open_with(local, device, PlatformCapabilities::default())
    }
}

impl<C: SocketCapabilities> Transport<C> {
    pub fn open_with(local: SocketAddr, device: Option<&str>, capabilities: C) -> Result<Self, Error> {
        let socket = open_socket(local, device, &capabilities).map_err(Error::SocketOpenFailed)?;
        let local = socket.local_addr().map_err(Error::SocketOpenFailed)?;
        log::debug!("Bound socket to {}", display_local(&local));

        Ok(Self {
            socket,
            local,
            device: device.map(str::to_owned),
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            capabilities,
        })
    }

    /// Replies longer than `size` bytes are truncated
    #[must_use]
    pub fn with_receive_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer_size = size;
        self
    }

    #[must_use]
    pub fn local_address(&self) -> SocketAddr {
        self.local
    }

    /// Send `message` to `destination` and wait for a single reply.
    ///
    /// `timeout` bounds the send and the receive individually and must not be zero.
    /// The socket is closed before this returns, no matter the outcome.
    pub fn send_and_receive(
        self,
        destination: SocketAddr,
        message: &[u8],
        timeout: Duration,
        reception: Reception,
    ) -> Result<Vec<u8>, Error> {
        let Self {
            socket,
            local,
            device,
            receive_buffer_size,
            capabilities,
        } = self;

        socket
            .set_write_timeout(Some(timeout))
            .map_err(Error::SendFailed)?;
        socket
            .send_to(message, destination)
            .map_err(Error::SendFailed)?;
        log::trace!("Sent {} bytes to {destination}", message.len());

        let socket = match reception {
            Reception::BoundAddress => socket,
            Reception::Wildcard => {
                // The specific bind has to be gone before the wildcard one takes the port
                drop(socket);

                let wildcard = SocketAddr::new(Family::of(local.ip()).unspecified(), local.port());
                log::debug!("Awaiting reply on {wildcard}");
                open_socket(wildcard, device.as_deref(), &capabilities)
                    .map_err(Error::SocketOpenFailed)?
            },
        };

        socket
            .set_read_timeout(Some(timeout))
            .map_err(Error::ReceiveTimeoutOrFailed)?;

        let mut buffer = vec![0; receive_buffer_size];
        let (length, peer) = socket
            .recv_from(&mut buffer)
            .map_err(Error::ReceiveTimeoutOrFailed)?;
        buffer.truncate(length);
        log::trace!("Received {length} bytes from {peer}");

        Ok(buffer)
    }
}

fn open_socket<C: SocketCapabilities>(
    local: SocketAddr,
    device: Option<&str>,
    capabilities: &C,
) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(local), Type::DGRAM, Some(Protocol::UDP))?;
    capabilities.enable_address_reuse(&socket)?;

    if let Some(device) = device {
        if let Err(error) = capabilities.bind_to_device(&socket, device) {
            log::warn!("Failed to bind socket to {device}: {error}");
        }
    }

    match local {
        SocketAddr::V4(_) => socket.set_broadcast(true)?,
        SocketAddr::V6(v6) if v6.scope_id() != 0 => socket.set_multicast_if_v6(v6.scope_id())?,
        SocketAddr::V6(_) => {},
    }

    socket.bind(&local.into())?;
    Ok(socket.into())
}
