//! A snapshot of the local network interfaces and their addresses

use std::{
    fmt,
    net::{IpAddr, Ipv6Addr},
};

use crate::Error;

/// Length of an IEEE 802 MAC address
pub const ETHERNET_ADDRESS_LENGTH: usize = 6;

/// The longest hardware address that fits into the `chaddr` field of a DHCP message
pub const MAX_HARDWARE_ADDRESS_LENGTH: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardwareAddress {
    bytes: [u8; MAX_HARDWARE_ADDRESS_LENGTH],
    length: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interface {
    pub name: String,

    /// The index used as the scope of link-local addresses, `0` if unknown
    pub index: u32,

    /// Whether the interface is operational
    /// (see <https://www.kernel.org/doc/html/latest/networking/operstates.html>)
    pub running: bool,

    pub addresses: Vec<IpAddr>,

    /// Some interface types (tunnels, cellular links) have no hardware address at all
    pub hardware_address: Option<HardwareAddress>,
}

impl HardwareAddress {
    /// Returns `None` for addresses that are empty, all zeros or too long to be sent
    #[must_use]
    pub fn new(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty()
            || bytes.len() > MAX_HARDWARE_ADDRESS_LENGTH
            || bytes.iter().all(|&b| b == 0)
        {
            return None;
        }

        let mut address = Self {
            bytes: [0; MAX_HARDWARE_ADDRESS_LENGTH],
            length: bytes.len() as u8,
        };
        address.bytes[..bytes.len()].copy_from_slice(bytes);
        Some(address)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.length as usize]
    }

    /// Whether the address can be announced with the Ethernet hardware type
    #[must_use]
    pub fn is_ethernet(&self) -> bool {
        self.len() == ETHERNET_ADDRESS_LENGTH
    }

    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.length as usize
    }
}

impl fmt::Display for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.as_bytes().iter().enumerate() {
            if i != 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for HardwareAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HardwareAddress({self})")
    }
}

impl Interface {
    #[must_use]
    pub fn owns(&self, ip: IpAddr) -> bool {
        self.addresses.contains(&ip)
    }

    /// The first link-local unicast IPv6 address (`fe80::/10`) of the interface
    #[must_use]
    pub fn link_local_v6(&self) -> Option<Ipv6Addr> {
        self.addresses.iter().find_map(|address| match address {
            IpAddr::V6(v6) if is_link_local_unicast(v6) => Some(*v6),
            _ => None,
        })
    }
}

#[must_use]
pub fn is_link_local_unicast(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

/// Enumerate all local interfaces, in the order the OS reports them
#[cfg(unix)]
pub fn interfaces() -> Result<Vec<Interface>, Error> {
    use std::{ffi::CStr, io, ptr};

    /// Frees the list returned by `getifaddrs` on every path
    struct InterfaceAddresses(*mut libc::ifaddrs);

    impl Drop for InterfaceAddresses {
        fn drop(&mut self) {
            unsafe { libc::freeifaddrs(self.0) };
        }
    }

    let mut head: *mut libc::ifaddrs = ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut head) } != 0 {
        return Err(Error::InterfaceEnumerationFailed(
            io::Error::last_os_error(),
        ));
    }
    let list = InterfaceAddresses(head);

    let mut interfaces: Vec<Interface> = vec![];
    let mut cursor = list.0;
    while !cursor.is_null() {
        // SAFETY: cursor points into the list owned by "list", which outlives this loop
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;

        if entry.ifa_name.is_null() {
            continue;
        }

        let name = unsafe { CStr::from_ptr(entry.ifa_name) }
            .to_string_lossy()
            .into_owned();

        let position = match interfaces.iter().position(|i| i.name == name) {
            Some(position) => position,
            None => {
                interfaces.push(Interface {
                    index: unsafe { libc::if_nametoindex(entry.ifa_name) },
                    running: (entry.ifa_flags as libc::c_int) & libc::IFF_RUNNING != 0,
                    name,
                    addresses: vec![],
                    hardware_address: None,
                });
                interfaces.len() - 1
            },
        };
        let interface = &mut interfaces[position];

        if entry.ifa_addr.is_null() {
            continue;
        }

        // SAFETY: the family tells us which sockaddr type is actually stored
        unsafe {
            match (*entry.ifa_addr).sa_family as libc::c_int {
                libc::AF_INET => {
                    let address = &*(entry.ifa_addr as *const libc::sockaddr_in);
                    let ip = u32::from_be(address.sin_addr.s_addr);
                    interface.addresses.push(IpAddr::V4(ip.into()));
                },
                libc::AF_INET6 => {
                    let address = &*(entry.ifa_addr as *const libc::sockaddr_in6);
                    let ip = without_embedded_scope(Ipv6Addr::from(address.sin6_addr.s6_addr));
                    interface.addresses.push(IpAddr::V6(ip));
                },
                #[cfg(any(target_os = "linux", target_os = "android"))]
                libc::AF_PACKET => {
                    let address = &*(entry.ifa_addr as *const libc::sockaddr_ll);
                    let length = (address.sll_halen as usize).min(address.sll_addr.len());
                    interface.hardware_address = HardwareAddress::new(&address.sll_addr[..length]);
                },
                #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
                libc::AF_LINK => {
                    let address = &*(entry.ifa_addr as *const libc::sockaddr_dl);
                    // The link-layer address follows the interface name in sdl_data
                    let base = address.sdl_data.as_ptr() as *const u8;
                    let bytes = std::slice::from_raw_parts(
                        base.add(address.sdl_nlen as usize),
                        address.sdl_alen as usize,
                    );
                    interface.hardware_address = HardwareAddress::new(bytes);
                },
                _ => {},
            }
        }
    }

    log::trace!("Found {} network interfaces", interfaces.len());
    Ok(interfaces)
}

/// The KAME stack embeds the scope id into the second segment of link-local addresses
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
fn without_embedded_scope(ip: Ipv6Addr) -> Ipv6Addr {
    if !is_link_local_unicast(&ip) {
        return ip;
    }

    let mut segments = ip.segments();
    segments[1] = 0;
    segments.into()
}

#[cfg(all(
    unix,
    not(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))
))]
fn without_embedded_scope(ip: Ipv6Addr) -> Ipv6Addr {
    ip
}

/// Enumerate all local adapters, in the order the OS reports them
#[cfg(windows)]
pub fn interfaces() -> Result<Vec<Interface>, Error> {
    use std::{io, net::Ipv4Addr};

    use windows::Win32::{
        NetworkManagement::{
            IpHelper::{
                GetAdaptersAddresses, GAA_FLAG_SKIP_ANYCAST, GAA_FLAG_SKIP_DNS_SERVER,
                GAA_FLAG_SKIP_MULTICAST, IP_ADAPTER_ADDRESSES_LH,
            },
            Ndis::IfOperStatusUp,
        },
        Networking::WinSock::{AF_INET, AF_INET6, AF_UNSPEC, SOCKADDR_IN, SOCKADDR_IN6},
    };

    const ERROR_SUCCESS: u32 = 0;
    const ERROR_BUFFER_OVERFLOW: u32 = 111;

    // Recommended initial size, the call reports the real one if it is too small
    let mut buffer_size: u32 = 15_000;
    let mut buffer: Vec<u64>;

    loop {
        // u64 elements keep the adapter structs aligned
        buffer = vec![0; (buffer_size as usize).div_ceil(8)];
        let result = unsafe {
            GetAdaptersAddresses(
                AF_UNSPEC.0 as u32,
                GAA_FLAG_SKIP_ANYCAST | GAA_FLAG_SKIP_MULTICAST | GAA_FLAG_SKIP_DNS_SERVER,
                None,
                Some(buffer.as_mut_ptr() as *mut IP_ADAPTER_ADDRESSES_LH),
                &mut buffer_size,
            )
        };

        match result.0 {
            ERROR_SUCCESS => break,
            ERROR_BUFFER_OVERFLOW => continue,
            code => {
                return Err(Error::InterfaceEnumerationFailed(
                    io::Error::from_raw_os_error(code as i32),
                ))
            },
        }
    }

    let mut interfaces = vec![];
    let mut adapter_ptr = buffer.as_ptr() as *const IP_ADAPTER_ADDRESSES_LH;

    // SAFETY: the list lives inside "buffer", which outlives this loop
    unsafe {
        while !adapter_ptr.is_null() {
            let adapter = &*adapter_ptr;
            adapter_ptr = adapter.Next;

            let name = if adapter.FriendlyName.is_null() {
                String::new()
            } else {
                String::from_utf16_lossy(adapter.FriendlyName.as_wide())
            };

            let index = match adapter.Anonymous1.Anonymous.IfIndex {
                0 => adapter.Ipv6IfIndex,
                index => index,
            };

            let mut addresses = vec![];
            let mut unicast_ptr = adapter.FirstUnicastAddress;
            while !unicast_ptr.is_null() {
                let unicast = &*unicast_ptr;
                unicast_ptr = unicast.Next;

                let sockaddr = unicast.Address.lpSockaddr;
                if sockaddr.is_null() {
                    continue;
                }

                match (*sockaddr).sa_family {
                    AF_INET => {
                        let address = &*(sockaddr as *const SOCKADDR_IN);
                        let ip = u32::from_be(address.sin_addr.S_un.S_addr);
                        addresses.push(IpAddr::V4(Ipv4Addr::from(ip)));
                    },
                    AF_INET6 => {
                        let address = &*(sockaddr as *const SOCKADDR_IN6);
                        addresses.push(IpAddr::V6(Ipv6Addr::from(address.sin6_addr.u.Byte)));
                    },
                    _ => {},
                }
            }

            let length = (adapter.PhysicalAddressLength as usize).min(adapter.PhysicalAddress.len());

            interfaces.push(Interface {
                name,
                index,
                running: adapter.OperStatus == IfOperStatusUp,
                addresses,
                hardware_address: HardwareAddress::new(&adapter.PhysicalAddress[..length]),
            });
        }
    }

    log::trace!("Found {} network adapters", interfaces.len());
    Ok(interfaces)
}

#[cfg(not(any(unix, windows)))]
pub fn interfaces() -> Result<Vec<Interface>, Error> {
    Err(Error::InterfaceEnumerationFailed(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "interface enumeration is not supported on this platform",
    )))
}
