//! A minimal DHCPv4 client message encoder and a reply decoder that extracts DNS servers.
//!
//! <https://datatracker.ietf.org/doc/html/rfc2131#section-2>

use std::net::{IpAddr, Ipv4Addr};

use crate::{Error, VantagePoint};

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;

/// Servers do not send more than this unless the client announces a larger size
pub const MAX_MESSAGE_SIZE: usize = 576;

/// Minimum BOOTP message size, shorter requests are padded
/// (<https://datatracker.ietf.org/doc/html/rfc951>)
pub const MIN_MESSAGE_SIZE: usize = 300;

/// The fixed part of a message, including the magic cookie
const HEADER_SIZE: usize = 240;

const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

const BOOTREQUEST: u8 = 1;
const BOOTREPLY: u8 = 2;
const HARDWARE_TYPE_ETHERNET: u8 = 1;

/// Unicast replies may never reach us while the OS DHCP client holds the address
const FLAG_BROADCAST: u16 = 0x8000;

/// Locally administered, used when the interface has no hardware address
const PLACEHOLDER_HARDWARE_ADDRESS: [u8; 6] = [0x06, 0x05, 0x04, 0x03, 0x02, 0x01];

/// <https://datatracker.ietf.org/doc/html/rfc2132>
mod option {
    pub const PAD: u8 = 0;
    pub const DNS: u8 = 6;
    pub const REQUESTED_IP: u8 = 50;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const PARAMETER_REQUEST_LIST: u8 = 55;
    pub const CLIENT_IDENTIFIER: u8 = 61;
    pub const END: u8 = 255;
}

pub type TransactionId = [u8; 4];

/// The kind of request that is sent to solicit a reply
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MessageType {
    /// Answered with an OFFER
    Discover = 1,

    /// An INIT-REBOOT request for the current address, answered with an ACK or NAK.
    ///
    /// Unlike a DISCOVER this never makes a server reserve an offer.
    #[default]
    Request = 3,

    /// Asks for configuration only, answered with an ACK
    Inform = 8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Codec {
    pub message_type: MessageType,

    /// When disabled, any reply is accepted no matter which transaction it belongs to
    pub verify_transaction_id: bool,
}

/// A complete request message. Every request gets its own transaction id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    bytes: Box<[u8]>,
    transaction_id: TransactionId,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            message_type: MessageType::default(),
            verify_transaction_id: true,
        }
    }
}

impl Codec {
    #[must_use]
    pub fn build(&self, vantage_point: &VantagePoint) -> Request {
        let transaction_id: TransactionId = fastrand::u32(..).to_be_bytes();

        let client_ip = match vantage_point.ip {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
        };

        // Other link types would need their own hardware type, they get the placeholder
        let hardware_address = vantage_point
            .hardware_address
            .as_ref()
            .filter(|address| address.is_ethernet())
            .map(|address| address.as_bytes());
        let chaddr = hardware_address.unwrap_or(&PLACEHOLDER_HARDWARE_ADDRESS);

        let mut bytes = vec![0; HEADER_SIZE];
        bytes[0] = BOOTREQUEST;
        bytes[1] = HARDWARE_TYPE_ETHERNET;
        bytes[2] = chaddr.len() as u8;
        bytes[4..8].copy_from_slice(&transaction_id);
        bytes[10..12].copy_from_slice(&FLAG_BROADCAST.to_be_bytes());

        // Without a hardware address, the client address is the only thing identifying us
        if hardware_address.is_none() || self.message_type == MessageType::Inform {
            bytes[12..16].copy_from_slice(&client_ip.octets());
        }

        bytes[28..28 + chaddr.len()].copy_from_slice(chaddr);
        bytes[236..240].copy_from_slice(&MAGIC_COOKIE);

        bytes.extend_from_slice(&[option::MESSAGE_TYPE, 1, self.message_type as u8]);

        if self.message_type == MessageType::Request {
            bytes.extend_from_slice(&[option::REQUESTED_IP, 4]);
            bytes.extend_from_slice(&client_ip.octets());
        }

        bytes.extend_from_slice(&[option::PARAMETER_REQUEST_LIST, 1, option::DNS]);

        // Some servers (VMware NAT for example) refuse to answer without a client identifier
        if let Some(hardware_address) = hardware_address {
            bytes.extend_from_slice(&[
                option::CLIENT_IDENTIFIER,
                hardware_address.len() as u8 + 1,
                HARDWARE_TYPE_ETHERNET,
            ]);
            bytes.extend_from_slice(hardware_address);
        }

        bytes.push(option::END);

        if bytes.len() < MIN_MESSAGE_SIZE {
            bytes.resize(MIN_MESSAGE_SIZE, 0);
        }

        Request {
            bytes: bytes.into_boxed_slice(),
            transaction_id,
        }
    }

    /// Extract the DNS servers from a reply to `request`
    pub fn parse_reply(&self, request: &Request, reply: &[u8]) -> Result<Vec<Ipv4Addr>, Error> {
        let expected = self
            .verify_transaction_id
            .then_some(&request.transaction_id);
        dns_from_reply(reply, expected)
    }
}

impl Request {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }
}

/// Extract the DNS servers from a DHCP reply.
///
/// Only the first DNS option is honored. The transaction id is checked
/// if one is `expected`.
pub fn dns_from_reply(
    reply: &[u8],
    expected: Option<&TransactionId>,
) -> Result<Vec<Ipv4Addr>, Error> {
    if reply.len() <= HEADER_SIZE {
        return Err(Error::ReplyTooShort);
    }

    if reply[0] != BOOTREPLY {
        return Err(Error::MalformedReply);
    }

    if let Some(expected) = expected {
        if reply[4..8] != expected[..] {
            return Err(Error::TransactionMismatch);
        }
    }

    for entry in Options::new(&reply[HEADER_SIZE..]) {
        let (code, value) = entry?;

        if code == option::DNS {
            let dns: Vec<Ipv4Addr> = value
                .chunks_exact(4)
                .map(|octets| Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]))
                .collect();

            if dns.is_empty() {
                return Err(Error::NoDNSFound);
            }
            return Ok(dns);
        }
    }

    Err(Error::NoDNSFound)
}

/// Iterates over the `(code, value)` pairs of an option stream, up to the END option
struct Options<'a> {
    bytes: &'a [u8],
    position: usize,
    done: bool,
}

impl<'a> Options<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            position: 0,
            done: false,
        }
    }
}

impl<'a> Iterator for Options<'a> {
    type Item = Result<(u8, &'a [u8]), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let Some(&code) = self.bytes.get(self.position) else {
                self.done = true;
                return None;
            };

            match code {
                option::END => {
                    self.done = true;
                    return None;
                },
                option::PAD => self.position += 1,
                _ => break,
            }
        }

        let code = self.bytes[self.position];
        let value_start = self.position + 2;
        let value = self
            .bytes
            .get(self.position + 1)
            .and_then(|&length| self.bytes.get(value_start..value_start + length as usize));

        let Some(value) = value else {
            self.done = true;
            return Some(Err(Error::TruncatedOption));
        };

        self.position = value_start + value.len();
        Some(Ok((code, value)))
    }
}
