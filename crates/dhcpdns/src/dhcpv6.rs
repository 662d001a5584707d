//! A minimal DHCPv6 INFORMATION-REQUEST encoder and a REPLY decoder that extracts DNS servers.
//!
//! <https://datatracker.ietf.org/doc/html/rfc8415#section-18.2.6>

use std::net::Ipv6Addr;

use crate::{Error, VantagePoint};

pub const CLIENT_PORT: u16 = 546;
pub const SERVER_PORT: u16 = 547;

/// `ff02::1:2`
pub const ALL_DHCP_RELAY_AGENTS_AND_SERVERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 1, 2);

pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Message type and transaction id
const HEADER_SIZE: usize = 4;

const INFORMATION_REQUEST: u8 = 11;
const REPLY: u8 = 7;

mod option {
    pub const CLIENT_ID: u16 = 1;
    pub const OPTION_REQUEST: u16 = 6;
    pub const ELAPSED_TIME: u16 = 8;
    pub const DNS_SERVERS: u16 = 23;
    pub const INFORMATION_REFRESH_TIME: u16 = 32;
    pub const INF_MAX_RT: u16 = 83;
}

const DUID_LL: u16 = 3;
const HARDWARE_TYPE_ETHERNET: u16 = 1;

/// A DUID-LLT with a fixed time and a placeholder link-layer address, as recommended
/// by the anonymity profile (<https://datatracker.ietf.org/doc/html/rfc7844#section-4.3>)
const ANONYMOUS_DUID: [u8; 14] = [
    0x00, 0x01, // DUID-LLT
    0x00, 0x01, // ethernet
    0x26, 0xeb, 0x58, 0x35, // time
    0x06, 0x05, 0x04, 0x03, 0x02, 0x01, // link-layer address
];

pub type TransactionId = [u8; 3];

/// How the client identifies itself
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Duid {
    #[default]
    Anonymous,

    /// A DUID-LL built from the interface's hardware address.
    /// Falls back to [Duid::Anonymous] for interfaces without an Ethernet address.
    HardwareDerived,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Codec {
    /// When disabled, any REPLY is accepted no matter which transaction it belongs to
    pub verify_transaction_id: bool,

    /// Also ask for `INF_MAX_RT` and the information refresh time
    pub request_refresh_options: bool,

    pub duid: Duid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    bytes: Box<[u8]>,
    transaction_id: TransactionId,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            verify_transaction_id: true,
            request_refresh_options: true,
            duid: Duid::default(),
        }
    }
}

impl Codec {
    #[must_use]
    pub fn build(&self, vantage_point: &VantagePoint) -> Request {
        let [_, a, b, c] = fastrand::u32(..).to_be_bytes();
        let transaction_id = [a, b, c];

        let mut bytes = Vec::with_capacity(64);
        bytes.push(INFORMATION_REQUEST);
        bytes.extend_from_slice(&transaction_id);

        // We have not been waiting for anything yet
        push_option(&mut bytes, option::ELAPSED_TIME, &0_u16.to_be_bytes());

        push_option(&mut bytes, option::CLIENT_ID, &self.duid(vantage_point));

        let mut requested = vec![option::DNS_SERVERS];
        if self.request_refresh_options {
            requested.extend([option::INF_MAX_RT, option::INFORMATION_REFRESH_TIME]);
        }
        let requested: Vec<u8> = requested
            .into_iter()
            .flat_map(u16::to_be_bytes)
            .collect();
        push_option(&mut bytes, option::OPTION_REQUEST, &requested);

        Request {
            bytes: bytes.into_boxed_slice(),
            transaction_id,
        }
    }

    fn duid(&self, vantage_point: &VantagePoint) -> Vec<u8> {
        match (self.duid, vantage_point.hardware_address) {
            (Duid::HardwareDerived, Some(hardware_address))
                if hardware_address.is_ethernet() =>
            {
                let mut duid = Vec::with_capacity(4 + hardware_address.len());
                duid.extend_from_slice(&DUID_LL.to_be_bytes());
                duid.extend_from_slice(&HARDWARE_TYPE_ETHERNET.to_be_bytes());
                duid.extend_from_slice(hardware_address.as_bytes());
                duid
            },
            _ => ANONYMOUS_DUID.to_vec(),
        }
    }

    /// Extract the DNS servers from a reply to `request`
    pub fn parse_reply(&self, request: &Request, reply: &[u8]) -> Result<Vec<Ipv6Addr>, Error> {
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

fn push_option(bytes: &mut Vec<u8>, code: u16, value: &[u8]) {
    bytes.extend_from_slice(&code.to_be_bytes());
    bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
    bytes.extend_from_slice(value);
}

/// Extract the DNS servers from a DHCPv6 REPLY
/// (<https://datatracker.ietf.org/doc/html/rfc3646#section-3>).
///
/// Only the first DNS servers option is honored. The transaction id is checked
/// if one is `expected`.
pub fn dns_from_reply(
    reply: &[u8],
    expected: Option<&TransactionId>,
) -> Result<Vec<Ipv6Addr>, Error> {
    if reply.len() < HEADER_SIZE {
        return Err(Error::ReplyTooShort);
    }

    if reply[0] != REPLY {
        return Err(Error::MalformedReply);
    }

    if let Some(expected) = expected {
        if reply[1..4] != expected[..] {
            return Err(Error::TransactionMismatch);
        }
    }

    let mut position = HEADER_SIZE;
    while position < reply.len() {
        let Some(header) = reply.get(position..position + 4) else {
            return Err(Error::TruncatedOption);
        };
        let code = u16::from_be_bytes([header[0], header[1]]);
        let length = u16::from_be_bytes([header[2], header[3]]) as usize;

        let value_start = position + 4;
        let Some(value) = reply.get(value_start..value_start + length) else {
            return Err(Error::TruncatedOption);
        };

        if code == option::DNS_SERVERS {
            let dns: Vec<Ipv6Addr> = value
                .chunks_exact(16)
                .map(|octets| {
                    let octets: [u8; 16] = octets.try_into().expect("chunk is 16 bytes long");
                    Ipv6Addr::from(octets)
                })
                .collect();

            if dns.is_empty() {
                return Err(Error::NoDNSFound);
            }
            return Ok(dns);
        }

        position = value_start + length;
    }

    Err(Error::NoDNSFound)
}
