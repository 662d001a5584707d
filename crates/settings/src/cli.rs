use std::time::Duration;

use dhcpdns::dhcpv4::MessageType;

use crate::{Families, Settings};

#[derive(clap::Parser, Debug)]
#[command(name = "dhcpdns", version, about = "Discovers the DNS servers handed out by DHCP", long_about = None)]
pub struct Arguments {
    /// Number of detection rounds, negative values run forever
    #[arg(short = 'n', long, allow_negative_numbers = true)]
    rounds: Option<i64>,

    /// Seconds to sleep between two rounds
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Remote address whose IPv4 route selects the interface
    #[arg(long, value_name = "ADDR")]
    target4: Option<String>,

    /// Remote address whose IPv6 route selects the interface
    #[arg(long, value_name = "ADDR")]
    target6: Option<String>,

    /// Address families to probe
    #[arg(long, value_enum)]
    family: Option<Families>,

    /// Seconds to wait for sending the request and for the reply
    #[arg(long, value_name = "SECONDS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Failed probes after this many confirmations drop the known DNS servers
    #[arg(long, value_name = "N")]
    keep_threshold: Option<u32>,

    /// Forget the active IP every N rounds, 0 never does
    #[arg(long, value_name = "N")]
    revalidate_every: Option<u32>,

    /// DHCPv4 message used to solicit a reply
    #[arg(long, value_enum)]
    message: Option<Message>,

    /// Accept DHCPv4 replies regardless of their transaction id
    #[arg(long, action = clap::ArgAction::SetTrue)]
    broadcast_only: bool,

    /// Identify with the interface's hardware address in DHCPv6
    #[arg(long, action = clap::ArgAction::SetTrue)]
    hardware_duid: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Message {
    Discover,
    Inform,
    Request,
}

impl Arguments {
    pub(crate) fn update_settings(self, settings: &mut Settings) {
        if let Some(rounds) = self.rounds {
            settings.rounds = rounds;
        }

        if let Some(interval) = self.interval {
            settings.interval = Duration::from_secs(interval);
        }

        if let Some(target4) = self.target4 {
            settings.target4 = target4;
        }

        if let Some(target6) = self.target6 {
            settings.target6 = target6;
        }

        if let Some(family) = self.family {
            settings.families = family;
        }

        if let Some(timeout) = self.timeout {
            settings.timeout = Duration::from_secs(timeout);
        }

        if let Some(keep_threshold) = self.keep_threshold {
            settings.keep_threshold = keep_threshold;
        }

        if let Some(revalidate_every) = self.revalidate_every {
            settings.revalidate_every = revalidate_every;
        }

        if let Some(message) = self.message {
            settings.message_type = match message {
                Message::Discover => MessageType::Discover,
                Message::Inform => MessageType::Inform,
                Message::Request => MessageType::Request,
            };
        }

        settings.broadcast_only |= self.broadcast_only;
        settings.hardware_duid |= self.hardware_duid;
    }
}
