//! Responsible for creating and managing the global dhcpdns settings

mod cli;

use std::{ffi::OsString, sync::LazyLock, time::Duration};

use clap::Parser;
use dhcpdns::{
    dhcpv4::{self, MessageType},
    dhcpv6::{self, Duid},
    Family, ProbeConfig, DEFAULT_KEEP_THRESHOLD,
};

/// The global settings singleton
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::init);

/// Which address families are probed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Families {
    #[default]
    Both,
    V4,
    V6,
}

/// Holds all the configurable information for a dhcpdns run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Negative values run forever
    pub rounds: i64,

    /// Pause between two rounds
    pub interval: Duration,

    pub target4: String,
    pub target6: String,
    pub families: Families,
    pub timeout: Duration,
    pub keep_threshold: u32,

    /// Rounds after which the detectors forget their active IP, `0` disables
    pub revalidate_every: u32,

    pub message_type: MessageType,
    pub broadcast_only: bool,
    pub hardware_duid: bool,
}

impl Settings {
    /// Parse the process' command line, exiting with a usage message if it is invalid
    #[must_use]
    pub fn init() -> Self {
        let mut settings = Self::default();

        let args = cli::Arguments::parse();

        args.update_settings(&mut settings);

        settings
    }

    /// Parse the given command line, the first item being the program name
    pub fn from_arguments<I, T>(arguments: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let mut settings = Self::default();
        cli::Arguments::try_parse_from(arguments)?.update_settings(&mut settings);
        Ok(settings)
    }

    /// The families to probe, in probing order
    #[must_use]
    pub fn families(&self) -> &'static [Family] {
        match self.families {
            Families::Both => &[Family::V6, Family::V4],
            Families::V4 => &[Family::V4],
            Families::V6 => &[Family::V6],
        }
    }

    #[must_use]
    pub fn target(&self, family: Family) -> &str {
        match family {
            Family::V4 => &self.target4,
            Family::V6 => &self.target6,
        }
    }

    /// Whether detectors should start a new round before round `round` (counted from zero)
    #[must_use]
    pub fn revalidates_before(&self, round: u64) -> bool {
        self.revalidate_every != 0 && round != 0 && round % u64::from(self.revalidate_every) == 0
    }

    #[must_use]
    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            timeout: self.timeout,
            dhcpv4: dhcpv4::Codec {
                message_type: self.message_type,
                verify_transaction_id: !self.broadcast_only,
            },
            dhcpv6: dhcpv6::Codec {
                duid: if self.hardware_duid {
                    Duid::HardwareDerived
                } else {
                    Duid::Anonymous
                },
                ..dhcpv6::Codec::default()
            },
            ..ProbeConfig::default()
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rounds: -1,
            interval: Duration::from_secs(30),
            target4: "8.8.8.8:80".to_string(),
            target6: "[2001:4860:4860::8888]:80".to_string(),
            families: Families::default(),
            timeout: dhcpdns::transport::DEFAULT_TIMEOUT,
            keep_threshold: DEFAULT_KEEP_THRESHOLD,
            revalidate_every: 10,
            message_type: MessageType::default(),
            broadcast_only: false,
            hardware_duid: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::from_arguments(["dhcpdns"]).unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.rounds, -1);
        assert_eq!(settings.families(), &[Family::V6, Family::V4]);
        assert_eq!(settings.probe_config(), ProbeConfig::default());
    }

    #[test]
    fn overrides() {
        let settings = Settings::from_arguments([
            "dhcpdns",
            "-n",
            "5",
            "--interval",
            "1",
            "--target4",
            "1.1.1.1:53",
            "--family",
            "v4",
            "--timeout",
            "3",
            "--keep-threshold",
            "7",
            "--revalidate-every",
            "0",
            "--message",
            "inform",
        ])
        .unwrap();

        assert_eq!(settings.rounds, 5);
        assert_eq!(settings.interval, Duration::from_secs(1));
        assert_eq!(settings.target(Family::V4), "1.1.1.1:53");
        assert_eq!(settings.target(Family::V6), "[2001:4860:4860::8888]:80");
        assert_eq!(settings.families(), &[Family::V4]);
        assert_eq!(settings.timeout, Duration::from_secs(3));
        assert_eq!(settings.keep_threshold, 7);
        assert_eq!(settings.message_type, MessageType::Inform);
    }

    #[test]
    fn negative_rounds() {
        let settings = Settings::from_arguments(["dhcpdns", "-n", "-1"]).unwrap();
        assert_eq!(settings.rounds, -1);

        let settings = Settings::from_arguments(["dhcpdns", "--rounds", "2"]).unwrap();
        assert_eq!(settings.rounds, 2);
    }

    #[test]
    fn probe_flags() {
        let settings =
            Settings::from_arguments(["dhcpdns", "--broadcast-only", "--hardware-duid"]).unwrap();
        let config = settings.probe_config();

        assert!(!config.dhcpv4.verify_transaction_id);
        assert_eq!(config.dhcpv6.duid, Duid::HardwareDerived);
        assert!(config.dhcpv6.verify_transaction_id);
    }

    #[test]
    fn invalid_arguments() {
        assert!(Settings::from_arguments(["dhcpdns", "--family", "v5"]).is_err());
        assert!(Settings::from_arguments(["dhcpdns", "--timeout", "0"]).is_err());
        assert!(Settings::from_arguments(["dhcpdns", "--rounds", "many"]).is_err());
    }

    #[test]
    fn revalidation_schedule() {
        let settings = Settings::default();
        assert!(!settings.revalidates_before(0));
        assert!(!settings.revalidates_before(9));
        assert!(settings.revalidates_before(10));
        assert!(settings.revalidates_before(20));

        let never = Settings {
            revalidate_every: 0,
            ..Settings::default()
        };
        assert!(!never.revalidates_before(10));
    }
}
