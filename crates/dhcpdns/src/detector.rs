use std::net::IpAddr;

use crate::{Error, Family, Probe, Prober};

/// Number of consecutive confirmations after which a failed probe is no longer
/// considered a transient blip
pub const DEFAULT_KEEP_THRESHOLD: u32 = 3;

/// Repeatedly probes a fixed target and tracks whether the result is still trustworthy.
///
/// The detector keeps its state in memory only. It is not synchronized,
/// callers that share one between threads have to serialize access themselves.
#[derive(Debug)]
pub struct Detector<P: Prober = Probe> {
    remote: String,
    prober: P,
    keep_threshold: u32,

    /// The vantage point address of the last successful probe in this round
    last_active_ip: Option<IpAddr>,

    /// How many successful probes in a row came from `last_active_ip`
    consistency_count: u32,

    dns: Vec<IpAddr>,
    last_error: Option<Error>,
}

/// A snapshot of a [Detector]'s state
#[derive(Clone, Copy, Debug)]
pub struct Status<'a> {
    pub consistency_count: u32,
    pub last_active_ip: Option<IpAddr>,

    /// The DNS servers that are still considered valid, possibly from an earlier probe
    pub dns: &'a [IpAddr],

    /// Why the most recent probe failed, `None` if it succeeded
    pub last_error: Option<&'a Error>,
}

impl Detector {
    /// Detects DHCP DNS servers on the interface used to reach `remote` over IPv4
    #[must_use]
    pub fn v4(remote: impl Into<String>) -> Self {
        Self::new(remote, Probe::new(Family::V4))
    }

    /// Detects DHCPv6 DNS servers on the interface used to reach `remote` over IPv6
    #[must_use]
    pub fn v6(remote: impl Into<String>) -> Self {
        Self::new(remote, Probe::new(Family::V6))
    }
}

impl<P: Prober> Detector<P> {
    #[must_use]
    pub fn new(remote: impl Into<String>, prober: P) -> Self {
        Self {
            remote: remote.into(),
            prober,
            keep_threshold: DEFAULT_KEEP_THRESHOLD,
            last_active_ip: None,
            consistency_count: 0,
            dns: vec![],
            last_error: None,
        }
    }

    #[must_use]
    pub fn with_keep_threshold(mut self, keep_threshold: u32) -> Self {
        self.keep_threshold = keep_threshold;
        self
    }

    #[must_use]
    pub fn remote(&self) -> &str {
        &self.remote
    }

    #[must_use]
    pub fn prober(&self) -> &P {
        &self.prober
    }

    /// Probe once and merge the outcome into the state
    pub fn detect(&mut self) -> Status<'_> {
        let outcome = self
            .prober
            .probe(&self.remote)
            .and_then(|discovery| {
                if discovery.dns.is_empty() {
                    Err(Error::NoDNSFound)
                } else {
                    Ok(discovery)
                }
            });

        match outcome {
            Ok(discovery) => {
                let active_ip = discovery.vantage_point.ip;

                if self.last_active_ip == Some(active_ip) {
                    self.consistency_count = self.consistency_count.saturating_add(1);
                } else {
                    log::debug!(
                        "Active IP towards {} is now {active_ip} (was {:?})",
                        self.remote,
                        self.last_active_ip
                    );
                    self.last_active_ip = Some(active_ip);
                    self.consistency_count = 0;
                }

                self.dns = discovery.dns;
                self.last_error = None;
            },
            Err(error) => {
                // Without an active IP there is no confirmation to weigh the failure against
                if self.last_active_ip.is_some() {
                    if self.consistency_count < self.keep_threshold {
                        log::debug!(
                            "Probing {} failed, keeping the previous DNS servers",
                            self.remote
                        );
                    } else {
                        log::debug!(
                            "Probing {} failed after {} confirmations, dropping the DNS servers",
                            self.remote,
                            self.consistency_count
                        );
                        self.last_active_ip = None;
                        self.consistency_count = 0;
                        self.dns.clear();
                    }
                }

                self.last_error = Some(error);
            },
        }

        self.status()
    }

    /// Forget the active IP, so that the next [Detector::detect] starts counting anew.
    ///
    /// The known DNS servers are kept until a probe replaces them or the
    /// keep-threshold drops them.
    pub fn new_round(&mut self) {
        self.last_active_ip = None;
        self.consistency_count = 0;
    }

    #[must_use]
    pub fn status(&self) -> Status<'_> {
        Status {
            consistency_count: self.consistency_count,
            last_active_ip: self.last_active_ip,
            dns: &self.dns,
            last_error: self.last_error.as_ref(),
        }
    }
}
