use std::{cell::RefCell, collections::VecDeque, io, net::IpAddr};

use dhcpdns::{Detector, Discovery, Error, Prober, VantagePoint};

/// Replays a fixed sequence of probe outcomes
#[derive(Debug, Default)]
struct Script {
    outcomes: RefCell<VecDeque<Result<Discovery, Error>>>,
}

impl Script {
    fn success(self, active_ip: &str, dns: &[&str]) -> Self {
        let discovery = Discovery {
            vantage_point: VantagePoint {
                ip: active_ip.parse().unwrap(),
                interface: "eth0".to_string(),
                index: 2,
                zone: Some("eth0".to_string()),
                hardware_address: None,
            },
            dns: dns.iter().map(|ip| ip.parse().unwrap()).collect(),
        };
        self.outcomes.borrow_mut().push_back(Ok(discovery));
        self
    }

    fn failure(self) -> Self {
        let timeout = Error::ReceiveTimeoutOrFailed(io::ErrorKind::WouldBlock.into());
        self.outcomes.borrow_mut().push_back(Err(timeout));
        self
    }
}

impl Prober for Script {
    fn probe(&self, _remote: &str) -> Result<Discovery, Error> {
        self.outcomes
            .borrow_mut()
            .pop_front()
            .expect("probed more often than scripted")
    }
}

fn ips(ips: &[&str]) -> Vec<IpAddr> {
    ips.iter().map(|ip| ip.parse().unwrap()).collect()
}

const ACTIVE: &str = "192.168.1.20";

#[test]
fn consistency_grows_while_ip_is_stable() {
    let script = Script::default()
        .success(ACTIVE, &["192.168.1.1"])
        .success(ACTIVE, &["192.168.1.1"])
        .success(ACTIVE, &["192.168.1.1"]);
    let mut detector = Detector::new("8.8.8.8:80", script);

    for expected_count in 0..3 {
        let status = detector.detect();

        assert_eq!(status.consistency_count, expected_count);
        assert_eq!(status.last_active_ip, Some(ACTIVE.parse().unwrap()));
        assert_eq!(status.dns, ips(&["192.168.1.1"]));
        assert!(status.last_error.is_none());
    }
}

#[test]
fn transient_failure_keeps_dns() {
    let script = Script::default()
        .success(ACTIVE, &["192.168.1.1"])
        .success(ACTIVE, &["192.168.1.1"])
        .success(ACTIVE, &["192.168.1.1", "192.168.1.2"])
        .failure();
    let mut detector = Detector::new("8.8.8.8:80", script).with_keep_threshold(3);

    for _ in 0..3 {
        detector.detect();
    }
    let status = detector.detect();

    assert_eq!(status.consistency_count, 2);
    assert_eq!(status.last_active_ip, Some(ACTIVE.parse().unwrap()));
    assert_eq!(status.dns, ips(&["192.168.1.1", "192.168.1.2"]));
    assert!(matches!(
        status.last_error,
        Some(Error::ReceiveTimeoutOrFailed(_))
    ));
}

#[test]
fn persistent_failure_drops_dns() {
    let script = Script::default()
        .success(ACTIVE, &["192.168.1.1"])
        .success(ACTIVE, &["192.168.1.1"])
        .success(ACTIVE, &["192.168.1.1"])
        .success(ACTIVE, &["192.168.1.1"])
        .failure();
    let mut detector = Detector::new("8.8.8.8:80", script).with_keep_threshold(3);

    for _ in 0..4 {
        detector.detect();
    }
    assert_eq!(detector.status().consistency_count, 3);

    let status = detector.detect();
    assert_eq!(status.last_active_ip, None);
    assert!(status.dns.is_empty());
    assert!(status.last_error.is_some());
}

#[test]
fn success_clears_error() {
    let script = Script::default()
        .success(ACTIVE, &["192.168.1.1"])
        .failure()
        .success(ACTIVE, &["192.168.1.3"]);
    let mut detector = Detector::new("8.8.8.8:80", script);

    detector.detect();
    assert!(detector.detect().last_error.is_some());

    let status = detector.detect();
    assert!(status.last_error.is_none());
    assert_eq!(status.dns, ips(&["192.168.1.3"]));

    // A failure does not count as a confirmation
    assert_eq!(status.consistency_count, 1);
}

#[test]
fn changed_ip_resets_consistency() {
    let script = Script::default()
        .success(ACTIVE, &["192.168.1.1"])
        .success(ACTIVE, &["192.168.1.1"])
        .success("10.0.0.7", &["10.0.0.1"]);
    let mut detector = Detector::new("8.8.8.8:80", script);

    detector.detect();
    assert_eq!(detector.detect().consistency_count, 1);

    let status = detector.detect();
    assert_eq!(status.consistency_count, 0);
    assert_eq!(status.last_active_ip, Some("10.0.0.7".parse().unwrap()));
    assert_eq!(status.dns, ips(&["10.0.0.1"]));
}

#[test]
fn new_round_forces_reevaluation() {
    let script = Script::default()
        .success(ACTIVE, &["192.168.1.1"])
        .success(ACTIVE, &["192.168.1.1"])
        .success(ACTIVE, &["192.168.1.1"]);
    let mut detector = Detector::new("8.8.8.8:80", script);

    detector.detect();
    detector.detect();
    assert_eq!(detector.status().consistency_count, 1);

    detector.new_round();
    let status = detector.status();
    assert_eq!(status.consistency_count, 0);
    assert_eq!(status.last_active_ip, None);

    // The same IP counts as new after the round boundary
    let status = detector.detect();
    assert_eq!(status.consistency_count, 0);
    assert_eq!(status.last_active_ip, Some(ACTIVE.parse().unwrap()));
}

#[test]
fn failure_right_after_new_round_keeps_dns() {
    let script = Script::default()
        .success(ACTIVE, &["192.168.1.1"])
        .success(ACTIVE, &["192.168.1.1"])
        .success(ACTIVE, &["192.168.1.1"])
        .success(ACTIVE, &["192.168.1.1"])
        .success(ACTIVE, &["192.168.1.1"])
        .failure()
        .success(ACTIVE, &["192.168.1.1"]);
    let mut detector = Detector::new("8.8.8.8:80", script);

    for _ in 0..5 {
        detector.detect();
    }
    assert_eq!(detector.status().consistency_count, 4);

    detector.new_round();
    assert_eq!(detector.status().dns, ips(&["192.168.1.1"]));

    let status = detector.detect();
    assert_eq!(status.last_active_ip, None);
    assert_eq!(status.consistency_count, 0);
    assert_eq!(status.dns, ips(&["192.168.1.1"]));
    assert!(status.last_error.is_some());

    // The next success starts counting again
    let status = detector.detect();
    assert_eq!(status.consistency_count, 0);
    assert_eq!(status.last_active_ip, Some(ACTIVE.parse().unwrap()));
    assert!(status.last_error.is_none());
}

#[test]
fn empty_discovery_counts_as_failure() {
    let script = Script::default()
        .success(ACTIVE, &["192.168.1.1"])
        .success(ACTIVE, &[]);
    let mut detector = Detector::new("8.8.8.8:80", script);

    detector.detect();
    let status = detector.detect();

    assert_eq!(status.consistency_count, 0);
    assert_eq!(status.last_active_ip, Some(ACTIVE.parse().unwrap()));
    assert_eq!(status.dns, ips(&["192.168.1.1"]));
    assert!(matches!(status.last_error, Some(Error::NoDNSFound)));
}

#[test]
fn empty_discovery_does_not_set_active_ip() {
    let mut detector = Detector::new("8.8.8.8:80", Script::default().success(ACTIVE, &[]));

    let status = detector.detect();
    assert_eq!(status.last_active_ip, None);
    assert!(status.dns.is_empty());
    assert!(matches!(status.last_error, Some(Error::NoDNSFound)));
}

#[test]
fn failure_before_any_success() {
    let mut detector = Detector::new("8.8.8.8:80", Script::default().failure());

    let status = detector.detect();
    assert_eq!(status.consistency_count, 0);
    assert_eq!(status.last_active_ip, None);
    assert!(status.dns.is_empty());
    assert!(status.last_error.is_some_and(Error::is_timeout));
}

#[test]
fn status_does_not_probe() {
    let detector = Detector::new("8.8.8.8:80", Script::default());

    // An empty script panics when probed
    let status = detector.status();
    assert_eq!(detector.remote(), "8.8.8.8:80");
    assert!(status.dns.is_empty());
    assert!(status.last_error.is_none());
}
