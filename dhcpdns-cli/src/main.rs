use std::{process::ExitCode, thread};

use dhcpdns::{Detector, Family, Probe};
use settings::SETTINGS;

fn detector(family: Family) -> Detector {
    let probe = Probe {
        family,
        config: SETTINGS.probe_config(),
    };

    Detector::new(SETTINGS.target(family), probe).with_keep_threshold(SETTINGS.keep_threshold)
}

pub fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut detectors: Vec<Detector> = SETTINGS.families().iter().copied().map(detector).collect();

    // Negative round counts run forever
    let rounds = u64::try_from(SETTINGS.rounds).ok();

    let mut found_any = false;
    let mut round: u64 = 0;
    while rounds.map_or(true, |rounds| round < rounds) {
        if round != 0 {
            thread::sleep(SETTINGS.interval);
        }

        if SETTINGS.revalidates_before(round) {
            log::debug!("Revalidating the active IPs");
            detectors.iter_mut().for_each(Detector::new_round);
        }

        for detector in &mut detectors {
            log::info!("Targeting: {}", detector.remote());

            let status = detector.detect();
            if let Some(error) = status.last_error {
                log::error!("error: {error}");
            }

            for dns in status.dns {
                log::info!("DHCP DNS: {dns}");
            }
            found_any |= !status.dns.is_empty();

            if let Some(active_ip) = status.last_active_ip {
                log::debug!(
                    "Active IP {active_ip} confirmed {} times",
                    status.consistency_count
                );
            }
        }

        round += 1;
    }

    if found_any {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
