//! # Network change detection by interface fingerprint.
//!
//! Every poll interval the monitor computes a fingerprint of the host's
//! network identity: the sorted join of `"<iface>|<addr>"` over all up,
//! non-loopback interfaces. Any change (address moved, interface came or
//! went) fires a `"network change"` event, which the supervisor turns into
//! a tunnel cycle.

use std::time::Duration;

use nix::net::if_::InterfaceFlags;
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};

/// Runs the polling network monitor until cancelled.
pub async fn network_monitor<F>(poll: Duration, token: CancellationToken, bus: Bus, on_event: F)
where
    F: Fn(&str) + Send,
{
    if poll.is_zero() {
        return;
    }

    bus.publish(
        Event::now(EventKind::MonitorStarted)
            .with_monitor("network")
            .with_detail("interface fingerprint polling"),
    );

    let mut prev = fingerprint().unwrap_or_default();
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // the immediate first tick

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => {
                match fingerprint() {
                    Ok(next) => {
                        if next != prev {
                            bus.publish(
                                Event::now(EventKind::MonitorEvent)
                                    .with_monitor("network")
                                    .with_reason("network change")
                                    .with_msg("network change detected"),
                            );
                            on_event("network change");
                            prev = next;
                        }
                    }
                    Err(err) => {
                        bus.publish(
                            Event::now(EventKind::MonitorError)
                                .with_monitor("network")
                                .with_error(format!("network fingerprint failed: {err}")),
                        );
                    }
                }
            }
        }
    }
}

/// Sorted join of `"<iface>|<addr>"` over up, non-loopback interfaces.
fn fingerprint() -> nix::Result<String> {
    let mut entries: Vec<String> = Vec::new();
    for ifaddr in nix::ifaddrs::getifaddrs()? {
        let flags = ifaddr.flags;
        if !flags.contains(InterfaceFlags::IFF_UP) || flags.contains(InterfaceFlags::IFF_LOOPBACK) {
            continue;
        }
        let Some(address) = ifaddr.address else {
            continue;
        };
        let text = if let Some(v4) = address.as_sockaddr_in() {
            v4.to_string()
        } else if let Some(v6) = address.as_sockaddr_in6() {
            v6.to_string()
        } else {
            continue;
        };
        entries.push(format!("{}|{}", ifaddr.interface_name, text));
    }
    entries.sort();
    Ok(entries.join(","))
}
