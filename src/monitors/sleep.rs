//! # Suspend/resume detection without OS hooks.
//!
//! Samples the wall clock every `check` interval; when two successive
//! samples are separated by more than `gap`, the host slept in between and
//! a `"wake"` event fires. The wall clock is essential here: a monotonic
//! clock may freeze during suspend and would hide the gap.

use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};

/// Runs the gap-based sleep monitor until cancelled.
///
/// A zero `gap` defaults to twice the check interval.
pub async fn sleep_monitor<F>(
    check: Duration,
    gap: Duration,
    token: CancellationToken,
    bus: Bus,
    on_event: F,
) where
    F: Fn(&str) + Send,
{
    if check.is_zero() {
        return;
    }
    let gap = if gap.is_zero() { check * 2 } else { gap };

    bus.publish(
        Event::now(EventKind::MonitorStarted)
            .with_monitor("sleep")
            .with_detail("wall-clock gap fallback"),
    );

    let mut last = SystemTime::now();
    let mut ticker = tokio::time::interval(check);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // the immediate first tick

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => {
                let now = SystemTime::now();
                if let Ok(elapsed) = now.duration_since(last) {
                    if elapsed > gap {
                        bus.publish(
                            Event::now(EventKind::MonitorEvent)
                                .with_monitor("sleep")
                                .with_reason("wake")
                                .with_msg(format!("wake detected (gap={}s)", elapsed.as_secs())),
                        );
                        on_event("wake");
                    }
                }
                last = now;
            }
        }
    }
}
