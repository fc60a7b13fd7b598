// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Idle network and handshake timeout detection.

use std::time::Duration;
use std::time::Instant;

use log::trace;

use crate::alarm::Alarm;
use crate::TIMER_GRANULARITY;

/// Receiver of idle watchdog events.
pub trait IdleDetectorDelegate {
    /// The handshake did not complete within the handshake timeout.
    fn on_handshake_timeout(&mut self);

    /// No network activity was seen within the idle timeout.
    fn on_idle_network_detected(&mut self);
}

/// Watchdog closing a connection whose network has gone quiet.
///
/// Before the handshake completes the deadline is the earlier of the
/// handshake timeout (anchored at creation time) and the idle timeout
/// (anchored at the last network activity). Once the handshake timeout is
/// cleared, only the idle timeout remains.
///
/// Packets received always count as activity. A packet sent counts only if
/// the most recent activity was a received packet, so a path that delivers
/// nothing inbound cannot look alive forever just because the endpoint
/// keeps transmitting into it.
pub struct IdleNetworkDetector {
    /// Time the detector was created.
    start_time: Instant,

    /// Handshake timeout, until the handshake completes.
    handshake_timeout: Option<Duration>,

    /// Idle timeout, unset until `set_timeouts` is called.
    idle_timeout: Option<Duration>,

    /// Time the last packet was received.
    time_of_last_received_packet: Option<Instant>,

    /// Time the first packet was sent after receiving one.
    time_of_first_packet_sent_after_receiving: Option<Instant>,

    alarm: Alarm,
}

impl IdleNetworkDetector {
    pub fn new(now: Instant) -> Self {
        Self {
            start_time: now,
            handshake_timeout: None,
            idle_timeout: None,
            time_of_last_received_packet: None,
            time_of_first_packet_sent_after_receiving: None,
            alarm: Alarm::new(),
        }
    }

    /// Install the timeouts and arm the watchdog.
    ///
    /// Pass `handshake_timeout: None` once the handshake has completed so
    /// only the idle timeout participates in the deadline.
    pub fn set_timeouts(&mut self, handshake_timeout: Option<Duration>, idle_timeout: Duration) {
        self.handshake_timeout = handshake_timeout;
        self.idle_timeout = Some(idle_timeout);
        self.set_alarm();
    }

    /// Record an inbound packet and push the deadline out.
    pub fn on_packet_received(&mut self, now: Instant) {
        self.time_of_last_received_packet =
            self.time_of_last_received_packet.max(Some(now));
        self.set_alarm();
    }

    /// Record an outbound packet.
    ///
    /// Only the first packet sent after receiving one counts as activity.
    pub fn on_packet_sent(&mut self, now: Instant) {
        if self.time_of_first_packet_sent_after_receiving > self.time_of_last_received_packet {
            return;
        }
        self.time_of_first_packet_sent_after_receiving =
            self.time_of_first_packet_sent_after_receiving.max(Some(now));
        self.set_alarm();
    }

    /// Process an expired deadline and report through the delegate.
    ///
    /// A no-op while the deadline lies in the future, so spurious wakeups
    /// are harmless.
    pub fn on_alarm(&mut self, now: Instant, delegate: &mut dyn IdleDetectorDelegate) {
        if !self.alarm.is_expired(now) {
            return;
        }
        self.alarm.cancel();

        if let Some(handshake_timeout) = self.handshake_timeout {
            if now >= self.start_time + handshake_timeout {
                trace!("idle detector: handshake timed out at {:?}", now);
                delegate.on_handshake_timeout();
                return;
            }
        }
        trace!("idle detector: idle network detected at {:?}", now);
        delegate.on_idle_network_detected();
    }

    /// The currently armed deadline.
    pub fn deadline(&self) -> Option<Instant> {
        self.alarm.deadline()
    }

    /// Time of the most recent event that counted as network activity.
    pub fn last_network_activity_time(&self) -> Instant {
        self.time_of_last_received_packet
            .max(self.time_of_first_packet_sent_after_receiving)
            .unwrap_or(self.start_time)
    }

    fn set_alarm(&mut self) {
        let idle_timeout = match self.idle_timeout {
            Some(timeout) => timeout,
            None => return,
        };

        let mut deadline = self.last_network_activity_time() + idle_timeout;
        if let Some(handshake_timeout) = self.handshake_timeout {
            deadline = deadline.min(self.start_time + handshake_timeout);
        }
        self.alarm.update(deadline, TIMER_GRANULARITY);
    }
}
