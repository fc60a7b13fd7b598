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

use std::cmp;
use std::time::Duration;
use std::time::Instant;

use super::BandwidthEstimator;
use super::CongestionEvent;
use crate::TIMER_GRANULARITY;

/// Number of packets that may be sent unpaced at connection start and
/// when restarting from a quiet period.
pub const INITIAL_BURST_PACKETS: u64 = 10;

/// Number of packets released together once the scheduler is actively
/// pacing, to amortize timer wakeups.
const LUMPY_PACING_PACKETS: u64 = 2;

/// Throttles outgoing packets to the rate of the underlying bandwidth
/// model.
/// See RFC 9002 Section 7.7
///
/// Bursts are allowed in two forms. Burst tokens let the first packets of
/// a connection, or of a restart after idle, go out back to back. Lumpy
/// tokens batch a couple of packets per wakeup during steady pacing.
pub struct PacingScheduler {
    /// The wrapped bandwidth model.
    estimator: Box<dyn BandwidthEstimator>,

    /// Optional hard cap on the pacing rate, in bytes per second.
    max_pacing_rate: Option<u64>,

    /// Unpaced packets remaining from the current burst allowance.
    burst_tokens: u64,

    /// Burst allowance granted at connection start and after idle.
    initial_burst_size: u64,

    /// Packets remaining in the current lumpy batch.
    lumpy_tokens: u64,

    /// The ideal time the next packet leaves, advanced by one transfer
    /// time per sent packet. Unset while bursting.
    ideal_next_send_time: Option<Instant>,

    /// Whether the previous send was throttled by pacing. When sending is
    /// instead limited by the application, the scheduler must not treat
    /// the idle gap as budget to catch up on.
    pacing_limited: bool,
}

impl PacingScheduler {
    pub fn new(estimator: Box<dyn BandwidthEstimator>) -> Self {
        Self {
            estimator,
            max_pacing_rate: None,
            burst_tokens: INITIAL_BURST_PACKETS,
            initial_burst_size: INITIAL_BURST_PACKETS,
            lumpy_tokens: 0,
            ideal_next_send_time: None,
            pacing_limited: false,
        }
    }

    /// Set the unpaced-packet allowance granted at connection start and
    /// after an idle period.
    pub fn set_burst_tokens(&mut self, tokens: u64) {
        self.initial_burst_size = tokens;
        self.burst_tokens = tokens;
    }

    /// Cap the pacing rate at `rate` bytes per second.
    pub fn set_max_pacing_rate(&mut self, rate: u64) {
        self.max_pacing_rate = Some(rate);
    }

    /// The effective pacing rate for the given in-flight volume.
    pub fn pacing_rate(&self, bytes_in_flight: u64) -> u64 {
        let rate = self.estimator.pacing_rate(bytes_in_flight);
        match self.max_pacing_rate {
            Some(max_rate) => cmp::min(rate, max_rate),
            None => rate,
        }
    }

    /// Record a sent packet and advance the pacing schedule.
    /// `bytes_in_flight` is the in-flight volume before this send.
    pub fn on_packet_sent(
        &mut self,
        now: Instant,
        bytes_in_flight: u64,
        pkt_num: u64,
        sent_size: u64,
    ) {
        self.estimator
            .on_packet_sent(now, bytes_in_flight, pkt_num, sent_size);

        if bytes_in_flight == 0 {
            // Restarting from a quiet period; allow an unpaced burst to
            // refill the pipe.
            self.burst_tokens = self.initial_burst_size;
        }
        if self.burst_tokens > 0 {
            self.burst_tokens -= 1;
            self.ideal_next_send_time = None;
            self.pacing_limited = false;
            return;
        }

        let rate = self.pacing_rate(bytes_in_flight + sent_size);
        if rate == 0 {
            self.pacing_limited = false;
            return;
        }
        let delay =
            Duration::from_nanos((sent_size as u128 * 1_000_000_000 / rate as u128) as u64);

        if !self.pacing_limited || self.lumpy_tokens > 0 {
            if self.lumpy_tokens == 0 {
                self.lumpy_tokens = LUMPY_PACING_PACKETS;
            }
            self.lumpy_tokens -= 1;
        }

        // The schedule never moves backwards: an application-limited gap
        // is forfeited, not reclaimed.
        self.ideal_next_send_time = Some(match self.ideal_next_send_time {
            Some(ideal) if self.pacing_limited => ideal + delay,
            Some(ideal) => cmp::max(ideal + delay, now + delay),
            None => now + delay,
        });
        self.pacing_limited = self.estimator.can_send(bytes_in_flight + sent_size);
    }

    /// Forward an acknowledgment or loss event to the bandwidth model.
    pub fn on_congestion_event(&mut self, event: &CongestionEvent) {
        self.estimator.on_congestion_event(event);
        if event.newly_lost_bytes > 0 {
            // No packet batches while losses are being reported.
            self.lumpy_tokens = 0;
        }
    }

    /// The application has nothing to send. The idle gap that follows is
    /// not lost pacing budget.
    pub fn on_application_limited(&mut self) {
        self.pacing_limited = false;
    }

    /// How long to wait before the next packet may be sent. Zero means
    /// send now; `Duration::MAX` means sending is blocked by the model
    /// rather than by pacing.
    pub fn time_until_send(&self, now: Instant, bytes_in_flight: u64) -> Duration {
        if !self.estimator.can_send(bytes_in_flight) {
            return Duration::MAX;
        }
        if self.burst_tokens > 0 || bytes_in_flight == 0 || self.lumpy_tokens > 0 {
            return Duration::ZERO;
        }
        match self.ideal_next_send_time {
            Some(ideal) if ideal > now + TIMER_GRANULARITY => ideal - now,
            _ => Duration::ZERO,
        }
    }

    /// The ideal send time of the next packet, if the scheduler is
    /// actively pacing.
    pub fn ideal_next_send_time(&self) -> Option<Instant> {
        self.ideal_next_send_time
    }

    /// Access the wrapped bandwidth model.
    pub fn estimator_mut(&mut self) -> &mut dyn BandwidthEstimator {
        &mut *self.estimator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::congestion_control::tests::FixedBandwidth;

    // 1_000_000 bytes/sec: a 1000-byte packet takes 1ms to transfer.
    const RATE: u64 = 1_000_000;
    const PKT: u64 = 1000;

    #[test]
    fn initial_burst_is_unpaced() {
        let now = Instant::now();
        let mut pacer = PacingScheduler::new(Box::new(FixedBandwidth::new(RATE)));

        let mut bytes_in_flight = 0;
        for i in 0..INITIAL_BURST_PACKETS {
            assert_eq!(pacer.time_until_send(now, bytes_in_flight), Duration::ZERO);
            pacer.on_packet_sent(now, bytes_in_flight, i, PKT);
            bytes_in_flight += PKT;
        }
        assert_eq!(pacer.ideal_next_send_time(), None);

        // Tokens spent; the next sends start the pacing schedule.
        pacer.on_packet_sent(now, bytes_in_flight, 10, PKT);
        assert_eq!(
            pacer.ideal_next_send_time(),
            Some(now + Duration::from_millis(1))
        );
    }

    #[test]
    fn paces_after_burst() {
        let now = Instant::now();
        let mut pacer = PacingScheduler::new(Box::new(FixedBandwidth::new(RATE)));
        pacer.set_burst_tokens(2);

        pacer.on_packet_sent(now, 0, 0, PKT);
        pacer.on_packet_sent(now, PKT, 1, PKT);
        assert_eq!(pacer.time_until_send(now, 2 * PKT), Duration::ZERO);

        // First paced packet starts a lumpy batch of two.
        pacer.on_packet_sent(now, 2 * PKT, 2, PKT);
        assert_eq!(
            pacer.ideal_next_send_time(),
            Some(now + Duration::from_millis(1))
        );
        assert_eq!(pacer.time_until_send(now, 3 * PKT), Duration::ZERO);

        pacer.on_packet_sent(now, 3 * PKT, 3, PKT);
        assert_eq!(
            pacer.ideal_next_send_time(),
            Some(now + Duration::from_millis(2))
        );

        // Batch exhausted; the schedule now throttles.
        assert_eq!(
            pacer.time_until_send(now, 4 * PKT),
            Duration::from_millis(2)
        );
        let later = now + Duration::from_millis(2);
        assert_eq!(pacer.time_until_send(later, 4 * PKT), Duration::ZERO);

        pacer.on_packet_sent(later, 4 * PKT, 4, PKT);
        assert_eq!(
            pacer.ideal_next_send_time(),
            Some(now + Duration::from_millis(3))
        );
        // One transfer time out is within the alarm granularity, so the
        // packet is released immediately rather than re-armed.
        assert_eq!(pacer.time_until_send(later, 5 * PKT), Duration::ZERO);
    }

    #[test]
    fn application_limited_gap_is_not_reclaimed() {
        let now = Instant::now();
        let mut pacer = PacingScheduler::new(Box::new(FixedBandwidth::new(RATE)));
        pacer.set_burst_tokens(0);

        // Build up a pacing schedule.
        for i in 0..4 {
            pacer.on_packet_sent(now, PKT + i * PKT, i, PKT);
        }
        let ideal = pacer.ideal_next_send_time().unwrap();
        assert!(ideal > now);

        // The application goes quiet for a while, then resumes. The
        // schedule restarts from the send time rather than releasing the
        // backlog at once.
        pacer.on_application_limited();
        let resume = ideal + Duration::from_millis(100);
        pacer.on_packet_sent(resume, 4 * PKT, 4, PKT);
        assert_eq!(
            pacer.ideal_next_send_time(),
            Some(resume + Duration::from_millis(1))
        );
    }

    #[test]
    fn burst_restored_after_idle() {
        let now = Instant::now();
        let mut pacer = PacingScheduler::new(Box::new(FixedBandwidth::new(RATE)));
        pacer.set_burst_tokens(2);

        pacer.on_packet_sent(now, 0, 0, PKT);
        pacer.on_packet_sent(now, PKT, 1, PKT);
        pacer.on_packet_sent(now, 2 * PKT, 2, PKT);
        assert!(pacer.ideal_next_send_time().is_some());

        // Everything gets acknowledged; a send from empty restores the
        // burst allowance and clears the schedule.
        let later = now + Duration::from_secs(1);
        pacer.on_packet_sent(later, 0, 3, PKT);
        assert_eq!(pacer.ideal_next_send_time(), None);
        assert_eq!(pacer.time_until_send(later, PKT), Duration::ZERO);
    }

    #[test]
    fn blocked_by_model() {
        let now = Instant::now();
        let mut estimator = FixedBandwidth::new(RATE);
        estimator.can_send = false;
        let pacer = PacingScheduler::new(Box::new(estimator));
        assert_eq!(pacer.time_until_send(now, PKT), Duration::MAX);
    }

    #[test]
    fn max_pacing_rate_cap() {
        let mut pacer = PacingScheduler::new(Box::new(FixedBandwidth::new(RATE)));
        assert_eq!(pacer.pacing_rate(0), RATE);
        pacer.set_max_pacing_rate(RATE / 4);
        assert_eq!(pacer.pacing_rate(0), RATE / 4);
    }

    #[test]
    fn loss_clears_lumpy_batch() {
        let now = Instant::now();
        let mut pacer = PacingScheduler::new(Box::new(FixedBandwidth::new(RATE)));
        pacer.set_burst_tokens(0);

        pacer.on_packet_sent(now, PKT, 0, 4 * PKT);
        assert_eq!(pacer.time_until_send(now, 5 * PKT), Duration::ZERO);

        let mut event = CongestionEvent::new(now);
        event.newly_lost_bytes = PKT;
        pacer.on_congestion_event(&event);
        assert_eq!(
            pacer.time_until_send(now, 5 * PKT),
            Duration::from_millis(4)
        );
    }
}
