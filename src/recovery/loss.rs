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

use log::trace;

use super::rtt::RttEstimator;
use super::space::SentPacketView;
use super::space::SpaceId;
use super::space::SPACE_COUNT;
use crate::RecoveryConfig;
use crate::TIMER_GRANULARITY;

/// A packet declared lost by a detection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LostPacket {
    /// The lost packet number.
    pub pkt_num: u64,

    /// The packet number space the packet was sent in.
    pub space_id: SpaceId,

    /// The size of the lost packet.
    pub sent_size: usize,
}

/// Counters describing loss detection behavior over the connection
/// lifetime.
#[derive(Debug, Default, Clone, Copy)]
pub struct LossDetectionStats {
    /// Number of packets declared lost.
    pub lost_packets: u64,

    /// Total bytes of packets declared lost.
    pub lost_bytes: u64,

    /// Number of packets declared lost and later acknowledged.
    pub spurious_losses: u64,
}

/// Packet loss detection for a single packet number space.
///
/// A packet is declared lost once a later packet in the same space has
/// been acknowledged and the packet is either `reordering_threshold`
/// numbers behind the largest acknowledged packet, or was sent more than
/// a time threshold ago. Both thresholds adapt when declared losses turn
/// out to be spurious.
/// See RFC 9002 Section 6.1
pub struct LossDetector {
    /// The packet number space this detector covers.
    space_id: SpaceId,

    /// Number of packet numbers that must be acknowledged above a packet
    /// before it is declared lost.
    reordering_threshold: u64,

    /// The time threshold is one RTT plus the RTT shifted right by this
    /// amount. The default shift of 3 yields a 1/8 RTT margin.
    reordering_shift: u32,

    /// Raise `reordering_threshold` on spurious losses.
    adaptive_reordering_threshold: bool,

    /// Lower `reordering_shift` (widening the time margin) on spurious
    /// losses.
    adaptive_time_threshold: bool,

    /// The smallest packet number that was still in flight at the end of
    /// the last detection pass. Only ever increases.
    least_in_flight: u64,

    /// When the earliest packet inside the reordering window crosses the
    /// time threshold. Unset when no packet is waiting on it.
    loss_timeout: Option<Instant>,
}

impl LossDetector {
    pub fn new(space_id: SpaceId, conf: &RecoveryConfig) -> Self {
        Self {
            space_id,
            reordering_threshold: conf.packet_threshold,
            reordering_shift: conf.reordering_shift,
            adaptive_reordering_threshold: conf.adaptive_reordering_threshold,
            adaptive_time_threshold: conf.adaptive_time_threshold,
            least_in_flight: 0,
            loss_timeout: None,
        }
    }

    /// Scan the in-flight packets of this space and append the ones that
    /// are now considered lost to `lost`. Recomputes the loss timeout for
    /// packets that are within the reordering window but have not yet
    /// crossed the time threshold.
    pub fn detect_losses(
        &mut self,
        view: &dyn SentPacketView,
        rtt: &RttEstimator,
        now: Instant,
        lost: &mut Vec<LostPacket>,
    ) {
        self.loss_timeout = None;

        // Nothing can be declared lost before the first acknowledgment.
        let largest_acked = match view.largest_acked() {
            Some(v) => v,
            None => return,
        };
        if view.least_unacked() > largest_acked {
            return;
        }

        let loss_delay = self.loss_delay(rtt);
        let lost_send_time = now.checked_sub(loss_delay);

        for pkt in view.in_flight_packets() {
            if pkt.pkt_num >= largest_acked {
                break;
            }

            let gap_reached = largest_acked - pkt.pkt_num >= self.reordering_threshold;
            let time_reached = lost_send_time.map_or(false, |t| pkt.time_sent <= t);
            if gap_reached || time_reached {
                trace!(
                    "now={:?} {:?} ON_LOST pkt_num={} largest_acked={} by_gap={}",
                    now,
                    self.space_id,
                    pkt.pkt_num,
                    largest_acked,
                    gap_reached
                );
                lost.push(LostPacket {
                    pkt_num: pkt.pkt_num,
                    space_id: self.space_id,
                    sent_size: pkt.sent_size,
                });
            } else {
                let timeout = pkt.time_sent + loss_delay;
                self.loss_timeout = Some(match self.loss_timeout {
                    Some(cur) => cmp::min(cur, timeout),
                    None => timeout,
                });
            }
        }

        self.least_in_flight = cmp::max(self.least_in_flight, view.least_unacked());
    }

    /// When the next detection pass should run for packets held back by
    /// the time threshold.
    pub fn loss_timeout(&self) -> Option<Instant> {
        self.loss_timeout
    }

    /// A previously declared loss has been acknowledged. Widen the
    /// adaptive thresholds so the same reordering pattern does not trip
    /// detection again.
    pub fn spurious_loss_detected(&mut self, pkt_num: u64, previous_largest_acked: u64) {
        if self.adaptive_reordering_threshold && previous_largest_acked >= pkt_num {
            self.reordering_threshold = cmp::max(
                self.reordering_threshold,
                previous_largest_acked - pkt_num + 1,
            );
        }
        if self.adaptive_time_threshold && self.reordering_shift > 0 {
            self.reordering_shift -= 1;
        }
    }

    pub fn reordering_threshold(&self) -> u64 {
        self.reordering_threshold
    }

    pub fn reordering_shift(&self) -> u32 {
        self.reordering_shift
    }

    fn loss_delay(&self, rtt: &RttEstimator) -> Duration {
        let rtt = cmp::max(rtt.latest_rtt(), rtt.smoothed_rtt());
        let margin = Duration::from_nanos((rtt.as_nanos() >> self.reordering_shift) as u64);
        cmp::max(rtt + margin, TIMER_GRANULARITY)
    }
}

/// Loss detection across all packet number spaces.
///
/// Fans detection out to the per-space detectors and merges the earliest
/// loss timeout.
pub struct UberLossDetector {
    detectors: [LossDetector; SPACE_COUNT],
    stats: LossDetectionStats,
}

impl UberLossDetector {
    pub fn new(conf: &RecoveryConfig) -> Self {
        Self {
            detectors: [
                LossDetector::new(SpaceId::Initial, conf),
                LossDetector::new(SpaceId::Handshake, conf),
                LossDetector::new(SpaceId::Data, conf),
            ],
            stats: LossDetectionStats::default(),
        }
    }

    /// Run a detection pass over every packet number space.
    pub fn detect_losses(
        &mut self,
        views: [&dyn SentPacketView; SPACE_COUNT],
        rtt: &RttEstimator,
        now: Instant,
        lost: &mut Vec<LostPacket>,
    ) {
        let before = lost.len();
        for (detector, view) in self.detectors.iter_mut().zip(views.iter()) {
            detector.detect_losses(*view, rtt, now, lost);
        }
        for pkt in &lost[before..] {
            self.stats.lost_packets += 1;
            self.stats.lost_bytes += pkt.sent_size as u64;
        }
    }

    /// The earliest loss timeout across all spaces, if any.
    pub fn loss_timeout(&self) -> Option<Instant> {
        self.detectors.iter().filter_map(|d| d.loss_timeout()).min()
    }

    /// Report a spurious loss in the given space.
    pub fn spurious_loss_detected(
        &mut self,
        space_id: SpaceId,
        pkt_num: u64,
        previous_largest_acked: u64,
    ) {
        self.stats.spurious_losses += 1;
        self.detectors[space_id as usize].spurious_loss_detected(pkt_num, previous_largest_acked);
    }

    /// Access the per-space detector, e.g. to inspect its adaptive
    /// thresholds.
    pub fn detector(&self, space_id: SpaceId) -> &LossDetector {
        &self.detectors[space_id as usize]
    }

    pub fn stats(&self) -> &LossDetectionStats {
        &self.stats
    }
}
