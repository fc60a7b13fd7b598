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

//! Send-rate control: pacing and cyclic bandwidth probing.
//!
//! The crate does not ship a full congestion controller. It consumes a
//! bandwidth model through the [`BandwidthEstimator`] trait and layers the
//! pacing scheduler and the PROBE_BW cycle on top of it.

use std::time::Duration;
use std::time::Instant;

pub use self::pacing::PacingScheduler;
pub use self::probe_bw::AdaptUpperBoundsResult;
pub use self::probe_bw::BandwidthProber;
pub use self::probe_bw::CyclePhase;
pub use self::probe_bw::ProbeBwConfig;

/// The bandwidth model the pacing scheduler wraps.
///
/// All rates are in bytes per second.
pub trait BandwidthEstimator {
    /// The instantaneous pacing rate for the given volume of in-flight
    /// data.
    fn pacing_rate(&self, bytes_in_flight: u64) -> u64;

    /// Whether the model allows sending with the given volume of
    /// in-flight data.
    fn can_send(&self, bytes_in_flight: u64) -> bool;

    /// Feed a send event into the model.
    fn on_packet_sent(&mut self, now: Instant, bytes_in_flight: u64, pkt_num: u64, sent_size: u64);

    /// Feed an acknowledgment or loss event into the model.
    fn on_congestion_event(&mut self, event: &CongestionEvent);
}

/// An acknowledgment or loss event, aggregated per incoming ACK.
#[derive(Debug, Clone, Copy)]
pub struct CongestionEvent {
    /// The time the event was processed.
    pub event_time: Instant,

    /// Bytes in flight after the event was applied.
    pub bytes_in_flight: u64,

    /// Bytes newly acknowledged by the event.
    pub newly_acked_bytes: u64,

    /// Bytes newly declared lost by the event.
    pub newly_lost_bytes: u64,

    /// Bytes that were in flight when the largest newly acked packet was
    /// sent.
    pub tx_in_flight: u64,

    /// Delivery rate sample in bytes per second, or zero if none.
    pub delivery_rate: u64,

    /// RTT sample carried by the event, or zero if none.
    pub sample_rtt: Duration,

    /// Whether the sample was taken while the sender was limited by the
    /// application rather than the network.
    pub is_app_limited: bool,

    /// Whether the event closed a packet-timed round trip.
    pub is_round_start: bool,

    /// Whether the sender was using its full congestion window when the
    /// acked packet was sent.
    pub is_cwnd_limited: bool,
}

impl CongestionEvent {
    pub fn new(event_time: Instant) -> Self {
        Self {
            event_time,
            bytes_in_flight: 0,
            newly_acked_bytes: 0,
            newly_lost_bytes: 0,
            tx_in_flight: 0,
            delivery_rate: 0,
            sample_rtt: Duration::ZERO,
            is_app_limited: false,
            is_round_start: false,
            is_cwnd_limited: false,
        }
    }
}


pub mod pacing;
pub mod probe_bw;
