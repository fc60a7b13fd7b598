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

//! The sender-side connection health engine of a QUIC stack.
//!
//! `sendpath` bundles the machinery a sender needs to judge the state of a
//! network path and schedule data onto it:
//!
//! * RTT estimation ([`recovery::RttEstimator`]).
//! * Packet- and time-threshold loss detection per packet number space
//!   ([`recovery::UberLossDetector`]).
//! * Pacing on top of a pluggable bandwidth model
//!   ([`congestion_control::PacingScheduler`]).
//! * Cyclic bandwidth probing ([`congestion_control::BandwidthProber`]).
//! * Idle/handshake and blackhole watchdogs ([`detector`]).
//! * Path validation ([`path::PathValidator`]).
//!
//! The crate performs no I/O and spawns no threads. Every component is
//! driven by the embedding connection through explicit calls carrying the
//! current time, and signals back through return values, delegate traits,
//! and alarm deadlines.

#![allow(unused_imports)]
#![allow(dead_code)]

use std::cmp;
use std::time::Duration;

/// The smallest time interval the engine distinguishes. Alarm updates
/// within this granularity are skipped.
pub const TIMER_GRANULARITY: Duration = Duration::from_millis(1);

/// The initial rtt, used before real rtt is estimated.
pub const INITIAL_RTT: Duration = Duration::from_millis(333);

/// Default outgoing udp datagram payloads size.
const DEFAULT_SEND_UDP_PAYLOAD_SIZE: usize = 1200;

/// The maximum amount of time a peer intends to delay acknowledgments by
/// default.
/// See RFC 9000 Section 18.2
const DEFAULT_MAX_ACK_DELAY: Duration = Duration::from_millis(25);

/// Default maximum reordering in packets before packet threshold loss
/// detection considers a packet lost.
/// See RFC 9002 Section 6.1.1
const DEFAULT_PACKET_THRESHOLD: u64 = 3;

/// Default shift for the time threshold margin: the loss delay is the
/// latest rtt plus rtt >> shift, i.e. a multiplier of 9/8 at the default.
/// See RFC 9002 Section 6.1.2
const DEFAULT_REORDERING_SHIFT: u32 = 3;

/// Default timeout for the connection handshake.
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

pub type Result<T> = std::result::Result<T, Error>;

/// Configurations for the sender engine.
///
/// The setters clamp their input to sane values; the raw config structs
/// can be built directly when no clamping is wanted.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Configurations about rtt estimation, loss detection, pacing and
    /// bandwidth probing.
    recovery: RecoveryConfig,

    /// Configurations about the liveness watchdogs.
    detector: DetectorConfig,
}

impl Config {
    /// Create default configuration.
    ///
    /// The configuration may be customized by calling related set methods.
    pub fn new() -> Result<Self> {
        Ok(Self::default())
    }

    /// Set the initial RTT in milliseconds, used before an RTT sample is
    /// taken. The value is clamped to the timer granularity.
    pub fn set_initial_rtt(&mut self, v: u64) {
        self.recovery.initial_rtt = cmp::max(Duration::from_millis(v), TIMER_GRANULARITY);
    }

    /// Set the maximum outgoing UDP payload size in bytes.
    /// The default value is `1200`.
    pub fn set_send_udp_payload_size(&mut self, v: usize) {
        self.recovery.max_datagram_size = cmp::max(v, DEFAULT_SEND_UDP_PAYLOAD_SIZE);
    }

    /// Set the peer's `max_ack_delay` transport parameter in milliseconds.
    /// Acknowledgment delays beyond it are attributed to the network.
    pub fn set_max_ack_delay(&mut self, v: u64) {
        self.recovery.max_ack_delay = Duration::from_millis(v);
    }

    /// Set the packet reordering threshold for loss detection, in packets.
    /// Values below `1` would declare every acknowledged gap lost and are
    /// raised to `1`.
    pub fn set_packet_threshold(&mut self, v: u64) {
        self.recovery.packet_threshold = cmp::max(v, 1);
    }

    /// Set the shift of the time threshold margin for loss detection. The
    /// loss delay is `rtt + (rtt >> shift)`.
    pub fn set_reordering_shift(&mut self, v: u32) {
        self.recovery.reordering_shift = v;
    }

    /// Enable raising the loss thresholds after spurious retransmits.
    pub fn enable_adaptive_loss_thresholds(&mut self, v: bool) {
        self.recovery.adaptive_reordering_threshold = v;
        self.recovery.adaptive_time_threshold = v;
    }

    /// Set the minimal congestion window in packets.
    pub fn set_min_congestion_window(&mut self, v: u64) {
        self.recovery.min_congestion_window = cmp::max(v, 1);
    }

    /// Set handshake timeout in milliseconds. Zero turns the timeout off.
    pub fn set_max_handshake_timeout(&mut self, v: u64) {
        self.detector.max_handshake_timeout = Duration::from_millis(v);
    }

    /// Set the idle timeout in milliseconds. Zero disables idle detection.
    pub fn set_max_idle_timeout(&mut self, v: u64) {
        self.detector.max_idle_timeout = Duration::from_millis(v);
    }

    pub fn recovery(&self) -> &RecoveryConfig {
        &self.recovery
    }

    pub fn detector(&self) -> &DetectorConfig {
        &self.detector
    }
}

/// Configurations about rtt estimation, loss detection, pacing and
/// bandwidth probing.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// The maximum size of outgoing UDP payloads.
    pub max_datagram_size: usize,

    /// The maximum amount of time the peer intends to delay acknowledgments
    /// for packets in the Application Data packet number space.
    pub max_ack_delay: Duration,

    /// The initial rtt, used before real rtt is estimated.
    pub initial_rtt: Duration,

    /// The maximum reordering in packets before packet threshold loss
    /// detection considers a packet lost.
    pub packet_threshold: u64,

    /// The shift of the time threshold margin for loss detection.
    pub reordering_shift: u32,

    /// Raise the packet threshold when a loss turns out spurious.
    pub adaptive_reordering_threshold: bool,

    /// Widen the time threshold margin when a loss turns out spurious.
    pub adaptive_time_threshold: bool,

    /// The minimal congestion window in packets.
    /// See RFC 9002 Section 7.2
    pub min_congestion_window: u64,
}

impl Default for RecoveryConfig {
    fn default() -> RecoveryConfig {
        RecoveryConfig {
            max_datagram_size: DEFAULT_SEND_UDP_PAYLOAD_SIZE,
            max_ack_delay: DEFAULT_MAX_ACK_DELAY,
            initial_rtt: INITIAL_RTT,
            packet_threshold: DEFAULT_PACKET_THRESHOLD,
            reordering_shift: DEFAULT_REORDERING_SHIFT,
            adaptive_reordering_threshold: false,
            adaptive_time_threshold: false,
            min_congestion_window: 2_u64,
        }
    }
}

/// Configurations about the liveness watchdogs.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Timeout for the connection handshake. Zero turns it off.
    pub max_handshake_timeout: Duration,

    /// Timeout for an idle network. Zero disables idle detection.
    pub max_idle_timeout: Duration,
}

impl DetectorConfig {
    /// The handshake timeout, or `None` when turned off.
    pub fn handshake_timeout(&self) -> Option<Duration> {
        if self.max_handshake_timeout.is_zero() {
            return None;
        }
        Some(self.max_handshake_timeout)
    }

    /// The idle timeout, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.max_idle_timeout.is_zero() {
            return None;
        }
        Some(self.max_idle_timeout)
    }
}

impl Default for DetectorConfig {
    fn default() -> DetectorConfig {
        DetectorConfig {
            max_handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_idle_timeout: Duration::ZERO,
        }
    }
}


pub use crate::congestion_control::BandwidthEstimator;
pub use crate::congestion_control::BandwidthProber;
pub use crate::congestion_control::PacingScheduler;
pub use crate::detector::IdleNetworkDetector;
pub use crate::detector::NetworkBlackholeDetector;
pub use crate::error::Error;
pub use crate::path::PathValidator;
pub use crate::recovery::RttEstimator;
pub use crate::recovery::UberLossDetector;

#[path = "recovery/recovery.rs"]
pub mod recovery;

#[path = "congestion_control/congestion_control.rs"]
pub mod congestion_control;

#[path = "detector/detector.rs"]
pub mod detector;

pub mod alarm;
pub mod clock;
pub mod error;
pub mod path;
