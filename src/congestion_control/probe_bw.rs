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

//! Cyclic bandwidth probing in the style of BBRv2 PROBE_BW.
//!
//! The prober owns only the cycle state machine. Bandwidth and round
//! bookkeeping stay with the caller, which feeds each aggregated
//! [`CongestionEvent`] in together with its current estimates.
//!
//! See <https://www.ietf.org/archive/id/draft-cardwell-iccrg-bbr-congestion-control-02.html#name-probebw>.

use std::time::Duration;
use std::time::Instant;

use log::trace;

use super::CongestionEvent;
use crate::clock::RandomSource;
use crate::RecoveryConfig;

/// Loss rate above which a probe is judged to have pushed inflight too high.
const LOSS_THRESHOLD: f64 = 0.02;

/// Multiplicative decrease applied to `inflight_hi` after a failed probe.
/// Matches CUBIC's 0.7x factor so the prober never reacts more
/// dramatically than a loss-based flow would.
const BETA: f64 = 0.7;

/// Fraction of `inflight_hi` left free for other flows while cruising.
const HEADROOM: f64 = 0.15;

/// Random round-trip bound for the probe wait: 0 or 1 extra rounds.
const PROBE_BW_RAND_ROUNDS: u64 = 2;

/// Random wall clock bound for the probe wait: 2..3 sec.
const PROBE_BW_MIN_WAIT_TIME_IN_MSEC: u64 = 2000;
const PROBE_BW_MAX_WAIT_TIME_IN_MSEC: u64 = 3000;

/// Upper bound on the Reno-coexistence round count.
const PROBE_BW_MAX_ROUNDS: u64 = 63;

/// Phase of the probing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// The prober has not been entered yet.
    NotStarted,

    /// Refill the pipe to the last known working rate before probing.
    Refill,

    /// Raise the send-window ceiling and watch for queuing or loss.
    Up,

    /// Drain the queue built up while probing.
    Down,

    /// Steady state at pacing gain 1.0 between probes.
    Cruise,
}

/// Outcome of applying an acknowledgment sample to the upper bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptUpperBoundsResult {
    /// The sample was applied and the bounds were left in place or raised.
    AdaptedOk,

    /// The sample showed the probe pushed inflight too high, and
    /// `inflight_hi` was cut.
    AdaptedProbedTooHigh,

    /// There is no upper bound to adapt yet.
    NotAdaptedInflightHighNotSet,

    /// The sample carried no usable send state.
    NotAdaptedInvalidSample,
}

/// Tunables for the probing cycle.
#[derive(Debug, Clone, Copy)]
pub struct ProbeBwConfig {
    /// Maximum datagram size in bytes.
    pub max_datagram_size: u64,

    /// Floor for any inflight bound derived by the prober.
    pub min_cwnd: u64,

    /// Loss rate above which inflight is judged too high.
    pub loss_threshold: f64,

    /// Multiplicative decrease factor for `inflight_hi`.
    pub beta: f64,

    /// Fraction of `inflight_hi` kept free while cruising.
    pub headroom: f64,
}

impl Default for ProbeBwConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: 1200,
            min_cwnd: 2 * 1200,
            loss_threshold: LOSS_THRESHOLD,
            beta: BETA,
            headroom: HEADROOM,
        }
    }
}

impl From<&RecoveryConfig> for ProbeBwConfig {
    fn from(conf: &RecoveryConfig) -> Self {
        let max_datagram_size = conf.max_datagram_size as u64;
        Self {
            max_datagram_size,
            min_cwnd: conf.min_congestion_window.saturating_mul(max_datagram_size),
            loss_threshold: LOSS_THRESHOLD,
            beta: BETA,
            headroom: HEADROOM,
        }
    }
}

/// The PROBE_BW cycle state machine.
pub struct BandwidthProber {
    config: ProbeBwConfig,

    /// Current phase of the cycle.
    phase: CyclePhase,

    /// Wall clock start of the current phase.
    phase_start_time: Option<Instant>,

    /// Packet-timed rounds elapsed in the current phase.
    rounds_in_phase: u64,

    /// Packet-timed rounds elapsed since the last bandwidth probe.
    rounds_since_bw_probe: u64,

    /// Randomized wall clock wait before the next probe.
    probe_wait: Duration,

    /// Slope state for raising `inflight_hi` during PROBE_UP.
    probe_up_rounds: u64,
    probe_up_cnt: u64,
    probe_up_acked: u64,

    /// Upper bound on inflight judged safe by probing, or `u64::MAX`
    /// when no bound has been established.
    inflight_hi: u64,

    /// Whether acknowledgments currently arriving sample a bandwidth
    /// probe. Cleared after reacting to a failed probe so the cycle
    /// adapts at most once per probe.
    bw_probe_samples: bool,

    /// Whether the previous PROBE_UP was cut short by loss. Carried
    /// between cycles to bound how aggressively the next probe raises
    /// its ceiling.
    last_cycle_probed_too_high: bool,

    /// Whether the previous PROBE_UP stopped early to avoid re-incurring
    /// loss at the same inflight level. Lets the next cycle skip the
    /// probe wait and resume the interrupted probe.
    last_cycle_stopped_risky_probe: bool,

    random: Box<dyn RandomSource>,
}

impl BandwidthProber {
    pub fn new(config: ProbeBwConfig, random: Box<dyn RandomSource>) -> Self {
        Self {
            config,
            phase: CyclePhase::NotStarted,
            phase_start_time: None,
            rounds_in_phase: 0,
            rounds_since_bw_probe: 0,
            probe_wait: Duration::from_millis(PROBE_BW_MIN_WAIT_TIME_IN_MSEC),
            probe_up_rounds: 0,
            probe_up_cnt: u64::MAX,
            probe_up_acked: 0,
            inflight_hi: u64::MAX,
            bw_probe_samples: false,
            last_cycle_probed_too_high: false,
            last_cycle_stopped_risky_probe: false,
            random,
        }
    }

    /// Start or resume the probing cycle.
    ///
    /// The first entry goes through PROBE_REFILL rather than PROBE_UP so a
    /// cold start does not probe before the pipe is full. Later entries
    /// resume in PROBE_CRUISE.
    pub fn enter(&mut self, now: Instant) {
        match self.phase {
            CyclePhase::NotStarted => self.enter_probe_refill(0, now),
            _ => self.enter_probe_cruise(now),
        }
    }

    /// Suspend the probing cycle.
    ///
    /// Leaving in the middle of PROBE_UP marks the probe as stopped early
    /// so the next cycle can resume it without waiting out a full cruise.
    pub fn leave(&mut self, now: Instant) {
        if self.phase == CyclePhase::Up {
            self.last_cycle_stopped_risky_probe = true;
        }
        trace!(
            "probe_bw leave phase={:?} stopped_risky={} time={:?}",
            self.phase,
            self.last_cycle_stopped_risky_probe,
            now
        );
    }

    /// Feed an aggregated acknowledgment event into the cycle.
    ///
    /// `min_rtt` is the caller's current minimum round-trip estimate,
    /// `target_inflight` its estimated BDP bounded by the congestion
    /// window, and `cwnd` the congestion window itself.
    pub fn on_congestion_event(
        &mut self,
        event: &CongestionEvent,
        min_rtt: Duration,
        target_inflight: u64,
        cwnd: u64,
    ) -> AdaptUpperBoundsResult {
        if self.phase == CyclePhase::NotStarted {
            return AdaptUpperBoundsResult::NotAdaptedInvalidSample;
        }

        if event.is_round_start {
            self.rounds_in_phase += 1;
            self.rounds_since_bw_probe = self.rounds_since_bw_probe.saturating_add(1);
        }

        let result = self.adapt_upper_bounds(event, target_inflight, cwnd);

        match self.phase {
            CyclePhase::Up => self.update_probe_up(event, min_rtt, target_inflight, result),
            CyclePhase::Down => self.update_probe_down(event, min_rtt, target_inflight),
            CyclePhase::Cruise => self.update_probe_cruise(event, target_inflight),
            CyclePhase::Refill => self.update_probe_refill(event, cwnd),
            CyclePhase::NotStarted => (),
        }

        result
    }

    /// Track the acknowledgment sample against `inflight_hi`.
    fn adapt_upper_bounds(
        &mut self,
        event: &CongestionEvent,
        target_inflight: u64,
        cwnd: u64,
    ) -> AdaptUpperBoundsResult {
        if event.tx_in_flight == 0 && event.newly_acked_bytes == 0 {
            return AdaptUpperBoundsResult::NotAdaptedInvalidSample;
        }

        if self.is_inflight_too_high(event) {
            if self.bw_probe_samples {
                self.handle_inflight_too_high(event, target_inflight);
                return AdaptUpperBoundsResult::AdaptedProbedTooHigh;
            }
            // The loss was not sampled while probing, so it says nothing
            // about the bound.
            return AdaptUpperBoundsResult::NotAdaptedInvalidSample;
        }

        if self.inflight_hi == u64::MAX {
            return AdaptUpperBoundsResult::NotAdaptedInflightHighNotSet;
        }

        // Loss rate is safe. Adjust the upper bound upward.
        if event.tx_in_flight > self.inflight_hi {
            self.inflight_hi = event.tx_in_flight;
        }

        if self.phase == CyclePhase::Up {
            self.probe_inflight_hi_upward(event, cwnd);
        }

        AdaptUpperBoundsResult::AdaptedOk
    }

    fn is_inflight_too_high(&self, event: &CongestionEvent) -> bool {
        event.newly_lost_bytes
            > (event.tx_in_flight as f64 * self.config.loss_threshold) as u64
    }

    /// React, once per probe, to a loss rate above the threshold.
    fn handle_inflight_too_high(&mut self, event: &CongestionEvent, target_inflight: u64) {
        self.bw_probe_samples = false;

        // App-limited samples did not robustly probe the inflight volume,
        // so they do not justify a cut.
        if !event.is_app_limited {
            self.inflight_hi = ((target_inflight as f64 * self.config.beta) as u64)
                .max(event.tx_in_flight);
        }
        trace!("probe_bw inflight too high, inflight_hi={}", self.inflight_hi);
    }

    fn update_probe_up(
        &mut self,
        event: &CongestionEvent,
        min_rtt: Duration,
        target_inflight: u64,
        result: AdaptUpperBoundsResult,
    ) {
        if result == AdaptUpperBoundsResult::AdaptedProbedTooHigh {
            self.enter_probe_down(true, false, event.event_time);
            return;
        }

        // Stop before re-incurring the loss the previous cycle already
        // paid for at this inflight level.
        let is_risky = self.inflight_hi != u64::MAX
            && self.last_cycle_probed_too_high
            && event.bytes_in_flight >= self.inflight_hi;

        // The flow has probed for at least one min_rtt and the estimated
        // queue is high enough to judge the probe robust.
        let is_queuing = self.rounds_in_phase > 0
            && self.has_phase_lasted(event.event_time, min_rtt)
            && event.bytes_in_flight > target_inflight + target_inflight / 4;

        if is_risky || is_queuing {
            self.enter_probe_down(false, is_risky, event.event_time);
        }
    }

    fn update_probe_down(
        &mut self,
        event: &CongestionEvent,
        min_rtt: Duration,
        target_inflight: u64,
    ) {
        if self.rounds_in_phase == 1 && event.is_round_start {
            if self.last_cycle_stopped_risky_probe && !self.last_cycle_probed_too_high {
                // The previous probe stopped early without loss. Resume it
                // at the slope it had reached instead of waiting out a
                // full cruise.
                self.enter_probe_refill(self.probe_up_rounds, event.event_time);
                return;
            }
            self.last_cycle_stopped_risky_probe = false;
        }

        if self.is_time_to_probe_bandwidth(event.event_time, target_inflight) {
            self.enter_probe_refill(0, event.event_time);
            return;
        }

        if self.has_stayed_long_enough_in_probe_down(event.event_time, min_rtt)
            || (event.bytes_in_flight <= self.inflight_with_headroom()
                && event.bytes_in_flight <= target_inflight)
        {
            self.enter_probe_cruise(event.event_time);
        }
    }

    fn update_probe_cruise(&mut self, event: &CongestionEvent, target_inflight: u64) {
        if self.is_time_to_probe_bandwidth(event.event_time, target_inflight) {
            self.enter_probe_refill(0, event.event_time);
        }
    }

    fn update_probe_refill(&mut self, event: &CongestionEvent, cwnd: u64) {
        // After one round of REFILL, start UP.
        if event.is_round_start {
            self.bw_probe_samples = true;
            self.enter_probe_up(event.event_time, cwnd);
        }
    }

    /// Is it time to transition from DOWN or CRUISE to REFILL?
    fn is_time_to_probe_bandwidth(&self, now: Instant, target_inflight: u64) -> bool {
        self.has_phase_lasted(now, self.probe_wait)
            || self.is_reno_coexistence_probe_time(target_inflight)
    }

    fn is_reno_coexistence_probe_time(&self, target_inflight: u64) -> bool {
        // Random loss can shave some small percentage off of our inflight
        // in each round. To survive this, flows need periodic probes no
        // rarer than a Reno flow's recovery of the same inflight.
        let reno_rounds = target_inflight / self.config.max_datagram_size;
        self.rounds_since_bw_probe >= reno_rounds.min(PROBE_BW_MAX_ROUNDS)
    }

    fn has_stayed_long_enough_in_probe_down(&self, now: Instant, min_rtt: Duration) -> bool {
        self.has_phase_lasted(now, min_rtt)
    }

    fn has_phase_lasted(&self, now: Instant, interval: Duration) -> bool {
        match self.phase_start_time {
            Some(start) => now > start + interval,
            None => false,
        }
    }

    /// Randomized decision about how long to wait until probing for
    /// bandwidth, using round count and wall clock.
    fn pick_probe_wait(&mut self) {
        self.rounds_since_bw_probe = self.random.rand_range(0, PROBE_BW_RAND_ROUNDS);
        self.probe_wait = Duration::from_millis(self.random.rand_range(
            PROBE_BW_MIN_WAIT_TIME_IN_MSEC,
            PROBE_BW_MAX_WAIT_TIME_IN_MSEC,
        ));
    }

    fn enter_probe_down(&mut self, probed_too_high: bool, stopped_risky: bool, now: Instant) {
        trace!(
            "probe_bw enter DOWN probed_too_high={} stopped_risky={}",
            probed_too_high,
            stopped_risky
        );
        self.last_cycle_probed_too_high = probed_too_high;
        self.last_cycle_stopped_risky_probe = stopped_risky;
        self.probe_up_cnt = u64::MAX;
        self.pick_probe_wait();
        self.phase = CyclePhase::Down;
        self.phase_start_time = Some(now);
        self.rounds_in_phase = 0;
    }

    fn enter_probe_cruise(&mut self, now: Instant) {
        trace!("probe_bw enter CRUISE");
        self.phase = CyclePhase::Cruise;
        self.phase_start_time = Some(now);
        self.rounds_in_phase = 0;
    }

    fn enter_probe_refill(&mut self, probe_up_rounds: u64, now: Instant) {
        trace!("probe_bw enter REFILL probe_up_rounds={}", probe_up_rounds);
        self.probe_up_rounds = probe_up_rounds;
        self.probe_up_acked = 0;
        self.phase = CyclePhase::Refill;
        self.phase_start_time = Some(now);
        self.rounds_in_phase = 0;
    }

    fn enter_probe_up(&mut self, now: Instant, cwnd: u64) {
        trace!("probe_bw enter UP");
        self.phase = CyclePhase::Up;
        self.phase_start_time = Some(now);
        self.rounds_in_phase = 0;
        self.raise_inflight_hi_slope(cwnd);
    }

    /// Calculate the slope: bytes acked per `inflight_hi` increment. The
    /// growth doubles each round spent probing up.
    fn raise_inflight_hi_slope(&mut self, cwnd: u64) {
        let growth_this_round = 1u64 << self.probe_up_rounds;
        self.probe_up_rounds = self.probe_up_rounds.saturating_add(1).min(30);
        self.probe_up_cnt = (cwnd / growth_this_round).max(1);
    }

    /// Grow `inflight_hi` in proportion to the data acked while the flow
    /// is fully using the current ceiling.
    fn probe_inflight_hi_upward(&mut self, event: &CongestionEvent, cwnd: u64) {
        if !event.is_cwnd_limited || cwnd < self.inflight_hi {
            // Not fully using inflight_hi, so don't grow it.
            return;
        }

        self.probe_up_acked += event.newly_acked_bytes;
        if self.probe_up_acked >= self.probe_up_cnt {
            let delta = self.probe_up_acked / self.probe_up_cnt;
            self.probe_up_acked -= delta * self.probe_up_cnt;
            self.inflight_hi = self
                .inflight_hi
                .saturating_add(delta * self.config.max_datagram_size);
        }

        if event.is_round_start {
            self.raise_inflight_hi_slope(cwnd);
        }
    }

    /// A volume of data that leaves free headroom in the bottleneck for
    /// other flows while cruising.
    pub fn inflight_with_headroom(&self) -> u64 {
        if self.inflight_hi == u64::MAX {
            return u64::MAX;
        }

        let headroom = ((self.config.headroom * self.inflight_hi as f64) as u64).max(1);
        self.inflight_hi
            .saturating_sub(headroom)
            .max(self.config.min_cwnd)
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn inflight_hi(&self) -> u64 {
        self.inflight_hi
    }

    pub fn probe_wait(&self) -> Duration {
        self.probe_wait
    }

    /// Whether the cycle is in one of the accelerating phases.
    pub fn is_probing_for_bandwidth(&self) -> bool {
        matches!(self.phase, CyclePhase::Refill | CyclePhase::Up)
    }

    pub fn last_cycle_probed_too_high(&self) -> bool {
        self.last_cycle_probed_too_high
    }

    pub fn last_cycle_stopped_risky_probe(&self) -> bool {
        self.last_cycle_stopped_risky_probe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::tests::MockRandom;

    const MIN_RTT: Duration = Duration::from_millis(50);

    fn new_prober(seed: u64) -> BandwidthProber {
        BandwidthProber::new(
            ProbeBwConfig::default(),
            Box::new(MockRandom { value: seed }),
        )
    }

    fn round_event(time: Instant, bytes_in_flight: u64, tx_in_flight: u64) -> CongestionEvent {
        let mut event = CongestionEvent::new(time);
        event.is_round_start = true;
        event.newly_acked_bytes = 1200;
        event.bytes_in_flight = bytes_in_flight;
        event.tx_in_flight = tx_in_flight;
        event
    }

    #[test]
    fn initial_entry_is_refill() {
        let mut prober = new_prober(0);
        let t0 = Instant::now();
        assert_eq!(prober.phase(), CyclePhase::NotStarted);
        assert!(!prober.is_probing_for_bandwidth());

        prober.enter(t0);
        assert_eq!(prober.phase(), CyclePhase::Refill);
        assert!(prober.is_probing_for_bandwidth());

        // One round of REFILL, then UP.
        let event = round_event(t0 + Duration::from_millis(50), 12_000, 12_000);
        let res = prober.on_congestion_event(&event, MIN_RTT, 12_000, 12_000);
        assert_eq!(res, AdaptUpperBoundsResult::NotAdaptedInflightHighNotSet);
        assert_eq!(prober.phase(), CyclePhase::Up);
        assert_eq!(prober.probe_up_cnt, 12_000);
    }

    #[test]
    fn probe_up_cut_on_loss() {
        let mut prober = new_prober(5);
        let t0 = Instant::now();
        prober.enter(t0);
        let event = round_event(t0 + Duration::from_millis(50), 12_000, 12_000);
        prober.on_congestion_event(&event, MIN_RTT, 12_000, 12_000);
        assert_eq!(prober.phase(), CyclePhase::Up);

        // Loss above 2% of the inflight volume at send time.
        let mut event = CongestionEvent::new(t0 + Duration::from_millis(100));
        event.bytes_in_flight = 6_000;
        event.tx_in_flight = 6_000;
        event.newly_lost_bytes = 200;
        let res = prober.on_congestion_event(&event, MIN_RTT, 10_000, 12_000);
        assert_eq!(res, AdaptUpperBoundsResult::AdaptedProbedTooHigh);
        assert_eq!(prober.phase(), CyclePhase::Down);

        // inflight_hi = max(0.7 * 10000, 6000)
        assert_eq!(prober.inflight_hi(), 7_000);
        assert!(prober.last_cycle_probed_too_high());
        assert!(!prober.last_cycle_stopped_risky_probe());

        // Seed 5: wait for 5 % 2 rounds and 2000 + 6 % 1000 msec.
        assert_eq!(prober.rounds_since_bw_probe, 1);
        assert_eq!(prober.probe_wait(), Duration::from_millis(2_006));
    }

    #[test]
    fn risky_stop_resumes_probe() {
        let mut prober = new_prober(0);
        let t0 = Instant::now();
        prober.enter(t0);

        // REFILL -> UP -> loss cuts the ceiling and enters DOWN.
        let event = round_event(t0 + Duration::from_millis(25), 12_000, 12_000);
        prober.on_congestion_event(&event, MIN_RTT, 12_000, 12_000);
        let mut event = CongestionEvent::new(t0 + Duration::from_millis(50));
        event.bytes_in_flight = 6_000;
        event.tx_in_flight = 6_000;
        event.newly_lost_bytes = 200;
        prober.on_congestion_event(&event, MIN_RTT, 10_000, 12_000);
        assert_eq!(prober.phase(), CyclePhase::Down);
        assert_eq!(prober.inflight_hi(), 7_000);
        // Seed 0: wait for 0 rounds and 2001 msec.
        assert_eq!(prober.probe_wait(), Duration::from_millis(2_001));

        // Queue still standing, probe wait not elapsed: stay in DOWN.
        let event = round_event(t0 + Duration::from_millis(60), 7_000, 5_000);
        prober.on_congestion_event(&event, MIN_RTT, 10_000, 12_000);
        assert_eq!(prober.phase(), CyclePhase::Down);

        // Probe wait elapsed: a fresh probe starts from REFILL.
        let event = round_event(t0 + Duration::from_millis(3_000), 7_000, 5_000);
        prober.on_congestion_event(&event, MIN_RTT, 10_000, 12_000);
        assert_eq!(prober.phase(), CyclePhase::Refill);
        let event = round_event(t0 + Duration::from_millis(3_050), 7_000, 5_000);
        prober.on_congestion_event(&event, MIN_RTT, 10_000, 12_000);
        assert_eq!(prober.phase(), CyclePhase::Up);
        assert_eq!(prober.probe_up_rounds, 1);

        // Inflight has reached the ceiling that lost last cycle: stop the
        // probe before paying for the same loss again.
        let mut event = CongestionEvent::new(t0 + Duration::from_millis(3_100));
        event.newly_acked_bytes = 1200;
        event.bytes_in_flight = 7_000;
        event.tx_in_flight = 5_000;
        prober.on_congestion_event(&event, MIN_RTT, 10_000, 12_000);
        assert_eq!(prober.phase(), CyclePhase::Down);
        assert!(!prober.last_cycle_probed_too_high());
        assert!(prober.last_cycle_stopped_risky_probe());

        // First round of DOWN after a risky stop without loss: resume the
        // interrupted probe at its previous slope.
        let event = round_event(t0 + Duration::from_millis(3_150), 6_000, 5_000);
        prober.on_congestion_event(&event, MIN_RTT, 10_000, 12_000);
        assert_eq!(prober.phase(), CyclePhase::Refill);
        assert_eq!(prober.probe_up_rounds, 1);

        // The resumed UP grows at twice the rate of a fresh one.
        let event = round_event(t0 + Duration::from_millis(3_200), 6_000, 5_000);
        prober.on_congestion_event(&event, MIN_RTT, 10_000, 12_000);
        assert_eq!(prober.phase(), CyclePhase::Up);
        assert_eq!(prober.probe_up_cnt, 6_000);
    }

    #[test]
    fn reno_coexistence_probe() {
        let mut prober = new_prober(0);
        let t0 = Instant::now();

        // Re-entering a started cycle resumes in CRUISE.
        prober.enter(t0);
        prober.leave(t0);
        assert!(!prober.last_cycle_stopped_risky_probe());
        prober.enter(t0);
        assert_eq!(prober.phase(), CyclePhase::Cruise);

        // With a 3-packet target, the third round forces a probe even
        // though the wall clock wait has not elapsed.
        for i in 1..=2 {
            let event = round_event(t0 + Duration::from_millis(10 * i), 3_600, 3_600);
            prober.on_congestion_event(&event, MIN_RTT, 3_600, 3_600);
            assert_eq!(prober.phase(), CyclePhase::Cruise);
        }
        let event = round_event(t0 + Duration::from_millis(30), 3_600, 3_600);
        prober.on_congestion_event(&event, MIN_RTT, 3_600, 3_600);
        assert_eq!(prober.phase(), CyclePhase::Refill);
    }

    #[test]
    fn adapt_upper_bounds_results() {
        let mut prober = new_prober(0);
        let t0 = Instant::now();
        prober.enter(t0);

        // No usable send state.
        let empty = CongestionEvent::new(t0 + Duration::from_millis(10));
        let res = prober.on_congestion_event(&empty, MIN_RTT, 12_000, 12_000);
        assert_eq!(res, AdaptUpperBoundsResult::NotAdaptedInvalidSample);

        // Loss outside a probe says nothing about the bound.
        let mut lossy = CongestionEvent::new(t0 + Duration::from_millis(20));
        lossy.tx_in_flight = 6_000;
        lossy.newly_lost_bytes = 200;
        let res = prober.on_congestion_event(&lossy, MIN_RTT, 12_000, 12_000);
        assert_eq!(res, AdaptUpperBoundsResult::NotAdaptedInvalidSample);
        assert_eq!(prober.inflight_hi(), u64::MAX);

        // A clean sample with no bound yet set.
        let event = round_event(t0 + Duration::from_millis(30), 12_000, 12_000);
        let res = prober.on_congestion_event(&event, MIN_RTT, 12_000, 12_000);
        assert_eq!(res, AdaptUpperBoundsResult::NotAdaptedInflightHighNotSet);

        // Cut the bound through a probed-too-high event, then raise it by
        // a clean sample that carried more inflight.
        let mut lossy = CongestionEvent::new(t0 + Duration::from_millis(40));
        lossy.tx_in_flight = 6_000;
        lossy.newly_lost_bytes = 200;
        prober.on_congestion_event(&lossy, MIN_RTT, 10_000, 12_000);
        assert_eq!(prober.inflight_hi(), 7_000);

        let mut clean = CongestionEvent::new(t0 + Duration::from_millis(50));
        clean.newly_acked_bytes = 1_200;
        clean.tx_in_flight = 9_000;
        clean.bytes_in_flight = 9_000;
        let res = prober.on_congestion_event(&clean, MIN_RTT, 10_000, 12_000);
        assert_eq!(res, AdaptUpperBoundsResult::AdaptedOk);
        assert_eq!(prober.inflight_hi(), 9_000);
    }

    #[test]
    fn inflight_with_headroom() {
        let mut prober = new_prober(0);
        assert_eq!(prober.inflight_with_headroom(), u64::MAX);

        prober.inflight_hi = 10_000;
        assert_eq!(prober.inflight_with_headroom(), 8_500);

        // The floor is the minimum window.
        prober.inflight_hi = 2_500;
        assert_eq!(prober.inflight_with_headroom(), 2_400);
    }
}
