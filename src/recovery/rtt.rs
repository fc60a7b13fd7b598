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

use crate::TIMER_GRANULARITY;

/// RTT estimation for a network path.
/// See RFC 9002 Section 5
pub struct RttEstimator {
    /// The most recent RTT sample, after ack delay adjustment.
    latest_rtt: Duration,

    /// The smoothed RTT of the path is an exponentially weighted moving
    /// average of an endpoint's RTT samples.
    smoothed_rtt: Option<Duration>,

    /// The smoothed RTT before the most recent sample was applied.
    previous_smoothed_rtt: Option<Duration>,

    /// The RTT variance estimates the variation in the RTT samples using a
    /// mean variation.
    rttvar: Duration,

    /// The minimum RTT observed on the path, ignoring ack delay.
    /// It is used by loss detection to reject implausibly small RTT samples.
    /// Zero until the first valid sample.
    min_rtt: Duration,

    /// The maximum amount of time the peer intends to delay acknowledgments.
    /// Reported ack delays are capped by this value before adjustment.
    max_ack_delay: Duration,

    /// The initial RTT, used before a real RTT sample is taken.
    initial_rtt: Duration,

    /// The time of the most recent accepted sample.
    last_update_time: Option<Instant>,
}

impl RttEstimator {
    pub fn new(initial_rtt: Duration, max_ack_delay: Duration) -> Self {
        Self {
            latest_rtt: Duration::ZERO,
            smoothed_rtt: None,
            previous_smoothed_rtt: None,
            rttvar: initial_rtt / 2,
            min_rtt: Duration::ZERO,
            max_ack_delay,
            initial_rtt,
            last_update_time: None,
        }
    }

    /// Update the estimator with a new sample.
    ///
    /// `send_delta` is the time between sending a packet and receiving the
    /// acknowledgment that newly covers it; `ack_delay` is the delay the
    /// peer reports having held that acknowledgment. Return whether the
    /// sample was accepted.
    pub fn update_rtt(&mut self, send_delta: Duration, ack_delay: Duration, now: Instant) -> bool {
        if send_delta.is_zero() {
            trace!("ignoring empty rtt sample ack_delay={:?}", ack_delay);
            return false;
        }
        self.last_update_time = Some(now);

        // min_rtt ignores ack delay.
        if self.min_rtt.is_zero() || send_delta < self.min_rtt {
            self.min_rtt = send_delta;
        }

        // Correct for ack_delay if information received from the peer
        // results in an RTT sample at least as large as min_rtt.
        // Otherwise, stick with the unadjusted send delta rather than
        // discard the sample.
        let ack_delay = cmp::min(ack_delay, self.max_ack_delay);
        let mut sample = send_delta;
        if send_delta >= self.min_rtt + ack_delay {
            sample = send_delta - ack_delay;
        } else if !ack_delay.is_zero() {
            trace!(
                "ack delay {:?} larger than rtt sample {:?} allows, ignoring it",
                ack_delay,
                send_delta
            );
        }
        self.latest_rtt = sample;

        match self.smoothed_rtt {
            Some(smoothed_rtt) => {
                self.previous_smoothed_rtt = Some(smoothed_rtt);
                let var_sample = if smoothed_rtt > sample {
                    smoothed_rtt - sample
                } else {
                    sample - smoothed_rtt
                };
                self.rttvar = (3 * self.rttvar + var_sample) / 4;
                self.smoothed_rtt = Some((7 * smoothed_rtt + sample) / 8);
            }
            None => {
                self.smoothed_rtt = Some(sample);
                self.rttvar = sample / 2;
            }
        }
        true
    }

    /// Force the smoothed metrics up to the latest sample if they have
    /// decayed below it, typically after a long quiescent period during
    /// which no samples were taken.
    pub fn expire_smoothed_metrics(&mut self) {
        if let Some(smoothed_rtt) = self.smoothed_rtt {
            let deviation = if smoothed_rtt > self.latest_rtt {
                smoothed_rtt - self.latest_rtt
            } else {
                self.latest_rtt - smoothed_rtt
            };
            self.rttvar = cmp::max(self.rttvar, deviation);
            self.smoothed_rtt = Some(cmp::max(smoothed_rtt, self.latest_rtt));
        }
    }

    /// Discard all samples taken on the old path. The initial RTT and the
    /// max ack delay carry over.
    pub fn on_connection_migration(&mut self) {
        *self = Self::new(self.initial_rtt, self.max_ack_delay);
    }

    /// Return the current best RTT estimation.
    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt.unwrap_or(self.initial_rtt)
    }

    /// Return the smoothed RTT as it was before the most recent sample.
    pub fn previous_smoothed_rtt(&self) -> Duration {
        self.previous_smoothed_rtt.unwrap_or(self.initial_rtt)
    }

    /// Return the latest RTT sample, or the initial RTT if no sample has
    /// been taken yet.
    pub fn latest_rtt(&self) -> Duration {
        if self.latest_rtt.is_zero() {
            return self.initial_rtt;
        }
        self.latest_rtt
    }

    /// Return the minimum RTT observed so far, ignoring ack delay. Zero
    /// until the first valid sample.
    pub fn min_rtt(&self) -> Duration {
        self.min_rtt
    }

    /// Return the variation in the RTT samples using a mean variation.
    pub fn rttvar(&self) -> Duration {
        self.rttvar
    }

    /// Whether at least one valid sample has been taken.
    pub fn has_first_sample(&self) -> bool {
        self.smoothed_rtt.is_some()
    }

    /// Return the time of the most recent accepted sample.
    pub fn last_update_time(&self) -> Option<Instant> {
        self.last_update_time
    }

    /// Return the PTO computed as described in RFC 9002 Section 6.2.1
    pub fn pto_base(&self) -> Duration {
        self.smoothed_rtt() + cmp::max(4 * self.rttvar, TIMER_GRANULARITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn initial() {
        let r = RttEstimator::new(ms(300), ms(100));
        assert!(!r.has_first_sample());
        assert_eq!(r.latest_rtt(), ms(300));
        assert_eq!(r.smoothed_rtt(), ms(300));
        assert_eq!(r.min_rtt(), Duration::ZERO);
        assert_eq!(r.rttvar(), ms(150));
        assert_eq!(r.last_update_time(), None);
    }

    #[test]
    fn update() {
        let now = Instant::now();
        let mut r = RttEstimator::new(ms(300), ms(100));

        // First sample sets every metric directly.
        assert!(r.update_rtt(ms(100), Duration::ZERO, now));
        assert!(r.has_first_sample());
        assert_eq!(r.latest_rtt(), ms(100));
        assert_eq!(r.smoothed_rtt(), ms(100));
        assert_eq!(r.min_rtt(), ms(100));
        assert_eq!(r.rttvar(), ms(50));
        assert_eq!(r.last_update_time(), Some(now));

        // Second sample with a subtractable ack delay.
        assert!(r.update_rtt(ms(400), ms(100), now));
        assert_eq!(r.latest_rtt(), ms(300));
        assert_eq!(r.min_rtt(), ms(100));
        assert_eq!(r.previous_smoothed_rtt(), ms(100));
        assert_eq!(r.rttvar(), Duration::from_micros(87500));
        assert_eq!(r.smoothed_rtt(), ms(125));

        // Subtracting the ack delay would undercut min_rtt, so the raw
        // send delta is used instead.
        assert!(r.update_rtt(ms(120), ms(50), now));
        assert_eq!(r.latest_rtt(), ms(120));
        assert_eq!(r.previous_smoothed_rtt(), ms(125));
        assert_eq!(r.rttvar(), Duration::from_micros(66875));
        assert_eq!(r.smoothed_rtt(), Duration::from_micros(124375));
    }

    #[test]
    fn reject_empty_sample() {
        let now = Instant::now();
        let mut r = RttEstimator::new(ms(300), ms(100));
        assert!(!r.update_rtt(Duration::ZERO, ms(10), now));
        assert!(!r.has_first_sample());
        assert_eq!(r.min_rtt(), Duration::ZERO);
        assert_eq!(r.last_update_time(), None);
    }

    #[test]
    fn ack_delay_capped() {
        let now = Instant::now();
        let mut r = RttEstimator::new(ms(300), ms(100));
        r.update_rtt(ms(100), Duration::ZERO, now);

        // A reported ack delay of 300ms is capped at max_ack_delay.
        r.update_rtt(ms(400), ms(300), now);
        assert_eq!(r.latest_rtt(), ms(300));
    }

    #[test]
    fn expire_smoothed_metrics() {
        let now = Instant::now();
        let mut r = RttEstimator::new(ms(300), ms(100));
        r.update_rtt(ms(100), Duration::ZERO, now);
        r.update_rtt(ms(500), Duration::ZERO, now);
        assert_eq!(r.smoothed_rtt(), ms(150));
        assert_eq!(r.rttvar(), Duration::from_micros(137500));

        r.expire_smoothed_metrics();
        assert_eq!(r.smoothed_rtt(), ms(500));
        assert_eq!(r.rttvar(), ms(350));

        // Expiry never lowers the metrics.
        r.expire_smoothed_metrics();
        assert_eq!(r.smoothed_rtt(), ms(500));
        assert_eq!(r.rttvar(), ms(350));
    }

    #[test]
    fn connection_migration() {
        let now = Instant::now();
        let mut r = RttEstimator::new(ms(300), ms(100));
        r.update_rtt(ms(100), Duration::ZERO, now);
        assert_eq!(r.min_rtt(), ms(100));

        r.on_connection_migration();
        assert!(!r.has_first_sample());
        assert_eq!(r.latest_rtt(), ms(300));
        assert_eq!(r.smoothed_rtt(), ms(300));
        assert_eq!(r.min_rtt(), Duration::ZERO);
        assert_eq!(r.rttvar(), ms(150));
    }
}
