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

//! Two-stage path-degrading and blackhole detection.

use std::time::Instant;

use log::error;
use log::trace;

use crate::alarm::Alarm;
use crate::TIMER_GRANULARITY;

/// Receiver of blackhole watchdog events.
pub trait BlackholeDetectorDelegate {
    /// The path stopped making forward progress but may still recover.
    fn on_path_degrading_detected(&mut self);

    /// The path is judged blackholed.
    fn on_blackhole_detected(&mut self);
}

/// Watchdog escalating from path degradation to a blackhole verdict.
///
/// A single alarm serves both stages: it is armed at the degrading
/// deadline first, re-armed at the blackhole deadline after the first
/// fire, and disarmed after the second. Forward progress is signalled by
/// the owner through `stop_detection` or a fresh `restart_detection`.
pub struct NetworkBlackholeDetector {
    path_degrading_deadline: Option<Instant>,
    blackhole_deadline: Option<Instant>,
    alarm: Alarm,
}

impl Default for NetworkBlackholeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkBlackholeDetector {
    pub fn new() -> Self {
        Self {
            path_degrading_deadline: None,
            blackhole_deadline: None,
            alarm: Alarm::new(),
        }
    }

    /// Start or restart detection with fresh deadlines.
    ///
    /// The blackhole deadline must not precede the degrading deadline.
    pub fn restart_detection(
        &mut self,
        path_degrading_deadline: Instant,
        blackhole_deadline: Instant,
    ) {
        if blackhole_deadline < path_degrading_deadline {
            error!("blackhole deadline precedes path degrading deadline");
            debug_assert!(false);
            return;
        }

        self.path_degrading_deadline = Some(path_degrading_deadline);
        self.blackhole_deadline = Some(blackhole_deadline);
        self.alarm.update(path_degrading_deadline, TIMER_GRANULARITY);
    }

    /// Stop detection and disarm the alarm. Idempotent.
    pub fn stop_detection(&mut self) {
        self.path_degrading_deadline = None;
        self.blackhole_deadline = None;
        self.alarm.cancel();
    }

    /// Process an expired deadline and report through the delegate.
    pub fn on_alarm(&mut self, now: Instant, delegate: &mut dyn BlackholeDetectorDelegate) {
        if !self.alarm.is_expired(now) {
            return;
        }

        if let Some(deadline) = self.path_degrading_deadline.take() {
            trace!("path degrading detected at {:?}", deadline);
            delegate.on_path_degrading_detected();

            // Escalate to the blackhole stage.
            match self.blackhole_deadline {
                Some(blackhole_deadline) => self.alarm.set(blackhole_deadline),
                None => self.alarm.cancel(),
            }
            return;
        }

        if self.blackhole_deadline.take().is_some() {
            trace!("blackhole detected at {:?}", now);
            self.alarm.cancel();
            delegate.on_blackhole_detected();
        }
    }

    /// Whether a detection is armed for either stage.
    pub fn is_detection_in_progress(&self) -> bool {
        self.alarm.is_set()
    }

    /// The currently armed deadline.
    pub fn deadline(&self) -> Option<Instant> {
        self.alarm.deadline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingDelegate {
        degrading: u64,
        blackholes: u64,
    }

    impl BlackholeDetectorDelegate for CountingDelegate {
        fn on_path_degrading_detected(&mut self) {
            self.degrading += 1;
        }

        fn on_blackhole_detected(&mut self) {
            self.blackholes += 1;
        }
    }

    #[test]
    fn two_stage_escalation() {
        let t0 = Instant::now();
        let mut detector = NetworkBlackholeDetector::new();
        let mut delegate = CountingDelegate::default();
        assert!(!detector.is_detection_in_progress());

        detector.restart_detection(t0 + Duration::from_secs(5), t0 + Duration::from_secs(10));
        assert!(detector.is_detection_in_progress());
        assert_eq!(detector.deadline(), Some(t0 + Duration::from_secs(5)));

        // First fire degrades the path and re-arms for the blackhole stage.
        detector.on_alarm(t0 + Duration::from_secs(5), &mut delegate);
        assert_eq!(delegate.degrading, 1);
        assert_eq!(delegate.blackholes, 0);
        assert!(detector.is_detection_in_progress());
        assert_eq!(detector.deadline(), Some(t0 + Duration::from_secs(10)));

        // Second fire declares the blackhole and stops.
        detector.on_alarm(t0 + Duration::from_secs(10), &mut delegate);
        assert_eq!(delegate.degrading, 1);
        assert_eq!(delegate.blackholes, 1);
        assert!(!detector.is_detection_in_progress());

        // Stale wakeups after stopping are ignored.
        detector.on_alarm(t0 + Duration::from_secs(11), &mut delegate);
        assert_eq!(delegate.blackholes, 1);
    }

    #[test]
    fn forward_progress_restarts_cleanly() {
        let t0 = Instant::now();
        let mut detector = NetworkBlackholeDetector::new();
        let mut delegate = CountingDelegate::default();

        detector.restart_detection(t0 + Duration::from_secs(5), t0 + Duration::from_secs(10));
        detector.on_alarm(t0 + Duration::from_secs(5), &mut delegate);
        assert_eq!(delegate.degrading, 1);

        // An ack arrives, the owner restarts from scratch.
        detector.restart_detection(t0 + Duration::from_secs(12), t0 + Duration::from_secs(17));
        assert_eq!(detector.deadline(), Some(t0 + Duration::from_secs(12)));
        detector.on_alarm(t0 + Duration::from_secs(12), &mut delegate);
        assert_eq!(delegate.degrading, 2);
        assert_eq!(delegate.blackholes, 0);

        // Stopping mid-detection disarms, and is idempotent.
        detector.stop_detection();
        assert!(!detector.is_detection_in_progress());
        detector.stop_detection();
        detector.on_alarm(t0 + Duration::from_secs(17), &mut delegate);
        assert_eq!(delegate.blackholes, 0);
    }
}
