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

//! Alarm deadlines for event-driven components.
//!
//! An alarm is the only suspension primitive in this crate. A component
//! "waits" by arming an alarm and returning to the caller; the embedding
//! event loop is responsible for invoking the component's `on_alarm` entry
//! point once the deadline has passed.

use std::time::Duration;
use std::time::Instant;

/// A single armed deadline.
///
/// The alarm itself does not fire; the owner polls [`Alarm::is_expired`]
/// (or feeds [`Alarm::deadline`] into its timer wheel) and dispatches to
/// the owning component when the deadline is reached.
#[derive(Debug, Default, Clone, Copy)]
pub struct Alarm {
    deadline: Option<Instant>,
}

impl Alarm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the alarm for the given deadline, replacing any previous one.
    pub fn set(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    /// Disarm the alarm. Idempotent.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Re-arm the alarm for a new deadline.
    ///
    /// If the alarm is already set and the new deadline is within
    /// `granularity` of the current one, the update is skipped to avoid
    /// timer churn.
    pub fn update(&mut self, deadline: Instant, granularity: Duration) {
        match self.deadline {
            Some(current) => {
                let delta = if deadline > current {
                    deadline - current
                } else {
                    current - deadline
                };
                if delta >= granularity {
                    self.deadline = Some(deadline);
                }
            }
            None => self.deadline = Some(deadline),
        }
    }

    /// Check whether the alarm is armed.
    pub fn is_set(&self) -> bool {
        self.deadline.is_some()
    }

    /// Return the armed deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check whether the armed deadline has passed.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.map_or(false, |d| d <= now)
    }
}
