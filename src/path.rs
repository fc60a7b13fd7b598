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

//! Path validation through challenge/response exchanges.

use std::net::SocketAddr;
use std::time::Duration;
use std::time::Instant;

use log::debug;
use log::trace;
use smallvec::SmallVec;

use crate::alarm::Alarm;
use crate::clock::Clock;
use crate::clock::RandomSource;

/// Length of a path challenge payload in bytes.
pub const CHALLENGE_PAYLOAD_SIZE: usize = 8;

/// Maximum number of outstanding challenge payloads remembered per
/// validation. A response may match any of them, since earlier challenges
/// can still be in flight when a retry goes out.
const MAX_CHALLENGE_HISTORY: usize = 3;

/// Maximum number of challenge retries before a validation is abandoned.
const MAX_RETRY_TIMES: u32 = 2;

/// Addresses describing the path under validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathContext {
    /// Local address the challenge is sent from.
    pub self_addr: SocketAddr,

    /// Remote address the challenge is sent to.
    pub peer_addr: SocketAddr,

    /// Peer address after NAT rewriting, as observed on received packets.
    pub effective_peer_addr: SocketAddr,
}

/// Why a path validation was started. Recorded at start and reported back
/// on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
    ConnectionMigration,
    PortMigration,
    NatRebinding,
    PreferredAddress,
}

/// Collaborator carrying out the sends and receiving the verdict.
pub trait PathValidationDelegate {
    /// Send a PATH_CHALLENGE with the given payload on the path. Returns
    /// false if the challenge could not be written; the validator will
    /// retry on the next timeout either way.
    fn send_path_challenge(
        &mut self,
        payload: [u8; CHALLENGE_PAYLOAD_SIZE],
        context: &PathContext,
    ) -> bool;

    /// The wait before the next retry, typically derived from the current
    /// PTO.
    fn get_retry_timeout(&mut self, context: &PathContext) -> Duration;

    /// The path answered a challenge. `elapsed` is the time from the start
    /// of the validation, usable as an initial RTT sample for the path.
    fn on_path_validation_success(&mut self, context: PathContext, elapsed: Duration);

    /// The validation was abandoned.
    fn on_path_validation_failure(&mut self, context: PathContext, reason: ValidationReason);
}

struct PendingValidation {
    context: PathContext,
    reason: ValidationReason,
    start_time: Instant,
    retry_count: u32,
}

/// Driver of at most one path validation at a time.
pub struct PathValidator {
    pending: Option<PendingValidation>,

    /// Payloads of challenges still considered outstanding.
    challenges: SmallVec<[[u8; CHALLENGE_PAYLOAD_SIZE]; MAX_CHALLENGE_HISTORY]>,

    retry_alarm: Alarm,
    clock: Box<dyn Clock>,
    random: Box<dyn RandomSource>,
}

impl PathValidator {
    pub fn new(clock: Box<dyn Clock>, random: Box<dyn RandomSource>) -> Self {
        Self {
            pending: None,
            challenges: SmallVec::new(),
            retry_alarm: Alarm::new(),
            clock,
            random,
        }
    }

    /// Start validating a path.
    ///
    /// A validation already pending is failed first; the new one then
    /// replaces it.
    pub fn start_path_validation(
        &mut self,
        context: PathContext,
        reason: ValidationReason,
        delegate: &mut dyn PathValidationDelegate,
    ) {
        if let Some(pending) = self.pending.take() {
            debug!(
                "path validation to {:?} preempted by a new one to {:?}",
                pending.context.peer_addr, context.peer_addr
            );
            delegate.on_path_validation_failure(pending.context, pending.reason);
        }
        self.challenges.clear();

        trace!(
            "start path validation to {:?} reason {:?}",
            context.peer_addr,
            reason
        );
        self.pending = Some(PendingValidation {
            context,
            reason,
            start_time: self.clock.now(),
            retry_count: 0,
        });
        self.send_challenge(delegate);
    }

    /// Match an incoming PATH_RESPONSE against the outstanding challenges.
    ///
    /// Ignored unless a validation is pending and the response arrived on
    /// the local address under validation.
    pub fn on_path_response(
        &mut self,
        payload: [u8; CHALLENGE_PAYLOAD_SIZE],
        self_addr: SocketAddr,
        delegate: &mut dyn PathValidationDelegate,
    ) {
        let pending = match &self.pending {
            Some(pending) => pending,
            None => return,
        };
        if pending.context.self_addr != self_addr {
            return;
        }
        if !self.challenges.contains(&payload) {
            return;
        }

        let elapsed = self.clock.now() - pending.start_time;
        trace!(
            "path validation to {:?} succeeded after {:?}",
            pending.context.peer_addr,
            elapsed
        );
        if let Some(pending) = self.pending.take() {
            self.reset();
            delegate.on_path_validation_success(pending.context, elapsed);
        }
    }

    /// Handle an expired retry deadline: resend a fresh challenge, or give
    /// up once the retry budget is spent.
    pub fn on_retry_timeout(&mut self, delegate: &mut dyn PathValidationDelegate) {
        if !self.retry_alarm.is_expired(self.clock.now()) {
            return;
        }
        let pending = match &mut self.pending {
            Some(pending) => pending,
            None => return,
        };

        pending.retry_count += 1;
        if pending.retry_count > MAX_RETRY_TIMES {
            if let Some(pending) = self.pending.take() {
                debug!(
                    "path validation to {:?} failed after {} retries",
                    pending.context.peer_addr, MAX_RETRY_TIMES
                );
                self.reset();
                delegate.on_path_validation_failure(pending.context, pending.reason);
            }
            return;
        }
        self.send_challenge(delegate);
    }

    /// Abandon the pending validation, if any. Idempotent.
    pub fn cancel_path_validation(&mut self, delegate: &mut dyn PathValidationDelegate) {
        if let Some(pending) = self.pending.take() {
            trace!("path validation to {:?} cancelled", pending.context.peer_addr);
            self.reset();
            delegate.on_path_validation_failure(pending.context, pending.reason);
        }
    }

    pub fn has_pending_path_validation(&self) -> bool {
        self.pending.is_some()
    }

    /// The context under validation, if any.
    pub fn path_context(&self) -> Option<&PathContext> {
        self.pending.as_ref().map(|pending| &pending.context)
    }

    /// The armed retry deadline, for the embedding event loop.
    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_alarm.deadline()
    }

    fn send_challenge(&mut self, delegate: &mut dyn PathValidationDelegate) {
        let pending = match &self.pending {
            Some(pending) => pending,
            None => return,
        };
        let context = pending.context;

        let mut payload = [0u8; CHALLENGE_PAYLOAD_SIZE];
        self.random.fill_bytes(&mut payload);
        if self.challenges.len() == MAX_CHALLENGE_HISTORY {
            self.challenges.remove(0);
        }
        self.challenges.push(payload);

        if !delegate.send_path_challenge(payload, &context) {
            debug!("path challenge to {:?} not written", context.peer_addr);
        }
        let timeout = delegate.get_retry_timeout(&context);
        self.retry_alarm.set(self.clock.now() + timeout);
    }

    fn reset(&mut self) {
        self.challenges.clear();
        self.retry_alarm.cancel();
    }
}
