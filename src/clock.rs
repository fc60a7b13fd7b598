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

//! Injected time and randomness sources.
//!
//! Components never reach for ambient global state. Wall-clock reads come
//! either from an explicit `now` argument at each entry point or from a
//! [`Clock`] handed to the component at construction; random payloads come
//! from a [`RandomSource`]. Tests substitute deterministic doubles.

use std::time::Instant;

use rand::RngCore;

/// A monotonic time source.
pub trait Clock {
    /// Return the current monotonic time.
    fn now(&self) -> Instant;
}

/// The production clock, backed by `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A source of unpredictable bytes, used to generate path challenge
/// payloads and to randomize bandwidth probe timing.
pub trait RandomSource {
    /// Fill `buf` with random bytes.
    fn fill_bytes(&mut self, buf: &mut [u8]);

    /// Return a random u64.
    fn next_u64(&mut self) -> u64;

    /// Return a random value in `[low, high)`.
    fn rand_range(&mut self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        low + self.next_u64() % (high - low)
    }
}

/// The production random source, backed by the OS RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&mut self, buf: &mut [u8]) {
        rand::thread_rng().fill_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        rand::thread_rng().next_u64()
    }
}
