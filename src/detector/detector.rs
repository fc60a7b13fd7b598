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

//! Network liveness watchdogs.
//!
//! Two independent single-alarm state machines: an idle/handshake watchdog
//! that closes connections with no network activity, and a two-stage
//! path-degrading/blackhole watchdog that reacts to a path that stops
//! delivering acknowledgments. Each reports through a delegate trait and is
//! driven by the embedding event loop via its `on_alarm` entry point.

pub use self::blackhole::BlackholeDetectorDelegate;
pub use self::blackhole::NetworkBlackholeDetector;
pub use self::idle::IdleDetectorDelegate;
pub use self::idle::IdleNetworkDetector;

pub mod blackhole;
pub mod idle;
