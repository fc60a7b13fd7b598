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

//! RTT estimation and packet loss detection.
//!
//! Acknowledgment events feed [`rtt::RttEstimator`] with samples; loss
//! detection runs over the sent-packet records of each packet number
//! space ([`space::SentPacketView`]) and is fanned out and merged by
//! [`loss::UberLossDetector`].

pub use self::loss::LossDetectionStats;
pub use self::loss::LossDetector;
pub use self::loss::LostPacket;
pub use self::loss::UberLossDetector;
pub use self::rtt::RttEstimator;
pub use self::space::SentPacket;
pub use self::space::SentPacketQueue;
pub use self::space::SentPacketView;
pub use self::space::SpaceId;
pub use self::space::SPACE_COUNT;

pub mod loss;
pub mod rtt;
pub mod space;
