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

use std::collections::VecDeque;
use std::time::Instant;

use strum::EnumCount;
use strum_macros::EnumCount;
use strum_macros::EnumIter;

/// Packet numbers are divided into three spaces in QUIC.
pub const SPACE_COUNT: usize = SpaceId::COUNT;

/// Packet number space identifiers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, EnumIter, EnumCount)]
#[repr(usize)]
pub enum SpaceId {
    /// Initial space for all Initial packets.
    Initial = 0,

    /// Handshake space for all Handshake packets.
    Handshake = 1,

    /// Application data space for all 0-RTT and 1-RTT packets.
    Data = 2,
}

/// Metadata of a sent packet, kept until the packet is acknowledged or
/// declared lost.
/// See RFC 9002 Section 9.1
#[derive(Clone, Debug)]
pub struct SentPacket {
    /// The packet number of the sent packet.
    pub pkt_num: u64,

    /// The packet number space the packet was sent in.
    pub space_id: SpaceId,

    /// The time the packet was sent.
    pub time_sent: Instant,

    /// The number of bytes sent in the packet, not including UDP or IP
    /// overhead, but including QUIC framing overhead.
    pub sent_size: usize,

    /// Whether the packet elicits an acknowledgment from the peer.
    pub ack_eliciting: bool,

    /// Whether the packet counts toward bytes in flight.
    pub in_flight: bool,

    /// The time the packet was acknowledged, if any.
    pub time_acked: Option<Instant>,

    /// The time the packet was declared lost, if any.
    pub time_lost: Option<Instant>,
}

impl SentPacket {
    /// Whether the packet is still awaiting an acknowledgment.
    pub fn is_outstanding(&self) -> bool {
        self.time_acked.is_none() && self.time_lost.is_none()
    }
}

/// Read-only view over the sent and not yet acknowledged packets of a
/// single packet number space.
///
/// The packet-tracking collaborator of the connection owns the records;
/// loss detection only inspects them and reports which packet numbers to
/// declare lost.
pub trait SentPacketView {
    /// The largest packet number acknowledged in the space, if any.
    fn largest_acked(&self) -> Option<u64>;

    /// The smallest packet number still awaiting an acknowledgment.
    fn least_unacked(&self) -> u64;

    /// Iterate the outstanding in-flight packets in ascending packet
    /// number order.
    fn in_flight_packets(&self) -> Box<dyn Iterator<Item = &SentPacket> + '_>;
}

/// A concrete sent-packet store for one packet number space.
///
/// Embedders with their own packet tracking only need to implement
/// [`SentPacketView`]; this queue backs the crate's own tests and serves
/// as a reference implementation of the expected bookkeeping.
#[derive(Default)]
pub struct SentPacketQueue {
    /// Sent packets metadata, in ascending packet number order.
    sent: VecDeque<SentPacket>,

    /// The largest packet number acknowledged in the space so far.
    largest_acked_pkt: Option<u64>,

    /// The packet number to assign to the next sent packet.
    next_pkt_num: u64,

    /// The sum of the sizes of all in-flight packets in the space.
    bytes_in_flight: usize,
}

impl SentPacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sent packet. Packet numbers must be recorded in ascending
    /// order.
    pub fn on_packet_sent(&mut self, pkt: SentPacket) {
        debug_assert!(pkt.pkt_num >= self.next_pkt_num);
        self.next_pkt_num = pkt.pkt_num + 1;
        if pkt.in_flight {
            self.bytes_in_flight += pkt.sent_size;
        }
        self.sent.push_back(pkt);
    }

    /// Mark a packet as acknowledged. Return whether the packet was
    /// outstanding before this call.
    pub fn on_packet_acked(&mut self, pkt_num: u64, now: Instant) -> bool {
        let newly_acked = match self.find_mut(pkt_num) {
            Some(pkt) if pkt.is_outstanding() => {
                pkt.time_acked = Some(now);
                if pkt.in_flight {
                    pkt.in_flight = false;
                }
                pkt.sent_size
            }
            _ => return false,
        };
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(newly_acked);
        self.largest_acked_pkt = Some(match self.largest_acked_pkt {
            Some(largest) => largest.max(pkt_num),
            None => pkt_num,
        });
        true
    }

    /// Mark a packet as lost. Return the in-flight bytes released, if the
    /// packet was outstanding.
    pub fn mark_lost(&mut self, pkt_num: u64, now: Instant) -> Option<usize> {
        let released = match self.find_mut(pkt_num) {
            Some(pkt) if pkt.is_outstanding() => {
                pkt.time_lost = Some(now);
                if pkt.in_flight {
                    pkt.in_flight = false;
                    pkt.sent_size
                } else {
                    0
                }
            }
            _ => return None,
        };
        self.bytes_in_flight = self.bytes_in_flight.saturating_sub(released);
        Some(released)
    }

    /// Forget leading packets that are no longer outstanding.
    pub fn drain_settled(&mut self) {
        while let Some(pkt) = self.sent.front() {
            if pkt.is_outstanding() {
                break;
            }
            self.sent.pop_front();
        }
    }

    /// Look up a tracked packet by number.
    pub fn get(&self, pkt_num: u64) -> Option<&SentPacket> {
        self.sent.iter().find(|p| p.pkt_num == pkt_num)
    }

    /// The sum of the sizes of all in-flight packets in the space.
    pub fn bytes_in_flight(&self) -> usize {
        self.bytes_in_flight
    }

    fn find_mut(&mut self, pkt_num: u64) -> Option<&mut SentPacket> {
        self.sent.iter_mut().find(|p| p.pkt_num == pkt_num)
    }
}

impl SentPacketView for SentPacketQueue {
    fn largest_acked(&self) -> Option<u64> {
        self.largest_acked_pkt
    }

    fn least_unacked(&self) -> u64 {
        self.sent
            .iter()
            .find(|p| p.time_acked.is_none())
            .map(|p| p.pkt_num)
            .unwrap_or(self.next_pkt_num)
    }

    fn in_flight_packets(&self) -> Box<dyn Iterator<Item = &SentPacket> + '_> {
        Box::new(
            self.sent
                .iter()
                .filter(|p| p.is_outstanding() && p.in_flight),
        )
    }
}
