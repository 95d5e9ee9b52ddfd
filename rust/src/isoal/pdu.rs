// Copyright 2023 The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use num_derive::FromPrimitive;

use crate::isoal::PduStatus;
use crate::time::microseconds;

/// Logical link identifier of an ISO PDU.
///
/// For unframed streams it tells the fragment role of the PDU payload;
/// framed streams carry [`Llid::Framed`] on every PDU.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Llid {
    /// Complete SDU or end fragment of an SDU.
    #[default]
    CompleteEnd = 0b00,
    /// Start or continuation fragment of an SDU. A zero length PDU
    /// with this identifier is a padding PDU.
    StartContinue = 0b01,
    /// Framed PDU, containing one or more segments.
    Framed = 0b10,
    /// Reserved for control PDUs, never valid on an ISO data path.
    Control = 0b11,
}

/// ISO PDU received by the link layer, with its meta information.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IsoPdu<'a> {
    pub llid: Llid,
    /// Payload counter of the PDU within the stream.
    pub payload_number: u64,
    /// Reference anchor point of the isochronous event the PDU belongs to.
    pub timestamp: microseconds,
    pub status: PduStatus,
    pub payload: &'a [u8],
}

impl IsoPdu<'_> {
    pub fn is_valid(&self) -> bool {
        self.status == PduStatus::Valid
    }

    /// A zero length PDU. For unframed streams only the
    /// start/continue identifier marks padding.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
