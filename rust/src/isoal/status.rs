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

/// Reception status of a PDU, as reported by the lower link layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum PduStatus {
    #[default]
    Valid = 0x00,
    /// The PDU was received with bit errors; its header and payload
    /// cannot be trusted.
    Errors = 0x01,
    /// The PDU was not received.
    LostData = 0x02,
}

/// Status of an SDU, mapping onto the HCI ISO Data packet
/// Packet_Status_Flag.
///
/// BT Core V5.3 : Vol 4 HCI I/F : Part G HCI Func. Spec.:
/// 5.4.5 HCI ISO Data packets : Table 5.2
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum SduStatus {
    /// The complete SDU was received correctly.
    #[default]
    Valid = 0x00,
    /// The contents may contain errors or part of the SDU may be missing.
    Errors = 0x01,
    /// Part(s) of the SDU were not received correctly.
    LostData = 0x02,
}

impl SduStatus {
    /// Fold the status of one more contribution (PDU, segment or missing
    /// fragment) into the status collated so far for an SDU.
    ///
    /// Lost data marks the SDU so the host discards it, and is never
    /// downgraded once set. Errors replace a valid status.
    pub fn collate(self, other: SduStatus) -> SduStatus {
        use SduStatus::*;
        match (self, other) {
            (LostData, _) | (_, LostData) => LostData,
            (Errors, _) | (_, Errors) => Errors,
            (Valid, Valid) => Valid,
        }
    }
}

impl From<PduStatus> for SduStatus {
    fn from(status: PduStatus) -> Self {
        match status {
            PduStatus::Valid => SduStatus::Valid,
            PduStatus::Errors => SduStatus::Errors,
            PduStatus::LostData => SduStatus::LostData,
        }
    }
}
