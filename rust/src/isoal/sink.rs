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
use tracing::debug;

use crate::isoal::rx::Production;
use crate::isoal::{IsoPdu, IsoalError, SduStatus, SinkHandle};
use crate::time::{self, microseconds, slots, ISO_INT_UNIT_US};

/// Role of the device the sink belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Role {
    Central = 0x00,
    Peripheral = 0x01,
    /// Synchronized receiver of a broadcast isochronous stream.
    Broadcast = 0x02,
}

/// Session parameters of a sink, fixed at creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkConfig {
    /// CIS or BIS connection handle served by the sink.
    pub handle: u16,
    pub role: Role,
    pub framed: bool,
    pub burst_number: u8,
    pub flush_timeout: u8,
    pub sdu_interval: microseconds,
    pub iso_interval: slots,
    /// CIS_Sync_Delay or BIS_Sync_Delay.
    pub stream_sync_delay: microseconds,
    /// CIG_Sync_Delay or BIG_Sync_Delay.
    pub group_sync_delay: microseconds,
}

impl SinkConfig {
    pub fn iso_interval_us(&self) -> microseconds {
        self.iso_interval as microseconds * ISO_INT_UNIT_US
    }

    /// Number of PDUs allotted to one SDU: BN * SDU_Interval / ISO_Interval.
    pub fn pdus_per_sdu(&self) -> u32 {
        let pdus = self.burst_number as u64 * self.sdu_interval as u64;
        pdus.checked_div(self.iso_interval_us() as u64).unwrap_or(0) as u32
    }

    pub fn latency(&self) -> i32 {
        time::sdu_sync_latency(
            self.role,
            self.framed,
            self.flush_timeout,
            self.sdu_interval,
            self.iso_interval,
            self.stream_sync_delay,
            self.group_sync_delay,
        )
    }
}

/// Destination buffer obtained from [`SduSink::alloc`]. The handle is
/// opaque to the ISO-AL and only passed back to the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SduBuffer {
    pub handle: usize,
    /// Capacity of the buffer in bytes.
    pub size: usize,
}

/// Position of an emitted fragment within its SDU, with the values of the
/// HCI ISO Data packet PB_Flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum SduFragmentState {
    Start = 0x00,
    Continue = 0x01,
    Single = 0x02,
    End = 0x03,
}

/// Fragment of an SDU handed to [`SduSink::emit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SduFragment {
    pub state: SduFragmentState,
    /// Bytes written into `buffer` for this fragment.
    pub size: usize,
    /// Status of the SDU up to and including this fragment.
    pub status: SduStatus,
    /// SDU synchronization reference.
    pub timestamp: microseconds,
    pub sequence_number: u16,
    pub buffer: SduBuffer,
}

/// Information on the whole SDU, final only on the last fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SduInfo {
    pub total_size: usize,
    pub collated_status: SduStatus,
}

/// Buffer capability supplied by the owner of a sink. The ISO-AL never
/// owns SDU memory: it obtains buffers, fills them and hands them back.
pub trait SduSink {
    /// Obtain a fresh destination buffer for the SDU being produced from `pdu`.
    fn alloc(&mut self, sink: SinkHandle, pdu: &IsoPdu<'_>) -> Result<SduBuffer, IsoalError>;

    /// Copy `data` at the current write position of `buffer`.
    fn write(&mut self, buffer: &SduBuffer, data: &[u8]) -> Result<(), IsoalError>;

    /// Release a fragment to the upper layer.
    fn emit(
        &mut self,
        sink: SinkHandle,
        fragment: &SduFragment,
        sdu: &SduInfo,
    ) -> Result<(), IsoalError>;
}

/// Recombination context of one isochronous stream.
pub struct Sink {
    pub(super) handle: SinkHandle,
    pub(super) config: SinkConfig,
    pub(super) latency: i32,
    pub(super) pdus_per_sdu: u32,
    pub(super) enabled: bool,
    /// Sequence number of the last SDU started.
    pub(super) sequence_number: u16,
    pub(super) production: Production,
    pub(super) ops: Box<dyn SduSink>,
}

impl Sink {
    pub(super) fn new(handle: SinkHandle, config: SinkConfig, ops: Box<dyn SduSink>) -> Sink {
        let latency = config.latency();
        let pdus_per_sdu = config.pdus_per_sdu();
        debug!(
            "sink {:?} for handle 0x{:x}: {:?} {} latency {}us, {} PDU(s) per SDU",
            handle,
            config.handle,
            config.role,
            if config.framed { "framed" } else { "unframed" },
            latency,
            pdus_per_sdu
        );
        Sink {
            handle,
            config,
            latency,
            pdus_per_sdu,
            enabled: false,
            sequence_number: 0,
            production: Production::default(),
            ops,
        }
    }

    pub fn handle(&self) -> SinkHandle {
        self.handle
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// Offset from the reference anchor point of a PDU to the
    /// synchronization reference of its SDU.
    pub fn latency(&self) -> i32 {
        self.latency
    }

    pub fn pdus_per_sdu(&self) -> u32 {
        self.pdus_per_sdu
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start latching in PDUs. SDU production restarts from a clean state.
    pub fn enable(&mut self) {
        self.production = Production::default();
        self.enabled = true;
    }

    /// Stop latching in PDUs. The production state is kept as is.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Consume one PDU, emitting the SDU fragments it completes. PDUs
    /// received while the sink is disabled are dropped.
    pub fn recombine(&mut self, pdu: &IsoPdu<'_>) -> Result<(), IsoalError> {
        if !self.enabled {
            return Ok(());
        }
        if self.config.framed {
            self.framed_consume(pdu)
        } else {
            self.unframed_consume(pdu)
        }
    }

    /// Number of PDUs making up one SDU window, never less than one.
    pub(super) fn window(&self) -> u64 {
        self.pdus_per_sdu.max(1) as u64
    }
}
