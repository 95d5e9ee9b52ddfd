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

//! SDU production shared by the unframed and framed recombination paths.

use std::mem;

use tracing::{debug, warn};

use crate::isoal::{
    IsoPdu, IsoalError, SduBuffer, SduFragment, SduFragmentState, SduInfo, SduStatus, Sink,
};
use crate::time::{advance_time, microseconds, wrapped_time};

mod framed;
mod unframed;

/// Upper bound on the placeholder SDUs released for a single gap. Older
/// intervals are skipped without emission, only consuming their
/// sequence numbers.
pub(crate) const MAX_LOST_SDU_RELEASES: u64 = 32;

/// SDU being reassembled.
#[derive(Debug)]
pub(crate) struct SduInProgress {
    sequence_number: u16,
    timestamp: microseconds,
    /// Collated status of the PDUs contributing so far.
    status: SduStatus,
    total_size: usize,
    /// Fragments already emitted.
    fragments: usize,
    /// Current destination buffer and the bytes written into it.
    buffer: Option<(SduBuffer, usize)>,
}

impl SduInProgress {
    fn collate(&mut self, status: SduStatus) {
        self.status = self.status.collate(status);
    }
}

#[derive(Debug, Default)]
pub(crate) enum RecombineState {
    /// No SDU in progress.
    #[default]
    Start,
    Continue(SduInProgress),
    /// Loss already reported, drop PDUs until the next SDU boundary.
    ErrorSpooling,
}

/// Recombination state of a sink, cleared whenever the sink is enabled.
#[derive(Debug, Default)]
pub(crate) struct Production {
    pub(crate) state: RecombineState,
    /// Payload number of the last PDU consumed.
    pub(crate) prev_payload_number: Option<u64>,
    /// Framed only: PDUs elapsed since the last SDU start, 0 before the
    /// first one.
    pub(crate) pdu_cnt: u32,
    /// Timestamp of the last SDU produced.
    pub(crate) last_timestamp: Option<microseconds>,
}

impl Sink {
    fn take_state(&mut self) -> RecombineState {
        mem::take(&mut self.production.state)
    }

    /// Open a new SDU, consuming the next sequence number.
    fn begin_sdu(&mut self, timestamp: microseconds, status: SduStatus) -> SduInProgress {
        self.sequence_number = self.sequence_number.wrapping_add(1);
        self.production.last_timestamp = Some(timestamp);
        SduInProgress {
            sequence_number: self.sequence_number,
            timestamp,
            status,
            total_size: 0,
            fragments: 0,
            buffer: None,
        }
    }

    /// Copy `data` into the SDU, allocating buffers as needed. A full
    /// buffer is emitted right away as an intermediate fragment. With
    /// `end_of_sdu` the final fragment is emitted once `data` is written.
    fn append_to_sdu(
        &mut self,
        sdu: &mut SduInProgress,
        pdu: &IsoPdu<'_>,
        mut data: &[u8],
        end_of_sdu: bool,
    ) -> Result<(), IsoalError> {
        let mut result = Ok(());
        loop {
            let (buffer, written) = match sdu.buffer {
                Some(current) => current,
                None if data.is_empty() && !end_of_sdu => break,
                None => match self.ops.alloc(self.handle, pdu) {
                    Ok(buffer) => (buffer, 0),
                    Err(err) => {
                        warn!(
                            "sink {:?}: {} on PDU {}, dropping {} byte(s)",
                            self.handle,
                            err,
                            pdu.payload_number,
                            data.len()
                        );
                        return result.and(Err(err));
                    }
                },
            };

            let len = data.len().min(buffer.size.saturating_sub(written));
            if len == 0 && !data.is_empty() {
                warn!("sink {:?}: SDU buffer {} has no room", self.handle, buffer.handle);
                sdu.buffer = Some((buffer, written));
                return result.and(Err(IsoalError::SduAlloc));
            }

            let (chunk, rest) = data.split_at(len);
            if !chunk.is_empty() {
                result = result.and(self.ops.write(&buffer, chunk));
            }
            data = rest;
            sdu.total_size += len;
            sdu.buffer = Some((buffer, written + len));

            if data.is_empty() && end_of_sdu {
                return result.and(self.emit_fragment(sdu, true));
            }
            if written + len >= buffer.size {
                result = result.and(self.emit_fragment(sdu, false));
            }
            if data.is_empty() {
                break;
            }
        }
        result
    }

    /// Hand the current buffer of the SDU to the upper layer.
    fn emit_fragment(
        &mut self,
        sdu: &mut SduInProgress,
        end_of_sdu: bool,
    ) -> Result<(), IsoalError> {
        let (buffer, written) = match sdu.buffer.take() {
            Some(current) => current,
            None => return Ok(()),
        };
        let state = match (sdu.fragments == 0, end_of_sdu) {
            (true, true) => SduFragmentState::Single,
            (true, false) => SduFragmentState::Start,
            (false, false) => SduFragmentState::Continue,
            (false, true) => SduFragmentState::End,
        };
        sdu.fragments += 1;

        let fragment = SduFragment {
            state,
            size: written,
            status: sdu.status,
            timestamp: sdu.timestamp,
            sequence_number: sdu.sequence_number,
            buffer,
        };
        let info = SduInfo { total_size: sdu.total_size, collated_status: sdu.status };
        debug!(
            "sink {:?}: SDU #{} {:?} {} byte(s) {:?}",
            self.handle, sdu.sequence_number, state, written, sdu.status
        );
        self.ops.emit(self.handle, &fragment, &info)
    }

    /// Terminate the SDU with its current status.
    fn release_sdu(&mut self, mut sdu: SduInProgress, pdu: &IsoPdu<'_>) -> Result<(), IsoalError> {
        self.append_to_sdu(&mut sdu, pdu, &[], true)
    }

    /// Release a zero-length SDU standing for an SDU interval that could
    /// not be reconstructed.
    fn emit_lost_sdu(&mut self, pdu: &IsoPdu<'_>, status: SduStatus) -> Result<(), IsoalError> {
        let timestamp = match self.production.last_timestamp {
            Some(last) => advance_time(last, 1, self.config.sdu_interval),
            None => wrapped_time(pdu.timestamp, self.latency),
        };
        let sdu = self.begin_sdu(timestamp, status);
        debug!("sink {:?}: SDU #{} lost", self.handle, sdu.sequence_number);
        self.release_sdu(sdu, pdu)
    }

    /// Account for `count` SDU intervals lost before `pdu`, in
    /// chronological order.
    fn skip_sdu_intervals(
        &mut self,
        pdu: &IsoPdu<'_>,
        count: u64,
        status: SduStatus,
    ) -> Result<(), IsoalError> {
        let silent = count.saturating_sub(MAX_LOST_SDU_RELEASES);
        if silent > 0 {
            warn!("sink {:?}: {} SDU interval(s) lost without release", self.handle, silent);
            self.sequence_number = self.sequence_number.wrapping_add(silent as u16);
            if let Some(last) = self.production.last_timestamp {
                self.production.last_timestamp =
                    Some(advance_time(last, silent, self.config.sdu_interval));
            }
        }

        let mut result = Ok(());
        for _ in silent..count {
            result = result.and(self.emit_lost_sdu(pdu, status));
        }
        result
    }
}
