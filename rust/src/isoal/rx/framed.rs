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

//! Framed recombination. Each PDU carries any number of segments and each
//! SDU announces its start with a segment holding a time offset.

use tracing::{debug, warn};

use super::RecombineState::{self, Continue, ErrorSpooling, Start};
use crate::isoal::segment::Segments;
use crate::isoal::{IsoPdu, IsoalError, Llid, SduStatus, Sink};
use crate::time::wrapped_time;

impl Sink {
    pub(crate) fn framed_consume(&mut self, pdu: &IsoPdu<'_>) -> Result<(), IsoalError> {
        if pdu.is_valid() && pdu.llid != Llid::Framed {
            warn!(
                "sink {:?}: unexpected {:?} PDU {} on framed stream",
                self.handle, pdu.llid, pdu.payload_number
            );
            return Err(IsoalError::Unspecified);
        }

        let missing = match self.production.prev_payload_number {
            Some(prev) if pdu.payload_number <= prev => {
                debug!("sink {:?}: stale PDU {} after {}", self.handle, pdu.payload_number, prev);
                return Ok(());
            }
            Some(prev) => pdu.payload_number - prev - 1,
            None => 0,
        };
        let first_pdu = self.production.prev_payload_number.is_none();
        self.production.prev_payload_number = Some(pdu.payload_number);

        let mut result = Ok(());
        let mut state = self.take_state();
        if missing > 0 {
            debug!(
                "sink {:?}: {} PDU(s) missing before {}",
                self.handle, missing, pdu.payload_number
            );
            state = self.framed_skip_missing(state, pdu, missing, &mut result);
        }

        self.production.state = if !pdu.is_valid() {
            self.framed_errored(state, pdu, &mut result)
        } else if pdu.is_empty() {
            self.framed_padding(state, pdu, &mut result)
        } else {
            self.framed_segments(state, pdu, first_pdu, &mut result)
        };
        result
    }

    fn count_pdu(&mut self) {
        self.production.pdu_cnt = self.production.pdu_cnt.saturating_add(1);
    }

    /// Account for `count` PDUs without any SDU start. Each time
    /// `pdus_per_sdu` PDUs have elapsed since the last start, an SDU
    /// interval is considered lost and a placeholder released.
    fn account_empty_pdus(
        &mut self,
        pdu: &IsoPdu<'_>,
        count: u64,
        status: SduStatus,
    ) -> Result<(), IsoalError> {
        if count == 0 {
            return Ok(());
        }
        let window = self.window();
        let elapsed = self.production.pdu_cnt as u64;
        let open = if elapsed == 0 { 0 } else { window.saturating_sub(elapsed) };
        if count <= open {
            self.production.pdu_cnt = (elapsed + count) as u32;
            return Ok(());
        }

        let rest = count - open;
        let lost = (rest + window - 1) / window;
        self.production.pdu_cnt = ((rest - 1) % window + 1) as u32;
        self.skip_sdu_intervals(pdu, lost, status)
    }

    /// Account for `count` PDUs that interrupted the stream between SDUs.
    /// The SDU expected next is lost, so the current window is closed
    /// before accounting.
    fn framed_release_interrupted(
        &mut self,
        pdu: &IsoPdu<'_>,
        count: u64,
        status: SduStatus,
    ) -> Result<(), IsoalError> {
        self.production.pdu_cnt = self.window() as u32;
        self.account_empty_pdus(pdu, count, status)
    }

    fn framed_skip_missing(
        &mut self,
        state: RecombineState,
        pdu: &IsoPdu<'_>,
        mut missing: u64,
        result: &mut Result<(), IsoalError>,
    ) -> RecombineState {
        match state {
            Continue(mut sdu) => {
                sdu.collate(SduStatus::LostData);
                *result = result.and(self.release_sdu(sdu, pdu));
                self.count_pdu();
                missing -= 1;
            }
            Start => {
                let released = self.framed_release_interrupted(pdu, missing, SduStatus::LostData);
                *result = result.and(released);
                return ErrorSpooling;
            }
            ErrorSpooling => (),
        }
        *result = result.and(self.account_empty_pdus(pdu, missing, SduStatus::LostData));
        ErrorSpooling
    }

    fn framed_errored(
        &mut self,
        state: RecombineState,
        pdu: &IsoPdu<'_>,
        result: &mut Result<(), IsoalError>,
    ) -> RecombineState {
        let status = SduStatus::from(pdu.status);
        match state {
            Continue(mut sdu) => {
                sdu.collate(status);
                *result = result.and(self.release_sdu(sdu, pdu));
                self.count_pdu();
            }
            Start => {
                *result = result.and(self.framed_release_interrupted(pdu, 1, status));
            }
            ErrorSpooling => {
                *result = result.and(self.account_empty_pdus(pdu, 1, status));
            }
        }
        ErrorSpooling
    }

    fn framed_padding(
        &mut self,
        state: RecombineState,
        pdu: &IsoPdu<'_>,
        result: &mut Result<(), IsoalError>,
    ) -> RecombineState {
        match state {
            Continue(sdu) => {
                self.count_pdu();
                Continue(sdu)
            }
            other => {
                *result = result.and(self.account_empty_pdus(pdu, 1, SduStatus::LostData));
                other
            }
        }
    }

    fn framed_segments(
        &mut self,
        mut state: RecombineState,
        pdu: &IsoPdu<'_>,
        first_pdu: bool,
        result: &mut Result<(), IsoalError>,
    ) -> RecombineState {
        let mut started = false;
        for segment in Segments::new(pdu.payload) {
            let segment = match segment {
                Ok(segment) => segment,
                Err(err) => {
                    warn!("sink {:?}: PDU {}: {}", self.handle, pdu.payload_number, err);
                    if let Continue(mut sdu) = state {
                        sdu.collate(SduStatus::LostData);
                        *result = result.and(self.release_sdu(sdu, pdu));
                    } else {
                        let released = self.framed_release_interrupted(pdu, 1, SduStatus::LostData);
                        *result = result.and(released);
                        started = true;
                    }
                    state = ErrorSpooling;
                    break;
                }
            };

            state = if segment.is_start() {
                if let Continue(mut sdu) = state {
                    debug!("sink {:?}: SDU #{} not terminated", self.handle, sdu.sequence_number);
                    sdu.collate(SduStatus::LostData);
                    *result = result.and(self.release_sdu(sdu, pdu));
                }
                let time_offset = segment.time_offset.unwrap_or(0) as i32;
                let timestamp =
                    wrapped_time(pdu.timestamp, self.latency.saturating_sub(time_offset));
                let mut sdu = self.begin_sdu(timestamp, SduStatus::Valid);
                self.production.pdu_cnt = 1;
                started = true;
                let appended = self.append_to_sdu(&mut sdu, pdu, segment.data, segment.cmplt);
                *result = result.and(appended);
                if segment.cmplt {
                    Start
                } else {
                    Continue(sdu)
                }
            } else {
                match state {
                    Continue(mut sdu) => {
                        let appended =
                            self.append_to_sdu(&mut sdu, pdu, segment.data, segment.cmplt);
                        *result = result.and(appended);
                        if segment.cmplt {
                            Start
                        } else {
                            Continue(sdu)
                        }
                    }
                    Start if !first_pdu && !started => {
                        debug!(
                            "sink {:?}: PDU {}: start of SDU lost",
                            self.handle, pdu.payload_number
                        );
                        let released = self.framed_release_interrupted(pdu, 1, SduStatus::LostData);
                        *result = result.and(released);
                        started = true;
                        ErrorSpooling
                    }
                    Start | ErrorSpooling => {
                        debug!(
                            "sink {:?}: PDU {}: dropping segment of an unknown SDU",
                            self.handle, pdu.payload_number
                        );
                        ErrorSpooling
                    }
                }
            };
        }

        if !started && self.production.pdu_cnt > 0 {
            self.count_pdu();
        }
        state
    }
}
