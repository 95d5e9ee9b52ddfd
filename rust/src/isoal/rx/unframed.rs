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

//! Unframed recombination. SDUs are aligned on windows of
//! `pdus_per_sdu` consecutive payload numbers and delimited by the LLID of
//! each PDU.

use tracing::{debug, warn};

use super::RecombineState::{self, Continue, ErrorSpooling, Start};
use super::SduInProgress;
use crate::isoal::{IsoPdu, IsoalError, Llid, SduStatus, Sink};
use crate::time::{advance_time, microseconds, wrapped_time};

/// Contribution of one unframed PDU.
#[derive(Debug)]
enum UnframedPdu<'a> {
    /// Received with errors, the payload is not used.
    Errored(SduStatus),
    /// Empty start or continuation fragment.
    Padding,
    Continuation(&'a [u8]),
    /// Complete SDU or end fragment.
    End(&'a [u8]),
}

impl<'a> UnframedPdu<'a> {
    fn classify(pdu: &IsoPdu<'a>) -> Result<Self, IsoalError> {
        if !pdu.is_valid() {
            return Ok(UnframedPdu::Errored(pdu.status.into()));
        }
        match pdu.llid {
            Llid::StartContinue if pdu.is_empty() => Ok(UnframedPdu::Padding),
            Llid::StartContinue => Ok(UnframedPdu::Continuation(pdu.payload)),
            Llid::CompleteEnd => Ok(UnframedPdu::End(pdu.payload)),
            Llid::Framed | Llid::Control => Err(IsoalError::Unspecified),
        }
    }
}

impl Sink {
    /// SDU synchronization reference of the SDU starting with `pdu`.
    fn unframed_timestamp(&self, pdu: &IsoPdu<'_>) -> microseconds {
        let burst_number = self.config.burst_number.max(1) as u64;
        let sdu_index = (pdu.payload_number % burst_number) / self.window();
        advance_time(wrapped_time(pdu.timestamp, self.latency), sdu_index, self.config.sdu_interval)
    }

    pub(crate) fn unframed_consume(&mut self, pdu: &IsoPdu<'_>) -> Result<(), IsoalError> {
        let contribution = match UnframedPdu::classify(pdu) {
            Ok(contribution) => contribution,
            Err(err) => {
                warn!(
                    "sink {:?}: unexpected {:?} PDU {} on unframed stream",
                    self.handle, pdu.llid, pdu.payload_number
                );
                return Err(err);
            }
        };

        let window = self.window();
        let position = pdu.payload_number % window;
        let last_pdu = position == window - 1;
        let mut result = Ok(());
        let mut state = self.take_state();

        match self.production.prev_payload_number {
            Some(prev) if pdu.payload_number <= prev => {
                debug!("sink {:?}: stale PDU {} after {}", self.handle, pdu.payload_number, prev);
                self.production.state = state;
                return Ok(());
            }
            Some(prev) if pdu.payload_number - prev > 1 => {
                debug!("sink {:?}: PDUs {}..{} missing", self.handle, prev + 1, pdu.payload_number);
                if let Continue(mut sdu) = state {
                    sdu.collate(SduStatus::LostData);
                    result = result.and(self.release_sdu(sdu, pdu));
                }
                let skipped = (pdu.payload_number / window).saturating_sub(prev / window + 1);
                if prev / window == pdu.payload_number / window {
                    state = ErrorSpooling;
                } else {
                    result = result.and(self.skip_sdu_intervals(pdu, skipped, SduStatus::LostData));
                    if position != 0 {
                        result = result.and(self.emit_lost_sdu(pdu, SduStatus::LostData));
                        state = ErrorSpooling;
                    } else {
                        state = Start;
                    }
                }
            }
            None if position != 0 => {
                // The start of the current SDU was never received.
                result = result.and(self.emit_lost_sdu(pdu, SduStatus::LostData));
                state = ErrorSpooling;
            }
            _ => (),
        }
        self.production.prev_payload_number = Some(pdu.payload_number);

        self.production.state = match state {
            ErrorSpooling if position != 0 => {
                debug!("sink {:?}: PDU {} dropped", self.handle, pdu.payload_number);
                if last_pdu {
                    Start
                } else {
                    ErrorSpooling
                }
            }
            Start | ErrorSpooling => self.unframed_start(pdu, contribution, last_pdu, &mut result),
            Continue(sdu) => self.unframed_continue(sdu, pdu, contribution, last_pdu, &mut result),
        };
        result
    }

    fn unframed_start(
        &mut self,
        pdu: &IsoPdu<'_>,
        contribution: UnframedPdu<'_>,
        last_pdu: bool,
        result: &mut Result<(), IsoalError>,
    ) -> RecombineState {
        let after_end = if last_pdu { Start } else { ErrorSpooling };
        let timestamp = self.unframed_timestamp(pdu);
        match contribution {
            UnframedPdu::Errored(status) => {
                let sdu = self.begin_sdu(timestamp, status);
                *result = result.and(self.release_sdu(sdu, pdu));
                after_end
            }
            UnframedPdu::Padding => Start,
            UnframedPdu::Continuation(data) => {
                let mut sdu = self.begin_sdu(timestamp, SduStatus::Valid);
                *result = result.and(self.append_to_sdu(&mut sdu, pdu, data, false));
                self.unframed_close_window(sdu, pdu, last_pdu, result)
            }
            UnframedPdu::End(data) => {
                let mut sdu = self.begin_sdu(timestamp, SduStatus::Valid);
                *result = result.and(self.append_to_sdu(&mut sdu, pdu, data, true));
                after_end
            }
        }
    }

    fn unframed_continue(
        &mut self,
        mut sdu: SduInProgress,
        pdu: &IsoPdu<'_>,
        contribution: UnframedPdu<'_>,
        last_pdu: bool,
        result: &mut Result<(), IsoalError>,
    ) -> RecombineState {
        let after_end = if last_pdu { Start } else { ErrorSpooling };
        match contribution {
            UnframedPdu::Errored(status) => {
                sdu.collate(status);
                *result = result.and(self.release_sdu(sdu, pdu));
                after_end
            }
            UnframedPdu::Padding => {
                debug!("sink {:?}: padding PDU {} ends SDU early", self.handle, pdu.payload_number);
                sdu.collate(SduStatus::LostData);
                *result = result.and(self.release_sdu(sdu, pdu));
                Start
            }
            UnframedPdu::Continuation(data) => {
                *result = result.and(self.append_to_sdu(&mut sdu, pdu, data, false));
                self.unframed_close_window(sdu, pdu, last_pdu, result)
            }
            UnframedPdu::End(data) => {
                *result = result.and(self.append_to_sdu(&mut sdu, pdu, data, true));
                after_end
            }
        }
    }

    /// A window whose last PDU is not an end fragment closes its SDU with
    /// errors.
    fn unframed_close_window(
        &mut self,
        mut sdu: SduInProgress,
        pdu: &IsoPdu<'_>,
        last_pdu: bool,
        result: &mut Result<(), IsoalError>,
    ) -> RecombineState {
        if !last_pdu {
            return Continue(sdu);
        }
        debug!("sink {:?}: SDU #{} not terminated", self.handle, sdu.sequence_number);
        sdu.collate(SduStatus::Errors);
        *result = result.and(self.release_sdu(sdu, pdu));
        Start
    }
}
