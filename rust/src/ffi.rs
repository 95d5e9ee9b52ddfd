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

#![allow(clippy::undocumented_unsafe_blocks)]

use std::ptr;
use std::slice;

use num_traits::FromPrimitive;
use tracing::warn;

use crate::isoal::{
    IsoAl, IsoPdu, IsoalError, Llid, PduStatus, Role, SduBuffer, SduFragment, SduInfo, SduSink,
    SinkConfig, SinkHandle,
};
use crate::time::{microseconds, slots};

pub const ISOAL_STATUS_OK: u8 = 0x00;
pub const ISOAL_STATUS_ERR_SINK_ALLOC: u8 = 0x01;
pub const ISOAL_STATUS_ERR_SDU_ALLOC: u8 = 0x04;
pub const ISOAL_STATUS_ERR_SDU_EMIT: u8 = 0x08;
pub const ISOAL_STATUS_ERR_UNSPECIFIED: u8 = 0x80;

fn status_code(result: Result<(), IsoalError>) -> u8 {
    match result {
        Ok(()) => ISOAL_STATUS_OK,
        Err(IsoalError::SinkAlloc) => ISOAL_STATUS_ERR_SINK_ALLOC,
        Err(IsoalError::SduAlloc) => ISOAL_STATUS_ERR_SDU_ALLOC,
        Err(IsoalError::SduEmit) => ISOAL_STATUS_ERR_SDU_EMIT,
        Err(IsoalError::SduWrite | IsoalError::InvalidHandle | IsoalError::Unspecified) => {
            ISOAL_STATUS_ERR_UNSPECIFIED
        }
    }
}

fn check(status: u8, error: IsoalError) -> Result<(), IsoalError> {
    if status == ISOAL_STATUS_OK {
        Ok(())
    } else {
        Err(error)
    }
}

/// Received PDU
#[repr(C)]
pub struct RxPdu {
    pub llid: u8,
    pub status: u8,
    pub payload_number: u64,
    pub timestamp: microseconds,
    pub payload: *const u8,
    pub len: usize,
}

impl From<&IsoPdu<'_>> for RxPdu {
    fn from(pdu: &IsoPdu<'_>) -> Self {
        RxPdu {
            llid: pdu.llid as u8,
            status: pdu.status as u8,
            payload_number: pdu.payload_number,
            timestamp: pdu.timestamp,
            payload: pdu.payload.as_ptr(),
            len: pdu.payload.len(),
        }
    }
}

/// SDU buffer owned by the host
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RxSduBuffer {
    pub handle: *mut (),
    pub size: usize,
}

impl From<&SduBuffer> for RxSduBuffer {
    fn from(buffer: &SduBuffer) -> Self {
        RxSduBuffer { handle: buffer.handle as *mut (), size: buffer.size }
    }
}

#[repr(C)]
pub struct RxSduFragment {
    pub state: u8,
    pub size: usize,
    pub status: u8,
    pub timestamp: microseconds,
    pub sequence_number: u16,
    pub buffer: RxSduBuffer,
}

#[repr(C)]
pub struct RxSduInfo {
    pub total_size: usize,
    pub collated_status: u8,
}

/// SDU buffer callbacks
#[repr(C)]
#[derive(Clone)]
pub struct SinkOps {
    user_pointer: *mut (),
    sdu_alloc: unsafe extern "C" fn(
        user: *mut (),
        sink: u32,
        pdu: *const RxPdu,
        buffer: *mut RxSduBuffer,
    ) -> u8,
    sdu_write: unsafe extern "C" fn(
        user: *mut (),
        buffer: *const RxSduBuffer,
        data: *const u8,
        len: usize,
    ) -> u8,
    sdu_emit: unsafe extern "C" fn(
        user: *mut (),
        sink: u32,
        fragment: *const RxSduFragment,
        sdu: *const RxSduInfo,
    ) -> u8,
}

impl SduSink for SinkOps {
    fn alloc(&mut self, sink: SinkHandle, pdu: &IsoPdu<'_>) -> Result<SduBuffer, IsoalError> {
        let pdu = RxPdu::from(pdu);
        let mut buffer = RxSduBuffer { handle: ptr::null_mut(), size: 0 };
        let status =
            unsafe { (self.sdu_alloc)(self.user_pointer, sink.into_raw(), &pdu, &mut buffer) };
        check(status, IsoalError::SduAlloc)?;
        Ok(SduBuffer { handle: buffer.handle as usize, size: buffer.size })
    }

    fn write(&mut self, buffer: &SduBuffer, data: &[u8]) -> Result<(), IsoalError> {
        let buffer = RxSduBuffer::from(buffer);
        let status =
            unsafe { (self.sdu_write)(self.user_pointer, &buffer, data.as_ptr(), data.len()) };
        check(status, IsoalError::SduWrite)
    }

    fn emit(
        &mut self,
        sink: SinkHandle,
        fragment: &SduFragment,
        sdu: &SduInfo,
    ) -> Result<(), IsoalError> {
        let fragment = RxSduFragment {
            state: fragment.state as u8,
            size: fragment.size,
            status: fragment.status as u8,
            timestamp: fragment.timestamp,
            sequence_number: fragment.sequence_number,
            buffer: RxSduBuffer::from(&fragment.buffer),
        };
        let sdu =
            RxSduInfo { total_size: sdu.total_size, collated_status: sdu.collated_status as u8 };
        let status =
            unsafe { (self.sdu_emit)(self.user_pointer, sink.into_raw(), &fragment, &sdu) };
        check(status, IsoalError::SduEmit)
    }
}

/// Create a new ISO-AL instance with an empty sink pool
#[no_mangle]
pub extern "C" fn isoal_create() -> *mut IsoAl {
    Box::into_raw(Box::default())
}

/// Destroy all sinks of the instance
/// # Arguments
/// * `isoal` - ISO-AL pointer
/// # Safety
/// - `isoal` must be a valid pointer returned by `isoal_create`
#[no_mangle]
pub unsafe extern "C" fn isoal_reset(isoal: *mut IsoAl) -> u8 {
    let isoal = unsafe { &mut *isoal };
    isoal.reset();
    ISOAL_STATUS_OK
}

/// Free an ISO-AL instance and all its sinks
/// # Arguments
/// * `isoal` - ISO-AL pointer
/// # Safety
/// - `isoal` must be a valid pointer returned by `isoal_create`
/// - `isoal` must not be used afterwards
#[no_mangle]
pub unsafe extern "C" fn isoal_destroy(isoal: *mut IsoAl) {
    drop(unsafe { Box::from_raw(isoal) });
}

/// Allocate a sink for an isochronous stream
/// Returns a status code, the sink handle is written to `sink` on success
/// # Arguments
/// * `isoal` - ISO-AL pointer
/// * `handle` - CIS or BIS connection handle
/// * `role` - 0 for central, 1 for peripheral, 2 for broadcast receiver
/// * `iso_interval` - ISO interval in multiples of 1.25ms
/// * `ops` - SDU buffer callbacks
/// * `sink` - Output sink handle
/// # Safety
/// - `isoal` must be a valid pointer returned by `isoal_create`
/// - `sink` must be valid for writes
/// - `ops` callbacks must stay callable until the sink is destroyed
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn isoal_sink_create(
    isoal: *mut IsoAl,
    handle: u16,
    role: u8,
    framed: bool,
    burst_number: u8,
    flush_timeout: u8,
    sdu_interval: microseconds,
    iso_interval: slots,
    stream_sync_delay: microseconds,
    group_sync_delay: microseconds,
    ops: SinkOps,
    sink: *mut u32,
) -> u8 {
    let isoal = unsafe { &mut *isoal };
    let Some(role) = Role::from_u8(role) else {
        warn!("invalid role {} for handle 0x{:x}", role, handle);
        return ISOAL_STATUS_ERR_UNSPECIFIED;
    };
    let config = SinkConfig {
        handle,
        role,
        framed,
        burst_number,
        flush_timeout,
        sdu_interval,
        iso_interval,
        stream_sync_delay,
        group_sync_delay,
    };
    match isoal.sink_create(config, Box::new(ops)) {
        Ok(created) => {
            unsafe { *sink = created.into_raw() };
            ISOAL_STATUS_OK
        }
        Err(err) => status_code(Err(err)),
    }
}

/// Start processing PDUs on a sink
/// # Arguments
/// * `isoal` - ISO-AL pointer
/// * `sink` - sink handle
/// # Safety
/// - `isoal` must be a valid pointer returned by `isoal_create`
#[no_mangle]
pub unsafe extern "C" fn isoal_sink_enable(isoal: *mut IsoAl, sink: u32) -> u8 {
    let isoal = unsafe { &mut *isoal };
    status_code(isoal.sink_enable(SinkHandle::from_raw(sink)))
}

/// Stop processing PDUs on a sink
/// # Arguments
/// * `isoal` - ISO-AL pointer
/// * `sink` - sink handle
/// # Safety
/// - `isoal` must be a valid pointer returned by `isoal_create`
#[no_mangle]
pub unsafe extern "C" fn isoal_sink_disable(isoal: *mut IsoAl, sink: u32) -> u8 {
    let isoal = unsafe { &mut *isoal };
    status_code(isoal.sink_disable(SinkHandle::from_raw(sink)))
}

/// Free a sink
/// # Arguments
/// * `isoal` - ISO-AL pointer
/// * `sink` - sink handle
/// # Safety
/// - `isoal` must be a valid pointer returned by `isoal_create`
#[no_mangle]
pub unsafe extern "C" fn isoal_sink_destroy(isoal: *mut IsoAl, sink: u32) {
    let isoal = unsafe { &mut *isoal };
    isoal.sink_destroy(SinkHandle::from_raw(sink));
}

/// Recombine a received PDU into SDUs
/// Returns a status code
/// # Arguments
/// * `isoal` - ISO-AL pointer
/// * `sink` - sink handle
/// * `pdu` - received PDU
/// # Safety
/// - This should not be called from a sink callback
/// - `isoal` must be a valid pointer returned by `isoal_create`
/// - `pdu` must be a valid pointer
/// - `pdu.payload` must be valid for reads of `pdu.len` bytes
#[no_mangle]
pub unsafe extern "C" fn isoal_rx_pdu_recombine(
    isoal: *mut IsoAl,
    sink: u32,
    pdu: *const RxPdu,
) -> u8 {
    let isoal = unsafe { &mut *isoal };
    let pdu = unsafe { &*pdu };
    let (Some(llid), Some(status)) = (Llid::from_u8(pdu.llid), PduStatus::from_u8(pdu.status))
    else {
        warn!("invalid PDU {} llid {} status {}", pdu.payload_number, pdu.llid, pdu.status);
        return ISOAL_STATUS_ERR_UNSPECIFIED;
    };
    let payload = if pdu.len == 0 {
        &[][..]
    } else {
        unsafe { slice::from_raw_parts(pdu.payload, pdu.len) }
    };
    let pdu = IsoPdu {
        llid,
        payload_number: pdu.payload_number,
        timestamp: pdu.timestamp,
        status,
        payload,
    };
    status_code(isoal.rx_pdu_recombine(SinkHandle::from_raw(sink), &pdu))
}
