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


pub use context::*;
pub(crate) use sequence::{sequence, sequence_body};

use std::rc::Rc;

use bytes::BufMut;

use crate::isoal::segment::SEG_TIMEOFFSET_SIZE;
use crate::isoal::{IsoAl, Role, SinkConfig, SinkHandle};
use crate::time::{microseconds, slots};

/// Sink parameters with zero sync delays and connection handle 0x60.
pub fn sink_config(
    role: Role,
    framed: bool,
    burst_number: u8,
    flush_timeout: u8,
    sdu_interval: microseconds,
    iso_interval: slots,
) -> SinkConfig {
    SinkConfig {
        handle: 0x60,
        role,
        framed,
        burst_number,
        flush_timeout,
        sdu_interval,
        iso_interval,
        stream_sync_delay: 0,
        group_sync_delay: 0,
    }
}

/// Pool with one enabled sink recording into a fresh context.
pub fn setup(config: SinkConfig, buffer_size: usize) -> (IsoAl, SinkHandle, Rc<TestContext>) {
    let context = Rc::new(TestContext::new().with_buffer_size(buffer_size));
    let mut isoal = IsoAl::new();
    let sink = isoal.sink_create(config, Box::new(context.clone())).unwrap();
    isoal.sink_enable(sink).unwrap();
    (isoal, sink, context)
}

/// Encode the first segment of an SDU, carrying a time offset.
pub fn start_segment(cmplt: bool, time_offset: u32, data: &[u8]) -> Vec<u8> {
    let mut segment = Vec::new();
    segment.put_u8(if cmplt { 0x02 } else { 0x00 });
    segment.put_u8((data.len() + SEG_TIMEOFFSET_SIZE) as u8);
    segment.put_uint_le(time_offset as u64, SEG_TIMEOFFSET_SIZE);
    segment.put_slice(data);
    segment
}

/// Encode a segment continuing an SDU.
pub fn continuation_segment(cmplt: bool, data: &[u8]) -> Vec<u8> {
    let mut segment = Vec::new();
    segment.put_u8(if cmplt { 0x03 } else { 0x01 });
    segment.put_u8(data.len() as u8);
    segment.put_slice(data);
    segment
}

/// Payload bytes 0, 1, 2, .. of the given length.
pub fn test_data(len: usize) -> Vec<u8> {
    (0..len).map(|byte| byte as u8).collect()
}
