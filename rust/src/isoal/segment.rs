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

//! Segmentation header of framed ISO PDUs.
//!
//! BT Core V5.3 : Vol 6 Low Energy Controller : Part G IS0-AL:
//! 6.1 Segmentation header
//!
//! ```text
//!  0      1      2        8              16                  40
//!  +------+------+--------+---------------+-------------------+
//!  | SC   | CMPLT| RFU    | Length        | Time_Offset (SC=0)|
//!  +------+------+--------+---------------+-------------------+
//! ```
//!
//! Length counts the bytes following the header, including the
//! Time_Offset field when present.

use bytes::Buf;
use thiserror::Error;

pub const SEG_HDR_SIZE: usize = 2;
pub const SEG_TIMEOFFSET_SIZE: usize = 3;

const SEG_HDR_SC: u8 = 0x01;
const SEG_HDR_CMPLT: u8 = 0x02;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentError {
    #[error("truncated segment header ({remaining} bytes left)")]
    TruncatedHeader { remaining: usize },
    #[error("segment length {length} exceeds the {remaining} bytes left in the PDU")]
    LengthOverrun { length: usize, remaining: usize },
    #[error("start segment of length {length} cannot hold a time offset")]
    MissingTimeOffset { length: usize },
}

/// One segment of a framed PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Set when the segment continues an SDU started in a previous segment.
    pub sc: bool,
    /// Set when the segment completes its SDU.
    pub cmplt: bool,
    /// Present on the first segment of an SDU only.
    pub time_offset: Option<u32>,
    /// SDU bytes carried by the segment.
    pub data: &'a [u8],
}

impl<'a> Segment<'a> {
    /// Parse a segment from the start of `buf`, advancing it past the segment.
    pub fn parse(buf: &mut &'a [u8]) -> Result<Self, SegmentError> {
        let remaining = buf.remaining();
        if remaining < SEG_HDR_SIZE {
            return Err(SegmentError::TruncatedHeader { remaining });
        }

        let flags = buf.get_u8();
        let length = buf.get_u8() as usize;
        if buf.remaining() < length {
            return Err(SegmentError::LengthOverrun { length, remaining: buf.remaining() });
        }

        let whole: &'a [u8] = *buf;
        let (mut body, rest) = whole.split_at(length);
        *buf = rest;

        let sc = (flags & SEG_HDR_SC) != 0;
        let cmplt = (flags & SEG_HDR_CMPLT) != 0;
        let time_offset = if sc {
            None
        } else if body.remaining() < SEG_TIMEOFFSET_SIZE {
            return Err(SegmentError::MissingTimeOffset { length });
        } else {
            Some(body.get_uint_le(SEG_TIMEOFFSET_SIZE) as u32)
        };

        Ok(Segment { sc, cmplt, time_offset, data: body })
    }

    pub fn is_start(&self) -> bool {
        !self.sc
    }
}

/// Iterator over the segments of a framed PDU payload. Parsing stops after
/// the first malformed header.
pub struct Segments<'a> {
    buf: &'a [u8],
}

impl<'a> Segments<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Segments { buf: payload }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Result<Segment<'a>, SegmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.buf.has_remaining() {
            return None;
        }
        let segment = Segment::parse(&mut self.buf);
        if segment.is_err() {
            self.buf = &[];
        }
        Some(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isoal::test::{continuation_segment, start_segment};

    #[test]
    fn test_parse_start_segment() {
        let payload = start_segment(true, 0x0a0b0c, &[1, 2, 3, 4]);
        assert_eq!(payload[..SEG_HDR_SIZE], [SEG_HDR_CMPLT, 7]);

        let mut segments = Segments::new(&payload);
        assert_eq!(
            segments.next(),
            Some(Ok(Segment {
                sc: false,
                cmplt: true,
                time_offset: Some(0x0a0b0c),
                data: &[1, 2, 3, 4]
            }))
        );
        assert_eq!(segments.next(), None);
    }

    #[test]
    fn test_parse_multiple_segments() {
        let payload =
            [continuation_segment(true, &[9, 9]), start_segment(false, 100, &[1, 2, 3])].concat();
        let segments: Vec<_> = Segments::new(&payload).collect();

        assert_eq!(segments.len(), 2);
        let first = segments[0].unwrap();
        assert!(first.sc && first.cmplt);
        assert_eq!(first.time_offset, None);
        assert_eq!(first.data, &[9, 9]);
        let second = segments[1].unwrap();
        assert!(second.is_start() && !second.cmplt);
        assert_eq!(second.time_offset, Some(100));
        assert_eq!(second.data, &[1, 2, 3]);
    }

    #[test]
    fn test_empty_start_segment() {
        let payload = start_segment(true, 0, &[]);
        let segment = Segments::new(&payload).next().unwrap().unwrap();
        assert!(segment.data.is_empty());
    }

    #[test]
    fn test_length_overrun() {
        let mut payload = start_segment(true, 0, &[1, 2, 3]);
        payload[1] = 20;
        let mut segments = Segments::new(&payload);
        assert_eq!(
            segments.next(),
            Some(Err(SegmentError::LengthOverrun { length: 20, remaining: 6 }))
        );
        assert_eq!(segments.next(), None);
    }

    #[test]
    fn test_truncated_header() {
        let payload = [continuation_segment(false, &[1]), vec![SEG_HDR_CMPLT]].concat();
        let mut segments = Segments::new(&payload);
        assert!(segments.next().unwrap().is_ok());
        assert_eq!(segments.next(), Some(Err(SegmentError::TruncatedHeader { remaining: 1 })));
        assert_eq!(segments.next(), None);
    }

    #[test]
    fn test_missing_time_offset() {
        let payload = [SEG_HDR_CMPLT, 2, 0xaa, 0xbb];
        assert_eq!(
            Segments::new(&payload).next(),
            Some(Err(SegmentError::MissingTimeOffset { length: 2 }))
        );
    }
}
