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

//! Receive side of the ISO Adaptation Layer.
//!
//! BT Core V5.3 : Vol 6 Low Energy Controller : Part G IS0-AL
//!
//! PDUs received on an isochronous stream are fed to a sink with
//! [`IsoAl::rx_pdu_recombine`]. The sink reassembles SDUs from unframed or
//! framed PDUs and hands the fragments to the [`SduSink`] capability it
//! was created with.

use thiserror::Error;
use tracing::debug;

mod pdu;
mod rx;
pub mod segment;
mod sink;
mod status;

#[cfg(test)]
pub(crate) mod test;

pub use pdu::{IsoPdu, Llid};
pub use sink::{
    Role, Sink, SduBuffer, SduFragment, SduFragmentState, SduInfo, SduSink, SinkConfig,
};
pub use status::{PduStatus, SduStatus};

/// Number of sinks in the default pool.
pub const DEFAULT_SINK_COUNT: usize = 4;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsoalError {
    #[error("No free sink")]
    SinkAlloc,
    #[error("Unknown or destroyed sink")]
    InvalidHandle,
    #[error("SDU buffer allocation failed")]
    SduAlloc,
    #[error("SDU write failed")]
    SduWrite,
    #[error("SDU emission failed")]
    SduEmit,
    #[error("Unspecified error")]
    Unspecified,
}

/// Opaque reference to a sink of an [`IsoAl`] pool. The generation
/// counter invalidates handles to destroyed sinks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SinkHandle {
    index: u8,
    generation: u16,
}

impl SinkHandle {
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn into_raw(self) -> u32 {
        (self.generation as u32) << 8 | self.index as u32
    }

    pub fn from_raw(raw: u32) -> SinkHandle {
        SinkHandle { index: raw as u8, generation: (raw >> 8) as u16 }
    }
}

#[derive(Default)]
struct Slot {
    generation: u16,
    sink: Option<Sink>,
}

/// Fixed-size pool of sinks.
pub struct IsoAl<const SINKS: usize = DEFAULT_SINK_COUNT> {
    /// Bit `i` is set when slot `i` is taken.
    allocated: u64,
    slots: [Slot; SINKS],
}

impl<const SINKS: usize> Default for IsoAl<SINKS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SINKS: usize> IsoAl<SINKS> {
    const POOL_FITS_BITMAP: () = assert!(SINKS <= u64::BITS as usize);

    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::POOL_FITS_BITMAP;
        IsoAl { allocated: 0, slots: std::array::from_fn(|_| Slot::default()) }
    }

    /// Destroy all sinks. Outstanding handles become invalid.
    pub fn reset(&mut self) {
        for index in 0..SINKS {
            self.release(index);
        }
    }

    fn release(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        if slot.sink.take().is_some() {
            slot.generation = slot.generation.wrapping_add(1);
        }
        self.allocated &= !(1 << index);
    }

    /// Allocate a sink from the pool for a new isochronous stream. The
    /// sink starts disabled.
    pub fn sink_create(
        &mut self,
        config: SinkConfig,
        ops: Box<dyn SduSink>,
    ) -> Result<SinkHandle, IsoalError> {
        let index = (!self.allocated).trailing_zeros() as usize;
        if index >= SINKS {
            debug!("no free sink for handle 0x{:x}", config.handle);
            return Err(IsoalError::SinkAlloc);
        }

        let slot = &mut self.slots[index];
        let handle = SinkHandle { index: index as u8, generation: slot.generation };
        slot.sink = Some(Sink::new(handle, config, ops));
        self.allocated |= 1 << index;
        Ok(handle)
    }

    pub fn sink(&self, handle: SinkHandle) -> Result<&Sink, IsoalError> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.sink.as_ref())
            .ok_or(IsoalError::InvalidHandle)
    }

    pub fn sink_mut(&mut self, handle: SinkHandle) -> Result<&mut Sink, IsoalError> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.sink.as_mut())
            .ok_or(IsoalError::InvalidHandle)
    }

    /// Iterate over the allocated sinks. Each sink owns disjoint state, so
    /// they may be driven independently.
    pub fn sinks_mut(&mut self) -> impl Iterator<Item = &mut Sink> {
        self.slots.iter_mut().filter_map(|slot| slot.sink.as_mut())
    }

    pub fn sink_enable(&mut self, handle: SinkHandle) -> Result<(), IsoalError> {
        self.sink_mut(handle)?.enable();
        Ok(())
    }

    pub fn sink_disable(&mut self, handle: SinkHandle) -> Result<(), IsoalError> {
        self.sink_mut(handle)?.disable();
        Ok(())
    }

    /// Disable and free a sink. Destroying an already destroyed sink has
    /// no effect.
    pub fn sink_destroy(&mut self, handle: SinkHandle) {
        if self.sink(handle).is_ok() {
            debug!("destroying sink {:?}", handle);
            self.release(handle.index());
        }
    }

    /// Recombine a PDU received on the stream of `handle` into SDUs.
    pub fn rx_pdu_recombine(
        &mut self,
        handle: SinkHandle,
        pdu: &IsoPdu<'_>,
    ) -> Result<(), IsoalError> {
        self.sink_mut(handle)?.recombine(pdu)
    }
}
