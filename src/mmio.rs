//! Memory-mapped register blocks for the BCM2711 peripherals.
//!
//! Each peripheral block is a 4 KiB window of 32-bit registers. With the
//! `hardware` feature the window is mapped from `/dev/gpiomem` or `/dev/mem`;
//! without it the block is a process-local model so the full API stays
//! exercisable off-target.

#[cfg(feature = "hardware")]
use crate::error::Error;
use crate::error::Result;
use static_assertions::const_assert_eq;
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "hardware")]
use memmap2::{MmapMut, MmapOptions};
#[cfg(feature = "hardware")]
use std::fs::OpenOptions;
#[cfg(feature = "hardware")]
use std::os::unix::fs::OpenOptionsExt;
#[cfg(feature = "hardware")]
use tracing::debug;

/// Physical base of the BCM2711 peripheral window (Raspberry Pi 4B).
pub const PERIPHERAL_BASE: u64 = 0xFE00_0000;
/// PWM peripheral offset within the peripheral window.
pub const PWM_OFFSET: u64 = 0x20_C000;
/// Clock manager offset within the peripheral window.
pub const CLK_OFFSET: u64 = 0x10_1000;

/// Size of one mapped register block in bytes.
pub const BLOCK_SIZE: usize = 4 * 1024;
/// Number of 32-bit registers per block.
pub const BLOCK_WORDS: usize = BLOCK_SIZE / 4;

const_assert_eq!(BLOCK_WORDS * 4, BLOCK_SIZE);

/// GPIO register device (no root required, maps the GPIO block at offset 0).
pub const GPIO_DEVICE: &str = "/dev/gpiomem";
/// Raw physical memory device (root only; needed for PWM and clock blocks).
pub const MEM_DEVICE: &str = "/dev/mem";

enum Backing {
    /// Registers mapped from a physical address window.
    #[cfg(feature = "hardware")]
    Device {
        ptr: *mut u32,
        _map: MmapMut,
    },
    /// Process-local register model.
    #[allow(dead_code)] // only built by tests when `hardware` is on
    Host(Box<[AtomicU32]>),
}

/// One mapped (or modeled) block of 32-bit peripheral registers.
///
/// Register indices are in 32-bit words from the block base. An out-of-range
/// index is a programming error in this crate and panics; callers are
/// internal components with compile-time register constants.
pub struct MmioBlock {
    backing: Backing,
}

// SAFETY: the device pointer targets an OS-held mapping that lives as long as
// the owned MmapMut; volatile word access is how the hardware expects to be
// driven from any thread. The host backing is atomics.
unsafe impl Send for MmioBlock {}
unsafe impl Sync for MmioBlock {}

impl MmioBlock {
    /// Map a register block from `device` at the given physical offset.
    ///
    /// Fails with [`Error::PermissionDenied`] when the device refuses access
    /// and [`Error::DeviceUnavailable`] when it cannot be opened or mapped.
    #[cfg(feature = "hardware")]
    pub fn open(device: &'static str, phys_offset: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(device)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => Error::PermissionDenied { what: device },
                _ => Error::DeviceUnavailable {
                    device,
                    reason: e.to_string(),
                },
            })?;

        let mut map = unsafe {
            MmapOptions::new()
                .offset(phys_offset)
                .len(BLOCK_SIZE)
                .map_mut(&file)
        }
        .map_err(|e| Error::DeviceUnavailable {
            device,
            reason: e.to_string(),
        })?;

        let ptr = map.as_mut_ptr() as *mut u32;
        debug!(device, phys_offset, "mapped register block");

        Ok(Self {
            backing: Backing::Device { ptr, _map: map },
        })
    }

    /// Off-target stand-in for [`MmioBlock::open`]: a zeroed host block.
    #[cfg(not(feature = "hardware"))]
    pub fn open(_device: &'static str, _phys_offset: u64) -> Result<Self> {
        Ok(Self::host())
    }

    /// Create a zeroed process-local block.
    #[allow(dead_code)]
    pub(crate) fn host() -> Self {
        let words = (0..BLOCK_WORDS).map(|_| AtomicU32::new(0)).collect();
        Self {
            backing: Backing::Host(words),
        }
    }

    /// Read the 32-bit register at word index `idx`.
    #[inline]
    pub fn read(&self, idx: usize) -> u32 {
        assert!(idx < BLOCK_WORDS, "register index {idx} out of block");
        match &self.backing {
            #[cfg(feature = "hardware")]
            Backing::Device { ptr, .. } => unsafe { ptr.add(idx).read_volatile() },
            Backing::Host(words) => words[idx].load(Ordering::Acquire),
        }
    }

    /// Write the 32-bit register at word index `idx`.
    #[inline]
    pub fn write(&self, idx: usize, val: u32) {
        assert!(idx < BLOCK_WORDS, "register index {idx} out of block");
        match &self.backing {
            #[cfg(feature = "hardware")]
            Backing::Device { ptr, .. } => unsafe { ptr.add(idx).write_volatile(val) },
            Backing::Host(words) => words[idx].store(val, Ordering::Release),
        }
    }

    /// Masked read-modify-write: bits under `mask` become `bits`, the rest
    /// are preserved. Concurrent writers to the same word must be serialized
    /// by the caller (one component owns each configuration word).
    #[inline]
    pub fn modify(&self, idx: usize, mask: u32, bits: u32) {
        assert!(idx < BLOCK_WORDS, "register index {idx} out of block");
        match &self.backing {
            #[cfg(feature = "hardware")]
            Backing::Device { ptr, .. } => unsafe {
                let reg = ptr.add(idx);
                let val = reg.read_volatile();
                reg.write_volatile((val & !mask) | (bits & mask));
            },
            Backing::Host(words) => {
                let _ = words[idx]
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |val| {
                        Some((val & !mask) | (bits & mask))
                    });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_block_starts_zeroed() {
        let block = MmioBlock::host();
        assert_eq!(block.read(0), 0);
        assert_eq!(block.read(BLOCK_WORDS - 1), 0);
    }

    #[test]
    fn write_then_read_round_trips() {
        let block = MmioBlock::host();
        block.write(7, 0xDEAD_BEEF);
        assert_eq!(block.read(7), 0xDEAD_BEEF);
    }

    #[test]
    fn modify_touches_only_masked_bits() {
        let block = MmioBlock::host();
        block.write(3, 0xFFFF_0000);
        block.modify(3, 0x0000_00FF, 0x0000_00AB);
        assert_eq!(block.read(3), 0xFFFF_00AB);

        // Clearing bits through the mask leaves the rest intact.
        block.modify(3, 0xFF00_0000, 0);
        assert_eq!(block.read(3), 0x00FF_00AB);
    }

    #[test]
    #[should_panic(expected = "out of block")]
    fn out_of_range_index_panics() {
        let block = MmioBlock::host();
        block.read(BLOCK_WORDS);
    }
}
