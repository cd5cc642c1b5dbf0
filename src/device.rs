use core::ops::Add;

use alloc::vec::Vec;

use crate::error::FatError;

/// Something that can read and write whole sectors of the disk backing the
/// filesystem.
///
/// Note: exactly one operation against a mounted volume is assumed to be in
/// flight at a time. The driver performs no locking of its own; serialization
/// is the caller's responsibility.
pub trait BlockDeviceDriver {
    fn sector_size(&self) -> SectorSize;

    /// Read `count` sectors starting at `start`. The returned buffer must be
    /// exactly `count * sector_size` bytes.
    fn read_sectors(&mut self, start: SectorIndex, count: usize) -> Result<Vec<u8>, FatError>;

    fn write_sectors(&mut self, start: SectorIndex, data: &[u8]) -> Result<(), FatError>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SectorSize(u16);

impl SectorSize {
    pub const fn new(value: u16) -> Self {
        Self(value)
    }
}

impl From<u16> for SectorSize {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<SectorSize> for u16 {
    fn from(value: SectorSize) -> Self {
        value.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SectorIndex(u64);

impl SectorIndex {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
}

impl From<u64> for SectorIndex {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<SectorIndex> for u64 {
    fn from(value: SectorIndex) -> Self {
        value.0
    }
}

impl Add for SectorIndex {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

/// Wrapper around a `BlockDeviceDriver` implementation that validates buffer
/// sizes and reports I/O failures.
#[derive(Debug)]
pub(crate) struct BlockDevice<D> {
    driver: D,
}

impl<D: BlockDeviceDriver> BlockDevice<D> {
    pub(crate) fn new(driver: D) -> Self {
        Self { driver }
    }

    pub(crate) fn into_inner(self) -> D {
        self.driver
    }

    pub(crate) fn driver(&self) -> &D {
        &self.driver
    }

    #[cfg(test)]
    pub(crate) fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub(crate) fn sector_size(&self) -> SectorSize {
        self.driver.sector_size()
    }

    pub(crate) fn read(
        &mut self,
        start: SectorIndex,
        count: usize,
    ) -> Result<SectorBuffer, FatError> {
        let data = self.driver.read_sectors(start, count).map_err(|err| {
            log::error!("block device read of sector {} failed: {err}", start.0);
            err
        })?;

        if data.len() != count * usize::from(u16::from(self.driver.sector_size())) {
            log::error!("block device returned a short buffer for sector {}", start.0);
            return Err(FatError::UnknownError);
        }

        Ok(SectorBuffer { start, data })
    }

    pub(crate) fn write_back(&mut self, buffer: &SectorBuffer) -> Result<(), FatError> {
        self.driver
            .write_sectors(buffer.start, &buffer.data)
            .map_err(|err| {
                log::error!(
                    "block device write of sector {} failed: {err}",
                    buffer.start.0
                );
                err
            })
    }
}

/// In-memory buffer for a run of sectors.
///
/// Ownership stands in for the pin/release pairing of a pinned block cache:
/// the buffer is released on every exit path when it drops, and a dirty
/// release is an explicit `BlockDevice::write_back`.
#[derive(Debug)]
pub(crate) struct SectorBuffer {
    start: SectorIndex,
    data: Vec<u8>,
}

impl SectorBuffer {
    pub(crate) fn start(&self) -> SectorIndex {
        self.start
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}
