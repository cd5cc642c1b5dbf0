//! Probing, mounting, and the mounted-volume state.

use crate::boot::{check_boot_signatures, FatType, FreeSpaceHint, Geometry};
use crate::device::{BlockDevice, BlockDeviceDriver, SectorBuffer, SectorIndex};
use crate::error::FatError;
use crate::table::Cluster;

/// Check whether a FAT filesystem is present on the device: sector 0 must
/// carry the 0xAA55 trailer and one of the three type tags. Nothing else is
/// read, and nothing is retried; the enclosing framework is expected to try
/// other filesystem drivers against the same volume on failure.
pub fn probe<D: BlockDeviceDriver>(device: &mut D) -> Result<(), FatError> {
    let sector = device.read_sectors(SectorIndex::new(0), 1)?;
    check_boot_signatures(&sector)
}

/// A mounted FAT volume.
///
/// All state is owned here: the geometry, the FSINFO hint, and two one-slot
/// scratch caches (one FAT sector, one data cluster) keyed by absolute
/// sector. Mounted volumes are independent; there is no global state.
#[derive(Debug)]
pub struct FatVolume<D> {
    pub(crate) device: BlockDevice<D>,
    pub(crate) geometry: Geometry,
    free_space_hint: Option<FreeSpaceHint>,
    fat_cache: Option<SectorBuffer>,
    data_cache: Option<SectorBuffer>,
}

impl<D: BlockDeviceDriver> FatVolume<D> {
    /// Decode sector 0 into the volume geometry, classify the FAT width, and
    /// (on FAT32) load and validate the FSINFO sector.
    pub fn mount(driver: D) -> Result<Self, FatError> {
        let mut device = BlockDevice::new(driver);

        let boot = device.read(SectorIndex::new(0), 1)?;
        let geometry = Geometry::from_boot_sector(boot.data(), device.sector_size())?;

        let free_space_hint = if geometry.fat_type == FatType::Fat32 {
            let fsinfo = device.read(SectorIndex::new(u64::from(geometry.fsinfo_sector)), 1)?;
            Some(FreeSpaceHint::from_fsinfo(fsinfo.data())?)
        } else {
            None
        };

        Ok(Self {
            device,
            geometry,
            free_space_hint,
            fat_cache: None,
            data_cache: None,
        })
    }

    /// Release the volume and hand the device back.
    pub fn unmount(self) -> D {
        self.device.into_inner()
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn free_space_hint(&self) -> Option<FreeSpaceHint> {
        self.free_space_hint
    }

    pub fn device(&self) -> &D {
        self.device.driver()
    }

    /// One sector of a FAT copy, through the one-slot FAT cache.
    pub(crate) fn fat_sector(
        &mut self,
        copy: u8,
        offset: u64,
    ) -> Result<&mut SectorBuffer, FatError> {
        let start = self.geometry.fat_copy_sector(copy, offset);
        let hit = matches!(&self.fat_cache, Some(buffer) if buffer.start() == start);
        if !hit {
            let buffer = self.device.read(start, 1)?;
            self.fat_cache = Some(buffer);
        }
        Ok(self.fat_cache.as_mut().expect("FAT cache just filled"))
    }

    /// Write the cached FAT sector back to the device.
    pub(crate) fn flush_fat_cache(&mut self) -> Result<(), FatError> {
        match &self.fat_cache {
            Some(buffer) => self.device.write_back(buffer),
            None => Ok(()),
        }
    }

    /// One whole data cluster, through the one-slot cluster cache keyed by
    /// the cluster's first absolute sector.
    pub(crate) fn read_cluster(&mut self, cluster: Cluster) -> Result<&[u8], FatError> {
        let start = self.geometry.cluster_to_sector(cluster);
        let count = usize::from(self.geometry.sectors_per_cluster);
        self.data_buffer(start, count)
    }

    /// One sector of the fixed FAT12/16 root directory region. The caller
    /// bounds `index` by `root_sector_count`.
    pub(crate) fn read_root_sector(&mut self, index: u32) -> Result<&[u8], FatError> {
        let start = SectorIndex::new(u64::from(self.geometry.data_area_begin) + u64::from(index));
        self.data_buffer(start, 1)
    }

    fn data_buffer(&mut self, start: SectorIndex, count: usize) -> Result<&[u8], FatError> {
        let hit = matches!(&self.data_cache, Some(buffer) if buffer.start() == start);
        if !hit {
            let buffer = self.device.read(start, count)?;
            self.data_cache = Some(buffer);
        }
        Ok(self
            .data_cache
            .as_ref()
            .expect("data cache just filled")
            .data())
    }

    #[cfg(test)]
    pub(crate) fn device_mut(&mut self) -> &mut D {
        self.device.driver_mut()
    }

    #[cfg(test)]
    pub(crate) fn invalidate_caches(&mut self) {
        self.fat_cache = None;
        self.data_cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::{fat12_volume, fat32_volume, reference_fat12_disk, RamDisk};

    #[test]
    fn probe_accepts_a_fat_volume() {
        let mut disk = reference_fat12_disk();
        assert_eq!(probe(&mut disk), Ok(()));
    }

    #[test]
    fn probe_failure_reads_nothing_further() {
        let mut disk = reference_fat12_disk();
        disk.corrupt_byte(510);

        assert_eq!(probe(&mut disk), Err(FatError::InvalidSignature));
        // Exactly one read: sector 0. No FSINFO or geometry follow-up.
        assert_eq!(disk.reads(), &[0]);
    }

    #[test]
    fn mount_derives_geometry_and_binds_width() {
        let volume = fat12_volume();
        let geometry = volume.geometry();

        assert_eq!(geometry.fat_type, FatType::Fat12);
        assert_eq!(
            geometry.data_area_begin,
            u32::from(geometry.reserved_sectors) + 2 * geometry.fat_size
        );
        assert!(volume.free_space_hint().is_none());
    }

    #[test]
    fn mount_fat32_loads_fsinfo() {
        let volume = fat32_volume();

        assert_eq!(volume.geometry().fat_type, FatType::Fat32);
        assert_eq!(volume.geometry().root_sector_count, 0);
        assert_eq!(volume.geometry().root_cluster, Cluster(2));

        let hint = volume.free_space_hint().expect("FAT32 mounts carry a hint");
        assert_eq!(hint.free_clusters, crate::testing::TEST_FREE_CLUSTERS);
    }

    #[test]
    fn mount_rejects_a_corrupt_fsinfo() {
        let mut disk = crate::testing::fat32_disk();
        disk.corrupt_byte(512); // FSINFO lead signature lives in sector 1
        assert!(matches!(
            FatVolume::mount(disk),
            Err(FatError::InvalidSignature)
        ));
    }

    #[test]
    fn unmount_returns_the_device() {
        let volume = fat12_volume();
        let disk: RamDisk = volume.unmount();
        assert!(!disk.reads().is_empty());
    }
}
