//! Directory and file sessions: the cursor state machines driving
//! open/read/seek/tell and directory iteration.

use alloc::string::String;

use crate::boot::FatType;
use crate::device::BlockDeviceDriver;
use crate::directory::{
    decode_record, Attributes, DirectoryRecord, LongNameBuffer, ShortDirectoryEntry,
    DIRECTORY_RECORD_SIZE,
};
use crate::error::FatError;
use crate::table::Cluster;
use crate::volume::FatVolume;

/// Cursor over one directory. Obtained from `open_root_directory` or
/// `open_directory`; closing is dropping.
#[derive(Debug, Clone)]
pub struct DirectoryHandle {
    /// `Cluster::NONE` for the fixed FAT12/16 root, which has no chain.
    head_cluster: Cluster,
    current_cluster: Cluster,
    /// Entry index within the current cluster, or the global index for the
    /// fixed root region.
    entry_index: u32,
    is_root: bool,
    /// The last 8.3 entry surfaced by iteration; `open` captures it.
    last_entry: Option<ShortDirectoryEntry>,
}

impl DirectoryHandle {
    /// Reset the cursor to the first entry.
    pub fn rewind(&mut self) {
        self.current_cluster = self.head_cluster;
        self.entry_index = 0;
        self.last_entry = None;
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    fn is_fixed_root(&self, fat_type: FatType) -> bool {
        fat_type != FatType::Fat32 && self.head_cluster.is_none()
    }
}

/// Cursor over one regular file. Closing is dropping.
#[derive(Debug, Clone)]
pub struct FileHandle {
    entry: ShortDirectoryEntry,
    head_cluster: Cluster,
    current_cluster: Cluster,
    cursor: u32,
}

impl FileHandle {
    pub fn size(&self) -> u32 {
        self.entry.file_size()
    }

    /// Current byte offset of the cursor.
    pub fn tell(&self) -> u32 {
        self.cursor
    }

    pub fn entry(&self) -> &ShortDirectoryEntry {
        &self.entry
    }
}

/// One logical entry surfaced by directory iteration: the display name
/// (long name when fragments were present, 8.3 otherwise) plus the decoded
/// 8.3 record behind it.
#[derive(Debug, Clone)]
pub struct DirectoryEntryInfo {
    pub name: String,
    pub size: u32,
    pub attributes: Attributes,
    pub entry: ShortDirectoryEntry,
}

impl DirectoryEntryInfo {
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }
}

/// Reference point for `seek`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SeekOrigin {
    Start,
    Current,
    End,
}

impl<D: BlockDeviceDriver> FatVolume<D> {
    /// Open the root directory. On FAT12/16 the root is a fixed sector range
    /// with no cluster chain; on FAT32 it is an ordinary chain.
    pub fn open_root_directory(&self) -> DirectoryHandle {
        let head = if self.geometry.fat_type == FatType::Fat32 {
            self.geometry.root_cluster
        } else {
            Cluster::NONE
        };

        DirectoryHandle {
            head_cluster: head,
            current_cluster: head,
            entry_index: 0,
            is_root: true,
            last_entry: None,
        }
    }

    /// Surface the next logical entry, reassembling long names and skipping
    /// tombstones and the volume label. Ends with `EndOfList`.
    pub fn iter_directory(
        &mut self,
        dir: &mut DirectoryHandle,
    ) -> Result<DirectoryEntryInfo, FatError> {
        let fixed_root = dir.is_fixed_root(self.geometry.fat_type);
        let block_size = if fixed_root {
            u32::from(self.geometry.sector_size)
        } else {
            self.geometry.cluster_size
        };
        let entries_per_block = block_size / DIRECTORY_RECORD_SIZE as u32;

        let mut long_name = LongNameBuffer::new();

        loop {
            let block: &[u8] = if fixed_root {
                let sector = dir.entry_index / entries_per_block;
                if sector >= u32::from(self.geometry.root_sector_count) {
                    return Err(FatError::EndOfList);
                }
                self.read_root_sector(sector)?
            } else {
                if dir.entry_index >= entries_per_block {
                    dir.current_cluster = self.next_cluster(dir.current_cluster, 1)?;
                    dir.entry_index = 0;
                }
                self.read_cluster(dir.current_cluster)?
            };

            loop {
                let slot = (dir.entry_index % entries_per_block) as usize;
                let record = decode_record(&block[slot * DIRECTORY_RECORD_SIZE..])?;

                match record {
                    DirectoryRecord::EndOfDirectory => return Err(FatError::EndOfList),
                    DirectoryRecord::Deleted => {}
                    DirectoryRecord::LongFragment(fragment) => long_name.push_fragment(&fragment),
                    DirectoryRecord::VolumeLabel(_) => long_name.clear(),
                    DirectoryRecord::Short(entry) => {
                        let name = if long_name.has_fragments() {
                            long_name.to_string()
                        } else {
                            entry.file_name()
                        };
                        dir.last_entry = Some(entry);
                        dir.entry_index += 1;
                        return Ok(DirectoryEntryInfo {
                            name,
                            size: entry.file_size(),
                            attributes: entry.attributes,
                            entry,
                        });
                    }
                }

                dir.entry_index += 1;
                if dir.entry_index % entries_per_block == 0 {
                    break;
                }
            }
        }
    }

    /// Rewind, then iterate until an entry's logical name matches `name`
    /// (ASCII case-insensitive). `NotFound` at the end of the directory.
    pub fn find_entry(
        &mut self,
        dir: &mut DirectoryHandle,
        name: &str,
    ) -> Result<DirectoryEntryInfo, FatError> {
        dir.rewind();
        loop {
            match self.iter_directory(dir) {
                Ok(info) => {
                    if info.name.eq_ignore_ascii_case(name) {
                        return Ok(info);
                    }
                }
                Err(FatError::EndOfList) => return Err(FatError::NotFound),
                Err(err) => return Err(err),
            }
        }
    }

    /// Open the named regular file in `dir`.
    pub fn open(
        &mut self,
        dir: &mut DirectoryHandle,
        name: &str,
    ) -> Result<FileHandle, FatError> {
        let info = self.find_entry(dir, name)?;
        if info.is_directory() {
            return Err(FatError::WrongElementType);
        }

        // The match leaves the raw 8.3 record in the directory cursor.
        let entry = dir.last_entry.unwrap_or(info.entry);
        let head = entry.first_cluster();
        Ok(FileHandle {
            entry,
            head_cluster: head,
            current_cluster: head,
            cursor: 0,
        })
    }

    /// Open the named subdirectory of `dir`. "." and ".." on the root, and
    /// any entry whose cluster is zero, resolve back to the root regardless
    /// of representation.
    pub fn open_directory(
        &mut self,
        dir: &mut DirectoryHandle,
        name: &str,
    ) -> Result<DirectoryHandle, FatError> {
        if dir.is_root && (name == "." || name == "..") {
            return Ok(self.open_root_directory());
        }

        let info = self.find_entry(dir, name)?;
        if !info.is_directory() {
            return Err(FatError::WrongElementType);
        }

        let head = dir.last_entry.unwrap_or(info.entry).first_cluster();
        if head.is_none() {
            return Ok(self.open_root_directory());
        }

        Ok(DirectoryHandle {
            head_cluster: head,
            current_cluster: head,
            entry_index: 0,
            is_root: false,
            last_entry: None,
        })
    }

    /// Read up to `buf.len()` bytes at the cursor, bounded by the file size.
    /// Returns the number of bytes copied; `EndOfFile` only when the cursor
    /// already sits at the file size when called.
    pub fn read(&mut self, file: &mut FileHandle, buf: &mut [u8]) -> Result<usize, FatError> {
        let size = file.entry.file_size();
        if file.cursor >= size {
            return Err(FatError::EndOfFile);
        }

        let cluster_size = self.geometry.cluster_size;
        let mut remaining = buf.len().min((size - file.cursor) as usize);
        let mut copied = 0_usize;

        while remaining > 0 {
            let cluster_offset = (file.cursor % cluster_size) as usize;
            let chunk = remaining.min(cluster_size as usize - cluster_offset);

            let data = self.read_cluster(file.current_cluster)?;
            buf[copied..copied + chunk].copy_from_slice(&data[cluster_offset..cluster_offset + chunk]);

            remaining -= chunk;
            copied += chunk;
            file.cursor += chunk as u32;

            if cluster_offset + chunk < cluster_size as usize {
                continue;
            }
            match self.next_cluster(file.current_cluster, 1) {
                Ok(next) => file.current_cluster = next,
                Err(FatError::EndOfList) => break,
                Err(err) => return Err(err),
            }
        }

        Ok(copied)
    }

    /// Move the cursor. The target is clamped into `[0, file_size]`; a
    /// negative target is `InvalidValue`. The chain is re-walked from the
    /// head, so seeking costs O(target / cluster_size).
    pub fn seek(
        &mut self,
        file: &mut FileHandle,
        offset: i64,
        origin: SeekOrigin,
    ) -> Result<u32, FatError> {
        let size = file.entry.file_size();
        let target = match origin {
            SeekOrigin::Start => offset,
            SeekOrigin::Current => i64::from(file.cursor) + offset,
            SeekOrigin::End => i64::from(size) + offset,
        };
        if target < 0 {
            return Err(FatError::InvalidValue);
        }
        let target = (target as u64).min(u64::from(size)) as u32;

        let steps = target / self.geometry.cluster_size;
        let current = match self.next_cluster(file.head_cluster, steps) {
            Ok(cluster) => cluster,
            // Seeking to the exact end of a cluster-aligned file walks one
            // link past the tail; the cursor parks at end-of-file and read()
            // never dereferences the cluster.
            Err(FatError::EndOfList) if target == size => Cluster::END,
            Err(err) => return Err(err),
        };

        file.current_cluster = current;
        file.cursor = target;
        Ok(target)
    }
}
