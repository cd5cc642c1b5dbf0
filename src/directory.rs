//! Directory-record decode: 8.3 entries, long-name fragments, tombstones,
//! volume labels, and the end-of-directory marker.
//!
//! A physical record is 32 bytes. Long names are stored as a run of
//! fragments preceding their 8.3 entry; each fragment carries its own
//! position in the name, so reassembly is index-addressed and works in any
//! arrival order.

use alloc::string::String;

use bitflags::bitflags;
use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, Unaligned};

use crate::error::FatError;
use crate::table::Cluster;

type U16Le = U16<LittleEndian>;
type U32Le = U32<LittleEndian>;

/// Size of one physical directory record.
pub const DIRECTORY_RECORD_SIZE: usize = 32;

/// First-name-byte marker for a tombstoned record.
const DELETED_MARKER: u8 = 0xE5;

/// Bit 0x40 of a fragment's sequence byte flags the end of the name.
const LAST_FRAGMENT_FLAG: u8 = 0x40;

/// UCS-2 units carried by one long-name fragment.
const UNITS_PER_FRAGMENT: usize = 13;

/// A long name spans at most 20 fragments (255 units).
const MAX_FRAGMENTS: usize = 20;

/// Substitute emitted for units that cannot be transliterated.
const SUBSTITUTE: char = '?';

/// Attribute bitmap of a directory record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromBytes, AsBytes, Unaligned)]
#[repr(transparent)]
pub struct Attributes(u8);

bitflags! {
    impl Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;

        /// All four low bits at once mark a long-name fragment.
        const LONG_NAME = 0x0F;
    }
}

// Vendor case-folding bits: each half of the 8.3 name is independently
// stored uppercase but displayed lowercase.
const LOWERCASE_NAME: u8 = 0x08;
const LOWERCASE_EXTENSION: u8 = 0x10;

/// Packed time of day: bits 0-4 second/2, 5-10 minute, 11-15 hour.
#[derive(Debug, Copy, Clone, FromBytes, AsBytes, Unaligned)]
#[repr(transparent)]
pub struct PackedTime(U16Le);

impl PackedTime {
    pub fn hour(self) -> u8 {
        (self.0.get() >> 11) as u8
    }

    pub fn minute(self) -> u8 {
        ((self.0.get() >> 5) & 0x3F) as u8
    }

    pub fn second(self) -> u8 {
        ((self.0.get() & 0x1F) * 2) as u8
    }
}

/// Packed date: bits 0-4 day, 5-8 month, 9-15 year since 1980.
#[derive(Debug, Copy, Clone, FromBytes, AsBytes, Unaligned)]
#[repr(transparent)]
pub struct PackedDate(U16Le);

impl PackedDate {
    pub fn year(self) -> u16 {
        (self.0.get() >> 9) + 1980
    }

    pub fn month(self) -> u8 {
        ((self.0.get() >> 5) & 0x0F) as u8
    }

    pub fn day(self) -> u8 {
        (self.0.get() & 0x1F) as u8
    }
}

/// One 8.3 directory entry as stored on disk.
#[derive(Debug, Copy, Clone, FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct ShortDirectoryEntry {
    pub name: [u8; 8],
    pub extension: [u8; 3],
    pub attributes: Attributes,
    pub case_flags: u8,
    pub created_tenths: u8,
    pub created_time: PackedTime,
    pub created_date: PackedDate,
    pub accessed_date: PackedDate,
    pub cluster_high: U16Le,
    pub modified_time: PackedTime,
    pub modified_date: PackedDate,
    pub cluster_low: U16Le,
    pub size: U32Le,
}

impl ShortDirectoryEntry {
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(Attributes::DIRECTORY)
    }

    /// Head of the entry's cluster chain, split across two 16-bit halves on
    /// disk. Cluster 0 points back at the root directory.
    pub fn first_cluster(&self) -> Cluster {
        Cluster((u32::from(self.cluster_high.get()) << 16) | u32::from(self.cluster_low.get()))
    }

    pub fn file_size(&self) -> u32 {
        self.size.get()
    }

    /// Format the 8.3 name: up to 8 name characters, then a '.' and up to 3
    /// extension characters only when the extension is non-blank. The two
    /// vendor case bits lowercase each half independently.
    pub fn file_name(&self) -> String {
        let mut name = String::with_capacity(12);

        for &byte in self.name.iter().take_while(|&&byte| byte != b' ') {
            name.push(fold_case(byte, self.case_flags & LOWERCASE_NAME != 0));
        }

        if self.extension[0] != b' ' {
            name.push('.');
            for &byte in self.extension.iter().take_while(|&&byte| byte != b' ') {
                name.push(fold_case(byte, self.case_flags & LOWERCASE_EXTENSION != 0));
            }
        }

        name
    }

    /// Rotate-and-add checksum over the 11 raw name bytes; long-name
    /// fragments carry this to tie themselves to their 8.3 entry.
    pub fn checksum(&self) -> u8 {
        let mut sum = 0_u8;
        for &byte in self.name.iter().chain(self.extension.iter()) {
            sum = ((sum & 1) << 7).wrapping_add(sum >> 1).wrapping_add(byte);
        }
        sum
    }
}

fn fold_case(byte: u8, lowercase: bool) -> char {
    let byte = if lowercase {
        byte.to_ascii_lowercase()
    } else {
        byte
    };
    char::from(byte)
}

/// One long-name fragment as stored on disk.
#[derive(Debug, Copy, Clone, FromBytes, AsBytes, Unaligned)]
#[repr(C, packed)]
pub struct LongNameFragment {
    /// Sequence index in the low 5 bits; bit 0x40 flags the final fragment.
    pub sequence: u8,
    pub units1: [U16Le; 5],
    pub attributes: Attributes,
    pub reserved: u8,
    /// Checksum of the paired 8.3 entry.
    pub checksum: u8,
    pub units2: [U16Le; 6],
    /// Always zero; fragments own no clusters.
    pub cluster: U16Le,
    pub units3: [U16Le; 2],
}

impl LongNameFragment {
    pub fn sequence_index(&self) -> u8 {
        self.sequence & 0x1F
    }

    pub fn is_last(&self) -> bool {
        self.sequence & LAST_FRAGMENT_FLAG != 0
    }

    fn units(&self) -> [u16; UNITS_PER_FRAGMENT] {
        let mut units = [0_u16; UNITS_PER_FRAGMENT];
        for (slot, unit) in units.iter_mut().zip(
            self.units1
                .iter()
                .chain(self.units2.iter())
                .chain(self.units3.iter()),
        ) {
            *slot = unit.get();
        }
        units
    }
}

/// One decoded physical record.
#[derive(Debug)]
pub enum DirectoryRecord {
    Short(ShortDirectoryEntry),
    LongFragment(LongNameFragment),
    /// Tombstoned record; skipped without disturbing fragment state.
    Deleted,
    /// The volume label also discards any pending fragments.
    VolumeLabel(ShortDirectoryEntry),
    /// A zero first byte ends the directory, whatever follows it.
    EndOfDirectory,
}

/// Decode one physical record, dispatching on the first name byte and then
/// the attribute byte.
pub fn decode_record(record: &[u8]) -> Result<DirectoryRecord, FatError> {
    if record.len() < DIRECTORY_RECORD_SIZE {
        return Err(FatError::InvalidValue);
    }

    match record[0] {
        0 => return Ok(DirectoryRecord::EndOfDirectory),
        DELETED_MARKER => return Ok(DirectoryRecord::Deleted),
        _ => {}
    }

    let attributes = Attributes::from_bits_retain(record[11]);
    if attributes.contains(Attributes::LONG_NAME) {
        let fragment =
            LongNameFragment::read_from_prefix(record).ok_or(FatError::InvalidValue)?;
        return Ok(DirectoryRecord::LongFragment(fragment));
    }

    let entry = ShortDirectoryEntry::read_from_prefix(record).ok_or(FatError::InvalidValue)?;
    if attributes.contains(Attributes::VOLUME_ID) {
        return Ok(DirectoryRecord::VolumeLabel(entry));
    }

    Ok(DirectoryRecord::Short(entry))
}

/// Index-addressed reassembly buffer for a long name.
///
/// Each fragment lands at `(sequence_index - 1) * 13`, so fragments may be
/// pushed in any relative order and still reassemble the same text.
pub struct LongNameBuffer {
    units: [u16; MAX_FRAGMENTS * UNITS_PER_FRAGMENT],
    terminated_at: Option<usize>,
    has_fragments: bool,
}

impl LongNameBuffer {
    pub fn new() -> Self {
        Self {
            units: [0xFFFF; MAX_FRAGMENTS * UNITS_PER_FRAGMENT],
            terminated_at: None,
            has_fragments: false,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn has_fragments(&self) -> bool {
        self.has_fragments
    }

    /// Place one fragment's units at its sequence position. Fragments with a
    /// sequence index of zero or past the 20-fragment maximum are ignored.
    pub fn push_fragment(&mut self, fragment: &LongNameFragment) {
        let index = usize::from(fragment.sequence_index());
        if index == 0 || index > MAX_FRAGMENTS {
            return;
        }

        let offset = (index - 1) * UNITS_PER_FRAGMENT;
        self.units[offset..offset + UNITS_PER_FRAGMENT].copy_from_slice(&fragment.units());
        if fragment.is_last() {
            self.terminated_at = Some(offset + UNITS_PER_FRAGMENT);
        }
        self.has_fragments = true;
    }

    /// Transliterate the reassembled UCS-2 units to UTF-8. A unit of zero or
    /// 0xFFFF ends the name; units below 0x80 emit one byte, below 0x800
    /// two, all others three. Units with no scalar value (unpaired
    /// surrogates) become a single substitute character.
    pub fn to_string(&self) -> String {
        let end = self.terminated_at.unwrap_or(self.units.len());
        let mut name = String::new();

        for &unit in &self.units[..end] {
            if unit == 0 || unit == 0xFFFF {
                break;
            }
            name.push(char::from_u32(u32::from(unit)).unwrap_or(SUBSTITUTE));
        }

        name
    }
}

impl Default for LongNameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use zerocopy::FromBytes;

    fn short_entry(name: &[u8; 8], extension: &[u8; 3], case_flags: u8) -> ShortDirectoryEntry {
        let mut entry = ShortDirectoryEntry::new_zeroed();
        entry.name = *name;
        entry.extension = *extension;
        entry.case_flags = case_flags;
        entry
    }

    fn fragment(sequence: u8, text: &str, checksum: u8) -> LongNameFragment {
        let mut fragment = LongNameFragment::new_zeroed();
        fragment.sequence = sequence;
        fragment.attributes = Attributes::LONG_NAME;
        fragment.checksum = checksum;

        let mut units = [0xFFFF_u16; UNITS_PER_FRAGMENT];
        let mut count = 0;
        for (slot, character) in units.iter_mut().zip(text.chars()) {
            *slot = character as u16;
            count += 1;
        }
        if count < UNITS_PER_FRAGMENT {
            units[count] = 0;
        }

        for (index, unit) in units.iter().enumerate() {
            match index {
                0..=4 => fragment.units1[index].set(*unit),
                5..=10 => fragment.units2[index - 5].set(*unit),
                _ => fragment.units3[index - 11].set(*unit),
            }
        }

        fragment
    }

    #[test]
    fn record_dispatch() {
        let mut bytes = [0_u8; DIRECTORY_RECORD_SIZE];
        assert!(matches!(
            decode_record(&bytes),
            Ok(DirectoryRecord::EndOfDirectory)
        ));

        bytes[0] = 0xE5;
        assert!(matches!(decode_record(&bytes), Ok(DirectoryRecord::Deleted)));

        bytes[0] = b'A';
        bytes[11] = 0x0F;
        assert!(matches!(
            decode_record(&bytes),
            Ok(DirectoryRecord::LongFragment(_))
        ));

        bytes[11] = 0x08;
        assert!(matches!(
            decode_record(&bytes),
            Ok(DirectoryRecord::VolumeLabel(_))
        ));

        bytes[11] = 0x20;
        assert!(matches!(decode_record(&bytes), Ok(DirectoryRecord::Short(_))));
    }

    #[test]
    fn short_name_formatting() {
        let entry = short_entry(b"README  ", b"TXT", 0);
        assert_eq!(entry.file_name(), "README.TXT");

        let entry = short_entry(b"README  ", b"TXT", LOWERCASE_EXTENSION);
        assert_eq!(entry.file_name(), "README.txt");

        let entry = short_entry(b"README  ", b"TXT", LOWERCASE_NAME);
        assert_eq!(entry.file_name(), "readme.TXT");

        let entry = short_entry(b"KERNEL  ", b"   ", 0);
        assert_eq!(entry.file_name(), "KERNEL");
    }

    #[test]
    fn fragments_reassemble_in_any_order() {
        let one = fragment(1, "thirteen-char", 0x42);
        let two = fragment(2, "s of long nam", 0x42);
        let three = fragment(3 | LAST_FRAGMENT_FLAG, "e here", 0x42);

        let expected = "thirteen-chars of long name here";
        let orders: [[&LongNameFragment; 3]; 3] = [
            [&three, &two, &one],
            [&one, &two, &three],
            [&two, &three, &one],
        ];

        for order in orders {
            let mut buffer = LongNameBuffer::new();
            for fragment in order {
                buffer.push_fragment(fragment);
            }
            assert_eq!(buffer.to_string(), expected);
        }
    }

    #[test]
    fn transliteration_terminates_and_substitutes() {
        let mut buffer = LongNameBuffer::new();
        let mut fragment = fragment(1 | LAST_FRAGMENT_FLAG, "", 0);
        fragment.units1[0].set(u16::from(b'a'));
        fragment.units1[1].set(0x00E9); // two UTF-8 bytes
        fragment.units1[2].set(0x4E2D); // three UTF-8 bytes
        fragment.units1[3].set(0xD800); // unpaired surrogate
        fragment.units1[4].set(u16::from(b'b'));
        fragment.units2[0].set(0);
        fragment.units2[1].set(u16::from(b'z')); // past the terminator
        buffer.push_fragment(&fragment);

        assert_eq!(buffer.to_string(), "a\u{e9}\u{4e2d}?b");
    }

    #[test]
    fn out_of_range_sequence_indices_are_ignored() {
        let mut buffer = LongNameBuffer::new();
        buffer.push_fragment(&fragment(0, "junk", 0));
        buffer.push_fragment(&fragment(21, "junk", 0));
        assert!(!buffer.has_fragments());
    }

    #[test]
    fn checksum_ties_fragments_to_their_entry() {
        // Reference value computed with the canonical rotate-and-add over
        // the 11 raw bytes of "README  TXT".
        let entry = short_entry(b"README  ", b"TXT", 0);
        let mut sum = 0_u8;
        for &byte in b"README  TXT" {
            sum = ((sum & 1) << 7).wrapping_add(sum >> 1).wrapping_add(byte);
        }
        assert_eq!(entry.checksum(), sum);

        let fragment = fragment(1 | LAST_FRAGMENT_FLAG, "readme.txt", entry.checksum());
        assert_eq!(fragment.checksum, entry.checksum());
    }

    #[test]
    fn packed_timestamps_decode() {
        let mut entry = ShortDirectoryEntry::new_zeroed();
        // 2009-12-28, 17:35:06
        entry.modified_date = PackedDate(U16Le::new((29 << 9) | (12 << 5) | 28));
        entry.modified_time = PackedTime(U16Le::new((17 << 11) | (35 << 5) | 3));

        assert_eq!(entry.modified_date.year(), 2009);
        assert_eq!(entry.modified_date.month(), 12);
        assert_eq!(entry.modified_date.day(), 28);
        assert_eq!(entry.modified_time.hour(), 17);
        assert_eq!(entry.modified_time.minute(), 35);
        assert_eq!(entry.modified_time.second(), 6);
    }

    #[test]
    fn cluster_halves_recombine() {
        let mut entry = ShortDirectoryEntry::new_zeroed();
        entry.cluster_high.set(0x0012);
        entry.cluster_low.set(0x3456);
        assert_eq!(entry.first_cluster(), Cluster(0x0012_3456));
    }
}
