use core::fmt;

/// Status codes shared by the driver and its block-device collaborators.
///
/// `EndOfFile` and `EndOfList` are sentinels rather than failures: they mark
/// the normal end of a file read or a cluster chain / directory scan, and
/// callers are expected to match on them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FatError {
    /// Missing 0xAA55 boot signature, filesystem type tag, or FSINFO magic.
    InvalidSignature,
    /// The BPB sector size disagrees with the device's sector size.
    UnsupportedSectorSize,
    /// Out-of-range cluster, FAT copy index, table value, or seek target.
    InvalidValue,
    /// The cursor already sits at the end of the file.
    EndOfFile,
    /// The cluster chain or directory has no further elements.
    EndOfList,
    /// A file was opened as a directory or vice versa.
    WrongElementType,
    /// No directory entry matches the requested name.
    NotFound,
    /// A FAT mirror write failed after the primary copy was committed; the
    /// copies now diverge and the write path is dead for this volume.
    FsInconsistent,
    /// Allocation failure or an unclassified device error.
    UnknownError,
}

impl fmt::Display for FatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::InvalidSignature => "invalid signature",
            Self::UnsupportedSectorSize => "unsupported sector size",
            Self::InvalidValue => "invalid value",
            Self::EndOfFile => "end of file",
            Self::EndOfList => "end of list",
            Self::WrongElementType => "wrong element type",
            Self::NotFound => "entry not found",
            Self::FsInconsistent => "filesystem inconsistent",
            Self::UnknownError => "unknown error",
        };
        f.write_str(message)
    }
}
