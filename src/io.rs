//! Reader-based ingestion of on-disk structures, for host-side tools that
//! look at a disk image as a byte stream rather than a block device.

use genio::error::ReadExactError;
use zerocopy::{AsBytes, FromBytes};

/// Read a `T` by filling its byte representation directly from `reader`.
pub fn read_raw<R, T>(reader: &mut R) -> Result<T, ReadExactError<R::ReadError>>
where
    R: genio::Read,
    T: AsBytes + FromBytes,
    R::ReadError: core::fmt::Debug,
{
    let mut value = T::new_zeroed();
    reader.read_exact(value.as_bytes_mut())?;
    Ok(value)
}
