//! On-disk persistence.

pub mod snapshot;

use std::io::Write;
use std::path::Path;

use atomic_write_file::AtomicWriteFile;

use crate::error::Result;

/// Replace `path` with `bytes` atomically: readers see either the previous
/// file or the complete new one, never a partial write.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = AtomicWriteFile::options().open(path)?;
    if let Err(err) = file.write_all(bytes).and_then(|()| file.flush()) {
        file.discard()?;
        return Err(err.into());
    }
    file.commit()?;
    Ok(())
}
