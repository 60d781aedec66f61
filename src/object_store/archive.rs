use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use super::ObjectStoreError;

/// Zip builder shared by the storage backends. Entries are copied into an
/// anonymous temp file, so memory use stays bounded by the copy buffer.
pub(crate) struct ArchiveBuilder {
    zip: ZipWriter<File>,
    options: FileOptions,
}

impl ArchiveBuilder {
    pub fn new() -> Result<Self, ObjectStoreError> {
        Ok(Self {
            zip: ZipWriter::new(tempfile::tempfile()?),
            options: FileOptions::default().compression_method(CompressionMethod::Deflated),
        })
    }

    pub fn add(&mut self, name: &str, data: &mut impl Read) -> Result<u64, ObjectStoreError> {
        self.zip.start_file(name, self.options)?;
        Ok(std::io::copy(data, &mut self.zip)?)
    }

    /// Finish the central directory and hand back the spool, rewound.
    pub fn finish(mut self) -> Result<File, ObjectStoreError> {
        let mut spool = self.zip.finish()?;
        spool.seek(SeekFrom::Start(0))?;
        Ok(spool)
    }
}

/// Archive entry name for an object under `dir`: the directory's own name
/// followed by the object's path relative to it.
pub(crate) fn entry_name(dir: &str, relative: &str) -> String {
    let base = dir.rsplit('/').next().unwrap_or(dir);
    format!("{base}/{relative}")
}
