use std::{io, path::Path};

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// A spill file for a payload that outgrew its in-memory ceiling (spec.md
/// §4.4). Created already unlinked (`tempfile::tempfile_in` removes the
/// directory entry immediately on platforms that support it), so no
/// filesystem name survives past creation — spec.md invariant 4.
pub struct TempSpill {
    file: tokio::fs::File,
    bytes_written: u64,
}

impl TempSpill {
    pub async fn create(dir: &Path) -> io::Result<Self> {
        let dir = dir.to_path_buf();
        let std_file = tokio::task::spawn_blocking(move || tempfile::tempfile_in(&dir))
            .await
            .map_err(|join_err| io::Error::new(io::ErrorKind::Other, join_err))??;
        Ok(TempSpill {
            file: tokio::fs::File::from_std(std_file),
            bytes_written: 0,
        })
    }

    /// A short write is fatal to the session per spec.md §4.4: this either
    /// writes every byte of `buf` or returns an error, never a partial
    /// count.
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf).await?;
        self.bytes_written += buf.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.file.flush().await
    }

    /// Read the whole spilled contents back from the start, leaving the
    /// cursor at EOF so further writes append after what was just read. Used
    /// by delivery fan-out to hand the storage collaborator the full
    /// composed payload without ever naming a path (spec.md §4.6, invariant 4).
    pub async fn read_all(&mut self) -> io::Result<Vec<u8>> {
        self.file.seek(io::SeekFrom::Start(0)).await?;
        let mut buf = Vec::with_capacity(self.bytes_written as usize);
        self.file.read_to_end(&mut buf).await?;
        self.file.seek(io::SeekFrom::End(0)).await?;
        Ok(buf)
    }
}
