//! Forwarding of child output to the parent's standard streams.

use std::io::{self, Read, Write};

/// Outcome of forwarding one child stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct ForwardStats {
    pub(super) bytes_read: u64,
    pub(super) bytes_written: u64,
    pub(super) write_failed: bool,
}

struct Counted<T> {
    inner: T,
    count: u64,
}

impl<T> Counted<T> {
    const fn new(inner: T) -> Self {
        Self { inner, count: 0 }
    }
}

impl<R: Read> Read for Counted<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count = self.count.saturating_add(n as u64);
        Ok(n)
    }
}

impl<W: Write> Write for Counted<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count = self.count.saturating_add(n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Copy `reader` into `writer`. When the writer fails the rest of the child
/// output is drained so the child never blocks on a full pipe.
pub(super) fn forward_child_output<R, W>(reader: R, writer: W, stream: &'static str) -> ForwardStats
where
    R: Read,
    W: Write,
{
    let mut reader = Counted::new(reader);
    let mut writer = Counted::new(writer);
    let write_failed = match io::copy(&mut reader, &mut writer).and_then(|_| writer.flush()) {
        Ok(()) => false,
        Err(err) => {
            tracing::debug!("failed to forward child {stream}: {err}; draining");
            if let Err(drain) = io::copy(&mut reader, &mut io::sink()) {
                tracing::debug!("failed to drain child {stream}: {drain}");
            }
            true
        }
    };
    ForwardStats {
        bytes_read: reader.count,
        bytes_written: writer.count,
        write_failed,
    }
}
