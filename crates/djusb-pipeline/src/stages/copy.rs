use djusb_core::StageName;
use std::io::{self, Read, Write};
use tracing::info;

use crate::context::RunContext;
use crate::error::PipelineResult;
use crate::stage::Stage;

/// Pumps the decorated source into the decorated sink, then closes both.
pub struct Copy;

impl Stage for Copy {
    fn name(&self) -> StageName {
        StageName::Copy
    }

    fn apply(&self, ctx: &mut RunContext) -> PipelineResult<()> {
        let mut source = ctx.take_source()?;
        let mut sink = ctx.take_sink()?;

        let transferred = pump(&mut source, &mut sink, ctx.settings.copy_buffer_bytes);
        // Closing the sink finishes any compression frame and fsyncs the
        // device, so it must happen even when the transfer failed.
        let sink_closed = sink.close();
        let source_closed = source.close();

        let bytes = transferred?;
        sink_closed?;
        source_closed?;

        ctx.bytes_copied = bytes;
        info!(bytes, "copy complete");
        Ok(())
    }
}

fn pump<R, W>(source: &mut R, sink: &mut W, buf_len: usize) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; buf_len.max(1)];
    let mut total = 0u64;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        sink.write_all(&buf[..n])?;
        total += n as u64;
    }
    sink.flush()?;
    Ok(total)
}
