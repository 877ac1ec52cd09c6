use djusb_core::{Mode, StageName};
use std::io::{self, BufReader, Chain, Cursor, Read};
use tracing::{debug, info};
use zstd::stream::{read::Decoder, write::Encoder};

use crate::context::RunContext;
use crate::endpoint::{BoxSink, BoxSource, Sink, Source};
use crate::error::{PipelineError, PipelineResult};
use crate::stage::Stage;

/// Frame magic every zstd stream starts with
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// zstd on the plaintext side of the codec.
///
/// `compress.enabled` is decided once: from the controller if present,
/// otherwise from the caller's seed (off by default) and persisted.
pub struct Compression;

impl Stage for Compression {
    fn name(&self) -> StageName {
        StageName::Compress
    }

    fn apply(&self, ctx: &mut RunContext) -> PipelineResult<()> {
        let recorded = ctx.controller.compress.as_ref().and_then(|c| c.enabled);
        let enabled = match recorded {
            Some(enabled) => enabled,
            None => {
                let seeded = ctx
                    .seed
                    .compress
                    .as_ref()
                    .and_then(|c| c.enabled)
                    .unwrap_or(false);
                ctx.controller.compress_mut().enabled = Some(seeded);
                ctx.commit()?;
                info!(enabled = seeded, "seeded compress.enabled");
                seeded
            }
        };

        if !enabled {
            debug!("compression disabled");
            return Ok(());
        }

        match ctx.mode {
            Mode::Backup => {
                let level = ctx.settings.compress_level;
                ctx.wrap_sink(|inner| {
                    let encoder = Encoder::new(inner, level)?;
                    Ok(Box::new(encoder) as BoxSink)
                })
            }
            Mode::Restore => ctx.wrap_source(|inner| Ok(Box::new(open_decoder(inner)?) as BoxSource)),
        }
    }
}

impl Sink for Encoder<'static, BoxSink> {
    fn close(self: Box<Self>) -> io::Result<()> {
        self.finish()?.close()
    }
}

type ZstdSource = Decoder<'static, BufReader<Chain<Cursor<Vec<u8>>, BoxSource>>>;

impl Source for ZstdSource {
    fn close(self: Box<Self>) -> io::Result<()> {
        let (_, inner) = self.finish().into_inner().into_inner();
        inner.close()
    }
}

/// Check the frame magic up front so a stream that was never compressed
/// fails here rather than midway through the copy.
fn open_decoder(mut inner: BoxSource) -> PipelineResult<ZstdSource> {
    let mut prefix = Vec::with_capacity(ZSTD_MAGIC.len());
    inner
        .by_ref()
        .take(ZSTD_MAGIC.len() as u64)
        .read_to_end(&mut prefix)?;

    if prefix.is_empty() {
        return Err(PipelineError::Compression(
            "input is empty, expected a zstd stream".into(),
        ));
    }
    if prefix != ZSTD_MAGIC {
        return Err(PipelineError::Compression(format!(
            "input is not a zstd stream (starts with {})",
            hex::encode(&prefix)
        )));
    }

    Ok(Decoder::new(Cursor::new(prefix).chain(inner))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::prepared;
    use std::io::Write;

    #[test]
    fn test_seed_used_when_absent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut ctx = prepared(tmp.path(), Mode::Backup, Some(b""));
        ctx.seed.compress_mut().enabled = Some(true);

        Compression.apply(&mut ctx).unwrap();
        let (on_disk, _) = ctx.store.load().unwrap();
        assert_eq!(on_disk.compress.unwrap().enabled, Some(true));
    }

    #[test]
    fn test_defaults_to_disabled() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut ctx = prepared(tmp.path(), Mode::Backup, Some(b""));

        Compression.apply(&mut ctx).unwrap();
        assert_eq!(ctx.controller.compress.as_ref().unwrap().enabled, Some(false));
    }

    #[test]
    fn test_recorded_value_beats_seed() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut ctx = prepared(tmp.path(), Mode::Backup, Some(b""));
        ctx.controller.compress_mut().enabled = Some(true);
        ctx.commit().unwrap();
        let before = std::fs::read(tmp.path().join("ctrl.json")).unwrap();
        ctx.seed.compress_mut().enabled = Some(false);

        Compression.apply(&mut ctx).unwrap();
        assert_eq!(ctx.controller.compress.as_ref().unwrap().enabled, Some(true));
        assert_eq!(std::fs::read(tmp.path().join("ctrl.json")).unwrap(), before);
    }

    #[test]
    fn test_backup_sink_writes_zstd_frame() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut ctx = prepared(tmp.path(), Mode::Backup, Some(b""));
        ctx.seed.compress_mut().enabled = Some(true);
        Compression.apply(&mut ctx).unwrap();

        let mut sink = ctx.take_sink().unwrap();
        sink.write_all(&[b'a'; 4096]).unwrap();
        sink.close().unwrap();

        let out = std::fs::read(tmp.path().join("out")).unwrap();
        assert_eq!(out[..4], ZSTD_MAGIC);
        assert!(out.len() < 4096);
        assert_eq!(zstd::decode_all(&out[..]).unwrap(), vec![b'a'; 4096]);
    }

    #[test]
    fn test_restore_rejects_plain_input() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut ctx = prepared(tmp.path(), Mode::Restore, Some(b"plain text"));
        ctx.seed.compress_mut().enabled = Some(true);

        let err = Compression.apply(&mut ctx).unwrap_err();
        assert!(matches!(err, PipelineError::Compression(_)));
    }

    #[test]
    fn test_restore_rejects_empty_input() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut ctx = prepared(tmp.path(), Mode::Restore, Some(b""));
        ctx.seed.compress_mut().enabled = Some(true);

        let err = Compression.apply(&mut ctx).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_restore_source_decodes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let packed = zstd::encode_all(&b"hello hello hello"[..], 1).unwrap();
        let mut ctx = prepared(tmp.path(), Mode::Restore, Some(&packed));
        ctx.seed.compress_mut().enabled = Some(true);
        Compression.apply(&mut ctx).unwrap();

        let mut source = ctx.take_source().unwrap();
        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        source.close().unwrap();
        assert_eq!(out, b"hello hello hello");
    }
}
