use djusb_core::{Mode, StageName};
use djusb_crypto::{derive_stream_key, ChunkCipher, ChunkReader, ChunkWriter, NonceBase};
use tracing::{debug, info};

use crate::context::RunContext;
use crate::endpoint::{BoxSink, BoxSource};
use crate::error::{PipelineError, PipelineResult};
use crate::stage::Stage;

/// AES-256-GCM chunk framing around the wire side of the stream.
///
/// Resolution order, each change persisted before the next step:
/// `crypto.enabled` defaults to true, then a missing `crypto.nonce_base` is
/// drawn from the OS RNG.
pub struct Encryption;

impl Stage for Encryption {
    fn name(&self) -> StageName {
        StageName::Crypto
    }

    fn apply(&self, ctx: &mut RunContext) -> PipelineResult<()> {
        let enabled = match ctx.controller.crypto.as_ref().and_then(|c| c.enabled) {
            Some(enabled) => enabled,
            None => {
                ctx.controller.crypto_mut().enabled = Some(true);
                ctx.commit()?;
                info!("seeded crypto.enabled = true");
                true
            }
        };
        if !enabled {
            debug!("encryption disabled");
            return Ok(());
        }

        let base = match ctx.controller.crypto.as_ref().and_then(|c| c.nonce_base) {
            Some(base) => base,
            None => {
                let base =
                    NonceBase::generate().map_err(|e| PipelineError::Random(e.to_string()))?;
                ctx.controller.crypto_mut().nonce_base = Some(base);
                ctx.commit()?;
                info!("generated crypto.nonce_base");
                base
            }
        };

        let key = derive_stream_key(ctx.passphrase());
        let cipher = ChunkCipher::new(key.as_bytes(), base)?;
        drop(key);

        match ctx.mode {
            Mode::Backup => {
                ctx.wrap_sink(|inner| Ok(Box::new(ChunkWriter::new(inner, cipher)) as BoxSink))
            }
            Mode::Restore => {
                ctx.wrap_source(|inner| Ok(Box::new(ChunkReader::new(inner, cipher)) as BoxSource))
            }
        }
    }
}
