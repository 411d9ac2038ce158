use std::io::{Cursor, Read};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;

use crate::cli::CompressionMode;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Wraps `input` according to the compression mode. Auto mode reads two
/// bytes to test for the gzip magic and chains them back in front of the
/// rest, so the caller sees every byte of the original stream either way.
pub fn decoded_reader<R: Read + 'static>(
    mut input: R,
    mode: CompressionMode,
) -> Result<Box<dyn Read>> {
    match mode {
        CompressionMode::On => Ok(Box::new(GzDecoder::new(input))),
        CompressionMode::Off => Ok(Box::new(input)),
        CompressionMode::Auto => {
            let mut magic = [0_u8; 2];
            let mut filled = 0;
            while filled < magic.len() {
                let count = input
                    .read(&mut magic[filled..])
                    .context("failed to sniff stream header")?;
                if count == 0 {
                    break;
                }
                filled += count;
            }

            let restored = Cursor::new(magic[..filled].to_vec()).chain(input);
            if filled == magic.len() && magic == GZIP_MAGIC {
                Ok(Box::new(GzDecoder::new(restored)))
            } else {
                Ok(Box::new(restored))
            }
        }
    }
}
