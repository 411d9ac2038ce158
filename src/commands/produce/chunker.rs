use std::io::Write;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::debug;

use crate::model::ChunkDescriptor;
use crate::store::ObjectStore;
use crate::util::sha256_hex;

/// Buffers accepted lines and flushes them as numbered gzip objects under
/// `<namespace>/chunk-NNNN.jsonl.gz`. Chunks are exactly `capacity` lines
/// except a possibly undersized final one.
pub(crate) struct ChunkWriter<'a> {
    store: &'a dyn ObjectStore,
    bucket: String,
    namespace: String,
    capacity: usize,
    buffer: Vec<String>,
    sequence: u32,
    descriptors: Vec<ChunkDescriptor>,
}

impl<'a> ChunkWriter<'a> {
    pub(crate) fn new(
        store: &'a dyn ObjectStore,
        bucket: &str,
        namespace: &str,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            namespace: namespace.to_string(),
            capacity,
            buffer: Vec::with_capacity(capacity),
            sequence: 0,
            descriptors: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, line: String) -> Result<()> {
        self.buffer.push(line);
        if self.buffer.len() >= self.capacity {
            self.flush()?;
        }
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<Vec<ChunkDescriptor>> {
        if !self.buffer.is_empty() {
            self.flush()?;
        }
        Ok(self.descriptors)
    }

    fn flush(&mut self) -> Result<()> {
        let key = format!("{}/chunk-{:04}.jsonl.gz", self.namespace, self.sequence);

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        for line in &self.buffer {
            encoder
                .write_all(line.as_bytes())
                .with_context(|| format!("failed to compress chunk {key}"))?;
            encoder
                .write_all(b"\n")
                .with_context(|| format!("failed to compress chunk {key}"))?;
        }
        let compressed = encoder
            .finish()
            .with_context(|| format!("failed to finalize chunk {key}"))?;

        self.store
            .put(&key, &compressed)
            .with_context(|| format!("failed to upload chunk {key}"))?;

        debug!(
            key = %key,
            lines = self.buffer.len(),
            bytes = compressed.len(),
            "chunk uploaded"
        );

        self.descriptors.push(ChunkDescriptor {
            bucket: self.bucket.clone(),
            key,
            line_count: self.buffer.len(),
            sha256: sha256_hex(&compressed),
        });
        self.sequence += 1;
        self.buffer.clear();

        Ok(())
    }
}
