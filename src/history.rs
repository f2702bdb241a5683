use crate::config::ChannelSpec;
use crate::error::{Result, SinkError};

/// Caller-side retained history, one contiguous byte window per channel.
///
/// Layout matches what [`EventSink::work`](crate::sink::EventSink::work)
/// expects: `history - 1` retained items followed by the not-yet-consumed
/// ones. The retained part starts zero-filled.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    item_sizes: Vec<usize>,
    retained: usize,
    channels: Vec<Vec<u8>>,
}

impl HistoryBuffer {
    pub fn new(specs: &[ChannelSpec], history: u64) -> Self {
        let retained = (history as usize).saturating_sub(1);
        Self {
            item_sizes: specs.iter().map(|s| s.item_size).collect(),
            retained,
            channels: specs.iter().map(|s| vec![0u8; retained * s.item_size]).collect(),
        }
    }

    /// Append one chunk per channel. Every chunk must carry the same number
    /// of whole items.
    pub fn push(&mut self, chunks: &[&[u8]]) -> Result<()> {
        if chunks.len() != self.channels.len() {
            return Err(SinkError::ChannelCountMismatch { expected: self.channels.len(), got: chunks.len() });
        }

        let mut items = None;
        for (channel, (chunk, &size)) in chunks.iter().zip(&self.item_sizes).enumerate() {
            let count = chunk.len() / size;
            if chunk.len() % size != 0 || items.is_some_and(|n| n != count) {
                return Err(SinkError::BufferTooShort {
                    channel,
                    needed: items.unwrap_or(count) * size,
                    len: chunk.len(),
                });
            }
            items = Some(count);
        }

        for (buf, chunk) in self.channels.iter_mut().zip(chunks) {
            buf.extend_from_slice(chunk);
        }
        Ok(())
    }

    /// Items pushed but not yet retired.
    pub fn available(&self) -> usize {
        match (self.channels.first(), self.item_sizes.first()) {
            (Some(buf), Some(&size)) => buf.len() / size - self.retained,
            _ => 0,
        }
    }

    pub fn buffers(&self) -> Vec<&[u8]> {
        self.channels.iter().map(Vec::as_slice).collect()
    }

    /// Slide the window forward by `consumed` items.
    pub fn retire(&mut self, consumed: usize) {
        let consumed = consumed.min(self.available());
        for (buf, &size) in self.channels.iter_mut().zip(&self.item_sizes) {
            buf.drain(..consumed * size);
        }
    }
}
