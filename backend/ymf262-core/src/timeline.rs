//! Offline rendering from a list of timestamped register writes

use crate::{OUTPUT_CHANNELS, Ymf262};

/// A register write scheduled to take effect immediately before sample `sample` is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedWrite {
    pub sample: u64,
    pub array: u8,
    pub address: u8,
    pub value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderSummary {
    pub samples_rendered: u64,
    pub writes_applied: usize,
}

impl Ymf262 {
    /// Produce `sample_count` samples, applying each write right before the first sample whose
    /// index is greater than or equal to the write's timestamp.
    ///
    /// Writes must be sorted by timestamp. Writes timestamped at or after `sample_count` are not
    /// applied.
    pub fn render<I, F>(&mut self, writes: I, sample_count: u64, mut output: F) -> RenderSummary
    where
        I: IntoIterator<Item = TimedWrite>,
        F: FnMut([i16; OUTPUT_CHANNELS]),
    {
        let mut writes = writes.into_iter().peekable();
        let mut writes_applied = 0;

        for sample in 0..sample_count {
            while let Some(write) = writes.next_if(|write| write.sample <= sample) {
                self.write(write.array, write.address, write.value);
                writes_applied += 1;
            }

            output(self.read());
        }

        log::debug!("Rendered {sample_count} samples, applied {writes_applied} register writes");

        RenderSummary { samples_rendered: sample_count, writes_applied }
    }
}
