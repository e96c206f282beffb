//! Splits a chunked MJPEG byte stream into complete JPEG images.

use super::frame::Frame;

pub const START_MARKER: [u8; 2] = [0xFF, 0xD8];
pub const END_MARKER: [u8; 2] = [0xFF, 0xD9];
pub const DEFAULT_MAX_BUFFER: usize = 1_000_000;

fn find_marker(haystack: &[u8], marker: &[u8; 2], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(2)
        .position(|w| w == marker)
        .map(|i| i + from)
}

pub struct StreamDemuxer {
    buffer: Vec<u8>,
    max_buffer: usize,
    // Buffer length at the last failed end-marker search.
    scanned: usize,
}

impl StreamDemuxer {
    pub fn new(max_buffer: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_buffer,
            scanned: 0,
        }
    }

    /// Appends `chunk` and returns the frames it completed. Frames are cut
    /// lazily as the iterator is advanced; the buffer cap is enforced once
    /// the iterator is exhausted or dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.buffer.extend_from_slice(chunk);
        Frames { demuxer: self }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn max_buffer(&self) -> usize {
        self.max_buffer
    }

    fn next_frame(&mut self) -> Option<Frame> {
        let start = find_marker(&self.buffer, &START_MARKER, 0)?;
        if start > 0 {
            tracing::trace!("Discarding {} bytes before frame start", start);
            self.buffer.drain(..start);
            self.scanned = 0;
        }

        // One byte of overlap so a marker split across chunks is still found
        let from = self.scanned.saturating_sub(1).max(2);
        match find_marker(&self.buffer, &END_MARKER, from) {
            Some(end) => {
                let data: Vec<u8> = self.buffer.drain(..end + 2).collect();
                self.scanned = 0;
                Some(Frame::new(data))
            }
            None => {
                self.scanned = self.buffer.len();
                None
            }
        }
    }

    fn enforce_cap(&mut self) {
        if self.buffer.len() <= self.max_buffer {
            return;
        }

        let before = self.buffer.len();
        while self.buffer.len() > self.max_buffer {
            let from = if self.buffer.starts_with(&START_MARKER) { 2 } else { 0 };
            match find_marker(&self.buffer, &START_MARKER, from) {
                Some(next) => {
                    self.buffer.drain(..next);
                }
                None => self.buffer.clear(),
            }
        }
        self.scanned = 0;

        tracing::warn!(
            "Stream buffer exceeded {} bytes without a complete frame; dropped {} bytes",
            self.max_buffer,
            before - self.buffer.len()
        );
    }
}

impl Default for StreamDemuxer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER)
    }
}

/// Frames completed by one [`StreamDemuxer::feed`] call.
pub struct Frames<'a> {
    demuxer: &'a mut StreamDemuxer,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let frame = self.demuxer.next_frame();
        if frame.is_none() {
            self.demuxer.enforce_cap();
        }
        frame
    }
}

impl Drop for Frames<'_> {
    fn drop(&mut self) {
        self.demuxer.enforce_cap();
    }
}
