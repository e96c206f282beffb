use heapless::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    /// Byte stored (or dropped as `\r`), line still open.
    Pending,
    /// A newline closed a non-empty line; fetch it with [`LineAssembler::take_line`].
    Complete,
    /// The buffer filled before a newline. The partial line is gone and the
    /// rest of it will be skipped up to the next newline.
    Overflow,
}

/// Assembles UART bytes into lines of at most `N` bytes.
pub struct LineAssembler<const N: usize> {
    buf: Vec<u8, N>,
    discarding: bool,
}

impl<const N: usize> LineAssembler<N> {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            discarding: false,
        }
    }

    pub fn push(&mut self, byte: u8) -> LineEvent {
        match byte {
            b'\r' => LineEvent::Pending,
            b'\n' => {
                if core::mem::take(&mut self.discarding) || self.buf.is_empty() {
                    self.buf.clear();
                    LineEvent::Pending
                } else {
                    LineEvent::Complete
                }
            }
            _ if self.discarding => LineEvent::Pending,
            _ => {
                if self.buf.push(byte).is_err() {
                    self.buf.clear();
                    self.discarding = true;
                    LineEvent::Overflow
                } else {
                    LineEvent::Pending
                }
            }
        }
    }

    /// Moves the completed line out and resets the write index to 0.
    pub fn take_line(&mut self) -> Vec<u8, N> {
        core::mem::take(&mut self.buf)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl<const N: usize> Default for LineAssembler<N> {
    fn default() -> Self {
        Self::new()
    }
}
