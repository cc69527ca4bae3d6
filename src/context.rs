use std::fs;

/// A per-batch bundle of a duplicated archive handle and private scratch
/// space for the decompressor.
///
/// One context must not be used from two threads at once (the handle has a
/// single cursor), but any number of contexts over the same archive may run
/// concurrently -- each owns its own handle. Opening a fresh handle per entry
/// is prohibitively slow at thousands of entries; this is the middle ground.
///
/// Created by [`Archive::create_context`](crate::Archive::create_context).
/// Callers should [`close`](Self::close) a context when its batch completes;
/// dropping it releases the handle as well.
pub struct ExtractContext {
    pub(crate) file: Option<fs::File>,
    pub(crate) scratch: Vec<u8>,
}

impl ExtractContext {
    pub(crate) fn new(file: fs::File) -> Self {
        Self {
            file: Some(file),
            scratch: Vec::new(),
        }
    }

    /// Releases the duplicated handle. Safe to call any number of times;
    /// extraction through a closed context fails with
    /// [`ExtractError::Closed`](crate::ExtractError::Closed).
    pub fn close(&mut self) {
        self.file.take();
        self.scratch = Vec::new();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }
}
