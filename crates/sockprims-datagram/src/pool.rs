use crate::packet::DATA_LENGTH;

/// Fixed-capacity data region of one received fragment.
#[derive(Debug)]
pub struct FragmentBuf {
    data: Box<[u8]>,
    len: usize,
}

impl FragmentBuf {
    fn new() -> Self {
        Self {
            data: vec![0u8; DATA_LENGTH].into_boxed_slice(),
            len: 0,
        }
    }

    /// Copy `src` in as the valid bytes. `src` must fit in [`DATA_LENGTH`].
    pub fn fill(&mut self, src: &[u8]) {
        let len = src.len().min(DATA_LENGTH);
        self.data[..len].copy_from_slice(&src[..len]);
        self.len = len;
    }

    /// The valid bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

/// Free list of fragment buffers.
///
/// Buffers go out through [`acquire`](Self::acquire) and must be handed back
/// with [`release`](Self::release). The pool is owned by one reassembler and
/// only reachable through `&mut`, which keeps it single-consumer.
#[derive(Debug, Default)]
pub struct FragmentPool {
    free: Vec<FragmentBuf>,
    allocated: usize,
    max_idle: Option<usize>,
}

impl FragmentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_idle` released buffers around; extras are freed.
    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            max_idle: Some(max_idle),
            ..Self::default()
        }
    }

    /// Take a buffer from the free list, or allocate a new one.
    pub fn acquire(&mut self) -> FragmentBuf {
        match self.free.pop() {
            Some(buf) => buf,
            None => {
                self.allocated += 1;
                FragmentBuf::new()
            }
        }
    }

    /// Return a buffer for reuse.
    pub fn release(&mut self, mut buf: FragmentBuf) {
        if self.max_idle.is_some_and(|max| self.free.len() >= max) {
            self.allocated = self.allocated.saturating_sub(1);
            return;
        }
        buf.len = 0;
        self.free.push(buf);
    }

    /// Buffers currently on the free list.
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    /// Buffers alive in total (idle plus handed out).
    pub fn allocated(&self) -> usize {
        self.allocated
    }
}
