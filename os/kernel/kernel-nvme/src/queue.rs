use crate::{DmaPage, QUEUE_SIZE};

/// 64-byte submission queue entry.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct SubmissionEntry {
    /// Opcode in bits 0..8, command id in bits 16..32.
    pub cdw0: u32,
    pub nsid: u32,
    pub _reserved: [u32; 2],
    pub mptr: u64,
    pub prp1: u64,
    pub prp2: u64,
    pub cdw10: u32,
    pub cdw11: u32,
    pub cdw12: u32,
    pub cdw13: u32,
    pub cdw14: u32,
    pub cdw15: u32,
}

const _: () = assert!(size_of::<SubmissionEntry>() == 64);

impl SubmissionEntry {
    #[must_use]
    pub fn new(opcode: u8, nsid: u32, prp1: u64) -> Self {
        Self {
            cdw0: u32::from(opcode),
            nsid,
            prp1,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn opcode(&self) -> u8 {
        self.cdw0 as u8
    }

    #[must_use]
    pub const fn command_id(&self) -> u16 {
        (self.cdw0 >> 16) as u16
    }

    pub const fn set_command_id(&mut self, id: u16) {
        self.cdw0 = (self.cdw0 & 0xFFFF) | ((id as u32) << 16);
    }
}

/// 16-byte completion queue entry.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct CompletionEntry {
    pub dw0: u32,
    pub _reserved: u32,
    pub sq_head: u16,
    pub sq_id: u16,
    pub command_id: u16,
    /// Phase tag in bit 0, status code above it.
    pub status: u16,
}

const _: () = assert!(size_of::<CompletionEntry>() == 16);

impl CompletionEntry {
    #[must_use]
    pub const fn phase(&self) -> bool {
        self.status & 1 != 0
    }

    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status >> 1
    }
}

/// Driver-side view of one submission/completion queue pair.
#[derive(Debug)]
pub(crate) struct QueuePair {
    pub id: usize,
    pub sq: DmaPage,
    pub sq_tail: u8,
    pub sq_head: u8,
    pub cq: DmaPage,
    pub cq_head: u8,
    /// Phase of already consumed entries; fresh entries carry the inverse.
    pub cq_phase: bool,
}

impl QueuePair {
    pub fn new(id: usize, sq: DmaPage, cq: DmaPage) -> Self {
        Self {
            id,
            sq,
            sq_tail: 0,
            sq_head: 0,
            cq,
            cq_head: 0,
            cq_phase: false,
        }
    }

    pub const fn is_full(&self) -> bool {
        (self.sq_tail as usize + 1) % QUEUE_SIZE == self.sq_head as usize
    }

    /// Write `entry` at the tail and advance it. Returns the new tail.
    pub fn push(&mut self, entry: SubmissionEntry) -> u8 {
        let slot = self.sq.as_mut_ptr().cast::<SubmissionEntry>();
        unsafe { slot.add(self.sq_tail as usize).write_volatile(entry) };
        self.sq_tail = ((self.sq_tail as usize + 1) % QUEUE_SIZE) as u8;
        self.sq_tail
    }

    /// Take the next fresh completion, if any.
    pub fn pop(&mut self) -> Option<CompletionEntry> {
        let slot = self.cq.as_mut_ptr().cast::<CompletionEntry>();
        let entry = unsafe { slot.add(self.cq_head as usize).read_volatile() };
        if entry.phase() == self.cq_phase {
            return None;
        }
        self.sq_head = entry.sq_head as u8;
        self.cq_head += 1;
        if self.cq_head as usize == QUEUE_SIZE {
            self.cq_head = 0;
            self.cq_phase = !self.cq_phase;
        }
        Some(entry)
    }
}
