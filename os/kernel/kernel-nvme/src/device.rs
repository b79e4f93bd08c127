use crate::gpt::{GPT_SCAN_BYTES, GptPartition, parse_gpt};
use crate::queue::{QueuePair, SubmissionEntry};
use crate::regs::{NvmeRegisters, reg};
use crate::{DmaPage, MAX_COMMANDS, NvmeError, NvmeHost, QUEUE_SIZE};
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU8, AtomicU16, AtomicU32, AtomicU64, Ordering};
use kernel_pci::{ConfigSpace, PciDevice, enable_bus_master};
use kernel_sync::SpinLock;
use log::{debug, info, warn};

const ADMIN_QUEUE: usize = 0;
const IO_QUEUE: usize = 1;

const OPC_CREATE_IO_SQ: u8 = 0x01;
const OPC_CREATE_IO_CQ: u8 = 0x05;
const OPC_IDENTIFY: u8 = 0x06;
const OPC_WRITE: u8 = 0x01;
const OPC_READ: u8 = 0x02;

/// Block sizes from 512 bytes to 4 KiB.
const LBADS_RANGE: core::ops::RangeInclusive<u8> = 9..=12;

const CNS_NAMESPACE: u32 = 0;
const CNS_CONTROLLER: u32 = 1;

/// State of one command id.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SlotState {
    Free = 0x91,
    InFlight = 0x92,
    Completed = 0x93,
}

struct Queues {
    admin: QueuePair,
    io: QueuePair,
}

impl Queues {
    fn get(&mut self, qid: usize) -> &mut QueuePair {
        if qid == ADMIN_QUEUE { &mut self.admin } else { &mut self.io }
    }
}

/// One NVMe controller.
pub struct NvmeDevice {
    index: u16,
    pci: PciDevice,
    regs: Box<dyn NvmeRegisters>,
    /// `None` until [`probe_2`](Self::probe_2) allocated the queues. Task
    /// code locks with interrupts masked; the interrupt handler locks plainly.
    queues: SpinLock<Option<Queues>>,
    slots: [AtomicU8; MAX_COMMANDS],
    slot_status: [AtomicU16; MAX_COMMANDS],
    dstrd: AtomicU8,
    version: AtomicU32,
    lba_count: AtomicU64,
    lbads: AtomicU8,
    partitions: SpinLock<Vec<GptPartition>>,
}

/// Snapshot rendered into `/sys/nvme`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NvmeStatus {
    pub pci: PciDevice,
    pub major_version: u16,
    pub minor_version: u8,
    pub asq_tail: u8,
    pub asq_head: u8,
    pub acq_head: u8,
    pub iosq_tail: u8,
    pub iosq_head: u8,
    pub iocq_head: u8,
    pub lba_count: u64,
    pub lbads_exponent: u8,
}

impl fmt::Display for NvmeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Nvme({} addr={:08x} ver={:02x}.{:02x} asq_tail={:02x} asq_head={:02x} acq_head={:02x} \
             iosq_tail={:02x} iosq_head={:02x} iocq_head={:02x} lba_count={:016x} lbads_exp={:02x})",
            self.pci.address,
            self.pci.mmio_phys_base.as_u64() as u32,
            self.major_version,
            self.minor_version,
            self.asq_tail,
            self.asq_head,
            self.acq_head,
            self.iosq_tail,
            self.iosq_head,
            self.iocq_head,
            self.lba_count,
            self.lbads_exponent
        )
    }
}

impl NvmeDevice {
    /// First bring-up phase, boot context. `regs` must already reach the
    /// controller's BAR0; `pci.mmio_virt_base` records where.
    #[must_use]
    pub fn new(index: u16, pci: PciDevice, regs: Box<dyn NvmeRegisters>) -> Self {
        Self {
            index,
            pci,
            regs,
            queues: SpinLock::new(None),
            slots: [const { AtomicU8::new(SlotState::Free as u8) }; MAX_COMMANDS],
            slot_status: [const { AtomicU16::new(0) }; MAX_COMMANDS],
            dstrd: AtomicU8::new(0),
            version: AtomicU32::new(0),
            lba_count: AtomicU64::new(0),
            lbads: AtomicU8::new(9),
            partitions: SpinLock::new(Vec::new()),
        }
    }

    #[must_use]
    pub const fn index(&self) -> u16 {
        self.index
    }

    #[must_use]
    pub const fn pci(&self) -> &PciDevice {
        &self.pci
    }

    /// Number of logical blocks in namespace 1.
    #[must_use]
    pub fn lba_count(&self) -> u64 {
        self.lba_count.load(Ordering::Relaxed)
    }

    /// `log2` of the logical block size.
    #[must_use]
    pub fn lbads_exponent(&self) -> u8 {
        self.lbads.load(Ordering::Relaxed)
    }

    /// Namespace capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.lba_count() << self.lbads_exponent()
    }

    #[must_use]
    pub fn partitions(&self) -> Vec<GptPartition> {
        self.partitions.lock_irq().clone()
    }

    #[must_use]
    pub fn slot_state(&self, id: u16) -> SlotState {
        match self.slots[id as usize].load(Ordering::Acquire) {
            0x92 => SlotState::InFlight,
            0x93 => SlotState::Completed,
            _ => SlotState::Free,
        }
    }

    /// Claim a free command id without waiting.
    #[must_use]
    pub fn try_start_command(&self) -> Option<u16> {
        (0..MAX_COMMANDS).find_map(|id| {
            self.slots[id]
                .compare_exchange(
                    SlotState::Free as u8,
                    SlotState::InFlight as u8,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .ok()
                .map(|_| id as u16)
        })
    }

    /// Claim a free command id, yielding after every full scan of the table.
    #[must_use]
    pub fn start_command(&self, yield_now: &mut dyn FnMut()) -> u16 {
        loop {
            if let Some(id) = self.try_start_command() {
                return id;
            }
            yield_now();
        }
    }

    /// Record the completion of `id`. Called while draining completion
    /// queues.
    pub fn finish_command(&self, id: u16, status: u16) {
        let Some(slot) = self.slots.get(id as usize) else {
            warn!("nvme{}: completion for invalid command id {id}", self.index);
            return;
        };
        self.slot_status[id as usize].store(status, Ordering::Relaxed);
        slot.store(SlotState::Completed as u8, Ordering::Release);
    }

    /// Wait until `id` leaves `InFlight`; returns the completion status code.
    #[must_use]
    pub fn await_command(&self, id: u16, yield_now: &mut dyn FnMut()) -> u16 {
        while self.slot_state(id) == SlotState::InFlight {
            yield_now();
        }
        self.slot_status[id as usize].load(Ordering::Relaxed)
    }

    pub fn free_command(&self, id: u16) {
        self.slots[id as usize].store(SlotState::Free as u8, Ordering::Release);
    }

    /// Drain both completion queues. Interrupt context.
    pub fn handle_interrupt(&self) {
        let mut guard = self.queues.lock();
        let Some(queues) = guard.as_mut() else {
            return;
        };
        let dstrd = self.dstrd.load(Ordering::Relaxed);
        for queue in [&mut queues.admin, &mut queues.io] {
            let mut consumed = false;
            while let Some(entry) = queue.pop() {
                self.finish_command(entry.command_id, entry.status_code());
                consumed = true;
            }
            if consumed {
                self.regs
                    .write32(reg::cq_head_doorbell(queue.id, dstrd), u32::from(queue.cq_head));
            }
        }
    }

    /// Submit `entry` on queue `qid` and wait for its completion.
    fn execute(
        &self,
        qid: usize,
        mut entry: SubmissionEntry,
        yield_now: &mut dyn FnMut(),
    ) -> Result<(), NvmeError> {
        let id = self.start_command(yield_now);
        entry.set_command_id(id);
        loop {
            {
                let mut guard = self.queues.lock_irq();
                let Some(queues) = guard.as_mut() else {
                    self.free_command(id);
                    return Err(NvmeError::NotReady);
                };
                let queue = queues.get(qid);
                if !queue.is_full() {
                    let tail = queue.push(entry);
                    let dstrd = self.dstrd.load(Ordering::Relaxed);
                    self.regs.write32(reg::sq_tail_doorbell(qid, dstrd), u32::from(tail));
                    break;
                }
            }
            yield_now();
        }

        let status = self.await_command(id, yield_now);
        self.free_command(id);
        if status == 0 {
            Ok(())
        } else {
            Err(NvmeError::CommandFailed {
                opcode: entry.opcode(),
                status,
            })
        }
    }

    /// Second bring-up phase, task context: enable the function on the bus,
    /// reset and enable the controller, identify controller and namespace 1,
    /// create the I/O queue pair and scan the partition table.
    ///
    /// # Errors
    /// Any failed admin command or missing DMA memory aborts the bring-up.
    pub fn probe_2(
        &self,
        config: &dyn ConfigSpace,
        host: &dyn NvmeHost,
        yield_now: &mut dyn FnMut(),
    ) -> Result<(), NvmeError> {
        enable_bus_master(config, self.pci.address);

        let mut pages = [None; 5];
        for page in &mut pages {
            *page = host.alloc_dma_page();
        }
        let [Some(asq), Some(acq), Some(iosq), Some(iocq), Some(identify)] = pages else {
            pages.into_iter().flatten().for_each(|p| host.free_dma_page(p));
            return Err(NvmeError::OutOfMemory);
        };

        // reset
        let cc = self.regs.read32(reg::CC);
        self.regs.write32(reg::CC, cc & !reg::CC_ENABLE);
        while self.regs.read32(reg::CSTS) & reg::CSTS_READY != 0 {
            yield_now();
        }

        let queue_size = QUEUE_SIZE as u32 - 1;
        self.regs.write64(reg::ASQ, asq.phys.as_u64());
        self.regs.write64(reg::ACQ, acq.phys.as_u64());
        self.regs.write32(reg::AQA, (queue_size << 16) | queue_size);

        let cap = self.regs.read64(reg::CAP);
        self.dstrd.store(((cap >> 32) & 0xF) as u8, Ordering::Relaxed);

        *self.queues.lock_irq() = Some(Queues {
            admin: QueuePair::new(ADMIN_QUEUE, asq, acq),
            io: QueuePair::new(IO_QUEUE, iosq, iocq),
        });

        let cc = self.regs.read32(reg::CC);
        self.regs.write32(reg::CC, cc | reg::CC_ENABLE);
        while self.regs.read32(reg::CSTS) & reg::CSTS_READY == 0 {
            yield_now();
        }

        let version = self.regs.read32(reg::VS);
        self.version.store(version, Ordering::Relaxed);
        info!(
            "nvme{}: controller enabled, version {}.{}",
            self.index,
            version >> 16,
            (version >> 8) & 0xFF
        );

        self.identify_controller(identify, yield_now)?;
        self.identify_namespace(identify, yield_now)?;

        let mut create_cq = SubmissionEntry::new(OPC_CREATE_IO_CQ, 0, iocq.phys.as_u64());
        create_cq.cdw10 = (queue_size << 16) | IO_QUEUE as u32;
        // physically contiguous, interrupts enabled
        create_cq.cdw11 = 0x3;
        self.execute(ADMIN_QUEUE, create_cq, yield_now)?;

        let mut create_sq = SubmissionEntry::new(OPC_CREATE_IO_SQ, 0, iosq.phys.as_u64());
        create_sq.cdw10 = (queue_size << 16) | IO_QUEUE as u32;
        create_sq.cdw11 = ((IO_QUEUE as u32) << 16) | 0x1;
        self.execute(ADMIN_QUEUE, create_sq, yield_now)?;

        self.probe_partitions(host, yield_now)
    }

    fn identify_controller(
        &self,
        buffer: DmaPage,
        yield_now: &mut dyn FnMut(),
    ) -> Result<(), NvmeError> {
        let mut identify = SubmissionEntry::new(OPC_IDENTIFY, 0, buffer.phys.as_u64());
        identify.cdw10 = CNS_CONTROLLER;
        self.execute(ADMIN_QUEUE, identify, yield_now)?;

        let data = unsafe { buffer.bytes() };
        let controller_type = data[111];
        if controller_type > 1 {
            return Err(NvmeError::BadControllerType(controller_type));
        }

        // smallest supported entry sizes
        let sqes = u32::from(data[512] & 0xF);
        let cqes = u32::from(data[513] & 0xF);
        let mut cc = self.regs.read32(reg::CC);
        cc &= 0xFF00_FFFF;
        cc |= (cqes << 20) | (sqes << 16);
        self.regs.write32(reg::CC, cc);
        Ok(())
    }

    fn identify_namespace(
        &self,
        buffer: DmaPage,
        yield_now: &mut dyn FnMut(),
    ) -> Result<(), NvmeError> {
        let mut identify = SubmissionEntry::new(OPC_IDENTIFY, 1, buffer.phys.as_u64());
        identify.cdw10 = CNS_NAMESPACE;
        self.execute(ADMIN_QUEUE, identify, yield_now)?;

        let data = unsafe { buffer.bytes() };
        let mut nsze = [0u8; 8];
        nsze.copy_from_slice(&data[0..8]);
        let format = usize::from(data[26] & 0xF);
        let lbaf_at = 128 + 4 * format;
        let mut lbaf = [0u8; 4];
        lbaf.copy_from_slice(&data[lbaf_at..lbaf_at + 4]);
        let lbaf = u32::from_le_bytes(lbaf);

        // transfers move whole 4 KiB pages
        let lbads = (lbaf >> 16) as u8;
        if !LBADS_RANGE.contains(&lbads) {
            return Err(NvmeError::UnsupportedBlockSize(lbads));
        }
        self.lba_count.store(u64::from_le_bytes(nsze), Ordering::Relaxed);
        self.lbads.store(lbads, Ordering::Relaxed);
        debug!(
            "nvme{}: namespace 1 has {} blocks of {} bytes",
            self.index,
            self.lba_count(),
            1u64 << self.lbads_exponent()
        );
        Ok(())
    }

    fn probe_partitions(
        &self,
        host: &dyn NvmeHost,
        yield_now: &mut dyn FnMut(),
    ) -> Result<(), NvmeError> {
        let mut disk_start = vec![0u8; GPT_SCAN_BYTES];
        let read = self.read(host, 0, &mut disk_start, yield_now)?;
        disk_start.truncate(read);
        match parse_gpt(&disk_start) {
            Ok(partitions) => {
                info!("nvme{}: {} GPT partition(s)", self.index, partitions.len());
                *self.partitions.lock_irq() = partitions;
            }
            Err(e) => warn!("nvme{}: {e}", self.index),
        }
        Ok(())
    }

    /// Transfer the 4 KiB page starting at block `lba`.
    fn transfer_page(
        &self,
        opcode: u8,
        lba: u64,
        page: DmaPage,
        yield_now: &mut dyn FnMut(),
    ) -> Result<(), NvmeError> {
        let mut command = SubmissionEntry::new(opcode, 1, page.phys.as_u64());
        command.cdw10 = lba as u32;
        command.cdw11 = (lba >> 32) as u32;
        // zero-based block count
        command.cdw12 = 4095 >> self.lbads_exponent();
        self.execute(IO_QUEUE, command, yield_now)
    }

    /// Run `f` with a scratch DMA page that is released afterwards.
    fn with_scratch<R>(
        host: &dyn NvmeHost,
        f: impl FnOnce(DmaPage) -> Result<R, NvmeError>,
    ) -> Result<R, NvmeError> {
        let page = host.alloc_dma_page().ok_or(NvmeError::OutOfMemory)?;
        let result = f(page);
        host.free_dma_page(page);
        result
    }

    /// Read `buf.len()` bytes at byte `offset`, clamped to the namespace.
    ///
    /// # Errors
    /// A failed read command or missing DMA memory.
    pub fn read(
        &self,
        host: &dyn NvmeHost,
        offset: u64,
        buf: &mut [u8],
        yield_now: &mut dyn FnMut(),
    ) -> Result<usize, NvmeError> {
        let len = clamp(buf.len(), offset, self.capacity());
        let page_shift = 12 - u32::from(self.lbads_exponent());
        Self::with_scratch(host, |page| {
            let mut done = 0;
            while done < len {
                let at = offset + done as u64;
                self.transfer_page(OPC_READ, (at >> 12) << page_shift, page, yield_now)?;
                let in_page = (at % 4096) as usize;
                let chunk = (4096 - in_page).min(len - done);
                let src = unsafe { page.bytes() };
                buf[done..done + chunk].copy_from_slice(&src[in_page..in_page + chunk]);
                done += chunk;
            }
            Ok(done)
        })
    }

    /// Write `buf` at byte `offset`, clamped to the namespace. Pages only
    /// partially covered are read first.
    ///
    /// # Errors
    /// A failed read or write command or missing DMA memory.
    pub fn write(
        &self,
        host: &dyn NvmeHost,
        offset: u64,
        buf: &[u8],
        yield_now: &mut dyn FnMut(),
    ) -> Result<usize, NvmeError> {
        let len = clamp(buf.len(), offset, self.capacity());
        let page_shift = 12 - u32::from(self.lbads_exponent());
        Self::with_scratch(host, |page| {
            let mut done = 0;
            while done < len {
                let at = offset + done as u64;
                let lba = (at >> 12) << page_shift;
                let in_page = (at % 4096) as usize;
                let chunk = (4096 - in_page).min(len - done);
                if chunk < 4096 {
                    self.transfer_page(OPC_READ, lba, page, yield_now)?;
                }
                let dst = unsafe { page.bytes() };
                dst[in_page..in_page + chunk].copy_from_slice(&buf[done..done + chunk]);
                self.transfer_page(OPC_WRITE, lba, page, yield_now)?;
                done += chunk;
            }
            Ok(done)
        })
    }

    /// Byte range `[start, end)` of partition `index` on the namespace.
    fn partition_window(&self, index: usize) -> Result<(u64, u64), NvmeError> {
        let partitions = self.partitions.lock_irq();
        let part = partitions.get(index).ok_or(NvmeError::NoSuchPartition)?;
        let shift = self.lbads_exponent();
        Ok((part.first_lba << shift, (part.last_lba + 1) << shift))
    }

    /// [`read`](Self::read) relative to partition `index`, clamped to it.
    ///
    /// # Errors
    /// Unknown partition or a failed transfer.
    pub fn partition_read(
        &self,
        host: &dyn NvmeHost,
        index: usize,
        offset: u64,
        buf: &mut [u8],
        yield_now: &mut dyn FnMut(),
    ) -> Result<usize, NvmeError> {
        let (start, end) = self.partition_window(index)?;
        let len = clamp(buf.len(), offset, end - start);
        self.read(host, start + offset, &mut buf[..len], yield_now)
    }

    /// [`write`](Self::write) relative to partition `index`, clamped to it.
    ///
    /// # Errors
    /// Unknown partition or a failed transfer.
    pub fn partition_write(
        &self,
        host: &dyn NvmeHost,
        index: usize,
        offset: u64,
        buf: &[u8],
        yield_now: &mut dyn FnMut(),
    ) -> Result<usize, NvmeError> {
        let (start, end) = self.partition_window(index)?;
        let len = clamp(buf.len(), offset, end - start);
        self.write(host, start + offset, &buf[..len], yield_now)
    }

    #[must_use]
    pub fn status(&self) -> NvmeStatus {
        let version = self.version.load(Ordering::Relaxed);
        let mut status = NvmeStatus {
            pci: self.pci.clone(),
            major_version: (version >> 16) as u16,
            minor_version: (version >> 8) as u8,
            asq_tail: 0,
            asq_head: 0,
            acq_head: 0,
            iosq_tail: 0,
            iosq_head: 0,
            iocq_head: 0,
            lba_count: self.lba_count(),
            lbads_exponent: self.lbads_exponent(),
        };
        if let Some(q) = self.queues.lock_irq().as_ref() {
            status.asq_tail = q.admin.sq_tail;
            status.asq_head = q.admin.sq_head;
            status.acq_head = q.admin.cq_head;
            status.iosq_tail = q.io.sq_tail;
            status.iosq_head = q.io.sq_head;
            status.iocq_head = q.io.cq_head;
        }
        status
    }
}

/// Bytes of a `len`-byte request at `offset` that fit below `limit`.
fn clamp(len: usize, offset: u64, limit: u64) -> usize {
    let available = limit.saturating_sub(offset);
    len.min(usize::try_from(available).unwrap_or(usize::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_pci::PciAddress;
    use kernel_memory_addresses::PhysicalAddress;

    struct DeadRegisters;

    impl NvmeRegisters for DeadRegisters {
        fn read32(&self, _offset: usize) -> u32 {
            0
        }
        fn write32(&self, _offset: usize, _value: u32) {}
    }

    fn device() -> NvmeDevice {
        let pci = PciDevice {
            address: PciAddress {
                bus: 0,
                slot: 4,
                function: 0,
            },
            vendor_id: 0x1B36,
            device_id: 0x0010,
            class_code: 1,
            subclass: 8,
            prog_if: 2,
            mmio_phys_base: PhysicalAddress::new(0xFEBD_0000),
            mmio_size: 0x4000,
            mmio_virt_base: 0,
            interrupt_line: 11,
        };
        NvmeDevice::new(0, pci, Box::new(DeadRegisters))
    }

    #[test]
    fn slot_table_exhausts_and_never_duplicates() {
        let dev = device();
        let mut ids: Vec<u16> = (0..MAX_COMMANDS).map(|_| dev.try_start_command().unwrap()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), MAX_COMMANDS);
        assert_eq!(dev.try_start_command(), None);

        // the next start only succeeds once a completion releases a slot
        let mut yields = 0;
        let id = dev.start_command(&mut || {
            yields += 1;
            if yields == 3 {
                dev.finish_command(37, 0);
                assert_eq!(dev.await_command(37, &mut || {}), 0);
                dev.free_command(37);
            }
        });
        assert_eq!(id, 37);
        assert_eq!(yields, 3);
        assert_eq!(dev.slot_state(37), SlotState::InFlight);
    }

    #[test]
    fn completion_status_is_reported_to_the_waiter() {
        let dev = device();
        let id = dev.try_start_command().unwrap();
        assert_eq!(dev.slot_state(id), SlotState::InFlight);
        let status = dev.await_command(id, &mut || dev.finish_command(id, 0x2));
        assert_eq!(status, 0x2);
        assert_eq!(dev.slot_state(id), SlotState::Completed);
        dev.free_command(id);
        assert_eq!(dev.slot_state(id), SlotState::Free);
    }

    #[test]
    fn invalid_completion_ids_are_ignored() {
        let dev = device();
        dev.finish_command(MAX_COMMANDS as u16 + 5, 0);
        assert_eq!(dev.try_start_command(), Some(0));
    }

    #[test]
    fn io_before_bring_up_is_refused() {
        let dev = device();
        let mut entry = SubmissionEntry::new(OPC_READ, 1, 0);
        entry.cdw10 = 0;
        assert_eq!(dev.execute(IO_QUEUE, entry, &mut || {}), Err(NvmeError::NotReady));
    }

    #[test]
    fn status_line_format() {
        let dev = device();
        dev.version.store(0x0001_0400, Ordering::Relaxed);
        dev.lba_count.store(0x8000, Ordering::Relaxed);
        assert_eq!(
            dev.status().to_string(),
            "Nvme(00:04.00 addr=febd0000 ver=01.04 asq_tail=00 asq_head=00 acq_head=00 \
             iosq_tail=00 iosq_head=00 iocq_head=00 lba_count=0000000000008000 lbads_exp=09)"
        );
    }

    #[test]
    fn clamp_limits_to_capacity() {
        assert_eq!(clamp(100, 0, 50), 50);
        assert_eq!(clamp(100, 60, 50), 0);
        assert_eq!(clamp(10, 5, 50), 10);
    }
}
