//! Task creation and teardown: kernel stacks, `fork`, `exec`, `waitpid`,
//! `exit`, `kill` and `brk`.

use crate::elf::{self, ElfImage};
use crate::task::{MemoryRange, RangeKind};
use crate::{CALLEE_SAVED_SLOTS, ExecError, Kernel, Pid, Task, TaskError, TaskState, TrapFrame};
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use kernel_info::memory::{KERNEL_STACK_PAGES, KERNEL_STACK_SIZE, USER_STACK_TOP};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, Size4K, VirtualAddress};
use kernel_mm::paging::{PAGE_FLAGS, TABLE_FLAGS, free_userspace, map_page, new_address_space, translate};
use kernel_vfs::{FileTable, OpenFile, Resolved};
use log::{debug, error, info, warn};
use stdlib::syscall_abi::KILLED_EXIT_CODE;

/// What a new task runs first when it is switched to.
#[derive(Debug, Copy, Clone)]
enum StackImage {
    /// Return to user mode through the user-return trampoline.
    User(TrapFrame),
    /// Call a kernel function through the kernel-task trampoline.
    Kernel(u64),
}

/// An argument block ready to be copied to the top of a user stack.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct StagedArgs {
    /// Lowest address of the block; the initial user `rsp`.
    pub base: u64,
    /// Address of the NULL-terminated pointer array.
    pub argv: u64,
    pub argc: u64,
    pub bytes: Vec<u8>,
}

/// Lay out `args` for a stack ending at `top`.
///
/// From the top down: the pointer array (`argc + 1` entries, the last
/// NULL), the NUL-terminated strings, padding to 8 bytes and one slot
/// holding the address of the pointer array. The whole block has to fit
/// one page.
pub(crate) fn stage_args(args: &[String], top: u64) -> Result<StagedArgs, ExecError> {
    let array_len = (args.len() as u64 + 1) * 8;
    let strings_len: u64 = args.iter().map(|a| a.len() as u64 + 1).sum();
    if array_len + strings_len + 16 > PAGE_SIZE {
        return Err(ExecError::ArgumentsTooLong);
    }
    let base = ((top - array_len - strings_len) & !7) - 8;
    let argv = top - array_len;

    let mut bytes = vec![0u8; (top - base) as usize];
    let at = |addr: u64| (addr - base) as usize;
    let mut cursor = argv;
    for (i, arg) in args.iter().enumerate() {
        cursor -= arg.len() as u64 + 1;
        bytes[at(cursor)..at(cursor) + arg.len()].copy_from_slice(arg.as_bytes());
        let slot = at(argv) + i * 8;
        bytes[slot..slot + 8].copy_from_slice(&cursor.to_le_bytes());
    }
    bytes[..8].copy_from_slice(&argv.to_le_bytes());

    Ok(StagedArgs {
        base,
        argv,
        argc: args.len() as u64,
        bytes,
    })
}

impl Kernel {
    /// The frame backing `va`, allocating and zeroing one if the page is
    /// not mapped yet. An existing mapping is kept as is.
    pub(crate) fn map_user_page(
        &self,
        root: PhysicalAddress,
        va: VirtualAddress,
    ) -> Result<PhysicalAddress, TaskError> {
        let va = va.align_down::<Size4K>();
        if let Some(pa) = translate(self.mapper, root, va) {
            return Ok(pa);
        }
        let mut frames = self.frames.lock_irq();
        let pa = frames.try_alloc(1)?;
        self.mapper.zero_page(pa);
        if let Err(e) = map_page::<Size4K>(self.mapper, &mut *frames, root, va, pa, TABLE_FLAGS, PAGE_FLAGS) {
            frames.free(pa, 1);
            return Err(e.into());
        }
        Ok(pa)
    }

    pub(crate) fn map_user_range(&self, root: PhysicalAddress, range: &MemoryRange) -> Result<(), TaskError> {
        for page in range.pages() {
            self.map_user_page(root, page)?;
        }
        Ok(())
    }

    fn new_user_root(&self) -> Result<PhysicalAddress, TaskError> {
        let mut frames = self.frames.lock_irq();
        Ok(new_address_space(self.mapper, &mut *frames, self.platform.kernel_root())?)
    }

    /// Free a user address space including its PML4.
    fn release_address_space(&self, root: PhysicalAddress) {
        if root == self.platform.kernel_root() {
            return;
        }
        let mut frames = self.frames.lock_irq();
        free_userspace(self.mapper, &mut frames, root);
        frames.free(root, 1);
    }

    /// Build the initial kernel stack image below `top` and return the
    /// stack pointer [`Platform::switch`](crate::Platform::switch) resumes
    /// from.
    ///
    /// # Safety
    /// `top` must be the end of a writable kernel stack.
    #[allow(clippy::cast_ptr_alignment)]
    unsafe fn prepare_stack(&self, top: *mut u8, image: StackImage) -> u64 {
        unsafe fn push(sp: &mut *mut u64, value: u64) {
            unsafe {
                *sp = sp.sub(1);
                sp.write(value);
            }
        }

        unsafe {
            let mut sp = top.cast::<u64>();
            match image {
                StackImage::User(frame) => {
                    let frame_at = top.sub(TrapFrame::SIZE as usize).cast::<TrapFrame>();
                    frame_at.write(frame);
                    sp = frame_at.cast::<u64>();
                    push(&mut sp, self.platform.user_return_trampoline());
                }
                StackImage::Kernel(entry) => {
                    push(&mut sp, entry);
                    push(&mut sp, self.platform.kernel_task_trampoline());
                }
            }
            for _ in 0..CALLEE_SAVED_SLOTS {
                push(&mut sp, 0);
            }
            sp as u64
        }
    }

    fn spawn(
        &self,
        name: String,
        root: PhysicalAddress,
        ranges: Vec<MemoryRange>,
        files: FileTable,
        image: StackImage,
    ) -> Result<Pid, TaskError> {
        let kernel_stack = self.frames.lock_irq().try_alloc(KERNEL_STACK_PAGES)?;
        let base = self.mapper.phys_to_ptr(kernel_stack);
        let top = unsafe { base.add(KERNEL_STACK_SIZE) };
        let kernel_rsp = unsafe { self.prepare_stack(top, image) };

        let mut task = Task {
            pid: 0,
            name,
            state: TaskState::Running,
            exit_code: 0,
            kernel_rsp,
            kernel_stack,
            kernel_entry_rsp: top as u64,
            root,
            ranges,
            files,
        };
        let mut sched = self.sched.lock_irq();
        task.pid = sched.allocate_pid();
        let pid = task.pid;
        debug!("spawned pid {pid} ({})", task.name);
        sched.insert(task);
        Ok(pid)
    }

    /// Read a whole regular file.
    pub(crate) fn read_file(&self, path: &str) -> Result<Vec<u8>, ExecError> {
        let mut vfs = self.lock_vfs();
        let inode = match vfs.resolve(path, self)? {
            Resolved::Exists { inode, .. } => inode,
            Resolved::DoesntExist { .. } => return Err(ExecError::NotFound),
        };
        let len = vfs
            .inode(inode)
            .and_then(kernel_vfs::Inode::len)
            .ok_or(ExecError::NotAFile)?;

        let mut bytes = vec![0u8; len as usize];
        let mut file = OpenFile::new(inode);
        let mut filled = 0;
        while filled < bytes.len() {
            let n = vfs.read(&mut file, &mut bytes[filled..], self, self)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        bytes.truncate(filled);
        Ok(bytes)
    }

    /// Map `image` into a fresh address space, releasing it on failure.
    fn build_address_space(
        &self,
        image: &ElfImage<'_>,
        args: &StagedArgs,
    ) -> Result<(PhysicalAddress, Vec<MemoryRange>), ExecError> {
        let root = self.new_user_root()?;
        let mut ranges = Vec::new();
        let loaded = self
            .load_image(root, image, &mut ranges)
            .map_err(ExecError::from)
            .and_then(|_| Ok(self.copy_to_user(root, args.base, &args.bytes)?));
        match loaded {
            Ok(()) => Ok((root, ranges)),
            Err(e) => {
                self.release_address_space(root);
                Err(e)
            }
        }
    }

    /// Create the first user task from the executable at `path`, with
    /// `/dev/tty1` open as descriptors 0, 1 and 2.
    ///
    /// # Errors
    /// The file is missing or not a loadable executable, or memory ran
    /// out.
    pub fn spawn_init(&self, path: &str) -> Result<Pid, ExecError> {
        let bytes = self.read_file(path)?;
        let image = elf::parse(&bytes)?;
        let args = stage_args(&[], USER_STACK_TOP)?;
        let (root, ranges) = self.build_address_space(&image, &args)?;

        let mut files = FileTable::new();
        match self.lock_vfs().resolve("/dev/tty1", self) {
            Ok(Resolved::Exists { inode, .. }) => {
                for _ in 0..3 {
                    files.open(inode);
                }
            }
            _ => warn!("/dev/tty1 missing, init starts without standard streams"),
        }

        let mut frame = TrapFrame::user(image.entry().as_u64(), args.base);
        frame.rdi = args.argc;
        frame.rsi = args.argv;
        let pid = self.spawn(String::from("init"), root, ranges, files, StackImage::User(frame))?;
        info!("init is pid {pid}");
        Ok(pid)
    }

    /// Create a task that runs `entry` in kernel mode on the kernel page
    /// tables.
    ///
    /// # Errors
    /// No frames left for the kernel stack.
    pub fn spawn_kernel_task(&self, name: &str, entry: u64) -> Result<Pid, TaskError> {
        self.spawn(
            name.to_string(),
            self.platform.kernel_root(),
            Vec::new(),
            FileTable::new(),
            StackImage::Kernel(entry),
        )
    }

    /// Duplicate the current task. The child resumes from `frame` with
    /// `rax = 0`.
    pub(crate) fn fork(&self, frame: &TrapFrame) -> Result<Pid, TaskError> {
        let (name, parent_root, ranges, files) = {
            let sched = self.sched.lock_irq();
            let parent = sched.current().ok_or(TaskError::OutOfMemory)?;
            (parent.name.clone(), parent.root, parent.ranges.clone(), parent.files.clone())
        };

        let root = self.new_user_root()?;
        if let Err(e) = self.copy_ranges(parent_root, root, &ranges) {
            self.release_address_space(root);
            return Err(e);
        }

        let mut child_frame = *frame;
        child_frame.rax = 0;
        self.spawn(name, root, ranges, files, StackImage::User(child_frame))
            .inspect_err(|_| self.release_address_space(root))
    }

    fn copy_ranges(
        &self,
        from: PhysicalAddress,
        to: PhysicalAddress,
        ranges: &[MemoryRange],
    ) -> Result<(), TaskError> {
        for range in ranges {
            for page in range.pages() {
                let dst = self.map_user_page(to, page)?;
                if let Some(src) = translate(self.mapper, from, page) {
                    self.mapper.copy_page(dst, src);
                }
            }
        }
        Ok(())
    }

    /// Replace the current program. On success `frame` enters the new
    /// image with `rdi = argc` and `rsi = argv`.
    ///
    /// The executable is read and validated before the old image is
    /// dropped, so a bad path or file leaves the caller running.
    pub(crate) fn exec(&self, frame: &mut TrapFrame, path: &str, args: &[String]) -> Result<(), ExecError> {
        let bytes = self.read_file(path)?;
        let image = elf::parse(&bytes)?;
        let staged = stage_args(args, USER_STACK_TOP)?;

        let root = {
            let mut sched = self.sched.lock_irq();
            let task = sched.current_mut().ok_or(ExecError::NotFound)?;
            task.ranges.clear();
            task.name = path.to_string();
            task.root
        };
        {
            let mut frames = self.frames.lock_irq();
            free_userspace(self.mapper, &mut frames, root);
        }
        self.platform.flush_tlb();

        let mut ranges = Vec::new();
        let loaded = self.load_image(root, &image, &mut ranges);
        if let Some(task) = self.sched.lock_irq().current_mut() {
            task.ranges = ranges;
        }
        let loaded = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("exec {path}: {e}; old image is gone, terminating");
                self.exit_current(KILLED_EXIT_CODE);
                return Err(e.into());
            }
        };
        self.copy_to_user(root, staged.base, &staged.bytes)?;

        *frame = TrapFrame::user(loaded.entry.as_u64(), staged.base);
        frame.rdi = staged.argc;
        frame.rsi = staged.argv;
        debug!("exec {path}: entry {:?}", loaded.entry);
        Ok(())
    }

    /// Grow the heap to cover `addr` and return its new end; `addr = 0`
    /// queries the end. Returns 0 if the task has no heap.
    pub(crate) fn brk(&self, addr: u64) -> u64 {
        let mut sched = self.sched.lock_irq();
        let Some(task) = sched.current_mut() else {
            return 0;
        };
        let root = task.root;
        let Some(heap) = task.heap_mut() else {
            warn!("brk: no heap range");
            return 0;
        };
        if addr == 0 {
            return heap.end.as_u64();
        }
        while heap.end.as_u64() < addr {
            if self.map_user_page(root, heap.end).is_err() {
                warn!("brk: out of memory at {:?}", heap.end);
                break;
            }
            heap.end += PAGE_SIZE;
        }
        heap.end.as_u64()
    }

    /// Wait for `pid` to become a zombie, reap it and return its exit code.
    /// `None` if no such task exists.
    pub(crate) fn waitpid(&self, pid: Pid) -> Option<u8> {
        let code = loop {
            match self.task_status(pid)? {
                (TaskState::Zombie, code) => break code,
                _ => self.yield_now(),
            }
        };
        let task = self.sched.lock_irq().remove(pid)?;
        self.free_task(&task);
        Some(code)
    }

    fn free_task(&self, task: &Task) {
        self.release_address_space(task.root);
        self.frames.lock_irq().free(task.kernel_stack, KERNEL_STACK_PAGES);
        debug!("reaped pid {}", task.pid);
    }

    /// Turn the current task into a zombie and leave it for good.
    pub(crate) fn exit_current(&self, code: u8) {
        if let Some(task) = self.sched.lock_irq().current_mut() {
            task.terminate(code);
        }
        self.yield_now();
    }

    /// Terminate `pid` with [`KILLED_EXIT_CODE`]. `false` if there is no
    /// such task.
    pub(crate) fn kill(&self, pid: Pid) -> bool {
        match self.sched.lock_irq().get_mut(pid) {
            Some(task) => task.terminate(KILLED_EXIT_CODE),
            None => return false,
        }
        self.yield_now();
        true
    }

    /// User ranges of the current task, for diagnostics.
    #[must_use]
    pub fn current_ranges(&self) -> Vec<MemoryRange> {
        self.sched
            .lock_irq()
            .current()
            .map(|t| t.ranges.clone())
            .unwrap_or_default()
    }

    /// End of the heap range of `pid`.
    #[must_use]
    pub fn heap_end(&self, pid: Pid) -> Option<VirtualAddress> {
        let sched = self.sched.lock_irq();
        sched
            .get(pid)?
            .ranges
            .iter()
            .find(|r| r.kind == RangeKind::Heap)
            .map(|r| r.end)
    }
}
