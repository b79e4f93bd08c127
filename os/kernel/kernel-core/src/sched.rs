//! Task list and the round-robin `yield`.

use crate::{Kernel, Pid, Task, TaskState};
use alloc::boxed::Box;
use alloc::vec::Vec;
use log::trace;

/// All tasks in creation order, and which one owns the CPU.
///
/// Tasks are boxed so the address of a task's saved stack pointer stays
/// put while the list grows or shrinks around it.
#[derive(Debug)]
pub struct Scheduler {
    tasks: Vec<Box<Task>>,
    current: Option<Pid>,
    next_pid: Pid,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tasks: Vec::new(),
            current: None,
            next_pid: 1,
        }
    }

    pub(crate) const fn allocate_pid(&mut self) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }

    pub(crate) fn insert(&mut self, task: Task) {
        self.tasks.push(Box::new(task));
    }

    pub(crate) fn remove(&mut self, pid: Pid) -> Option<Box<Task>> {
        let index = self.tasks.iter().position(|t| t.pid == pid)?;
        Some(self.tasks.remove(index))
    }

    #[must_use]
    pub const fn current_pid(&self) -> Option<Pid> {
        self.current
    }

    pub(crate) const fn set_current(&mut self, pid: Pid) {
        self.current = Some(pid);
    }

    #[must_use]
    pub fn get(&self, pid: Pid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.pid == pid).map(AsRef::as_ref)
    }

    pub(crate) fn get_mut(&mut self, pid: Pid) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.pid == pid).map(AsMut::as_mut)
    }

    #[must_use]
    pub fn current(&self) -> Option<&Task> {
        self.get(self.current?)
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut Task> {
        let pid = self.current?;
        self.get_mut(pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().map(AsRef::as_ref)
    }

    /// The first `Running` task after the current one, wrapping around.
    /// The current task itself is never returned.
    #[must_use]
    pub fn next_runnable(&self) -> Option<Pid> {
        let len = self.tasks.len();
        let Some(current) = self.current else {
            return self.tasks.iter().find(|t| t.state == TaskState::Running).map(|t| t.pid);
        };
        let start = self.tasks.iter().position(|t| t.pid == current)?;
        (1..len)
            .map(|step| &self.tasks[(start + step) % len])
            .find(|t| t.state == TaskState::Running)
            .map(|t| t.pid)
    }
}

impl Kernel {
    /// Give the CPU to the next runnable task.
    ///
    /// When no other task can run, the CPU halts until an interrupt and
    /// the search starts over; the call returns once the caller is
    /// `Running` again. A task that has turned itself into a zombie never
    /// returns from here.
    pub fn yield_now(&self) {
        loop {
            let next = self.sched.lock_irq().next_runnable();
            if let Some(pid) = next {
                self.switch_to(pid);
                return;
            }
            self.platform.halt_until_interrupt();
            if self.current_state() == Some(TaskState::Running) {
                return;
            }
        }
    }

    fn current_state(&self) -> Option<TaskState> {
        self.sched.lock_irq().current().map(Task::state)
    }

    /// Save the running task's stack pointer and resume `pid`.
    fn switch_to(&self, pid: Pid) {
        let (save, load, root, rsp0) = {
            let mut sched = self.sched.lock_irq();
            let save = sched
                .current_mut()
                .map_or(core::ptr::null_mut(), |t| &raw mut t.kernel_rsp);
            let Some(next) = sched.get(pid) else {
                return;
            };
            let target = (next.kernel_rsp, next.root, next.kernel_entry_rsp);
            sched.set_current(pid);
            (save, target.0, target.1, target.2)
        };
        trace!("switch to pid {pid}");

        let mut discarded = 0u64;
        let save = if save.is_null() { &raw mut discarded } else { save };
        self.platform.set_kernel_stack(rsp0);
        self.platform.load_address_space(root);
        unsafe { self.platform.switch(save, load) };
    }

    /// Leave the boot context for good and run `pid`.
    ///
    /// On hardware this does not return; the boot stack is abandoned.
    pub fn enter(&self, pid: Pid) {
        self.switch_to(pid);
    }

    #[must_use]
    pub fn current_pid(&self) -> Option<Pid> {
        self.sched.lock_irq().current_pid()
    }

    /// `(state, exit code)` of `pid`.
    #[must_use]
    pub fn task_status(&self, pid: Pid) -> Option<(TaskState, u8)> {
        self.sched.lock_irq().get(pid).map(|t| (t.state, t.exit_code))
    }

    /// Run `f` on the scheduler state.
    pub fn with_scheduler<R>(&self, f: impl FnOnce(&Scheduler) -> R) -> R {
        f(&self.sched.lock_irq())
    }
}
