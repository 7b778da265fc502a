// src/kernel/task/scheduler.rs
//! Round-robin, single-CPU, cooperatively-preemptive scheduler (spec §4.4).

use super::pid::{Pid, PID_POOL};
use super::tcb::{Descriptor, TaskSlot, TaskStatus, Tcb, MAX_TASKS};
use crate::arch::x86::context::{seed_stack, switch_stack};
use crate::arch::{ArchCpu, Cpu};
use crate::errors::{KernelError, TaskError};
use crate::kernel::list::{Handle, List, ListLinks, NodeStore};
use lazy_static::lazy_static;
use spin::{Mutex, MutexGuard};

pub struct TaskTable {
    slots: alloc::boxed::Box<[TaskSlot; MAX_TASKS]>,
    used: [bool; MAX_TASKS],
}

impl TaskTable {
    fn new() -> Self {
        Self { slots: alloc::boxed::Box::new(core::array::from_fn(|_| TaskSlot::empty())), used: [false; MAX_TASKS] }
    }

    fn alloc_slot(&mut self) -> Result<Handle, KernelError> {
        let index = self.used.iter().position(|&u| !u).ok_or(KernelError::Task(TaskError::PidExhausted))?;
        self.used[index] = true;
        self.slots[index] = TaskSlot::empty();
        Ok(Handle::from_index(index as u32))
    }

    fn free_slot(&mut self, handle: Handle) {
        self.used[handle.index() as usize] = false;
    }

    #[must_use]
    pub fn tcb(&self, handle: Handle) -> &Tcb {
        &self.slots[handle.index() as usize].tcb
    }

    #[must_use]
    pub fn tcb_mut(&mut self, handle: Handle) -> &mut Tcb {
        &mut self.slots[handle.index() as usize].tcb
    }

    #[must_use]
    pub fn stack_top(&self, handle: Handle) -> u32 {
        self.slots[handle.index() as usize].stack_top()
    }

    #[must_use]
    pub fn find_by_pid(&self, pid: Pid) -> Option<Handle> {
        (0..MAX_TASKS).filter(|&i| self.used[i]).map(|i| Handle::from_index(i as u32)).find(|&h| self.tcb(h).pid == Some(pid))
    }
}

struct ReadyView<'a>(&'a mut TaskTable);

impl NodeStore for ReadyView<'_> {
    fn links(&self, handle: Handle) -> &ListLinks {
        &self.0.tcb(handle).ready_links
    }
    fn links_mut(&mut self, handle: Handle) -> &mut ListLinks {
        &mut self.0.tcb_mut(handle).ready_links
    }
}

struct AllView<'a>(&'a mut TaskTable);

impl NodeStore for AllView<'_> {
    fn links(&self, handle: Handle) -> &ListLinks {
        &self.0.tcb(handle).all_links
    }
    fn links_mut(&mut self, handle: Handle) -> &mut ListLinks {
        &mut self.0.tcb_mut(handle).all_links
    }
}

pub struct Scheduler {
    pub tasks: TaskTable,
    ready_list: List,
    all_list: List,
    current: Option<Handle>,
    idle: Option<Handle>,
    started: bool,
}

impl Scheduler {
    fn new() -> Self {
        Self { tasks: TaskTable::new(), ready_list: List::new(), all_list: List::new(), current: None, idle: None, started: false }
    }

    #[must_use]
    pub fn current_handle(&self) -> Option<Handle> {
        self.current
    }

    pub fn for_each_task(&self, mut f: impl FnMut(&Tcb)) {
        self.all_list.for_each(&AllViewRef(&self.tasks), |h| {
            f(self.tasks.tcb(h));
        });
    }

    /// Allocate a slot and a PID for a not-yet-runnable task (`fork`'s
    /// child, `exec`'s new image) without touching the ready list — the
    /// caller finishes populating the TCB and calls [`Scheduler::make_ready`]
    /// once it is safe to run.
    pub fn new_task_slot(&mut self) -> Result<(Handle, Pid), KernelError> {
        let handle = self.tasks.alloc_slot()?;
        let pid = PID_POOL.lock().alloc().inspect_err(|_| self.tasks.free_slot(handle))?;
        self.all_list.append(&mut AllView(&mut self.tasks), handle);
        Ok((handle, pid))
    }

    /// Put `handle` on the ready list, marking it READY (spec §4.5:
    /// `fork`'s child "is appended to the ready list").
    pub fn make_ready(&mut self, handle: Handle) {
        self.tasks.tcb_mut(handle).status = TaskStatus::Ready;
        self.ready_list.append(&mut ReadyView(&mut self.tasks), handle);
    }

    /// Wake `handle` with ready-list priority, same placement as
    /// [`thread_unblock`].
    pub fn wake(&mut self, handle: Handle) {
        self.tasks.tcb_mut(handle).status = TaskStatus::Ready;
        self.ready_list.push_front(&mut ReadyView(&mut self.tasks), handle);
    }

    /// Remove `handle` from bookkeeping entirely once its parent has
    /// collected its exit status (spec §4.5's `wait`: the zombie's slot and
    /// PID are only released at that point, not at `exit`).
    pub fn reap(&mut self, handle: Handle) {
        self.all_list.remove(&mut AllView(&mut self.tasks), handle);
        if let Some(pid) = self.tasks.tcb(handle).pid {
            PID_POOL.lock().free(pid);
        }
        self.tasks.tcb_mut(handle).user_heap = Mutex::new(crate::kernel::mm::FreeLists::new());
        self.tasks.free_slot(handle);
    }

    /// First child of `parent` found in HANGING state, if any (spec §4.5's
    /// `wait`: "find any child in HANGING state").
    #[must_use]
    pub fn find_hanging_child(&self, parent: Pid) -> Option<Handle> {
        let mut found = None;
        self.all_list.for_each(&AllViewRef(&self.tasks), |h| {
            if found.is_none() {
                let tcb = self.tasks.tcb(h);
                if tcb.parent_pid == Some(parent) && tcb.status == TaskStatus::Hanging {
                    found = Some(h);
                }
            }
        });
        found
    }

    /// Whether `parent` has any live descendant at all (spec §4.5's `wait`:
    /// "else if the task has at least one child, block self as WAITING").
    #[must_use]
    pub fn has_any_child(&self, parent: Pid) -> bool {
        let mut any = false;
        self.all_list.for_each(&AllViewRef(&self.tasks), |h| {
            if self.tasks.tcb(h).parent_pid == Some(parent) {
                any = true;
            }
        });
        any
    }

    /// Reassign every live task whose `parent_pid` is `old` to `new` (spec
    /// §4.5's `exit`: "reparent every descendant to `init`").
    pub fn reparent(&mut self, old: Pid, new: Pid) {
        let targets: alloc::vec::Vec<Handle> = {
            let mut found = alloc::vec::Vec::new();
            self.all_list.for_each(&AllViewRef(&self.tasks), |h| {
                if self.tasks.tcb(h).parent_pid == Some(old) {
                    found.push(h);
                }
            });
            found
        };
        for h in targets {
            self.tasks.tcb_mut(h).parent_pid = Some(new);
        }
    }
}

/// Read-only traversal view over `all_list`'s hooks, for callers (`ps`,
/// `wait`'s child scan) that only need to walk the list, not mutate it.
struct AllViewRef<'a>(&'a TaskTable);

impl NodeStore for AllViewRef<'_> {
    fn links(&self, handle: Handle) -> &ListLinks {
        &self.0.tcb(handle).all_links
    }
    fn links_mut(&mut self, _handle: Handle) -> &mut ListLinks {
        unreachable!("read-only view")
    }
}

lazy_static! {
    static ref SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());
}

#[must_use]
pub fn lock() -> MutexGuard<'static, Scheduler> {
    SCHEDULER.lock()
}

extern "C" fn kernel_thread_trampoline() -> ! {
    ArchCpu::enable_interrupts();
    let entry = {
        let sched = SCHEDULER.lock();
        let handle = sched.current.expect("trampoline run without a current task");
        sched.tasks.tcb(handle).entry.expect("kernel thread started with no entry point")
    };
    entry();
}

/// Build a brand-new, READY task around `entry` (spec §4.5's `init_task`,
/// specialized to kernel threads — user tasks are born via `fork`/`exec`
/// in `kernel::process`).
pub fn spawn_kernel_thread(name: &str, priority: u32, entry: extern "C" fn() -> !) -> Result<Pid, KernelError> {
    let mut sched = lock();
    let handle = sched.tasks.alloc_slot()?;
    let pid = PID_POOL.lock().alloc()?;
    let stack_top = sched.tasks.stack_top(handle);

    let tcb = sched.tasks.tcb_mut(handle);
    tcb.pid = Some(pid);
    tcb.parent_pid = None;
    tcb.status = TaskStatus::Ready;
    tcb.set_name(name);
    tcb.priority = priority;
    tcb.ticks = priority;
    tcb.entry = Some(entry);
    tcb.fd_table[0] = Descriptor::Stdio(0);
    tcb.fd_table[1] = Descriptor::Stdio(1);
    tcb.fd_table[2] = Descriptor::Stdio(2);
    tcb.cwd_inode = 0;
    tcb.kernel_stack_ptr = seed_stack(stack_top, kernel_thread_trampoline);

    sched.all_list.append(&mut AllView(&mut sched.tasks), handle);
    sched.ready_list.append(&mut ReadyView(&mut sched.tasks), handle);
    Ok(pid)
}

/// The idle task (spec §4.4): blocks itself immediately, woken only when
/// `schedule` finds the ready list empty, then halts with interrupts
/// enabled until the next tick.
extern "C" fn idle_entry() -> ! {
    loop {
        thread_block(TaskStatus::Blocked);
        ArchCpu::halt();
    }
}

/// Bring up the scheduler: register the calling context as the first
/// task (conventionally `init`, spec §4.5's boot order — "IDT, memory,
/// threads, ...") and spawn the idle task.
pub fn init(init_pid_name: &str) -> Result<(), KernelError> {
    let boot_pid = spawn_kernel_thread(init_pid_name, 31, boot_return_trampoline)?;
    let idle_pid = spawn_kernel_thread("idle", 1, idle_entry)?;
    let mut sched = lock();
    let boot_handle = sched.tasks.find_by_pid(boot_pid).expect("just spawned");
    let idle_handle = sched.tasks.find_by_pid(idle_pid).expect("just spawned");
    sched.idle = Some(idle_handle);
    sched.ready_list.remove(&mut ReadyView(&mut sched.tasks), boot_handle);
    sched.tasks.tcb_mut(boot_handle).status = TaskStatus::Running;
    sched.current = Some(boot_handle);
    sched.started = true;
    Ok(())
}

/// `init`'s seeded entry is never actually reached: the boot path keeps
/// running on its original call stack until the first real `schedule`
/// switches away from it, same as Pintos' "the running thread created the
/// scheduler" bootstrap.
extern "C" fn boot_return_trampoline() -> ! {
    ArchCpu::enable_interrupts();
    loop {
        ArchCpu::halt();
    }
}

/// Timer IRQ entry point (spec §4.4): check the stack sentinel, decrement
/// the quantum, and reschedule when it expires.
pub fn on_timer_tick() {
    let should_schedule = {
        let mut sched = lock();
        let Some(current) = sched.current else { return };
        let tcb = sched.tasks.tcb_mut(current);
        if !tcb.sentinel_intact() {
            panic!("kernel stack sentinel corrupted on pid {:?}", tcb.pid);
        }
        tcb.elapsed_ticks += 1;
        if tcb.ticks > 0 {
            tcb.ticks -= 1;
        }
        tcb.ticks == 0
    };
    if should_schedule {
        schedule();
    }
}

/// `schedule`'s contract (spec §4.4): must be called with interrupts
/// disabled by the caller's critical section, or disables them itself.
pub fn schedule() {
    crate::arch::x86::cpu::critical_section(|| {
        let mut sched = lock();
        if !sched.started {
            return;
        }
        if let Some(current) = sched.current {
            if sched.tasks.tcb(current).status == TaskStatus::Running {
                sched.tasks.tcb_mut(current).status = TaskStatus::Ready;
                let priority = sched.tasks.tcb(current).priority;
                sched.tasks.tcb_mut(current).ticks = priority;
                sched.ready_list.append(&mut ReadyView(&mut sched.tasks), current);
            }
        }

        if sched.ready_list.is_empty() {
            if let Some(idle) = sched.idle {
                if sched.tasks.tcb(idle).status != TaskStatus::Running {
                    sched.tasks.tcb_mut(idle).status = TaskStatus::Ready;
                    sched.ready_list.push_front(&mut ReadyView(&mut sched.tasks), idle);
                }
            }
        }

        let Some(next) = sched.ready_list.pop_front(&mut ReadyView(&mut sched.tasks)) else {
            return;
        };
        sched.tasks.tcb_mut(next).status = TaskStatus::Running;

        if let Some(dir) = sched.tasks.tcb(next).page_directory {
            unsafe { crate::kernel::mm::paging::load_directory(dir) };
        }
        let next_stack_top = sched.tasks.stack_top(next);
        crate::arch::x86::gdt::set_kernel_stack(next_stack_top);

        let previous = sched.current;
        sched.current = Some(next);

        let load_from = sched.tasks.tcb(next).kernel_stack_ptr;
        static mut BOOT_ESP_SINK: u32 = 0;
        let save_to: *mut u32 = match previous {
            Some(prev) => &mut sched.tasks.tcb_mut(prev).kernel_stack_ptr,
            None => unsafe { &raw mut BOOT_ESP_SINK },
        };

        // `sched`'s guard travels with the outgoing task across the switch
        // and is released only once that task is resumed and this call
        // returns on its stack.
        unsafe { switch_stack(save_to, load_from) };
    });
}

/// Requeue the caller as READY and reschedule (spec §4.4).
pub fn thread_yield() {
    schedule();
}

/// Move the current task to a non-ready state without requeueing it (spec
/// §4.4). The next call to `schedule` — triggered by the next timer tick
/// or an explicit yield — picks a different task; this task resumes only
/// once something calls [`thread_unblock`] on it.
pub fn thread_block(state: TaskStatus) {
    crate::arch::x86::cpu::critical_section(|| {
        let mut sched = lock();
        if let Some(current) = sched.current {
            sched.tasks.tcb_mut(current).status = state;
        }
    });
    schedule();
}

/// Push `handle` to the ready-list head, giving just-woken tasks priority
/// (spec §4.4, §5).
pub fn thread_unblock(handle: Handle) {
    crate::arch::x86::cpu::critical_section(|| {
        let mut sched = lock();
        sched.tasks.tcb_mut(handle).status = TaskStatus::Ready;
        sched.ready_list.push_front(&mut ReadyView(&mut sched.tasks), handle);
    });
}

/// Enqueue the current task onto `waiters`, transition it to `state`, and
/// reschedule — the building block under [`crate::kernel::sync::Semaphore`].
pub fn block_on(waiters: &mut List, state: TaskStatus) {
    let mut sched = lock();
    let Some(current) = sched.current else { return };
    waiters.append(&mut AllTasksView(&mut sched.tasks), current);
    sched.tasks.tcb_mut(current).status = state;
    drop(sched);
    schedule();
}

/// Pop the head of `waiters` (if any) and return it to READY.
pub fn wake_one(waiters: &mut List) -> Option<Handle> {
    let mut sched = lock();
    let handle = waiters.pop_front(&mut AllTasksView(&mut sched.tasks))?;
    sched.tasks.tcb_mut(handle).status = TaskStatus::Ready;
    sched.ready_list.push_front(&mut ReadyView(&mut sched.tasks), handle);
    Some(handle)
}

/// Node-store view backing semaphore waiter lists. Reuses the `ready_links`
/// hook: a task is never on both a wait list and the ready list at once,
/// since BLOCKED and READY are mutually exclusive statuses.
struct AllTasksView<'a>(&'a mut TaskTable);

impl NodeStore for AllTasksView<'_> {
    fn links(&self, handle: Handle) -> &ListLinks {
        &self.0.tcb(handle).ready_links
    }
    fn links_mut(&mut self, handle: Handle) -> &mut ListLinks {
        &mut self.0.tcb_mut(handle).ready_links
    }
}

#[must_use]
pub fn current_pid() -> Pid {
    let sched = lock();
    let handle = sched.current_handle().expect("scheduler not started");
    sched.tasks.tcb(handle).pid.expect("current task has no pid")
}

#[must_use]
pub fn current_handle() -> Handle {
    lock().current_handle().expect("scheduler not started")
}
