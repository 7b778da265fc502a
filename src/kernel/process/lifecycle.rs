// src/kernel/process/lifecycle.rs
//! `fork`, `exec`, `wait`, `exit` (spec §4.5).

use super::elf;
use crate::arch::x86::context::{seed_user_stack, UserTrapFrame};
use crate::errors::KernelError;
use crate::kernel::mm::frame::{self, USER_POOL};
use crate::kernel::mm::{self, paging, PhysAddr, VirtAddr, PAGE_SIZE};
use crate::kernel::task::scheduler;
use crate::kernel::task::tcb::{Descriptor, TaskStatus, MAX_OPEN_FILES};
use crate::kernel::task::INIT_PID;
use alloc::boxed::Box;
use spin::Mutex;

/// Pages reserved at the very top of user space for a freshly `exec`'d
/// image's stack (spec §4.5: "a fresh user stack at the top of user
/// space"). 64 KiB is generous for the shell and its children without
/// eating meaningfully into the ~3 GiB user window.
const USER_STACK_PAGES: usize = 16;

/// Duplicate the calling task (spec §4.5's `fork`). The child is a full
/// copy of the parent's address space, a from-scratch slab heap (`never
/// inherit`), and a saved context that resumes at the same point as the
/// parent with the syscall return register patched to 0.
///
/// The spec describes copying pages via a one-frame kernel bounce buffer
/// that round-trips CR3 between parent and child; this instead reaches
/// both frames through simultaneous scratch windows
/// ([`crate::kernel::mm::with_temp_mapping`]), never touching CR3. See
/// DESIGN.md for this deviation.
///
/// # Safety
/// `parent_frame` must point at the live `UserTrapFrame` the syscall
/// trampoline saved for the calling task's current kernel stack.
pub unsafe fn fork(parent_frame: *const UserTrapFrame) -> Result<i32, KernelError> {
    let mut child_frame = unsafe { *parent_frame };
    child_frame.eax = 0;

    let (parent_pid, name, name_len, priority, cwd_inode, fd_table, parent_vpool_snapshot, child_handle, child_pid) = {
        let mut sched = scheduler::lock();
        let parent = sched.current_handle().expect("fork called with no current task");
        let tcb = sched.tasks.tcb(parent);
        tcb.page_directory.ok_or(KernelError::Task(crate::errors::TaskError::InvalidTransition))?;
        let snapshot = tcb.user_vpool.as_ref().expect("fork of a kernel-only task").lock().clone();
        let captured = (tcb.pid.expect("current task has no pid"), tcb.name, tcb.name_len, tcb.priority, tcb.cwd_inode, tcb.fd_table, snapshot);

        let (child_handle, child_pid) = sched.new_task_slot()?;
        (captured.0, captured.1, captured.2, captured.3, captured.4, captured.5, captured.6, child_handle, child_pid)
    };

    let child_dir = paging::new_address_space()?;

    let mut copy_err = None;
    paging::for_each_user_page(|vaddr, src_frame, writable| {
        if copy_err.is_some() {
            return;
        }
        if let Err(e) = copy_user_page(child_dir, vaddr, src_frame, writable) {
            copy_err = Some(e);
        }
    });
    if let Some(e) = copy_err {
        unsafe { let _ = paging::free_address_space(child_dir, &USER_POOL); };
        scheduler::lock().reap(child_handle);
        return Err(e);
    }

    let stack_top = {
        let mut sched = scheduler::lock();
        let stack_top = sched.tasks.stack_top(child_handle);
        let tcb = sched.tasks.tcb_mut(child_handle);
        tcb.parent_pid = Some(parent_pid);
        tcb.name = name;
        tcb.name_len = name_len;
        tcb.priority = priority;
        tcb.ticks = priority;
        tcb.cwd_inode = cwd_inode;
        // TODO(kernel::fs): increment each open file's (or pipe's) shared
        // open-count once the global file table exists; for now the child
        // simply inherits the same descriptor slots.
        tcb.fd_table = fd_table;
        tcb.page_directory = Some(child_dir);
        tcb.user_vpool = Some(Box::new(Mutex::new(parent_vpool_snapshot)));
        stack_top
    };

    let kernel_stack_ptr = seed_user_stack(stack_top, child_frame);
    let mut sched = scheduler::lock();
    sched.tasks.tcb_mut(child_handle).kernel_stack_ptr = kernel_stack_ptr;
    sched.make_ready(child_handle);

    Ok(child_pid.as_i32())
}

fn copy_user_page(child_dir: PhysAddr, vaddr: VirtAddr, src_frame: PhysAddr, writable: bool) -> Result<(), KernelError> {
    let dst_frame = PhysAddr::new(frame::alloc_frames(&USER_POOL, 1)?);
    let copy_result = mm::with_temp_mapping(src_frame, false, |src_ptr| {
        mm::with_temp_mapping(dst_frame, true, |dst_ptr| unsafe {
            core::ptr::copy_nonoverlapping(src_ptr, dst_ptr, PAGE_SIZE);
        })
    });
    match copy_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) | Err(e) => {
            frame::free_frames(&USER_POOL, dst_frame.as_usize(), 1);
            return Err(e);
        }
    }
    if let Err(e) = paging::map_page_in(child_dir, vaddr, dst_frame, true, writable) {
        frame::free_frames(&USER_POOL, dst_frame.as_usize(), 1);
        return Err(e);
    }
    Ok(())
}

/// Replace the calling task's program image in place (spec §4.5's `exec`).
/// On success `frame` is overwritten to resume at the new entry point with
/// a fresh user stack; the syscall trampoline's own `popa; iretd` epilogue
/// — already about to run when this returns — is the "shared interrupt
/// exit label" the spec names, so there is no separate jump to perform.
///
/// # Safety
/// `frame` must point at the live `UserTrapFrame` the syscall trampoline
/// saved for the calling task's current kernel stack.
pub unsafe fn exec(image: &[u8], frame: *mut UserTrapFrame) -> Result<(), KernelError> {
    let entry = {
        let sched = scheduler::lock();
        let handle = sched.current_handle().expect("exec called with no current task");
        let tcb = sched.tasks.tcb(handle);
        let user_vpool = tcb.user_vpool.as_ref().expect("exec on a kernel-only task");
        let entry = elf::load(image, user_vpool)?;

        let stack_base = crate::kernel::mm::vpool::USER_VADDR_END - USER_STACK_PAGES * PAGE_SIZE;
        mm::alloc_pages_at(&USER_POOL, user_vpool, VirtAddr::new(stack_base), USER_STACK_PAGES, true, true)?;
        entry
    };

    let stack_top = crate::kernel::mm::vpool::USER_VADDR_END as u32;
    let sel = crate::arch::x86::gdt::selectors();
    let new_frame = UserTrapFrame::new(entry, stack_top, sel.user_code.0, sel.user_data.0);
    unsafe { *frame = new_frame };
    Ok(())
}

/// Terminate the calling task (spec §4.5's `exit`): record the status,
/// reparent every descendant to `init`, release the address space and
/// descriptor table, wake a WAITING parent, and park as HANGING until
/// [`wait`] harvests it. Runs with interrupts disabled throughout the
/// teardown so the dying task's own page-directory frame can never be
/// reused by another task before this task gives up CR3.
pub fn exit(status: i32) {
    crate::arch::x86::cpu::critical_section(|| {
        let mut sched = scheduler::lock();
        let handle = sched.current_handle().expect("exit called with no current task");
        let pid = sched.tasks.tcb(handle).pid.expect("current task has no pid");
        let parent_pid = sched.tasks.tcb(handle).parent_pid;

        sched.tasks.tcb_mut(handle).exit_status = status;
        sched.reparent(pid, INIT_PID);

        if let Some(dir) = sched.tasks.tcb_mut(handle).page_directory.take() {
            sched.tasks.tcb_mut(handle).user_vpool = None;
            unsafe { let _ = paging::free_address_space(dir, &USER_POOL); };
        }

        sched.tasks.tcb_mut(handle).fd_table = [Descriptor::Free; MAX_OPEN_FILES];
        // TODO(kernel::fs): route each descriptor through the global file
        // table on close (pipes decrement their shared counter and free
        // the ring on reaching zero) once that subsystem exists.

        if let Some(parent_pid) = parent_pid {
            if let Some(parent_handle) = sched.tasks.find_by_pid(parent_pid) {
                if sched.tasks.tcb(parent_handle).status == TaskStatus::Waiting {
                    sched.wake(parent_handle);
                }
            }
        }
    });
    scheduler::thread_block(TaskStatus::Hanging);
}

/// Harvest one exited child (spec §4.5's `wait`): if a child is already
/// HANGING, copy out its status, free its slot and PID, and return its
/// PID. If the caller has live children but none have exited, block as
/// WAITING and retry whenever an `exit` wakes it. With no children at all,
/// return −1 immediately.
pub fn wait(out_status: &mut i32) -> i32 {
    loop {
        let mut sched = scheduler::lock();
        let handle = sched.current_handle().expect("wait called with no current task");
        let pid = sched.tasks.tcb(handle).pid.expect("current task has no pid");

        if let Some(child) = sched.find_hanging_child(pid) {
            *out_status = sched.tasks.tcb(child).exit_status;
            let child_pid = sched.tasks.tcb(child).pid.expect("hanging child has no pid");
            sched.reap(child);
            return child_pid.as_i32();
        }

        if !sched.has_any_child(pid) {
            return -1;
        }

        drop(sched);
        scheduler::thread_block(TaskStatus::Waiting);
    }
}
