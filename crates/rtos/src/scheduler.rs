//! Priority bookkeeping for the tick-driven kernel.

use alloc::vec::Vec;

use crate::task::{TaskControlBlock, TaskState};

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ReadySet {
    bits: u64,
}

impl ReadySet {
    pub(crate) fn insert(&mut self, prio: u8) {
        Self::assert_range(prio);
        self.bits |= 1u64 << prio;
    }

    pub(crate) fn remove(&mut self, prio: u8) {
        Self::assert_range(prio);
        self.bits &= !(1u64 << prio);
    }

    pub(crate) fn max(&self) -> Option<u8> {
        if self.bits == 0 {
            None
        } else {
            Some(63 - self.bits.leading_zeros() as u8)
        }
    }

    fn assert_range(prio: u8) {
        assert!(prio < 64, "priority {prio} exceeds supported range 0..63");
    }
}

/// Move every delayed task whose wake tick has been reached back to ready.
///
/// Returns the number of tasks woken.
pub(crate) fn wake_expired(tasks: &mut [TaskControlBlock], now: u64) -> usize {
    let mut woken = 0;
    for tcb in tasks.iter_mut() {
        if let TaskState::Delayed { until } = tcb.state {
            // Wrapping distance: `until` is in the past once the difference
            // lands in the lower half of the range.
            if now.wrapping_sub(until) < u64::MAX / 2 {
                tcb.state = TaskState::Ready;
                woken += 1;
            }
        }
    }
    woken
}

/// Indices of ready tasks, highest priority first; creation order within a
/// priority.
pub(crate) fn ready_order(tasks: &[TaskControlBlock]) -> Vec<usize> {
    let mut ready = ReadySet::default();
    for tcb in tasks.iter().filter(|tcb| tcb.state == TaskState::Ready) {
        ready.insert(tcb.priority.0);
    }

    let mut order = Vec::with_capacity(tasks.len());
    while let Some(prio) = ready.max() {
        ready.remove(prio);
        order.extend(
            tasks
                .iter()
                .enumerate()
                .filter(|(_, tcb)| tcb.priority.0 == prio && tcb.state == TaskState::Ready)
                .map(|(index, _)| index),
        );
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskAction, TaskConfig, TaskContext, TaskId, TaskPriority};

    fn idle_task(id: u8, prio: u8) -> TaskControlBlock {
        TaskControlBlock::new(
            TaskId(id),
            TaskConfig::new("t", TaskPriority(prio), |_: &mut TaskContext<'_>| {
                TaskAction::Yield
            }),
        )
    }

    #[test]
    fn ready_set_tracks_highest_priority() {
        let mut set = ReadySet::default();
        assert_eq!(set.max(), None);
        set.insert(1);
        set.insert(4);
        assert_eq!(set.max(), Some(4));
        set.remove(4);
        assert_eq!(set.max(), Some(1));
    }

    #[test]
    fn ready_order_is_priority_then_creation() {
        let tasks = vec![idle_task(0, 1), idle_task(1, 2), idle_task(2, 1)];
        assert_eq!(ready_order(&tasks), vec![1, 0, 2]);
    }

    #[test]
    fn delayed_tasks_wake_at_deadline() {
        let mut tasks = vec![idle_task(0, 1), idle_task(1, 2)];
        tasks[0].state = TaskState::Delayed { until: 200 };
        tasks[1].state = TaskState::Delayed { until: 201 };

        assert_eq!(wake_expired(&mut tasks, 199), 0);
        assert_eq!(wake_expired(&mut tasks, 200), 1);
        assert_eq!(tasks[0].state, TaskState::Ready);
        assert_eq!(ready_order(&tasks), vec![0]);
    }

    #[test]
    fn wake_handles_tick_wrap() {
        let mut tasks = vec![idle_task(0, 1)];
        tasks[0].state = TaskState::Delayed { until: 3 };
        assert_eq!(wake_expired(&mut tasks, u64::MAX), 0);
        assert_eq!(wake_expired(&mut tasks, 3), 1);
    }
}
