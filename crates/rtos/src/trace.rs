use crate::sync::Arc;
use crate::task::TaskId;

/// Scheduling events reported to an installed trace hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelEvent {
    SchedulerStarted,
    TaskStep {
        task: TaskId,
        name: &'static str,
        tick: u64,
    },
    TimerExpired {
        name: &'static str,
        tick: u64,
    },
    Idle {
        tick: u64,
    },
}

pub type TraceHook = Arc<dyn Fn(&KernelEvent) + Send + Sync>;
