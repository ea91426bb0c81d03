//! Task definitions.
//!
//! A task body is run in steps: each call to [`TaskBody::run`] is one pass of
//! the task's loop and ends at the point where the task would suspend, which
//! it reports as a [`TaskAction`]. Delaying is therefore only possible from a
//! [`TaskContext`], never from interrupt context.

use alloc::boxed::Box;
use core::cell::Cell;
use core::fmt;

/// Task priority; higher values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskPriority(pub u8);

/// Handle returned when a task is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u8);

/// Task scheduling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for its first dispatch or for the CPU.
    Ready,
    /// Currently executing a step.
    Running,
    /// Suspended until the given tick.
    Delayed { until: u64 },
}

/// How a task step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    /// Suspend for the given number of ticks.
    Delay(u64),
    /// Stay ready; run again on the next scheduling pass.
    Yield,
}

/// Behaviour of a task.
pub trait TaskBody: Send {
    /// Runs once, before the first step.
    fn on_start(&mut self, _ctx: &mut TaskContext<'_>) {}

    /// One pass of the task loop.
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> TaskAction;
}

impl<F> TaskBody for F
where
    F: FnMut(&mut TaskContext<'_>) -> TaskAction + Send,
{
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> TaskAction {
        self(ctx)
    }
}

/// Parameters for creating a task.
pub struct TaskConfig {
    pub name: &'static str,
    pub priority: TaskPriority,
    /// Stack depth in words.
    pub stack_words: usize,
    pub body: Box<dyn TaskBody>,
}

impl TaskConfig {
    pub fn new(
        name: &'static str,
        priority: TaskPriority,
        body: impl TaskBody + 'static,
    ) -> Self {
        Self {
            name,
            priority,
            stack_words: crate::config::DEFAULT_MINIMAL_STACK_WORDS,
            body: Box::new(body),
        }
    }

    pub fn with_stack_words(mut self, words: usize) -> Self {
        self.stack_words = words;
        self
    }
}

/// What a running task can see and do.
pub struct TaskContext<'a> {
    name: &'static str,
    priority: TaskPriority,
    tick: u64,
    stack_words: usize,
    stack_high_water: &'a Cell<usize>,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(
        name: &'static str,
        priority: TaskPriority,
        tick: u64,
        stack_words: usize,
        stack_high_water: &'a Cell<usize>,
    ) -> Self {
        Self {
            name,
            priority,
            tick,
            stack_words,
            stack_high_water,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Current tick count
    pub fn now(&self) -> u64 {
        self.tick
    }

    /// Suspend for `ticks` ticks once this step returns.
    pub fn delay(&self, ticks: u64) -> TaskAction {
        TaskAction::Delay(ticks)
    }

    /// Stack depth budget in words
    pub fn stack_words(&self) -> usize {
        self.stack_words
    }

    /// Report that this step used `words` words of stack.
    ///
    /// The kernel checks the high-water mark against the budget after the
    /// step returns.
    pub fn claim_stack(&self, words: usize) {
        if words > self.stack_high_water.get() {
            self.stack_high_water.set(words);
        }
    }
}

/// Kernel-side task record.
pub(crate) struct TaskControlBlock {
    pub(crate) id: TaskId,
    pub(crate) name: &'static str,
    pub(crate) priority: TaskPriority,
    pub(crate) stack_words: usize,
    pub(crate) state: TaskState,
    pub(crate) started: bool,
    pub(crate) runs: u64,
    pub(crate) stack_high_water: Cell<usize>,
    pub(crate) body: Box<dyn TaskBody>,
}

impl TaskControlBlock {
    pub(crate) fn new(id: TaskId, config: TaskConfig) -> Self {
        Self {
            id,
            name: config.name,
            priority: config.priority,
            stack_words: config.stack_words,
            state: TaskState::Ready,
            started: false,
            runs: 0,
            stack_high_water: Cell::new(0),
            body: config.body,
        }
    }

    /// Run one step of the task at `tick`.
    pub(crate) fn step(&mut self, tick: u64) -> TaskAction {
        self.state = TaskState::Running;
        let mut ctx = TaskContext::new(
            self.name,
            self.priority,
            tick,
            self.stack_words,
            &self.stack_high_water,
        );
        if !self.started {
            self.started = true;
            self.body.on_start(&mut ctx);
        }
        let action = self.body.run(&mut ctx);
        self.runs += 1;

        self.state = match action {
            TaskAction::Delay(0) | TaskAction::Yield => TaskState::Ready,
            TaskAction::Delay(ticks) => TaskState::Delayed {
                until: tick.wrapping_add(ticks),
            },
        };
        action
    }

    pub(crate) fn stack_overflowed(&self) -> bool {
        self.stack_high_water.get() > self.stack_words
    }
}

/// Read-only view of a task for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: &'static str,
    pub priority: TaskPriority,
    pub state: TaskState,
    pub runs: u64,
    pub stack_high_water: usize,
}

impl From<&TaskControlBlock> for TaskInfo {
    fn from(tcb: &TaskControlBlock) -> Self {
        Self {
            id: tcb.id,
            name: tcb.name,
            priority: tcb.priority,
            state: tcb.state,
            runs: tcb.runs,
            stack_high_water: tcb.stack_high_water.get(),
        }
    }
}

impl fmt::Debug for TaskControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskControlBlock")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("state", &self.state)
            .field("stack_words", &self.stack_words)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_moves_task_to_delayed_state() {
        let config = TaskConfig::new("worker", TaskPriority(2), |ctx: &mut TaskContext<'_>| {
            ctx.delay(200)
        })
        .with_stack_words(128);
        let mut tcb = TaskControlBlock::new(TaskId(0), config);

        assert_eq!(tcb.state, TaskState::Ready);
        assert_eq!(tcb.step(10), TaskAction::Delay(200));
        assert_eq!(tcb.state, TaskState::Delayed { until: 210 });
        assert_eq!(tcb.runs, 1);
    }

    #[test]
    fn on_start_runs_once() {
        struct Counter {
            starts: u32,
        }

        impl TaskBody for Counter {
            fn on_start(&mut self, _ctx: &mut TaskContext<'_>) {
                self.starts += 1;
            }

            fn run(&mut self, _ctx: &mut TaskContext<'_>) -> TaskAction {
                assert_eq!(self.starts, 1);
                TaskAction::Yield
            }
        }

        let mut tcb = TaskControlBlock::new(
            TaskId(1),
            TaskConfig::new("counter", TaskPriority(1), Counter { starts: 0 }),
        );
        tcb.step(0);
        tcb.step(1);
        assert_eq!(tcb.state, TaskState::Ready);
        assert_eq!(tcb.runs, 2);
    }

    #[test]
    fn stack_claims_track_high_water_mark() {
        let config = TaskConfig::new("deep", TaskPriority(1), |ctx: &mut TaskContext<'_>| {
            ctx.claim_stack(40);
            ctx.claim_stack(12);
            TaskAction::Yield
        })
        .with_stack_words(32);
        let mut tcb = TaskControlBlock::new(TaskId(2), config);
        tcb.step(0);
        assert_eq!(TaskInfo::from(&tcb).stack_high_water, 40);
        assert!(tcb.stack_overflowed());
    }
}
