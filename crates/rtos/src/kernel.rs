//! Tick-driven preemptive-priority kernel.
//!
//! Each tick runs, in order: the tick hook, the timer service (callbacks of
//! expired timers), the wake-up of delayed tasks, and one step of every ready
//! task from the highest priority down. When no task was ready the idle hook
//! runs instead.
//!
//! Kernel objects are charged against a fixed heap budget when they are
//! created. Running out calls the malloc-failed hook and fails the creation;
//! nothing is ever freed.

use alloc::vec::Vec;

use crate::config::{
    KernelConfig, QUEUE_HEADER_BYTES, TASK_CONTROL_BLOCK_BYTES, TIMER_BYTES, WORD_BYTES,
};
use crate::queue::MessageQueue;
use crate::scheduler;
use crate::sync::Arc;
use crate::task::{TaskConfig, TaskControlBlock, TaskId, TaskInfo};
use crate::timer::{SoftwareTimer, TimerConfig};
use crate::trace::{KernelEvent, TraceHook};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    #[error("out of heap: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },
    #[error("task '{task}' overflowed its stack: {used} of {budget} words")]
    StackOverflow {
        task: &'static str,
        used: usize,
        budget: usize,
    },
    #[error("priority {priority} exceeds max priority {max}")]
    InvalidPriority { priority: u8, max: u8 },
    #[error("task table full: at most {max} tasks")]
    TooManyTasks { max: usize },
    #[error("timer '{0}' has a zero period")]
    ZeroPeriod(&'static str),
    #[error("scheduler already started")]
    AlreadyStarted,
    #[error("scheduler is not running")]
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    Created,
    Running,
    Halted,
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub tick: u64,
    pub timers_fired: u32,
    pub tasks_run: u32,
    pub idle: bool,
}

pub struct Kernel {
    config: KernelConfig,
    state: KernelState,
    tick: u64,
    heap_used: usize,
    tasks: Vec<TaskControlBlock>,
    timers: Vec<Arc<SoftwareTimer>>,
    trace: Option<TraceHook>,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            state: KernelState::Created,
            tick: 0,
            heap_used: 0,
            tasks: Vec::new(),
            timers: Vec::new(),
            trace: None,
        }
    }

    pub fn with_trace_hook(mut self, hook: TraceHook) -> Self {
        self.trace = Some(hook);
        self
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn heap_used(&self) -> usize {
        self.heap_used
    }

    pub fn heap_free(&self) -> usize {
        self.config.total_heap_bytes.saturating_sub(self.heap_used)
    }

    /// Allocate a queue of `N` words.
    pub fn create_queue<const N: usize>(&mut self) -> Result<Arc<MessageQueue<N>>, KernelError> {
        self.allocate(QUEUE_HEADER_BYTES + N * WORD_BYTES)?;
        Ok(Arc::new(MessageQueue::new()))
    }

    pub fn create_task(&mut self, config: TaskConfig) -> Result<TaskId, KernelError> {
        let max = self.config.max_priority();
        if config.priority.0 > max {
            return Err(KernelError::InvalidPriority {
                priority: config.priority.0,
                max,
            });
        }
        let id = u8::try_from(self.tasks.len())
            .map(TaskId)
            .map_err(|_| KernelError::TooManyTasks {
                max: usize::from(u8::MAX) + 1,
            })?;
        let stack_bytes = config.stack_words.saturating_mul(WORD_BYTES);
        self.allocate(TASK_CONTROL_BLOCK_BYTES.saturating_add(stack_bytes))?;

        log::debug!(
            "task '{}' created: priority {}, stack {} words",
            config.name,
            config.priority.0,
            config.stack_words
        );
        self.tasks.push(TaskControlBlock::new(id, config));
        Ok(id)
    }

    pub fn create_timer(&mut self, config: TimerConfig) -> Result<Arc<SoftwareTimer>, KernelError> {
        if config.period_ticks == 0 {
            return Err(KernelError::ZeroPeriod(config.name));
        }
        self.allocate(TIMER_BYTES)?;

        let timer = SoftwareTimer::new(config);
        log::debug!(
            "timer '{}' created: period {} ticks, auto-reload {}",
            timer.name(),
            timer.period_ticks(),
            timer.is_auto_reload()
        );
        self.timers.push(Arc::clone(&timer));
        Ok(timer)
    }

    /// Start (or restart) `timer` from a full period.
    pub fn start_timer(&self, timer: &SoftwareTimer) {
        timer.arm();
    }

    pub fn stop_timer(&self, timer: &SoftwareTimer) {
        timer.disarm();
    }

    /// Start scheduling.
    ///
    /// Creates the idle and timer-service tasks' storage, then runs the first
    /// scheduling pass at tick 0.
    pub fn start(&mut self) -> Result<(), KernelError> {
        if self.state != KernelState::Created {
            return Err(KernelError::AlreadyStarted);
        }

        let idle = TASK_CONTROL_BLOCK_BYTES + self.config.minimal_stack_words * WORD_BYTES;
        let service = TASK_CONTROL_BLOCK_BYTES + self.config.timer_task_stack_words * WORD_BYTES;
        self.allocate(idle)?;
        self.allocate(service)?;

        self.state = KernelState::Running;
        log::debug!(
            "{}: scheduler started with {} tasks, {} timers, {} bytes heap free",
            self.config.name,
            self.tasks.len(),
            self.timers.len(),
            self.heap_free()
        );
        self.emit(KernelEvent::SchedulerStarted);

        let ran = self.run_ready()?;
        if ran == 0 {
            self.idle();
        }
        Ok(())
    }

    /// Advance time by one tick.
    pub fn tick(&mut self) -> Result<TickReport, KernelError> {
        if self.state != KernelState::Running {
            return Err(KernelError::NotRunning);
        }

        self.tick = self.tick.wrapping_add(1);
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        if let Some(hook) = self.config.tick_hook {
            hook();
        }

        for timer in &self.timers {
            if timer.tick() {
                report.timers_fired += 1;
                log::trace!("timer '{}' expired at tick {}", timer.name(), self.tick);
                self.emit(KernelEvent::TimerExpired {
                    name: timer.name(),
                    tick: self.tick,
                });
            }
        }

        scheduler::wake_expired(&mut self.tasks, self.tick);
        report.tasks_run = self.run_ready()? as u32;

        if report.tasks_run == 0 {
            report.idle = true;
            self.idle();
        }
        Ok(report)
    }

    /// Run `ticks` ticks, stopping at the first error.
    pub fn run_for(&mut self, ticks: u64) -> Result<(), KernelError> {
        for _ in 0..ticks {
            self.tick()?;
        }
        Ok(())
    }

    /// Tick forever, calling `wait_tick` before each tick. Only returns when
    /// the kernel halts.
    pub fn run_until_halt(&mut self, mut wait_tick: impl FnMut()) -> KernelError {
        loop {
            wait_tick();
            if let Err(err) = self.tick() {
                return err;
            }
        }
    }

    pub fn task(&self, id: TaskId) -> Option<TaskInfo> {
        self.tasks.get(usize::from(id.0)).map(TaskInfo::from)
    }

    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.tasks.iter().map(TaskInfo::from).collect()
    }

    pub fn timers(&self) -> &[Arc<SoftwareTimer>] {
        &self.timers
    }

    fn allocate(&mut self, bytes: usize) -> Result<(), KernelError> {
        let available = self.heap_free();
        if bytes > available {
            log::error!("malloc failed: {} bytes requested, {} available", bytes, available);
            if let Some(hook) = self.config.malloc_failed_hook {
                hook();
            }
            return Err(KernelError::OutOfMemory {
                requested: bytes,
                available,
            });
        }
        self.heap_used += bytes;
        Ok(())
    }

    fn run_ready(&mut self) -> Result<usize, KernelError> {
        let order = scheduler::ready_order(&self.tasks);
        for &index in &order {
            let tick = self.tick;
            let tcb = &mut self.tasks[index];
            tcb.step(tick);
            let (id, name) = (tcb.id, tcb.name);

            if tcb.stack_overflowed() {
                let err = KernelError::StackOverflow {
                    task: name,
                    used: tcb.stack_high_water.get(),
                    budget: tcb.stack_words,
                };
                self.halt(&err);
                if let Some(hook) = self.config.stack_overflow_hook {
                    hook(name);
                }
                return Err(err);
            }

            self.emit(KernelEvent::TaskStep {
                task: id,
                name,
                tick,
            });
        }
        Ok(order.len())
    }

    fn idle(&self) {
        self.emit(KernelEvent::Idle { tick: self.tick });
        if let Some(hook) = self.config.idle_hook {
            hook();
        }
    }

    fn halt(&mut self, err: &KernelError) {
        log::error!("{}: halted: {}", self.config.name, err);
        self.state = KernelState::Halted;
    }

    fn emit(&self, event: KernelEvent) {
        if let Some(trace) = &self.trace {
            trace(&event);
        }
    }
}
