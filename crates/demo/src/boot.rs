//! Startup sequence and the running system.
//!
//! Boot is a strict one-way sequence:
//!
//! ```text
//! Uninitialized -> HardwareReady -> InterruptsRegistered -> ResourcesAllocated
//!               -> TasksCreated -> TimerArmed -> SchedulerRunning
//! ```
//!
//! Any failing step moves to `Halted` and nothing after it runs. Failures are
//! never retried. On a target the caller ends in [`halt`]; on a host the
//! reason is returned so it can be inspected.

use std::sync::Arc;

use hal::interrupt::{InterruptLine, RegistrationError};
use hal::timer::{MonotonicTimebase, Timebase};
use hal::HalError;
use irq::{DispatchError, Handler, InterruptDispatch};
use rtos::{
    Kernel, KernelError, MessageQueue, SoftwareTimer, TaskConfig, TaskId, TaskPriority,
    TickReport, TimerConfig,
};

use crate::board::{board_gpio_init, Board, Button};
use crate::config::{DemoConfig, QUEUE_LENGTH};
use crate::handlers::ButtonHandlers;
use crate::tasks::{led_timer_callback, LivenessTask};
use crate::trace::{DemoEvent, TraceHook, Tracer};

/// Why the system stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HaltReason {
    #[error("hardware init failed: {0}")]
    HardwareInit(#[from] HalError),
    #[error("interrupt registration failed: {0}")]
    RegistrationFailure(#[from] RegistrationError),
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(#[source] KernelError),
    #[error("scheduler failure: {0}")]
    SchedulerFailure(#[source] KernelError),
    #[error("stack overflow in task '{task}'")]
    StackOverflow { task: &'static str },
    #[error("{0}")]
    InterruptStorm(#[from] DispatchError),
}

impl From<KernelError> for HaltReason {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::StackOverflow { task, .. } => Self::StackOverflow { task },
            other => Self::SchedulerFailure(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    Uninitialized,
    HardwareReady,
    InterruptsRegistered,
    ResourcesAllocated,
    TasksCreated,
    TimerArmed,
    SchedulerRunning,
    Halted(HaltReason),
}

/// Drives the startup sequence.
pub struct Boot {
    config: DemoConfig,
    tracer: Tracer,
    state: BootState,
}

impl Boot {
    pub fn new(config: DemoConfig) -> Self {
        Self {
            config,
            tracer: Tracer::default(),
            state: BootState::Uninitialized,
        }
    }

    pub fn with_trace_hook(mut self, hook: TraceHook) -> Self {
        self.tracer = Tracer::new(Some(hook));
        self
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    /// Run the sequence on `board`.
    pub fn start(mut self, board: Board) -> Result<System, HaltReason> {
        match self.sequence(board) {
            Ok(system) => Ok(system),
            Err(reason) => {
                log::error!("boot halted in {:?}: {}", self.state, reason);
                self.advance(BootState::Halted(reason));
                Err(reason)
            }
        }
    }

    fn advance(&mut self, next: BootState) {
        log::debug!("boot: {:?} -> {:?}", self.state, next);
        self.state = next;
        self.tracer.emit(DemoEvent::Boot(next));
    }

    fn sequence(&mut self, board: Board) -> Result<System, HaltReason> {
        let config = self.config.clone();

        board_gpio_init(&board.gpio, &board.pins)?;
        self.advance(BootState::HardwareReady);

        let handlers = ButtonHandlers::new(
            board.clone(),
            config.handler_wait_seconds,
            self.tracer.clone(),
        );
        let mut dispatch = InterruptDispatch::new(
            Arc::clone(&board.cpu),
            Arc::clone(&board.timebase),
            config.dispatch,
        );
        register(
            &mut dispatch,
            &board,
            "button1",
            Button::One,
            config.button_1,
            handlers.button1(),
        )?;
        register(
            &mut dispatch,
            &board,
            "button2",
            Button::Two,
            config.button_2,
            handlers.button2(),
        )?;
        self.advance(BootState::InterruptsRegistered);

        let mut kernel = Kernel::new(config.kernel.clone());
        let queue = kernel
            .create_queue::<QUEUE_LENGTH>()
            .map_err(HaltReason::ResourceExhaustion)?;
        self.advance(BootState::ResourcesAllocated);

        let mut tasks = Vec::with_capacity(config.tasks.len());
        for spec in config.tasks {
            let body = LivenessTask::new(spec, config.task_delay_ticks, self.tracer.clone());
            let task = TaskConfig::new(spec.name, TaskPriority(spec.priority), body)
                .with_stack_words(config.task_stack_words);
            tasks.push(
                kernel
                    .create_task(task)
                    .map_err(HaltReason::ResourceExhaustion)?,
            );
        }
        self.advance(BootState::TasksCreated);

        let period = kernel.config().ms_to_ticks(config.led_timer_period_ms);
        let led_timer = kernel
            .create_timer(
                TimerConfig::new(
                    "LEDTimer",
                    period,
                    led_timer_callback(board.clone(), self.tracer.clone()),
                )
                .auto_reload(),
            )
            .map_err(HaltReason::ResourceExhaustion)?;
        kernel.start_timer(&led_timer);
        self.advance(BootState::TimerArmed);

        log::info!("Before StartScheduler");
        self.advance(BootState::SchedulerRunning);
        kernel.start()?;

        Ok(System {
            board,
            dispatch: Arc::new(dispatch),
            kernel,
            queue,
            led_timer,
            tasks,
            tracer: self.tracer.clone(),
            halted: None,
        })
    }
}

fn register(
    dispatch: &mut InterruptDispatch,
    board: &Board,
    name: &str,
    button: Button,
    line: InterruptLine,
    handler: Handler,
) -> Result<(), HaltReason> {
    log::info!(
        "register {} interrupt as {} mode, {} and level {}",
        name,
        line.discipline,
        line.trigger,
        line.level
    );
    let source = board.button_source(button)?;
    dispatch.register(line, Arc::new(source), handler)?;
    Ok(())
}

/// A booted system with the scheduler running.
pub struct System {
    board: Board,
    dispatch: Arc<InterruptDispatch>,
    kernel: Kernel,
    queue: Arc<MessageQueue<QUEUE_LENGTH>>,
    led_timer: Arc<SoftwareTimer>,
    tasks: Vec<TaskId>,
    tracer: Tracer,
    halted: Option<HaltReason>,
}

impl System {
    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn dispatch(&self) -> &InterruptDispatch {
        &self.dispatch
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn queue(&self) -> &MessageQueue<QUEUE_LENGTH> {
        &self.queue
    }

    pub fn led_timer(&self) -> &SoftwareTimer {
        &self.led_timer
    }

    pub fn tasks(&self) -> &[TaskId] {
        &self.tasks
    }

    pub fn halted(&self) -> Option<HaltReason> {
        self.halted
    }

    /// Take pending interrupts, then advance the kernel by one tick.
    pub fn step(&mut self) -> Result<TickReport, HaltReason> {
        if let Some(reason) = self.halted {
            return Err(reason);
        }
        let result = self
            .dispatch
            .service()
            .map_err(HaltReason::from)
            .and_then(|_| self.kernel.tick().map_err(HaltReason::from));

        result.map_err(|reason| {
            log::error!("system halted: {}", reason);
            self.halted = Some(reason);
            self.tracer.emit(DemoEvent::Boot(BootState::Halted(reason)));
            reason
        })
    }
}

/// Stop forever.
pub fn halt(reason: HaltReason) -> ! {
    log::error!("halted: {}", reason);
    loop {
        std::hint::spin_loop();
    }
}

/// Boot against the wall clock and run until something fails.
pub fn run(config: DemoConfig) -> ! {
    let tick_hz = u64::from(config.kernel.tick_rate_hz.max(1));
    let timebase = Arc::new(MonotonicTimebase::new(config.timer_freq_hz));
    let board = Board::new(timebase.clone(), config.pins);

    let mut system = match Boot::new(config).start(board) {
        Ok(system) => system,
        Err(reason) => halt(reason),
    };

    let ticks_per_kernel_tick = (timebase.frequency_hz() / tick_hz).max(1);
    let mut next = ticks_per_kernel_tick;
    loop {
        while timebase.counter() < next {
            std::thread::yield_now();
        }
        next += ticks_per_kernel_tick;

        if let Err(reason) = system.step() {
            halt(reason);
        }
    }
}
