//! Background tasks, the LED timer callback and kernel failure hooks.

use rtos::{SoftwareTimer, TaskAction, TaskBody, TaskContext};

use crate::board::Board;
use crate::config::TaskSpec;
use crate::trace::{DemoEvent, Led, Tracer};

/// Task that announces itself once, then reports liveness every
/// `delay_ticks`.
pub struct LivenessTask {
    spec: TaskSpec,
    delay_ticks: u64,
    tracer: Tracer,
}

impl LivenessTask {
    pub fn new(spec: TaskSpec, delay_ticks: u64, tracer: Tracer) -> Self {
        Self {
            spec,
            delay_ticks,
            tracer,
        }
    }
}

impl TaskBody for LivenessTask {
    fn on_start(&mut self, _ctx: &mut TaskContext<'_>) {
        log::info!("{}", self.spec.banner);
        self.tracer.emit(DemoEvent::TaskStarted(self.spec.name));
    }

    fn run(&mut self, ctx: &mut TaskContext<'_>) -> TaskAction {
        log::info!("{}", self.spec.running);
        self.tracer.emit(DemoEvent::TaskRunning(self.spec.name));
        ctx.delay(self.delay_ticks)
    }
}

/// Callback of the periodic LED timer: toggles the red LED.
pub fn led_timer_callback(
    board: Board,
    tracer: Tracer,
) -> impl Fn(&SoftwareTimer) + Send + Sync + 'static {
    move |_timer| {
        board.toggle_led(Led::Red);
        log::info!("timers Callback");
        tracer.emit(DemoEvent::TimerFired);
    }
}

/// Reports the failed allocation and returns. The halt comes from the
/// `OutOfMemory` error the kernel hands back to boot.
pub fn malloc_failed_hook() {
    log::error!("malloc failed");
}

/// Reports the overflowing task and returns. The kernel then fails the tick
/// with `StackOverflow`, which halts the system.
pub fn stack_overflow_hook(task: &'static str) {
    log::error!("Stack Overflow in {}", task);
}

pub fn idle_hook() {}

pub fn tick_hook() {}
