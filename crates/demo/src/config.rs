//! Demo configuration.
//!
//! Defaults reproduce the reference board: buttons on GPIO 30/31 wired to
//! ECLIC lines 49 (vectored, level 3) and 50 (non-vectored, level 2), LEDs on
//! GPIO 19/21/22, a 32 768 Hz system timer and a 1 kHz kernel tick.

use hal::interrupt::InterruptLine;
use irq::DispatchConfig;
use rtos::KernelConfig;

use crate::tasks;

/// System timer frequency of the reference SoC
pub const SOC_TIMER_FREQ: u64 = 32_768;

pub const BUTTON_1_IRQ: u16 = 49;
pub const BUTTON_2_IRQ: u16 = 50;

/// Depth of the (currently unused) message queue
pub const QUEUE_LENGTH: usize = 1;

/// GPIO offsets of the board's LEDs and buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap {
    pub led_red: u32,
    pub led_green: u32,
    pub led_blue: u32,
    pub button_1: u32,
    pub button_2: u32,
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            led_red: 19,
            led_green: 21,
            led_blue: 22,
            button_1: 30,
            button_2: 31,
        }
    }
}

/// Static description of one background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: &'static str,
    /// Printed once when the task starts
    pub banner: &'static str,
    /// Printed on every pass of the task loop
    pub running: &'static str,
    pub priority: u8,
}

#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub pins: PinMap,
    pub timer_freq_hz: u64,
    pub button_1: InterruptLine,
    pub button_2: InterruptLine,
    pub tasks: [TaskSpec; 2],
    pub task_stack_words: usize,
    pub task_delay_ticks: u64,
    pub led_timer_period_ms: u64,
    /// How long each button handler busy-waits
    pub handler_wait_seconds: u32,
    pub kernel: KernelConfig,
    pub dispatch: DispatchConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            pins: PinMap::default(),
            timer_freq_hz: SOC_TIMER_FREQ,
            button_1: InterruptLine::vectored(BUTTON_1_IRQ, 3, 0),
            button_2: InterruptLine::non_vectored(BUTTON_2_IRQ, 2, 0),
            tasks: [
                TaskSpec {
                    name: "start_task",
                    banner: "task_1",
                    running: "task1_running..... ",
                    priority: 2,
                },
                TaskSpec {
                    name: "start_task2",
                    banner: "task_2",
                    running: "task2_running..... ",
                    priority: 1,
                },
            ],
            task_stack_words: 256,
            task_delay_ticks: 200,
            led_timer_period_ms: 1_000,
            handler_wait_seconds: 1,
            kernel: KernelConfig::builder()
                .name("button-demo")
                .idle_hook(tasks::idle_hook)
                .tick_hook(tasks::tick_hook)
                .malloc_failed_hook(tasks::malloc_failed_hook)
                .stack_overflow_hook(tasks::stack_overflow_hook)
                .build(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl DemoConfig {
    pub fn builder() -> DemoConfigBuilder {
        DemoConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DemoConfigBuilder {
    config: DemoConfig,
}

impl DemoConfigBuilder {
    pub fn pins(mut self, pins: PinMap) -> Self {
        self.config.pins = pins;
        self
    }

    pub fn timer_freq_hz(mut self, hz: u64) -> Self {
        self.config.timer_freq_hz = hz;
        self
    }

    /// Override the line descriptors of both buttons.
    pub fn buttons(mut self, button_1: InterruptLine, button_2: InterruptLine) -> Self {
        self.config.button_1 = button_1;
        self.config.button_2 = button_2;
        self
    }

    pub fn task_stack_words(mut self, words: usize) -> Self {
        self.config.task_stack_words = words;
        self
    }

    pub fn task_delay_ticks(mut self, ticks: u64) -> Self {
        self.config.task_delay_ticks = ticks;
        self
    }

    pub fn led_timer_period_ms(mut self, ms: u64) -> Self {
        self.config.led_timer_period_ms = ms;
        self
    }

    pub fn handler_wait_seconds(mut self, seconds: u32) -> Self {
        self.config.handler_wait_seconds = seconds;
        self
    }

    pub fn kernel(mut self, kernel: KernelConfig) -> Self {
        self.config.kernel = kernel;
        self
    }

    pub fn dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.config.dispatch = dispatch;
        self
    }

    pub fn build(self) -> DemoConfig {
        self.config
    }
}
