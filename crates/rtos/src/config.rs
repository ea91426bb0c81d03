//! Kernel configuration.

/// Default tick frequency
pub const DEFAULT_TICK_RATE_HZ: u32 = 1_000;
/// Default number of task priorities (`0..DEFAULT_MAX_PRIORITIES`)
pub const DEFAULT_MAX_PRIORITIES: u8 = 5;
/// Default stack depth of the idle task, in words
pub const DEFAULT_MINIMAL_STACK_WORDS: usize = 256;
/// Default heap available to kernel objects
pub const DEFAULT_TOTAL_HEAP_BYTES: usize = 2048 * WORD_BYTES;

/// Bytes per stack word on a 32-bit core
pub const WORD_BYTES: usize = 4;

/// Heap charged for a task control block, excluding its stack
pub const TASK_CONTROL_BLOCK_BYTES: usize = 92;
/// Heap charged for a timer object
pub const TIMER_BYTES: usize = 44;
/// Heap charged for a queue header, excluding its storage
pub const QUEUE_HEADER_BYTES: usize = 80;

/// Configuration for the kernel.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub name: &'static str,
    pub tick_rate_hz: u32,
    pub max_priorities: u8,
    pub total_heap_bytes: usize,
    pub minimal_stack_words: usize,
    pub timer_task_priority: u8,
    pub timer_task_stack_words: usize,
    /// Called once per tick in which no task was ready
    pub idle_hook: Option<fn()>,
    /// Called at the start of every tick
    pub tick_hook: Option<fn()>,
    /// Called when a kernel object cannot be allocated
    pub malloc_failed_hook: Option<fn()>,
    /// Called with the task name when a task exceeds its stack budget
    pub stack_overflow_hook: Option<fn(&'static str)>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            name: "rtos",
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            max_priorities: DEFAULT_MAX_PRIORITIES,
            total_heap_bytes: DEFAULT_TOTAL_HEAP_BYTES,
            minimal_stack_words: DEFAULT_MINIMAL_STACK_WORDS,
            timer_task_priority: DEFAULT_MAX_PRIORITIES - 1,
            timer_task_stack_words: DEFAULT_MINIMAL_STACK_WORDS,
            idle_hook: None,
            tick_hook: None,
            malloc_failed_hook: None,
            stack_overflow_hook: None,
        }
    }
}

impl KernelConfig {
    /// Creates a new kernel configuration builder.
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::default()
    }

    /// Convert milliseconds to ticks at this tick rate, rounding down.
    pub fn ms_to_ticks(&self, ms: u64) -> u64 {
        ms_to_ticks(ms, self.tick_rate_hz)
    }

    /// Highest valid task priority
    pub fn max_priority(&self) -> u8 {
        self.max_priorities.saturating_sub(1)
    }
}

/// Convert milliseconds to ticks at `tick_rate_hz`, rounding down.
///
/// Durations too long to represent saturate at `u64::MAX` ticks.
pub const fn ms_to_ticks(ms: u64, tick_rate_hz: u32) -> u64 {
    let ticks = ms as u128 * tick_rate_hz as u128 / 1_000;
    if ticks > u64::MAX as u128 {
        u64::MAX
    } else {
        ticks as u64
    }
}

/// Builder for [`KernelConfig`].
#[derive(Debug, Clone, Default)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    pub fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    pub fn tick_rate_hz(mut self, hz: u32) -> Self {
        self.config.tick_rate_hz = hz;
        self
    }

    /// Sets the number of priorities. Clamped to `1..=64`.
    pub fn max_priorities(mut self, count: u8) -> Self {
        self.config.max_priorities = count.clamp(1, 64);
        self
    }

    pub fn total_heap_bytes(mut self, bytes: usize) -> Self {
        self.config.total_heap_bytes = bytes;
        self
    }

    pub fn minimal_stack_words(mut self, words: usize) -> Self {
        self.config.minimal_stack_words = words;
        self
    }

    /// Sets priority and stack of the timer service task.
    pub fn timer_task(mut self, priority: u8, stack_words: usize) -> Self {
        self.config.timer_task_priority = priority;
        self.config.timer_task_stack_words = stack_words;
        self
    }

    pub fn idle_hook(mut self, hook: fn()) -> Self {
        self.config.idle_hook = Some(hook);
        self
    }

    pub fn tick_hook(mut self, hook: fn()) -> Self {
        self.config.tick_hook = Some(hook);
        self
    }

    pub fn malloc_failed_hook(mut self, hook: fn()) -> Self {
        self.config.malloc_failed_hook = Some(hook);
        self
    }

    pub fn stack_overflow_hook(mut self, hook: fn(&'static str)) -> Self {
        self.config.stack_overflow_hook = Some(hook);
        self
    }

    pub fn build(self) -> KernelConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ms_to_ticks_at_default_rate_is_identity() {
        let config = KernelConfig::default();
        assert_eq!(config.ms_to_ticks(1_000), 1_000);
        assert_eq!(ms_to_ticks(1_000, 100), 100);
        assert_eq!(ms_to_ticks(5, 100), 0);
    }

    #[test]
    fn ms_to_ticks_does_not_overflow() {
        assert_eq!(ms_to_ticks(u64::MAX, 1_000), u64::MAX);
        assert_eq!(ms_to_ticks(u64::MAX, 100), u64::MAX / 10);
        assert_eq!(ms_to_ticks(u64::MAX / 10, 1_000), u64::MAX / 10);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = KernelConfig::builder()
            .name("demo")
            .max_priorities(8)
            .total_heap_bytes(512)
            .timer_task(7, 128)
            .build();
        assert_eq!(config.name, "demo");
        assert_eq!(config.max_priority(), 7);
        assert_eq!(config.total_heap_bytes, 512);
        assert_eq!(config.timer_task_priority, 7);
        assert_eq!(config.timer_task_stack_words, 128);
        assert_eq!(config.tick_rate_hz, DEFAULT_TICK_RATE_HZ);
    }
}
