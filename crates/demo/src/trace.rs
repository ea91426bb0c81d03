//! Structured trace of demo activity.
//!
//! Every diagnostic line the demo logs has a matching [`DemoEvent`]. An
//! installed [`TraceHook`] receives them synchronously, in the context that
//! produced them (interrupt, task or timer service).

use std::sync::Arc;

use hal::interrupt::Discipline;
use rtos::sync::Mutex;

use crate::boot::BootState;

/// Board LEDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Led {
    Red,
    Green,
    Blue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoEvent {
    Boot(BootState),
    HandlerEnter { irq: u16, discipline: Discipline },
    HandlerExit { irq: u16 },
    LedToggled(Led),
    PendingCleared { pin: u32 },
    BusyWait { seconds: u32, ticks: u64 },
    TimerFired,
    TaskStarted(&'static str),
    TaskRunning(&'static str),
}

pub type TraceHook = Arc<dyn Fn(&DemoEvent) + Send + Sync>;

/// Optional hook, cheap to clone into handlers and tasks.
#[derive(Clone, Default)]
pub struct Tracer {
    hook: Option<TraceHook>,
}

impl Tracer {
    pub fn new(hook: Option<TraceHook>) -> Self {
        Self { hook }
    }

    pub fn emit(&self, event: DemoEvent) {
        if let Some(hook) = &self.hook {
            hook(&event);
        }
    }
}

/// Trace hook that keeps every event in memory.
pub struct TraceRecorder {
    events: Mutex<Vec<DemoEvent>>,
}

impl TraceRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    /// Hook feeding this recorder
    pub fn hook(self: &Arc<Self>) -> TraceHook {
        let recorder = Arc::clone(self);
        Arc::new(move |event: &DemoEvent| recorder.events.with(|events| events.push(*event)))
    }

    pub fn events(&self) -> Vec<DemoEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&DemoEvent) -> bool) -> usize {
        self.events
            .with(|events| events.iter().filter(|event| predicate(event)).count())
    }

    pub fn clear(&self) {
        self.events.with(Vec::clear);
    }
}
