//! Button interrupt handlers.
//!
//! Button 1 is a vectored line: its handler saves the interrupt context
//! itself before doing anything else. Button 2 is non-vectored and gets the
//! save/restore from the common entry. Both bodies then do the same work:
//! toggle their LED, clear their own pending flag, and busy-wait with higher
//! levels allowed to preempt.

use hal::gpio::Edge;
use irq::{Handler, IsrContext};

use crate::board::{Board, Button};
use crate::trace::{DemoEvent, Led, Tracer};

#[derive(Clone)]
pub struct ButtonHandlers {
    board: Board,
    wait_seconds: u32,
    tracer: Tracer,
}

impl ButtonHandlers {
    pub fn new(board: Board, wait_seconds: u32, tracer: Tracer) -> Self {
        Self {
            board,
            wait_seconds,
            tracer,
        }
    }

    /// Vectored handler for button 1 (green LED).
    pub fn button1(&self) -> Handler {
        let this = self.clone();
        Handler::vectored(move |entry| {
            let ctx = entry.save_context();

            log::info!("--------Higher level");
            log::info!("----Begin button1 handler----Vector mode");
            this.service(&ctx, Button::One, Led::Green);
            log::info!("----End button1 handler");
            this.tracer.emit(DemoEvent::HandlerExit { irq: ctx.irq() });
        })
    }

    /// Non-vectored handler for button 2 (blue LED).
    pub fn button2(&self) -> Handler {
        let this = self.clone();
        Handler::non_vectored(move |ctx| {
            log::info!("--------Begin button2 handler----NonVector mode");
            this.service(ctx, Button::Two, Led::Blue);
            log::info!("--------End button2 handler");
            this.tracer.emit(DemoEvent::HandlerExit { irq: ctx.irq() });
        })
    }

    fn service(&self, ctx: &IsrContext<'_>, button: Button, led: Led) {
        self.tracer.emit(DemoEvent::HandlerEnter {
            irq: ctx.irq(),
            discipline: ctx.line().discipline,
        });

        self.board.toggle_led(led);
        self.tracer.emit(DemoEvent::LedToggled(led));

        let pin = self.board.pins.button(button);
        match self.board.gpio.clear_interrupt(pin, Edge::Rising) {
            Ok(()) => self.tracer.emit(DemoEvent::PendingCleared { pin }),
            Err(err) => log::error!("irq {}: cannot clear pending flag: {}", ctx.irq(), err),
        }

        let ticks = ctx.wait_seconds(self.wait_seconds);
        self.tracer.emit(DemoEvent::BusyWait {
            seconds: self.wait_seconds,
            ticks,
        });
    }
}
