//! Board wiring: GPIO bank, hart and system timer.

use std::sync::Arc;

use hal::gpio::{Edge, GpioBank, GpioInterruptSource, Level, PinMask};
use hal::timer::Timebase;
use hal::HalResult;
use irq::Cpu;

use crate::config::PinMap;
use crate::trace::Led;

/// The two user buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    One,
    Two,
}

impl PinMap {
    pub fn led(&self, led: Led) -> u32 {
        match led {
            Led::Red => self.led_red,
            Led::Green => self.led_green,
            Led::Blue => self.led_blue,
        }
    }

    pub fn button(&self, button: Button) -> u32 {
        match button {
            Button::One => self.button_1,
            Button::Two => self.button_2,
        }
    }

    pub fn led_mask(&self) -> PinMask {
        PinMask::pin(self.led_red) | PinMask::pin(self.led_green) | PinMask::pin(self.led_blue)
    }

    pub fn button_mask(&self) -> PinMask {
        PinMask::pin(self.button_1) | PinMask::pin(self.button_2)
    }
}

/// Peripherals shared by handlers, tasks and the timer callback.
#[derive(Clone)]
pub struct Board {
    pub gpio: Arc<GpioBank>,
    pub cpu: Arc<Cpu>,
    pub timebase: Arc<dyn Timebase>,
    pub pins: PinMap,
}

impl Board {
    pub fn new(timebase: Arc<dyn Timebase>, pins: PinMap) -> Self {
        Self {
            gpio: Arc::new(GpioBank::new()),
            cpu: Arc::new(Cpu::new()),
            timebase,
            pins,
        }
    }

    /// Interrupt request wire of `button`: its rising-edge pending flag.
    pub fn button_source(&self, button: Button) -> HalResult<GpioInterruptSource> {
        GpioInterruptSource::new(Arc::clone(&self.gpio), self.pins.button(button), Edge::Rising)
    }

    pub fn toggle_led(&self, led: Led) {
        self.gpio.toggle(PinMask::pin(self.pins.led(led)));
    }

    /// Number of times `led` has been toggled since reset.
    pub fn led_toggles(&self, led: Led) -> u32 {
        self.gpio.toggle_count(self.pins.led(led))
    }

    pub fn led_is_on(&self, led: Led) -> bool {
        self.gpio.read(PinMask::pin(self.pins.led(led))) != 0
    }

    /// Press and release `button`.
    pub fn press(&self, button: Button) -> HalResult<()> {
        let offset = self.pins.button(button);
        self.gpio.drive_input(offset, Level::High)?;
        self.gpio.drive_input(offset, Level::Low)
    }
}

/// Put the GPIO bank in the state the demo expects.
///
/// Buttons become pulled-up inputs with rising-edge interrupts, LEDs become
/// outputs driven low.
pub fn board_gpio_init(gpio: &GpioBank, pins: &PinMap) -> HalResult<()> {
    for offset in [
        pins.led_red,
        pins.led_green,
        pins.led_blue,
        pins.button_1,
        pins.button_2,
    ] {
        gpio.pin(offset)?;
    }

    let buttons = pins.button_mask();
    gpio.enable_input(buttons);
    gpio.set_pull_up(buttons, u32::MAX);

    let leds = pins.led_mask();
    gpio.enable_output(leds);
    gpio.write(leds, 0);

    gpio.enable_interrupt(buttons, Edge::Rising);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::timer::SimTimebase;
    use hal::HalError;

    #[test]
    fn init_configures_buttons_and_leds() {
        let pins = PinMap::default();
        let gpio = GpioBank::new();
        gpio.write(pins.led_mask(), u32::MAX);

        board_gpio_init(&gpio, &pins).unwrap();
        assert_eq!(gpio.read(pins.led_mask()), 0);
        assert_eq!(gpio.pull_up(), pins.button_mask());

        gpio.drive_input(pins.button_1, Level::High).unwrap();
        assert!(gpio.interrupt_pending(pins.button_1, Edge::Rising));
        assert!(!gpio.interrupt_pending(pins.button_2, Edge::Rising));
    }

    #[test]
    fn init_rejects_pin_outside_bank() {
        let pins = PinMap {
            led_blue: 40,
            ..PinMap::default()
        };
        assert_eq!(
            board_gpio_init(&GpioBank::new(), &pins),
            Err(HalError::InvalidPin(40))
        );
    }

    #[test]
    fn press_latches_only_that_buttons_flag() {
        let board = Board::new(Arc::new(SimTimebase::new(1_000)), PinMap::default());
        board_gpio_init(&board.gpio, &board.pins).unwrap();

        board.press(Button::Two).unwrap();
        let pending = board.gpio.pending(Edge::Rising);
        assert_eq!(pending, PinMask::pin(board.pins.button_2));
    }
}
