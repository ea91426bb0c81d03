//! Host runner for the two-button demo.
//!
//! Simulates the board for a fixed amount of time, pressing buttons at the
//! requested moments, or with `--realtime` runs against the wall clock until
//! the system halts.

use std::process::ExitCode;

use anyhow::Result;
use button_demo::{ButtonPress, DemoConfig, Machine};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "button-demo")]
#[command(about = "Vectored and non-vectored button interrupts next to tasks and an LED timer")]
#[command(version)]
struct Opts {
    /// Simulated run time in milliseconds
    #[arg(long, default_value_t = 5_000, value_name = "MS")]
    duration_ms: u64,

    /// Press a button at a simulated time, e.g. `a@1200` or `b@300`
    #[arg(long = "press", value_name = "BUTTON@MS")]
    presses: Vec<ButtonPress>,

    /// How long each button handler busy-waits
    #[arg(long, default_value_t = 1, value_name = "SECONDS")]
    wait_seconds: u32,

    /// Run on the wall clock forever instead of simulating
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts = Opts::parse();

    let config = DemoConfig::builder()
        .handler_wait_seconds(opts.wait_seconds)
        .build();

    if opts.realtime {
        button_demo::run(config);
    }

    let mut machine = Machine::boot(config, None)?;
    for press in opts.presses {
        machine.schedule_press(press);
    }

    let summary = machine.run_for(opts.duration_ms);
    println!(
        "ran {} ticks ({} ms simulated): red {} green {} blue {} toggles",
        summary.ticks,
        machine.now_ms(),
        summary.red_toggles,
        summary.green_toggles,
        summary.blue_toggles
    );

    match summary.halted {
        Some(reason) => {
            eprintln!("halted: {reason}");
            Ok(ExitCode::FAILURE)
        }
        None => Ok(ExitCode::SUCCESS),
    }
}
