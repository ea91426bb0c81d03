//! Integration tests for interrupt registration, arbitration and nesting.

use std::sync::{Arc, Mutex};

use hal::interrupt::{
    Discipline, InterruptController, InterruptLine, RegistrationError, SoftwareSource,
};
use hal::timer::SimTimebase;
use irq::context::{MCAUSE_MPIE, MSTATUS_MPIE};
use irq::{Cpu, DispatchConfig, DispatchError, Handler, InterruptDispatch, COMMON_ENTRY};

const TASK_PC: usize = 0x2000_0040;

fn dispatcher(step: u64) -> (Arc<Cpu>, InterruptDispatch) {
    let cpu = Arc::new(Cpu::new());
    cpu.set_pc(TASK_PC);
    let timebase = Arc::new(SimTimebase::new(1_000).with_step(step));
    let dispatch = InterruptDispatch::new(Arc::clone(&cpu), timebase, DispatchConfig::default());
    (cpu, dispatch)
}

#[test]
fn registration_rejects_occupied_slot_and_wrong_handler_kind() {
    let (_cpu, mut dispatch) = dispatcher(1);
    let source = Arc::new(SoftwareSource::new());

    dispatch
        .register(
            InterruptLine::vectored(49, 3, 0),
            source.clone(),
            Handler::vectored(|entry| drop(entry.save_context())),
        )
        .expect("register vectored line");

    let err = dispatch
        .register(
            InterruptLine::vectored(49, 3, 0),
            source.clone(),
            Handler::vectored(|entry| drop(entry.save_context())),
        )
        .unwrap_err();
    assert_eq!(err, RegistrationError::SlotOccupied { irq: 49 });

    let err = dispatch
        .register(
            InterruptLine::non_vectored(50, 2, 0),
            source.clone(),
            Handler::vectored(|entry| drop(entry.save_context())),
        )
        .unwrap_err();
    assert_eq!(
        err,
        RegistrationError::DisciplineMismatch {
            irq: 50,
            line: Discipline::NonVectored
        }
    );

    // Lines may share a level as long as they use distinct slots
    dispatch
        .register(
            InterruptLine::non_vectored(51, 3, 1),
            source,
            Handler::non_vectored(|_ctx| {}),
        )
        .expect("same level, different slot");
}

#[test]
fn higher_level_line_is_served_first() {
    let (_cpu, mut dispatch) = dispatcher(1);
    let order = Arc::new(Mutex::new(Vec::new()));

    let low = Arc::new(SoftwareSource::new());
    let high = Arc::new(SoftwareSource::new());

    let (seen, src) = (order.clone(), low.clone());
    dispatch
        .register(
            InterruptLine::non_vectored(50, 2, 0),
            low.clone(),
            Handler::non_vectored(move |ctx| {
                seen.lock().unwrap().push(ctx.irq());
                src.clear();
            }),
        )
        .unwrap();
    let (seen, src) = (order.clone(), high.clone());
    dispatch
        .register(
            InterruptLine::vectored(49, 3, 0),
            high.clone(),
            Handler::vectored(move |entry| {
                let ctx = entry.save_context();
                seen.lock().unwrap().push(ctx.irq());
                src.clear();
            }),
        )
        .unwrap();

    low.pend();
    high.pend();
    assert_eq!(dispatch.service(), Ok(2));
    assert_eq!(*order.lock().unwrap(), vec![49, 50]);
}

#[test]
fn disabled_line_is_not_dispatched() {
    let (_cpu, mut dispatch) = dispatcher(1);
    let source = Arc::new(SoftwareSource::new());
    dispatch
        .register(
            InterruptLine::non_vectored(50, 2, 0),
            source.clone(),
            Handler::non_vectored(|_ctx| {}),
        )
        .unwrap();

    dispatch.disable_interrupt(50).unwrap();
    source.pend();
    assert!(dispatch.is_pending(50));
    assert_eq!(dispatch.service(), Ok(0));

    dispatch.clear_pending(50).unwrap();
    assert!(!dispatch.is_pending(50));
    assert!(dispatch.enable_interrupt(7).is_err());
}

#[test]
fn vectored_handler_preempts_busy_waiting_non_vectored_handler() {
    let (cpu, mut dispatch) = dispatcher(5);
    let line_a = Arc::new(SoftwareSource::new());
    let line_b = Arc::new(SoftwareSource::new());
    let trace = Arc::new(Mutex::new(Vec::new()));

    let (seen, src, hart) = (trace.clone(), line_a.clone(), cpu.clone());
    dispatch
        .register(
            InterruptLine::vectored(49, 3, 0),
            line_a.clone(),
            Handler::vectored(move |entry| {
                let ctx = entry.save_context();
                seen
                    .lock()
                    .unwrap()
                    .push(format!("A begin depth {}", ctx.nesting_depth()));
                // A interrupted B's body, not the task
                assert_eq!(ctx.saved().mepc(), COMMON_ENTRY);
                assert_eq!(ctx.saved().previous_level(), 2);
                src.clear();
                ctx.wait_seconds(1);
                seen.lock().unwrap().push("A end".to_string());
                drop(ctx);
                assert!(!hart.interrupts_enabled());
                assert_eq!(hart.mepc(), COMMON_ENTRY);
            }),
        )
        .unwrap();

    let (seen, src, pend_a) = (trace.clone(), line_b.clone(), line_a.clone());
    dispatch
        .register(
            InterruptLine::non_vectored(50, 2, 0),
            line_b.clone(),
            Handler::non_vectored(move |ctx| {
                seen.lock().unwrap().push("B begin".to_string());
                src.clear();
                pend_a.pend();
                ctx.wait_seconds(1);
                seen.lock().unwrap().push("B end".to_string());
            }),
        )
        .unwrap();

    line_b.pend();
    assert_eq!(dispatch.service(), Ok(1));

    assert_eq!(
        *trace.lock().unwrap(),
        vec!["B begin", "A begin depth 2", "A end", "B end"]
    );
    // Back in the task, exactly where it was interrupted
    assert_eq!(cpu.pc(), TASK_PC);
    assert_eq!(cpu.level(), 0);
    assert_eq!(cpu.depth(), 0);
    assert_eq!(cpu.trap_type(), 0);
    assert!(cpu.interrupts_enabled());
}

#[test]
fn vectored_handler_saved_context_matches_restored_context() {
    let (cpu, mut dispatch) = dispatcher(1);
    let source = Arc::new(SoftwareSource::new());
    let observed = Arc::new(Mutex::new(None));

    let (seen, src, hart) = (observed.clone(), source.clone(), cpu.clone());
    dispatch
        .register(
            InterruptLine::vectored(49, 3, 0),
            source.clone(),
            Handler::vectored(move |entry| {
                let ctx = entry.save_context();
                let saved = snapshot_saved(ctx.saved());
                src.clear();
                drop(ctx);
                let restored = snapshot_cpu(&hart);
                *seen.lock().unwrap() = Some((saved, restored));
            }),
        )
        .unwrap();

    source.pend();
    dispatch.service().unwrap();

    let (saved, restored) = observed.lock().unwrap().take().expect("handler ran");
    assert_eq!(saved, restored);
    assert_eq!(saved.0, TASK_PC);
}

type Snapshot = (usize, u32, u32, u32, bool);

fn snapshot_saved(saved: &irq::ExecutionContext) -> Snapshot {
    (
        saved.mepc(),
        saved.mcause(),
        saved.msubm(),
        saved.depth(),
        saved.mcause() & MCAUSE_MPIE != 0,
    )
}

fn snapshot_cpu(cpu: &Cpu) -> Snapshot {
    (
        cpu.mepc(),
        cpu.mcause(),
        cpu.msubm(),
        cpu.depth(),
        cpu.mstatus() & MSTATUS_MPIE != 0,
    )
}

#[test]
fn nested_vectored_handler_restores_every_saved_field() {
    let (cpu, mut dispatch) = dispatcher(5);
    let high = Arc::new(SoftwareSource::new());
    let low = Arc::new(SoftwareSource::new());
    let trace = Arc::new(Mutex::new(Vec::new()));
    let observed = Arc::new(Mutex::new(None));

    let (seen, src) = (trace.clone(), high.clone());
    dispatch
        .register(
            InterruptLine::vectored(49, 3, 0),
            high.clone(),
            Handler::vectored(move |entry| {
                let ctx = entry.save_context();
                src.clear();
                seen.lock()
                    .unwrap()
                    .push(format!("high depth {}", ctx.nesting_depth()));
            }),
        )
        .unwrap();

    let (seen, src, pend_high, hart, out) = (
        trace.clone(),
        low.clone(),
        high.clone(),
        cpu.clone(),
        observed.clone(),
    );
    dispatch
        .register(
            InterruptLine::vectored(50, 2, 0),
            low.clone(),
            Handler::vectored(move |entry| {
                let ctx = entry.save_context();
                let saved = snapshot_saved(ctx.saved());
                src.clear();
                pend_high.pend();
                ctx.wait_seconds(1);
                seen.lock().unwrap().push("low end".to_string());
                drop(ctx);
                *out.lock().unwrap() = Some((saved, snapshot_cpu(&hart)));
            }),
        )
        .unwrap();

    low.pend();
    assert_eq!(dispatch.service(), Ok(1));

    assert_eq!(*trace.lock().unwrap(), vec!["high depth 2", "low end"]);
    let (saved, restored) = observed.lock().unwrap().take().expect("handler ran");
    assert_eq!(saved, restored);
    assert_eq!(saved.0, TASK_PC);
    assert_eq!(saved.3, 1);
    assert_eq!(cpu.pc(), TASK_PC);
    assert_eq!(cpu.depth(), 0);
    assert!(cpu.interrupts_enabled());
}

#[test]
fn line_that_never_clears_is_reported_as_storm() {
    let (_cpu, mut dispatch) = dispatcher(1);
    let source = Arc::new(SoftwareSource::new());
    dispatch
        .register(
            InterruptLine::non_vectored(50, 2, 0),
            source.clone(),
            Handler::non_vectored(|_ctx| {}),
        )
        .unwrap();

    source.pend();
    let err = dispatch.service().unwrap_err();
    assert_eq!(
        err,
        DispatchError::InterruptStorm {
            irq: 50,
            dispatches: DispatchConfig::default().storm_threshold
        }
    );
    // The fault is sticky
    assert_eq!(dispatch.fault(), Some(err));
    assert_eq!(dispatch.service(), Err(err));
}
