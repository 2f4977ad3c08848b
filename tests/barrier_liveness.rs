mod common;

use anyhow::Result;
use common::SyncOnly;
use rti_perf::{
    BarrierCoordinator, CallbackMode, EventAccumulator, LocalRtiHub, PeerRegistry, Rti,
    SyncPointRegistry, WaitSettings,
};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn joined(hub: &LocalRtiHub, name: &str, mode: CallbackMode) -> Result<BarrierCoordinator> {
    let rti: Arc<dyn Rti> = Arc::new(hub.connect(mode));
    let sync = Arc::new(SyncPointRegistry::new());
    rti.join(name, "liveness", Arc::new(SyncOnly(Arc::clone(&sync))))?;

    let waiter = rti_perf::barrier::wait_strategy_for(mode, &rti);
    Ok(BarrierCoordinator::new(
        rti,
        sync,
        Arc::new(PeerRegistry::new(Arc::new(EventAccumulator::new(false)))),
        waiter,
        WaitSettings {
            poll_interval: Duration::from_millis(1),
            progress_interval: Duration::from_secs(5),
            deadline: Some(Duration::from_secs(10)),
        },
    ))
}

/// A and B reach "START" together; C's confirmation comes 500ms later.
/// Neither A nor B may leave the barrier before C has achieved it.
fn late_peer_holds_barrier(mode: CallbackMode) -> Result<()> {
    let hub = LocalRtiHub::new();
    hub.connect(mode).create_federation("liveness")?;

    let a = joined(&hub, "A", mode)?;
    let b = joined(&hub, "B", mode)?;
    let c = joined(&hub, "C", mode)?;
    let go = Arc::new(Barrier::new(3));
    let started = Instant::now();

    let fast = |barrier: BarrierCoordinator, go: Arc<Barrier>| {
        thread::spawn(move || -> Result<Instant> {
            go.wait();
            barrier.synchronize("START")?;
            Ok(Instant::now())
        })
    };
    let a_done = fast(a, Arc::clone(&go));
    let b_done = fast(b, Arc::clone(&go));

    let c_achieved = thread::spawn(move || -> Result<Instant> {
        go.wait();
        c.wait_until_announced("START")?;
        thread::sleep(Duration::from_millis(500));
        let achieved_at = Instant::now();
        c.mark_achieved_locally("START")?;
        c.wait_until_globally_achieved("START")?;
        Ok(achieved_at)
    });

    let a_done = a_done.join().expect("A panicked")?;
    let b_done = b_done.join().expect("B panicked")?;
    let c_achieved = c_achieved.join().expect("C panicked")?;

    assert!(a_done >= c_achieved, "A left the barrier before C achieved it");
    assert!(b_done >= c_achieved, "B left the barrier before C achieved it");
    assert!(a_done.duration_since(started) >= Duration::from_millis(500));
    Ok(())
}

#[test]
fn late_peer_holds_barrier_immediate() -> Result<()> {
    late_peer_holds_barrier(CallbackMode::Immediate)
}

#[test]
fn late_peer_holds_barrier_evoked() -> Result<()> {
    late_peer_holds_barrier(CallbackMode::Evoked)
}
