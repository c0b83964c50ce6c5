use super::*;
use crate::app::ChildGroup;
use crate::error::{ExchangeError, GeometryError};
use crate::lifecycle::{LoopEnd, LoopReport, LoopRole};
use crate::frame::{Frame, FrameGeometry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn small_geometry() -> FrameGeometry {
    FrameGeometry::rgb(2, 2)
}

fn frame_of(value: f32) -> Frame {
    Frame::filled(small_geometry().samples(), value)
}

#[test]
fn test_initial_state() {
    let exchange = FrameExchange::allocate(small_geometry()).unwrap();

    assert_eq!(exchange.ring_index().unwrap(), ROTATION - 1);
    assert_eq!(exchange.update_flag().unwrap(), UpdateFlag::Unclaimed);
    assert_eq!(exchange.read_display().unwrap(), frame_of(0.0));
    for slot in 0..POOL_SLOTS {
        assert_eq!(exchange.read_pool_slot(slot).unwrap(), frame_of(0.0));
    }
}

#[test]
fn test_zero_geometry_rejected() {
    let result = FrameExchange::allocate(FrameGeometry::new(0, 4, 3));
    assert!(matches!(result, Err(ExchangeError::Geometry(_))));
}

#[test]
fn test_oversized_geometry_rejected() {
    let result = FrameExchange::allocate(FrameGeometry::new(usize::MAX / 8, 4, 3));
    assert!(matches!(
        result,
        Err(ExchangeError::Geometry(GeometryError::TooLarge { .. }))
    ));

    // Frame bytes fit, four padded slots do not
    let result = FrameExchange::allocate(FrameGeometry::new(usize::MAX / 16, 1, 1));
    assert!(matches!(
        result,
        Err(ExchangeError::Geometry(GeometryError::TooLarge { .. }))
    ));
}

#[test]
fn test_publish_rotates_over_two_slots() {
    let exchange = FrameExchange::allocate(small_geometry()).unwrap();
    let ports = exchange.ports();

    for k in 0..7usize {
        let frame = frame_of(k as f32 + 1.0);
        let slot = ports.capture.publish(&frame).unwrap();

        assert_eq!(slot, k % ROTATION);
        assert_eq!(exchange.ring_index().unwrap(), k % ROTATION);
        assert_eq!(exchange.read_pool_slot(slot).unwrap(), frame);
    }

    // The slot outside the rotation is never written
    assert_eq!(exchange.read_pool_slot(POOL_SLOTS - 1).unwrap(), frame_of(0.0));
}

#[test]
fn test_publish_rejects_wrong_size() {
    let exchange = FrameExchange::allocate(small_geometry()).unwrap();
    let ports = exchange.ports();

    let err = ports.capture.publish(&Frame::zeroed(5)).unwrap_err();
    assert!(matches!(
        err,
        ExchangeError::SlotSize {
            expected: 12,
            actual: 5
        }
    ));
    assert_eq!(exchange.ring_index().unwrap(), ROTATION - 1);
}

/// Every rotation slot, read under lock A, holds a single value
fn assert_rotation_slots_whole(exchange: &FrameExchange) {
    let pool = exchange.lock_pool().unwrap();
    for index in 0..ROTATION {
        let slot = pool.slot(index);
        let first = slot[0];
        assert!(
            slot.iter().all(|&s| s == first),
            "observed a half-written slot {}",
            index
        );
    }
}

/// Publish 1..=count, pausing half way through each write
fn publish_slowly(capture: &CapturePort, count: u32) -> Result<(), ExchangeError> {
    for k in 1..=count {
        capture.publish_with(|slot| {
            let half = slot.len() / 2;
            slot[..half].fill(k as f32);
            thread::sleep(Duration::from_millis(5));
            slot[half..].fill(k as f32);
        })?;
    }
    Ok(())
}

/// Run `body` in a forked child; it must not panic, errors become exit code 1
fn spawn_child<F>(role: LoopRole, body: F) -> ChildGroup
where
    F: FnOnce() -> Result<(), String>,
{
    let mut group = ChildGroup::new();
    group
        .spawn(role, || {
            let ended_by = match body() {
                Ok(()) => LoopEnd::FrameCount,
                Err(reason) => LoopEnd::Failed(reason),
            };
            LoopReport {
                role,
                ended_by,
                elapsed: Duration::ZERO,
                frames: 0,
                secondary: 0,
            }
        })
        .unwrap();
    group
}

fn wait_for_exit(group: &mut ChildGroup) {
    for _ in 0..1000 {
        group.reap().unwrap();
        if group.all_exited() {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("child did not exit in time");
}

#[test]
fn test_reader_never_sees_partial_write() {
    let geometry = FrameGeometry::rgb(16, 16);
    let exchange = FrameExchange::allocate(geometry).unwrap();
    let ports = exchange.ports();
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let capture = ports.capture.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            publish_slowly(&capture, 10).unwrap();
            done.store(true, Ordering::SeqCst);
        })
    };

    let mut reads = 0;
    while !done.load(Ordering::SeqCst) {
        assert_rotation_slots_whole(&exchange);
        reads += 1;
        thread::sleep(Duration::from_millis(1));
    }

    writer.join().unwrap();
    assert!(reads > 0);
}

#[test]
fn test_forked_writer_excludes_reader() {
    let geometry = FrameGeometry::rgb(16, 16);
    let exchange = FrameExchange::allocate(geometry).unwrap();
    let capture = exchange.ports().capture;

    let mut group = spawn_child(LoopRole::Capture, || {
        publish_slowly(&capture, 10).map_err(|e| e.to_string())
    });

    let mut reads = 0;
    while group.is_running(LoopRole::Capture) {
        assert_rotation_slots_whole(&exchange);
        reads += 1;
        thread::sleep(Duration::from_millis(1));
        group.reap().unwrap();
    }

    assert_eq!(group.exit_code(), 0);
    assert!(reads > 0);

    // The child's writes landed in the shared mapping
    assert_eq!(exchange.ring_index().unwrap(), 1);
    assert_eq!(
        exchange.read_pool_slot(1).unwrap(),
        Frame::filled(geometry.samples(), 10.0)
    );
    assert_eq!(
        exchange.read_pool_slot(0).unwrap(),
        Frame::filled(geometry.samples(), 9.0)
    );
}

#[test]
fn test_forked_relay_delivers_to_parent() {
    let exchange = FrameExchange::allocate(small_geometry()).unwrap();
    let ports = exchange.ports();
    let mut held = Frame::zeroed(0);

    // Presenter side stays in this process and asks for a frame
    assert!(ports.present.claim(&mut held).unwrap());
    assert_eq!(held, frame_of(0.0));

    let capture = ports.capture.clone();
    let relay = ports.relay.clone();
    let mut group = spawn_child(LoopRole::Relay, || {
        let mut scratch = Frame::zeroed(0);
        let relayed = capture
            .publish(&frame_of(10.0))
            .and_then(|_| capture.publish(&frame_of(20.0)))
            .and_then(|_| relay.relay_if_requested(&mut scratch))
            .map_err(|e| e.to_string())?;
        match relayed {
            RelayOutcome::Relayed { slot: 1 } => Ok(()),
            other => Err(format!("unexpected relay outcome {:?}", other)),
        }
    });

    let mut claimed = false;
    for _ in 0..1000 {
        if ports.present.claim(&mut held).unwrap() {
            claimed = true;
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    wait_for_exit(&mut group);

    assert_eq!(group.exit_code(), 0);
    assert!(claimed);
    assert_eq!(held, frame_of(20.0));
    assert_eq!(exchange.ring_index().unwrap(), 1);
    assert_eq!(exchange.update_flag().unwrap(), UpdateFlag::Requested);
}

#[test]
fn test_relay_copies_newest_slot_when_requested() {
    let exchange = FrameExchange::allocate(small_geometry()).unwrap();
    let ports = exchange.ports();
    let mut scratch = Frame::zeroed(0);

    ports.capture.publish(&frame_of(10.0)).unwrap();
    ports.capture.publish(&frame_of(11.0)).unwrap();
    exchange.set_update_flag(UpdateFlag::Requested).unwrap();

    let outcome = ports.relay.relay_if_requested(&mut scratch).unwrap();

    assert_eq!(outcome, RelayOutcome::Relayed { slot: 1 });
    assert_eq!(exchange.read_display().unwrap(), frame_of(11.0));
    assert_eq!(exchange.update_flag().unwrap(), UpdateFlag::Unclaimed);
}

#[test]
fn test_relay_idle_without_request() {
    let exchange = FrameExchange::allocate(small_geometry()).unwrap();
    let ports = exchange.ports();
    let mut scratch = Frame::zeroed(0);

    ports.capture.publish(&frame_of(3.0)).unwrap();
    let outcome = ports.relay.relay_if_requested(&mut scratch).unwrap();

    assert_eq!(outcome, RelayOutcome::NotRequested);
    assert_eq!(exchange.read_display().unwrap(), frame_of(0.0));
    assert_eq!(exchange.update_flag().unwrap(), UpdateFlag::Unclaimed);
}

#[test]
fn test_present_claims_once() {
    let exchange = FrameExchange::allocate(small_geometry()).unwrap();
    let ports = exchange.ports();
    let mut held = Frame::zeroed(0);

    assert!(ports.present.claim(&mut held).unwrap());
    assert_eq!(exchange.update_flag().unwrap(), UpdateFlag::Requested);

    assert!(!ports.present.claim(&mut held).unwrap());
    assert_eq!(exchange.update_flag().unwrap(), UpdateFlag::Requested);
    assert_eq!(held, frame_of(0.0));
}

#[test]
fn test_handshake_round_trip() {
    let exchange = FrameExchange::allocate(small_geometry()).unwrap();
    let ports = exchange.ports();
    let mut scratch = Frame::zeroed(0);
    let mut held = Frame::zeroed(0);

    // Presenter claims the empty display, relay answers with the newest frame
    assert!(ports.present.claim(&mut held).unwrap());
    ports.capture.publish(&frame_of(5.0)).unwrap();
    ports.capture.publish(&frame_of(6.0)).unwrap();
    ports.capture.publish(&frame_of(7.0)).unwrap();
    assert_eq!(
        ports.relay.relay_if_requested(&mut scratch).unwrap(),
        RelayOutcome::Relayed { slot: 0 }
    );

    // Frames 5 and 6 were dropped; only the newest reached the presenter
    assert!(ports.present.claim(&mut held).unwrap());
    assert_eq!(held, frame_of(7.0));
}
