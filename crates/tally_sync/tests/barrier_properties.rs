//! Integration tests for cyclic barrier guarantees: exactly-once trip,
//! release ordering, reuse across cohorts and break propagation.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tally_sync::{BarrierError, BrokenCause, CyclicBarrier};

fn parties(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

#[test]
fn test_exactly_once_trip_for_many_party_sizes() {
    for p in 1..=12 {
        let trips = Arc::new(AtomicUsize::new(0));
        let arrived = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&trips);
        let seen = Arc::clone(&arrived);
        let barrier = Arc::new(CyclicBarrier::new(parties(p), move |_: u64| {
            // Every party has entered wait() by the time the action runs.
            assert_eq!(seen.load(Ordering::SeqCst), p);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), std::convert::Infallible>(())
        }));

        let handles: Vec<_> = (0..p)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let arrived = Arc::clone(&arrived);
                thread::spawn(move || {
                    arrived.fetch_add(1, Ordering::SeqCst);
                    barrier.wait().unwrap()
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(trips.load(Ordering::SeqCst), 1, "party size {p}");
    }
}

#[test]
fn test_reuse_across_cohorts_with_fresh_threads() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let barrier = Arc::new(CyclicBarrier::new(parties(3), move |generation: u64| {
        sink.lock().push(generation);
        Ok::<(), std::convert::Infallible>(())
    }));

    for round in 0..5u64 {
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || barrier.wait().unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().generation, round);
        }
        assert_eq!(barrier.generation(), round + 1);
    }

    assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_same_threads_cycle_many_generations() {
    const ROUNDS: u64 = 200;
    let trips = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&trips);
    let barrier = Arc::new(CyclicBarrier::new(parties(4), move |_: u64| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<(), std::convert::Infallible>(())
    }));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    assert_eq!(barrier.wait().unwrap().generation, round);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(trips.load(Ordering::SeqCst), ROUNDS as usize);
}

#[test]
fn test_cancel_propagates_to_every_waiter() {
    let barrier = Arc::new(CyclicBarrier::plain(parties(5)));
    let cancel = barrier.cancel_handle();

    let victim = {
        let barrier = Arc::clone(&barrier);
        let cancel = cancel.clone();
        thread::spawn(move || barrier.wait_cancellable(&cancel))
    };
    let others: Vec<_> = (0..3)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait())
        })
        .collect();

    while barrier.waiting() < 4 {
        thread::yield_now();
    }
    cancel.cancel();

    assert!(matches!(victim.join().unwrap(), Err(BarrierError::Cancelled)));
    for other in others {
        assert!(matches!(
            other.join().unwrap(),
            Err(BarrierError::Broken(BrokenCause::Cancelled))
        ));
    }

    // The missing fifth party arrives late and fails fast.
    assert!(matches!(
        barrier.wait_timeout(Duration::from_secs(5)),
        Err(BarrierError::Broken(BrokenCause::Cancelled))
    ));
}

#[test]
fn test_timeout_propagates_to_other_waiters() {
    let barrier = Arc::new(CyclicBarrier::plain(parties(3)));
    let patient = {
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || barrier.wait())
    };
    while barrier.waiting() < 1 {
        thread::yield_now();
    }

    assert!(matches!(
        barrier.wait_timeout(Duration::from_millis(10)),
        Err(BarrierError::TimedOut)
    ));
    assert!(matches!(
        patient.join().unwrap(),
        Err(BarrierError::Broken(BrokenCause::TimedOut))
    ));
}
