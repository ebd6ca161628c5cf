//! Integration Tests for the Reactive Substrate
//!
//! These tests verify that signals, memos, and effects work together: reads
//! are tracked automatically and writes propagate without manual marking.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use settle_core::reactive::{
    Cleanup, Effect, Memo, MemoState, ReactiveContext, Runtime, Signal, SourceId, SubscriberId,
};

/// A memo tracks the signal it reads and picks up writes on the next read.
#[test]
fn memo_follows_signal_without_manual_marking() {
    let signal = Signal::new(10);

    let signal_clone = signal.clone();
    let memo = Memo::new(move || signal_clone.get() * 2);

    assert_eq!(memo.get(), 20);

    signal.set(5);
    assert_eq!(memo.state(), MemoState::MaybeDirty);
    assert_eq!(memo.get(), 10);
}

/// An effect re-runs synchronously when a signal it read changes.
#[test]
fn effect_reruns_on_signal_write() {
    let signal = Signal::new(0);
    let observed_value = Arc::new(AtomicI32::new(-1));
    let observed_clone = observed_value.clone();

    let signal_clone = signal.clone();
    let effect = Effect::new(move || {
        observed_clone.store(signal_clone.get(), Ordering::SeqCst);
    });

    // Effect runs on creation
    assert_eq!(observed_value.load(Ordering::SeqCst), 0);

    signal.set(42);
    assert_eq!(observed_value.load(Ordering::SeqCst), 42);
    assert_eq!(effect.run_count(), 2);
}

/// Memos cache their value between reads.
#[test]
fn memo_caches_expensive_computation() {
    let compute_count = Arc::new(AtomicI32::new(0));
    let compute_clone = compute_count.clone();

    let memo = Memo::new(move || {
        compute_clone.fetch_add(1, Ordering::SeqCst);
        42
    });

    assert_eq!(memo.get(), 42);
    assert_eq!(memo.get(), 42);
    assert_eq!(memo.get(), 42);
    assert_eq!(compute_count.load(Ordering::SeqCst), 1);
}

/// A chain signal -> memo -> memo -> effect updates end to end.
#[test]
fn memo_chain_drives_effect() {
    let base_signal = Signal::new(5);

    let signal_clone = base_signal.clone();
    let doubled = Memo::new(move || signal_clone.get() * 2);

    let doubled_clone = doubled.clone();
    let plus_ten = Memo::new(move || doubled_clone.get() + 10);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let _effect = Effect::new({
        let plus_ten = plus_ten.clone();
        let seen = seen.clone();
        move || seen.lock().unwrap().push(plus_ten.get())
    });

    base_signal.set(10);
    base_signal.set(0);

    assert_eq!(*seen.lock().unwrap(), vec![20, 30, 10]);
}

/// An effect behind a memo whose value did not change stays put.
#[test]
fn unchanged_memo_does_not_rerun_effect() {
    let number = Signal::new(2);

    let number_clone = number.clone();
    let parity = Memo::new(move || number_clone.get() % 2);

    let runs = Arc::new(AtomicI32::new(0));
    let _effect = Effect::new({
        let parity = parity.clone();
        let runs = runs.clone();
        move || {
            parity.get();
            runs.fetch_add(1, Ordering::SeqCst);
        }
    });

    number.set(4);
    number.set(6);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    number.set(7);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Cleanup runs before every re-run and once more on disposal.
#[test]
fn cleanup_brackets_each_run() {
    let signal = Signal::new(0);
    let log = Arc::new(Mutex::new(Vec::new()));

    let effect = Effect::with_cleanup({
        let signal = signal.clone();
        let log = log.clone();
        move || {
            let value = signal.get();
            log.lock().unwrap().push(format!("acquire {value}"));
            let log = log.clone();
            Cleanup::new(move || log.lock().unwrap().push(format!("release {value}")))
        }
    });

    signal.set(1);
    effect.dispose();
    signal.set(2);

    assert_eq!(
        *log.lock().unwrap(),
        vec!["acquire 0", "release 0", "acquire 1", "release 1"]
    );
}

/// Dropping the last handle of an effect releases its cleanup.
#[test]
fn dropped_effect_releases() {
    let released = Arc::new(AtomicI32::new(0));
    {
        let released = released.clone();
        let _effect = Effect::with_cleanup(move || {
            let released = released.clone();
            Cleanup::new(move || {
                released.fetch_add(1, Ordering::SeqCst);
            })
        });
    }
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

/// A disposed effect never runs again.
#[test]
fn disposed_effect_does_not_run() {
    let signal = Signal::new(0);
    let run_count = Arc::new(AtomicI32::new(0));

    let effect = Effect::new({
        let signal = signal.clone();
        let run_count = run_count.clone();
        move || {
            signal.get();
            run_count.fetch_add(1, Ordering::SeqCst);
        }
    });

    effect.dispose();
    signal.set(1);
    effect.schedule();

    assert_eq!(run_count.load(Ordering::SeqCst), 1);
}

/// Writes inside a batch reach effects once, after the batch.
#[test]
fn batch_coalesces_writes() {
    let first = Signal::new(1);
    let second = Signal::new(2);
    let sums = Arc::new(Mutex::new(Vec::new()));

    let _effect = Effect::new({
        let first = first.clone();
        let second = second.clone();
        let sums = sums.clone();
        move || sums.lock().unwrap().push(first.get() + second.get())
    });

    Runtime::batch(|| {
        first.set(10);
        second.set(20);
    });

    assert_eq!(*sums.lock().unwrap(), vec![3, 30]);
}

/// Untracked reads do not become dependencies.
#[test]
fn untracked_reads_are_ignored() {
    let tracked = Signal::new(0);
    let ignored = Signal::new(0);

    let effect = Effect::new({
        let tracked = tracked.clone();
        let ignored = ignored.clone();
        move || {
            tracked.get();
            Runtime::untrack(|| ignored.get());
        }
    });

    ignored.set(1);
    assert_eq!(effect.run_count(), 1);
    assert_eq!(effect.dependency_count(), 1);

    tracked.set(1);
    assert_eq!(effect.run_count(), 2);
}

/// Nested contexts keep their dependencies apart.
#[test]
fn nested_reactive_contexts() {
    let outer_id = SubscriberId::new();
    let inner_id = SubscriberId::new();
    let sources: Vec<SourceId> = (0..4).map(|_| SourceId::new()).collect();

    let _outer_ctx = ReactiveContext::enter(outer_id);
    ReactiveContext::track_dependency(sources[0], 1);
    ReactiveContext::track_dependency(sources[1], 1);

    {
        let _inner_ctx = ReactiveContext::enter(inner_id);
        ReactiveContext::track_dependency(sources[2], 5);
        ReactiveContext::track_dependency(sources[3], 2);

        let inner_deps = ReactiveContext::get_dependencies();
        assert_eq!(inner_deps, vec![(sources[2], 5), (sources[3], 2)]);
    }

    let outer_deps = ReactiveContext::get_dependencies();
    assert_eq!(outer_deps, vec![(sources[0], 1), (sources[1], 1)]);
}

/// Dependents are dropped from the runtime when they go away.
#[test]
fn dropped_memo_leaves_no_edges() {
    let signal = Signal::new(1);
    {
        let signal_clone = signal.clone();
        let memo = Memo::new(move || signal_clone.get() + 1);
        assert_eq!(memo.get(), 2);
        assert_eq!(signal.subscriber_count(), 1);
    }
    assert_eq!(signal.subscriber_count(), 0);
}
