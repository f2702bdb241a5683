use eventsink::history::HistoryBuffer;
use eventsink::{
    ChannelSpec, CongestionPolicy, EarlyBehavior, Event, EventSink, FnHandler, MemoryEventStore,
    OutboundPort, ReadyEventStore, SinkConfig,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

fn config(congestion: CongestionPolicy) -> SinkConfig {
    SinkConfig {
        channels: vec![ChannelSpec::complex_f32()],
        n_threads: 1,
        history_kilosamples: 1,
        congestion,
        dispatch_capacity: 1,
        ..SinkConfig::default()
    }
}

fn store_with(anchors: &[u64]) -> Arc<MemoryEventStore> {
    let store = Arc::new(MemoryEventStore::new(EarlyBehavior::Discard));
    for &anchor in anchors {
        store.add(Event::new(anchor, 8));
    }
    store
}

fn chunk(history: &mut HistoryBuffer, items: usize) {
    history.push(&[vec![0u8; items * 8].as_slice()]).unwrap();
}

#[test]
fn test_drop_policy_rolls_back_created_count() {
    let store = store_with(&[10, 20, 30, 40, 50]);
    let gate = Arc::new(Barrier::new(2));
    let handler_gate = gate.clone();
    let handler = FnHandler::new(move |_: &Event| {
        handler_gate.wait();
        Ok(())
    });

    let cfg = config(CongestionPolicy::Drop);
    let mut sink = EventSink::new(cfg.clone(), store.clone(), Arc::new(handler), OutboundPort::disconnected()).unwrap();
    sink.start().unwrap();
    let mut history = HistoryBuffer::new(&cfg.channels, sink.history());
    chunk(&mut history, 100);

    sink.work(&history.buffers(), history.available(), &[]).unwrap();

    // One worker parked in the handler plus one queue slot: at most two survive
    let created = sink.num_created();
    assert!((1..=2).contains(&created), "created = {created}");
    assert_eq!(store.counters().removed, 5, "every event was fetched");
    assert_eq!(sink.live_events().len() as u64, created, "dropped events never enter the live index");

    for _ in 0..created {
        gate.wait();
    }
    sink.wait_events();

    assert_eq!(sink.num_completed(), created);
    assert_eq!(sink.num_events(), 0);
    assert!(sink.live_events().is_empty());
}

#[test]
fn test_block_policy_never_loses_events() {
    let anchors: Vec<u64> = (1..=10).map(|n| n * 5).collect();
    let store = store_with(&anchors);
    let handled = Arc::new(AtomicU64::new(0));
    let counter = handled.clone();
    let handler = FnHandler::new(move |_: &Event| {
        std::thread::sleep(Duration::from_millis(2));
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let cfg = config(CongestionPolicy::Block);
    let mut sink = EventSink::new(cfg.clone(), store.clone(), Arc::new(handler), OutboundPort::disconnected()).unwrap();
    sink.start().unwrap();
    let mut history = HistoryBuffer::new(&cfg.channels, sink.history());
    chunk(&mut history, 100);

    sink.work(&history.buffers(), history.available(), &[]).unwrap();
    assert_eq!(sink.num_created(), 10, "blocking dispatch keeps every event");

    sink.wait_events();
    assert_eq!(handled.load(Ordering::SeqCst), 10);
    assert_eq!(sink.num_completed(), 10);
    assert!(sink.live_events().is_empty());
    assert!(store.is_empty());
}

#[test]
fn test_block_policy_survives_full_completion_queue() {
    // Tiny completion queue: the producer must drain it while it waits
    let anchors: Vec<u64> = (0..40).collect();
    let store = store_with(&anchors);
    let cfg = SinkConfig {
        n_threads: 4,
        completion_capacity: 1,
        ..config(CongestionPolicy::Block)
    };
    let mut sink = EventSink::new(
        cfg.clone(),
        store,
        Arc::new(FnHandler::new(|_: &Event| Ok(()))),
        OutboundPort::disconnected(),
    )
    .unwrap();
    sink.start().unwrap();
    let mut history = HistoryBuffer::new(&cfg.channels, sink.history());
    chunk(&mut history, 100);

    sink.work(&history.buffers(), history.available(), &[]).unwrap();
    sink.wait_events();

    assert_eq!(sink.num_created(), 40);
    assert_eq!(sink.num_completed(), 40);
    assert!(sink.live_events().is_empty());
}
