use eventsink::history::HistoryBuffer;
use eventsink::{
    ChannelSpec, EarlyBehavior, Event, EventSink, FnHandler, MemoryEventStore, OutboundPort, SinkConfig,
};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

#[test]
fn test_utilization_and_run_ratio_follow_running_handlers() {
    let store = Arc::new(MemoryEventStore::new(EarlyBehavior::Discard));
    store.add(Event::new(4, 2));
    store.add(Event::new(8, 2));
    store.add(Event::new(500, 2));

    let gate = Arc::new(Barrier::new(3));
    let handler_gate = gate.clone();
    let handler = FnHandler::new(move |_: &Event| {
        handler_gate.wait();
        Ok(())
    });

    let cfg = SinkConfig {
        channels: vec![ChannelSpec::complex_f32()],
        n_threads: 2,
        history_kilosamples: 1,
        ..SinkConfig::default()
    };
    let mut sink = EventSink::new(cfg.clone(), store, Arc::new(handler), OutboundPort::disconnected()).unwrap();
    sink.start().unwrap();

    let mut history = HistoryBuffer::new(&cfg.channels, sink.history());
    history.push(&[vec![0u8; 100 * 8].as_slice()]).unwrap();
    sink.work(&history.buffers(), history.available(), &[]).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while sink.num_running_handlers() < 2 {
        assert!(Instant::now() < deadline, "handlers never started");
        std::thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(sink.event_thread_utilization(), 100.0);
    assert_eq!(sink.event_run_ratio(), 100.0);
    assert_eq!(sink.buffer_window_size(), 100);
    assert_eq!(sink.event_queue_size(), 1, "the event at 500 is still pending");

    gate.wait();
    sink.wait_events();

    // one busy sample, one idle sample
    assert_eq!(sink.event_thread_utilization(), 50.0);

    let stats = sink.stats();
    assert_eq!(stats.events_ready_running, 0);
    assert_eq!(stats.events_added, 3);
    assert_eq!(stats.events_removed, 2);
    assert_eq!(stats.event_time, 8);
    assert_eq!(stats.running_handlers, 0);
}
