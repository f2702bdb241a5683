use anyhow::{ensure, Context, Result};
use eventsink::config::ChannelSpec;
use eventsink::history::HistoryBuffer;
use eventsink::pdu::ChannelPayload;
use eventsink::{EarlyBehavior, Event, EventSink, MemoryEventStore, Outbound, OutboundPort, SinkConfig, Tag};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const CHUNK: usize = 4096;
const EVENT_SPACING: u64 = 3000;
const EVENT_LEN: usize = 512;
const CADENCE_MS: u64 = 5;
const STATS_EVERY: usize = 50;

// usage: eventsink [config.json] [input.wav]
#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => SinkConfig::load(&path).with_context(|| format!("loading config {path}"))?,
        None => SinkConfig::default(),
    };
    ensure!(
        config.channels == [ChannelSpec::complex_f32()],
        "the driver feeds a single complex float32 channel"
    );

    // 2. Input
    let samples = match args.next() {
        Some(path) => load_wav(&path)?,
        None => synth_tone(200_000),
    };
    tracing::info!("Stream loaded. Samples: {}", samples.len());

    // 3. Events, one every EVENT_SPACING samples
    let store = Arc::new(MemoryEventStore::new(EarlyBehavior::Discard));
    let mut anchor = EVENT_SPACING;
    while anchor + EVENT_LEN as u64 <= samples.len() as u64 {
        store.add(Event::new(anchor, EVENT_LEN).with_meta("burst", anchor, json!(anchor / EVENT_SPACING)));
        anchor += EVENT_SPACING;
    }

    // 4. Sink + downstream consumer
    let (port, mut rx) = OutboundPort::channel();
    let mut sink = EventSink::with_pdu_handler(config.clone(), store.clone(), port)?;
    sink.start()?;

    let consumer = tokio::spawn(async move {
        let mut packaged = 0u64;
        while let Some(signal) = rx.recv().await {
            match signal {
                Outbound::Event(pdu) => {
                    packaged += 1;
                    if let Some(ChannelPayload::ComplexF32(iq)) = pdu.channels.first() {
                        tracing::debug!(anchor = pdu.anchor, rms = rms(iq), "packaged event");
                    }
                }
                Outbound::ShutdownReady => tracing::info!("Downstream notified: shutdown ready"),
                Outbound::SamplesConsumed(_) => {}
            }
        }
        packaged
    });

    // 5. Drive the stream
    let mut history = HistoryBuffer::new(&config.channels, config.history());
    let mut cadence = tokio::time::interval(Duration::from_millis(CADENCE_MS));
    cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let chunks: Vec<&[[f32; 2]]> = samples.chunks(CHUNK).collect();
    let mut offset = 0u64;
    for (cycle, chunk) in chunks.iter().enumerate() {
        cadence.tick().await;

        let bytes: Vec<u8> = chunk.iter().flatten().flat_map(|v| v.to_ne_bytes()).collect();
        history.push(&[bytes.as_slice()])?;

        let mut tags = Vec::new();
        if cycle == 0 {
            tags.push(Tag::new("rx_rate", 0, json!(48_000)));
        }
        offset += chunk.len() as u64;
        if cycle + 1 == chunks.len() {
            tags.push(Tag::new(config.end_of_stream_key.clone(), offset, json!(true)));
        }

        let consumed = sink.work(&history.buffers(), history.available(), &tags)?;
        history.retire(consumed);

        if cycle % STATS_EVERY == 0 {
            tracing::info!(stats = %serde_json::to_string(&sink.stats())?, "sink stats");
        }
    }

    // Flush whatever the last chunk left behind
    while history.available() > 0 {
        let consumed = sink.work(&history.buffers(), history.available(), &[])?;
        if consumed == 0 {
            break;
        }
        history.retire(consumed);
    }

    sink.stop();
    tracing::info!(stats = %serde_json::to_string(&sink.stats())?, "final sink stats");
    drop(sink);

    let packaged = consumer.await.context("consumer task failed")?;
    tracing::info!("Stream finished. Packaged events: {}", packaged);
    Ok(())
}

fn load_wav(path: &str) -> Result<Vec<[f32; 2]>> {
    let mut reader = hound::WavReader::open(path).with_context(|| format!("opening {path}"))?;
    let spec = reader.spec();
    let raw: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    // stereo is read as I/Q, mono gets a zero Q
    let channels = spec.channels.max(1) as usize;
    Ok(raw
        .chunks_exact(channels)
        .map(|frame| [frame[0], if channels > 1 { frame[1] } else { 0.0 }])
        .collect())
}

fn synth_tone(len: usize) -> Vec<[f32; 2]> {
    let step = 2.0 * std::f32::consts::PI * 0.01;
    (0..len)
        .map(|n| {
            let phase = step * n as f32;
            [phase.cos() * 0.5, phase.sin() * 0.5]
        })
        .collect()
}

fn rms(iq: &[[f32; 2]]) -> f32 {
    if iq.is_empty() {
        return 0.0;
    }
    let power: f32 = iq.iter().map(|[i, q]| i * i + q * q).sum();
    (power / iq.len() as f32).sqrt()
}
