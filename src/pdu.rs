//! Packaging of dispatched events into typed per-channel vectors.
//!
//! Two item widths are recognized: 4 bytes (complex int16, emitted as
//! interleaved I/Q `i16`s) and 8 bytes (complex float32). Anything else is a
//! configuration error.

use serde::Serialize;

use crate::config::{ChannelSpec, COMPLEX_F32_SIZE, COMPLEX_I16_SIZE};
use crate::error::{Result, SinkError};
use crate::event::{Event, EventId, Metadata, SampleTime};
use crate::signal::{Outbound, OutboundPort};
use crate::sink::pool::EventHandler;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChannelPayload {
    /// Interleaved I/Q, two values per sample.
    ComplexI16(Vec<i16>),
    ComplexF32(Vec<[f32; 2]>),
}

impl ChannelPayload {
    /// Number of samples carried.
    pub fn samples(&self) -> usize {
        match self {
            ChannelPayload::ComplexI16(v) => v.len() / 2,
            ChannelPayload::ComplexF32(v) => v.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PackagedEvent {
    pub id: EventId,
    pub anchor: SampleTime,
    pub meta: Metadata,
    pub channels: Vec<ChannelPayload>,
}

fn decode(channel: usize, item_size: usize, bytes: &[u8]) -> Result<ChannelPayload> {
    match item_size {
        COMPLEX_I16_SIZE => Ok(ChannelPayload::ComplexI16(
            bytes
                .chunks_exact(2)
                .map(|b| i16::from_ne_bytes([b[0], b[1]]))
                .collect(),
        )),
        COMPLEX_F32_SIZE => Ok(ChannelPayload::ComplexF32(
            bytes
                .chunks_exact(COMPLEX_F32_SIZE)
                .map(|b| {
                    [
                        f32::from_ne_bytes([b[0], b[1], b[2], b[3]]),
                        f32::from_ne_bytes([b[4], b[5], b[6], b[7]]),
                    ]
                })
                .collect(),
        )),
        size => Err(SinkError::UnsupportedItemSize { channel, size }),
    }
}

pub fn package(event: &Event, channels: &[ChannelSpec]) -> Result<PackagedEvent> {
    let payload = event.payload();
    if payload.len() != channels.len() {
        return Err(SinkError::ChannelCountMismatch { expected: channels.len(), got: payload.len() });
    }

    let channels = channels
        .iter()
        .zip(payload)
        .enumerate()
        .map(|(idx, (spec, bytes))| decode(idx, spec.item_size, bytes))
        .collect::<Result<Vec<_>>>()?;

    Ok(PackagedEvent {
        id: event.id(),
        anchor: event.anchor(),
        meta: event.meta().clone(),
        channels,
    })
}

/// Handler that publishes every event as a [`PackagedEvent`].
pub struct PduHandler {
    channels: Vec<ChannelSpec>,
    port: OutboundPort,
}

impl PduHandler {
    pub fn new(channels: Vec<ChannelSpec>, port: OutboundPort) -> Self {
        Self { channels, port }
    }
}

impl EventHandler for PduHandler {
    fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let pdu = package(event, &self.channels)?;
        self.port.publish(Outbound::Event(pdu));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TagAccumulator;

    fn event_with(payload: Vec<Vec<u8>>) -> Event {
        let mut event = Event::new(7, 2);
        event.attach(payload, &TagAccumulator::new());
        event
    }

    #[test]
    fn complex_i16_expands_to_two_values_per_sample() {
        let raw: Vec<u8> = [1i16, -1, 300, -300].iter().flat_map(|v| v.to_ne_bytes()).collect();
        let pdu = package(&event_with(vec![raw]), &[ChannelSpec::complex_i16()]).unwrap();
        assert_eq!(pdu.channels[0], ChannelPayload::ComplexI16(vec![1, -1, 300, -300]));
        assert_eq!(pdu.channels[0].samples(), 2);
    }

    #[test]
    fn complex_f32_keeps_channel_order() {
        let a: Vec<u8> = [0.5f32, 0.25].iter().flat_map(|v| v.to_ne_bytes()).collect();
        let b: Vec<u8> = [1.0f32, -1.0].iter().flat_map(|v| v.to_ne_bytes()).collect();
        let specs = [ChannelSpec::complex_f32(), ChannelSpec::complex_f32()];
        let pdu = package(&event_with(vec![a, b]), &specs).unwrap();
        assert_eq!(pdu.channels[0], ChannelPayload::ComplexF32(vec![[0.5, 0.25]]));
        assert_eq!(pdu.channels[1], ChannelPayload::ComplexF32(vec![[1.0, -1.0]]));
    }

    #[test]
    fn unknown_width_is_rejected() {
        let err = package(&event_with(vec![vec![0u8; 4]]), &[ChannelSpec { item_size: 2 }]).unwrap_err();
        assert!(matches!(err, SinkError::UnsupportedItemSize { channel: 0, size: 2 }));
    }
}
