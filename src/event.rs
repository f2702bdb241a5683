use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Absolute sample index.
pub type SampleTime = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        EventId(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// A stream tag as seen in a newly arrived sample range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub offset: SampleTime,
    pub value: Value,
}

impl Tag {
    pub fn new(key: impl Into<String>, offset: SampleTime, value: Value) -> Self {
        Self { key: key.into(), offset, value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEntry {
    pub offset: SampleTime,
    pub value: Value,
}

/// Tag key -> (offset, value).
pub type Metadata = BTreeMap<String, TagEntry>;

/// Latest value seen for every tag key, carried forward cycle to cycle.
/// Owned by the producer; never reset.
#[derive(Debug, Clone, Default)]
pub struct TagAccumulator {
    latest: Metadata,
}

impl TagAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge newly visible tags. Returns true if `end_key` was among them.
    pub fn merge(&mut self, tags: &[Tag], end_key: &str) -> bool {
        let mut end_of_stream = false;
        for tag in tags {
            self.latest.insert(
                tag.key.clone(),
                TagEntry { offset: tag.offset, value: tag.value.clone() },
            );
            if tag.key == end_key {
                end_of_stream = true;
            }
        }
        end_of_stream
    }

    pub fn get(&self, key: &str) -> Option<&TagEntry> {
        self.latest.get(key)
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// Overlay the accumulated tags onto an event's own metadata.
    pub fn apply_to(&self, meta: &mut Metadata) {
        for (key, entry) in &self.latest {
            meta.insert(key.clone(), entry.clone());
        }
    }
}

/// A registered event. Payload slices are attached by the sink at dispatch
/// time; after that the event is only read.
#[derive(Debug, Clone)]
pub struct Event {
    id: EventId,
    anchor: SampleTime,
    length: usize,
    payload: Vec<Vec<u8>>,
    meta: Metadata,
}

impl Event {
    pub fn new(anchor: SampleTime, length: usize) -> Self {
        Self {
            id: EventId::new(),
            anchor,
            length,
            payload: Vec::new(),
            meta: Metadata::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, offset: SampleTime, value: Value) -> Self {
        self.meta.insert(key.into(), TagEntry { offset, value });
        self
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn anchor(&self) -> SampleTime {
        self.anchor
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// First sample time past the end of the event's span.
    pub fn end(&self) -> SampleTime {
        self.anchor + self.length as SampleTime
    }

    /// Raw per-channel slices, in channel order.
    pub fn payload(&self) -> &[Vec<u8>] {
        &self.payload
    }

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    pub(crate) fn attach(&mut self, payload: Vec<Vec<u8>>, tags: &TagAccumulator) {
        self.payload = payload;
        tags.apply_to(&mut self.meta);
    }
}
