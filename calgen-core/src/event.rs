//! Decoded detector-readout events and the event source trait.

use crate::channel::{Face, Range, RngIdx, XtalIdx};
use crate::SourceError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single digitized readout of one crystal face.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Readout {
    /// Crystal face.
    pub face: Face,
    /// Gain range selected for this readout.
    pub range: Range,
    /// Digitized amplitude.
    pub adc: f32,
}

/// All readouts of one crystal in one event.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalHit {
    /// Crystal that produced the hit.
    pub xtal: XtalIdx,
    /// Per-face, per-range readouts (one per range in four-range mode).
    pub readouts: Vec<Readout>,
}

/// Per-event pulser configuration as recorded by the DAQ.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TestConfig {
    /// Injected setting for this event.
    pub setting: f32,
    /// Column being pulsed, if the DAQ records it.
    pub column: Option<u8>,
}

/// One decoded detector event.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalEvent {
    /// Crystal hits.
    pub hits: Vec<CalHit>,
    /// Pulser configuration, when available.
    pub config: Option<TestConfig>,
}

/// A single amplitude reading tagged with its channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    /// ADC channel.
    pub channel: RngIdx,
    /// Digitized amplitude.
    pub amplitude: f32,
}

impl CalHit {
    /// Creates a hit with no readouts.
    pub fn new(xtal: XtalIdx) -> Self {
        Self {
            xtal,
            readouts: Vec::new(),
        }
    }

    /// Adds a readout.
    #[must_use]
    pub fn with_readout(mut self, face: Face, range: Range, adc: f32) -> Self {
        self.readouts.push(Readout { face, range, adc });
        self
    }

    /// Iterates over this hit's readouts as channel-tagged samples.
    pub fn samples(&self) -> impl Iterator<Item = RawSample> + '_ {
        self.readouts.iter().map(move |r| RawSample {
            channel: RngIdx::new(self.xtal, r.face, r.range),
            amplitude: r.adc,
        })
    }
}

impl CalEvent {
    /// Creates an event from hits without a pulser descriptor.
    pub fn new(hits: Vec<CalHit>) -> Self {
        Self { hits, config: None }
    }

    /// Attaches a pulser descriptor.
    #[must_use]
    pub fn with_config(mut self, config: TestConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Iterates over every sample in the event.
    pub fn samples(&self) -> impl Iterator<Item = RawSample> + '_ {
        self.hits.iter().flat_map(CalHit::samples)
    }
}

/// Random-access provider of decoded events.
///
/// Implementations report missing or undecodable records as errors so the
/// caller can distinguish them from empty events.
pub trait EventSource {
    /// Number of events available.
    fn event_count(&self) -> usize;

    /// Decodes the event at `ordinal`.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the record is missing, malformed or out of range.
    fn event(&mut self, ordinal: usize) -> Result<CalEvent, SourceError>;
}

/// In-memory event source; `None` slots read back as missing records.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSource {
    events: Vec<Option<CalEvent>>,
}

impl MemoryEventSource {
    /// Creates a source where every slot is present.
    pub fn new(events: Vec<CalEvent>) -> Self {
        Self {
            events: events.into_iter().map(Some).collect(),
        }
    }

    /// Creates a source with explicit gaps.
    pub fn with_gaps(events: Vec<Option<CalEvent>>) -> Self {
        Self { events }
    }
}

impl FromIterator<CalEvent> for MemoryEventSource {
    fn from_iter<I: IntoIterator<Item = CalEvent>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().map(Some).collect(),
        }
    }
}

impl EventSource for MemoryEventSource {
    fn event_count(&self) -> usize {
        self.events.len()
    }

    fn event(&mut self, ordinal: usize) -> Result<CalEvent, SourceError> {
        match self.events.get(ordinal) {
            Some(Some(event)) => Ok(event.clone()),
            Some(None) => Err(SourceError::Missing(ordinal)),
            None => Err(SourceError::OutOfRange {
                ordinal,
                count: self.events.len(),
            }),
        }
    }
}
