//! Memory-mapped event file reader.
//!
//! Event files hold one JSON object per line:
//!
//! ```text
//! {"config":{"setting":12.0,"column":3},"hits":[{"tower":0,"layer":2,"column":3,
//!   "readouts":[{"face":"POS","range":"LEX8","adc":811.5}]}]}
//! ```
//!
//! The line number is the event ordinal. An empty line marks a record the
//! DAQ failed to write.

use crate::Result;
use calgen_core::event::{CalEvent, CalHit, EventSource, Readout, TestConfig};
use calgen_core::{SourceError, XtalIdx};
use memmap2::Mmap;
use serde::Deserialize;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(Deserialize)]
struct JsonEvent {
    #[serde(default)]
    hits: Vec<JsonHit>,
    #[serde(default)]
    config: Option<TestConfig>,
}

#[derive(Deserialize)]
struct JsonHit {
    tower: usize,
    layer: usize,
    column: usize,
    #[serde(default)]
    readouts: Vec<Readout>,
}

impl JsonEvent {
    fn into_event(self) -> calgen_core::Result<CalEvent> {
        let hits = self
            .hits
            .into_iter()
            .map(|h| {
                Ok(CalHit {
                    xtal: XtalIdx::new(h.tower, h.layer, h.column)?,
                    readouts: h.readouts,
                })
            })
            .collect::<calgen_core::Result<Vec<_>>>()?;
        Ok(CalEvent {
            hits,
            config: self.config,
        })
    }
}

/// JSON-lines event file with random access by ordinal.
///
/// The file is memory-mapped and indexed once on open; each
/// [`EventSource::event`] call decodes only the requested line.
pub struct EventFileReader {
    mmap: Mmap,
    lines: Vec<Range<usize>>,
    path: PathBuf,
}

impl EventFileReader {
    /// Opens and indexes an event file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        let lines = index_lines(&mmap);
        log::debug!(
            "{}: {} bytes, {} event records",
            path.as_ref().display(),
            mmap.len(),
            lines.len()
        );
        Ok(Self {
            mmap,
            lines,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Path the reader was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn file_size(&self) -> usize {
        self.mmap.len()
    }

    fn line(&self, ordinal: usize) -> Option<&[u8]> {
        self.lines.get(ordinal).map(|r| &self.mmap[r.clone()])
    }
}

/// Byte ranges of every line, excluding terminators. A trailing newline
/// does not start an extra record.
fn index_lines(data: &[u8]) -> Vec<Range<usize>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (pos, &byte) in data.iter().enumerate() {
        if byte == b'\n' {
            let end = if pos > start && data[pos - 1] == b'\r' {
                pos - 1
            } else {
                pos
            };
            lines.push(start..end);
            start = pos + 1;
        }
    }
    if start < data.len() {
        lines.push(start..data.len());
    }
    lines
}

impl EventSource for EventFileReader {
    fn event_count(&self) -> usize {
        self.lines.len()
    }

    fn event(&mut self, ordinal: usize) -> std::result::Result<CalEvent, SourceError> {
        let Some(line) = self.line(ordinal) else {
            return Err(SourceError::OutOfRange {
                ordinal,
                count: self.lines.len(),
            });
        };
        if line.iter().all(u8::is_ascii_whitespace) {
            return Err(SourceError::Missing(ordinal));
        }

        let malformed = |reason: String| SourceError::Malformed { ordinal, reason };
        let json: JsonEvent = serde_json::from_slice(line).map_err(|e| malformed(e.to_string()))?;
        json.into_event().map_err(|e| malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calgen_core::{Face, Range as GainRange};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_index_lines() {
        assert_eq!(index_lines(b""), Vec::<Range<usize>>::new());
        assert_eq!(index_lines(b"a\nbc\n"), vec![0..1, 2..4]);
        assert_eq!(index_lines(b"a\r\n\nbc"), vec![0..1, 3..3, 4..6]);
    }

    #[test]
    fn test_decode_event() {
        let file = write_file(concat!(
            r#"{"config":{"setting":12.0,"column":3},"hits":[{"tower":1,"layer":2,"column":3,"#,
            r#""readouts":[{"face":"NEG","range":"HEX1","adc":811.5}]}]}"#,
            "\n",
        ));
        let mut reader = EventFileReader::open(file.path()).unwrap();
        assert_eq!(reader.event_count(), 1);

        let event = reader.event(0).unwrap();
        assert_eq!(
            event.config,
            Some(TestConfig {
                setting: 12.0,
                column: Some(3)
            })
        );
        assert_eq!(event.hits.len(), 1);
        assert_eq!(event.hits[0].xtal, XtalIdx::new(1, 2, 3).unwrap());
        assert_eq!(
            event.hits[0].readouts,
            vec![Readout {
                face: Face::Neg,
                range: GainRange::Hex1,
                adc: 811.5
            }]
        );
    }

    #[test]
    fn test_missing_and_malformed_records() {
        let file = write_file(concat!(
            r#"{"hits":[]}"#,
            "\n",
            "\n",
            "not json\n",
            r#"{"hits":[{"tower":99,"layer":0,"column":0}]}"#,
            "\n",
        ));
        let mut reader = EventFileReader::open(file.path()).unwrap();
        assert_eq!(reader.event_count(), 4);

        assert!(reader.event(0).unwrap().hits.is_empty());
        assert_eq!(reader.event(1), Err(SourceError::Missing(1)));
        assert!(matches!(
            reader.event(2),
            Err(SourceError::Malformed { ordinal: 2, .. })
        ));
        assert!(matches!(
            reader.event(3),
            Err(SourceError::Malformed { ordinal: 3, .. })
        ));
        assert_eq!(
            reader.event(4),
            Err(SourceError::OutOfRange {
                ordinal: 4,
                count: 4
            })
        );
    }
}
