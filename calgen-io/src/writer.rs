//! CSV writers for calibration tables.

use crate::Result;
use calgen_core::channel::RngIdx;
use calgen_core::{CalibrationTable, CrosstalkTable, SplineTable};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writer for calibration output.
///
/// Each table is written as plain CSV with one row per point. Channels are
/// spelled out as `tower,layer,column,face,range` columns.
pub struct CalibFileWriter<W: Write = BufWriter<File>> {
    writer: W,
}

impl CalibFileWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> CalibFileWriter<W> {
    /// Wraps an arbitrary sink.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the underlying sink.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_channel(&mut self, ch: RngIdx) -> Result<()> {
        let xtal = ch.xtal();
        write!(
            self.writer,
            "{},{},{},{},{}",
            xtal.tower(),
            xtal.layer(),
            xtal.column(),
            ch.face(),
            ch.range()
        )?;
        Ok(())
    }

    /// Writes raw per-window means and widths.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_raw_csv(&mut self, table: &CalibrationTable) -> Result<()> {
        writeln!(self.writer, "tower,layer,column,face,range,setting,amplitude,width")?;
        for (ch, points) in table.iter() {
            for (pt, width) in points.iter().zip(table.widths(ch)) {
                self.write_channel(ch)?;
                writeln!(self.writer, ",{},{},{}", pt.setting, pt.amplitude, width)?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes smoothed spline points.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_spline_csv(&mut self, table: &SplineTable) -> Result<()> {
        writeln!(self.writer, "tower,layer,column,face,range,setting,amplitude")?;
        for (ch, curve) in table.iter() {
            for pt in curve.points() {
                self.write_channel(ch)?;
                writeln!(self.writer, ",{},{}", pt.setting, pt.amplitude)?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Writes crosstalk curves, destination channel first.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_crosstalk_csv(&mut self, table: &CrosstalkTable) -> Result<()> {
        writeln!(
            self.writer,
            "tower,layer,column,face,range,src_column,setting,amplitude"
        )?;
        for (dest, source, points) in table.iter() {
            for pt in points {
                self.write_channel(dest)?;
                writeln!(
                    self.writer,
                    ",{},{},{}",
                    source.xtal().column(),
                    pt.setting,
                    pt.amplitude
                )?;
            }
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calgen_core::{CurvePoint, Face, Range, SmoothedCurve, XtalIdx};
    use tempfile::NamedTempFile;

    fn channel(column: usize) -> RngIdx {
        RngIdx::new(XtalIdx::new(2, 5, column).unwrap(), Face::Neg, Range::Hex8)
    }

    #[test]
    fn test_write_raw_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = CalibFileWriter::create(file.path()).unwrap();

        let mut table = CalibrationTable::new();
        table.push(channel(7), CurvePoint::new(0.0, 12.5), 1.25);
        table.push(channel(7), CurvePoint::new(64.0, 140.0), 2.5);
        writer.write_raw_csv(&table).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "tower,layer,column,face,range,setting,amplitude,width");
        assert_eq!(lines[1], "2,5,7,NEG,HEX8,0,12.5,1.25");
        assert_eq!(lines[2], "2,5,7,NEG,HEX8,64,140,2.5");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_write_spline_csv_in_memory() {
        let mut table = SplineTable::new();
        table.insert(
            channel(0),
            SmoothedCurve::new(vec![CurvePoint::new(0.0, 0.0), CurvePoint::new(10.5, 99.0)]),
        );
        let mut writer = CalibFileWriter::new(Vec::new());
        writer.write_spline_csv(&table).unwrap();

        let content = String::from_utf8(writer.into_inner()).unwrap();
        assert!(content.contains("2,5,0,NEG,HEX8,10.5,99\n"));
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_write_crosstalk_csv() {
        let mut table = CrosstalkTable::new();
        table.set_point(channel(4), channel(3), 100.0, 0.5);
        let mut writer = CalibFileWriter::new(Vec::new());
        writer.write_crosstalk_csv(&table).unwrap();

        let content = String::from_utf8(writer.into_inner()).unwrap();
        assert!(content.contains("2,5,4,NEG,HEX8,3,100,0.5"));
    }
}
