use std::str::FromStr;

use error_stack::Report;
use itertools::Itertools;

use crate::Error;

/// Reserved chromosome key used by the end-of-stream marker.
///
/// Must never collide with a real contig name; the reference ordering
/// treats it as unknown.
pub const END_MARKER_CHROM: &str = "chrN";

/// Position carried by the end-of-stream marker. Real rows always have a
/// non-negative position.
pub const END_MARKER_POS: i64 = -1;

/// An ordered genomic record keyed by (chromosome, position).
///
/// Rows are immutable once produced; the engine only moves them, it never
/// rewrites them. The payload columns are opaque tab-separated text fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Row {
    pub chrom: String,
    pub pos: i64,
    pub columns: Vec<String>,
}

impl Row {
    pub fn new(chrom: impl Into<String>, pos: i64, columns: Vec<String>) -> Self {
        Self {
            chrom: chrom.into(),
            pos,
            columns,
        }
    }

    /// The end-of-stream marker appended by the producer after the last
    /// real row. It crosses the handoff channel but is never surfaced to
    /// callers.
    pub fn end_marker() -> Self {
        Self {
            chrom: END_MARKER_CHROM.to_owned(),
            pos: END_MARKER_POS,
            columns: vec![],
        }
    }

    pub fn is_end_marker(&self) -> bool {
        self.pos == END_MARKER_POS
    }

    /// Byte length of the row in its tab-separated text form.
    ///
    /// Used to estimate the memory footprint of a batch without
    /// materializing the text.
    pub fn encoded_len(&self) -> usize {
        let columns: usize = self.columns.iter().map(|c| c.len() + 1).sum();
        self.chrom.len() + 1 + decimal_width(self.pos) + columns
    }
}

impl std::fmt::Display for Row {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{}", self.chrom, self.pos)?;
        for column in &self.columns {
            write!(f, "\t{column}")?;
        }
        Ok(())
    }
}

impl FromStr for Row {
    type Err = Report<Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split('\t');
        let (chrom, pos) = fields
            .next_tuple()
            .ok_or_else(|| Error::InvalidRow(s.to_owned()))?;
        let pos: i64 = pos
            .parse()
            .map_err(|_| Error::InvalidRow(s.to_owned()))?;
        Ok(Self {
            chrom: chrom.to_owned(),
            pos,
            columns: fields.map(str::to_owned).collect(),
        })
    }
}

fn decimal_width(value: i64) -> usize {
    if value < 0 {
        1 + decimal_width(-value)
    } else if value < 10 {
        1
    } else {
        1 + decimal_width(value / 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let row: Row = "chr1\t1042\trs117\tA\tG".parse().unwrap();
        assert_eq!(row.chrom, "chr1");
        assert_eq!(row.pos, 1042);
        assert_eq!(row.columns, vec!["rs117", "A", "G"]);
        assert_eq!(row.to_string(), "chr1\t1042\trs117\tA\tG");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("chr1".parse::<Row>().is_err());
        assert!("chr1\tnot-a-position".parse::<Row>().is_err());
    }

    #[test]
    fn test_end_marker() {
        let end = Row::end_marker();
        assert!(end.is_end_marker());
        assert!(!Row::new("chr1", 0, vec![]).is_end_marker());
    }

    #[test]
    fn test_encoded_len_matches_display() {
        let rows = [
            Row::new("chr1", 0, vec![]),
            Row::new("chrX", 123_456_789, vec!["a".into(), "bb".into()]),
            Row::end_marker(),
        ];
        for row in rows {
            assert_eq!(row.encoded_len(), row.to_string().len());
        }
    }
}
