use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// An immutable total order over chromosome names.
///
/// Known contigs compare by their rank in the reference table; unknown
/// contigs sort after every known contig, lexically among themselves.
/// Instances are injected where ordering decisions are made (reseek skips,
/// range partitioning) rather than consulted through process-wide state.
#[derive(Debug)]
pub struct ChromOrder {
    names: Vec<String>,
    rank: HashMap<String, usize>,
}

#[static_init::dynamic]
static HUMAN_REFERENCE: Arc<ChromOrder> = Arc::new(ChromOrder::human_reference());

impl ChromOrder {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let rank = names
            .iter()
            .enumerate()
            .map(|(index, name)| (name.clone(), index))
            .collect();
        Self { names, rank }
    }

    /// The human reference ordering: chr1 < chr2 < … < chr22 < chrX < chrY < chrM.
    pub fn human_reference() -> Self {
        let autosomes = (1..=22).map(|n| format!("chr{n}"));
        Self::new(autosomes.chain(["chrX".to_owned(), "chrY".to_owned(), "chrM".to_owned()]))
    }

    /// Shared instance of the human reference ordering.
    pub fn human() -> Arc<ChromOrder> {
        HUMAN_REFERENCE.clone()
    }

    pub fn rank(&self, chrom: &str) -> Option<usize> {
        self.rank.get(chrom).copied()
    }

    pub fn cmp_chrom(&self, a: &str, b: &str) -> Ordering {
        let a_key = (self.rank(a).unwrap_or(usize::MAX), a);
        let b_key = (self.rank(b).unwrap_or(usize::MAX), b);
        a_key.cmp(&b_key)
    }

    pub fn cmp_locus(&self, a: (&str, i64), b: (&str, i64)) -> Ordering {
        self.cmp_chrom(a.0, b.0).then_with(|| a.1.cmp(&b.1))
    }

    /// The chromosome immediately after `chrom` in the reference table, or
    /// `None` for the last entry and for unknown contigs.
    pub fn successor(&self, chrom: &str) -> Option<&str> {
        let rank = self.rank(chrom)?;
        self.names.get(rank + 1).map(String::as_str)
    }
}
