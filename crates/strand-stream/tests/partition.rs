use std::time::Duration;

use strand_batch::Row;
use strand_interfaces::testing::{TagStep, VecSource};
use strand_interfaces::StreamOptions;
use strand_stream::BatchedStream;

fn rows(spec: &[(&str, i64)]) -> Vec<Row> {
    spec.iter()
        .map(|(chrom, pos)| Row::new(*chrom, *pos, vec![]))
        .collect()
}

fn loci(rows: &[Row]) -> Vec<(String, i64)> {
    rows.iter()
        .map(|row| (row.chrom.clone(), row.pos))
        .collect()
}

fn drain(stream: &mut BatchedStream) -> Vec<Row> {
    let mut out = vec![];
    while stream.has_next().unwrap() {
        out.push(stream.next());
    }
    out
}

fn options() -> StreamOptions {
    StreamOptions {
        initial_capacity: 2,
        max_capacity: 8,
        poll_interval: Duration::from_millis(5),
        handoff_timeout: Duration::from_secs(5),
        ..StreamOptions::default()
    }
}

#[test]
fn test_split_partitions_at_chromosome_boundary() {
    let input = rows(&[
        ("chr1", 10),
        ("chr1", 20),
        ("chr1", 30),
        ("chr2", 5),
        ("chr2", 15),
        ("chr3", 1),
    ]);
    let mut stream = BatchedStream::new(
        Box::new(VecSource::new(input.clone())),
        None,
        options(),
    );

    assert!(stream.has_next().unwrap());
    let first = stream.next();
    assert_eq!(first.chrom, "chr1");

    let mut tail = stream.try_split().unwrap().expect("stream is splittable");

    // The original keeps the rest of chr1 and nothing beyond it.
    let head_rest = drain(&mut stream);
    assert_eq!(
        loci(&head_rest),
        vec![("chr1".to_owned(), 20), ("chr1".to_owned(), 30)]
    );
    stream.close().unwrap();

    // The split-off stream carries everything from chr2 on.
    let tail_rows = drain(&mut tail);
    assert!(tail_rows.iter().all(|row| row.chrom != "chr1"));
    tail.close().unwrap();

    // Together the two halves are exactly the input.
    let mut combined = vec![first];
    combined.extend(head_rest);
    combined.extend(tail_rows);
    assert_eq!(combined, input);
}

#[test]
fn test_split_is_available_at_most_once() {
    let input = rows(&[("chr1", 1), ("chr2", 1), ("chr3", 1)]);
    let mut stream = BatchedStream::new(Box::new(VecSource::new(input)), None, options());

    assert!(stream.has_next().unwrap());
    stream.next();
    let mut tail = stream.try_split().unwrap().expect("first split succeeds");

    assert!(stream.try_split().unwrap().is_none());
    assert!(tail.try_split().unwrap().is_none());

    drain(&mut stream);
    drain(&mut tail);
    stream.close().unwrap();
    tail.close().unwrap();
}

#[test]
fn test_split_before_first_row_is_unavailable() {
    let input = rows(&[("chr1", 1), ("chr2", 1)]);
    let mut stream = BatchedStream::new(
        Box::new(VecSource::new(input.clone())),
        None,
        options(),
    );

    assert!(stream.try_split().unwrap().is_none());
    // Declining to split must not cost any rows.
    assert_eq!(drain(&mut stream), input);
    stream.close().unwrap();
}

#[test]
fn test_split_unavailable_without_cursor_clone() {
    let input = rows(&[("chr1", 1), ("chr2", 1)]);
    let mut stream = BatchedStream::new(
        Box::new(VecSource::new(input.clone()).without_clone()),
        None,
        options(),
    );

    assert!(stream.has_next().unwrap());
    let first = stream.next();
    assert!(stream.try_split().unwrap().is_none());

    let mut all = vec![first];
    all.extend(drain(&mut stream));
    assert_eq!(all, input);
    stream.close().unwrap();
}

#[test]
fn test_split_unavailable_on_final_chromosome() {
    let input = rows(&[("chrM", 1), ("chrM", 2)]);
    let mut stream = BatchedStream::new(
        Box::new(VecSource::new(input.clone())),
        None,
        options(),
    );

    assert!(stream.has_next().unwrap());
    let first = stream.next();
    assert!(stream.try_split().unwrap().is_none());

    let mut all = vec![first];
    all.extend(drain(&mut stream));
    assert_eq!(all, input);
    stream.close().unwrap();
}

#[test]
fn test_split_unavailable_on_unknown_contig() {
    let input = rows(&[("scaffold_7", 1), ("scaffold_8", 1)]);
    let mut stream = BatchedStream::new(Box::new(VecSource::new(input)), None, options());

    assert!(stream.has_next().unwrap());
    stream.next();
    assert!(stream.try_split().unwrap().is_none());
    drain(&mut stream);
    stream.close().unwrap();
}

#[test]
fn test_split_halves_each_run_their_own_step() {
    let input = rows(&[("chr1", 1), ("chr1", 2), ("chr2", 1), ("chr2", 2)]);
    let mut stream = BatchedStream::new(
        Box::new(VecSource::new(input)),
        Some(Box::new(TagStep::new("t"))),
        options(),
    );

    assert!(stream.has_next().unwrap());
    let first = stream.next();
    assert_eq!(first.columns, vec!["t".to_owned()]);

    let mut tail = stream.try_split().unwrap().expect("stream is splittable");
    let head_rest = drain(&mut stream);
    let tail_rows = drain(&mut tail);

    assert_eq!(head_rest.len(), 1);
    assert_eq!(tail_rows.len(), 2);
    assert!(head_rest
        .iter()
        .chain(&tail_rows)
        .all(|row| row.columns == vec!["t".to_owned()]));
    stream.close().unwrap();
    tail.close().unwrap();
}

#[test]
fn test_split_skips_missing_chromosomes() {
    // No chr2 rows at all: the split point is still chr2 and the child
    // starts at the first row at or after it.
    let input = rows(&[("chr1", 1), ("chr3", 1), ("chr4", 1)]);
    let mut stream = BatchedStream::new(
        Box::new(VecSource::new(input)),
        None,
        options(),
    );

    assert!(stream.has_next().unwrap());
    stream.next();
    let mut tail = stream.try_split().unwrap().expect("stream is splittable");

    assert!(!stream.has_next().unwrap());
    let tail_rows = drain(&mut tail);
    assert_eq!(
        loci(&tail_rows),
        vec![("chr3".to_owned(), 1), ("chr4".to_owned(), 1)]
    );
    stream.close().unwrap();
    tail.close().unwrap();
}
