//! Batched row streaming.
//!
//! Moves ordered genomic rows from a slow source into a consumer through a
//! pair of reusable batches, overlapping upstream reads with downstream
//! work. One background producer per stream fills batches and hands them
//! off through a rendezvous channel; the consumer drains them through a
//! pull-iterator facade that also supports mid-stream reseek and
//! chromosome-range splitting.

#![warn(
    rust_2018_idioms,
    nonstandard_style,
    future_incompatible,
    clippy::mod_module_files,
    clippy::print_stdout,
    clippy::print_stderr
)]

mod error;
mod producer;
mod split;
mod stats;
mod stream;
mod writer;

pub use error::Error;
pub use stats::StreamStats;
pub use stream::BatchedStream;
