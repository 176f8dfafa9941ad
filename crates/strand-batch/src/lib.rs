#![warn(
    rust_2018_idioms,
    nonstandard_style,
    future_incompatible,
    clippy::mod_module_files,
    clippy::print_stdout,
    clippy::print_stderr
)]

mod batch;
mod chrom_order;
mod error;
mod row;

pub use batch::*;
pub use chrom_order::*;
pub use error::Error;
pub use row::*;
