#[derive(derive_more::Display, Debug)]
pub enum Error {
    #[display(fmt = "invalid row: {_0}")]
    InvalidRow(String),
    #[display(fmt = "internal error: {_0}")]
    Internal(&'static str),
}

impl error_stack::Context for Error {}
