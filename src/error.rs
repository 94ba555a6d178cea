use thiserror::Error;

/// The returned error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Structural violation in the container data: bad header, size
    /// inconsistency, reserved bits set, broken ordering.
    #[error("malformed container data: {0}")]
    Malformed(String),

    #[error("failed to read from byte source: {0}")]
    Io(#[from] std::io::Error),

    /// The byte source ran out while probing or reading.
    #[error("end of stream")]
    EndOfStream,

    /// A temporal search exhausted the table in the requested direction.
    #[error("no sample in the requested direction")]
    OutOfRange,

    /// A sample index beyond the table bounds.
    #[error("sample index out of bounds")]
    BadIndex,

    /// Transport packet PID could not be parsed.
    #[error("bad transport packet: {0}")]
    BadValue(String),

    /// The transport stream mutated underneath us (PID change, invalid
    /// packet mid-seek). Terminal for the affected stream.
    #[error("transport stream state lost: {0}")]
    DeadObject(String),

    /// The operation's predicate is not met (e.g. duration of an unsized clip).
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),
}

/// `Result` type returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Creates an `Error::Malformed` from a format string.
/// Use in `.ok_or_else(|| err!("message"))`.
#[macro_export]
macro_rules! err {
    ($($arg:tt)*) => {
        $crate::Error::Malformed(format!($($arg)*))
    };
}

/// Creates an `Error::Malformed` and returns early (like `anyhow::bail!`).
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::err!($($arg)*))
    };
}
