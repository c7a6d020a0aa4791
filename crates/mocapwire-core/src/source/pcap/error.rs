use thiserror::Error;

/// Errors raised while opening or walking a capture file.
///
/// `format` is `"pcap"` or `"pcapng"`, picked from the file's magic bytes.
/// A file too short to carry them is `TooShort`.
#[derive(Debug, Error)]
pub enum PcapSourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("file holds {len} bytes, too short for a capture header")]
    TooShort { len: usize },
    #[error("cannot open {format} capture: {message}")]
    Open {
        format: &'static str,
        message: String,
    },
    #[error("{format} capture is malformed near block {block}: {message}")]
    Block {
        format: &'static str,
        block: u64,
        message: String,
    },
}
