use thiserror::Error;

/// Reasons a captured frame could not be reduced to a UDP datagram.
///
/// Note: this error type lives in an internal module; the example is
/// illustrative and not compiled as a public doctest.
///
/// # Examples
/// ```text
/// use mocapwire_core::analysis::udp::error::UdpError;
///
/// let err = UdpError::Fragmented { total_len: 1600 };
/// assert!(err.to_string().contains("fragment"));
/// ```
#[derive(Debug, Error)]
pub enum UdpError {
    #[error("frame does not slice: {0}")]
    Slice(String),
    #[error("frame carries no IP layer")]
    MissingNetworkLayer,
    /// Large model definitions exceed the MTU; fragments are not reassembled.
    #[error("UDP datagram is IP-fragmented ({total_len} bytes on the wire); not reassembled")]
    Fragmented { total_len: usize },
}
