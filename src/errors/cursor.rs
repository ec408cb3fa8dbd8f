use thiserror::Error;

/// Errors raised by the bounded byte cursors.
///
/// Both cursor directions share the single failure mode: the read or write
/// head ran past the end of the underlying buffer. The slave and master
/// pipelines translate this into `RequestTruncated` / `ResponseTruncated`
/// or `RxTruncated` / `TxBufferLow` depending on which buffer overran.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorError {
    #[error("Cursor reached the end of the buffer")]
    BufferEnd,
}
