//! USB transport abstraction.
//!
//! Defines the `UsbTransport` trait over which the dispatcher runs,
//! allowing different implementations (nusb, mock, etc.).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("no Logitech receiver dongle found")]
    NoDongle,

    #[error("detected Logitech receiver seems to run in bootloader mode")]
    ReceiverInBootloaderMode,

    #[error("could not select receiver configuration 1: {0}")]
    BadConfig(String),

    #[error("could not claim the HID++ USB interface: {0}")]
    NoHidInterface(String),

    #[error("no 32-byte interrupt IN endpoint on the receiver")]
    NoInEndpoint,

    #[error("failed to open device: {0}")]
    OpenFailed(String),

    #[error("USB write failed: {0}")]
    WriteFailed(String),

    #[error("USB read failed: {0}")]
    ReadFailed(String),

    #[error("no report within the poll interval")]
    PollTimeout,

    #[error("transport closed")]
    Closed,
}

/// Byte-level access to one receiver.
///
/// `submit` issues a single outbound report as a SET_REPORT class control
/// transfer on the HID++ interface; `poll` blocks for the next inbound
/// report on the 32-byte interrupt IN endpoint. Exactly one reader task
/// calls `poll` while the transport is open.
pub trait UsbTransport: Send + Sync {
    fn submit(&self, report: &[u8]) -> Result<(), TransportError>;

    /// Read one report into `buf`, returning the number of bytes received.
    ///
    /// Implementations return [`TransportError::PollTimeout`] after a short
    /// interval with no data, so the caller can observe cancellation between
    /// reads without abandoning the endpoint.
    fn poll(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Unblock any pending `poll` and fail all further I/O.
    fn shutdown(&self) {}

    fn product_id(&self) -> u16;
}
