//! unify-core: Logitech Unifying receiver engine.
//!
//! Talks to Logitech wireless receiver dongles (the Unifying family and
//! its relatives) over USB HID: pairing state inspection, pairing and
//! unpairing, per-device link-key recovery from receiver flash, the switch
//! into bootloader mode, firmware blob parsing, and reflashing through the
//! bootloader.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: HID++/DJ report codec, bootloader framing, registers
//! - **Transport**: USB communication abstraction (nusb, mock)
//! - **Dispatch**: reader/writer tasks and the request-response primitive
//! - **Dongle / Bootloader**: typed operations on either receiver mode
//! - **Firmware**: pure blob parser, CRC check, downgrade transform
//! - **Events**: observer pattern for UI decoupling
//! - **Session**: high-level flash orchestrator
//!
//! # Example
//!
//! ```no_run
//! use unify_core::dongle::Dongle;
//!
//! let dongle = Dongle::open().expect("no receiver found");
//! let set = dongle.get_set_info().expect("enumeration failed");
//! println!("{set}");
//! ```

pub mod bootloader;
pub mod device;
pub mod dispatch;
pub mod dongle;
pub mod events;
pub mod firmware;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use bootloader::{BootloaderDongle, BootloaderError, BootloaderVersion, MemoryInfo};
pub use device::{DeviceInfo, DeviceType, DongleInfo, FirmwareMajor, SetInfo, derive_link_key};
pub use dispatch::{DispatchError, Dispatcher, ExchangeError};
pub use dongle::{Dongle, DongleError};
pub use events::{DongleEvent, DongleObserver, DonglePhase, LogLevel, NullObserver, TracingObserver};
pub use firmware::{Firmware, FirmwareError};
pub use protocol::report::{DjReport, DjType, HidppErrorCode, HidppMsg, Report, ReportKind, SubId};
pub use session::{FlashConfig, FlashSession, switch_and_open_bootloader};
pub use transport::{MockTransport, NusbTransport, TransportError, UsbTransport};
