//! Protocol module - wire formats spoken by Logitech receivers.

pub mod bootloader;
pub mod constants;
pub mod report;

pub use bootloader::{BootloaderReport, flash_sub};
pub use constants::*;
pub use report::{
    DjReport, DjType, FrameError, HidppErrorCode, HidppMsg, Report, ReportKind, SubId, WireReport,
};
