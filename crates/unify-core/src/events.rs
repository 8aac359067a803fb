//! Event system for UI decoupling.
//!
//! The CLI (or any other front end) subscribes to engine events without
//! tight coupling to the protocol code. The default observer forwards
//! everything to `tracing`.

use std::fmt;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Coarse phases of a receiver interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonglePhase {
    /// Looking for a receiver on the bus.
    SearchingReceiver,
    /// Talking to the regular firmware.
    FirmwareMode,
    /// ICP issued, waiting for USB re-enumeration.
    SwitchingToBootloader,
    /// Talking to the bootloader.
    BootloaderMode,
    /// Image transfer in progress.
    Flashing,
    /// CRC / signature check running on the receiver.
    Verifying,
    /// All operations complete.
    Complete,
}

impl fmt::Display for DonglePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DonglePhase::SearchingReceiver => write!(f, "Searching Receiver"),
            DonglePhase::FirmwareMode => write!(f, "Firmware Mode"),
            DonglePhase::SwitchingToBootloader => write!(f, "Switching To Bootloader"),
            DonglePhase::BootloaderMode => write!(f, "Bootloader Mode"),
            DonglePhase::Flashing => write!(f, "Flashing"),
            DonglePhase::Verifying => write!(f, "Verifying"),
            DonglePhase::Complete => write!(f, "Complete"),
        }
    }
}

/// USB report direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDirection {
    Out,
    In,
}

impl fmt::Display for ReportDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportDirection::Out => write!(f, "OUT"),
            ReportDirection::In => write!(f, "IN"),
        }
    }
}

/// Events emitted by the engine.
#[derive(Debug, Clone)]
pub enum DongleEvent {
    /// A receiver was found and its transport opened.
    ReceiverFound { pid: u16 },
    /// Phase changed.
    PhaseChanged { phase: DonglePhase },
    /// Progress for the current long-running operation.
    Progress {
        operation: &'static str,
        current: u64,
        total: u64,
    },
    /// Raw report passed through the dispatcher.
    Report {
        direction: ReportDirection,
        raw: Vec<u8>,
    },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// All operations completed successfully.
    Complete,
}

/// Observer trait for receiving engine events.
pub trait DongleObserver: Send + Sync {
    fn on_event(&self, event: &DongleEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl DongleObserver for NullObserver {
    fn on_event(&self, _event: &DongleEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl DongleObserver for TracingObserver {
    fn on_event(&self, event: &DongleEvent) {
        match event {
            DongleEvent::ReceiverFound { pid } => {
                tracing::info!(pid = %format!("{pid:04x}"), "receiver found");
            }
            DongleEvent::PhaseChanged { phase } => {
                tracing::info!(phase = %phase, "phase changed");
            }
            DongleEvent::Progress {
                operation,
                current,
                total,
            } => {
                tracing::debug!(operation, current, total, "progress");
            }
            DongleEvent::Report { direction, raw } => {
                tracing::trace!(dir = %direction, raw = %format!("{raw:02x?}"), "usb report");
            }
            DongleEvent::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
            DongleEvent::Complete => {
                tracing::info!("operation complete");
            }
        }
    }
}

/// Shorthand used across the engine to emit a [`DongleEvent::Log`].
pub(crate) fn log(
    observer: &dyn DongleObserver,
    level: LogLevel,
    message: impl Into<String>,
) {
    observer.on_event(&DongleEvent::Log {
        level,
        message: message.into(),
    });
}
