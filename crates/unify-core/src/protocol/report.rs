//! HID++ 1.0 and DJ report codec.
//!
//! Every report carries its length in its leading tag byte: 0x10/0x11 for
//! HID++ short/long (7 and 20 bytes total), 0x20/0x21 for DJ short/long
//! (15 and 32 bytes total). Parameter blocks are fixed-size and zero-padded,
//! so encode/decode never allocate beyond the output buffer.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("bytes do not form a known USB report (tag 0x{tag:02x}, {len} bytes)")]
    BadFrame { tag: u8, len: usize },
}

/// Wire codec shared by the firmware-mode and bootloader-mode channels.
pub trait WireReport: Sized + Send + 'static {
    fn decode(raw: &[u8]) -> Result<Self, FrameError>;
    fn encode(&self) -> Vec<u8>;
}

/// Leading tag byte of a firmware-mode report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    HidppShort,
    HidppLong,
    DjShort,
    DjLong,
}

impl ReportKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x10 => Some(ReportKind::HidppShort),
            0x11 => Some(ReportKind::HidppLong),
            0x20 => Some(ReportKind::DjShort),
            0x21 => Some(ReportKind::DjLong),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            ReportKind::HidppShort => 0x10,
            ReportKind::HidppLong => 0x11,
            ReportKind::DjShort => 0x20,
            ReportKind::DjLong => 0x21,
        }
    }

    /// Total frame length on the wire, tag byte included.
    pub fn frame_len(self) -> usize {
        match self {
            ReportKind::HidppShort => 7,
            ReportKind::HidppLong => 20,
            ReportKind::DjShort => 15,
            ReportKind::DjLong => 32,
        }
    }

    /// Length of the parameter block (frame minus tag, device id, sub id).
    pub fn payload_len(self) -> usize {
        self.frame_len() - 3
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::HidppShort => write!(f, "HID++ short message"),
            ReportKind::HidppLong => write!(f, "HID++ long message"),
            ReportKind::DjShort => write!(f, "DJ report short"),
            ReportKind::DjLong => write!(f, "DJ report long"),
        }
    }
}

/// HID++ 1.0 message sub ids. Request and response ids are numerically
/// identical for the whole 0x80..0x83 register family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubId {
    DeviceDisconnection,
    DeviceConnection,
    ReceiverLockingInformation,
    SetRegister,
    GetRegister,
    SetLongRegister,
    GetLongRegister,
    Error,
    Other(u8),
}

impl From<u8> for SubId {
    fn from(v: u8) -> Self {
        match v {
            0x40 => SubId::DeviceDisconnection,
            0x41 => SubId::DeviceConnection,
            0x4a => SubId::ReceiverLockingInformation,
            0x80 => SubId::SetRegister,
            0x81 => SubId::GetRegister,
            0x82 => SubId::SetLongRegister,
            0x83 => SubId::GetLongRegister,
            0x8f => SubId::Error,
            other => SubId::Other(other),
        }
    }
}

impl From<SubId> for u8 {
    fn from(v: SubId) -> Self {
        match v {
            SubId::DeviceDisconnection => 0x40,
            SubId::DeviceConnection => 0x41,
            SubId::ReceiverLockingInformation => 0x4a,
            SubId::SetRegister => 0x80,
            SubId::GetRegister => 0x81,
            SubId::SetLongRegister => 0x82,
            SubId::GetLongRegister => 0x83,
            SubId::Error => 0x8f,
            SubId::Other(other) => other,
        }
    }
}

impl fmt::Display for SubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubId::DeviceDisconnection => write!(f, "DEVICE DISCONNECTION"),
            SubId::DeviceConnection => write!(f, "DEVICE CONNECTION"),
            SubId::ReceiverLockingInformation => write!(f, "RECEIVER LOCKING INFORMATION"),
            SubId::SetRegister => write!(f, "SET REGISTER SHORT"),
            SubId::GetRegister => write!(f, "GET REGISTER SHORT"),
            SubId::SetLongRegister => write!(f, "SET REGISTER LONG"),
            SubId::GetLongRegister => write!(f, "GET REGISTER LONG"),
            SubId::Error => write!(f, "ERROR MESSAGE"),
            SubId::Other(v) => write!(f, "UNKNOWN SUB ID {v:02x}"),
        }
    }
}

/// Error codes carried in a 0x8f reply, at parameter offset 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HidppErrorCode {
    NoError,
    Unknown,
    InvalidArgument,
    OutOfRange,
    HwError,
    LogitechInternal,
    InvalidFeatureIndex,
    InvalidFunctionId,
    Busy,
    Unsupported,
    Undocumented(u8),
}

impl From<u8> for HidppErrorCode {
    fn from(v: u8) -> Self {
        match v {
            0x00 => HidppErrorCode::NoError,
            0x01 => HidppErrorCode::Unknown,
            0x02 => HidppErrorCode::InvalidArgument,
            0x03 => HidppErrorCode::OutOfRange,
            0x04 => HidppErrorCode::HwError,
            0x05 => HidppErrorCode::LogitechInternal,
            0x06 => HidppErrorCode::InvalidFeatureIndex,
            0x07 => HidppErrorCode::InvalidFunctionId,
            0x08 => HidppErrorCode::Busy,
            0x09 => HidppErrorCode::Unsupported,
            other => HidppErrorCode::Undocumented(other),
        }
    }
}

impl fmt::Display for HidppErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HidppErrorCode::NoError => write!(f, "NO ERROR"),
            HidppErrorCode::Unknown => write!(f, "UNKNOWN ERROR"),
            HidppErrorCode::InvalidArgument => write!(f, "INVALID ARGUMENT"),
            HidppErrorCode::OutOfRange => write!(f, "OUT OF RANGE"),
            HidppErrorCode::HwError => write!(f, "HW ERROR"),
            HidppErrorCode::LogitechInternal => write!(f, "LOGITECH INTERNAL ERROR"),
            HidppErrorCode::InvalidFeatureIndex => write!(f, "INVALID FEATURE INDEX"),
            HidppErrorCode::InvalidFunctionId => write!(f, "INVALID FUNCTION ID"),
            HidppErrorCode::Busy => write!(f, "BUSY"),
            HidppErrorCode::Unsupported => write!(f, "UNSUPPORTED"),
            HidppErrorCode::Undocumented(v) => write!(f, "UNDOCUMENTED ERROR {v:02x}"),
        }
    }
}

/// DJ report type byte. Values below 0x40 are RF input forwards, 0x40..0x7f
/// are notifications, 0x80 and above are commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DjType {
    RfKeyboard,
    RfMouse,
    RfConsumerControl,
    RfSystemControl,
    RfMsftMediaCenter,
    RfLed,
    NotificationDeviceUnpaired,
    NotificationDevicePaired,
    NotificationConnectionStatus,
    NotificationError,
    CmdSwitchAndKeepAlive,
    CmdGetPairedDevices,
    Other(u8),
}

impl From<u8> for DjType {
    fn from(v: u8) -> Self {
        match v {
            0x01 => DjType::RfKeyboard,
            0x02 => DjType::RfMouse,
            0x03 => DjType::RfConsumerControl,
            0x04 => DjType::RfSystemControl,
            0x08 => DjType::RfMsftMediaCenter,
            0x0e => DjType::RfLed,
            0x40 => DjType::NotificationDeviceUnpaired,
            0x41 => DjType::NotificationDevicePaired,
            0x42 => DjType::NotificationConnectionStatus,
            0x7f => DjType::NotificationError,
            0x80 => DjType::CmdSwitchAndKeepAlive,
            0x81 => DjType::CmdGetPairedDevices,
            other => DjType::Other(other),
        }
    }
}

impl From<DjType> for u8 {
    fn from(v: DjType) -> Self {
        match v {
            DjType::RfKeyboard => 0x01,
            DjType::RfMouse => 0x02,
            DjType::RfConsumerControl => 0x03,
            DjType::RfSystemControl => 0x04,
            DjType::RfMsftMediaCenter => 0x08,
            DjType::RfLed => 0x0e,
            DjType::NotificationDeviceUnpaired => 0x40,
            DjType::NotificationDevicePaired => 0x41,
            DjType::NotificationConnectionStatus => 0x42,
            DjType::NotificationError => 0x7f,
            DjType::CmdSwitchAndKeepAlive => 0x80,
            DjType::CmdGetPairedDevices => 0x81,
            DjType::Other(other) => other,
        }
    }
}

impl DjType {
    pub fn is_rf_report(self) -> bool {
        u8::from(self) < 0x40
    }

    pub fn is_notification(self) -> bool {
        let v = u8::from(self);
        (0x40..0x80).contains(&v)
    }

    pub fn is_command(self) -> bool {
        u8::from(self) >= 0x80
    }
}

/// One HID++ 1.0 message. The parameter block is 4 bytes for short reports
/// and 17 for long ones; the buffer always holds the long size, zero-padded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidppMsg {
    pub kind: ReportKind,
    pub device_id: u8,
    pub sub_id: SubId,
    pub params: [u8; 17],
}

impl HidppMsg {
    /// Build a request, picking the short frame whenever the parameters fit.
    pub fn request(device_id: u8, sub_id: SubId, parameters: &[u8]) -> Self {
        let kind = if parameters.len() <= ReportKind::HidppShort.payload_len() {
            ReportKind::HidppShort
        } else {
            ReportKind::HidppLong
        };
        let mut params = [0u8; 17];
        params[..parameters.len()].copy_from_slice(parameters);
        HidppMsg {
            kind,
            device_id,
            sub_id,
            params,
        }
    }

    /// Meaningful slice of the parameter block for this frame kind.
    pub fn payload(&self) -> &[u8] {
        &self.params[..self.kind.payload_len()]
    }
}

impl fmt::Display for HidppMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, device {:#04x}, sub id {}, params {:02x?}",
            self.kind,
            self.device_id,
            self.sub_id,
            self.payload()
        )
    }
}

/// One DJ report. The parameter block is 12 bytes for short reports and 29
/// for long ones, stored zero-padded in the long size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DjReport {
    pub kind: ReportKind,
    pub device_id: u8,
    pub report_type: DjType,
    pub params: [u8; 29],
}

impl DjReport {
    pub fn payload(&self) -> &[u8] {
        &self.params[..self.kind.payload_len()]
    }
}

impl fmt::Display for DjReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, device {:#04x}, DJ type {:?}, params {:02x?}",
            self.kind,
            self.device_id,
            self.report_type,
            self.payload()
        )
    }
}

/// Any report seen on the firmware-mode channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Hidpp(HidppMsg),
    Dj(DjReport),
}

impl Report {
    pub fn as_hidpp(&self) -> Option<&HidppMsg> {
        match self {
            Report::Hidpp(msg) => Some(msg),
            Report::Dj(_) => None,
        }
    }

    pub fn as_dj(&self) -> Option<&DjReport> {
        match self {
            Report::Dj(report) => Some(report),
            Report::Hidpp(_) => None,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Hidpp(msg) => msg.fmt(f),
            Report::Dj(report) => report.fmt(f),
        }
    }
}

impl WireReport for Report {
    fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        let bad = || FrameError::BadFrame {
            tag: raw.first().copied().unwrap_or(0),
            len: raw.len(),
        };
        let kind = raw
            .first()
            .and_then(|tag| ReportKind::from_tag(*tag))
            .ok_or_else(bad)?;
        if raw.len() != kind.frame_len() {
            return Err(bad());
        }
        match kind {
            ReportKind::HidppShort | ReportKind::HidppLong => {
                let mut params = [0u8; 17];
                params[..kind.payload_len()].copy_from_slice(&raw[3..]);
                Ok(Report::Hidpp(HidppMsg {
                    kind,
                    device_id: raw[1],
                    sub_id: SubId::from(raw[2]),
                    params,
                }))
            }
            ReportKind::DjShort | ReportKind::DjLong => {
                let mut params = [0u8; 29];
                params[..kind.payload_len()].copy_from_slice(&raw[3..]);
                Ok(Report::Dj(DjReport {
                    kind,
                    device_id: raw[1],
                    report_type: DjType::from(raw[2]),
                    params,
                }))
            }
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            Report::Hidpp(msg) => {
                let mut raw = vec![0u8; msg.kind.frame_len()];
                raw[0] = msg.kind.tag();
                raw[1] = msg.device_id;
                raw[2] = msg.sub_id.into();
                raw[3..].copy_from_slice(msg.payload());
                raw
            }
            Report::Dj(report) => {
                let mut raw = vec![0u8; report.kind.frame_len()];
                raw[0] = report.kind.tag();
                raw[1] = report.device_id;
                raw[2] = report.report_type.into();
                raw[3..].copy_from_slice(report.payload());
                raw
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_short_hidpp() {
        let raw = [0x10, 0xff, 0x81, 0x02, 0x00, 0x03, 0x00];
        let report = Report::decode(&raw).unwrap();
        let msg = report.as_hidpp().unwrap();
        assert_eq!(msg.kind, ReportKind::HidppShort);
        assert_eq!(msg.device_id, 0xff);
        assert_eq!(msg.sub_id, SubId::GetRegister);
        assert_eq!(msg.payload(), &[0x02, 0x00, 0x03, 0x00]);
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        // A long HID++ tag with a short frame length.
        let raw = [0x11, 0xff, 0x81, 0x02, 0x00, 0x03, 0x00];
        assert!(matches!(
            Report::decode(&raw),
            Err(FrameError::BadFrame { tag: 0x11, len: 7 })
        ));
        assert!(Report::decode(&[]).is_err());
        assert!(Report::decode(&[0x42, 0x00]).is_err());
    }

    #[test]
    fn wire_roundtrip_all_kinds() {
        for kind in [
            ReportKind::HidppShort,
            ReportKind::HidppLong,
            ReportKind::DjShort,
            ReportKind::DjLong,
        ] {
            let mut raw = vec![0u8; kind.frame_len()];
            raw[0] = kind.tag();
            for (i, b) in raw.iter_mut().enumerate().skip(1) {
                *b = (i * 3) as u8;
            }
            let decoded = Report::decode(&raw).unwrap();
            assert_eq!(decoded.encode(), raw, "{kind}");
        }
    }

    #[test]
    fn value_roundtrip() {
        let msg = HidppMsg::request(0xff, SubId::GetLongRegister, &[0xb5, 0x22]);
        assert_eq!(msg.kind, ReportKind::HidppShort);
        let report = Report::Hidpp(msg);
        assert_eq!(Report::decode(&report.encode()).unwrap(), report);

        let long = HidppMsg::request(0x02, SubId::SetLongRegister, &[0u8; 17]);
        assert_eq!(long.kind, ReportKind::HidppLong);
        let report = Report::Hidpp(long);
        assert_eq!(Report::decode(&report.encode()).unwrap(), report);
    }

    #[test]
    fn request_picks_frame_size_by_parameter_count() {
        assert_eq!(
            HidppMsg::request(0xff, SubId::GetRegister, &[0; 4]).kind,
            ReportKind::HidppShort
        );
        assert_eq!(
            HidppMsg::request(0xff, SubId::GetRegister, &[0; 5]).kind,
            ReportKind::HidppLong
        );
    }

    #[test]
    fn dj_type_classes() {
        assert!(DjType::RfMouse.is_rf_report());
        assert!(DjType::NotificationDevicePaired.is_notification());
        assert!(DjType::CmdSwitchAndKeepAlive.is_command());
        assert!(!DjType::NotificationDevicePaired.is_command());
    }
}
