//! Device property descriptors and their wire format.
//!
//! A property descriptor carries the current value, the factory default, and
//! the value sets the camera is willing to accept: `supported` is the full
//! list for the body, `available` the subset valid in the current mode.

use std::fmt;

use crate::ptpip::buffer::{ByteBuffer, ByteView};

/// PTP scalar data types. Only the widths cameras actually use for the
/// properties we drive are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DataType {
    Int8 = 0x0001,
    Uint8 = 0x0002,
    Int16 = 0x0003,
    Uint16 = 0x0004,
    Int32 = 0x0005,
    Uint32 = 0x0006,
    Uint64 = 0x0008,
    Text = 0xffff,
}

impl DataType {
    pub fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0x0001 => Self::Int8,
            0x0002 => Self::Uint8,
            0x0003 => Self::Int16,
            0x0004 => Self::Uint16,
            0x0005 => Self::Int32,
            0x0006 => Self::Uint32,
            0x0008 => Self::Uint64,
            0xffff => Self::Text,
            _ => return None,
        })
    }

    /// Read one value of this type; returns the value and bytes consumed.
    pub fn read_value(self, view: ByteView<'_>, offset: usize) -> Option<(PropValue, usize)> {
        Some(match self {
            Self::Int8 => (PropValue::I8(view.read_u8(offset)? as i8), 1),
            Self::Uint8 => (PropValue::U8(view.read_u8(offset)?), 1),
            Self::Int16 => (PropValue::I16(view.read_u16(offset)? as i16), 2),
            Self::Uint16 => (PropValue::U16(view.read_u16(offset)?), 2),
            Self::Int32 => (PropValue::I32(view.read_u32(offset)? as i32), 4),
            Self::Uint32 => (PropValue::U32(view.read_u32(offset)?), 4),
            Self::Uint64 => (PropValue::U64(view.read_u64(offset)?), 8),
            Self::Text => {
                let (text, consumed) = view.read_utf16_string(offset)?;
                (PropValue::Text(text), consumed)
            }
        })
    }
}

/// A property value of the descriptor's declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    U64(u64),
    Text(String),
}

impl PropValue {
    /// Widen to u64, reinterpreting signed values as their unsigned bits.
    pub fn to_u64(&self) -> Option<u64> {
        Some(match self {
            Self::I8(v) => *v as u8 as u64,
            Self::U8(v) => *v as u64,
            Self::I16(v) => *v as u16 as u64,
            Self::U16(v) => *v as u64,
            Self::I32(v) => *v as u32 as u64,
            Self::U32(v) => *v as u64,
            Self::U64(v) => *v,
            Self::Text(_) => return None,
        })
    }

    /// Append the value in its wire width.
    pub fn write_into(&self, buf: &mut ByteBuffer) {
        match self {
            Self::I8(v) => buf.append_u8(*v as u8),
            Self::U8(v) => buf.append_u8(*v),
            Self::I16(v) => buf.append_u16(*v as u16),
            Self::U16(v) => buf.append_u16(*v),
            Self::I32(v) => buf.append_u32(*v as u32),
            Self::U32(v) => buf.append_u32(*v),
            Self::U64(v) => buf.append_u64(*v),
            Self::Text(v) => buf.append_utf16_string(v),
        }
    }
}

/// Semantic registry of the property codes the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyCode {
    WhiteBalance,
    FNumber,
    FocusMode,
    ExposureProgramMode,
    ExposureBiasCompensation,
    StillCaptureMode,
    ShutterSpeed,
    FocusStatus,
    ObjectInMemory,
    Iso,
    AutoFocus,
    Capture,
    Unknown(u16),
}

impl PropertyCode {
    /// Map a standard/Sony wire code.
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0x5005 => Self::WhiteBalance,
            0x5007 => Self::FNumber,
            0x500a => Self::FocusMode,
            0x500e => Self::ExposureProgramMode,
            0x5010 => Self::ExposureBiasCompensation,
            0x5013 => Self::StillCaptureMode,
            0xd20d => Self::ShutterSpeed,
            0xd213 => Self::FocusStatus,
            0xd215 => Self::ObjectInMemory,
            0xd21e => Self::Iso,
            0xd2c1 => Self::AutoFocus,
            0xd2c2 => Self::Capture,
            other => Self::Unknown(other),
        }
    }

    /// The standard/Sony wire code.
    pub fn raw(self) -> u16 {
        match self {
            Self::WhiteBalance => 0x5005,
            Self::FNumber => 0x5007,
            Self::FocusMode => 0x500a,
            Self::ExposureProgramMode => 0x500e,
            Self::ExposureBiasCompensation => 0x5010,
            Self::StillCaptureMode => 0x5013,
            Self::ShutterSpeed => 0xd20d,
            Self::FocusStatus => 0xd213,
            Self::ObjectInMemory => 0xd215,
            Self::Iso => 0xd21e,
            Self::AutoFocus => 0xd2c1,
            Self::Capture => 0xd2c2,
            Self::Unknown(raw) => raw,
        }
    }

    /// Map a Canon vendor property code.
    pub fn from_canon(raw: u32) -> Option<Self> {
        Some(match raw {
            0xd101 => Self::FNumber,
            0xd102 => Self::ShutterSpeed,
            0xd103 => Self::Iso,
            0xd104 => Self::ExposureBiasCompensation,
            0xd105 => Self::ExposureProgramMode,
            0xd106 => Self::StillCaptureMode,
            _ => return None,
        })
    }

    /// The Canon vendor code, for properties Canon bodies expose.
    pub fn canon(self) -> Option<u32> {
        Some(match self {
            Self::FNumber => 0xd101,
            Self::ShutterSpeed => 0xd102,
            Self::Iso => 0xd103,
            Self::ExposureBiasCompensation => 0xd104,
            Self::ExposureProgramMode => 0xd105,
            Self::StillCaptureMode => 0xd106,
            _ => return None,
        })
    }
}

impl fmt::Display for PropertyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(raw) => write!(f, "Unknown({raw:#06x})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Whether a property may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetSet {
    Get,
    GetSet,
}

impl GetSet {
    fn from_raw(raw: u8) -> Self {
        if raw == 0x01 { Self::GetSet } else { Self::Get }
    }

    pub fn settable(self) -> bool {
        matches!(self, Self::GetSet)
    }
}

/// Value constraint advertised by the descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyForm {
    None,
    Range {
        min: PropValue,
        max: PropValue,
        step: PropValue,
    },
    Enum {
        available: Vec<PropValue>,
        supported: Vec<PropValue>,
    },
}

/// A parsed device property descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProperty {
    pub code: PropertyCode,
    pub data_type: DataType,
    pub get_set_supported: GetSet,
    pub get_set_available: GetSet,
    pub factory_value: PropValue,
    pub current_value: PropValue,
    pub form: PropertyForm,
}

impl DeviceProperty {
    pub fn current_u64(&self) -> Option<u64> {
        self.current_value.to_u64()
    }

    /// Values valid in the current camera mode.
    pub fn available_u64(&self) -> Vec<u64> {
        match &self.form {
            PropertyForm::Enum { available, .. } => {
                available.iter().filter_map(PropValue::to_u64).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Values the body supports across all modes.
    pub fn supported_u64(&self) -> Vec<u64> {
        match &self.form {
            PropertyForm::Enum { supported, .. } => {
                supported.iter().filter_map(PropValue::to_u64).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Parse one descriptor at `offset`; returns the descriptor and the
    /// number of bytes consumed.
    ///
    /// Layout: code u16, data type u16, get/set supported u8, get/set
    /// available u8, factory value, current value, form flag u8, then form
    /// data. Enum forms carry two u16-counted lists, available then
    /// supported.
    pub fn parse(view: ByteView<'_>, offset: usize) -> Option<(Self, usize)> {
        let mut cursor = offset;
        let code = PropertyCode::from_raw(view.read_u16(cursor)?);
        cursor += 2;
        let data_type = DataType::from_raw(view.read_u16(cursor)?)?;
        cursor += 2;
        let get_set_supported = GetSet::from_raw(view.read_u8(cursor)?);
        cursor += 1;
        let get_set_available = GetSet::from_raw(view.read_u8(cursor)?);
        cursor += 1;

        let (factory_value, consumed) = data_type.read_value(view, cursor)?;
        cursor += consumed;
        let (current_value, consumed) = data_type.read_value(view, cursor)?;
        cursor += consumed;

        let form_flag = view.read_u8(cursor)?;
        cursor += 1;
        let form = match form_flag {
            0x00 => PropertyForm::None,
            0x01 => {
                let (min, consumed) = data_type.read_value(view, cursor)?;
                cursor += consumed;
                let (max, consumed) = data_type.read_value(view, cursor)?;
                cursor += consumed;
                let (step, consumed) = data_type.read_value(view, cursor)?;
                cursor += consumed;
                PropertyForm::Range { min, max, step }
            }
            0x02 => {
                let mut read_list = || -> Option<Vec<PropValue>> {
                    let count = view.read_u16(cursor)? as usize;
                    cursor += 2;
                    let mut values = Vec::with_capacity(count);
                    for _ in 0..count {
                        let (value, consumed) = data_type.read_value(view, cursor)?;
                        cursor += consumed;
                        values.push(value);
                    }
                    Some(values)
                };
                let available = read_list()?;
                let supported = read_list()?;
                PropertyForm::Enum { available, supported }
            }
            _ => return None,
        };

        Some((
            Self {
                code,
                data_type,
                get_set_supported,
                get_set_available,
                factory_value,
                current_value,
                form,
            },
            cursor - offset,
        ))
    }

    /// Parse a batched payload: u64 descriptor count, then descriptors
    /// back to back. Stops at the first descriptor that fails to parse and
    /// returns everything resolved before it.
    pub fn parse_all(view: ByteView<'_>) -> Vec<Self> {
        let Some(count) = view.read_u64(0) else {
            return Vec::new();
        };
        let mut properties = Vec::new();
        let mut cursor = 8;
        for _ in 0..count {
            match Self::parse(view, cursor) {
                Some((property, consumed)) => {
                    properties.push(property);
                    cursor += consumed;
                }
                None => break,
            }
        }
        properties
    }

    #[cfg(test)]
    pub(crate) fn encode_into(&self, buf: &mut ByteBuffer) {
        buf.append_u16(self.code.raw());
        buf.append_u16(self.data_type as u16);
        buf.append_u8(if self.get_set_supported.settable() { 0x01 } else { 0x00 });
        buf.append_u8(if self.get_set_available.settable() { 0x01 } else { 0x00 });
        self.factory_value.write_into(buf);
        self.current_value.write_into(buf);
        match &self.form {
            PropertyForm::None => buf.append_u8(0x00),
            PropertyForm::Range { min, max, step } => {
                buf.append_u8(0x01);
                min.write_into(buf);
                max.write_into(buf);
                step.write_into(buf);
            }
            PropertyForm::Enum { available, supported } => {
                buf.append_u8(0x02);
                buf.append_u16(available.len() as u16);
                for value in available {
                    value.write_into(buf);
                }
                buf.append_u16(supported.len() as u16);
                for value in supported {
                    value.write_into(buf);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iso_descriptor() -> DeviceProperty {
        DeviceProperty {
            code: PropertyCode::Iso,
            data_type: DataType::Uint32,
            get_set_supported: GetSet::GetSet,
            get_set_available: GetSet::GetSet,
            factory_value: PropValue::U32(100),
            current_value: PropValue::U32(400),
            form: PropertyForm::Enum {
                available: vec![PropValue::U32(100), PropValue::U32(200), PropValue::U32(400)],
                supported: vec![
                    PropValue::U32(100),
                    PropValue::U32(200),
                    PropValue::U32(400),
                    PropValue::U32(800),
                ],
            },
        }
    }

    #[test]
    fn test_descriptor_round_trip() {
        let descriptor = iso_descriptor();
        let mut buf = ByteBuffer::new();
        descriptor.encode_into(&mut buf);

        let (parsed, consumed) = DeviceProperty::parse(buf.view(0), 0).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(parsed, descriptor);
        assert_eq!(parsed.current_u64(), Some(400));
        assert_eq!(parsed.available_u64(), vec![100, 200, 400]);
        assert_eq!(parsed.supported_u64().len(), 4);
    }

    #[test]
    fn test_range_form() {
        let descriptor = DeviceProperty {
            code: PropertyCode::ExposureBiasCompensation,
            data_type: DataType::Int16,
            get_set_supported: GetSet::GetSet,
            get_set_available: GetSet::Get,
            factory_value: PropValue::I16(0),
            current_value: PropValue::I16(-700),
            form: PropertyForm::Range {
                min: PropValue::I16(-3000),
                max: PropValue::I16(3000),
                step: PropValue::I16(300),
            },
        };
        let mut buf = ByteBuffer::new();
        descriptor.encode_into(&mut buf);
        let (parsed, _) = DeviceProperty::parse(buf.view(0), 0).unwrap();
        assert_eq!(parsed, descriptor);
        assert!(!parsed.get_set_available.settable());
    }

    #[test]
    fn test_batched_parse_returns_partial_prefix() {
        let mut buf = ByteBuffer::new();
        buf.append_u64(3);
        iso_descriptor().encode_into(&mut buf);
        iso_descriptor().encode_into(&mut buf);
        // Third descriptor is truncated garbage.
        buf.append_u16(0x5007);
        buf.append_u16(0x0004);

        let properties = DeviceProperty::parse_all(buf.view(0));
        assert_eq!(properties.len(), 2);
        assert!(properties.iter().all(|p| p.code == PropertyCode::Iso));
    }

    #[test]
    fn test_unknown_data_type_rejected() {
        let mut buf = ByteBuffer::new();
        buf.append_u16(0xd21e);
        buf.append_u16(0x7777);
        buf.append_u8(1);
        buf.append_u8(1);
        assert!(DeviceProperty::parse(buf.view(0), 0).is_none());
    }

    #[test]
    fn test_property_code_canon_mapping() {
        assert_eq!(PropertyCode::from_canon(0xd103), Some(PropertyCode::Iso));
        assert_eq!(PropertyCode::Iso.canon(), Some(0xd103));
        assert_eq!(PropertyCode::AutoFocus.canon(), None);
        assert_eq!(PropertyCode::from_canon(0xdead), None);
    }

    #[test]
    fn test_property_code_raw_round_trip() {
        for raw in [0x5005u16, 0x5007, 0x500a, 0x500e, 0x5010, 0x5013, 0xd20d, 0xd21e] {
            assert_eq!(PropertyCode::from_raw(raw).raw(), raw);
        }
        assert_eq!(PropertyCode::from_raw(0xbeef), PropertyCode::Unknown(0xbeef));
        assert_eq!(PropertyCode::Unknown(0xbeef).raw(), 0xbeef);
    }
}
