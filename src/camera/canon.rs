//! Canon raw value codec (table-driven) and event blob parsing.
//!
//! Canon bodies report settings as opaque table ids and stream state changes
//! as a packed record blob fetched with GetEvent. Auto sentinels decode to
//! the Auto variants; the value the camera actually picked, when present in
//! OLC telemetry, rides along as the resolved payload.

use tracing::debug;

use super::TypedValue;
use super::property::PropertyCode;
use super::values::{
    Aperture, ExposureCompensation, ExposureMode, FNumber, Fraction, ShootingMode, ShutterSpeed,
};
use crate::error::{PtpError, Result};
use crate::ptpip::buffer::{ByteBuffer, ByteView};

pub(crate) const SHUTTER_AUTO: u32 = 0x04;
pub(crate) const SHUTTER_BULB: u32 = 0x0c;
pub(crate) const ISO_AUTO: u32 = 0x00;
pub(crate) const APERTURE_AUTO: u32 = 0xff;

/// Shutter ids ascend in third-stop steps; seconds are numerator/10.
const SHUTTER_TABLE: &[(u32, Fraction)] = &[
    (0x10, Fraction::new(300, 10)),
    (0x13, Fraction::new(250, 10)),
    (0x15, Fraction::new(200, 10)),
    (0x18, Fraction::new(150, 10)),
    (0x1b, Fraction::new(130, 10)),
    (0x1d, Fraction::new(100, 10)),
    (0x20, Fraction::new(80, 10)),
    (0x23, Fraction::new(60, 10)),
    (0x25, Fraction::new(50, 10)),
    (0x28, Fraction::new(40, 10)),
    (0x2b, Fraction::new(32, 10)),
    (0x2d, Fraction::new(25, 10)),
    (0x30, Fraction::new(20, 10)),
    (0x33, Fraction::new(16, 10)),
    (0x35, Fraction::new(13, 10)),
    (0x38, Fraction::new(10, 10)),
    (0x3b, Fraction::new(8, 10)),
    (0x3d, Fraction::new(6, 10)),
    (0x40, Fraction::new(5, 10)),
    (0x43, Fraction::new(4, 10)),
    (0x45, Fraction::new(3, 10)),
    (0x48, Fraction::new(1, 4)),
    (0x4b, Fraction::new(1, 5)),
    (0x4d, Fraction::new(1, 6)),
    (0x50, Fraction::new(1, 8)),
    (0x53, Fraction::new(1, 10)),
    (0x55, Fraction::new(1, 13)),
    (0x58, Fraction::new(1, 15)),
    (0x5b, Fraction::new(1, 20)),
    (0x5d, Fraction::new(1, 25)),
    (0x60, Fraction::new(1, 30)),
    (0x63, Fraction::new(1, 40)),
    (0x65, Fraction::new(1, 50)),
    (0x68, Fraction::new(1, 60)),
    (0x6b, Fraction::new(1, 80)),
    (0x6d, Fraction::new(1, 100)),
    (0x70, Fraction::new(1, 125)),
    (0x73, Fraction::new(1, 160)),
    (0x75, Fraction::new(1, 200)),
    (0x78, Fraction::new(1, 250)),
    (0x7b, Fraction::new(1, 320)),
    (0x7d, Fraction::new(1, 400)),
    (0x80, Fraction::new(1, 500)),
    (0x83, Fraction::new(1, 640)),
    (0x85, Fraction::new(1, 800)),
    (0x88, Fraction::new(1, 1000)),
    (0x8b, Fraction::new(1, 1250)),
    (0x8d, Fraction::new(1, 1600)),
    (0x90, Fraction::new(1, 2000)),
    (0x93, Fraction::new(1, 2500)),
    (0x95, Fraction::new(1, 3200)),
    (0x98, Fraction::new(1, 4000)),
    (0x9b, Fraction::new(1, 5000)),
    (0x9d, Fraction::new(1, 6400)),
    (0xa0, Fraction::new(1, 8000)),
];

const ISO_TABLE: &[(u32, u32)] = &[
    (0x40, 50),
    (0x48, 100),
    (0x4b, 125),
    (0x4d, 160),
    (0x50, 200),
    (0x53, 250),
    (0x55, 320),
    (0x58, 400),
    (0x5b, 500),
    (0x5d, 640),
    (0x60, 800),
    (0x63, 1000),
    (0x65, 1250),
    (0x68, 1600),
    (0x6b, 2000),
    (0x6d, 2500),
    (0x70, 3200),
    (0x73, 4000),
    (0x75, 5000),
    (0x78, 6400),
    (0x7b, 8000),
    (0x7d, 10000),
    (0x80, 12800),
    (0x83, 16000),
    (0x85, 20000),
    (0x88, 25600),
    (0x8b, 32000),
    (0x8d, 40000),
    (0x90, 51200),
    (0x93, 64000),
    (0x95, 80000),
    (0x98, 102400),
];

/// F-numbers in tenths.
const APERTURE_TABLE: &[(u32, u16)] = &[
    (0x0d, 12),
    (0x10, 14),
    (0x13, 16),
    (0x15, 18),
    (0x18, 20),
    (0x1b, 22),
    (0x1d, 25),
    (0x20, 28),
    (0x23, 32),
    (0x25, 35),
    (0x28, 40),
    (0x2b, 45),
    (0x2d, 50),
    (0x30, 56),
    (0x33, 63),
    (0x35, 71),
    (0x38, 80),
    (0x3b, 90),
    (0x3d, 100),
    (0x40, 110),
    (0x43, 130),
    (0x45, 140),
    (0x48, 160),
    (0x4b, 180),
    (0x4d, 200),
    (0x50, 220),
    (0x53, 250),
    (0x55, 290),
    (0x58, 320),
];

/// Compensation in thirds of a stop; negative ids mirror from 0xff down.
const EXPOSURE_COMPENSATION_TABLE: &[(u32, i8)] = &[
    (0x18, 9),
    (0x15, 8),
    (0x13, 7),
    (0x10, 6),
    (0x0d, 5),
    (0x0b, 4),
    (0x08, 3),
    (0x05, 2),
    (0x03, 1),
    (0x00, 0),
    (0xfd, -1),
    (0xfb, -2),
    (0xf8, -3),
    (0xf5, -4),
    (0xf3, -5),
    (0xf0, -6),
    (0xed, -7),
    (0xeb, -8),
    (0xe8, -9),
];

const EXPOSURE_MODE_TABLE: &[(u32, ExposureMode)] = &[
    (0x00, ExposureMode::Program),
    (0x01, ExposureMode::ShutterPriority),
    (0x02, ExposureMode::AperturePriority),
    (0x03, ExposureMode::Manual),
    (0x04, ExposureMode::Bulb),
    (0x16, ExposureMode::IntelligentAuto),
    (0x37, ExposureMode::FlexiblePriority),
];

const SHOOTING_MODE_TABLE: &[(u32, ShootingMode)] = &[
    (0x00, ShootingMode::Single),
    (0x10, ShootingMode::SelfTimer10),
    (0x11, ShootingMode::SelfTimer2),
    (0x13, ShootingMode::SingleSilent),
    (0x01, ShootingMode::Continuous),
    (0x04, ShootingMode::ContinuousHigh),
    (0x05, ShootingMode::ContinuousLow),
    (0x07, ShootingMode::ContinuousSilent),
    (0x12, ShootingMode::ContinuousSilentHigh),
    (0x14, ShootingMode::ContinuousSuperHigh),
];

fn table_decode<T: Copy>(table: &[(u32, T)], id: u32) -> Option<T> {
    table.iter().find(|(raw, _)| *raw == id).map(|(_, v)| *v)
}

fn table_encode<T: Copy + PartialEq>(table: &[(u32, T)], value: T) -> Option<u32> {
    table.iter().find(|(_, v)| *v == value).map(|(raw, _)| *raw)
}

pub(crate) fn decode_value(
    code: PropertyCode,
    raw: u64,
    olc: Option<&OlcInfo>,
) -> Option<TypedValue> {
    let raw = raw as u32;
    Some(match code {
        PropertyCode::FNumber => TypedValue::Aperture(if raw == APERTURE_AUTO {
            let resolved = olc
                .and_then(|o| o.aperture)
                .and_then(|id| table_decode(APERTURE_TABLE, id as u32))
                .map(FNumber::from_tenths);
            Aperture::Auto(resolved)
        } else {
            Aperture::Value(FNumber::from_tenths(table_decode(APERTURE_TABLE, raw)?))
        }),
        PropertyCode::ShutterSpeed => TypedValue::ShutterSpeed(match raw {
            SHUTTER_AUTO => {
                let resolved = olc
                    .and_then(|o| o.shutter)
                    .and_then(|id| table_decode(SHUTTER_TABLE, id as u32));
                ShutterSpeed::Auto(resolved)
            }
            SHUTTER_BULB => ShutterSpeed::Bulb,
            other => ShutterSpeed::Value(table_decode(SHUTTER_TABLE, other)?),
        }),
        PropertyCode::Iso => TypedValue::Iso(if raw == ISO_AUTO {
            let resolved = olc
                .and_then(|o| o.iso)
                .and_then(|id| table_decode(ISO_TABLE, id as u32));
            super::values::Iso::Auto(resolved)
        } else {
            super::values::Iso::Native(table_decode(ISO_TABLE, raw)?)
        }),
        PropertyCode::ExposureBiasCompensation => TypedValue::ExposureCompensation(
            ExposureCompensation::from_thirds(table_decode(EXPOSURE_COMPENSATION_TABLE, raw)?),
        ),
        PropertyCode::ExposureProgramMode => {
            TypedValue::ExposureMode(table_decode(EXPOSURE_MODE_TABLE, raw)?)
        }
        PropertyCode::StillCaptureMode => {
            TypedValue::ShootingMode(table_decode(SHOOTING_MODE_TABLE, raw)?)
        }
        _ => return None,
    })
}

/// Encode a setting as (canon property code, raw id). Values outside the
/// tables, and setting families Canon bodies do not expose, fail with
/// InvalidPayload.
pub(crate) fn encode_value(value: &TypedValue) -> Result<(u32, u32)> {
    let (code, raw) = match value {
        TypedValue::Aperture(aperture) => (
            PropertyCode::FNumber,
            match aperture {
                // Resolved telemetry never changes what auto encodes back to.
                Aperture::Auto(_) => APERTURE_AUTO,
                Aperture::Value(f) => table_encode(APERTURE_TABLE, f.tenths())
                    .ok_or_else(|| PtpError::invalid_payload(format!("{f} has no Canon id")))?,
            },
        ),
        TypedValue::ShutterSpeed(shutter) => (
            PropertyCode::ShutterSpeed,
            match shutter {
                ShutterSpeed::Auto(_) => SHUTTER_AUTO,
                ShutterSpeed::Bulb => SHUTTER_BULB,
                ShutterSpeed::Value(fraction) => table_encode(SHUTTER_TABLE, *fraction)
                    .ok_or_else(|| {
                        PtpError::invalid_payload(format!("{fraction} has no Canon id"))
                    })?,
            },
        ),
        TypedValue::Iso(iso) => (
            PropertyCode::Iso,
            match iso {
                super::values::Iso::Auto(_) => ISO_AUTO,
                super::values::Iso::Native(v) => table_encode(ISO_TABLE, *v)
                    .ok_or_else(|| PtpError::invalid_payload(format!("ISO {v} has no Canon id")))?,
                other => {
                    return Err(PtpError::invalid_payload(format!(
                        "{other} not available on Canon bodies"
                    )));
                }
            },
        ),
        TypedValue::ExposureCompensation(comp) => (
            PropertyCode::ExposureBiasCompensation,
            table_encode(EXPOSURE_COMPENSATION_TABLE, comp.thirds())
                .ok_or_else(|| PtpError::invalid_payload(format!("{comp} has no Canon id")))?,
        ),
        TypedValue::ExposureMode(mode) => (
            PropertyCode::ExposureProgramMode,
            table_encode(EXPOSURE_MODE_TABLE, *mode)
                .ok_or_else(|| PtpError::invalid_payload("exposure program has no Canon id"))?,
        ),
        TypedValue::ShootingMode(mode) => (
            PropertyCode::StillCaptureMode,
            table_encode(SHOOTING_MODE_TABLE, *mode)
                .ok_or_else(|| PtpError::invalid_payload("drive mode has no Canon id"))?,
        ),
        TypedValue::WhiteBalance(_) | TypedValue::FocusMode(_) => {
            return Err(PtpError::invalid_payload(
                "setting family not driven over PTP on Canon bodies",
            ));
        }
    };
    let canon_code = code
        .canon()
        .ok_or_else(|| PtpError::invalid_payload(format!("{code} has no Canon property code")))?;
    Ok((canon_code, raw))
}

/// Data phase for SetDevicePropValueEx: record length, property code, value.
pub(crate) fn set_property_payload(canon_code: u32, raw: u32) -> ByteBuffer {
    let mut buf = ByteBuffer::new();
    buf.append_u32(12);
    buf.append_u32(canon_code);
    buf.append_u32(raw);
    buf
}

// GetEvent blob record kinds.
const EC_OBJECT_ADDED: u32 = 0xc181;
const EC_PROP_VALUE_CHANGED: u32 = 0xc189;
const EC_AVAIL_LIST_CHANGED: u32 = 0xc18a;
const EC_OLC_INFO_CHANGED: u32 = 0xc1a4;
const EC_OBJECT_ADDED_64: u32 = 0xc1a7;

/// On-lens-controller telemetry. Fields are present per the mask bit, in
/// ascending bit order: button state, then the shutter, aperture, and ISO
/// ids the exposure engine settled on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OlcInfo {
    pub button: Option<u16>,
    pub shutter: Option<u16>,
    pub aperture: Option<u16>,
    pub iso: Option<u16>,
}

impl OlcInfo {
    /// Layout: payload length u32, field mask u16, then one u16 per set bit.
    pub(crate) fn parse(view: ByteView<'_>) -> Option<Self> {
        let mask = view.read_u16(4)?;
        let mut cursor = 6;
        let mut field = |bit: u16| -> Option<u16> {
            if mask & bit == 0 {
                return None;
            }
            let value = view.read_u16(cursor);
            cursor += 2;
            value
        };
        Some(Self {
            button: field(0x0001),
            shutter: field(0x0002),
            aperture: field(0x0004),
            iso: field(0x0008),
        })
    }

    /// The half-press focus wait is over once the button state leaves the
    /// "driving AF" values.
    pub fn focus_settled(&self) -> bool {
        matches!(self.button, Some(v) if v != 2 && v != 7)
    }

    #[cfg(test)]
    pub(crate) fn encode(&self) -> ByteBuffer {
        let mut mask = 0u16;
        let mut fields = Vec::new();
        for (bit, value) in [
            (0x0001, self.button),
            (0x0002, self.shutter),
            (0x0004, self.aperture),
            (0x0008, self.iso),
        ] {
            if let Some(value) = value {
                mask |= bit;
                fields.push(value);
            }
        }
        let mut buf = ByteBuffer::new();
        buf.append_u32(6 + fields.len() as u32 * 2);
        buf.append_u16(mask);
        for value in fields {
            buf.append_u16(value);
        }
        buf
    }
}

/// One decoded record from a GetEvent blob.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CanonEventRecord {
    PropertyChanged { code: u32, value: u32 },
    AvailableListChanged { code: u32, values: Vec<u32> },
    OlcInfoChanged(OlcInfo),
    ObjectAdded { object_id: u32 },
    /// Second-stage object announced once in-camera develop finishes.
    DevelopedObjectAdded { object_id: u32 },
}

/// Walk a GetEvent blob: records of `{size u32, kind u32, payload}`, ending
/// at a record whose size cannot hold its own header or that runs past the
/// buffer. Unknown kinds are skipped by their declared size.
pub(crate) fn parse_event_blob(view: ByteView<'_>) -> Vec<CanonEventRecord> {
    let mut records = Vec::new();
    let mut offset = 0usize;

    while let (Some(size), Some(kind)) = (view.read_u32(offset), view.read_u32(offset + 4)) {
        let size = size as usize;
        if size < 8 || view.read_bytes(offset, size).is_none() {
            break;
        }
        let payload = view.sub_view(offset + 8);
        let payload_len = size - 8;

        let record = match kind {
            EC_PROP_VALUE_CHANGED => payload.read_u32(0).zip(payload.read_u32(4)).map(
                |(code, value)| CanonEventRecord::PropertyChanged { code, value },
            ),
            EC_AVAIL_LIST_CHANGED => (|| {
                let code = payload.read_u32(0)?;
                let count = payload.read_u32(4)? as usize;
                let mut values = Vec::with_capacity(count);
                for i in 0..count {
                    let value_offset = 8 + i * 4;
                    if value_offset + 4 > payload_len {
                        break;
                    }
                    values.push(payload.read_u32(value_offset)?);
                }
                Some(CanonEventRecord::AvailableListChanged { code, values })
            })(),
            EC_OLC_INFO_CHANGED => OlcInfo::parse(payload).map(CanonEventRecord::OlcInfoChanged),
            EC_OBJECT_ADDED => payload
                .read_u32(0)
                .map(|object_id| CanonEventRecord::ObjectAdded { object_id }),
            EC_OBJECT_ADDED_64 => payload
                .read_u32(0)
                .map(|object_id| CanonEventRecord::DevelopedObjectAdded { object_id }),
            _ => None,
        };

        match record {
            Some(record) => records.push(record),
            None => debug!(kind = format_args!("{kind:#010x}"), size, "skipping event record"),
        }
        offset += size;
    }

    records
}
