//! Sony raw value codec (packed encodings, no tables).
//!
//! Sony bodies pack settings arithmetically: apertures as f-number x100,
//! shutter speeds as a numerator/denominator word pair, ISO as a 24-bit
//! magnitude with a kind byte on top. Writes go through the two
//! SetControlDevice operations; A for settings, B for button-like controls.

use super::TypedValue;
use super::property::{PropValue, PropertyCode};
use super::values::{
    Aperture, ExposureCompensation, ExposureMode, FNumber, FocusMode, Fraction, Iso, ShootingMode,
    ShutterSpeed, WhiteBalanceMode,
};
use crate::error::{PtpError, Result};
use crate::ptpip::codes::{OP_SONY_SET_CONTROL_DEVICE_A, OP_SONY_SET_CONTROL_DEVICE_B};

/// 24-bit magnitude marking an auto ISO sentinel.
const ISO_AUTO_MAGNITUDE: u32 = 0x00ff_ffff;

/// Focus status value while the AF drive is still hunting.
pub(crate) const FOCUS_STATUS_FOCUSING: u64 = 0x0002;

/// Which SetControlDevice operation writes this property. Buttons (half
/// press, shutter) go through B, settings through A.
pub(crate) fn control_op(code: PropertyCode) -> u16 {
    match code {
        PropertyCode::AutoFocus | PropertyCode::Capture => OP_SONY_SET_CONTROL_DEVICE_B,
        _ => OP_SONY_SET_CONTROL_DEVICE_A,
    }
}

pub(crate) fn decode_value(code: PropertyCode, raw: u64) -> Option<TypedValue> {
    Some(match code {
        PropertyCode::FNumber => TypedValue::Aperture(decode_aperture(raw as u16)),
        PropertyCode::ShutterSpeed => TypedValue::ShutterSpeed(decode_shutter(raw as u32)),
        PropertyCode::Iso => TypedValue::Iso(decode_iso(raw as u32)?),
        PropertyCode::ExposureBiasCompensation => {
            TypedValue::ExposureCompensation(decode_exposure_compensation(raw as u16 as i16)?)
        }
        PropertyCode::ExposureProgramMode => {
            TypedValue::ExposureMode(decode_exposure_mode(raw as u32)?)
        }
        PropertyCode::WhiteBalance => TypedValue::WhiteBalance(decode_white_balance(raw as u16)?),
        PropertyCode::StillCaptureMode => {
            TypedValue::ShootingMode(decode_shooting_mode(raw as u16)?)
        }
        PropertyCode::FocusMode => TypedValue::FocusMode(decode_focus_mode(raw as u16)?),
        _ => return None,
    })
}

/// Encode a setting for the wire. The returned [`PropValue`] carries the
/// width the property uses.
pub(crate) fn encode_value(value: &TypedValue) -> Result<(PropertyCode, PropValue)> {
    Ok(match value {
        TypedValue::Aperture(aperture) => (
            PropertyCode::FNumber,
            PropValue::U16(encode_aperture(aperture)?),
        ),
        TypedValue::ShutterSpeed(shutter) => (
            PropertyCode::ShutterSpeed,
            PropValue::U32(encode_shutter(shutter)?),
        ),
        TypedValue::Iso(iso) => (PropertyCode::Iso, PropValue::U32(encode_iso(iso))),
        TypedValue::ExposureCompensation(comp) => (
            PropertyCode::ExposureBiasCompensation,
            PropValue::I16(encode_exposure_compensation(*comp)),
        ),
        TypedValue::ExposureMode(mode) => (
            PropertyCode::ExposureProgramMode,
            PropValue::U32(encode_exposure_mode(*mode)?),
        ),
        TypedValue::WhiteBalance(mode) => (
            PropertyCode::WhiteBalance,
            PropValue::U16(encode_white_balance(*mode)),
        ),
        TypedValue::ShootingMode(mode) => (
            PropertyCode::StillCaptureMode,
            PropValue::U16(encode_shooting_mode(*mode)?),
        ),
        TypedValue::FocusMode(mode) => (
            PropertyCode::FocusMode,
            PropValue::U16(encode_focus_mode(*mode)),
        ),
    })
}

fn decode_aperture(raw: u16) -> Aperture {
    Aperture::Value(FNumber::from_hundredths(raw))
}

fn encode_aperture(aperture: &Aperture) -> Result<u16> {
    match aperture {
        Aperture::Value(f) => Ok(f.hundredths()),
        Aperture::Auto(_) => Err(PtpError::invalid_payload(
            "Sony bodies only accept explicit aperture values",
        )),
    }
}

fn decode_shutter(raw: u32) -> ShutterSpeed {
    if raw == 0 {
        return ShutterSpeed::Bulb;
    }
    ShutterSpeed::Value(Fraction::new(raw >> 16, raw & 0xffff))
}

fn encode_shutter(shutter: &ShutterSpeed) -> Result<u32> {
    match shutter {
        ShutterSpeed::Bulb => Ok(0),
        ShutterSpeed::Value(fraction) => {
            if fraction.numerator > 0xffff || fraction.denominator > 0xffff {
                return Err(PtpError::invalid_payload("shutter fraction does not fit"));
            }
            Ok((fraction.numerator << 16) | fraction.denominator)
        }
        ShutterSpeed::Auto(_) => Err(PtpError::invalid_payload(
            "Sony bodies only accept explicit shutter speeds",
        )),
    }
}

fn decode_iso(raw: u32) -> Option<Iso> {
    let magnitude = raw & 0x00ff_ffff;
    let kind = raw >> 24;
    if magnitude == ISO_AUTO_MAGNITUDE {
        return Some(match kind {
            0x00 => Iso::Auto(None),
            0x01 => Iso::MultiFrameNrAuto,
            0x02 => Iso::MultiFrameNrHiAuto,
            _ => return None,
        });
    }
    Some(match kind {
        0x00 => Iso::Native(magnitude),
        0x10 => Iso::Extended(magnitude),
        0x01 => Iso::MultiFrameNr(magnitude),
        0x02 => Iso::MultiFrameNrHi(magnitude),
        _ => return None,
    })
}

fn encode_iso(iso: &Iso) -> u32 {
    match iso {
        // Resolved telemetry never changes what auto encodes back to.
        Iso::Auto(_) => ISO_AUTO_MAGNITUDE,
        Iso::MultiFrameNrAuto => 0x01 << 24 | ISO_AUTO_MAGNITUDE,
        Iso::MultiFrameNrHiAuto => 0x02 << 24 | ISO_AUTO_MAGNITUDE,
        Iso::Native(v) => v & 0x00ff_ffff,
        Iso::Extended(v) => 0x10 << 24 | (v & 0x00ff_ffff),
        Iso::MultiFrameNr(v) => 0x01 << 24 | (v & 0x00ff_ffff),
        Iso::MultiFrameNrHi(v) => 0x02 << 24 | (v & 0x00ff_ffff),
    }
}

/// Sony reports compensation in thousandths of a stop; thirds come through
/// as 300 and 700.
fn decode_exposure_compensation(raw: i16) -> Option<ExposureCompensation> {
    let abs = raw.unsigned_abs() as u32;
    let part = match abs % 1000 {
        0 => 0,
        300 => 1,
        700 => 2,
        _ => return None,
    };
    let thirds = ((abs / 1000) * 3 + part) as i8;
    Some(ExposureCompensation::from_thirds(if raw < 0 {
        -thirds
    } else {
        thirds
    }))
}

fn encode_exposure_compensation(comp: ExposureCompensation) -> i16 {
    let abs = comp.thirds().unsigned_abs() as i16;
    let millis = (abs / 3) * 1000
        + match abs % 3 {
            0 => 0,
            1 => 300,
            _ => 700,
        };
    if comp.thirds() < 0 { -millis } else { millis }
}

fn decode_exposure_mode(raw: u32) -> Option<ExposureMode> {
    Some(match raw {
        0x0001 => ExposureMode::Manual,
        0x0002 => ExposureMode::Program,
        0x0003 => ExposureMode::AperturePriority,
        0x0004 => ExposureMode::ShutterPriority,
        0x8000 => ExposureMode::IntelligentAuto,
        _ => return None,
    })
}

fn encode_exposure_mode(mode: ExposureMode) -> Result<u32> {
    Ok(match mode {
        ExposureMode::Manual => 0x0001,
        ExposureMode::Program => 0x0002,
        ExposureMode::AperturePriority => 0x0003,
        ExposureMode::ShutterPriority => 0x0004,
        ExposureMode::IntelligentAuto => 0x8000,
        ExposureMode::Bulb | ExposureMode::FlexiblePriority => {
            return Err(PtpError::invalid_payload(
                "exposure program not available on Sony bodies",
            ));
        }
    })
}

fn decode_white_balance(raw: u16) -> Option<WhiteBalanceMode> {
    Some(match raw {
        0x0002 => WhiteBalanceMode::Auto,
        0x0004 => WhiteBalanceMode::Daylight,
        0x0006 => WhiteBalanceMode::Incandescent,
        0x0007 => WhiteBalanceMode::Flash,
        0x8001 => WhiteBalanceMode::FluorescentWarmWhite,
        0x8002 => WhiteBalanceMode::FluorescentCoolWhite,
        0x8003 => WhiteBalanceMode::FluorescentDayWhite,
        0x8004 => WhiteBalanceMode::FluorescentDaylight,
        0x8010 => WhiteBalanceMode::Cloudy,
        0x8011 => WhiteBalanceMode::Shade,
        0x8012 => WhiteBalanceMode::ColorTemperature,
        0x8020 => WhiteBalanceMode::Custom,
        0x8030 => WhiteBalanceMode::Underwater,
        _ => return None,
    })
}

fn encode_white_balance(mode: WhiteBalanceMode) -> u16 {
    match mode {
        WhiteBalanceMode::Auto => 0x0002,
        WhiteBalanceMode::Daylight => 0x0004,
        WhiteBalanceMode::Incandescent => 0x0006,
        WhiteBalanceMode::Flash => 0x0007,
        WhiteBalanceMode::FluorescentWarmWhite => 0x8001,
        WhiteBalanceMode::FluorescentCoolWhite => 0x8002,
        WhiteBalanceMode::FluorescentDayWhite => 0x8003,
        WhiteBalanceMode::FluorescentDaylight => 0x8004,
        WhiteBalanceMode::Cloudy => 0x8010,
        WhiteBalanceMode::Shade => 0x8011,
        WhiteBalanceMode::ColorTemperature => 0x8012,
        WhiteBalanceMode::Custom => 0x8020,
        WhiteBalanceMode::Underwater => 0x8030,
    }
}

fn decode_shooting_mode(raw: u16) -> Option<ShootingMode> {
    Some(match raw {
        0x0001 => ShootingMode::Single,
        0x0002 => ShootingMode::Continuous,
        0x8004 => ShootingMode::SelfTimer10,
        0x8005 => ShootingMode::SelfTimer2,
        0x8012 => ShootingMode::ContinuousLow,
        0x8013 => ShootingMode::ContinuousHigh,
        _ => return None,
    })
}

fn encode_shooting_mode(mode: ShootingMode) -> Result<u16> {
    Ok(match mode {
        ShootingMode::Single => 0x0001,
        ShootingMode::Continuous => 0x0002,
        ShootingMode::SelfTimer10 => 0x8004,
        ShootingMode::SelfTimer2 => 0x8005,
        ShootingMode::ContinuousLow => 0x8012,
        ShootingMode::ContinuousHigh => 0x8013,
        _ => {
            return Err(PtpError::invalid_payload(
                "drive mode not available on Sony bodies",
            ));
        }
    })
}

fn decode_focus_mode(raw: u16) -> Option<FocusMode> {
    Some(match raw {
        0x0001 => FocusMode::Manual,
        0x0002 => FocusMode::AutoSingle,
        0x8004 => FocusMode::AutoContinuous,
        0x8005 => FocusMode::Auto,
        0x8006 => FocusMode::DirectManual,
        _ => return None,
    })
}

fn encode_focus_mode(mode: FocusMode) -> u16 {
    match mode {
        FocusMode::Manual => 0x0001,
        FocusMode::AutoSingle => 0x0002,
        FocusMode::AutoContinuous => 0x8004,
        FocusMode::Auto => 0x8005,
        FocusMode::DirectManual => 0x8006,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aperture_packing() {
        assert_eq!(
            decode_value(PropertyCode::FNumber, 280),
            Some(TypedValue::Aperture(Aperture::Value(FNumber::from_tenths(28))))
        );
        assert_eq!(
            encode_aperture(&Aperture::Value(FNumber::from_tenths(95))).unwrap(),
            950
        );
        assert!(encode_aperture(&Aperture::Auto(None)).is_err());
    }

    #[test]
    fn test_sub_tenth_aperture_round_trips() {
        // f/0.95 comes through as raw 95 and must survive unquantized.
        assert_eq!(
            decode_aperture(95),
            Aperture::Value(FNumber::from_hundredths(95))
        );
        assert_eq!(
            encode_aperture(&Aperture::Value(FNumber::from_hundredths(95))).unwrap(),
            95
        );
    }

    #[test]
    fn test_shutter_word_pair() {
        // 30 seconds is 300/10.
        let raw = (300u32 << 16) | 10;
        assert_eq!(
            decode_shutter(raw),
            ShutterSpeed::Value(Fraction::new(300, 10))
        );
        assert_eq!(
            encode_shutter(&ShutterSpeed::Value(Fraction::new(300, 10))).unwrap(),
            raw
        );
        // 1/8000.
        let raw = (1u32 << 16) | 8000;
        assert_eq!(decode_shutter(raw), ShutterSpeed::Value(Fraction::new(1, 8000)));
    }

    #[test]
    fn test_shutter_bulb_is_zero_fraction() {
        assert_eq!(decode_shutter(0), ShutterSpeed::Bulb);
        assert_eq!(encode_shutter(&ShutterSpeed::Bulb).unwrap(), 0);
        assert!(encode_shutter(&ShutterSpeed::Auto(None)).is_err());
    }

    #[test]
    fn test_iso_sentinels() {
        assert_eq!(decode_iso(0x00ff_ffff), Some(Iso::Auto(None)));
        assert_eq!(decode_iso(0x01ff_ffff), Some(Iso::MultiFrameNrAuto));
        assert_eq!(decode_iso(0x02ff_ffff), Some(Iso::MultiFrameNrHiAuto));
        assert_eq!(encode_iso(&Iso::Auto(None)), 0x00ff_ffff);
        assert_eq!(encode_iso(&Iso::MultiFrameNrAuto), 0x01ff_ffff);
        assert_eq!(encode_iso(&Iso::MultiFrameNrHiAuto), 0x02ff_ffff);
    }

    #[test]
    fn test_iso_kinds_round_trip() {
        for (iso, raw) in [
            (Iso::Native(400), 0x0000_0190u32),
            (Iso::Extended(102400), 0x1001_9000),
            (Iso::MultiFrameNr(1600), 0x0100_0640),
            (Iso::MultiFrameNrHi(3200), 0x0200_0c80),
        ] {
            assert_eq!(decode_iso(raw), Some(iso));
            assert_eq!(encode_iso(&iso), raw);
        }
    }

    #[test]
    fn test_resolved_auto_iso_encodes_back_to_plain_auto() {
        assert_eq!(encode_iso(&Iso::Auto(Some(640))), 0x00ff_ffff);
    }

    #[test]
    fn test_exposure_compensation_thirds() {
        assert_eq!(
            decode_exposure_compensation(1300),
            Some(ExposureCompensation::from_thirds(4))
        );
        assert_eq!(
            decode_exposure_compensation(-700),
            Some(ExposureCompensation::from_thirds(-2))
        );
        assert_eq!(decode_exposure_compensation(450), None);
        assert_eq!(
            encode_exposure_compensation(ExposureCompensation::from_thirds(-8)),
            -2700
        );
        assert_eq!(
            encode_exposure_compensation(ExposureCompensation::from_thirds(9)),
            3000
        );
    }

    #[test]
    fn test_control_op_routing() {
        assert_eq!(control_op(PropertyCode::Iso), OP_SONY_SET_CONTROL_DEVICE_A);
        assert_eq!(
            control_op(PropertyCode::AutoFocus),
            OP_SONY_SET_CONTROL_DEVICE_B
        );
        assert_eq!(
            control_op(PropertyCode::Capture),
            OP_SONY_SET_CONTROL_DEVICE_B
        );
    }

    #[test]
    fn test_unsupported_encodes_are_invalid_payload() {
        assert!(matches!(
            encode_value(&TypedValue::ExposureMode(ExposureMode::FlexiblePriority)),
            Err(PtpError::InvalidPayload(_))
        ));
        assert!(matches!(
            encode_value(&TypedValue::ShootingMode(ShootingMode::ContinuousSilent)),
            Err(PtpError::InvalidPayload(_))
        ));
    }
}
