//! Aggregated camera state handed to callers.

use std::collections::HashMap;
use std::path::PathBuf;

use super::canon::OlcInfo;
use super::property::{DeviceProperty, PropertyCode};
use super::values::{
    Aperture, ExposureCompensation, ExposureMode, FocusMode, Iso, ShootingMode, ShutterSpeed,
    WhiteBalanceMode,
};
use super::{TypedValue, Vendor};

/// One setting with its current value and the value sets the camera accepts:
/// `supported` across the body, `available` in the current mode.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyState<T> {
    pub current: T,
    pub available: Vec<T>,
    pub supported: Vec<T>,
    pub settable: bool,
}

/// Snapshot of everything the engine knows about the camera.
#[derive(Debug, Clone, Default)]
pub struct CameraEvent {
    pub aperture: Option<PropertyState<Aperture>>,
    pub shutter_speed: Option<PropertyState<ShutterSpeed>>,
    pub iso: Option<PropertyState<Iso>>,
    pub exposure_mode: Option<PropertyState<ExposureMode>>,
    pub exposure_compensation: Option<PropertyState<ExposureCompensation>>,
    pub white_balance: Option<PropertyState<WhiteBalanceMode>>,
    pub shooting_mode: Option<PropertyState<ShootingMode>>,
    pub focus_mode: Option<PropertyState<FocusMode>>,
    /// Raw object-in-memory flag, where the body reports one.
    pub object_in_memory: Option<u64>,
    /// Images downloaded since the last snapshot, tagged with the drive mode
    /// they were shot in.
    pub captured_images: Vec<(ShootingMode, PathBuf)>,
}

impl CameraEvent {
    /// Build a snapshot from parsed property descriptors.
    pub(crate) fn from_descriptors(
        vendor: Vendor,
        descriptors: &[DeviceProperty],
        olc: Option<&OlcInfo>,
    ) -> Self {
        let mut event = Self::default();
        for descriptor in descriptors {
            event.apply_descriptor(vendor, descriptor, olc);
        }
        event
    }

    fn apply_descriptor(
        &mut self,
        vendor: Vendor,
        descriptor: &DeviceProperty,
        olc: Option<&OlcInfo>,
    ) {
        if descriptor.code == PropertyCode::ObjectInMemory {
            self.object_in_memory = descriptor.current_u64();
            return;
        }
        let Some(raw) = descriptor.current_u64() else {
            return;
        };
        let Some(current) = vendor.decode_value(descriptor.code, raw, olc) else {
            return;
        };
        self.apply_value(
            vendor,
            descriptor.code,
            current,
            descriptor.available_u64(),
            descriptor.supported_u64(),
            descriptor.get_set_available.settable(),
            olc,
        );
    }

    /// Build a snapshot from Canon's event-fed registry: current raw ids plus
    /// the last advertised availability lists. Canon reports a single list,
    /// which serves as both `available` and `supported`.
    pub(crate) fn from_canon_registry(
        values: &HashMap<u32, u32>,
        lists: &HashMap<u32, Vec<u32>>,
        olc: Option<&OlcInfo>,
    ) -> Self {
        let mut event = Self::default();
        for (&canon_code, &raw) in values {
            let Some(code) = PropertyCode::from_canon(canon_code) else {
                continue;
            };
            let Some(current) = Vendor::Canon.decode_value(code, raw as u64, olc) else {
                continue;
            };
            let list: Vec<u64> = lists
                .get(&canon_code)
                .map(|values| values.iter().map(|v| *v as u64).collect())
                .unwrap_or_default();
            event.apply_value(Vendor::Canon, code, current, list.clone(), list, true, olc);
        }
        event
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_value(
        &mut self,
        vendor: Vendor,
        code: PropertyCode,
        current: TypedValue,
        available_raw: Vec<u64>,
        supported_raw: Vec<u64>,
        settable: bool,
        olc: Option<&OlcInfo>,
    ) {
        fn state<T>(
            vendor: Vendor,
            code: PropertyCode,
            olc: Option<&OlcInfo>,
            current: T,
            available_raw: Vec<u64>,
            supported_raw: Vec<u64>,
            settable: bool,
            extract: impl Fn(TypedValue) -> Option<T>,
        ) -> PropertyState<T> {
            let decode_list = |raws: Vec<u64>| {
                raws.into_iter()
                    .filter_map(|raw| vendor.decode_value(code, raw, olc))
                    .filter_map(&extract)
                    .collect()
            };
            PropertyState {
                current,
                available: decode_list(available_raw),
                supported: decode_list(supported_raw),
                settable,
            }
        }

        match current {
            TypedValue::Aperture(value) => {
                self.aperture = Some(state(
                    vendor,
                    code,
                    olc,
                    value,
                    available_raw,
                    supported_raw,
                    settable,
                    |v| match v {
                        TypedValue::Aperture(inner) => Some(inner),
                        _ => None,
                    },
                ));
            }
            TypedValue::ShutterSpeed(value) => {
                self.shutter_speed = Some(state(
                    vendor,
                    code,
                    olc,
                    value,
                    available_raw,
                    supported_raw,
                    settable,
                    |v| match v {
                        TypedValue::ShutterSpeed(inner) => Some(inner),
                        _ => None,
                    },
                ));
            }
            TypedValue::Iso(value) => {
                self.iso = Some(state(
                    vendor,
                    code,
                    olc,
                    value,
                    available_raw,
                    supported_raw,
                    settable,
                    |v| match v {
                        TypedValue::Iso(inner) => Some(inner),
                        _ => None,
                    },
                ));
            }
            TypedValue::ExposureMode(value) => {
                self.exposure_mode = Some(state(
                    vendor,
                    code,
                    olc,
                    value,
                    available_raw,
                    supported_raw,
                    settable,
                    |v| match v {
                        TypedValue::ExposureMode(inner) => Some(inner),
                        _ => None,
                    },
                ));
            }
            TypedValue::ExposureCompensation(value) => {
                self.exposure_compensation = Some(state(
                    vendor,
                    code,
                    olc,
                    value,
                    available_raw,
                    supported_raw,
                    settable,
                    |v| match v {
                        TypedValue::ExposureCompensation(inner) => Some(inner),
                        _ => None,
                    },
                ));
            }
            TypedValue::WhiteBalance(value) => {
                self.white_balance = Some(state(
                    vendor,
                    code,
                    olc,
                    value,
                    available_raw,
                    supported_raw,
                    settable,
                    |v| match v {
                        TypedValue::WhiteBalance(inner) => Some(inner),
                        _ => None,
                    },
                ));
            }
            TypedValue::ShootingMode(value) => {
                self.shooting_mode = Some(state(
                    vendor,
                    code,
                    olc,
                    value,
                    available_raw,
                    supported_raw,
                    settable,
                    |v| match v {
                        TypedValue::ShootingMode(inner) => Some(inner),
                        _ => None,
                    },
                ));
            }
            TypedValue::FocusMode(value) => {
                self.focus_mode = Some(state(
                    vendor,
                    code,
                    olc,
                    value,
                    available_raw,
                    supported_raw,
                    settable,
                    |v| match v {
                        TypedValue::FocusMode(inner) => Some(inner),
                        _ => None,
                    },
                ));
            }
        }
    }
}
