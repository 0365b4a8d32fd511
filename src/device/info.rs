//! Standard PTP dataset parsing: DeviceInfo and ObjectInfo.

use crate::ptpip::buffer::ByteView;

#[cfg(test)]
use crate::ptpip::buffer::ByteBuffer;

fn read_u16_array(view: ByteView<'_>, offset: usize) -> Option<(Vec<u16>, usize)> {
    let count = view.read_u32(offset)? as usize;
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        values.push(view.read_u16(offset + 4 + i * 2)?);
    }
    Some((values, 4 + count * 2))
}

#[cfg(test)]
fn write_u16_array(buf: &mut ByteBuffer, values: &[u16]) {
    buf.append_u32(values.len() as u32);
    for value in values {
        buf.append_u16(*value);
    }
}

#[cfg(test)]
fn write_ptp_string(buf: &mut ByteBuffer, value: &str) {
    let units: Vec<u16> = value.encode_utf16().collect();
    buf.append_u8(units.len() as u8 + 1);
    for unit in units {
        buf.append_u16(unit);
    }
    buf.append_u16(0);
}

/// The DeviceInfo dataset: what the camera advertises it can do.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub standard_version: u16,
    pub vendor_extension_id: u32,
    pub vendor_description: String,
    pub operations_supported: Vec<u16>,
    pub events_supported: Vec<u16>,
    pub properties_supported: Vec<u16>,
    pub manufacturer: String,
    pub model: String,
    pub device_version: String,
    pub serial_number: String,
}

impl DeviceInfo {
    pub fn supports_operation(&self, op: u16) -> bool {
        self.operations_supported.contains(&op)
    }

    pub fn supports_event(&self, event: u16) -> bool {
        self.events_supported.contains(&event)
    }

    /// Parse the standard dataset. Capture- and image-format arrays are
    /// consumed but not kept.
    pub fn parse(view: ByteView<'_>) -> Option<Self> {
        let mut cursor = 0usize;
        let standard_version = view.read_u16(cursor)?;
        cursor += 2;
        let vendor_extension_id = view.read_u32(cursor)?;
        cursor += 4;
        // Vendor extension version.
        cursor += 2;
        let (vendor_description, consumed) = read_ptp_string(view, cursor)?;
        cursor += consumed;
        // Functional mode.
        cursor += 2;
        let (operations_supported, consumed) = read_u16_array(view, cursor)?;
        cursor += consumed;
        let (events_supported, consumed) = read_u16_array(view, cursor)?;
        cursor += consumed;
        let (properties_supported, consumed) = read_u16_array(view, cursor)?;
        cursor += consumed;
        let (_capture_formats, consumed) = read_u16_array(view, cursor)?;
        cursor += consumed;
        let (_image_formats, consumed) = read_u16_array(view, cursor)?;
        cursor += consumed;
        let (manufacturer, consumed) = read_ptp_string(view, cursor)?;
        cursor += consumed;
        let (model, consumed) = read_ptp_string(view, cursor)?;
        cursor += consumed;
        let (device_version, consumed) = read_ptp_string(view, cursor)?;
        cursor += consumed;
        let (serial_number, _) = read_ptp_string(view, cursor)?;

        Some(Self {
            standard_version,
            vendor_extension_id,
            vendor_description,
            operations_supported,
            events_supported,
            properties_supported,
            manufacturer,
            model,
            device_version,
            serial_number,
        })
    }

    #[cfg(test)]
    pub(crate) fn encode(&self) -> ByteBuffer {
        let mut buf = ByteBuffer::new();
        buf.append_u16(self.standard_version);
        buf.append_u32(self.vendor_extension_id);
        buf.append_u16(0); // vendor extension version
        write_ptp_string(&mut buf, &self.vendor_description);
        buf.append_u16(0); // functional mode
        write_u16_array(&mut buf, &self.operations_supported);
        write_u16_array(&mut buf, &self.events_supported);
        write_u16_array(&mut buf, &self.properties_supported);
        write_u16_array(&mut buf, &[]); // capture formats
        write_u16_array(&mut buf, &[0x3801]); // image formats
        write_ptp_string(&mut buf, &self.manufacturer);
        write_ptp_string(&mut buf, &self.model);
        write_ptp_string(&mut buf, &self.device_version);
        write_ptp_string(&mut buf, &self.serial_number);
        buf
    }
}

/// PTP string: u8 character count (terminator included), then UTF-16LE units.
fn read_ptp_string(view: ByteView<'_>, offset: usize) -> Option<(String, usize)> {
    let count = view.read_u8(offset)? as usize;
    if count == 0 {
        return Some((String::new(), 1));
    }
    let mut units = Vec::with_capacity(count - 1);
    for i in 0..count {
        let unit = view.read_u16(offset + 1 + i * 2)?;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    Some((String::from_utf16_lossy(&units), 1 + count * 2))
}

/// The StorageInfo dataset for one storage id.
#[derive(Debug, Clone, Default)]
pub struct StorageInfo {
    pub storage_id: u32,
    pub storage_type: u16,
    pub filesystem_type: u16,
    pub access_capability: u16,
    pub max_capacity: u64,
    pub free_space_bytes: u64,
    pub free_space_images: u32,
    pub description: String,
    pub volume_label: String,
}

impl StorageInfo {
    /// Parse the standard dataset. The id comes from the GetStorageIDs array,
    /// not the dataset itself.
    pub fn parse(storage_id: u32, view: ByteView<'_>) -> Option<Self> {
        let storage_type = view.read_u16(0)?;
        let filesystem_type = view.read_u16(2)?;
        let access_capability = view.read_u16(4)?;
        let max_capacity = view.read_u64(6)?;
        let free_space_bytes = view.read_u64(14)?;
        let free_space_images = view.read_u32(22)?;
        let (description, consumed) = read_ptp_string(view, 26)?;
        let (volume_label, _) = read_ptp_string(view, 26 + consumed)?;
        Some(Self {
            storage_id,
            storage_type,
            filesystem_type,
            access_capability,
            max_capacity,
            free_space_bytes,
            free_space_images,
            description,
            volume_label,
        })
    }

    #[cfg(test)]
    pub(crate) fn encode(&self) -> ByteBuffer {
        let mut buf = ByteBuffer::new();
        buf.append_u16(self.storage_type);
        buf.append_u16(self.filesystem_type);
        buf.append_u16(self.access_capability);
        buf.append_u64(self.max_capacity);
        buf.append_u64(self.free_space_bytes);
        buf.append_u32(self.free_space_images);
        write_ptp_string(&mut buf, &self.description);
        write_ptp_string(&mut buf, &self.volume_label);
        buf
    }
}

/// The slice of ObjectInfo the download path needs.
#[derive(Debug, Clone, Default)]
pub struct ObjectInfo {
    pub storage_id: u32,
    pub object_format: u16,
    pub compressed_size: u32,
    pub filename: String,
}

impl ObjectInfo {
    pub fn parse(view: ByteView<'_>) -> Option<Self> {
        let storage_id = view.read_u32(0)?;
        let object_format = view.read_u16(4)?;
        let compressed_size = view.read_u32(8)?;
        // Fixed fields through SequenceNumber end at offset 52.
        let (filename, _) = read_ptp_string(view, 52)?;
        Some(Self {
            storage_id,
            object_format,
            compressed_size,
            filename,
        })
    }

    #[cfg(test)]
    pub(crate) fn encode(&self) -> ByteBuffer {
        let mut buf = ByteBuffer::new();
        buf.append_u32(self.storage_id);
        buf.append_u16(self.object_format);
        buf.append_u16(0); // protection status
        buf.append_u32(self.compressed_size);
        // Thumb and image geometry fields the engine ignores.
        while buf.len() < 52 {
            buf.append_u8(0);
        }
        write_ptp_string(&mut buf, &self.filename);
        write_ptp_string(&mut buf, ""); // capture date
        write_ptp_string(&mut buf, ""); // modification date
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_round_trip() {
        let info = DeviceInfo {
            standard_version: 100,
            vendor_extension_id: 0x11,
            vendor_description: "Sony PTP Extensions".to_string(),
            operations_supported: vec![0x1002, 0x9201, 0x9209],
            events_supported: vec![0xc201, 0xc202],
            properties_supported: vec![0x5007, 0xd21e],
            manufacturer: "Sony Corporation".to_string(),
            model: "ILCE-7M3".to_string(),
            device_version: "3.10".to_string(),
            serial_number: "00001".to_string(),
        };
        let buf = info.encode();
        let parsed = DeviceInfo::parse(buf.view(0)).unwrap();
        assert_eq!(parsed.operations_supported, info.operations_supported);
        assert_eq!(parsed.events_supported, info.events_supported);
        assert_eq!(parsed.model, "ILCE-7M3");
        assert!(parsed.supports_operation(0x9209));
        assert!(parsed.supports_event(0xc202));
        assert!(!parsed.supports_operation(0x9116));
    }

    #[test]
    fn test_truncated_device_info_rejected() {
        let info = DeviceInfo {
            model: "X".to_string(),
            ..Default::default()
        };
        let buf = info.encode();
        let truncated = ByteBuffer::from_bytes(buf.as_slice()[..buf.len() - 4].to_vec());
        assert!(DeviceInfo::parse(truncated.view(0)).is_none());
    }

    #[test]
    fn test_storage_info_round_trip() {
        let info = StorageInfo {
            storage_id: 0x0001_0001,
            storage_type: 0x0004, // removable RAM
            filesystem_type: 0x0002,
            access_capability: 0,
            max_capacity: 128_849_018_880,
            free_space_bytes: 42_949_672_960,
            free_space_images: 3210,
            description: "SD1".to_string(),
            volume_label: "NO NAME".to_string(),
        };
        let buf = info.encode();
        let parsed = StorageInfo::parse(0x0001_0001, buf.view(0)).unwrap();
        assert_eq!(parsed.max_capacity, 128_849_018_880);
        assert_eq!(parsed.free_space_bytes, 42_949_672_960);
        assert_eq!(parsed.description, "SD1");
        assert_eq!(parsed.volume_label, "NO NAME");
    }

    #[test]
    fn test_object_info_round_trip() {
        let info = ObjectInfo {
            storage_id: 0x0001_0001,
            object_format: 0x3801,
            compressed_size: 4_194_304,
            filename: "DSC01234.JPG".to_string(),
        };
        let buf = info.encode();
        let parsed = ObjectInfo::parse(buf.view(0)).unwrap();
        assert_eq!(parsed.compressed_size, 4_194_304);
        assert_eq!(parsed.filename, "DSC01234.JPG");
        assert_eq!(parsed.object_format, 0x3801);
    }
}
