use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::capture::{DownloadMethod, FocusWait, ObjectWait};
use super::*;
use crate::camera::property::{DataType, GetSet, PropValue, PropertyForm};
use crate::camera::values::Iso;
use crate::ptpip::packet::Packet;
use crate::ptpip::testutil::{MockTransport, Script};
use crate::ptpip::transport::Channel;

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.capture.poll_interval_ms = 10;
    config.capture.focus_push_timeout_ms = 100;
    config.capture.focus_poll_timeout_ms = 100;
    config.capture.object_push_timeout_ms = 200;
    config.capture.object_poll_timeout_ms = 200;
    config.capture.image_dir = Some(std::env::temp_dir().join("shutter-ptpip-tests"));
    config
}

fn sony_identity() -> CameraIdentity {
    CameraIdentity {
        identifier: "uuid:00000000-0005-0010-8000-d44da4ebfb70".to_string(),
        friendly_name: "ILCE-7M3".to_string(),
        manufacturer: "Sony Corporation".to_string(),
        host: "192.168.122.1".to_string(),
        port: 15740,
    }
}

fn canon_identity() -> CameraIdentity {
    CameraIdentity {
        identifier: "uuid:00000000-0000-1010-8000-001122334455".to_string(),
        friendly_name: "EOS R6".to_string(),
        manufacturer: "Canon Inc.".to_string(),
        host: "192.168.122.2".to_string(),
        port: 15740,
    }
}

fn ok(tid: u32) -> (Channel, Packet) {
    (
        Channel::Control,
        Packet::CommandResponse {
            code: RC_OK,
            transaction_id: Some(tid),
        },
    )
}

fn failed(tid: u32, code: u16) -> (Channel, Packet) {
    (
        Channel::Control,
        Packet::CommandResponse {
            code,
            transaction_id: Some(tid),
        },
    )
}

fn data_reply(tid: u32, payload: ByteBuffer) -> Vec<(Channel, Packet)> {
    vec![
        (
            Channel::Control,
            Packet::StartData {
                transaction_id: tid,
                total_length: payload.len() as u64,
            },
        ),
        (
            Channel::Control,
            Packet::EndData {
                transaction_id: tid,
                payload: payload.into_vec(),
            },
        ),
        ok(tid),
    ]
}

fn enum_descriptor(
    code: PropertyCode,
    data_type: DataType,
    current: PropValue,
    available: Vec<PropValue>,
) -> DeviceProperty {
    DeviceProperty {
        code,
        data_type,
        get_set_supported: GetSet::GetSet,
        get_set_available: GetSet::GetSet,
        factory_value: current.clone(),
        current_value: current,
        form: PropertyForm::Enum {
            available: available.clone(),
            supported: available,
        },
    }
}

fn batched(descriptors: &[DeviceProperty]) -> ByteBuffer {
    let mut buf = ByteBuffer::new();
    buf.append_u64(descriptors.len() as u64);
    for descriptor in descriptors {
        descriptor.encode_into(&mut buf);
    }
    buf
}

fn sony_device_info(events: Vec<u16>) -> DeviceInfo {
    DeviceInfo {
        standard_version: 100,
        vendor_extension_id: 0x11,
        operations_supported: vec![
            OP_GET_DEVICE_INFO,
            OP_OPEN_SESSION,
            OP_CLOSE_SESSION,
            OP_GET_OBJECT_INFO,
            OP_GET_PARTIAL_OBJECT,
            OP_SONY_SDIO_CONNECT,
            OP_SONY_GET_ALL_DEVICE_PROP_DATA,
            OP_SONY_SET_CONTROL_DEVICE_A,
            OP_SONY_SET_CONTROL_DEVICE_B,
        ],
        events_supported: events,
        manufacturer: "Sony Corporation".to_string(),
        model: "ILCE-7M3".to_string(),
        ..Default::default()
    }
}

fn canon_device_info(extra_ops: Vec<u16>) -> DeviceInfo {
    let mut operations = vec![
        OP_GET_DEVICE_INFO,
        OP_OPEN_SESSION,
        OP_CLOSE_SESSION,
        OP_CANON_SET_REMOTE_MODE,
        OP_CANON_SET_EVENT_MODE,
        OP_CANON_GET_EVENT,
        OP_CANON_SET_DEVICE_PROP_VALUE_EX,
        OP_CANON_REMOTE_RELEASE_ON,
        OP_CANON_REMOTE_RELEASE_OFF,
        OP_CANON_GET_REDUCED_OBJECT,
    ];
    operations.extend(extra_ops);
    DeviceInfo {
        standard_version: 100,
        vendor_extension_id: 0xb,
        operations_supported: operations,
        events_supported: vec![EV_CANON_REQUEST_GET_EVENT],
        manufacturer: "Canon Inc.".to_string(),
        model: "EOS R6".to_string(),
        ..Default::default()
    }
}

// Canon GetEvent blob builders. Record kinds follow the camera's event queue
// format: {size u32, kind u32, payload}.
fn blob_record(blob: &mut ByteBuffer, kind: u32, payload: &ByteBuffer) {
    blob.append_u32(8 + payload.len() as u32);
    blob.append_u32(kind);
    blob.append_slice(payload.as_slice());
}

fn prop_changed(blob: &mut ByteBuffer, code: u32, value: u32) {
    let mut payload = ByteBuffer::new();
    payload.append_u32(code);
    payload.append_u32(value);
    blob_record(blob, 0xc189, &payload);
}

fn avail_list_changed(blob: &mut ByteBuffer, code: u32, values: &[u32]) {
    let mut payload = ByteBuffer::new();
    payload.append_u32(code);
    payload.append_u32(values.len() as u32);
    for value in values {
        payload.append_u32(*value);
    }
    blob_record(blob, 0xc18a, &payload);
}

fn olc_changed(blob: &mut ByteBuffer, olc: &OlcInfo) {
    blob_record(blob, 0xc1a4, &olc.encode());
}

fn object_added(blob: &mut ByteBuffer, object_id: u32) {
    let mut payload = ByteBuffer::new();
    payload.append_u32(object_id);
    blob_record(blob, 0xc181, &payload);
}

fn developed_object_added(blob: &mut ByteBuffer, object_id: u32) {
    let mut payload = ByteBuffer::new();
    payload.append_u32(object_id);
    blob_record(blob, 0xc1a7, &payload);
}

/// A Sony camera answering the handshake and serving a fixed descriptor set.
fn sony_script(device_info: DeviceInfo, descriptors: Vec<DeviceProperty>) -> Script {
    sony_script_with(device_info, descriptors, |_, _| None)
}

/// Same, with an override hook consulted before the defaults.
fn sony_script_with(
    device_info: DeviceInfo,
    descriptors: Vec<DeviceProperty>,
    mut hook: impl FnMut(&Packet, u32) -> Option<Vec<(Channel, Packet)>> + Send + 'static,
) -> Script {
    MockTransport::handshake_script(move |_, packet| {
        let Packet::CommandRequest { code, transaction_id, .. } = packet else {
            return vec![];
        };
        let tid = *transaction_id;
        if let Some(replies) = hook(packet, tid) {
            return replies;
        }
        match *code as u16 {
            // Session-open quirk: no transaction id on the response.
            OP_OPEN_SESSION => vec![(
                Channel::Control,
                Packet::CommandResponse {
                    code: RC_OK,
                    transaction_id: None,
                },
            )],
            OP_SONY_SDIO_CONNECT => vec![ok(tid)],
            OP_SONY_GET_EXT_DEVICE_INFO => {
                let mut buf = ByteBuffer::new();
                buf.append_u16(0x012c);
                data_reply(tid, buf)
            }
            OP_GET_DEVICE_INFO => data_reply(tid, device_info.encode()),
            OP_SONY_GET_ALL_DEVICE_PROP_DATA => data_reply(tid, batched(&descriptors)),
            OP_SONY_SET_CONTROL_DEVICE_A | OP_SONY_SET_CONTROL_DEVICE_B => vec![ok(tid)],
            OP_CLOSE_SESSION => vec![ok(tid)],
            _ => vec![failed(tid, RC_OPERATION_NOT_SUPPORTED)],
        }
    })
}

#[tokio::test]
async fn test_sony_connect_and_get_value() {
    let descriptors = vec![
        enum_descriptor(
            PropertyCode::Iso,
            DataType::Uint32,
            PropValue::U32(400),
            vec![PropValue::U32(100), PropValue::U32(400), PropValue::U32(800)],
        ),
        enum_descriptor(
            PropertyCode::FNumber,
            DataType::Uint16,
            PropValue::U16(280),
            vec![PropValue::U16(280), PropValue::U16(400)],
        ),
    ];
    let (transport, _handle) = MockTransport::new(sony_script(
        sony_device_info(vec![EV_SONY_OBJECT_ADDED]),
        descriptors,
    ));
    let device =
        CameraDevice::with_transport(sony_identity(), &test_config(), Box::new(transport)).unwrap();

    device.connect().await.unwrap();
    assert_eq!(device.vendor(), Vendor::Sony);
    assert_eq!(device.device_info().unwrap().model, "ILCE-7M3");

    let caps = device.capture_caps().unwrap();
    assert_eq!(caps.focus_wait, FocusWait::Poll);
    assert_eq!(caps.object_wait, ObjectWait::PushEvent);
    assert_eq!(caps.download, DownloadMethod::PartialObject);

    let value = device.get_value(PropertyCode::Iso).await.unwrap();
    assert_eq!(value, TypedValue::Iso(Iso::Native(400)));

    let reply = device
        .perform(CameraCommand::GetValue(PropertyCode::Iso))
        .await
        .unwrap();
    assert!(matches!(
        reply,
        CameraReply::Value(TypedValue::Iso(Iso::Native(400)))
    ));

    let event = device.get_event().await.unwrap();
    assert_eq!(event.iso.unwrap().available.len(), 3);
    assert!(event.aperture.is_some());
}

#[tokio::test]
async fn test_sony_connect_retries_when_session_already_open() {
    let opens = Arc::new(AtomicUsize::new(0));
    let opens_script = opens.clone();
    let (transport, _handle) = MockTransport::new(sony_script_with(
        sony_device_info(vec![]),
        vec![],
        move |packet, tid| {
            let Packet::CommandRequest { code, .. } = packet else {
                return None;
            };
            if *code as u16 != OP_OPEN_SESSION {
                return None;
            }
            if opens_script.fetch_add(1, Ordering::SeqCst) == 0 {
                Some(vec![failed(tid, RC_SESSION_ALREADY_OPEN)])
            } else {
                None
            }
        },
    ));
    let device =
        CameraDevice::with_transport(sony_identity(), &test_config(), Box::new(transport)).unwrap();

    device.connect().await.unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_sony_get_value_not_found() {
    let (transport, _handle) = MockTransport::new(sony_script(sony_device_info(vec![]), vec![]));
    let device =
        CameraDevice::with_transport(sony_identity(), &test_config(), Box::new(transport)).unwrap();
    device.connect().await.unwrap();

    let err = device.get_value(PropertyCode::Iso).await.unwrap_err();
    assert!(matches!(err, PtpError::PropertyNotFound(_)));
}

/// A Canon camera whose event queue is driven by the capture flow.
struct CanonCamera {
    released: bool,
    develop_started: bool,
    primed: bool,
    object_served: bool,
}

fn canon_script(device_info: DeviceInfo) -> Script {
    let mut camera = CanonCamera {
        released: false,
        develop_started: false,
        primed: false,
        object_served: false,
    };
    MockTransport::handshake_script(move |_, packet| {
        let Packet::CommandRequest { code, transaction_id, .. } = packet else {
            return vec![];
        };
        let tid = *transaction_id;
        match *code as u16 {
            OP_OPEN_SESSION => vec![(
                Channel::Control,
                Packet::CommandResponse {
                    code: RC_OK,
                    transaction_id: None,
                },
            )],
            OP_CANON_SET_REMOTE_MODE | OP_CANON_SET_EVENT_MODE => vec![ok(tid)],
            OP_GET_DEVICE_INFO => data_reply(tid, device_info.encode()),
            OP_CANON_GET_EVENT => {
                let mut blob = ByteBuffer::new();
                if !camera.primed {
                    camera.primed = true;
                    prop_changed(&mut blob, 0xd103, 0x58); // ISO 400
                    avail_list_changed(&mut blob, 0xd103, &[0x48, 0x58, 0x68]);
                    olc_changed(
                        &mut blob,
                        &OlcInfo {
                            button: Some(1),
                            ..Default::default()
                        },
                    );
                }
                if camera.develop_started && !camera.object_served {
                    camera.object_served = true;
                    developed_object_added(&mut blob, 0x43);
                } else if camera.released && !camera.object_served {
                    camera.object_served = true;
                    object_added(&mut blob, 0x42);
                }
                data_reply(tid, blob)
            }
            OP_CANON_SET_DEVICE_PROP_VALUE_EX => vec![ok(tid)],
            OP_CANON_REMOTE_RELEASE_ON => vec![ok(tid)],
            OP_CANON_REMOTE_RELEASE_OFF => {
                camera.released = true;
                vec![ok(tid)]
            }
            OP_CANON_GET_REDUCED_OBJECT => {
                data_reply(tid, ByteBuffer::from_bytes(b"REDUCED-JPEG".to_vec()))
            }
            OP_CANON_GET_VIEWFINDER_DATA => {
                data_reply(tid, ByteBuffer::from_bytes(b"EVF-FRAME".to_vec()))
            }
            OP_CANON_INNER_DEVELOP_START => {
                camera.develop_started = true;
                camera.object_served = false;
                vec![ok(tid)]
            }
            OP_CANON_GET_PARTIAL_OBJECT_64 => {
                data_reply(tid, ByteBuffer::from_bytes(b"DEVELOPED-JPEG".to_vec()))
            }
            OP_CANON_TRANSFER_COMPLETE | OP_CANON_INNER_DEVELOP_END => vec![ok(tid)],
            OP_CLOSE_SESSION => vec![ok(tid)],
            _ => vec![failed(tid, RC_OPERATION_NOT_SUPPORTED)],
        }
    })
}

#[tokio::test]
async fn test_canon_connect_get_and_set() {
    let (transport, handle) = MockTransport::new(canon_script(canon_device_info(vec![])));
    let device = CameraDevice::with_transport(canon_identity(), &test_config(), Box::new(transport))
        .unwrap();

    device.connect().await.unwrap();
    assert_eq!(device.vendor(), Vendor::Canon);

    let value = device.get_value(PropertyCode::Iso).await.unwrap();
    assert_eq!(value, TypedValue::Iso(Iso::Native(400)));

    device
        .set_value(TypedValue::Iso(Iso::Native(1600)))
        .await
        .unwrap();

    // The SetDevicePropValueEx payload is [size, code, value].
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    let sent = handle.sent.lock().unwrap();
    let payload = sent
        .iter()
        .rev()
        .find_map(|(_, p)| match p {
            Packet::EndData { payload, .. } => Some(payload.clone()),
            _ => None,
        })
        .unwrap();
    drop(sent);
    let mut expected = ByteBuffer::new();
    expected.append_u32(12);
    expected.append_u32(0xd103);
    expected.append_u32(0x68);
    assert_eq!(payload, expected.into_vec());

    // The local registry reflects the write.
    let value = device.get_value(PropertyCode::Iso).await.unwrap();
    assert_eq!(value, TypedValue::Iso(Iso::Native(1600)));
}

#[tokio::test]
async fn test_canon_capture_reduced_object() {
    let (transport, _handle) = MockTransport::new(canon_script(canon_device_info(vec![])));
    let device = CameraDevice::with_transport(canon_identity(), &test_config(), Box::new(transport))
        .unwrap();
    device.connect().await.unwrap();

    let caps = device.capture_caps().unwrap();
    assert_eq!(caps.download, DownloadMethod::ReducedObject);

    let path = device.capture().await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"REDUCED-JPEG");

    let event = device.get_event().await.unwrap();
    assert_eq!(event.captured_images.len(), 1);
    assert_eq!(event.captured_images[0].0, ShootingMode::Single);

    // The log drains on read.
    let event = device.get_event().await.unwrap();
    assert!(event.captured_images.is_empty());
}

#[tokio::test]
async fn test_canon_capture_inner_develop() {
    let (transport, handle) = MockTransport::new(canon_script(canon_device_info(vec![
        OP_CANON_INNER_DEVELOP_START,
        OP_CANON_INNER_DEVELOP_END,
        OP_CANON_GET_PARTIAL_OBJECT_64,
        OP_CANON_TRANSFER_COMPLETE,
    ])));
    let device = CameraDevice::with_transport(canon_identity(), &test_config(), Box::new(transport))
        .unwrap();
    device.connect().await.unwrap();

    let caps = device.capture_caps().unwrap();
    assert_eq!(caps.download, DownloadMethod::InnerDevelop);

    let path = device.capture().await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"DEVELOPED-JPEG");

    // Develop end must follow the transfer.
    let requests = handle.command_requests();
    let codes: Vec<u16> = requests.iter().map(|(code, _, _)| *code as u16).collect();
    let complete_at = codes
        .iter()
        .position(|c| *c == OP_CANON_TRANSFER_COMPLETE)
        .unwrap();
    let end_at = codes
        .iter()
        .position(|c| *c == OP_CANON_INNER_DEVELOP_END)
        .unwrap();
    assert!(end_at > complete_at);
}

#[tokio::test]
async fn test_canon_live_view_toggles_evf_and_serves_frames() {
    let (transport, handle) = MockTransport::new(canon_script(canon_device_info(vec![])));
    let device = CameraDevice::with_transport(canon_identity(), &test_config(), Box::new(transport))
        .unwrap();
    device.connect().await.unwrap();

    device.start_live_view().await.unwrap();
    let frame = device.live_view_frame().await.unwrap();
    assert_eq!(frame, b"EVF-FRAME");

    let reply = device.perform(CameraCommand::LiveViewFrame).await.unwrap();
    assert!(matches!(reply, CameraReply::Frame(bytes) if bytes == b"EVF-FRAME"));

    device.end_live_view().await.unwrap();

    // EVF output device was switched to the host and back.
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    let sent = handle.sent.lock().unwrap();
    let evf_values: Vec<u32> = sent
        .iter()
        .filter_map(|(_, p)| match p {
            Packet::EndData { payload, .. } => {
                let buf = ByteBuffer::from_bytes(payload.clone());
                let view = buf.view(0);
                if view.read_u32(4) == Some(0xd1b0) {
                    view.read_u32(8)
                } else {
                    None
                }
            }
            _ => None,
        })
        .collect();
    assert_eq!(evf_values, vec![2, 0]);
}

#[tokio::test]
async fn test_sony_storage_info_enumerates_all_storages() {
    let script = sony_script_with(sony_device_info(vec![]), vec![], move |packet, tid| {
        let Packet::CommandRequest { code, args, .. } = packet else {
            return None;
        };
        match *code as u16 {
            OP_GET_STORAGE_IDS => {
                let mut buf = ByteBuffer::new();
                buf.append_u32(1);
                buf.append_u32(0x0001_0001);
                Some(data_reply(tid, buf))
            }
            OP_GET_STORAGE_INFO if args.first() == Some(&0x0001_0001) => {
                let info = StorageInfo {
                    storage_type: 0x0004,
                    filesystem_type: 0x0002,
                    max_capacity: 128_849_018_880,
                    free_space_bytes: 42_949_672_960,
                    free_space_images: 3210,
                    volume_label: "NO NAME".to_string(),
                    ..Default::default()
                };
                Some(data_reply(tid, info.encode()))
            }
            _ => None,
        }
    });
    let (transport, _handle) = MockTransport::new(script);
    let device =
        CameraDevice::with_transport(sony_identity(), &test_config(), Box::new(transport)).unwrap();
    device.connect().await.unwrap();

    let reply = device.perform(CameraCommand::StorageInfo).await.unwrap();
    let CameraReply::Storages(storages) = reply else {
        panic!("expected a storage listing");
    };
    assert_eq!(storages.len(), 1);
    assert_eq!(storages[0].storage_id, 0x0001_0001);
    assert_eq!(storages[0].free_space_bytes, 42_949_672_960);
    assert_eq!(storages[0].volume_label, "NO NAME");
}

#[tokio::test]
async fn test_sony_capture_downloads_partial_object() {
    let presses = Arc::new(AtomicUsize::new(0));
    let presses_script = presses.clone();
    let descriptors = vec![enum_descriptor(
        PropertyCode::FocusStatus,
        DataType::Uint16,
        PropValue::U16(0x0003),
        vec![],
    )];
    let script = sony_script_with(
        sony_device_info(vec![EV_SONY_OBJECT_ADDED]),
        descriptors,
        move |packet, tid| {
            let Packet::CommandRequest { code, args, .. } = packet else {
                return None;
            };
            match *code as u16 {
                OP_SONY_SET_CONTROL_DEVICE_B if args.first() == Some(&0xd2c2) => {
                    // Announce the new object when the shutter is released.
                    let mut replies = vec![ok(tid)];
                    if presses_script.fetch_add(1, Ordering::SeqCst) == 1 {
                        replies.push((
                            Channel::Event,
                            Packet::Event {
                                code: EV_SONY_OBJECT_ADDED,
                                transaction_id: 0,
                                params: vec![0xffff_c001],
                            },
                        ));
                    }
                    Some(replies)
                }
                OP_GET_OBJECT_INFO => {
                    let info = ObjectInfo {
                        storage_id: 0x0001_0001,
                        object_format: 0x3801,
                        compressed_size: 10,
                        filename: "DSC00042.JPG".to_string(),
                    };
                    Some(data_reply(tid, info.encode()))
                }
                OP_GET_PARTIAL_OBJECT => {
                    Some(data_reply(tid, ByteBuffer::from_bytes(b"0123456789".to_vec())))
                }
                _ => None,
            }
        },
    );
    let (transport, _handle) = MockTransport::new(script);
    let device =
        CameraDevice::with_transport(sony_identity(), &test_config(), Box::new(transport)).unwrap();
    device.connect().await.unwrap();

    let path = device.capture().await.unwrap();
    assert!(path.to_string_lossy().ends_with("DSC00042.JPG"));
    assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");
}

#[tokio::test]
async fn test_sony_capture_proceeds_when_focus_never_settles() {
    let presses = Arc::new(AtomicUsize::new(0));
    let presses_script = presses.clone();
    // The AF drive reports "still hunting" for the whole focus window.
    let descriptors = vec![enum_descriptor(
        PropertyCode::FocusStatus,
        DataType::Uint16,
        PropValue::U16(0x0002),
        vec![],
    )];
    let script = sony_script_with(
        sony_device_info(vec![EV_SONY_OBJECT_ADDED]),
        descriptors,
        move |packet, tid| {
            let Packet::CommandRequest { code, args, .. } = packet else {
                return None;
            };
            match *code as u16 {
                OP_SONY_SET_CONTROL_DEVICE_B if args.first() == Some(&0xd2c2) => {
                    let mut replies = vec![ok(tid)];
                    if presses_script.fetch_add(1, Ordering::SeqCst) == 1 {
                        replies.push((
                            Channel::Event,
                            Packet::Event {
                                code: EV_SONY_OBJECT_ADDED,
                                transaction_id: 0,
                                params: vec![0xffff_c001],
                            },
                        ));
                    }
                    Some(replies)
                }
                OP_GET_OBJECT_INFO => {
                    let info = ObjectInfo {
                        storage_id: 0x0001_0001,
                        object_format: 0x3801,
                        compressed_size: 4,
                        filename: "DSC00043.JPG".to_string(),
                    };
                    Some(data_reply(tid, info.encode()))
                }
                OP_GET_PARTIAL_OBJECT => {
                    Some(data_reply(tid, ByteBuffer::from_bytes(b"JPEG".to_vec())))
                }
                _ => None,
            }
        },
    );
    let (transport, _handle) = MockTransport::new(script);
    let device =
        CameraDevice::with_transport(sony_identity(), &test_config(), Box::new(transport)).unwrap();
    device.connect().await.unwrap();

    // The focus wait expires and the capture continues regardless.
    let path = device.capture().await.unwrap();
    assert!(path.to_string_lossy().ends_with("DSC00043.JPG"));
    assert_eq!(std::fs::read(&path).unwrap(), b"JPEG");
}

#[tokio::test]
async fn test_sony_capture_times_out_without_object() {
    let descriptors = vec![
        enum_descriptor(
            PropertyCode::FocusStatus,
            DataType::Uint16,
            PropValue::U16(0x0003),
            vec![],
        ),
        enum_descriptor(
            PropertyCode::ObjectInMemory,
            DataType::Uint16,
            PropValue::U16(0),
            vec![],
        ),
    ];
    // No object-added events advertised: the engine polls the memory flag.
    let (transport, _handle) =
        MockTransport::new(sony_script(sony_device_info(vec![]), descriptors));
    let device =
        CameraDevice::with_transport(sony_identity(), &test_config(), Box::new(transport)).unwrap();
    device.connect().await.unwrap();

    let caps = device.capture_caps().unwrap();
    assert_eq!(caps.object_wait, ObjectWait::PollMemoryFlag);

    let err = device.capture().await.unwrap_err();
    assert!(matches!(err, PtpError::ObjectNotFound));
}

#[test]
fn test_fetch_path_selection() {
    let mut info = DeviceInfo::default();
    assert!(choose_fetch_path(&info).is_none());

    info.operations_supported = vec![OP_GET_DEVICE_PROP_DESC];
    assert_eq!(choose_fetch_path(&info), Some(FetchPath::StandardSingle));

    info.operations_supported.push(OP_SONY_GET_DEVICE_PROP_DESC);
    assert_eq!(choose_fetch_path(&info), Some(FetchPath::VendorSingle));

    info.operations_supported.push(OP_SONY_GET_ALL_DEVICE_PROP_DATA);
    assert_eq!(choose_fetch_path(&info), Some(FetchPath::AllAtOnce));

    info.operations_supported.push(OP_CANON_GET_EVENT);
    assert_eq!(choose_fetch_path(&info), Some(FetchPath::CanonEvent));
}

#[test]
fn test_refine_maps_vendor_error_codes() {
    assert!(matches!(
        refine_code(RC_OPERATION_NOT_SUPPORTED),
        PtpError::OperationNotSupported
    ));
    assert!(matches!(
        refine_code(RC_SESSION_ALREADY_OPEN),
        PtpError::AnotherSessionOpen
    ));
    assert!(matches!(
        refine_code(RC_DEVICE_BUSY),
        PtpError::CommandRequestFailed(RC_DEVICE_BUSY)
    ));
}
