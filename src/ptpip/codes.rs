//! PTP operation, response, and event code constants.
//!
//! Standard codes live in the 0x1xxx/0x2xxx/0x4xxx ranges; vendor extensions
//! in 0x9xxx/0xCxxx. Only the codes the engine actually issues or inspects
//! are listed.

// Standard operations
pub(crate) const OP_GET_DEVICE_INFO: u16 = 0x1001;
pub(crate) const OP_OPEN_SESSION: u16 = 0x1002;
pub(crate) const OP_CLOSE_SESSION: u16 = 0x1003;
pub(crate) const OP_GET_STORAGE_IDS: u16 = 0x1004;
pub(crate) const OP_GET_STORAGE_INFO: u16 = 0x1005;
pub(crate) const OP_GET_OBJECT_INFO: u16 = 0x1008;
pub(crate) const OP_GET_OBJECT: u16 = 0x1015;
pub(crate) const OP_GET_DEVICE_PROP_DESC: u16 = 0x1014;
pub(crate) const OP_GET_PARTIAL_OBJECT: u16 = 0x101b;

// Sony vendor operations
pub(crate) const OP_SONY_SDIO_CONNECT: u16 = 0x9201;
pub(crate) const OP_SONY_GET_EXT_DEVICE_INFO: u16 = 0x9202;
pub(crate) const OP_SONY_GET_DEVICE_PROP_DESC: u16 = 0x9203;
pub(crate) const OP_SONY_SET_CONTROL_DEVICE_A: u16 = 0x9205;
pub(crate) const OP_SONY_SET_CONTROL_DEVICE_B: u16 = 0x9207;
pub(crate) const OP_SONY_GET_ALL_DEVICE_PROP_DATA: u16 = 0x9209;

// Canon vendor operations
pub(crate) const OP_CANON_GET_PARTIAL_OBJECT_64: u16 = 0x9107;
pub(crate) const OP_CANON_SET_DEVICE_PROP_VALUE_EX: u16 = 0x9110;
pub(crate) const OP_CANON_SET_REMOTE_MODE: u16 = 0x9114;
pub(crate) const OP_CANON_SET_EVENT_MODE: u16 = 0x9115;
pub(crate) const OP_CANON_GET_EVENT: u16 = 0x9116;
pub(crate) const OP_CANON_TRANSFER_COMPLETE: u16 = 0x9117;
pub(crate) const OP_CANON_REMOTE_RELEASE_ON: u16 = 0x9128;
pub(crate) const OP_CANON_REMOTE_RELEASE_OFF: u16 = 0x9129;
pub(crate) const OP_CANON_GET_VIEWFINDER_DATA: u16 = 0x9153;
pub(crate) const OP_CANON_GET_REDUCED_OBJECT: u16 = 0x9179;
pub(crate) const OP_CANON_INNER_DEVELOP_START: u16 = 0x9141;
pub(crate) const OP_CANON_INNER_DEVELOP_END: u16 = 0x9142;

// Response codes
pub(crate) const RC_OK: u16 = 0x2001;
pub(crate) const RC_OPERATION_NOT_SUPPORTED: u16 = 0x2005;
pub(crate) const RC_SESSION_ALREADY_OPEN: u16 = 0x201e;
pub(crate) const RC_DEVICE_BUSY: u16 = 0x2019;

// Event codes
pub(crate) const EV_OBJECT_ADDED: u16 = 0x4002;
pub(crate) const EV_OBJECT_REMOVED: u16 = 0x4003;
pub(crate) const EV_DEVICE_PROP_CHANGED: u16 = 0x4006;
pub(crate) const EV_SONY_PROPERTY_CHANGED: u16 = 0xc201;
pub(crate) const EV_SONY_OBJECT_ADDED: u16 = 0xc202;
pub(crate) const EV_CANON_REQUEST_GET_EVENT: u16 = 0xc101;

/// True when the response code signals success.
pub(crate) fn response_ok(code: u16) -> bool {
    code == RC_OK
}
