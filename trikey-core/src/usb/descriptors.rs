//! Constant descriptor tables for the single HID keyboard interface.

/// Control endpoint size, single bank.
pub const EP0_SIZE: u8 = 32;
/// Interrupt IN endpoint carrying keyboard reports.
pub const KEYBOARD_ENDPOINT: u8 = 3;
pub const KEYBOARD_SIZE: u8 = 8;
pub const KEYBOARD_INTERFACE: u16 = 0;
pub const CONFIGURATION_VALUE: u8 = 1;

pub const VENDOR_ID: u16 = 0x16C0;
pub const PRODUCT_ID: u16 = 0x27DB;

const LANGUAGE_EN_US: u16 = 0x0409;

pub const DEVICE: u8 = 1;
pub const CONFIGURATION: u8 = 2;
pub const STRING: u8 = 3;
pub const HID: u8 = 0x21;
pub const HID_REPORT: u8 = 0x22;

/// Boot-protocol keyboard: modifier byte, reserved byte, five LED bits plus
/// padding as output, six keycode bytes.
const HID_REPORT_LENGTH: usize = 63;

static HID_REPORT_DESCRIPTOR: [u8; HID_REPORT_LENGTH] = [
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x06, // Usage (Keyboard)
    0xA1, 0x01, // Collection (Application)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x08, //   Report Count (8)
    0x05, 0x07, //   Usage Page (Key Codes)
    0x19, 0xE0, //   Usage Minimum (224)
    0x29, 0xE7, //   Usage Maximum (231)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x81, 0x02, //   Input (Data, Variable, Absolute) modifier byte
    0x95, 0x01, //   Report Count (1)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x03, //   Input (Constant) reserved byte
    0x95, 0x05, //   Report Count (5)
    0x75, 0x01, //   Report Size (1)
    0x05, 0x08, //   Usage Page (LEDs)
    0x19, 0x01, //   Usage Minimum (1)
    0x29, 0x05, //   Usage Maximum (5)
    0x91, 0x02, //   Output (Data, Variable, Absolute) LED report
    0x95, 0x01, //   Report Count (1)
    0x75, 0x03, //   Report Size (3)
    0x91, 0x03, //   Output (Constant) LED report padding
    0x95, 0x06, //   Report Count (6)
    0x75, 0x08, //   Report Size (8)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x68, //   Logical Maximum (104)
    0x05, 0x07, //   Usage Page (Key Codes)
    0x19, 0x00, //   Usage Minimum (0)
    0x29, 0x68, //   Usage Maximum (104)
    0x81, 0x00, //   Input (Data, Array)
    0xC0, // End Collection
];

static DEVICE_DESCRIPTOR: [u8; 18] = [
    18,   // bLength
    DEVICE, // bDescriptorType
    0x00, 0x02, // bcdUSB (2.0)
    0,    // bDeviceClass
    0,    // bDeviceSubClass
    0,    // bDeviceProtocol
    EP0_SIZE, // bMaxPacketSize0
    VENDOR_ID as u8, (VENDOR_ID >> 8) as u8, // idVendor
    PRODUCT_ID as u8, (PRODUCT_ID >> 8) as u8, // idProduct
    0x00, 0x01, // bcdDevice
    1,    // iManufacturer
    2,    // iProduct
    0,    // iSerialNumber
    1,    // bNumConfigurations
];

const CONFIG_LENGTH: usize = 9 + 9 + 9 + 7;
/// Offset of the HID class descriptor inside the configuration descriptor.
const HID_DESCRIPTOR_OFFSET: usize = 9 + 9;

static CONFIG_DESCRIPTOR: [u8; CONFIG_LENGTH] = [
    // Configuration
    9,    // bLength
    CONFIGURATION, // bDescriptorType
    CONFIG_LENGTH as u8, 0, // wTotalLength
    1,    // bNumInterfaces
    CONFIGURATION_VALUE, // bConfigurationValue
    0,    // iConfiguration
    0x80, // bmAttributes (bus powered, no remote wakeup)
    50,   // bMaxPower (100mA)
    // Interface
    9,    // bLength
    4,    // bDescriptorType
    KEYBOARD_INTERFACE as u8, // bInterfaceNumber
    0,    // bAlternateSetting
    1,    // bNumEndpoints
    0x03, // bInterfaceClass (HID)
    0x01, // bInterfaceSubClass (Boot)
    0x01, // bInterfaceProtocol (Keyboard)
    0,    // iInterface
    // HID
    9,    // bLength
    HID,  // bDescriptorType
    0x11, 0x01, // bcdHID (1.11)
    0,    // bCountryCode
    1,    // bNumDescriptors
    HID_REPORT, // bDescriptorType
    HID_REPORT_LENGTH as u8, 0, // wDescriptorLength
    // Endpoint
    7,    // bLength
    5,    // bDescriptorType
    KEYBOARD_ENDPOINT | 0x80, // bEndpointAddress (IN)
    0x03, // bmAttributes (Interrupt)
    KEYBOARD_SIZE, 0, // wMaxPacketSize
    1,    // bInterval
];

static STRING_LANGUAGES: [u8; 4] = [4, STRING, LANGUAGE_EN_US as u8, (LANGUAGE_EN_US >> 8) as u8];

static STRING_MANUFACTURER: [u8; 14] = [
    14, STRING, //
    b'T', 0, b'r', 0, b'i', 0, b'k', 0, b'e', 0, b'y', 0,
];

static STRING_PRODUCT: [u8; 18] = [
    18, STRING, //
    b'S', 0, b'h', 0, b'o', 0, b'r', 0, b't', 0, b'c', 0, b'u', 0, b't', 0,
];

const fn key(kind: u8, index: u8) -> u16 {
    (kind as u16) << 8 | index as u16
}

/// One lookup entry: `wValue` (type << 8 | index), `wIndex`, bytes.
struct Entry {
    value: u16,
    index: u16,
    bytes: &'static [u8],
}

static TABLE: [Entry; 6] = [
    Entry {
        value: key(DEVICE, 0),
        index: 0,
        bytes: &DEVICE_DESCRIPTOR,
    },
    Entry {
        value: key(CONFIGURATION, 0),
        index: 0,
        bytes: &CONFIG_DESCRIPTOR,
    },
    Entry {
        value: key(HID_REPORT, 0),
        index: KEYBOARD_INTERFACE,
        bytes: &HID_REPORT_DESCRIPTOR,
    },
    Entry {
        value: key(STRING, 0),
        index: 0,
        bytes: &STRING_LANGUAGES,
    },
    Entry {
        value: key(STRING, 1),
        index: LANGUAGE_EN_US,
        bytes: &STRING_MANUFACTURER,
    },
    Entry {
        value: key(STRING, 2),
        index: LANGUAGE_EN_US,
        bytes: &STRING_PRODUCT,
    },
];

/// Find the descriptor a GET_DESCRIPTOR request asks for.
pub fn lookup(value: u16, index: u16) -> Option<&'static [u8]> {
    if value == key(HID, 0) && index == KEYBOARD_INTERFACE {
        return Some(&CONFIG_DESCRIPTOR[HID_DESCRIPTOR_OFFSET..HID_DESCRIPTOR_OFFSET + 9]);
    }
    TABLE
        .iter()
        .find(|entry| entry.value == value && entry.index == index)
        .map(|entry| entry.bytes)
}
