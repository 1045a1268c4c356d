//! Device discovery: find Infinite Noise TRNGs on the USB bus.

use serialport::{SerialPortType, UsbPortInfo};

use crate::protocol::{FT240X_PRODUCT_ID, FTDI_VENDOR_ID};
use crate::types::DeviceDescriptor;
use crate::InfnoiseError;

/// List every connected FT240X, in port-name order.
///
/// An empty list is not an error; failing to enumerate the bus is.
pub fn list_devices() -> Result<Vec<DeviceDescriptor>, InfnoiseError> {
    let mut ports = serialport::available_ports()
        .map_err(|e| InfnoiseError::Connection(format!("USB enumeration failed: {e}")))?;
    ports.sort_by(|a, b| a.port_name.cmp(&b.port_name));

    let devices: Vec<DeviceDescriptor> = ports
        .into_iter()
        .filter_map(|p| match p.port_type {
            SerialPortType::UsbPort(usb) if is_infnoise(&usb) => Some((p.port_name, usb)),
            _ => None,
        })
        .enumerate()
        .map(|(id, (port, usb))| DeviceDescriptor {
            id: u8::try_from(id).unwrap_or(u8::MAX),
            manufacturer: usb.manufacturer.unwrap_or_default(),
            description: usb.product.unwrap_or_default(),
            serial: usb.serial_number.unwrap_or_default(),
            port,
        })
        .collect();

    log::debug!("found {} Infinite Noise device(s)", devices.len());
    Ok(devices)
}

/// Find one device: the one with serial number `serial`, or the first one
/// when no serial is given.
pub fn find_device(serial: Option<&str>) -> Result<DeviceDescriptor, InfnoiseError> {
    select(list_devices()?, serial)
}

fn is_infnoise(usb: &UsbPortInfo) -> bool {
    usb.vid == FTDI_VENDOR_ID && usb.pid == FT240X_PRODUCT_ID
}

fn select(
    devices: Vec<DeviceDescriptor>,
    serial: Option<&str>,
) -> Result<DeviceDescriptor, InfnoiseError> {
    devices
        .into_iter()
        .find(|d| serial.map_or(true, |s| d.serial == s))
        .ok_or(InfnoiseError::NoDevice)
}
