//! Serial port discovery

use tokio_serial::{SerialPortInfo, SerialPortType};

use crate::protocol::BootError;

/// Description substring of the USB-serial bridge on the target board
pub const DEFAULT_PORT_FILTER: &str = "USB Serial Port";

/// An enumerated port and its human-readable description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    pub name: String,
    pub description: String,
}

impl From<&SerialPortInfo> for PortCandidate {
    fn from(info: &SerialPortInfo) -> Self {
        let description = match &info.port_type {
            SerialPortType::UsbPort(usb) => usb
                .product
                .clone()
                .or_else(|| usb.manufacturer.clone())
                .map(|desc| format!("{} ({})", desc, info.port_name)),
            _ => None,
        };
        Self {
            name: info.port_name.clone(),
            description: description.unwrap_or_else(|| info.port_name.clone()),
        }
    }
}

/// Pick the only candidate whose description contains `filter`
pub fn select_port(candidates: &[PortCandidate], filter: &str) -> Result<String, BootError> {
    let mut matches: Vec<_> = candidates
        .iter()
        .filter(|port| port.description.contains(filter))
        .collect();

    match matches.len() {
        0 => Err(BootError::DeviceNotFound(filter.to_string())),
        1 => {
            let port = matches.remove(0);
            log::info!("Found {} at {}", port.description, port.name);
            Ok(port.name.clone())
        }
        _ => Err(BootError::DeviceAmbiguous(
            matches.iter().map(|port| port.description.clone()).collect(),
        )),
    }
}

/// Enumerate serial ports and return the one matching `filter`
pub fn find_serial_port(filter: &str) -> Result<String, BootError> {
    let candidates: Vec<PortCandidate> = tokio_serial::available_ports()?
        .iter()
        .map(PortCandidate::from)
        .collect();
    log::debug!("Enumerated {} serial ports", candidates.len());

    select_port(&candidates, filter)
}
