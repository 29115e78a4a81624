//! Instrument resource addresses.
//!
//! Supports resource strings like:
//! - "GPIB0::1::INSTR" (GPIB interface)
//! - "USB0::0x1AB1::0x0646::DG9R264500967::INSTR" (USB-TMC)
//! - "TCPIP0::192.168.0.30::hislip0::INSTR" (HiSLIP)
//! - "TCPIP0::192.168.0.30::inst0::INSTR" (VXI-11)
//! - "TCPIP0::192.168.0.30::5025::SOCKET" (raw socket)
//! - "192.168.0.30" (bare host, expanded to candidates)

use std::fmt;

use crate::error::{DriverError, DriverResult};

/// LAN device names tried, in order, for a bare host.
const LAN_DEVICE_NAMES: [&str; 2] = ["hislip0", "inst0"];

/// Where an instrument lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceAddress {
    /// Full VISA resource string
    Visa(String),
    /// Bare host name or IP address
    Host(String),
}

impl ResourceAddress {
    /// Classify an address string.
    ///
    /// # Errors
    /// `InvalidParameter` for an empty address.
    pub fn parse(address: &str) -> DriverResult<Self> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(DriverError::InvalidParameter(
                "resource address cannot be empty".to_string(),
            ));
        }
        if trimmed.contains("::") {
            Ok(Self::Visa(trimmed.to_string()))
        } else {
            Ok(Self::Host(trimmed.to_string()))
        }
    }

    /// VISA resource strings to try, in order.
    pub fn visa_candidates(&self) -> Vec<String> {
        match self {
            Self::Visa(resource) => vec![resource.clone()],
            Self::Host(host) => LAN_DEVICE_NAMES
                .iter()
                .map(|device| format!("TCPIP0::{}::{}::INSTR", host, device))
                .collect(),
        }
    }

    /// `host:port` for the raw socket transport.
    ///
    /// `TCPIP` resources keep their host; a `::SOCKET` resource also keeps
    /// its port. Other interfaces (USB, GPIB, serial) need VISA.
    ///
    /// # Errors
    /// `Connection` for resources that cannot be reached over TCP.
    pub fn socket_target(&self, default_port: u16) -> DriverResult<String> {
        match self {
            Self::Host(host) => Ok(format!("{}:{}", host, default_port)),
            Self::Visa(resource) => {
                let parts: Vec<&str> = resource.split("::").collect();
                let interface = parts[0].to_ascii_uppercase();
                if !interface.starts_with("TCPIP") || parts.len() < 3 {
                    return Err(DriverError::connection(
                        resource,
                        "only TCPIP resources can be opened without VISA",
                    ));
                }
                let host = parts[1];
                let is_socket = parts
                    .last()
                    .is_some_and(|suffix| suffix.eq_ignore_ascii_case("SOCKET"));
                if is_socket && parts.len() >= 4 {
                    let port = parts[2].parse::<u16>().map_err(|_| {
                        DriverError::connection(resource, format!("invalid port '{}'", parts[2]))
                    })?;
                    Ok(format!("{}:{}", host, port))
                } else {
                    Ok(format!("{}:{}", host, default_port))
                }
            }
        }
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Visa(resource) => f.write_str(resource),
            Self::Host(host) => f.write_str(host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpib_resource_string() {
        let address = ResourceAddress::parse("GPIB0::5::INSTR").unwrap();
        assert_eq!(address, ResourceAddress::Visa("GPIB0::5::INSTR".to_string()));
        assert_eq!(address.visa_candidates(), vec!["GPIB0::5::INSTR"]);
    }

    #[test]
    fn test_bare_ip_expands_hislip_then_inst0() {
        let address = ResourceAddress::parse(" 169.254.35.96 ").unwrap();
        assert_eq!(
            address.visa_candidates(),
            vec![
                "TCPIP0::169.254.35.96::hislip0::INSTR",
                "TCPIP0::169.254.35.96::inst0::INSTR",
            ]
        );
    }

    #[test]
    fn test_empty_address_rejected() {
        assert!(ResourceAddress::parse("   ").is_err());
    }

    #[test]
    fn test_socket_targets() {
        let host = ResourceAddress::parse("192.168.0.40").unwrap();
        assert_eq!(host.socket_target(5025).unwrap(), "192.168.0.40:5025");

        let instr = ResourceAddress::parse("TCPIP0::192.168.0.30::hislip0::INSTR").unwrap();
        assert_eq!(instr.socket_target(5025).unwrap(), "192.168.0.30:5025");

        let socket = ResourceAddress::parse("TCPIP0::192.168.0.30::5026::SOCKET").unwrap();
        assert_eq!(socket.socket_target(5025).unwrap(), "192.168.0.30:5026");
    }

    #[test]
    fn test_usb_requires_visa() {
        let usb = ResourceAddress::parse("USB0::0x1AB1::0x0646::DG9R264500967::INSTR").unwrap();
        assert!(matches!(
            usb.socket_target(5025),
            Err(DriverError::Connection { .. })
        ));
    }
}
