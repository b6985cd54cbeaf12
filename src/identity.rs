use serde::Serialize;
use tracing::debug;

use crate::client::CgiCommand;

pub const MACHINE_NAME_COMMAND: &str = "magicBox.cgi?action=getMachineName";
pub const SERIAL_NUMBER_COMMAND: &str = "magicBox.cgi?action=getSerialNo";

/// Human-readable device name and serial, when the device reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub name: Option<String>,
    pub serial: Option<String>,
}

impl DeviceIdentity {
    /// Best-effort lookup. Any failure leaves both fields empty.
    pub fn resolve(device: &impl CgiCommand) -> Self {
        match Self::lookup(device) {
            Some((name, serial)) => Self {
                name: Some(name),
                serial: Some(serial),
            },
            None => {
                debug!("device identity unavailable");
                Self::default()
            }
        }
    }

    fn lookup(device: &impl CgiCommand) -> Option<(String, String)> {
        let name = read_value(device, MACHINE_NAME_COMMAND)?;
        let serial = read_value(device, SERIAL_NUMBER_COMMAND)?;
        Some((name, serial))
    }
}

fn read_value(device: &impl CgiCommand, command: &str) -> Option<String> {
    let response = device
        .command(command, None, None)
        .map_err(|e| debug!(command, error = %e, "identity query failed"))
        .ok()?;
    let body = response.into_string().ok()?;
    value_of(&body)
}

/// Value half of a `key=value` response body.
fn value_of(body: &str) -> Option<String> {
    let (_, value) = body.split_once('=')?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
