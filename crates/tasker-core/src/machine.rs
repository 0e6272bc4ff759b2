//! Stable per-machine identifier used to pin sessions to the machine that issued them

use sha2::{Digest, Sha512};

const MACHINE_ID_FILES: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

pub trait MachineIdProvider: Send + Sync {
    fn machine_id(&self) -> String;
}

/// Hashes the OS machine id together with the host name.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMachineId;

impl MachineIdProvider for SystemMachineId {
    fn machine_id(&self) -> String {
        let os_id = MACHINE_ID_FILES
            .iter()
            .find_map(|path| read_trimmed(path));
        let host = host_name();

        let parts: Vec<String> = match os_id {
            Some(os_id) => vec![os_id, host, std::env::consts::OS.to_string()],
            None => vec![host, user_name(), std::env::consts::OS.to_string()],
        };
        fingerprint(&parts)
    }
}

/// Fixed identifier, for tests and embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticMachineId(pub String);

impl MachineIdProvider for StaticMachineId {
    fn machine_id(&self) -> String {
        self.0.clone()
    }
}

/// Uppercase hex SHA-512 over the non-blank parts joined with `:`.
pub fn fingerprint(parts: &[String]) -> String {
    let joined = parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(":");

    hex::encode_upper(Sha512::digest(joined.as_bytes()))
}

fn read_trimmed(path: &str) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let value = raw.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn host_name() -> String {
    read_trimmed("/etc/hostname")
        .or_else(|| std::env::var("HOSTNAME").ok())
        .or_else(|| std::env::var("COMPUTERNAME").ok())
        .unwrap_or_default()
}

fn user_name() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}
