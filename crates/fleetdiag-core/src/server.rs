// ── Controller address ──
//
// As provisioned in the device's server file.

use std::fmt;
use std::path::Path;

use crate::error::CoreError;

/// `host[:port]` of the controller plus the bare host name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerAddress {
    name_and_port: String,
    name: String,
}

impl ControllerAddress {
    /// Parse the contents of the server file.
    pub fn parse(contents: &str) -> Option<Self> {
        let name_and_port = contents.trim();
        if name_and_port.is_empty() {
            return None;
        }
        let name = name_and_port
            .split(':')
            .next()
            .unwrap_or(name_and_port)
            .to_owned();
        Some(Self {
            name_and_port: name_and_port.to_owned(),
            name,
        })
    }

    pub fn read(path: &Path) -> Result<Self, CoreError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CoreError::ControllerFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).ok_or_else(|| CoreError::EmptyControllerFile {
            path: path.to_path_buf(),
        })
    }

    /// `host[:port]`, used in URLs.
    pub fn name_and_port(&self) -> &str {
        &self.name_and_port
    }

    /// Host without port, used for DNS.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ControllerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name_and_port)
    }
}
