//! Configuration identity derived from a file name.
//!
//! `<pid>.cfg` names a plain record; `<pid>-<qualifier>.cfg` names the
//! `qualifier` instance of the factory `<pid>`. Only the first `-` splits,
//! and a leading `-` is part of the PID.

use std::path::Path;

use dropin_core::Pid;

pub const CONFIG_EXTENSION: &str = "cfg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigName {
    pub pid: Pid,
    pub qualifier: Option<String>,
}

impl ConfigName {
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".cfg")?;
        if stem.is_empty() {
            return None;
        }
        match stem.find('-') {
            Some(split) if split > 0 => Some(Self {
                pid: Pid::from(&stem[..split]),
                qualifier: Some(stem[split + 1..].to_string()),
            }),
            _ => Some(Self {
                pid: Pid::from(stem),
                qualifier: None,
            }),
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(Self::parse)
    }

    pub fn is_factory(&self) -> bool {
        self.qualifier.is_some()
    }
}
