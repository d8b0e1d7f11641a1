//! Module manifest reading.
//!
//! A module is either a `.jar` (zip) archive or an exploded directory, both
//! carrying `META-INF/MANIFEST.MF`. Exploded directories are installed
//! through the host directly; watched directories only deliver archives. The manifest uses the `Name: value`
//! format with continuation lines starting with a single space. The only
//! mandatory attribute is [`MODULE_IDENTITY`].

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::ManifestError;

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
pub const MODULE_ARCHIVE_EXTENSION: &str = "jar";

/// Mandatory identity attribute.
pub const MODULE_IDENTITY: &str = "Module-Identity";
pub const MODULE_VERSION: &str = "Module-Version";
/// Present on attachment modules; names the module they merge into.
pub const ATTACHMENT_HOST: &str = "Attachment-Host";
/// Comma-separated identities that must be active before the module starts.
pub const REQUIRE_MODULES: &str = "Require-Modules";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleManifest {
    pub identity: String,
    pub version: Option<String>,
    pub attachment_host: Option<String>,
    pub requires: Vec<String>,
    pub attributes: BTreeMap<String, String>,
}

impl ModuleManifest {
    pub fn is_attachment(&self) -> bool {
        self.attachment_host.is_some()
    }

    /// Build a manifest from raw `MANIFEST.MF` text.
    pub fn parse(path: &Path, text: &str) -> Result<Self, ManifestError> {
        let attributes = parse_attributes(text);
        let identity = attributes
            .get(MODULE_IDENTITY)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ManifestError::MissingIdentity {
                path: path.to_path_buf(),
                attribute: MODULE_IDENTITY,
            })?;
        let requires = attributes
            .get(REQUIRE_MODULES)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            identity,
            version: attributes.get(MODULE_VERSION).cloned(),
            attachment_host: attributes.get(ATTACHMENT_HOST).cloned(),
            requires,
            attributes,
        })
    }
}

/// Read the manifest of a module archive or exploded module directory.
pub fn read_manifest(path: &Path) -> Result<ModuleManifest, ManifestError> {
    let text = if path.is_dir() {
        let manifest = path.join(MANIFEST_PATH);
        if !manifest.is_file() {
            return Err(ManifestError::MissingManifest {
                path: path.to_path_buf(),
            });
        }
        std::fs::read_to_string(&manifest).map_err(|e| io_err(&manifest, e))?
    } else {
        read_archive_manifest(path)?
    };
    ModuleManifest::parse(path, &text)
}

/// `true` when `path` exists and carries a manifest with a module identity.
///
/// Unreadable or foreign archives are logged at debug level and reported as
/// "not a module".
pub fn is_module(path: &Path) -> bool {
    match read_manifest(path) {
        Ok(_) => true,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "not a module");
            false
        }
    }
}

/// `true` when the file name ends in `.jar`. The match is case-sensitive.
pub fn has_archive_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == MODULE_ARCHIVE_EXTENSION)
        .unwrap_or(false)
}

fn read_archive_manifest(path: &Path) -> Result<String, ManifestError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| ManifestError::Archive {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut entry = match archive.by_name(MANIFEST_PATH) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(ManifestError::MissingManifest {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(ManifestError::Archive {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| io_err(path, e))?;
    Ok(text)
}

/// Main-section attributes; parsing stops at the first blank line.
fn parse_attributes(text: &str) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    let mut current: Option<(String, String)> = None;

    for line in text.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            break;
        }
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some((_, value)) = current.as_mut() {
                value.push_str(continuation);
            }
            continue;
        }
        if let Some((name, value)) = current.take() {
            attributes.insert(name, value);
        }
        if let Some((name, value)) = line.split_once(':') {
            current = Some((name.trim().to_string(), value.trim_start().to_string()));
        }
    }
    if let Some((name, value)) = current {
        attributes.insert(name, value);
    }
    attributes
}

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ManifestError {
    ManifestError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_jar(dir: &TempDir, name: &str, manifest: Option<&str>) -> PathBuf {
        let path = dir.path().join(name);
        let file = File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        if let Some(manifest) = manifest {
            zip.start_file(MANIFEST_PATH, options).unwrap();
            zip.write_all(manifest.as_bytes()).unwrap();
        }
        zip.start_file("payload.txt", options).unwrap();
        zip.write_all(b"payload").unwrap();
        zip.finish().unwrap();
        path
    }

    #[test]
    fn reads_identity_and_headers_from_archive() {
        let dir = TempDir::new().unwrap();
        let jar = write_jar(
            &dir,
            "a.jar",
            Some("Manifest-Version: 1.0\r\nModule-Identity: m1\r\nModule-Version: 2.1\r\nRequire-Modules: base, util\r\n"),
        );

        let manifest = read_manifest(&jar).unwrap();
        assert_eq!(manifest.identity, "m1");
        assert_eq!(manifest.version.as_deref(), Some("2.1"));
        assert_eq!(manifest.requires, vec!["base", "util"]);
        assert!(!manifest.is_attachment());
    }

    #[test]
    fn continuation_lines_are_joined() {
        let manifest = ModuleManifest::parse(
            Path::new("x.jar"),
            "Module-Identity: org.example.very.long\n .identity\nAttachment-Host: host\n",
        )
        .unwrap();
        assert_eq!(manifest.identity, "org.example.very.long.identity");
        assert!(manifest.is_attachment());
    }

    #[test]
    fn archive_without_identity_is_not_a_module() {
        let dir = TempDir::new().unwrap();
        let jar = write_jar(&dir, "plain.jar", Some("Manifest-Version: 1.0\n"));
        assert!(!is_module(&jar));
        assert!(matches!(
            read_manifest(&jar),
            Err(ManifestError::MissingIdentity { .. })
        ));
    }

    #[test]
    fn archive_without_manifest_is_not_a_module() {
        let dir = TempDir::new().unwrap();
        let jar = write_jar(&dir, "bare.jar", None);
        assert!(matches!(
            read_manifest(&jar),
            Err(ManifestError::MissingManifest { .. })
        ));
    }

    #[test]
    fn garbage_file_is_not_a_module() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jar");
        std::fs::write(&path, b"not a zip").unwrap();
        assert!(!is_module(&path));
    }

    #[test]
    fn exploded_directory_is_a_module() {
        let dir = TempDir::new().unwrap();
        let module = dir.path().join("exploded");
        std::fs::create_dir_all(module.join("META-INF")).unwrap();
        std::fs::write(module.join(MANIFEST_PATH), "Module-Identity: exploded\n").unwrap();
        assert_eq!(read_manifest(&module).unwrap().identity, "exploded");
    }

    #[test]
    fn archive_extension_is_case_sensitive() {
        assert!(has_archive_extension(Path::new("/a/B.jar")));
        assert!(!has_archive_extension(Path::new("/a/b.JAR")));
        assert!(!has_archive_extension(Path::new("/a/b.Jar")));
        assert!(!has_archive_extension(Path::new("/a/b.cfg")));
        assert!(!has_archive_extension(Path::new("/a/jar")));
    }
}
