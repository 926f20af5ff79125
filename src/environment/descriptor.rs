//! Environment descriptor file
//!
//! `KEY=VALUE` per line, `#` comments and blank lines ignored. The same
//! format the container engine accepts for `--env-file`. The file holds
//! secrets, so it is only ever created with owner read/write permissions.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{PodError, Result};

/// Descriptor file name inside the working directory
pub const DESCRIPTOR_FILE_NAME: &str = ".agentpod.env";

const DESCRIPTOR_MODE: u32 = 0o600;

pub fn descriptor_path(workdir: &Path) -> PathBuf {
    workdir.join(DESCRIPTOR_FILE_NAME)
}

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)=(.*)$").expect("descriptor pattern is valid")
    })
}

/// Parse descriptor content
pub fn parse_descriptor(content: &str) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    for (i, raw) in content.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let caps = line_pattern().captures(line).ok_or_else(|| PodError::MalformedDescriptor {
            line: i + 1,
            reason: "expected KEY=VALUE".to_string(),
        })?;
        values.insert(caps[1].to_string(), caps[2].to_string());
    }
    Ok(values)
}

/// Load a descriptor; a missing file yields `None`
pub fn load_descriptor(path: &Path) -> Result<Option<BTreeMap<String, String>>> {
    match fs::read_to_string(path) {
        Ok(content) => parse_descriptor(&content).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PodError::IoError(e)),
    }
}

/// Write the descriptor with owner-only permissions, replacing any previous one
pub fn write_descriptor(path: &Path, values: &BTreeMap<String, String>) -> Result<()> {
    let mut content = String::from("# Generated by agentpod. Contains secrets; do not commit.\n");
    for (key, value) in values {
        if value.contains('\n') || value.contains('\r') {
            return Err(PodError::InvalidConfig(format!("value of {} contains a line break", key)));
        }
        content.push_str(&format!("{}={}\n", key, value));
    }

    let tmp = path.with_extension("tmp");
    let _ = fs::remove_file(&tmp);
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(DESCRIPTOR_MODE)
            .open(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }
    // umask may have narrowed the mode further, never widened it; pin it anyway
    fs::set_permissions(&tmp, fs::Permissions::from_mode(DESCRIPTOR_MODE))?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_descriptor() {
        let values = parse_descriptor("# comment\n\nA_KEY=abc\nEMPTY=\nURL=http://x?a=b\n").unwrap();
        assert_eq!(values.get("A_KEY").map(String::as_str), Some("abc"));
        assert_eq!(values.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(values.get("URL").map(String::as_str), Some("http://x?a=b"));
    }

    #[test]
    fn test_parse_descriptor_malformed() {
        let err = parse_descriptor("GOOD=1\nthis is not valid\n").unwrap_err();
        match err {
            PodError::MalformedDescriptor { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_write_is_owner_only() {
        let dir = TempDir::new().unwrap();
        let path = descriptor_path(dir.path());
        let mut values = BTreeMap::new();
        values.insert("ANTHROPIC_API_KEY".to_string(), "sk-test-value".to_string());
        write_descriptor(&path, &values).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let loaded = load_descriptor(&path).unwrap().unwrap();
        assert_eq!(loaded, values);
    }

    #[test]
    fn test_rewrite_replaces_previous() {
        let dir = TempDir::new().unwrap();
        let path = descriptor_path(dir.path());
        let mut values = BTreeMap::new();
        values.insert("A".to_string(), "1".to_string());
        write_descriptor(&path, &values).unwrap();
        values.insert("A".to_string(), "2".to_string());
        write_descriptor(&path, &values).unwrap();
        assert_eq!(load_descriptor(&path).unwrap().unwrap()["A"], "2");
    }

    #[test]
    fn test_missing_descriptor_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_descriptor(&descriptor_path(dir.path())).unwrap().is_none());
    }

    #[test]
    fn test_rejects_multiline_value() {
        let dir = TempDir::new().unwrap();
        let mut values = BTreeMap::new();
        values.insert("A".to_string(), "x\ny".to_string());
        assert!(write_descriptor(&descriptor_path(dir.path()), &values).is_err());
    }
}
