use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::backend::Document;

/// Layout of a checked-out tree:
///
/// ```text
/// <root>/sys/policies/acl/<policy>
/// <root>/auth/<mount>/<segment>/<object>
/// ```
#[derive(Debug, Clone)]
pub struct LocalTree {
    root: PathBuf,
}

impl LocalTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy_dir(&self) -> PathBuf {
        self.root.join("sys").join("policies").join("acl")
    }

    pub fn auth_dir(&self) -> PathBuf {
        self.root.join("auth")
    }
}

/// Directory holding one mount's role-like objects under an auth dir
pub fn role_dir(auth_dir: &Path, mount: &str, segment: &str) -> PathBuf {
    auth_dir.join(mount).join(segment)
}

#[derive(Debug, thiserror::Error)]
pub enum LocalTreeError {
    #[error("error walking {0}: {1}")]
    Walk(PathBuf, #[source] walkdir::Error),
    #[error("error reading {0}: {1}")]
    Read(PathBuf, #[source] io::Error),
    #[error("{0} is not valid UTF-8")]
    Utf8(PathBuf),
    #[error("error decoding {0}: {1}")]
    Decode(PathBuf, #[source] serde_json::Error),
    #[error("error encoding {0}: {1}")]
    Encode(PathBuf, #[source] serde_json::Error),
    #[error("error writing {0}: {1}")]
    Write(PathBuf, #[source] io::Error),
    #[error("{0:?} is not usable as a file name")]
    InvalidName(String),
}

/// Whether `name` maps to exactly one file directly inside a directory.
///
/// Entries are keyed by base name on read, so a name with a separator
///  or a `.`/`..` component would not survive a write-then-read.
pub fn is_entry_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    ) && !name.contains(['/', '\\'])
}

/// Walk `root` and decode every file into an entry keyed by its base name.
///
/// A missing root yields no entries. The first read or decode failure
///  aborts the walk.
fn read_tree<T, F>(root: &Path, decode: F) -> Result<BTreeMap<String, T>, LocalTreeError>
where
    F: Fn(&Path, Vec<u8>) -> Result<T, LocalTreeError>,
{
    let mut entries = BTreeMap::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 && is_not_found(&e) => {
                tracing::debug!(directory = %root.display(), "local directory absent, treating as empty");
                return Ok(entries);
            }
            Err(e) => return Err(LocalTreeError::Walk(root.to_path_buf(), e)),
        };

        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let bytes = fs::read(path).map_err(|e| LocalTreeError::Read(path.to_path_buf(), e))?;
        let value = decode(path, bytes)?;

        if entries.insert(name.clone(), value).is_some() {
            tracing::warn!(name = %name, path = %path.display(), "duplicate entry name, last one wins");
        }
    }

    Ok(entries)
}

fn is_not_found(e: &walkdir::Error) -> bool {
    e.io_error()
        .map(|io| io.kind() == io::ErrorKind::NotFound)
        .unwrap_or(false)
}

/// Read every policy under `dir` as raw text.
pub fn read_policies(dir: &Path) -> Result<BTreeMap<String, String>, LocalTreeError> {
    read_tree(dir, |path, bytes| {
        String::from_utf8(bytes).map_err(|_| LocalTreeError::Utf8(path.to_path_buf()))
    })
}

/// Read every role-like object under `dir` as a JSON object.
pub fn read_roles(dir: &Path) -> Result<BTreeMap<String, Document>, LocalTreeError> {
    read_tree(dir, |path, bytes| {
        serde_json::from_slice::<Document>(&bytes)
            .map_err(|e| LocalTreeError::Decode(path.to_path_buf(), e))
    })
}

pub fn write_policy(dir: &Path, name: &str, body: &str) -> Result<PathBuf, LocalTreeError> {
    write_file(dir, name, body.as_bytes())
}

/// Write a role-like object as pretty-printed JSON.
pub fn write_role(dir: &Path, name: &str, data: &Document) -> Result<PathBuf, LocalTreeError> {
    if !is_entry_name(name) {
        return Err(LocalTreeError::InvalidName(name.to_string()));
    }
    let path = dir.join(name);
    let mut bytes = serde_json::to_vec_pretty(data).map_err(|e| LocalTreeError::Encode(path, e))?;
    bytes.push(b'\n');
    write_file(dir, name, &bytes)
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, LocalTreeError> {
    if !is_entry_name(name) {
        return Err(LocalTreeError::InvalidName(name.to_string()));
    }
    let path = dir.join(name);
    fs::create_dir_all(dir).map_err(|e| LocalTreeError::Write(dir.to_path_buf(), e))?;
    fs::write(&path, bytes).map_err(|e| LocalTreeError::Write(path.clone(), e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let tree = LocalTree::new("/repo");
        assert_eq!(tree.policy_dir(), PathBuf::from("/repo/sys/policies/acl"));
        assert_eq!(tree.auth_dir(), PathBuf::from("/repo/auth"));
        assert_eq!(
            role_dir(&tree.auth_dir(), "approle", "role"),
            PathBuf::from("/repo/auth/approle/role")
        );
    }

    #[test]
    fn test_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let policies = read_policies(&temp.path().join("nope")).unwrap();
        assert!(policies.is_empty());
        let roles = read_roles(&temp.path().join("nope").join("role")).unwrap();
        assert!(roles.is_empty());
    }

    #[test]
    fn test_read_policies_walks_subdirectories() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        fs::write(dir.join("p1"), "path \"a\" {}").unwrap();
        fs::create_dir_all(dir.join("team")).unwrap();
        fs::write(dir.join("team").join("p2"), "path \"b\" {}").unwrap();

        let policies = read_policies(dir).unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies["p1"], "path \"a\" {}");
        assert_eq!(policies["p2"], "path \"b\" {}");
        assert!(!policies.contains_key("team"));
    }

    #[test]
    fn test_read_roles_decodes_json() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("r1"), r#"{"token_policies":["p1"]}"#).unwrap();

        let roles = read_roles(temp.path()).unwrap();
        assert_eq!(roles["r1"]["token_policies"], serde_json::json!(["p1"]));
    }

    #[test]
    fn test_read_roles_decode_failure_names_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("good"), "{}").unwrap();
        fs::write(temp.path().join("broken"), "{not json").unwrap();

        let err = read_roles(temp.path()).unwrap_err();
        match &err {
            LocalTreeError::Decode(path, _) => assert!(path.ends_with("broken")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_read_roles_rejects_non_object() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("r1"), "[1, 2]").unwrap();
        assert!(matches!(
            read_roles(temp.path()),
            Err(LocalTreeError::Decode(_, _))
        ));
    }

    #[test]
    fn test_read_policies_rejects_invalid_utf8() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("bin"), [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            read_policies(temp.path()),
            Err(LocalTreeError::Utf8(_))
        ));
    }

    #[test]
    fn test_write_then_read_role() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("auth").join("approle").join("role");
        let mut data = Document::new();
        data.insert("token_ttl".into(), serde_json::json!(3600));

        let path = write_role(&dir, "r1", &data).unwrap();
        assert!(path.ends_with("auth/approle/role/r1"));

        let roles = read_roles(&dir).unwrap();
        assert_eq!(roles["r1"], data);
    }

    #[test]
    fn test_write_policy_creates_directories() {
        let temp = TempDir::new().unwrap();
        let dir = LocalTree::new(temp.path()).policy_dir();
        write_policy(&dir, "p1", "body").unwrap();
        assert_eq!(fs::read_to_string(dir.join("p1")).unwrap(), "body");
    }

    #[test]
    fn test_entry_names() {
        for good in ["p1", "team-a.hcl", "r 1", "a#b", "..hidden", "x.."] {
            assert!(is_entry_name(good), "{} should be accepted", good);
        }
        for bad in ["", ".", "..", "../x", "a/b", "/etc/passwd", "a\\b", "nested/"] {
            assert!(!is_entry_name(bad), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_write_rejects_escaping_names() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("auth").join("approle").join("role");

        let err = write_role(&dir, "..", &Document::new()).unwrap_err();
        assert!(matches!(err, LocalTreeError::InvalidName(name) if name == ".."));
        assert!(matches!(
            write_policy(&dir, "../../escaped", "body"),
            Err(LocalTreeError::InvalidName(_))
        ));
        assert!(!temp.path().join("auth").join("escaped").exists());
        assert!(!dir.exists());
    }
}
