//! htpasswd credential files.
//!
//! Supported entry formats: bcrypt (`$2y$`, `$2a$`, `$2b$`), `{SHA}`
//! (base64 SHA-1) and plain text. `$apr1$` MD5 and DES crypt entries are
//! loaded but never authenticate; a warning is logged at load time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HtpasswdError {
    #[error("failed to read htpasswd file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed htpasswd entry at {path:?} line {line}")]
    Malformed { path: PathBuf, line: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Hash {
    Bcrypt(String),
    Sha1(String),
    Plain(String),
    Unsupported,
}

impl Hash {
    fn parse(stored: &str) -> Self {
        if stored.starts_with("$2y$") || stored.starts_with("$2a$") || stored.starts_with("$2b$") {
            Hash::Bcrypt(stored.to_string())
        } else if let Some(digest) = stored.strip_prefix("{SHA}") {
            Hash::Sha1(digest.to_string())
        } else if stored.starts_with("$apr1$") || looks_like_crypt(stored) {
            Hash::Unsupported
        } else {
            Hash::Plain(stored.to_string())
        }
    }

    fn verify(&self, password: &str) -> bool {
        match self {
            Hash::Bcrypt(hash) => bcrypt::verify(password, hash).unwrap_or(false),
            Hash::Sha1(digest) => STANDARD.encode(Sha1::digest(password.as_bytes())) == *digest,
            Hash::Plain(stored) => stored == password,
            Hash::Unsupported => false,
        }
    }
}

/// 13 characters from the crypt(3) alphabet.
fn looks_like_crypt(stored: &str) -> bool {
    stored.len() == 13
        && stored
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'/')
}

/// A loaded htpasswd file.
#[derive(Debug, Clone)]
pub struct HtpasswdFile {
    entries: HashMap<String, Hash>,
}

impl HtpasswdFile {
    pub fn open(path: &Path) -> Result<Self, HtpasswdError> {
        let content = std::fs::read_to_string(path).map_err(|source| HtpasswdError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|line| HtpasswdError::Malformed {
            path: path.to_path_buf(),
            line,
        })
    }

    /// Parse file contents. On failure returns the 1-based offending line.
    fn parse(content: &str) -> Result<Self, usize> {
        let mut entries = HashMap::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (user, stored) = line.split_once(':').ok_or(index + 1)?;
            if user.is_empty() {
                return Err(index + 1);
            }
            let hash = Hash::parse(stored);
            if hash == Hash::Unsupported {
                tracing::warn!(user = %user, "Unsupported htpasswd hash format; entry will never authenticate");
            }
            entries.insert(user.to_string(), hash);
        }
        Ok(Self { entries })
    }

    pub fn contains(&self, username: &str) -> bool {
        self.entries.contains_key(username)
    }

    /// Look the user up and verify the password against the stored hash.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.entries
            .get(username)
            .map(|hash| hash.verify(password))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn verifies_supported_formats() {
        let bcrypt_hash = bcrypt::hash("b-secret", 4).unwrap();
        // {SHA} of "password"
        let content = format!(
            "# comment\nalice:{bcrypt_hash}\nbob:{{SHA}}W6ph5Mm5Pz8GgiULbPgzG37mj9g=\ncarol:plain\ndave:$apr1$abc$def\n"
        );
        let file = HtpasswdFile::parse(&content).unwrap();
        assert_eq!(file.len(), 4);

        assert!(file.authenticate("alice", "b-secret"));
        assert!(!file.authenticate("alice", "wrong"));
        assert!(file.authenticate("bob", "password"));
        assert!(!file.authenticate("bob", "Password"));
        assert!(file.authenticate("carol", "plain"));
        assert!(file.contains("dave"));
        assert!(!file.authenticate("dave", "anything"));
        assert!(!file.authenticate("mallory", "plain"));
    }

    #[test]
    fn open_reports_malformed_line() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "ok:pass\nbroken-line").unwrap();
        let err = HtpasswdFile::open(tmp.path()).unwrap_err();
        assert!(matches!(err, HtpasswdError::Malformed { line: 2, .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = HtpasswdFile::open(Path::new("/nonexistent/htpasswd")).unwrap_err();
        assert!(matches!(err, HtpasswdError::Io { .. }));
    }
}
