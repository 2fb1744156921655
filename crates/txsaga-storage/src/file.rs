use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read as _, Seek, SeekFrom, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use txsaga_core::{Storage, StorageError, TxId};

use crate::error::BackendError;

const FILE_PREFIX: &str = "tx-";
const HASHED_PREFIX: &str = "txh-";
const LOG_SUFFIX: &str = ".log";
const ID_SUFFIX: &str = ".id";

/// Longest escaped id used verbatim in a file name. Longer ids are hashed.
const MAX_ESCAPED_LEN: usize = 200;

/// Durable storage keeping one append-only file per transaction.
///
/// Each entry is one line. File names are derived from the transaction id,
/// with every byte outside `[A-Za-z0-9._-]` percent-encoded, so any id maps
/// to a distinct file inside the directory. Ids whose escaped form would be
/// too long for a file name are stored under the SHA-256 digest of the id,
/// with the id itself kept in a `.id` file next to the log.
///
/// A line without its terminating newline is the remains of an interrupted
/// append: reads ignore it and the next append truncates it.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    lock: Mutex<()>,
}

/// File names backing one transaction id.
enum LogFiles {
    Escaped(PathBuf),
    Hashed { log: PathBuf, id: PathBuf },
}

impl LogFiles {
    fn log(&self) -> &Path {
        match self {
            Self::Escaped(log) | Self::Hashed { log, .. } => log,
        }
    }
}

impl FileStorage {
    /// Opens storage in `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::CreateDir` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| BackendError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        debug!(dir = %dir.display(), "opened file storage");
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the log file for `tx_id`.
    #[must_use]
    pub fn path_for(&self, tx_id: &TxId) -> PathBuf {
        self.files_for(tx_id).log().to_path_buf()
    }

    fn files_for(&self, tx_id: &TxId) -> LogFiles {
        let escaped = escape(tx_id.as_str());
        if escaped.len() <= MAX_ESCAPED_LEN {
            return LogFiles::Escaped(
                self.dir
                    .join(format!("{FILE_PREFIX}{escaped}{LOG_SUFFIX}")),
            );
        }
        let digest = hex::encode(Sha256::digest(tx_id.as_str().as_bytes()));
        LogFiles::Hashed {
            log: self.dir.join(format!("{HASHED_PREFIX}{digest}{LOG_SUFFIX}")),
            id: self.dir.join(format!("{HASHED_PREFIX}{digest}{ID_SUFFIX}")),
        }
    }

    /// Ids of every transaction with a log file in the directory, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or an id file cannot be read.
    pub fn tx_ids(&self) -> Result<Vec<TxId>, StorageError> {
        let read_err = |source| BackendError::Read {
            path: self.dir.clone(),
            source,
        };
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(read_err)? {
            let entry = entry.map_err(read_err)?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(escaped) = name
                .strip_prefix(FILE_PREFIX)
                .and_then(|n| n.strip_suffix(LOG_SUFFIX))
            {
                if let Some(id) = unescape(escaped) {
                    ids.push(TxId::from(id));
                }
            } else if name.starts_with(HASHED_PREFIX) && name.ends_with(ID_SUFFIX) {
                let path = entry.path();
                let id = fs::read_to_string(&path)
                    .map_err(|source| BackendError::Read { path, source })?;
                ids.push(TxId::from(id));
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl Storage for FileStorage {
    fn exists(&self, tx_id: &TxId) -> Result<bool, StorageError> {
        Ok(!self.read_all(tx_id)?.is_empty())
    }

    fn append(&self, tx_id: &TxId, entry: &str) -> Result<(), StorageError> {
        if entry.contains('\n') {
            return Err(BackendError::MultilineEntry { len: entry.len() }.into());
        }
        let files = self.files_for(tx_id);
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;

        if let LogFiles::Hashed { id, .. } = &files {
            if !id.exists() {
                fs::write(id, tx_id.as_str()).map_err(|source| BackendError::Write {
                    path: id.clone(),
                    source,
                })?;
            }
        }

        let path = files.log();
        let write = || -> io::Result<()> {
            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(path)?;
            realign(&mut file, path)?;
            file.write_all(entry.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_data()
        };
        write().map_err(|source| BackendError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(tx_id = %tx_id, path = %path.display(), "appended log entry");
        Ok(())
    }

    fn read_all(&self, tx_id: &TxId) -> Result<Vec<String>, StorageError> {
        let files = self.files_for(tx_id);
        let path = files.log();
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(BackendError::Read {
                    path: path.to_path_buf(),
                    source,
                }
                .into());
            }
        };
        let complete = &bytes[..complete_len(&bytes)];
        let content = std::str::from_utf8(complete).map_err(|e| BackendError::Read {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        Ok(content.lines().map(String::from).collect())
    }
}

/// Length of the prefix of `bytes` made of newline-terminated lines.
fn complete_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rposition(|byte| *byte == b'\n')
        .map_or(0, |end| end + 1)
}

/// Truncates an unterminated final line left by an interrupted append.
fn realign(file: &mut File, path: &Path) -> io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0_u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(());
    }

    let mut bytes = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut bytes)?;
    let aligned = complete_len(&bytes) as u64;
    file.set_len(aligned)?;
    warn!(
        path = %path.display(),
        dropped = len - aligned,
        "truncated partial log entry"
    );
    Ok(())
}

fn escape(id: &str) -> String {
    let mut escaped = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            escaped.push(char::from(byte));
        } else {
            let _ = write!(escaped, "%{byte:02X}");
        }
    }
    escaped
}

fn unescape(escaped: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(escaped.len());
    let mut rest = escaped.as_bytes();
    while let Some((&byte, tail)) = rest.split_first() {
        if byte == b'%' {
            let hex = tail.get(..2)?;
            let hex = std::str::from_utf8(hex).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else {
            bytes.push(byte);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}
