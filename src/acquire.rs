//! Comment store acquisition.
//!
//! Materializes the local `SQLite` store from a remote or local archive.
//! A payload is inflated if it carries the gzip magic, then classified as
//! either a ready-made `SQLite` database or a JSON archive to import. The
//! result is built in a temporary file beside the destination and renamed
//! into place, so an interrupted transfer never leaves a half-written store.

use crate::error::{KasoError, Result};
use crate::parser::{ArchiveParser, PayloadKind, decompress, sniff};
use crate::storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use ring::digest::{self, SHA256};
use std::fmt::Write as _;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default transfer timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Knobs for [`ensure_store`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    /// Expected lowercase hex SHA-256 of the transferred bytes.
    pub sha256: Option<String>,
    /// Download even when the store already exists.
    pub force: bool,
    pub show_progress: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            sha256: None,
            force: false,
            show_progress: false,
        }
    }
}

/// What [`ensure_store`] or [`import_file`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The store was already on disk; nothing was transferred.
    AlreadyPresent,
    /// A `SQLite` payload was installed as-is.
    InstalledDatabase { bytes: usize },
    /// A JSON archive was imported into a fresh store.
    ImportedArchive { bytes: usize, comments: usize },
}

/// Make sure a store exists at `db_path`, downloading from `url` if needed.
///
/// The existence check comes first: when the store is present and
/// `opts.force` is false no network request is made.
///
/// # Errors
///
/// Returns transfer, HTTP status, checksum, decompression, format or
/// database errors. On any error the destination is left untouched.
pub fn ensure_store(url: &str, db_path: &Path, opts: &FetchOptions) -> Result<AcquireOutcome> {
    if db_path.exists() && !opts.force {
        debug!(path = %db_path.display(), "store already present");
        return Ok(AcquireOutcome::AlreadyPresent);
    }

    let bytes = download(url, opts)?;
    if let Some(expected) = &opts.sha256 {
        verify_checksum(&bytes, expected)?;
    }
    install_payload(bytes, db_path, url)
}

/// Build the store from a local archive or database file.
///
/// # Errors
///
/// Returns an error if the store exists and `force` is false, or if the
/// file cannot be read or installed.
pub fn import_file(path: &Path, db_path: &Path, force: bool) -> Result<AcquireOutcome> {
    if db_path.exists() && !force {
        return Err(KasoError::invalid_argument(format!(
            "store {} already exists (use --force to replace it)",
            db_path.display()
        )));
    }
    let bytes = std::fs::read(path).map_err(|e| KasoError::path_error("read", path, e))?;
    install_payload(bytes, db_path, &path.display().to_string())
}

/// Fetch `url` into memory.
///
/// # Errors
///
/// Returns [`KasoError::FetchFailed`] for transport failures and
/// [`KasoError::HttpStatus`] for non-success responses.
pub fn download(url: &str, opts: &FetchOptions) -> Result<Vec<u8>> {
    info!(url, timeout_secs = opts.timeout.as_secs(), "fetching archive");
    let client = reqwest::blocking::Client::builder()
        .timeout(opts.timeout)
        .user_agent(concat!("kaso/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| KasoError::fetch_failed(url, e))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| KasoError::fetch_failed(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(KasoError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let pb = progress_bar(response.content_length(), opts.show_progress);
    let mut bytes = Vec::new();
    pb.wrap_read(response)
        .read_to_end(&mut bytes)
        .map_err(|e| KasoError::fetch_failed(url, e))?;
    pb.finish_and_clear();

    info!(url, bytes = bytes.len(), "archive downloaded");
    Ok(bytes)
}

fn progress_bar(len: Option<u64>, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    match len {
        Some(len) => {
            let pb = ProgressBar::new(len);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})",
            ) {
                pb.set_style(style.progress_chars("##-"));
            }
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {bytes} downloaded") {
                pb.set_style(style);
            }
            pb
        }
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = digest::digest(&SHA256, bytes);
    let mut out = String::with_capacity(64);
    for byte in digest.as_ref() {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

/// Compare the SHA-256 of `bytes` against `expected` (hex, any case).
///
/// # Errors
///
/// Returns [`KasoError::ChecksumMismatch`] when the digests differ.
pub fn verify_checksum(bytes: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(bytes);
    let expected = expected.trim().to_ascii_lowercase();
    if actual == expected {
        debug!("checksum verified");
        Ok(())
    } else {
        Err(KasoError::ChecksumMismatch { expected, actual })
    }
}

/// Inflate, classify and atomically install a payload at `db_path`.
///
/// # Errors
///
/// Returns an error if the payload is corrupt, unrecognized, or cannot be
/// written; the destination is untouched in that case.
pub fn install_payload(bytes: Vec<u8>, db_path: &Path, label: &str) -> Result<AcquireOutcome> {
    let payload = decompress(bytes)?;
    let size = payload.len();
    let dir = parent_dir(db_path);
    std::fs::create_dir_all(&dir).map_err(|e| KasoError::path_error("create directory", &dir, e))?;

    let temp = tempfile::Builder::new()
        .prefix(".kaso-")
        .suffix(".db.partial")
        .tempfile_in(&dir)
        .map_err(|e| KasoError::path_error("create temporary file in", &dir, e))?;

    let outcome = match sniff(&payload) {
        Some(PayloadKind::Sqlite) => {
            std::fs::write(temp.path(), &payload)
                .map_err(|e| KasoError::path_error("write", temp.path(), e))?;
            Storage::validate_file(temp.path())?;
            drop(Storage::open_existing(temp.path())?);
            AcquireOutcome::InstalledDatabase { bytes: size }
        }
        Some(PayloadKind::Json) => {
            let comments = ArchiveParser::new(label).parse_bytes(payload)?;
            let mut storage = Storage::open(temp.path())?;
            let count = storage.import_comments(&comments)?;
            storage.optimize()?;
            drop(storage);
            AcquireOutcome::ImportedArchive {
                bytes: size,
                comments: count,
            }
        }
        None => {
            return Err(KasoError::UnknownArchiveFormat {
                hint: Some(format!("{label} is neither JSON nor a SQLite database")),
            });
        }
    };

    remove_sidecars(db_path);
    temp.persist(db_path)
        .map_err(|e| KasoError::path_error("install store at", db_path, e.error))?;
    info!(path = %db_path.display(), ?outcome, "store installed");
    Ok(outcome)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Stale WAL files from a replaced store would be replayed into the new one.
fn remove_sidecars(db_path: &Path) {
    for suffix in ["-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        let sidecar = PathBuf::from(name);
        if sidecar.exists() {
            if let Err(e) = std::fs::remove_file(&sidecar) {
                warn!(path = %sidecar.display(), error = %e, "could not remove stale sidecar");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CommentStore;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use tempfile::TempDir;

    const DOC: &str = r#"{"comments":[
        {"id":1,"user":"alice","datetime":"2024-01-01T00:00:00Z","content":"scratch",
         "replies":[{"id":2,"user":"bob","datetime":"2024-01-01T01:00:00Z","content":"猫"}]},
        {"id":3,"user":"carol","datetime":"2024-01-02T00:00:00Z","content":"hello"}
    ]}"#;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(std::result::Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.contains(".partial"))
            .collect()
    }

    #[test]
    fn test_existing_store_skips_network() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("kaso.db");
        std::fs::write(&db, b"").unwrap();
        // Unroutable URL: any request attempt would fail.
        let outcome = ensure_store("http://127.0.0.1:9/none", &db, &FetchOptions::default()).unwrap();
        assert_eq!(outcome, AcquireOutcome::AlreadyPresent);
    }

    #[test]
    fn test_unreachable_source_is_fatal() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("kaso.db");
        let opts = FetchOptions {
            timeout: Duration::from_secs(5),
            ..FetchOptions::default()
        };

        let err = ensure_store("http://127.0.0.1:9/none.json.gz", &db, &opts).unwrap_err();
        assert!(matches!(err, KasoError::FetchFailed { .. }));
        assert!(err.to_string().starts_with("Failed to fetch archive"));
        assert!(!db.exists());
        assert!(leftovers(dir.path()).is_empty());
    }

    /// Serve one request with `status_line` and an empty body.
    fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                line.clear();
            }
            let mut stream = stream;
            write!(
                stream,
                "{status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            )
            .unwrap();
        });
        format!("http://{addr}/archive.json.gz")
    }

    #[test]
    fn test_http_error_status_is_fatal() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("kaso.db");
        let url = serve_once("HTTP/1.1 404 Not Found");

        let err = ensure_store(&url, &db, &FetchOptions::default()).unwrap_err();
        assert!(matches!(err, KasoError::HttpStatus { status: 404, .. }));
        assert!(!db.exists());
    }

    #[test]
    fn test_import_gzip_json() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("archive.json.gz");
        std::fs::write(&src, gzip(DOC.as_bytes())).unwrap();
        let db = dir.path().join("kaso.db");

        let outcome = import_file(&src, &db, false).unwrap();
        assert!(matches!(
            outcome,
            AcquireOutcome::ImportedArchive { comments: 3, .. }
        ));
        let storage = Storage::open_existing(&db).unwrap();
        assert_eq!(storage.count().unwrap(), 3);
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_install_sqlite_payload_as_is() {
        let dir = TempDir::new().unwrap();
        let built = dir.path().join("built.db");
        {
            let mut storage = Storage::open(&built).unwrap();
            let comments = ArchiveParser::new("doc").parse_bytes(DOC.as_bytes().to_vec()).unwrap();
            storage.import_comments(&comments).unwrap();
            storage.optimize().unwrap();
        }
        let bytes = gzip(&std::fs::read(&built).unwrap());
        let db = dir.path().join("nested").join("kaso.db");

        let outcome = install_payload(bytes, &db, "remote").unwrap();
        assert!(matches!(outcome, AcquireOutcome::InstalledDatabase { .. }));
        assert_eq!(Storage::open_existing(&db).unwrap().count().unwrap(), 3);
    }

    #[test]
    fn test_foreign_sqlite_payload_is_rejected() {
        let dir = TempDir::new().unwrap();
        let foreign = dir.path().join("foreign.db");
        {
            let conn = rusqlite::Connection::open(&foreign).unwrap();
            conn.execute_batch("CREATE TABLE comments (id INTEGER PRIMARY KEY, body TEXT);")
                .unwrap();
        }
        let db = dir.path().join("kaso.db");
        std::fs::write(&db, b"previous").unwrap();

        let err = install_payload(std::fs::read(&foreign).unwrap(), &db, "foreign").unwrap_err();
        assert!(matches!(err, KasoError::UnknownArchiveFormat { .. }));
        assert_eq!(std::fs::read(&db).unwrap(), b"previous");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_corrupt_payload_leaves_destination_untouched() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("kaso.db");
        std::fs::write(&db, b"previous").unwrap();

        let mut bad = gzip(DOC.as_bytes());
        bad.truncate(10);
        assert!(install_payload(bad, &db, "x").is_err());
        assert!(install_payload(b"<html>".to_vec(), &db, "x").is_err());

        assert_eq!(std::fs::read(&db).unwrap(), b"previous");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_import_refuses_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.json");
        std::fs::write(&src, DOC).unwrap();
        let db = dir.path().join("kaso.db");
        import_file(&src, &db, false).unwrap();

        let err = import_file(&src, &db, false).unwrap_err();
        assert!(matches!(err, KasoError::InvalidArgument { .. }));
        import_file(&src, &db, true).unwrap();
    }

    #[test]
    fn test_checksum() {
        let hex = sha256_hex(b"abc");
        assert_eq!(
            hex,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        verify_checksum(b"abc", &hex.to_uppercase()).unwrap();
        let err = verify_checksum(b"abd", &hex).unwrap_err();
        assert!(matches!(err, KasoError::ChecksumMismatch { .. }));
    }
}
