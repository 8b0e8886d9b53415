//! FTP storage backend (BunnyCDN-style storage zones) over `suppaftp`.
//!
//! One `FtpStream` per session. Keys are paths relative to the login
//! directory; the session always returns to it after a listing.

use std::io::{self, Read, Write};
use std::net::ToSocketAddrs;
use std::str::FromStr;
use std::time::Duration;

use suppaftp::list::File as ListedFile;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};

use super::{Liveness, ListError, ListPage, RemoteEntry, StorageBackend};
use crate::error::{ConnectionError, TransferError};
use crate::retry::{classify_ftp_reply, error_for};

const COPY_BUF: usize = 64 * 1024;

/// Connection settings for one storage zone.
#[derive(Debug, Clone)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    /// Storage zone name, used as the login user.
    pub zone: String,
    /// Zone API key, used as the login password.
    pub api_key: String,
    pub timeout: Duration,
}

impl FtpSettings {
    pub fn validate(&self) -> Result<(), ConnectionError> {
        if self.host.trim().is_empty() {
            return Err(ConnectionError::Config("ftp host is empty".into()));
        }
        if self.zone.trim().is_empty() {
            return Err(ConnectionError::Config("storage zone is required".into()));
        }
        if self.api_key.is_empty() {
            return Err(ConnectionError::Config("storage zone API key is required".into()));
        }
        Ok(())
    }
}

pub struct FtpSession {
    stream: FtpStream,
    home: String,
}

pub struct FtpBackend {
    settings: FtpSettings,
}

impl FtpBackend {
    pub fn new(settings: FtpSettings) -> Result<Self, ConnectionError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &FtpSettings {
        &self.settings
    }
}

impl StorageBackend for FtpBackend {
    type Session = FtpSession;

    fn describe(&self) -> String {
        format!("ftp://{}:{}/{}", self.settings.host, self.settings.port, self.settings.zone)
    }

    fn connect(&self) -> Result<FtpSession, ConnectionError> {
        let s = &self.settings;
        let addr = (s.host.as_str(), s.port)
            .to_socket_addrs()
            .map_err(|e| ConnectionError::Unreachable(format!("{}: {e}", s.host)))?
            .next()
            .ok_or_else(|| ConnectionError::Unreachable(format!("{}: no address", s.host)))?;

        let mut stream = FtpStream::connect_timeout(addr, s.timeout).map_err(|e| match e {
            FtpError::ConnectionError(io) if io.kind() == io::ErrorKind::TimedOut => {
                ConnectionError::Timeout(format!("{addr}: {io}"))
            }
            other => ConnectionError::Unreachable(format!("{addr}: {other}")),
        })?;
        stream
            .get_ref()
            .set_read_timeout(Some(s.timeout))
            .and_then(|_| stream.get_ref().set_write_timeout(Some(s.timeout)))
            .map_err(|e| ConnectionError::Unreachable(e.to_string()))?;

        stream.login(&s.zone, &s.api_key).map_err(|e| match e {
            FtpError::UnexpectedResponse(resp) if resp.status.code() == 530 => {
                ConnectionError::Auth(format!("login to zone {} refused", s.zone))
            }
            other => ConnectionError::Rejected(other.to_string()),
        })?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| ConnectionError::Rejected(format!("binary mode: {e}")))?;
        let home = stream
            .pwd()
            .map_err(|e| ConnectionError::Rejected(format!("PWD: {e}")))?;
        Ok(FtpSession { stream, home })
    }

    fn probe(&self, session: &mut FtpSession) -> Liveness {
        match session.stream.pwd() {
            Ok(_) => Liveness::Alive,
            Err(_) => Liveness::Dead,
        }
    }

    fn close(&self, mut session: FtpSession) {
        let _ = session.stream.quit();
    }

    fn size(&self, session: &mut FtpSession, key: &str) -> Option<u64> {
        session.stream.size(key).ok().map(|n| n as u64)
    }

    fn read_stream(
        &self,
        session: &mut FtpSession,
        key: &str,
        writer: &mut dyn Write,
    ) -> Result<u64, TransferError> {
        let mut data = session.stream.retr_as_stream(key).map_err(map_ftp_error)?;
        let mut buf = vec![0u8; COPY_BUF];
        let mut total = 0u64;
        loop {
            let n = match data.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransferError::from_remote_io(&e)),
            };
            writer.write_all(&buf[..n])?;
            total += n as u64;
        }
        session
            .stream
            .finalize_retr_stream(data)
            .map_err(map_ftp_error)?;
        Ok(total)
    }

    fn write_stream(
        &self,
        session: &mut FtpSession,
        key: &str,
        mut reader: &mut dyn Read,
        _len: u64,
    ) -> Result<u64, TransferError> {
        session
            .stream
            .put_file(key, &mut reader)
            .map_err(map_ftp_error)
    }

    fn ensure_remote_dir(&self, session: &mut FtpSession, path: &str) -> Result<(), TransferError> {
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);
            match session.stream.mkdir(&current) {
                Ok(()) => tracing::debug!(dir = %current, "created remote directory"),
                // 5xx here means the directory is already there.
                Err(FtpError::UnexpectedResponse(resp)) if resp.status.code() >= 500 => {}
                Err(e) => return Err(map_ftp_error(e)),
            }
        }
        Ok(())
    }

    fn list(
        &self,
        session: &mut FtpSession,
        prefix: &str,
        _token: Option<&str>,
    ) -> Result<ListPage, ListError> {
        let dir = prefix.trim_end_matches('/');
        if !dir.is_empty() {
            match session.stream.cwd(dir) {
                Ok(()) => {}
                Err(FtpError::UnexpectedResponse(resp)) if resp.status.code() == 550 => {
                    return Err(ListError::NotFound)
                }
                Err(e) => return Err(map_ftp_error(e).into()),
            }
        }
        let listed = list_current_dir(&mut session.stream, prefix);
        if !dir.is_empty() {
            let home = session.home.clone();
            session.stream.cwd(&home).map_err(map_ftp_error)?;
        }
        Ok(ListPage {
            entries: listed?,
            next_token: None,
        })
    }
}

fn list_current_dir(stream: &mut FtpStream, prefix: &str) -> Result<Vec<RemoteEntry>, TransferError> {
    let lines = stream.list(None).map_err(map_ftp_error)?;
    if let Some(entries) = parse_listing(prefix, &lines) {
        return Ok(entries);
    }
    tracing::debug!(prefix, "LIST output not parseable, falling back to NLST");
    let names = stream.nlst(None).map_err(map_ftp_error)?;
    Ok(entries_from_names(prefix, &names))
}

/// Parse unix-style `LIST` lines. `None` when any line is not understood.
fn parse_listing(prefix: &str, lines: &[String]) -> Option<Vec<RemoteEntry>> {
    let mut entries = Vec::with_capacity(lines.len());
    for line in lines.iter().map(|l| l.trim_end()).filter(|l| !l.is_empty()) {
        if line.starts_with("total ") {
            continue;
        }
        let file = ListedFile::from_str(line).ok()?;
        let name = file.name();
        if name == "." || name == ".." {
            continue;
        }
        entries.push(RemoteEntry {
            key: format!("{prefix}{name}"),
            size: file.size() as u64,
            modified_at: Some(file.modified()),
            is_dir: file.is_directory(),
        });
    }
    Some(entries)
}

/// `NLST` gives bare names; anything without an extension is taken for a directory.
fn entries_from_names(prefix: &str, names: &[String]) -> Vec<RemoteEntry> {
    names
        .iter()
        .map(|n| n.rsplit('/').next().unwrap_or(n).trim())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .map(|name| RemoteEntry {
            key: format!("{prefix}{name}"),
            size: 0,
            modified_at: None,
            is_dir: !name.contains('.'),
        })
        .collect()
}

fn map_ftp_error(e: FtpError) -> TransferError {
    match e {
        FtpError::ConnectionError(io) => TransferError::from_remote_io(&io),
        FtpError::UnexpectedResponse(resp) => {
            let code = resp.status.code();
            let body = String::from_utf8_lossy(&resp.body).trim().to_string();
            error_for(classify_ftp_reply(code), format!("FTP {code}: {body}"))
        }
        other => TransferError::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{classify, ErrorKind};

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_unix_listing() {
        let listing = lines(&[
            "-rw-r--r-- 1 owner group 1234 Nov  5 13:46 IMG_0001.jpg",
            "drwxr-xr-x 1 owner group    0 Nov  5 13:46 thumbs",
        ]);
        let entries = parse_listing("shoot/", &listing).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "shoot/IMG_0001.jpg");
        assert_eq!(entries[0].size, 1234);
        assert!(!entries[0].is_dir);
        assert!(entries[1].is_dir);
    }

    #[test]
    fn unparseable_listing_signals_fallback() {
        assert!(parse_listing("", &lines(&["this is not a listing line"])).is_none());
    }

    #[test]
    fn nlst_fallback_guesses_directories() {
        let entries = entries_from_names("a/", &lines(&["a/x.png", "sub", "..", ""]));
        let keys: Vec<_> = entries
            .iter()
            .map(|e| (e.key.as_str(), e.is_dir))
            .collect();
        assert_eq!(keys, [("a/x.png", false), ("a/sub", true)]);
    }

    #[test]
    fn io_errors_map_to_transient_kinds() {
        let e = map_ftp_error(FtpError::ConnectionError(io::Error::new(
            io::ErrorKind::TimedOut,
            "read timeout",
        )));
        assert_eq!(classify(&e), ErrorKind::Timeout);
    }

    #[test]
    fn settings_require_zone_and_key() {
        let mut s = FtpSettings {
            host: "storage.bunnycdn.com".into(),
            port: 21,
            zone: "photos".into(),
            api_key: "secret".into(),
            timeout: Duration::from_secs(30),
        };
        s.validate().unwrap();
        s.api_key.clear();
        assert!(matches!(s.validate(), Err(ConnectionError::Config(_))));
        s.api_key = "k".into();
        s.zone = "  ".into();
        assert!(FtpBackend::new(s).is_err());
    }
}
