//! Metadata provider backed by a long-running `exiftool` process.
//!
//! Starting Perl for every file costs far more than reading the tags, so one
//! process is kept alive in `-stay_open` mode and fed arguments over stdin.
//! Each request ends with `-execute`; `exiftool` answers with the JSON output
//! followed by a `{ready}` line.

use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::{ErrorKind, Result};
use crate::models::Metadata;
use crate::provider::{MetadataProvider, MetadataWriter};

const BINARY: &str = "exiftool";
const READY: &str = "{ready}";
/// JSON output, group-prefixed tag names, raw numeric values, UTF-8 paths.
const ARGS: [&str; 5] = ["-json", "-G", "-n", "-charset", "filename=utf8"];

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// Set while a request is in flight. A session still dirty when the next
    /// request comes in was abandoned mid-response and cannot be trusted.
    dirty: bool,
}

impl Session {
    fn spawn(binary: &Path) -> Result<Self> {
        debug!(binary = %binary.display(), "starting exiftool");
        let mut child = Command::new(binary)
            .args(["-stay_open", "True", "-@", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .or_raise(|| ErrorKind::Process)?;
        let stdin = child.stdin.take().ok_or_raise(|| ErrorKind::Process)?;
        let stdout = child.stdout.take().ok_or_raise(|| ErrorKind::Process)?;
        Ok(Self { child, stdin, stdout: BufReader::new(stdout), dirty: false })
    }

    async fn execute(&mut self, args: &[&str]) -> Result<String> {
        let mut request = String::new();
        for arg in args {
            request.push_str(arg);
            request.push('\n');
        }
        request.push_str("-execute\n");
        self.dirty = true;
        self.stdin.write_all(request.as_bytes()).await.or_raise(|| ErrorKind::Process)?;
        self.stdin.flush().await.or_raise(|| ErrorKind::Process)?;

        let mut output = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            let read = self.stdout.read_line(&mut line).await.or_raise(|| ErrorKind::Process)?;
            if read == 0 {
                // The process exited without finishing the response.
                exn::bail!(ErrorKind::Process);
            }
            if line.trim_end() == READY {
                self.dirty = false;
                return Ok(output);
            }
            output.push_str(&line);
        }
    }

    async fn shutdown(mut self) -> Result<()> {
        self.stdin.write_all(b"-stay_open\nFalse\n").await.or_raise(|| ErrorKind::Process)?;
        self.stdin.flush().await.or_raise(|| ErrorKind::Process)?;
        self.child.wait().await.or_raise(|| ErrorKind::Process)?;
        Ok(())
    }
}

/// [`MetadataProvider`] talking to `exiftool`.
///
/// The process is started on first use and restarted after it dies. Requests
/// are serialized; `exiftool` only handles one at a time anyway.
pub struct ExifTool {
    binary: PathBuf,
    session: Mutex<Option<Session>>,
}

impl ExifTool {
    /// Use the `exiftool` found on `PATH`.
    pub fn discover() -> Result<Self> {
        let binary = which::which(BINARY).or_raise(|| ErrorKind::NotInstalled(BINARY))?;
        Ok(Self::with_binary(binary))
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into(), session: Mutex::new(None) }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn execute(&self, args: &[&str]) -> Result<String> {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|running| running.dirty) {
            warn!("previous exiftool request was abandoned; restarting");
            *session = None;
        }
        if session.is_none() {
            *session = Some(Session::spawn(&self.binary)?);
        }
        let running = session.as_mut().ok_or_raise(|| ErrorKind::Process)?;
        let output = running.execute(args).await;
        if output.is_err() {
            warn!("exiftool stopped responding; it will be restarted for the next file");
            *session = None;
        }
        output
    }

    /// Ask the running process to exit and wait for it.
    pub async fn close(&self) -> Result<()> {
        match self.session.lock().await.take() {
            Some(session) => session.shutdown().await,
            None => Ok(()),
        }
    }
}

/// Arguments are newline separated, so such paths cannot be expressed.
fn path_arg(path: &Path) -> Result<&str> {
    let arg = path
        .to_str()
        .filter(|arg| !arg.contains('\n'))
        .ok_or_raise(|| ErrorKind::Unsupported(path.to_path_buf(), "path cannot be passed to exiftool".into()))?;
    Ok(arg)
}

#[async_trait]
impl MetadataProvider for ExifTool {
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    async fn metadata(&self, path: &Path) -> Result<Metadata> {
        let mut args = ARGS.to_vec();
        args.push(path_arg(path)?);
        let output = self.execute(&args).await?;
        parse_output(path, &output)
    }
}

#[async_trait]
impl MetadataWriter for ExifTool {
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    async fn write(&self, path: &Path, tag: &str, value: &str) -> Result<()> {
        let arg = path_arg(path)?;
        exn::ensure!(
            !tag.contains('\n') && !value.contains('\n'),
            ErrorKind::InvalidData(format!("cannot write {tag:?} = {value:?}"))
        );
        let assignment = format!("-{tag}={value}");
        // -P keeps the modification date, which is a tag the library relies on.
        let output = self.execute(&["-overwrite_original", "-P", &assignment, arg]).await?;
        parse_write_output(path, &output)
    }
}

/// `exiftool` summarizes a write as lines like `    1 image files updated`.
fn parse_write_output(path: &Path, output: &str) -> Result<()> {
    let count = |suffix: &str| {
        output.lines().filter_map(|line| line.trim().strip_suffix(suffix)).find_map(|n| n.trim().parse::<u32>().ok())
    };
    match (count("image files updated"), count("image files unchanged")) {
        (Some(updated), _) if updated > 0 => Ok(()),
        (_, Some(unchanged)) if unchanged > 0 => Ok(()),
        _ => exn::bail!(ErrorKind::Unsupported(path.to_path_buf(), output.trim().to_string())),
    }
}

fn parse_output(path: &Path, output: &str) -> Result<Metadata> {
    // Nothing at all on stdout means exiftool could not open the file; the
    // reason went to stderr.
    if output.trim().is_empty() {
        exn::bail!(ErrorKind::Unreadable(path.to_path_buf()));
    }
    let mut entries: Vec<Metadata> =
        serde_json::from_str(output).or_raise(|| ErrorKind::InvalidData(format!("unexpected exiftool output for {}", path.display())))?;
    let metadata = entries.pop().ok_or_raise(|| ErrorKind::Unreadable(path.to_path_buf()))?.strip_groups();
    if let Some(error) = metadata.error() {
        exn::bail!(ErrorKind::Unsupported(path.to_path_buf(), error.to_string()));
    }
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts;
    use std::time::Duration;
    use time::macros::date;

    #[test]
    fn test_parse_output() {
        let output = r#"[{
            "SourceFile": "/photos/a.jpg",
            "File:MIMEType": "image/jpeg",
            "File:FileModifyDate": "2019:01:02 03:04:05+01:00",
            "EXIF:DateTimeOriginal": "2018:10:21 14:03:22",
            "Composite:Megapixels": 12.2
        }]"#;
        let metadata = parse_output(Path::new("/photos/a.jpg"), output).unwrap();
        assert!(metadata.is_image());
        assert_eq!(metadata.date(consts::DATE_TIME_ORIGINAL), Some(date!(2018 - 10 - 21)));
        assert_eq!(metadata.date(consts::FILE_MODIFY_DATE), Some(date!(2019 - 01 - 02)));
        assert_eq!(metadata.megapixels(), Some(12.2));
    }

    #[test]
    fn test_parse_output_reported_error() {
        let output = r#"[{"SourceFile": "/photos/a.jpg", "ExifTool:Error": "File format error"}]"#;
        let err = parse_output(Path::new("/photos/a.jpg"), output).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unsupported(_, reason) if reason == "File format error"));
    }

    #[test]
    fn test_parse_output_empty() {
        let err = parse_output(Path::new("/photos/missing.jpg"), "\n").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unreadable(_)));
        assert!(parse_output(Path::new("/photos/a.jpg"), "garbage").is_err());
    }

    #[test]
    fn test_parse_write_output() {
        let path = Path::new("/photos/a.jpg");
        assert!(parse_write_output(path, "    1 image files updated\n").is_ok());
        assert!(parse_write_output(path, "    0 image files updated\n    1 image files unchanged\n").is_ok());
        let err = parse_write_output(path, "    0 image files updated\n    1 files weren't updated due to errors\n")
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unsupported(..)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_process_error() {
        let exiftool = ExifTool::with_binary("/nonexistent/exiftool");
        let err = exiftool.metadata(Path::new("/photos/a.jpg")).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Process);
        exiftool.close().await.unwrap();
    }

    /// A stand-in for `exiftool -stay_open` that answers every request with
    /// the last path it was given, and takes its time over paths containing
    /// "slow".
    #[cfg(unix)]
    fn fake_exiftool(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = r#"#!/bin/sh
last=""
while IFS= read -r line; do
    case "$line" in
        -execute)
            case "$last" in *slow*) sleep 2 ;; esac
            printf '[{"SourceFile": "%s", "File:MIMEType": "image/jpeg"}]\n{ready}\n' "$last"
            ;;
        False) exit 0 ;;
        *) last="$line" ;;
    esac
done
"#;
        let path = dir.join("exiftool");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_session_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let exiftool = ExifTool::with_binary(fake_exiftool(dir.path()));
        for name in ["/photos/a.jpg", "/photos/b.jpg"] {
            let metadata = exiftool.metadata(Path::new(name)).await.unwrap();
            assert_eq!(metadata.source_file(), Some(name));
        }
        exiftool.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abandoned_request_does_not_leak_into_the_next() {
        let dir = tempfile::tempdir().unwrap();
        let exiftool = ExifTool::with_binary(fake_exiftool(dir.path()));
        let abandoned =
            tokio::time::timeout(Duration::from_millis(200), exiftool.metadata(Path::new("/photos/slow.jpg"))).await;
        assert!(abandoned.is_err());

        let metadata = exiftool.metadata(Path::new("/photos/a.jpg")).await.unwrap();
        assert_eq!(metadata.source_file(), Some("/photos/a.jpg"));
        exiftool.close().await.unwrap();
    }
}
