//! WeasyPrint invoked as a subprocess.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Instant,
};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::{ChildStdin, Command},
    runtime::Handle,
};
use tracing::{debug, warn};

use crate::{
    application::render::{EngineFault, RenderEngine},
    domain::document::RenderRequest,
};

const STDERR_TAIL_BYTES: usize = 2_048;
const STDERR_CAPTURE_BYTES: usize = 16 * 1_024;
const SIGKILL: i32 = 9;

/// The document travels over stdin, so WeasyPrint only resolves relative
/// references when the request carries an explicit `base_url`.
#[derive(Debug, Clone)]
pub struct WeasyPrintEngine {
    program: PathBuf,
    max_artifact_bytes: u64,
}

impl WeasyPrintEngine {
    pub fn new(program: impl Into<PathBuf>, max_artifact_bytes: u64) -> Self {
        Self {
            program: program.into(),
            max_artifact_bytes,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn spawn_fault(&self, err: io::Error) -> EngineFault {
        if err.kind() == ErrorKind::NotFound {
            EngineFault::unavailable(format!("`{}` not found", self.program.display()))
        } else {
            EngineFault::Io(err)
        }
    }
}

#[async_trait]
impl RenderEngine for WeasyPrintEngine {
    fn name(&self) -> &'static str {
        "weasyprint"
    }

    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, EngineFault> {
        let started_at = Instant::now();
        let options = request.options();
        let workdir = Workdir::create().await?;
        let stylesheet_path = workdir.path().join("page.css");
        tokio::fs::write(&stylesheet_path, options.page_stylesheet()).await?;

        let mut command = self.command();
        command.stdin(Stdio::piped());
        if options.presentational_hints {
            command.arg("--presentational-hints");
        }
        if options.optimize_images {
            command.arg("--optimize-images");
        }
        if let Some(base_url) = options.base_url.as_ref() {
            command.arg("--base-url").arg(base_url.as_str());
        }
        command
            .arg("--stylesheet")
            .arg(&stylesheet_path)
            .arg("-")
            .arg("-");

        let mut child = command.spawn().map_err(|err| self.spawn_fault(err))?;
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(EngineFault::Io(io::Error::other(
                "engine pipes were not captured",
            )));
        };

        // An oversized artifact short-circuits here; dropping `child` kills it.
        let ((), artifact, stderr) = tokio::try_join!(
            feed_document(stdin, request.content().as_bytes()),
            read_artifact(stdout, self.max_artifact_bytes),
            read_stderr_tail(stderr),
        )?;
        let status = child.wait().await?;

        if !status.success() {
            let stderr = stderr_tail(&stderr);
            warn!(
                target = "folio::infra::engine",
                op = "weasyprint::render",
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                exit_code = status.code().map(i64::from).unwrap_or(-1),
                stderr = %stderr,
                "WeasyPrint invocation failed"
            );
            return Err(classify_failure(status, stderr));
        }

        debug!(
            target = "folio::infra::engine",
            op = "weasyprint::render",
            result = "ok",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            pdf_bytes = artifact.len(),
            "WeasyPrint produced a document"
        );
        Ok(artifact)
    }

    async fn probe(&self) -> Result<(), EngineFault> {
        let output = self
            .command()
            .arg("--version")
            .output()
            .await
            .map_err(|err| self.spawn_fault(err))?;

        if output.status.success() {
            debug!(
                target = "folio::infra::engine",
                op = "weasyprint::probe",
                version = %String::from_utf8_lossy(&output.stdout).trim(),
                "WeasyPrint is available"
            );
            Ok(())
        } else {
            Err(EngineFault::unavailable(format!(
                "`{} --version` exited with {}: {}",
                self.program.display(),
                output.status,
                stderr_tail(&output.stderr)
            )))
        }
    }
}

/// Scratch directory created and removed on the blocking pool.
struct Workdir {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl Workdir {
    async fn create() -> io::Result<Self> {
        let dir = tokio::task::spawn_blocking(TempDir::new)
            .await
            .map_err(io::Error::other)??;
        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Workdir {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || drop(dir));
            }
            Err(_) => drop(dir),
        }
    }
}

async fn feed_document(mut stdin: ChildStdin, document: &[u8]) -> Result<(), EngineFault> {
    match stdin.write_all(document).await {
        // The engine stopped reading early; its exit status decides the outcome.
        Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
        Ok(()) => Ok(()),
    }
}

async fn read_artifact(
    stdout: impl AsyncRead + Unpin,
    limit: u64,
) -> Result<Vec<u8>, EngineFault> {
    let mut artifact = Vec::new();
    stdout
        .take(limit.saturating_add(1))
        .read_to_end(&mut artifact)
        .await?;
    if artifact.len() as u64 > limit {
        return Err(EngineFault::ArtifactTooLarge { limit });
    }
    Ok(artifact)
}

/// Drains stderr to the end, keeping only the last [`STDERR_CAPTURE_BYTES`].
async fn read_stderr_tail(mut stderr: impl AsyncRead + Unpin) -> Result<Vec<u8>, EngineFault> {
    let mut tail = Vec::new();
    let mut chunk = [0_u8; 4_096];
    loop {
        let read = stderr.read(&mut chunk).await?;
        if read == 0 {
            return Ok(tail);
        }
        tail.extend_from_slice(&chunk[..read]);
        if tail.len() > STDERR_CAPTURE_BYTES {
            let excess = tail.len() - STDERR_CAPTURE_BYTES;
            tail.drain(..excess);
        }
    }
}

fn classify_failure(status: ExitStatus, stderr: String) -> EngineFault {
    if killed_by_sigkill(status) || stderr.contains("MemoryError") {
        return EngineFault::out_of_memory(stderr);
    }
    let detail = match status.code() {
        Some(code) => format!("exit {code}: {stderr}"),
        None => format!("{status}: {stderr}"),
    };
    EngineFault::crashed(detail)
}

#[cfg(unix)]
fn killed_by_sigkill(status: ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal() == Some(SIGKILL)
}

#[cfg(not(unix))]
fn killed_by_sigkill(_status: ExitStatus) -> bool {
    let _ = SIGKILL;
    false
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &trimmed[start..])
}
