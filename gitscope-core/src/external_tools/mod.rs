//! External analyzer integration
//!
//! The tool locator resolves the four external binaries (code counter,
//! complexity analyzer, vulnerability scanner, evolution analyzer) into
//! an immutable capability set; the process harness gives every runner
//! the same timeout, capture, and kill-escalation semantics; each runner
//! writes a sidecar diagnostics file for reproducibility.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::models::manifest::CapabilityEntry;
use crate::models::StageStatus;

pub mod codemaat;
pub mod complexity;
pub mod counter;
pub mod vulnscan;

/// External tool identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    CodeCounter,
    ComplexityAnalyzer,
    VulnerabilityScanner,
    EvolutionAnalyzer,
}

impl ToolKind {
    pub fn id(&self) -> &'static str {
        match self {
            ToolKind::CodeCounter => "code-counter",
            ToolKind::ComplexityAnalyzer => "complexity-analyzer",
            ToolKind::VulnerabilityScanner => "vulnerability-scanner",
            ToolKind::EvolutionAnalyzer => "evolution-analyzer",
        }
    }

    /// Executable (or jar) basename probed in the bundled directory.
    fn artifact_name(&self) -> &'static str {
        match self {
            ToolKind::CodeCounter => "scc",
            ToolKind::ComplexityAnalyzer => "lizard",
            ToolKind::VulnerabilityScanner => "trivy",
            ToolKind::EvolutionAnalyzer => "code-maat.jar",
        }
    }

    pub const ALL: [ToolKind; 4] = [
        ToolKind::CodeCounter,
        ToolKind::ComplexityAnalyzer,
        ToolKind::VulnerabilityScanner,
        ToolKind::EvolutionAnalyzer,
    ];
}

/// Resolution result for one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolStatus {
    Found {
        path: PathBuf,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    Missing {
        reason: String,
    },
}

/// Immutable capability set produced once at startup. Consumers receive
/// this as an input; nothing probes the environment after startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCapabilities {
    tools: BTreeMap<ToolKind, ToolStatus>,
    /// Java executable for the evolution analyzer jar.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub java: Option<PathBuf>,
    /// Vulnerability database cache directory, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vulndb_cache: Option<PathBuf>,
}

impl ToolCapabilities {
    pub fn status(&self, kind: ToolKind) -> &ToolStatus {
        static ABSENT: std::sync::OnceLock<ToolStatus> = std::sync::OnceLock::new();
        self.tools.get(&kind).unwrap_or_else(|| {
            ABSENT.get_or_init(|| ToolStatus::Missing { reason: "not probed".to_string() })
        })
    }

    pub fn path(&self, kind: ToolKind) -> Option<&Path> {
        match self.status(kind) {
            ToolStatus::Found { path, .. } => Some(path),
            ToolStatus::Missing { .. } => None,
        }
    }

    pub fn absent_reason(&self, kind: ToolKind) -> Option<String> {
        match self.status(kind) {
            ToolStatus::Found { .. } => None,
            ToolStatus::Missing { reason } => Some(reason.clone()),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_tool(mut self, kind: ToolKind, path: PathBuf) -> Self {
        self.tools.insert(kind, ToolStatus::Found { path, version: None });
        self
    }

    /// Snapshot for the run manifest.
    pub fn snapshot(&self) -> BTreeMap<String, CapabilityEntry> {
        self.tools
            .iter()
            .map(|(kind, status)| {
                let entry = match status {
                    ToolStatus::Found { path, version } => CapabilityEntry {
                        present: true,
                        path: Some(path.display().to_string()),
                        version: version.clone(),
                        absent_reason: None,
                    },
                    ToolStatus::Missing { reason } => CapabilityEntry {
                        present: false,
                        path: None,
                        version: None,
                        absent_reason: Some(reason.clone()),
                    },
                };
                (kind.id().to_string(), entry)
            })
            .collect()
    }
}

/// Resolves external tool paths: the bundled `tools/` directory next to
/// the executable first, then the process search path. Pure query; the
/// only invocation is a cheap `--version`.
pub struct ToolLocator {
    bundled_dir: Option<PathBuf>,
    jar_override: Option<PathBuf>,
    java_override: Option<PathBuf>,
    vulndb_override: Option<PathBuf>,
}

impl ToolLocator {
    pub fn new(
        jar_override: Option<PathBuf>,
        java_override: Option<PathBuf>,
        vulndb_override: Option<PathBuf>,
    ) -> Self {
        let bundled_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("tools")));
        Self { bundled_dir, jar_override, java_override, vulndb_override }
    }

    #[cfg(test)]
    fn with_bundled_dir(mut self, dir: PathBuf) -> Self {
        self.bundled_dir = Some(dir);
        self
    }

    /// Probe every tool and take the capability snapshot.
    pub async fn locate(&self) -> ToolCapabilities {
        let mut capabilities = ToolCapabilities {
            java: self.locate_java(),
            vulndb_cache: self.locate_vulndb(),
            ..Default::default()
        };

        for kind in ToolKind::ALL {
            let status = match kind {
                ToolKind::EvolutionAnalyzer => self.locate_evolution(&capabilities),
                _ => self.locate_binary(kind).await,
            };
            match &status {
                ToolStatus::Found { path, .. } => {
                    debug!("{} resolved to {}", kind.id(), path.display());
                }
                ToolStatus::Missing { reason } => {
                    warn!("{} unavailable: {}", kind.id(), reason);
                }
            }
            capabilities.tools.insert(kind, status);
        }
        capabilities
    }

    async fn locate_binary(&self, kind: ToolKind) -> ToolStatus {
        let Some(path) = self.probe(kind.artifact_name()) else {
            return ToolStatus::Missing {
                reason: format!("{} not found in bundled tools or PATH", kind.artifact_name()),
            };
        };
        let version = cheap_version(&path).await;
        ToolStatus::Found { path, version }
    }

    /// The evolution analyzer is a jar: it needs both the jar file and a
    /// java executable.
    fn locate_evolution(&self, capabilities: &ToolCapabilities) -> ToolStatus {
        let jar = self
            .jar_override
            .clone()
            .filter(|p| p.is_file())
            .or_else(|| {
                self.bundled_dir
                    .as_ref()
                    .map(|d| d.join(ToolKind::EvolutionAnalyzer.artifact_name()))
                    .filter(|p| p.is_file())
            });

        match (jar, &capabilities.java) {
            (Some(jar), Some(_)) => ToolStatus::Found { path: jar, version: None },
            (None, _) => ToolStatus::Missing {
                reason: "analyzer jar not found (bundled tools or --jar)".to_string(),
            },
            (_, None) => ToolStatus::Missing {
                reason: "java executable not found".to_string(),
            },
        }
    }

    fn locate_java(&self) -> Option<PathBuf> {
        self.java_override
            .clone()
            .filter(|p| p.is_file())
            .or_else(|| which::which("java").ok())
    }

    fn locate_vulndb(&self) -> Option<PathBuf> {
        self.vulndb_override
            .clone()
            .filter(|p| p.is_dir())
            .or_else(|| {
                self.bundled_dir
                    .as_ref()
                    .map(|d| d.join("vulndb-cache"))
                    .filter(|p| p.is_dir())
            })
    }

    fn probe(&self, name: &str) -> Option<PathBuf> {
        if let Some(dir) = &self.bundled_dir {
            let candidate = dir.join(name);
            if is_executable(&candidate) {
                return Some(candidate);
            }
            #[cfg(windows)]
            {
                let candidate = dir.join(format!("{name}.exe"));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        which::which(name).ok()
    }
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// First line of `<tool> --version`, bounded to five seconds.
async fn cheap_version(path: &Path) -> Option<String> {
    let spec = CommandSpec {
        program: path.to_path_buf(),
        args: vec!["--version".to_string()],
        cwd: None,
        timeout: Duration::from_secs(5),
    };
    let outcome = run_command(&spec, Duration::from_secs(1)).await.ok()?;
    if !outcome.success() {
        return None;
    }
    String::from_utf8_lossy(&outcome.stdout)
        .lines()
        .next()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}

// ---------------------------------------------------------------------------
// Process harness

/// One child-process invocation with its wall-clock bound.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandSpec {
    /// Rendered command line for the diagnostics sidecar.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(' ') {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

#[derive(Debug)]
pub struct CommandOutcome {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
    pub timed_out: bool,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

fn soft_kill(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SIGTERM first; the hard kill follows after the grace window.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            return;
        }
        let _ = child.start_kill();
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }
}

/// Run a child process with captured stdout/stderr and the escalating
/// kill sequence on timeout: soft signal, grace window, hard kill. The
/// child never shares descriptors with its siblings.
pub async fn run_command(spec: &CommandSpec, grace: Duration) -> crate::Result<CommandOutcome> {
    let start = Instant::now();

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    let mut child = command.spawn().map_err(|e| crate::Error::ExternalTool {
        tool: spec.program.display().to_string(),
        message: format!("failed to spawn: {e}"),
    })?;

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = stdout_pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = stderr_pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    });

    let mut timed_out = false;
    let status = tokio::select! {
        status = child.wait() => status.ok(),
        _ = tokio::time::sleep(spec.timeout) => {
            timed_out = true;
            soft_kill(&mut child);
            tokio::select! {
                status = child.wait() => status.ok(),
                _ = tokio::time::sleep(grace) => {
                    let _ = child.start_kill();
                    child.wait().await.ok()
                }
            }
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(CommandOutcome {
        exit_code: status.and_then(|s| s.code()),
        stdout,
        stderr,
        duration: start.elapsed(),
        timed_out,
    })
}

// ---------------------------------------------------------------------------
// Runner contract

/// Uniform runner state machine shared by all four analyzers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunnerStatus {
    /// Tool absent; skipped immediately.
    NotApplicable,
    Pending,
    Running,
    /// Zero exit, output parsed and validated non-empty.
    Ok,
    /// Non-zero exit, empty or malformed output.
    Failed,
    TimedOut,
}

impl RunnerStatus {
    pub fn to_stage_status(self) -> StageStatus {
        match self {
            RunnerStatus::Ok => StageStatus::Ok,
            RunnerStatus::NotApplicable | RunnerStatus::Pending | RunnerStatus::Running => {
                StageStatus::Skipped
            }
            RunnerStatus::Failed => StageStatus::Failed,
            RunnerStatus::TimedOut => StageStatus::TimedOut,
        }
    }
}

/// Result of one runner, with its sidecar diagnostics.
#[derive(Debug)]
pub struct RunnerReport<T> {
    pub status: RunnerStatus,
    pub output: Option<T>,
    pub error: Option<String>,
    pub duration: Duration,
}

impl<T> RunnerReport<T> {
    pub fn not_applicable(reason: &str) -> Self {
        Self {
            status: RunnerStatus::NotApplicable,
            output: None,
            error: Some(reason.to_string()),
            duration: Duration::ZERO,
        }
    }
}

/// Sidecar diagnostics written next to each runner's output. Required
/// for reproducibility, not optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerDiagnostics {
    pub command: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub stderr_tail: String,
}

impl RunnerDiagnostics {
    pub fn from_outcome(spec: &CommandSpec, outcome: &CommandOutcome) -> Self {
        Self {
            command: spec.command_line(),
            exit_code: outcome.exit_code,
            duration_ms: outcome.duration.as_millis() as u64,
            timed_out: outcome.timed_out,
            stderr_tail: gitscope_utils::text::tail(outcome.stderr_text().trim(), 2048),
        }
    }

    /// Write `<stage>.diag.json` into the repository output directory.
    pub fn write(&self, output_dir: &Path, stage: &str) -> crate::Result<()> {
        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join(format!("{stage}.diag.json"));
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Shared inputs every runner receives from the pipeline context.
#[derive(Debug, Clone)]
pub struct RunnerContext {
    pub repo: PathBuf,
    pub output_dir: PathBuf,
    pub timeouts: crate::config::TimeoutConfig,
}

impl RunnerContext {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.timeouts.kill_grace_secs)
    }
}

/// Base contract for the external analyzer runners.
#[async_trait::async_trait]
pub trait AnalyzerRunner {
    type Output: Serialize;

    fn tool_kind(&self) -> ToolKind;

    /// Stage name used in the manifest and diagnostics sidecars.
    fn stage_name(&self) -> &'static str;

    /// Run the analysis, honoring the runner state machine.
    async fn run(
        &self,
        ctx: &RunnerContext,
        capabilities: &ToolCapabilities,
    ) -> RunnerReport<Self::Output>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quotes_spaced_args() {
        let spec = CommandSpec {
            program: PathBuf::from("/usr/bin/tool"),
            args: vec!["--path".to_string(), "my repo".to_string()],
            cwd: None,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(spec.command_line(), "/usr/bin/tool --path \"my repo\"");
    }

    #[test]
    fn test_runner_status_maps_to_stage_status() {
        assert_eq!(RunnerStatus::Ok.to_stage_status(), StageStatus::Ok);
        assert_eq!(RunnerStatus::NotApplicable.to_stage_status(), StageStatus::Skipped);
        assert_eq!(RunnerStatus::Failed.to_stage_status(), StageStatus::Failed);
        assert_eq!(RunnerStatus::TimedOut.to_stage_status(), StageStatus::TimedOut);
    }

    #[tokio::test]
    async fn test_locator_reports_missing_tools() {
        let tmp = tempfile::tempdir().unwrap();
        // Empty bundled dir and (almost certainly) no scc/lizard/trivy in
        // a bare test environment is fine: absence must be explicit, not
        // an error.
        let locator = ToolLocator::new(None, None, Some(tmp.path().to_path_buf()))
            .with_bundled_dir(tmp.path().join("tools"));
        let caps = locator.locate().await;

        for kind in ToolKind::ALL {
            match caps.status(kind) {
                ToolStatus::Found { path, .. } => assert!(path.exists()),
                ToolStatus::Missing { reason } => assert!(!reason.is_empty()),
            }
        }
        let snapshot = caps.snapshot();
        assert_eq!(snapshot.len(), 4);
    }

    #[tokio::test]
    async fn test_jar_override_without_file_is_missing() {
        let locator = ToolLocator::new(
            Some(PathBuf::from("/no/such/code-maat.jar")),
            None,
            None,
        );
        let caps = locator.locate().await;
        assert!(caps.path(ToolKind::EvolutionAnalyzer).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_captures_output() {
        let spec = CommandSpec {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), "echo out; echo err >&2".to_string()],
            cwd: None,
            timeout: Duration::from_secs(10),
        };
        let outcome = run_command(&spec, Duration::from_secs(1)).await.unwrap();
        assert!(outcome.success());
        assert_eq!(String::from_utf8_lossy(&outcome.stdout).trim(), "out");
        assert_eq!(outcome.stderr_text().trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_times_out_and_kills() {
        let spec = CommandSpec {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), "sleep 30".to_string()],
            cwd: None,
            timeout: Duration::from_millis(100),
        };
        let outcome = run_command(&spec, Duration::from_millis(200)).await.unwrap();
        assert!(outcome.timed_out);
        assert!(!outcome.success());
        assert!(outcome.duration < Duration::from_secs(10));
    }

    #[test]
    fn test_diagnostics_sidecar_written() {
        let tmp = tempfile::tempdir().unwrap();
        let diag = RunnerDiagnostics {
            command: "tool --flag".to_string(),
            exit_code: Some(1),
            duration_ms: 42,
            timed_out: false,
            stderr_tail: "boom".to_string(),
        };
        diag.write(tmp.path(), "vulnerability").unwrap();

        let raw = std::fs::read_to_string(tmp.path().join("vulnerability.diag.json")).unwrap();
        let parsed: RunnerDiagnostics = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.exit_code, Some(1));
        assert_eq!(parsed.stderr_tail, "boom");
    }
}
