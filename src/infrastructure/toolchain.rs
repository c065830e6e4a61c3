/// Binutils Collaborator Runner.
///
/// Runs the three external tools the analysis depends on:
/// - `nm`: symbol listing
/// - `objdump`: disassembly listing
/// - `addr2line`: per-address source lookup
///
/// Every invocation is bounded by a timeout; an expired child is killed.

use crate::common::ToolError;
use crate::domain::symbol_table::Address;
use crate::infrastructure::config::ToolsConfig;
use crate::ports::AddressLookup;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

// ═══════════════════════════════════════════════════════════════════════════
// Command Specs
// ═══════════════════════════════════════════════════════════════════════════

/// Describes a command without running it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

pub fn nm_command(tool: &str, binary: &Path) -> CommandSpec {
    CommandSpec {
        program: tool.to_string(),
        args: vec![
            "-C".to_string(),
            "--defined-only".to_string(),
            "-n".to_string(),
            binary.display().to_string(),
        ],
    }
}

pub fn objdump_command(tool: &str, binary: &Path) -> CommandSpec {
    CommandSpec {
        program: tool.to_string(),
        args: vec!["-d".to_string(), "-C".to_string(), binary.display().to_string()],
    }
}

pub fn addr2line_command(tool: &str, binary: &Path, address: Address) -> CommandSpec {
    CommandSpec {
        program: tool.to_string(),
        args: vec![
            "-f".to_string(),
            "-C".to_string(),
            "-e".to_string(),
            binary.display().to_string(),
            address.to_string(),
        ],
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Execution
// ═══════════════════════════════════════════════════════════════════════════

/// Run `spec` to completion and return its stdout, or fail once `timeout`
/// elapses.
pub fn run_with_timeout(spec: &CommandSpec, timeout: Duration) -> Result<String, ToolError> {
    let tool = spec.program.clone();
    let deadline = Instant::now() + timeout;
    debug!(program = %spec.program, args = ?spec.args, "spawning collaborator");

    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ToolError::Spawn {
            tool: tool.clone(),
            source,
        })?;

    let stderr_reader = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    });

    let (tx, rx) = mpsc::channel();
    let stdout = child.stdout.take();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = stdout {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });

    let timed_out = || ToolError::TimedOut {
        tool: tool.clone(),
        timeout,
    };

    let stdout = match rx.recv_timeout(timeout) {
        Ok(buf) => buf,
        Err(_) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(timed_out());
        }
    };

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(5)),
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(timed_out());
            }
            Err(source) => {
                return Err(ToolError::Spawn {
                    tool: tool.clone(),
                    source,
                })
            }
        }
    };

    if !status.success() {
        let stderr = stderr_reader
            .and_then(|h| h.join().ok())
            .map(|buf| String::from_utf8_lossy(&buf).trim().to_string())
            .unwrap_or_default();
        return Err(ToolError::Failed {
            tool,
            code: status.code(),
            stderr,
        });
    }

    String::from_utf8(stdout).map_err(|_| ToolError::InvalidOutput { tool })
}

// ═══════════════════════════════════════════════════════════════════════════
// Toolchain
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Toolchain {
    pub nm: String,
    pub objdump: String,
    pub addr2line: String,
    pub timeout: Duration,
}

impl Toolchain {
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self {
            nm: tools.nm.clone(),
            objdump: tools.objdump.clone(),
            addr2line: tools.addr2line.clone(),
            timeout: Duration::from_millis(tools.timeout_ms),
        }
    }

    /// Fail with [`ToolError::NotFound`] for the first tool missing from `PATH`.
    pub fn check_available<'t, I>(tools: I) -> Result<(), ToolError>
    where
        I: IntoIterator<Item = &'t str>,
    {
        for tool in tools {
            match which::which(tool) {
                Ok(path) => debug!(tool, path = %path.display(), "found collaborator"),
                Err(_) => {
                    return Err(ToolError::NotFound {
                        tool: tool.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    pub fn symbol_listing(&self, binary: &Path) -> Result<String, ToolError> {
        run_with_timeout(&nm_command(&self.nm, binary), self.timeout)
    }

    pub fn disassembly(&self, binary: &Path) -> Result<String, ToolError> {
        run_with_timeout(&objdump_command(&self.objdump, binary), self.timeout)
    }

    pub fn addr2line(&self, binary: &Path) -> Addr2Line {
        Addr2Line {
            tool: self.addr2line.clone(),
            binary: binary.to_path_buf(),
            timeout: self.timeout,
        }
    }
}

/// [`AddressLookup`] backed by one `addr2line` process per address.
#[derive(Debug, Clone)]
pub struct Addr2Line {
    tool: String,
    binary: PathBuf,
    timeout: Duration,
}

impl AddressLookup for Addr2Line {
    fn lookup(&self, address: Address) -> Result<String, ToolError> {
        run_with_timeout(
            &addr2line_command(&self.tool, &self.binary, address),
            self.timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[test]
    fn test_command_specs() {
        let bin = Path::new("/tmp/fw.elf");
        let nm = nm_command("riscv32-unknown-elf-nm", bin);
        assert_eq!(nm.args, vec!["-C", "--defined-only", "-n", "/tmp/fw.elf"]);
        let objdump = objdump_command("objdump", bin);
        assert_eq!(objdump.args, vec!["-d", "-C", "/tmp/fw.elf"]);
        let a2l = addr2line_command("addr2line", bin, Address(0x8000_01c8));
        assert_eq!(a2l.args.last().map(String::as_str), Some("0x800001c8"));
        assert!(a2l.args.contains(&"-f".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_stdout() {
        let out = run_with_timeout(&sh("echo main; echo /src/main.c:3"), Duration::from_secs(5)).unwrap();
        assert_eq!(out, "main\n/src/main.c:3\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_reports_exit_code() {
        let err = run_with_timeout(&sh("echo oops >&2; exit 3"), Duration::from_secs(5)).unwrap_err();
        match err {
            ToolError::Failed { tool, code, stderr } => {
                assert_eq!(tool, "sh");
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_times_out() {
        let started = Instant::now();
        let err = run_with_timeout(&sh("sleep 5"), Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_program() {
        let spec = CommandSpec {
            program: "definitely-not-a-real-tool-xyz".to_string(),
            args: vec![],
        };
        let err = run_with_timeout(&spec, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
        let err = Toolchain::check_available(["definitely-not-a-real-tool-xyz"]).unwrap_err();
        assert_eq!(err.tool(), "definitely-not-a-real-tool-xyz");
    }
}
