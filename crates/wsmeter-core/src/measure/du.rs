//! `du`-backed size measurement.

use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, trace};

use crate::fmt::format_bytes;
use crate::measure::traits::{MeasureError, SizeMeasurer};

/// Default limit for a single `du` invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Arguments passed to `du` before the target path.
///
/// apparent size, in bytes, never follow symlinks, stay on one
/// filesystem, summary total only.
const DU_ARGS: [&str; 5] = ["--apparent-size", "-b", "-P", "-x", "-s"];

/// Measures subtree size by running `du`.
///
/// `du` is mature, fast on trees with many files, and already handles
/// sparse files, hard links and mount boundaries, which outweighs the
/// cost of one process per workspace.
#[derive(Debug, Clone)]
pub struct DuMeasurer {
    program: String,
    timeout: Duration,
}

impl Default for DuMeasurer {
    fn default() -> Self {
        Self::new()
    }
}

impl DuMeasurer {
    /// Creates a measurer running `du` from `PATH` with the default timeout.
    pub fn new() -> Self {
        Self {
            program: "du".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Uses a different `du` binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Overrides the per-invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the configured `du` binary.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the per-invocation timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(DU_ARGS).arg("--").arg(path);
        cmd
    }
}

impl SizeMeasurer for DuMeasurer {
    fn measure(&self, path: &Path) -> Result<u64, MeasureError> {
        trace!("Running {} on {}", self.program, path.display());

        let stdout = run_captured(self.command(path), &self.program, path, self.timeout)
            .inspect_err(|e| error!("Failed to calculate size of {}: {}", path.display(), e))?;

        // `<number>\t<path>\n`; anything else is an error reported by du.
        let size = parse_du_output(&stdout).inspect_err(|_| {
            error!(
                "Failed to calculate size of {} (output not int): {:?}",
                path.display(),
                stdout
            )
        })?;

        debug!(
            "Size of {} was {} ({})",
            path.display(),
            size,
            format_bytes(size)
        );
        Ok(size)
    }
}

/// Parses the summary line printed by `du -s -b`.
///
/// Only the first tab-separated field is considered; it must be a
/// non-negative decimal integer.
pub fn parse_du_output(stdout: &str) -> Result<u64, MeasureError> {
    let field = stdout.split('\t').next().unwrap_or_default().trim();
    field.parse::<u64>().map_err(|_| MeasureError::Unparsable {
        stdout: stdout.to_string(),
    })
}

/// Runs `cmd` to completion with piped output, killing it after `limit`.
///
/// Returns stdout on a zero exit status. A `limit` too large to add to the
/// current instant means no deadline.
fn run_captured(
    mut cmd: Command,
    program: &str,
    path: &Path,
    limit: Duration,
) -> Result<String, MeasureError> {
    // Own process group: a terminal Ctrl-C stops the daemon between cycles
    // instead of killing the measurement in flight.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| MeasureError::Spawn {
            program: program.to_string(),
            source,
        })?;

    // Drained on helper threads so a full stderr pipe cannot stall the child.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now().checked_add(limit);
    let status: Option<ExitStatus> = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(MeasureError::Io(e));
            }
        }

        let mut nap = POLL_INTERVAL;
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                // kill() fails only if the child already exited, which wait() reaps.
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            nap = nap.min(deadline - now);
        }
        thread::sleep(nap);
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    match status {
        None => Err(MeasureError::Timeout {
            path: path.to_path_buf(),
            limit,
        }),
        Some(status) if !status.success() => Err(MeasureError::Failed { status, stderr }),
        Some(_) => Ok(stdout),
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_du_output_with_path() {
        assert_eq!(parse_du_output("4096\t/srv/ws/alice\n").unwrap(), 4096);
    }

    #[test]
    fn test_parse_du_output_zero() {
        assert_eq!(parse_du_output("0\t/empty\n").unwrap(), 0);
    }

    #[test]
    fn test_parse_du_output_path_with_tab() {
        assert_eq!(parse_du_output("12\t/odd\tname\n").unwrap(), 12);
    }

    #[test]
    fn test_parse_du_output_rejects_garbage() {
        for bad in [
            "",
            "\n",
            "du: cannot access '/nope': No such file or directory\n",
            "-5\t/x\n",
            "12.5\t/x\n",
            "abc\t/x\n",
            "99999999999999999999999\t/x\n",
        ] {
            let err = parse_du_output(bad).unwrap_err();
            assert!(
                matches!(err, MeasureError::Unparsable { .. }),
                "expected Unparsable for {:?}, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_command_arguments() {
        let du = DuMeasurer::new().with_program("/usr/bin/du");
        let cmd = du.command(Path::new("/srv/ws/alice"));
        assert_eq!(cmd.get_program(), "/usr/bin/du");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(
            args,
            [
                "--apparent-size",
                "-b",
                "-P",
                "-x",
                "-s",
                "--",
                "/srv/ws/alice"
            ]
        );
    }

    #[test]
    fn test_defaults() {
        let du = DuMeasurer::default();
        assert_eq!(du.program(), "du");
        assert_eq!(du.timeout(), Duration::from_secs(1800));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let du = DuMeasurer::new().with_program("/nonexistent/definitely-not-du");
        let err = du.measure(Path::new("/tmp")).unwrap_err();
        assert!(matches!(err, MeasureError::Spawn { .. }), "got {:?}", err);
    }

    #[cfg(target_os = "linux")]
    mod linux {
        use super::*;
        use std::fs::{self, File};
        use std::io::Write;
        use std::os::unix::fs::symlink;

        use tempfile::tempdir;

        /// Apparent size of a directory or symlink entry itself.
        fn entry_size(path: &Path) -> u64 {
            fs::symlink_metadata(path).unwrap().len()
        }

        fn write_file(path: &Path, len: usize) {
            let mut fh = File::create(path).unwrap();
            fh.write_all(&b"12345678".repeat(len / 8 + 1)[..len]).unwrap();
        }

        fn write_standard_files(dir: &Path) -> u64 {
            write_file(&dir.join("500-byte-file"), 500);
            write_file(&dir.join("60000-byte-file"), 60_000);
            write_file(&dir.join("2000000-byte-file"), 2_000_000);
            2_060_500
        }

        #[test]
        fn test_measure_empty_directory() {
            let dir = tempdir().unwrap();
            let size = DuMeasurer::new().measure(dir.path()).unwrap();
            assert_eq!(size, entry_size(dir.path()));
        }

        #[test]
        fn test_measure_files() {
            let dir = tempdir().unwrap();
            let files = write_standard_files(dir.path());

            let size = DuMeasurer::new().measure(dir.path()).unwrap();
            assert_eq!(size, entry_size(dir.path()) + files);
        }

        #[test]
        fn test_measure_only_empty_files() {
            let dir = tempdir().unwrap();
            File::create(dir.path().join("a")).unwrap();
            File::create(dir.path().join("b")).unwrap();

            let size = DuMeasurer::new().measure(dir.path()).unwrap();
            assert_eq!(size, entry_size(dir.path()));
        }

        /// `--apparent-size` reports a sparse file's logical length, not the
        /// blocks it occupies. Billing follows what `du` reports, so the
        /// expected value is the logical length even though "stored bytes"
        /// would be smaller.
        #[test]
        fn test_measure_sparse_file_reports_apparent_size() {
            let dir = tempdir().unwrap();
            let path = dir.path().join("sparse");
            let mut fh = File::create(&path).unwrap();
            fh.write_all(&[7u8; 500]).unwrap();
            fh.set_len(64 * 1024 * 1024).unwrap();
            drop(fh);

            let size = DuMeasurer::new().measure(dir.path()).unwrap();
            assert_eq!(size, entry_size(dir.path()) + fs::metadata(&path).unwrap().len());
        }

        #[test]
        fn test_measure_deep_tree() {
            let dir = tempdir().unwrap();
            let mut current = dir.path().to_path_buf();
            for level in 0..10 {
                current = current.join(format!("level{}", level));
                fs::create_dir(&current).unwrap();
            }
            write_file(&current.join("10k-file"), 10_000);
            let mut expected = entry_size(dir.path()) + 10_000;

            let mut walk = dir.path().to_path_buf();
            for level in 0..10 {
                walk = walk.join(format!("level{}", level));
                expected += entry_size(&walk);
            }

            let size = DuMeasurer::new().measure(dir.path()).unwrap();
            assert_eq!(size, expected);
        }

        #[test]
        fn test_measure_symlink_counts_link_not_target() {
            let outside = tempdir().unwrap();
            let target = outside.path().join("2000000-byte-file");
            write_file(&target, 2_000_000);

            let dir = tempdir().unwrap();
            let link = dir.path().join("link");
            symlink(&target, &link).unwrap();
            let dangling = dir.path().join("dangling");
            symlink(dir.path().join("missing"), &dangling).unwrap();

            let size = DuMeasurer::new().measure(dir.path()).unwrap();
            assert_eq!(
                size,
                entry_size(dir.path()) + entry_size(&link) + entry_size(&dangling)
            );
            assert!(size < 2_000_000);
        }

        #[test]
        fn test_measure_hard_link_not_double_counted() {
            let dir = tempdir().unwrap();
            let files = write_standard_files(dir.path());
            for name in ["500-byte-file", "60000-byte-file", "2000000-byte-file"] {
                fs::hard_link(dir.path().join(name), dir.path().join(format!("{name}-link")))
                    .unwrap();
            }

            let size = DuMeasurer::new().measure(dir.path()).unwrap();
            assert_eq!(size, entry_size(dir.path()) + files);
        }

        #[test]
        fn test_measure_missing_path_fails() {
            let dir = tempdir().unwrap();
            let err = DuMeasurer::new()
                .measure(&dir.path().join("missing"))
                .unwrap_err();
            match err {
                MeasureError::Failed { status, stderr } => {
                    assert!(!status.success());
                    assert!(!stderr.is_empty());
                }
                other => panic!("expected Failed, got {:?}", other),
            }
        }

        #[test]
        fn test_run_captured_times_out() {
            let mut cmd = Command::new("sleep");
            cmd.arg("5");
            let started = Instant::now();
            let err = run_captured(
                cmd,
                "sleep",
                Path::new("/tmp"),
                Duration::from_millis(200),
            )
            .unwrap_err();
            assert!(matches!(err, MeasureError::Timeout { .. }), "got {:?}", err);
            assert!(started.elapsed() < Duration::from_secs(4));
        }

        #[test]
        fn test_run_captured_returns_stdout() {
            let mut cmd = Command::new("echo");
            cmd.arg("42");
            let out = run_captured(cmd, "echo", Path::new("/tmp"), Duration::from_secs(5)).unwrap();
            assert_eq!(out, "42\n");
        }

        #[test]
        fn test_unbounded_timeout_still_measures() {
            let dir = tempdir().unwrap();
            let size = DuMeasurer::new()
                .with_timeout(Duration::from_secs(u64::MAX))
                .measure(dir.path())
                .unwrap();
            assert_eq!(size, entry_size(dir.path()));
        }

        #[test]
        fn test_run_captured_unbounded_timeout() {
            let mut cmd = Command::new("echo");
            cmd.arg("7");
            let out = run_captured(cmd, "echo", Path::new("/tmp"), Duration::MAX).unwrap();
            assert_eq!(out, "7\n");
        }

        #[test]
        fn test_child_runs_in_own_process_group() {
            // Prints the shell's pid and its process group id.
            let mut cmd = Command::new("sh");
            cmd.args(["-c", "echo $$ $(cut -d' ' -f5 /proc/$$/stat)"]);
            let out = run_captured(cmd, "sh", Path::new("/tmp"), Duration::from_secs(5)).unwrap();

            let fields: Vec<&str> = out.split_whitespace().collect();
            assert_eq!(fields.len(), 2, "unexpected output {:?}", out);
            assert_eq!(fields[0], fields[1]);
        }
    }
}
