use std::io::Read as _;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::ForegroundAppSignal;

const WAIT_STEP: Duration = Duration::from_millis(20);

/// Resolves the frontmost application by running a helper program and reading
/// its stdout (a bundle id on macOS, a window class on X11).
#[derive(Debug, Clone)]
pub struct CommandForegroundApp {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

#[cfg(target_os = "macos")]
fn platform_command() -> Vec<String> {
    vec![
        "osascript".to_string(),
        "-e".to_string(),
        "id of application (path to frontmost application as text)".to_string(),
    ]
}

#[cfg(not(target_os = "macos"))]
fn platform_command() -> Vec<String> {
    vec![
        "xdotool".to_string(),
        "getactivewindow".to_string(),
        "getwindowclassname".to_string(),
    ]
}

impl CommandForegroundApp {
    /// `command` is the program followed by its arguments. An empty or missing
    /// command selects the platform default.
    pub fn new(command: Option<Vec<String>>, timeout: Duration) -> Self {
        let mut command = command
            .filter(|command| !command.is_empty())
            .unwrap_or_else(platform_command)
            .into_iter();
        let program = command.next().unwrap_or_default();

        CommandForegroundApp {
            program,
            args: command.collect(),
            timeout,
        }
    }

    fn run(&self) -> anyhow::Result<Option<String>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        // Drain stdout concurrently so a chatty helper cannot stall on a full pipe.
        let reader = child.stdout.take().map(|mut stdout| {
            std::thread::spawn(move || {
                let mut output = Vec::new();
                stdout.read_to_end(&mut output).map(|_| output)
            })
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                anyhow::bail!("`{}` timed out after {:?}", self.program, self.timeout);
            }
            std::thread::sleep(WAIT_STEP);
        };

        if !status.success() {
            debug!("`{}` exited with {}", self.program, status);
            return Ok(None);
        }

        let output = match reader {
            Some(reader) => reader
                .join()
                .map_err(|_| anyhow::anyhow!("stdout reader for `{}` panicked", self.program))??,
            None => Vec::new(),
        };

        let identifier = String::from_utf8_lossy(&output).trim().to_string();
        Ok((!identifier.is_empty()).then_some(identifier))
    }
}

impl ForegroundAppSignal for CommandForegroundApp {
    fn query(&self) -> Option<String> {
        match self.run() {
            Ok(app) => app,
            Err(err) => {
                warn!("Could not resolve frontmost application: {}", err);
                None
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> CommandForegroundApp {
        CommandForegroundApp::new(
            Some(vec!["sh".to_string(), "-c".to_string(), script.to_string()]),
            Duration::from_secs(2),
        )
    }

    #[test]
    fn test_reads_trimmed_identifier() {
        assert_eq!(shell("echo '  us.zoom.xos  '").query().as_deref(), Some("us.zoom.xos"));
    }

    #[test]
    fn test_failure_and_empty_output_resolve_to_none() {
        assert_eq!(shell("exit 3").query(), None);
        assert_eq!(shell("printf ''").query(), None);
    }

    #[test]
    fn test_missing_program_resolves_to_none() {
        let signal = CommandForegroundApp::new(
            Some(vec!["no-such-foreground-helper".to_string()]),
            Duration::from_secs(1),
        );
        assert_eq!(signal.query(), None);
    }

    #[test]
    fn test_slow_helper_is_killed() {
        let signal = CommandForegroundApp::new(
            Some(vec!["sleep".to_string(), "5".to_string()]),
            Duration::from_millis(100),
        );
        let started = Instant::now();
        assert_eq!(signal.query(), None);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_output_larger_than_pipe_buffer_is_read() {
        let signal = shell("head -c 200000 /dev/zero | tr '\\0' 'a'; echo");
        let identifier = signal.query().unwrap();
        assert_eq!(identifier.len(), 200_000);
        assert!(identifier.bytes().all(|b| b == b'a'));
    }

    #[test]
    fn test_empty_command_uses_platform_default() {
        let signal = CommandForegroundApp::new(Some(Vec::new()), Duration::from_secs(1));
        assert!(!signal.program.is_empty());
    }
}
