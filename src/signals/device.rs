use std::path::{Path, PathBuf};

use log::debug;

use super::DeviceActivitySignal;

const DEFAULT_PROC_ROOT: &str = "/proc";
const CAPTURE_RUNNING: &str = "state: RUNNING";
const VIDEO_DEVICE_PREFIX: &str = "/dev/video";

/// Reads capture activity out of procfs: ALSA capture substreams for the
/// microphone and open `/dev/video*` descriptors for the camera.
#[derive(Debug, Clone)]
pub struct ProcDeviceActivity {
    root: PathBuf,
}

impl Default for ProcDeviceActivity {
    fn default() -> Self {
        Self::with_root(DEFAULT_PROC_ROOT)
    }
}

fn entries_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .map(|entry| entry.path())
        .collect()
}

impl ProcDeviceActivity {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        ProcDeviceActivity { root: root.into() }
    }

    /// Any ALSA capture substream (`pcm*c`) currently running.
    pub fn microphone_in_use(&self) -> bool {
        entries_with_prefix(&self.root.join("asound"), "card")
            .iter()
            .flat_map(|card| entries_with_prefix(card, "pcm"))
            .filter(|pcm| pcm.to_string_lossy().ends_with('c'))
            .flat_map(|pcm| entries_with_prefix(&pcm, "sub"))
            .any(|sub| {
                std::fs::read_to_string(sub.join("status"))
                    .map(|status| status.contains(CAPTURE_RUNNING))
                    .unwrap_or(false)
            })
    }

    /// Any process holding a video device open. Processes we cannot inspect
    /// are skipped.
    pub fn camera_in_use(&self) -> bool {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return false;
        };

        entries
            .flatten()
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.parse::<u32>().is_ok())
            })
            .any(|entry| {
                let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
                    return false;
                };
                fds.flatten().any(|fd| {
                    std::fs::read_link(fd.path())
                        .map(|target| target.to_string_lossy().starts_with(VIDEO_DEVICE_PREFIX))
                        .unwrap_or(false)
                })
            })
    }
}

impl DeviceActivitySignal for ProcDeviceActivity {
    fn query(&self) -> bool {
        let microphone = self.microphone_in_use();
        let camera = !microphone && self.camera_in_use();
        debug!("Device activity: microphone={} camera={}", microphone, camera);
        microphone || camera
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_status(root: &Path, pcm: &str, status: &str) {
        let dir = root.join("asound/card0").join(pcm).join("sub0");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("status"), status).unwrap();
    }

    #[test]
    fn test_running_capture_stream_counts() {
        let root = tempfile::tempdir().unwrap();
        write_status(root.path(), "pcm0c", "state: RUNNING\nowner_pid   : 4242\n");

        let signal = ProcDeviceActivity::with_root(root.path());
        assert!(signal.microphone_in_use());
        assert!(signal.query());
    }

    #[test]
    fn test_playback_and_closed_streams_do_not_count() {
        let root = tempfile::tempdir().unwrap();
        write_status(root.path(), "pcm0p", "state: RUNNING\n");
        write_status(root.path(), "pcm1c", "closed\n");

        let signal = ProcDeviceActivity::with_root(root.path());
        assert!(!signal.microphone_in_use());
        assert!(!signal.query());
    }

    #[cfg(unix)]
    #[test]
    fn test_open_video_descriptor_counts() {
        let root = tempfile::tempdir().unwrap();
        let fd_dir = root.path().join("1234/fd");
        std::fs::create_dir_all(&fd_dir).unwrap();
        std::os::unix::fs::symlink("/dev/null", fd_dir.join("0")).unwrap();

        let signal = ProcDeviceActivity::with_root(root.path());
        assert!(!signal.camera_in_use());

        std::os::unix::fs::symlink("/dev/video0", fd_dir.join("7")).unwrap();
        assert!(signal.camera_in_use());
        assert!(signal.query());
    }

    #[test]
    fn test_missing_procfs_is_quiet() {
        let signal = ProcDeviceActivity::with_root("/definitely/not/a/procfs");
        assert!(!signal.query());
    }
}
