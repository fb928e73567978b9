use log::info;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared presence flag for the emulated SD medium. Cheap to clone; read by
/// the volume on every mount.
#[derive(Debug, Clone)]
pub struct MediaState(Arc<AtomicBool>);

impl MediaState {
    pub fn present(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Watches the SD root directory so that removing or re-inserting the medium
/// (deleting or recreating the directory) is picked up without polling. The
/// watcher thread only ever touches the shared atomic flag.
pub struct MediaMonitor {
    _watcher: RecommendedWatcher,
    state: MediaState,
}

impl MediaMonitor {
    pub fn new(root: impl Into<PathBuf>) -> notify::Result<Self> {
        let root: PathBuf = root.into();
        let flag = Arc::new(AtomicBool::new(root.is_dir()));

        let watched_root = root.clone();
        let watcher_flag = Arc::clone(&flag);
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            let relevant = matches!(
                event.map(|e| e.kind),
                Ok(EventKind::Create(_)) | Ok(EventKind::Remove(_)) | Ok(EventKind::Modify(_))
            );
            if relevant {
                let present = watched_root.is_dir();
                if watcher_flag.swap(present, Ordering::Relaxed) != present {
                    info!(
                        "SD medium '{}' {}.",
                        watched_root.display(),
                        if present { "inserted" } else { "removed" }
                    );
                }
            }
        })?;

        // Watch the parent so removal of the root itself is observed; fall
        // back to the root when it has no usable parent.
        let watch_target = root
            .parent()
            .filter(|p| p.is_dir())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.clone());
        watcher.watch(&watch_target, RecursiveMode::NonRecursive)?;

        Ok(MediaMonitor {
            _watcher: watcher,
            state: MediaState(flag),
        })
    }

    pub fn state(&self) -> MediaState {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_test_logging;
    use ntest::timeout;
    use std::fs;
    use std::time::{Duration, Instant};

    fn wait_for(state: &MediaState, present: bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while state.present() != present {
            assert!(Instant::now() < deadline, "media state never became {}", present);
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    #[timeout(10000)]
    fn test_detects_removal_and_insertion() {
        init_test_logging();
        let temp_dir = tempfile::tempdir().unwrap();
        let card = temp_dir.path().join("card");
        fs::create_dir(&card).unwrap();

        let monitor = MediaMonitor::new(&card).unwrap();
        let state = monitor.state();
        assert!(state.present());

        fs::remove_dir(&card).unwrap();
        wait_for(&state, false);

        fs::create_dir(&card).unwrap();
        wait_for(&state, true);
    }

    #[test]
    fn test_absent_root_starts_not_present() {
        init_test_logging();
        let temp_dir = tempfile::tempdir().unwrap();
        let monitor = MediaMonitor::new(temp_dir.path().join("missing")).unwrap();
        assert!(!monitor.state().present());
    }
}
