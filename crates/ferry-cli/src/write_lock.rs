//! Pid lock file held while this process runs the engine.
//!
//! Only one process may dispatch runs against a project database at a time;
//! a second `ferry run` waits for the first, then gives up.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Removes the lock file on drop.
#[derive(Debug)]
pub struct EngineLock {
    path: PathBuf,
}

impl Drop for EngineLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Holder {
    Process(u32),
    Stale,
    Unreadable,
}

pub async fn acquire(lock_path: &Path) -> anyhow::Result<EngineLock> {
    let started = Instant::now();

    loop {
        let holder = match try_acquire(lock_path) {
            Ok(lock) => return Ok(lock),
            Err(holder) => holder,
        };

        if holder == Holder::Stale {
            tracing::warn!(path = %lock_path.display(), "removing stale engine lock");
            let _ = std::fs::remove_file(lock_path);
            continue;
        }

        if started.elapsed() >= LOCK_WAIT_TIMEOUT {
            match holder {
                Holder::Process(pid) => anyhow::bail!(
                    "another ferry engine is running (pid {pid}); try again after it finishes"
                ),
                Holder::Stale | Holder::Unreadable => anyhow::bail!(
                    "could not acquire engine lock at {}; remove it if no ferry process is running",
                    lock_path.display()
                ),
            }
        }
        tokio::time::sleep(LOCK_RETRY_DELAY).await;
    }
}

fn try_acquire(lock_path: &Path) -> Result<EngineLock, Holder> {
    if let Some(parent) = lock_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(lock_path)
    {
        Ok(mut file) => {
            let _ = writeln!(file, "{}", std::process::id());
            Ok(EngineLock {
                path: lock_path.to_path_buf(),
            })
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            let pid = std::fs::read_to_string(lock_path)
                .ok()
                .and_then(|contents| contents.trim().parse::<u32>().ok());
            Err(match pid {
                Some(pid) if is_process_running(pid) => Holder::Process(pid),
                Some(_) => Holder::Stale,
                None => Holder::Unreadable,
            })
        }
        Err(_) => Err(Holder::Unreadable),
    }
}

fn is_process_running(pid: u32) -> bool {
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

#[cfg(test)]
mod tests {
    use super::{Holder, acquire, try_acquire};

    #[test]
    fn lock_file_is_removed_on_drop() {
        let temp = tempfile::tempdir().expect("tempdir should create");
        let lock_path = temp.path().join(".ferry/engine.lock");

        let lock = try_acquire(&lock_path).expect("lock should acquire");
        let contents = std::fs::read_to_string(&lock_path).expect("lock should read");
        assert_eq!(contents.trim(), std::process::id().to_string());
        drop(lock);
        assert!(!lock_path.exists());
    }

    #[test]
    fn live_holder_blocks_a_second_acquire() {
        let temp = tempfile::tempdir().expect("tempdir should create");
        let lock_path = temp.path().join("engine.lock");

        let _held = try_acquire(&lock_path).expect("lock should acquire");
        let second = try_acquire(&lock_path).expect_err("second acquire should fail");
        assert_eq!(second, Holder::Process(std::process::id()));
    }

    #[tokio::test]
    async fn stale_lock_is_taken_over() {
        let temp = tempfile::tempdir().expect("tempdir should create");
        let lock_path = temp.path().join("engine.lock");
        // Far above any default pid_max.
        std::fs::write(&lock_path, "999999999\n").expect("lock should write");

        let lock = acquire(&lock_path).await.expect("stale lock should be replaced");
        let contents = std::fs::read_to_string(&lock_path).expect("lock should read");
        assert_eq!(contents.trim(), std::process::id().to_string());
        drop(lock);
    }
}
