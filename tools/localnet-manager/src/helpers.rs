// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use crate::error::LocalnetError;
use console::{style, StyledObject};
use indicatif::{HumanDuration, ProgressBar};
use rand::distributions::Uniform;
use rand::Rng;
use std::borrow::Cow;
use std::fs;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::pin;
use tokio::time::interval;
use tracing::trace;

const SPINNER_TICK: Duration = Duration::from_millis(80);

pub(crate) trait ProgressCtx {
    fn progress_tracker(&self) -> &ProgressTracker;

    fn println<I: AsRef<str>>(&self, msg: I) {
        self.progress_tracker().println(msg)
    }

    fn set_pb_message(&self, msg: impl Into<Cow<'static, str>>) {
        self.progress_tracker().set_pb_message(msg)
    }

    async fn async_with_progress<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        self.progress_tracker().spin_until(fut).await
    }
}

/// Spinner shown for the duration of a single localnet operation.
/// A hidden tracker swallows all output, which is what the quiet mode and the tests rely on.
pub(crate) struct ProgressTracker {
    start: Instant,
    progress_bar: ProgressBar,
}

impl ProgressTracker {
    pub(crate) fn new<I: AsRef<str>>(msg: I) -> Self {
        let progress_bar = ProgressBar::new_spinner();
        progress_bar.println(msg);

        ProgressTracker {
            start: Instant::now(),
            progress_bar,
        }
    }

    pub(crate) fn hidden() -> Self {
        ProgressTracker {
            start: Instant::now(),
            progress_bar: ProgressBar::hidden(),
        }
    }

    pub(crate) fn println<I: AsRef<str>>(&self, msg: I) {
        self.progress_bar.println(msg)
    }

    pub(crate) fn set_pb_message(&self, msg: impl Into<Cow<'static, str>>) {
        self.progress_bar.set_message(msg)
    }

    /// Keeps the spinner moving while the future is being polled.
    pub(crate) async fn spin_until<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        self.progress_bar.tick();
        pin!(fut);
        let mut ticks = interval(SPINNER_TICK);

        loop {
            tokio::select! {
                res = &mut fut => return res,
                _ = ticks.tick() => self.progress_bar.tick(),
            }
        }
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        if !self.progress_bar.is_hidden() {
            self.progress_bar.println(format!(
                "✨ Done in {}",
                HumanDuration(self.start.elapsed())
            ));
        }
        self.progress_bar.finish_and_clear();
    }
}

pub(crate) fn step(current: usize, total: usize) -> StyledObject<String> {
    style(format!("[{current}/{total}] ")).bold().dim()
}

pub(crate) fn init_path<P: AsRef<Path>>(path: P) -> Result<(), LocalnetError> {
    let path = path.as_ref();
    trace!("initialising {}", path.display());

    fs::create_dir_all(path).map_err(|source| LocalnetError::PathInitFailure {
        path: path.to_path_buf(),
        source,
    })
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces the content of the file at `path` so that readers never observe a partial write.
pub(crate) fn write_atomically<P: AsRef<Path>>(path: P, content: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temporary_sibling(path);
    let mut file = fs::File::create(&tmp)?;
    file.write_all(content)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}

/// Random lowercase identifier used for throwaway subnet metadata.
pub(crate) fn random_identifier(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(Uniform::new_inclusive(b'a', b'z'))
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_identifiers_are_lowercase_letters() {
        for _ in 0..20 {
            let id = random_identifier(5);
            assert_eq!(id.len(), 5);
            assert!(id.chars().all(|c| c.is_ascii_lowercase()));
        }
    }

    #[tokio::test]
    async fn hidden_trackers_still_drive_futures() {
        let tracker = ProgressTracker::hidden();
        let value = tracker
            .spin_until(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                42
            })
            .await;
        assert_eq!(value, 42);
    }

    #[test]
    fn atomic_writes_replace_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_atomically(&path, b"first").unwrap();
        write_atomically(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!temporary_sibling(&path).exists());
    }
}
