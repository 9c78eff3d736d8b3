//! Job-private scratch directories and cross-volume promotion.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The scratch root. Every entry below it belongs to exactly one live job.
#[derive(Debug, Clone)]
pub struct Workspaces {
    root: PathBuf,
}

impl Workspaces {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a fresh directory for `job_id`.
    ///
    /// The directory name carries its own random component, so a retried
    /// job never reuses a previous workspace.
    pub async fn allocate(&self, job_id: Uuid) -> io::Result<Workspace> {
        let path = self.root.join(format!("{}-{}", job_id, Uuid::new_v4().simple()));
        fs::create_dir_all(&path).await?;
        debug!(path = %path.display(), "Allocated workspace");
        Ok(Workspace {
            path,
            released: false,
        })
    }

    /// Removes everything under the scratch root.
    ///
    /// Meant for process startup, before any job can own a workspace.
    pub async fn sweep(&self) -> io::Result<usize> {
        fs::create_dir_all(&self.root).await?;
        let mut entries = fs::read_dir(&self.root).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), "Failed to remove leftover scratch entry: {}", e),
            }
        }

        info!(removed, root = %self.root.display(), "Swept scratch root");
        Ok(removed)
    }
}

/// A job's scratch directory. Removed by [`Workspace::release`], or on drop
/// if the owner never got that far.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.path.join(rel)
    }

    pub async fn release(mut self) {
        self.released = true;
        match fs::remove_dir_all(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Released workspace"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to release workspace: {}", e),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Released workspace on drop"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to release workspace on drop: {}", e),
        }
    }
}

/// Copies `src` to `dst`, flushed to durable storage.
///
/// Works across volumes where a rename would not. On any failure the
/// destination is removed before the error is returned.
pub async fn promote(src: &Path, dst: &Path) -> io::Result<u64> {
    let source = File::open(src).await?;
    let written = write_durably(source, dst).await?;
    debug!(from = %src.display(), to = %dst.display(), bytes = written, "Promoted file");
    Ok(written)
}

/// Streams `reader` into a new file at `dst`, removing it again on failure.
pub async fn write_durably<R>(mut reader: R, dst: &Path) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    let result = async {
        let mut file = File::create(dst).await?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok::<_, io::Error>(written)
    }
    .await;

    if result.is_err() {
        discard(dst).await;
    }
    result
}

/// Best-effort removal of a file that must not outlive a failed job.
pub async fn discard(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Discarded file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Failed to discard file: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tempfile::TempDir;
    use tokio::io::ReadBuf;

    use super::*;

    /// Yields one chunk, then fails.
    struct BrokenReader {
        sent: bool,
    }

    impl AsyncRead for BrokenReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.sent {
                Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "disk went away")))
            } else {
                self.sent = true;
                buf.put_slice(&[7u8; 4096]);
                Poll::Ready(Ok(()))
            }
        }
    }

    #[tokio::test]
    async fn allocate_gives_distinct_dirs_for_same_job() {
        let tmp = TempDir::new().unwrap();
        let spaces = Workspaces::new(tmp.path().join("scratch"));
        let id = Uuid::new_v4();

        let a = spaces.allocate(id).await.unwrap();
        let b = spaces.allocate(id).await.unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(b.path().starts_with(spaces.root()));
    }

    #[tokio::test]
    async fn release_removes_tree() {
        let tmp = TempDir::new().unwrap();
        let spaces = Workspaces::new(tmp.path());
        let ws = spaces.allocate(Uuid::new_v4()).await.unwrap();
        let path = ws.path().to_path_buf();
        std::fs::create_dir_all(ws.join("stems/track")).unwrap();
        std::fs::write(ws.join("stems/track/drums.wav"), b"x").unwrap();

        ws.release().await;

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn drop_removes_unreleased_workspace() {
        let tmp = TempDir::new().unwrap();
        let spaces = Workspaces::new(tmp.path());
        let path = {
            let ws = spaces.allocate(Uuid::new_v4()).await.unwrap();
            std::fs::write(ws.join("partial.mp3"), b"x").unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn sweep_empties_scratch_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("temp");
        std::fs::create_dir_all(root.join("old-job/stems")).unwrap();
        std::fs::write(root.join("old-job/stems/vocals.wav"), b"x").unwrap();
        std::fs::create_dir_all(root.join("another")).unwrap();
        std::fs::write(root.join("stray.part"), b"x").unwrap();

        let removed = Workspaces::new(&root).sweep().await.unwrap();

        assert_eq!(removed, 3);
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn sweep_creates_missing_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("missing");
        assert_eq!(Workspaces::new(&root).sweep().await.unwrap(), 0);
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn promote_copies_bytes() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("in.mp3");
        let dst = tmp.path().join("uploads/out.mp3");
        std::fs::write(&src, b"ID3 audio").unwrap();

        let written = promote(&src, &dst).await.unwrap();

        assert_eq!(written, 9);
        assert_eq!(std::fs::read(&dst).unwrap(), b"ID3 audio");
        assert!(src.exists());
    }

    #[tokio::test]
    async fn failed_write_leaves_no_destination() {
        let tmp = TempDir::new().unwrap();
        let dst = tmp.path().join("processed/out.mp3");

        let err = write_durably(BrokenReader { sent: false }, &dst).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(!dst.exists());
    }

    #[tokio::test]
    async fn promote_missing_source_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let dst = tmp.path().join("out.mp3");
        assert!(promote(&tmp.path().join("nope.mp3"), &dst).await.is_err());
        assert!(!dst.exists());
    }
}
