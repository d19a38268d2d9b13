//! Unix domain socket listener.
//!
//! # Example
//!
//! ```ignore
//! use seqwire::transport::{generate_socket_path, UnixSocketListener};
//!
//! let path = generate_socket_path();
//! let listener = UnixSocketListener::bind(&path)?;
//! server.serve(listener).await?;
//! ```

use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{UnixListener, UnixStream};

use super::Listener;

static SOCKET_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique socket path for this process.
///
/// Format: `{tmp}/seqwire-{pid}-{random}.sock`
pub fn generate_socket_path() -> PathBuf {
    let pid = std::process::id();
    std::env::temp_dir().join(format!("seqwire-{}-{:x}.sock", pid, rand_u64()))
}

/// Time-seeded value mixed with the PID and a per-process counter.
fn rand_u64() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let count = SOCKET_COUNTER.fetch_add(1, Ordering::Relaxed);

    (nanos ^ (u64::from(std::process::id()) << 32)).wrapping_mul(0x517cc1b727220a95) ^ count
}

/// Listener bound to a Unix domain socket path.
///
/// The socket file is removed when the listener is dropped.
pub struct UnixSocketListener {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixSocketListener {
    /// Bind to a socket path, removing a stale socket file first.
    ///
    /// Anything at `path` that is not a socket is left alone and the bind
    /// fails with [`io::ErrorKind::AlreadyExists`]. Must be called from
    /// within a tokio runtime.
    pub fn bind(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        remove_stale_socket(path)?;

        let listener = UnixListener::bind(path)?;
        tracing::info!(path = %path.display(), "Unix socket listener bound");

        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Get the socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            tracing::debug!(path = %path.display(), "Removing stale socket file");
            std::fs::remove_file(path)
        }
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a socket", path.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

impl Drop for UnixSocketListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl Listener for UnixSocketListener {
    type Stream = UnixStream;

    async fn next_connection(&mut self) -> io::Result<(UnixStream, String)> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok((stream, format!("unix:{}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_socket_path_format() {
        let path = generate_socket_path();
        let name = path.file_name().unwrap().to_str().unwrap();

        assert!(name.starts_with("seqwire-"));
        assert!(name.ends_with(".sock"));
        assert!(name.contains(&std::process::id().to_string()));
    }

    #[test]
    fn test_generate_socket_path_uniqueness() {
        let paths: Vec<PathBuf> = (0..10).map(|_| generate_socket_path()).collect();
        for (i, a) in paths.iter().enumerate() {
            for b in &paths[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket_and_cleans_up() {
        let path = generate_socket_path();
        // A std listener leaves its socket file behind when dropped.
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let listener = UnixSocketListener::bind(&path).unwrap();
        assert_eq!(listener.path(), path.as_path());
        assert!(path.exists());

        drop(listener);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_bind_refuses_to_remove_regular_file() {
        let path = generate_socket_path();
        std::fs::write(&path, b"not a socket").unwrap();

        let err = UnixSocketListener::bind(&path).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&path).unwrap(), b"not a socket");

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_accepts_connection() {
        let path = generate_socket_path();
        let mut listener = UnixSocketListener::bind(&path).unwrap();

        let connect = tokio::spawn({
            let path = path.clone();
            async move { UnixStream::connect(path).await }
        });

        let (_stream, peer) = listener.next_connection().await.unwrap();
        assert!(peer.starts_with("unix:"));
        connect.await.unwrap().unwrap();
    }
}
