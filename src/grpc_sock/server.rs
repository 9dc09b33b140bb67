// This is a modified version of: https://github.com/hyperium/tonic/blob/f1275b611e38ec5fe992b2f10552bf95e8448b17/examples/src/uds/server.rs
use std::{
    path::{Path, PathBuf},
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tonic::transport::server::Connected;
use tracing::{debug, warn};

/// An accepted connection on a [`Socket`].
#[derive(Debug)]
pub struct UnixStream(tokio::net::UnixStream);

/// A `PathBuf` that will get deleted on drop
#[derive(Debug)]
struct OwnedPathBuf {
    inner: PathBuf,
}

impl Drop for OwnedPathBuf {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.inner) {
            Ok(()) => debug!(socket = %self.inner.display(), "Removed plugin socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
            Err(e) => warn!(
                socket = %self.inner.display(),
                error = %e,
                "Cleanup of socket file failed, manual cleanup needed"
            ),
        }
    }
}

/// A listening UNIX socket that yields connections for `Server::serve_with_incoming`. The socket
/// file is removed when this is dropped.
#[derive(Debug)]
pub struct Socket {
    listener: tokio::net::UnixListener,
    socket_path: OwnedPathBuf,
}

impl Socket {
    /// Binds a new socket at `path`. Fails if a file already exists there.
    pub fn new<P: AsRef<Path> + ?Sized>(path: &P) -> std::io::Result<Self> {
        let listener = tokio::net::UnixListener::bind(path)?;
        Ok(Socket {
            listener,
            socket_path: OwnedPathBuf {
                inner: path.as_ref().to_owned(),
            },
        })
    }

    /// Path of the socket file
    pub fn path(&self) -> &Path {
        &self.socket_path.inner
    }
}

impl Stream for Socket {
    type Item = Result<UnixStream, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.listener.poll_accept(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(res) => Poll::Ready(Some(res.map(|(stream, _)| UnixStream(stream)))),
        }
    }
}

/// Connection metadata handed to tonic. Unix peers carry nothing worth exposing.
#[derive(Clone, Debug)]
pub struct ConnectionData {}

impl Connected for UnixStream {
    type ConnectInfo = ConnectionData;

    fn connect_info(&self) -> Self::ConnectInfo {
        ConnectionData {}
    }
}

impl AsyncRead for UnixStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for UnixStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}
