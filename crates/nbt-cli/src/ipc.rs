//! Front-end listener: platform-specific local transport, NDJSON protocol.
//!
//! - Windows: named pipes (`\\.\pipe\{comm_name}`)
//! - Unix (macOS/Linux): Unix domain sockets (`$TMPDIR/{comm_name}.sock`)
//!
//! One front-end is served at a time. When it disconnects the kernel keeps
//! its registries and the next front-end asks for a fresh update.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use nbt_kernel::{Kernel, NdjsonTransport};

// ─── Platform-specific transport ──────────────────────────────────────────────

#[cfg(target_os = "windows")]
mod platform {
    use super::*;
    use tokio::io::{ReadHalf, WriteHalf};
    use tokio::net::windows::named_pipe::{NamedPipeServer, ServerOptions};

    pub type Reader = BufReader<ReadHalf<NamedPipeServer>>;
    pub type Writer = WriteHalf<NamedPipeServer>;

    pub fn default_address(comm_name: &str) -> String {
        format!(r"\\.\pipe\{}", comm_name)
    }

    pub struct Listener {
        addr: String,
        next: NamedPipeServer,
    }

    pub fn bind(addr: &str) -> Result<Listener> {
        let next = ServerOptions::new()
            .first_pipe_instance(true)
            .create(addr)
            .with_context(|| format!("Failed to create named pipe: {addr}"))?;
        Ok(Listener {
            addr: addr.to_string(),
            next,
        })
    }

    pub async fn accept(listener: &mut Listener) -> Result<(Reader, Writer)> {
        listener
            .next
            .connect()
            .await
            .context("Failed while waiting for a front-end to connect to pipe")?;
        let fresh = ServerOptions::new()
            .create(&listener.addr)
            .with_context(|| format!("Failed to create named pipe: {}", listener.addr))?;
        let connected = std::mem::replace(&mut listener.next, fresh);
        let (read_half, write_half) = tokio::io::split(connected);
        Ok((BufReader::new(read_half), write_half))
    }
}

#[cfg(not(target_os = "windows"))]
mod platform {
    use super::*;
    use tokio::io::{ReadHalf, WriteHalf};
    use tokio::net::{UnixListener, UnixStream};

    pub type Reader = BufReader<ReadHalf<UnixStream>>;
    pub type Writer = WriteHalf<UnixStream>;

    pub fn default_address(comm_name: &str) -> String {
        std::env::temp_dir()
            .join(format!("{comm_name}.sock"))
            .to_string_lossy()
            .into_owned()
    }

    pub struct Listener(UnixListener);

    pub fn bind(addr: &str) -> Result<Listener> {
        // Remove stale socket file if it exists
        let _ = std::fs::remove_file(addr);
        let listener = UnixListener::bind(addr)
            .with_context(|| format!("Failed to create Unix socket: {addr}"))?;
        Ok(Listener(listener))
    }

    pub async fn accept(listener: &mut Listener) -> Result<(Reader, Writer)> {
        let (stream, _) = listener
            .0
            .accept()
            .await
            .context("Failed while waiting for a front-end to connect to socket")?;
        let (read_half, write_half) = tokio::io::split(stream);
        Ok((BufReader::new(read_half), write_half))
    }
}

// ─── Cross-platform API ───────────────────────────────────────────────────────

pub use platform::default_address;

/// Serve front-ends one after another until the listener fails.
pub async fn serve(kernel: Arc<Kernel>, addr: &str) -> Result<()> {
    let mut listener = platform::bind(addr)?;
    info!("Listening for front-ends on {}", addr);

    loop {
        let (mut reader, writer) = platform::accept(&mut listener).await?;
        info!("Front-end attached");
        kernel.attach(Arc::new(NdjsonTransport::new(writer)));

        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => kernel.handle_client_line(&line),
                Err(e) => {
                    warn!("Front-end read failed: {}", e);
                    break;
                }
            }
        }

        kernel.detach();
        info!("Front-end detached");
    }
}

#[cfg(all(test, not(target_os = "windows")))]
mod tests {
    use super::*;
    use nbt_types::Tool;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixStream;

    #[tokio::test]
    async fn serves_update_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let addr = dir
            .path()
            .join("nbtools_comm.sock")
            .to_string_lossy()
            .into_owned();
        let kernel = Arc::new(Kernel::new(Default::default()).unwrap());
        kernel
            .tools()
            .register(Tool::new("Notebook", "plot"))
            .unwrap();

        let server = {
            let kernel = kernel.clone();
            let addr = addr.clone();
            tokio::spawn(async move { serve(kernel, &addr).await })
        };

        let mut stream = None;
        for _ in 0..100 {
            if let Ok(s) = UnixStream::connect(&addr).await {
                stream = Some(s);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let stream = stream.expect("server never bound the socket");
        let (read_half, mut write_half) = tokio::io::split(stream);
        write_half
            .write_all(b"{\"func\": \"request_update\"}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let frame: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(frame["func"], "update");
        assert_eq!(frame["payload"]["tools"][0]["id"], "plot");

        server.abort();
    }
}
