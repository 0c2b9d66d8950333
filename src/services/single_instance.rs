// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Podofilo contributors

//! Single-instance hand-off over a loopback TCP port.
//!
//! A second launch sends its file arguments to the running instance and
//! exits; an empty list just asks the running window to come to the front.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

pub const PORT: u16 = 13013;
const MAX_MESSAGE_BYTES: u64 = 10 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Serialize, Deserialize)]
struct InstanceMessage {
    #[serde(default)]
    files: Vec<String>,
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Hand `files` to an instance already running on the default port.
pub fn send_to_instance(files: &[PathBuf]) -> bool {
    send_to_port(PORT, files)
}

/// Returns false when nobody is listening on `port`.
pub fn send_to_port(port: u16, files: &[PathBuf]) -> bool {
    let message = InstanceMessage {
        files: files.iter().map(|f| f.display().to_string()).collect(),
    };
    let result = (|| -> Result<()> {
        let mut stream = TcpStream::connect_timeout(&loopback(port), CONNECT_TIMEOUT)?;
        stream.write_all(&serde_json::to_vec(&message)?)?;
        Ok(())
    })();
    match result {
        Ok(()) => {
            log::info!("Handed {} files to the running instance", files.len());
            true
        }
        Err(err) => {
            log::debug!("No running instance on port {port}: {err}");
            false
        }
    }
}

fn parse_message(bytes: &[u8]) -> Result<Vec<PathBuf>> {
    let message: InstanceMessage = serde_json::from_slice(bytes).context("malformed instance message")?;
    Ok(message.files.into_iter().map(PathBuf::from).collect())
}

/// Listener forwarding file lists from later launches.
pub struct InstanceServer {
    port: u16,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InstanceServer {
    /// Listen on the default port.
    pub fn start(tx: Sender<Vec<PathBuf>>) -> Result<Self> {
        Self::start_on(PORT, tx)
    }

    /// Listen on `port` (0 picks a free one).
    pub fn start_on(port: u16, tx: Sender<Vec<PathBuf>>) -> Result<Self> {
        let listener = TcpListener::bind(loopback(port))
            .with_context(|| format!("Failed to listen on port {port}"))?;
        let port = listener.local_addr()?.port();
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("instance-server".into())
            .spawn(move || {
                for stream in listener.incoming() {
                    if !flag.load(Ordering::SeqCst) {
                        break;
                    }
                    let mut stream = match stream {
                        Ok(stream) => stream,
                        Err(err) => {
                            log::warn!("Instance server accept failed: {err}");
                            continue;
                        }
                    };
                    let _ = stream.set_read_timeout(Some(CONNECT_TIMEOUT));
                    let mut buffer = Vec::new();
                    if let Err(err) = (&mut stream).take(MAX_MESSAGE_BYTES).read_to_end(&mut buffer) {
                        log::warn!("Instance server read failed: {err}");
                        continue;
                    }
                    if buffer.is_empty() {
                        continue;
                    }
                    match parse_message(&buffer) {
                        Ok(files) => {
                            log::info!("Single instance activated with {} files", files.len());
                            if tx.send(files).is_err() {
                                break;
                            }
                        }
                        Err(err) => log::error!("Error processing instance message: {err:#}"),
                    }
                }
                log::debug!("Instance server stopped");
            })
            .context("Failed to spawn instance server thread")?;

        log::info!("Single-instance server listening on port {port}");
        Ok(Self {
            port,
            running,
            handle: Some(handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop listening; a dummy connection unblocks the pending accept.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.running.store(false, Ordering::SeqCst);
        let _ = TcpStream::connect_timeout(&loopback(self.port), Duration::from_millis(100));
        if handle.join().is_err() {
            log::error!("Instance server thread panicked");
        }
    }
}

impl Drop for InstanceServer {
    fn drop(&mut self) {
        self.stop();
    }
}
