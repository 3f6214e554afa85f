//! Outbound telemetry link.
//!
//! The transport owns its connection lifecycle. The detector only writes
//! payloads and may ask whether anyone is listening.
use std::{
    fs,
    io::{self, Write},
    os::unix::{
        fs::PermissionsExt,
        net::{UnixListener, UnixStream},
    },
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread,
    time::Duration,
};

use crate::{
    config::TransportConfig,
    error::{Error, Result},
};

const ACCEPT_POLL: Duration = Duration::from_millis(100);
/// Longest a single client write may stall the detection loop before that
/// client is dropped.
const CLIENT_WRITE_TIMEOUT: Duration = Duration::from_millis(20);

/// Boundary to the wireless stack.
pub trait Transport {
    /// Queues `payload` for transmission. Failures are the transport's business.
    fn write_payload(&mut self, payload: &[u8]);

    /// Whether a central is currently connected. Informational only.
    fn is_central_connected(&self) -> bool;
}

/// Keeps every payload in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    payloads: Vec<Vec<u8>>,
    connected: bool,
}

impl RecordingTransport {
    #[must_use]
    pub fn connected() -> Self {
        Self {
            payloads: Vec::new(),
            connected: true,
        }
    }

    #[must_use]
    pub fn payloads(&self) -> &[Vec<u8>] {
        &self.payloads
    }
}

impl Transport for RecordingTransport {
    fn write_payload(&mut self, payload: &[u8]) {
        self.payloads.push(payload.to_vec());
    }

    fn is_central_connected(&self) -> bool {
        self.connected
    }
}

type Clients = Arc<Mutex<Vec<UnixStream>>>;

fn lock(clients: &Clients) -> MutexGuard<'_, Vec<UnixStream>> {
    clients.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Broadcasts newline-terminated payloads to every client of a Unix socket.
///
/// Clients are accepted on a background thread. A client whose write fails or
/// stalls past a short timeout is dropped.
pub struct SocketTransport {
    path: PathBuf,
    clients: Clients,
    echo_stdout: bool,
    running: Arc<AtomicBool>,
}

impl SocketTransport {
    pub fn bind(config: &TransportConfig) -> Result<Self> {
        let path = config.socket_path.clone();

        // stale socket from a previous run
        if let Err(err) = fs::remove_file(&path) {
            if err.kind() != io::ErrorKind::NotFound {
                return Err(init_error(&path, &err));
            }
        }

        let listener = UnixListener::bind(&path).map_err(|e| init_error(&path, &e))?;
        // clients do not need to run as the same user
        fs::set_permissions(&path, fs::Permissions::from_mode(0o777))
            .map_err(|e| init_error(&path, &e))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| init_error(&path, &e))?;

        let clients = Clients::default();
        let running = Arc::new(AtomicBool::new(true));
        spawn_acceptor(listener, clients.clone(), running.clone());

        tracing::info!(path = %path.display(), "telemetry socket ready");

        Ok(Self {
            path,
            clients,
            echo_stdout: config.echo_stdout,
            running,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn init_error(path: &Path, err: &io::Error) -> Error {
    Error::TransportInit(format!("socket {}: {err}", path.display()))
}

fn spawn_acceptor(listener: UnixListener, clients: Clients, running: Arc<AtomicBool>) {
    thread::spawn(move || {
        while running.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, _)) => {
                    let configured = stream
                        .set_nonblocking(false)
                        .and_then(|()| stream.set_write_timeout(Some(CLIENT_WRITE_TIMEOUT)));
                    if let Err(err) = configured {
                        tracing::warn!(?err, "unable to configure client");
                        continue;
                    }
                    tracing::info!("central connected");
                    lock(&clients).push(stream);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(err) => {
                    tracing::warn!(?err, "accept failed");
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }
    });
}

impl Transport for SocketTransport {
    fn write_payload(&mut self, payload: &[u8]) {
        if self.echo_stdout {
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(payload);
            let _ = stdout.write_all(b"\n");
            let _ = stdout.flush();
        }

        lock(&self.clients).retain_mut(|stream| {
            let sent = stream
                .write_all(payload)
                .and_then(|()| stream.write_all(b"\n"))
                .and_then(|()| stream.flush());

            if sent.is_err() {
                tracing::info!("central disconnected");
            }
            sent.is_ok()
        });
    }

    fn is_central_connected(&self) -> bool {
        !lock(&self.clients).is_empty()
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        io::{BufRead, BufReader},
        time::Instant,
    };

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn recording_transport_keeps_payloads() {
        let mut transport = RecordingTransport::default();
        assert!(!transport.is_central_connected());

        transport.write_payload(b"{}");
        assert_eq!(transport.payloads(), &[b"{}".to_vec()]);
        assert!(RecordingTransport::connected().is_central_connected());
    }

    #[test]
    fn socket_broadcasts_to_connected_central() {
        let dir = tempfile::tempdir().unwrap();
        let config = TransportConfig {
            socket_path: dir.path().join("kickmeter.sock"),
            echo_stdout: false,
        };

        let mut transport = SocketTransport::bind(&config).unwrap();
        assert!(!transport.is_central_connected());

        let client = UnixStream::connect(transport.path()).unwrap();
        assert!(wait_until(|| transport.is_central_connected()));

        transport.write_payload(br#"{"accel":39.24,"speed":6.34}"#);

        let mut line = String::new();
        BufReader::new(client).read_line(&mut line).unwrap();
        assert_eq!(line, "{\"accel\":39.24,\"speed\":6.34}\n");
    }

    #[test]
    fn socket_drops_disconnected_central() {
        let dir = tempfile::tempdir().unwrap();
        let config = TransportConfig {
            socket_path: dir.path().join("kickmeter.sock"),
            echo_stdout: false,
        };

        let mut transport = SocketTransport::bind(&config).unwrap();
        let client = UnixStream::connect(transport.path()).unwrap();
        assert!(wait_until(|| transport.is_central_connected()));
        drop(client);

        // the first write after a hang-up may still be buffered by the kernel
        assert!(wait_until(|| {
            transport.write_payload(b"{}");
            !transport.is_central_connected()
        }));
    }

    #[test]
    fn stalled_central_cannot_block_writer() {
        let dir = tempfile::tempdir().unwrap();
        let config = TransportConfig {
            socket_path: dir.path().join("kickmeter.sock"),
            echo_stdout: false,
        };

        let mut transport = SocketTransport::bind(&config).unwrap();
        // connected but never reads
        let _client = UnixStream::connect(transport.path()).unwrap();
        assert!(wait_until(|| transport.is_central_connected()));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            // far larger than any socket buffer
            transport.write_payload(&vec![b'x'; 8 * 1024 * 1024]);
            done_tx.send(transport.is_central_connected()).unwrap();
        });

        let still_connected = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("write_payload blocked on a client that never reads");
        assert!(!still_connected);
    }

    #[test]
    fn bind_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = TransportConfig {
            socket_path: dir.path().join("missing").join("kickmeter.sock"),
            echo_stdout: false,
        };

        assert!(matches!(
            SocketTransport::bind(&config),
            Err(Error::TransportInit(_))
        ));
    }
}
