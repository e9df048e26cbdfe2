//! Background daemon serving the taskdeps store over a Unix socket.
//!
//! Connections are served concurrently, but every request is funnelled
//! through one channel and applied by the main loop in arrival order, so two
//! mutations never interleave.

use crate::graph_store::GraphStore;
use crate::groups::StoreGroupExt;
use crate::protocol::{Request, Response, parse_request};
use crate::storage::STORE_DIR;
use crate::store::Store;
use eyre::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Notify, mpsc, oneshot};

/// Socket file name within the store directory.
const SOCKET_FILE: &str = "daemon.sock";

/// PID file name within the store directory.
const PID_FILE: &str = "daemon.pid";

/// How long a client waits for a response.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

type Envelope = (Request, oneshot::Sender<Response>);

/// Configuration for the daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Root directory containing .taskdeps
    pub root: PathBuf,

    /// Client-side read timeout
    pub request_timeout: Duration,
}

impl DaemonConfig {
    /// Create config with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> PathBuf {
        self.root.join(STORE_DIR).join(SOCKET_FILE)
    }

    /// Get the PID file path.
    pub fn pid_path(&self) -> PathBuf {
        self.root.join(STORE_DIR).join(PID_FILE)
    }
}

/// The taskdeps daemon.
pub struct Daemon {
    config: DaemonConfig,
    store: Store,
    /// Signalled once the shutdown response has been written.
    stopped: Arc<Notify>,
}

impl Daemon {
    /// Create a new daemon instance.
    pub fn new(config: DaemonConfig) -> Result<Self> {
        let store = Store::open(&config.root).context("Failed to open store")?;

        Ok(Self {
            config,
            store,
            stopped: Arc::new(Notify::new()),
        })
    }

    /// Run the daemon until a client sends `Shutdown`.
    pub async fn run(&mut self) -> Result<()> {
        // Clean up any stale socket
        let socket_path = self.config.socket_path();
        if socket_path.exists() {
            fs::remove_file(&socket_path).ok();
        }

        let pid_path = self.config.pid_path();
        fs::write(&pid_path, std::process::id().to_string()).context("Failed to write PID file")?;

        let listener = UnixListener::bind(&socket_path).context("Failed to bind to Unix socket")?;

        log::info!("Daemon listening on {:?}", socket_path);

        let (tx, mut rx) = mpsc::channel::<Envelope>(100);
        let stopped = Arc::clone(&self.stopped);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let tx = tx.clone();
                        let stopped = Arc::clone(&stopped);
                        tokio::spawn(async move {
                            if let Err(e) = Self::handle_connection(stream, tx, stopped).await {
                                log::warn!("Connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => log::error!("Accept error: {}", e),
                },

                Some((request, response_tx)) = rx.recv() => {
                    let _ = response_tx.send(self.handle_request(request));
                }

                () = stopped.notified() => {
                    log::info!("Daemon shutting down");
                    break;
                }
            }
        }

        fs::remove_file(&socket_path).ok();
        fs::remove_file(&pid_path).ok();

        Ok(())
    }

    /// Handle a single client connection.
    async fn handle_connection(stream: UnixStream, tx: mpsc::Sender<Envelope>, stopped: Arc<Notify>) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await.context("Failed to read line")? {
            if line.trim().is_empty() {
                continue;
            }

            let (response, is_shutdown) = match parse_request(&line) {
                Ok(request) => {
                    let is_shutdown = matches!(request, Request::Shutdown);

                    // Send to main loop and wait for response
                    let (resp_tx, resp_rx) = oneshot::channel();
                    tx.send((request, resp_tx))
                        .await
                        .context("Failed to send request to daemon")?;

                    let Ok(response) = resp_rx.await else {
                        break;
                    };
                    (response, is_shutdown)
                }
                Err(response) => {
                    log::debug!("Rejected request line: {}", line);
                    (response, false)
                }
            };

            write_response(&mut writer, &response).await?;

            if is_shutdown {
                stopped.notify_one();
                break;
            }
        }

        Ok(())
    }

    /// Handle a single request.
    fn handle_request(&mut self, request: Request) -> Response {
        match request {
            Request::Shutdown => Response::Ok,
            request => execute(&mut self.store, request),
        }
    }
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> Result<()> {
    let mut response_json = serde_json::to_string(response)?;
    response_json.push('\n');
    writer.write_all(response_json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn respond<T>(result: Result<T>, ok: impl FnOnce(T) -> Response) -> Response {
    match result {
        Ok(value) => ok(value),
        Err(e) => {
            let response = Response::from_report(&e);
            if let Response::Error { status: 500, .. } = &response {
                log::error!("Request failed: {:#}", e);
            }
            response
        }
    }
}

/// Apply one request to a store.
pub fn execute<B: GraphStore>(store: &mut Store<B>, request: Request) -> Response {
    match request {
        Request::CreateTask { name, group_id } => respond(store.create(&name, group_id), |task| Response::Task { task }),

        Request::GetTask { id } => respond(store.view(id), |view| Response::TaskView { view }),

        Request::ListTasks { state } => respond(store.list(state), |tasks| Response::Tasks { tasks }),

        Request::RenameTask { id, name } => respond(store.rename(id, &name), |task| Response::Task { task }),

        Request::CompleteTask { id } => respond(store.complete(id), |task| Response::Task { task }),

        Request::ReopenTask { id } => respond(store.reopen(id), |task| Response::Task { task }),

        Request::DeleteTask { id } => respond(store.delete(id), |task| Response::Task { task }),

        Request::AddDependency { from_id, to_id } => respond(store.add_dependency(from_id, to_id), |dependency| {
            Response::Dependency { dependency }
        }),

        Request::TopologicalOrder { id } => {
            respond(store.topological_order(id), |tasks| Response::Tasks { tasks })
        }

        Request::CreateGroup { name } => respond(store.create_group(&name), |group| Response::Group { group }),

        Request::CreateGroupFromTask { name, task_id } => {
            respond(store.create_group_from_task(&name, task_id), |view| Response::GroupView { view })
        }

        Request::GetGroup { id } => respond(store.get_group(id), |view| Response::GroupView { view }),

        Request::ListGroups => respond(store.list_groups(), |groups| Response::Groups { groups }),

        Request::RenameGroup { id, name } => respond(store.rename_group(id, &name), |group| Response::Group { group }),

        Request::DeleteGroup { id } => respond(store.delete_group(id), |group| Response::Group { group }),

        Request::AssignTask { group_id, task_id } => {
            respond(store.assign_task(group_id, task_id), |view| Response::GroupView { view })
        }

        // Only the daemon loop can stop itself.
        Request::Shutdown => Response::error(400, "shutdown is only accepted by a running daemon"),

        Request::Ping => Response::Pong,
    }
}

/// Check if a daemon is running for the given store path.
pub fn is_daemon_running(root: &Path) -> bool {
    let config = DaemonConfig::new(root);
    let socket_path = config.socket_path();
    let pid_path = config.pid_path();

    if !socket_path.exists() {
        return false;
    }

    if let Ok(pid_str) = fs::read_to_string(&pid_path)
        && let Ok(pid) = pid_str.trim().parse::<i32>()
    {
        // Signal 0 only checks that the process exists.
        unsafe {
            if libc::kill(pid, 0) == 0 {
                return true;
            }
        }
    }

    // Stale socket, clean up
    fs::remove_file(&socket_path).ok();
    fs::remove_file(&pid_path).ok();
    false
}

/// Start the daemon as a background process.
pub fn start_daemon(root: &Path) -> Result<()> {
    use std::process::Command;

    let exe = std::env::current_exe().context("Failed to get current executable")?;

    Command::new(exe)
        .arg("--dir")
        .arg(root)
        .arg("daemon")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .context("Failed to spawn daemon process")?;

    std::thread::sleep(Duration::from_millis(100));

    Ok(())
}
