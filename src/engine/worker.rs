// Engine Worker - Single task owning the connection and the schedule queue
//
// Callers hold an EngineHandle and talk to the worker over a request queue,
// so operations run one at a time in issue order. Disconnect bumps a
// cancellation epoch first, which aborts whatever operation is in flight.

use crate::connection::{ConnectionManager, ConnectionPhase, ConnectionState};
use crate::engine::collab::{Clock, PersistenceSink};
use crate::engine::config::EngineConfig;
use crate::engine::event::{EngineError, EngineEvent};
use crate::logs::{preview, suggested_filename, LogDownloader, LogError};
use crate::protocol::Command;
use crate::schedule::{ImportReport, ScheduleEntry, ScheduleStore};
use crate::transport::{Connector, Endpoint, Reply, TransportError, TransportKind};
use std::future::{pending, Future};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

// ============================================================================
// REQUESTS
// ============================================================================

type Responder<T> = oneshot::Sender<Result<T, EngineError>>;

enum Request {
    Connect { endpoint: Endpoint, reply: Responder<()> },
    Disconnect { reply: Responder<()> },
    Send { command: Command, reply: Responder<Reply> },
    AddSchedule { entry: ScheduleEntry, reply: Responder<()> },
    ClearSchedules { reply: Responder<usize> },
    Schedules { reply: Responder<Vec<ScheduleEntry>> },
    SendSchedules { reply: Responder<usize> },
    DownloadLog { reply: Responder<Option<PathBuf>> },
    ExportSchedules { reply: Responder<Option<PathBuf>> },
    ImportSchedules { text: String, reply: Responder<ImportReport> },
    State { reply: Responder<ConnectionState> },
    Shutdown,
}

enum Wake {
    Request(Option<Request>),
    Reconnect,
    Monitor,
}

// ============================================================================
// ENGINE HANDLE
// ============================================================================

/// Cloneable front door to a running engine
#[derive(Clone)]
pub struct EngineHandle {
    requests: mpsc::Sender<Request>,
    cancel: Arc<watch::Sender<u64>>,
}

impl EngineHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(Responder<T>) -> Request,
    ) -> Result<T, EngineError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| EngineError::Stopped)?;
        response.await.map_err(|_| EngineError::Stopped)?
    }

    /// Connect to a device. Any current link is replaced.
    pub async fn connect(&self, endpoint: Endpoint) -> Result<(), EngineError> {
        self.call(|reply| Request::Connect { endpoint, reply }).await
    }

    /// Abort the in-flight operation and drop the link. Idempotent.
    pub async fn disconnect(&self) -> Result<(), EngineError> {
        self.cancel.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
        self.call(|reply| Request::Disconnect { reply }).await
    }

    /// Encode and send one command
    pub async fn send(&self, command: Command) -> Result<Reply, EngineError> {
        self.call(|reply| Request::Send { command, reply }).await
    }

    /// Queue a schedule entry, rejecting overlaps
    pub async fn add_schedule(&self, entry: ScheduleEntry) -> Result<(), EngineError> {
        self.call(|reply| Request::AddSchedule { entry, reply }).await
    }

    /// Empty the schedule queue, returning how many entries were dropped
    pub async fn clear_schedules(&self) -> Result<usize, EngineError> {
        self.call(|reply| Request::ClearSchedules { reply }).await
    }

    /// Snapshot of the schedule queue
    pub async fn schedules(&self) -> Result<Vec<ScheduleEntry>, EngineError> {
        self.call(|reply| Request::Schedules { reply }).await
    }

    /// Send the whole queue as one batch; the queue is cleared on success
    pub async fn send_schedules(&self) -> Result<usize, EngineError> {
        self.call(|reply| Request::SendSchedules { reply }).await
    }

    /// Download the device log and offer it to the persistence sink
    pub async fn download_log(&self) -> Result<Option<PathBuf>, EngineError> {
        self.call(|reply| Request::DownloadLog { reply }).await
    }

    /// Export the queue through the persistence sink
    pub async fn export_schedules(&self) -> Result<Option<PathBuf>, EngineError> {
        self.call(|reply| Request::ExportSchedules { reply }).await
    }

    /// Import entries from schedule file text
    pub async fn import_schedules(&self, text: impl Into<String>) -> Result<ImportReport, EngineError> {
        let text = text.into();
        self.call(|reply| Request::ImportSchedules { text, reply }).await
    }

    /// Current connection state
    pub async fn state(&self) -> Result<ConnectionState, EngineError> {
        self.call(|reply| Request::State { reply }).await
    }

    /// Stop the worker after it disconnects
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.cancel.send_modify(|epoch| *epoch = epoch.wrapping_add(1));
        self.requests
            .send(Request::Shutdown)
            .await
            .map_err(|_| EngineError::Stopped)
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// The worker before it is started
pub struct Engine {
    worker: Worker,
    requests: mpsc::Receiver<Request>,
    cancel: watch::Receiver<u64>,
}

struct Worker {
    config: EngineConfig,
    manager: ConnectionManager,
    store: ScheduleStore,
    downloader: LogDownloader,
    sink: Box<dyn PersistenceSink>,
    clock: Box<dyn Clock>,
    events: mpsc::Sender<EngineEvent>,
}

impl Engine {
    /// Build an engine with its handle and event stream
    pub fn new(
        config: EngineConfig,
        connector: Box<dyn Connector>,
        sink: Box<dyn PersistenceSink>,
        clock: Box<dyn Clock>,
    ) -> Result<(Self, EngineHandle, mpsc::Receiver<EngineEvent>), EngineError> {
        config.validate()?;

        let (request_tx, request_rx) = mpsc::channel(config.request_queue);
        let (event_tx, event_rx) = mpsc::channel(config.event_queue);
        let (cancel_tx, cancel_rx) = watch::channel(0u64);

        let worker = Worker {
            manager: ConnectionManager::new(connector, config.connection.clone()),
            store: ScheduleStore::new(),
            downloader: LogDownloader::new(config.downloader.clone()),
            sink,
            clock,
            events: event_tx,
            config,
        };

        let engine = Self {
            worker,
            requests: request_rx,
            cancel: cancel_rx,
        };
        let handle = EngineHandle {
            requests: request_tx,
            cancel: Arc::new(cancel_tx),
        };
        Ok((engine, handle, event_rx))
    }

    /// Build the engine and run it on the current tokio runtime
    pub fn spawn(
        config: EngineConfig,
        connector: Box<dyn Connector>,
        sink: Box<dyn PersistenceSink>,
        clock: Box<dyn Clock>,
    ) -> Result<(EngineHandle, mpsc::Receiver<EngineEvent>, JoinHandle<()>), EngineError> {
        let (engine, handle, events) = Self::new(config, connector, sink, clock)?;
        let task = tokio::spawn(engine.run());
        Ok((handle, events, task))
    }

    /// Serve requests until shutdown or until every handle is dropped
    pub async fn run(self) {
        let Engine {
            mut worker,
            mut requests,
            mut cancel,
        } = self;

        let period = worker.config.monitor_interval();
        let mut monitor = interval_at(Instant::now() + period, period);
        monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("engine started");

        loop {
            let reconnect_at = worker.manager.reconnect_at();
            let monitoring = worker.manager.is_connected()
                && worker.manager.state().active_transport() == Some(TransportKind::Uart);

            let wake = tokio::select! {
                request = requests.recv() => Wake::Request(request),
                _ = async {
                    match reconnect_at {
                        Some(at) => sleep_until(at).await,
                        None => pending::<()>().await,
                    }
                } => Wake::Reconnect,
                _ = monitor.tick(), if monitoring => Wake::Monitor,
            };

            match wake {
                Wake::Request(None) | Wake::Request(Some(Request::Shutdown)) => break,
                Wake::Request(Some(request)) => worker.handle(request, &mut cancel).await,
                Wake::Reconnect => {
                    let outcome = cancellable(&mut cancel, worker.reconnect()).await;
                    if let Err(EngineError::Cancelled) = outcome {
                        worker.abort().await;
                    }
                }
                Wake::Monitor => worker.poll_output().await,
            }
        }

        worker.manager.disconnect().await;
        info!("engine stopped");
    }
}

/// Run `op` unless the cancellation epoch moves while it is in flight
async fn cancellable<T>(
    cancel: &mut watch::Receiver<u64>,
    op: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    cancel.borrow_and_update();
    tokio::select! {
        result = op => result,
        Ok(()) = cancel.changed() => Err(EngineError::Cancelled),
    }
}

// ============================================================================
// WORKER OPERATIONS
// ============================================================================

impl Worker {
    fn emit(&self, event: EngineEvent) {
        if let Err(e) = self.events.try_send(event) {
            debug!(error = %e, "engine event dropped");
        }
    }

    async fn handle(&mut self, request: Request, cancel: &mut watch::Receiver<u64>) {
        match request {
            Request::Connect { endpoint, reply } => {
                let result = cancellable(cancel, self.connect(endpoint)).await;
                self.finish(reply, result).await;
            }
            Request::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(Ok(()));
            }
            Request::Send { command, reply } => {
                let result = cancellable(cancel, self.send(command)).await;
                self.finish(reply, result).await;
            }
            Request::AddSchedule { entry, reply } => {
                let result = self.store.add(entry).map_err(EngineError::from);
                let _ = reply.send(result);
            }
            Request::ClearSchedules { reply } => {
                let _ = reply.send(Ok(self.store.remove_all()));
            }
            Request::Schedules { reply } => {
                let _ = reply.send(Ok(self.store.entries().to_vec()));
            }
            Request::SendSchedules { reply } => {
                let result = cancellable(cancel, self.send_schedules()).await;
                self.finish(reply, result).await;
            }
            Request::DownloadLog { reply } => {
                let result = cancellable(cancel, self.download_log()).await;
                self.finish(reply, result).await;
            }
            Request::ExportSchedules { reply } => {
                let _ = reply.send(self.export_schedules().await);
            }
            Request::ImportSchedules { text, reply } => {
                let _ = reply.send(self.import_schedules(&text));
            }
            Request::State { reply } => {
                let _ = reply.send(Ok(self.manager.state().clone()));
            }
            Request::Shutdown => {}
        }
    }

    async fn finish<T>(&mut self, reply: Responder<T>, result: Result<T, EngineError>) {
        if let Err(EngineError::Cancelled) = &result {
            self.abort().await;
        }
        let _ = reply.send(result);
    }

    /// Tear down after a cancelled operation
    async fn abort(&mut self) {
        warn!("operation cancelled, dropping link");
        self.manager.disconnect().await;
    }

    fn ensure_connected(&self) -> Result<(), EngineError> {
        if !self.manager.is_connected() {
            return Err(EngineError::NotConnected);
        }
        Ok(())
    }

    /// Turn the manager's verdict on a failure into a status event
    fn announce_failure(&self, error: &TransportError) {
        let state = self.manager.state();
        match state.phase() {
            ConnectionPhase::Reconnecting => self.emit(EngineEvent::Reconnecting {
                attempt: state.retry_count(),
                max: state.max_retries(),
                reason: error.to_string(),
            }),
            ConnectionPhase::Disconnected => self.emit(EngineEvent::Disconnected {
                reason: Some(error.to_string()),
            }),
            _ => {}
        }
    }

    async fn connect(&mut self, endpoint: Endpoint) -> Result<(), EngineError> {
        self.emit(EngineEvent::Connecting {
            endpoint: endpoint.clone(),
        });

        let now = self.clock.now();
        match self.manager.connect(endpoint.clone(), now).await {
            Ok(()) => {
                self.emit(EngineEvent::Connected {
                    via: endpoint.kind(),
                    endpoint,
                });
                Ok(())
            }
            Err(e) => {
                self.announce_failure(&e);
                Err(e.into())
            }
        }
    }

    async fn reconnect(&mut self) -> Result<(), EngineError> {
        let now = self.clock.now();
        match self.manager.reconnect(now).await {
            Ok(()) => {
                if let Some(endpoint) = self.manager.last_endpoint().cloned() {
                    self.emit(EngineEvent::Connected {
                        via: endpoint.kind(),
                        endpoint,
                    });
                }
                Ok(())
            }
            Err(e) => {
                self.announce_failure(&e);
                Err(e.into())
            }
        }
    }

    async fn disconnect(&mut self) {
        let was_active = self.manager.state().phase().is_active();
        self.manager.disconnect().await;
        if was_active {
            self.emit(EngineEvent::Disconnected { reason: None });
        }
    }

    /// One frame out, reply text surfaced as device output
    async fn exchange(&mut self, frame: &[u8]) -> Result<Reply, EngineError> {
        let budget = self.config.command_timeout();
        match timeout(budget, self.manager.send(frame)).await {
            Err(_) => Err(EngineError::Timeout(budget)),
            Ok(Err(e)) => {
                self.announce_failure(&e);
                Err(e.into())
            }
            Ok(Ok(reply)) => {
                if !reply.is_empty() {
                    self.emit(EngineEvent::DeviceOutput(reply.text()));
                }
                Ok(reply)
            }
        }
    }

    async fn send(&mut self, command: Command) -> Result<Reply, EngineError> {
        self.ensure_connected()?;
        let frame = command.encode()?;
        let reply = self.exchange(&frame).await?;
        info!(command = %command, "command sent");
        self.emit(EngineEvent::CommandSent(command.to_string()));
        Ok(reply)
    }

    async fn send_schedules(&mut self) -> Result<usize, EngineError> {
        if self.store.is_empty() {
            return Err(EngineError::EmptyQueue);
        }
        self.ensure_connected()?;

        let frame = self.store.encode_batch()?;
        self.exchange(&frame).await?;

        let count = self.store.remove_all();
        info!(count, "schedules sent");
        self.emit(EngineEvent::SchedulesSent { count });
        Ok(count)
    }

    async fn download_log(&mut self) -> Result<Option<PathBuf>, EngineError> {
        self.ensure_connected()?;

        let deadline = Instant::now() + self.config.command_timeout();
        let downloader = self.downloader.clone();
        let transport = self.manager.transport_mut()?;
        let result = downloader.download_until(transport, deadline).await;

        match result {
            Ok(transfer) => self.deliver_log(&transfer.text(), true).await,
            Err(error) => {
                if let Some(partial) = error.partial() {
                    let text = String::from_utf8_lossy(partial).into_owned();
                    if let Err(save_error) = self.deliver_log(&text, false).await {
                        warn!(error = %save_error, "partial log not saved");
                    }
                }
                if let LogError::Transport(e) = &error {
                    if e.is_link_failure() {
                        self.manager.on_failure(e).await;
                        self.announce_failure(e);
                    }
                }
                Err(error.into())
            }
        }
    }

    /// Preview a log and offer it to the sink
    async fn deliver_log(&mut self, text: &str, complete: bool) -> Result<Option<PathBuf>, EngineError> {
        self.emit(EngineEvent::LogPreview {
            text: preview(text),
            complete,
        });
        let name = suggested_filename(self.clock.now());
        self.save(&name, text).await
    }

    async fn save(&mut self, name: &str, text: &str) -> Result<Option<PathBuf>, EngineError> {
        match self.sink.save(name, text).await? {
            Some(path) => {
                info!(path = %path.display(), "saved");
                self.emit(EngineEvent::Saved(path.clone()));
                Ok(Some(path))
            }
            None => {
                info!(name, "save cancelled");
                self.emit(EngineEvent::SaveCancelled);
                Ok(None)
            }
        }
    }

    async fn export_schedules(&mut self) -> Result<Option<PathBuf>, EngineError> {
        if self.store.is_empty() {
            return Err(EngineError::EmptyQueue);
        }
        let now = self.clock.now();
        let text = self.store.export_to_string(now);
        let name = format!("schedules_{}.txt", now.format("%Y%m%d_%H%M%S"));
        self.save(&name, &text).await
    }

    fn import_schedules(&mut self, text: &str) -> Result<ImportReport, EngineError> {
        let report = self.store.import(text.as_bytes())?;
        self.emit(EngineEvent::SchedulesImported {
            imported: report.imported,
            skipped: report.skipped.len(),
        });
        Ok(report)
    }

    /// Surface console output the device printed on its own
    async fn poll_output(&mut self) {
        match self.manager.drain_output().await {
            Ok(bytes) if !bytes.is_empty() => {
                let text = String::from_utf8_lossy(&bytes).trim().to_string();
                if !text.is_empty() {
                    self.emit(EngineEvent::DeviceOutput(text));
                }
            }
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "console read failed");
                self.announce_failure(&e);
            }
        }
    }
}
