use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::HostConfig;
use crate::dispatcher;
use crate::transport::Transport;

const COMPONENT: &str = "Controller";

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{0} cannot be missing")]
    MissingCollaborator(&'static str),

    #[error("controller not yet started")]
    NotStarted,

    #[error("dispatch loop exited before signalling readiness")]
    StartupAborted,

    #[error("dispatch loop task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Handed to a dispatch loop, which fires it once it has begun running.
pub struct ReadySignal {
    sender: oneshot::Sender<()>,
}

impl ReadySignal {
    pub fn new(sender: oneshot::Sender<()>) -> Self {
        Self { sender }
    }

    pub fn signal(self) {
        // The controller only goes away if its own task was dropped
        let _ = self.sender.send(());
    }
}

/// Cooperative cancellation token observed by a dispatch loop.
///
/// Loops poll it at their own boundaries; a stop request is not seen while
/// an exchange is in flight.
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    running: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new(running: watch::Receiver<bool>) -> Self {
        Self { running }
    }

    /// A signal that never requests shutdown.
    pub fn never() -> Self {
        let (_sender, running) = watch::channel(true);
        Self { running }
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }
}

/// Requests a cooperative stop without waiting for the loop to exit.
#[derive(Clone, Debug)]
pub struct StopHandle {
    running: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        self.running.send_replace(false);
    }
}

/// Body of the dispatch execution context.
///
/// Implementations must call [`ReadySignal::signal`] as their first action.
#[async_trait]
pub trait DispatchLoop: Send + 'static {
    async fn run(&mut self, ready: ReadySignal, shutdown: ShutdownSignal);
}

/// Owns the dispatch loop task: starts it with a startup rendezvous and
/// stops it by signalling and joining.
pub struct Controller<T: Transport, L: DispatchLoop> {
    transport: Option<Arc<T>>,
    config: Option<Arc<HostConfig>>,
    running: Option<Arc<watch::Sender<bool>>>,
    handle: Option<JoinHandle<L>>,
}

pub struct ControllerBuilder<T: Transport, L: DispatchLoop> {
    transport: Option<Arc<T>>,
    dispatch_loop: Option<L>,
    config: Option<Arc<HostConfig>>,
}

impl<T: Transport, L: DispatchLoop> Controller<T, L> {
    pub fn builder() -> ControllerBuilder<T, L> {
        ControllerBuilder {
            transport: None,
            dispatch_loop: None,
            config: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    pub fn transport(&self) -> Option<&Arc<T>> {
        self.transport.as_ref()
    }

    pub fn config(&self) -> Option<&HostConfig> {
        self.config.as_deref()
    }

    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.running.as_ref().map(|running| StopHandle {
            running: Arc::clone(running),
        })
    }

    /// Signal the loop to terminate, wait until its task has exited and
    /// return the loop.
    pub async fn stop(&mut self) -> Result<L, ControllerError> {
        let Some(running) = self.running.as_ref() else {
            return Err(ControllerError::NotStarted);
        };
        log_info!(COMPONENT, "Stopping dispatch loop");
        running.send_replace(false);
        self.join().await
    }

    /// Wait for the loop to end on its own and return it.
    pub async fn wait(&mut self) -> Result<L, ControllerError> {
        if self.handle.is_none() {
            return Err(ControllerError::NotStarted);
        }
        self.join().await
    }

    async fn join(&mut self) -> Result<L, ControllerError> {
        let handle = self.handle.take().ok_or(ControllerError::NotStarted)?;
        let result = handle.await;
        self.transport = None;
        self.config = None;
        self.running = None;
        let dispatch_loop = result?;
        log_info!(COMPONENT, "Dispatch loop exited");
        Ok(dispatch_loop)
    }
}

impl<T: Transport, L: DispatchLoop> ControllerBuilder<T, L> {
    pub fn transport(mut self, transport: Arc<T>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn dispatch_loop(mut self, dispatch_loop: L) -> Self {
        self.dispatch_loop = Some(dispatch_loop);
        self
    }

    pub fn config(mut self, config: Arc<HostConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Start the dispatch loop and return once it has signalled that it is
    /// running.
    pub async fn start(self) -> Result<Controller<T, L>, ControllerError> {
        let transport = self
            .transport
            .ok_or(ControllerError::MissingCollaborator("transport"))?;
        let mut dispatch_loop = self
            .dispatch_loop
            .ok_or(ControllerError::MissingCollaborator("dispatch loop"))?;
        let config = self
            .config
            .ok_or(ControllerError::MissingCollaborator("configuration"))?;

        let drained = dispatcher::drain(transport.as_ref()).await;
        log_info!(
            COMPONENT,
            "Starting dispatch loop for node {} on network {} ({} stale frames drained)",
            config.node_id,
            config.nwk_id,
            drained
        );

        let (ready_sender, ready) = oneshot::channel();
        let (running, running_receiver) = watch::channel(true);
        let shutdown = ShutdownSignal::new(running_receiver);
        let handle = tokio::spawn(async move {
            dispatch_loop
                .run(ReadySignal::new(ready_sender), shutdown)
                .await;
            dispatch_loop
        });

        if ready.await.is_err() {
            log_error!(COMPONENT, "Dispatch loop ended before signalling readiness");
            handle.await?;
            return Err(ControllerError::StartupAborted);
        }
        log_info!(COMPONENT, "Dispatch loop running");

        Ok(Controller {
            transport: Some(transport),
            config: Some(config),
            running: Some(Arc::new(running)),
            handle: Some(handle),
        })
    }
}
