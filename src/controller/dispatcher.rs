//! Single-writer event loop for a unit
//!
//! All unit state is owned by one task that drains an mpsc channel, so at
//! most one handler or reconciliation runs at a time. Deferred and failed
//! events are re-sent into the same channel after a delay.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Error, Result};
use crate::peers::PeerBus;
use crate::runtime::{self, WorkloadRuntime};

use super::reconciler::Intent;
use super::unit::{AgentUnit, UnitEvent};

pub const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(5);
const EVENT_BUFFER: usize = 64;

/// Cloneable sender used by event sources
#[derive(Clone, Debug)]
pub struct UnitHandle {
    tx: mpsc::Sender<UnitEvent>,
}

impl UnitHandle {
    pub async fn send(&self, event: UnitEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| Error::ChannelClosed)
    }
}

/// Result of handling one event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// The runtime was not ready; the event should be delivered again
    Deferred,
}

pub struct Dispatcher<R: ?Sized, B: ?Sized> {
    unit: AgentUnit,
    runtime: Arc<R>,
    bus: Arc<B>,
    rx: mpsc::Receiver<UnitEvent>,
    requeue: mpsc::WeakSender<UnitEvent>,
    requeue_delay: Duration,
}

/// How long to wait before retrying an event whose handling failed
pub fn error_policy(error: &Error) -> Duration {
    if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    }
}

impl<R, B> Dispatcher<R, B>
where
    R: WorkloadRuntime + ?Sized + 'static,
    B: PeerBus + ?Sized + 'static,
{
    pub fn new(
        unit: AgentUnit,
        runtime: Arc<R>,
        bus: Arc<B>,
        requeue_delay: Duration,
    ) -> (Self, UnitHandle) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let dispatcher = Self {
            unit,
            runtime,
            bus,
            rx,
            requeue: tx.downgrade(),
            requeue_delay,
        };
        (dispatcher, UnitHandle { tx })
    }

    pub fn unit(&self) -> &AgentUnit {
        &self.unit
    }

    /// Drain events until every [`UnitHandle`] is dropped
    #[instrument(skip(self), fields(unit = %self.unit.unit_name()))]
    pub async fn run(mut self) -> Result<()> {
        info!("Starting unit dispatcher");

        while let Some(event) = self.rx.recv().await {
            match self.dispatch(&event).await {
                Ok(Outcome::Done) => {}
                Ok(Outcome::Deferred) => {
                    debug!("Deferring {} event", event.kind());
                    self.requeue_after(event.retry(), self.requeue_delay);
                }
                Err(e) => {
                    error!("Handling {} event failed: {}", event.kind(), e);
                    let delay = error_policy(&e);
                    self.requeue_after(event.retry(), delay);
                }
            }
        }

        info!("Unit event channel closed, dispatcher stopping");
        Ok(())
    }

    /// Handle one event and carry out the resulting intents in order
    ///
    /// Failures of the runtime or the peer bus abort the attempt and are
    /// returned to the caller.
    pub async fn dispatch(&mut self, event: &UnitEvent) -> Result<Outcome> {
        debug!("Handling {} event", event.kind());
        let mut pending: VecDeque<Intent> = self.unit.handle(event).into();
        let mut outcome = Outcome::Done;

        while let Some(intent) = pending.pop_front() {
            match intent {
                Intent::Reconcile => {
                    let snapshot = runtime::snapshot(self.runtime.as_ref()).await?;
                    for next in self.unit.reconcile(snapshot).into_iter().rev() {
                        pending.push_front(next);
                    }
                }
                Intent::ApplySpec(spec) => {
                    self.runtime.apply(&spec).await?;
                    self.unit.set_restart_pending(true);
                    self.restart(&spec.name).await?;
                }
                Intent::Restart(service) => self.restart(&service).await?,
                Intent::SetStatus(status) => {
                    self.runtime.report_status(&status).await?;
                }
                Intent::Publish {
                    remote_unit,
                    announcement,
                } => {
                    self.bus.publish(&remote_unit, &announcement).await?;
                }
                Intent::Defer => outcome = Outcome::Deferred,
            }
        }

        Ok(outcome)
    }

    /// The pending flag is only cleared once the runtime confirms the restart
    async fn restart(&mut self, service: &str) -> Result<()> {
        self.runtime.restart(service).await?;
        self.unit.set_restart_pending(false);
        Ok(())
    }

    fn requeue_after(&self, event: UnitEvent, delay: Duration) {
        let Some(tx) = self.requeue.upgrade() else {
            warn!("Dropping {} event: dispatcher is shutting down", event.kind());
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(event).await.is_err() {
                debug!("Requeue target closed before redelivery");
            }
        });
    }
}
