use std::collections::HashMap;
use std::time::Duration;
use futures::channel::mpsc::{channel, unbounded, Receiver, Sender, UnboundedSender};
use futures::channel::oneshot;
use futures::{SinkExt, StreamExt};
use log::{debug, info};
use tokio::spawn;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::types::LinkConfig;
use crate::device::adapter::{Adapter, Scheduler};
use crate::device::constants::{COMMAND_ARM, COMMAND_DISARM, COMMAND_PING, COMMAND_STATUS};
use crate::device::session::Session;
use crate::device::types::{LinkEvent, Snapshot, TimerId, TimerKind};
use crate::error::LinkError;

const EVENT_QUEUE_SIZE: usize = 64;

/// The queue every adapter callback and timer expiry is funnelled through.
pub fn event_queue() -> (Sender<LinkEvent>, Receiver<LinkEvent>) {
    channel::<LinkEvent>(EVENT_QUEUE_SIZE)
}

/// Timers backed by tokio sleeps. Each timer is a task racing its sleep against a cancellation
/// token; if the sleep wins, `TimerFired` is queued like any other event.
pub struct TokioScheduler {
    events: Sender<LinkEvent>,
    cancel: CancellationToken,
    timers: HashMap<TimerId, CancellationToken>,
}

impl TokioScheduler {
    pub fn new(events: Sender<LinkEvent>, cancel: CancellationToken) -> Self {
        TokioScheduler { events, cancel, timers: HashMap::new() }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, id: TimerId, kind: TimerKind, after: Duration) {
        let token = self.cancel.child_token();
        self.timers.insert(id, token.clone());
        let mut events = self.events.clone();

        spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {},
                _ = sleep(after) => {
                    debug!("{:?} {:?} fired", kind, id);
                    // the receiver is gone when the link shuts down
                    let _ = events.send(LinkEvent::TimerFired(id)).await;
                },
            }
        });
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(token) = self.timers.remove(&id) {
            token.cancel();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, token) in self.timers.drain() {
            token.cancel();
        }
    }
}

enum LinkRequest {
    Command(String, oneshot::Sender<Result<(), LinkError>>),
    Reconnect,
    ClearLogs,
}

/// The handle the UI holds on to. Cloning it is cheap; the link stops when `shutdown` is called.
#[derive(Clone)]
pub struct LinkHandle {
    requests: UnboundedSender<LinkRequest>,
    snapshots: watch::Receiver<Snapshot>,
    cancel: CancellationToken,
}

impl LinkHandle {
    pub async fn send_command(&self, token: &str) -> Result<(), LinkError> {
        let (reply, response) = oneshot::channel();

        self.requests
            .unbounded_send(LinkRequest::Command(token.to_string(), reply))
            .map_err(|_| LinkError::Stopped)?;

        response.await.map_err(|_| LinkError::Stopped)?
    }

    pub async fn arm(&self) -> Result<(), LinkError> {
        self.send_command(COMMAND_ARM).await
    }

    pub async fn disarm(&self) -> Result<(), LinkError> {
        self.send_command(COMMAND_DISARM).await
    }

    pub async fn request_status(&self) -> Result<(), LinkError> {
        self.send_command(COMMAND_STATUS).await
    }

    pub async fn ping(&self) -> Result<(), LinkError> {
        self.send_command(COMMAND_PING).await
    }

    pub fn reconnect(&self) -> Result<(), LinkError> {
        self.requests.unbounded_send(LinkRequest::Reconnect).map_err(|_| LinkError::Stopped)
    }

    pub fn clear_logs(&self) -> Result<(), LinkError> {
        self.requests.unbounded_send(LinkRequest::ClearLogs).map_err(|_| LinkError::Stopped)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that is notified every time the published state changes.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Runs a [`Session`] on its own task. Events from `events` and requests from the returned
/// [`LinkHandle`] are applied one at a time, so the session never sees concurrent mutation.
pub fn spawn_link<A>(
    config: LinkConfig,
    adapter: A,
    events: (Sender<LinkEvent>, Receiver<LinkEvent>),
    cancel: CancellationToken,
) -> (LinkHandle, JoinHandle<()>)
where
    A: Adapter + Send + 'static,
{
    let (event_sender, mut event_receiver) = events;
    let (request_sender, mut request_receiver) = unbounded::<LinkRequest>();

    let scheduler = TokioScheduler::new(event_sender, cancel.child_token());
    let mut session = Session::new(config, adapter, scheduler);

    let (snapshot_sender, snapshot_receiver) = watch::channel(session.snapshot());
    session.set_observer(move |snapshot| {
        snapshot_sender.send_replace(snapshot.clone());
    });

    let handle = LinkHandle {
        requests: request_sender,
        snapshots: snapshot_receiver,
        cancel: cancel.clone(),
    };

    let join_handle = spawn(async move {
        session.start();

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                event = event_receiver.next() => match event {
                    Some(event) => session.handle_event(event),
                    None => break 'mainloop,
                },
                Some(request) = request_receiver.next() => match request {
                    LinkRequest::Command(token, reply) => {
                        // the caller may have given up waiting
                        let _ = reply.send(session.send_command(&token));
                    },
                    LinkRequest::Reconnect => session.reconnect(),
                    LinkRequest::ClearLogs => session.clear_logs(),
                },
            }
        }

        info!("Link stopped");
    });

    (handle, join_handle)
}
