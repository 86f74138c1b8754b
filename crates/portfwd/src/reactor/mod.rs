use std::task::{Context, Poll};
use std::thread::{JoinHandle, ThreadId};

use futures::future::poll_fn;
use log::{debug, info, trace, warn};
use tokio::select;
use tokio::sync::mpsc::channel;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

use self::channel::{ChannelSlot, Slot, SlotPoll};

pub mod channel;

pub use self::channel::{ChannelHandler, ChannelId, ChannelSender};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
const DISPATCH_BUDGET: usize = 64;
const REACTOR_THREAD_NAME: &str = "portfwd-reactor";

/// Single-threaded event loop owning every registered channel handler.
///
/// Channels are registered before [`Reactor::launch`]; afterwards the handlers
/// only ever run on the reactor thread, so whatever state they own has a
/// single writer.
pub struct Reactor {
    capacity: usize,
    slots: Vec<Box<dyn ChannelSlot>>,
}

enum ReactorSelect {
    Shutdown,
    Dispatched(Option<usize>),
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reactor {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Reactor {
            capacity: capacity.max(1),
            slots: Vec::new(),
        }
    }

    pub fn add_channel<H: ChannelHandler>(
        &mut self,
        id: ChannelId,
        handler: H,
    ) -> Result<ChannelSender<H::Message>> {
        if self.slots.iter().any(|slot| slot.id() == id) {
            return Err(Error::ChannelInUse(id));
        }

        let (sender, receiver) = channel(self.capacity);
        self.slots.push(Box::new(Slot::new(id, receiver, handler)));
        debug!("registered reactor channel {}", id);
        Ok(ChannelSender::new(sender))
    }

    pub fn launch(self) -> Result<ReactorHandle> {
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let thread = std::thread::Builder::new()
            .name(REACTOR_THREAD_NAME.to_string())
            .spawn(move || -> Result<()> {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                let result = runtime.block_on(self.run(shutdown_receiver));
                if let Err(ref error) = result {
                    warn!("reactor failed: {}", error);
                }
                result
            })?;
        let thread_id = thread.thread().id();
        Ok(ReactorHandle {
            shutdown: Some(shutdown_sender),
            thread: Some(thread),
            thread_id,
        })
    }

    /// Dispatches channel messages until shutdown is requested or every
    /// sender is gone. On shutdown the channels are closed and whatever was
    /// already queued is still delivered.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> Result<()> {
        info!("reactor started with {} channel(s)", self.slots.len());
        let mut closing = false;
        loop {
            let selection = select! {
                biased;
                _ = &mut shutdown, if !closing => ReactorSelect::Shutdown,
                x = poll_fn(|cx| self.poll_channels(cx)) => ReactorSelect::Dispatched(x),
            };

            match selection {
                ReactorSelect::Shutdown => {
                    debug!("reactor shutdown requested, draining channels");
                    closing = true;
                    for slot in self.slots.iter_mut() {
                        slot.close();
                    }
                }

                ReactorSelect::Dispatched(Some(count)) => {
                    trace!("reactor dispatched {} message(s)", count);
                }

                ReactorSelect::Dispatched(None) => break,
            }
        }
        info!("reactor stopped");
        Ok(())
    }

    fn poll_channels(&mut self, cx: &mut Context<'_>) -> Poll<Option<usize>> {
        let mut dispatched = 0;
        let mut open = 0;
        for slot in self.slots.iter_mut() {
            match slot.poll_dispatch(cx, DISPATCH_BUDGET) {
                SlotPoll::Dispatched(count) => {
                    dispatched += count;
                    open += 1;
                }
                SlotPoll::Idle => open += 1,
                SlotPoll::Closed => {}
            }
        }

        if dispatched > 0 {
            Poll::Ready(Some(dispatched))
        } else if open == 0 {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }
}

pub struct ReactorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<Result<()>>>,
    thread_id: ThreadId,
}

impl ReactorHandle {
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Stops the reactor after it has delivered every queued message, then
    /// joins its thread.
    pub fn shutdown(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| Error::ReactorPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for ReactorHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
