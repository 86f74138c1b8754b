use std::fmt::Display;
use std::task::{Context, Poll};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{Receiver, Sender};

/// Fixed identifiers of the channels a reactor can carry. Each may be
/// registered once per reactor.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ChannelId {
    PortForward,
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelId::PortForward => write!(f, "portfwd"),
        }
    }
}

/// Receiving end of a reactor channel. Called on the reactor thread only,
/// once per delivered message, and must not block.
pub trait ChannelHandler: Send + 'static {
    type Message: Send + 'static;

    fn receive(&mut self, message: Self::Message);
}

pub struct ChannelSender<M> {
    sender: Sender<M>,
}

impl<M> Clone for ChannelSender<M> {
    fn clone(&self) -> Self {
        ChannelSender {
            sender: self.sender.clone(),
        }
    }
}

impl<M> ChannelSender<M> {
    pub(crate) fn new(sender: Sender<M>) -> Self {
        ChannelSender { sender }
    }

    /// Queues `message` and wakes the reactor. Never blocks; a full or closed
    /// channel hands the message back inside the error.
    pub fn try_send(&self, message: M) -> Result<(), TrySendError<M>> {
        self.sender.try_send(message)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

pub(crate) enum SlotPoll {
    Dispatched(usize),
    Idle,
    Closed,
}

pub(crate) trait ChannelSlot: Send {
    fn id(&self) -> ChannelId;

    fn poll_dispatch(&mut self, cx: &mut Context<'_>, budget: usize) -> SlotPoll;

    fn close(&mut self);
}

pub(crate) struct Slot<H: ChannelHandler> {
    id: ChannelId,
    receiver: Receiver<H::Message>,
    handler: H,
}

impl<H: ChannelHandler> Slot<H> {
    pub(crate) fn new(id: ChannelId, receiver: Receiver<H::Message>, handler: H) -> Self {
        Slot {
            id,
            receiver,
            handler,
        }
    }
}

impl<H: ChannelHandler> ChannelSlot for Slot<H> {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn poll_dispatch(&mut self, cx: &mut Context<'_>, budget: usize) -> SlotPoll {
        let mut dispatched = 0;
        while dispatched < budget {
            match self.receiver.poll_recv(cx) {
                Poll::Ready(Some(message)) => {
                    self.handler.receive(message);
                    dispatched += 1;
                }

                Poll::Ready(None) => {
                    return if dispatched > 0 {
                        SlotPoll::Dispatched(dispatched)
                    } else {
                        SlotPoll::Closed
                    };
                }

                Poll::Pending => break,
            }
        }

        if dispatched > 0 {
            SlotPoll::Dispatched(dispatched)
        } else {
            SlotPoll::Idle
        }
    }

    fn close(&mut self) {
        self.receiver.close();
    }
}
