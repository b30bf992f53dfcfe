//! In-process transport over crossbeam channels.
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use tracing::trace;

use crate::transport::message::{Envelope, Mailbox, Payload};
use crate::transport::{COORDINATOR, Transport};
use crate::utils::errors::CalcError;
use crate::utils::types::{Rank, Scalar, Tag};

/// One endpoint of a star of in-process channels.
///
/// The coordinator can reach every worker; workers can only reach the
/// coordinator. Once every peer that could send to an endpoint is dropped,
/// its receives fail instead of blocking.
pub struct ChannelTransport<T> {
    rank: Rank,
    outbound: Vec<Option<Sender<Envelope<T>>>>,
    inbox: Receiver<Envelope<T>>,
    mailbox: Mailbox<T>,
    recv_timeout: Option<Duration>,
}

/// Builds `size` connected endpoints; index `i` of the result has rank `i`.
pub fn star<T>(size: usize) -> Vec<ChannelTransport<T>> {
    let size = size.max(1);
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();

    receivers
        .into_iter()
        .enumerate()
        .map(|(rank, inbox)| {
            let outbound = (0..size)
                .map(|target| {
                    let reachable = if rank == COORDINATOR {
                        target != COORDINATOR
                    } else {
                        target == COORDINATOR
                    };
                    reachable.then(|| senders[target].clone())
                })
                .collect();
            ChannelTransport {
                rank,
                outbound,
                inbox,
                mailbox: Mailbox::default(),
                recv_timeout: None,
            }
        })
        .collect()
}

impl<T> ChannelTransport<T> {
    /// Bounds every receive; `None` blocks until a message arrives.
    pub fn with_recv_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.recv_timeout = timeout;
        self
    }

    fn post(&self, target: Rank, tag: Tag, payload: Payload<T>) -> Result<(), CalcError> {
        let sender = self
            .outbound
            .get(target)
            .and_then(Option::as_ref)
            .ok_or_else(|| CalcError::transport(format!("rank {} has no route to rank {target}", self.rank)))?;
        sender
            .send(Envelope {
                source: self.rank,
                tag,
                payload,
            })
            .map_err(|_| CalcError::transport(format!("rank {target} is gone")))
    }

    fn receive(&mut self, source: Rank, tag: Tag) -> Result<Payload<T>, CalcError> {
        if let Some(payload) = self.mailbox.take(source, tag) {
            return Ok(payload);
        }
        loop {
            let envelope = match self.recv_timeout {
                Some(timeout) => self.inbox.recv_timeout(timeout).map_err(|e| match e {
                    RecvTimeoutError::Timeout => CalcError::transport(format!(
                        "timed out after {timeout:?} waiting for rank {source} on tag {tag}"
                    )),
                    RecvTimeoutError::Disconnected => disconnected(self.rank, source, tag),
                })?,
                None => self
                    .inbox
                    .recv()
                    .map_err(|_| disconnected(self.rank, source, tag))?,
            };
            if envelope.source == source && envelope.tag == tag {
                return Ok(envelope.payload);
            }
            trace!(rank = self.rank, from = envelope.source, tag = envelope.tag, "stashing early message");
            self.mailbox.stash(envelope);
        }
    }
}

fn disconnected(rank: Rank, source: Rank, tag: Tag) -> CalcError {
    CalcError::transport(format!(
        "rank {rank} lost every peer while waiting for rank {source} on tag {tag}"
    ))
}

impl<T: Scalar> Transport<T> for ChannelTransport<T> {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.outbound.len()
    }

    fn send_scalar(&mut self, value: u64, target: Rank, tag: Tag) -> Result<(), CalcError> {
        self.post(target, tag, Payload::Scalar(value))
    }

    fn recv_scalar(&mut self, source: Rank, tag: Tag) -> Result<u64, CalcError> {
        self.receive(source, tag)?.into_scalar(source, tag)
    }

    fn send_buffer(&mut self, data: &[T], target: Rank, tag: Tag) -> Result<(), CalcError> {
        self.post(target, tag, Payload::Buffer(data.to_vec()))
    }

    fn recv_buffer(&mut self, count: usize, source: Rank, tag: Tag) -> Result<Vec<T>, CalcError> {
        self.receive(source, tag)?.into_buffer(count, source, tag)
    }
}
