use std::collections::{HashMap, VecDeque};

use crate::utils::errors::CalcError;
use crate::utils::types::{Rank, Tag};

#[derive(Debug, Clone, PartialEq)]
pub enum Payload<T> {
    Scalar(u64),
    Buffer(Vec<T>),
}

impl<T> Payload<T> {
    pub fn into_scalar(self, source: Rank, tag: Tag) -> Result<u64, CalcError> {
        match self {
            Payload::Scalar(v) => Ok(v),
            Payload::Buffer(_) => Err(CalcError::transport(format!(
                "expected a scalar from rank {source} on tag {tag}, got a buffer"
            ))),
        }
    }

    pub fn into_buffer(self, count: usize, source: Rank, tag: Tag) -> Result<Vec<T>, CalcError> {
        match self {
            Payload::Buffer(data) if data.len() == count => Ok(data),
            Payload::Buffer(data) => Err(CalcError::transport(format!(
                "expected {count} elements from rank {source} on tag {tag}, got {}",
                data.len()
            ))),
            Payload::Scalar(_) => Err(CalcError::transport(format!(
                "expected a buffer from rank {source} on tag {tag}, got a scalar"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub source: Rank,
    pub tag: Tag,
    pub payload: Payload<T>,
}

/// Messages that arrived before anyone asked for their (source, tag).
#[derive(Debug)]
pub struct Mailbox<T> {
    pending: HashMap<(Rank, Tag), VecDeque<Payload<T>>>,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }
}

impl<T> Mailbox<T> {
    pub fn stash(&mut self, envelope: Envelope<T>) {
        self.pending
            .entry((envelope.source, envelope.tag))
            .or_default()
            .push_back(envelope.payload);
    }

    /// Oldest pending payload for (source, tag), if any.
    pub fn take(&mut self, source: Rank, tag: Tag) -> Option<Payload<T>> {
        let queue = self.pending.get_mut(&(source, tag))?;
        let payload = queue.pop_front();
        if queue.is_empty() {
            self.pending.remove(&(source, tag));
        }
        payload
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
