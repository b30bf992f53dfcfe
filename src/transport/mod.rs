//! Point-to-point messaging between the coordinator and its workers.
//!
//! Every send and receive is blocking and tagged. A receiver always knows
//! the element count of a buffer before asking for it; the protocol sends
//! sizes on their own channel ahead of each payload.
pub mod channel;
pub mod flat;
pub mod message;
pub mod registry;
pub mod tcp;

use crate::utils::errors::CalcError;
use crate::utils::types::{Rank, Scalar, Tag};

/// Rank of the coordinator in every transport.
pub const COORDINATOR: Rank = 0;

pub trait Transport<T: Scalar> {
    /// Rank of this endpoint.
    fn rank(&self) -> Rank;

    /// Number of participants, coordinator included.
    fn size(&self) -> usize;

    fn is_coordinator(&self) -> bool {
        self.rank() == COORDINATOR
    }

    fn send_scalar(&mut self, value: u64, target: Rank, tag: Tag) -> Result<(), CalcError>;

    fn recv_scalar(&mut self, source: Rank, tag: Tag) -> Result<u64, CalcError>;

    fn send_buffer(&mut self, data: &[T], target: Rank, tag: Tag) -> Result<(), CalcError>;

    /// Receives exactly `count` elements; any other length is a transport failure.
    fn recv_buffer(&mut self, count: usize, source: Rank, tag: Tag) -> Result<Vec<T>, CalcError>;
}
