//! TCP transport for workers running as separate processes or machines.
//!
//! Star topology: each worker holds one connection to the coordinator.
//! On connect a worker sends its rank and the coordinator answers with the
//! world size. Every message is framed as
//!
//! ```text
//! tag: u32 | kind: u8 | len: u64 | payload
//! ```
//!
//! where the payload is a single `u64` for scalars or `len` little-endian
//! elements for buffers.
use std::io::{self, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, trace};

use crate::transport::message::{Envelope, Mailbox, Payload};
use crate::transport::{COORDINATOR, Transport};
use crate::utils::errors::CalcError;
use crate::utils::types::{Rank, Scalar, Tag};

const KIND_SCALAR: u8 = 0;
const KIND_BUFFER: u8 = 1;

struct Link {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Link {
    fn new(stream: TcpStream, recv_timeout: Option<Duration>) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(recv_timeout)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            reader,
            writer: BufWriter::new(stream),
        })
    }

    fn write_frame<T: Scalar>(&mut self, tag: Tag, payload: &FrameRef<'_, T>) -> io::Result<()> {
        self.writer.write_u32::<LittleEndian>(tag)?;
        match payload {
            FrameRef::Scalar(value) => {
                self.writer.write_u8(KIND_SCALAR)?;
                self.writer.write_u64::<LittleEndian>(1)?;
                self.writer.write_u64::<LittleEndian>(*value)?;
            }
            FrameRef::Buffer(data) => {
                self.writer.write_u8(KIND_BUFFER)?;
                self.writer.write_u64::<LittleEndian>(data.len() as u64)?;
                for &value in data.iter() {
                    value.write_le(&mut self.writer)?;
                }
            }
        }
        self.writer.flush()
    }

    fn read_frame<T: Scalar>(&mut self, source: Rank) -> io::Result<Envelope<T>> {
        let tag = self.reader.read_u32::<LittleEndian>()?;
        let kind = self.reader.read_u8()?;
        let len = self.reader.read_u64::<LittleEndian>()?;
        let payload = match kind {
            KIND_SCALAR => Payload::Scalar(self.reader.read_u64::<LittleEndian>()?),
            KIND_BUFFER => {
                let len = usize::try_from(len)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "buffer length overflows usize"))?;
                let mut data = Vec::with_capacity(len.min(1 << 20));
                for _ in 0..len {
                    data.push(T::read_le(&mut self.reader)?);
                }
                Payload::Buffer(data)
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown frame kind {other}"),
                ));
            }
        };
        Ok(Envelope { source, tag, payload })
    }
}

enum FrameRef<'a, T> {
    Scalar(u64),
    Buffer(&'a [T]),
}

/// Bound coordinator socket waiting for its workers.
pub struct TcpRendezvous {
    listener: TcpListener,
    recv_timeout: Option<Duration>,
}

impl TcpRendezvous {
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self, CalcError> {
        let listener = TcpListener::bind(addr).map_err(|e| io_failure("bind", e))?;
        Ok(Self {
            listener,
            recv_timeout: None,
        })
    }

    pub fn with_recv_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, CalcError> {
        self.listener.local_addr().map_err(|e| io_failure("local_addr", e))
    }

    /// Blocks until ranks `1..size` have all connected.
    pub fn accept<T: Scalar>(self, size: usize) -> Result<TcpTransport<T>, CalcError> {
        let size = size.max(1);
        let mut links: Vec<Option<Link>> = (0..size).map(|_| None).collect();

        for _ in 1..size {
            let (mut stream, peer) = self.listener.accept().map_err(|e| io_failure("accept", e))?;
            stream
                .set_read_timeout(self.recv_timeout)
                .map_err(|e| io_failure("configure", e))?;
            let rank = stream
                .read_u64::<LittleEndian>()
                .map_err(|e| io_failure("handshake", e))? as Rank;
            if rank == COORDINATOR || rank >= size {
                return Err(CalcError::transport(format!("{peer} announced rank {rank} outside 1..{size}")));
            }
            if links[rank].is_some() {
                return Err(CalcError::transport(format!("{peer} announced duplicate rank {rank}")));
            }
            stream
                .write_u64::<LittleEndian>(size as u64)
                .map_err(|e| io_failure("handshake", e))?;
            debug!(rank, %peer, "worker connected");
            links[rank] = Some(Link::new(stream, self.recv_timeout).map_err(|e| io_failure("configure", e))?);
        }

        Ok(TcpTransport {
            rank: COORDINATOR,
            links,
            mailbox: Mailbox::default(),
            _scalar: PhantomData,
        })
    }
}

pub struct TcpTransport<T> {
    rank: Rank,
    links: Vec<Option<Link>>,
    mailbox: Mailbox<T>,
    _scalar: PhantomData<T>,
}

impl<T: Scalar> TcpTransport<T> {
    /// Connects a worker to the coordinator at `addr` and learns the world size.
    pub fn connect(
        addr: impl ToSocketAddrs,
        rank: Rank,
        recv_timeout: Option<Duration>,
    ) -> Result<Self, CalcError> {
        if rank == COORDINATOR {
            return Err(CalcError::transport("the coordinator does not connect, it accepts"));
        }
        let mut stream = TcpStream::connect(addr).map_err(|e| io_failure("connect", e))?;
        stream
            .set_read_timeout(recv_timeout)
            .map_err(|e| io_failure("configure", e))?;
        stream
            .write_u64::<LittleEndian>(rank as u64)
            .map_err(|e| io_failure("handshake", e))?;
        let size = stream
            .read_u64::<LittleEndian>()
            .map_err(|e| io_failure("handshake", e))? as usize;
        if rank >= size {
            return Err(CalcError::transport(format!("rank {rank} outside world of size {size}")));
        }

        let mut links: Vec<Option<Link>> = (0..size).map(|_| None).collect();
        links[COORDINATOR] = Some(Link::new(stream, recv_timeout).map_err(|e| io_failure("configure", e))?);
        Ok(Self {
            rank,
            links,
            mailbox: Mailbox::default(),
            _scalar: PhantomData,
        })
    }

    fn link(&mut self, peer: Rank) -> Result<&mut Link, CalcError> {
        let rank = self.rank;
        self.links
            .get_mut(peer)
            .and_then(Option::as_mut)
            .ok_or_else(|| CalcError::transport(format!("rank {rank} has no route to rank {peer}")))
    }

    fn send(&mut self, target: Rank, tag: Tag, frame: FrameRef<'_, T>) -> Result<(), CalcError> {
        self.link(target)?
            .write_frame(tag, &frame)
            .map_err(|e| io_failure("send", e))
    }

    fn receive(&mut self, source: Rank, tag: Tag) -> Result<Payload<T>, CalcError> {
        if let Some(payload) = self.mailbox.take(source, tag) {
            return Ok(payload);
        }
        loop {
            let envelope = self
                .link(source)?
                .read_frame::<T>(source)
                .map_err(|e| io_failure("receive", e))?;
            if envelope.tag == tag {
                return Ok(envelope.payload);
            }
            trace!(rank = self.rank, from = source, tag = envelope.tag, "stashing early frame");
            self.mailbox.stash(envelope);
        }
    }
}

fn io_failure(op: &str, err: io::Error) -> CalcError {
    CalcError::transport(format!("{op} failed: {err}"))
}

impl<T: Scalar> Transport<T> for TcpTransport<T> {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.links.len()
    }

    fn send_scalar(&mut self, value: u64, target: Rank, tag: Tag) -> Result<(), CalcError> {
        self.send(target, tag, FrameRef::Scalar(value))
    }

    fn recv_scalar(&mut self, source: Rank, tag: Tag) -> Result<u64, CalcError> {
        self.receive(source, tag)?.into_scalar(source, tag)
    }

    fn send_buffer(&mut self, data: &[T], target: Rank, tag: Tag) -> Result<(), CalcError> {
        self.send(target, tag, FrameRef::Buffer(data))
    }

    fn recv_buffer(&mut self, count: usize, source: Rank, tag: Tag) -> Result<Vec<T>, CalcError> {
        self.receive(source, tag)?.into_buffer(count, source, tag)
    }
}
