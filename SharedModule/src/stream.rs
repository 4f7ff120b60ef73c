//! # Streams
//!
//! Message transport between two roles. A stream carries whole typed
//! messages in both directions; which transport sits underneath depends on
//! where the peer lives:
//!
//! - [`DirectStream`]: both ends driven from the same loop
//! - [`ChannelStream`]: peer on another OS thread
//! - [`FramedStream`]: peer behind any `Read + Write` byte stream, using a
//!   little-endian `u32` length prefix and JSON bodies

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::marker::PhantomData;
use std::rc::Rc;
use log::trace;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::constants::frame::{DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE};
use crate::error::SyncError;

/// Bidirectional message stream sending `Out` and receiving `In`
pub trait Stream<Out, In> {
    /// Queue a message for the peer
    fn send(&mut self, message: Out) -> Result<(), SyncError>;

    /// Take the next message if one has arrived
    fn try_recv(&mut self) -> Result<Option<In>, SyncError>;

    /// Wait for the next message
    fn recv_blocking(&mut self) -> Result<In, SyncError> {
        loop {
            if let Some(message) = self.try_recv()? {
                return Ok(message);
            }
            std::thread::yield_now();
        }
    }
}

impl<Out, In, S: Stream<Out, In> + ?Sized> Stream<Out, In> for Box<S> {
    fn send(&mut self, message: Out) -> Result<(), SyncError> {
        (**self).send(message)
    }

    fn try_recv(&mut self) -> Result<Option<In>, SyncError> {
        (**self).try_recv()
    }

    fn recv_blocking(&mut self) -> Result<In, SyncError> {
        (**self).recv_blocking()
    }
}

/// In-loop stream: both ends share queues on the same thread
#[derive(Debug)]
pub struct DirectStream<Out, In> {
    outbound: Rc<RefCell<VecDeque<Out>>>,
    inbound: Rc<RefCell<VecDeque<In>>>,
}

/// Create both ends of an in-loop stream
pub fn direct_pair<A, B>() -> (DirectStream<A, B>, DirectStream<B, A>) {
    let a_to_b = Rc::new(RefCell::new(VecDeque::new()));
    let b_to_a = Rc::new(RefCell::new(VecDeque::new()));

    (
        DirectStream { outbound: a_to_b.clone(), inbound: b_to_a.clone() },
        DirectStream { outbound: b_to_a, inbound: a_to_b },
    )
}

impl<Out, In> DirectStream<Out, In> {
    fn peer_alive(&self) -> bool {
        Rc::strong_count(&self.outbound) > 1
    }

    /// Number of messages waiting to be received
    pub fn pending(&self) -> usize {
        self.inbound.borrow().len()
    }
}

impl<Out, In> Stream<Out, In> for DirectStream<Out, In> {
    fn send(&mut self, message: Out) -> Result<(), SyncError> {
        if !self.peer_alive() {
            return Err(SyncError::Disconnected);
        }
        self.outbound.borrow_mut().push_back(message);
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<In>, SyncError> {
        if let Some(message) = self.inbound.borrow_mut().pop_front() {
            return Ok(Some(message));
        }
        if !self.peer_alive() {
            return Err(SyncError::Disconnected);
        }
        Ok(None)
    }

    fn recv_blocking(&mut self) -> Result<In, SyncError> {
        // Nothing else runs on this thread, so an empty queue stays empty
        self.try_recv()?
            .ok_or_else(|| SyncError::Protocol("in-loop stream has no message to receive".to_string()))
    }
}

/// Cross-thread stream over unbounded channels
#[derive(Debug)]
pub struct ChannelStream<Out, In> {
    tx: UnboundedSender<Out>,
    rx: UnboundedReceiver<In>,
}

/// Create both ends of a cross-thread stream
pub fn channel_pair<A, B>() -> (ChannelStream<A, B>, ChannelStream<B, A>) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();

    (
        ChannelStream { tx: a_tx, rx: b_rx },
        ChannelStream { tx: b_tx, rx: a_rx },
    )
}

impl<Out, In> Stream<Out, In> for ChannelStream<Out, In> {
    fn send(&mut self, message: Out) -> Result<(), SyncError> {
        self.tx.send(message).map_err(|_| SyncError::Disconnected)
    }

    fn try_recv(&mut self) -> Result<Option<In>, SyncError> {
        match self.rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(SyncError::Disconnected),
        }
    }

    fn recv_blocking(&mut self) -> Result<In, SyncError> {
        self.rx.blocking_recv().ok_or(SyncError::Disconnected)
    }
}

/// Length-prefixed JSON stream over any byte stream.
///
/// `try_recv` only polls when the underlying stream is non-blocking; on a
/// blocking stream it waits for data like `recv_blocking`.
///
/// On a non-blocking stream, bytes the writer can't take yet stay queued
/// and go out on the next `send`, `try_recv` or `recv_blocking`. Frames are
/// never interleaved or cut short.
#[derive(Debug)]
pub struct FramedStream<T, Out, In> {
    io: T,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
    max_frame_size: usize,
    _marker: PhantomData<fn(Out) -> In>,
}

impl<T: Read + Write, Out: Serialize, In: DeserializeOwned> FramedStream<T, Out, In> {
    pub fn new(io: T) -> Self {
        Self::with_max_frame_size(io, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(io: T, max_frame_size: usize) -> Self {
        Self {
            io,
            read_buf: Vec::new(),
            write_buf: Vec::new(),
            max_frame_size,
            _marker: PhantomData,
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.io
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.io
    }

    /// Bytes of already sent frames still waiting for the writer
    pub fn pending_write(&self) -> usize {
        self.write_buf.len()
    }

    /// Write as much of the queued output as the writer takes
    fn flush_pending(&mut self) -> Result<(), SyncError> {
        if self.write_buf.is_empty() {
            return Ok(());
        }

        while !self.write_buf.is_empty() {
            match self.io.write(&self.write_buf) {
                Ok(0) => return Err(SyncError::Disconnected),
                Ok(n) => {
                    self.write_buf.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    trace!("{} byte(s) left to write", self.write_buf.len());
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        match self.io.flush() {
            Err(e) if e.kind() != ErrorKind::WouldBlock => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Decode one complete frame from the read buffer, if there is one
    fn take_frame(&mut self) -> Result<Option<In>, SyncError> {
        if self.read_buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&self.read_buf[..LENGTH_PREFIX_SIZE]);
        let len = u32::from_le_bytes(prefix) as usize;
        if len > self.max_frame_size {
            return Err(SyncError::Codec(format!(
                "frame of {} bytes exceeds the {} byte limit",
                len, self.max_frame_size
            )));
        }

        let end = LENGTH_PREFIX_SIZE + len;
        if self.read_buf.len() < end {
            return Ok(None);
        }

        let message = serde_json::from_slice(&self.read_buf[LENGTH_PREFIX_SIZE..end])?;
        self.read_buf.drain(..end);
        trace!("Received frame of {} bytes", len);
        Ok(Some(message))
    }

    /// Read whatever is available. Returns false if the read would block.
    fn fill(&mut self) -> Result<bool, SyncError> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.io.read(&mut chunk) {
                Ok(0) => return Err(SyncError::Disconnected),
                Ok(n) => {
                    self.read_buf.extend_from_slice(&chunk[..n]);
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<T: Read + Write, Out: Serialize, In: DeserializeOwned> Stream<Out, In> for FramedStream<T, Out, In> {
    fn send(&mut self, message: Out) -> Result<(), SyncError> {
        let body = serde_json::to_vec(&message)?;
        if body.len() > self.max_frame_size {
            return Err(SyncError::Codec(format!(
                "message of {} bytes exceeds the {} byte limit",
                body.len(),
                self.max_frame_size
            )));
        }

        self.write_buf.reserve(LENGTH_PREFIX_SIZE + body.len());
        self.write_buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        self.write_buf.extend_from_slice(&body);
        trace!("Sent frame of {} bytes", body.len());
        self.flush_pending()
    }

    fn try_recv(&mut self) -> Result<Option<In>, SyncError> {
        self.flush_pending()?;
        loop {
            if let Some(message) = self.take_frame()? {
                return Ok(Some(message));
            }
            if !self.fill()? {
                return Ok(None);
            }
        }
    }

    fn recv_blocking(&mut self) -> Result<In, SyncError> {
        loop {
            self.flush_pending()?;
            if let Some(message) = self.take_frame()? {
                return Ok(message);
            }
            if !self.fill()? {
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        }
    }
}
