// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Envelope Framing
//!
//! Frame format: `[length: 4 bytes big-endian] [bincode envelope]`
//!
//! One call writes or reads exactly one frame. Nothing is batched, so
//! consecutive frames on a connection keep their call order.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::error::NetworkError;
use super::message::NetworkEnvelope;

/// Frame header size (4 bytes length prefix).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Default maximum envelope body size (10 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Serializes an envelope into a complete frame.
pub fn encode_frame(envelope: &NetworkEnvelope, max_size: usize) -> Result<Vec<u8>, NetworkError> {
    let body = envelope.to_bytes()?;
    if body.len() > max_size {
        return Err(NetworkError::MessageTooLarge {
            size: body.len(),
            max: max_size,
        });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Writes one frame and flushes. Returns the body size in bytes.
pub fn write_frame<W: Write>(
    writer: &mut W,
    envelope: &NetworkEnvelope,
    max_size: usize,
) -> Result<u64, NetworkError> {
    let frame = encode_frame(envelope, max_size)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok((frame.len() - FRAME_HEADER_SIZE) as u64)
}

/// An envelope read off the wire, with what metrics need to know about it.
#[derive(Debug, Clone)]
pub struct ReceivedEnvelope {
    pub envelope: NetworkEnvelope,
    /// Body size in bytes, excluding the length prefix.
    pub size: u64,
    /// Time spent deserializing the body.
    pub deserialize_time: Duration,
}

/// Blocks until one full frame is read.
///
/// Returns `Ok(None)` when the peer closed the stream on a frame boundary.
/// A stream that ends inside a frame is an error.
pub fn read_frame<R: Read>(
    reader: &mut R,
    max_size: usize,
) -> Result<Option<ReceivedEnvelope>, NetworkError> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    let mut filled = 0;
    while filled < FRAME_HEADER_SIZE {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(NetworkError::ConnectionClosed),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > max_size {
        return Err(NetworkError::MessageTooLarge {
            size: len,
            max: max_size,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;

    let started = Instant::now();
    let envelope = NetworkEnvelope::from_bytes(&body)?;
    Ok(Some(ReceivedEnvelope {
        envelope,
        size: len as u64,
        deserialize_time: started.elapsed(),
    }))
}

/// Framing layer over one TCP stream.
///
/// Reads and writes use separate handles so a blocked reader never
/// stalls a sender. Each side is serialized by its own lock.
pub struct EnvelopeSocket {
    reader: Mutex<TcpStream>,
    writer: Mutex<TcpStream>,
    control: TcpStream,
    max_frame_size: usize,
    closed: AtomicBool,
}

impl EnvelopeSocket {
    pub fn new(stream: TcpStream, max_frame_size: usize) -> Result<Self, NetworkError> {
        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;
        Ok(EnvelopeSocket {
            reader: Mutex::new(reader),
            writer: Mutex::new(stream),
            control,
            max_frame_size,
            closed: AtomicBool::new(false),
        })
    }

    /// Sets the read timeout; `None` blocks indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), NetworkError> {
        self.control.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Writes one envelope and flushes. Returns the body size in bytes.
    pub fn send(&self, envelope: &NetworkEnvelope) -> Result<u64, NetworkError> {
        if self.is_closed() {
            return Err(NetworkError::ConnectionClosed);
        }
        let mut writer = self.writer.lock();
        write_frame(&mut *writer, envelope, self.max_frame_size)
    }

    /// Blocks until the next envelope arrives. `Ok(None)` on end of stream.
    pub fn receive_next(&self) -> Result<Option<ReceivedEnvelope>, NetworkError> {
        if self.is_closed() {
            return Ok(None);
        }
        let mut reader = self.reader.lock();
        read_frame(&mut *reader, self.max_frame_size)
    }

    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.control.peer_addr().ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Shuts the stream down. Only the first call has an effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Already-dead sockets report NotConnected here.
        let _ = self.control.shutdown(Shutdown::Both);
    }
}

impl Drop for EnvelopeSocket {
    fn drop(&mut self) {
        self.close();
    }
}
