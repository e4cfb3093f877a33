//! Outbound write queue
//!
//! Many producers (API callers and the inbound pump) push encoded frames; the
//! outbound pump is the single consumer. Non-DATA frames go to a strict FIFO
//! control lane that is always served first, so header blocks reach the wire
//! in the order they were compressed. DATA frames go to one of eight priority
//! buckets, FIFO within a bucket, most urgent bucket first.
//!
//! Flush markers complete once every entry queued before them has been
//! written, whatever lane it sits in.

use super::error::{Error, Result};
use super::stream::StreamId;
use super::LOWEST_PRIORITY;
use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

const BUCKETS: usize = LOWEST_PRIORITY as usize + 1;

/// One encoded frame waiting for the transport
#[derive(Debug, Clone)]
pub struct WriteEntry {
    /// Position in enqueue order
    pub seq: u64,
    pub bytes: Bytes,
    /// For logging only
    pub frame_name: &'static str,
    pub stream_id: StreamId,
}

#[derive(Debug, Default)]
struct Inner {
    control: VecDeque<WriteEntry>,
    data: [VecDeque<WriteEntry>; BUCKETS],
    flushes: Vec<(u64, Sender<()>)>,
    next_seq: u64,
    in_flight: Option<u64>,
    closed: bool,
}

impl Inner {
    fn is_empty(&self) -> bool {
        self.control.is_empty() && self.data.iter().all(VecDeque::is_empty)
    }

    fn len(&self) -> usize {
        self.control.len() + self.data.iter().map(VecDeque::len).sum::<usize>()
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Lowest sequence number not yet written
    fn oldest_pending(&self) -> Option<u64> {
        self.control
            .front()
            .into_iter()
            .chain(self.data.iter().filter_map(VecDeque::front))
            .map(|e| e.seq)
            .chain(self.in_flight)
            .min()
    }

    fn complete_flushes(&mut self) {
        let oldest = self.oldest_pending();
        self.flushes.retain(|(seq, done)| match oldest {
            Some(pending) if pending < *seq => true,
            _ => {
                let _ = done.send(());
                false
            }
        });
    }
}

/// Priority-aware multi-producer, single-consumer frame queue
#[derive(Debug, Default)]
pub struct WriteQueue {
    inner: Mutex<Inner>,
    ready: Condvar,
}

impl WriteQueue {
    pub fn new() -> Self {
        WriteQueue::default()
    }

    fn push(&self, bucket: Option<u8>, bytes: Bytes, frame_name: &'static str, stream_id: StreamId) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Error::ConnectionClosed);
        }
        let entry = WriteEntry {
            seq: inner.take_seq(),
            bytes,
            frame_name,
            stream_id,
        };
        match bucket {
            None => inner.control.push_back(entry),
            Some(priority) => {
                let index = (priority as usize).min(BUCKETS - 1);
                inner.data[index].push_back(entry);
            }
        }
        drop(inner);
        self.ready.notify_one();
        Ok(())
    }

    /// Queue a non-DATA frame on the control lane
    pub fn push_control(&self, bytes: Bytes, frame_name: &'static str, stream_id: StreamId) -> Result<()> {
        self.push(None, bytes, frame_name, stream_id)
    }

    /// Queue a DATA frame in the bucket for `priority` (0 most urgent)
    pub fn push_data(&self, priority: u8, bytes: Bytes, stream_id: StreamId) -> Result<()> {
        self.push(Some(priority), bytes, "DATA", stream_id)
    }

    /// Move a stream's queued DATA to the bucket for `priority`
    ///
    /// The stream's entries keep their relative order, so a later chunk never
    /// overtakes an earlier one after a priority change.
    pub fn reprioritize(&self, stream_id: StreamId, priority: u8) {
        let mut inner = self.inner.lock();
        let index = (priority as usize).min(BUCKETS - 1);
        let mut moved = Vec::new();
        for (i, bucket) in inner.data.iter_mut().enumerate() {
            if i == index {
                continue;
            }
            let (mine, rest): (VecDeque<_>, VecDeque<_>) =
                bucket.drain(..).partition(|e| e.stream_id == stream_id);
            *bucket = rest;
            moved.extend(mine);
        }
        if moved.is_empty() {
            return;
        }
        let target = &mut inner.data[index];
        moved.extend(target.drain(..));
        moved.sort_unstable_by_key(|e| e.seq);
        target.extend(moved);
    }

    /// Drop every queued DATA entry of a stream
    ///
    /// Returns how many entries were dropped. Flush markers waiting only on
    /// those entries complete.
    pub fn purge_stream(&self, stream_id: StreamId) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.len();
        for bucket in inner.data.iter_mut() {
            bucket.retain(|e| e.stream_id != stream_id);
        }
        let dropped = before - inner.len();
        if dropped > 0 {
            inner.complete_flushes();
        }
        dropped
    }

    /// Returns a receiver that fires once everything queued so far is written
    ///
    /// The receiver disconnects without a message if the queue is aborted.
    pub fn flush_marker(&self) -> Result<Receiver<()>> {
        let (tx, rx) = bounded(1);
        let mut inner = self.inner.lock();
        if inner.closed && inner.is_empty() && inner.in_flight.is_none() {
            return Err(Error::ConnectionClosed);
        }
        let seq = inner.take_seq();
        inner.flushes.push((seq, tx));
        inner.complete_flushes();
        Ok(rx)
    }

    /// Take the next entry without blocking
    pub fn try_pop(&self) -> Option<WriteEntry> {
        let mut inner = self.inner.lock();
        Self::pop_locked(&mut inner)
    }

    fn pop_locked(inner: &mut Inner) -> Option<WriteEntry> {
        let entry = inner
            .control
            .pop_front()
            .or_else(|| inner.data.iter_mut().find_map(VecDeque::pop_front))?;
        inner.in_flight = Some(entry.seq);
        Some(entry)
    }

    /// Block until an entry is available; `None` once closed and drained
    pub fn pop(&self) -> Option<WriteEntry> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(entry) = Self::pop_locked(&mut inner) {
                return Some(entry);
            }
            if inner.closed {
                // nothing left to write: release anyone still waiting
                inner.flushes.clear();
                return None;
            }
            self.ready.wait(&mut inner);
        }
    }

    /// The consumer finished writing the entry it last popped
    pub fn written(&self, seq: u64) {
        let mut inner = self.inner.lock();
        if inner.in_flight == Some(seq) {
            inner.in_flight = None;
        }
        inner.complete_flushes();
    }

    /// Stop accepting entries; queued entries are still handed out
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.ready.notify_all();
    }

    /// Close and discard everything queued
    pub fn abort(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.control.clear();
        for bucket in inner.data.iter_mut() {
            bucket.clear();
        }
        inner.in_flight = None;
        inner.flushes.clear();
        drop(inner);
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
