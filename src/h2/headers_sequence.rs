//! Header block reassembly and fragmentation
//!
//! A header block travels as one HEADERS or PUSH_PROMISE frame followed by
//! zero or more CONTINUATION frames on the same stream, the last carrying
//! END_HEADERS. Inbound fragments are collected in a [`HeadersSequence`];
//! outbound blocks are cut to the frame size limit by [`fragment_headers`]
//! and [`fragment_push_promise`].

use super::error::{Error, Result};
use super::frames::{ContinuationFrame, Frame, HeadersFrame, PushPromiseFrame};
use super::stream::StreamId;
use super::MAX_FRAME_PAYLOAD;
use bytes::{Bytes, BytesMut};

/// Frame that opened a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    Headers,
    PushPromise,
}

/// Header block being reassembled
#[derive(Debug)]
pub struct HeadersSequence {
    stream_id: StreamId,
    kind: SequenceKind,
    block: BytesMut,
    end_stream: bool,
    end_headers: bool,
    priority: Option<u32>,
    promised_stream_id: Option<StreamId>,
}

impl HeadersSequence {
    /// Start a sequence from a HEADERS frame
    pub fn from_headers(frame: HeadersFrame) -> Self {
        HeadersSequence {
            stream_id: frame.stream_id,
            kind: SequenceKind::Headers,
            block: BytesMut::from(&frame.header_block[..]),
            end_stream: frame.end_stream,
            end_headers: frame.end_headers,
            priority: frame.priority,
            promised_stream_id: None,
        }
    }

    /// Start a sequence from a PUSH_PROMISE frame
    pub fn from_push_promise(frame: PushPromiseFrame) -> Self {
        HeadersSequence {
            stream_id: frame.stream_id,
            kind: SequenceKind::PushPromise,
            block: BytesMut::from(&frame.header_block[..]),
            end_stream: false,
            end_headers: frame.end_headers,
            priority: None,
            promised_stream_id: Some(frame.promised_stream_id),
        }
    }

    /// Append a CONTINUATION; it must be for the same stream
    pub fn append(&mut self, frame: ContinuationFrame) -> Result<()> {
        if self.end_headers {
            return Err(Error::Protocol(format!(
                "CONTINUATION on stream {} after END_HEADERS",
                frame.stream_id
            )));
        }
        if frame.stream_id != self.stream_id {
            return Err(Error::Protocol(format!(
                "CONTINUATION on stream {} interleaved with header block on stream {}",
                frame.stream_id, self.stream_id
            )));
        }
        self.block.extend_from_slice(&frame.header_block);
        self.end_headers = frame.end_headers;
        Ok(())
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn kind(&self) -> SequenceKind {
        self.kind
    }

    pub fn is_complete(&self) -> bool {
        self.end_headers
    }

    pub fn end_stream(&self) -> bool {
        self.end_stream
    }

    pub fn priority(&self) -> Option<u32> {
        self.priority
    }

    pub fn promised_stream_id(&self) -> Option<StreamId> {
        self.promised_stream_id
    }

    /// Complete header block
    pub fn block(&self) -> &[u8] {
        &self.block
    }
}

fn continuations(stream_id: StreamId, mut rest: Bytes, frames: &mut Vec<Frame>) {
    while !rest.is_empty() {
        let chunk = rest.split_to(rest.len().min(MAX_FRAME_PAYLOAD));
        frames.push(Frame::Continuation(ContinuationFrame {
            stream_id,
            header_block: chunk,
            end_headers: rest.is_empty(),
        }));
    }
}

/// Cut a header block into HEADERS + CONTINUATION frames
pub fn fragment_headers(
    stream_id: StreamId,
    block: Bytes,
    end_stream: bool,
    priority: Option<u32>,
) -> Vec<Frame> {
    let first_limit = MAX_FRAME_PAYLOAD - if priority.is_some() { 4 } else { 0 };
    let mut rest = block;
    let first = rest.split_to(rest.len().min(first_limit));

    let mut frames = Vec::with_capacity(1 + rest.len() / MAX_FRAME_PAYLOAD);
    frames.push(Frame::Headers(HeadersFrame {
        stream_id,
        header_block: first,
        end_stream,
        end_headers: rest.is_empty(),
        priority,
    }));
    continuations(stream_id, rest, &mut frames);
    frames
}

/// Cut a promised header block into PUSH_PROMISE + CONTINUATION frames
pub fn fragment_push_promise(
    stream_id: StreamId,
    promised_stream_id: StreamId,
    block: Bytes,
) -> Vec<Frame> {
    let mut rest = block;
    let first = rest.split_to(rest.len().min(MAX_FRAME_PAYLOAD - 4));

    let mut frames = Vec::with_capacity(1 + rest.len() / MAX_FRAME_PAYLOAD);
    frames.push(Frame::PushPromise(PushPromiseFrame {
        stream_id,
        promised_stream_id,
        header_block: first,
        end_headers: rest.is_empty(),
    }));
    continuations(stream_id, rest, &mut frames);
    frames
}
