//! Session threads
//!
//! The inbound pump reads and dispatches frames, the outbound pump drains the
//! write queue, and the settings watchdog bounds the wait for our SETTINGS to
//! be acknowledged.

use super::state::Dispatch;
use super::{Role, Shared, Teardown};
use crate::h2::codec::FrameCodec;
use crate::h2::error::{Error, ErrorCode, Result};
use crate::h2::CONNECTION_PREFACE;
use crate::transport::Transport;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, trace, warn};

/// Disposes the session when the inbound pump exits, however it exits
struct DisposeGuard(Arc<Shared>);

impl Drop for DisposeGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(role = %self.0.role, "inbound pump panicked");
        }
        self.0.dispose(Teardown::GoAway(ErrorCode::InternalError));
    }
}

fn read_preface<R: Read>(reader: &mut R) -> Result<()> {
    let mut preface = vec![0u8; CONNECTION_PREFACE.len()];
    reader.read_exact(&mut preface).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::MissingPreface,
        _ => Error::Io(e),
    })?;
    if preface != CONNECTION_PREFACE {
        return Err(Error::MissingPreface);
    }
    Ok(())
}

pub(super) fn inbound(shared: Arc<Shared>, mut reader: Box<dyn Transport>) {
    let _guard = DisposeGuard(Arc::clone(&shared));

    if shared.role == Role::Server && shared.options.use_handshake {
        if let Err(e) = read_preface(&mut reader) {
            if !shared.is_closing() {
                shared.fail(e);
            }
            return;
        }
        trace!("connection preface verified");
    }

    loop {
        let frame = match FrameCodec::read_frame(&mut reader) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(role = %shared.role, "transport closed by peer");
                shared.dispose(Teardown::Lost(ErrorCode::NoError));
                return;
            }
            Err(e) => {
                // reads fail once we close the transport ourselves
                if !shared.is_closing() {
                    shared.fail(e);
                }
                return;
            }
        };
        if shared.is_closing() {
            return;
        }

        let outcome = shared.core.lock().dispatch(frame);
        match outcome {
            Ok(Dispatch::Continue) => {}
            Ok(Dispatch::RemoteGoAway(code)) => {
                shared.dispose(Teardown::Remote(code));
                return;
            }
            Err(e) => {
                shared.fail(e);
                if shared.is_closing() {
                    return;
                }
            }
        }
    }
}

/// `_done` is dropped on exit, which tells `dispose` the queue is drained
pub(super) fn outbound(shared: Arc<Shared>, mut writer: Box<dyn Transport>, _done: Sender<()>) {
    while let Some(entry) = shared.queue.pop() {
        trace!(
            frame_type = entry.frame_name,
            stream_id = entry.stream_id,
            len = entry.bytes.len(),
            "writing frame"
        );
        let mut result = writer.write_all(&entry.bytes);
        if result.is_ok() && shared.queue.is_empty() {
            result = writer.flush();
        }
        shared.queue.written(entry.seq);

        if let Err(e) = result {
            if !shared.is_closing() {
                warn!(role = %shared.role, error = %e, "transport write failed");
            }
            shared.dispose(Teardown::Lost(ErrorCode::InternalError));
            return;
        }
    }
    if let Err(e) = writer.flush() {
        trace!(error = %e, "final flush failed");
    }
}

pub(super) fn settings_watchdog(shared: Arc<Shared>, acked: Receiver<()>) {
    match acked.recv_timeout(shared.options.settings_timeout) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
        Err(RecvTimeoutError::Timeout) => {
            if !shared.is_closing() {
                shared.fail(Error::SettingsTimeout);
            }
        }
    }
}
