// Frame reader thread
//
// Reads fixed-size frames from the frame source's stdout on a dedicated thread
// so the worker can wait on frames and on shutdown at the same time. Buffers
// travel back through a recycle channel to avoid a fresh allocation per frame.

use std::io::{self, Read};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

/// Frames queued between the reader and the worker
const FRAME_QUEUE_DEPTH: usize = 2;

/// Read exactly one frame into `buf`.
///
/// Returns `Ok(false)` when the stream ends cleanly before the first byte of a
/// frame, and `UnexpectedEof` when it ends part-way through one.
pub fn read_frame<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {} of {} frame bytes", filled, buf.len()),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Zeroed frame buffer; allocation failure is reported instead of aborting
fn frame_buffer(len: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Background reader feeding whole frames into a bounded channel.
///
/// The channel disconnects after the last frame; a read error is delivered
/// as the final item.
pub struct FramePump {
    frames: Receiver<io::Result<Vec<u8>>>,
    recycle: Sender<Vec<u8>>,
    handle: JoinHandle<()>,
}

impl FramePump {
    pub fn spawn<R>(name: &str, mut reader: R, frame_len: usize) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (frame_tx, frames) = bounded::<io::Result<Vec<u8>>>(FRAME_QUEUE_DEPTH);
        let (recycle, recycled) = bounded::<Vec<u8>>(FRAME_QUEUE_DEPTH + 2);
        for _ in 0..FRAME_QUEUE_DEPTH {
            let _ = recycle.send(frame_buffer(frame_len)?);
        }

        let label = name.to_string();
        let handle = thread::Builder::new()
            .name(format!("motioncam-{}-reader", name))
            .spawn(move || {
                let mut count: u64 = 0;
                loop {
                    let mut buf = match recycled.try_recv() {
                        Ok(buf) => buf,
                        Err(_) => match frame_buffer(frame_len) {
                            Ok(buf) => buf,
                            Err(e) => {
                                let _ = frame_tx.send(Err(e));
                                break;
                            }
                        },
                    };
                    match read_frame(&mut reader, &mut buf) {
                        Ok(true) => {
                            count += 1;
                            if frame_tx.send(Ok(buf)).is_err() {
                                break;
                            }
                        }
                        Ok(false) => {
                            log::debug!("[{}] Frame source closed after {} frames", label, count);
                            break;
                        }
                        Err(e) => {
                            let _ = frame_tx.send(Err(e));
                            break;
                        }
                    }
                }
            })?;

        Ok(Self {
            frames,
            recycle,
            handle,
        })
    }

    /// Channel of frames for use in `select!`
    pub fn frames(&self) -> &Receiver<io::Result<Vec<u8>>> {
        &self.frames
    }

    /// Hand a consumed buffer back to the reader
    pub fn recycle(&self, buf: Vec<u8>) {
        let _ = self.recycle.try_send(buf);
    }

    /// Disconnect and join the reader.
    ///
    /// The reader may be blocked in `read`; close the source (stop its
    /// process) before calling this.
    pub fn finish(self) {
        let Self {
            frames,
            recycle,
            handle,
        } = self;
        drop(frames);
        drop(recycle);
        if handle.join().is_err() {
            log::error!("Frame reader thread panicked");
        }
    }
}
