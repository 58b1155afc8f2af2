//! Deadline wrapper around an encoder.
//!
//! Each call runs on a worker thread; the caller waits at most the timeout and a late
//! result is dropped. Calls that outlive their caller still count against
//! `max_in_flight`, so a hung encoder is refused instead of piling up threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use super::{Encoder, EncoderError};
use crate::embedding::Embedding;

pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

#[derive(Clone)]
pub struct BoundedEncoder {
    inner: Arc<dyn Encoder>,
    timeout: Duration,
    max_in_flight: usize,
    in_flight: Arc<AtomicUsize>,
}

/// Releases an in-flight slot when the worker finishes.
struct Slot(Arc<AtomicUsize>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BoundedEncoder {
    pub fn new(inner: Arc<dyn Encoder>, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Calls currently running, including ones whose caller gave up.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn encode_text_within(&self, text: &str, limit: Duration) -> Result<Embedding, EncoderError> {
        let text = text.to_string();
        self.run(limit, move |encoder| encoder.encode_text(&text))
    }

    pub fn encode_image_within(&self, image: &[u8], limit: Duration) -> Result<Embedding, EncoderError> {
        let image = image.to_vec();
        self.run(limit, move |encoder| encoder.encode_image(&image))
    }

    fn run<F>(&self, limit: Duration, call: F) -> Result<Embedding, EncoderError>
    where
        F: FnOnce(&dyn Encoder) -> Result<Embedding, EncoderError> + Send + 'static,
    {
        let limit = limit.min(self.timeout);
        if limit.is_zero() {
            return Err(EncoderError::Timeout(limit));
        }

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst);
        let slot = Slot(self.in_flight.clone());
        if running >= self.max_in_flight {
            log::warn!("encoder: {running} calls still running, refusing another");
            return Err(EncoderError::Busy(running));
        }

        let (tx, rx) = mpsc::channel();
        let encoder = self.inner.clone();
        std::thread::Builder::new()
            .name("shopsense-encode".to_string())
            .spawn(move || {
                let _slot = slot;
                // The receiver is gone if the caller already timed out.
                let _ = tx.send(call(encoder.as_ref()));
            })
            .map_err(|e| EncoderError::EncodingFailed(format!("Failed to spawn encoder thread: {}", e)))?;

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!("encoder: call exceeded {limit:?}, abandoning");
                Err(EncoderError::Timeout(limit))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(EncoderError::EncodingFailed(
                "encoder thread exited without a result".to_string(),
            )),
        }
    }
}

impl Encoder for BoundedEncoder {
    fn encode_text(&self, text: &str) -> Result<Embedding, EncoderError> {
        self.encode_text_within(text, self.timeout)
    }

    fn encode_image(&self, image: &[u8]) -> Result<Embedding, EncoderError> {
        self.encode_image_within(image, self.timeout)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> String {
        self.inner.model_name()
    }
}
