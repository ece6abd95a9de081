//! Threaded, bounded-channel wrapper around a filter.
//!
//! Runs a [`FilterImpl`] on a dedicated worker thread so a producer (feeding
//! decoded tokens) and a consumer (reading `FilterOutput`s) can run
//! concurrently without either side blocking the other beyond the queue
//! depth. Both queues are bounded: a slow consumer applies backpressure to
//! the producer instead of letting buffered output grow without limit.

use crate::parsing::{Filter, FilterImpl};
use crate::parsing::types::{FilterOutput, TokenIdsWithLogProb};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::thread;

struct DecodedChunk {
    text: Vec<u8>,
    logprobs: TokenIdsWithLogProb,
}

/// Default bound on both the input and output queues.
const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Runs a [`FilterImpl`] on its own thread, connected to the caller by two
/// bounded single-producer/single-consumer queues.
///
/// # Examples
///
/// ```rust
/// use cohere_stream_filter::parsing::{FilterOptions, new_filter};
/// use cohere_stream_filter::stream::StreamFilter;
///
/// let filter = new_filter(FilterOptions::new());
/// let mut stream = StreamFilter::new(filter);
///
/// stream.write_decoded("Hello", Default::default());
/// stream.close();
/// while let Ok(output) = stream.read().recv() {
///     println!("{}", output.text);
/// }
/// ```
pub struct StreamFilter {
    input_tx: SyncSender<Option<DecodedChunk>>,
    output_rx: Receiver<FilterOutput>,
    worker: Option<thread::JoinHandle<()>>,
}

impl StreamFilter {
    /// Spawn a worker thread driving `filter`, with the default queue depth.
    #[must_use]
    pub fn new(filter: FilterImpl) -> Self {
        Self::with_queue_depth(filter, DEFAULT_QUEUE_DEPTH)
    }

    /// Spawn a worker thread driving `filter`, with an explicit bound on
    /// both the input and output queues.
    #[must_use]
    pub fn with_queue_depth(mut filter: FilterImpl, queue_depth: usize) -> Self {
        let (input_tx, input_rx) = sync_channel::<Option<DecodedChunk>>(queue_depth);
        let (output_tx, output_rx) = sync_channel::<FilterOutput>(queue_depth);

        let worker = thread::spawn(move || {
            while let Ok(Some(chunk)) = input_rx.recv() {
                let outputs = filter.write_text(&chunk.text, chunk.logprobs);
                for output in outputs {
                    if output_tx.send(output).is_err() {
                        return;
                    }
                }
            }

            for output in filter.flush_partials() {
                let _ = output_tx.send(output);
            }
        });

        Self {
            input_tx,
            output_rx,
            worker: Some(worker),
        }
    }

    /// The output queue. Reading continues to yield outputs, including those
    /// produced by the final flush, until [`Self::close`] is called and the
    /// worker exits, at which point the channel disconnects.
    #[must_use]
    pub fn read(&self) -> &Receiver<FilterOutput> {
        &self.output_rx
    }

    /// Enqueue a decoded chunk of text. Blocks if the input queue is full.
    pub fn write_decoded(&self, decoded_token: &str, logprobs: TokenIdsWithLogProb) {
        let _ = self.input_tx.send(Some(DecodedChunk {
            text: decoded_token.as_bytes().to_vec(),
            logprobs,
        }));
    }

    /// Signal end of input, flush any buffered partial output, and block
    /// until the worker thread has drained its queue and exited. The output
    /// queue remains readable afterward: [`Self::read`] continues to yield
    /// the outputs produced by the final flush until the channel
    /// disconnects. Calling `close` more than once is a no-op past the
    /// first call.
    pub fn close(&mut self) {
        let _ = self.input_tx.send(None);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StreamFilter {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = self.input_tx.send(None);
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::FilterOptions;
    use crate::parsing::new_filter;
    use std::time::Duration;

    #[test]
    fn streams_text_in_order() {
        let filter = new_filter(FilterOptions::new());
        let mut stream = StreamFilter::new(filter);

        stream.write_decoded("Hello", TokenIdsWithLogProb::new());
        stream.write_decoded(" world", TokenIdsWithLogProb::new());
        stream.close();

        let mut texts = Vec::new();
        while let Ok(output) = stream.read().recv_timeout(Duration::from_millis(500)) {
            texts.push(output.text);
        }

        assert_eq!(texts, vec!["Hello".to_string(), " world".to_string()]);
    }

    #[test]
    fn closing_flushes_buffered_partial_output() {
        let options = FilterOptions::new().with_exclusive_stops(vec!["<eos>".to_string()]);
        let filter = new_filter(options);
        let mut stream = StreamFilter::new(filter);

        // "<eo" is a strict prefix of the stop marker, so it is withheld
        // pending more input rather than emitted right away.
        stream.write_decoded("hello<eo", TokenIdsWithLogProb::new());

        // The withheld text is only flushed once end-of-input is signaled,
        // so close() must run before the output queue is drained.
        stream.close();

        let mut texts = Vec::new();
        while let Ok(output) = stream.read().recv_timeout(Duration::from_millis(500)) {
            texts.push(output.text);
        }

        assert_eq!(texts, vec!["hello<eo".to_string()]);
    }
}
