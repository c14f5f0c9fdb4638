use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use karta_wkb::DecodedTile;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::KartaError;

struct DecodeTask {
    payload: Bytes,
    token: CancellationToken,
    respond: oneshot::Sender<DecodeResult>,
}

type DecodeResult = Result<Option<Vec<DecodedTile>>, KartaError>;

/// Counters of the decode pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    queued: AtomicUsize,
    busy: AtomicUsize,
}

impl PoolStats {
    /// Tasks waiting for a free worker.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    /// Workers currently decoding.
    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::Relaxed)
    }
}

/// Fixed set of OS threads decoding tile payloads.
///
/// Tasks are taken from a single shared queue, so a worker that finishes a task immediately picks
/// the next one. Workers stop when the pool is dropped.
pub struct DecodePool {
    sender: mpsc::UnboundedSender<DecodeTask>,
    stats: Arc<PoolStats>,
    workers: usize,
}

impl DecodePool {
    /// Starts `workers` decode threads.
    pub fn new(workers: usize) -> Result<Self, KartaError> {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let stats = Arc::new(PoolStats::default());

        for index in 0..workers {
            let receiver = receiver.clone();
            let stats = stats.clone();
            thread::Builder::new()
                .name(format!("karta-decode-{index}"))
                .spawn(move || Self::run_worker(receiver, stats))
                .map_err(|e| KartaError::Generic(format!("failed to start decode worker: {e}")))?;
        }

        log::debug!("Started {workers} decode workers");

        Ok(Self {
            sender,
            stats,
            workers,
        })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Pool counters.
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Decodes a payload on one of the workers.
    ///
    /// Returns `Ok(None)` if the token was cancelled before the result became available.
    pub async fn decode(
        &self,
        payload: Bytes,
        token: CancellationToken,
    ) -> Result<Option<Vec<DecodedTile>>, KartaError> {
        let (respond, response) = oneshot::channel();
        self.stats.queued.fetch_add(1, Ordering::Relaxed);
        let task = DecodeTask {
            payload,
            token: token.clone(),
            respond,
        };

        if self.sender.send(task).is_err() {
            self.stats.queued.fetch_sub(1, Ordering::Relaxed);
            return Err(KartaError::Generic("decode pool is stopped".into()));
        }

        let result = response
            .await
            .map_err(|_| KartaError::Generic("decode worker stopped unexpectedly".into()))?;

        if token.is_cancelled() {
            return Ok(None);
        }

        result
    }

    fn run_worker(
        receiver: Arc<Mutex<mpsc::UnboundedReceiver<DecodeTask>>>,
        stats: Arc<PoolStats>,
    ) {
        loop {
            let task = receiver.lock().blocking_recv();
            let Some(task) = task else {
                break;
            };

            stats.queued.fetch_sub(1, Ordering::Relaxed);
            if task.token.is_cancelled() {
                let _ = task.respond.send(Ok(None));
                continue;
            }

            stats.busy.fetch_add(1, Ordering::Relaxed);
            let size = task.payload.len();
            let result = karta_wkb::decode_payload(task.payload)
                .map(Some)
                .map_err(KartaError::from);
            stats.busy.fetch_sub(1, Ordering::Relaxed);

            if let Ok(Some(tiles)) = &result {
                log::debug!("Decoded payload of {size} bytes into {} tiles", tiles.len());
            }

            // The receiver is gone if the requesting render was dropped.
            let _ = task.respond.send(result);
        }
    }
}
