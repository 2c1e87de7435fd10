//! Preload worker pool.
//!
//! - Every descriptor is decoded exactly once by a bounded pool of threads
//! - Dispatch order is shuffled so slow media spreads across the grid
//! - Results travel back over one flume channel; the control thread drains
//!   it with `poll_results` and never blocks
//! - Workers exit once the request queue is empty; the pool is joined only
//!   after the last result has been drained

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use flume::{Receiver, Sender};
use image::RgbImage;
use tracing::{debug, trace, warn};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use super::decoder::MediaDecoder;
use crate::error::PreloadError;
use crate::models::MediaDescriptor;

/// How long an idle worker waits before re-checking the shutdown flag.
const IDLE_POLL_MS: u64 = 100;

/// A successfully decoded descriptor.
#[derive(Debug, Clone)]
pub struct PreloadResult {
    pub descriptor: MediaDescriptor,
    pub thumbnail: RgbImage,
    pub create_epoch: Option<i64>,
    pub degraded: bool,
}

/// A descriptor whose task failed outright.
#[derive(Debug)]
pub struct PreloadFailure {
    pub descriptor: MediaDescriptor,
    pub error: PreloadError,
}

pub type PreloadOutcome = Result<PreloadResult, PreloadFailure>;

impl From<PreloadResult> for crate::models::LoadedItem {
    fn from(result: PreloadResult) -> Self {
        Self {
            descriptor: result.descriptor,
            thumbnail: result.thumbnail,
            create_epoch: result.create_epoch,
            degraded: result.degraded,
            linked: false,
        }
    }
}

/// Configured pool, ready to start.
pub struct PreloadPipeline {
    workers: usize,
    seed: u64,
    decoder: Arc<dyn MediaDecoder>,
}

impl PreloadPipeline {
    pub fn builder() -> PreloadPipelineBuilder {
        PreloadPipelineBuilder::new()
    }

    /// Shuffle `items`, queue one task per item and spawn the workers.
    pub fn start(self, items: Vec<MediaDescriptor>) -> ResultStream {
        let total = items.len();
        let num_workers = self.workers.clamp(1, total.max(1));

        let (request_tx, request_rx) = flume::unbounded();
        let (result_tx, result_rx) = flume::unbounded();

        for descriptor in shuffled(items, self.seed) {
            // Receiver is alive in this scope; the send cannot fail.
            let _ = request_tx.send(descriptor);
        }
        // Workers see a disconnect once the queue is empty.
        drop(request_tx);

        let shutdown = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(num_workers);
        if total > 0 {
            for worker_id in 0..num_workers {
                let rx = request_rx.clone();
                let tx = result_tx.clone();
                let shutdown = Arc::clone(&shutdown);
                let active = Arc::clone(&active);
                let decoder = Arc::clone(&self.decoder);

                let handle = thread::Builder::new()
                    .name(format!("preload-worker-{}", worker_id))
                    .spawn(move || {
                        worker_loop(worker_id, rx, tx, shutdown, active, decoder);
                    })
                    .expect("Failed to spawn preload worker");

                handles.push(handle);
            }
        }

        debug!(num_workers, total, seed = self.seed, "Started preload pipeline");

        ResultStream {
            result_rx,
            workers: handles,
            shutdown,
            active,
            total,
            drained: 0,
        }
    }
}

/// Receiving end of a running pipeline.
pub struct ResultStream {
    result_rx: Receiver<PreloadOutcome>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    total: usize,
    drained: usize,
}

impl ResultStream {
    /// Drain everything currently available (non-blocking).
    ///
    /// After the last result has been returned the worker threads are joined.
    pub fn poll_results(&mut self) -> Vec<PreloadOutcome> {
        let mut results = Vec::new();
        while let Ok(result) = self.result_rx.try_recv() {
            results.push(result);
        }
        self.drained += results.len();

        if self.is_finished() && !self.workers.is_empty() {
            self.join_workers();
        }
        results
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn drained(&self) -> usize {
        self.drained
    }

    pub fn is_finished(&self) -> bool {
        self.drained >= self.total
    }

    /// Number of workers currently inside a decode.
    pub fn active_worker_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    fn join_workers(&mut self) {
        debug!("Shutting down preload pipeline");
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        debug!("Preload pipeline shutdown complete");
    }
}

impl Drop for ResultStream {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            // In-flight decodes finish; queued ones are skipped.
            self.join_workers();
        }
    }
}

fn worker_loop(
    worker_id: usize,
    rx: Receiver<MediaDescriptor>,
    tx: Sender<PreloadOutcome>,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    decoder: Arc<dyn MediaDecoder>,
) {
    debug!(worker_id, "Preload worker started");

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match rx.recv_timeout(Duration::from_millis(IDLE_POLL_MS)) {
            Ok(descriptor) => {
                active.fetch_add(1, Ordering::Relaxed);
                let outcome = process_item(descriptor, decoder.as_ref());
                active.fetch_sub(1, Ordering::Relaxed);

                if let Err(e) = tx.send(outcome) {
                    warn!(worker_id, error = ?e, "Failed to send preload result");
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(worker_id, "Preload worker stopped");
}

fn process_item(descriptor: MediaDescriptor, decoder: &dyn MediaDecoder) -> PreloadOutcome {
    trace!(path = ?descriptor.file_path, "Decoding item");

    let decoded = panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(&descriptor)));
    match decoded {
        Ok(Ok(media)) => Ok(PreloadResult {
            descriptor,
            thumbnail: media.thumbnail,
            create_epoch: media.create_epoch,
            degraded: media.degraded,
        }),
        Ok(Err(error)) => {
            warn!(path = ?descriptor.file_path, %error, "Preload task failed");
            Err(PreloadFailure { descriptor, error })
        }
        Err(_) => {
            let error = PreloadError::Panicked(descriptor.file_path.clone());
            warn!(path = ?descriptor.file_path, "Decoder panicked");
            Err(PreloadFailure { descriptor, error })
        }
    }
}

fn shuffled(mut items: Vec<MediaDescriptor>, seed: u64) -> Vec<MediaDescriptor> {
    items.sort_by(|a, b| {
        let rank_a = shuffle_rank(seed, &a.file_path);
        let rank_b = shuffle_rank(seed, &b.file_path);
        rank_a.cmp(&rank_b).then_with(|| a.file_path.cmp(&b.file_path))
    });
    items
}

fn shuffle_rank(seed: u64, path: &Path) -> u64 {
    xxh3_64_with_seed(path.to_string_lossy().as_bytes(), seed)
}

fn new_shuffle_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x9e3779b97f4a7c15)
}

/// Builder for PreloadPipeline.
pub struct PreloadPipelineBuilder {
    workers: usize,
    seed: Option<u64>,
}

impl PreloadPipelineBuilder {
    pub fn new() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(1, |n| n.get()),
            seed: None,
        }
    }

    pub fn workers(mut self, count: usize) -> Self {
        self.workers = count;
        self
    }

    /// Fix the dispatch shuffle; a time-based seed is used otherwise.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self, decoder: Arc<dyn MediaDecoder>) -> PreloadPipeline {
        PreloadPipeline {
            workers: self.workers.max(1),
            seed: self.seed.unwrap_or_else(new_shuffle_seed),
            decoder,
        }
    }
}

impl Default for PreloadPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{FileType, SourceProperties};
    use crate::thumbnails::decoder::DecodedMedia;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::time::Instant;

    pub(crate) fn descriptor(path: &str) -> MediaDescriptor {
        MediaDescriptor {
            source_index: 0,
            file_path: PathBuf::from(path),
            item_type: FileType::Image,
            file_type: FileType::Image,
            part_number: 1,
            part_count: 1,
            metadata_file: None,
            source_properties: SourceProperties::Normal,
        }
    }

    /// Derives the timestamp from the file name; `missing*` paths fail,
    /// `slow*` paths sleep first.
    pub(crate) struct FakeDecoder;

    impl MediaDecoder for FakeDecoder {
        fn decode(&self, d: &MediaDescriptor) -> Result<DecodedMedia, PreloadError> {
            let name = d
                .file_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if name.starts_with("missing") {
                return Err(PreloadError::MissingFile(d.file_path.clone()));
            }
            if name.starts_with("slow") {
                thread::sleep(Duration::from_millis(30));
            }
            if name.starts_with("panic") {
                panic!("decoder blew up");
            }
            Ok(DecodedMedia {
                thumbnail: RgbImage::new(2, 2),
                create_epoch: name.trim_start_matches("slow").parse().ok(),
                degraded: false,
            })
        }
    }

    pub(crate) fn drain(stream: &mut ResultStream) -> Vec<PreloadOutcome> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut all = Vec::new();
        while !stream.is_finished() {
            assert!(Instant::now() < deadline, "pipeline did not finish");
            all.extend(stream.poll_results());
            thread::sleep(Duration::from_millis(2));
        }
        all
    }

    #[test]
    fn test_every_item_delivered_exactly_once() {
        for workers in [1, 3, 8] {
            let items: Vec<_> = (0..50)
                .map(|i| descriptor(&format!("/m/{}{}.jpg", if i % 7 == 0 { "slow" } else { "" }, i)))
                .collect();
            let expected: HashSet<PathBuf> = items.iter().map(|d| d.file_path.clone()).collect();

            let mut stream = PreloadPipeline::builder()
                .workers(workers)
                .build(Arc::new(FakeDecoder))
                .start(items);
            let results = drain(&mut stream);

            assert_eq!(results.len(), 50);
            let seen: HashSet<PathBuf> = results
                .iter()
                .map(|r| r.as_ref().unwrap().descriptor.file_path.clone())
                .collect();
            assert_eq!(seen, expected);
            assert_eq!(stream.drained(), 50);
        }
    }

    #[test]
    fn test_missing_file_fails_only_that_item() {
        let items = vec![
            descriptor("/m/1.jpg"),
            descriptor("/m/missing.jpg"),
            descriptor("/m/2.jpg"),
        ];
        let mut stream = PreloadPipeline::builder()
            .workers(2)
            .build(Arc::new(FakeDecoder))
            .start(items);
        let results = drain(&mut stream);

        let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(results.len(), 3);
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].error, PreloadError::MissingFile(_)));
    }

    #[test]
    fn test_panicking_decoder_still_reports() {
        let items = vec![descriptor("/m/panic.jpg"), descriptor("/m/3.jpg")];
        let mut stream = PreloadPipeline::builder()
            .workers(1)
            .build(Arc::new(FakeDecoder))
            .start(items);
        let results = drain(&mut stream);
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(PreloadFailure { error: PreloadError::Panicked(_), .. }))));
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_video_decodes_still_resolve_every_item() {
        use crate::thumbnails::decoder::tests::{decoder, descriptor as typed};
        use image::Rgb;

        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = crate::tool::tests::script(dir.path(), "ffmpeg", "exec sleep 10");
        let mut items = Vec::new();
        for i in 0..4 {
            let clip = dir.path().join(format!("clip{i}.mp4"));
            std::fs::write(&clip, b"fake").unwrap();
            items.push(typed(clip, FileType::Video));

            let still = dir.path().join(format!("still{i}.png"));
            RgbImage::from_pixel(16, 16, Rgb([i as u8, 0, 0])).save(&still).unwrap();
            items.push(typed(still, FileType::Image));
        }

        let started = Instant::now();
        let mut stream = PreloadPipeline::builder()
            .workers(2)
            .build(Arc::new(decoder(&ffmpeg)))
            .start(items);
        let results = drain(&mut stream);

        assert_eq!(results.len(), 8);
        let loaded: Vec<_> = results.iter().map(|r| r.as_ref().unwrap()).collect();
        let degraded = loaded.iter().filter(|r| r.degraded).count();
        assert_eq!(degraded, 4);
        assert!(loaded
            .iter()
            .filter(|r| r.degraded)
            .all(|r| r.descriptor.file_path.extension().is_some_and(|e| e == "mp4")));
        assert!(started.elapsed() < Duration::from_secs(8));
        assert_eq!(stream.active_worker_count(), 0);
    }

    #[test]
    fn test_empty_input_is_finished_immediately() {
        let mut stream = PreloadPipeline::builder()
            .build(Arc::new(FakeDecoder))
            .start(Vec::new());
        assert!(stream.is_finished());
        assert!(stream.poll_results().is_empty());
    }

    #[test]
    fn test_shuffle_is_deterministic_per_seed() {
        let items: Vec<_> = (0..20).map(|i| descriptor(&format!("/m/{i}.jpg"))).collect();
        let a = shuffled(items.clone(), 42);
        let b = shuffled(items.clone(), 42);
        let c = shuffled(items.clone(), 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, items);
    }
}
