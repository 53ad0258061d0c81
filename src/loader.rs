use crate::environment::EnvironmentAsset;
use crate::mesh::ModelImport;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::mpsc;
use std::thread;

const LOADER_QUEUE_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Model,
    Environment,
}

impl AssetKind {
    pub fn label(self) -> &'static str {
        match self {
            AssetKind::Model => "model",
            AssetKind::Environment => "environment",
        }
    }
}

/// A decode request tagged with its slot generation. The tag travels
/// with the job and comes back on the outcome; the session compares it
/// against the slot's current generation before applying.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub kind: AssetKind,
    pub generation: u64,
    pub path: PathBuf,
}

pub enum DecodedAsset {
    Model(Box<ModelImport>),
    Environment(Box<EnvironmentAsset>),
}

pub struct LoadOutcome {
    pub request: LoadRequest,
    pub result: Result<DecodedAsset>,
}

/// Decode worker pool: jobs go out over bounded channels, outcomes come
/// back over one shared channel drained non-blockingly each frame.
pub struct AssetLoader {
    senders: Vec<mpsc::SyncSender<LoadRequest>>,
    next_sender: AtomicUsize,
    rx: mpsc::Receiver<LoadOutcome>,
}

impl AssetLoader {
    pub fn spawn() -> Option<Self> {
        let worker_count = thread::available_parallelism().map(|n| n.get().clamp(2, 4)).unwrap_or(2);
        let (result_tx, result_rx) = mpsc::channel();
        let mut senders = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let (tx, rx) = mpsc::sync_channel(LOADER_QUEUE_DEPTH);
            let thread_result_tx = result_tx.clone();
            let name = format!("asset-decode-{index}");
            if thread::Builder::new()
                .name(name)
                .spawn(move || {
                    while let Ok(request) = rx.recv() {
                        let outcome = run_load_job(request);
                        if thread_result_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                })
                .is_err()
            {
                log::error!("failed to spawn asset decode worker thread");
                return None;
            }
            senders.push(tx);
        }
        Some(Self { senders, next_sender: AtomicUsize::new(0), rx: result_rx })
    }

    pub fn submit(&self, request: LoadRequest) -> std::result::Result<(), LoadRequest> {
        if self.senders.is_empty() {
            return Err(request);
        }
        let len = self.senders.len();
        let mut request = request;
        let start = self.next_sender.fetch_add(1, AtomicOrdering::Relaxed) % len;
        for offset in 0..len {
            let idx = (start + offset) % len;
            match self.senders[idx].try_send(request) {
                Ok(()) => return Ok(()),
                Err(mpsc::TrySendError::Full(returned))
                | Err(mpsc::TrySendError::Disconnected(returned)) => {
                    request = returned;
                }
            }
        }
        Err(request)
    }

    pub fn drain(&self) -> Vec<LoadOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(outcome) = self.rx.try_recv() {
            outcomes.push(outcome);
        }
        outcomes
    }
}

fn run_load_job(request: LoadRequest) -> LoadOutcome {
    let result = match request.kind {
        AssetKind::Model => ModelImport::load(&request.path).map(|import| DecodedAsset::Model(Box::new(import))),
        AssetKind::Environment => {
            EnvironmentAsset::decode(&request.path).map(|asset| DecodedAsset::Environment(Box::new(asset)))
        }
    };
    LoadOutcome { request, result }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_for_outcomes(loader: &AssetLoader, count: usize) -> Vec<LoadOutcome> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut outcomes = Vec::new();
        while outcomes.len() < count && Instant::now() < deadline {
            outcomes.extend(loader.drain());
            thread::sleep(Duration::from_millis(5));
        }
        outcomes
    }

    #[test]
    fn decode_failure_comes_back_as_error_outcome() {
        let loader = AssetLoader::spawn().expect("loader");
        loader
            .submit(LoadRequest {
                kind: AssetKind::Environment,
                generation: 7,
                path: PathBuf::from("missing/nowhere.hdr"),
            })
            .expect("submit");
        let outcomes = wait_for_outcomes(&loader, 1);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].request.generation, 7);
        assert!(outcomes[0].result.is_err());
    }

    #[test]
    fn drain_is_non_blocking_when_idle() {
        let loader = AssetLoader::spawn().expect("loader");
        assert!(loader.drain().is_empty());
    }
}
