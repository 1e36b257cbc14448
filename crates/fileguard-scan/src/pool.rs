//! Fixed-size hashing worker pool.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use fileguard_core::{
    DEFAULT_READ_BUFFER_SIZE, DigestAlgorithm, DigestResult, FileDescriptor, FileStat,
    HashRequest, ScanError,
};

use crate::digest::hash_file;

/// N workers draining one shared request queue into one shared result queue.
///
/// The result queue disconnects once every worker has exited, which is the
/// completion signal for downstream consumers.
#[derive(Debug, Clone)]
pub struct HashingPool {
    workers: usize,
    algorithm: DigestAlgorithm,
    buffer_size: usize,
    name: String,
}

impl HashingPool {
    /// Create a pool with `workers` threads (at least one).
    pub fn new(workers: usize, algorithm: DigestAlgorithm) -> Self {
        Self {
            workers: workers.max(1),
            algorithm,
            buffer_size: DEFAULT_READ_BUFFER_SIZE,
            name: "hash".to_string(),
        }
    }

    /// Per-worker read buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Thread name prefix.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Start the workers. They run until `requests` disconnects and drains,
    /// or until every receiver of `results` is gone.
    pub fn spawn(
        &self,
        requests: Receiver<HashRequest>,
        results: Sender<DigestResult>,
    ) -> Result<PoolHandle, ScanError> {
        let mut handles = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let requests = requests.clone();
            let results = results.clone();
            let algorithm = self.algorithm;
            let buffer_size = self.buffer_size;
            let name = format!("{}-{}", self.name, id);

            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(requests, results, algorithm, buffer_size))
                .map_err(|err| {
                    warn!(thread = %name, "spawn failed: {err}");
                    ScanError::ThreadFailed { name }
                })?;
            handles.push(handle);
        }
        Ok(PoolHandle {
            name: self.name.clone(),
            handles,
        })
    }
}

/// Join handle for a running pool.
#[derive(Debug)]
pub struct PoolHandle {
    name: String,
    handles: Vec<JoinHandle<u64>>,
}

impl PoolHandle {
    /// Wait for every worker; returns the number of requests processed.
    pub fn join(self) -> Result<u64, ScanError> {
        let mut processed = 0;
        let mut failed = false;
        for handle in self.handles {
            match handle.join() {
                Ok(n) => processed += n,
                Err(_) => failed = true,
            }
        }
        if failed {
            return Err(ScanError::ThreadFailed { name: self.name });
        }
        Ok(processed)
    }
}

fn worker_loop(
    requests: Receiver<HashRequest>,
    results: Sender<DigestResult>,
    algorithm: DigestAlgorithm,
    buffer_size: usize,
) -> u64 {
    let mut buf = vec![0u8; buffer_size];
    let mut processed = 0;
    for request in requests.iter() {
        let result = hash_request(request, algorithm, &mut buf);
        if results.send(result).is_err() {
            debug!("result queue closed, worker exiting");
            break;
        }
        processed += 1;
    }
    processed
}

fn hash_request(request: HashRequest, algorithm: DigestAlgorithm, buf: &mut [u8]) -> DigestResult {
    let HashRequest { path, source, stat } = request;
    match hash_file(&path, algorithm, buf) {
        Ok((live, digest)) => {
            let file = FileDescriptor::new(path, source, stat.unwrap_or(live));
            DigestResult::ok(file, digest)
        }
        Err(err) => {
            if !err.is_not_found() {
                warn!(path = %path.display(), "hash failed: {err}");
            }
            let file = FileDescriptor::new(path, source, stat.unwrap_or(FileStat::new(0, 0)));
            DigestResult::failed(file, err)
        }
    }
}
