//! Background execution context for scripted calls.
//!
//! A single thread owns the [`Automation`] and runs jobs strictly in the order
//! they were submitted. Results travel back over a channel and are applied by
//! the UI loop; the worker never touches published state.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    automation::Automation,
    error::{Error, Result},
    retry::RefreshReason,
    script::{PlayerCommand, Script},
};

/// Called from the worker thread after each finished job.
pub type Waker = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Debug, PartialEq)]
pub enum JobKind {
    Query(RefreshReason),
    Playlist { limit: usize },
    Command(PlayerCommand),
}

#[derive(Debug)]
pub struct Job {
    pub seq: u64,
    pub kind: JobKind,
    pub script: Script,
}

#[derive(Debug)]
pub struct Outcome {
    pub seq: u64,
    pub kind: JobKind,
    pub result: Result<String>,
}

enum Request {
    Run(Job),
    Shutdown,
}

pub struct Worker {
    request_tx: Option<Sender<Request>>,
    outcome_rx: Receiver<Outcome>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<A>(mut automation: A, waker: Waker) -> Result<Self>
    where
        A: Automation + 'static,
    {
        let (request_tx, request_rx) = mpsc::channel::<Request>();
        let (outcome_tx, outcome_rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stopped = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("player-automation".into())
            .spawn(move || {
                while let Ok(request) = request_rx.recv() {
                    let job = match request {
                        Request::Run(job) => job,
                        Request::Shutdown => break,
                    };
                    if stopped.load(Ordering::Acquire) {
                        tracing::debug!(seq = job.seq, kind = ?job.kind, "job skipped at shutdown");
                        break;
                    }
                    let result = automation.execute(&job.script);
                    if let Err(err) = &result {
                        tracing::debug!(seq = job.seq, kind = ?job.kind, "job failed: {err}");
                    }
                    let outcome = Outcome {
                        seq: job.seq,
                        kind: job.kind,
                        result,
                    };
                    if outcome_tx.send(outcome).is_err() {
                        break;
                    }
                    waker();
                }
                tracing::debug!("automation worker stopped");
            })
            .map_err(|source| Error::Spawn {
                program: "automation worker".into(),
                source,
            })?;

        Ok(Self {
            request_tx: Some(request_tx),
            outcome_rx,
            stop,
            handle: Some(handle),
        })
    }

    pub fn submit(&self, job: Job) -> Result<()> {
        let tx = self.request_tx.as_ref().ok_or(Error::WorkerGone)?;
        tx.send(Request::Run(job)).map_err(|_| Error::WorkerGone)
    }

    pub fn try_recv(&self) -> Option<Outcome> {
        match self.outcome_rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Outcome> {
        match self.outcome_rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Stop after the job in progress. Queued jobs are skipped.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(tx) = self.request_tx.take() {
            let _ = tx.send(Request::Shutdown);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptBuilder;
    use std::sync::atomic::AtomicUsize;

    struct Slow {
        ran: Arc<AtomicUsize>,
    }

    impl Automation for Slow {
        fn execute(&mut self, _script: &Script) -> Result<String> {
            thread::sleep(Duration::from_millis(100));
            self.ran.fetch_add(1, Ordering::SeqCst);
            Ok(String::new())
        }
    }

    #[test]
    fn shutdown_skips_queued_jobs() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut worker = Worker::spawn(
            Slow {
                ran: Arc::clone(&ran),
            },
            Arc::new(|| {}),
        )
        .unwrap();

        let scripts = ScriptBuilder::default();
        for seq in 1..=5 {
            worker
                .submit(Job {
                    seq,
                    kind: JobKind::Query(RefreshReason::Poll),
                    script: scripts.state_query(),
                })
                .unwrap();
        }
        worker.shutdown();

        assert!(ran.load(Ordering::SeqCst) <= 1);
        assert!(worker.submit(Job {
            seq: 6,
            kind: JobKind::Query(RefreshReason::Poll),
            script: scripts.state_query(),
        })
        .is_err());
    }
}
