use tokio::sync::mpsc;

use crate::error::{BridgeError, Result};

/// A unit of work to run on the UI-facing thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Create a connected handle/loop pair. The handle is cloned into every
/// channel; the loop stays with the thread that owns handler code.
pub fn main_loop() -> (MainLoopHandle, MainLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MainLoopHandle { tx }, MainLoop { rx })
}

/// Posting side of the main loop. Never blocks, callable from any thread.
#[derive(Clone)]
pub struct MainLoopHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl MainLoopHandle {
    /// Queue `job` to run the next time the loop is pumped.
    pub fn post<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .map_err(|_| BridgeError::MainLoopClosed)
    }

    /// Like [`MainLoopHandle::post`], logging instead of failing when the
    /// loop is gone. Channel workers use this: there is nobody to report to.
    pub(crate) fn post_or_log<F>(&self, what: &str, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.post(job).is_err() {
            tracing::debug!("main loop closed, dropping {}", what);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving side of the main loop. All completion callbacks, observer
/// notifications and hook handlers run inside one of its `run*` methods.
pub struct MainLoop {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl MainLoop {
    /// Run every job already queued without waiting. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait for the next job and run it. Returns false once every handle
    /// has been dropped and the queue is empty.
    pub async fn run_once(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run jobs until every handle is dropped.
    pub async fn run(&mut self) {
        while self.run_once().await {}
    }
}
