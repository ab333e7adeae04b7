use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use thiserror::Error;
use tokio::sync::oneshot;

// Type alias to simplify the reply carried back to each requester
type EngineReply<M> = Result<
    InfernumEngineResponse<
        <<M as InfernumModel>::Request as RequestMetadata>::Metadata,
        <M as InfernumModel>::Response,
    >,
    EngineError<<M as InfernumModel>::Error>,
>;

type EngineSender<M> =
    mpsc::Sender<InfernumEngineRequest<<M as InfernumModel>::Request, EngineReply<M>>>;

/// Trait for implementing inference models that can be used with the InfernumEngine.
///
/// Users implement this trait to define their custom model behavior, including
/// the request and response types and the inference logic.
pub trait InfernumModel {
    /// The request type that the model accepts for inference.
    type Request;
    /// The response type that the model returns after inference.
    type Response;
    /// The error type that can be returned during inference.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs inference on the given request and returns a response or error.
    fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error>;
}

/// Represents the current state of the inference engine.
#[derive(Clone, Debug, PartialEq)]
pub enum InfernumEngineState {
    /// No worker is running a model.
    Idle,
    /// At least one worker is running a model.
    Processing,
}

impl InfernumEngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InfernumEngineState::Idle => "idle",
            InfernumEngineState::Processing => "processing",
        }
    }
}

/// Trait for extracting lightweight metadata from inference requests.
///
/// This allows the engine to report essential information (like image sizes)
/// without cloning heavy data for telemetry and debugging purposes.
pub trait RequestMetadata {
    /// The lightweight metadata type that represents the request.
    type Metadata: Send + 'static;

    /// Extracts lightweight metadata from the request.
    fn metadata(&self) -> Self::Metadata;
}

/// Internal request wrapper used by the engine to route a job and its reply.
struct InfernumEngineRequest<Req, Reply> {
    id: u64,
    request: Req,
    reply: oneshot::Sender<Reply>,
}

/// Response returned by the engine containing both the model's response and telemetry data.
#[derive(Debug)]
pub struct InfernumEngineResponse<Metadata, Res> {
    /// Unique identifier assigned when the request was queued.
    pub id: u64,
    /// Timestamp when the inference started.
    pub start_time: Instant,
    /// Total time taken for the inference.
    pub duration: Duration,
    /// Lightweight metadata extracted from the original request.
    pub request_metadata: Metadata,
    /// The actual response from the model.
    pub response: Res,
}

/// Errors surfaced to callers of [`InfernumEngine::infer`].
#[derive(Debug, Error)]
pub enum EngineError<E> {
    /// The engine was stopped or all of its workers exited.
    #[error("inference engine is not running")]
    Stopped,
    /// The model rejected or failed on this request.
    #[error("{0}")]
    Model(E),
    /// The model panicked while running this request.
    #[error("inference panicked: {0}")]
    Panicked(String),
}

/// Decrements a counter when dropped, including during unwinding.
struct CountGuard<'a>(&'a AtomicUsize);

impl<'a> CountGuard<'a> {
    fn acquire(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }

    fn adopt(counter: &'a AtomicUsize) -> Self {
        Self(counter)
    }
}

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Inference engine that owns one or more models on dedicated worker threads.
///
/// Requests are queued in FIFO order and picked up by whichever worker is free.
/// Each request carries its own reply channel, so concurrent callers never
/// observe each other's results. A failing or panicking request only fails
/// its own caller; the worker that ran it keeps serving the queue.
pub struct InfernumEngine<M: InfernumModel + Send + 'static>
where
    M::Error: Send + 'static,
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    req_tx: Option<EngineSender<M>>,
    busy: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    workers: Vec<JoinHandle<()>>,
    id_counter: AtomicU64,
}

impl<M: InfernumModel + Send + 'static> InfernumEngine<M>
where
    M::Error: Send + 'static,
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    /// Creates a new inference engine with a single worker running `model`.
    pub fn new(model: M) -> Self {
        Self::with_workers(vec![model])
    }

    /// Creates an engine with one worker thread per model instance.
    ///
    /// # Arguments
    /// * `models` - The model instances; each one is moved to its own thread
    ///
    /// # Returns
    /// A new `InfernumEngine` ready to accept inference requests
    pub fn with_workers(models: Vec<M>) -> Self {
        let (req_tx, req_rx) =
            mpsc::channel::<InfernumEngineRequest<M::Request, EngineReply<M>>>();
        let req_rx = Arc::new(Mutex::new(req_rx));
        let busy = Arc::new(AtomicUsize::new(0));
        let live = Arc::new(AtomicUsize::new(models.len()));

        let workers = models
            .into_iter()
            .enumerate()
            .map(|(worker, mut model)| {
                let req_rx = req_rx.clone();
                let busy = busy.clone();
                let live = live.clone();
                std::thread::spawn(move || {
                    let _live = CountGuard::adopt(&live);
                    loop {
                        let next = match req_rx.lock() {
                            Ok(rx) => rx.recv(),
                            Err(_) => break,
                        };
                        let Ok(req) = next else {
                            break;
                        };

                        log::debug!("Worker {worker} picked up inference #{}", req.id);

                        // Extract lightweight metadata before consuming the request
                        let request_metadata = req.request.metadata();

                        let start_time = Instant::now();
                        let result = {
                            let _busy = CountGuard::acquire(&busy);
                            let request = req.request;
                            panic::catch_unwind(AssertUnwindSafe(|| model.run(request)))
                        };
                        let duration = start_time.elapsed();

                        let reply = match result {
                            Ok(Ok(response)) => {
                                log::debug!("Inference #{} completed in {duration:?}", req.id);
                                Ok(InfernumEngineResponse {
                                    id: req.id,
                                    start_time,
                                    duration,
                                    request_metadata,
                                    response,
                                })
                            }
                            Ok(Err(e)) => {
                                log::warn!("Inference #{} failed: {e}", req.id);
                                Err(EngineError::Model(e))
                            }
                            Err(payload) => {
                                let message = panic_message(payload);
                                log::error!("Inference #{} panicked: {message}", req.id);
                                Err(EngineError::Panicked(message))
                            }
                        };

                        if req.reply.send(reply).is_err() {
                            log::debug!("Requester of inference #{} went away", req.id);
                        }
                    }
                    log::debug!("Worker {worker} stopped");
                })
            })
            .collect();

        Self {
            req_tx: Some(req_tx),
            busy,
            live,
            workers,
            id_counter: AtomicU64::new(0),
        }
    }

    /// Returns the current state of the inference engine.
    pub fn state(&self) -> InfernumEngineState {
        if self.busy_workers() == 0 {
            InfernumEngineState::Idle
        } else {
            InfernumEngineState::Processing
        }
    }

    /// Number of workers currently running a model.
    pub fn busy_workers(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    /// Number of worker threads still serving the queue.
    pub fn workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Queues an inference request and waits for its result.
    ///
    /// Each request is assigned a unique ID for tracking purposes.
    ///
    /// # Returns
    /// * `Ok` - The model response with telemetry data
    /// * `Err(Stopped)` - The engine has no running workers
    /// * `Err(Model)` - The model failed on this request
    /// * `Err(Panicked)` - The model panicked on this request
    pub async fn infer(
        &self,
        request: M::Request,
    ) -> Result<
        InfernumEngineResponse<<M::Request as RequestMetadata>::Metadata, M::Response>,
        EngineError<M::Error>,
    > {
        let tx = match &self.req_tx {
            Some(tx) if self.workers() > 0 => tx,
            _ => return Err(EngineError::Stopped),
        };

        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();

        tx.send(InfernumEngineRequest {
            id,
            request,
            reply: reply_tx,
        })
        .map_err(|_| EngineError::Stopped)?;
        log::debug!("Scheduled inference #{id}");

        reply_rx.await.map_err(|_| EngineError::Stopped)?
    }

    /// Stops the inference engine and shuts down the worker threads.
    ///
    /// This method will close the request queue and wait for the workers
    /// to finish processing any remaining requests.
    pub fn stop(&mut self) {
        self.req_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl<M: InfernumModel + Send + 'static> Drop for InfernumEngine<M>
where
    M::Error: Send + 'static,
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}
