//! kiln-engine — the filesystem-backed job scheduler and its inference
//! backend.
//!
//! The workspace directory is the queue. Submitters publish jobs by renaming
//! a fully staged directory into `input/ready/`; the daemon's scanner hands
//! ready ids to a fixed pool of worker threads; each worker claims a job by
//! renaming it into `processing/` and finalizes it into `output/` or
//! `failed/`. Every transition is a single atomic rename, which is the whole
//! concurrency story between processes.

pub mod backend;
pub mod pool;
pub mod processor;
pub mod reader;
pub mod recovery;
pub mod scanner;
pub mod server;
pub mod submit;

pub use backend::{Backend, BackendError, Context, LlamaBackend};
pub use processor::{ProcessOutcome, Processor};
pub use reader::Reader;
pub use scanner::Scanner;
pub use server::{Server, ServerError};
pub use submit::Submitter;
