//! Download workers
//!
//! [`http`] turns one URL into one file on disk. [`runner`] drives a whole
//! task through its files and keeps the ledger record current.

pub mod http;
pub mod runner;

pub use http::{FetchError, FetchedFile, Fetcher, HttpConfig, HttpFetcher, resolve_file_name};
pub use runner::{ProcessError, ProcessOutcome, TaskProcessor};
