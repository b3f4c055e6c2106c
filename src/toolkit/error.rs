//! Errors that can occur while invoking the toolkit

use std::io;

use thiserror::Error;

/// Errors raised by a [`super::Toolkit`] backend
#[derive(Error, Debug)]
pub enum ToolkitError {
    /// The toolkit executable couldn't be started
    #[error("Couldn't start {program}: {source}")]
    Spawn {
        /// The executable
        program: String,
        /// The underlying error
        source: io::Error,
    },

    /// The toolkit exited unsuccessfully
    #[error("Task {task} failed: {status}")]
    TaskFailed {
        /// The task which was running
        task: String,
        /// The exit status
        status: String,
    },

    /// The task completed but an output is missing on disk
    #[error("Task {task} completed, but {path} does not exist")]
    MissingOutput {
        /// The task which ran
        task: String,
        /// The output path
        path: String,
    },

    /// Error derived from [`std::io::Error`]
    #[error("{0}")]
    IO(#[from] io::Error),
}
