//! CLI definitions for relayq.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use relayq_queue::QueueName;

/// relayq CLI.
#[derive(Parser)]
#[command(name = "relayq")]
#[command(about = "Reliable at-least-once task queue")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "relayq.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Push a task onto the todo queue
    Push {
        /// Task payload as a JSON object
        payload: String,
    },

    /// Schedule a task to run later
    Defer {
        /// Task payload as a JSON object
        payload: String,

        /// Delay from now, in milliseconds
        #[arg(long, conflicts_with = "at")]
        delay_ms: Option<u64>,

        /// Absolute due time (RFC 3339)
        #[arg(long)]
        at: Option<String>,
    },

    /// Schedule a task to run on a fixed interval
    Recur {
        /// Task payload as a JSON object
        payload: String,

        /// Interval between firings, in milliseconds
        #[arg(long)]
        every_ms: u64,
    },

    /// Cancel a deferred task
    Undefer {
        /// Task ref
        task_ref: String,

        /// Push it to todo now instead of dropping it
        #[arg(long)]
        now: bool,
    },

    /// Cancel a recurring task
    Unrecur {
        /// Task ref
        task_ref: String,
    },

    /// Remove a ref from one of the queues
    Remove {
        /// Queue name (todo, doing, failed, done)
        queue: QueueName,

        /// Task ref
        task_ref: String,

        /// Keep the stored task
        #[arg(long)]
        keep_storage: bool,
    },

    /// Show a stored task
    Show {
        /// Task ref
        task_ref: String,
    },

    /// List the refs in a queue
    List {
        /// Queue name (todo, doing, failed, done)
        queue: QueueName,
    },

    /// Show queue sizes
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Claim and process tasks until interrupted
    Work {
        /// Override listener.max_out
        #[arg(long)]
        max_out: Option<usize>,
    },
}
