//! Command-line interface definitions.
//!
//! This module defines the argument structures for the server and client
//! binaries using clap.

use clap::{Parser, Subcommand};

/// Memstash server arguments.
#[derive(Parser, Debug)]
#[command(name = "memstash-server")]
#[command(author, version, about, long_about = None)]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 18080)]
    pub port: u16,

    /// Global memory budget in bytes.
    #[arg(short, long, default_value_t = crate::config::DEFAULT_MEMORY_LIMIT)]
    pub memory_limit: u64,

    /// Number of cache shards.
    #[arg(short, long, default_value_t = crate::config::DEFAULT_SHARD_COUNT)]
    pub shards: usize,

    /// Number of runtime worker threads.
    #[arg(short, long, default_value_t = 10)]
    pub threads: usize,
}

/// Memstash client.
///
/// A CLI tool for talking to a memstash (or memcached) server over the
/// text protocol.
#[derive(Parser, Debug)]
#[command(name = "memstash-client")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Server address.
    #[arg(long, default_value = "127.0.0.1", global = true)]
    pub host: String,

    /// Server port.
    #[arg(short, long, default_value_t = 18080, global = true)]
    pub port: u16,

    /// The command to execute.
    #[clap(subcommand)]
    pub command: ClientCommand,
}

/// Available client commands.
#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    /// Get one or more values by key.
    Get {
        /// The keys to look up.
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Like get, but also prints each entry's CAS token.
    Gets {
        /// The keys to look up.
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Set a key-value pair, unconditionally.
    Set {
        /// The key to store the value under.
        key: String,
        /// The value to store.
        value: String,
        /// Opaque flags stored alongside the value.
        #[arg(short, long, default_value = "0")]
        flags: String,
        /// Expiry in seconds; 0 means never.
        #[arg(short, long, default_value_t = 0)]
        exptime: u64,
    },

    /// Store only if the key does not already exist.
    Add {
        key: String,
        value: String,
        #[arg(short, long, default_value = "0")]
        flags: String,
        #[arg(short, long, default_value_t = 0)]
        exptime: u64,
    },

    /// Store only if the CAS token still matches.
    Cas {
        key: String,
        value: String,
        /// Token previously returned by gets.
        cas: String,
        #[arg(short, long, default_value = "0")]
        flags: String,
        #[arg(short, long, default_value_t = 0)]
        exptime: u64,
    },

    /// Delete a key.
    Delete {
        /// The key to delete.
        key: String,
        /// Grace period in seconds before the entry disappears.
        #[arg(short, long, default_value_t = 0)]
        grace: u64,
    },

    /// Increment a numeric value.
    Incr { key: String, delta: u64 },

    /// Decrement a numeric value, flooring at zero.
    Decr { key: String, delta: u64 },

    /// Update a key's expiry without touching its value.
    Touch { key: String, exptime: u64 },

    /// Invalidate everything, optionally after a delay.
    FlushAll {
        #[arg(short, long, default_value_t = 0)]
        delay: u64,
    },

    /// Get server statistics.
    Stats,

    /// Print the server version.
    Version,
}
