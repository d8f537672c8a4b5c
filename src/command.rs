//! The memcached text protocol: request parsing, execution and response
//! rendering.
//!
//! A request arrives as one whitespace-separated command line; storage
//! commands are followed by a data block whose length the command line
//! announces. The connection handler parses the line, reads the block if
//! [`Request::data_len`] asks for one, and then executes the request
//! against the cache.

use bytes::{BufMut, Bytes, BytesMut};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::Cache;
use crate::engine::{AddOutcome, DeleteOutcome, GetOutcome, InsertOutcome};
use crate::error::{ProtocolError, ProtocolResult};

/// Expiry values above this are absolute unix timestamps, not relative
/// seconds (30 days, as in memcached).
pub const EXPIRY_THRESHOLD: u64 = 60 * 60 * 24 * 30;

const SERVER_ERROR_MEMORY: &str =
    "SERVER_ERROR not enough memory to store even single element\r\n";

/// Fields shared by all storage commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    pub key: Bytes,
    pub flags: Bytes,
    pub exptime: u64,
    pub bytes: usize,
    pub cas_token: Bytes,
    pub noreply: bool,
    pub data: Bytes,
}

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Set(Store),
    Add(Store),
    Replace(Store),
    Append(Store),
    Prepend(Store),
    Cas(Store),
    Get { keys: Vec<Bytes> },
    Gets { keys: Vec<Bytes> },
    Delete { key: Bytes, grace: u64, noreply: bool },
    Incr { key: Bytes, delta: u64, noreply: bool },
    Decr { key: Bytes, delta: u64, noreply: bool },
    Touch { key: Bytes, exptime: u64, noreply: bool },
    FlushAll { delay: u64, noreply: bool },
    Stats,
    Version,
    Verbosity { noreply: bool },
    Quit,
}

/// What the connection handler should do with the result of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write these bytes back to the client.
    Reply(Bytes),
    /// `noreply` was set; write nothing.
    NoReply,
    /// Close the connection.
    Quit,
}

impl Request {
    /// Parse one command line (without the trailing CRLF).
    pub fn parse(line: &str) -> ProtocolResult<Request> {
        let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
        let command = match tokens.first() {
            Some(word) => *word,
            None => return Err(ProtocolError::client("empty command")),
        };

        match command {
            "set" => Ok(Request::Set(parse_store(&tokens, false)?)),
            "add" => Ok(Request::Add(parse_store(&tokens, false)?)),
            "replace" => Ok(Request::Replace(parse_store(&tokens, false)?)),
            "append" => Ok(Request::Append(parse_store_short(&tokens)?)),
            "prepend" => Ok(Request::Prepend(parse_store_short(&tokens)?)),
            "cas" => Ok(Request::Cas(parse_store(&tokens, true)?)),
            "get" => Ok(Request::Get {
                keys: parse_keys(&tokens)?,
            }),
            "gets" => Ok(Request::Gets {
                keys: parse_keys(&tokens)?,
            }),
            "delete" => parse_delete(&tokens),
            "incr" => {
                let (key, delta, noreply) = parse_key_number(&tokens, "value")?;
                Ok(Request::Incr { key, delta, noreply })
            }
            "decr" => {
                let (key, delta, noreply) = parse_key_number(&tokens, "value")?;
                Ok(Request::Decr { key, delta, noreply })
            }
            "touch" => {
                let (key, raw, noreply) = parse_key_number(&tokens, "expiry time")?;
                Ok(Request::Touch {
                    key,
                    exptime: normalize_exptime(raw)?,
                    noreply,
                })
            }
            "flush_all" => parse_flush_all(&tokens),
            "stats" => {
                if tokens.len() > 1 {
                    return Err(ProtocolError::client("stats does not accept options"));
                }
                Ok(Request::Stats)
            }
            "version" => {
                if tokens.len() > 1 {
                    return Err(ProtocolError::client("version does not accept options"));
                }
                Ok(Request::Version)
            }
            "verbosity" => {
                let level = tokens
                    .get(1)
                    .ok_or_else(|| ProtocolError::client("verbosity level not found"))?;
                level
                    .parse::<u64>()
                    .map_err(|_| ProtocolError::client("invalid verbosity level"))?;
                let noreply = parse_noreply(&tokens, 2)?;
                Ok(Request::Verbosity { noreply })
            }
            "quit" => {
                if tokens.len() > 1 {
                    return Err(ProtocolError::client("quit has no options"));
                }
                Ok(Request::Quit)
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }

    /// Length of the data block this request still needs, if any.
    pub fn data_len(&self) -> Option<usize> {
        match self {
            Request::Set(s)
            | Request::Add(s)
            | Request::Replace(s)
            | Request::Append(s)
            | Request::Prepend(s)
            | Request::Cas(s) => Some(s.bytes),
            _ => None,
        }
    }

    /// Attach the data block read from the socket.
    pub fn set_data(&mut self, data: Bytes) {
        if let Request::Set(s)
        | Request::Add(s)
        | Request::Replace(s)
        | Request::Append(s)
        | Request::Prepend(s)
        | Request::Cas(s) = self
        {
            s.data = data;
        }
    }

    /// Execute against the cache and render the wire response.
    pub fn execute(self, cache: &Cache) -> Action {
        match self {
            Request::Set(s) => {
                let noreply = s.noreply;
                let outcome = cache.insert(s.key, s.flags, Bytes::new(), s.data, s.exptime);
                reply(noreply, render_insert(outcome, false))
            }
            Request::Add(s) => {
                let outcome = cache.add(s.key, s.flags, s.data, s.exptime);
                let text = match outcome {
                    AddOutcome::Stored => "STORED\r\n",
                    AddOutcome::AlreadyExists => "NOT_STORED\r\n",
                    AddOutcome::MemoryFull => SERVER_ERROR_MEMORY,
                };
                reply(s.noreply, Bytes::from_static(text.as_bytes()))
            }
            Request::Replace(s) => match cache.get(s.key.clone()) {
                GetOutcome::NotFound => reply(s.noreply, Bytes::from_static(b"NOT_STORED\r\n")),
                GetOutcome::Found { .. } => {
                    let noreply = s.noreply;
                    let outcome = cache.insert(s.key, s.flags, Bytes::new(), s.data, s.exptime);
                    reply(noreply, render_insert(outcome, false))
                }
            },
            Request::Append(s) => execute_concat(cache, s, false),
            Request::Prepend(s) => execute_concat(cache, s, true),
            Request::Cas(s) => {
                let noreply = s.noreply;
                let outcome = cache.insert(s.key, s.flags, s.cas_token, s.data, s.exptime);
                reply(noreply, render_insert(outcome, true))
            }
            Request::Get { keys } => Action::Reply(render_values(cache, keys, false)),
            Request::Gets { keys } => Action::Reply(render_values(cache, keys, true)),
            Request::Delete { key, grace, noreply } => {
                let text = match cache.delete(key, grace) {
                    DeleteOutcome::Deleted => "DELETED\r\n",
                    DeleteOutcome::NotFound => "NOT_FOUND\r\n",
                };
                reply(noreply, Bytes::from_static(text.as_bytes()))
            }
            Request::Incr { key, delta, noreply } => {
                execute_arith(cache, key, delta, noreply, false)
            }
            Request::Decr { key, delta, noreply } => {
                execute_arith(cache, key, delta, noreply, true)
            }
            Request::Touch { key, exptime, noreply } => match cache.get(key.clone()) {
                GetOutcome::NotFound => reply(noreply, Bytes::from_static(b"NOT_FOUND\r\n")),
                GetOutcome::Found {
                    value,
                    flags,
                    cas_token,
                    ..
                } => {
                    // The stored token is passed back so a racing mutation
                    // loses rather than being silently overwritten.
                    let outcome = cache.insert(key, flags, cas_token, value, exptime);
                    let text = match outcome {
                        InsertOutcome::Stored => "TOUCHED\r\n",
                        InsertOutcome::MemoryFull => SERVER_ERROR_MEMORY,
                        _ => "NOT_FOUND\r\n",
                    };
                    reply(noreply, Bytes::from_static(text.as_bytes()))
                }
            },
            Request::FlushAll { delay, noreply } => {
                cache.flush_all(delay);
                reply(noreply, Bytes::from_static(b"OK\r\n"))
            }
            Request::Stats => Action::Reply(render_stats(cache)),
            Request::Version => Action::Reply(Bytes::from(format!(
                "VERSION {}\r\n",
                env!("CARGO_PKG_VERSION")
            ))),
            Request::Verbosity { noreply } => reply(noreply, Bytes::from_static(b"OK\r\n")),
            Request::Quit => Action::Quit,
        }
    }
}

fn reply(noreply: bool, body: Bytes) -> Action {
    if noreply {
        Action::NoReply
    } else {
        Action::Reply(body)
    }
}

fn render_insert(outcome: InsertOutcome, is_cas: bool) -> Bytes {
    let text = match outcome {
        InsertOutcome::Stored => "STORED\r\n",
        InsertOutcome::MemoryFull => SERVER_ERROR_MEMORY,
        InsertOutcome::CasMismatch if is_cas => "EXISTS\r\n",
        InsertOutcome::CasRequiredButMissing if is_cas => "NOT_FOUND\r\n",
        _ => "NOT_STORED\r\n",
    };
    Bytes::from_static(text.as_bytes())
}

/// `get`/`gets` response: one VALUE block per hit, misses silently skipped.
fn render_values(cache: &Cache, keys: Vec<Bytes>, with_cas: bool) -> Bytes {
    let mut out = BytesMut::new();
    for key in keys {
        if let GetOutcome::Found {
            value,
            flags,
            cas_token,
            ..
        } = cache.get(key.clone())
        {
            out.put_slice(b"VALUE ");
            out.put_slice(&key);
            out.put_slice(b" ");
            out.put_slice(&flags);
            out.put_slice(format!(" {}", value.len()).as_bytes());
            if with_cas {
                out.put_slice(b" ");
                out.put_slice(&cas_token);
            }
            out.put_slice(b"\r\n");
            out.put_slice(&value);
            out.put_slice(b"\r\n");
        }
    }
    out.put_slice(b"END\r\n");
    out.freeze()
}

fn render_stats(cache: &Cache) -> Bytes {
    let stats = cache.stats();
    let body = format!(
        "STAT curr_items {}\r\nSTAT bytes {}\r\nSTAT limit_maxbytes {}\r\n\
         STAT get_hits {}\r\nSTAT get_misses {}\r\nSTAT cmd_set {}\r\n\
         STAT evictions {}\r\nSTAT expirations {}\r\nEND\r\n",
        cache.len(),
        cache.accounted_bytes(),
        cache.memory_limit(),
        stats.hits,
        stats.misses,
        stats.sets,
        stats.evictions,
        stats.expirations,
    );
    Bytes::from(body)
}

/// append/prepend: fetch, concatenate, store back with a fresh CAS token
/// and the remaining TTL.
fn execute_concat(cache: &Cache, s: Store, prepend: bool) -> Action {
    match cache.get(s.key.clone()) {
        GetOutcome::NotFound => reply(s.noreply, Bytes::from_static(b"NOT_STORED\r\n")),
        GetOutcome::Found {
            value, flags, ttl, ..
        } => {
            let mut combined = BytesMut::with_capacity(value.len() + s.data.len());
            if prepend {
                combined.put_slice(&s.data);
                combined.put_slice(&value);
            } else {
                combined.put_slice(&value);
                combined.put_slice(&s.data);
            }
            let outcome = cache.insert(
                s.key,
                flags,
                Bytes::new(),
                combined.freeze(),
                ttl_to_seconds(ttl),
            );
            reply(s.noreply, render_insert(outcome, false))
        }
    }
}

/// incr/decr over an ascii-u64 value; decr floors at zero.
fn execute_arith(cache: &Cache, key: Bytes, delta: u64, noreply: bool, negative: bool) -> Action {
    match cache.get(key.clone()) {
        GetOutcome::NotFound => reply(noreply, Bytes::from_static(b"NOT_FOUND\r\n")),
        GetOutcome::Found {
            value, flags, ttl, ..
        } => {
            let current: u64 = match std::str::from_utf8(&value).ok().and_then(|s| s.parse().ok())
            {
                Some(n) => n,
                None => {
                    return reply(
                        noreply,
                        Bytes::from_static(
                            b"CLIENT_ERROR cannot increment or decrement non-numeric value\r\n",
                        ),
                    )
                }
            };
            let updated = if negative {
                current.saturating_sub(delta)
            } else {
                current.wrapping_add(delta)
            };
            let rendered = updated.to_string();
            let outcome = cache.insert(
                key,
                flags,
                Bytes::new(),
                Bytes::from(rendered.clone()),
                ttl_to_seconds(ttl),
            );
            match outcome {
                InsertOutcome::Stored => {
                    reply(noreply, Bytes::from(format!("{}\r\n", rendered)))
                }
                InsertOutcome::MemoryFull => {
                    reply(noreply, Bytes::from_static(SERVER_ERROR_MEMORY.as_bytes()))
                }
                _ => reply(noreply, Bytes::from_static(b"NOT_STORED\r\n")),
            }
        }
    }
}

/// Remaining TTL back to whole seconds for a re-store, rounding up so a
/// nearly expired entry never becomes unbounded.
fn ttl_to_seconds(ttl: Option<Duration>) -> u64 {
    match ttl {
        None => 0,
        Some(remaining) => {
            let mut secs = remaining.as_secs();
            if remaining.subsec_nanos() > 0 {
                secs += 1;
            }
            secs.max(1)
        }
    }
}

fn parse_store(tokens: &[&str], with_cas: bool) -> ProtocolResult<Store> {
    let key = tokens
        .get(1)
        .ok_or_else(|| ProtocolError::client("key not found"))?;
    let flags = tokens
        .get(2)
        .ok_or_else(|| ProtocolError::client("flags not found"))?;
    let exptime = tokens
        .get(3)
        .ok_or_else(|| ProtocolError::client("expiry time not found"))?;
    let bytes = tokens
        .get(4)
        .ok_or_else(|| ProtocolError::client("bytes not found"))?;

    let exptime = normalize_exptime(
        exptime
            .parse()
            .map_err(|_| ProtocolError::client("invalid expiry time"))?,
    )?;
    let bytes: usize = bytes
        .parse()
        .map_err(|_| ProtocolError::client("invalid number of bytes"))?;

    let (cas_token, noreply_at) = if with_cas {
        let token = tokens
            .get(5)
            .ok_or_else(|| ProtocolError::client("cas string not found"))?;
        (Bytes::copy_from_slice(token.as_bytes()), 6)
    } else {
        (Bytes::new(), 5)
    };
    let noreply = parse_noreply(tokens, noreply_at)?;

    Ok(Store {
        key: Bytes::copy_from_slice(key.as_bytes()),
        flags: Bytes::copy_from_slice(flags.as_bytes()),
        exptime,
        bytes,
        cas_token,
        noreply,
        data: Bytes::new(),
    })
}

/// append/prepend accept both the short form `<key> <bytes>` and the full
/// storage form; flags and expiry in the full form are ignored in favor of
/// the stored entry's.
fn parse_store_short(tokens: &[&str]) -> ProtocolResult<Store> {
    if tokens.len() >= 5 {
        return parse_store(tokens, false);
    }
    let key = tokens
        .get(1)
        .ok_or_else(|| ProtocolError::client("key not found"))?;
    let bytes = tokens
        .get(2)
        .ok_or_else(|| ProtocolError::client("bytes not found"))?;
    let bytes: usize = bytes
        .parse()
        .map_err(|_| ProtocolError::client("invalid number of bytes"))?;
    let noreply = parse_noreply(tokens, 3)?;

    Ok(Store {
        key: Bytes::copy_from_slice(key.as_bytes()),
        flags: Bytes::new(),
        exptime: 0,
        bytes,
        cas_token: Bytes::new(),
        noreply,
        data: Bytes::new(),
    })
}

fn parse_keys(tokens: &[&str]) -> ProtocolResult<Vec<Bytes>> {
    if tokens.len() < 2 {
        return Err(ProtocolError::client("no key found"));
    }
    Ok(tokens[1..]
        .iter()
        .map(|k| Bytes::copy_from_slice(k.as_bytes()))
        .collect())
}

fn parse_delete(tokens: &[&str]) -> ProtocolResult<Request> {
    let key = tokens
        .get(1)
        .ok_or_else(|| ProtocolError::client("key not found"))?;
    let key = Bytes::copy_from_slice(key.as_bytes());

    match tokens.len() {
        2 => Ok(Request::Delete {
            key,
            grace: 0,
            noreply: false,
        }),
        3 => {
            if tokens[2] == "noreply" {
                Ok(Request::Delete {
                    key,
                    grace: 0,
                    noreply: true,
                })
            } else {
                let grace = tokens[2]
                    .parse()
                    .map_err(|_| ProtocolError::client("junk found after key"))?;
                Ok(Request::Delete {
                    key,
                    grace,
                    noreply: false,
                })
            }
        }
        4 => {
            let grace = tokens[2]
                .parse()
                .map_err(|_| ProtocolError::client("junk found after key"))?;
            if tokens[3] != "noreply" {
                return Err(ProtocolError::client("junk found after key"));
            }
            Ok(Request::Delete {
                key,
                grace,
                noreply: true,
            })
        }
        _ => Err(ProtocolError::client("junk found after key")),
    }
}

/// Shared shape of `incr`/`decr`/`touch`: `<cmd> <key> <number> [noreply]`.
fn parse_key_number(tokens: &[&str], what: &str) -> ProtocolResult<(Bytes, u64, bool)> {
    let key = tokens
        .get(1)
        .ok_or_else(|| ProtocolError::client("key not found"))?;
    let number = tokens
        .get(2)
        .ok_or_else(|| ProtocolError::client(format!("{} not found", what)))?;
    let number: u64 = number
        .parse()
        .map_err(|_| ProtocolError::client(format!("invalid format for {}", what)))?;
    let noreply = parse_noreply(tokens, 3)?;
    Ok((Bytes::copy_from_slice(key.as_bytes()), number, noreply))
}

fn parse_flush_all(tokens: &[&str]) -> ProtocolResult<Request> {
    match tokens.len() {
        1 => Ok(Request::FlushAll {
            delay: 0,
            noreply: false,
        }),
        2 => {
            if tokens[1] == "noreply" {
                Ok(Request::FlushAll {
                    delay: 0,
                    noreply: true,
                })
            } else {
                let delay = tokens[1]
                    .parse()
                    .map_err(|_| ProtocolError::client("invalid expiry time"))?;
                Ok(Request::FlushAll {
                    delay,
                    noreply: false,
                })
            }
        }
        3 => {
            let delay = tokens[1]
                .parse()
                .map_err(|_| ProtocolError::client("invalid expiry time"))?;
            if tokens[2] != "noreply" {
                return Err(ProtocolError::client("invalid noreply field"));
            }
            Ok(Request::FlushAll {
                delay,
                noreply: true,
            })
        }
        _ => Err(ProtocolError::client("invalid noreply field")),
    }
}

/// `noreply` may appear at `position`; anything else there is junk.
fn parse_noreply(tokens: &[&str], position: usize) -> ProtocolResult<bool> {
    match tokens.get(position) {
        None => Ok(false),
        Some(&"noreply") if tokens.len() == position + 1 => Ok(true),
        Some(_) => Err(ProtocolError::client(
            "junk found instead of \"noreply\"",
        )),
    }
}

/// Expiry values beyond the threshold are absolute unix times; convert to
/// relative seconds against the system clock.
fn normalize_exptime(raw: u64) -> ProtocolResult<u64> {
    if raw <= EXPIRY_THRESHOLD {
        return Ok(raw);
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    raw.checked_sub(now)
        .filter(|&relative| relative > 0)
        .ok_or_else(|| ProtocolError::client("invalid expiry time"))
}
