//! Memstash cache server.
//!
//! This binary runs a TCP server speaking the memcached text protocol.

use bytes::Bytes;
use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{tcp::OwnedReadHalf, TcpListener, TcpStream},
    signal,
};
use tracing::{debug, error, info, warn};

use memstash::{Action, Cache, CacheConfig, Request, ServerArgs};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ServerArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.threads)
        .enable_all()
        .build()?;

    runtime.block_on(run(args))
}

async fn run(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = CacheConfig::new()
        .memory_limit(args.memory_limit)
        .shard_count(args.shards)
        .build();
    let cache = Cache::new(config);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr).await?;

    info!(
        %addr,
        memory_limit = args.memory_limit,
        shards = args.shards,
        "cache server listening"
    );

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        debug!(%peer, "connection accepted");
                        let cache = cache.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(socket, cache).await {
                                warn!(%peer, error = %e, "connection error");
                            }
                            debug!(%peer, "connection closed");
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                    }
                }
            }
            _ = signal::ctrl_c() => {
                let stats = cache.stats();
                info!(
                    hits = stats.hits,
                    misses = stats.misses,
                    evictions = stats.evictions,
                    items = cache.len(),
                    "shutting down"
                );
                return Ok(());
            }
        }
    }
}

/// Serve one client until it quits, disconnects, or the socket fails.
async fn handle_connection(socket: TcpStream, cache: Cache) -> std::io::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(()); // client hung up
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            continue;
        }

        let mut request = match Request::parse(trimmed) {
            Ok(request) => request,
            Err(e) => {
                match e.to_reply() {
                    Some(reply) => write_half.write_all(reply.as_bytes()).await?,
                    None => return Ok(()),
                }
                continue;
            }
        };

        // Storage commands announce a data block; read it before executing.
        if let Some(len) = request.data_len() {
            match read_data_block(&mut reader, len).await? {
                Some(data) => request.set_data(data),
                None => {
                    write_half
                        .write_all(b"CLIENT_ERROR bad data chunk\r\n")
                        .await?;
                    continue;
                }
            }
        }

        match request.execute(&cache) {
            Action::Reply(reply) => write_half.write_all(&reply).await?,
            Action::NoReply => {}
            Action::Quit => return Ok(()),
        }
    }
}

/// Read `len` data bytes plus the trailing CRLF. Returns `None` if the
/// terminator is missing.
async fn read_data_block(
    reader: &mut BufReader<OwnedReadHalf>,
    len: usize,
) -> std::io::Result<Option<Bytes>> {
    let mut buf = vec![0u8; len + 2];
    reader.read_exact(&mut buf).await?;
    if &buf[len..] != b"\r\n" {
        return Ok(None);
    }
    buf.truncate(len);
    Ok(Some(Bytes::from(buf)))
}
