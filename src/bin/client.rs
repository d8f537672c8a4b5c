//! Memstash cache client.
//!
//! This binary provides a CLI for talking to a running cache server over
//! the memcached text protocol.

use bytes::BytesMut;
use clap::Parser;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use memstash::cli::{Cli, ClientCommand};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    let addr = format!("{}:{}", args.host, args.port);
    let mut stream = match TcpStream::connect(&addr).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to connect to server at {}: {}", addr, e);
            eprintln!("Make sure the server is running with: cargo run --bin server");
            std::process::exit(1);
        }
    };

    let (request, multiline) = render_request(&args.command);
    stream.write_all(request.as_bytes()).await?;

    let reply = read_reply(&mut stream, multiline).await?;
    let text = String::from_utf8_lossy(&reply);
    let text = text.trim_end();

    if text.starts_with("ERROR")
        || text.starts_with("CLIENT_ERROR")
        || text.starts_with("SERVER_ERROR")
    {
        eprintln!("{}", text);
        std::process::exit(1);
    }
    println!("{}", text);

    Ok(())
}

/// Render the command line (and data block, for storage commands). The
/// second element says whether the reply is terminated by `END`.
fn render_request(command: &ClientCommand) -> (String, bool) {
    match command {
        ClientCommand::Get { keys } => (format!("get {}\r\n", keys.join(" ")), true),
        ClientCommand::Gets { keys } => (format!("gets {}\r\n", keys.join(" ")), true),
        ClientCommand::Set {
            key,
            value,
            flags,
            exptime,
        } => (
            format!(
                "set {} {} {} {}\r\n{}\r\n",
                key,
                flags,
                exptime,
                value.len(),
                value
            ),
            false,
        ),
        ClientCommand::Add {
            key,
            value,
            flags,
            exptime,
        } => (
            format!(
                "add {} {} {} {}\r\n{}\r\n",
                key,
                flags,
                exptime,
                value.len(),
                value
            ),
            false,
        ),
        ClientCommand::Cas {
            key,
            value,
            cas,
            flags,
            exptime,
        } => (
            format!(
                "cas {} {} {} {} {}\r\n{}\r\n",
                key,
                flags,
                exptime,
                value.len(),
                cas,
                value
            ),
            false,
        ),
        ClientCommand::Delete { key, grace } => {
            if *grace == 0 {
                (format!("delete {}\r\n", key), false)
            } else {
                (format!("delete {} {}\r\n", key, grace), false)
            }
        }
        ClientCommand::Incr { key, delta } => (format!("incr {} {}\r\n", key, delta), false),
        ClientCommand::Decr { key, delta } => (format!("decr {} {}\r\n", key, delta), false),
        ClientCommand::Touch { key, exptime } => {
            (format!("touch {} {}\r\n", key, exptime), false)
        }
        ClientCommand::FlushAll { delay } => (format!("flush_all {}\r\n", delay), false),
        ClientCommand::Stats => ("stats\r\n".to_string(), true),
        ClientCommand::Version => ("version\r\n".to_string(), false),
    }
}

/// Read until a complete reply has arrived. Single-line replies end at the
/// first CRLF; multi-line replies end at `END\r\n`.
async fn read_reply(stream: &mut TcpStream, multiline: bool) -> std::io::Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(buf);
        }
        let complete = if multiline {
            buf.ends_with(b"END\r\n") || starts_with_error(&buf)
        } else {
            buf.ends_with(b"\r\n")
        };
        if complete {
            return Ok(buf);
        }
    }
}

fn starts_with_error(buf: &[u8]) -> bool {
    (buf.starts_with(b"ERROR") || buf.starts_with(b"CLIENT_ERROR") || buf.starts_with(b"SERVER_ERROR"))
        && buf.ends_with(b"\r\n")
}
