use clap::Parser;
use proxy::codec::{read_frame, write_frame, Frame};
use shared::{Packet, ProtocolVersion};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Parser, Debug)]
#[command(author, version, about = "Query a relay for its status")]
struct Args {
    /// Proxy address
    #[arg(short, long, default_value = "127.0.0.1:25577")]
    server: String,

    /// Host name to present in the handshake
    #[arg(long)]
    virtual_host: Option<String>,

    /// Protocol version to announce
    #[arg(long, default_value_t = ProtocolVersion::MAXIMUM.0)]
    protocol: i32,

    /// Send a legacy ping instead of a status request
    #[arg(long)]
    legacy: bool,
}

fn get_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as i64
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {}", args.server);

    if args.legacy {
        write_frame(
            &mut stream,
            &Packet::LegacyPing {
                protocol_version: args.protocol,
            },
        )
        .await?;
        stream.flush().await?;

        match timeout(Duration::from_secs(5), read_frame(&mut stream)).await? {
            Ok(Some(Frame::Packet(Packet::LegacyDisconnect { ping }))) => {
                println!("Legacy reply: {:#?}", ping);
            }
            other => println!("Unexpected reply: {:?}", other),
        }
        return Ok(());
    }

    let (host, port) = match &args.virtual_host {
        Some(host) => (host.clone(), 25577),
        None => {
            let addr: std::net::SocketAddr = args.server.parse()?;
            (addr.ip().to_string(), addr.port())
        }
    };

    write_frame(
        &mut stream,
        &Packet::Handshake {
            protocol_version: args.protocol,
            server_address: host,
            server_port: port,
        },
    )
    .await?;
    write_frame(&mut stream, &Packet::StatusRequest).await?;
    stream.flush().await?;

    match timeout(Duration::from_secs(5), read_frame(&mut stream)).await?? {
        Some(Frame::Packet(Packet::StatusResponse { ping })) => {
            println!("Status: {:#?}", ping);
        }
        other => {
            println!("Expected a status response but got: {:?}", other);
            return Ok(());
        }
    }

    let sent = Instant::now();
    let payload = get_timestamp();
    write_frame(&mut stream, &Packet::StatusPing { payload }).await?;
    stream.flush().await?;

    match timeout(Duration::from_secs(5), read_frame(&mut stream)).await?? {
        Some(Frame::Packet(Packet::StatusPing { payload: echoed })) if echoed == payload => {
            println!("Round trip: {:?}", sent.elapsed());
        }
        other => println!("Unexpected ping reply: {:?}", other),
    }

    Ok(())
}
