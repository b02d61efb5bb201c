// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use hwlink::{
    transport::{Emulator, Script, Transport, DEFAULT_TCP_PORT},
    Error,
};

mod script;
use script::ScriptFile;

/// Scripted hardware wallet emulator
///
/// Serves the provided JSON script over TCP, each connection runs
/// a fresh copy of the script.
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct Args {
    /// Script file (`.json`)
    script: String,

    /// Listen address
    #[clap(long, env = "HWLINK_SIM_ADDR", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    addr: IpAddr,

    /// Listen port
    #[clap(long, env = "HWLINK_SIM_PORT", default_value_t = DEFAULT_TCP_PORT)]
    port: u16,

    /// Log level
    #[clap(long, default_value = "debug")]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging
    let mut c = simplelog::ConfigBuilder::new();
    c.add_filter_allow_str("hwlink");

    let _ = simplelog::SimpleLogger::init(args.log_level, c.build());

    // Load script
    let s = tokio::fs::read_to_string(&args.script).await?;
    let f: ScriptFile = serde_json::from_str(&s)?;
    let script = f.script()?;

    info!("Loaded script '{}' ({} steps)", args.script, script.len());

    // Bind listener
    let addr = SocketAddr::new(args.addr, args.port);
    let listener = TcpListener::bind(addr).await?;

    info!("Listening on {}", addr);

    // Accept connections until exit signal
    loop {
        tokio::select!(
            r = listener.accept() => {
                let (socket, peer) = r?;
                debug!("Connection from {}", peer);

                tokio::spawn(serve(socket, script.clone()));
            }
            // Exit on ctrl + c
            _ = tokio::signal::ctrl_c() => {
                debug!("Exit!");
                break;
            },
        );
    }

    Ok(())
}

/// Serve a single connection
async fn serve(socket: TcpStream, script: Script) {
    let peer = socket.peer_addr().ok();

    match pump(socket, script).await {
        Ok(()) => debug!("Connection closed ({:?})", peer),
        Err(Error::Disconnected) => info!("Emulator disconnected ({:?})", peer),
        Err(e) => error!("Connection failed ({:?}): {}", peer, e),
    }
}

/// Move bytes between the socket and the emulator until either side closes
async fn pump(mut socket: TcpStream, script: Script) -> Result<(), Error> {
    let mut emu = Emulator::new(script);
    emu.open().await?;

    let mut rx = [0u8; 1024];
    let mut tx = [0u8; 1024];

    loop {
        tokio::select!(
            // Host to emulator
            r = socket.read(&mut rx) => {
                let n = r?;
                if n == 0 {
                    break;
                }

                let w = emu.write(&rx[..n]).await?;
                if w != n {
                    warn!("Emulator accepted {} of {} bytes", w, n);
                }
            }
            // Emulator to host
            r = emu.read(&mut tx, None) => {
                let n = r?;
                socket.write_all(&tx[..n]).await?;
            }
        );
    }

    emu.close().await
}
