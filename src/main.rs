use color_eyre::eyre::{Result, WrapErr, eyre};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use timeoutconn::{Address, EchoServer, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("timeoutconn=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    // Default to TCP if no protocol specified
    let protocol = args.get(1).map(|s| s.to_lowercase()).unwrap_or_else(|| "tcp".to_string());

    // For Unix domain sockets, the second argument is the socket path
    // For TCP, it's the port
    let socket_path_or_port = args.get(2);

    let idle_timeout = match args.get(3) {
        Some(ms) => Duration::from_millis(
            ms.parse::<u64>()
                .wrap_err_with(|| format!("Invalid idle timeout in milliseconds: {ms}"))?,
        ),
        None => Duration::from_secs(30),
    };

    let bind_addr = match protocol.as_str() {
        "tcp" => {
            let port = socket_path_or_port
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(8080);
            Address::Network(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
        }
        "unix" => {
            let socket_path = socket_path_or_port
                .map(|p| p.into())
                .unwrap_or_else(|| "/tmp/timeoutconn.sock".into());
            Address::Unix(socket_path)
        }
        _ => {
            let program = args.first().map(String::as_str).unwrap_or("timeoutconn");
            eprintln!("Usage: {program} [tcp|unix] [port|socket_path] [idle_ms]");
            eprintln!("  tcp|unix:    Transport to listen on (default: tcp)");
            eprintln!("  port:        Port to bind to for TCP (default: 8080)");
            eprintln!("  socket_path: Unix domain socket path (default: /tmp/timeoutconn.sock)");
            eprintln!("  idle_ms:     Close connections idle for this long (default: 30000)");
            eprintln!();
            eprintln!("Examples:");
            eprintln!("  {program} tcp 8080 5000              # TCP on port 8080, 5s idle timeout");
            eprintln!("  {program} unix /tmp/echo.sock 1000   # Unix socket, 1s idle timeout");
            return Err(eyre!("Unknown protocol: {protocol}"));
        }
    };

    let config = ServerConfig::new(bind_addr).with_idle_timeout(idle_timeout);
    info!(
        address = %config.bind_addr,
        idle_ms = config.idle_timeout.as_millis() as u64,
        max_connections = config.max_connections,
        "Starting idle-timeout echo server"
    );

    let server = EchoServer::new(config);
    server.run().await.wrap_err("Failed to run echo server")?;

    Ok(())
}
