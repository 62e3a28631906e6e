use color_eyre::eyre::{Result, eyre};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use timeoutconn::{
    Address, BoundListener, TimeoutError, TimeoutListener, TimeoutStream, is_closed_error, listen,
    listen_network,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;

const IDLE: Duration = Duration::from_millis(50);
const TICK: Duration = Duration::from_millis(20);

/// Binds an idle-timeout listener on an ephemeral localhost port
async fn bind_local() -> Result<(TimeoutListener<BoundListener>, SocketAddr)> {
    let address: Address = "127.0.0.1:0".parse()?;
    let listener = listen(&address, IDLE).await?;
    let addr = *listener
        .local_addr()?
        .as_network()
        .ok_or_else(|| eyre!("expected a TCP listener"))?;
    Ok((listener, addr))
}

#[tokio::test]
async fn test_client_writes_keep_server_reads_alive() -> Result<()> {
    let (mut listener, addr) = bind_local().await?;

    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await?;
        let mut ticker = time::interval(TICK);
        ticker.tick().await;
        for _ in 0..11 {
            ticker.tick().await;
            stream.write_all(b"xyzzy").await?;
        }
        Ok::<(), io::Error>(())
    });

    let (mut server, _) = listener.accept().await?;
    let mut buf = [0u8; 32];
    let mut total = 0;
    loop {
        let n = server.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        total += n;
    }

    client.await??;
    assert_eq!(total, 55);
    assert!(!server.timed_out());
    Ok(())
}

#[tokio::test]
async fn test_silent_client_times_out_server_read() -> Result<()> {
    let (mut listener, addr) = bind_local().await?;

    let mut client = TcpStream::connect(addr).await?;
    client.write_all(b"xyzzy\n").await?;

    let (mut server, _) = listener.accept().await?;
    time::sleep(IDLE * 2).await;

    let mut buf = [0u8; 32];
    let err = server.read(&mut buf).await.unwrap_err();
    assert!(is_closed_error(&err));
    assert!(server.timed_out());
    Ok(())
}

#[tokio::test]
async fn test_server_writes_keep_connection_alive() -> Result<()> {
    let (mut listener, addr) = bind_local().await?;

    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await?;
        let mut buf = [0u8; 32];
        let mut total = 0;
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Ok::<usize, io::Error>(total);
            }
            total += n;
        }
    });

    let (mut server, _) = listener.accept().await?;
    let mut ticker = time::interval(TICK);
    ticker.tick().await;
    for _ in 0..11 {
        ticker.tick().await;
        server.write_all(b"hello!").await?;
    }
    assert!(!server.timed_out());

    server.close()?;
    assert_eq!(client.await??, 66);
    Ok(())
}

#[tokio::test]
async fn test_silent_server_write_times_out() -> Result<()> {
    let (mut listener, addr) = bind_local().await?;

    let client = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await?;
        let mut buf = [0u8; 32];
        stream.read(&mut buf).await
    });

    let (mut server, _) = listener.accept().await?;
    time::sleep(IDLE * 2).await;

    let err = server.write_all(b"hello?").await.unwrap_err();
    assert!(is_closed_error(&err));

    // The client saw a clean end-of-stream when the watchdog closed the socket.
    assert_eq!(client.await??, 0);
    Ok(())
}

#[tokio::test]
async fn test_wrapping_an_existing_listener_and_stream() -> Result<()> {
    let tcp = TcpListener::bind("127.0.0.1:0").await?;
    let addr = tcp.local_addr()?;
    let mut listener = TimeoutListener::new(tcp, Duration::from_secs(5))?;
    assert_eq!(listener.local_addr()?, addr);

    let mut client = TimeoutStream::new(TcpStream::connect(addr).await?, Duration::from_secs(5))?;
    let (mut server, peer) = listener.accept().await?;

    assert_eq!(server.peer_addr()?, peer);
    assert_eq!(client.peer_addr()?, addr);
    server.with_inner(|stream| stream.set_nodelay(true))??;
    assert!(server.with_inner(|stream| stream.nodelay())??);

    client.write_all(b"ping").await?;
    let mut buf = [0u8; 4];
    server.read_exact(&mut buf).await?;
    assert_eq!(&buf, b"ping");

    client.close()?;
    assert_eq!(server.read(&mut buf).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_listen_network_binds_tcp() -> Result<()> {
    let mut listener = listen_network("tcp4", "127.0.0.1:0", IDLE).await?;
    let address = listener.local_addr()?;
    let addr = *address
        .as_network()
        .ok_or_else(|| eyre!("expected a TCP address"))?;
    assert!(addr.is_ipv4());
    assert_eq!(listener.idle_timeout(), IDLE);

    let _client = TcpStream::connect(addr).await?;
    let (server, peer) = listener.accept().await?;
    assert!(peer.is_network());
    assert_eq!(server.local_addr()?, address);

    time::sleep(IDLE * 2).await;
    assert!(server.timed_out());
    Ok(())
}

#[tokio::test]
async fn test_listen_network_empty_host_accepts_ipv4_clients() -> Result<()> {
    let mut listener = listen_network("tcp", ":0", IDLE).await?;
    let bound = *listener
        .local_addr()?
        .as_network()
        .ok_or_else(|| eyre!("expected a TCP address"))?;
    assert!(bound.ip().is_unspecified());

    // Dual-stack `[::]` or the `0.0.0.0` fallback both take IPv4 loopback.
    let _client = TcpStream::connect(("127.0.0.1", bound.port())).await?;
    let (server, peer) = listener.accept().await?;
    assert!(peer.is_network());
    assert_eq!(server.state(), timeoutconn::WatchdogState::Armed);
    Ok(())
}

#[tokio::test]
async fn test_listen_network_rejects_bad_input() {
    assert!(matches!(
        listen_network("udp", "127.0.0.1:0", IDLE).await,
        Err(TimeoutError::Unsupported(_))
    ));
    assert!(matches!(
        listen_network("tcp", "127.0.0.1:0", Duration::ZERO).await,
        Err(TimeoutError::Config(_))
    ));
    assert!(matches!(
        listen_network("unix", "", IDLE).await,
        Err(TimeoutError::Config(_))
    ));
}

#[tokio::test]
async fn test_bind_failure_is_reported() -> Result<()> {
    let (_listener, addr) = bind_local().await?;

    let taken = Address::Network(addr);
    let err = listen(&taken, IDLE).await.unwrap_err();
    match err {
        TimeoutError::Bind { address, source } => {
            assert_eq!(address, addr.to_string());
            assert_eq!(source.kind(), io::ErrorKind::AddrInUse);
        }
        other => return Err(eyre!("unexpected error: {other}")),
    }
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_listener_times_out_idle_connections() -> Result<()> {
    use tokio::net::UnixStream;

    let temp_dir = tempfile::tempdir()?;
    let socket_path = temp_dir.path().join("idle.sock");
    let address = Address::Unix(socket_path.clone());

    let mut listener = listen(&address, IDLE).await?;
    assert_eq!(listener.local_addr()?, address);

    let mut client = UnixStream::connect(&socket_path).await?;
    let (mut server, _) = listener.accept().await?;

    client.write_all(b"hi").await?;
    let mut buf = [0u8; 2];
    server.read_exact(&mut buf).await?;
    assert_eq!(&buf, b"hi");

    time::sleep(IDLE * 2).await;
    assert!(server.timed_out());
    assert_eq!(client.read(&mut buf).await?, 0);
    Ok(())
}
