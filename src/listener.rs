use crate::config::{ListenConfig, ServerConfig};
use crate::error::{ConfigurationError, ListenerError};
use crate::parser;
use crate::record::{LogRecord, TimestampZone};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Largest syslog message accepted on either transport.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Pause after a failed `recv_from` before polling the socket again.
const UDP_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Udp,
    Tcp,
}

impl Protocol {
    fn as_str(&self) -> &'static str {
        match self {
            Protocol::Udp => "UDP",
            Protocol::Tcp => "TCP",
        }
    }
}

/// UDP/TCP syslog listener producing [`LogRecord`]s onto the engine channel.
///
/// The listener holds one sender and hands clones to its receive tasks.
/// [`SyslogListener::stop`] waits for every task to finish before dropping
/// its own sender, so the channel closes exactly once and only after the
/// last record has been sent.
pub struct SyslogListener {
    config: ServerConfig,
    zone: TimestampZone,
    sender: Option<mpsc::UnboundedSender<LogRecord>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    local_addrs: Vec<(Protocol, SocketAddr)>,
    started: bool,
}

impl SyslogListener {
    pub fn new(
        config: ServerConfig,
        zone: TimestampZone,
        sender: mpsc::UnboundedSender<LogRecord>,
    ) -> Result<Self, ConfigurationError> {
        if !config.udp.enabled && !config.tcp.enabled {
            return Err(ConfigurationError::NoListenerEnabled);
        }
        validate_listen_config(&config.udp, Protocol::Udp)?;
        validate_listen_config(&config.tcp, Protocol::Tcp)?;

        Ok(Self {
            config,
            zone,
            sender: Some(sender),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            local_addrs: Vec::new(),
            started: false,
        })
    }

    /// Addresses actually bound, available after [`SyslogListener::start`].
    pub fn local_addrs(&self) -> &[(Protocol, SocketAddr)] {
        &self.local_addrs
    }

    pub fn local_addr(&self, protocol: Protocol) -> Option<SocketAddr> {
        self.local_addrs
            .iter()
            .find(|(p, _)| *p == protocol)
            .map(|(_, addr)| *addr)
    }

    /// Bind every enabled socket, then start receiving.
    ///
    /// Nothing is spawned unless all binds succeed.
    pub async fn start(&mut self) -> Result<(), ListenerError> {
        if self.started {
            return Err(ListenerError::AlreadyStarted);
        }
        let Some(sender) = self.sender.clone() else {
            return Err(ListenerError::Stopped);
        };

        let udp = if self.config.udp.enabled {
            let addr = bind_address(&self.config.udp);
            let socket = UdpSocket::bind(&addr)
                .await
                .map_err(|source| bind_error(Protocol::Udp, addr, source))?;
            Some(socket)
        } else {
            None
        };
        let tcp = if self.config.tcp.enabled {
            let addr = bind_address(&self.config.tcp);
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|source| bind_error(Protocol::Tcp, addr, source))?;
            Some(listener)
        } else {
            None
        };

        if let Some(socket) = udp {
            if let Ok(addr) = socket.local_addr() {
                info!(address = %addr, "UDP listener started");
                self.local_addrs.push((Protocol::Udp, addr));
            }
            self.tasks.push(tokio::spawn(run_udp(
                socket,
                self.zone,
                sender.clone(),
                self.cancel.child_token(),
            )));
        }
        if let Some(listener) = tcp {
            if let Ok(addr) = listener.local_addr() {
                info!(address = %addr, "TCP listener started");
                self.local_addrs.push((Protocol::Tcp, addr));
            }
            self.tasks.push(tokio::spawn(run_tcp(
                listener,
                self.zone,
                sender,
                self.cancel.child_token(),
            )));
        }

        self.started = true;
        info!("Syslog server started");
        Ok(())
    }

    /// Stop accepting input and close the record channel.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub async fn stop(&mut self) {
        if self.sender.is_none() {
            return;
        }

        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!(error = %e, "Listener task failed");
            }
        }
        // Last sender goes away here; the engine observes the closed channel.
        self.sender = None;
        self.started = false;
        info!("Syslog server stopped");
    }
}

fn validate_listen_config(config: &ListenConfig, protocol: Protocol) -> Result<(), ConfigurationError> {
    if config.enabled && config.address.trim().is_empty() {
        return Err(ConfigurationError::ListenAddress {
            protocol: protocol.as_str(),
        });
    }
    Ok(())
}

fn bind_address(config: &ListenConfig) -> String {
    format!("{}:{}", config.address, config.port)
}

fn bind_error(protocol: Protocol, address: String, source: io::Error) -> ListenerError {
    ListenerError::Bind {
        protocol: protocol.as_str(),
        address,
        source,
    }
}

/// Parse one raw message and send the record. Returns `false` once the
/// channel is closed.
fn dispatch(
    raw: &[u8],
    peer: &SocketAddr,
    zone: &TimestampZone,
    sender: &mpsc::UnboundedSender<LogRecord>,
) -> bool {
    match parser::parse(raw) {
        Ok(parts) => {
            let record = LogRecord::from_parts(parts, peer.to_string(), String::new(), zone);
            sender.send(record).is_ok()
        }
        Err(parser::ParseError::Empty) => true,
        Err(e) => {
            warn!(client = %peer, error = %e, "Dropping unparseable syslog message");
            true
        }
    }
}

async fn run_udp(
    socket: UdpSocket,
    zone: TimestampZone,
    sender: mpsc::UnboundedSender<LogRecord>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_MESSAGE_SIZE];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => {
                    if !dispatch(&buf[..len], &peer, &zone, &sender) {
                        warn!("Record channel closed, stopping UDP listener");
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to receive UDP packet");
                    sleep(UDP_ERROR_BACKOFF).await;
                }
            }
        }
    }
    debug!("UDP listener task finished");
}

async fn run_tcp(
    listener: TcpListener,
    zone: TimestampZone,
    sender: mpsc::UnboundedSender<LogRecord>,
    cancel: CancellationToken,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "New TCP connection");
                    connections.spawn(handle_tcp_connection(
                        stream,
                        peer,
                        zone,
                        sender.clone(),
                        cancel.clone(),
                    ));
                }
                Err(e) => error!(error = %e, "Failed to accept connection"),
            },
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    error!(error = %e, "TCP connection task failed");
                }
            }
        }
    }

    while let Some(finished) = connections.join_next().await {
        if let Err(e) = finished {
            error!(error = %e, "TCP connection task failed");
        }
    }
    debug!("TCP listener task finished");
}

async fn handle_tcp_connection(
    stream: TcpStream,
    peer: SocketAddr,
    zone: TimestampZone,
    sender: mpsc::UnboundedSender<LogRecord>,
    cancel: CancellationToken,
) {
    let mut reader = BufReader::new(stream);
    let mut count: u64 = 0;

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = read_frame(&mut reader) => frame,
        };
        match frame {
            Ok(Some(frame)) => {
                if !dispatch(&frame, &peer, &zone, &sender) {
                    warn!("Record channel closed, stopping TCP handler");
                    break;
                }
                count += 1;
            }
            Ok(None) => break,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Closing TCP connection");
                break;
            }
        }
    }

    debug!(peer = %peer, frames = count, "TCP connection closed");
}

/// Read one RFC 6587 frame: octet-counted (`LEN SP MSG`) when the frame
/// starts with a digit, newline-terminated otherwise. `Ok(None)` at EOF.
async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let first = match reader.fill_buf().await? {
        [] => return Ok(None),
        buf => buf[0],
    };

    if first.is_ascii_digit() {
        let mut prefix = Vec::new();
        (&mut *reader).take(8).read_until(b' ', &mut prefix).await?;
        let len = std::str::from_utf8(&prefix)
            .ok()
            .and_then(|s| s.strip_suffix(' '))
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid octet count"))?;
        if len > MAX_MESSAGE_SIZE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
        }
        let mut frame = vec![0u8; len];
        reader.read_exact(&mut frame).await?;
        return Ok(Some(frame));
    }

    let mut line = Vec::new();
    (&mut *reader)
        .take(MAX_MESSAGE_SIZE as u64 + 1)
        .read_until(b'\n', &mut line)
        .await?;
    if line.len() > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
    }
    Ok(Some(line))
}
