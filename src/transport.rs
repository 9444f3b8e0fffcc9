use std::collections::HashMap;
use std::fmt::Debug;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RecordType};
use hickory_proto::serialize::binary::BinDecodable;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::question::{Lookup, Question, RawResult};
use crate::record::{flags_from_message, parse_record};
use crate::status::{translate_rcode, Status};

/// Max size for the UDP receive buffer as recommended by
/// [RFC6891](https://datatracker.ietf.org/doc/html/rfc6891#section-6.2.5).
pub const MAX_RECEIVE_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Udp,
    Tcp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp",
        }
    }
}

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("exchange timed out")]
    Timeout,
    #[error("temporary network failure: {0}")]
    Temporary(io::Error),
    #[error("network failure: {0}")]
    Io(io::Error),
    #[error("protocol failure: {0}")]
    Proto(#[from] hickory_proto::error::ProtoError),
}

/// Sort an I/O error into the retry taxonomy: deadline-like errors retry as
/// timeouts, connection-level hiccups retry as temporary, the rest are
/// terminal.
fn classify_io(error: io::Error) -> ExchangeError {
    match error.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ExchangeError::Timeout,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::Interrupted => ExchangeError::Temporary(error),
        _ => ExchangeError::Io(error),
    }
}

/// One request/reply exchange with a remote server. The trait is the seam
/// the resolver is tested through.
#[async_trait]
pub trait Exchanger: Debug + Send + Sync {
    async fn exchange(
        &self,
        request: &Message,
        server: SocketAddr,
        protocol: Protocol,
        timeout: Duration,
    ) -> Result<Message, ExchangeError>;
}

/// A single bound local UDP socket shared by every worker. Concurrent
/// exchanges to arbitrary remotes are demultiplexed by `(transaction id,
/// remote address)` through a background receive task.
#[derive(Debug)]
pub struct SharedUdpSocket {
    socket: Arc<UdpSocket>,
    pending: Arc<Mutex<HashMap<(u16, SocketAddr), oneshot::Sender<Message>>>>,
}

impl SharedUdpSocket {
    pub async fn bind(local: IpAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(SocketAddr::new(local, 0)).await?);
        let pending: Arc<Mutex<HashMap<(u16, SocketAddr), oneshot::Sender<Message>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let recv_socket = socket.clone();
        let recv_pending = pending.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_RECEIVE_BUFFER_SIZE];
            loop {
                let (len, from) = match recv_socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(error) => {
                        warn!(%error, "shared socket receive failed");
                        continue;
                    }
                };
                let message = match Message::from_bytes(&buf[..len]) {
                    Ok(message) => message,
                    Err(_) => continue,
                };
                let waiter = recv_pending.lock().unwrap().remove(&(message.id(), from));
                if let Some(tx) = waiter {
                    let _ = tx.send(message);
                } else {
                    debug!(id = message.id(), %from, "reply with no waiter dropped");
                }
            }
        });

        Ok(SharedUdpSocket { socket, pending })
    }

    pub async fn exchange(
        &self,
        request: &Message,
        server: SocketAddr,
        timeout: Duration,
    ) -> Result<Message, ExchangeError> {
        let bytes = request.to_vec()?;
        let key = (request.id(), server);
        let (tx, rx) = oneshot::channel();
        // A colliding transaction id simply replaces the older waiter, which
        // then times out at its own deadline. Ids are random per request so
        // this stays rare.
        self.pending.lock().unwrap().insert(key, tx);

        if let Err(error) = self.socket.send_to(&bytes, server).await {
            self.pending.lock().unwrap().remove(&key);
            return Err(classify_io(error));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) | Err(_) => {
                self.pending.lock().unwrap().remove(&key);
                Err(ExchangeError::Timeout)
            }
        }
    }
}

/// The production exchanger: shared-socket UDP when socket reuse is on, an
/// ephemeral socket per exchange otherwise, and a fresh TCP connection per
/// exchange in either case.
#[derive(Debug)]
pub struct NetExchanger {
    shared: Option<SharedUdpSocket>,
    local_addr: IpAddr,
}

impl NetExchanger {
    pub fn new_ephemeral(local_addr: IpAddr) -> Self {
        NetExchanger {
            shared: None,
            local_addr,
        }
    }

    pub async fn with_shared_socket(local_addr: IpAddr) -> io::Result<Self> {
        Ok(NetExchanger {
            shared: Some(SharedUdpSocket::bind(local_addr).await?),
            local_addr,
        })
    }

    async fn udp_exchange(
        &self,
        request: &Message,
        server: SocketAddr,
        timeout: Duration,
    ) -> Result<Message, ExchangeError> {
        if let Some(shared) = &self.shared {
            return shared.exchange(request, server, timeout).await;
        }
        let bytes = request.to_vec()?;
        let id = request.id();
        let local = SocketAddr::new(self.local_addr, 0);
        let exchange = async {
            let socket = UdpSocket::bind(local).await.map_err(classify_io)?;
            socket.connect(server).await.map_err(classify_io)?;
            socket.send(&bytes).await.map_err(classify_io)?;
            let mut buf = vec![0u8; MAX_RECEIVE_BUFFER_SIZE];
            loop {
                let len = socket.recv(&mut buf).await.map_err(classify_io)?;
                match Message::from_bytes(&buf[..len]) {
                    Ok(message) if message.id() == id => return Ok(message),
                    // Stray or unparsable datagram, keep waiting.
                    _ => continue,
                }
            }
        };
        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Timeout),
        }
    }

    async fn tcp_exchange(
        &self,
        request: &Message,
        server: SocketAddr,
        timeout: Duration,
    ) -> Result<Message, ExchangeError> {
        let bytes = request.to_vec()?;
        let exchange = async {
            let mut stream = TcpStream::connect(server).await.map_err(classify_io)?;
            stream
                .write_u16(bytes.len() as u16)
                .await
                .map_err(classify_io)?;
            stream.write_all(&bytes).await.map_err(classify_io)?;
            let len = stream.read_u16().await.map_err(classify_io)? as usize;
            let mut reply = vec![0u8; len];
            stream.read_exact(&mut reply).await.map_err(classify_io)?;
            Ok(Message::from_bytes(&reply)?)
        };
        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::Timeout),
        }
    }
}

#[async_trait]
impl Exchanger for NetExchanger {
    async fn exchange(
        &self,
        request: &Message,
        server: SocketAddr,
        protocol: Protocol,
        timeout: Duration,
    ) -> Result<Message, ExchangeError> {
        match protocol {
            Protocol::Udp => self.udp_exchange(request, server, timeout).await,
            Protocol::Tcp => self.tcp_exchange(request, server, timeout).await,
        }
    }
}

fn dns_class_from_code(code: u16) -> Option<DNSClass> {
    match code {
        1 => Some(DNSClass::IN),
        3 => Some(DNSClass::CH),
        4 => Some(DNSClass::HS),
        254 => Some(DNSClass::NONE),
        255 => Some(DNSClass::ANY),
        _ => None,
    }
}

fn build_request(question: &Question, recursive: bool) -> Result<Message, String> {
    let name = Name::from_ascii(format!("{}.", question.name))
        .map_err(|error| format!("invalid name {:?}: {error}", question.name))?;
    let qclass = dns_class_from_code(question.qclass)
        .ok_or_else(|| format!("class {} not representable on the wire", question.qclass))?;
    let mut query = Query::new();
    query
        .set_name(name)
        .set_query_type(RecordType::from(question.qtype))
        .set_query_class(qclass);
    let mut message = Message::new();
    message.add_query(query);
    message.set_id(rand::random());
    message.set_recursion_desired(recursive);
    Ok(message)
}

/// One lookup's worth of wire policy: protocol selection, truncation
/// fallback, error classification, section parsing. Timeouts are owned here
/// so the retry loop can double and restore them.
#[derive(Debug)]
pub struct Transport {
    exchanger: Arc<dyn Exchanger>,
    udp_enabled: bool,
    tcp_enabled: bool,
    udp_timeout: Duration,
    tcp_timeout: Duration,
}

impl Transport {
    pub fn new(exchanger: Arc<dyn Exchanger>, config: &ResolverConfig) -> Self {
        Transport {
            exchanger,
            udp_enabled: !config.tcp_only,
            tcp_enabled: !config.udp_only,
            udp_timeout: config.timeout,
            tcp_timeout: config.timeout,
        }
    }

    pub fn udp_timeout(&self) -> Duration {
        self.udp_timeout
    }

    pub fn tcp_timeout(&self) -> Duration {
        self.tcp_timeout
    }

    pub fn set_udp_timeout(&mut self, timeout: Duration) {
        self.udp_timeout = timeout;
    }

    pub fn set_tcp_timeout(&mut self, timeout: Duration) {
        self.tcp_timeout = timeout;
    }

    /// A single question/answer exchange: UDP first (when enabled), TCP on
    /// truncation, statuses per the reply's response code.
    pub async fn lookup(&self, question: &Question, name_server: &str, recursive: bool) -> Lookup {
        let server: SocketAddr = match name_server.parse() {
            Ok(server) => server,
            Err(_) => {
                return Lookup::failed(
                    Status::Error,
                    Some(format!("invalid name server address {name_server:?}")),
                );
            }
        };
        let request = match build_request(question, recursive) {
            Ok(request) => request,
            Err(error) => return Lookup::failed(Status::Error, Some(error)),
        };

        let mut protocol = if self.udp_enabled {
            Protocol::Udp
        } else {
            Protocol::Tcp
        };
        loop {
            let timeout = match protocol {
                Protocol::Udp => self.udp_timeout,
                Protocol::Tcp => self.tcp_timeout,
            };
            let reply = match self
                .exchanger
                .exchange(&request, server, protocol, timeout)
                .await
            {
                Ok(reply) => reply,
                Err(ExchangeError::Timeout) => return Lookup::failed(Status::Timeout, None),
                Err(error @ ExchangeError::Temporary(_)) => {
                    return Lookup::failed(Status::Temporary, Some(error.to_string()));
                }
                Err(error) => return Lookup::failed(Status::Error, Some(error.to_string())),
            };

            let truncated = reply.header().truncated()
                || reply.response_code() == ResponseCode::BADTRUNC;
            if protocol == Protocol::Udp && truncated {
                if self.tcp_enabled {
                    debug!(name = %question.name, "truncated reply, retrying over tcp");
                    protocol = Protocol::Tcp;
                    continue;
                }
                return Lookup::failed(Status::Truncated, None);
            }

            let mut raw = RawResult {
                protocol: protocol.as_str().to_string(),
                resolver: name_server.to_string(),
                ..RawResult::default()
            };
            let status = translate_rcode(reply.response_code());
            if status != Status::NoError {
                return Lookup::new(raw, status, None);
            }

            raw.flags = flags_from_message(&reply);
            raw.answers = reply.answers().iter().filter_map(parse_record).collect();
            raw.additional = reply.additionals().iter().filter_map(parse_record).collect();
            raw.authorities = reply.name_servers().iter().filter_map(parse_record).collect();
            return Lookup::new(raw, Status::NoError, None);
        }
    }
}
