use anyhow::Result;
use async_trait::async_trait;
use hickory_proto::op::Message;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use crate::transport::{ExchangeError, Exchanger, Protocol};

/// Scripted replies for a question at a server, plus failure injection.
pub enum FakeReply {
    Reply(Message),
    Timeout,
    Temporary,
}

struct FakeEntry {
    reply: FakeReply,
    delay: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExchangeKey {
    pub server: SocketAddr,
    pub name: String,
    pub qtype: u16,
    pub protocol: Protocol,
}

/// In-memory exchanger for tests: replies are keyed by
/// `(server, name, type, protocol)` and every exchange is logged so tests
/// can count wire traffic.
pub struct FakeExchanger {
    answers: Mutex<HashMap<ExchangeKey, FakeEntry>>,
    log: Mutex<Vec<ExchangeKey>>,
}

impl Debug for FakeExchanger {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeExchanger")
            .field("answer_count", &self.answers.lock().unwrap().len())
            .finish()
    }
}

impl FakeExchanger {
    pub fn new() -> Self {
        FakeExchanger {
            answers: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    fn key(server: &str, name: &str, qtype: u16, protocol: Protocol) -> Result<ExchangeKey> {
        Ok(ExchangeKey {
            server: server.parse()?,
            name: fqdn(name),
            qtype,
            protocol,
        })
    }

    pub fn add(&self, server: &str, name: &str, qtype: u16, message: Message) -> Result<()> {
        self.add_entry(server, name, qtype, Protocol::Udp, FakeReply::Reply(message), None)
    }

    pub fn add_tcp(&self, server: &str, name: &str, qtype: u16, message: Message) -> Result<()> {
        self.add_entry(server, name, qtype, Protocol::Tcp, FakeReply::Reply(message), None)
    }

    pub fn add_delayed(
        &self,
        server: &str,
        name: &str,
        qtype: u16,
        message: Message,
        delay: Duration,
    ) -> Result<()> {
        self.add_entry(
            server,
            name,
            qtype,
            Protocol::Udp,
            FakeReply::Reply(message),
            Some(delay),
        )
    }

    pub fn add_timeout(&self, server: &str, name: &str, qtype: u16) -> Result<()> {
        self.add_entry(server, name, qtype, Protocol::Udp, FakeReply::Timeout, None)
    }

    pub fn add_temporary(&self, server: &str, name: &str, qtype: u16) -> Result<()> {
        self.add_entry(server, name, qtype, Protocol::Udp, FakeReply::Temporary, None)
    }

    fn add_entry(
        &self,
        server: &str,
        name: &str,
        qtype: u16,
        protocol: Protocol,
        reply: FakeReply,
        delay: Option<Duration>,
    ) -> Result<()> {
        let key = Self::key(server, name, qtype, protocol)?;
        self.answers
            .lock()
            .unwrap()
            .insert(key, FakeEntry { reply, delay });
        Ok(())
    }

    /// Every exchange seen so far, in order.
    pub fn exchanges(&self) -> Vec<ExchangeKey> {
        self.log.lock().unwrap().clone()
    }

    pub fn exchange_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn contacted(&self, server: &str) -> bool {
        let server: SocketAddr = server.parse().unwrap();
        self.log.lock().unwrap().iter().any(|key| key.server == server)
    }
}

fn fqdn(name: &str) -> String {
    let trimmed = name.trim_end_matches('.');
    format!("{trimmed}.")
}

#[async_trait]
impl Exchanger for FakeExchanger {
    async fn exchange(
        &self,
        request: &Message,
        server: SocketAddr,
        protocol: Protocol,
        timeout: Duration,
    ) -> Result<Message, ExchangeError> {
        let query = request.query().expect("request must carry a question");
        let key = ExchangeKey {
            server,
            name: fqdn(&query.name().to_string()),
            qtype: u16::from(query.query_type()),
            protocol,
        };
        self.log.lock().unwrap().push(key.clone());

        let (reply, delay) = {
            let answers = self.answers.lock().unwrap();
            match answers.get(&key) {
                Some(entry) => {
                    let reply = match &entry.reply {
                        FakeReply::Reply(message) => {
                            let mut message = message.clone();
                            message.set_id(request.id());
                            FakeReply::Reply(message)
                        }
                        FakeReply::Timeout => FakeReply::Timeout,
                        FakeReply::Temporary => FakeReply::Temporary,
                    };
                    (reply, entry.delay)
                }
                None => {
                    return Err(ExchangeError::Io(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no scripted reply for {key:?}"),
                    )));
                }
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
            if delay >= timeout {
                return Err(ExchangeError::Timeout);
            }
        }
        match reply {
            FakeReply::Reply(message) => Ok(message),
            FakeReply::Timeout => Err(ExchangeError::Timeout),
            FakeReply::Temporary => Err(ExchangeError::Temporary(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "scripted temporary failure",
            ))),
        }
    }
}
