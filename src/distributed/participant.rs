//! Remote participant
//!
//! [`RemoteMember`] implements [`Collective`] over a TCP connection to a
//! [`RendezvousCoordinator`](super::coordinator::RendezvousCoordinator). Each
//! collective is one request/response exchange; an `ABORT` arriving in place
//! of the expected response fails the collective with
//! [`HarnessError::Aborted`].

use super::collective::Collective;
use super::protocol::*;
use crate::error::HarnessError;
use crate::logging::Logger;
use tokio::net::TcpStream;

/// Participant connected to a rendezvous coordinator
pub struct RemoteMember {
    stream: TcpStream,
    rank: usize,
    size: usize,
}

fn wire_error(what: &str, e: anyhow::Error) -> HarnessError {
    HarnessError::Rendezvous(format!("{}: {:#}", what, e))
}

/// Identifier sent in JOIN: hostname plus pid
pub fn local_node_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}:{}", host, std::process::id())
}

impl RemoteMember {
    /// Connect, join and wait for the group to fill
    ///
    /// Returns once the coordinator has assigned a rank, which only happens
    /// after every participant has joined.
    pub async fn connect(addr: &str, requested_rank: Option<u32>, log: &Logger) -> Result<Self, HarnessError> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| HarnessError::Rendezvous(format!("failed to connect to coordinator {}: {}", addr, e)))?;
        stream.set_nodelay(true).ok();

        let node_id = local_node_id();
        let join = Message::Join(JoinMessage {
            protocol_version: PROTOCOL_VERSION,
            requested_rank,
            node_id: node_id.clone(),
        });
        write_message(&mut stream, &join)
            .await
            .map_err(|e| wire_error("failed to send JOIN", e))?;
        log.debug(format!("{} joined {}, waiting for the group", node_id, addr));

        match read_message(&mut stream).await.map_err(|e| wire_error("failed to read WELCOME", e))? {
            Message::Welcome(welcome) => {
                log.info(format!("joined as rank {} of {}", welcome.rank, welcome.size));
                Ok(Self {
                    stream,
                    rank: welcome.rank as usize,
                    size: welcome.size as usize,
                })
            }
            Message::Error(err) => Err(HarnessError::Rendezvous(format!("join rejected: {}", err.error))),
            Message::Abort(abort) => Err(HarnessError::Aborted {
                rank: abort.rank as usize,
                reason: abort.reason,
            }),
            other => Err(HarnessError::Rendezvous(format!("expected WELCOME, got {:?}", other))),
        }
    }

    /// Tell the coordinator this participant is done
    pub async fn leave(mut self) -> Result<(), HarnessError> {
        write_message(&mut self.stream, &Message::Leave)
            .await
            .map_err(|e| wire_error("failed to send LEAVE", e))
    }

    async fn exchange(&mut self, request: Message) -> Result<Message, HarnessError> {
        write_message(&mut self.stream, &request)
            .await
            .map_err(|e| wire_error("failed to send request", e))?;
        match read_message(&mut self.stream)
            .await
            .map_err(|e| wire_error("failed to read response", e))?
        {
            Message::Abort(abort) => Err(HarnessError::Aborted {
                rank: abort.rank as usize,
                reason: abort.reason,
            }),
            reply => Ok(reply),
        }
    }
}

impl Collective for RemoteMember {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    async fn barrier(&mut self) -> Result<(), HarnessError> {
        match self.exchange(Message::Arrive).await? {
            Message::Release => Ok(()),
            other => Err(HarnessError::Rendezvous(format!("expected RELEASE, got {:?}", other))),
        }
    }

    async fn all_gather(&mut self, value: i64) -> Result<Vec<i64>, HarnessError> {
        match self.exchange(Message::Contribute(ContributeMessage { value })).await? {
            Message::Gathered(gathered) if gathered.values.len() == self.size => Ok(gathered.values),
            Message::Gathered(gathered) => Err(HarnessError::Rendezvous(format!(
                "gathered {} values for a group of {}",
                gathered.values.len(),
                self.size
            ))),
            other => Err(HarnessError::Rendezvous(format!("expected GATHERED, got {:?}", other))),
        }
    }

    async fn abort(&mut self, reason: &str) {
        let msg = Message::Abort(AbortMessage {
            rank: self.rank as u32,
            reason: reason.to_string(),
        });
        // Best effort: the coordinator also aborts on disconnect
        let _ = write_message(&mut self.stream, &msg).await;
    }
}
