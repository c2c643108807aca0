//! Rendezvous coordinator
//!
//! Stands in for a native collective-communication layer. The coordinator:
//! - Accepts exactly `size` joins and assigns ranks
//! - Bridges each connection onto a member of an in-process [`LocalGroup`]
//! - Fans barrier releases, gathered values and aborts back out
//!
//! An unexpected disconnect before `LEAVE` aborts the whole group, so no
//! participant is left waiting on a barrier that can never complete.

use super::collective::{Collective, LocalGroup, LocalMember};
use super::protocol::*;
use crate::error::HarnessError;
use crate::logging::Logger;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// How long a fresh connection may take to send its JOIN
const JOIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Connections whose first message has been read but not yet checked
const PENDING_JOIN_QUEUE: usize = 64;

/// Rendezvous coordinator for groups of a fixed size
pub struct RendezvousCoordinator {
    listener: TcpListener,
    size: usize,
    log: Arc<Logger>,
}

/// A fresh connection and the outcome of reading its first message
struct PendingJoin {
    stream: TcpStream,
    addr: SocketAddr,
    first: Result<Message>,
}

/// A participant that completed its join
struct Joined {
    stream: TcpStream,
    node_id: String,
    requested_rank: Option<u32>,
}

/// How one participant's session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Sent LEAVE
    Left,
    /// The group was aborted while this participant was connected
    Aborted { rank: usize, reason: String },
    /// Connection dropped or misbehaved; the group was aborted on its behalf
    Lost(String),
}

/// Outcome of one group run
#[derive(Debug, Clone)]
pub struct GroupSummary {
    /// `(rank, node_id, how the session ended)` for every participant, by rank
    pub participants: Vec<(usize, String, SessionEnd)>,
}

impl GroupSummary {
    /// True when every participant left cleanly
    pub fn completed(&self) -> bool {
        self.participants.iter().all(|(_, _, end)| *end == SessionEnd::Left)
    }
}

impl RendezvousCoordinator {
    /// Bind the listening socket
    pub async fn bind(addr: &str, size: usize, log: Arc<Logger>) -> Result<Self> {
        if size == 0 {
            anyhow::bail!("Group size must be at least 1");
        }
        if size > u32::MAX as usize {
            anyhow::bail!("Group size {} is too large", size);
        }
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind rendezvous listener on {}", addr))?;
        Ok(Self { listener, size, log })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("Failed to read listener address")
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run groups back to back; with `keep_alive` false, run exactly one
    pub async fn serve(&self, keep_alive: bool) -> Result<()> {
        loop {
            let summary = self.run_group().await?;
            if summary.completed() {
                self.log.info(format!("group of {} completed", self.size));
            } else {
                self.log.warn(format!("group of {} ended abnormally", self.size));
                for (rank, node_id, end) in &summary.participants {
                    if *end != SessionEnd::Left {
                        self.log.warn(format!("  rank {} ({}): {:?}", rank, node_id, end));
                    }
                }
            }
            if !keep_alive {
                return Ok(());
            }
        }
    }

    /// Gather one full group, bridge it until every session ends
    pub async fn run_group(&self) -> Result<GroupSummary> {
        self.log.info(format!(
            "waiting for {} participants on {}",
            self.size,
            self.local_addr()?
        ));

        let joined = self.accept_joins().await?;
        let ranked = assign_ranks(
            joined.into_iter().map(|j| (j.requested_rank, j)).collect(),
            self.size,
        );
        let members = LocalGroup::new(self.size);

        let mut handles = Vec::with_capacity(self.size);
        for ((rank, mut participant), member) in ranked.into_iter().zip(members) {
            let welcome = Message::Welcome(WelcomeMessage {
                rank: rank as u32,
                size: self.size as u32,
            });
            let log = self.log.clone();
            handles.push(tokio::spawn(async move {
                let node_id = participant.node_id.clone();
                if let Err(e) = write_message(&mut participant.stream, &welcome).await {
                    let mut member = member;
                    let reason = format!("rank {} ({}) unreachable: {:#}", rank, node_id, e);
                    member.abort(&reason).await;
                    return (rank, node_id, SessionEnd::Lost(reason));
                }
                log.debug(format!("rank {} assigned to {}", rank, node_id));
                let end = bridge(participant.stream, member, &log).await;
                (rank, node_id, end)
            }));
        }

        let mut participants = Vec::with_capacity(self.size);
        for handle in handles {
            participants.push(handle.await.context("Participant bridge task failed")?);
        }
        participants.sort_by_key(|(rank, _, _)| *rank);
        Ok(GroupSummary { participants })
    }

    /// Accept connections until `size` valid joins are held
    ///
    /// Each connection's JOIN is read in its own task, so a connection that
    /// never speaks only times out itself. Joins are checked in arrival order.
    async fn accept_joins(&self) -> Result<Vec<Joined>> {
        let mut joined: Vec<Joined> = Vec::with_capacity(self.size);
        let (tx, mut rx) = mpsc::channel::<PendingJoin>(PENDING_JOIN_QUEUE);

        while joined.len() < self.size {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted.context("Failed to accept connection")?;
                    stream.set_nodelay(true).ok();
                    tokio::spawn(read_join(stream, addr, tx.clone()));
                }
                Some(pending) = rx.recv() => {
                    if let Some(join) = self.admit(pending, &joined).await {
                        joined.push(join);
                    }
                }
            }
        }
        Ok(joined)
    }

    /// Check one pending connection; rejected ones are answered and dropped
    async fn admit(&self, pending: PendingJoin, joined: &[Joined]) -> Option<Joined> {
        let PendingJoin { mut stream, addr, first } = pending;
        let join = match first {
            Ok(Message::Join(join)) => join,
            Ok(other) => {
                self.log.warn(format!("{} sent {:?} instead of JOIN", addr, other));
                return None;
            }
            Err(e) => {
                self.log.warn(format!("{} failed to join: {:#}", addr, e));
                return None;
            }
        };

        if let Err(reason) = check_join(&join, joined, self.size) {
            self.log.warn(format!("rejecting {} ({}): {}", join.node_id, addr, reason));
            let reply = Message::Error(ErrorMessage {
                node_id: join.node_id.clone(),
                error: reason,
            });
            let _ = write_message(&mut stream, &reply).await;
            return None;
        }

        self.log.info(format!(
            "{} joined from {} ({}/{})",
            join.node_id,
            addr,
            joined.len() + 1,
            self.size
        ));
        Some(Joined {
            stream,
            node_id: join.node_id,
            requested_rank: join.requested_rank,
        })
    }
}

/// Read a connection's first message and hand it to the accept loop
async fn read_join(mut stream: TcpStream, addr: SocketAddr, tx: mpsc::Sender<PendingJoin>) {
    let first = match tokio::time::timeout(JOIN_TIMEOUT, read_message(&mut stream)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("no JOIN within {:?}", JOIN_TIMEOUT)),
    };
    // The receiver is gone once the group is full; the connection just closes
    let _ = tx.send(PendingJoin { stream, addr, first }).await;
}

/// Validate a join against the ones already held
fn check_join(join: &JoinMessage, joined: &[Joined], size: usize) -> std::result::Result<(), String> {
    if join.protocol_version != PROTOCOL_VERSION {
        return Err(format!(
            "protocol version mismatch: coordinator={}, participant={}",
            PROTOCOL_VERSION, join.protocol_version
        ));
    }
    if let Some(rank) = join.requested_rank {
        if rank as usize >= size {
            return Err(format!("requested rank {} is outside group of {}", rank, size));
        }
        if joined.iter().any(|j| j.requested_rank == Some(rank)) {
            return Err(format!("rank {} is already taken", rank));
        }
    }
    Ok(())
}

/// Requested ranks are honored; the rest take the lowest free ranks in join order
fn assign_ranks<T>(joined: Vec<(Option<u32>, T)>, size: usize) -> Vec<(usize, T)> {
    let mut taken = vec![false; size];
    for (requested, _) in &joined {
        if let Some(rank) = requested {
            taken[*rank as usize] = true;
        }
    }

    let mut free = (0..size).filter(|rank| !taken[*rank]);
    let mut ranked: Vec<(usize, T)> = joined
        .into_iter()
        .map(|(requested, item)| {
            let rank = match requested {
                Some(rank) => rank as usize,
                None => free.next().unwrap_or(0),
            };
            (rank, item)
        })
        .collect();
    ranked.sort_by_key(|(rank, _)| *rank);
    ranked
}

/// Relay one participant's collectives onto its group member
async fn bridge(stream: TcpStream, mut member: LocalMember, log: &Logger) -> SessionEnd {
    let rank = member.rank();
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let msg = match read_message_or_eof(&mut reader).await {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                let reason = format!("rank {} disconnected before leaving", rank);
                member.abort(&reason).await;
                return SessionEnd::Lost(reason);
            }
            Err(e) => {
                let reason = format!("rank {} connection failed: {:#}", rank, e);
                member.abort(&reason).await;
                return SessionEnd::Lost(reason);
            }
        };

        let reply = match msg {
            Message::Arrive => member.barrier().await.map(|_| Message::Release),
            Message::Contribute(contribution) => member
                .all_gather(contribution.value)
                .await
                .map(|values| Message::Gathered(GatheredMessage { values })),
            Message::Abort(abort) => {
                log.warn(format!("rank {} aborted the group: {}", rank, abort.reason));
                member.abort(&abort.reason).await;
                return SessionEnd::Aborted {
                    rank,
                    reason: abort.reason,
                };
            }
            Message::Leave => {
                log.debug(format!("rank {} left", rank));
                return SessionEnd::Left;
            }
            other => {
                let reason = format!("rank {} sent unexpected {:?}", rank, other);
                member.abort(&reason).await;
                let _ = write_message(
                    &mut writer,
                    &Message::Abort(AbortMessage {
                        rank: rank as u32,
                        reason: reason.clone(),
                    }),
                )
                .await;
                return SessionEnd::Lost(reason);
            }
        };

        match reply {
            Ok(reply) => {
                if let Err(e) = write_message(&mut writer, &reply).await {
                    let reason = format!("rank {} unreachable: {:#}", rank, e);
                    member.abort(&reason).await;
                    return SessionEnd::Lost(reason);
                }
            }
            Err(err) => {
                let (origin, reason) = match err {
                    HarnessError::Aborted { rank, reason } => (rank, reason),
                    other => (rank, other.to_string()),
                };
                let _ = write_message(
                    &mut writer,
                    &Message::Abort(AbortMessage {
                        rank: origin as u32,
                        reason: reason.clone(),
                    }),
                )
                .await;
                return SessionEnd::Aborted { rank: origin, reason };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join(version: u32, rank: Option<u32>) -> JoinMessage {
        JoinMessage {
            protocol_version: version,
            requested_rank: rank,
            node_id: "test".into(),
        }
    }

    #[test]
    fn test_check_join_version_and_range() {
        assert!(check_join(&join(PROTOCOL_VERSION, None), &[], 2).is_ok());
        assert!(check_join(&join(PROTOCOL_VERSION, Some(1)), &[], 2).is_ok());

        let err = check_join(&join(PROTOCOL_VERSION + 1, None), &[], 2).unwrap_err();
        assert!(err.contains("protocol version mismatch"));

        let err = check_join(&join(PROTOCOL_VERSION, Some(2)), &[], 2).unwrap_err();
        assert!(err.contains("outside group"));
    }

    #[tokio::test]
    async fn test_bind_rejects_empty_group() {
        let log = Arc::new(Logger::disabled());
        assert!(RendezvousCoordinator::bind("127.0.0.1:0", 0, log).await.is_err());
    }

    #[test]
    fn test_assign_ranks() {
        // "a" and "c" float, "b" wants rank 0, "d" wants rank 2
        let joined = vec![(None, "a"), (Some(0), "b"), (None, "c"), (Some(2), "d")];
        let ranked = assign_ranks(joined, 4);
        assert_eq!(ranked, vec![(0, "b"), (1, "a"), (2, "d"), (3, "c")]);
    }

    #[tokio::test]
    async fn test_silent_connection_does_not_stall_joins() {
        let coordinator = RendezvousCoordinator::bind("127.0.0.1:0", 2, Arc::new(Logger::disabled()))
            .await
            .unwrap();
        let addr = coordinator.local_addr().unwrap();
        let group = tokio::spawn(async move { coordinator.run_group().await });

        // Connects first and never sends anything
        let _silent = TcpStream::connect(addr).await.unwrap();

        let mut members = Vec::new();
        for _ in 0..2 {
            members.push(tokio::spawn(async move {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                write_message(&mut stream, &Message::Join(join(PROTOCOL_VERSION, None)))
                    .await
                    .unwrap();
                match read_message(&mut stream).await.unwrap() {
                    Message::Welcome(welcome) => assert_eq!(welcome.size, 2),
                    other => panic!("expected WELCOME, got {:?}", other),
                }
                write_message(&mut stream, &Message::Leave).await.unwrap();
            }));
        }

        let joined = tokio::time::timeout(Duration::from_secs(5), async {
            for member in members {
                member.await.unwrap();
            }
        })
        .await;
        assert!(joined.is_ok(), "participants waited behind a silent connection");
        assert!(group.await.unwrap().unwrap().completed());
    }

    #[test]
    fn test_check_join_rank_conflict() {
        // Conflicts are checked against held joins; a TCP pair stands in for a participant
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (client, _server) = tokio::join!(TcpStream::connect(addr), listener.accept());
            let held = vec![Joined {
                stream: client.unwrap(),
                node_id: "held".into(),
                requested_rank: Some(1),
            }];
            let err = check_join(&join(PROTOCOL_VERSION, Some(1)), &held, 3).unwrap_err();
            assert!(err.contains("already taken"));
            assert!(check_join(&join(PROTOCOL_VERSION, Some(0)), &held, 3).is_ok());
        });
    }
}
