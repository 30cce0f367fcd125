//! server.rs — TCP front end with a bounded worker pool
//!
//! One request = one packet = one response. The accept loop hands each
//! connection to its own task, capped at `max(parallelism − 1, 1)` permits so
//! the pool grows only while load keeps it busy. Per request, every parsed
//! message is posted onto the looper with a [`ResponseSink`]; the connection
//! task waits on the barrier until all sinks are released — by appending or
//! by being dropped — then writes everything back as one packet and closes.
//!
//! Socket failures are logged with the peer address and never take the
//! process down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, Semaphore};
use tracing::{error, info, warn};

use lander_proto::{read_packet, write_packet, Message, MessageId};

use crate::looper::Looper;
use crate::state::AppState;

// ── Response barrier ──────────────────────────────────────────────────────────

/// Per-request rendezvous: slot `i` collects the responses of message `i`,
/// so the reply packet preserves request order no matter how handlers
/// interleave.
pub struct ResponseBarrier {
    slots: Mutex<Vec<Vec<Message>>>,
    remaining: AtomicUsize,
    done: Notify,
}

impl ResponseBarrier {
    pub fn new(messages: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(vec![Vec::new(); messages]),
            remaining: AtomicUsize::new(messages),
            done: Notify::new(),
        })
    }

    /// Resolve once every sink is released, with the accumulated messages in
    /// slot order.
    pub async fn wait(&self) -> Vec<Message> {
        loop {
            let notified = self.done.notified();
            if self.remaining.load(Ordering::Acquire) == 0 {
                break;
            }
            notified.await;
        }
        self.take_messages()
    }

    pub fn take_messages(&self) -> Vec<Message> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.iter_mut().flat_map(std::mem::take).collect()
    }
}

/// Releasing a sink — after zero or more appends, or by dropping it on a
/// failure path — counts the request barrier down by one.
pub struct ResponseSink {
    barrier: Arc<ResponseBarrier>,
    slot: usize,
}

impl ResponseSink {
    pub fn new(barrier: Arc<ResponseBarrier>, slot: usize) -> Self {
        Self { barrier, slot }
    }

    pub fn append(&self, msg: Message) {
        let mut slots = self.barrier.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots[self.slot].push(msg);
    }
}

impl Drop for ResponseSink {
    fn drop(&mut self) {
        if self.barrier.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.barrier.done.notify_waiters();
        }
    }
}

// ── Handler map ───────────────────────────────────────────────────────────────

pub type Handler = Arc<dyn Fn(&mut AppState, Message, ResponseSink) + Send + Sync>;
pub type HandlerMap = HashMap<MessageId, Handler>;

pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut AppState, Message, ResponseSink) + Send + Sync + 'static,
{
    Arc::new(f)
}

// ── Server ────────────────────────────────────────────────────────────────────

fn worker_limit() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

/// Bind and start serving; returns the bound address (port 0 picks one).
pub async fn start(
    port: u16,
    looper: Arc<Looper<AppState>>,
    handlers: Arc<HandlerMap>,
) -> anyhow::Result<std::net::SocketAddr> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    let addr = listener.local_addr()?;
    let permits = Arc::new(Semaphore::new(worker_limit()));
    info!("Listening on port {}", addr.port());

    tokio::spawn(async move {
        loop {
            let (sock, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            };
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .expect("worker semaphore never closes");
            let looper = looper.clone();
            let handlers = handlers.clone();
            tokio::spawn(async move {
                handle_connection(sock, peer, looper, handlers).await;
                drop(permit);
            });
        }
    });

    Ok(addr)
}

async fn handle_connection(
    mut sock: TcpStream,
    peer: std::net::SocketAddr,
    looper: Arc<Looper<AppState>>,
    handlers: Arc<HandlerMap>,
) {
    info!("{peer} > Incoming connection");
    let bag = match read_packet(&mut sock).await {
        Ok(bag) => bag,
        Err(e) => {
            error!("{peer} : {e}");
            return;
        }
    };
    if bag.is_empty() {
        warn!("{peer} : Empty request.");
        return;
    }
    info!("{peer} > Received request ({} messages).", bag.len());

    let barrier = ResponseBarrier::new(bag.len());
    for (slot, msg) in bag.into_inner().into_iter().enumerate() {
        let sink = ResponseSink::new(barrier.clone(), slot);
        match handlers.get(&msg.id()).cloned() {
            Some(handler) => looper.post(move |state: &mut AppState| handler(state, msg, sink)),
            None => {
                // Dropping the sink still counts the barrier down.
                warn!("{peer} : no handler for message id {}, skipping.", msg.id());
            }
        }
    }

    let data = barrier.wait().await;
    if data.is_empty() {
        warn!("{peer} : Empty response.");
    }
    match write_packet(&mut sock, &data).await {
        Ok(()) => info!("{peer} < Written response ({} messages).", data.len()),
        Err(e) => error!("{peer} : {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{on_cases, on_outcomes};
    use crate::state::test_support::app_state;
    use lander_proto::{Cases, Outcomes};
    use std::time::{Duration, Instant};
    use tokio::io::AsyncWriteExt;

    fn test_handlers() -> Arc<HandlerMap> {
        let mut map = HandlerMap::new();
        map.insert(
            lander_proto::MSG_CASES,
            handler(|state, msg, sink| {
                if let Message::Cases(request) = msg {
                    on_cases(state, &request, &sink);
                }
            }),
        );
        map.insert(
            lander_proto::MSG_OUTCOMES,
            handler(|state, msg, sink| {
                if let Message::Outcomes(request) = msg {
                    on_outcomes(state, &request, Instant::now(), &sink);
                }
            }),
        );
        Arc::new(map)
    }

    #[tokio::test]
    async fn one_request_one_response_over_tcp() {
        let looper = Arc::new(Looper::new());
        let addr = start(0, looper.clone(), test_handlers()).await.unwrap();

        tokio::spawn(async move {
            let mut state = app_state(2, 3);
            looper.run(&mut state).await;
        });

        let mut sock = TcpStream::connect(("127.0.0.1", addr.port())).await.unwrap();
        let request = vec![
            Message::Cases(Cases::default()),
            Message::Outcomes(Outcomes {
                client_name: "itest".into(),
                generation: 0,
                capacity: 2,
                data: vec![],
            }),
        ];
        write_packet(&mut sock, &request).await.unwrap();
        sock.shutdown().await.unwrap();

        let bag = tokio::time::timeout(Duration::from_secs(5), read_packet(&mut sock))
            .await
            .expect("server answered in time")
            .unwrap();
        // Responses preserve request order: cases first, then population.
        assert_eq!(bag.len(), 2);
        let msgs = bag.into_inner();
        match (&msgs[0], &msgs[1]) {
            (Message::Cases(c), Message::Population(p)) => {
                assert_eq!(c.data.len(), 2);
                assert_eq!(p.data.len(), 2); // capacity-capped batch
            }
            other => panic!("unexpected response shape: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_sinks_release_the_barrier() {
        let barrier = ResponseBarrier::new(2);
        let s1 = ResponseSink::new(barrier.clone(), 0);
        let s2 = ResponseSink::new(barrier.clone(), 1);
        s2.append(Message::Cases(Cases::default()));
        drop(s1); // released without appending
        drop(s2);
        let data = tokio::time::timeout(Duration::from_secs(1), barrier.wait())
            .await
            .expect("barrier resolved");
        assert_eq!(data.len(), 1);
    }
}
