use log::{
    error,
    info,
    warn,
};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::{
    core::{
        service::Service,
        stream::MessageStream,
    },
    message::common::abort_message_for_error,
    router::{
        router::Router,
        session::Session,
    },
};

/// Per-connection data supplied by the embedding transport layer.
#[derive(Debug, Default, Clone)]
pub struct ConnectionInfo {
    /// An opaque cookie the transport assigned during its own handshake, if
    /// any. Made available to authenticators.
    pub cookie: Option<String>,
}

/// A single accepted connection: a [`Service`] pumping messages over the
/// stream, and a [`Session`] handling them.
///
/// The connection owns both for its whole lifetime. When the session reaches
/// its terminal state, or the stream closes underneath it, the connection
/// cleans the session up and exits.
pub struct Connection {
    uuid: Uuid,
}

impl Connection {
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
        }
    }

    /// The unique connection ID, assigned at construction.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Starts the connection asynchronously.
    ///
    /// The connection runs until the session disconnects or the stream
    /// closes; it requires no further interaction from the caller.
    pub fn start(self, router: Router, stream: Box<dyn MessageStream>, info: ConnectionInfo) {
        tokio::spawn(self.run(router, stream, info));
    }

    async fn run(self, router: Router, stream: Box<dyn MessageStream>, info: ConnectionInfo) {
        let service = Service::new(self.uuid.to_string(), stream);
        let mut message_rx = service.message_rx();
        let mut end_rx = service.end_rx();
        let handle = service.start();

        let session_id = match router.id_allocator().generate_id().await {
            Ok(id) => id,
            Err(err) => {
                error!("Failed to allocate a session ID for connection {}: {err}", self.uuid);
                handle.cancel().ok();
                handle.join().await.ok();
                return;
            }
        };
        let session = Session::new(
            session_id,
            handle.message_tx(),
            info.cookie,
            router.config().call_timeout,
        );
        info!("Connection {} opened session {session_id}", self.uuid);
        router.run_connect_hooks(session_id).await;

        loop {
            tokio::select! {
                message = message_rx.recv() => {
                    match message {
                        Ok(message) => {
                            if let Err(err) = session.handle_message(&router, message).await {
                                warn!("Session {session_id} failed: {err}");
                                // The session is unusable; tell the peer why
                                // before tearing the connection down.
                                handle.message_tx().send(abort_message_for_error(&err)).ok();
                                break;
                            }
                            if session.disconnected().await {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Session {session_id} lagged behind by {skipped} messages");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
                _ = end_rx.recv() => break,
            }
        }

        session.clean_up(&router).await;
        router.run_disconnect_hooks(session_id).await;
        handle.cancel().ok();
        handle.join().await.ok();
        info!("Connection {} closed session {session_id}", self.uuid);
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}
