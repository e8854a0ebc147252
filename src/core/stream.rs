use std::{
    pin::Pin,
    task,
};

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    Sink,
    SinkExt,
    Stream,
    StreamExt,
};
use tokio::sync::mpsc::{
    unbounded_channel,
    UnboundedReceiver,
    UnboundedSender,
};

use crate::{
    message::message::Message,
    serializer::serializer::Serializer,
    transport::transport::{
        Transport,
        TransportData,
    },
};

/// A single frame flowing through a [`MessageStream`].
pub enum StreamMessage {
    Ping(Vec<u8>),
    Message(Message),
}

/// A bidirectional stream of WAMP messages, decoupled from how the peer is
/// actually connected.
///
/// Implementations exist for real transports (bytes plus a serializer) and for
/// in-process channel pairs.
pub trait MessageStream:
    Send + Stream<Item = Result<StreamMessage>> + Sink<StreamMessage, Error = Error> + Unpin
{
    /// A short name for the stream flavor, for logging.
    fn stream_name(&self) -> &'static str;
}

/// A [`MessageStream`] over a [`Transport`], using a [`Serializer`] to encode
/// and decode messages.
pub struct TransportMessageStream {
    transport: Box<dyn Transport>,
    serializer: Box<dyn Serializer>,
}

impl TransportMessageStream {
    pub fn new(transport: Box<dyn Transport>, serializer: Box<dyn Serializer>) -> Self {
        Self {
            transport,
            serializer,
        }
    }
}

impl Stream for TransportMessageStream {
    type Item = Result<StreamMessage>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        match futures_util::ready!(self.transport.poll_next_unpin(cx)) {
            Some(Ok(TransportData::Ping(data))) => {
                task::Poll::Ready(Some(Ok(StreamMessage::Ping(data))))
            }
            Some(Ok(TransportData::Message(data))) => {
                let message = self.serializer.deserialize(&data)?;
                task::Poll::Ready(Some(Ok(StreamMessage::Message(message))))
            }
            Some(Err(err)) => task::Poll::Ready(Some(Err(err))),
            None => task::Poll::Ready(None),
        }
    }
}

impl Sink<StreamMessage> for TransportMessageStream {
    type Error = Error;

    fn poll_ready(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        self.transport.poll_ready_unpin(cx)
    }

    fn start_send(
        mut self: Pin<&mut Self>,
        item: StreamMessage,
    ) -> std::result::Result<(), Self::Error> {
        let data = match item {
            StreamMessage::Ping(data) => TransportData::Ping(data),
            StreamMessage::Message(message) => {
                TransportData::Message(self.serializer.serialize(&message)?)
            }
        };
        self.transport.start_send_unpin(data)
    }

    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        self.transport.poll_flush_unpin(cx)
    }

    fn poll_close(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        self.transport.poll_close_unpin(cx)
    }
}

impl MessageStream for TransportMessageStream {
    fn stream_name(&self) -> &'static str {
        "transport"
    }
}

/// An in-process [`MessageStream`] over a pair of unbounded channels.
///
/// Used for embedding the router next to a peer in the same process, and for
/// driving the router in tests without sockets.
pub struct DirectMessageStream {
    tx: UnboundedSender<Message>,
    rx: UnboundedReceiver<Message>,
}

/// Creates a connected pair of [`DirectMessageStream`]s.
pub fn direct_stream_pair() -> (DirectMessageStream, DirectMessageStream) {
    let (a_tx, a_rx) = unbounded_channel();
    let (b_tx, b_rx) = unbounded_channel();
    (
        DirectMessageStream { tx: a_tx, rx: b_rx },
        DirectMessageStream { tx: b_tx, rx: a_rx },
    )
}

impl DirectMessageStream {
    /// Sends a message to the other side of the pair.
    pub fn send_message(&self, message: Message) -> Result<()> {
        self.tx.send(message).map_err(Error::new)
    }

    /// Receives the next message from the other side of the pair.
    pub async fn receive_message(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

impl Stream for DirectMessageStream {
    type Item = Result<StreamMessage>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<Self::Item>> {
        match futures_util::ready!(self.rx.poll_recv(cx)) {
            Some(message) => task::Poll::Ready(Some(Ok(StreamMessage::Message(message)))),
            None => task::Poll::Ready(None),
        }
    }
}

impl Sink<StreamMessage> for DirectMessageStream {
    type Error = Error;

    fn poll_ready(
        self: Pin<&mut Self>,
        _: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }

    fn start_send(
        self: Pin<&mut Self>,
        item: StreamMessage,
    ) -> std::result::Result<(), Self::Error> {
        match item {
            // Pings carry no meaning inside a single process.
            StreamMessage::Ping(_) => Ok(()),
            StreamMessage::Message(message) => self.tx.send(message).map_err(Error::new),
        }
    }

    fn poll_flush(
        self: Pin<&mut Self>,
        _: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }

    fn poll_close(
        self: Pin<&mut Self>,
        _: &mut task::Context<'_>,
    ) -> task::Poll<std::result::Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }
}

impl MessageStream for DirectMessageStream {
    fn stream_name(&self) -> &'static str {
        "direct"
    }
}
