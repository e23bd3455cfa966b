use futures::SinkExt; // provides combinator methods like send/close on top of FramedWrite
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_stream::StreamExt; // provides next on top of FramedRead
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info};

use relay_protocol::{Handshake, RelayCodec, Request, ServerEvent};

use crate::error::ClientError;

type FrRead = FramedRead<OwnedReadHalf, RelayCodec>;
type FrWrite = FramedWrite<OwnedWriteHalf, RelayCodec>;

/// Connect to a relay and identify as `name`.
///
/// The server may assign a different name if `name` is taken; it reports the
/// assigned one as a notice on the incoming side.
pub async fn connect<A: ToSocketAddrs>(addr: A, name: &str) -> Result<(Outgoing, Incoming), ClientError> {
    let handshake = Handshake::new(name)?;

    let stream = TcpStream::connect(addr).await.map_err(ClientError::Connect)?;
    let _ = stream.set_nodelay(true);
    let (client_read, client_write) = stream.into_split();

    let mut fw = FramedWrite::new(client_write, RelayCodec::new());
    fw.send(handshake).await?;
    info!("Connected to relay as {}", name);

    Ok((Outgoing { fw }, Incoming { fr: FramedRead::new(client_read, RelayCodec::client()) }))
}

/// Sending half of a relay session.
#[derive(Debug)]
pub struct Outgoing {
    fw: FrWrite,
}

impl Outgoing {
    /// Send `text` as a line. The server classifies it like any other
    /// input, so plain text is broadcast while `TYPING`, `/pm ...` or
    /// `/users` keep their meaning. Lines over [`MAX_LINE_LEN`] are refused
    /// with [`ProtocolError::LineTooLong`] and nothing is sent.
    ///
    /// [`MAX_LINE_LEN`]: relay_protocol::MAX_LINE_LEN
    /// [`ProtocolError::LineTooLong`]: relay_protocol::ProtocolError::LineTooLong
    pub async fn send_line(&mut self, text: &str) -> Result<(), ClientError> {
        self.send(Request::Chat(text.to_owned())).await
    }

    /// Signal that the user is composing a message.
    pub async fn typing(&mut self) -> Result<(), ClientError> {
        self.send(Request::Typing).await
    }

    pub async fn private(&mut self, target: &str, text: &str) -> Result<(), ClientError> {
        self.send(Request::Private { target: target.to_owned(), text: text.to_owned() }).await
    }

    pub async fn users(&mut self) -> Result<(), ClientError> {
        self.send(Request::Users).await
    }

    /// Classify a line of raw user input (`/pm`, `/users`, plain text) and send it.
    pub async fn submit(&mut self, line: &str) -> Result<(), ClientError> {
        let request = Request::parse(line)?;
        self.send(request).await
    }

    pub async fn send(&mut self, request: Request) -> Result<(), ClientError> {
        debug!("client sending {:?}", &request);
        self.fw.send(request).await?;
        Ok(())
    }

    /// Flush and shut down the write side.
    pub async fn close(mut self) -> Result<(), ClientError> {
        SinkExt::<Request>::close(&mut self.fw).await?;
        Ok(())
    }
}

/// Receiving half of a relay session.
#[derive(Debug)]
pub struct Incoming {
    fr: FrRead,
}

impl Incoming {
    /// Next event from the server, `None` once the server has closed.
    pub async fn next_event(&mut self) -> Option<Result<ServerEvent, ClientError>> {
        let value = self.fr.next().await?;
        debug!("received server value is {:?}", value);

        Some(value.map(|line| ServerEvent::parse(&line)).map_err(ClientError::from))
    }
}
