use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use tungstenite::Message;


#[derive(Debug)]
pub enum CommunicationError {
    Socket(tungstenite::Error),
    Serde(serde_json::Error),
    RelayProtocol(String),
    ConnectionClosed,
}

impl From<tungstenite::Error> for CommunicationError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                CommunicationError::ConnectionClosed
            }
            err => CommunicationError::Socket(err),
        }
    }
}

// Returns the next text frame verbatim. Parsing is left to the server state, so that a
// malformed message can be answered instead of dropping the connection.
pub async fn read_text_async<S>(stream: &mut S) -> Result<String, CommunicationError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let msg = stream.next().await.ok_or(CommunicationError::ConnectionClosed)??;
        match msg {
            Message::Text(text) => return Ok(text.as_str().to_owned()),
            Message::Close(_) => return Err(CommunicationError::ConnectionClosed),
            // Pings are answered by tungstenite.
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            Message::Binary(_) => {
                return Err(CommunicationError::RelayProtocol(
                    "Expected text, got binary".to_owned(),
                ));
            }
        }
    }
}

pub async fn write_obj_async<S, T>(sink: &mut S, obj: &T) -> Result<(), CommunicationError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
    T: Serialize,
{
    let serialized = serde_json::to_string(obj).map_err(CommunicationError::Serde)?;
    sink.send(Message::text(serialized)).await?;
    Ok(())
}
