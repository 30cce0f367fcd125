//! client.rs — one-shot request/response exchange with the trainer
//!
//! Connect, write the request packet, half-close the write side, read the
//! reply packet. An empty response is a protocol error distinct from the
//! transfer errors that send the runner back to its rebind phase.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use lander_proto::{read_packet, write_packet, Message, MessageBag, TransferError};

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("Empty response unacceptable.")]
    EmptyResponse,
}

/// One request = one packet = one response.
pub async fn request(addr: &str, msgs: &[Message]) -> Result<MessageBag, RequestError> {
    let mut sock = TcpStream::connect(addr)
        .await
        .map_err(TransferError::Io)?;
    let peer = sock.peer_addr().map_err(TransferError::Io)?;

    write_packet(&mut sock, msgs).await?;
    sock.shutdown().await.map_err(TransferError::Io)?;
    debug!("{peer} < Request sent ({} messages)", msgs.len());

    let response = read_packet(&mut sock).await?;
    if response.is_empty() {
        return Err(RequestError::EmptyResponse);
    }
    debug!("{peer} > Response received ({} messages)", response.len());
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lander_proto::Cases;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn empty_reply_is_a_protocol_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let _ = read_packet(&mut sock).await;
            write_packet(&mut sock, &[]).await.unwrap();
        });

        let err = request(&addr.to_string(), &[Message::Cases(Cases::default())])
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::EmptyResponse));
    }

    #[tokio::test]
    async fn echo_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let bag = read_packet(&mut sock).await.unwrap();
            write_packet(&mut sock, &bag.into_inner()).await.unwrap();
        });

        let sent = vec![Message::Cases(Cases::default())];
        let bag = request(&addr.to_string(), &sent).await.unwrap();
        assert_eq!(bag.into_inner(), sent);
    }

    #[tokio::test]
    async fn refused_connection_is_a_transfer_error() {
        // Bind-then-drop leaves a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = request(&addr.to_string(), &[Message::Cases(Cases::default())])
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Transfer(TransferError::Io(_))));
    }
}
