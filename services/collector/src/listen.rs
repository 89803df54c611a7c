//! Input front-ends: standard input and the TCP listener.
//!
//! Each accepted connection is one producer stream with its own parser
//! and sink; the sink factories are shared. There is no cross-stream
//! ordering, so connections are served by independent tasks.

use crate::reader::{ReaderError, run_reader};
use crate::sink::SinkFactory;
use logtree_parser::JsonParser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Consume one producer stream from standard input.
pub async fn run_stdin(factory: Arc<dyn SinkFactory>) -> Result<(), ReaderError> {
    let sink = factory.make_stream().await;
    let mut parser = JsonParser::new(sink);
    run_reader(tokio::io::stdin(), &mut parser, factory.as_ref()).await
}

/// Accept producer connections forever; one stream per connection.
pub async fn run_listener(
    addr: &str,
    factory: Arc<dyn SinkFactory>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening for producers");
    loop {
        let (socket, peer) = listener.accept().await?;
        info!(%peer, "producer connected");
        let factory = factory.clone();
        tokio::spawn(async move {
            let sink = factory.make_stream().await;
            let mut parser = JsonParser::new(sink);
            match run_reader(socket, &mut parser, factory.as_ref()).await {
                Ok(()) => info!(%peer, "producer stream closed"),
                Err(error) => error!(%peer, %error, "producer stream failed"),
            }
        });
    }
}
