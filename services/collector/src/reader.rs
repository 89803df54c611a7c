//! Byte pump from a source into the parser.

use crate::sink::SinkFactory;
use logtree_core::StreamSink;
use logtree_parser::JsonParser;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Fixed read chunk size.
pub const CHUNK_SIZE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("source I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Read the source to EOF in fixed-size chunks, feeding the parser and
/// ticking the factory once per chunk.
///
/// Returns `Ok(())` on clean EOF. On a hard source error the current
/// stream still receives its implicit unclean finish before the error
/// is surfaced.
pub async fn run_reader<R, S>(
    mut input: R,
    parser: &mut JsonParser<S>,
    factory: &dyn SinkFactory,
) -> Result<(), ReaderError>
where
    R: AsyncRead + Unpin,
    S: StreamSink,
{
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        match input.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                parser.feed(&chunk[..n]).await;
                factory.update().await;
            }
            Err(error) => {
                parser.finish().await;
                factory.update().await;
                return Err(ReaderError::Io(error));
            }
        }
    }
    parser.finish().await;
    factory.update().await;
    let stats = parser.stats();
    debug!(
        records = stats.records,
        dropped = stats.dropped,
        skipped = stats.skipped,
        "stream finished"
    );
    Ok(())
}
