//! Streaming response body for conversion archives.

use axum::body::Body;
use bytes::BytesMut;
use futures::stream;
use onnx_forge::config::ArchiveConfig;
use onnx_forge::ConversionArchive;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

struct ArchiveStream {
    // Dropping this removes the job directory.
    archive: ConversionArchive,
    file: File,
    sent: u64,
}

/// Stream `archive` in fixed-size chunks.
///
/// The body owns the archive: the job directory is deleted when the last
/// chunk has been read, or earlier if the client goes away and the body is
/// dropped mid-stream.
pub fn archive_body(archive: ConversionArchive, file: File) -> Body {
    let state = ArchiveStream {
        archive,
        file,
        sent: 0,
    };

    let chunks = stream::try_unfold(state, |mut state| async move {
        let mut buf = BytesMut::with_capacity(ArchiveConfig::STREAM_CHUNK_SIZE);
        let read = state.file.read_buf(&mut buf).await?;
        if read == 0 {
            info!(
                job_id = state.archive.job_id(),
                bytes = state.sent,
                "archive streamed"
            );
            return Ok::<_, std::io::Error>(None);
        }
        state.sent += read as u64;
        debug!(job_id = state.archive.job_id(), sent = state.sent, "archive chunk");
        Ok(Some((buf.freeze(), state)))
    });

    Body::from_stream(chunks)
}
