//! Payload Ingest (spec.md §4.4): accumulates the `DATA` body in memory up to
//! a configured ceiling, then spills to an unlinked temp file, with the
//! synthesized trace header block (§4.5) prepended ahead of the first body
//! byte.

pub mod trace;

use store::spill::TempSpill;

use crate::session::PayloadSink;

/// Append `chunk` to `sink`, transitioning `InMemory` to `Spilled` the first
/// time the ceiling would be exceeded (spec.md §4.4 "Sink policy"). A short
/// write to the spill file is fatal to the session — propagated as `Err`
/// here, mapped to `451 4.3.0 Temporary internal failure` by the caller.
pub async fn append(
    sink: &mut Option<PayloadSink>,
    chunk: &[u8],
    max_inmemory: usize,
    temp_dir: &std::path::Path,
) -> std::io::Result<()> {
    let result = async {
        match sink.take() {
            None => {
                if chunk.len() > max_inmemory {
                    let mut spill = TempSpill::create(temp_dir).await?;
                    spill.write_all(chunk).await?;
                    spill.flush().await?;
                    let byte_count = spill.bytes_written();
                    *sink = Some(PayloadSink::Spilled { spill, byte_count });
                    trc::event!(trc::EventType::PayloadSpilled, "byte-count" => byte_count).log();
                } else {
                    *sink = Some(PayloadSink::InMemory(chunk.to_vec()));
                }
            }
            Some(PayloadSink::InMemory(mut buf)) => {
                if buf.len() + chunk.len() > max_inmemory {
                    let mut spill = TempSpill::create(temp_dir).await?;
                    spill.write_all(&buf).await?;
                    spill.write_all(chunk).await?;
                    spill.flush().await?;
                    let byte_count = spill.bytes_written();
                    *sink = Some(PayloadSink::Spilled { spill, byte_count });
                    trc::event!(trc::EventType::PayloadSpilled, "byte-count" => byte_count).log();
                } else {
                    buf.extend_from_slice(chunk);
                    *sink = Some(PayloadSink::InMemory(buf));
                }
            }
            Some(PayloadSink::Spilled { mut spill, .. }) => {
                spill.write_all(chunk).await?;
                spill.flush().await?;
                let byte_count = spill.bytes_written();
                *sink = Some(PayloadSink::Spilled { spill, byte_count });
            }
        }
        Ok(())
    }
    .await;

    if let Err(err) = &result {
        trc::event!(trc::EventType::PayloadSinkError, "reason" => err.to_string()).log();
    }
    result
}

/// Read the fully composed payload back out of the sink for delivery
/// (spec.md §4.6). For `InMemory` this is a cheap clone; for `Spilled` it
/// reads the unlinked file back through its fd, never a path.
pub async fn read_composed(sink: &mut PayloadSink) -> std::io::Result<Vec<u8>> {
    match sink {
        PayloadSink::InMemory(buf) => Ok(buf.clone()),
        PayloadSink::Spilled { spill, .. } => spill.read_all().await,
    }
}
