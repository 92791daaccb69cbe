//! pkt-line framing
//!
//! Every message is a 4-digit hex length (counting itself) followed by the
//! payload; `0000` is a flush marking the end of a section. Every read and
//! write is bounded by a timeout and gives up as soon as the cancellation
//! token fires. A stream may also carry a deadline for the whole exchange,
//! so a peer trickling data cannot hold it open forever.

use crate::error::RepoError;
use bytes::Bytes;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const FLUSH: &[u8; 4] = b"0000";

/// Largest payload a single pkt-line can carry
pub const MAX_PAYLOAD: usize = 65516;

const LENGTH_SIZE: usize = 4;

pub struct PktStream<R, W> {
    reader: R,
    writer: W,
    timeout: Duration,
    cancel: CancellationToken,
    /// End of the whole exchange and the budget it was set from
    deadline: Option<(Instant, Duration)>,
}

/// Run one I/O step under the timeout and the cancellation token
pub async fn guarded<T>(
    operation: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    step: impl Future<Output = std::io::Result<T>>,
) -> anyhow::Result<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(RepoError::Cancelled.into()),
        result = tokio::time::timeout(timeout, step) => match result {
            Err(_) => Err(RepoError::timeout(operation, timeout).into()),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(RepoError::Protocol(format!("connection closed during {operation}")).into())
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                Err(RepoError::Protocol(format!("connection closed during {operation}")).into())
            }
            Ok(result) => Ok(result?),
        },
    }
}

impl<R, W> PktStream<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, timeout: Duration, cancel: CancellationToken) -> Self {
        PktStream {
            reader,
            writer,
            timeout,
            cancel,
            deadline: None,
        }
    }

    /// Fail every step once `budget` has passed from now
    pub fn with_deadline(mut self, budget: Duration) -> Self {
        self.deadline = Some((Instant::now() + budget, budget));
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time allowed for the next step: the step timeout, cut short by the deadline
    fn budget(&self, operation: &str) -> anyhow::Result<Duration> {
        let Some((deadline, total)) = self.deadline else {
            return Ok(self.timeout);
        };
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(RepoError::timeout(format!("{operation}, whole exchange"), total).into());
        }
        Ok(left.min(self.timeout))
    }

    /// Next payload, `None` for a flush
    pub async fn read(&mut self) -> anyhow::Result<Option<Bytes>> {
        let mut length = [0u8; LENGTH_SIZE];
        let budget = self.budget("reading from remote")?;
        guarded("reading from remote", budget, &self.cancel, self.reader.read_exact(&mut length)).await?;

        let length = std::str::from_utf8(&length)
            .ok()
            .and_then(|hex| usize::from_str_radix(hex, 16).ok())
            .ok_or_else(|| RepoError::Protocol(format!("bad pkt-line length {length:?}")))?;

        match length {
            0 => Ok(None),
            1..LENGTH_SIZE => Err(RepoError::Protocol(format!("bad pkt-line length {length}")).into()),
            _ => {
                let mut payload = vec![0u8; length - LENGTH_SIZE];
                let budget = self.budget("reading from remote")?;
                guarded("reading from remote", budget, &self.cancel, self.reader.read_exact(&mut payload)).await?;
                Ok(Some(Bytes::from(payload)))
            }
        }
    }

    /// Next payload as a line without its trailing newline; `None` for a flush
    pub async fn read_line(&mut self) -> anyhow::Result<Option<String>> {
        match self.read().await? {
            Some(payload) => {
                let line = String::from_utf8(payload.to_vec())
                    .map_err(|_| RepoError::Protocol("pkt-line is not UTF-8".to_string()))?;
                Ok(Some(line.trim_end_matches('\n').to_string()))
            }
            None => Ok(None),
        }
    }

    /// Lines up to the next flush
    pub async fn read_section(&mut self) -> anyhow::Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.read_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    pub async fn write(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        if payload.len() > MAX_PAYLOAD {
            anyhow::bail!("pkt-line payload of {} bytes is too large", payload.len());
        }
        let mut frame = format!("{:04x}", payload.len() + LENGTH_SIZE).into_bytes();
        frame.extend_from_slice(payload);
        let budget = self.budget("writing to remote")?;
        guarded("writing to remote", budget, &self.cancel, self.writer.write_all(&frame)).await
    }

    pub async fn write_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.write(format!("{line}\n").as_bytes()).await
    }

    pub async fn flush(&mut self) -> anyhow::Result<()> {
        let budget = self.budget("writing to remote")?;
        guarded("writing to remote", budget, &self.cancel, self.writer.write_all(FLUSH)).await?;
        let budget = self.budget("writing to remote")?;
        guarded("writing to remote", budget, &self.cancel, self.writer.flush()).await
    }

    /// Push buffered bytes to the peer without ending the section
    pub async fn sync(&mut self) -> anyhow::Result<()> {
        let budget = self.budget("writing to remote")?;
        guarded("writing to remote", budget, &self.cancel, self.writer.flush()).await
    }

    /// Send a blob as a run of pkt-lines closed by a flush
    pub async fn write_data(&mut self, data: &[u8]) -> anyhow::Result<()> {
        for chunk in data.chunks(MAX_PAYLOAD) {
            self.write(chunk).await?;
        }
        self.flush().await
    }

    /// Collect pkt-lines up to the next flush into one blob
    pub async fn read_data(&mut self) -> anyhow::Result<Bytes> {
        let mut data = Vec::new();
        while let Some(chunk) = self.read().await? {
            data.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(data))
    }

    /// Close our sending side so the peer sees end of stream
    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        let budget = self.budget("closing connection")?;
        guarded("closing connection", budget, &self.cancel, self.writer.shutdown()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pair() -> (
        PktStream<tokio::io::ReadHalf<tokio::io::DuplexStream>, tokio::io::WriteHalf<tokio::io::DuplexStream>>,
        PktStream<tokio::io::ReadHalf<tokio::io::DuplexStream>, tokio::io::WriteHalf<tokio::io::DuplexStream>>,
    ) {
        let (a, b) = tokio::io::duplex(1 << 20);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        let timeout = Duration::from_millis(200);
        (
            PktStream::new(a_read, a_write, timeout, CancellationToken::new()),
            PktStream::new(b_read, b_write, timeout, CancellationToken::new()),
        )
    }

    #[tokio::test]
    async fn lines_and_flush_arrive_in_order() {
        let (mut client, mut server) = pair();

        client.write_line("want abc").await.unwrap();
        client.write_line("done").await.unwrap();
        client.flush().await.unwrap();

        assert_eq!(server.read_section().await.unwrap(), vec!["want abc", "done"]);
    }

    #[tokio::test]
    async fn large_data_is_chunked_and_reassembled() {
        let (mut client, mut server) = pair();
        let data = vec![7u8; MAX_PAYLOAD * 2 + 10];

        client.write_data(&data).await.unwrap();

        assert_eq!(server.read_data().await.unwrap().to_vec(), data);
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (_client, mut server) = pair();

        let err = server.read().await.unwrap_err();
        assert!(matches!(RepoError::find(&err), Some(RepoError::Timeout { .. })));
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_read() {
        let (a, _b) = tokio::io::duplex(64);
        let (read, write) = tokio::io::split(a);
        let cancel = CancellationToken::new();
        let mut stream = PktStream::new(read, write, Duration::from_secs(30), cancel.clone());

        cancel.cancel();
        let err = stream.read().await.unwrap_err();
        assert!(matches!(RepoError::find(&err), Some(RepoError::Cancelled)));
    }

    #[tokio::test]
    async fn trickling_peer_hits_the_exchange_deadline() {
        let (a, b) = tokio::io::duplex(1 << 16);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        let mut sender = PktStream::new(a_read, a_write, Duration::from_secs(5), CancellationToken::new());
        let mut receiver = PktStream::new(b_read, b_write, Duration::from_millis(200), CancellationToken::new())
            .with_deadline(Duration::from_millis(300));

        tokio::spawn(async move {
            for n in 0..20 {
                tokio::time::sleep(Duration::from_millis(60)).await;
                if sender.write_line(&format!("line {n}")).await.is_err() || sender.sync().await.is_err() {
                    return;
                }
            }
            let _ = sender.flush().await;
        });

        let err = receiver.read_section().await.unwrap_err();
        assert!(matches!(RepoError::find(&err), Some(RepoError::Timeout { .. })));
    }

    #[tokio::test]
    async fn garbage_length_is_a_protocol_error() {
        let (a, b) = tokio::io::duplex(64);
        let (_, mut raw_write) = tokio::io::split(a);
        let (read, write) = tokio::io::split(b);
        let mut stream = PktStream::new(read, write, Duration::from_millis(200), CancellationToken::new());

        raw_write.write_all(b"zzzz").await.unwrap();
        let err = stream.read().await.unwrap_err();
        assert!(matches!(RepoError::find(&err), Some(RepoError::Protocol(_))));
    }
}
