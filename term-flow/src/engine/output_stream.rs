//! Output data streams: rows a component publishes to a nested job.
//!
//! Each consumed stream is a bounded channel. The publishing component writes
//! through an [`OutputRowCollector`]; the nested pipeline reads the other end
//! as an ordinary [`RowSource`]. A full channel makes the publisher wait, so
//! at most the configured buffer of rows is in flight per stream. The
//! collector is closed when its component is closed, which ends the nested
//! pipeline's input.

use async_trait::async_trait;
use futures::stream;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::{FlowError, Result};
use crate::job::Value;
use crate::sources::{RowQuery, RowSource, RowStream};

/// Write side of one consumed output data stream.
#[derive(Debug)]
pub struct OutputRowCollector {
    stream: String,
    sender: RwLock<Option<mpsc::Sender<(Vec<Value>, u64)>>>,
    published: AtomicU64,
}

impl OutputRowCollector {
    /// Creates a collector and the row source that reads what it publishes.
    pub(crate) fn channel(
        stream: &str,
        columns: Vec<String>,
        job: &str,
        buffer_rows: usize,
    ) -> (Arc<Self>, StreamRowSource) {
        let (tx, rx) = mpsc::channel(buffer_rows.max(1));
        let collector = Arc::new(Self {
            stream: stream.to_string(),
            sender: RwLock::new(Some(tx)),
            published: AtomicU64::new(0),
        });
        let source = StreamRowSource {
            name: job.to_string(),
            columns,
            receiver: Mutex::new(Some(rx)),
        };
        (collector, source)
    }

    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    /// Publishes one row, values in the order of the stream's columns.
    pub fn push(&self, values: Vec<Value>) -> Result<()> {
        self.push_weighted(values, 1)
    }

    /// Publishes a row standing for `weight` identical rows.
    ///
    /// Blocks while the stream's buffer is full, so it must be called from a
    /// row task, never from async code; the engine runs the row tasks of every
    /// pipeline that publishes to a stream on blocking threads. Fails once the
    /// publishing component has been closed. Rows published after the nested
    /// pipeline stopped reading are dropped.
    pub fn push_weighted(&self, values: Vec<Value>, weight: u64) -> Result<()> {
        let sender = self.sender.read().clone().ok_or_else(|| {
            FlowError::invalid_state(format!("Output data stream '{}' is closed", self.stream))
        })?;
        let sent = match sender.try_send((values, weight)) {
            Ok(()) => true,
            Err(TrySendError::Full(row)) => sender.blocking_send(row).is_ok(),
            Err(TrySendError::Closed(_)) => false,
        };
        if sent {
            self.published.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Number of rows handed to the nested pipeline so far.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    pub(crate) fn close(&self) {
        self.sender.write().take();
    }
}

/// Read side of an output data stream. Can be opened once.
pub(crate) struct StreamRowSource {
    name: String,
    columns: Vec<String>,
    receiver: Mutex<Option<mpsc::Receiver<(Vec<Value>, u64)>>>,
}

#[async_trait]
impl RowSource for StreamRowSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    async fn expected_rows(&self, _query: &RowQuery) -> Result<Option<u64>> {
        Ok(None)
    }

    async fn open(&self, query: &RowQuery) -> Result<RowStream> {
        let receiver = self.receiver.lock().take().ok_or_else(|| {
            FlowError::invalid_state(format!("Output data stream of '{}' was already opened", self.name))
        })?;
        let rows = stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|row| (Ok(row), rx))
        });
        Ok(query.apply_weighted(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_rows_flow_until_closed() {
        let (collector, source) =
            OutputRowCollector::channel("complete", vec!["a".to_string()], "child", 8);
        let mut rows = source.open(&RowQuery::all()).await.unwrap();

        collector.push(vec![Value::from("x")]).unwrap();
        collector.push_weighted(vec![Value::from("y")], 3).unwrap();
        collector.close();
        assert!(collector.push(vec![Value::from("z")]).is_err());

        let first = rows.next().await.unwrap().unwrap();
        assert_eq!((first.id, first.values, first.weight), (1, vec![Value::from("x")], 1));
        let second = rows.next().await.unwrap().unwrap();
        assert_eq!((second.id, second.weight), (2, 3));
        assert!(rows.next().await.is_none());
        assert_eq!(collector.published(), 2);
    }

    #[tokio::test]
    async fn test_stream_opens_once() {
        let (_collector, source) = OutputRowCollector::channel("s", Vec::new(), "child", 1);
        assert!(source.open(&RowQuery::all()).await.is_ok());
        assert!(source.open(&RowQuery::all()).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_buffer_holds_back_the_publisher() {
        let (collector, source) = OutputRowCollector::channel("s", vec!["a".to_string()], "child", 2);
        let publisher = Arc::clone(&collector);
        let pushing = tokio::task::spawn_blocking(move || {
            for i in 0..10 {
                publisher.push(vec![Value::from(i as i64)]).unwrap();
            }
            publisher.close();
        });

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(collector.published(), 2);

        let rows: Vec<_> = source.open(&RowQuery::all()).await.unwrap().collect().await;
        pushing.await.unwrap();
        assert_eq!(rows.len(), 10);
        assert_eq!(collector.published(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_publisher_is_released_when_the_reader_goes_away() {
        let (collector, source) = OutputRowCollector::channel("s", Vec::new(), "child", 1);
        let publisher = Arc::clone(&collector);
        let pushing = tokio::task::spawn_blocking(move || {
            for _ in 0..5 {
                publisher.push(Vec::new()).unwrap();
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(source);
        pushing.await.unwrap();
        assert_eq!(collector.published(), 1);
    }
}
