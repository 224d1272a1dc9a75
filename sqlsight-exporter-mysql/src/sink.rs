//! Sample sink: the multi-producer channel scrapers write metrics to.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use sqlsight_common::{Desc, Metric};
use tokio::sync::mpsc;
use tracing::trace;

/// Create a connected sink and stream.
pub fn channel() -> (SampleSink, SampleStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SampleSink { tx }, SampleStream { rx })
}

/// Writing half of the sample channel.
///
/// Cheap to clone; every concurrent scrape unit holds its own clone. Writes
/// never block and a single metric is always delivered whole.
#[derive(Debug, Clone)]
pub struct SampleSink {
    tx: mpsc::UnboundedSender<Metric>,
}

impl SampleSink {
    /// Send a metric. Returns `false` if the consumer has gone away.
    pub fn send(&self, metric: Metric) -> bool {
        match self.tx.send(metric) {
            Ok(()) => true,
            Err(e) => {
                trace!(metric = %e.0.name(), "Sample stream closed, dropping metric");
                false
            }
        }
    }

    /// Build a metric from a descriptor and send it.
    pub fn emit<I, S>(&self, desc: &Arc<Desc>, value: f64, label_values: I) -> sqlsight_common::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send(Metric::new(desc.clone(), value, label_values)?);
        Ok(())
    }

    /// Build an unlabeled metric and send it.
    pub fn emit_unlabeled(&self, desc: &Arc<Desc>, value: f64) -> sqlsight_common::Result<()> {
        self.send(Metric::unlabeled(desc.clone(), value)?);
        Ok(())
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Reading half of the sample channel.
#[derive(Debug)]
pub struct SampleStream {
    rx: mpsc::UnboundedReceiver<Metric>,
}

impl SampleStream {
    /// Wait for the next metric. `None` once every sink is dropped and the
    /// buffer is empty.
    pub async fn recv(&mut self) -> Option<Metric> {
        self.rx.recv().await
    }

    /// Take every metric currently buffered without waiting.
    pub fn drain(&mut self) -> Vec<Metric> {
        let mut metrics = Vec::new();
        while let Ok(metric) = self.rx.try_recv() {
            metrics.push(metric);
        }
        metrics
    }
}

impl Stream for SampleStream {
    type Item = Metric;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
