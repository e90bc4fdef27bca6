use crate::app::{
    height_source::HeightSource,
    price_source::PriceSource,
};
use std::time::Duration;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{
        self,
        Instant,
    },
};

/// Everything background tasks report back to the session loop.
#[derive(Clone, Debug, PartialEq)]
pub enum Sample {
    Height(Result<u64, String>),
    Price(Result<f64, String>),
    GraceElapsed { epoch: u64 },
}

enum PollCommand {
    Shutdown,
}

/// Owns a background task. Dropping the handle aborts it.
pub struct PollHandle {
    cmd_tx: Option<mpsc::UnboundedSender<PollCommand>>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn shutdown(&self) {
        if let Some(cmd_tx) = &self.cmd_tx {
            let _ = cmd_tx.send(PollCommand::Shutdown);
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn spawn_height_poller<H: HeightSource>(
    source: H,
    period: Duration,
    samples: mpsc::UnboundedSender<Sample>,
) -> PollHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(height_worker(source, period, cmd_rx, samples));
    PollHandle {
        cmd_tx: Some(cmd_tx),
        task,
    }
}

pub fn spawn_price_poller<P: PriceSource>(
    source: P,
    period: Duration,
    samples: mpsc::UnboundedSender<Sample>,
) -> PollHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(price_worker(source, period, cmd_rx, samples));
    PollHandle {
        cmd_tx: Some(cmd_tx),
        task,
    }
}

/// Reports `GraceElapsed { epoch }` once `opens_at` is reached.
pub fn spawn_grace_timer(
    epoch: u64,
    opens_at: Instant,
    samples: mpsc::UnboundedSender<Sample>,
) -> PollHandle {
    let task = tokio::spawn(async move {
        time::sleep_until(opens_at).await;
        let _ = samples.send(Sample::GraceElapsed { epoch });
    });
    PollHandle { cmd_tx: None, task }
}

async fn height_worker<H: HeightSource>(
    mut source: H,
    period: Duration,
    mut cmd_rx: mpsc::UnboundedReceiver<PollCommand>,
    samples: mpsc::UnboundedSender<Sample>,
) {
    let mut ticker = time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sample = source
                    .current_height()
                    .await
                    .map_err(|err| format!("{err:#}"));
                if samples.send(Sample::Height(sample)).is_err() {
                    break;
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(PollCommand::Shutdown) | None => break,
                }
            }
        }
    }
    tracing::debug!("height poller stopped");
}

async fn price_worker<P: PriceSource>(
    mut source: P,
    period: Duration,
    mut cmd_rx: mpsc::UnboundedReceiver<PollCommand>,
    samples: mpsc::UnboundedSender<Sample>,
) {
    let mut ticker = time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sample = source
                    .usd_price()
                    .await
                    .map_err(|err| format!("{err:#}"));
                if samples.send(Sample::Price(sample)).is_err() {
                    break;
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(PollCommand::Shutdown) | None => break,
                }
            }
        }
    }
    tracing::debug!("price poller stopped");
}
