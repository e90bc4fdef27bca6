use crate::{
    Error,
    Result,
    app::{
        height_source::HeightSource,
        pollers::{
            PollHandle,
            Sample,
            spawn_grace_timer,
            spawn_height_poller,
            spawn_price_poller,
        },
        price_source::PriceSource,
        transaction_layer::TransactionLayer,
    },
    codec::CallSet,
    config::GameConfig,
    deadline::HeightTracker,
    lifecycle::{
        ClaimGate,
        LifecycleNotification,
        Session,
    },
    projection::{
        SessionView,
        project,
    },
};
use anyhow::Context;
use tokio::{
    sync::{
        mpsc,
        oneshot,
        watch,
    },
    time::Instant,
};

pub mod channel_transactions;
pub mod height_source;
pub mod pollers;
pub mod price_source;
pub mod static_sources;
pub mod transaction_layer;


pub enum Command {
    Purchase {
        quantity: u32,
        reply: oneshot::Sender<Result<()>>,
    },
    Claim {
        reply: oneshot::Sender<Result<()>>,
    },
    Reset {
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Shutdown,
    /// Every [`AppHandle`] was dropped.
    Detached,
}

/// Front door to a running [`App`].
#[derive(Clone)]
pub struct AppHandle {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<SessionView>,
}

impl AppHandle {
    pub fn view(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    pub async fn purchase(&self, quantity: u32) -> anyhow::Result<()> {
        self.request(|reply| Command::Purchase { quantity, reply })
            .await
    }

    pub async fn claim(&self) -> anyhow::Result<()> {
        self.request(|reply| Command::Claim { reply }).await
    }

    pub async fn reset(&self) -> anyhow::Result<()> {
        self.request(|reply| Command::Reset { reply }).await
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<()>>) -> Command,
    ) -> anyhow::Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| anyhow::anyhow!("session runtime stopped"))?;
        response.await.context("session runtime stopped")??;
        Ok(())
    }
}

/// Single-task runtime around a [`Session`]. Commands, transaction notifications and
/// background samples are handled one at a time by [`App::run`], which is the only
/// place the session is mutated.
pub struct App<Tx, Heights, Prices> {
    session: Session,
    config: GameConfig,
    transactions: Tx,
    heights: Option<Heights>,
    prices: Option<Prices>,
    commands: mpsc::UnboundedReceiver<Command>,
    sample_tx: mpsc::UnboundedSender<Sample>,
    samples: mpsc::UnboundedReceiver<Sample>,
    view: watch::Sender<SessionView>,
    height: HeightTracker,
    usd_price: Option<f64>,
    grace_timer: Option<PollHandle>,
}

impl<Tx, Heights, Prices> App<Tx, Heights, Prices>
where
    Tx: TransactionLayer,
    Heights: HeightSource,
    Prices: PriceSource,
{
    pub fn new(
        config: GameConfig,
        transactions: Tx,
        heights: Heights,
        prices: Prices,
    ) -> (Self, AppHandle) {
        let session = Session::new(config.codec(), config.claim_grace);
        let initial = project(&session, None, Instant::now(), config.claim_window());
        let (view_tx, view_rx) = watch::channel(initial);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (sample_tx, sample_rx) = mpsc::unbounded_channel();
        let app = Self {
            session,
            config,
            transactions,
            heights: Some(heights),
            prices: Some(prices),
            commands: cmd_rx,
            sample_tx,
            samples: sample_rx,
            view: view_tx,
            height: HeightTracker::new(),
            usd_price: None,
            grace_timer: None,
        };
        let handle = AppHandle {
            commands: cmd_tx,
            view: view_rx,
        };
        (app, handle)
    }

    pub async fn run(mut self) -> anyhow::Result<RunState> {
        let mut pollers = Vec::new();
        if let Some(heights) = self.heights.take() {
            pollers.push(spawn_height_poller(
                heights,
                self.config.height_poll,
                self.sample_tx.clone(),
            ));
        }
        if let Some(prices) = self.prices.take() {
            pollers.push(spawn_price_poller(
                prices,
                self.config.price_poll,
                self.sample_tx.clone(),
            ));
        }
        tracing::info!(contract = ?self.config.contract, "session runtime started");
        self.publish();

        let state = loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        break RunState::Detached;
                    };
                    match cmd {
                        Command::Purchase { quantity, reply } => {
                            let result = self.purchase(quantity).await;
                            let _ = reply.send(result);
                        }
                        Command::Claim { reply } => {
                            let result = self.claim().await;
                            let _ = reply.send(result);
                        }
                        Command::Reset { reply } => {
                            let result = self.reset();
                            let _ = reply.send(result);
                        }
                        Command::Shutdown => break RunState::Shutdown,
                    }
                }
                notification = self.transactions.next_notification(), if self.session.in_flight() => {
                    let notification = notification
                        .unwrap_or_else(|err| LifecycleNotification::Error(format!("{err:#}")));
                    let _ = self.apply(notification);
                }
                Some(sample) = self.samples.recv() => {
                    self.on_sample(sample);
                }
            }
            self.publish();
        };

        for poller in &pollers {
            poller.shutdown();
        }
        self.grace_timer = None;
        tracing::info!(?state, "session runtime stopped");
        Ok(state)
    }

    async fn purchase(&mut self, quantity: u32) -> Result<()> {
        let calls = self.session.submit_purchase(quantity)?;
        self.submit(calls).await
    }

    async fn claim(&mut self) -> Result<()> {
        let calls = self.session.submit_claim(Instant::now())?;
        if calls.is_empty() {
            return Ok(());
        }
        self.submit(calls).await
    }

    async fn submit(&mut self, calls: CallSet) -> Result<()> {
        match self.transactions.submit(calls).await {
            Ok(()) => Ok(()),
            Err(err) => self.apply(LifecycleNotification::Error(format!("{err:#}"))),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.session.reset_session()?;
        self.grace_timer = None;
        Ok(())
    }

    fn apply(&mut self, notification: LifecycleNotification) -> Result<()> {
        match self.session.on_notification(notification, Instant::now()) {
            Ok(Some(_)) => {
                match self.session.claim_gate() {
                    ClaimGate::Pending { opens_at } => {
                        self.grace_timer = Some(spawn_grace_timer(
                            self.session.epoch(),
                            opens_at,
                            self.sample_tx.clone(),
                        ));
                    }
                    ClaimGate::Closed | ClaimGate::Open => {}
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err @ Error::TransactionFailed(_)) => Err(err),
            Err(err) => {
                tracing::warn!(%err, "notification rejected");
                Err(err)
            }
        }
    }

    fn on_sample(&mut self, sample: Sample) {
        match sample {
            Sample::Height(sample) => {
                if let Ok(height) = self.height.observe(sample) {
                    tracing::debug!(height, "height sample");
                }
            }
            Sample::Price(Ok(price)) => {
                tracing::debug!(price, "price sample");
                self.usd_price = Some(price);
            }
            Sample::Price(Err(cause)) => {
                tracing::warn!(%cause, "price source failed");
            }
            Sample::GraceElapsed { epoch } => {
                self.session.open_claim_gate(epoch, Instant::now());
            }
        }
    }

    fn publish(&self) {
        let mut view = project(
            &self.session,
            self.height.last_known(),
            Instant::now(),
            self.config.claim_window(),
        );
        view.usd_price = self.usd_price;
        self.view.send_replace(view);
    }
}
