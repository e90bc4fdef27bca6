use crate::app::height_source::HeightSource;
use ethers::providers::{
    Http,
    Middleware,
    Provider,
};
use std::sync::Arc;

/// Height source backed by any `ethers` middleware stack.
#[derive(Debug)]
pub struct ProviderHeights<M> {
    client: Arc<M>,
}

impl<M> ProviderHeights<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }
}

impl ProviderHeights<Provider<Http>> {
    pub fn connect(rpc_url: &str) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| anyhow::anyhow!("invalid rpc url {rpc_url:?}: {e}"))?;
        Ok(Self::new(Arc::new(provider)))
    }
}

impl<M: Middleware + 'static> HeightSource for ProviderHeights<M> {
    async fn current_height(&mut self) -> anyhow::Result<u64> {
        let height = self
            .client
            .get_block_number()
            .await
            .map_err(|e| anyhow::anyhow!("fetching block number: {e}"))?;
        Ok(height.as_u64())
    }
}
