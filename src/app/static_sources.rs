use crate::app::{
    height_source::HeightSource,
    price_source::PriceSource,
};

/// Reports the same height forever; used when replaying recorded sessions.
#[derive(Clone, Copy, Debug)]
pub struct StaticHeight(pub u64);

impl HeightSource for StaticHeight {
    async fn current_height(&mut self) -> anyhow::Result<u64> {
        Ok(self.0)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StaticPrice(pub Option<f64>);

impl PriceSource for StaticPrice {
    async fn usd_price(&mut self) -> anyhow::Result<f64> {
        self.0.ok_or_else(|| anyhow::anyhow!("no price configured"))
    }
}
