/// Spot price of one ether in USD. Only ever displayed.
pub trait PriceSource: Send + 'static {
    fn usd_price(&mut self) -> impl Future<Output = anyhow::Result<f64>> + Send;
}
