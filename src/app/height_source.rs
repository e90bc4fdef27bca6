pub trait HeightSource: Send + 'static {
    fn current_height(&mut self) -> impl Future<Output = anyhow::Result<u64>> + Send;
}
