use super::types::IpListSnapshot;
use crate::error::Result;

#[allow(async_fn_in_trait)]
pub trait IpListSource {
    async fn fetch_ip_list(&self) -> Result<IpListSnapshot>;
}
