use super::types::{Account, DeviceProfile};
use crate::error::Result;

#[allow(async_fn_in_trait)]
pub trait ZeroTrustApi {
    async fn list_accounts(&self) -> Result<Vec<Account>>;
    async fn list_profiles(&self, account_id: &str) -> Result<Vec<DeviceProfile>>;
    /// `policy_id: None` addresses the account-level default profile, which
    /// lives on a different endpoint than named policies.
    async fn get_profile(&self, account_id: &str, policy_id: Option<&str>)
        -> Result<DeviceProfile>;
    async fn update_profile_exclude(
        &self,
        account_id: &str,
        policy_id: Option<&str>,
        ips: &[String],
    ) -> Result<()>;
}
