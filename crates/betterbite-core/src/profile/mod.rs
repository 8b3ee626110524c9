pub mod supabase;

pub use supabase::SupabaseClient;

use anyhow::Result;
use async_trait::async_trait;

use crate::session::Session;
use crate::state::Profile;

/// Remote store holding each user's tier and quota
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch_profile(&self, session: &Session) -> Result<Profile>;

    /// Write `scans_remaining = new` only if the stored value is still
    /// `expected`. Returns `false` when another writer got there first.
    async fn update_scans_remaining(&self, session: &Session, expected: i32, new: i32) -> Result<bool>;
}
