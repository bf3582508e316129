//! Principal directories: one for users, one for admins.

use anyhow::Result;
use async_trait::async_trait;
use std::{fmt, sync::Arc};

use super::model::{ClientRole, Principal};

#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Principal>>;
}

/// The two directories, selected by the role tag of the client.
#[derive(Clone)]
pub struct Directories {
    users: Arc<dyn PrincipalDirectory>,
    admins: Arc<dyn PrincipalDirectory>,
}

impl Directories {
    #[must_use]
    pub fn new(users: Arc<dyn PrincipalDirectory>, admins: Arc<dyn PrincipalDirectory>) -> Self {
        Self { users, admins }
    }

    #[must_use]
    pub fn for_role(&self, role: ClientRole) -> &dyn PrincipalDirectory {
        match role {
            ClientRole::Admin => self.admins.as_ref(),
            ClientRole::User => self.users.as_ref(),
        }
    }
}

impl fmt::Debug for Directories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Directories").finish_non_exhaustive()
    }
}
