use studyhub_auth::Principal;
use studyhub_core::UserId;

/// Authenticated caller for a request.
///
/// Inserted by the auth middleware; every protected route can rely on it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(user_id: UserId) -> Self {
        Self {
            principal: Principal::new(user_id),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}
