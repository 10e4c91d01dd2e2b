//! Answers "may actor X act on report R / calendar C" before anything else
//! runs. Callers must resolve authorization before any data-dependent branch,
//! so an unauthorized actor cannot tell "forbidden" from "not found".

use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ReportError, Result};
use crate::models::ReviewerRole;
use crate::repository::{CalendarAccess, CalendarRole};

pub struct AuthorizationResolver {
    access: Arc<dyn CalendarAccess>,
}

impl AuthorizationResolver {
    pub fn new(access: Arc<dyn CalendarAccess>) -> Self {
        Self { access }
    }

    /// Role under which `account_id` may review reports on `calendar_id`,
    /// or `Forbidden`.
    pub async fn require_calendar_reviewer(
        &self,
        account_id: Uuid,
        calendar_id: Uuid,
    ) -> Result<ReviewerRole> {
        match self.access.review_role(account_id, calendar_id).await? {
            Some(CalendarRole::Owner) => Ok(ReviewerRole::Owner),
            Some(CalendarRole::Editor) => Ok(ReviewerRole::Editor),
            None => Err(ReportError::Forbidden),
        }
    }

    /// Admin gate for escalated-report actions, admin submissions, analytics
    /// and federation forwarding.
    pub async fn require_admin(&self, account_id: Uuid) -> Result<()> {
        if self.access.is_admin(account_id).await? {
            Ok(())
        } else {
            Err(ReportError::Forbidden)
        }
    }

    pub async fn is_admin(&self, account_id: Uuid) -> Result<bool> {
        self.access.is_admin(account_id).await
    }
}
