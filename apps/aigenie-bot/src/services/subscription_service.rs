use crate::catalog::Plan;
use aigenie_db::models::Subscription;
use aigenie_db::repositories::{PlanActivation, SubscriptionRepository};
use aigenie_db::PgPool;
use anyhow::Result;
use tracing::info;

#[derive(Clone)]
pub struct SubscriptionService {
    repo: SubscriptionRepository,
}

impl SubscriptionService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: SubscriptionRepository::new(pool),
        }
    }

    /// Activates a paid plan keyed by the external payment id. Safe to call
    /// again with the same id: the repeat resolves to `Duplicate` and the
    /// plan is not renewed a second time.
    pub async fn activate_paid(
        &self,
        payment_id: &str,
        account_id: i64,
        plan: &Plan,
    ) -> Result<PlanActivation> {
        let outcome = self
            .repo
            .create_or_renew(
                payment_id,
                account_id,
                plan.category,
                plan.code,
                plan.quota.to_raw(),
                plan.duration_days,
                plan.price_stars as i32,
            )
            .await?;

        match &outcome {
            PlanActivation::Activated(sub) => {
                info!(account_id, plan = plan.code, end_date = %sub.end_date, "plan activated");
            }
            PlanActivation::Duplicate => {
                info!(account_id, plan = plan.code, payment_id, "duplicate plan payment ignored");
            }
        }
        Ok(outcome)
    }

    pub async fn list_active(&self, account_id: i64) -> Result<Vec<Subscription>> {
        self.repo.list_active(account_id).await
    }
}
