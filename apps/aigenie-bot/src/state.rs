use crate::services::entitlement_service::EntitlementService;
use crate::services::gen_client::GenClient;
use crate::services::pay_service::PayService;
use crate::services::referral_service::ReferralService;
use crate::services::subscription_service::SubscriptionService;
use aigenie_db::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub entitlement_service: EntitlementService,
    pub pay_service: PayService,
    pub subscription_service: SubscriptionService,
    pub referral_service: ReferralService,
    pub gen_client: GenClient,
}
