pub mod entitlement_service;
pub mod gen_client;
pub mod pay_service;
pub mod referral_service;
pub mod subscription_service;
