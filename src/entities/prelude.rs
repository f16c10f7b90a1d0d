#![allow(unused_imports)]

pub use super::auth_nonce::Entity as AuthNonce;
pub use super::donation_pool::Entity as DonationPool;
pub use super::faucet_config::Entity as FaucetConfig;
pub use super::faucet_request::Entity as FaucetRequest;
pub use super::user::Entity as User;
