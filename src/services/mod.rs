pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod pricing;
pub mod recaptcha;
pub mod reconciliation;
pub mod stripe;
