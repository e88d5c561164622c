pub mod availability;
pub mod booking;
pub mod conflicts;
pub mod gateway;
pub mod messaging;
pub mod notifications;
pub mod payment_intent;
pub mod players;
pub mod pricing;
pub mod slots;
pub mod split_payment;
pub mod tasks;
pub mod webhook;
