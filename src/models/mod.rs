pub mod availability;
pub mod booking;
pub mod club;
pub mod payment;

pub use availability::{AvailabilitySummary, BookingRef, OperatingHours, Slot};
pub use booking::{Booking, BookingGroup, BookingStatus, PaymentStatus};
pub use club::{
    Club, ClubSettings, Court, DiscountConditions, DiscountKind, DiscountRule, PaymentProvider,
    Player, PricingRule, ScheduleRule, Session,
};
pub use payment::{
    ClassBooking, Payment, PaymentMethod, PaymentOwner, SplitPayment, Transaction, TransactionKind,
};
