pub mod confirmation;
pub mod expiry;
pub mod reservation;
