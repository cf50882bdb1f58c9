//! Entity models for booking-service.

mod booking;
mod invoice;
mod mechanic;
mod payment;
mod work_order;

pub use booking::{Booking, BookingStatus, ListBookingsFilter};
pub use invoice::Invoice;
pub use mechanic::Mechanic;
pub use payment::{Payment, PaymentMethod, PaymentStatus};
pub use work_order::{WorkOrder, WorkOrderChanges, WorkOrderStatus};
