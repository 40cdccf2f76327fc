pub mod credential;
pub mod inventory;
pub mod order;
pub mod reservation;
pub mod ticket;

pub use credential::{CredentialRecord, CredentialVerdict, RejectionReason, ScanOutcome};
pub use inventory::{InventoryView, NewTicketType, TicketTypeInventory};
pub use order::{BuyerInfo, HolderInfo, Order, OrderStatus, Purchase};
pub use reservation::{
    FailedReservation, Reservation, ReservationBatch, ReservationFailure, ReservationRequest,
    ReservationStatus,
};
pub use ticket::{Ticket, TicketStatus};
