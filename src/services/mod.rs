pub mod checkin;
pub mod cipher;
pub mod clock;
pub mod credentials;
pub mod numbers;
pub mod orders;
pub mod pdf;
pub mod qr;
pub mod reservations;
pub mod sweep;

pub use checkin::CheckInService;
pub use cipher::{CipherScheme, CredentialCipher};
pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{CredentialError, CredentialPolicy, CredentialService, CredentialSubject};
pub use orders::{
    DeliveryError, Fulfilment, LogDelivery, OrderError, OrderService, TicketDelivery, TicketDocument,
};
pub use qr::{ErrorCorrection, QrRenderOptions};
pub use reservations::{ReservationError, ReservationManager, ReservationPolicy, SweepReport};
pub use sweep::ExpirySweeper;
