//! Domain models for the server.

pub mod invoice;
pub mod session;
pub mod user;

pub use invoice::{InvoiceRecord, InvoiceRecordWithUser};
pub use session::{CurrentUser, session_keys};
pub use user::User;
