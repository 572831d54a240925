//! External service clients.
//!
//! Each client implements the matching engine service trait, so the
//! engines stay free of HTTP concerns. A client built without credentials
//! is disabled and reports itself as such instead of failing at startup.

pub mod resend;
pub mod stripe;
pub mod supabase;

pub use resend::ResendMailer;
pub use stripe::StripeGateway;
pub use supabase::SupabaseLeads;
