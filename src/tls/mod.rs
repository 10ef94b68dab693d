//! Tls

pub mod option;
pub use option::TlsClientOption;

pub mod error;
pub use error::TlsError;
