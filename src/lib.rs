//! Kapibara Secure DNS
//!
//! DNS over HTTPS and DNS over TLS transports plugged into hickory's
//! resolver, with bootstrap of the server addresses, an overridable dialer
//! and an optional ttl cache in front of the wire.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use kapibara_dns::{SecureResolveOption, SecureResolver};
//!
//! let resolver = SecureResolver::doh(
//!     "https://cloudflare-dns.com/dns-query{?dns}",
//!     SecureResolveOption {
//!         addresses: vec!["1.1.1.1".parse()?],
//!         cache: true,
//!         ..Default::default()
//!     },
//! )
//! .await?;
//! let ips = resolver.lookup_ip("example.com").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{BootstrapError, ExchangeError, ProtocolError, ResolverError, TransportError};

pub mod option;
pub use option::{DohMethod, SecureResolveOption, ServerIdentity, Strategy};

pub mod tls;
pub use tls::{TlsClientOption, TlsError};

pub mod bootstrap;
pub use bootstrap::BootstrapAddrs;

pub mod dial;
pub use dial::{DialFn, Dialer, Network};

pub mod cache;
pub use cache::TtlCache;

pub mod transport;
pub use transport::{ExchangeTrait, HttpsTransport, TlsTransport, Transport};

pub mod provider;
pub use provider::SecureConnectionProvider;

pub mod resolver;
pub use resolver::SecureResolver;

#[cfg(test)]
mod testing;

pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

#[macro_export]
macro_rules! stream_traits_enum {
    {
        $(#[$meta:meta])*
        $v:vis enum $name:ident
        {
            $(
                $(#[$item_meta:meta])*
                $id:ident($id_ty:ty),
            )+
        }
    } => {
        $(#[$meta])*
        $v enum $name
        {
            $(
                $(#[$item_meta])*
                $id($id_ty),
            )+
        }

        impl tokio::io::AsyncRead for $name
        {
            #[inline]
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                cx: &mut std::task::Context<'_>,
                buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                match self.get_mut() {
                    $(
                        $name::$id(val) => std::pin::Pin::new(val).poll_read(cx, buf),
                    )+
                }
            }
        }

        impl tokio::io::AsyncWrite for $name
        {
            #[inline]
            fn poll_write(
                self: std::pin::Pin<&mut Self>,
                cx: &mut std::task::Context<'_>,
                buf: &[u8],
            ) -> std::task::Poll<std::io::Result<usize>> {
                match self.get_mut() {
                    $(
                        $name::$id(val) => std::pin::Pin::new(val).poll_write(cx, buf),
                    )+
                }
            }

            #[inline]
            fn poll_flush(
                self: std::pin::Pin<&mut Self>,
                cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                match self.get_mut() {
                    $(
                        $name::$id(val) => std::pin::Pin::new(val).poll_flush(cx),
                    )+
                }
            }

            #[inline]
            fn poll_shutdown(
                self: std::pin::Pin<&mut Self>,
                cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                match self.get_mut() {
                    $(
                        $name::$id(val) => std::pin::Pin::new(val).poll_shutdown(cx),
                    )+
                }
            }
        }

        $(
            impl From<$id_ty> for $name {
                fn from(val: $id_ty) -> $name {
                    $name::$id(val)
                }
            }
        )+
    };
}
