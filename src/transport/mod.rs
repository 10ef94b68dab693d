//! Secure Transport

use std::net::SocketAddr;

use hickory_resolver::proto::op::Message;

use crate::{ExchangeResult, ProtocolError};

pub mod https;
pub use https::{HttpsTransport, UriTemplate};

pub mod tls;
pub use tls::TlsTransport;

/// Largest dns message either transport carries.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

#[trait_variant::make(ExchangeTrait: Send)]
pub trait LocalExchangeTrait {
    /// One round trip of a wire format query against `addr`.
    async fn exchange(&self, addr: SocketAddr, query: &[u8]) -> ExchangeResult<Vec<u8>>;
}

macro_rules! transport_enum {
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
        $v enum $name {
            $(
                $(#[$item_meta])*
                $id($id_ty),
            )+
        }

        impl $name {
            pub fn name(&self) -> &str {
                match self {
                    $(
                        $name::$id(_) => stringify!($id),
                    )+
                }
            }
        }

        impl ExchangeTrait for $name
        {
            async fn exchange(&self, addr: SocketAddr, query: &[u8]) -> ExchangeResult<Vec<u8>> {
                match self {
                    $(
                        $name::$id(t) => ExchangeTrait::exchange(t, addr, query).await,
                    )+
                }
            }
        }

        $(
            impl From<$id_ty> for $name {
                fn from(t: $id_ty) -> $name {
                    $name::$id(t)
                }
            }
        )+
    };
}

transport_enum! {
    #[derive(Debug)]
    pub enum Transport {
        Https(HttpsTransport),
        Tls(TlsTransport),
    }
}

/// Checks that `answer` decodes as a dns message replying to `query`.
pub fn check_answer(query: &[u8], answer: &[u8]) -> Result<(), ProtocolError> {
    if answer.is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }
    if answer.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::Oversized(answer.len()));
    }

    let message = Message::from_vec(answer)?;
    let expected = message_id(query);
    if message.id() != expected {
        return Err(ProtocolError::IdMismatch {
            expected,
            actual: message.id(),
        });
    }

    Ok(())
}

pub(crate) fn message_id(msg: &[u8]) -> u16 {
    match msg {
        [hi, lo, ..] => u16::from_be_bytes([*hi, *lo]),
        _ => 0,
    }
}
