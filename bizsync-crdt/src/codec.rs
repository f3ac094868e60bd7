//! String codec for OR-Set element keys.
//!
//! OR-Set elements are stored and serialized under a string key. The codec
//! is chosen statically by the element type, and decoding must exactly
//! invert encoding. Wrap a value in a newtype to give it a different codec.

use crate::{CrdtError, CrdtResult};

/// Encodes an element as its map key and decodes it back.
pub trait ElementCodec: Sized {
    fn encode_element(&self) -> String;

    fn decode_element(encoded: &str) -> CrdtResult<Self>;
}

impl ElementCodec for String {
    fn encode_element(&self) -> String {
        self.clone()
    }

    fn decode_element(encoded: &str) -> CrdtResult<Self> {
        Ok(encoded.to_string())
    }
}

macro_rules! display_codec {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ElementCodec for $ty {
                fn encode_element(&self) -> String {
                    self.to_string()
                }

                fn decode_element(encoded: &str) -> CrdtResult<Self> {
                    encoded.parse().map_err(|e: <$ty as std::str::FromStr>::Err| {
                        CrdtError::ElementCodec {
                            element: encoded.to_string(),
                            reason: e.to_string(),
                        }
                    })
                }
            }
        )*
    };
}

display_codec!(i32, i64, u32, u64, bool);

// `f64`'s Display is the shortest string that parses back to the same value.
// Both zeros compare equal, so they share the key "0".
impl ElementCodec for f64 {
    fn encode_element(&self) -> String {
        if *self == 0.0 {
            "0".to_string()
        } else {
            self.to_string()
        }
    }

    fn decode_element(encoded: &str) -> CrdtResult<Self> {
        encoded
            .parse::<f64>()
            .map(|v| if v == 0.0 { 0.0 } else { v })
            .map_err(|e| CrdtError::ElementCodec {
                element: encoded.to_string(),
                reason: e.to_string(),
            })
    }
}
