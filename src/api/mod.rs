use serde::de::DeserializeOwned;

use crate::error::ApiError;

pub mod advance;
pub mod attendance;
pub mod business;
pub mod claim;
pub mod feature;
pub mod lifecycle;
pub mod permission;
pub mod role;
pub mod user;

/// Parses a JSON body that may be left out. An empty body means
/// `T::default()`; anything else has to be valid JSON for `T`.
pub(crate) fn optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Json deserialize error: {e}")))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Body {
        amount: Option<f64>,
    }

    #[test]
    fn empty_body_falls_back_to_default() {
        assert_eq!(optional_json::<Body>(b"").unwrap(), Body::default());
        assert_eq!(optional_json::<Body>(b"  \n").unwrap(), Body::default());
    }

    #[test]
    fn present_body_is_parsed() {
        assert_eq!(optional_json::<Body>(br#"{"amount": 40}"#).unwrap(), Body { amount: Some(40.0) });
        assert_eq!(optional_json::<Body>(b"{}").unwrap(), Body::default());
    }

    #[test]
    fn malformed_body_is_a_bad_request() {
        for body in [&br#"{"amount":"40"}"#[..], b"{ not json", br#"{"amount":40,}"#] {
            let err = optional_json::<Body>(body).unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)), "body = {:?}", std::str::from_utf8(body));
        }
    }
}
