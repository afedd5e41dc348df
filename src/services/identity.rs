//! Resolution of the player behind an upgrade request.

use axum::http::{HeaderMap, header::COOKIE};
use uuid::Uuid;

/// Cookie carrying the anonymous player identity.
pub const PLAYER_ID_COOKIE: &str = "player_id";

/// Player resolved from a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable player id.
    pub player_id: Uuid,
    /// `Set-Cookie` value to return with the upgrade response, when the id is new.
    pub set_cookie: Option<String>,
}

/// Source of stable player ids.
pub trait IdentityProvider: Send + Sync {
    /// Identify the requester. Requests without a usable identity get a fresh one.
    fn identify(&self, headers: &HeaderMap) -> Identity;
}

/// Anonymous sessions keyed by the `player_id` cookie.
#[derive(Debug, Default, Clone, Copy)]
pub struct CookieIdentity;

impl IdentityProvider for CookieIdentity {
    fn identify(&self, headers: &HeaderMap) -> Identity {
        match cookie(headers, PLAYER_ID_COOKIE).and_then(|value| Uuid::parse_str(&value).ok()) {
            Some(player_id) => Identity {
                player_id,
                set_cookie: None,
            },
            None => {
                let player_id = Uuid::now_v7();
                Identity {
                    player_id,
                    set_cookie: Some(format!(
                        "{PLAYER_ID_COOKIE}={player_id}; HttpOnly; Secure; SameSite=Strict; Path=/"
                    )),
                }
            }
        }
    }
}

/// Value of the cookie `name`, across every `Cookie` header.
pub fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_owned())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn known_cookie_keeps_the_player() {
        let id = Uuid::now_v7();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&format!("a=1; player_id=\"{id}\"")).unwrap());

        let identity = CookieIdentity.identify(&headers);
        assert_eq!(identity.player_id, id);
        assert!(identity.set_cookie.is_none());
    }

    #[test]
    fn missing_cookie_mints_a_v7_id() {
        let identity = CookieIdentity.identify(&HeaderMap::new());
        assert_eq!(identity.player_id.get_version_num(), 7);
        assert!(identity.set_cookie.unwrap().starts_with("player_id="));
    }
}
