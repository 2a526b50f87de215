use axum::http::HeaderMap;
use lab_core::{PlayerId, UserHandle};
use lab_service::{
    is_valid_player_key, Identity, IdentityProvider, ProgressionService, Unauthenticated,
};
use std::sync::Arc;

pub const PLAYER_HEADER: &str = "x-player-id";
pub const HANDLE_HEADER: &str = "x-player-handle";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProgressionService>,
    pub identity: Arc<HeaderIdentity>,
    pub seed: u64,
}

/// Trusts identity headers set by an authenticating proxy in front of the
/// daemon. Player ids must be usable as storage keys; the judge handle
/// defaults to the player id.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderIdentity;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl IdentityProvider for HeaderIdentity {
    type Request = HeaderMap;

    fn current_user(&self, headers: &HeaderMap) -> Result<Identity, Unauthenticated> {
        let player = header(headers, PLAYER_HEADER)
            .ok_or_else(|| Unauthenticated(format!("missing {PLAYER_HEADER} header")))?;
        if !is_valid_player_key(player) {
            return Err(Unauthenticated(format!("malformed {PLAYER_HEADER} header")));
        }
        let handle = header(headers, HANDLE_HEADER).unwrap_or(player);
        Ok(Identity {
            player: PlayerId::new(player),
            handle: UserHandle::new(handle),
        })
    }
}
