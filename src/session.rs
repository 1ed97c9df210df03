use std::fmt;

use rand::Rng;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 13;

/// Opaque identifier scoping the WebSocket channel to one client.
///
/// Minted once per process and sent both as the `clientId` query parameter
/// of `/ws` and as `client_id` in every `/prompt` body, so ComfyUI routes
/// execution events for our jobs to our socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientSession(String);

impl ClientSession {
    /// A fresh random base-36 identifier.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let id = (0..ID_LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Use a caller-chosen identifier.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
