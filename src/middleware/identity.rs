//! Request identity extracted from the session cookie.
//!
//! Session establishment (login, token issuance) is handled by an external
//! collaborator; this extractor only reads the resulting cookie. A request
//! without an identity is a guest and is rejected by `require_login`.

use actix_session::SessionExt;
use actix_utils::future::{ready, Ready};
use actix_web::dev::Payload;
use actix_web::{error::ErrorUnauthorized, Error, FromRequest, HttpRequest};

/// Client identity for a single request cycle.
#[derive(Clone, Debug, Default)]
pub struct Identity {
    /// User identity. None is a guest.
    pub user_id: Option<String>,
    /// Display name, cached in the session at login.
    pub user_name: Option<String>,
}

impl Identity {
    /// Returns the user id, or a 401 error for guests.
    pub fn require_login(&self) -> Result<String, Error> {
        self.user_id
            .clone()
            .ok_or_else(|| ErrorUnauthorized("Login required."))
    }
}

impl FromRequest for Identity {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let session = req.get_session();

        let identity = Identity {
            user_id: session.get::<String>("uid").unwrap_or_default(),
            user_name: session.get::<String>("uname").unwrap_or_default(),
        };

        ready(Ok(identity))
    }
}
