use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use serde::Serialize;

/// Header set by the upstream identity proxy once a user has signed in.
pub const ACTOR_HEADER: &str = "X-Actor-Id";

/// The signed-in staff member performing a request. Identity itself is
/// owned by the external provider; this service only trusts the header.
#[derive(Debug, Clone, Serialize)]
pub struct Actor {
    pub id: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Actor {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let actor_span = tracing::info_span!("actor_guard");
        let _guard = actor_span.enter();

        match request
            .headers()
            .get_one(ACTOR_HEADER)
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            Some(id) => {
                tracing::debug!(actor = %id, "Actor identified from proxy header");
                Outcome::Success(Actor { id: id.to_string() })
            }
            None => {
                tracing::warn!(uri = %request.uri(), "Request without actor header");
                Outcome::Error((Status::Unauthorized, ()))
            }
        }
    }
}
