use rocket::Request;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;

use crate::validation::{ToValidationResponse, ValidationResponse};

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    tracing::warn!("Unauthorized access attempt");
    Status::Unauthorized.to_validation_response()
}

#[catch(404)]
pub fn not_found_api(req: &Request) -> Custom<Json<ValidationResponse>> {
    tracing::warn!(uri = %req.uri(), "No route matched");
    Status::NotFound.to_validation_response()
}

#[catch(422)]
pub fn unprocessable_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::UnprocessableEntity.to_validation_response()
}

#[catch(400)]
pub fn bad_request_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    Status::BadRequest.to_validation_response()
}
