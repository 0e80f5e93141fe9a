use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use mongodb::Namespace;
use mongodb::bson::oid::ObjectId;
use tracing::info;

use crate::config::AppState;
use crate::error::Error;

pub mod auth;
pub mod centres;
pub mod exams;
pub mod hall_tickets;
pub mod marks;
pub mod messages;
pub mod results;
pub mod students;
pub mod subjects;
pub mod supplementary;
pub mod teachers;
pub mod users;

pub async fn get_status_ping() -> impl IntoResponse {
    info!("Status");
    StatusCode::OK
}

/// Fully-qualified collection name for bulk writes.
pub(crate) fn namespace(state: &AppState, collection: &str) -> Namespace {
    let db = state
        .mongo
        .default_database()
        .expect("database needs to be defined in the URI");
    Namespace::new(db.name(), collection)
}

pub(crate) fn parse_object_id(id: &str) -> Result<ObjectId, Error> {
    ObjectId::parse_str(id)
        .map_err(|_| Error::BadRequest(format!("\"{id}\" is not a valid object id")))
}

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub(crate) fn xlsx_attachment(filename: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}
