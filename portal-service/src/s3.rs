use axum::http::StatusCode;
use tracing::info;

use crate::error::Error;

/// Uploads a student photo and returns the object key stored on the
/// student document.
pub async fn upload_student_photo(
    client: &aws_sdk_s3::Client,
    bucket_name: &str,
    image: Vec<u8>,
    admission_no: &str,
) -> Result<String, Error> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| Error::Server(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:?}")))?
        .as_millis();
    let key = format!("students/{admission_no}/{now}");

    let put_object_output = client
        .put_object()
        .bucket(bucket_name)
        .key(&key)
        .content_type("image/jpeg")
        .body(image.into())
        .send()
        .await
        .map_err(|e| Error::Server(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:?}")))?;

    let expiry = put_object_output.expiration;
    info!("Object expiry: {expiry:?}");

    Ok(key)
}
