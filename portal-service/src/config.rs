use std::env::var;

use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub mongo: mongodb::Client,
    pub s3: aws_sdk_s3::Client,
    pub env_vars: EnvVars,
}

#[derive(Clone, Debug)]
pub struct EnvVars {
    pub mongodb_uri: String,
    pub jwt_secret: String,
    pub token_expiry_in_s: u64,
    pub photo_bucket_name: String,
    pub port: u16,
    pub request_body_size_limit: usize,
    pub request_timeout_in_ms: u64,
}

impl EnvVars {
    pub fn new() -> Self {
        let Ok(mongodb_uri) = var("MONGODB_URI") else {
            error!("MONGODB_URI not set");
            panic!("MONGODB_URI required");
        };
        assert!(!mongodb_uri.is_empty(), "MONGODB_URI must not be empty");

        let Ok(jwt_secret) = var("JWT_SECRET") else {
            error!("JWT_SECRET not set");
            panic!("JWT_SECRET required");
        };
        assert!(
            jwt_secret.len() >= 32,
            "JWT_SECRET must be at least 32 bytes"
        );

        let token_expiry_in_s = match var("TOKEN_EXPIRY_IN_S") {
            Ok(s) => s
                .parse()
                .expect("TOKEN_EXPIRY_IN_S to be a valid whole number of seconds"),
            Err(_e) => {
                let default_expiry = 8 * 60 * 60;
                warn!("TOKEN_EXPIRY_IN_S not set. Defaulting to {default_expiry}");
                default_expiry
            }
        };

        let default_bucket_name = "EXAM_PORTAL_STUDENT_PHOTOS".to_string();
        let photo_bucket_name = match var("S3_BUCKET_NAME") {
            Ok(s) => {
                if s.is_empty() {
                    warn!("S3_BUCKET_NAME not set. Defaulting to {default_bucket_name}");
                    default_bucket_name
                } else {
                    s
                }
            }
            Err(_e) => {
                warn!("S3_BUCKET_NAME not set. Defaulting to {default_bucket_name}");
                default_bucket_name
            }
        };

        let port = match var("PORT") {
            Ok(port_string) => port_string.parse().expect("PORT to be parseable as u16"),
            Err(_e) => {
                let default_port = 3001;
                warn!("PORT not set. Defaulting to {default_port}");
                default_port
            }
        };

        let request_timeout_in_ms = match var("REQUEST_TIMEOUT_IN_MS") {
            Ok(s) => s
                .parse()
                .expect("REQUEST_TIMEOUT_IN_MS to be valid unsigned integer"),
            Err(_e) => {
                let default_request_timeout = 30_000;
                warn!("REQUEST_TIMEOUT_IN_MS not set. Defaulting to {default_request_timeout}");
                default_request_timeout
            }
        };

        let request_body_size_limit = match var("REQUEST_BODY_SIZE_LIMIT") {
            Ok(s) => s
                .parse()
                .expect("REQUEST_BODY_SIZE_LIMIT to be valid unsigned integer"),
            Err(_e) => {
                let base: usize = 2;
                let exp = 20;
                // Imports upload whole admission workbooks.
                let default_request_body_size_limit = 10 * base.pow(exp);
                warn!(
                    "REQUEST_BODY_SIZE_LIMIT not set. Defaulting to {default_request_body_size_limit}"
                );
                default_request_body_size_limit
            }
        };

        EnvVars {
            mongodb_uri,
            jwt_secret,
            token_expiry_in_s,
            photo_bucket_name,
            port,
            request_body_size_limit,
            request_timeout_in_ms,
        }
    }
}
