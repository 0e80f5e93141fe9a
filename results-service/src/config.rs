use std::env::var;

use mongodb::bson::oid::ObjectId;
use tracing::error;

#[derive(Clone, Debug)]
pub struct EnvVars {
    pub mongodb_uri: String,
    /// The exam to tabulate and publish.
    pub exam_id: ObjectId,
    /// Restricts publication to one study centre when set.
    pub centre_id: Option<ObjectId>,
}

impl EnvVars {
    pub fn new() -> Self {
        let Ok(mongodb_uri) = var("MONGODB_URI") else {
            error!("MONGODB_URI not set");
            panic!("MONGODB_URI required");
        };
        assert!(!mongodb_uri.is_empty(), "MONGODB_URI must not be empty");

        let Ok(exam_id_string) = var("EXAM_ID") else {
            error!("EXAM_ID not set");
            panic!("EXAM_ID required");
        };
        let exam_id = match ObjectId::parse_str(&exam_id_string) {
            Ok(id) => id,
            Err(e) => {
                panic!("EXAM_ID is not a valid object id: {:?}", e);
            }
        };

        let centre_id = match var("CENTRE_ID") {
            Ok(centre_id_string) => match ObjectId::parse_str(&centre_id_string) {
                Ok(id) => Some(id),
                Err(e) => {
                    panic!("CENTRE_ID is not a valid object id: {:?}", e);
                }
            },
            Err(_e) => None,
        };

        Self {
            mongodb_uri,
            exam_id,
            centre_id,
        }
    }
}
