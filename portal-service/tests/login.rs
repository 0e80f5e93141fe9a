use axum::{Extension, Json, extract::State};
use models::{UserRole, db};
use mongo_drop::MongoDrop;
use mongodb::bson::oid::ObjectId;
use portal_service::{
    auth::AuthUser,
    config::{AppState, EnvVars},
    error::Error,
    routes,
};

async fn test_state(mongo_uri: &str) -> AppState {
    let mongo = db::client(mongo_uri).await.unwrap();
    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    AppState {
        mongo,
        s3: aws_sdk_s3::Client::new(&aws),
        env_vars: EnvVars {
            mongodb_uri: mongo_uri.to_string(),
            jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
            token_expiry_in_s: 3600,
            photo_bucket_name: "test-bucket".to_string(),
            port: 0,
            request_body_size_limit: 10 * 1024 * 1024,
            request_timeout_in_ms: 30_000,
        },
    }
}

/// Create a user, log in with the right and the wrong password, and check
/// the issued token round-trips through claim parsing.
#[tokio::test]
#[ignore = "requires a running MongoDB (set MONGODB_URI)"]
async fn login_issues_verifiable_tokens() {
    dotenvy::dotenv().ok();
    let mongo_uri = std::env::var("MONGODB_URI").unwrap();
    let state = test_state(&mongo_uri).await;

    let _guard = MongoDrop::new(&state.mongo.default_database().unwrap())
        .await
        .unwrap();

    let admin = AuthUser {
        user_id: ObjectId::new(),
        role: UserRole::Admin,
        centre_id: None,
    };

    let (_, Json(created)) = routes::users::post_user(
        State(state.clone()),
        Extension(admin),
        Json(routes::users::UserRequest {
            username: "portal-admin".to_string(),
            password: "correct horse battery".to_string(),
            role: UserRole::Admin,
            centre_id: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(created.username, "portal-admin");

    let Json(login) = routes::auth::post_login(
        State(state.clone()),
        Json(routes::auth::LoginRequest {
            username: "portal-admin".to_string(),
            password: "correct horse battery".to_string(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(login.role, UserRole::Admin);

    let data = jsonwebtoken::decode::<portal_service::auth::Claims>(
        &login.token,
        &jsonwebtoken::DecodingKey::from_secret(state.env_vars.jwt_secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )
    .unwrap();
    let auth_user = AuthUser::try_from(data.claims).unwrap();
    assert_eq!(auth_user.role, UserRole::Admin);
    assert_eq!(auth_user.user_id.to_hex(), created.id);

    let err = routes::auth::post_login(
        State(state.clone()),
        Json(routes::auth::LoginRequest {
            username: "portal-admin".to_string(),
            password: "wrong password".to_string(),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));
}
