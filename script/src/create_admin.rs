use anyhow::Context;
use models::{User, UserRole, db::get_collection};
use mongodb::{Client, bson::{DateTime, doc, oid::ObjectId}};
use tracing::{info, warn};

/// Bootstraps the first Admin user from ADMIN_USERNAME/ADMIN_PASSWORD.
///
/// A no-op when the username already exists, so the task is safe to run on
/// every deploy.
#[tracing::instrument(skip_all, err(Debug))]
pub async fn create_admin(client: Client) -> anyhow::Result<()> {
    let username = std::env::var("ADMIN_USERNAME").context("ADMIN_USERNAME required")?;
    let password = std::env::var("ADMIN_PASSWORD").context("ADMIN_PASSWORD required")?;
    anyhow::ensure!(
        password.len() >= 8,
        "ADMIN_PASSWORD must be at least 8 characters"
    );

    let users = get_collection::<User>(&client, "User");

    if users
        .find_one(doc! {"username": &username})
        .await?
        .is_some()
    {
        warn!(%username, "user already exists, nothing to do");
        return Ok(());
    }

    let user = User {
        id: ObjectId::new(),
        username: username.clone(),
        password_hash: bcrypt::hash(&password, bcrypt::DEFAULT_COST)?,
        role: UserRole::Admin,
        centre_id: None,
        created_at: DateTime::now(),
    };
    users
        .insert_one(&user)
        .await
        .context("unable to insert admin user")?;

    info!(%username, user = %user.id, "admin user created");

    Ok(())
}
