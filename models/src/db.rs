use mongodb::{Client, Collection, bson::doc, options::ClientOptions};
use serde::{Deserialize, Serialize};

/// Connects to the cluster and pings the default database.
///
/// The database must be part of the URI.
pub async fn client(uri: &str) -> mongodb::error::Result<Client> {
    let mut client_options = ClientOptions::parse(uri).await?;

    client_options.app_name = Some(env!("CARGO_CRATE_NAME").to_string());

    let client = Client::with_options(client_options)?;

    client
        .default_database()
        .expect("database needs to be defined in the URI")
        .run_command(doc! {"ping": 1})
        .await?;

    Ok(client)
}

pub fn get_collection<'d, T>(client: &Client, collection_name: &str) -> Collection<T>
where
    T: Send + Sync + Deserialize<'d> + Serialize,
{
    let db = client
        .default_database()
        .expect("database needs to be defined in the URI");

    db.collection::<T>(collection_name)
}
