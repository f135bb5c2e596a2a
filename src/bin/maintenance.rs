use std::env;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use backoffice::{
    auth::password::hash_password,
    config::AppConfig,
    db,
    models::{NewUser, StaffRole},
    store::{ConversationStore, PgConversationStore},
};

const USAGE: &str = "Usage:\n  maintenance create-user <email> <display-name> <password> [role]\n  maintenance deactivate-user <email>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let store = connect()?;

    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["create-user", email, name, password] => {
            create_user(&store, email, name, password, StaffRole::default())
        }
        ["create-user", email, name, password, role] => {
            let role = parse_role(role)?;
            create_user(&store, email, name, password, role)
        }
        ["deactivate-user", email] => deactivate_user(&store, email),
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }
}

fn connect() -> Result<PgConversationStore> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        "loaded backoffice configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;
    Ok(PgConversationStore::new(pool))
}

fn create_user(
    store: &PgConversationStore,
    email: &str,
    display_name: &str,
    password: &str,
    role: StaffRole,
) -> Result<()> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || display_name.trim().is_empty() {
        bail!("email and display name must not be empty");
    }
    if store.find_user_by_email(&email)?.is_some() {
        bail!("a user with email {email} already exists");
    }

    let user = store
        .insert_user(NewUser {
            id: Uuid::new_v4(),
            email,
            display_name: display_name.trim().to_string(),
            avatar_url: None,
            password_hash: hash_password(password)?,
            role: role.to_db().to_string(),
        })
        .context("failed to insert user")?;

    println!("Created {} user {} ({})", user.role, user.email, user.id);
    Ok(())
}

fn parse_role(raw: &str) -> Result<StaffRole> {
    match StaffRole::from_db(raw.trim()) {
        Some(role) => Ok(role),
        None => bail!("unknown role {raw:?}, expected admin or staff"),
    }
}

fn deactivate_user(store: &PgConversationStore, email: &str) -> Result<()> {
    let email = email.trim().to_lowercase();
    let user = store
        .find_user_by_email(&email)?
        .with_context(|| format!("no user with email {email}"))?;

    store
        .set_user_active(user.id, false)
        .context("failed to deactivate user")?;

    println!("Deactivated user {} ({})", user.email, user.id);
    Ok(())
}
