use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;
use uuid::Uuid;

use portal::{
    auth::password,
    config::AppConfig,
    db,
    models::NewUser,
    schema::users,
    utils::normalize_email,
};

const USAGE: &str = "Usage:\n  portal-admin create-admin <email> <company>\n  portal-admin promote <email>\n  portal-admin hash-password <password>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["create-admin", email, company] => create_admin(email, company)?,
        ["promote", email] => promote(email)?,
        ["hash-password", plain] => println!("{}", password::hash_password(plain)?),
        [cmd, ..] => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        [] => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn connect() -> Result<db::PgPool> {
    let config = AppConfig::from_env()?;
    eprintln!("Using database {}", config.redacted_database_url());
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    db::run_migrations(&pool)?;
    Ok(pool)
}

fn create_admin(email: &str, company: &str) -> Result<()> {
    let email = normalize_email(email);
    if !email.contains('@') || company.trim().is_empty() {
        bail!("a valid email and a non-empty company name are required");
    }

    let pool = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let generated = password::generate_password();
    let new_user = NewUser {
        id: Uuid::new_v4(),
        email: email.clone(),
        password_hash: password::hash_password(&generated)?,
        company_name: company.trim().to_string(),
        tax_id: None,
        is_admin: true,
    };

    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
        .with_context(|| format!("failed to create admin {email}"))?;

    println!("Admin account created.");
    println!("Login:    {email}");
    println!("Password: {generated}");
    Ok(())
}

fn promote(email: &str) -> Result<()> {
    let email = normalize_email(email);
    let pool = connect()?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let updated = diesel::update(users::table.filter(users::email.eq(&email)))
        .set(users::is_admin.eq(true))
        .execute(&mut conn)
        .context("failed to update user")?;

    if updated == 0 {
        bail!("no user with email {email}");
    }
    println!("{email} is now an administrator.");
    Ok(())
}
