mod common;

use anyhow::{anyhow, Result};
use axum::http::StatusCode;
use common::{acquire_db_lock, read_json, TestApp};
use serde_json::json;
use uuid::Uuid;

fn password_from_welcome(text: &str) -> Result<String> {
    text.lines()
        .find_map(|line| line.trim().strip_prefix("Password: "))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("welcome email has no password"))
}

#[tokio::test]
async fn provisioned_client_sees_added_service() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("admin@example.com", "admin-pass", true).await?;
    let admin_token = app.login_token("admin@example.com", "admin-pass").await?;

    let created = app
        .post_json(
            "/api/admin/create-user",
            &json!({ "email": "a@b.com", "company": "Acme" }),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = read_json(created).await?;
    assert_eq!(created["email"], "a@b.com");
    assert_eq!(created["company"], "Acme");

    let welcome = app.mailer().wait_for("a@b.com").await?;
    let generated = password_from_welcome(&welcome.text)?;

    let client_token = app.login_token("a@b.com", &generated).await?;
    let claims = app.state.jwt.verify_token(&client_token)?;

    let services = read_json(app.get("/api/services", Some(&client_token)).await?).await?;
    assert_eq!(services, json!([]));

    let added = app
        .post_json(
            "/api/admin/add-service",
            &json!({ "userId": claims.sub, "name": "OCR Bot" }),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(added.status(), StatusCode::CREATED);

    let services = read_json(app.get("/api/services", Some(&client_token)).await?).await?;
    let rows = services.as_array().cloned().unwrap_or_default();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "OCR Bot");
    assert_eq!(rows[0]["status"], "active");
    assert_eq!(rows[0]["description"], "");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn duplicate_email_is_refused() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("admin@example.com", "admin-pass", true).await?;
    app.insert_user("taken@example.com", "pass", false).await?;
    let admin_token = app.login_token("admin@example.com", "admin-pass").await?;

    let response = app
        .post_json(
            "/api/admin/create-user",
            &json!({ "email": "Taken@Example.com", "company": "Copycat" }),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(read_json(response).await?["code"], "duplicate_email");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn admin_routes_check_role_on_every_request() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let admin_id = app.insert_user("admin@example.com", "admin-pass", true).await?;
    let admin_token = app.login_token("admin@example.com", "admin-pass").await?;
    app.insert_user("client@example.com", "client-pass", false).await?;
    let client_token = app.login_token("client@example.com", "client-pass").await?;

    let refused = app.get("/api/admin/users", Some(&client_token)).await?;
    assert_eq!(refused.status(), StatusCode::FORBIDDEN);

    let allowed = app.get("/api/admin/users", Some(&admin_token)).await?;
    assert_eq!(allowed.status(), StatusCode::OK);

    app.with_conn(move |conn| {
        use diesel::prelude::*;
        use portal::schema::users;
        diesel::update(users::table.find(admin_id))
            .set(users::is_admin.eq(false))
            .execute(conn)?;
        Ok(())
    })
    .await?;

    let demoted = app.get("/api/admin/users", Some(&admin_token)).await?;
    assert_eq!(demoted.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn service_toggle_update_and_delete() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("admin@example.com", "admin-pass", true).await?;
    let owner = app.insert_user("client@example.com", "client-pass", false).await?;
    let admin_token = app.login_token("admin@example.com", "admin-pass").await?;

    app.post_json(
        "/api/admin/add-service",
        &json!({ "userId": owner, "name": "Invoice sync", "description": "Shop to ERP" }),
        Some(&admin_token),
    )
    .await?;

    let all = read_json(app.get("/api/admin/all-services", Some(&admin_token)).await?).await?;
    assert_eq!(all[0]["email"], "client@example.com");
    assert_eq!(all[0]["company_name"], "client@example.com Ltd");
    let service_id = all[0]["id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("service has no id"))?;
    let toggle_path = format!("/api/admin/services/{service_id}/toggle");

    let first = read_json(app.post_empty(&toggle_path, Some(&admin_token)).await?).await?;
    assert_eq!(first["status"], "finished");
    let second = read_json(app.post_empty(&toggle_path, Some(&admin_token)).await?).await?;
    assert_eq!(second["status"], "active");

    let service_path = format!("/api/admin/services/{service_id}");
    let bad_status = app
        .put_json(&service_path, &json!({ "status": "paused" }), Some(&admin_token))
        .await?;
    assert_eq!(bad_status.status(), StatusCode::BAD_REQUEST);

    let updated = app
        .put_json(
            &service_path,
            &json!({ "status": "finished", "description": "Done" }),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(updated.status(), StatusCode::OK);

    let all = read_json(app.get("/api/admin/all-services", Some(&admin_token)).await?).await?;
    assert_eq!(all[0]["status"], "finished");
    assert_eq!(all[0]["description"], "Done");

    let missing = app
        .put_json(
            &format!("/api/admin/services/{}", Uuid::new_v4()),
            &json!({ "status": "active" }),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let deleted = app.delete(&service_path, Some(&admin_token)).await?;
    assert_eq!(deleted.status(), StatusCode::OK);
    let deleted_again = app.delete(&service_path, Some(&admin_token)).await?;
    assert_eq!(deleted_again.status(), StatusCode::NOT_FOUND);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn create_user_reports_failed_welcome_email() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.insert_user("admin@example.com", "admin-pass", true).await?;
    let admin_token = app.login_token("admin@example.com", "admin-pass").await?;
    app.mailer().set_failing(true);

    let created = app
        .post_json(
            "/api/admin/create-user",
            &json!({ "email": "new@client.pl", "company": "Client" }),
            Some(&admin_token),
        )
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = read_json(created).await?;
    assert_eq!(created["welcomeEmailSent"], false);
    assert_eq!(created["email"], "new@client.pl");

    let users = read_json(app.get("/api/admin/users", Some(&admin_token)).await?).await?;
    let emails: Vec<&str> = users
        .as_array()
        .map(|rows| rows.iter().filter_map(|row| row["email"].as_str()).collect())
        .unwrap_or_default();
    assert!(emails.contains(&"new@client.pl"));

    app.cleanup().await?;
    Ok(())
}
