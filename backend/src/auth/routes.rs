use actix_web::{HttpResponse, web};
use shared::{AuthResponse, LoginRequest, SignupRequest, UserSummary, UsersResponse};

use super::models::{NewAccount, normalize_email};
use super::password::{hash_password, verify_password};
use crate::db::AccountStore;
use crate::error::ApiError;

pub const SIGNUP_FIELDS_MISSING: &str = "Missing required fields: name, email, password";
pub const LOGIN_FIELDS_MISSING: &str = "Missing required fields: email, password";
pub const MIN_PASSWORD_CHARS: usize = 6;

pub async fn signup(
    store: web::Data<AccountStore>,
    body: web::Json<SignupRequest>,
) -> Result<HttpResponse, ApiError> {
    let SignupRequest {
        name: Some(name),
        email: Some(email),
        password: Some(password),
    } = body.into_inner()
    else {
        return Err(ApiError::Validation(SIGNUP_FIELDS_MISSING.to_string()));
    };

    let name = name.trim().to_string();
    let email = normalize_email(&email);
    if name.is_empty() || email.is_empty() || password.is_empty() {
        return Err(ApiError::Validation("All fields are required".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_CHARS
        )));
    }

    let account = store
        .create_account(NewAccount {
            name,
            email,
            password_hash: hash_password(&password),
        })
        .await?;
    log::info!("Signup: account {} created for {}", account.id, account.email);

    Ok(HttpResponse::Created().json(AuthResponse {
        message: "Signup successful".to_string(),
        user: UserSummary::from(&account),
    }))
}

pub async fn login(
    store: web::Data<AccountStore>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let LoginRequest {
        email: Some(email),
        password: Some(password),
    } = body.into_inner()
    else {
        return Err(ApiError::Validation(LOGIN_FIELDS_MISSING.to_string()));
    };

    let email = normalize_email(&email);
    log::info!("Login attempt for {}", email);

    let Some(account) = store.find_by_email(&email).await? else {
        return Err(ApiError::Unauthorized("Email not registered".to_string()));
    };
    if !verify_password(&password, &account.password_hash) {
        return Err(ApiError::Unauthorized("Invalid password".to_string()));
    }

    log::info!("Login successful for account {}", account.id);
    Ok(HttpResponse::Ok().json(AuthResponse {
        message: "Login successful".to_string(),
        user: UserSummary::from(&account),
    }))
}

pub async fn list_users(store: web::Data<AccountStore>) -> Result<HttpResponse, ApiError> {
    let accounts = store.list_accounts().await?;
    Ok(HttpResponse::Ok().json(UsersResponse {
        users: accounts.into_iter().map(Into::into).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::db::memory_repository::MemoryRepository;
    use crate::db::AccountStore;
    use crate::inference::testing::service;
    use crate::routes::configure_routes;
    use actix_web::{App, test, web};
    use serde_json::{Value, json};

    macro_rules! app {
        ($store:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($store.clone()))
                    .app_data(web::Data::new(service(None, 3)))
                    .configure(|cfg| configure_routes(cfg, 1024)),
            )
            .await
        };
    }

    fn memory_store() -> AccountStore {
        AccountStore::Memory(MemoryRepository::new())
    }

    #[actix_web::test]
    async fn signup_then_login() {
        let store = memory_store();
        let app = app!(store);

        let req = test::TestRequest::post()
            .uri("/signup")
            .set_json(json!({"name": "  Ravi ", "email": " Ravi@Farm.IO ", "password": "secret1"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 201);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Signup successful");
        assert_eq!(body["user"]["name"], "Ravi");
        assert_eq!(body["user"]["email"], "ravi@farm.io");
        let id = body["user"]["id"].as_i64().unwrap();

        let req = test::TestRequest::post()
            .uri("/login")
            .set_json(json!({"email": "RAVI@farm.io", "password": "secret1"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 200);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Login successful");
        assert_eq!(body["user"]["id"], id);
    }

    #[actix_web::test]
    async fn duplicate_signup_is_conflict_and_keeps_one_row() {
        let store = memory_store();
        let app = app!(store);

        for (expected, name) in [(201, "First"), (409, "Second")] {
            let req = test::TestRequest::post()
                .uri("/signup")
                .set_json(json!({"name": name, "email": "dup@farm.io", "password": "secret1"}))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status().as_u16(), expected);
            if expected == 409 {
                let body: Value = test::read_body_json(resp).await;
                assert_eq!(body["error"], "Email already registered");
            }
        }

        let accounts = store.list_accounts().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name, "First");
    }

    #[actix_web::test]
    async fn signup_validation_errors() {
        let app = app!(memory_store());
        let cases = [
            (json!({"name": "a", "email": "a@b.c"}), "Missing required fields: name, email, password"),
            (json!({"name": "  ", "email": "a@b.c", "password": "secret1"}), "All fields are required"),
            (json!({"name": "a", "email": "a@b.c", "password": ""}), "All fields are required"),
            (json!({"name": "a", "email": "a@b.c", "password": "12345"}), "Password must be at least 6 characters"),
        ];
        for (payload, message) in cases {
            let req = test::TestRequest::post().uri("/signup").set_json(payload).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status().as_u16(), 400);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], message);
        }
    }

    #[actix_web::test]
    async fn password_length_counts_characters() {
        let app = app!(memory_store());
        // six characters, twelve bytes
        let req = test::TestRequest::post()
            .uri("/signup")
            .set_json(json!({"name": "a", "email": "u@b.c", "password": "éééééé"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status().as_u16(), 201);
    }

    #[actix_web::test]
    async fn non_json_body_is_missing_fields() {
        let app = app!(memory_store());
        let req = test::TestRequest::post()
            .uri("/login")
            .insert_header(("content-type", "application/json"))
            .set_payload("not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Missing required fields: email, password");
    }

    #[actix_web::test]
    async fn login_failures_are_unauthorized() {
        let store = memory_store();
        let app = app!(store);
        let req = test::TestRequest::post()
            .uri("/signup")
            .set_json(json!({"name": "a", "email": "a@b.c", "password": "secret1"}))
            .to_request();
        test::call_service(&app, req).await;

        for (payload, message) in [
            (json!({"email": "x@b.c", "password": "secret1"}), "Email not registered"),
            (json!({"email": "a@b.c", "password": "secret2"}), "Invalid password"),
        ] {
            let req = test::TestRequest::post().uri("/login").set_json(payload).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status().as_u16(), 401);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], message);
        }
    }

    #[actix_web::test]
    async fn users_are_listed_by_id_without_passwords() {
        let store = memory_store();
        let app = app!(store);
        for email in ["c@b.c", "a@b.c", "b@b.c"] {
            let req = test::TestRequest::post()
                .uri("/signup")
                .set_json(json!({"name": "n", "email": email, "password": "secret1"}))
                .to_request();
            test::call_service(&app, req).await;
        }

        let req = test::TestRequest::get().uri("/users").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let users = body["users"].as_array().unwrap();
        let emails: Vec<&str> = users.iter().map(|u| u["email"].as_str().unwrap()).collect();
        assert_eq!(emails, vec!["c@b.c", "a@b.c", "b@b.c"]);
        assert!(users.iter().all(|u| u.get("password_hash").is_none()));
        assert!(
            chrono::DateTime::parse_from_rfc3339(users[0]["created_at"].as_str().unwrap()).is_ok()
        );
    }
}
