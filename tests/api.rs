use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use foodgram::db::{self, schema, services::ingredient_service, services::tag_service};
use foodgram::server::config::ServerConfig;
use foodgram::services::media_storage::MediaStorage;
use http_body_util::BodyExt;
use image::{ImageFormat, Rgb, RgbImage};
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    db: DatabaseConnection,
    _media_dir: TempDir,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).unwrap()
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "integration-secret".to_string(),
        listen_addr: "127.0.0.1:0".to_string(),
        public_url: "http://testserver".to_string(),
        frontend_url: "http://frontend".to_string(),
        media_dir: "unused".to_string(),
        log_dir: "unused".to_string(),
        token_ttl_hours: 1,
        max_connections: 1,
    }
}

fn png_data_url() -> String {
    let mut bytes = Cursor::new(Vec::new());
    RgbImage::from_pixel(3, 3, Rgb([90, 160, 60]))
        .write_to(&mut bytes, ImageFormat::Png)
        .unwrap();
    format!("data:image/png;base64,{}", STANDARD.encode(bytes.into_inner()))
}

impl TestApp {
    async fn new() -> Self {
        let db = db::connect("sqlite::memory:", 1).await.unwrap();
        schema::create_tables(&db).await.unwrap();
        let media_dir = tempfile::tempdir().unwrap();
        let router = foodgram::web::create_axum_router(
            db.clone(),
            Arc::new(test_config()),
            MediaStorage::new(media_dir.path()),
        );
        Self {
            router,
            db,
            _media_dir: media_dir,
        }
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Token {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse { status, headers, body }
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    /// Registers a user and logs them in, returning `(user id, token)`.
    async fn sign_up(&self, username: &str) -> (i64, String) {
        let email = format!("{username}@example.com");
        let registered = self
            .post(
                "/api/users/",
                None,
                json!({
                    "email": email,
                    "username": username,
                    "first_name": "Test",
                    "last_name": "Cook",
                    "password": "correct-horse",
                }),
            )
            .await;
        assert_eq!(registered.status, StatusCode::CREATED, "{}", registered.text());

        let login = self
            .post(
                "/api/auth/token/login/",
                None,
                json!({ "email": email, "password": "correct-horse" }),
            )
            .await;
        assert_eq!(login.status, StatusCode::OK, "{}", login.text());
        let id = registered.json()["id"].as_i64().unwrap();
        let token = login.json()["auth_token"].as_str().unwrap().to_string();
        (id, token)
    }

    /// Seeds flour (g), eggs (pcs) and two tags; returns `(flour, eggs, breakfast, dinner)` ids.
    async fn seed(&self) -> (i32, i32, i32, i32) {
        let (flour, _) = ingredient_service::get_or_create_ingredient(&self.db, "flour", "g").await.unwrap();
        let (eggs, _) = ingredient_service::get_or_create_ingredient(&self.db, "eggs", "pcs").await.unwrap();
        let (breakfast, _) = tag_service::get_or_create_tag(&self.db, "Breakfast", "breakfast").await.unwrap();
        let (dinner, _) = tag_service::get_or_create_tag(&self.db, "Dinner", "dinner").await.unwrap();
        (flour.id, eggs.id, breakfast.id, dinner.id)
    }

    async fn create_recipe(&self, token: &str, name: &str, ingredients: Value, tags: Value) -> i64 {
        let response = self
            .post(
                "/api/recipes/",
                Some(token),
                json!({
                    "name": name,
                    "text": "Cook it.",
                    "cooking_time": 20,
                    "image": png_data_url(),
                    "ingredients": ingredients,
                    "tags": tags,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        response.json()["id"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let response = app.get("/api/health", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "OK");
}

#[tokio::test]
async fn test_login_me_and_logout_revokes_token() {
    let app = TestApp::new().await;
    let (id, token) = app.sign_up("alice").await;

    let me = app.get("/api/users/me/", Some(&token)).await;
    assert_eq!(me.status, StatusCode::OK);
    let body = me.json();
    assert_eq!(body["id"].as_i64(), Some(id));
    assert_eq!(body["username"], "alice");
    assert_eq!(body["avatar"], Value::Null);
    assert!(body.get("password_hash").is_none());

    let bad_login = app
        .post(
            "/api/auth/token/login/",
            None,
            json!({ "email": "alice@example.com", "password": "wrong-password" }),
        )
        .await;
    assert_eq!(bad_login.status, StatusCode::BAD_REQUEST);

    let logout = app.post("/api/auth/token/logout/", Some(&token), json!({})).await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);
    let after = app.get("/api/users/me/", Some(&token)).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_registration_errors_are_field_scoped() {
    let app = TestApp::new().await;
    app.sign_up("alice").await;

    let response = app
        .post(
            "/api/users/",
            None,
            json!({
                "email": "ALICE@example.com",
                "username": "bad name",
                "first_name": "A",
                "password": "12345678",
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json();
    assert!(body.get("email").is_some());
    assert!(body.get("username").is_some());
    assert!(body.get("last_name").is_some());
    assert!(body.get("password").is_some());
}

#[tokio::test]
async fn test_recipe_create_validation_and_permissions() {
    let app = TestApp::new().await;
    let (flour, eggs, breakfast, _) = app.seed().await;
    let (_, author) = app.sign_up("chef").await;
    let (_, stranger) = app.sign_up("stranger").await;

    let anonymous = app.post("/api/recipes/", None, json!({})).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let invalid = app
        .post(
            "/api/recipes/",
            Some(&author),
            json!({
                "name": "Omelette",
                "text": "Whisk.",
                "cooking_time": 0,
                "image": png_data_url(),
                "ingredients": [{ "id": eggs, "amount": 2 }, { "id": eggs, "amount": 1 }],
            }),
        )
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    let body = invalid.json();
    assert!(body.get("cooking_time").is_some());
    assert!(body.get("ingredients").is_some());
    assert!(body.get("tags").is_some());
    assert_eq!(app.get("/api/recipes/", None).await.json()["count"], 0);

    let id = app
        .create_recipe(
            &author,
            "Pancakes",
            json!([{ "id": flour, "amount": 200 }, { "id": eggs, "amount": 2 }]),
            json!([breakfast]),
        )
        .await;

    let detail = app.get(&format!("/api/recipes/{id}/"), None).await;
    assert_eq!(detail.status, StatusCode::OK);
    let body = detail.json();
    assert_eq!(body["author"]["username"], "chef");
    assert_eq!(body["ingredients"].as_array().unwrap().len(), 2);
    assert_eq!(body["tags"][0]["slug"], "breakfast");
    assert!(body["image"].as_str().unwrap().starts_with("http://testserver/media/recipes/images/"));

    let forbidden = app
        .send(
            Method::PATCH,
            &format!("/api/recipes/{id}/"),
            Some(&stranger),
            Some(json!({ "name": "Mine now" })),
        )
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let renamed = app
        .send(
            Method::PATCH,
            &format!("/api/recipes/{id}/"),
            Some(&author),
            Some(json!({ "name": "Crepes" })),
        )
        .await;
    assert_eq!(renamed.status, StatusCode::OK);
    assert_eq!(renamed.json()["name"], "Crepes");
    assert_eq!(renamed.json()["ingredients"].as_array().unwrap().len(), 2);

    let missing = app.get("/api/recipes/9999/", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    let not_a_number = app.get("/api/recipes/abc/", None).await;
    assert_eq!(not_a_number.status, StatusCode::NOT_FOUND);

    let deleted = app
        .send(Method::DELETE, &format!("/api/recipes/{id}/"), Some(&author), None)
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert_eq!(app.get(&format!("/api/recipes/{id}/"), None).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_favorites_and_listing_filters() {
    let app = TestApp::new().await;
    let (flour, eggs, breakfast, dinner) = app.seed().await;
    let (author_id, author) = app.sign_up("chef").await;
    let (_, reader) = app.sign_up("reader").await;

    let first = app
        .create_recipe(&author, "Bread", json!([{ "id": flour, "amount": 500 }]), json!([breakfast]))
        .await;
    let second = app
        .create_recipe(&author, "Eggs", json!([{ "id": eggs, "amount": 3 }]), json!([dinner]))
        .await;

    let added = app.post(&format!("/api/recipes/{first}/favorite/"), Some(&reader), json!({})).await;
    assert_eq!(added.status, StatusCode::CREATED);
    assert_eq!(added.json()["name"], "Bread");
    assert!(added.json().get("author").is_none());

    let again = app.post(&format!("/api/recipes/{first}/favorite/"), Some(&reader), json!({})).await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
    assert_eq!(again.json()["errors"], "Recipe is already in favorites.");

    let absent = app
        .send(Method::DELETE, &format!("/api/recipes/{second}/favorite/"), Some(&reader), None)
        .await;
    assert_eq!(absent.status, StatusCode::BAD_REQUEST);

    let favorites = app.get("/api/recipes/?is_favorited=1", Some(&reader)).await.json();
    assert_eq!(favorites["count"], 1);
    assert_eq!(favorites["results"][0]["id"].as_i64(), Some(first));
    assert_eq!(favorites["results"][0]["is_favorited"], true);

    let anonymous = app.get("/api/recipes/?is_favorited=1", None).await.json();
    assert_eq!(anonymous["count"], 2);
    assert_eq!(anonymous["results"][0]["id"].as_i64(), Some(second));

    let by_tag = app.get("/api/recipes/?tags=dinner&tags=unknown", None).await.json();
    assert_eq!(by_tag["count"], 1);
    assert_eq!(by_tag["results"][0]["name"], "Eggs");
    let unknown_only = app.get("/api/recipes/?tags=unknown", None).await.json();
    assert_eq!(unknown_only["count"], 0);

    let by_author = app.get(&format!("/api/recipes/?author={author_id}"), None).await.json();
    assert_eq!(by_author["count"], 2);
    let bad_flag = app.get("/api/recipes/?is_favorited=maybe", None).await;
    assert_eq!(bad_flag.status, StatusCode::BAD_REQUEST);

    let paged = app.get("/api/recipes/?limit=1", None).await.json();
    assert_eq!(paged["results"].as_array().unwrap().len(), 1);
    assert_eq!(paged["next"], "http://testserver/api/recipes/?limit=1&page=2");
    assert_eq!(paged["previous"], Value::Null);
}

#[tokio::test]
async fn test_shopping_cart_download_aggregates_ingredients() {
    let app = TestApp::new().await;
    let (flour, eggs, breakfast, _) = app.seed().await;
    let (_, token) = app.sign_up("chef").await;

    let a = app
        .create_recipe(
            &token,
            "Cake",
            json!([{ "id": flour, "amount": 200 }, { "id": eggs, "amount": 3 }]),
            json!([breakfast]),
        )
        .await;
    let b = app
        .create_recipe(&token, "Bread", json!([{ "id": flour, "amount": 300 }]), json!([breakfast]))
        .await;
    for id in [a, b] {
        let added = app.post(&format!("/api/recipes/{id}/shopping_cart/"), Some(&token), json!({})).await;
        assert_eq!(added.status, StatusCode::CREATED);
    }

    let download = app.get("/api/recipes/download_shopping_cart/", Some(&token)).await;
    assert_eq!(download.status, StatusCode::OK);
    assert_eq!(
        download.headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"shopping_list.txt\""
    );
    assert!(download.headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/plain"));
    let text = download.text();
    assert!(text.contains("flour (g) - 500"));
    assert!(text.contains("eggs (pcs) - 3"));

    let anonymous = app.get("/api/recipes/download_shopping_cart/", None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_short_link_redirects_to_frontend() {
    let app = TestApp::new().await;
    let (flour, _, breakfast, _) = app.seed().await;
    let (_, token) = app.sign_up("chef").await;
    let id = app
        .create_recipe(&token, "Bread", json!([{ "id": flour, "amount": 500 }]), json!([breakfast]))
        .await;

    let link = app.get(&format!("/api/recipes/{id}/get-link/"), None).await;
    assert_eq!(link.status, StatusCode::OK);
    let short = link.json()["short-link"].as_str().unwrap().to_string();
    let path = short.strip_prefix("http://testserver").unwrap();

    let redirect = app.get(path, None).await;
    assert_eq!(redirect.status, StatusCode::FOUND);
    assert_eq!(redirect.headers[header::LOCATION], format!("http://frontend/recipes/{id}/"));

    assert_eq!(app.get("/s/zzzzzz", None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/s/not-base36!", None).await.status, StatusCode::NOT_FOUND);
    let code = path.trim_start_matches("/s/");
    for alias in [format!("+{code}"), format!("0{code}"), code.to_ascii_uppercase()] {
        assert_eq!(app.get(&format!("/s/{alias}"), None).await.status, StatusCode::NOT_FOUND, "{alias}");
    }
}

#[tokio::test]
async fn test_subscriptions() {
    let app = TestApp::new().await;
    let (flour, eggs, breakfast, _) = app.seed().await;
    let (chef_id, chef) = app.sign_up("chef").await;
    let (fan_id, fan) = app.sign_up("fan").await;
    for (name, ingredient) in [("Bread", flour), ("Omelette", eggs), ("Cake", flour)] {
        app.create_recipe(&chef, name, json!([{ "id": ingredient, "amount": 1 }]), json!([breakfast]))
            .await;
    }

    let myself = app.post(&format!("/api/users/{fan_id}/subscribe/"), Some(&fan), json!({})).await;
    assert_eq!(myself.status, StatusCode::BAD_REQUEST);

    let subscribed = app
        .post(&format!("/api/users/{chef_id}/subscribe/?recipes_limit=2"), Some(&fan), json!({}))
        .await;
    assert_eq!(subscribed.status, StatusCode::CREATED);
    let body = subscribed.json();
    assert_eq!(body["username"], "chef");
    assert_eq!(body["is_subscribed"], true);
    assert_eq!(body["recipes_count"], 3);
    assert_eq!(body["recipes"].as_array().unwrap().len(), 2);
    assert_eq!(body["recipes"][0]["name"], "Cake");

    let twice = app.post(&format!("/api/users/{chef_id}/subscribe/"), Some(&fan), json!({})).await;
    assert_eq!(twice.status, StatusCode::BAD_REQUEST);

    let listing = app.get("/api/users/subscriptions/?recipes_limit=1", Some(&fan)).await.json();
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["results"][0]["recipes"].as_array().unwrap().len(), 1);

    let profile = app.get(&format!("/api/users/{chef_id}/"), Some(&fan)).await.json();
    assert_eq!(profile["is_subscribed"], true);

    let missing = app.post("/api/users/9999/subscribe/", Some(&fan), json!({})).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    let removed = app
        .send(Method::DELETE, &format!("/api/users/{chef_id}/subscribe/"), Some(&fan), None)
        .await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);
    let listing = app.get("/api/users/subscriptions/", Some(&fan)).await.json();
    assert_eq!(listing["count"], 0);
}

#[tokio::test]
async fn test_avatar_roundtrip() {
    let app = TestApp::new().await;
    let (_, token) = app.sign_up("alice").await;

    let set = app
        .send(
            Method::PUT,
            "/api/users/me/avatar/",
            Some(&token),
            Some(json!({ "avatar": png_data_url() })),
        )
        .await;
    assert_eq!(set.status, StatusCode::OK);
    let url = set.json()["avatar"].as_str().unwrap().to_string();
    assert!(url.starts_with("http://testserver/media/users/"));

    let served = app.get(url.strip_prefix("http://testserver").unwrap(), None).await;
    assert_eq!(served.status, StatusCode::OK);

    let cleared = app.send(Method::DELETE, "/api/users/me/avatar/", Some(&token), None).await;
    assert_eq!(cleared.status, StatusCode::NO_CONTENT);
    assert_eq!(app.get("/api/users/me/", Some(&token)).await.json()["avatar"], Value::Null);

    let invalid = app
        .send(
            Method::PUT,
            "/api/users/me/avatar/",
            Some(&token),
            Some(json!({ "avatar": "not an image" })),
        )
        .await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert!(invalid.json().get("avatar").is_some());
}

#[tokio::test]
async fn test_tags_and_ingredient_search() {
    let app = TestApp::new().await;
    let (flour, _, breakfast, _) = app.seed().await;

    let tags = app.get("/api/tags/", None).await.json();
    assert_eq!(tags.as_array().unwrap().len(), 2);
    let tag = app.get(&format!("/api/tags/{breakfast}/"), None).await.json();
    assert_eq!(tag["slug"], "breakfast");
    assert_eq!(app.get("/api/tags/999/", None).await.status, StatusCode::NOT_FOUND);

    let found = app.get("/api/ingredients/?name=FLO", None).await.json();
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["id"].as_i64(), Some(i64::from(flour)));
    let all = app.get("/api/ingredients/", None).await.json();
    assert_eq!(all.as_array().unwrap().len(), 2);
    assert_eq!(all[0]["name"], "eggs");
}

#[tokio::test]
async fn test_invalid_token_is_rejected_even_on_public_routes() {
    let app = TestApp::new().await;
    let response = app.get("/api/recipes/", Some("garbage")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}
