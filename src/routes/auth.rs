// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account routes: login, registration and logout.

use axum::{
    extract::State,
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, SESSION_COOKIE};
use crate::models::NewUser;
use crate::routes::flash::{Flash, FlashResponse};
use crate::services::password;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/logout", get(logout))
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Check credentials and start a session.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(StatusCode, CookieJar, Json<FlashResponse>)> {
    let valid = !form.username.is_empty()
        && state
            .db
            .verify_credentials(&form.username, &form.password)
            .await?;

    if !valid {
        tracing::info!(username = %form.username, "Failed login");
        return Ok((
            StatusCode::UNAUTHORIZED,
            jar,
            Json(FlashResponse::stay(Flash::danger(
                "Invalid login details. Please try again.",
            ))),
        ));
    }

    let token = create_jwt(&form.username, &state.config.session_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    let flash = if state.db.user_has_profile(&form.username).await? {
        Flash::success(format!("Welcome, {}!", form.username))
    } else {
        Flash::warning("Please complete your profile to see your results!")
    };

    tracing::info!(username = %form.username, "User logged in");

    let jar = jar.add(session_cookie(token, state.config.secure_cookies()));
    Ok((StatusCode::OK, jar, Json(FlashResponse::redirect(flash, "/"))))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterForm {
    #[serde(default)]
    #[validate(length(min = 1))]
    first_name: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    last_name: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    email: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    username: String,
    #[serde(default)]
    #[validate(length(min = 1), must_match(other = "password2"))]
    password: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    password2: String,
}

/// Create an account.
///
/// Missing fields and mismatched passwords are reported before the
/// username is checked.
async fn register(
    State(state): State<Arc<AppState>>,
    Form(form): Form<RegisterForm>,
) -> Result<(StatusCode, Json<FlashResponse>)> {
    if let Err(errors) = form.validate() {
        let missing_field = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .any(|e| e.code == "length");

        let message = if missing_field {
            "Please fill in all fields."
        } else {
            "Passwords do not match."
        };
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(FlashResponse::stay(Flash::warning(message))),
        ));
    }

    let RegisterForm {
        first_name,
        last_name,
        email,
        username,
        password: plain_password,
        ..
    } = form;

    let password_hash =
        tokio::task::spawn_blocking(move || password::hash_password(&plain_password)).await??;

    let created = state
        .db
        .create_user(NewUser {
            username: username.clone(),
            first_name,
            last_name,
            email,
            password_hash,
        })
        .await?;

    if !created {
        return Ok((
            StatusCode::CONFLICT,
            Json(FlashResponse::stay(Flash::danger(
                "That username already exists. Please choose another.",
            ))),
        ));
    }

    tracing::info!(username = %username, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(FlashResponse::redirect(
            Flash::success("Registration successful! You can now log in."),
            "/login",
        )),
    ))
}

/// End the session and send the user back to the login page.
async fn logout(jar: CookieJar) -> (CookieJar, Redirect) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to("/login"))
}

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}
