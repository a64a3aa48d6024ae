use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, RegisterRequest,
            ResetConfirmRequest, ResetRequest, SessionSummary, VerificationStatus,
            VerifyEmailRequest,
        },
        extractors::AuthUser,
        password::{check_password_policy, hash_password, is_valid_email, normalize_email, verify_password},
        reset, verification,
    },
    error::{ApiError, ApiResult},
    rate_limit::{client_ip, limiter_key, user_agent},
    rbac, security,
    sessions::{self, SessionMeta},
    state::AppState,
    tokens,
    users::{NewUser, ProfileType, PublicUser, User},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/password", post(change_password))
        .route("/auth/password-reset/request", post(request_password_reset))
        .route("/auth/password-reset/confirm", post(confirm_password_reset))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/verify-email/resend", post(resend_verification))
        .route("/auth/verify-email/status", get(verification_status))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn session_meta(headers: &HeaderMap, device_info: Option<String>, location: Option<String>) -> SessionMeta {
    SessionMeta {
        device_info,
        ip_address: client_ip(headers),
        user_agent: user_agent(headers),
        location,
    }
}

fn locked() -> ApiError {
    ApiError::Locked("Account temporarily locked due to suspicious activity".into())
}

fn blank_to_none(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[instrument(skip(state, headers, payload))]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    payload.email = normalize_email(&payload.email);

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::bad_request("Invalid email"));
    }
    let profile_type = ProfileType::parse(payload.profile_type.trim()).ok_or_else(|| {
        ApiError::bad_request("profile_type must be one of artist, fan, licensor, service_provider")
    })?;
    check_password_policy(&payload.password).map_err(|e| {
        warn!(error = %e, "password rejected by policy");
        e
    })?;

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::conflict("Email already registered"));
    }

    let hash = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        e
    })?;
    let username = blank_to_none(payload.username);
    let first_name = blank_to_none(payload.first_name);
    let last_name = blank_to_none(payload.last_name);
    let user = User::create(
        &state.db,
        &NewUser {
            email: &payload.email,
            password_hash: &hash,
            profile_type,
            username: username.as_deref(),
            first_name: first_name.as_deref(),
            last_name: last_name.as_deref(),
        },
    )
    .await?
    .ok_or_else(|| ApiError::conflict("Email or username already registered"))?;

    if let Err(e) = rbac::services::assign_role(&state.db, user.id, profile_type.as_str(), None, None).await {
        error!(error = %e, user_id = %user.id, "default role assignment failed");
    }
    if let Err(e) = verification::issue(&state, &user).await {
        warn!(error = %e, user_id = %user.id, "verification email not issued");
    }

    let meta = session_meta(&headers, payload.device_info, None);
    let session =
        sessions::services::create_session(&state.db, &state.config.session, user.id, &meta, false)
            .await?;
    let tokens = tokens::services::issue_pair(&state, user.id, &user.email, session.id, None).await?;

    security::record(
        &state.db,
        Some(user.id),
        "user_registered",
        json!({ "profile_type": profile_type.as_str() }),
        meta.ip_address.as_deref(),
    )
    .await;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            session: SessionSummary {
                id: session.id,
                expires_at: session.expires_at,
            },
            user: PublicUser::from(user),
            tokens,
        }),
    ))
}

#[instrument(skip(state, headers, payload))]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    payload.email = normalize_email(&payload.email);

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::bad_request("Invalid email"));
    }

    let meta = session_meta(&headers, payload.device_info, payload.location);
    let ip = meta.ip_address.as_deref();
    let key = limiter_key(ip.unwrap_or("unknown"), &payload.email);
    if !state.limiter.check(&key) {
        warn!(email = %payload.email, "login rate limited");
        return Err(ApiError::TooManyRequests(
            "Too many login attempts, try again later".into(),
        ));
    }

    let user = User::find_by_email(&state.db, &payload.email).await?;
    let ok = match &user {
        Some(u) if u.is_active => verify_password(&payload.password, &u.password_hash).map_err(|e| {
            error!(error = %e, "verify_password failed");
            e
        })?,
        _ => false,
    };

    let user = match user {
        Some(u) if ok => u,
        other => {
            let user_id = other.as_ref().map(|u| u.id);
            warn!(email = %payload.email, user_id = ?user_id, "login failed");
            security::record(
                &state.db,
                user_id,
                "login_failed",
                json!({ "email": payload.email, "user_agent": meta.user_agent }),
                ip,
            )
            .await;
            let suspicious = sessions::services::detect_suspicious_activity(
                &state.db,
                &state.config.session,
                user_id,
                ip,
                meta.user_agent.as_deref(),
            )
            .await?;
            if suspicious {
                return Err(locked());
            }
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    // A correct password does not lift a lockout earned by recent failures.
    if sessions::services::detect_suspicious_activity(
        &state.db,
        &state.config.session,
        Some(user.id),
        ip,
        meta.user_agent.as_deref(),
    )
    .await?
    {
        warn!(user_id = %user.id, "login refused while locked out");
        return Err(locked());
    }

    let session = sessions::services::create_session(
        &state.db,
        &state.config.session,
        user.id,
        &meta,
        payload.remember_me,
    )
    .await?;
    let tokens = tokens::services::issue_pair(&state, user.id, &user.email, session.id, None).await?;

    security::record(
        &state.db,
        Some(user.id),
        "login_success",
        json!({ "session_id": session.id, "remember_me": payload.remember_me }),
        ip,
    )
    .await;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        session: SessionSummary {
            id: session.id,
            expires_at: session.expires_at,
        },
        user: PublicUser::from(user),
        tokens,
    }))
}

#[instrument(skip(state, auth))]
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> ApiResult<StatusCode> {
    sessions::services::revoke_session(&state.db, auth.session_id, Some(auth.user_id), "logout")
        .await?;
    info!(user_id = %auth.user_id, session_id = %auth.session_id, "user logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, auth))]
pub async fn get_me(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<PublicUser>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;
    Ok(Json(PublicUser::from(user)))
}

#[instrument(skip(state, auth, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    if !verify_password(&payload.current_password, &user.password_hash)? {
        warn!(user_id = %user.id, "password change with wrong current password");
        security::record(&state.db, Some(user.id), "password_change_failed", json!({}), None).await;
        return Err(ApiError::bad_request("Current password is incorrect"));
    }
    check_password_policy(&payload.new_password)?;

    let hash = hash_password(&payload.new_password)?;
    User::update_password(&state.db, user.id, &hash).await?;
    let revoked = sessions::services::revoke_all_user_sessions(
        &state.db,
        user.id,
        Some(auth.session_id),
        "password_changed",
    )
    .await?;
    security::record(
        &state.db,
        Some(user.id),
        "password_changed",
        json!({ "sessions_revoked": revoked }),
        None,
    )
    .await;
    info!(user_id = %user.id, revoked, "password changed");
    Ok(Json(MessageResponse {
        message: "Password updated",
    }))
}

#[instrument(skip(state, headers, payload))]
pub async fn request_password_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResetRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        return Err(ApiError::bad_request("Invalid email"));
    }
    reset::request_reset(&state, &email, client_ip(&headers).as_deref()).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "If the email exists, a reset link has been sent",
        }),
    ))
}

#[instrument(skip(state, headers, payload))]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ResetConfirmRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if payload.token.trim().is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }
    reset::confirm_reset(
        &state,
        payload.token.trim(),
        &payload.new_password,
        client_ip(&headers).as_deref(),
    )
    .await?;
    Ok(Json(MessageResponse {
        message: "Password has been reset",
    }))
}

#[instrument(skip(state, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if payload.token.trim().is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }
    verification::verify(&state, payload.token.trim()).await?;
    Ok(Json(MessageResponse {
        message: "Email verified",
    }))
}

#[instrument(skip(state, auth))]
pub async fn resend_verification(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;
    verification::resend(&state, &user).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "Verification email sent",
        }),
    ))
}

#[instrument(skip(state, auth))]
pub async fn verification_status(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<VerificationStatus>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;
    Ok(Json(VerificationStatus {
        verified: user.email_verified_at.is_some(),
        verified_at: user.email_verified_at,
    }))
}

#[cfg(test)]
mod tests {
    use crate::{app::build_app, test_support::{json_request, send, state_with, PASSWORD}};
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    fn login_body(password: &str) -> serde_json::Value {
        json!({ "email": "locked@out.co", "password": password })
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn register_then_login(db: PgPool) {
        let app = build_app(state_with(db).await);
        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({ "email": "New@Artist.co", "password": PASSWORD, "profile_type": "artist" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["email"], "new@artist.co");
        assert!(body["user"].get("password_hash").is_none());
        assert_eq!(body["tokens"]["token_type"], "Bearer");

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({ "email": "new@artist.co", "password": PASSWORD, "profile_type": "artist" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/auth/login",
                None,
                Some(json!({ "email": "new@artist.co", "password": PASSWORD })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let bearer = format!("Bearer {}", body["tokens"]["access_token"].as_str().unwrap());
        let (status, me) = send(&app, json_request("GET", "/api/v1/me", Some(&bearer), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["profile_type"], "artist");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn correct_password_stays_locked_after_repeated_failures(db: PgPool) {
        let state = state_with(db).await;
        let threshold = state.config.session.suspicious_threshold;
        let app = build_app(state);
        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({ "email": "locked@out.co", "password": PASSWORD, "profile_type": "fan" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let mut last = StatusCode::OK;
        for _ in 0..threshold {
            let (status, _) = send(
                &app,
                json_request("POST", "/api/v1/auth/login", None, Some(login_body("Wr0ng!Passw0rd"))),
            )
            .await;
            last = status;
        }
        assert_eq!(last, StatusCode::LOCKED);

        let (status, body) = send(
            &app,
            json_request("POST", "/api/v1/auth/login", None, Some(login_body(PASSWORD))),
        )
        .await;
        assert_eq!(status, StatusCode::LOCKED);
        assert!(body["error"].as_str().unwrap().contains("locked"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn single_failure_does_not_lock(db: PgPool) {
        let app = build_app(state_with(db).await);
        send(
            &app,
            json_request(
                "POST",
                "/api/v1/auth/register",
                None,
                Some(json!({ "email": "locked@out.co", "password": PASSWORD, "profile_type": "fan" })),
            ),
        )
        .await;
        let (status, _) = send(
            &app,
            json_request("POST", "/api/v1/auth/login", None, Some(login_body("Wr0ng!Passw0rd"))),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(
            &app,
            json_request("POST", "/api/v1/auth/login", None, Some(login_body(PASSWORD))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}
