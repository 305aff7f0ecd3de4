// SPDX-License-Identifier: Apache-2.0

use super::{client_ip, parse_body, propagated_request_id, respond, store_error};
use crate::auth::{
    authenticate, generate_referral_code, generate_salt, hash_password, issue_token,
    verify_password,
};
use crate::*;
use serde_json::json;
use tiffin_api::dto::{LoginRequest, RegisterRequest, UpdateProfileRequest, UserView};

const REFERRAL_CODE_INSERT_ATTEMPTS: usize = 5;

pub(crate) async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let ip = client_ip(&headers);
        if !state.auth_limiter.allow(&ip, &state.api.auth_rate_limit).await {
            return Err(ApiError::rate_limited());
        }
        let req: RegisterRequest = parse_body(&body)?;

        let role = match &req.role {
            Some(raw) => {
                Role::parse(raw).map_err(|e| ApiError::validation_failed(e.to_string()))?
            }
            None => Role::Customer,
        };
        if !role.self_assignable() {
            return Err(ApiError::validation_failed(
                "admin role cannot be self-assigned",
            ));
        }
        validate_password(&req.password)
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;

        let referred_by = match &req.referral_code {
            Some(raw) => {
                let code = raw.trim().to_ascii_uppercase();
                let referrer = state
                    .store
                    .user_by_referral_code(&code)
                    .await
                    .map_err(store_error)?
                    .ok_or_else(|| ApiError::validation_failed("unknown referral code"))?;
                Some((referrer.id, code))
            }
            None => None,
        };

        let mut address = req.address.map(|a| a.into_address());
        if let Some(addr) = address.as_mut() {
            match state.integrations.geocoder.forward_geocode(addr).await {
                Ok(point) => addr.geo = point,
                Err(e) => warn!(request_id = %request_id, "geocode failed: {e}"),
            }
        }

        let salt = generate_salt();
        let password_hash = hash_password(&req.password, &salt, state.api.pbkdf2_rounds)?;
        let now = Utc::now();
        let mut user = User {
            id: UserId::fresh(),
            role,
            name: req.name,
            email: normalize_email(&req.email),
            password_hash,
            password_salt: salt,
            phone: req.phone,
            wallet_balance_cents: 0,
            address,
            referral_code: generate_referral_code(),
            referred_by: referred_by.as_ref().map(|(id, _)| id.clone()),
            approved: role.approved_on_signup(),
            available: false,
            delivered_order_count: 0,
            restaurant_profile: req.restaurant_profile.map(|p| p.into_profile()),
            created_at: now,
            updated_at: now,
        };
        user.validate()
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;

        let mut attempts = 0;
        loop {
            match state.store.insert_user(&user).await.map_err(store_error)? {
                InsertUserOutcome::Inserted => break,
                InsertUserOutcome::DuplicateEmail => {
                    return Err(ApiError::duplicate_email(&user.email));
                }
                InsertUserOutcome::ReferralCodeTaken => {
                    attempts += 1;
                    if attempts >= REFERRAL_CODE_INSERT_ATTEMPTS {
                        return Err(ApiError::internal(
                            "could not allocate a unique referral code",
                        ));
                    }
                    user.referral_code = generate_referral_code();
                }
            }
        }

        if let Some((referrer_id, code)) = referred_by {
            let referral = Referral {
                id: ReferralId::fresh(),
                referrer_id,
                referee_id: user.id.clone(),
                code,
                reward_cents: state.api.rewards.referral_reward_cents,
                rewarded: false,
                rewarded_at: None,
                created_at: now,
            };
            referral
                .validate()
                .map_err(|e| ApiError::validation_failed(e.to_string()))?;
            state
                .store
                .insert_referral(&referral)
                .await
                .map_err(store_error)?;
        }

        let mail_body = format!(
            "Hi {},\r\n\r\nWelcome to Tiffin. Your referral code is {}.\r\n",
            user.name, user.referral_code
        );
        if let Err(e) = state
            .integrations
            .mailer
            .send(&user.email, "Welcome to Tiffin", &mail_body)
            .await
        {
            warn!(request_id = %request_id, "welcome mail failed: {e}");
        }

        let token = issue_token(&user, now, state.api.token_ttl, state.api.token_secret.as_bytes())?;
        info!(request_id = %request_id, user_id = %user.id.as_str(), role = %user.role.as_str(), "user registered");
        Ok(json!({"token": token, "user": UserView::from(&user)}))
    };
    respond(&state, "/v1/auth/register", started, &request_id, work.await).await
}

pub(crate) async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let ip = client_ip(&headers);
        if !state.auth_limiter.allow(&ip, &state.api.auth_rate_limit).await {
            return Err(ApiError::rate_limited());
        }
        let req: LoginRequest = parse_body(&body)?;
        let email = normalize_email(&req.email);
        let user = state
            .store
            .user_by_email(&email)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ApiError::unauthorized("invalid credentials"))?;
        let matches = verify_password(
            &req.password,
            &user.password_salt,
            state.api.pbkdf2_rounds,
            &user.password_hash,
        )?;
        if !matches {
            return Err(ApiError::unauthorized("invalid credentials"));
        }
        let token = issue_token(
            &user,
            Utc::now(),
            state.api.token_ttl,
            state.api.token_secret.as_bytes(),
        )?;
        info!(request_id = %request_id, user_id = %user.id.as_str(), "login");
        Ok(json!({"token": token, "user": UserView::from(&user)}))
    };
    respond(&state, "/v1/auth/login", started, &request_id, work.await).await
}

pub(crate) async fn me_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        Ok(json!({"user": UserView::from(&user)}))
    };
    respond(&state, "/v1/auth/me", started, &request_id, work.await).await
}

pub(crate) async fn update_me_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let mut user = authenticate(&state, &headers).await?;
        let req: UpdateProfileRequest = parse_body(&body)?;

        if let Some(name) = req.name {
            user.name = name;
        }
        if let Some(phone) = req.phone {
            user.phone = Some(phone);
        }
        if let Some(dto) = req.address {
            let mut address = dto.into_address();
            match state.integrations.geocoder.forward_geocode(&address).await {
                Ok(point) => address.geo = point,
                Err(e) => warn!(request_id = %request_id, "geocode failed: {e}"),
            }
            user.address = Some(address);
        }
        if let Some(available) = req.available {
            if user.role != Role::DeliveryStaff {
                return Err(ApiError::forbidden(
                    "only delivery staff may toggle availability",
                ));
            }
            user.available = available;
        }
        if let Some(dto) = req.restaurant_profile {
            if user.role != Role::Restaurant {
                return Err(ApiError::forbidden(
                    "only restaurants may edit a restaurant profile",
                ));
            }
            // Rating counters are review-derived; a profile edit must not
            // reset them.
            let (rating_sum, rating_count) = user
                .restaurant_profile
                .as_ref()
                .map_or((0, 0), |p| (p.rating_sum, p.rating_count));
            let mut profile = dto.into_profile();
            profile.rating_sum = rating_sum;
            profile.rating_count = rating_count;
            user.restaurant_profile = Some(profile);
        }

        user.updated_at = Utc::now();
        user.validate()
            .map_err(|e| ApiError::validation_failed(e.to_string()))?;
        let updated = state
            .store
            .update_user_profile(&user)
            .await
            .map_err(store_error)?;
        if !updated {
            return Err(ApiError::not_found("user", user.id.as_str()));
        }
        Ok(json!({"user": UserView::from(&user)}))
    };
    respond(&state, "/v1/auth/me", started, &request_id, work.await).await
}

pub(crate) async fn referrals_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let request_id = propagated_request_id(&headers, &state);
    let work = async {
        let user = authenticate(&state, &headers).await?;
        let referrals = state
            .store
            .list_referrals_for_referrer(&user.id)
            .await
            .map_err(store_error)?;
        let total_rewarded_cents = state
            .store
            .referral_reward_total(&user.id)
            .await
            .map_err(store_error)?;
        Ok(json!({
            "referral_code": user.referral_code,
            "referrals": referrals,
            "total_rewarded_cents": total_rewarded_cents,
        }))
    };
    respond(&state, "/v1/referrals", started, &request_id, work.await).await
}
