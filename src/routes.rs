use crate::{
    api::{advance, attendance, business, claim, feature, permission, role, user},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
    error::ApiError,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{HttpResponse, middleware::from_fn, web};
use serde_json::json;
use std::sync::Arc;

// Per-route limiter; a zero rate is treated as one request per minute.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

// Extractor failures answer in the same JSON shape as handler errors.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::bad_request(err.to_string()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::bad_request(err.to_string()).into())
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|_err, _req| ApiError::NotFound("Resource").into())
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(path_config())
        .route("/health", web::get().to(health));

    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(refresh_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(protected_limiter)
            .service(web::resource("/me").route(web::get().to(handlers::me)))
            .service(
                web::scope("/users")
                    .service(
                        web::resource("")
                            .route(web::get().to(user::list_users))
                            .route(web::post().to(user::create_user)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(user::get_user))
                            .route(web::put().to(user::update_user))
                            .route(web::delete().to(user::delete_user)),
                    )
                    .service(
                        web::resource("/{id}/roles").route(web::put().to(user::sync_user_roles)),
                    ),
            )
            .service(
                web::scope("/businesses")
                    .service(
                        web::resource("")
                            .route(web::get().to(business::list_businesses))
                            .route(web::post().to(business::create_business)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(business::get_business))
                            .route(web::put().to(business::update_business))
                            .route(web::delete().to(business::delete_business)),
                    )
                    .service(
                        web::resource("/{id}/features")
                            .route(web::get().to(feature::list_business_features)),
                    )
                    .service(
                        web::resource("/{id}/features/{feature_id}")
                            .route(web::put().to(feature::toggle_business_feature)),
                    ),
            )
            .service(
                web::scope("/roles")
                    .service(
                        web::resource("")
                            .route(web::get().to(role::list_roles))
                            .route(web::post().to(role::create_role)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(role::get_role))
                            .route(web::put().to(role::update_role))
                            .route(web::delete().to(role::delete_role)),
                    )
                    .service(
                        web::resource("/{id}/permissions")
                            .route(web::put().to(role::sync_role_permissions)),
                    ),
            )
            .service(
                web::scope("/permissions")
                    .service(
                        web::resource("")
                            .route(web::get().to(permission::list_permissions))
                            .route(web::post().to(permission::create_permission)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(permission::get_permission))
                            .route(web::put().to(permission::update_permission))
                            .route(web::delete().to(permission::delete_permission)),
                    ),
            )
            .service(
                web::scope("/features")
                    .service(
                        web::resource("")
                            .route(web::get().to(feature::list_features))
                            .route(web::post().to(feature::create_feature)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(feature::update_feature))
                            .route(web::delete().to(feature::delete_feature)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    // fixed segments before /{id}
                    .service(
                        web::resource("/clock-in").route(web::post().to(attendance::clock_in)),
                    )
                    .service(
                        web::resource("/clock-out").route(web::post().to(attendance::clock_out)),
                    )
                    .service(
                        web::resource("/summary")
                            .route(web::get().to(attendance::attendance_summary)),
                    )
                    .service(
                        web::resource("")
                            .route(web::get().to(attendance::list_attendance))
                            .route(web::post().to(attendance::create_attendance)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(attendance::get_attendance))
                            .route(web::put().to(attendance::update_attendance))
                            .route(web::delete().to(attendance::delete_attendance)),
                    )
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(attendance::approve_attendance)),
                    )
                    .service(
                        web::resource("/{id}/reject")
                            .route(web::put().to(attendance::reject_attendance)),
                    ),
            )
            .service(
                web::scope("/advances")
                    .service(
                        web::resource("")
                            .route(web::get().to(advance::list_advances))
                            .route(web::post().to(advance::create_advance)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(advance::get_advance))
                            .route(web::put().to(advance::update_advance))
                            .route(web::delete().to(advance::delete_advance)),
                    )
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(advance::approve_advance)),
                    )
                    .service(
                        web::resource("/{id}/reject").route(web::put().to(advance::reject_advance)),
                    )
                    .service(web::resource("/{id}/pay").route(web::put().to(advance::pay_advance))),
            )
            .service(
                web::scope("/claims")
                    .service(
                        web::resource("")
                            .route(web::get().to(claim::list_claims))
                            .route(web::post().to(claim::create_claim)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(claim::get_claim))
                            .route(web::put().to(claim::update_claim))
                            .route(web::delete().to(claim::delete_claim)),
                    )
                    .service(
                        web::resource("/{id}/approve").route(web::put().to(claim::approve_claim)),
                    )
                    .service(
                        web::resource("/{id}/reject").route(web::put().to(claim::reject_claim)),
                    )
                    .service(web::resource("/{id}/pay").route(web::put().to(claim::pay_claim))),
            ),
    );
}

// LOGIN
//  ├─ access_token (ACCESS_TOKEN_TTL)
//  └─ refresh_token (REFRESH_TOKEN_TTL, jti stored)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ revokes it, returns a new pair
