use crate::{
    api::{attendance, event, user},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Per-route limiter. Zero means "no configured rate" and falls back to 1 request/ms.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        (60_000 / requests_per_min as u64).max(1)
    };
    let burst = requests_per_min.max(1);

    // per_ms and burst are both non-zero, which is all finish() checks
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(burst)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
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
                web::resource("/register")
                    .wrap(register_limiter)
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter)
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(protected_limiter)
            .service(
                web::scope("/users")
                    .service(web::resource("").route(web::get().to(user::list_users)))
                    // before /{id}
                    .service(web::resource("/me").route(web::get().to(user::me)))
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(user::get_user))
                            .route(web::put().to(user::update_user))
                            .route(web::delete().to(user::deactivate_user)),
                    ),
            )
            .service(
                web::scope("/events")
                    // /events
                    .service(
                        web::resource("")
                            .route(web::post().to(event::create_event))
                            .route(web::get().to(event::list_events)),
                    )
                    // /events/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(event::get_event))
                            .route(web::put().to(event::update_event))
                            .route(web::delete().to(event::delete_event)),
                    )
                    .service(
                        web::resource("/{id}/publish").route(web::post().to(event::publish_event)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    // gate toggles
                    .route(
                        "/events/{id}/start-check-in",
                        web::post().to(attendance::start_check_in),
                    )
                    .route(
                        "/events/{id}/stop-check-in",
                        web::post().to(attendance::stop_check_in),
                    )
                    .route(
                        "/events/{id}/start-check-out",
                        web::post().to(attendance::start_check_out),
                    )
                    .route(
                        "/events/{id}/stop-check-out",
                        web::post().to(attendance::stop_check_out),
                    )
                    // /events/{id}/qr/{check-in|check-out}
                    .route("/events/{id}/qr/{kind}", web::get().to(attendance::qr_code))
                    .route(
                        "/events/{id}/qr/{kind}/rotate",
                        web::post().to(attendance::rotate_qr_code),
                    )
                    .route("/events/{id}/list", web::get().to(attendance::event_attendance))
                    .route("/events/{id}/summary", web::get().to(attendance::event_summary))
                    // scans
                    .route("/scan/check-in", web::post().to(attendance::scan_check_in))
                    .route("/scan/check-out", web::post().to(attendance::scan_check_out))
                    .route("/scan/qr", web::post().to(attendance::scan_qr))
                    .route("/my-attendance", web::get().to(attendance::my_attendance)),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns new access_token + refresh_token
