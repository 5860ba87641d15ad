use crate::{
    api::{attendance, schedule},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfig, GovernorConfigBuilder, PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware,
};
use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter config
    fn limiter(requests_per_min: u32) -> GovernorConfig<PeerIpKeyExtractor, NoOpMiddleware> {
        let per_ms = if requests_per_min == 0 {
            1
        } else {
            60_000 / requests_per_min as u64
        };
        GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap()
    }

    let mark_limiter = limiter(config.rate_mark_per_min);
    let protected_limiter = limiter(config.rate_protected_per_min);

    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(Governor::new(&protected_limiter)) // rate limiting
            .service(
                web::scope("/attendance")
                    // agency-initiated
                    .service(
                        web::resource("/manual")
                            .wrap(Governor::new(&mark_limiter))
                            .route(web::post().to(attendance::mark_manual)),
                    )
                    .service(
                        web::resource("/qr/generate")
                            .route(web::post().to(attendance::generate_qr)),
                    )
                    .service(
                        web::resource("/history/agency")
                            .route(web::get().to(attendance::agency_history)),
                    )
                    // user-initiated
                    .service(
                        web::resource("/qr")
                            .wrap(Governor::new(&mark_limiter))
                            .route(web::get().to(attendance::mark_qr)),
                    )
                    .service(web::resource("/today").route(web::get().to(attendance::today_status)))
                    .service(
                        web::resource("/history/user")
                            .route(web::get().to(attendance::user_history)),
                    ),
            )
            .service(
                web::scope("/schedules")
                    // /schedules/applicable must match before /{id}
                    .service(
                        web::resource("/applicable")
                            .route(web::get().to(schedule::applicable_schedule)),
                    )
                    .service(
                        web::resource("")
                            .route(web::post().to(schedule::create_schedule))
                            .route(web::get().to(schedule::list_schedules)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(schedule::update_schedule))
                            .route(web::delete().to(schedule::delete_schedule)),
                    ),
            ),
    );
}
