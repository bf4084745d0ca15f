//! CORS configuration. Brains deployments front arbitrary external clients
//! (schedulers, webhook providers, UI front-ends) so the default is permissive;
//! operators needing origin restriction can swap this layer in their own binary.

use tower_http::cors::CorsLayer;

pub fn cors_layer() -> CorsLayer {
    CorsLayer::permissive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_layer_builds() {
        let _ = cors_layer();
    }
}
