use std::sync::Arc;

use application::ServiceContainer;

use crate::auth::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub services: ServiceContainer,
    pub jwt: Arc<JwtService>,
}

impl AppState {
    pub fn new(services: ServiceContainer, jwt: Arc<JwtService>) -> Self {
        Self { services, jwt }
    }
}
