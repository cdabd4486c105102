use std::sync::Arc;

use crate::application::flags::FlagService;

#[derive(Clone)]
pub struct ApiState {
    pub flags: Arc<FlagService>,
}

impl ApiState {
    pub fn new(flags: FlagService) -> Self {
        Self {
            flags: Arc::new(flags),
        }
    }
}
