pub mod boss;
pub mod yupao;

pub use boss::BossAdapter;
pub use yupao::YupaoAdapter;

use std::sync::Arc;

use crate::adapter::AdapterRegistry;

/// Registry with every built-in platform adapter.
pub fn default_registry() -> AdapterRegistry {
    AdapterRegistry::new()
        .register(Arc::new(BossAdapter::new()))
        .register(Arc::new(YupaoAdapter::new()))
}
