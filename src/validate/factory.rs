//! Process-wide cache of compiled dictionaries.
//!
//! Dictionary compilation is expensive (a full CIF parse plus regex
//! compilation for every type), so validators are shared by name. The
//! map is guarded by a mutex and construction happens inside the
//! critical section: dictionary loads are rare enough that a stampede
//! on a cold cache is acceptable.

use std::io::BufReader;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::resource::ResourceProvider;

use super::Validator;

#[derive(Default)]
pub struct ValidatorFactory {
    cache: Mutex<FxHashMap<String, Arc<Validator>>>,
}

impl ValidatorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared process-wide factory.
    pub fn global() -> &'static ValidatorFactory {
        static INSTANCE: OnceLock<ValidatorFactory> = OnceLock::new();
        INSTANCE.get_or_init(ValidatorFactory::new)
    }

    /// Fetch a compiled dictionary by resource name, loading and caching
    /// it on first use.
    pub fn get(&self, name: &str, provider: &dyn ResourceProvider) -> Result<Arc<Validator>> {
        let mut cache = self.cache.lock();
        if let Some(validator) = cache.get(name) {
            return Ok(validator.clone());
        }
        debug!(dictionary = name, "compiling dictionary");
        let stream = provider.load_resource(name).ok_or_else(|| {
            Error::dictionary(format!("no resource found for dictionary '{name}'"))
        })?;
        let validator = Arc::new(crate::dictionary::load_dictionary(BufReader::new(stream))?);
        cache.insert(name.to_string(), validator.clone());
        Ok(validator)
    }

    /// Drop a cached dictionary, forcing a reload on next use.
    pub fn evict(&self, name: &str) -> bool {
        self.cache.lock().remove(name).is_some()
    }
}
