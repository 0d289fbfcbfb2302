//! Document and registry loading port trait.

use serde_json::Value;

use crate::domain::error::StratforgeError;
use crate::domain::registry::IndicatorRegistry;

pub trait DocumentPort {
    fn read_document(&self, location: &str) -> Result<Value, StratforgeError>;
    fn read_registry(&self, location: &str) -> Result<IndicatorRegistry, StratforgeError>;
}
