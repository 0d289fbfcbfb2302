//! Configuration access port trait.

use crate::domain::error::StratforgeError;

/// Sectioned key/value configuration. Typed getters return `Ok(None)` for a
/// missing key and `ConfigInvalid` for a value that does not parse.
pub trait ConfigPort {
    /// File name or other label used in diagnostics.
    fn source_name(&self) -> &str;
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str) -> Result<Option<i64>, StratforgeError>;
    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, StratforgeError>;
}
