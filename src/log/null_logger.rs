//! Stand-in used when the `logging` feature is off. Only the `log` crate's max level is kept in
//! sync so that the macros stay cheap.

use crate::log::LogConfiguration;

impl LogConfiguration {
    pub(in crate::log) fn set_config(&mut self) {
        log::set_max_level(self.global_log_level);
    }
}
