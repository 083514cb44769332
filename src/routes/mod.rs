//! HTTP routes for hivegate

pub mod health;
pub mod pressure;
pub mod schedules;
pub mod userdata;

pub use health::{health_check, readiness_check, version_info};
pub use pressure::cluster_pressure;
pub use schedules::list_schedules;
pub use userdata::{delete_user_data, get_user_data};
