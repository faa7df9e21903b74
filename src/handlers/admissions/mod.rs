pub mod list;
pub mod record;

use crate::auth::RoleTier;

/// Who may read admissions at all; rows are further narrowed by scope
pub const VIEW_TIERS: &[RoleTier] = &[RoleTier::SuperAdmin, RoleTier::Company, RoleTier::AdminTeam];
pub const VIEW_CAPABILITIES: &[&str] = &["view deal", "manage deal"];

pub use list::get as admissions_get;
pub use list::view as admissions_view;
pub use record::delete as admission_delete;
pub use record::get as admission_get;
pub use record::notes as admission_notes;
pub use record::put as admission_put;
pub use record::stage_history as admission_stage_history;
