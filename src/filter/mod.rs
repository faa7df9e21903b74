pub mod business;
pub mod error;
pub mod filter_where;
pub mod list_query;
pub mod page;
pub mod types;

pub use business::{field, FilterKind, FilterSpec};
pub use error::FilterError;
pub use list_query::ListQuery;
pub use page::{Page, Pagination};
pub use types::*;
