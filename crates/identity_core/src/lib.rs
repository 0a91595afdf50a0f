pub mod api;
pub mod codec;
pub mod error;
pub mod ids;
pub mod model;
pub mod query;
pub mod row;
pub mod session;
pub mod time;
pub mod value;

pub use api::*;
pub use error::{IdentityError, IdentityResult};
pub use ids::*;
pub use model::*;
pub use query::*;
pub use row::*;
pub use session::*;
pub use time::*;
pub use value::*;
