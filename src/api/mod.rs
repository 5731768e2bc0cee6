mod impls;
mod permit;
mod requests;
mod responses;
mod types;

pub use permit::*;
pub use requests::*;
pub use responses::*;
pub use types::*;
