pub mod item;
pub mod provider;
pub mod session;
pub mod user;

pub use item::*;
pub use provider::*;
pub use session::*;
pub use user::*;
