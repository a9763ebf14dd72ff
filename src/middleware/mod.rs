pub mod session;

pub use session::{Session, SessionKeys, SESSION_COOKIE, SESSION_TTL_DAYS};
