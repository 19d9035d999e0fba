//! Bearer-token sessions guarding the admin dashboard API.

pub mod session;

pub use session::{
    bearer_token, AdminSessions, AuthError, FileSessionStore, InMemorySessionStore, IssuedToken,
    SessionError, SessionStore,
};
