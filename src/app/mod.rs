pub mod session;

pub use session::{
    Notice, SelectionSession, SessionHandle, SessionObservers, SessionSnapshot,
    SpawnedSession,
};
