mod machine;
mod storage;

pub use machine::{AuthApi, Navigator, Route, SessionMachine, SessionState};
pub use storage::{MemorySessionStorage, SessionStorage};
