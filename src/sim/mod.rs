pub mod event;
pub mod level;
pub mod replay;
pub mod session;
pub mod view;
