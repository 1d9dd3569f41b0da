pub mod boot;
pub mod event;
pub mod lock;
pub mod reactor;
