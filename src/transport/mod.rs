// MIT License

pub mod dispatcher;
pub mod session;

pub use dispatcher::CommandDispatcher;
pub use session::PanelSession;
