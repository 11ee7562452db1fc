pub mod dispatcher;
pub mod history;
pub mod rooms;
pub mod sessions;

pub use dispatcher::Dispatcher;
pub use history::HistoryService;
pub use rooms::RoomRegistry;
pub use sessions::SessionRegistry;
