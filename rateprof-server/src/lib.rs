pub mod http;
pub mod pipeline;
pub mod state;
pub mod subsystems;
